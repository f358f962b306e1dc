// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Firestore-backed user repository.
//!
//! Layout:
//! - `users/{id}`: the user documents
//! - `usernames/{username}` and `names/{name}`: create-only claim documents
//!   that back the uniqueness guarantee, owned by the user's token
//! - `counters/users`: hint for the next id to allocate
//!
//! Claims are written with create-only inserts, so a second writer racing
//! for the same username or name gets a conflict from Firestore itself.

use super::{collections, UserRepository};
use crate::error::{AppError, Result};
use crate::models::User;
use async_trait::async_trait;
use firestore::errors::FirestoreError;
use serde::{Deserialize, Serialize};

/// Document in `counters` holding the next user id hint.
pub const USER_COUNTER_DOC: &str = "users";
/// Upper bound on create-only attempts when allocating a user id.
pub const MAX_ID_ATTEMPTS: usize = 32;

/// Claim document tying a unique key to the owning user's token.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Claim {
    token: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct IdCounter {
    next_id: u64,
}

/// Result of trying to claim a unique key.
#[derive(Debug, PartialEq, Eq)]
enum ClaimOutcome {
    Acquired,
    Held,
    Taken,
}

/// Firestore database client.
#[derive(Clone)]
pub struct FirestoreDb {
    client: Option<firestore::FirestoreDb>,
}

impl FirestoreDb {
    /// Create a new Firestore client.
    ///
    /// For local development with emulator, set FIRESTORE_EMULATOR_HOST.
    pub async fn new(project_id: &str) -> Result<Self> {
        if std::env::var("FIRESTORE_EMULATOR_HOST").is_ok() {
            return Self::create_emulator_client(project_id).await;
        }

        let client = firestore::FirestoreDb::new(project_id)
            .await
            .map_err(|e| AppError::Database(format!("Failed to connect to Firestore: {}", e)))?;

        tracing::info!(project = project_id, "Connected to Firestore");

        Ok(Self {
            client: Some(client),
        })
    }

    /// Create a Firestore client for the emulator with unauthenticated access.
    async fn create_emulator_client(project_id: &str) -> Result<Self> {
        tracing::info!("Using unauthenticated connection for Firestore Emulator");

        let token_source = gcloud_sdk::ExternalJwtFunctionSource::new(|| async {
            Ok(gcloud_sdk::Token {
                token_type: "Bearer".to_string(),
                token: gcloud_sdk::SecretValue::new(
                    "eyJhbGciOiJub25lIn0.eyJ1aWQiOiJ0ZXN0In0."
                        .to_string()
                        .into(),
                ),
                expiry: chrono::Utc::now() + chrono::Duration::hours(1),
            })
        });

        let options = firestore::FirestoreDbOptions::new(project_id.to_string());

        let client = firestore::FirestoreDb::with_options_token_source(
            options,
            gcloud_sdk::GCP_DEFAULT_SCOPES.clone(),
            gcloud_sdk::TokenSourceType::ExternalSource(Box::new(token_source)),
        )
        .await
        .map_err(|e| {
            AppError::Database(format!("Failed to connect to Firestore Emulator: {}", e))
        })?;

        tracing::info!(
            project = project_id,
            "Connected to Firestore (Emulator/Unauthenticated)"
        );

        Ok(Self {
            client: Some(client),
        })
    }

    /// Create a mock Firestore client for testing (offline mode).
    ///
    /// All database operations will return an error if called.
    pub fn new_mock() -> Self {
        Self { client: None }
    }

    /// Underlying client, or a database error in offline mode.
    pub fn get_client(&self) -> Result<&firestore::FirestoreDb> {
        self.client
            .as_ref()
            .ok_or_else(|| AppError::Database("Database not connected (offline mode)".to_string()))
    }

    /// Document ids may not contain `/`, so claim keys are percent-encoded.
    fn claim_doc_id(key: &str) -> String {
        urlencoding::encode(key).into_owned()
    }

    // ─── Claims ──────────────────────────────────────────────────

    async fn claim(&self, collection: &str, key: &str, token: &str) -> Result<ClaimOutcome> {
        let doc_id = Self::claim_doc_id(key);
        let claim = Claim {
            token: token.to_string(),
        };

        let inserted: std::result::Result<Claim, FirestoreError> = self
            .get_client()?
            .fluent()
            .insert()
            .into(collection)
            .document_id(&doc_id)
            .object(&claim)
            .execute()
            .await;

        match inserted {
            Ok(_) => Ok(ClaimOutcome::Acquired),
            Err(FirestoreError::DataConflictError(_)) => {
                let owner: Option<Claim> = self
                    .get_client()?
                    .fluent()
                    .select()
                    .by_id_in(collection)
                    .obj()
                    .one(&doc_id)
                    .await
                    .map_err(|e| AppError::Database(e.to_string()))?;

                match owner {
                    Some(owner) if owner.token == token => Ok(ClaimOutcome::Held),
                    _ => Ok(ClaimOutcome::Taken),
                }
            }
            Err(e) => Err(AppError::Database(e.to_string())),
        }
    }

    async fn release(&self, collection: &str, key: &str, token: &str) -> Result<()> {
        let doc_id = Self::claim_doc_id(key);
        let owner: Option<Claim> = self
            .get_client()?
            .fluent()
            .select()
            .by_id_in(collection)
            .obj()
            .one(&doc_id)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        if owner.is_some_and(|owner| owner.token == token) {
            self.get_client()?
                .fluent()
                .delete()
                .from(collection)
                .document_id(&doc_id)
                .execute()
                .await
                .map_err(|e| AppError::Database(e.to_string()))?;
        }
        Ok(())
    }

    // ─── Id Allocation ───────────────────────────────────────────

    async fn read_counter(&self) -> Result<u64> {
        let counter: Option<IdCounter> = self
            .get_client()?
            .fluent()
            .select()
            .by_id_in(collections::COUNTERS)
            .obj()
            .one(USER_COUNTER_DOC)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(counter.map(|c| c.next_id).unwrap_or(1).max(1))
    }

    async fn write_counter(&self, next_id: u64) -> Result<()> {
        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .in_col(collections::COUNTERS)
            .document_id(USER_COUNTER_DOC)
            .object(&IdCounter { next_id })
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    /// Store a new user under the first free id at or after the counter.
    ///
    /// The user document itself is created with a create-only insert, so
    /// two writers that read the same counter value cannot share an id.
    async fn insert_new(&self, mut user: User) -> Result<User> {
        let mut candidate = self.read_counter().await?;

        for _ in 0..MAX_ID_ATTEMPTS {
            user.id = Some(candidate);

            let inserted: std::result::Result<User, FirestoreError> = self
                .get_client()?
                .fluent()
                .insert()
                .into(collections::USERS)
                .document_id(candidate.to_string())
                .object(&user)
                .execute()
                .await;

            match inserted {
                Ok(stored) => {
                    self.write_counter(candidate + 1).await?;
                    return Ok(stored);
                }
                Err(FirestoreError::DataConflictError(_)) => {
                    tracing::debug!(user_id = candidate, "User id already allocated, retrying");
                    candidate += 1;
                }
                Err(e) => return Err(AppError::Database(e.to_string())),
            }
        }

        Err(AppError::Database(format!(
            "Could not allocate a user id after {} attempts",
            MAX_ID_ATTEMPTS
        )))
    }

    async fn find_one_by_field(&self, field: &'static str, value: &str) -> Result<Option<User>> {
        let value = value.to_string();
        let users: Vec<User> = self
            .get_client()?
            .fluent()
            .select()
            .from(collections::USERS)
            .filter(move |q| q.for_all([q.field(field).eq(value.clone())]))
            .limit(1)
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(users.into_iter().next())
    }

    /// Release claims acquired by a save that did not complete.
    async fn rollback_claims(&self, user: &User, acquired: &[&'static str]) {
        for &collection in acquired {
            let key = if collection == collections::USERNAMES {
                &user.username
            } else {
                &user.name
            };
            if let Err(e) = self.release(collection, key, &user.token).await {
                tracing::warn!(error = %e, collection, key = %key, "Failed to release claim");
            }
        }
    }

    /// Claim both unique keys, then write the user.
    ///
    /// Every claim this call acquires is pushed to `acquired` as soon as it
    /// is taken, so the caller can release them whichever step fails.
    async fn save_claimed(&self, user: &User, acquired: &mut Vec<&'static str>) -> Result<User> {
        match self
            .claim(collections::USERNAMES, &user.username, &user.token)
            .await?
        {
            ClaimOutcome::Acquired => acquired.push(collections::USERNAMES),
            ClaimOutcome::Held => {}
            ClaimOutcome::Taken => {
                tracing::debug!(username = %user.username, "Username claim rejected");
                return Err(AppError::Conflict(format!(
                    "username '{}' is already taken",
                    user.username
                )));
            }
        }

        match self
            .claim(collections::NAMES, &user.name, &user.token)
            .await?
        {
            ClaimOutcome::Acquired => acquired.push(collections::NAMES),
            ClaimOutcome::Held => {}
            ClaimOutcome::Taken => {
                tracing::debug!(name = %user.name, "Name claim rejected");
                return Err(AppError::Conflict(format!(
                    "name '{}' is already taken",
                    user.name
                )));
            }
        }

        let Some(id) = user.id else {
            return self.insert_new(user.clone()).await;
        };

        let previous = self.find_by_id(id).await?;

        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .in_col(collections::USERS)
            .document_id(id.to_string())
            .object(user)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        // The user document is written; stale keys no longer block the save.
        if let Some(previous) = previous {
            let stale = [
                (collections::USERNAMES, &previous.username, &user.username),
                (collections::NAMES, &previous.name, &user.name),
            ];
            for (collection, old, new) in stale {
                if old != new {
                    if let Err(e) = self.release(collection, old, &user.token).await {
                        tracing::warn!(error = %e, collection, key = %old, "Failed to release stale claim");
                    }
                }
            }
        }

        Ok(user.clone())
    }
}

#[async_trait]
impl UserRepository for FirestoreDb {
    async fn find_all(&self) -> Result<Vec<User>> {
        self.get_client()?
            .fluent()
            .select()
            .from(collections::USERS)
            .order_by([("id", firestore::FirestoreQueryDirection::Ascending)])
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    async fn find_by_id(&self, id: u64) -> Result<Option<User>> {
        self.get_client()?
            .fluent()
            .select()
            .by_id_in(collections::USERS)
            .obj()
            .one(&id.to_string())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>> {
        self.find_one_by_field("username", username).await
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<User>> {
        self.find_one_by_field("name", name).await
    }

    async fn save(&self, user: User) -> Result<User> {
        let mut acquired = Vec::with_capacity(2);
        let result = self.save_claimed(&user, &mut acquired).await;
        if result.is_err() {
            self.rollback_claims(&user, &acquired).await;
        }
        result
    }
}
