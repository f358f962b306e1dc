// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Account registration, login/logout presence transitions and profile edits.
//!
//! Uniqueness checks here are best-effort existence queries. The repository
//! enforces the same constraints at write time, which closes the window
//! between check and save when two requests race.

use crate::db::UserRepository;
use crate::error::{AppError, Result};
use crate::models::user::parse_birth_date;
use crate::models::{Credentials, NewUser, User, UserChanges, UserStatus};
use std::sync::Arc;

const TAKEN_MESSAGE: &str = "already taken. Therefore, the user could not be created!";

/// Identity service over a user repository.
#[derive(Clone)]
pub struct IdentityService {
    repo: Arc<dyn UserRepository>,
}

impl IdentityService {
    pub fn new(repo: Arc<dyn UserRepository>) -> Self {
        Self { repo }
    }

    /// All users in repository order.
    pub async fn list_users(&self) -> Result<Vec<User>> {
        self.repo.find_all().await
    }

    pub async fn get_user(&self, id: u64) -> Result<User> {
        self.repo
            .find_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User {} does not exist", id)))
    }

    /// Create an account that starts out online with a fresh token.
    pub async fn register(&self, candidate: NewUser) -> Result<User> {
        let username_taken = self.repo.exists_by_username(&candidate.username).await?;
        let name_taken = self.repo.exists_by_name(&candidate.name).await?;

        let taken = match (username_taken, name_taken) {
            (true, true) => Some("username and the name provided are"),
            (true, false) => Some("username provided is"),
            (false, true) => Some("name provided is"),
            (false, false) => None,
        };
        if let Some(what) = taken {
            return Err(AppError::Conflict(format!("The {} {}", what, TAKEN_MESSAGE)));
        }

        let user = User {
            id: None,
            username: candidate.username,
            name: candidate.name,
            token: uuid::Uuid::new_v4().to_string(),
            status: UserStatus::Online,
            creation_date: chrono::Utc::now().date_naive(),
            birth_date: None,
        };

        self.repo.save(user).await
    }

    /// Log a user in. The stored name must match exactly.
    pub async fn authenticate(&self, credentials: Credentials) -> Result<User> {
        let mut user = self
            .repo
            .find_by_username(&credentials.username)
            .await?
            .ok_or_else(|| {
                AppError::NotFound("The user with the given username does not exist".to_string())
            })?;

        if user.name != credentials.name {
            return Err(AppError::Unauthorized("The name is incorrect".to_string()));
        }

        user.status = UserStatus::Online;
        self.repo.save(user).await
    }

    /// Log a user out. Logging out an offline user is a no-op transition.
    pub async fn deauthenticate(&self, id: u64) -> Result<User> {
        let mut user = self.get_user(id).await?;
        user.status = UserStatus::Offline;
        self.repo.save(user).await
    }

    /// Apply a partial profile update to an already-resolved user.
    ///
    /// Every requested change is validated before any is applied, so a
    /// failure leaves the stored record untouched. Nothing is written when
    /// the changes match the current values.
    pub async fn edit_profile(&self, user: User, changes: UserChanges) -> Result<()> {
        let birth_date = changes
            .birth_date
            .as_deref()
            .map(|raw| {
                parse_birth_date(raw).map_err(|_| {
                    AppError::InvalidArgument(format!(
                        "'{}' is not a valid birth date, expected DD-MM-YYYY",
                        raw
                    ))
                })
            })
            .transpose()?;

        let username = changes
            .requested_username()
            .filter(|requested| *requested != user.username);
        if let Some(requested) = username {
            if self.repo.exists_by_username(requested).await? {
                return Err(AppError::Conflict(
                    "The username provided is not unique. Please choose a different username!"
                        .to_string(),
                ));
            }
        }

        let mut updated = user.clone();
        if let Some(requested) = username {
            updated.username = requested.to_string();
        }
        if birth_date.is_some() {
            updated.birth_date = birth_date;
        }

        if updated != user {
            self.repo.save(updated).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryDb;
    use chrono::NaiveDate;

    fn service() -> (IdentityService, MemoryDb) {
        let db = MemoryDb::new();
        (IdentityService::new(Arc::new(db.clone())), db)
    }

    fn new_user(username: &str, name: &str) -> NewUser {
        NewUser {
            username: username.to_string(),
            name: name.to_string(),
        }
    }

    #[tokio::test]
    async fn test_register_assigns_generated_fields() {
        let (service, _) = service();
        let before = chrono::Utc::now().date_naive();
        let user = service.register(new_user("alice", "Alice A")).await.unwrap();
        let after = chrono::Utc::now().date_naive();

        assert!(user.id.is_some());
        assert_eq!(user.status, UserStatus::Online);
        assert!(!user.token.is_empty());
        assert!(user.creation_date >= before && user.creation_date <= after);
        assert_eq!(user.birth_date, None);
    }

    #[tokio::test]
    async fn test_register_tokens_are_distinct() {
        let (service, _) = service();
        let a = service.register(new_user("a", "A")).await.unwrap();
        let b = service.register(new_user("b", "B")).await.unwrap();
        assert_ne!(a.token, b.token);
    }

    #[tokio::test]
    async fn test_register_conflict_messages() {
        let (service, _) = service();
        service.register(new_user("alice", "Alice A")).await.unwrap();

        let cases = [
            (new_user("alice", "Alice A"), "username and the name"),
            (new_user("alice", "Other"), "The username provided is"),
            (new_user("other", "Alice A"), "The name provided is"),
        ];
        for (candidate, expected) in cases {
            match service.register(candidate).await {
                Err(AppError::Conflict(msg)) => assert!(msg.contains(expected), "{}", msg),
                other => panic!("expected conflict, got {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn test_authenticate_sets_online() {
        let (service, db) = service();
        let user = service.register(new_user("alice", "Alice A")).await.unwrap();
        service.deauthenticate(user.id.unwrap()).await.unwrap();

        let creds = Credentials {
            username: "alice".to_string(),
            name: "Alice A".to_string(),
        };
        let logged_in = service.authenticate(creds).await.unwrap();
        assert_eq!(logged_in.status, UserStatus::Online);

        let stored = db.find_by_id(user.id.unwrap()).await.unwrap().unwrap();
        assert_eq!(stored.status, UserStatus::Online);
    }

    #[tokio::test]
    async fn test_authenticate_name_is_case_sensitive() {
        let (service, _) = service();
        service.register(new_user("alice", "Alice A")).await.unwrap();

        let creds = Credentials {
            username: "alice".to_string(),
            name: "alice a".to_string(),
        };
        assert!(matches!(
            service.authenticate(creds).await,
            Err(AppError::Unauthorized(_))
        ));
    }

    #[tokio::test]
    async fn test_edit_profile_applies_present_fields_only() {
        let (service, db) = service();
        let user = service.register(new_user("alice", "Alice A")).await.unwrap();
        let id = user.id.unwrap();

        let changes = UserChanges {
            username: None,
            birth_date: Some("01-04-1990".to_string()),
        };
        service.edit_profile(user, changes).await.unwrap();

        let stored = db.find_by_id(id).await.unwrap().unwrap();
        assert_eq!(stored.username, "alice");
        assert_eq!(
            stored.birth_date,
            Some(NaiveDate::from_ymd_opt(1990, 4, 1).unwrap())
        );
    }

    #[tokio::test]
    async fn test_edit_profile_keeping_own_username_is_allowed() {
        let (service, db) = service();
        let user = service.register(new_user("alice", "Alice A")).await.unwrap();
        let id = user.id.unwrap();

        let changes = UserChanges {
            username: Some("alice".to_string()),
            birth_date: None,
        };
        service.edit_profile(user, changes).await.unwrap();
        assert_eq!(db.find_by_id(id).await.unwrap().unwrap().username, "alice");
    }

    #[tokio::test]
    async fn test_edit_profile_invalid_date_blocks_username_change() {
        let (service, db) = service();
        let user = service.register(new_user("alice", "Alice A")).await.unwrap();
        let id = user.id.unwrap();

        let changes = UserChanges {
            username: Some("alicia".to_string()),
            birth_date: Some("31-02-1999".to_string()),
        };
        assert!(matches!(
            service.edit_profile(user, changes).await,
            Err(AppError::InvalidArgument(_))
        ));
        assert_eq!(db.find_by_id(id).await.unwrap().unwrap().username, "alice");
    }
}
