// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! In-process user store.
//!
//! Usernames and names are indexed in their own maps. A write claims its
//! keys through the map entry API before the record is stored, so two
//! concurrent saves can never both own the same username or name.

use super::UserRepository;
use crate::error::{AppError, Result};
use crate::models::User;
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Outcome of claiming an index key for a user id.
#[derive(Debug, PartialEq, Eq)]
enum Claim {
    /// Key was free and now belongs to the id
    Acquired,
    /// Key already belonged to the id
    Held,
    /// Key belongs to someone else
    Taken,
}

/// In-memory user repository. Clones share the same storage.
#[derive(Clone)]
pub struct MemoryDb {
    inner: Arc<Inner>,
}

struct Inner {
    users: DashMap<u64, User>,
    usernames: DashMap<String, u64>,
    names: DashMap<String, u64>,
    next_id: AtomicU64,
}

impl Default for MemoryDb {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryDb {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                users: DashMap::new(),
                usernames: DashMap::new(),
                names: DashMap::new(),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// Number of stored users.
    pub fn len(&self) -> usize {
        self.inner.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.users.is_empty()
    }

    fn claim(index: &DashMap<String, u64>, key: &str, id: u64) -> Claim {
        match index.entry(key.to_string()) {
            Entry::Occupied(owner) if *owner.get() == id => Claim::Held,
            Entry::Occupied(_) => Claim::Taken,
            Entry::Vacant(slot) => {
                slot.insert(id);
                Claim::Acquired
            }
        }
    }

    fn release(index: &DashMap<String, u64>, key: &str, id: u64) {
        index.remove_if(key, |_, owner| *owner == id);
    }

    fn lookup(&self, index: &DashMap<String, u64>, key: &str) -> Option<User> {
        let id = *index.get(key)?;
        self.inner.users.get(&id).map(|user| user.clone())
    }
}

#[async_trait]
impl UserRepository for MemoryDb {
    async fn find_all(&self) -> Result<Vec<User>> {
        let mut users: Vec<User> = self
            .inner
            .users
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        users.sort_by_key(|user| user.id);
        Ok(users)
    }

    async fn find_by_id(&self, id: u64) -> Result<Option<User>> {
        Ok(self.inner.users.get(&id).map(|user| user.clone()))
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>> {
        Ok(self.lookup(&self.inner.usernames, username))
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<User>> {
        Ok(self.lookup(&self.inner.names, name))
    }

    async fn save(&self, mut user: User) -> Result<User> {
        let id = match user.id {
            Some(id) => {
                // Keep fresh ids clear of explicitly supplied ones.
                self.inner.next_id.fetch_max(id.saturating_add(1), Ordering::SeqCst);
                id
            }
            None => self.inner.next_id.fetch_add(1, Ordering::SeqCst),
        };
        user.id = Some(id);

        let previous = self.inner.users.get(&id).map(|existing| existing.clone());

        let username_claim = Self::claim(&self.inner.usernames, &user.username, id);
        if username_claim == Claim::Taken {
            tracing::debug!(user_id = id, username = %user.username, "Username already claimed");
            return Err(AppError::Conflict(format!(
                "username '{}' is already taken",
                user.username
            )));
        }

        if Self::claim(&self.inner.names, &user.name, id) == Claim::Taken {
            if username_claim == Claim::Acquired {
                Self::release(&self.inner.usernames, &user.username, id);
            }
            tracing::debug!(user_id = id, name = %user.name, "Name already claimed");
            return Err(AppError::Conflict(format!(
                "name '{}' is already taken",
                user.name
            )));
        }

        // Drop claims on keys this user no longer carries.
        if let Some(previous) = previous {
            if previous.username != user.username {
                Self::release(&self.inner.usernames, &previous.username, id);
            }
            if previous.name != user.name {
                Self::release(&self.inner.names, &previous.name, id);
            }
        }

        self.inner.users.insert(id, user.clone());
        Ok(user)
    }
}
