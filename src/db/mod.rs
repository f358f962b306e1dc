// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Database layer: the user repository contract and its backends.

pub mod firestore;
pub mod memory;

pub use firestore::FirestoreDb;
pub use memory::MemoryDb;

use crate::error::Result;
use crate::models::User;
use async_trait::async_trait;

/// Collection names as constants.
pub mod collections {
    pub const USERS: &str = "users";
    /// Create-only claim documents keyed by username
    pub const USERNAMES: &str = "usernames";
    /// Create-only claim documents keyed by display name
    pub const NAMES: &str = "names";
    /// Counter documents for id allocation
    pub const COUNTERS: &str = "counters";
}

/// Durable keyed storage of user records.
///
/// `save` is an upsert: a user without an id is new and gets the next id.
/// Implementations must reject with [`AppError::Conflict`](crate::error::AppError::Conflict)
/// any write that would leave two users sharing a username or a name.
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// All users in ascending id order.
    async fn find_all(&self) -> Result<Vec<User>>;

    async fn find_by_id(&self, id: u64) -> Result<Option<User>>;

    async fn find_by_username(&self, username: &str) -> Result<Option<User>>;

    async fn find_by_name(&self, name: &str) -> Result<Option<User>>;

    /// Insert or update a user, returning the stored record.
    async fn save(&self, user: User) -> Result<User>;

    async fn exists_by_username(&self, username: &str) -> Result<bool> {
        Ok(self.find_by_username(username).await?.is_some())
    }

    async fn exists_by_name(&self, name: &str) -> Result<bool> {
        Ok(self.find_by_name(name).await?.is_some())
    }
}
