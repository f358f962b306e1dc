// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Presence-Accounts: user registration, login presence and profile edits
//!
//! This crate provides the account API: unique usernames and names,
//! login by username + name, an online/offline presence flag per user,
//! and partial profile updates.

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod routes;
pub mod services;

use config::Config;
use services::IdentityService;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub identity: IdentityService,
}
