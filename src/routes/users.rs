// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! User registration, lookup and profile edit routes.

use crate::error::Result;
use crate::models::user::format_birth_date;
use crate::models::{NewUser, User, UserChanges, UserStatus};
use crate::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;
use validator::Validate;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/users", get(list_users).post(create_user))
        .route("/users/{id}", get(get_user).put(edit_user))
}

/// Username + name pair used both to register and to log in.
#[derive(Debug, Deserialize, Validate)]
pub struct UserCredentialsRequest {
    #[validate(length(min = 1, max = 64))]
    pub username: String,
    #[validate(length(min = 1, max = 64))]
    pub name: String,
}

/// Public view of a user. Never carries the session token.
#[derive(Debug, Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct ProfileResponse {
    #[cfg_attr(feature = "binding-generation", ts(type = "number"))]
    pub id: u64,
    pub username: String,
    pub name: String,
    pub status: UserStatus,
    /// `YYYY-MM-DD`
    pub creation_date: String,
    /// `DD-MM-YYYY`
    pub birth_date: Option<String>,
}

impl From<&User> for ProfileResponse {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.unwrap_or_default(),
            username: user.username.clone(),
            name: user.name.clone(),
            status: user.status,
            creation_date: user.creation_date.to_string(),
            birth_date: user.birth_date.map(format_birth_date),
        }
    }
}

/// Profile plus the session token, returned to the account owner only.
#[derive(Debug, Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct SessionResponse {
    #[serde(flatten)]
    pub profile: ProfileResponse,
    pub token: String,
}

impl From<User> for SessionResponse {
    fn from(user: User) -> Self {
        Self {
            profile: ProfileResponse::from(&user),
            token: user.token,
        }
    }
}

async fn list_users(State(state): State<Arc<AppState>>) -> Result<Json<Vec<ProfileResponse>>> {
    let users = state.identity.list_users().await?;
    Ok(Json(users.iter().map(ProfileResponse::from).collect()))
}

async fn create_user(
    State(state): State<Arc<AppState>>,
    Json(body): Json<UserCredentialsRequest>,
) -> Result<(StatusCode, Json<SessionResponse>)> {
    body.validate()?;

    let user = state
        .identity
        .register(NewUser {
            username: body.username,
            name: body.name,
        })
        .await?;

    tracing::info!(
        user_id = ?user.id,
        username = %user.username,
        status = ?user.status,
        "User registered"
    );

    Ok((StatusCode::CREATED, Json(SessionResponse::from(user))))
}

async fn get_user(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
) -> Result<Json<ProfileResponse>> {
    let user = state.identity.get_user(id).await?;
    Ok(Json(ProfileResponse::from(&user)))
}

async fn edit_user(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
    Json(changes): Json<UserChanges>,
) -> Result<StatusCode> {
    changes.validate()?;

    let user = state.identity.get_user(id).await?;
    state.identity.edit_profile(user, changes).await?;

    tracing::debug!(user_id = id, "Profile updated");
    Ok(StatusCode::NO_CONTENT)
}
