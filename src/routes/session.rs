// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Login and logout routes (presence transitions).

use super::users::{SessionResponse, UserCredentialsRequest};
use crate::error::Result;
use crate::models::Credentials;
use crate::AppState;
use axum::{
    extract::State,
    http::StatusCode,
    routing::{post, put},
    Json, Router,
};
use std::sync::Arc;
use validator::Validate;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/login", post(login))
        .route("/logout", put(logout))
}

async fn login(
    State(state): State<Arc<AppState>>,
    Json(body): Json<UserCredentialsRequest>,
) -> Result<Json<SessionResponse>> {
    body.validate()?;

    let user = state
        .identity
        .authenticate(Credentials {
            username: body.username,
            name: body.name,
        })
        .await
        .inspect_err(|e| tracing::info!(error = %e, "Login rejected"))?;

    tracing::info!(user_id = ?user.id, username = %user.username, "User logged in");
    Ok(Json(SessionResponse::from(user)))
}

/// Body is the bare user id, e.g. `42`.
async fn logout(State(state): State<Arc<AppState>>, Json(id): Json<u64>) -> Result<StatusCode> {
    let user = state.identity.deauthenticate(id).await?;

    tracing::info!(user_id = id, status = ?user.status, "User logged out");
    Ok(StatusCode::NO_CONTENT)
}
