//! Login, logout and identity endpoints.

use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{Duration, Utc};
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use crate::auth::{generate_token, verify_password, CurrentUser};
use crate::error::{ApiError, ApiResult};
use crate::handlers::ok;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/auth/login", post(login))
        .route("/auth/logout", post(logout))
        .route("/auth/me", get(me))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoginRequest {
    username: String,
    password: String,
}

/// Verifies credentials and issues a session token.
///
/// A failed login is indistinguishable between "no such user" and "wrong
/// password".
async fn login(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<LoginRequest>,
) -> ApiResult<impl IntoResponse> {
    let invalid = || ApiError::unauthorized("Invalid username or password");

    let user = state
        .db
        .users()
        .get_by_username(&payload.username)
        .await?
        .filter(|u| u.active)
        .ok_or_else(invalid)?;

    if !verify_password(&payload.password, &user.password_hash) {
        return Err(invalid());
    }

    let token = generate_token();
    let expires_at = Utc::now() + Duration::seconds(state.config.session_ttl_secs);
    state
        .db
        .users()
        .insert_session(&token, &user.id, expires_at)
        .await?;

    info!(username = %user.username, "User logged in");

    Ok(ok(json!({
        "token": token,
        "expiresAt": expires_at,
        "user": user,
    })))
}

/// Deletes the caller's session and cart.
async fn logout(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
) -> ApiResult<impl IntoResponse> {
    state.db.users().delete_session(&current.token).await?;
    state.carts.remove(&current.token);

    info!(username = %current.user.username, "User logged out");

    Ok(ok(json!({ "loggedOut": true })))
}

/// Returns the authenticated user.
async fn me(current: CurrentUser) -> impl IntoResponse {
    ok(current.user)
}
