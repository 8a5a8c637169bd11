//! User administration endpoints.
//!
//! Admins manage the accounts of their own branch; only a superadmin may
//! grant the superadmin role or place a user at another branch. Password
//! hashes never leave the server; responses strip them.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::routing::{get, put};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use mostrador_core::authz::Action;
use mostrador_core::types::{Role, User};
use mostrador_core::validation;

use crate::auth::{hash_password, require, verify_password, CurrentUser};
use crate::error::{ApiError, ApiResult};
use crate::handlers::ok;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/users", get(list).post(create))
        .route("/users/:id", put(update))
        .route("/users/:id/password", put(set_password))
}

fn validation_err(e: mostrador_core::error::ValidationError) -> ApiError {
    ApiError::validation(e.to_string())
}

/// Serializable view of a user without the password hash.
fn user_view(user: &User) -> serde_json::Value {
    json!({
        "id": user.id,
        "username": user.username,
        "fullName": user.full_name,
        "role": user.role,
        "branchId": user.branch_id,
        "active": user.active,
        "createdAt": user.created_at,
    })
}

/// Ensures the caller may grant the role and place the user at the branch.
fn check_scope(caller: &User, role: Role, branch_id: Option<&str>) -> ApiResult<()> {
    if role == Role::Superadmin && !caller.role.is_superadmin() {
        return Err(ApiError::forbidden("Only a superadmin may grant superadmin"));
    }
    if !caller.role.is_superadmin() && branch_id != caller.branch_id.as_deref() {
        return Err(ApiError::forbidden("Users belong to the caller's branch"));
    }
    Ok(())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateUserRequest {
    username: String,
    full_name: String,
    password: String,
    role: Role,
    branch_id: Option<String>,
}

async fn create(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
    Json(payload): Json<CreateUserRequest>,
) -> ApiResult<impl IntoResponse> {
    require(&current.user, Action::ManageUsers)?;
    validation::validate_username(&payload.username).map_err(validation_err)?;
    validation::validate_name("fullName", &payload.full_name).map_err(validation_err)?;
    validation::validate_password(&payload.password).map_err(validation_err)?;
    check_scope(&current.user, payload.role, payload.branch_id.as_deref())?;

    let hash = hash_password(&payload.password)?;
    let user = state
        .db
        .users()
        .create(
            payload.username.trim(),
            payload.full_name.trim(),
            &hash,
            payload.role,
            payload.branch_id.as_deref(),
        )
        .await?;

    info!(username = %user.username, role = ?user.role, "User created");

    Ok(ok(user_view(&user)))
}

#[derive(Debug, Deserialize)]
struct ListQuery {
    #[serde(rename = "branchId")]
    branch_id: Option<String>,
}

async fn list(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
    Query(query): Query<ListQuery>,
) -> ApiResult<impl IntoResponse> {
    require(&current.user, Action::ManageUsers)?;

    // Non-superadmins see only their own branch.
    let branch_id = if current.user.role.is_superadmin() {
        query.branch_id
    } else {
        current.user.branch_id.clone()
    };

    let users = state.db.users().list(branch_id.as_deref()).await?;
    Ok(ok(users.iter().map(user_view).collect::<Vec<_>>()))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateUserRequest {
    full_name: String,
    role: Role,
    branch_id: Option<String>,
    active: bool,
}

async fn update(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
    Path(id): Path<String>,
    Json(payload): Json<UpdateUserRequest>,
) -> ApiResult<impl IntoResponse> {
    require(&current.user, Action::ManageUsers)?;
    validation::validate_name("fullName", &payload.full_name).map_err(validation_err)?;
    check_scope(&current.user, payload.role, payload.branch_id.as_deref())?;

    let mut user = state
        .db
        .users()
        .get_by_id(&id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("User not found: {}", id)))?;

    // The caller must already have scope over the user being edited.
    check_scope(&current.user, user.role, user.branch_id.as_deref())?;

    user.full_name = payload.full_name.trim().to_string();
    user.role = payload.role;
    user.branch_id = payload.branch_id;
    user.active = payload.active;

    state.db.users().update(&user).await?;
    Ok(ok(user_view(&user)))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SetPasswordRequest {
    password: String,
    /// Required when changing one's own password.
    current_password: Option<String>,
}

async fn set_password(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
    Path(id): Path<String>,
    Json(payload): Json<SetPasswordRequest>,
) -> ApiResult<impl IntoResponse> {
    validation::validate_password(&payload.password).map_err(validation_err)?;

    let target = state
        .db
        .users()
        .get_by_id(&id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("User not found: {}", id)))?;

    if target.id == current.user.id {
        // Self-service change requires the current password.
        let provided = payload.current_password.as_deref().unwrap_or("");
        if !verify_password(provided, &current.user.password_hash) {
            return Err(ApiError::unauthorized("Current password does not match"));
        }
    } else {
        require(&current.user, Action::ManageUsers)?;
        check_scope(&current.user, target.role, target.branch_id.as_deref())?;
    }

    let hash = hash_password(&payload.password)?;
    state.db.users().set_password_hash(&target.id, &hash).await?;

    info!(username = %target.username, "Password changed");

    Ok(ok(json!({ "updated": true })))
}
