//! Branch administration endpoints. Creating and editing branches is
//! superadmin territory; per-branch settings are open to that branch's
//! admins.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::Deserialize;

use mostrador_core::authz::Action;
use mostrador_core::validation;

use crate::auth::{require, CurrentUser};
use crate::error::{ApiError, ApiResult};
use crate::handlers::ok;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/branches", get(list).post(create))
        .route("/branches/:id", put(update))
        .route("/branches/:id/settings", get(get_settings).put(update_settings))
        .route("/branches/:id/deactivate", post(deactivate))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateBranchRequest {
    code: String,
    name: String,
    address: Option<String>,
    phone: Option<String>,
    email: Option<String>,
}

async fn list(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
) -> ApiResult<impl IntoResponse> {
    let branches = if current.user.role.is_superadmin() {
        state.db.branches().list_all().await?
    } else {
        state.db.branches().list_active().await?
    };
    Ok(ok(branches))
}

async fn create(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
    Json(payload): Json<CreateBranchRequest>,
) -> ApiResult<impl IntoResponse> {
    require(&current.user, Action::ManageBranches)?;
    validation::validate_code("code", &payload.code).map_err(|e| ApiError::validation(e.to_string()))?;
    validation::validate_name("name", &payload.name).map_err(|e| ApiError::validation(e.to_string()))?;

    let branch = state
        .db
        .branches()
        .create(
            payload.code.trim(),
            payload.name.trim(),
            payload.address.as_deref(),
            payload.phone.as_deref(),
            payload.email.as_deref(),
        )
        .await?;

    Ok(ok(branch))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateBranchRequest {
    name: String,
    address: Option<String>,
    phone: Option<String>,
    email: Option<String>,
    active: bool,
    allow_sales: bool,
}

async fn update(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
    Path(id): Path<String>,
    Json(payload): Json<UpdateBranchRequest>,
) -> ApiResult<impl IntoResponse> {
    require(&current.user, Action::ManageBranches)?;
    validation::validate_name("name", &payload.name).map_err(|e| ApiError::validation(e.to_string()))?;

    let mut branch = state
        .db
        .branches()
        .get_by_id(&id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("Branch not found: {}", id)))?;

    branch.name = payload.name.trim().to_string();
    branch.address = payload.address;
    branch.phone = payload.phone;
    branch.email = payload.email;
    branch.active = payload.active;
    branch.allow_sales = payload.allow_sales;

    state.db.branches().update(&branch).await?;
    Ok(ok(branch))
}

async fn deactivate(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    require(&current.user, Action::ManageBranches)?;

    let mut branch = state
        .db
        .branches()
        .get_by_id(&id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("Branch not found: {}", id)))?;

    branch.active = false;
    branch.allow_sales = false;
    state.db.branches().update(&branch).await?;

    Ok(ok(branch))
}

async fn get_settings(
    State(state): State<Arc<AppState>>,
    _current: CurrentUser,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let settings = state.db.branches().settings(&id).await?;
    Ok(ok(settings))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateSettingsRequest {
    default_min_stock: i64,
    default_max_stock: i64,
    tax_bps: u32,
    show_stock: bool,
}

async fn update_settings(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
    Path(id): Path<String>,
    Json(payload): Json<UpdateSettingsRequest>,
) -> ApiResult<impl IntoResponse> {
    require(&current.user, Action::ManageCatalog)?;

    // Admins edit only their own branch's settings.
    if !current.user.role.is_superadmin() && current.user.branch_id.as_deref() != Some(id.as_str()) {
        return Err(ApiError::forbidden("Settings belong to a different branch"));
    }

    let mut settings = state.db.branches().settings(&id).await?;
    settings.default_min_stock = payload.default_min_stock;
    settings.default_max_stock = payload.default_max_stock;
    settings.tax_bps = payload.tax_bps;
    settings.show_stock = payload.show_stock;

    state.db.branches().update_settings(&settings).await?;
    Ok(ok(settings))
}
