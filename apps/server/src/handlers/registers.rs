//! Register session endpoints: open, close, verify.
//!
//! Any role operates their own register; closing is restricted to the
//! operator who opened it, and verification of a closed session is an
//! admin step.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use tracing::info;

use mostrador_core::authz::Action;
use mostrador_core::validation;

use crate::auth::{require, resolve_branch, CurrentUser};
use crate::error::{ApiError, ApiResult};
use crate::handlers::ok;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/registers", get(list))
        .route("/registers/open", post(open))
        .route("/registers/current", get(current_open))
        .route("/registers/:id", get(get_one))
        .route("/registers/:id/close", post(close))
        .route("/registers/:id/verify", post(verify))
}

async fn open(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
) -> ApiResult<impl IntoResponse> {
    require(&current.user, Action::OperateRegister)?;
    let branch = resolve_branch(&state, &current.user, None).await?;

    let session = state.db.registers().open(&branch, &current.user.id).await?;

    info!(folio = %session.folio, branch = %branch.code, "Register session opened");

    Ok(ok(session))
}

async fn current_open(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
) -> ApiResult<impl IntoResponse> {
    let branch = resolve_branch(&state, &current.user, None).await?;
    let session = state
        .db
        .registers()
        .current_open(&branch.id, &current.user.id)
        .await?;
    Ok(ok(session))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CloseRequest {
    counted_cash_cents: i64,
    notes: Option<String>,
}

/// Closes the session: settles attached sales and records the counted
/// drawer cash against the expected amount.
async fn close(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
    Path(id): Path<String>,
    Json(payload): Json<CloseRequest>,
) -> ApiResult<impl IntoResponse> {
    require(&current.user, Action::OperateRegister)?;
    validation::validate_non_negative_cents("countedCashCents", payload.counted_cash_cents)
        .map_err(|e| ApiError::validation(e.to_string()))?;
    if let Some(notes) = payload.notes.as_deref() {
        validation::validate_notes("notes", notes).map_err(|e| ApiError::validation(e.to_string()))?;
    }

    let session = state
        .db
        .registers()
        .close(
            &id,
            &current.user.id,
            payload.counted_cash_cents,
            payload.notes.as_deref(),
        )
        .await?;

    info!(
        folio = %session.folio,
        difference_cents = session.difference_cents,
        "Register session closed"
    );

    Ok(ok(session))
}

/// Marks a closed session as verified. Terminal state.
async fn verify(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    require(&current.user, Action::VerifyRegister)?;

    let session = state.db.registers().verify(&id, &current.user.id).await?;

    info!(folio = %session.folio, "Register session verified");

    Ok(ok(session))
}

async fn get_one(
    State(state): State<Arc<AppState>>,
    _current: CurrentUser,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let session = state
        .db
        .registers()
        .get_by_id(&id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("Register session not found: {}", id)))?;
    // The attached sales let the UI show the settlement detail.
    let sales = state.db.sales().list_for_session(&session.id).await?;
    Ok(ok(serde_json::json!({ "session": session, "sales": sales })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListQuery {
    branch_id: Option<String>,
    limit: Option<i64>,
}

async fn list(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
    Query(query): Query<ListQuery>,
) -> ApiResult<impl IntoResponse> {
    let branch = resolve_branch(&state, &current.user, query.branch_id.as_deref()).await?;
    let limit = query
        .limit
        .unwrap_or(50)
        .clamp(1, state.config.max_page_size);
    let sessions = state
        .db
        .registers()
        .list_for_branch(&branch.id, limit)
        .await?;
    Ok(ok(sessions))
}
