//! Inter-branch transfer endpoints.
//!
//! Lifecycle: create (pending) → dispatch (source stock leaves) →
//! receive (destination stock arrives). A pending or in-transit transfer
//! may be cancelled; cancelling an in-transit one returns the stock to
//! the source.
//!
//! Creating, dispatching and cancelling are superadmin operations; an
//! admin at the destination branch may receive.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use mostrador_core::authz::Action;
use mostrador_core::validation;
use mostrador_db::NewTransferLine;

use crate::auth::{require, resolve_branch, CurrentUser};
use crate::error::{ApiError, ApiResult};
use crate::handlers::ok;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/transfers", get(list).post(create))
        .route("/transfers/:id", get(get_one))
        .route("/transfers/:id/dispatch", post(dispatch))
        .route("/transfers/:id/receive", post(receive))
        .route("/transfers/:id/cancel", post(cancel))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TransferLineRequest {
    product_id: String,
    quantity: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateTransferRequest {
    destination_branch_id: String,
    reason: String,
    lines: Vec<TransferLineRequest>,
}

async fn create(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
    Json(payload): Json<CreateTransferRequest>,
) -> ApiResult<impl IntoResponse> {
    require(&current.user, Action::ManageTransfers)?;
    validation::validate_name("reason", &payload.reason)
        .map_err(|e| ApiError::validation(e.to_string()))?;

    let source = resolve_branch(&state, &current.user, None).await?;

    let lines: Vec<NewTransferLine> = payload
        .lines
        .into_iter()
        .map(|l| NewTransferLine {
            product_id: l.product_id,
            quantity: l.quantity,
        })
        .collect();

    let transfer = state
        .db
        .transfers()
        .create(
            &source,
            &payload.destination_branch_id,
            payload.reason.trim(),
            &current.user.id,
            &lines,
        )
        .await?;

    info!(code = %transfer.code, "Transfer requested");

    Ok(ok(transfer))
}

/// Moves a pending transfer in transit, decrementing source stock.
async fn dispatch(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    require(&current.user, Action::ManageTransfers)?;

    let transfer = state.db.transfers().dispatch(&id, &current.user.id).await?;

    info!(code = %transfer.code, "Transfer dispatched");

    Ok(ok(transfer))
}

/// Completes an in-transit transfer, incrementing destination stock.
async fn receive(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    require(&current.user, Action::ReceiveTransfer)?;

    let transfer = state.db.transfers().receive(&id, &current.user.id).await?;

    info!(code = %transfer.code, "Transfer received");

    Ok(ok(transfer))
}

async fn cancel(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    require(&current.user, Action::ManageTransfers)?;

    let transfer = state.db.transfers().cancel(&id, &current.user.id).await?;

    info!(code = %transfer.code, "Transfer cancelled");

    Ok(ok(transfer))
}

async fn get_one(
    State(state): State<Arc<AppState>>,
    _current: CurrentUser,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let transfer = state
        .db
        .transfers()
        .get_by_id(&id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("Transfer not found: {}", id)))?;
    let lines = state.db.transfers().get_lines(&transfer.id).await?;
    Ok(ok(json!({ "transfer": transfer, "lines": lines })))
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
    let transfers = state
        .db
        .transfers()
        .list_for_branch(&branch.id, limit)
        .await?;
    Ok(ok(transfers))
}
