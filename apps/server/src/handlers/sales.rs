//! Sale endpoints: checkout, lookup and cancellation.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use mostrador_core::authz::Action;
use mostrador_core::types::PaymentMethod;
use mostrador_core::validation;

use crate::auth::{require, resolve_branch, CurrentUser};
use crate::error::{ApiError, ApiResult};
use crate::handlers::ok;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/sales", get(list).post(checkout))
        .route("/sales/:id", get(get_one))
        .route("/sales/:id/cancel", post(cancel))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CheckoutRequest {
    payment_method: PaymentMethod,
    #[serde(default)]
    cash_received_cents: i64,
    notes: Option<String>,
}

/// Posts the caller's cart as a sale.
///
/// The cart is cleared only after the transaction commits; a failed
/// checkout (insufficient stock, closed branch) leaves it intact so the
/// cashier can correct it.
async fn checkout(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
    Json(payload): Json<CheckoutRequest>,
) -> ApiResult<impl IntoResponse> {
    require(&current.user, Action::Sell)?;
    validation::validate_non_negative_cents("cashReceivedCents", payload.cash_received_cents)
        .map_err(|e| ApiError::validation(e.to_string()))?;
    if let Some(notes) = payload.notes.as_deref() {
        validation::validate_notes("notes", notes).map_err(|e| ApiError::validation(e.to_string()))?;
    }

    let branch = resolve_branch(&state, &current.user, None).await?;

    // Snapshot the cart; the store is never locked across the transaction.
    let cart = state.carts.with_cart(&current.token, |c| c.clone());

    if payload.payment_method.settles_as_cash()
        && payload.cash_received_cents < cart.total_cents()
    {
        return Err(ApiError::validation(format!(
            "Cash received {} is less than the total {}",
            payload.cash_received_cents,
            cart.total_cents()
        )));
    }

    let sale = state
        .db
        .sales()
        .post_sale(mostrador_db::NewSale {
            cart: &cart,
            branch: &branch,
            user_id: &current.user.id,
            payment_method: payload.payment_method,
            cash_received_cents: payload.cash_received_cents,
            notes: payload.notes.as_deref(),
        })
        .await?;

    state.carts.remove(&current.token);

    info!(folio = %sale.folio, total_cents = sale.total_cents, "Sale posted");

    let lines = state.db.sales().get_lines(&sale.id).await?;
    Ok(ok(json!({ "sale": sale, "lines": lines })))
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
    let sales = state.db.sales().list_for_branch(&branch.id, limit).await?;
    Ok(ok(sales))
}

async fn get_one(
    State(state): State<Arc<AppState>>,
    _current: CurrentUser,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let sale = state
        .db
        .sales()
        .get_by_id(&id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("Sale not found: {}", id)))?;
    let lines = state.db.sales().get_lines(&sale.id).await?;
    Ok(ok(json!({ "sale": sale, "lines": lines })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CancelRequest {
    reason: String,
}

/// Cancels a completed sale and restores its stock.
async fn cancel(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
    Path(id): Path<String>,
    Json(payload): Json<CancelRequest>,
) -> ApiResult<impl IntoResponse> {
    require(&current.user, Action::CancelSale)?;
    validation::validate_name("reason", &payload.reason)
        .map_err(|e| ApiError::validation(e.to_string()))?;

    let sale = state
        .db
        .sales()
        .cancel_sale(&id, &current.user.id, payload.reason.trim())
        .await?;

    info!(folio = %sale.folio, "Sale cancelled");

    Ok(ok(sale))
}
