//! Cart endpoints.
//!
//! The cart is in-memory, keyed by the caller's session token. Database
//! lookups happen before the store is touched, so the cart mutex is never
//! held across an await.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;

use mostrador_core::authz::Action;
use mostrador_core::cart::{Cart, CartCustomer};

use crate::auth::{require, resolve_branch, CurrentUser};
use crate::error::{ApiError, ApiResult};
use crate::handlers::ok;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/cart", get(get_cart).delete(clear_cart))
        .route("/cart/lines", post(add_line))
        .route(
            "/cart/lines/:stock_item_id",
            put(update_line).delete(remove_line),
        )
        .route("/cart/customer", put(select_customer).delete(clear_customer))
}

fn cart_view(cart: &Cart) -> serde_json::Value {
    json!({ "cart": cart, "totals": cart.totals() })
}

async fn get_cart(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
) -> ApiResult<impl IntoResponse> {
    Ok(ok(state.carts.with_cart(&current.token, cart_view)))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AddLineRequest {
    stock_item_id: String,
    quantity: i64,
}

async fn add_line(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
    Json(payload): Json<AddLineRequest>,
) -> ApiResult<impl IntoResponse> {
    require(&current.user, Action::Sell)?;

    let item = state
        .db
        .products()
        .get_stock_item(&payload.stock_item_id)
        .await?
        .filter(|i| i.active)
        .ok_or_else(|| {
            ApiError::not_found(format!("Stock item not found: {}", payload.stock_item_id))
        })?;

    // A cashier sells only from their own branch's stock.
    let branch = resolve_branch(&state, &current.user, Some(&item.branch_id)).await?;
    if item.branch_id != branch.id {
        return Err(ApiError::forbidden("Stock item belongs to another branch"));
    }

    let product = state
        .db
        .products()
        .get_product(&item.product_id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("Product not found: {}", item.product_id)))?;

    let view = state.carts.with_cart_mut(&current.token, |cart| {
        cart.add_line(&item, &product.code, &product.name, payload.quantity)?;
        Ok::<_, ApiError>(cart_view(cart))
    })?;
    Ok(ok(view))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateLineRequest {
    quantity: i64,
}

async fn update_line(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
    Path(stock_item_id): Path<String>,
    Json(payload): Json<UpdateLineRequest>,
) -> ApiResult<impl IntoResponse> {
    require(&current.user, Action::Sell)?;

    let view = state.carts.with_cart_mut(&current.token, |cart| {
        cart.update_quantity(&stock_item_id, payload.quantity)?;
        Ok::<_, ApiError>(cart_view(cart))
    })?;
    Ok(ok(view))
}

async fn remove_line(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
    Path(stock_item_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    require(&current.user, Action::Sell)?;

    let view = state.carts.with_cart_mut(&current.token, |cart| {
        cart.remove_line(&stock_item_id)?;
        Ok::<_, ApiError>(cart_view(cart))
    })?;
    Ok(ok(view))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SelectCustomerRequest {
    customer_id: String,
}

/// Attaches a customer to the cart; their current tier discount applies to
/// the whole ticket at checkout.
async fn select_customer(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
    Json(payload): Json<SelectCustomerRequest>,
) -> ApiResult<impl IntoResponse> {
    let customer = state
        .db
        .customers()
        .get_by_id(&payload.customer_id)
        .await?
        .filter(|c| c.active)
        .ok_or_else(|| {
            ApiError::not_found(format!("Customer not found: {}", payload.customer_id))
        })?;

    let view = state.carts.with_cart_mut(&current.token, |cart| {
        cart.select_customer(CartCustomer {
            customer_id: customer.id.clone(),
            name: format!("{} {}", customer.first_name, customer.last_name),
            tier: customer.tier,
            discount_bps: customer.discount_bps,
        });
        cart_view(cart)
    });
    Ok(ok(view))
}

async fn clear_customer(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
) -> ApiResult<impl IntoResponse> {
    let view = state.carts.with_cart_mut(&current.token, |cart| {
        cart.clear_customer();
        cart_view(cart)
    });
    Ok(ok(view))
}

async fn clear_cart(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
) -> ApiResult<impl IntoResponse> {
    let view = state.carts.with_cart_mut(&current.token, |cart| {
        cart.clear();
        cart_view(cart)
    });
    Ok(ok(view))
}
