//! Catalog and stock endpoints.
//!
//! Products are global; stock items (price, on-hand, thresholds) are per
//! branch. Reads are open to every role so the sale screen can search;
//! writes require an admin.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use mostrador_core::authz::Action;
use mostrador_core::types::{Product, StockItem};
use mostrador_core::validation;

use crate::auth::{require, resolve_branch, CurrentUser};
use crate::error::{ApiError, ApiResult};
use crate::handlers::ok;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/products", get(search_products).post(create_product))
        .route("/products/:id", put(update_product))
        .route("/categories", get(list_categories).post(create_category))
        .route("/suppliers", get(list_suppliers).post(create_supplier))
        .route("/units", get(list_units).post(create_unit))
        .route("/stock", get(list_stock).post(create_stock_item))
        .route("/stock/low", get(list_low_stock))
        .route("/stock/:id", put(update_stock_item))
        .route("/stock/:id/receive", post(receive_stock))
        .route("/stock/:id/adjust", post(adjust_stock))
        .route("/stock/:id/movements", get(list_movements))
}

fn validation_err(e: mostrador_core::error::ValidationError) -> ApiError {
    ApiError::validation(e.to_string())
}

#[derive(Debug, Deserialize)]
struct SearchQuery {
    q: Option<String>,
    limit: Option<i64>,
    #[serde(rename = "branchId")]
    branch_id: Option<String>,
}

impl SearchQuery {
    fn limit(&self, max: i64) -> i64 {
        self.limit.unwrap_or(20).clamp(1, max)
    }
}

// =============================================================================
// Products
// =============================================================================

async fn search_products(
    State(state): State<Arc<AppState>>,
    _current: CurrentUser,
    Query(query): Query<SearchQuery>,
) -> ApiResult<impl IntoResponse> {
    let q = query.q.clone().unwrap_or_default();
    validation::validate_search(&q).map_err(validation_err)?;

    let products = state
        .db
        .products()
        .search_products(&q, query.limit(state.config.max_page_size))
        .await?;
    Ok(ok(products))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateProductRequest {
    code: String,
    name: String,
    description: Option<String>,
    category_id: Option<String>,
    supplier_id: Option<String>,
    unit_id: Option<String>,
    #[serde(default)]
    average_cost_cents: i64,
}

async fn create_product(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
    Json(payload): Json<CreateProductRequest>,
) -> ApiResult<impl IntoResponse> {
    require(&current.user, Action::ManageCatalog)?;
    validation::validate_code("code", &payload.code).map_err(validation_err)?;
    validation::validate_name("name", &payload.name).map_err(validation_err)?;
    validation::validate_non_negative_cents("averageCostCents", payload.average_cost_cents)
        .map_err(validation_err)?;

    let now = Utc::now();
    let product = Product {
        id: Uuid::new_v4().to_string(),
        code: payload.code.trim().to_string(),
        name: payload.name.trim().to_string(),
        description: payload.description,
        category_id: payload.category_id,
        supplier_id: payload.supplier_id,
        unit_id: payload.unit_id,
        average_cost_cents: payload.average_cost_cents,
        active: true,
        created_at: now,
        updated_at: now,
    };

    state.db.products().insert_product(&product).await?;
    Ok(ok(product))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateProductRequest {
    name: String,
    description: Option<String>,
    category_id: Option<String>,
    supplier_id: Option<String>,
    unit_id: Option<String>,
    average_cost_cents: i64,
    active: bool,
}

async fn update_product(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
    Path(id): Path<String>,
    Json(payload): Json<UpdateProductRequest>,
) -> ApiResult<impl IntoResponse> {
    require(&current.user, Action::ManageCatalog)?;
    validation::validate_name("name", &payload.name).map_err(validation_err)?;

    let mut product = state
        .db
        .products()
        .get_product(&id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("Product not found: {}", id)))?;

    product.name = payload.name.trim().to_string();
    product.description = payload.description;
    product.category_id = payload.category_id;
    product.supplier_id = payload.supplier_id;
    product.unit_id = payload.unit_id;
    product.average_cost_cents = payload.average_cost_cents;
    product.active = payload.active;

    state.db.products().update_product(&product).await?;
    Ok(ok(product))
}

// =============================================================================
// Categories / Suppliers / Units
// =============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateCategoryRequest {
    name: String,
    description: Option<String>,
    parent_id: Option<String>,
}

async fn list_categories(
    State(state): State<Arc<AppState>>,
    _current: CurrentUser,
) -> ApiResult<impl IntoResponse> {
    Ok(ok(state.db.products().list_categories().await?))
}

async fn create_category(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
    Json(payload): Json<CreateCategoryRequest>,
) -> ApiResult<impl IntoResponse> {
    require(&current.user, Action::ManageCatalog)?;
    validation::validate_name("name", &payload.name).map_err(validation_err)?;

    let category = state
        .db
        .products()
        .create_category(
            payload.name.trim(),
            payload.description.as_deref(),
            payload.parent_id.as_deref(),
        )
        .await?;
    Ok(ok(category))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateSupplierRequest {
    name: String,
    phone: Option<String>,
    email: Option<String>,
    contact: Option<String>,
}

async fn list_suppliers(
    State(state): State<Arc<AppState>>,
    _current: CurrentUser,
) -> ApiResult<impl IntoResponse> {
    Ok(ok(state.db.products().list_suppliers().await?))
}

async fn create_supplier(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
    Json(payload): Json<CreateSupplierRequest>,
) -> ApiResult<impl IntoResponse> {
    require(&current.user, Action::ManageCatalog)?;
    validation::validate_name("name", &payload.name).map_err(validation_err)?;

    let supplier = state
        .db
        .products()
        .create_supplier(
            payload.name.trim(),
            payload.phone.as_deref(),
            payload.email.as_deref(),
            payload.contact.as_deref(),
        )
        .await?;
    Ok(ok(supplier))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateUnitRequest {
    name: String,
    abbreviation: String,
}

async fn list_units(
    State(state): State<Arc<AppState>>,
    _current: CurrentUser,
) -> ApiResult<impl IntoResponse> {
    Ok(ok(state.db.products().list_units().await?))
}

async fn create_unit(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
    Json(payload): Json<CreateUnitRequest>,
) -> ApiResult<impl IntoResponse> {
    require(&current.user, Action::ManageCatalog)?;
    validation::validate_name("name", &payload.name).map_err(validation_err)?;

    let unit = state
        .db
        .products()
        .create_unit(payload.name.trim(), payload.abbreviation.trim())
        .await?;
    Ok(ok(unit))
}

// =============================================================================
// Stock
// =============================================================================

async fn list_stock(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
    Query(query): Query<SearchQuery>,
) -> ApiResult<impl IntoResponse> {
    let branch = resolve_branch(&state, &current.user, query.branch_id.as_deref()).await?;
    let items = state.db.products().list_stock_for_branch(&branch.id).await?;
    Ok(ok(items))
}

async fn list_low_stock(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
    Query(query): Query<SearchQuery>,
) -> ApiResult<impl IntoResponse> {
    let branch = resolve_branch(&state, &current.user, query.branch_id.as_deref()).await?;
    let items = state.db.products().list_low_stock(&branch.id).await?;
    Ok(ok(items))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateStockItemRequest {
    product_id: String,
    branch_id: Option<String>,
    price_cents: i64,
    min_quantity: Option<i64>,
    max_quantity: Option<i64>,
}

async fn create_stock_item(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
    Json(payload): Json<CreateStockItemRequest>,
) -> ApiResult<impl IntoResponse> {
    require(&current.user, Action::ManageCatalog)?;
    validation::validate_non_negative_cents("priceCents", payload.price_cents)
        .map_err(validation_err)?;

    let branch = resolve_branch(&state, &current.user, payload.branch_id.as_deref()).await?;
    // Thresholds default from the branch settings.
    let settings = state.db.branches().settings(&branch.id).await?;

    let item = StockItem {
        id: Uuid::new_v4().to_string(),
        product_id: payload.product_id,
        branch_id: branch.id,
        price_cents: payload.price_cents,
        quantity: 0,
        min_quantity: payload.min_quantity.unwrap_or(settings.default_min_stock),
        max_quantity: payload.max_quantity.unwrap_or(settings.default_max_stock),
        active: true,
        updated_at: Utc::now(),
    };

    state.db.products().create_stock_item(&item).await?;
    Ok(ok(item))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateStockItemRequest {
    price_cents: i64,
    min_quantity: i64,
    max_quantity: i64,
    active: bool,
}

async fn update_stock_item(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
    Path(id): Path<String>,
    Json(payload): Json<UpdateStockItemRequest>,
) -> ApiResult<impl IntoResponse> {
    require(&current.user, Action::ManageCatalog)?;
    validation::validate_non_negative_cents("priceCents", payload.price_cents)
        .map_err(validation_err)?;

    let mut item = state
        .db
        .products()
        .get_stock_item(&id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("Stock item not found: {}", id)))?;

    item.price_cents = payload.price_cents;
    item.min_quantity = payload.min_quantity;
    item.max_quantity = payload.max_quantity;
    item.active = payload.active;

    state.db.products().update_stock_item(&item).await?;
    Ok(ok(item))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReceiveStockRequest {
    quantity: i64,
    reference: Option<String>,
}

async fn receive_stock(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
    Path(id): Path<String>,
    Json(payload): Json<ReceiveStockRequest>,
) -> ApiResult<impl IntoResponse> {
    require(&current.user, Action::ManageCatalog)?;
    validation::validate_positive("quantity", payload.quantity).map_err(validation_err)?;

    let item = state
        .db
        .products()
        .receive_stock(&id, payload.quantity, &current.user.id, payload.reference.as_deref())
        .await?;
    Ok(ok(item))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AdjustStockRequest {
    delta: i64,
    reason: String,
}

async fn adjust_stock(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
    Path(id): Path<String>,
    Json(payload): Json<AdjustStockRequest>,
) -> ApiResult<impl IntoResponse> {
    require(&current.user, Action::ManageCatalog)?;
    validation::validate_name("reason", &payload.reason).map_err(validation_err)?;
    if payload.delta == 0 {
        return Err(ApiError::validation("delta must be non-zero"));
    }

    let item = state
        .db
        .products()
        .adjust_stock(&id, payload.delta, payload.reason.trim(), &current.user.id)
        .await?;
    Ok(ok(item))
}

async fn list_movements(
    State(state): State<Arc<AppState>>,
    _current: CurrentUser,
    Path(id): Path<String>,
    Query(query): Query<SearchQuery>,
) -> ApiResult<impl IntoResponse> {
    let movements = state
        .db
        .products()
        .list_movements(&id, query.limit(200))
        .await?;
    Ok(ok(movements))
}
