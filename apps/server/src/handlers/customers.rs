//! Customer endpoints.
//!
//! Any role may search and register customers, but a cashier-created
//! customer always starts at the Normal tier with no discount. Tier and
//! discount changes go through the dedicated discount endpoint, which is
//! admin-only and audited.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::routing::{get, put};
use axum::{Json, Router};
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use mostrador_core::authz::Action;
use mostrador_core::types::{Customer, CustomerTier};
use mostrador_core::validation;

use crate::auth::{require, CurrentUser};
use crate::error::{ApiError, ApiResult};
use crate::handlers::ok;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/customers", get(search).post(create))
        .route("/customers/:id", get(get_one).put(update))
        .route("/customers/:id/discount", put(set_discount))
        .route("/customers/:id/discount-changes", get(list_discount_changes))
}

fn validation_err(e: mostrador_core::error::ValidationError) -> ApiError {
    ApiError::validation(e.to_string())
}

#[derive(Debug, Deserialize)]
struct SearchQuery {
    q: Option<String>,
    limit: Option<i64>,
}

async fn search(
    State(state): State<Arc<AppState>>,
    _current: CurrentUser,
    Query(query): Query<SearchQuery>,
) -> ApiResult<impl IntoResponse> {
    let q = query.q.clone().unwrap_or_default();
    validation::validate_search(&q).map_err(validation_err)?;

    let limit = query
        .limit
        .unwrap_or(20)
        .clamp(1, state.config.max_page_size);
    let customers = state.db.customers().search(&q, limit).await?;
    Ok(ok(customers))
}

async fn get_one(
    State(state): State<Arc<AppState>>,
    _current: CurrentUser,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let customer = state
        .db
        .customers()
        .get_by_id(&id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("Customer not found: {}", id)))?;
    Ok(ok(customer))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateCustomerRequest {
    code: String,
    first_name: String,
    last_name: String,
    phone: Option<String>,
    email: Option<String>,
    notes: Option<String>,
    tier: Option<CustomerTier>,
    discount_bps: Option<u32>,
}

async fn create(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
    Json(payload): Json<CreateCustomerRequest>,
) -> ApiResult<impl IntoResponse> {
    require(&current.user, Action::CreateCustomer)?;
    validation::validate_code("code", &payload.code).map_err(validation_err)?;
    validation::validate_name("firstName", &payload.first_name).map_err(validation_err)?;
    validation::validate_name("lastName", &payload.last_name).map_err(validation_err)?;
    if let Some(notes) = payload.notes.as_deref() {
        validation::validate_notes("notes", notes).map_err(validation_err)?;
    }

    // Only discount-assigners may create at a non-default tier.
    let (tier, discount_bps) = if current.user.role.allows(Action::AssignDiscount) {
        (
            payload.tier.unwrap_or(CustomerTier::Normal),
            payload.discount_bps.unwrap_or(0),
        )
    } else {
        if payload.tier.is_some() || payload.discount_bps.is_some() {
            return Err(ApiError::forbidden(
                "Only an admin may assign a tier or discount",
            ));
        }
        (CustomerTier::Normal, 0)
    };

    let now = Utc::now();
    let customer = Customer {
        id: Uuid::new_v4().to_string(),
        code: payload.code.trim().to_string(),
        first_name: payload.first_name.trim().to_string(),
        last_name: payload.last_name.trim().to_string(),
        phone: payload.phone,
        email: payload.email,
        tier,
        discount_bps,
        branch_id: current.user.branch_id.clone(),
        notes: payload.notes,
        active: true,
        created_at: now,
        updated_at: now,
    };

    state.db.customers().insert(&customer).await?;
    Ok(ok(customer))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateCustomerRequest {
    first_name: String,
    last_name: String,
    phone: Option<String>,
    email: Option<String>,
    notes: Option<String>,
    active: bool,
}

/// Updates profile fields only. Tier and discount never change here.
async fn update(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
    Path(id): Path<String>,
    Json(payload): Json<UpdateCustomerRequest>,
) -> ApiResult<impl IntoResponse> {
    require(&current.user, Action::ManageCatalog)?;
    validation::validate_name("firstName", &payload.first_name).map_err(validation_err)?;
    validation::validate_name("lastName", &payload.last_name).map_err(validation_err)?;
    if let Some(notes) = payload.notes.as_deref() {
        validation::validate_notes("notes", notes).map_err(validation_err)?;
    }

    let mut customer = state
        .db
        .customers()
        .get_by_id(&id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("Customer not found: {}", id)))?;

    customer.first_name = payload.first_name.trim().to_string();
    customer.last_name = payload.last_name.trim().to_string();
    customer.phone = payload.phone;
    customer.email = payload.email;
    customer.notes = payload.notes;
    customer.active = payload.active;

    state.db.customers().update_profile(&customer).await?;
    Ok(ok(customer))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SetDiscountRequest {
    tier: CustomerTier,
    discount_bps: u32,
    reason: Option<String>,
}

async fn set_discount(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
    Path(id): Path<String>,
    Json(payload): Json<SetDiscountRequest>,
) -> ApiResult<impl IntoResponse> {
    require(&current.user, Action::AssignDiscount)?;

    let customer = state
        .db
        .customers()
        .set_discount(
            &id,
            payload.tier,
            payload.discount_bps,
            &current.user.id,
            payload.reason.as_deref(),
        )
        .await?;
    Ok(ok(customer))
}

async fn list_discount_changes(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
    Path(id): Path<String>,
    Query(query): Query<SearchQuery>,
) -> ApiResult<impl IntoResponse> {
    require(&current.user, Action::AssignDiscount)?;

    let limit = query
        .limit
        .unwrap_or(50)
        .clamp(1, state.config.max_page_size);
    let changes = state.db.customers().list_discount_changes(&id, limit).await?;
    Ok(ok(changes))
}
