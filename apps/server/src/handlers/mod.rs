//! # HTTP Handlers
//!
//! One module per resource; each exposes a `router()` merged into the API
//! router here. Handlers are thin: authenticate, authorize, validate, call
//! a repository, wrap the result in the response envelope.
//!
//! ## Response Envelope
//! ```json
//! { "success": true,  "data": { ... } }
//! { "success": false, "error": { "code": "...", "message": "..." } }
//! ```

use std::sync::Arc;

use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use serde_json::json;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

pub mod auth;
pub mod branches;
pub mod cart;
pub mod customers;
pub mod products;
pub mod registers;
pub mod sales;
pub mod transfers;
pub mod users;

/// Wraps payload data in the success envelope.
pub fn ok<T: Serialize>(data: T) -> Json<serde_json::Value> {
    Json(json!({ "success": true, "data": data }))
}

/// Builds the full application router.
pub fn app_router(state: Arc<AppState>) -> Router {
    let api = Router::new()
        .merge(auth::router())
        .merge(branches::router())
        .merge(products::router())
        .merge(customers::router())
        .merge(cart::router())
        .merge(sales::router())
        .merge(registers::router())
        .merge(transfers::router())
        .merge(users::router());

    Router::new()
        .route("/healthz", get(health))
        .nest("/api", api)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Liveness/readiness probe: verifies the database answers.
async fn health(
    axum::extract::State(state): axum::extract::State<Arc<AppState>>,
) -> Json<serde_json::Value> {
    let db_ok = state.db.health_check().await;
    Json(json!({ "status": if db_ok { "ok" } else { "degraded" }, "database": db_ok }))
}
