//! # API Error Types
//!
//! The error type handlers return. Every failure serializes to the same
//! envelope the success path uses:
//!
//! ```json
//! { "success": false, "error": { "code": "insufficient_stock", "message": "..." } }
//! ```
//!
//! ## Mapping
//! ```text
//! ValidationError              → 422 validation
//! CoreError (business rules)   → 409 conflict-ish codes
//! DbError::NotFound            → 404 not_found
//! DbError::UniqueViolation     → 409 duplicate
//! everything else              → 500 internal (details logged, not leaked)
//! ```

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::json;
use tracing::error;

use mostrador_core::CoreError;
use mostrador_db::DbError;

/// Machine-readable error codes for the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    NotFound,
    Validation,
    Duplicate,
    InsufficientStock,
    InvalidState,
    Unauthorized,
    Forbidden,
    Internal,
}

/// An API-level error with a status, code and user-facing message.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: ErrorCode,
    pub message: String,
}

impl ApiError {
    pub fn not_found(message: impl Into<String>) -> Self {
        ApiError {
            status: StatusCode::NOT_FOUND,
            code: ErrorCode::NotFound,
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        ApiError {
            status: StatusCode::UNPROCESSABLE_ENTITY,
            code: ErrorCode::Validation,
            message: message.into(),
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        ApiError {
            status: StatusCode::UNAUTHORIZED,
            code: ErrorCode::Unauthorized,
            message: message.into(),
        }
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        ApiError {
            status: StatusCode::FORBIDDEN,
            code: ErrorCode::Forbidden,
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        ApiError {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            code: ErrorCode::Internal,
            message: message.into(),
        }
    }

    fn conflict(code: ErrorCode, message: impl Into<String>) -> Self {
        ApiError {
            status: StatusCode::CONFLICT,
            code,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "success": false,
            "error": {
                "code": self.code,
                "message": self.message,
            }
        }));
        (self.status, body).into_response()
    }
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        match &err {
            CoreError::Validation(_) => ApiError::validation(err.to_string()),
            CoreError::InsufficientStock { .. } => {
                ApiError::conflict(ErrorCode::InsufficientStock, err.to_string())
            }
            CoreError::StockItemNotFound(_) | CoreError::SaleNotFound(_) => {
                ApiError::not_found(err.to_string())
            }
            CoreError::EmptyCart | CoreError::CartTooLarge { .. } | CoreError::QuantityTooLarge { .. } => {
                ApiError::validation(err.to_string())
            }
            _ => ApiError::conflict(ErrorCode::InvalidState, err.to_string()),
        }
    }
}

impl From<DbError> for ApiError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound { .. } => ApiError::not_found(err.to_string()),
            DbError::UniqueViolation { .. } => {
                ApiError::conflict(ErrorCode::Duplicate, err.to_string())
            }
            DbError::Core(core) => core.into(),
            other => {
                // Storage details stay in the logs.
                error!(error = %other, "Database error");
                ApiError::internal("Internal server error")
            }
        }
    }
}

/// Result type for handlers.
pub type ApiResult<T> = Result<T, ApiError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insufficient_stock_maps_to_conflict() {
        let api: ApiError = DbError::Core(CoreError::InsufficientStock {
            code: "ALIM-001".to_string(),
            available: 1,
            requested: 2,
        })
        .into();

        assert_eq!(api.status, StatusCode::CONFLICT);
        assert_eq!(api.code, ErrorCode::InsufficientStock);
    }

    #[test]
    fn test_internal_errors_do_not_leak() {
        let api: ApiError = DbError::QueryFailed("secret table detail".to_string()).into();
        assert_eq!(api.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!api.message.contains("secret"));
    }

    #[test]
    fn test_validation_maps_to_422() {
        let api: ApiError = CoreError::EmptyCart.into();
        assert_eq!(api.status, StatusCode::UNPROCESSABLE_ENTITY);
    }
}
