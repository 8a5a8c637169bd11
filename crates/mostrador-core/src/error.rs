//! # Error Types
//!
//! Domain-specific error types for mostrador-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  mostrador-core errors (this file)                                     │
//! │  ├── CoreError        - Business rule violations                       │
//! │  └── ValidationError  - Input validation failures                      │
//! │                                                                         │
//! │  mostrador-db errors (separate crate)                                  │
//! │  └── DbError          - Database operation failures                    │
//! │                                                                         │
//! │  Server errors (apps/server)                                           │
//! │  └── ApiError         - What the client sees (serialized)              │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → DbError → ApiError → Client       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Design Principles
//! 1. Use `thiserror` for derive macros (not manual impl)
//! 2. Include context in error messages (code, folio, quantities)
//! 3. Errors are enum variants, never String

use thiserror::Error;

use crate::types::{CustomerTier, RegisterStatus, SaleStatus, TransferStatus};

// =============================================================================
// Core Error
// =============================================================================

/// Core business logic errors.
///
/// These represent business rule violations. They are caught at the API
/// boundary and translated to user-facing messages.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Stock item cannot be found or is inactive.
    #[error("Stock item not found: {0}")]
    StockItemNotFound(String),

    /// Insufficient stock to complete a sale line.
    ///
    /// ## When This Occurs
    /// - Adding more units to a cart than the branch has on hand
    /// - The posting transaction's guarded decrement finds the row changed
    ///   since the cart snapshot was taken
    #[error("Insufficient stock for {code}: available {available}, requested {requested}")]
    InsufficientStock {
        code: String,
        available: i64,
        requested: i64,
    },

    /// Sale not found.
    #[error("Sale not found: {0}")]
    SaleNotFound(String),

    /// Posting at a branch with sales disabled.
    #[error("Branch {branch_code} does not allow sales")]
    SalesNotAllowed { branch_code: String },

    /// Sale is not in a state that allows the requested operation.
    ///
    /// Cancelling an already-cancelled sale lands here: the second attempt
    /// is rejected, never re-applied.
    #[error("Sale {folio} is {status:?}, cannot perform operation")]
    InvalidSaleStatus { folio: String, status: SaleStatus },

    /// Register session is not in a state that allows the operation
    /// (closing a closed session, verifying an open one, ...).
    #[error("Register session {folio} is {status:?}, cannot perform operation")]
    InvalidRegisterStatus {
        folio: String,
        status: RegisterStatus,
    },

    /// An open register session already exists for this branch and operator.
    #[error("An open register session already exists for this operator: {folio}")]
    RegisterAlreadyOpen { folio: String },

    /// Operation on a register session by someone other than its operator.
    #[error("Only the operator who opened register session {folio} may close it")]
    NotSessionOperator { folio: String },

    /// Transfer is not in a state that allows the requested operation.
    #[error("Transfer {code} is {status:?}, cannot perform operation")]
    InvalidTransferStatus {
        code: String,
        status: TransferStatus,
    },

    /// Cart has exceeded maximum allowed lines.
    #[error("Cart cannot have more than {max} lines")]
    CartTooLarge { max: usize },

    /// Line quantity exceeds the maximum allowed.
    #[error("Quantity {requested} exceeds maximum allowed ({max})")]
    QuantityTooLarge { requested: i64, max: i64 },

    /// Cart is empty at checkout.
    #[error("Cart is empty")]
    EmptyCart,

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// These occur when user input doesn't meet requirements, before any
/// business logic runs.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Invalid format (invalid UUID, bad characters in a code, ...).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Discount assignment outside the customer tier's bounds.
    #[error(
        "discount {given_bps} bps is outside the {tier:?} tier bounds ({min_bps}-{max_bps} bps)"
    )]
    DiscountOutOfTierBounds {
        tier: CustomerTier,
        min_bps: u32,
        max_bps: u32,
        given_bps: u32,
    },

    /// Duplicate business identifier (code, username, folio).
    #[error("{field} '{value}' already exists")]
    Duplicate { field: String, value: String },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = CoreError::InsufficientStock {
            code: "ALIM-001".to_string(),
            available: 3,
            requested: 5,
        };
        assert_eq!(
            err.to_string(),
            "Insufficient stock for ALIM-001: available 3, requested 5"
        );
    }

    #[test]
    fn test_tier_bound_message() {
        let err = ValidationError::DiscountOutOfTierBounds {
            tier: CustomerTier::Frequent,
            min_bps: 100,
            max_bps: 1500,
            given_bps: 2000,
        };
        assert!(err.to_string().contains("Frequent"));
        assert!(err.to_string().contains("100-1500"));
    }

    #[test]
    fn test_validation_converts_to_core_error() {
        let validation_err = ValidationError::Required {
            field: "code".to_string(),
        };
        let core_err: CoreError = validation_err.into();
        assert!(matches!(core_err, CoreError::Validation(_)));
    }
}
