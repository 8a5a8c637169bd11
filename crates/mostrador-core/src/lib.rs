//! # mostrador-core: Pure Business Logic for Mostrador
//!
//! This crate is the **heart** of Mostrador. It contains all business logic
//! as pure functions with zero I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Mostrador Architecture                            │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     HTTP API (apps/server)                      │   │
//! │  │    login ──► cart ──► checkout ──► register close ──► reports   │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │              ★ mostrador-core (THIS CRATE) ★                    │   │
//! │  │                                                                 │   │
//! │  │   ┌────────┐ ┌────────┐ ┌────────┐ ┌────────┐ ┌────────────┐  │   │
//! │  │   │ types  │ │ money  │ │  cart  │ │ folio  │ │ settlement │  │   │
//! │  │   │ Sale   │ │ Money  │ │ Cart   │ │ V-..   │ │ totals by  │  │   │
//! │  │   │ Tier   │ │ bps    │ │ lines  │ │ C-..   │ │ pay method │  │   │
//! │  │   └────────┘ └────────┘ └────────┘ └────────┘ └────────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS            │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                 mostrador-db (Database Layer)                   │   │
//! │  │          SQLite queries, migrations, repositories               │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain types (Branch, Product, Sale, RegisterSession, ...)
//! - [`money`] - Money type with integer arithmetic (no floating point!)
//! - [`cart`] - Cart aggregate keyed by session token
//! - [`folio`] - Sequential folio derivation (per branch, per year)
//! - [`settlement`] - Register settlement arithmetic
//! - [`authz`] - Role policy (who may perform which action)
//! - [`error`] - Domain error types
//! - [`validation`] - Business rule validation
//!
//! ## Design Principles
//!
//! 1. **Pure Functions**: same input = same output
//! 2. **No I/O**: database, network, file system access is FORBIDDEN here
//! 3. **Integer Money**: all monetary values are in cents (i64)
//! 4. **Explicit Errors**: all errors are typed, never strings or panics

// =============================================================================
// Module Declarations
// =============================================================================

pub mod authz;
pub mod cart;
pub mod error;
pub mod folio;
pub mod money;
pub mod settlement;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use authz::Action;
pub use cart::{Cart, CartCustomer, CartLine, CartTotals};
pub use error::{CoreError, ValidationError};
pub use money::{DiscountRate, Money};
pub use settlement::SettlementTotals;
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Maximum distinct lines allowed in a single cart.
///
/// ## Business Reason
/// Prevents runaway carts and ensures reasonable transaction sizes.
pub const MAX_CART_LINES: usize = 100;

/// Maximum quantity of a single line in a cart.
///
/// ## Business Reason
/// Prevents accidental over-ordering (e.g., typing 1000 instead of 10).
pub const MAX_LINE_QUANTITY: i64 = 999;

/// Folio prefix for sales.
pub const FOLIO_PREFIX_SALE: &str = "V";

/// Folio prefix for register sessions.
pub const FOLIO_PREFIX_REGISTER: &str = "C";

/// Folio prefix for inter-branch transfers.
pub const FOLIO_PREFIX_TRANSFER: &str = "T";
