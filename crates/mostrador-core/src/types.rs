//! # Domain Types
//!
//! Core domain types used throughout Mostrador.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌───────────────┐   ┌───────────────┐   ┌───────────────────┐         │
//! │  │    Branch     │   │   Product     │   │    StockItem      │         │
//! │  │  code, name   │──►│  code, name   │──►│ product × branch  │         │
//! │  │  allow_sales  │   │  category,    │   │ price, quantity,  │         │
//! │  └───────────────┘   │  supplier     │   │ min/max           │         │
//! │                      └───────────────┘   └─────────┬─────────┘         │
//! │                                                    │                    │
//! │  ┌───────────────┐   ┌───────────────┐   ┌─────────▼─────────┐         │
//! │  │   Customer    │   │     Sale      │   │ InventoryMovement │         │
//! │  │ tier + bps    │──►│ folio, totals │──►│ append-only audit │         │
//! │  └───────────────┘   │ + SaleLine    │   └───────────────────┘         │
//! │                      └───────┬───────┘                                  │
//! │                              │ attached to                              │
//! │                      ┌───────▼───────┐                                  │
//! │                      │RegisterSession│  open → closed → verified        │
//! │                      └───────────────┘                                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Dual-Key Identity Pattern
//! Every entity has:
//! - `id`: UUID v4 - immutable, used for database relations
//! - Business ID (code, folio, username) - human-readable, unique

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::money::{DiscountRate, Money};

// =============================================================================
// Roles
// =============================================================================

/// User role. A closed enum: the authorization policy in [`crate::authz`]
/// is a total function over these three values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Full access, including branch and transfer administration.
    Superadmin,
    /// Branch administration: catalog, customers, register verification.
    Admin,
    /// Till operation: carts, sales, own register sessions.
    Cashier,
}

impl Role {
    /// Admin or above.
    #[inline]
    pub const fn is_admin(&self) -> bool {
        matches!(self, Role::Admin | Role::Superadmin)
    }

    #[inline]
    pub const fn is_superadmin(&self) -> bool {
        matches!(self, Role::Superadmin)
    }
}

// =============================================================================
// Branches
// =============================================================================

/// A retail branch (store location).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Branch {
    pub id: String,
    /// Business code, unique. Embedded in folios ("V-{code}-...").
    pub code: String,
    pub name: String,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    /// Soft-delete flag.
    pub active: bool,
    /// Whether sales may be posted at this branch.
    pub allow_sales: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Per-branch configuration row (one per branch).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct BranchSettings {
    pub branch_id: String,
    /// Default minimum stock threshold applied to new stock items.
    pub default_min_stock: i64,
    /// Default maximum stock threshold applied to new stock items.
    pub default_max_stock: i64,
    /// Displayed tax percentage in basis points (informational).
    pub tax_bps: u32,
    /// Whether the sale screens expose on-hand quantities.
    pub show_stock: bool,
    pub updated_at: DateTime<Utc>,
}

// =============================================================================
// Catalog
// =============================================================================

/// Product category (flat; parent link from the legacy data kept as optional).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Category {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub parent_id: Option<String>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

/// Supplier record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Supplier {
    pub id: String,
    pub name: String,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub contact: Option<String>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

/// Unit of measure ("pieza", "kg", ...).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Unit {
    pub id: String,
    pub name: String,
    pub abbreviation: String,
}

/// A product in the catalog. Pricing and stock live per-branch in
/// [`StockItem`]; the product row carries identity and classification.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Product {
    pub id: String,
    /// Business code, unique across the catalog.
    pub code: String,
    pub name: String,
    pub description: Option<String>,
    pub category_id: Option<String>,
    pub supplier_id: Option<String>,
    pub unit_id: Option<String>,
    /// Average acquisition cost in cents (for margin reporting).
    pub average_cost_cents: i64,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// =============================================================================
// Stock
// =============================================================================

/// Qualitative stock level relative to the item's thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StockState {
    Low,
    Normal,
    High,
}

/// Product × branch stock row: the sellable unit. Mutated by every sale
/// line, cancellation, adjustment and transfer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct StockItem {
    pub id: String,
    pub product_id: String,
    pub branch_id: String,
    /// Selling price in cents at this branch.
    pub price_cents: i64,
    /// Quantity on hand.
    pub quantity: i64,
    pub min_quantity: i64,
    pub max_quantity: i64,
    pub active: bool,
    pub updated_at: DateTime<Utc>,
}

impl StockItem {
    /// Returns the price as Money.
    #[inline]
    pub fn price(&self) -> Money {
        Money::from_cents(self.price_cents)
    }

    /// Stock level relative to the min/max thresholds.
    pub fn stock_state(&self) -> StockState {
        if self.quantity <= self.min_quantity {
            StockState::Low
        } else if self.quantity >= self.max_quantity {
            StockState::High
        } else {
            StockState::Normal
        }
    }

    /// Whether `requested` units can currently be sold.
    #[inline]
    pub fn can_sell(&self, requested: i64) -> bool {
        self.active && self.quantity >= requested
    }
}

/// Inventory movement kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "snake_case")]
pub enum MovementKind {
    /// Stock added (purchase receipt, sale cancellation, transfer receipt).
    Inbound,
    /// Stock removed (sale).
    Outbound,
    /// Manual correction.
    Adjustment,
    /// Inter-branch transfer leg.
    Transfer,
}

/// Append-only audit row written alongside every stock mutation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct InventoryMovement {
    pub id: String,
    pub stock_item_id: String,
    pub kind: MovementKind,
    pub quantity: i64,
    /// On-hand quantity before the mutation.
    pub quantity_before: i64,
    /// On-hand quantity after the mutation.
    pub quantity_after: i64,
    pub reason: String,
    pub user_id: String,
    /// Cross-reference, e.g. "VENTA-V-CEN-2026-000001".
    pub reference: Option<String>,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Customers
// =============================================================================

/// Customer classification bounding the allowed discount percentage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "snake_case")]
pub enum CustomerTier {
    /// No discount.
    Normal,
    /// 1% to 15%.
    Frequent,
    /// 16% to 50%.
    Premium,
}

impl CustomerTier {
    /// Inclusive discount bounds for this tier, in basis points.
    pub const fn bounds_bps(&self) -> (u32, u32) {
        match self {
            CustomerTier::Normal => (0, 0),
            CustomerTier::Frequent => (100, 1500),
            CustomerTier::Premium => (1600, 5000),
        }
    }

    /// Validates a discount against this tier's bounds.
    ///
    /// Out-of-bound input is rejected; callers must not persist anything
    /// when this fails.
    pub fn validate_discount(&self, bps: u32) -> Result<(), ValidationError> {
        let (min, max) = self.bounds_bps();
        if bps < min || bps > max {
            return Err(ValidationError::DiscountOutOfTierBounds {
                tier: *self,
                min_bps: min,
                max_bps: max,
                given_bps: bps,
            });
        }
        Ok(())
    }
}

impl Default for CustomerTier {
    fn default() -> Self {
        CustomerTier::Normal
    }
}

/// Customer record with a tiered discount percentage.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Customer {
    pub id: String,
    /// Business code, unique.
    pub code: String,
    pub first_name: String,
    pub last_name: String,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub tier: CustomerTier,
    /// Discount in basis points; always within the tier's bounds.
    pub discount_bps: u32,
    /// Branch where the customer was registered.
    pub branch_id: Option<String>,
    pub notes: Option<String>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Customer {
    /// Full display name.
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    /// The customer's discount as a rate.
    #[inline]
    pub fn discount(&self) -> DiscountRate {
        DiscountRate::from_bps(self.discount_bps)
    }
}

/// Audit row appended on every tier/discount change.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct DiscountChange {
    pub id: String,
    pub customer_id: String,
    pub previous_tier: CustomerTier,
    pub new_tier: CustomerTier,
    pub previous_bps: u32,
    pub new_bps: u32,
    pub user_id: String,
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Sales
// =============================================================================

/// The status of a sale transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "snake_case")]
pub enum SaleStatus {
    /// Reserved for legacy imports; posting creates Completed directly.
    Pending,
    /// Paid and finalized; counted in register totals.
    Completed,
    /// Reversed; stock restored.
    Cancelled,
}

impl Default for SaleStatus {
    fn default() -> Self {
        SaleStatus::Completed
    }
}

/// Payment method for a sale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    Card,
    Transfer,
    /// Split tender; settles as cash in register totals.
    Mixed,
}

impl PaymentMethod {
    /// Whether this method contributes to the expected cash drawer amount.
    #[inline]
    pub const fn settles_as_cash(&self) -> bool {
        matches!(self, PaymentMethod::Cash | PaymentMethod::Mixed)
    }
}

/// A posted sale transaction (header).
///
/// Invariants: `total == subtotal - discount_total` and
/// `cash_change == max(0, cash_received - total)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Sale {
    pub id: String,
    pub branch_id: String,
    /// Operating cashier.
    pub user_id: String,
    pub customer_id: Option<String>,
    /// Human-readable reference "V-{branch}-{year}-{seq:06}", unique.
    pub folio: String,
    pub status: SaleStatus,
    pub subtotal_cents: i64,
    pub discount_cents: i64,
    /// Uniformly applied customer discount, in basis points.
    pub discount_bps: u32,
    pub total_cents: i64,
    pub payment_method: PaymentMethod,
    pub cash_received_cents: i64,
    pub cash_change_cents: i64,
    /// Register session the sale was attached to, if one was open.
    pub register_session_id: Option<String>,
    pub notes: Option<String>,
    pub cancel_reason: Option<String>,
    pub cancelled_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Sale {
    #[inline]
    pub fn subtotal(&self) -> Money {
        Money::from_cents(self.subtotal_cents)
    }

    #[inline]
    pub fn discount_total(&self) -> Money {
        Money::from_cents(self.discount_cents)
    }

    #[inline]
    pub fn total(&self) -> Money {
        Money::from_cents(self.total_cents)
    }
}

/// A line item of a sale.
/// Uses the snapshot pattern to freeze product data at time of sale.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct SaleLine {
    pub id: String,
    pub sale_id: String,
    pub stock_item_id: String,
    /// Product code at time of sale (frozen).
    pub code_snapshot: String,
    /// Product name at time of sale (frozen).
    pub name_snapshot: String,
    /// Quantity sold, always > 0.
    pub quantity: i64,
    /// List unit price in cents at time of sale (frozen).
    pub unit_price_cents: i64,
    /// Unit price after the customer discount.
    pub discounted_price_cents: i64,
    /// Per-unit discount amount.
    pub unit_discount_cents: i64,
    /// discounted_price × quantity.
    pub line_subtotal_cents: i64,
    pub created_at: DateTime<Utc>,
}

impl SaleLine {
    #[inline]
    pub fn line_subtotal(&self) -> Money {
        Money::from_cents(self.line_subtotal_cents)
    }
}

// =============================================================================
// Register Sessions
// =============================================================================

/// Register session state. Verified is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "snake_case")]
pub enum RegisterStatus {
    Open,
    Closed,
    Verified,
}

/// A till-reconciliation period ("corte de caja"): bounded by open/close
/// actions, aggregating the operator's attributed sales.
///
/// At most one Open session exists per (branch, operator); the storage layer
/// enforces this with a partial unique index.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct RegisterSession {
    pub id: String,
    pub branch_id: String,
    /// Operator who opened the session; only they may close it.
    pub user_id: String,
    /// "C-{branch}-{year}-{seq:06}", unique.
    pub folio: String,
    pub status: RegisterStatus,
    pub opened_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    /// Sum of completed attached sales.
    pub total_sales_cents: i64,
    /// Expected drawer cash (cash + mixed sales).
    pub expected_cash_cents: i64,
    /// Cash counted by the operator at close.
    pub counted_cash_cents: i64,
    pub total_card_cents: i64,
    pub total_transfer_cents: i64,
    pub total_discounts_cents: i64,
    /// counted − expected; zero until close.
    pub difference_cents: i64,
    pub notes: Option<String>,
    pub closed_by: Option<String>,
    pub verified_by: Option<String>,
}

impl RegisterSession {
    #[inline]
    pub fn is_open(&self) -> bool {
        self.status == RegisterStatus::Open
    }

    #[inline]
    pub fn difference(&self) -> Money {
        Money::from_cents(self.difference_cents)
    }
}

// =============================================================================
// Inter-Branch Transfers
// =============================================================================

/// Transfer lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum TransferStatus {
    Pending,
    InTransit,
    Completed,
    Cancelled,
}

/// An inter-branch stock transfer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Transfer {
    pub id: String,
    /// "T-{source branch}-{year}-{seq:06}", unique.
    pub code: String,
    pub source_branch_id: String,
    pub destination_branch_id: String,
    pub status: TransferStatus,
    pub reason: String,
    pub requested_by: String,
    pub sent_by: Option<String>,
    pub received_by: Option<String>,
    pub requested_at: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
    pub received_at: Option<DateTime<Utc>>,
}

/// A product line within a transfer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct TransferLine {
    pub id: String,
    pub transfer_id: String,
    pub product_id: String,
    pub requested_quantity: i64,
    pub sent_quantity: i64,
    pub received_quantity: i64,
}

// =============================================================================
// Users
// =============================================================================

/// System user. The password hash never leaves the db layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct User {
    pub id: String,
    pub username: String,
    pub full_name: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: Role,
    pub branch_id: Option<String>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_bounds() {
        assert!(CustomerTier::Normal.validate_discount(0).is_ok());
        assert!(CustomerTier::Normal.validate_discount(100).is_err());

        assert!(CustomerTier::Frequent.validate_discount(100).is_ok());
        assert!(CustomerTier::Frequent.validate_discount(1500).is_ok());
        assert!(CustomerTier::Frequent.validate_discount(0).is_err());
        assert!(CustomerTier::Frequent.validate_discount(1600).is_err());

        assert!(CustomerTier::Premium.validate_discount(1600).is_ok());
        assert!(CustomerTier::Premium.validate_discount(2000).is_ok());
        assert!(CustomerTier::Premium.validate_discount(5000).is_ok());
        assert!(CustomerTier::Premium.validate_discount(5100).is_err());
        assert!(CustomerTier::Premium.validate_discount(1500).is_err());
    }

    #[test]
    fn test_stock_state() {
        let mut item = StockItem {
            id: "s1".into(),
            product_id: "p1".into(),
            branch_id: "b1".into(),
            price_cents: 1000,
            quantity: 50,
            min_quantity: 5,
            max_quantity: 100,
            active: true,
            updated_at: Utc::now(),
        };
        assert_eq!(item.stock_state(), StockState::Normal);

        item.quantity = 5;
        assert_eq!(item.stock_state(), StockState::Low);

        item.quantity = 100;
        assert_eq!(item.stock_state(), StockState::High);
    }

    #[test]
    fn test_can_sell() {
        let item = StockItem {
            id: "s1".into(),
            product_id: "p1".into(),
            branch_id: "b1".into(),
            price_cents: 1000,
            quantity: 3,
            min_quantity: 0,
            max_quantity: 100,
            active: true,
            updated_at: Utc::now(),
        };
        assert!(item.can_sell(3));
        assert!(!item.can_sell(4));

        let inactive = StockItem { active: false, ..item };
        assert!(!inactive.can_sell(1));
    }

    #[test]
    fn test_payment_method_cash_settlement() {
        assert!(PaymentMethod::Cash.settles_as_cash());
        assert!(PaymentMethod::Mixed.settles_as_cash());
        assert!(!PaymentMethod::Card.settles_as_cash());
        assert!(!PaymentMethod::Transfer.settles_as_cash());
    }

    #[test]
    fn test_role_checks() {
        assert!(Role::Superadmin.is_admin());
        assert!(Role::Admin.is_admin());
        assert!(!Role::Cashier.is_admin());
        assert!(!Role::Admin.is_superadmin());
    }
}
