//! # Register Settlement
//!
//! Pure aggregation for closing a register session ("corte de caja").
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Settlement Math                                     │
//! │                                                                         │
//! │  completed sales attached to the session                                │
//! │        │                                                                │
//! │        ├── Cash ──────────┐                                             │
//! │        ├── Mixed ─────────┴──► expected_cash                            │
//! │        ├── Card ──────────────► total_card                              │
//! │        └── Transfer ──────────► total_transfer                          │
//! │                                                                         │
//! │  difference = counted_cash − expected_cash                              │
//! │    > 0  overage   (drawer has more than the system expects)             │
//! │    < 0  shortage                                                        │
//! │    = 0  exact                                                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Mixed payments settle as cash: the drawer received physical money for
//! them, so they count toward what the operator must hand over. Cancelled
//! sales never contribute.

use serde::{Deserialize, Serialize};

use crate::money::Money;
use crate::types::{Sale, SaleStatus};

/// Totals computed over the completed sales of one register session.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettlementTotals {
    /// Number of completed sales.
    pub sale_count: i64,
    /// Sum of sale totals across all payment methods.
    pub total_sales_cents: i64,
    /// Cash the drawer should contain (Cash + Mixed sales).
    pub expected_cash_cents: i64,
    /// Card sale totals.
    pub total_card_cents: i64,
    /// Bank-transfer sale totals.
    pub total_transfer_cents: i64,
    /// Sum of discounts granted.
    pub total_discounts_cents: i64,
}

impl SettlementTotals {
    /// Aggregates the sales attached to a session. Non-completed sales are
    /// skipped so a cancellation before close drops out of the totals.
    pub fn from_sales(sales: &[Sale]) -> Self {
        let mut totals = SettlementTotals::default();
        for sale in sales {
            if sale.status != SaleStatus::Completed {
                continue;
            }
            totals.sale_count += 1;
            totals.total_sales_cents += sale.total_cents;
            totals.total_discounts_cents += sale.discount_cents;
            if sale.payment_method.settles_as_cash() {
                totals.expected_cash_cents += sale.total_cents;
            } else {
                match sale.payment_method {
                    crate::types::PaymentMethod::Card => {
                        totals.total_card_cents += sale.total_cents
                    }
                    crate::types::PaymentMethod::Transfer => {
                        totals.total_transfer_cents += sale.total_cents
                    }
                    _ => {}
                }
            }
        }
        totals
    }

    /// Signed difference between what the operator counted and what the
    /// system expects. Positive is an overage, negative a shortage.
    pub fn difference(&self, counted_cash: Money) -> Money {
        counted_cash - Money::from_cents(self.expected_cash_cents)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PaymentMethod;
    use chrono::Utc;

    fn sale(method: PaymentMethod, total_cents: i64, status: SaleStatus) -> Sale {
        Sale {
            id: "s".to_string(),
            branch_id: "b".to_string(),
            user_id: "u".to_string(),
            customer_id: None,
            folio: "V-CEN-2026-000001".to_string(),
            status,
            subtotal_cents: total_cents,
            discount_cents: 0,
            discount_bps: 0,
            total_cents,
            payment_method: method,
            cash_received_cents: 0,
            cash_change_cents: 0,
            register_session_id: Some("rs".to_string()),
            notes: None,
            cancel_reason: None,
            cancelled_by: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_cash_and_mixed_settle_as_cash() {
        let sales = vec![
            sale(PaymentMethod::Cash, 5000, SaleStatus::Completed),
            sale(PaymentMethod::Mixed, 3000, SaleStatus::Completed),
            sale(PaymentMethod::Card, 7000, SaleStatus::Completed),
            sale(PaymentMethod::Transfer, 2000, SaleStatus::Completed),
        ];

        let totals = SettlementTotals::from_sales(&sales);
        assert_eq!(totals.sale_count, 4);
        assert_eq!(totals.total_sales_cents, 17000);
        assert_eq!(totals.expected_cash_cents, 8000);
        assert_eq!(totals.total_card_cents, 7000);
        assert_eq!(totals.total_transfer_cents, 2000);
    }

    #[test]
    fn test_cancelled_sales_excluded() {
        let sales = vec![
            sale(PaymentMethod::Cash, 5000, SaleStatus::Completed),
            sale(PaymentMethod::Cash, 9000, SaleStatus::Cancelled),
        ];

        let totals = SettlementTotals::from_sales(&sales);
        assert_eq!(totals.sale_count, 1);
        assert_eq!(totals.expected_cash_cents, 5000);
    }

    #[test]
    fn test_difference() {
        // One $50.00 cash sale; operator counts exactly $50.00.
        let sales = vec![sale(PaymentMethod::Cash, 5000, SaleStatus::Completed)];
        let totals = SettlementTotals::from_sales(&sales);

        assert_eq!(totals.difference(Money::from_cents(5000)).cents(), 0);
        assert_eq!(totals.difference(Money::from_cents(5500)).cents(), 500);
        assert_eq!(totals.difference(Money::from_cents(4000)).cents(), -1000);
    }

    #[test]
    fn test_empty_session() {
        let totals = SettlementTotals::from_sales(&[]);
        assert_eq!(totals.sale_count, 0);
        assert_eq!(totals.expected_cash_cents, 0);
        assert_eq!(totals.difference(Money::zero()).cents(), 0);
    }

    #[test]
    fn test_discount_aggregation() {
        let mut s = sale(PaymentMethod::Cash, 16000, SaleStatus::Completed);
        s.subtotal_cents = 20000;
        s.discount_cents = 4000;
        s.discount_bps = 2000;

        let totals = SettlementTotals::from_sales(&[s]);
        assert_eq!(totals.total_discounts_cents, 4000);
        assert_eq!(totals.total_sales_cents, 16000);
    }
}
