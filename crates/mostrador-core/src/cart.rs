//! # Cart Aggregate
//!
//! The cart is an explicit aggregate owned by the server and keyed by the
//! caller's session token. Handlers load it, apply one mutation, and store
//! it back (read-modify-write); nothing about the cart is implicit session
//! state.
//!
//! ## Cart Operations Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Cart Operations                                    │
//! │                                                                         │
//! │  Client Action            Endpoint                Cart Change           │
//! │  ─────────────            ────────                ───────────           │
//! │  Scan product ──────────► POST /cart/lines ─────► add_line()            │
//! │  Change quantity ───────► PUT  /cart/lines ─────► update_quantity()     │
//! │  Remove line ───────────► DELETE /cart/lines ───► remove_line()         │
//! │  Pick customer ─────────► PUT  /cart/customer ──► select_customer()     │
//! │  View totals ───────────► GET  /cart ──────────► totals()               │
//! │  Checkout ──────────────► POST /sales ─────────► (posted, then clear)   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Stock sufficiency is checked against the on-hand snapshot captured when
//! the line is added. The posting transaction re-checks atomically; the cart
//! check exists to fail fast in the UI.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::money::{DiscountRate, Money};
use crate::types::{CustomerTier, StockItem};
use crate::{MAX_CART_LINES, MAX_LINE_QUANTITY};

/// A line in the cart.
///
/// `stock_item_id` references the product × branch row; code, name and
/// price are frozen copies taken when the line was added, so the cart
/// displays consistent data even if the catalog changes underneath it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartLine {
    pub stock_item_id: String,
    /// Product code at time of adding (frozen).
    pub code: String,
    /// Product name at time of adding (frozen).
    pub name: String,
    /// Price in cents at time of adding (frozen).
    pub unit_price_cents: i64,
    /// On-hand quantity observed when the line was added.
    pub available: i64,
    pub quantity: i64,
    pub added_at: DateTime<Utc>,
}

impl CartLine {
    fn from_stock_item(item: &StockItem, code: &str, name: &str, quantity: i64) -> Self {
        CartLine {
            stock_item_id: item.id.clone(),
            code: code.to_string(),
            name: name.to_string(),
            unit_price_cents: item.price_cents,
            available: item.quantity,
            quantity,
            added_at: Utc::now(),
        }
    }

    /// Line total before any discount (unit price × quantity).
    pub fn line_total_cents(&self) -> i64 {
        self.unit_price_cents * self.quantity
    }
}

/// The customer selected for the cart, carrying the discount that checkout
/// will apply uniformly to the subtotal.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartCustomer {
    pub customer_id: String,
    pub name: String,
    pub tier: CustomerTier,
    pub discount_bps: u32,
}

/// The cart.
///
/// ## Invariants
/// - Lines are unique by `stock_item_id` (adding the same item merges)
/// - Quantity is always > 0 (updating to 0 removes the line)
/// - At most [`MAX_CART_LINES`] lines, [`MAX_LINE_QUANTITY`] per line
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Cart {
    pub lines: Vec<CartLine>,
    pub customer: Option<CartCustomer>,
    pub created_at: DateTime<Utc>,
}

impl Cart {
    /// Creates a new empty cart.
    pub fn new() -> Self {
        Cart {
            lines: Vec::new(),
            customer: None,
            created_at: Utc::now(),
        }
    }

    /// Adds a stock item to the cart or increases quantity if already present.
    ///
    /// Fails when the requested total exceeds the on-hand snapshot, the
    /// per-line maximum, or the cart line limit.
    pub fn add_line(
        &mut self,
        item: &StockItem,
        code: &str,
        name: &str,
        quantity: i64,
    ) -> CoreResult<()> {
        if quantity <= 0 {
            return Err(CoreError::Validation(
                crate::error::ValidationError::MustBePositive {
                    field: "quantity".to_string(),
                },
            ));
        }

        if let Some(line) = self
            .lines
            .iter_mut()
            .find(|l| l.stock_item_id == item.id)
        {
            let new_qty = line.quantity + quantity;
            if new_qty > MAX_LINE_QUANTITY {
                return Err(CoreError::QuantityTooLarge {
                    requested: new_qty,
                    max: MAX_LINE_QUANTITY,
                });
            }
            if new_qty > line.available {
                return Err(CoreError::InsufficientStock {
                    code: line.code.clone(),
                    available: line.available,
                    requested: new_qty,
                });
            }
            line.quantity = new_qty;
            return Ok(());
        }

        if self.lines.len() >= MAX_CART_LINES {
            return Err(CoreError::CartTooLarge {
                max: MAX_CART_LINES,
            });
        }
        if quantity > MAX_LINE_QUANTITY {
            return Err(CoreError::QuantityTooLarge {
                requested: quantity,
                max: MAX_LINE_QUANTITY,
            });
        }
        if !item.can_sell(quantity) {
            return Err(CoreError::InsufficientStock {
                code: code.to_string(),
                available: item.quantity,
                requested: quantity,
            });
        }

        self.lines
            .push(CartLine::from_stock_item(item, code, name, quantity));
        Ok(())
    }

    /// Updates the quantity of a line. Quantity 0 removes the line.
    pub fn update_quantity(&mut self, stock_item_id: &str, quantity: i64) -> CoreResult<()> {
        if quantity == 0 {
            return self.remove_line(stock_item_id);
        }
        if quantity < 0 {
            return Err(CoreError::Validation(
                crate::error::ValidationError::MustBePositive {
                    field: "quantity".to_string(),
                },
            ));
        }
        if quantity > MAX_LINE_QUANTITY {
            return Err(CoreError::QuantityTooLarge {
                requested: quantity,
                max: MAX_LINE_QUANTITY,
            });
        }

        let line = self
            .lines
            .iter_mut()
            .find(|l| l.stock_item_id == stock_item_id)
            .ok_or_else(|| CoreError::StockItemNotFound(stock_item_id.to_string()))?;

        if quantity > line.available {
            return Err(CoreError::InsufficientStock {
                code: line.code.clone(),
                available: line.available,
                requested: quantity,
            });
        }
        line.quantity = quantity;
        Ok(())
    }

    /// Removes a line by stock item id.
    pub fn remove_line(&mut self, stock_item_id: &str) -> CoreResult<()> {
        let initial_len = self.lines.len();
        self.lines.retain(|l| l.stock_item_id != stock_item_id);
        if self.lines.len() == initial_len {
            return Err(CoreError::StockItemNotFound(stock_item_id.to_string()));
        }
        Ok(())
    }

    /// Selects the customer whose discount applies at checkout.
    pub fn select_customer(&mut self, customer: CartCustomer) {
        self.customer = Some(customer);
    }

    /// Clears the selected customer (back to walk-in, no discount).
    pub fn clear_customer(&mut self) {
        self.customer = None;
    }

    /// Clears all lines and the selected customer.
    pub fn clear(&mut self) {
        self.lines.clear();
        self.customer = None;
        self.created_at = Utc::now();
    }

    /// The discount rate of the selected customer, or zero.
    pub fn discount_rate(&self) -> DiscountRate {
        self.customer
            .as_ref()
            .map(|c| DiscountRate::from_bps(c.discount_bps))
            .unwrap_or_default()
    }

    /// Subtotal before discount.
    pub fn subtotal_cents(&self) -> i64 {
        self.lines.iter().map(|l| l.line_total_cents()).sum()
    }

    /// Discount applied uniformly to the subtotal.
    pub fn discount_cents(&self) -> i64 {
        Money::from_cents(self.subtotal_cents())
            .percentage_of(self.discount_rate())
            .cents()
    }

    /// Grand total (subtotal − discount).
    pub fn total_cents(&self) -> i64 {
        self.subtotal_cents() - self.discount_cents()
    }

    /// Number of distinct lines.
    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    /// Total quantity across all lines.
    pub fn total_quantity(&self) -> i64 {
        self.lines.iter().map(|l| l.quantity).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Totals summary for API responses.
    pub fn totals(&self) -> CartTotals {
        CartTotals {
            line_count: self.line_count(),
            total_quantity: self.total_quantity(),
            subtotal_cents: self.subtotal_cents(),
            discount_bps: self.discount_rate().bps(),
            discount_cents: self.discount_cents(),
            total_cents: self.total_cents(),
        }
    }
}

/// Cart totals summary for API responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartTotals {
    pub line_count: usize,
    pub total_quantity: i64,
    pub subtotal_cents: i64,
    pub discount_bps: u32,
    pub discount_cents: i64,
    pub total_cents: i64,
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn stock_item(id: &str, price_cents: i64, quantity: i64) -> StockItem {
        StockItem {
            id: id.to_string(),
            product_id: format!("prod-{}", id),
            branch_id: "branch-1".to_string(),
            price_cents,
            quantity,
            min_quantity: 0,
            max_quantity: 1000,
            active: true,
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_add_line() {
        let mut cart = Cart::new();
        let item = stock_item("s1", 999, 10);

        cart.add_line(&item, "P-001", "Croquetas 5kg", 2).unwrap();

        assert_eq!(cart.line_count(), 1);
        assert_eq!(cart.total_quantity(), 2);
        assert_eq!(cart.subtotal_cents(), 1998);
    }

    #[test]
    fn test_add_same_item_merges() {
        let mut cart = Cart::new();
        let item = stock_item("s1", 999, 10);

        cart.add_line(&item, "P-001", "Croquetas 5kg", 2).unwrap();
        cart.add_line(&item, "P-001", "Croquetas 5kg", 3).unwrap();

        assert_eq!(cart.line_count(), 1);
        assert_eq!(cart.total_quantity(), 5);
    }

    #[test]
    fn test_add_rejects_over_available() {
        let mut cart = Cart::new();
        let item = stock_item("s1", 999, 3);

        assert!(matches!(
            cart.add_line(&item, "P-001", "Croquetas 5kg", 4),
            Err(CoreError::InsufficientStock { available: 3, requested: 4, .. })
        ));
        // Merging past the snapshot is also rejected.
        cart.add_line(&item, "P-001", "Croquetas 5kg", 2).unwrap();
        assert!(cart.add_line(&item, "P-001", "Croquetas 5kg", 2).is_err());
        assert_eq!(cart.total_quantity(), 2);
    }

    #[test]
    fn test_update_quantity_zero_removes() {
        let mut cart = Cart::new();
        let item = stock_item("s1", 999, 10);
        cart.add_line(&item, "P-001", "Croquetas 5kg", 2).unwrap();

        cart.update_quantity("s1", 0).unwrap();
        assert!(cart.is_empty());
    }

    #[test]
    fn test_customer_discount_totals() {
        // Spec scenario: premium 20% buys 2 × $100.00.
        let mut cart = Cart::new();
        let item = stock_item("s1", 10000, 10);
        cart.add_line(&item, "P-001", "Alimento premium", 2).unwrap();
        cart.select_customer(CartCustomer {
            customer_id: "c1".to_string(),
            name: "Ana Flores".to_string(),
            tier: CustomerTier::Premium,
            discount_bps: 2000,
        });

        let totals = cart.totals();
        assert_eq!(totals.subtotal_cents, 20000);
        assert_eq!(totals.discount_cents, 4000);
        assert_eq!(totals.total_cents, 16000);
    }

    #[test]
    fn test_walk_in_has_no_discount() {
        let mut cart = Cart::new();
        let item = stock_item("s1", 5000, 10);
        cart.add_line(&item, "P-001", "Alimento", 1).unwrap();

        assert_eq!(cart.discount_cents(), 0);
        assert_eq!(cart.total_cents(), 5000);

        cart.select_customer(CartCustomer {
            customer_id: "c1".to_string(),
            name: "Ana".to_string(),
            tier: CustomerTier::Frequent,
            discount_bps: 1000,
        });
        assert_eq!(cart.discount_cents(), 500);

        cart.clear_customer();
        assert_eq!(cart.discount_cents(), 0);
    }

    #[test]
    fn test_clear() {
        let mut cart = Cart::new();
        let item = stock_item("s1", 999, 10);
        cart.add_line(&item, "P-001", "Croquetas", 2).unwrap();
        cart.select_customer(CartCustomer {
            customer_id: "c1".to_string(),
            name: "Ana".to_string(),
            tier: CustomerTier::Normal,
            discount_bps: 0,
        });

        cart.clear();
        assert!(cart.is_empty());
        assert!(cart.customer.is_none());
    }

    #[test]
    fn test_remove_missing_line_fails() {
        let mut cart = Cart::new();
        assert!(matches!(
            cart.remove_line("nope"),
            Err(CoreError::StockItemNotFound(_))
        ));
    }
}
