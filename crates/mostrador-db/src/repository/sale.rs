//! # Sale Repository
//!
//! Posting and cancellation of sales.
//!
//! ## Posting Transaction
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     post_sale (one transaction)                         │
//! │                                                                         │
//! │  1. Derive folio from the branch/year's last sale folio                 │
//! │  2. Find the operator's open register session (attach if any)           │
//! │  3. Insert sale header (status: completed) with cart totals             │
//! │  4. Per line:                                                           │
//! │     a. guarded stock decrement (fails on insufficient stock)            │
//! │     b. outbound inventory movement with before/after quantities         │
//! │     c. sale_lines row with frozen code/name/price snapshots             │
//! │  5. Recompute the attached session's running totals                     │
//! │  6. Commit — any failure rolls the whole sale back                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Cancellation is the mirror image: a guarded status flip to `cancelled`
//! (so a second cancellation is rejected, never re-applied), then stock
//! restoration with reversing inbound movements.

use chrono::{Datelike, Utc};
use sqlx::{Sqlite, SqlitePool, Transaction};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use crate::repository::product::apply_stock_delta;
use crate::repository::register::recompute_session_totals;
use mostrador_core::cart::Cart;
use mostrador_core::folio;
use mostrador_core::money::Money;
use mostrador_core::types::{Branch, MovementKind, PaymentMethod, Sale, SaleLine, SaleStatus};
use mostrador_core::{CoreError, FOLIO_PREFIX_SALE};

const SALE_COLUMNS: &str = "id, branch_id, user_id, customer_id, folio, status, \
     subtotal_cents, discount_cents, discount_bps, total_cents, payment_method, \
     cash_received_cents, cash_change_cents, register_session_id, notes, \
     cancel_reason, cancelled_by, created_at, updated_at";

const LINE_COLUMNS: &str = "id, sale_id, stock_item_id, code_snapshot, name_snapshot, \
     quantity, unit_price_cents, discounted_price_cents, unit_discount_cents, \
     line_subtotal_cents, created_at";

/// Input for posting a sale from a checked-out cart.
#[derive(Debug)]
pub struct NewSale<'a> {
    pub cart: &'a Cart,
    pub branch: &'a Branch,
    /// Operating cashier.
    pub user_id: &'a str,
    pub payment_method: PaymentMethod,
    /// Cash handed over; meaningful for cash and mixed payments.
    pub cash_received_cents: i64,
    pub notes: Option<&'a str>,
}

/// Repository for sale database operations.
#[derive(Debug, Clone)]
pub struct SaleRepository {
    pool: SqlitePool,
}

impl SaleRepository {
    /// Creates a new SaleRepository.
    pub fn new(pool: SqlitePool) -> Self {
        SaleRepository { pool }
    }

    /// Posts a sale atomically from a cart.
    ///
    /// The sale is attached to the operator's open register session when one
    /// exists; a sale with no open session still posts (it just won't be
    /// counted in any settlement).
    pub async fn post_sale(&self, new_sale: NewSale<'_>) -> DbResult<Sale> {
        let cart = new_sale.cart;
        if cart.is_empty() {
            return Err(DbError::Core(CoreError::EmptyCart));
        }
        if !new_sale.branch.allow_sales {
            return Err(DbError::Core(CoreError::SalesNotAllowed {
                branch_code: new_sale.branch.code.clone(),
            }));
        }

        let totals = cart.totals();
        let rate = cart.discount_rate();
        let now = Utc::now();

        let mut tx = self.pool.begin().await?;

        let folio = next_reference_in_tx(
            &mut tx,
            "sales",
            "folio",
            FOLIO_PREFIX_SALE,
            &new_sale.branch.code,
        )
        .await?;

        let session_id: Option<String> = sqlx::query_scalar(
            "SELECT id FROM register_sessions \
             WHERE branch_id = ?1 AND user_id = ?2 AND status = 'open'",
        )
        .bind(&new_sale.branch.id)
        .bind(new_sale.user_id)
        .fetch_optional(&mut *tx)
        .await?;

        let cash_change_cents = if new_sale.payment_method.settles_as_cash() {
            Money::change_for(
                Money::from_cents(totals.total_cents),
                Money::from_cents(new_sale.cash_received_cents),
            )
            .cents()
        } else {
            0
        };

        let sale = Sale {
            id: Uuid::new_v4().to_string(),
            branch_id: new_sale.branch.id.clone(),
            user_id: new_sale.user_id.to_string(),
            customer_id: cart.customer.as_ref().map(|c| c.customer_id.clone()),
            folio: folio.clone(),
            status: SaleStatus::Completed,
            subtotal_cents: totals.subtotal_cents,
            discount_cents: totals.discount_cents,
            discount_bps: totals.discount_bps,
            total_cents: totals.total_cents,
            payment_method: new_sale.payment_method,
            cash_received_cents: new_sale.cash_received_cents,
            cash_change_cents,
            register_session_id: session_id,
            notes: new_sale.notes.map(str::to_string),
            cancel_reason: None,
            cancelled_by: None,
            created_at: now,
            updated_at: now,
        };

        sqlx::query(
            r#"
            INSERT INTO sales (
                id, branch_id, user_id, customer_id, folio, status,
                subtotal_cents, discount_cents, discount_bps, total_cents,
                payment_method, cash_received_cents, cash_change_cents,
                register_session_id, notes, cancel_reason, cancelled_by,
                created_at, updated_at
            ) VALUES (
                ?1, ?2, ?3, ?4, ?5, ?6,
                ?7, ?8, ?9, ?10,
                ?11, ?12, ?13,
                ?14, ?15, ?16, ?17,
                ?18, ?19
            )
            "#,
        )
        .bind(&sale.id)
        .bind(&sale.branch_id)
        .bind(&sale.user_id)
        .bind(&sale.customer_id)
        .bind(&sale.folio)
        .bind(sale.status)
        .bind(sale.subtotal_cents)
        .bind(sale.discount_cents)
        .bind(sale.discount_bps)
        .bind(sale.total_cents)
        .bind(sale.payment_method)
        .bind(sale.cash_received_cents)
        .bind(sale.cash_change_cents)
        .bind(&sale.register_session_id)
        .bind(&sale.notes)
        .bind(&sale.cancel_reason)
        .bind(&sale.cancelled_by)
        .bind(sale.created_at)
        .bind(sale.updated_at)
        .execute(&mut *tx)
        .await?;

        let reference = format!("VENTA-{}", folio);

        for line in &cart.lines {
            // Guarded decrement; the cart's availability snapshot may be
            // stale by now.
            let result = apply_stock_delta(
                &mut tx,
                &line.stock_item_id,
                -line.quantity,
                MovementKind::Outbound,
                "Venta",
                new_sale.user_id,
                Some(&reference),
            )
            .await;

            if let Err(DbError::Core(CoreError::InsufficientStock {
                available, requested, ..
            })) = result
            {
                return Err(DbError::Core(CoreError::InsufficientStock {
                    code: line.code.clone(),
                    available,
                    requested,
                }));
            }
            result?;

            let unit_price = Money::from_cents(line.unit_price_cents);
            let unit_discount = unit_price.percentage_of(rate);
            let discounted_price = unit_price - unit_discount;

            sqlx::query(
                r#"
                INSERT INTO sale_lines (
                    id, sale_id, stock_item_id, code_snapshot, name_snapshot,
                    quantity, unit_price_cents, discounted_price_cents,
                    unit_discount_cents, line_subtotal_cents, created_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
                "#,
            )
            .bind(Uuid::new_v4().to_string())
            .bind(&sale.id)
            .bind(&line.stock_item_id)
            .bind(&line.code)
            .bind(&line.name)
            .bind(line.quantity)
            .bind(line.unit_price_cents)
            .bind(discounted_price.cents())
            .bind(unit_discount.cents())
            .bind(discounted_price.multiply_quantity(line.quantity).cents())
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        // Keep the attached session's running totals current.
        if let Some(ref session_id) = sale.register_session_id {
            recompute_session_totals(&mut tx, session_id).await?;
        }

        tx.commit().await?;

        info!(
            folio = %sale.folio,
            total_cents = sale.total_cents,
            lines = cart.lines.len(),
            "Sale posted"
        );

        Ok(sale)
    }

    /// Cancels a completed sale: restores stock with reversing inbound
    /// movements and marks the sale cancelled.
    ///
    /// Only completed sales cancel; a repeated cancellation is rejected with
    /// [`CoreError::InvalidSaleStatus`] and never re-applied.
    pub async fn cancel_sale(
        &self,
        sale_id: &str,
        cancelled_by: &str,
        reason: &str,
    ) -> DbResult<Sale> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let sale = fetch_sale(&mut tx, sale_id).await?;

        // Guarded status flip claims the cancellation atomically.
        let result = sqlx::query(
            r#"
            UPDATE sales SET
                status = 'cancelled',
                cancel_reason = ?2,
                cancelled_by = ?3,
                updated_at = ?4
            WHERE id = ?1 AND status = 'completed'
            "#,
        )
        .bind(sale_id)
        .bind(reason)
        .bind(cancelled_by)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::Core(CoreError::InvalidSaleStatus {
                folio: sale.folio,
                status: sale.status,
            }));
        }

        let lines = fetch_lines(&mut tx, sale_id).await?;
        let reference = format!("CANCELACION-{}", sale.folio);

        for line in &lines {
            apply_stock_delta(
                &mut tx,
                &line.stock_item_id,
                line.quantity,
                MovementKind::Inbound,
                "Cancelación de venta",
                cancelled_by,
                Some(&reference),
            )
            .await?;
        }

        // The cancelled sale drops out of its session's totals; a closed
        // session re-derives its difference against the counted cash.
        if let Some(ref session_id) = sale.register_session_id {
            recompute_session_totals(&mut tx, session_id).await?;
        }

        tx.commit().await?;

        info!(folio = %sale.folio, "Sale cancelled");

        Ok(Sale {
            status: SaleStatus::Cancelled,
            cancel_reason: Some(reason.to_string()),
            cancelled_by: Some(cancelled_by.to_string()),
            updated_at: now,
            ..sale
        })
    }

    /// Gets a sale by ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Sale>> {
        let sale = sqlx::query_as::<_, Sale>(&format!(
            "SELECT {SALE_COLUMNS} FROM sales WHERE id = ?1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(sale)
    }

    /// Gets a sale by folio.
    pub async fn get_by_folio(&self, folio: &str) -> DbResult<Option<Sale>> {
        let sale = sqlx::query_as::<_, Sale>(&format!(
            "SELECT {SALE_COLUMNS} FROM sales WHERE folio = ?1"
        ))
        .bind(folio)
        .fetch_optional(&self.pool)
        .await?;

        Ok(sale)
    }

    /// Gets the lines of a sale in insertion order.
    pub async fn get_lines(&self, sale_id: &str) -> DbResult<Vec<SaleLine>> {
        let lines = sqlx::query_as::<_, SaleLine>(&format!(
            "SELECT {LINE_COLUMNS} FROM sale_lines WHERE sale_id = ?1 ORDER BY rowid"
        ))
        .bind(sale_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(lines)
    }

    /// Lists recent sales at a branch, newest first.
    pub async fn list_for_branch(&self, branch_id: &str, limit: i64) -> DbResult<Vec<Sale>> {
        let sales = sqlx::query_as::<_, Sale>(&format!(
            "SELECT {SALE_COLUMNS} FROM sales \
             WHERE branch_id = ?1 ORDER BY created_at DESC, rowid DESC LIMIT ?2"
        ))
        .bind(branch_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(sales)
    }

    /// Lists the sales attached to a register session.
    pub async fn list_for_session(&self, session_id: &str) -> DbResult<Vec<Sale>> {
        let sales = sqlx::query_as::<_, Sale>(&format!(
            "SELECT {SALE_COLUMNS} FROM sales \
             WHERE register_session_id = ?1 ORDER BY created_at, rowid"
        ))
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(sales)
    }
}

// =============================================================================
// Transaction Helpers
// =============================================================================

/// Derives the next sequential reference for a table inside a transaction
/// by reading the branch/year's latest one.
///
/// Used for sale folios, register folios and transfer codes; all three
/// columns are UNIQUE so a concurrent collision fails the insert instead of
/// duplicating.
pub(crate) async fn next_reference_in_tx(
    tx: &mut Transaction<'_, Sqlite>,
    table: &str,
    column: &str,
    prefix: &str,
    branch_code: &str,
) -> DbResult<String> {
    let year = Utc::now().year();
    let pattern = format!("{}-{}-{}-%", prefix, branch_code, year);

    let last: Option<String> = sqlx::query_scalar(&format!(
        "SELECT {column} FROM {table} WHERE {column} LIKE ?1 ORDER BY {column} DESC LIMIT 1"
    ))
    .bind(&pattern)
    .fetch_optional(&mut **tx)
    .await?;

    Ok(folio::next_folio(prefix, branch_code, year, last.as_deref()))
}

async fn fetch_sale(tx: &mut Transaction<'_, Sqlite>, sale_id: &str) -> DbResult<Sale> {
    let sale = sqlx::query_as::<_, Sale>(&format!(
        "SELECT {SALE_COLUMNS} FROM sales WHERE id = ?1"
    ))
    .bind(sale_id)
    .fetch_optional(&mut **tx)
    .await?;

    debug!(sale_id = %sale_id, found = sale.is_some(), "Fetched sale in tx");

    sale.ok_or_else(|| DbError::not_found("Sale", sale_id))
}

async fn fetch_lines(tx: &mut Transaction<'_, Sqlite>, sale_id: &str) -> DbResult<Vec<SaleLine>> {
    let lines = sqlx::query_as::<_, SaleLine>(&format!(
        "SELECT {LINE_COLUMNS} FROM sale_lines WHERE sale_id = ?1 ORDER BY rowid"
    ))
    .bind(sale_id)
    .fetch_all(&mut **tx)
    .await?;

    Ok(lines)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use mostrador_core::cart::{Cart, CartCustomer};
    use mostrador_core::types::{CustomerTier, Product, Role, StockItem};

    struct Fixture {
        db: Database,
        branch: Branch,
        user_id: String,
        stock: StockItem,
    }

    async fn setup(price_cents: i64, on_hand: i64) -> Fixture {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let branch = db
            .branches()
            .create("CEN", "Centro", None, None, None)
            .await
            .unwrap();
        let user = db
            .users()
            .create("cajero", "María Gómez", "$argon2id$fake", Role::Cashier, Some(&branch.id))
            .await
            .unwrap();

        let now = Utc::now();
        let product = Product {
            id: Uuid::new_v4().to_string(),
            code: "ALIM-001".to_string(),
            name: "Croquetas Premium 5kg".to_string(),
            description: None,
            category_id: None,
            supplier_id: None,
            unit_id: None,
            average_cost_cents: 0,
            active: true,
            created_at: now,
            updated_at: now,
        };
        db.products().insert_product(&product).await.unwrap();

        let stock = StockItem {
            id: Uuid::new_v4().to_string(),
            product_id: product.id.clone(),
            branch_id: branch.id.clone(),
            price_cents,
            quantity: 0,
            min_quantity: 0,
            max_quantity: 1000,
            active: true,
            updated_at: now,
        };
        db.products().create_stock_item(&stock).await.unwrap();
        db.products()
            .receive_stock(&stock.id, on_hand, &user.id, None)
            .await
            .unwrap();
        let stock = db.products().get_stock_item(&stock.id).await.unwrap().unwrap();

        Fixture {
            db,
            branch,
            user_id: user.id,
            stock,
        }
    }

    fn cash_sale<'a>(cart: &'a Cart, branch: &'a Branch, user_id: &'a str, received: i64) -> NewSale<'a> {
        NewSale {
            cart,
            branch,
            user_id,
            payment_method: PaymentMethod::Cash,
            cash_received_cents: received,
            notes: None,
        }
    }

    #[tokio::test]
    async fn test_post_sale_decrements_stock_and_writes_lines() {
        let f = setup(10000, 10).await;

        let mut cart = Cart::new();
        cart.add_line(&f.stock, "ALIM-001", "Croquetas Premium 5kg", 2).unwrap();

        let sale = f
            .db
            .sales()
            .post_sale(cash_sale(&cart, &f.branch, &f.user_id, 25000))
            .await
            .unwrap();

        assert_eq!(sale.folio, format!("V-CEN-{}-000001", Utc::now().year()));
        assert_eq!(sale.subtotal_cents, 20000);
        assert_eq!(sale.total_cents, 20000);
        assert_eq!(sale.cash_change_cents, 5000);
        assert_eq!(sale.status, SaleStatus::Completed);

        let stock = f.db.products().get_stock_item(&f.stock.id).await.unwrap().unwrap();
        assert_eq!(stock.quantity, 8);

        let lines = f.db.sales().get_lines(&sale.id).await.unwrap();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].code_snapshot, "ALIM-001");
        assert_eq!(lines[0].line_subtotal_cents, 20000);

        // Outbound movement carries the folio reference.
        let movements = f.db.products().list_movements(&f.stock.id, 10).await.unwrap();
        let reference = movements[0].reference.as_deref().unwrap();
        assert_eq!(reference, format!("VENTA-{}", sale.folio));
    }

    #[tokio::test]
    async fn test_premium_discount_applied_uniformly() {
        let f = setup(10000, 10).await;

        let mut cart = Cart::new();
        cart.add_line(&f.stock, "ALIM-001", "Croquetas Premium 5kg", 2).unwrap();
        cart.select_customer(CartCustomer {
            customer_id: Uuid::new_v4().to_string(),
            name: "Ana Flores".to_string(),
            tier: CustomerTier::Premium,
            discount_bps: 2000,
        });

        // Posting with a customer not present in customers table would break
        // the FK; register a matching row first.
        let customer = mostrador_core::types::Customer {
            id: cart.customer.as_ref().unwrap().customer_id.clone(),
            code: "CLI-001".to_string(),
            first_name: "Ana".to_string(),
            last_name: "Flores".to_string(),
            phone: None,
            email: None,
            tier: CustomerTier::Premium,
            discount_bps: 2000,
            branch_id: None,
            notes: None,
            active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        f.db.customers().insert(&customer).await.unwrap();

        let sale = f
            .db
            .sales()
            .post_sale(cash_sale(&cart, &f.branch, &f.user_id, 16000))
            .await
            .unwrap();

        assert_eq!(sale.subtotal_cents, 20000);
        assert_eq!(sale.discount_cents, 4000);
        assert_eq!(sale.total_cents, 16000);
        assert_eq!(sale.discount_bps, 2000);
        assert_eq!(sale.cash_change_cents, 0);

        let lines = f.db.sales().get_lines(&sale.id).await.unwrap();
        assert_eq!(lines[0].unit_price_cents, 10000);
        assert_eq!(lines[0].unit_discount_cents, 2000);
        assert_eq!(lines[0].discounted_price_cents, 8000);
    }

    #[tokio::test]
    async fn test_insufficient_stock_rolls_back_everything() {
        let f = setup(10000, 3).await;

        // Build a cart against a stale availability snapshot.
        let mut stale = f.stock.clone();
        stale.quantity = 10;
        let mut cart = Cart::new();
        cart.add_line(&stale, "ALIM-001", "Croquetas", 5).unwrap();

        let err = f
            .db
            .sales()
            .post_sale(cash_sale(&cart, &f.branch, &f.user_id, 50000))
            .await;
        assert!(matches!(
            err,
            Err(DbError::Core(CoreError::InsufficientStock { .. }))
        ));

        // No sale header, no stock change, no movement.
        let sales = f.db.sales().list_for_branch(&f.branch.id, 10).await.unwrap();
        assert!(sales.is_empty());
        let stock = f.db.products().get_stock_item(&f.stock.id).await.unwrap().unwrap();
        assert_eq!(stock.quantity, 3);
    }

    #[tokio::test]
    async fn test_folio_sequence_increments() {
        let f = setup(5000, 10).await;

        for expected_seq in 1..=3 {
            let mut cart = Cart::new();
            let stock = f.db.products().get_stock_item(&f.stock.id).await.unwrap().unwrap();
            cart.add_line(&stock, "ALIM-001", "Croquetas", 1).unwrap();
            let sale = f
                .db
                .sales()
                .post_sale(cash_sale(&cart, &f.branch, &f.user_id, 5000))
                .await
                .unwrap();
            assert!(sale.folio.ends_with(&format!("{:06}", expected_seq)));
        }
    }

    #[tokio::test]
    async fn test_cancel_restores_stock_and_is_not_repeatable() {
        let f = setup(10000, 10).await;

        let mut cart = Cart::new();
        cart.add_line(&f.stock, "ALIM-001", "Croquetas", 4).unwrap();
        let sale = f
            .db
            .sales()
            .post_sale(cash_sale(&cart, &f.branch, &f.user_id, 40000))
            .await
            .unwrap();

        let stock = f.db.products().get_stock_item(&f.stock.id).await.unwrap().unwrap();
        assert_eq!(stock.quantity, 6);

        let cancelled = f
            .db
            .sales()
            .cancel_sale(&sale.id, &f.user_id, "Cliente se arrepintió")
            .await
            .unwrap();
        assert_eq!(cancelled.status, SaleStatus::Cancelled);

        let stock = f.db.products().get_stock_item(&f.stock.id).await.unwrap().unwrap();
        assert_eq!(stock.quantity, 10);

        // Second cancellation rejected, stock untouched.
        let err = f.db.sales().cancel_sale(&sale.id, &f.user_id, "otra vez").await;
        assert!(matches!(
            err,
            Err(DbError::Core(CoreError::InvalidSaleStatus { .. }))
        ));
        let stock = f.db.products().get_stock_item(&f.stock.id).await.unwrap().unwrap();
        assert_eq!(stock.quantity, 10);
    }

    #[tokio::test]
    async fn test_sale_without_session_posts_unattached() {
        let f = setup(5000, 5).await;

        let mut cart = Cart::new();
        cart.add_line(&f.stock, "ALIM-001", "Croquetas", 1).unwrap();
        let sale = f
            .db
            .sales()
            .post_sale(cash_sale(&cart, &f.branch, &f.user_id, 5000))
            .await
            .unwrap();

        assert!(sale.register_session_id.is_none());
    }

    #[tokio::test]
    async fn test_branch_without_sales_rejected() {
        let f = setup(5000, 5).await;

        let mut branch = f.branch.clone();
        branch.allow_sales = false;
        f.db.branches().update(&branch).await.unwrap();
        let branch = f.db.branches().get_by_id(&branch.id).await.unwrap().unwrap();

        let mut cart = Cart::new();
        cart.add_line(&f.stock, "ALIM-001", "Croquetas", 1).unwrap();

        let err = f
            .db
            .sales()
            .post_sale(cash_sale(&cart, &branch, &f.user_id, 5000))
            .await;
        assert!(matches!(
            err,
            Err(DbError::Core(CoreError::SalesNotAllowed { .. }))
        ));
    }
}
