//! # Register Session Repository
//!
//! Lifecycle of register sessions ("corte de caja").
//!
//! ## Session Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Register Session Lifecycle                          │
//! │                                                                         │
//! │  open()   ──► Open      sales posted by the operator attach here        │
//! │                 │                                                       │
//! │  close()  ──►  Closed   totals frozen, difference = counted − expected  │
//! │                 │       (only the opening operator may close)           │
//! │  verify() ──►  Verified terminal; an admin signs off the count          │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! One open session per (branch, operator); enforced twice, by the
//! pre-check here and by a partial unique index in the schema.

use chrono::Utc;
use sqlx::{Sqlite, SqlitePool, Transaction};
use tracing::info;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use crate::repository::sale::next_reference_in_tx;
use mostrador_core::money::Money;
use mostrador_core::settlement::SettlementTotals;
use mostrador_core::types::{Branch, RegisterSession, RegisterStatus, Sale};
use mostrador_core::{CoreError, FOLIO_PREFIX_REGISTER};

const SESSION_COLUMNS: &str = "id, branch_id, user_id, folio, status, opened_at, closed_at, \
     total_sales_cents, expected_cash_cents, counted_cash_cents, total_card_cents, \
     total_transfer_cents, total_discounts_cents, difference_cents, notes, closed_by, verified_by";

/// Repository for register session database operations.
#[derive(Debug, Clone)]
pub struct RegisterRepository {
    pool: SqlitePool,
}

impl RegisterRepository {
    /// Creates a new RegisterRepository.
    pub fn new(pool: SqlitePool) -> Self {
        RegisterRepository { pool }
    }

    /// Opens a register session for an operator at a branch.
    ///
    /// Fails with [`CoreError::RegisterAlreadyOpen`] when the operator
    /// already has an open session at this branch.
    pub async fn open(&self, branch: &Branch, user_id: &str) -> DbResult<RegisterSession> {
        let mut tx = self.pool.begin().await?;

        let existing: Option<String> = sqlx::query_scalar(
            "SELECT folio FROM register_sessions \
             WHERE branch_id = ?1 AND user_id = ?2 AND status = 'open'",
        )
        .bind(&branch.id)
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await?;

        if let Some(folio) = existing {
            return Err(DbError::Core(CoreError::RegisterAlreadyOpen { folio }));
        }

        let folio = next_reference_in_tx(
            &mut tx,
            "register_sessions",
            "folio",
            FOLIO_PREFIX_REGISTER,
            &branch.code,
        )
        .await?;

        let session = RegisterSession {
            id: Uuid::new_v4().to_string(),
            branch_id: branch.id.clone(),
            user_id: user_id.to_string(),
            folio: folio.clone(),
            status: RegisterStatus::Open,
            opened_at: Utc::now(),
            closed_at: None,
            total_sales_cents: 0,
            expected_cash_cents: 0,
            counted_cash_cents: 0,
            total_card_cents: 0,
            total_transfer_cents: 0,
            total_discounts_cents: 0,
            difference_cents: 0,
            notes: None,
            closed_by: None,
            verified_by: None,
        };

        sqlx::query(
            r#"
            INSERT INTO register_sessions (
                id, branch_id, user_id, folio, status, opened_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(&session.id)
        .bind(&session.branch_id)
        .bind(&session.user_id)
        .bind(&session.folio)
        .bind(session.status)
        .bind(session.opened_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        info!(folio = %session.folio, "Register session opened");

        Ok(session)
    }

    /// The operator's currently open session at a branch, if any.
    pub async fn current_open(
        &self,
        branch_id: &str,
        user_id: &str,
    ) -> DbResult<Option<RegisterSession>> {
        let session = sqlx::query_as::<_, RegisterSession>(&format!(
            "SELECT {SESSION_COLUMNS} FROM register_sessions \
             WHERE branch_id = ?1 AND user_id = ?2 AND status = 'open'"
        ))
        .bind(branch_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(session)
    }

    /// Closes an open session: freezes the settlement totals and records the
    /// counted cash and the signed difference.
    ///
    /// Only the operator who opened the session may close it.
    pub async fn close(
        &self,
        session_id: &str,
        operator_id: &str,
        counted_cash_cents: i64,
        notes: Option<&str>,
    ) -> DbResult<RegisterSession> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let session = fetch_session(&mut tx, session_id).await?;

        if session.status != RegisterStatus::Open {
            return Err(DbError::Core(CoreError::InvalidRegisterStatus {
                folio: session.folio,
                status: session.status,
            }));
        }
        if session.user_id != operator_id {
            return Err(DbError::Core(CoreError::NotSessionOperator {
                folio: session.folio,
            }));
        }

        let sales = fetch_session_sales(&mut tx, session_id).await?;
        let totals = SettlementTotals::from_sales(&sales);
        let difference = totals.difference(Money::from_cents(counted_cash_cents));

        let result = sqlx::query(
            r#"
            UPDATE register_sessions SET
                status = 'closed',
                closed_at = ?2,
                total_sales_cents = ?3,
                expected_cash_cents = ?4,
                counted_cash_cents = ?5,
                total_card_cents = ?6,
                total_transfer_cents = ?7,
                total_discounts_cents = ?8,
                difference_cents = ?9,
                notes = ?10,
                closed_by = ?11
            WHERE id = ?1 AND status = 'open'
            "#,
        )
        .bind(session_id)
        .bind(now)
        .bind(totals.total_sales_cents)
        .bind(totals.expected_cash_cents)
        .bind(counted_cash_cents)
        .bind(totals.total_card_cents)
        .bind(totals.total_transfer_cents)
        .bind(totals.total_discounts_cents)
        .bind(difference.cents())
        .bind(notes)
        .bind(operator_id)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::Core(CoreError::InvalidRegisterStatus {
                folio: session.folio,
                status: session.status,
            }));
        }

        tx.commit().await?;

        info!(
            folio = %session.folio,
            expected_cash_cents = totals.expected_cash_cents,
            counted_cash_cents = counted_cash_cents,
            difference_cents = difference.cents(),
            "Register session closed"
        );

        Ok(RegisterSession {
            status: RegisterStatus::Closed,
            closed_at: Some(now),
            total_sales_cents: totals.total_sales_cents,
            expected_cash_cents: totals.expected_cash_cents,
            counted_cash_cents,
            total_card_cents: totals.total_card_cents,
            total_transfer_cents: totals.total_transfer_cents,
            total_discounts_cents: totals.total_discounts_cents,
            difference_cents: difference.cents(),
            notes: notes.map(str::to_string),
            closed_by: Some(operator_id.to_string()),
            ..session
        })
    }

    /// Verifies a closed session (admin sign-off). Terminal.
    pub async fn verify(&self, session_id: &str, verified_by: &str) -> DbResult<RegisterSession> {
        let mut tx = self.pool.begin().await?;

        let session = fetch_session(&mut tx, session_id).await?;

        let result = sqlx::query(
            "UPDATE register_sessions SET status = 'verified', verified_by = ?2 \
             WHERE id = ?1 AND status = 'closed'",
        )
        .bind(session_id)
        .bind(verified_by)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::Core(CoreError::InvalidRegisterStatus {
                folio: session.folio,
                status: session.status,
            }));
        }

        tx.commit().await?;

        info!(folio = %session.folio, "Register session verified");

        Ok(RegisterSession {
            status: RegisterStatus::Verified,
            verified_by: Some(verified_by.to_string()),
            ..session
        })
    }

    /// Gets a session by ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<RegisterSession>> {
        let session = sqlx::query_as::<_, RegisterSession>(&format!(
            "SELECT {SESSION_COLUMNS} FROM register_sessions WHERE id = ?1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(session)
    }

    /// Lists sessions at a branch, newest first.
    pub async fn list_for_branch(
        &self,
        branch_id: &str,
        limit: i64,
    ) -> DbResult<Vec<RegisterSession>> {
        let sessions = sqlx::query_as::<_, RegisterSession>(&format!(
            "SELECT {SESSION_COLUMNS} FROM register_sessions \
             WHERE branch_id = ?1 ORDER BY opened_at DESC, rowid DESC LIMIT ?2"
        ))
        .bind(branch_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(sessions)
    }
}

// =============================================================================
// Transaction Helpers
// =============================================================================

async fn fetch_session(
    tx: &mut Transaction<'_, Sqlite>,
    session_id: &str,
) -> DbResult<RegisterSession> {
    let session = sqlx::query_as::<_, RegisterSession>(&format!(
        "SELECT {SESSION_COLUMNS} FROM register_sessions WHERE id = ?1"
    ))
    .bind(session_id)
    .fetch_optional(&mut **tx)
    .await?;

    session.ok_or_else(|| DbError::not_found("RegisterSession", session_id))
}

/// Recomputes a session's aggregate totals from its attached sales and
/// stores them, inside the caller's transaction.
///
/// Called whenever a sale attaches to or drops out of a session (posting,
/// cancellation). An open session keeps a zero difference until close; a
/// closed session re-derives the difference against the already-counted
/// cash, so cancelling a sale after the close shows up as an overage.
pub(crate) async fn recompute_session_totals(
    tx: &mut Transaction<'_, Sqlite>,
    session_id: &str,
) -> DbResult<()> {
    let session = fetch_session(tx, session_id).await?;
    let sales = fetch_session_sales(tx, session_id).await?;
    let totals = SettlementTotals::from_sales(&sales);

    let difference_cents = match session.status {
        RegisterStatus::Open => 0,
        _ => totals
            .difference(Money::from_cents(session.counted_cash_cents))
            .cents(),
    };

    sqlx::query(
        r#"
        UPDATE register_sessions SET
            total_sales_cents = ?2,
            expected_cash_cents = ?3,
            total_card_cents = ?4,
            total_transfer_cents = ?5,
            total_discounts_cents = ?6,
            difference_cents = ?7
        WHERE id = ?1
        "#,
    )
    .bind(session_id)
    .bind(totals.total_sales_cents)
    .bind(totals.expected_cash_cents)
    .bind(totals.total_card_cents)
    .bind(totals.total_transfer_cents)
    .bind(totals.total_discounts_cents)
    .bind(difference_cents)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

async fn fetch_session_sales(
    tx: &mut Transaction<'_, Sqlite>,
    session_id: &str,
) -> DbResult<Vec<Sale>> {
    let sales = sqlx::query_as::<_, Sale>(
        "SELECT id, branch_id, user_id, customer_id, folio, status, \
                subtotal_cents, discount_cents, discount_bps, total_cents, payment_method, \
                cash_received_cents, cash_change_cents, register_session_id, notes, \
                cancel_reason, cancelled_by, created_at, updated_at \
         FROM sales WHERE register_session_id = ?1",
    )
    .bind(session_id)
    .fetch_all(&mut **tx)
    .await?;

    Ok(sales)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use crate::repository::sale::NewSale;
    use chrono::Datelike;
    use mostrador_core::cart::Cart;
    use mostrador_core::types::{PaymentMethod, Product, Role, StockItem};

    struct Fixture {
        db: Database,
        branch: Branch,
        cashier_id: String,
        admin_id: String,
        stock: StockItem,
    }

    async fn setup() -> Fixture {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let branch = db
            .branches()
            .create("CEN", "Centro", None, None, None)
            .await
            .unwrap();
        let cashier = db
            .users()
            .create("cajero", "María", "$argon2id$fake", Role::Cashier, Some(&branch.id))
            .await
            .unwrap();
        let admin = db
            .users()
            .create("admin", "Luis", "$argon2id$fake", Role::Admin, Some(&branch.id))
            .await
            .unwrap();

        let now = Utc::now();
        let product = Product {
            id: Uuid::new_v4().to_string(),
            code: "ALIM-001".to_string(),
            name: "Croquetas".to_string(),
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
            product_id: product.id,
            branch_id: branch.id.clone(),
            price_cents: 5000,
            quantity: 0,
            min_quantity: 0,
            max_quantity: 1000,
            active: true,
            updated_at: now,
        };
        db.products().create_stock_item(&stock).await.unwrap();
        db.products()
            .receive_stock(&stock.id, 100, &cashier.id, None)
            .await
            .unwrap();
        let stock = db.products().get_stock_item(&stock.id).await.unwrap().unwrap();

        Fixture {
            db,
            branch,
            cashier_id: cashier.id,
            admin_id: admin.id,
            stock,
        }
    }

    async fn post(f: &Fixture, method: PaymentMethod, quantity: i64, received: i64) {
        let stock = f.db.products().get_stock_item(&f.stock.id).await.unwrap().unwrap();
        let mut cart = Cart::new();
        cart.add_line(&stock, "ALIM-001", "Croquetas", quantity).unwrap();
        f.db.sales()
            .post_sale(NewSale {
                cart: &cart,
                branch: &f.branch,
                user_id: &f.cashier_id,
                payment_method: method,
                cash_received_cents: received,
                notes: None,
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_open_close_exact_count() {
        let f = setup().await;

        let session = f.db.registers().open(&f.branch, &f.cashier_id).await.unwrap();
        assert_eq!(session.folio, format!("C-CEN-{}-000001", Utc::now().year()));

        // One $50.00 cash sale.
        post(&f, PaymentMethod::Cash, 1, 5000).await;

        let closed = f
            .db
            .registers()
            .close(&session.id, &f.cashier_id, 5000, None)
            .await
            .unwrap();
        assert_eq!(closed.status, RegisterStatus::Closed);
        assert_eq!(closed.expected_cash_cents, 5000);
        assert_eq!(closed.difference_cents, 0);
        assert_eq!(closed.total_sales_cents, 5000);
    }

    #[tokio::test]
    async fn test_mixed_counts_as_cash_card_does_not() {
        let f = setup().await;
        let session = f.db.registers().open(&f.branch, &f.cashier_id).await.unwrap();

        post(&f, PaymentMethod::Cash, 1, 5000).await; // $50 cash
        post(&f, PaymentMethod::Mixed, 2, 10000).await; // $100 mixed
        post(&f, PaymentMethod::Card, 1, 0).await; // $50 card

        let closed = f
            .db
            .registers()
            .close(&session.id, &f.cashier_id, 14000, None)
            .await
            .unwrap();

        assert_eq!(closed.expected_cash_cents, 15000);
        assert_eq!(closed.total_card_cents, 5000);
        assert_eq!(closed.difference_cents, -1000); // $10.00 short
    }

    #[tokio::test]
    async fn test_duplicate_open_rejected() {
        let f = setup().await;
        f.db.registers().open(&f.branch, &f.cashier_id).await.unwrap();

        let err = f.db.registers().open(&f.branch, &f.cashier_id).await;
        assert!(matches!(
            err,
            Err(DbError::Core(CoreError::RegisterAlreadyOpen { .. }))
        ));

        // A different operator can open their own session.
        assert!(f.db.registers().open(&f.branch, &f.admin_id).await.is_ok());
    }

    #[tokio::test]
    async fn test_only_operator_closes() {
        let f = setup().await;
        let session = f.db.registers().open(&f.branch, &f.cashier_id).await.unwrap();

        let err = f.db.registers().close(&session.id, &f.admin_id, 0, None).await;
        assert!(matches!(
            err,
            Err(DbError::Core(CoreError::NotSessionOperator { .. }))
        ));
    }

    #[tokio::test]
    async fn test_verify_requires_closed() {
        let f = setup().await;
        let session = f.db.registers().open(&f.branch, &f.cashier_id).await.unwrap();

        // Verifying an open session fails.
        let err = f.db.registers().verify(&session.id, &f.admin_id).await;
        assert!(matches!(
            err,
            Err(DbError::Core(CoreError::InvalidRegisterStatus { .. }))
        ));

        f.db.registers()
            .close(&session.id, &f.cashier_id, 0, None)
            .await
            .unwrap();
        let verified = f.db.registers().verify(&session.id, &f.admin_id).await.unwrap();
        assert_eq!(verified.status, RegisterStatus::Verified);

        // Verified is terminal.
        let err = f.db.registers().verify(&session.id, &f.admin_id).await;
        assert!(err.is_err());
        let err = f.db.registers().close(&session.id, &f.cashier_id, 0, None).await;
        assert!(err.is_err());
    }

    #[tokio::test]
    async fn test_open_session_totals_track_postings() {
        let f = setup().await;
        let session = f.db.registers().open(&f.branch, &f.cashier_id).await.unwrap();

        // A $100.00 cash sale shows up in the running totals right away.
        post(&f, PaymentMethod::Cash, 2, 10000).await;

        let open = f.db.registers().get_by_id(&session.id).await.unwrap().unwrap();
        assert_eq!(open.status, RegisterStatus::Open);
        assert_eq!(open.total_sales_cents, 10000);
        assert_eq!(open.expected_cash_cents, 10000);
        assert_eq!(open.difference_cents, 0);

        // Cancelling it while the session is open zeroes them again.
        let sales = f.db.sales().list_for_session(&session.id).await.unwrap();
        f.db.sales()
            .cancel_sale(&sales[0].id, &f.admin_id, "Error de captura")
            .await
            .unwrap();

        let open = f.db.registers().get_by_id(&session.id).await.unwrap().unwrap();
        assert_eq!(open.total_sales_cents, 0);
        assert_eq!(open.expected_cash_cents, 0);
    }

    #[tokio::test]
    async fn test_cancel_after_close_recomputes_frozen_totals() {
        let f = setup().await;
        let session = f.db.registers().open(&f.branch, &f.cashier_id).await.unwrap();

        post(&f, PaymentMethod::Cash, 2, 10000).await;

        let closed = f
            .db
            .registers()
            .close(&session.id, &f.cashier_id, 10000, None)
            .await
            .unwrap();
        assert_eq!(closed.difference_cents, 0);

        // Cancelling after the close drops the sale from the settlement;
        // the counted cash now reads as an overage.
        let sales = f.db.sales().list_for_session(&session.id).await.unwrap();
        f.db.sales()
            .cancel_sale(&sales[0].id, &f.admin_id, "Devolución completa")
            .await
            .unwrap();

        let session = f.db.registers().get_by_id(&session.id).await.unwrap().unwrap();
        assert_eq!(session.status, RegisterStatus::Closed);
        assert_eq!(session.total_sales_cents, 0);
        assert_eq!(session.expected_cash_cents, 0);
        assert_eq!(session.counted_cash_cents, 10000);
        assert_eq!(session.difference_cents, 10000);
    }

    #[tokio::test]
    async fn test_cancelled_sale_drops_out_of_settlement() {
        let f = setup().await;
        let session = f.db.registers().open(&f.branch, &f.cashier_id).await.unwrap();

        post(&f, PaymentMethod::Cash, 1, 5000).await;
        post(&f, PaymentMethod::Cash, 1, 5000).await;

        let sales = f.db.sales().list_for_session(&session.id).await.unwrap();
        f.db.sales()
            .cancel_sale(&sales[0].id, &f.admin_id, "Error de captura")
            .await
            .unwrap();

        let closed = f
            .db
            .registers()
            .close(&session.id, &f.cashier_id, 5000, None)
            .await
            .unwrap();
        assert_eq!(closed.expected_cash_cents, 5000);
        assert_eq!(closed.difference_cents, 0);
    }
}
