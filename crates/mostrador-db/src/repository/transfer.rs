//! # Transfer Repository
//!
//! Inter-branch stock transfers.
//!
//! ## Transfer Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Transfer Lifecycle                                 │
//! │                                                                         │
//! │  create()   ──► Pending     lines requested, no stock touched           │
//! │                   │                                                     │
//! │  dispatch() ──►  InTransit  source stock decremented (guarded),         │
//! │                   │         transfer movements written                   │
//! │  receive()  ──►  Completed  destination stock incremented, creating     │
//! │                             the stock item there if missing             │
//! │                                                                         │
//! │  cancel(): Pending → Cancelled (nothing to undo)                        │
//! │            InTransit → Cancelled (source stock restored)                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Stock is attributed to exactly one branch at any moment: in-transit
//! goods belong to neither count, which matches the physical truck.

use chrono::Utc;
use sqlx::{Sqlite, SqlitePool, Transaction};
use tracing::info;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use crate::repository::product::apply_stock_delta;
use crate::repository::sale::next_reference_in_tx;
use mostrador_core::error::ValidationError;
use mostrador_core::types::{Branch, MovementKind, StockItem, Transfer, TransferLine, TransferStatus};
use mostrador_core::{CoreError, FOLIO_PREFIX_TRANSFER};

const TRANSFER_COLUMNS: &str = "id, code, source_branch_id, destination_branch_id, status, \
     reason, requested_by, sent_by, received_by, requested_at, sent_at, received_at";

const LINE_COLUMNS: &str =
    "id, transfer_id, product_id, requested_quantity, sent_quantity, received_quantity";

/// A requested product line for a new transfer.
#[derive(Debug, Clone)]
pub struct NewTransferLine {
    pub product_id: String,
    pub quantity: i64,
}

/// Repository for inter-branch transfer operations.
#[derive(Debug, Clone)]
pub struct TransferRepository {
    pool: SqlitePool,
}

impl TransferRepository {
    /// Creates a new TransferRepository.
    pub fn new(pool: SqlitePool) -> Self {
        TransferRepository { pool }
    }

    /// Creates a pending transfer request. No stock moves yet.
    pub async fn create(
        &self,
        source: &Branch,
        destination_branch_id: &str,
        reason: &str,
        requested_by: &str,
        lines: &[NewTransferLine],
    ) -> DbResult<Transfer> {
        if lines.is_empty() {
            return Err(DbError::Core(CoreError::Validation(
                ValidationError::Required {
                    field: "lines".to_string(),
                },
            )));
        }
        if source.id == destination_branch_id {
            return Err(DbError::Core(CoreError::Validation(
                ValidationError::InvalidFormat {
                    field: "destination_branch_id".to_string(),
                    reason: "source and destination must differ".to_string(),
                },
            )));
        }
        for line in lines {
            if line.quantity <= 0 {
                return Err(DbError::Core(CoreError::Validation(
                    ValidationError::MustBePositive {
                        field: "quantity".to_string(),
                    },
                )));
            }
        }

        let mut tx = self.pool.begin().await?;

        let code = next_reference_in_tx(
            &mut tx,
            "transfers",
            "code",
            FOLIO_PREFIX_TRANSFER,
            &source.code,
        )
        .await?;

        let transfer = Transfer {
            id: Uuid::new_v4().to_string(),
            code: code.clone(),
            source_branch_id: source.id.clone(),
            destination_branch_id: destination_branch_id.to_string(),
            status: TransferStatus::Pending,
            reason: reason.to_string(),
            requested_by: requested_by.to_string(),
            sent_by: None,
            received_by: None,
            requested_at: Utc::now(),
            sent_at: None,
            received_at: None,
        };

        sqlx::query(
            r#"
            INSERT INTO transfers (
                id, code, source_branch_id, destination_branch_id,
                status, reason, requested_by, requested_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(&transfer.id)
        .bind(&transfer.code)
        .bind(&transfer.source_branch_id)
        .bind(&transfer.destination_branch_id)
        .bind(transfer.status)
        .bind(&transfer.reason)
        .bind(&transfer.requested_by)
        .bind(transfer.requested_at)
        .execute(&mut *tx)
        .await?;

        for line in lines {
            sqlx::query(
                r#"
                INSERT INTO transfer_lines (
                    id, transfer_id, product_id, requested_quantity,
                    sent_quantity, received_quantity
                ) VALUES (?1, ?2, ?3, ?4, 0, 0)
                "#,
            )
            .bind(Uuid::new_v4().to_string())
            .bind(&transfer.id)
            .bind(&line.product_id)
            .bind(line.quantity)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        info!(code = %transfer.code, lines = lines.len(), "Transfer requested");

        Ok(transfer)
    }

    /// Dispatches a pending transfer: decrements source stock and marks the
    /// transfer in transit. Each line ships its full requested quantity.
    pub async fn dispatch(&self, transfer_id: &str, user_id: &str) -> DbResult<Transfer> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let transfer = fetch_transfer(&mut tx, transfer_id).await?;
        let claimed = sqlx::query(
            "UPDATE transfers SET status = 'in_transit', sent_by = ?2, sent_at = ?3 \
             WHERE id = ?1 AND status = 'pending'",
        )
        .bind(transfer_id)
        .bind(user_id)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        if claimed.rows_affected() == 0 {
            return Err(DbError::Core(CoreError::InvalidTransferStatus {
                code: transfer.code,
                status: transfer.status,
            }));
        }

        let lines = fetch_lines(&mut tx, transfer_id).await?;
        let reference = format!("TRASPASO-{}", transfer.code);

        for line in &lines {
            let stock = fetch_stock_for_product(&mut tx, &line.product_id, &transfer.source_branch_id)
                .await?
                .ok_or_else(|| DbError::not_found("StockItem", &line.product_id))?;

            apply_stock_delta(
                &mut tx,
                &stock.id,
                -line.requested_quantity,
                MovementKind::Transfer,
                "Salida por traspaso",
                user_id,
                Some(&reference),
            )
            .await?;

            sqlx::query("UPDATE transfer_lines SET sent_quantity = ?2 WHERE id = ?1")
                .bind(&line.id)
                .bind(line.requested_quantity)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;

        info!(code = %transfer.code, "Transfer dispatched");

        Ok(Transfer {
            status: TransferStatus::InTransit,
            sent_by: Some(user_id.to_string()),
            sent_at: Some(now),
            ..transfer
        })
    }

    /// Receives an in-transit transfer at the destination: increments
    /// destination stock (creating stock items there as needed) and marks
    /// the transfer completed.
    pub async fn receive(&self, transfer_id: &str, user_id: &str) -> DbResult<Transfer> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let transfer = fetch_transfer(&mut tx, transfer_id).await?;
        let claimed = sqlx::query(
            "UPDATE transfers SET status = 'completed', received_by = ?2, received_at = ?3 \
             WHERE id = ?1 AND status = 'in_transit'",
        )
        .bind(transfer_id)
        .bind(user_id)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        if claimed.rows_affected() == 0 {
            return Err(DbError::Core(CoreError::InvalidTransferStatus {
                code: transfer.code,
                status: transfer.status,
            }));
        }

        let lines = fetch_lines(&mut tx, transfer_id).await?;
        let reference = format!("TRASPASO-{}", transfer.code);

        for line in &lines {
            if line.sent_quantity == 0 {
                continue;
            }

            let destination_stock = match fetch_stock_for_product(
                &mut tx,
                &line.product_id,
                &transfer.destination_branch_id,
            )
            .await?
            {
                Some(stock) => stock,
                None => {
                    // First arrival of this product at the destination:
                    // create the stock item, copying the source's price.
                    let source_stock = fetch_stock_for_product(
                        &mut tx,
                        &line.product_id,
                        &transfer.source_branch_id,
                    )
                    .await?
                    .ok_or_else(|| DbError::not_found("StockItem", &line.product_id))?;

                    create_stock_item_in_tx(
                        &mut tx,
                        &line.product_id,
                        &transfer.destination_branch_id,
                        &source_stock,
                    )
                    .await?
                }
            };

            apply_stock_delta(
                &mut tx,
                &destination_stock.id,
                line.sent_quantity,
                MovementKind::Transfer,
                "Entrada por traspaso",
                user_id,
                Some(&reference),
            )
            .await?;

            sqlx::query("UPDATE transfer_lines SET received_quantity = ?2 WHERE id = ?1")
                .bind(&line.id)
                .bind(line.sent_quantity)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;

        info!(code = %transfer.code, "Transfer received");

        Ok(Transfer {
            status: TransferStatus::Completed,
            received_by: Some(user_id.to_string()),
            received_at: Some(now),
            ..transfer
        })
    }

    /// Cancels a pending or in-transit transfer. An in-transit cancellation
    /// restores source stock.
    pub async fn cancel(&self, transfer_id: &str, user_id: &str) -> DbResult<Transfer> {
        let mut tx = self.pool.begin().await?;

        let transfer = fetch_transfer(&mut tx, transfer_id).await?;

        match transfer.status {
            TransferStatus::Pending | TransferStatus::InTransit => {}
            _ => {
                return Err(DbError::Core(CoreError::InvalidTransferStatus {
                    code: transfer.code,
                    status: transfer.status,
                }));
            }
        }

        if transfer.status == TransferStatus::InTransit {
            let lines = fetch_lines(&mut tx, transfer_id).await?;
            let reference = format!("TRASPASO-CANC-{}", transfer.code);

            for line in &lines {
                if line.sent_quantity == 0 {
                    continue;
                }
                let stock =
                    fetch_stock_for_product(&mut tx, &line.product_id, &transfer.source_branch_id)
                        .await?
                        .ok_or_else(|| DbError::not_found("StockItem", &line.product_id))?;

                apply_stock_delta(
                    &mut tx,
                    &stock.id,
                    line.sent_quantity,
                    MovementKind::Transfer,
                    "Cancelación de traspaso",
                    user_id,
                    Some(&reference),
                )
                .await?;
            }
        }

        sqlx::query("UPDATE transfers SET status = 'cancelled' WHERE id = ?1")
            .bind(transfer_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        info!(code = %transfer.code, "Transfer cancelled");

        Ok(Transfer {
            status: TransferStatus::Cancelled,
            ..transfer
        })
    }

    /// Gets a transfer by ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Transfer>> {
        let transfer = sqlx::query_as::<_, Transfer>(&format!(
            "SELECT {TRANSFER_COLUMNS} FROM transfers WHERE id = ?1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(transfer)
    }

    /// Gets a transfer's lines.
    pub async fn get_lines(&self, transfer_id: &str) -> DbResult<Vec<TransferLine>> {
        let lines = sqlx::query_as::<_, TransferLine>(&format!(
            "SELECT {LINE_COLUMNS} FROM transfer_lines WHERE transfer_id = ?1 ORDER BY rowid"
        ))
        .bind(transfer_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(lines)
    }

    /// Lists transfers touching a branch (as source or destination), newest
    /// first.
    pub async fn list_for_branch(&self, branch_id: &str, limit: i64) -> DbResult<Vec<Transfer>> {
        let transfers = sqlx::query_as::<_, Transfer>(&format!(
            "SELECT {TRANSFER_COLUMNS} FROM transfers \
             WHERE source_branch_id = ?1 OR destination_branch_id = ?1 \
             ORDER BY requested_at DESC, rowid DESC LIMIT ?2"
        ))
        .bind(branch_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(transfers)
    }
}

// =============================================================================
// Transaction Helpers
// =============================================================================

async fn fetch_transfer(tx: &mut Transaction<'_, Sqlite>, id: &str) -> DbResult<Transfer> {
    let transfer = sqlx::query_as::<_, Transfer>(&format!(
        "SELECT {TRANSFER_COLUMNS} FROM transfers WHERE id = ?1"
    ))
    .bind(id)
    .fetch_optional(&mut **tx)
    .await?;

    transfer.ok_or_else(|| DbError::not_found("Transfer", id))
}

async fn fetch_lines(
    tx: &mut Transaction<'_, Sqlite>,
    transfer_id: &str,
) -> DbResult<Vec<TransferLine>> {
    let lines = sqlx::query_as::<_, TransferLine>(&format!(
        "SELECT {LINE_COLUMNS} FROM transfer_lines WHERE transfer_id = ?1 ORDER BY rowid"
    ))
    .bind(transfer_id)
    .fetch_all(&mut **tx)
    .await?;

    Ok(lines)
}

async fn fetch_stock_for_product(
    tx: &mut Transaction<'_, Sqlite>,
    product_id: &str,
    branch_id: &str,
) -> DbResult<Option<StockItem>> {
    let stock = sqlx::query_as::<_, StockItem>(
        "SELECT id, product_id, branch_id, price_cents, quantity, min_quantity, \
                max_quantity, active, updated_at \
         FROM stock_items WHERE product_id = ?1 AND branch_id = ?2",
    )
    .bind(product_id)
    .bind(branch_id)
    .fetch_optional(&mut **tx)
    .await?;

    Ok(stock)
}

async fn create_stock_item_in_tx(
    tx: &mut Transaction<'_, Sqlite>,
    product_id: &str,
    branch_id: &str,
    template: &StockItem,
) -> DbResult<StockItem> {
    let item = StockItem {
        id: Uuid::new_v4().to_string(),
        product_id: product_id.to_string(),
        branch_id: branch_id.to_string(),
        price_cents: template.price_cents,
        quantity: 0,
        min_quantity: template.min_quantity,
        max_quantity: template.max_quantity,
        active: true,
        updated_at: Utc::now(),
    };

    sqlx::query(
        r#"
        INSERT INTO stock_items (
            id, product_id, branch_id, price_cents, quantity,
            min_quantity, max_quantity, active, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
        "#,
    )
    .bind(&item.id)
    .bind(&item.product_id)
    .bind(&item.branch_id)
    .bind(item.price_cents)
    .bind(item.quantity)
    .bind(item.min_quantity)
    .bind(item.max_quantity)
    .bind(item.active)
    .bind(item.updated_at)
    .execute(&mut **tx)
    .await?;

    Ok(item)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use chrono::Datelike;
    use mostrador_core::types::{Product, Role};

    struct Fixture {
        db: Database,
        source: Branch,
        destination: Branch,
        admin_id: String,
        product_id: String,
        source_stock_id: String,
    }

    async fn setup() -> Fixture {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let source = db.branches().create("CEN", "Centro", None, None, None).await.unwrap();
        let destination = db.branches().create("NOR", "Norte", None, None, None).await.unwrap();
        let admin = db
            .users()
            .create("admin", "Luis", "$argon2id$fake", Role::Admin, Some(&source.id))
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
            product_id: product.id.clone(),
            branch_id: source.id.clone(),
            price_cents: 9900,
            quantity: 0,
            min_quantity: 5,
            max_quantity: 100,
            active: true,
            updated_at: now,
        };
        db.products().create_stock_item(&stock).await.unwrap();
        db.products().receive_stock(&stock.id, 30, &admin.id, None).await.unwrap();

        Fixture {
            db,
            source,
            destination,
            admin_id: admin.id,
            product_id: product.id,
            source_stock_id: stock.id,
        }
    }

    fn lines(product_id: &str, quantity: i64) -> Vec<NewTransferLine> {
        vec![NewTransferLine {
            product_id: product_id.to_string(),
            quantity,
        }]
    }

    #[tokio::test]
    async fn test_full_transfer_flow() {
        let f = setup().await;
        let repo = f.db.transfers();

        let transfer = repo
            .create(
                &f.source,
                &f.destination.id,
                "Reabasto",
                &f.admin_id,
                &lines(&f.product_id, 10),
            )
            .await
            .unwrap();
        assert_eq!(transfer.status, TransferStatus::Pending);
        assert_eq!(transfer.code, format!("T-CEN-{}-000001", Utc::now().year()));

        // Pending touches no stock.
        let stock = f.db.products().get_stock_item(&f.source_stock_id).await.unwrap().unwrap();
        assert_eq!(stock.quantity, 30);

        let transfer = repo.dispatch(&transfer.id, &f.admin_id).await.unwrap();
        assert_eq!(transfer.status, TransferStatus::InTransit);
        let stock = f.db.products().get_stock_item(&f.source_stock_id).await.unwrap().unwrap();
        assert_eq!(stock.quantity, 20);

        // In transit: destination has nothing yet.
        assert!(f
            .db
            .products()
            .get_stock_for_product(&f.product_id, &f.destination.id)
            .await
            .unwrap()
            .is_none());

        let transfer = repo.receive(&transfer.id, &f.admin_id).await.unwrap();
        assert_eq!(transfer.status, TransferStatus::Completed);

        let dest_stock = f
            .db
            .products()
            .get_stock_for_product(&f.product_id, &f.destination.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(dest_stock.quantity, 10);
        assert_eq!(dest_stock.price_cents, 9900); // copied from source

        let transfer_lines = repo.get_lines(&transfer.id).await.unwrap();
        assert_eq!(transfer_lines[0].sent_quantity, 10);
        assert_eq!(transfer_lines[0].received_quantity, 10);
    }

    #[tokio::test]
    async fn test_dispatch_insufficient_stock_rolls_back() {
        let f = setup().await;
        let repo = f.db.transfers();

        let transfer = repo
            .create(&f.source, &f.destination.id, "Reabasto", &f.admin_id, &lines(&f.product_id, 99))
            .await
            .unwrap();

        assert!(repo.dispatch(&transfer.id, &f.admin_id).await.is_err());

        // Still pending, stock untouched.
        let fetched = repo.get_by_id(&transfer.id).await.unwrap().unwrap();
        assert_eq!(fetched.status, TransferStatus::Pending);
        let stock = f.db.products().get_stock_item(&f.source_stock_id).await.unwrap().unwrap();
        assert_eq!(stock.quantity, 30);
    }

    #[tokio::test]
    async fn test_cancel_in_transit_restores_source() {
        let f = setup().await;
        let repo = f.db.transfers();

        let transfer = repo
            .create(&f.source, &f.destination.id, "Reabasto", &f.admin_id, &lines(&f.product_id, 10))
            .await
            .unwrap();
        repo.dispatch(&transfer.id, &f.admin_id).await.unwrap();

        let cancelled = repo.cancel(&transfer.id, &f.admin_id).await.unwrap();
        assert_eq!(cancelled.status, TransferStatus::Cancelled);

        let stock = f.db.products().get_stock_item(&f.source_stock_id).await.unwrap().unwrap();
        assert_eq!(stock.quantity, 30);
    }

    #[tokio::test]
    async fn test_invalid_transitions_rejected() {
        let f = setup().await;
        let repo = f.db.transfers();

        let transfer = repo
            .create(&f.source, &f.destination.id, "Reabasto", &f.admin_id, &lines(&f.product_id, 5))
            .await
            .unwrap();

        // Receive before dispatch fails.
        assert!(repo.receive(&transfer.id, &f.admin_id).await.is_err());

        repo.dispatch(&transfer.id, &f.admin_id).await.unwrap();
        repo.receive(&transfer.id, &f.admin_id).await.unwrap();

        // Completed is terminal.
        assert!(repo.cancel(&transfer.id, &f.admin_id).await.is_err());
        assert!(repo.dispatch(&transfer.id, &f.admin_id).await.is_err());
    }

    #[tokio::test]
    async fn test_same_branch_rejected() {
        let f = setup().await;
        let repo = f.db.transfers();

        let err = repo
            .create(&f.source, &f.source.id, "Reabasto", &f.admin_id, &lines(&f.product_id, 5))
            .await;
        assert!(err.is_err());
    }
}
