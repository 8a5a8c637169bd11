//! # Product Repository
//!
//! Database operations for the catalog (categories, suppliers, units,
//! products) and for per-branch stock items.
//!
//! ## Stock Mutation Rule
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Every change to stock_items.quantity writes a row in                  │
//! │  inventory_movements in the SAME transaction, recording the            │
//! │  before/after quantities. Stock history is reconstructible from        │
//! │  the movement log alone.                                               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Sale posting and transfers own their stock mutations (see the sale and
//! transfer repositories); this repository covers receipts and manual
//! adjustments.

use chrono::Utc;
use sqlx::{Sqlite, SqlitePool, Transaction};
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use mostrador_core::types::{
    Category, InventoryMovement, MovementKind, Product, StockItem, Supplier, Unit,
};
use mostrador_core::CoreError;

const PRODUCT_COLUMNS: &str = "id, code, name, description, category_id, supplier_id, unit_id, \
     average_cost_cents, active, created_at, updated_at";

const STOCK_COLUMNS: &str =
    "id, product_id, branch_id, price_cents, quantity, min_quantity, max_quantity, active, updated_at";

const MOVEMENT_COLUMNS: &str = "id, stock_item_id, kind, quantity, quantity_before, \
     quantity_after, reason, user_id, reference, created_at";

/// Repository for catalog and stock database operations.
#[derive(Debug, Clone)]
pub struct ProductRepository {
    pool: SqlitePool,
}

impl ProductRepository {
    /// Creates a new ProductRepository.
    pub fn new(pool: SqlitePool) -> Self {
        ProductRepository { pool }
    }

    // =========================================================================
    // Categories / Suppliers / Units
    // =========================================================================

    /// Creates a category.
    pub async fn create_category(
        &self,
        name: &str,
        description: Option<&str>,
        parent_id: Option<&str>,
    ) -> DbResult<Category> {
        let category = Category {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            description: description.map(str::to_string),
            parent_id: parent_id.map(str::to_string),
            active: true,
            created_at: Utc::now(),
        };

        sqlx::query(
            r#"
            INSERT INTO categories (id, name, description, parent_id, active, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(&category.id)
        .bind(&category.name)
        .bind(&category.description)
        .bind(&category.parent_id)
        .bind(category.active)
        .bind(category.created_at)
        .execute(&self.pool)
        .await?;

        Ok(category)
    }

    /// Lists active categories ordered by name.
    pub async fn list_categories(&self) -> DbResult<Vec<Category>> {
        let rows = sqlx::query_as::<_, Category>(
            "SELECT id, name, description, parent_id, active, created_at \
             FROM categories WHERE active = 1 ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    /// Creates a supplier.
    pub async fn create_supplier(
        &self,
        name: &str,
        phone: Option<&str>,
        email: Option<&str>,
        contact: Option<&str>,
    ) -> DbResult<Supplier> {
        let supplier = Supplier {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            phone: phone.map(str::to_string),
            email: email.map(str::to_string),
            contact: contact.map(str::to_string),
            active: true,
            created_at: Utc::now(),
        };

        sqlx::query(
            r#"
            INSERT INTO suppliers (id, name, phone, email, contact, active, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(&supplier.id)
        .bind(&supplier.name)
        .bind(&supplier.phone)
        .bind(&supplier.email)
        .bind(&supplier.contact)
        .bind(supplier.active)
        .bind(supplier.created_at)
        .execute(&self.pool)
        .await?;

        Ok(supplier)
    }

    /// Lists active suppliers ordered by name.
    pub async fn list_suppliers(&self) -> DbResult<Vec<Supplier>> {
        let rows = sqlx::query_as::<_, Supplier>(
            "SELECT id, name, phone, email, contact, active, created_at \
             FROM suppliers WHERE active = 1 ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    /// Creates a unit of measure.
    pub async fn create_unit(&self, name: &str, abbreviation: &str) -> DbResult<Unit> {
        let unit = Unit {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            abbreviation: abbreviation.to_string(),
        };

        sqlx::query("INSERT INTO units (id, name, abbreviation) VALUES (?1, ?2, ?3)")
            .bind(&unit.id)
            .bind(&unit.name)
            .bind(&unit.abbreviation)
            .execute(&self.pool)
            .await?;

        Ok(unit)
    }

    /// Lists all units.
    pub async fn list_units(&self) -> DbResult<Vec<Unit>> {
        let rows =
            sqlx::query_as::<_, Unit>("SELECT id, name, abbreviation FROM units ORDER BY name")
                .fetch_all(&self.pool)
                .await?;

        Ok(rows)
    }

    // =========================================================================
    // Products
    // =========================================================================

    /// Inserts a product.
    pub async fn insert_product(&self, product: &Product) -> DbResult<()> {
        debug!(code = %product.code, "Inserting product");

        sqlx::query(
            r#"
            INSERT INTO products (
                id, code, name, description, category_id, supplier_id, unit_id,
                average_cost_cents, active, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
        )
        .bind(&product.id)
        .bind(&product.code)
        .bind(&product.name)
        .bind(&product.description)
        .bind(&product.category_id)
        .bind(&product.supplier_id)
        .bind(&product.unit_id)
        .bind(product.average_cost_cents)
        .bind(product.active)
        .bind(product.created_at)
        .bind(product.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Updates a product's editable fields.
    pub async fn update_product(&self, product: &Product) -> DbResult<()> {
        let now = Utc::now();

        let result = sqlx::query(
            r#"
            UPDATE products SET
                name = ?2,
                description = ?3,
                category_id = ?4,
                supplier_id = ?5,
                unit_id = ?6,
                average_cost_cents = ?7,
                active = ?8,
                updated_at = ?9
            WHERE id = ?1
            "#,
        )
        .bind(&product.id)
        .bind(&product.name)
        .bind(&product.description)
        .bind(&product.category_id)
        .bind(&product.supplier_id)
        .bind(&product.unit_id)
        .bind(product.average_cost_cents)
        .bind(product.active)
        .bind(now)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Product", &product.id));
        }

        Ok(())
    }

    /// Gets a product by ID.
    pub async fn get_product(&self, id: &str) -> DbResult<Option<Product>> {
        let product = sqlx::query_as::<_, Product>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = ?1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(product)
    }

    /// Gets a product by business code.
    pub async fn get_product_by_code(&self, code: &str) -> DbResult<Option<Product>> {
        let product = sqlx::query_as::<_, Product>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE code = ?1"
        ))
        .bind(code)
        .fetch_optional(&self.pool)
        .await?;

        Ok(product)
    }

    /// Searches active products by code or name (case-insensitive substring).
    pub async fn search_products(&self, query: &str, limit: i64) -> DbResult<Vec<Product>> {
        let pattern = format!("%{}%", query);

        let products = sqlx::query_as::<_, Product>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products \
             WHERE active = 1 AND (code LIKE ?1 OR name LIKE ?1) \
             ORDER BY name LIMIT ?2"
        ))
        .bind(&pattern)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(products)
    }

    // =========================================================================
    // Stock Items
    // =========================================================================

    /// Creates a stock item for a product at a branch.
    pub async fn create_stock_item(&self, item: &StockItem) -> DbResult<()> {
        debug!(product_id = %item.product_id, branch_id = %item.branch_id, "Creating stock item");

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
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Gets a stock item by ID.
    pub async fn get_stock_item(&self, id: &str) -> DbResult<Option<StockItem>> {
        let item = sqlx::query_as::<_, StockItem>(&format!(
            "SELECT {STOCK_COLUMNS} FROM stock_items WHERE id = ?1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(item)
    }

    /// Gets the stock item for a product at a branch.
    pub async fn get_stock_for_product(
        &self,
        product_id: &str,
        branch_id: &str,
    ) -> DbResult<Option<StockItem>> {
        let item = sqlx::query_as::<_, StockItem>(&format!(
            "SELECT {STOCK_COLUMNS} FROM stock_items WHERE product_id = ?1 AND branch_id = ?2"
        ))
        .bind(product_id)
        .bind(branch_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(item)
    }

    /// Lists active stock items at a branch.
    pub async fn list_stock_for_branch(&self, branch_id: &str) -> DbResult<Vec<StockItem>> {
        let items = sqlx::query_as::<_, StockItem>(&format!(
            "SELECT {STOCK_COLUMNS} FROM stock_items WHERE branch_id = ?1 AND active = 1"
        ))
        .bind(branch_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(items)
    }

    /// Lists stock items at a branch at or below their minimum threshold.
    pub async fn list_low_stock(&self, branch_id: &str) -> DbResult<Vec<StockItem>> {
        let items = sqlx::query_as::<_, StockItem>(&format!(
            "SELECT {STOCK_COLUMNS} FROM stock_items \
             WHERE branch_id = ?1 AND active = 1 AND quantity <= min_quantity"
        ))
        .bind(branch_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(items)
    }

    /// Updates a stock item's price and thresholds (not its quantity).
    pub async fn update_stock_item(&self, item: &StockItem) -> DbResult<()> {
        let now = Utc::now();

        let result = sqlx::query(
            r#"
            UPDATE stock_items SET
                price_cents = ?2,
                min_quantity = ?3,
                max_quantity = ?4,
                active = ?5,
                updated_at = ?6
            WHERE id = ?1
            "#,
        )
        .bind(&item.id)
        .bind(item.price_cents)
        .bind(item.min_quantity)
        .bind(item.max_quantity)
        .bind(item.active)
        .bind(now)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("StockItem", &item.id));
        }

        Ok(())
    }

    /// Records a stock receipt (purchase arrival): increments quantity and
    /// writes an inbound movement.
    pub async fn receive_stock(
        &self,
        stock_item_id: &str,
        quantity: i64,
        user_id: &str,
        reference: Option<&str>,
    ) -> DbResult<StockItem> {
        let mut tx = self.pool.begin().await?;

        apply_stock_delta(
            &mut tx,
            stock_item_id,
            quantity,
            MovementKind::Inbound,
            "Entrada de mercancía",
            user_id,
            reference,
        )
        .await?;

        let item = fetch_stock_item(&mut tx, stock_item_id).await?;
        tx.commit().await?;

        Ok(item)
    }

    /// Applies a manual adjustment (signed delta). The guarded update keeps
    /// quantity from going negative.
    pub async fn adjust_stock(
        &self,
        stock_item_id: &str,
        delta: i64,
        reason: &str,
        user_id: &str,
    ) -> DbResult<StockItem> {
        let mut tx = self.pool.begin().await?;

        apply_stock_delta(
            &mut tx,
            stock_item_id,
            delta,
            MovementKind::Adjustment,
            reason,
            user_id,
            None,
        )
        .await?;

        let item = fetch_stock_item(&mut tx, stock_item_id).await?;
        tx.commit().await?;

        Ok(item)
    }

    /// Lists recent movements for a stock item, newest first.
    pub async fn list_movements(
        &self,
        stock_item_id: &str,
        limit: i64,
    ) -> DbResult<Vec<InventoryMovement>> {
        let movements = sqlx::query_as::<_, InventoryMovement>(&format!(
            "SELECT {MOVEMENT_COLUMNS} FROM inventory_movements \
             WHERE stock_item_id = ?1 ORDER BY created_at DESC, rowid DESC LIMIT ?2"
        ))
        .bind(stock_item_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(movements)
    }
}

// =============================================================================
// Transaction Helpers (shared with sale/transfer repositories)
// =============================================================================

/// Applies a signed quantity delta to a stock item and writes the movement
/// row, inside the caller's transaction.
///
/// The UPDATE is guarded (`quantity + delta >= 0`), so a concurrent mutation
/// between read and write cannot push the row negative; when the guard fails
/// the current quantity is re-read for the error.
pub(crate) async fn apply_stock_delta(
    tx: &mut Transaction<'_, Sqlite>,
    stock_item_id: &str,
    delta: i64,
    kind: MovementKind,
    reason: &str,
    user_id: &str,
    reference: Option<&str>,
) -> DbResult<()> {
    let now = Utc::now();

    let result = sqlx::query(
        r#"
        UPDATE stock_items
        SET quantity = quantity + ?2, updated_at = ?3
        WHERE id = ?1 AND quantity + ?2 >= 0
        "#,
    )
    .bind(stock_item_id)
    .bind(delta)
    .bind(now)
    .execute(&mut **tx)
    .await?;

    if result.rows_affected() == 0 {
        let item = fetch_stock_item(tx, stock_item_id).await?;
        return Err(DbError::Core(CoreError::InsufficientStock {
            code: stock_item_id.to_string(),
            available: item.quantity,
            requested: -delta,
        }));
    }

    let item = fetch_stock_item(tx, stock_item_id).await?;

    sqlx::query(
        r#"
        INSERT INTO inventory_movements (
            id, stock_item_id, kind, quantity,
            quantity_before, quantity_after, reason, user_id, reference, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(stock_item_id)
    .bind(kind)
    .bind(delta.abs())
    .bind(item.quantity - delta)
    .bind(item.quantity)
    .bind(reason)
    .bind(user_id)
    .bind(reference)
    .bind(now)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

/// Fetches a stock item inside a transaction, erroring when missing.
pub(crate) async fn fetch_stock_item(
    tx: &mut Transaction<'_, Sqlite>,
    stock_item_id: &str,
) -> DbResult<StockItem> {
    let item = sqlx::query_as::<_, StockItem>(&format!(
        "SELECT {STOCK_COLUMNS} FROM stock_items WHERE id = ?1"
    ))
    .bind(stock_item_id)
    .fetch_optional(&mut **tx)
    .await?;

    item.ok_or_else(|| DbError::not_found("StockItem", stock_item_id))
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use crate::pool::{Database, DbConfig};
    use chrono::Utc;
    use mostrador_core::types::{MovementKind, Product, StockItem};
    use uuid::Uuid;

    async fn setup() -> (Database, String, String) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let branch = db
            .branches()
            .create("CEN", "Centro", None, None, None)
            .await
            .unwrap();
        let user = db
            .users()
            .create(
                "admin",
                "Admin",
                "$argon2id$fake",
                mostrador_core::types::Role::Admin,
                Some(&branch.id),
            )
            .await
            .unwrap();
        (db, branch.id, user.id)
    }

    fn product(code: &str, name: &str) -> Product {
        let now = Utc::now();
        Product {
            id: Uuid::new_v4().to_string(),
            code: code.to_string(),
            name: name.to_string(),
            description: None,
            category_id: None,
            supplier_id: None,
            unit_id: None,
            average_cost_cents: 0,
            active: true,
            created_at: now,
            updated_at: now,
        }
    }

    fn stock_item(product_id: &str, branch_id: &str, price_cents: i64) -> StockItem {
        StockItem {
            id: Uuid::new_v4().to_string(),
            product_id: product_id.to_string(),
            branch_id: branch_id.to_string(),
            price_cents,
            quantity: 0,
            min_quantity: 5,
            max_quantity: 100,
            active: true,
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_product_search() {
        let (db, _branch_id, _user_id) = setup().await;
        let repo = db.products();

        repo.insert_product(&product("ALIM-001", "Croquetas Premium 5kg"))
            .await
            .unwrap();
        repo.insert_product(&product("JUG-001", "Pelota de hule"))
            .await
            .unwrap();

        let found = repo.search_products("croquetas", 20).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].code, "ALIM-001");

        let by_code = repo.search_products("JUG", 20).await.unwrap();
        assert_eq!(by_code.len(), 1);
    }

    #[tokio::test]
    async fn test_receive_and_adjust_stock_writes_movements() {
        let (db, branch_id, user_id) = setup().await;
        let repo = db.products();

        let p = product("ALIM-001", "Croquetas");
        repo.insert_product(&p).await.unwrap();
        let item = stock_item(&p.id, &branch_id, 9900);
        repo.create_stock_item(&item).await.unwrap();

        let after = repo
            .receive_stock(&item.id, 50, &user_id, Some("COMPRA-0001"))
            .await
            .unwrap();
        assert_eq!(after.quantity, 50);

        let after = repo
            .adjust_stock(&item.id, -3, "Merma", &user_id)
            .await
            .unwrap();
        assert_eq!(after.quantity, 47);

        let movements = repo.list_movements(&item.id, 10).await.unwrap();
        assert_eq!(movements.len(), 2);
        assert_eq!(movements[0].kind, MovementKind::Adjustment);
        assert_eq!(movements[0].quantity_before, 50);
        assert_eq!(movements[0].quantity_after, 47);
        assert_eq!(movements[1].kind, MovementKind::Inbound);
        assert_eq!(movements[1].quantity_before, 0);
    }

    #[tokio::test]
    async fn test_adjust_below_zero_rejected() {
        let (db, branch_id, user_id) = setup().await;
        let repo = db.products();

        let p = product("ALIM-001", "Croquetas");
        repo.insert_product(&p).await.unwrap();
        let item = stock_item(&p.id, &branch_id, 9900);
        repo.create_stock_item(&item).await.unwrap();
        repo.receive_stock(&item.id, 2, &user_id, None).await.unwrap();

        assert!(repo
            .adjust_stock(&item.id, -5, "Merma", &user_id)
            .await
            .is_err());

        let unchanged = repo.get_stock_item(&item.id).await.unwrap().unwrap();
        assert_eq!(unchanged.quantity, 2);
    }

    #[tokio::test]
    async fn test_low_stock_listing() {
        let (db, branch_id, user_id) = setup().await;
        let repo = db.products();

        let p = product("ALIM-001", "Croquetas");
        repo.insert_product(&p).await.unwrap();
        let item = stock_item(&p.id, &branch_id, 9900);
        repo.create_stock_item(&item).await.unwrap();
        repo.receive_stock(&item.id, 4, &user_id, None).await.unwrap();

        // quantity 4 <= min 5
        let low = repo.list_low_stock(&branch_id).await.unwrap();
        assert_eq!(low.len(), 1);

        repo.receive_stock(&item.id, 20, &user_id, None).await.unwrap();
        let low = repo.list_low_stock(&branch_id).await.unwrap();
        assert!(low.is_empty());
    }
}
