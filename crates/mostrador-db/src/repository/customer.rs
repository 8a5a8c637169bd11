//! # Customer Repository
//!
//! Database operations for customers and their discount audit trail.
//!
//! ## Discount Changes
//! Tier and discount are never updated through the profile path. They change
//! only via [`CustomerRepository::set_discount`], which validates the new
//! value against the tier bounds and appends a `discount_changes` audit row
//! in the same transaction.

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use mostrador_core::types::{Customer, CustomerTier, DiscountChange};
use mostrador_core::CoreError;

const CUSTOMER_COLUMNS: &str = "id, code, first_name, last_name, phone, email, tier, \
     discount_bps, branch_id, notes, active, created_at, updated_at";

/// Repository for customer database operations.
#[derive(Debug, Clone)]
pub struct CustomerRepository {
    pool: SqlitePool,
}

impl CustomerRepository {
    /// Creates a new CustomerRepository.
    pub fn new(pool: SqlitePool) -> Self {
        CustomerRepository { pool }
    }

    /// Inserts a customer. The discount must be within the tier's bounds.
    pub async fn insert(&self, customer: &Customer) -> DbResult<()> {
        customer
            .tier
            .validate_discount(customer.discount_bps)
            .map_err(CoreError::from)?;

        debug!(code = %customer.code, "Inserting customer");

        sqlx::query(
            r#"
            INSERT INTO customers (
                id, code, first_name, last_name, phone, email,
                tier, discount_bps, branch_id, notes, active,
                created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            "#,
        )
        .bind(&customer.id)
        .bind(&customer.code)
        .bind(&customer.first_name)
        .bind(&customer.last_name)
        .bind(&customer.phone)
        .bind(&customer.email)
        .bind(customer.tier)
        .bind(customer.discount_bps)
        .bind(&customer.branch_id)
        .bind(&customer.notes)
        .bind(customer.active)
        .bind(customer.created_at)
        .bind(customer.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Gets a customer by ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Customer>> {
        let customer = sqlx::query_as::<_, Customer>(&format!(
            "SELECT {CUSTOMER_COLUMNS} FROM customers WHERE id = ?1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(customer)
    }

    /// Gets a customer by business code.
    pub async fn get_by_code(&self, code: &str) -> DbResult<Option<Customer>> {
        let customer = sqlx::query_as::<_, Customer>(&format!(
            "SELECT {CUSTOMER_COLUMNS} FROM customers WHERE code = ?1"
        ))
        .bind(code)
        .fetch_optional(&self.pool)
        .await?;

        Ok(customer)
    }

    /// Searches active customers by code or name.
    pub async fn search(&self, query: &str, limit: i64) -> DbResult<Vec<Customer>> {
        let pattern = format!("%{}%", query);

        let customers = sqlx::query_as::<_, Customer>(&format!(
            "SELECT {CUSTOMER_COLUMNS} FROM customers \
             WHERE active = 1 AND (code LIKE ?1 OR first_name LIKE ?1 OR last_name LIKE ?1) \
             ORDER BY last_name, first_name LIMIT ?2"
        ))
        .bind(&pattern)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(customers)
    }

    /// Updates profile fields. Tier and discount are excluded on purpose;
    /// use [`CustomerRepository::set_discount`] for those.
    pub async fn update_profile(&self, customer: &Customer) -> DbResult<()> {
        let now = Utc::now();

        let result = sqlx::query(
            r#"
            UPDATE customers SET
                first_name = ?2,
                last_name = ?3,
                phone = ?4,
                email = ?5,
                notes = ?6,
                active = ?7,
                updated_at = ?8
            WHERE id = ?1
            "#,
        )
        .bind(&customer.id)
        .bind(&customer.first_name)
        .bind(&customer.last_name)
        .bind(&customer.phone)
        .bind(&customer.email)
        .bind(&customer.notes)
        .bind(customer.active)
        .bind(now)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Customer", &customer.id));
        }

        Ok(())
    }

    /// Changes a customer's tier and discount, appending an audit row.
    ///
    /// Rejects values outside the new tier's bounds before touching the
    /// database. A change to the identical tier and bps is a no-op.
    pub async fn set_discount(
        &self,
        customer_id: &str,
        new_tier: CustomerTier,
        new_bps: u32,
        user_id: &str,
        reason: Option<&str>,
    ) -> DbResult<Customer> {
        new_tier.validate_discount(new_bps).map_err(CoreError::from)?;

        let mut tx = self.pool.begin().await?;

        let current = sqlx::query_as::<_, Customer>(&format!(
            "SELECT {CUSTOMER_COLUMNS} FROM customers WHERE id = ?1"
        ))
        .bind(customer_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| DbError::not_found("Customer", customer_id))?;

        if current.tier == new_tier && current.discount_bps == new_bps {
            tx.commit().await?;
            return Ok(current);
        }

        let now = Utc::now();

        sqlx::query(
            "UPDATE customers SET tier = ?2, discount_bps = ?3, updated_at = ?4 WHERE id = ?1",
        )
        .bind(customer_id)
        .bind(new_tier)
        .bind(new_bps)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO discount_changes (
                id, customer_id, previous_tier, new_tier,
                previous_bps, new_bps, user_id, reason, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(customer_id)
        .bind(current.tier)
        .bind(new_tier)
        .bind(current.discount_bps)
        .bind(new_bps)
        .bind(user_id)
        .bind(reason)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        debug!(
            customer_id = %customer_id,
            new_bps = new_bps,
            "Customer discount changed"
        );

        Ok(Customer {
            tier: new_tier,
            discount_bps: new_bps,
            updated_at: now,
            ..current
        })
    }

    /// Lists a customer's discount changes, newest first.
    pub async fn list_discount_changes(
        &self,
        customer_id: &str,
        limit: i64,
    ) -> DbResult<Vec<DiscountChange>> {
        let changes = sqlx::query_as::<_, DiscountChange>(
            "SELECT id, customer_id, previous_tier, new_tier, previous_bps, new_bps, \
                    user_id, reason, created_at \
             FROM discount_changes \
             WHERE customer_id = ?1 ORDER BY created_at DESC, rowid DESC LIMIT ?2",
        )
        .bind(customer_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(changes)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use crate::pool::{Database, DbConfig};
    use chrono::Utc;
    use mostrador_core::types::{Customer, CustomerTier, Role};
    use uuid::Uuid;

    fn customer(code: &str, tier: CustomerTier, bps: u32) -> Customer {
        let now = Utc::now();
        Customer {
            id: Uuid::new_v4().to_string(),
            code: code.to_string(),
            first_name: "Ana".to_string(),
            last_name: "Flores".to_string(),
            phone: None,
            email: None,
            tier,
            discount_bps: bps,
            branch_id: None,
            notes: None,
            active: true,
            created_at: now,
            updated_at: now,
        }
    }

    async fn setup() -> (Database, String) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let user = db
            .users()
            .create("admin", "Admin", "$argon2id$fake", Role::Admin, None)
            .await
            .unwrap();
        (db, user.id)
    }

    #[tokio::test]
    async fn test_insert_rejects_out_of_tier_discount() {
        let (db, _user_id) = setup().await;
        let repo = db.customers();

        // Normal tier allows only 0 bps.
        assert!(repo.insert(&customer("CLI-001", CustomerTier::Normal, 500)).await.is_err());
        assert!(repo.insert(&customer("CLI-001", CustomerTier::Normal, 0)).await.is_ok());
    }

    #[tokio::test]
    async fn test_set_discount_writes_audit_row() {
        let (db, user_id) = setup().await;
        let repo = db.customers();

        let c = customer("CLI-001", CustomerTier::Normal, 0);
        repo.insert(&c).await.unwrap();

        let updated = repo
            .set_discount(&c.id, CustomerTier::Premium, 2000, &user_id, Some("Mayorista"))
            .await
            .unwrap();
        assert_eq!(updated.tier, CustomerTier::Premium);
        assert_eq!(updated.discount_bps, 2000);

        let changes = repo.list_discount_changes(&c.id, 10).await.unwrap();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].previous_tier, CustomerTier::Normal);
        assert_eq!(changes[0].new_tier, CustomerTier::Premium);
        assert_eq!(changes[0].previous_bps, 0);
        assert_eq!(changes[0].new_bps, 2000);
    }

    #[tokio::test]
    async fn test_set_discount_rejects_out_of_bounds() {
        let (db, user_id) = setup().await;
        let repo = db.customers();

        let c = customer("CLI-001", CustomerTier::Frequent, 500);
        repo.insert(&c).await.unwrap();

        // 20% is outside Frequent's 1%-15%.
        assert!(repo
            .set_discount(&c.id, CustomerTier::Frequent, 2000, &user_id, None)
            .await
            .is_err());

        // Customer unchanged, no audit row.
        let unchanged = repo.get_by_id(&c.id).await.unwrap().unwrap();
        assert_eq!(unchanged.discount_bps, 500);
        assert!(repo.list_discount_changes(&c.id, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_identical_change_is_noop() {
        let (db, user_id) = setup().await;
        let repo = db.customers();

        let c = customer("CLI-001", CustomerTier::Frequent, 500);
        repo.insert(&c).await.unwrap();

        repo.set_discount(&c.id, CustomerTier::Frequent, 500, &user_id, None)
            .await
            .unwrap();
        assert!(repo.list_discount_changes(&c.id, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_search() {
        let (db, _user_id) = setup().await;
        let repo = db.customers();

        repo.insert(&customer("CLI-001", CustomerTier::Normal, 0)).await.unwrap();

        let found = repo.search("flores", 10).await.unwrap();
        assert_eq!(found.len(), 1);
        let found = repo.search("CLI-0", 10).await.unwrap();
        assert_eq!(found.len(), 1);
        let found = repo.search("nadie", 10).await.unwrap();
        assert!(found.is_empty());
    }
}
