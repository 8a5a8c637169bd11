//! # Branch Repository
//!
//! Database operations for branches and their per-branch settings. Every
//! branch gets a settings row at creation; the two are updated separately.

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use mostrador_core::types::{Branch, BranchSettings};

const BRANCH_COLUMNS: &str =
    "id, code, name, address, phone, email, active, allow_sales, created_at, updated_at";

/// Repository for branch database operations.
#[derive(Debug, Clone)]
pub struct BranchRepository {
    pool: SqlitePool,
}

impl BranchRepository {
    /// Creates a new BranchRepository.
    pub fn new(pool: SqlitePool) -> Self {
        BranchRepository { pool }
    }

    /// Creates a branch together with its default settings row.
    pub async fn create(
        &self,
        code: &str,
        name: &str,
        address: Option<&str>,
        phone: Option<&str>,
        email: Option<&str>,
    ) -> DbResult<Branch> {
        let now = Utc::now();
        let branch = Branch {
            id: Uuid::new_v4().to_string(),
            code: code.to_string(),
            name: name.to_string(),
            address: address.map(str::to_string),
            phone: phone.map(str::to_string),
            email: email.map(str::to_string),
            active: true,
            allow_sales: true,
            created_at: now,
            updated_at: now,
        };

        debug!(code = %branch.code, "Creating branch");

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO branches (
                id, code, name, address, phone, email,
                active, allow_sales, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
        )
        .bind(&branch.id)
        .bind(&branch.code)
        .bind(&branch.name)
        .bind(&branch.address)
        .bind(&branch.phone)
        .bind(&branch.email)
        .bind(branch.active)
        .bind(branch.allow_sales)
        .bind(branch.created_at)
        .bind(branch.updated_at)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO branch_settings (
                branch_id, default_min_stock, default_max_stock,
                tax_bps, show_stock, updated_at
            ) VALUES (?1, 5, 100, 0, 1, ?2)
            "#,
        )
        .bind(&branch.id)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(branch)
    }

    /// Gets a branch by ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Branch>> {
        let branch = sqlx::query_as::<_, Branch>(&format!(
            "SELECT {BRANCH_COLUMNS} FROM branches WHERE id = ?1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(branch)
    }

    /// Gets a branch by business code.
    pub async fn get_by_code(&self, code: &str) -> DbResult<Option<Branch>> {
        let branch = sqlx::query_as::<_, Branch>(&format!(
            "SELECT {BRANCH_COLUMNS} FROM branches WHERE code = ?1"
        ))
        .bind(code)
        .fetch_optional(&self.pool)
        .await?;

        Ok(branch)
    }

    /// Lists active branches ordered by code.
    pub async fn list_active(&self) -> DbResult<Vec<Branch>> {
        let branches = sqlx::query_as::<_, Branch>(&format!(
            "SELECT {BRANCH_COLUMNS} FROM branches WHERE active = 1 ORDER BY code"
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(branches)
    }

    /// Lists all branches, including deactivated ones.
    pub async fn list_all(&self) -> DbResult<Vec<Branch>> {
        let branches = sqlx::query_as::<_, Branch>(&format!(
            "SELECT {BRANCH_COLUMNS} FROM branches ORDER BY code"
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(branches)
    }

    /// Updates a branch's editable fields.
    pub async fn update(&self, branch: &Branch) -> DbResult<()> {
        let now = Utc::now();

        let result = sqlx::query(
            r#"
            UPDATE branches SET
                name = ?2,
                address = ?3,
                phone = ?4,
                email = ?5,
                active = ?6,
                allow_sales = ?7,
                updated_at = ?8
            WHERE id = ?1
            "#,
        )
        .bind(&branch.id)
        .bind(&branch.name)
        .bind(&branch.address)
        .bind(&branch.phone)
        .bind(&branch.email)
        .bind(branch.active)
        .bind(branch.allow_sales)
        .bind(now)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Branch", &branch.id));
        }

        Ok(())
    }

    /// Gets the settings row for a branch.
    pub async fn settings(&self, branch_id: &str) -> DbResult<BranchSettings> {
        let settings = sqlx::query_as::<_, BranchSettings>(
            r#"
            SELECT branch_id, default_min_stock, default_max_stock,
                   tax_bps, show_stock, updated_at
            FROM branch_settings
            WHERE branch_id = ?1
            "#,
        )
        .bind(branch_id)
        .fetch_optional(&self.pool)
        .await?;

        settings.ok_or_else(|| DbError::not_found("BranchSettings", branch_id))
    }

    /// Updates the settings row for a branch.
    pub async fn update_settings(&self, settings: &BranchSettings) -> DbResult<()> {
        let now = Utc::now();

        let result = sqlx::query(
            r#"
            UPDATE branch_settings SET
                default_min_stock = ?2,
                default_max_stock = ?3,
                tax_bps = ?4,
                show_stock = ?5,
                updated_at = ?6
            WHERE branch_id = ?1
            "#,
        )
        .bind(&settings.branch_id)
        .bind(settings.default_min_stock)
        .bind(settings.default_max_stock)
        .bind(settings.tax_bps)
        .bind(settings.show_stock)
        .bind(now)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("BranchSettings", &settings.branch_id));
        }

        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use crate::pool::{Database, DbConfig};

    #[tokio::test]
    async fn test_create_and_fetch_branch() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.branches();

        let branch = repo
            .create("CEN", "Sucursal Centro", Some("Av. Juárez 12"), None, None)
            .await
            .unwrap();

        let fetched = repo.get_by_code("CEN").await.unwrap().unwrap();
        assert_eq!(fetched.id, branch.id);
        assert_eq!(fetched.name, "Sucursal Centro");
        assert!(fetched.allow_sales);

        // Settings row is created alongside the branch.
        let settings = repo.settings(&branch.id).await.unwrap();
        assert_eq!(settings.default_min_stock, 5);
        assert_eq!(settings.default_max_stock, 100);
    }

    #[tokio::test]
    async fn test_duplicate_code_rejected() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.branches();

        repo.create("CEN", "Centro", None, None, None).await.unwrap();
        let err = repo.create("CEN", "Otra", None, None, None).await;
        assert!(matches!(err, Err(crate::DbError::UniqueViolation { .. })));
    }

    #[tokio::test]
    async fn test_list_active_excludes_deactivated() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.branches();

        let mut branch = repo.create("NOR", "Norte", None, None, None).await.unwrap();
        repo.create("SUR", "Sur", None, None, None).await.unwrap();

        branch.active = false;
        repo.update(&branch).await.unwrap();

        let active = repo.list_active().await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].code, "SUR");
    }
}
