//! # User Repository
//!
//! Users and their opaque auth sessions. Password hashing happens in the
//! server layer (argon2); this repository only stores and returns hashes.
//!
//! ## Auth Sessions
//! Login inserts a row in `auth_sessions` with a random token and an
//! expiry; every authenticated request resolves the bearer token through
//! [`UserRepository::find_user_by_token`], which ignores expired rows.
//! Logout deletes the row.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use mostrador_core::types::{Role, User};

const USER_COLUMNS: &str = "id, username, full_name, password_hash, role, branch_id, active, created_at";

/// Repository for user and auth session operations.
#[derive(Debug, Clone)]
pub struct UserRepository {
    pool: SqlitePool,
}

impl UserRepository {
    /// Creates a new UserRepository.
    pub fn new(pool: SqlitePool) -> Self {
        UserRepository { pool }
    }

    /// Creates a user. `password_hash` must already be an argon2 hash.
    pub async fn create(
        &self,
        username: &str,
        full_name: &str,
        password_hash: &str,
        role: Role,
        branch_id: Option<&str>,
    ) -> DbResult<User> {
        let user = User {
            id: Uuid::new_v4().to_string(),
            username: username.to_string(),
            full_name: full_name.to_string(),
            password_hash: password_hash.to_string(),
            role,
            branch_id: branch_id.map(str::to_string),
            active: true,
            created_at: Utc::now(),
        };

        debug!(username = %user.username, role = ?user.role, "Creating user");

        sqlx::query(
            r#"
            INSERT INTO users (
                id, username, full_name, password_hash, role, branch_id, active, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(&user.id)
        .bind(&user.username)
        .bind(&user.full_name)
        .bind(&user.password_hash)
        .bind(user.role)
        .bind(&user.branch_id)
        .bind(user.active)
        .bind(user.created_at)
        .execute(&self.pool)
        .await?;

        Ok(user)
    }

    /// Gets a user by ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = ?1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    /// Gets a user by username.
    pub async fn get_by_username(&self, username: &str) -> DbResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE username = ?1"
        ))
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    /// Lists users, optionally scoped to a branch.
    pub async fn list(&self, branch_id: Option<&str>) -> DbResult<Vec<User>> {
        let users = match branch_id {
            Some(branch_id) => {
                sqlx::query_as::<_, User>(&format!(
                    "SELECT {USER_COLUMNS} FROM users WHERE branch_id = ?1 ORDER BY username"
                ))
                .bind(branch_id)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, User>(&format!(
                    "SELECT {USER_COLUMNS} FROM users ORDER BY username"
                ))
                .fetch_all(&self.pool)
                .await?
            }
        };

        Ok(users)
    }

    /// Updates a user's profile, role, branch and active flag.
    pub async fn update(&self, user: &User) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE users SET
                full_name = ?2,
                role = ?3,
                branch_id = ?4,
                active = ?5
            WHERE id = ?1
            "#,
        )
        .bind(&user.id)
        .bind(&user.full_name)
        .bind(user.role)
        .bind(&user.branch_id)
        .bind(user.active)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("User", &user.id));
        }

        Ok(())
    }

    /// Replaces a user's password hash.
    pub async fn set_password_hash(&self, user_id: &str, password_hash: &str) -> DbResult<()> {
        let result = sqlx::query("UPDATE users SET password_hash = ?2 WHERE id = ?1")
            .bind(user_id)
            .bind(password_hash)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("User", user_id));
        }

        Ok(())
    }

    // =========================================================================
    // Auth Sessions
    // =========================================================================

    /// Stores an auth session token for a user.
    pub async fn insert_session(
        &self,
        token: &str,
        user_id: &str,
        expires_at: DateTime<Utc>,
    ) -> DbResult<()> {
        sqlx::query(
            "INSERT INTO auth_sessions (token, user_id, created_at, expires_at) \
             VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(token)
        .bind(user_id)
        .bind(Utc::now())
        .bind(expires_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Resolves a bearer token to its active user. Expired tokens and
    /// deactivated users resolve to None.
    pub async fn find_user_by_token(&self, token: &str) -> DbResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            "SELECT u.id, u.username, u.full_name, u.password_hash, u.role, \
                    u.branch_id, u.active, u.created_at \
             FROM auth_sessions s \
             JOIN users u ON u.id = s.user_id \
             WHERE s.token = ?1 AND s.expires_at > ?2 AND u.active = 1",
        )
        .bind(token)
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    /// Deletes an auth session (logout). Deleting a missing token is a no-op.
    pub async fn delete_session(&self, token: &str) -> DbResult<()> {
        sqlx::query("DELETE FROM auth_sessions WHERE token = ?1")
            .bind(token)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Removes expired sessions. Returns the number deleted.
    pub async fn purge_expired_sessions(&self) -> DbResult<u64> {
        let result = sqlx::query("DELETE FROM auth_sessions WHERE expires_at <= ?1")
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use chrono::Duration;

    #[tokio::test]
    async fn test_create_and_lookup() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.users();

        let user = repo
            .create("maria.gomez", "María Gómez", "$argon2id$fake", Role::Cashier, None)
            .await
            .unwrap();

        let by_name = repo.get_by_username("maria.gomez").await.unwrap().unwrap();
        assert_eq!(by_name.id, user.id);
        assert_eq!(by_name.role, Role::Cashier);

        // Duplicate username rejected.
        assert!(repo
            .create("maria.gomez", "Otra", "$argon2id$fake", Role::Admin, None)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_session_lifecycle() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.users();

        let user = repo
            .create("admin", "Admin", "$argon2id$fake", Role::Admin, None)
            .await
            .unwrap();

        let token = "tok-123";
        repo.insert_session(token, &user.id, Utc::now() + Duration::hours(8))
            .await
            .unwrap();

        let resolved = repo.find_user_by_token(token).await.unwrap().unwrap();
        assert_eq!(resolved.id, user.id);

        repo.delete_session(token).await.unwrap();
        assert!(repo.find_user_by_token(token).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_expired_and_inactive_rejected() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.users();

        let mut user = repo
            .create("admin", "Admin", "$argon2id$fake", Role::Admin, None)
            .await
            .unwrap();

        // Expired token.
        repo.insert_session("expired", &user.id, Utc::now() - Duration::minutes(1))
            .await
            .unwrap();
        assert!(repo.find_user_by_token("expired").await.unwrap().is_none());
        assert_eq!(repo.purge_expired_sessions().await.unwrap(), 1);

        // Valid token for a deactivated user.
        repo.insert_session("valid", &user.id, Utc::now() + Duration::hours(1))
            .await
            .unwrap();
        user.active = false;
        repo.update(&user).await.unwrap();
        assert!(repo.find_user_by_token("valid").await.unwrap().is_none());
    }
}
