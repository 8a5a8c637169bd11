//! # Authentication and Authorization
//!
//! ## Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Request Authentication                             │
//! │                                                                         │
//! │  POST /api/auth/login {username, password}                              │
//! │       │  argon2 verify against users.password_hash                      │
//! │       ▼                                                                 │
//! │  opaque token stored in auth_sessions (TTL from config)                 │
//! │       │                                                                 │
//! │  Authorization: Bearer <token>                                          │
//! │       │  CurrentUser extractor resolves the token per request           │
//! │       ▼                                                                 │
//! │  handlers call require(&user, Action::...) before acting                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Tokens are random, unsigned and server-side revocable; the session row
//! is the single source of truth.

use std::sync::Arc;

use argon2::password_hash::{rand_core::OsRng, SaltString};
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::header;
use axum::http::request::Parts;
use uuid::Uuid;

use mostrador_core::authz::Action;
use mostrador_core::types::{Branch, User};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

// =============================================================================
// Passwords
// =============================================================================

/// Hashes a password with argon2id and a fresh random salt.
pub fn hash_password(password: &str) -> ApiResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|_| ApiError::internal("Failed to hash password"))
}

/// Verifies a password against a stored argon2 hash. A malformed stored
/// hash verifies as false rather than erroring.
pub fn verify_password(password: &str, hash: &str) -> bool {
    PasswordHash::new(hash)
        .map(|parsed| {
            Argon2::default()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok()
        })
        .unwrap_or(false)
}

/// Generates an opaque session token.
pub fn generate_token() -> String {
    format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple())
}

// =============================================================================
// Current User Extractor
// =============================================================================

/// The authenticated caller, resolved from the bearer token.
///
/// The token doubles as the cart key, so it travels with the user.
pub struct CurrentUser {
    pub user: User,
    pub token: String,
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let header_value = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| ApiError::unauthorized("Missing Authorization header"))?;

        let token = header_value
            .strip_prefix("Bearer ")
            .ok_or_else(|| ApiError::unauthorized("Expected Bearer token"))?;

        let user = state
            .db
            .users()
            .find_user_by_token(token)
            .await
            .map_err(ApiError::from)?
            .ok_or_else(|| ApiError::unauthorized("Invalid or expired token"))?;

        Ok(CurrentUser {
            user,
            token: token.to_string(),
        })
    }
}

// =============================================================================
// Authorization Helpers
// =============================================================================

/// Checks the role policy, turning a denial into 403.
pub fn require(user: &User, action: Action) -> ApiResult<()> {
    if user.role.allows(action) {
        Ok(())
    } else {
        Err(ApiError::forbidden(format!(
            "Role {:?} may not perform this operation",
            user.role
        )))
    }
}

/// Resolves the branch a request operates on.
///
/// Superadmins may target any branch via an explicit id; everyone else is
/// pinned to their assigned branch regardless of what they ask for.
pub async fn resolve_branch(
    state: &AppState,
    user: &User,
    requested: Option<&str>,
) -> ApiResult<Branch> {
    let branch_id = if user.role.is_superadmin() {
        requested
            .map(str::to_string)
            .or_else(|| user.branch_id.clone())
            .ok_or_else(|| ApiError::validation("branchId is required"))?
    } else {
        user.branch_id
            .clone()
            .ok_or_else(|| ApiError::forbidden("User has no assigned branch"))?
    };

    state
        .db
        .branches()
        .get_by_id(&branch_id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("Branch not found: {}", branch_id)))
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_password_roundtrip() {
        let hash = hash_password("correcthorsebattery").unwrap();
        assert!(verify_password("correcthorsebattery", &hash));
        assert!(!verify_password("wrong", &hash));
    }

    #[test]
    fn test_malformed_hash_rejects() {
        assert!(!verify_password("anything", "not-a-hash"));
    }

    #[test]
    fn test_token_shape() {
        let a = generate_token();
        let b = generate_token();
        assert_eq!(a.len(), 64);
        assert_ne!(a, b);
    }
}
