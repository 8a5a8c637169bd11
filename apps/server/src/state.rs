//! # Shared Application State
//!
//! One `Arc<AppState>` is cloned into every handler. Carts live here in
//! memory, keyed by the caller's auth token: they are working drafts, not
//! records, and an abandoned cart simply evaporates with its session.

use std::collections::HashMap;
use std::sync::Mutex;

use mostrador_core::cart::Cart;
use mostrador_db::Database;

use crate::config::ServerConfig;

/// Shared application state.
pub struct AppState {
    pub db: Database,
    pub config: ServerConfig,
    pub carts: CartStore,
}

impl AppState {
    pub fn new(db: Database, config: ServerConfig) -> Self {
        AppState {
            db,
            config,
            carts: CartStore::new(),
        }
    }
}

/// In-memory cart store keyed by auth token.
///
/// The mutex guards a plain HashMap; cart operations are microsecond-scale
/// so handlers never hold it across an await.
#[derive(Default)]
pub struct CartStore {
    carts: Mutex<HashMap<String, Cart>>,
}

impl CartStore {
    pub fn new() -> Self {
        CartStore::default()
    }

    /// Reads the caller's cart (empty if none yet).
    pub fn with_cart<T>(&self, token: &str, f: impl FnOnce(&Cart) -> T) -> T {
        let carts = self.carts.lock().unwrap_or_else(|e| e.into_inner());
        match carts.get(token) {
            Some(cart) => f(cart),
            None => f(&Cart::new()),
        }
    }

    /// Mutates the caller's cart, creating it on first use.
    pub fn with_cart_mut<T>(&self, token: &str, f: impl FnOnce(&mut Cart) -> T) -> T {
        let mut carts = self.carts.lock().unwrap_or_else(|e| e.into_inner());
        let cart = carts.entry(token.to_string()).or_insert_with(Cart::new);
        f(cart)
    }

    /// Drops the caller's cart (after checkout or logout).
    pub fn remove(&self, token: &str) {
        let mut carts = self.carts.lock().unwrap_or_else(|e| e.into_inner());
        carts.remove(token);
    }

    /// Snapshot of the tokens currently holding a cart, for the stale-cart
    /// sweep.
    pub fn tokens(&self) -> Vec<String> {
        let carts = self.carts.lock().unwrap_or_else(|e| e.into_inner());
        carts.keys().cloned().collect()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_carts_isolated_per_token() {
        let store = CartStore::new();

        store.with_cart_mut("token-a", |cart| {
            cart.created_at = chrono::Utc::now();
        });

        assert_eq!(store.with_cart("token-a", |c| c.line_count()), 0);
        assert_eq!(store.with_cart("token-b", |c| c.line_count()), 0);
    }

    #[test]
    fn test_remove() {
        let store = CartStore::new();
        store.with_cart_mut("token-a", |_| {});
        store.remove("token-a");
        // Reading a removed cart yields a fresh empty one.
        assert!(store.with_cart("token-a", |c| c.is_empty()));
    }

    #[test]
    fn test_tokens_snapshot() {
        let store = CartStore::new();
        store.with_cart_mut("token-a", |_| {});
        store.with_cart_mut("token-b", |_| {});

        let mut tokens = store.tokens();
        tokens.sort();
        assert_eq!(tokens, vec!["token-a", "token-b"]);
    }
}
