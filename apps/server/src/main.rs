//! # Mostrador Server
//!
//! HTTP API for the multi-branch point of sale.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                           API Server                                    │
//! │                                                                         │
//! │  Clients ───► HTTP (8080) ───► Handlers ───► Repositories ───► SQLite  │
//! │                                    │                                    │
//! │                                    ▼                                    │
//! │                              CartStore (in-memory)                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

mod auth;
mod config;
mod error;
mod handlers;
mod state;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use mostrador_core::types::Role;
use mostrador_db::{Database, DbConfig};

use crate::config::ServerConfig;
use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    info!("Starting Mostrador server...");

    let config = ServerConfig::load()?;
    info!(
        port = config.http_port,
        db = %config.database_path,
        "Configuration loaded"
    );

    let db = Database::new(DbConfig::new(&config.database_path)).await?;
    info!("Database ready");

    bootstrap_superadmin(&db).await?;

    let state = Arc::new(AppState::new(db, config.clone()));

    tokio::spawn(session_purge_loop(state.clone()));

    let router = handlers::app_router(state);

    let addr: SocketAddr = format!("0.0.0.0:{}", config.http_port).parse()?;
    info!(%addr, "Starting HTTP server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

/// Seeds the first superadmin on an empty users table so a fresh install
/// can log in. The password comes from BOOTSTRAP_PASSWORD and the account
/// should be rotated right after first login.
async fn bootstrap_superadmin(db: &Database) -> anyhow::Result<()> {
    if db.users().get_by_username("admin").await?.is_some() {
        return Ok(());
    }

    let password =
        std::env::var("BOOTSTRAP_PASSWORD").unwrap_or_else(|_| "cambiame".to_string());
    let hash = auth::hash_password(&password)
        .map_err(|e| anyhow::anyhow!("bootstrap password hash failed: {}", e.message))?;

    db.users()
        .create("admin", "Administrador", &hash, Role::Superadmin, None)
        .await?;

    info!("Bootstrap superadmin 'admin' created");
    Ok(())
}

/// Interval between expired-session sweeps.
const SESSION_PURGE_INTERVAL: Duration = Duration::from_secs(15 * 60);

/// Periodically deletes expired auth sessions and drops the carts they
/// left behind. Carts go away on checkout or logout; a session that just
/// expires would otherwise leak its cart until restart.
async fn session_purge_loop(state: Arc<AppState>) {
    let mut ticker = tokio::time::interval(SESSION_PURGE_INTERVAL);
    // The first tick completes immediately; skip it.
    ticker.tick().await;
    loop {
        ticker.tick().await;
        if let Err(e) = purge_stale_sessions(&state).await {
            warn!(error = %e, "Session purge failed");
        }
    }
}

/// One sweep: purge expired sessions, then evict carts whose token no
/// longer resolves to a live session.
async fn purge_stale_sessions(state: &AppState) -> mostrador_db::DbResult<()> {
    let purged = state.db.users().purge_expired_sessions().await?;

    let mut evicted = 0u64;
    for token in state.carts.tokens() {
        if state.db.users().find_user_by_token(&token).await?.is_none() {
            state.carts.remove(&token);
            evicted += 1;
        }
    }

    if purged > 0 || evicted > 0 {
        info!(sessions = purged, carts = evicted, "Purged expired sessions");
    }
    Ok(())
}

/// Graceful shutdown signal handler.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, starting graceful shutdown...");
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration as ChronoDuration, Utc};

    #[tokio::test]
    async fn test_purge_evicts_expired_sessions_and_their_carts() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let user = db
            .users()
            .create("cajero", "María", "$argon2id$fake", Role::Cashier, None)
            .await
            .unwrap();
        db.users()
            .insert_session("token-vivo", &user.id, Utc::now() + ChronoDuration::hours(8))
            .await
            .unwrap();
        db.users()
            .insert_session("token-vencido", &user.id, Utc::now() - ChronoDuration::hours(1))
            .await
            .unwrap();

        let state = AppState::new(db, ServerConfig::load().unwrap());
        state.carts.with_cart_mut("token-vivo", |_| {});
        state.carts.with_cart_mut("token-vencido", |_| {});

        purge_stale_sessions(&state).await.unwrap();

        // The live session keeps its cart; the expired one loses both the
        // session row and the cart.
        let mut tokens = state.carts.tokens();
        tokens.sort();
        assert_eq!(tokens, vec!["token-vivo"]);
        assert!(state
            .db
            .users()
            .find_user_by_token("token-vivo")
            .await
            .unwrap()
            .is_some());
        assert_eq!(state.db.users().purge_expired_sessions().await.unwrap(), 0);
    }
}
