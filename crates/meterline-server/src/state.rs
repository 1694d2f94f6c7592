use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info};

use meterline_core::config::Config;
use meterline_core::store::QuotaStore;
use meterline_core::QuotaEngine;
use meterline_duckdb::DuckDbBackend;

/// Shared application state injected into every Axum handler via
/// [`axum::extract::State`].
pub struct AppState {
    /// The DuckDB backend. Internally uses `Arc<tokio::sync::Mutex<Connection>>`
    /// so it is already cheap to clone and async-safe.
    pub db: Arc<DuckDbBackend>,

    /// Quota decisions for every metered route. Reads and writes through the
    /// same store as `db` unless a test swaps it out.
    pub engine: QuotaEngine,

    /// Parsed configuration, loaded once at startup from environment variables.
    pub config: Arc<Config>,
}

impl AppState {
    /// Construct a new `AppState` with the engine running on `db`.
    pub fn new(db: DuckDbBackend, config: Config) -> Self {
        let db = Arc::new(db);
        let store: Arc<dyn QuotaStore> = db.clone();
        Self::with_store(db, store, config)
    }

    /// Like [`AppState::new`], but the engine uses `store` for plans,
    /// subscriptions, and the ledger while item CRUD stays on `db`.
    pub fn with_store(db: Arc<DuckDbBackend>, store: Arc<dyn QuotaStore>, config: Config) -> Self {
        let engine = QuotaEngine::new(store, config.quota_policy());
        Self {
            db,
            engine,
            config: Arc::new(config),
        }
    }

    /// Background loop: drop ledger entries older than each tenant's current
    /// billing period.
    ///
    /// Spawned from `main.rs` only when `METERLINE_PRUNE_INTERVAL_SECS > 0`.
    /// A failed pass is logged and retried on the next tick.
    pub async fn run_prune_loop(self: Arc<Self>, every: Duration) {
        let mut ticker = tokio::time::interval(every);
        // The first tick completes immediately; skip it so startup stays quiet.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            match self.engine.prune_all_stale_usage().await {
                Ok(0) => {}
                Ok(deleted) => info!(deleted, "Pruned stale usage entries"),
                Err(e) => error!(error = %e, "Stale usage prune pass failed"),
            }
        }
    }
}
