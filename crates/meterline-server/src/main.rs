use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use meterline_server::state::AppState;

/// `meterline health` — liveness probe for Docker HEALTHCHECK.
///
/// Calls `GET http://localhost:$METERLINE_PORT/health`.
/// Exits 0 if the server responds with HTTP 200, exits 1 otherwise.
fn run_health_check() -> ! {
    let port = std::env::var("METERLINE_PORT").unwrap_or_else(|_| "3000".to_string());
    let url = format!("http://localhost:{}/health", port);
    match ureq::get(&url).call() {
        Ok(resp) if resp.status() == 200 => std::process::exit(0),
        _ => std::process::exit(1),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    if args.get(1).map(|s| s.as_str()) == Some("health") {
        run_health_check();
    }
    // Structured JSON logging. Level controlled via RUST_LOG env var.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("meterline=info".parse()?),
        )
        .json()
        .init();

    let cfg = meterline_core::config::Config::from_env().map_err(|e| anyhow::anyhow!(e))?;

    // Ensure data directory exists before opening DuckDB.
    std::fs::create_dir_all(&cfg.data_dir)?;
    let db_path = format!("{}/meterline.db", cfg.data_dir);
    let db = meterline_duckdb::DuckDbBackend::open(&db_path, &cfg.duckdb_memory_limit)?;

    if cfg.admin_emails.is_empty() {
        tracing::warn!("METERLINE_ADMIN_EMAILS is empty; /api/admin/* will answer 403");
    }
    info!(
        tenant_header = %cfg.tenant_header,
        unknown_actions = ?cfg.unknown_actions,
        extra_actions = cfg.action_map.len(),
        "Quota policy loaded"
    );

    let state = Arc::new(AppState::new(db, cfg.clone()));

    if let Some(every) = cfg.prune_interval() {
        let state = Arc::clone(&state);
        info!(interval_secs = every.as_secs(), "Stale usage pruning enabled");
        tokio::spawn(async move {
            state.run_prune_loop(every).await;
        });
    }

    let addr = format!("0.0.0.0:{}", cfg.port);
    let app = meterline_server::app::build_app(Arc::clone(&state));

    info!(port = cfg.port, "Meterline listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            tokio::signal::ctrl_c().await.ok();
        })
        .await?;

    info!("Meterline stopped");
    Ok(())
}
