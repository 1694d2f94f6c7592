use std::sync::Arc;

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;

use crate::state::AppState;

#[derive(Debug, Serialize)]
struct HealthBody {
    status: &'static str,
    version: &'static str,
    /// Number of actions the enforcement layer knows how to meter.
    metered_actions: usize,
}

/// `GET /health` — liveness check, not metered and tenant-free.
///
/// `200` with `"status": "ok"` while DuckDB answers `SELECT 1`, otherwise
/// `503` with `"status": "degraded"`.
#[tracing::instrument(skip(state))]
pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let (status, label) = match state.db.ping().await {
        Ok(()) => (StatusCode::OK, "ok"),
        Err(e) => {
            tracing::error!(error = %e, "Health check: DuckDB unreachable");
            (StatusCode::SERVICE_UNAVAILABLE, "degraded")
        }
    };
    (
        status,
        Json(HealthBody {
            status: label,
            version: env!("CARGO_PKG_VERSION"),
            metered_actions: state.engine.policy().actions().count(),
        }),
    )
}
