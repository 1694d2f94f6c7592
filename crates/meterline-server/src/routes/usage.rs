use std::sync::Arc;

use axum::{extract::State, response::IntoResponse, Json};
use serde_json::json;

use crate::{error::AppError, state::AppState, tenant::TenantContext};

/// `GET /api/usage` — the caller's current-period usage for every quota key
/// on their plan. `404` when the tenant has no active subscription.
pub async fn get_usage(
    State(state): State<Arc<AppState>>,
    tenant: TenantContext,
) -> Result<impl IntoResponse, AppError> {
    let report = state.engine.usage_report(&tenant.tenant_id).await?;
    Ok(Json(json!({ "data": report })))
}
