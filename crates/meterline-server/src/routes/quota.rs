use std::sync::Arc;

use axum::{
    extract::{Path, State},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::enforcement::apply_quota_headers;
use crate::state::AppState;
use crate::tenant::TenantContext;

/// `GET /api/quota/{action}` — what the enforcement layer would decide for
/// one unit of `action` right now.
///
/// Always `200`: the verdict itself says whether the action is allowed, and
/// nothing is recorded. Quota headers match the verdict.
pub async fn check_quota(
    State(state): State<Arc<AppState>>,
    tenant: TenantContext,
    Path(action): Path<String>,
) -> Response {
    let verdict = state
        .engine
        .check_action(&tenant.tenant_id, &action, 1)
        .await;
    let remaining = verdict.remaining;
    let mut response = Json(json!({ "data": verdict })).into_response();
    apply_quota_headers(response.headers_mut(), &verdict, remaining);
    response
}
