use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::HeaderMap,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use meterline_core::plan::{BillingInterval, Plan, QuotaMap};
use meterline_core::store::{PlanRegistry, SubscriptionStore, UsageLedger};
use meterline_core::subscription::SubscriptionStatus;

use crate::{error::AppError, state::AppState, tenant::user_email};

#[derive(Debug, Default, Deserialize)]
pub struct QuotaResetRequest {
    #[serde(default)]
    pub resource_type: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SubscriptionsQuery {
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpsertPlanRequest {
    pub name: String,
    #[serde(default)]
    pub billing_period: Option<String>,
    #[serde(default)]
    pub quotas: QuotaMap,
    #[serde(default)]
    pub features: Option<serde_json::Value>,
}

/// Gate for every `/api/admin/*` route.
///
/// The caller's `x-user-email` must appear in `METERLINE_ADMIN_EMAILS`. An
/// empty list locks the admin surface for everyone.
fn require_admin(state: &AppState, headers: &HeaderMap) -> Result<String, AppError> {
    let email = user_email(headers).ok_or(AppError::Forbidden)?;
    if !state.config.is_admin_email(&email) {
        return Err(AppError::Forbidden);
    }
    Ok(email)
}

fn parse_reset_body(body: &[u8]) -> Result<QuotaResetRequest, AppError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(QuotaResetRequest::default());
    }
    serde_json::from_slice(body)
        .map_err(|e| AppError::BadRequest(format!("invalid quota reset body: {e}")))
}

/// `POST /api/admin/tenants/{tenant_id}/quota-reset`
///
/// Deletes the tenant's ledger entries, all of them or one resource type's.
/// The body is optional: an empty body resets every resource type.
pub async fn reset_tenant_quota(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(tenant_id): Path<String>,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    let admin = require_admin(&state, &headers)?;
    let request = parse_reset_body(&body)?;
    let resource_type = request
        .resource_type
        .map(|r| r.trim().to_string())
        .filter(|r| !r.is_empty());

    let deleted = state
        .engine
        .reset_usage(&tenant_id, resource_type.as_deref())
        .await?;
    info!(admin = %admin, tenant_id = %tenant_id, deleted, "Admin quota reset");

    Ok(Json(json!({
        "data": {
            "tenant_id": tenant_id,
            "resource_type": resource_type,
            "deleted": deleted,
        }
    })))
}

/// `GET /api/admin/tenants/{tenant_id}/usage`
pub async fn tenant_usage(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(tenant_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    require_admin(&state, &headers)?;
    let report = state.engine.usage_report(&tenant_id).await?;
    Ok(Json(json!({ "data": report })))
}

/// `GET /api/admin/subscriptions?status=active`
pub async fn list_subscriptions(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<SubscriptionsQuery>,
) -> Result<impl IntoResponse, AppError> {
    require_admin(&state, &headers)?;
    let status = query
        .status
        .as_deref()
        .map(SubscriptionStatus::parse)
        .transpose()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let subscriptions = state
        .engine
        .store()
        .list_subscriptions(status)
        .await
        .map_err(AppError::Internal)?;
    Ok(Json(json!({ "data": subscriptions })))
}

/// `GET /api/admin/plans`
pub async fn list_plans(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AppError> {
    require_admin(&state, &headers)?;
    let plans = state
        .engine
        .store()
        .list_plans()
        .await
        .map_err(AppError::Internal)?;
    Ok(Json(json!({ "data": plans })))
}

/// `PUT /api/admin/plans/{plan_id}` — create or replace a plan.
///
/// Limits must be `>= -1`; `-1` is unlimited and `0` blocks the resource.
pub async fn upsert_plan(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(plan_id): Path<String>,
    Json(body): Json<UpsertPlanRequest>,
) -> Result<impl IntoResponse, AppError> {
    let admin = require_admin(&state, &headers)?;

    let billing_period = match body.billing_period.as_deref() {
        Some(raw) => BillingInterval::parse(raw).map_err(|e| AppError::BadRequest(e.to_string()))?,
        None => BillingInterval::default(),
    };
    let plan = Plan {
        id: plan_id,
        name: body.name.trim().to_string(),
        billing_period,
        quotas: body.quotas,
        features: body.features.unwrap_or_else(|| json!({})),
    };
    plan.validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let saved = state
        .engine
        .store()
        .upsert_plan(&plan)
        .await
        .map_err(AppError::Internal)?;
    info!(admin = %admin, plan_id = %saved.id, "Plan updated");

    Ok(Json(json!({ "data": saved })))
}

/// `GET /api/admin/stats`
pub async fn stats(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AppError> {
    require_admin(&state, &headers)?;
    let stats = state
        .engine
        .store()
        .stats()
        .await
        .map_err(AppError::Internal)?;
    Ok(Json(json!({ "data": stats })))
}
