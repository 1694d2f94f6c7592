//! Quota enforcement for metered routes.
//!
//! Each metered route is wrapped with [`enforce_quota`] for a named action:
//! check → run the handler → record one unit on a 2xx response. Usage is only
//! recorded after the handler confirmed success; if the request future is
//! dropped first (timeout, client disconnect) nothing is written.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use chrono::SecondsFormat;
use serde_json::json;
use tracing::{debug, error};

use meterline_core::usage::NewUsageEntry;
use meterline_core::{DenyReason, QuotaVerdict};

use crate::state::AppState;
use crate::tenant::TenantContext;

pub const LIMIT_HEADER: &str = "x-ratelimit-limit";
pub const REMAINING_HEADER: &str = "x-ratelimit-remaining";
pub const RESET_HEADER: &str = "x-ratelimit-reset";

/// Units consumed by one metered request.
const UNITS_PER_REQUEST: i64 = 1;

/// Middleware state: the shared app state plus the action this route meters.
#[derive(Clone)]
pub struct QuotaGuard {
    pub state: Arc<AppState>,
    pub action: &'static str,
}

impl QuotaGuard {
    pub fn new(state: &Arc<AppState>, action: &'static str) -> Self {
        Self {
            state: Arc::clone(state),
            action,
        }
    }
}

/// HTTP status for a denied verdict. Only policy denials are 429.
pub fn deny_status(reason: Option<DenyReason>) -> StatusCode {
    match reason {
        None => StatusCode::TOO_MANY_REQUESTS,
        Some(reason) if reason.is_policy() => StatusCode::TOO_MANY_REQUESTS,
        Some(DenyReason::InvalidAmount) => StatusCode::BAD_REQUEST,
        Some(DenyReason::LedgerUnavailable) => StatusCode::SERVICE_UNAVAILABLE,
        Some(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Set the `X-RateLimit-*` headers from `verdict`, reporting `remaining`.
pub fn apply_quota_headers(headers: &mut HeaderMap, verdict: &QuotaVerdict, remaining: i64) {
    headers.insert(
        HeaderName::from_static(LIMIT_HEADER),
        HeaderValue::from(verdict.limit),
    );
    headers.insert(
        HeaderName::from_static(REMAINING_HEADER),
        HeaderValue::from(remaining),
    );
    if let Some(reset) = verdict.reset_date {
        let formatted = reset.to_rfc3339_opts(SecondsFormat::Secs, true);
        if let Ok(value) = HeaderValue::from_str(&formatted) {
            headers.insert(HeaderName::from_static(RESET_HEADER), value);
        }
    }
}

/// Response for a request that failed its quota check.
pub fn deny_response(verdict: &QuotaVerdict) -> Response {
    let code = verdict
        .reason
        .map(|r| r.as_str())
        .unwrap_or(DenyReason::QuotaExceeded.as_str());
    let mut response = (
        deny_status(verdict.reason),
        Json(json!({
            "error": "Quota exceeded",
            "code": code,
            "message": verdict.message.as_deref().unwrap_or("Quota exceeded"),
            "remaining": verdict.remaining,
            "limit": verdict.limit,
        })),
    )
        .into_response();
    apply_quota_headers(response.headers_mut(), verdict, verdict.remaining);
    response
}

/// `axum::middleware::from_fn_with_state` entry point for a metered route.
pub async fn enforce_quota(
    State(guard): State<QuotaGuard>,
    request: Request,
    next: Next,
) -> Response {
    let QuotaGuard { state, action } = guard;

    let tenant = match TenantContext::from_headers(request.headers(), &state.config.tenant_header)
    {
        Ok(tenant) => tenant,
        Err(rejection) => return rejection.into_response(),
    };

    let verdict = state
        .engine
        .check_action(&tenant.tenant_id, action, UNITS_PER_REQUEST)
        .await;
    if !verdict.allowed {
        return deny_response(&verdict);
    }

    let method = request.method().to_string();
    let path = request.uri().path().to_string();

    let mut response = next.run(request).await;

    if !response.status().is_success() {
        // Failed operations are not billed.
        apply_quota_headers(response.headers_mut(), &verdict, verdict.remaining);
        return response;
    }

    let Some(resource_type) = verdict.resource_type.clone() else {
        // Unmapped action let through by policy: nothing to meter.
        debug!(tenant_id = %tenant.tenant_id, action, "Served unmetered action");
        apply_quota_headers(response.headers_mut(), &verdict, verdict.remaining);
        return response;
    };

    let entry = NewUsageEntry {
        tenant_id: tenant.tenant_id.clone(),
        subscription_id: verdict.subscription_id.clone(),
        resource_type,
        amount: UNITS_PER_REQUEST,
        metadata: json!({ "action": action, "method": method, "path": path }),
        created_at: None,
    };

    let remaining = match state.engine.record_usage(entry).await {
        Ok(_) => verdict.remaining_after(UNITS_PER_REQUEST),
        Err(e) => {
            error!(
                tenant_id = %tenant.tenant_id,
                action,
                error = %e,
                "Usage record failed after successful request"
            );
            verdict.remaining
        }
    };
    apply_quota_headers(response.headers_mut(), &verdict, remaining);
    response
}
