use std::sync::Arc;

use axum::{
    extract::FromRequestParts,
    http::{request::Parts, HeaderMap},
};

use crate::{error::AppError, state::AppState};

/// Header carrying the caller's email, consulted by the admin routes.
pub const USER_EMAIL_HEADER: &str = "x-user-email";

/// Identity forwarded by the upstream authentication layer.
///
/// Meterline does not authenticate callers itself: the tenant header (default
/// `x-tenant-id`, see `METERLINE_TENANT_HEADER`) is trusted as-is.
///
/// `FromRequestParts` rejects with [`AppError::Unauthorized`] (`401`) when the
/// tenant header is missing or blank.
#[derive(Debug, Clone)]
pub struct TenantContext {
    pub tenant_id: String,
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

impl TenantContext {
    /// Read the tenant identity from `headers` using the configured header name.
    pub fn from_headers(headers: &HeaderMap, tenant_header: &str) -> Result<Self, AppError> {
        header_value(headers, tenant_header)
            .map(|tenant_id| Self { tenant_id })
            .ok_or(AppError::Unauthorized)
    }
}

impl FromRequestParts<Arc<AppState>> for TenantContext {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        TenantContext::from_headers(&parts.headers, &state.config.tenant_header)
    }
}

/// Caller email from the `x-user-email` header, if present.
pub fn user_email(headers: &HeaderMap) -> Option<String> {
    header_value(headers, USER_EMAIL_HEADER)
}

#[cfg(test)]
mod tests {
    use axum::http::{HeaderValue, StatusCode};
    use axum::response::IntoResponse;

    use super::*;

    #[test]
    fn reads_configured_header_and_trims() {
        let mut headers = HeaderMap::new();
        headers.insert("x-org", HeaderValue::from_static("  org_a "));
        headers.insert(USER_EMAIL_HEADER, HeaderValue::from_static("ops@example.com"));

        let ctx = TenantContext::from_headers(&headers, "x-org").expect("tenant");
        assert_eq!(ctx.tenant_id, "org_a");
        assert_eq!(user_email(&headers).as_deref(), Some("ops@example.com"));
    }

    #[test]
    fn blank_or_missing_tenant_is_rejected() {
        let mut headers = HeaderMap::new();
        let err = TenantContext::from_headers(&headers, "x-tenant-id").unwrap_err();
        assert_eq!(err.into_response().status(), StatusCode::UNAUTHORIZED);
        headers.insert("x-tenant-id", HeaderValue::from_static("   "));
        assert!(TenantContext::from_headers(&headers, "x-tenant-id").is_err());
    }
}
