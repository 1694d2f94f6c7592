use std::sync::Arc;

use axum::{
    http::HeaderValue,
    middleware::from_fn_with_state,
    routing::{get, post, put, MethodRouter},
    Router,
};
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::{
    enforcement::{enforce_quota, QuotaGuard},
    routes,
    state::AppState,
};

/// Wrap `route` so every call is checked and recorded against `action`.
fn metered(
    state: &Arc<AppState>,
    action: &'static str,
    route: MethodRouter<Arc<AppState>>,
) -> MethodRouter<Arc<AppState>> {
    route.route_layer(from_fn_with_state(
        QuotaGuard::new(state, action),
        enforce_quota,
    ))
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let allow_origin = if origins.is_empty() {
        AllowOrigin::from(Any)
    } else {
        AllowOrigin::list(
            origins
                .iter()
                .filter_map(|origin| HeaderValue::from_str(origin).ok()),
        )
    };
    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods(Any)
        .allow_headers(Any)
}

/// Construct the Axum [`Router`] with all routes and middleware attached.
///
/// Middleware is applied in outer-to-inner order (outermost runs first on
/// request, last on response):
///
/// 1. `TraceLayer`: structured request/response logging via `tracing`.
/// 2. `CorsLayer`: `METERLINE_CORS_ORIGINS`, or any origin when unset.
/// 3. `TimeoutLayer`: `METERLINE_REQUEST_TIMEOUT_SECS`. A request cut off here
///    never reaches the usage record step.
///
/// Item routes are metered per method; each method gets its own quota guard.
pub fn build_app(state: Arc<AppState>) -> Router {
    let tenant_routes = Router::new()
        .route("/api/quota/{action}", get(routes::quota::check_quota))
        .route("/api/usage", get(routes::usage::get_usage))
        .route(
            "/api/items",
            metered(&state, "list_items", get(routes::items::list_items)),
        )
        .route(
            "/api/items",
            metered(&state, "create_item", post(routes::items::create_item)),
        )
        .route(
            "/api/items/{id}",
            metered(&state, "update_item", put(routes::items::update_item)),
        );

    let admin_routes = Router::new()
        .route(
            "/api/admin/tenants/{tenant_id}/quota-reset",
            post(routes::admin::reset_tenant_quota),
        )
        .route(
            "/api/admin/tenants/{tenant_id}/usage",
            get(routes::admin::tenant_usage),
        )
        .route(
            "/api/admin/subscriptions",
            get(routes::admin::list_subscriptions),
        )
        .route("/api/admin/plans", get(routes::admin::list_plans))
        .route("/api/admin/plans/{plan_id}", put(routes::admin::upsert_plan))
        .route("/api/admin/stats", get(routes::admin::stats));

    Router::new()
        .route("/health", get(routes::health::health))
        .merge(tenant_routes)
        .merge(admin_routes)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors_layer(&state.config.cors_origins))
                .layer(TimeoutLayer::new(state.config.request_timeout())),
        )
        .with_state(state)
}
