use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::{Duration, Utc};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use meterline_core::config::{parse_admin_emails, Config};
use meterline_core::plan::{BillingInterval, Plan};
use meterline_core::policy::UnknownActionPolicy;
use meterline_core::store::{PlanRegistry, SubscriptionStore, UsageLedger};
use meterline_core::subscription::{Subscription, SubscriptionStatus};
use meterline_core::usage::NewUsageEntry;
use meterline_duckdb::DuckDbBackend;
use meterline_server::app::build_app;
use meterline_server::state::AppState;

const ADMIN: &str = "ops@example.com";

fn test_config(admin_emails: &str) -> Config {
    Config {
        port: 0,
        data_dir: "/tmp/meterline-test".to_string(),
        duckdb_memory_limit: "1GB".to_string(),
        cors_origins: vec![],
        admin_emails: parse_admin_emails(admin_emails),
        tenant_header: "x-tenant-id".to_string(),
        unknown_actions: UnknownActionPolicy::Deny,
        action_map: vec![],
        request_timeout_secs: 30,
        prune_interval_secs: 0,
    }
}

fn subscription(id: &str, tenant_id: &str, status: SubscriptionStatus) -> Subscription {
    let now = Utc::now();
    Subscription {
        id: id.to_string(),
        tenant_id: tenant_id.to_string(),
        plan_id: "starter".to_string(),
        status,
        start_date: now - Duration::days(3),
        current_period_start: None,
        current_period_end: None,
        custom_quotas: None,
        created_at: now - Duration::days(3),
    }
}

async fn setup(admin_emails: &str) -> (Arc<AppState>, axum::Router) {
    let db = DuckDbBackend::open_in_memory().expect("in-memory DuckDB");
    db.upsert_plan(&Plan {
        id: "starter".to_string(),
        name: "Starter".to_string(),
        billing_period: BillingInterval::Monthly,
        quotas: [("api_calls".to_string(), 100), ("workflows".to_string(), 5)]
            .into_iter()
            .collect(),
        features: json!({}),
    })
    .await
    .expect("seed plan");
    db.upsert_subscription(&subscription("sub_a", "org_a", SubscriptionStatus::Active))
        .await
        .expect("seed subscription");
    db.upsert_subscription(&subscription("sub_b", "org_b", SubscriptionStatus::Canceled))
        .await
        .expect("seed subscription");

    for resource_type in ["api_calls", "api_calls", "workflows"] {
        db.record(NewUsageEntry::single("org_a", resource_type))
            .await
            .expect("seed usage");
    }

    let state = Arc::new(AppState::new(db, test_config(admin_emails)));
    let app = build_app(Arc::clone(&state));
    (state, app)
}

async fn json_body(response: axum::http::Response<Body>) -> Value {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("read body")
        .to_bytes();
    serde_json::from_slice(&bytes).expect("parse JSON")
}

fn admin_request(method: &str, uri: &str, email: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(email) = email {
        builder = builder.header("x-user-email", email);
    }
    match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .expect("build request"),
        None => builder.body(Body::empty()).expect("build request"),
    }
}

#[tokio::test]
async fn test_admin_routes_require_listed_email() {
    let (_state, app) = setup(ADMIN).await;

    let response = app
        .clone()
        .oneshot(admin_request("GET", "/api/admin/stats", None, None))
        .await
        .expect("request");
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .clone()
        .oneshot(admin_request(
            "GET",
            "/api/admin/stats",
            Some("intruder@example.com"),
            None,
        ))
        .await
        .expect("request");
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(json_body(response).await["error"]["code"], "forbidden");

    // Email comparison is case-insensitive.
    let response = app
        .oneshot(admin_request("GET", "/api/admin/stats", Some("OPS@Example.com"), None))
        .await
        .expect("request");
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_empty_admin_list_locks_everyone_out() {
    let (_state, app) = setup("").await;

    let response = app
        .oneshot(admin_request("GET", "/api/admin/plans", Some(ADMIN), None))
        .await
        .expect("request");
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_quota_reset_for_one_resource_type() {
    let (state, app) = setup(ADMIN).await;

    let response = app
        .oneshot(admin_request(
            "POST",
            "/api/admin/tenants/org_a/quota-reset",
            Some(ADMIN),
            Some(json!({ "resource_type": "api_calls" })),
        ))
        .await
        .expect("request");
    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["data"]["tenant_id"], "org_a");
    assert_eq!(json["data"]["resource_type"], "api_calls");
    assert_eq!(json["data"]["deleted"], 2);

    let remaining = state.db.list_usage("org_a", 10).await.expect("usage");
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].resource_type, "workflows");
}

#[tokio::test]
async fn test_quota_reset_without_resource_clears_everything() {
    let (state, app) = setup(ADMIN).await;

    let response = app
        .clone()
        .oneshot(admin_request(
            "POST",
            "/api/admin/tenants/org_a/quota-reset",
            Some(ADMIN),
            Some(json!({})),
        ))
        .await
        .expect("request");
    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["data"]["deleted"], 3);
    assert!(json["data"]["resource_type"].is_null());
    assert!(state.db.list_usage("org_a", 10).await.expect("usage").is_empty());

    let response = app
        .oneshot(admin_request("GET", "/api/admin/tenants/org_a/usage", Some(ADMIN), None))
        .await
        .expect("request");
    let json = json_body(response).await;
    for resource in json["data"]["resources"].as_array().expect("resources") {
        assert_eq!(resource["usage"], 0);
    }
}

#[tokio::test]
async fn test_quota_reset_accepts_an_empty_body() {
    let (state, app) = setup(ADMIN).await;

    let response = app
        .oneshot(admin_request(
            "POST",
            "/api/admin/tenants/org_a/quota-reset",
            Some(ADMIN),
            None,
        ))
        .await
        .expect("request");
    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["data"]["deleted"], 3);
    assert!(json["data"]["resource_type"].is_null());
    assert!(state.db.list_usage("org_a", 10).await.expect("usage").is_empty());
}

#[tokio::test]
async fn test_quota_reset_checks_admin_before_reading_the_body() {
    let (state, app) = setup(ADMIN).await;

    let response = app
        .clone()
        .oneshot(admin_request(
            "POST",
            "/api/admin/tenants/org_a/quota-reset",
            Some("intruder@example.com"),
            None,
        ))
        .await
        .expect("request");
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let request = Request::builder()
        .method("POST")
        .uri("/api/admin/tenants/org_a/quota-reset")
        .header("x-user-email", "intruder@example.com")
        .header("content-type", "application/json")
        .body(Body::from("{not json"))
        .expect("build request");
    let response = app.clone().oneshot(request).await.expect("request");
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(state.db.list_usage("org_a", 10).await.expect("usage").len(), 3);

    let request = Request::builder()
        .method("POST")
        .uri("/api/admin/tenants/org_a/quota-reset")
        .header("x-user-email", ADMIN)
        .header("content-type", "application/json")
        .body(Body::from("{not json"))
        .expect("build request");
    let response = app.oneshot(request).await.expect("request");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["error"]["code"], "validation_error");
}

#[tokio::test]
async fn test_tenant_usage_report_and_missing_tenant() {
    let (_state, app) = setup(ADMIN).await;

    let response = app
        .clone()
        .oneshot(admin_request("GET", "/api/admin/tenants/org_a/usage", Some(ADMIN), None))
        .await
        .expect("request");
    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["data"]["subscription_id"], "sub_a");
    assert_eq!(json["data"]["resources"][0]["resource_type"], "api_calls");
    assert_eq!(json["data"]["resources"][0]["usage"], 2);
    assert_eq!(json["data"]["resources"][1]["usage"], 1);

    // org_b only has a canceled subscription.
    let response = app
        .oneshot(admin_request("GET", "/api/admin/tenants/org_b/usage", Some(ADMIN), None))
        .await
        .expect("request");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_list_subscriptions_filters_by_status() {
    let (_state, app) = setup(ADMIN).await;

    let response = app
        .clone()
        .oneshot(admin_request("GET", "/api/admin/subscriptions", Some(ADMIN), None))
        .await
        .expect("request");
    assert_eq!(json_body(response).await["data"].as_array().map(Vec::len), Some(2));

    let response = app
        .clone()
        .oneshot(admin_request(
            "GET",
            "/api/admin/subscriptions?status=canceled",
            Some(ADMIN),
            None,
        ))
        .await
        .expect("request");
    let json = json_body(response).await;
    assert_eq!(json["data"].as_array().map(Vec::len), Some(1));
    assert_eq!(json["data"][0]["tenant_id"], "org_b");

    let response = app
        .oneshot(admin_request(
            "GET",
            "/api/admin/subscriptions?status=paused",
            Some(ADMIN),
            None,
        ))
        .await
        .expect("request");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_plan_upsert_validates_and_takes_effect() {
    let (state, app) = setup(ADMIN).await;

    let response = app
        .clone()
        .oneshot(admin_request(
            "PUT",
            "/api/admin/plans/starter",
            Some(ADMIN),
            Some(json!({ "name": "Starter", "quotas": { "api_calls": -7 } })),
        ))
        .await
        .expect("request");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .clone()
        .oneshot(admin_request(
            "PUT",
            "/api/admin/plans/starter",
            Some(ADMIN),
            Some(json!({ "name": "  ", "quotas": {} })),
        ))
        .await
        .expect("request");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .clone()
        .oneshot(admin_request(
            "PUT",
            "/api/admin/plans/starter",
            Some(ADMIN),
            Some(json!({
                "name": "Starter",
                "billing_period": "yearly",
                "quotas": { "api_calls": 2 }
            })),
        ))
        .await
        .expect("request");
    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["data"]["billing_period"], "yearly");
    assert_eq!(json["data"]["quotas"]["api_calls"], 2);

    let plan = state.db.get_plan("starter").await.expect("get").expect("plan");
    assert_eq!(plan.quotas.get("workflows"), None);

    // org_a has already used 2 api_calls, so the lowered limit is exhausted.
    let request = Request::builder()
        .method("GET")
        .uri("/api/items")
        .header("x-tenant-id", "org_a")
        .body(Body::empty())
        .expect("build request");
    let response = app.clone().oneshot(request).await.expect("request");
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

    let response = app
        .oneshot(admin_request("GET", "/api/admin/plans", Some(ADMIN), None))
        .await
        .expect("request");
    assert_eq!(json_body(response).await["data"][0]["id"], "starter");
}

#[tokio::test]
async fn test_stats_summarise_the_ledger() {
    let (_state, app) = setup(ADMIN).await;

    let response = app
        .oneshot(admin_request("GET", "/api/admin/stats", Some(ADMIN), None))
        .await
        .expect("request");
    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["data"]["total_tenants"], 2);
    assert_eq!(json["data"]["active_subscriptions"], 1);
    assert_eq!(json["data"]["total_usage"], 3);
}
