use chrono::{TimeZone, Utc};
use serde_json::json;

use meterline_core::plan::{BillingInterval, Plan, QuotaMap};
use meterline_core::store::{PlanRegistry, SubscriptionStore, UsageLedger};
use meterline_core::subscription::{Subscription, SubscriptionStatus};
use meterline_core::usage::NewUsageEntry;
use meterline_duckdb::DuckDbBackend;

fn quotas(pairs: &[(&str, i64)]) -> QuotaMap {
    pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
}

fn starter_plan() -> Plan {
    Plan {
        id: "starter".to_string(),
        name: "Starter".to_string(),
        billing_period: BillingInterval::Monthly,
        quotas: quotas(&[("api_calls", 1000), ("workflows", -1), ("storage_gb", 0)]),
        features: json!({ "sso": false }),
    }
}

fn subscription(id: &str, tenant_id: &str, status: SubscriptionStatus) -> Subscription {
    Subscription {
        id: id.to_string(),
        tenant_id: tenant_id.to_string(),
        plan_id: "starter".to_string(),
        status,
        start_date: Utc.with_ymd_and_hms(2024, 1, 15, 9, 30, 0).unwrap(),
        current_period_start: None,
        current_period_end: None,
        custom_quotas: None,
        created_at: Utc.with_ymd_and_hms(2024, 1, 15, 9, 30, 0).unwrap(),
    }
}

#[tokio::test]
async fn plan_round_trips_with_sentinels_intact() {
    let db = DuckDbBackend::open_in_memory().expect("db");
    db.upsert_plan(&starter_plan()).await.expect("upsert");

    let stored = db.get_plan("starter").await.expect("get").expect("present");
    assert_eq!(stored, starter_plan());
    assert_eq!(stored.quotas["workflows"], -1);
    assert_eq!(stored.quotas["storage_gb"], 0);

    assert!(db.get_plan("enterprise").await.expect("get").is_none());
}

#[tokio::test]
async fn plan_upsert_replaces_quotas() {
    let db = DuckDbBackend::open_in_memory().expect("db");
    db.upsert_plan(&starter_plan()).await.expect("upsert");

    let mut plan = starter_plan();
    plan.quotas = quotas(&[("api_calls", 5000)]);
    plan.billing_period = BillingInterval::Yearly;
    db.upsert_plan(&plan).await.expect("second upsert");

    let plans = db.list_plans().await.expect("list");
    assert_eq!(plans.len(), 1);
    assert_eq!(plans[0].quotas, quotas(&[("api_calls", 5000)]));
    assert_eq!(plans[0].billing_period, BillingInterval::Yearly);
}

#[tokio::test]
async fn plan_with_limit_below_unlimited_is_rejected() {
    let db = DuckDbBackend::open_in_memory().expect("db");
    let mut plan = starter_plan();
    plan.quotas.insert("api_calls".to_string(), -5);

    assert!(db.upsert_plan(&plan).await.is_err());
    assert!(db.list_plans().await.expect("list").is_empty());
}

#[tokio::test]
async fn only_active_rows_are_returned_for_a_tenant() {
    let db = DuckDbBackend::open_in_memory().expect("db");
    db.upsert_subscription(&subscription("sub_old", "org_a", SubscriptionStatus::Canceled))
        .await
        .expect("upsert");
    db.upsert_subscription(&subscription("sub_new", "org_a", SubscriptionStatus::Active))
        .await
        .expect("upsert");
    db.upsert_subscription(&subscription("sub_b", "org_b", SubscriptionStatus::Active))
        .await
        .expect("upsert");

    let active = db.active_subscriptions("org_a").await.expect("active");
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].id, "sub_new");
    assert_eq!(active[0].start_date, subscription("x", "org_a", SubscriptionStatus::Active).start_date);
}

#[tokio::test]
async fn duplicate_active_subscriptions_are_all_returned() {
    let db = DuckDbBackend::open_in_memory().expect("db");
    db.upsert_subscription(&subscription("sub_1", "org_a", SubscriptionStatus::Active))
        .await
        .expect("upsert");
    db.upsert_subscription(&subscription("sub_2", "org_a", SubscriptionStatus::Active))
        .await
        .expect("upsert");

    assert_eq!(db.active_subscriptions("org_a").await.expect("active").len(), 2);
}

#[tokio::test]
async fn subscription_upsert_keeps_explicit_period_and_custom_quotas() {
    let db = DuckDbBackend::open_in_memory().expect("db");
    let mut sub = subscription("sub_1", "org_a", SubscriptionStatus::Active);
    sub.current_period_start = Some(Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap());
    sub.current_period_end = Some(Utc.with_ymd_and_hms(2024, 6, 30, 23, 59, 59).unwrap());
    sub.custom_quotas = Some(quotas(&[("api_calls", 50_000)]));
    db.upsert_subscription(&sub).await.expect("upsert");

    sub.status = SubscriptionStatus::PastDue;
    db.upsert_subscription(&sub).await.expect("status change");

    let all = db.list_subscriptions(None).await.expect("list");
    assert_eq!(all, vec![sub.clone()]);
    assert!(db
        .list_subscriptions(Some(SubscriptionStatus::Active))
        .await
        .expect("list")
        .is_empty());
    assert_eq!(
        db.list_subscriptions(Some(SubscriptionStatus::PastDue))
            .await
            .expect("list")
            .len(),
        1
    );
}

#[tokio::test]
async fn invalid_custom_quotas_are_rejected() {
    let db = DuckDbBackend::open_in_memory().expect("db");
    let mut sub = subscription("sub_1", "org_a", SubscriptionStatus::Active);
    sub.custom_quotas = Some(quotas(&[("api_calls", -2)]));
    assert!(db.upsert_subscription(&sub).await.is_err());
}

#[tokio::test]
async fn stats_count_tenants_subscriptions_and_usage() {
    let db = DuckDbBackend::open_in_memory().expect("db");
    db.upsert_subscription(&subscription("sub_a", "org_a", SubscriptionStatus::Active))
        .await
        .expect("upsert");
    db.upsert_subscription(&subscription("sub_a_old", "org_a", SubscriptionStatus::Expired))
        .await
        .expect("upsert");
    db.upsert_subscription(&subscription("sub_b", "org_b", SubscriptionStatus::Trialing))
        .await
        .expect("upsert");

    let mut entry = NewUsageEntry::single("org_a", "api_calls");
    entry.amount = 3;
    db.record(entry).await.expect("record");
    db.record(NewUsageEntry::single("org_b", "api_calls"))
        .await
        .expect("record");

    let stats = db.stats().await.expect("stats");
    assert_eq!(stats.total_tenants, 2);
    assert_eq!(stats.active_subscriptions, 1);
    assert_eq!(stats.total_usage, 4);
}
