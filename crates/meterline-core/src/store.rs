//! Storage interfaces the quota engine depends on.
//!
//! The engine only needs point lookups, a filtered sum over a time range,
//! inserts, and delete-by-filter. DuckDB implements them for the server; the
//! in-memory store in [`crate::memory`] implements them for tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::plan::Plan;
use crate::subscription::{Subscription, SubscriptionStatus};
use crate::usage::{LedgerStats, NewUsageEntry, UsageLogEntry};

#[async_trait]
pub trait PlanRegistry: Send + Sync + 'static {
    async fn get_plan(&self, plan_id: &str) -> anyhow::Result<Option<Plan>>;
    async fn list_plans(&self) -> anyhow::Result<Vec<Plan>>;
    async fn upsert_plan(&self, plan: &Plan) -> anyhow::Result<Plan>;
}

#[async_trait]
pub trait SubscriptionStore: Send + Sync + 'static {
    /// Every row with `status = active` for `tenant_id`. Callers decide what
    /// more than one row means.
    async fn active_subscriptions(&self, tenant_id: &str) -> anyhow::Result<Vec<Subscription>>;
    async fn list_subscriptions(
        &self,
        status: Option<SubscriptionStatus>,
    ) -> anyhow::Result<Vec<Subscription>>;
    async fn upsert_subscription(&self, subscription: &Subscription)
        -> anyhow::Result<Subscription>;
}

/// Append-only consumption log.
#[async_trait]
pub trait UsageLedger: Send + Sync + 'static {
    /// Sum of `amount` for entries with `created_at` in `[start, end]`.
    async fn count_in_period(
        &self,
        tenant_id: &str,
        resource_type: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> anyhow::Result<i64>;

    async fn record(&self, entry: NewUsageEntry) -> anyhow::Result<UsageLogEntry>;

    /// Hard-delete a tenant's entries, optionally for one resource type only.
    async fn reset(&self, tenant_id: &str, resource_type: Option<&str>) -> anyhow::Result<u64>;

    /// Hard-delete a tenant's entries created strictly before `cutoff`.
    async fn prune_before(&self, tenant_id: &str, cutoff: DateTime<Utc>) -> anyhow::Result<u64>;

    async fn stats(&self) -> anyhow::Result<LedgerStats>;
}

/// Everything the quota engine reads and writes.
pub trait QuotaStore: PlanRegistry + SubscriptionStore + UsageLedger {}

impl<T> QuotaStore for T where T: PlanRegistry + SubscriptionStore + UsageLedger {}
