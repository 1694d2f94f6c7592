//! In-process [`QuotaStore`] backed by plain collections.
//!
//! Used by unit tests and by embedders that do not need durable storage. All
//! locks are released before any `.await`.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::period::BillingPeriod;
use crate::plan::Plan;
use crate::store::{PlanRegistry, SubscriptionStore, UsageLedger};
use crate::subscription::{Subscription, SubscriptionStatus};
use crate::usage::{LedgerStats, NewUsageEntry, UsageLogEntry};

#[derive(Default)]
struct Tables {
    plans: BTreeMap<String, Plan>,
    subscriptions: BTreeMap<String, Subscription>,
    usage: Vec<UsageLogEntry>,
}

#[derive(Default)]
pub struct InMemoryStore {
    tables: Mutex<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> Result<MutexGuard<'_, Tables>> {
        self.tables
            .lock()
            .map_err(|_| anyhow!("in-memory store lock poisoned"))
    }

    /// Snapshot of every ledger entry, oldest first.
    pub fn entries(&self) -> Result<Vec<UsageLogEntry>> {
        Ok(self.tables()?.usage.clone())
    }
}

#[async_trait]
impl PlanRegistry for InMemoryStore {
    async fn get_plan(&self, plan_id: &str) -> Result<Option<Plan>> {
        Ok(self.tables()?.plans.get(plan_id).cloned())
    }

    async fn list_plans(&self) -> Result<Vec<Plan>> {
        Ok(self.tables()?.plans.values().cloned().collect())
    }

    async fn upsert_plan(&self, plan: &Plan) -> Result<Plan> {
        plan.validate()?;
        self.tables()?.plans.insert(plan.id.clone(), plan.clone());
        Ok(plan.clone())
    }
}

#[async_trait]
impl SubscriptionStore for InMemoryStore {
    async fn active_subscriptions(&self, tenant_id: &str) -> Result<Vec<Subscription>> {
        Ok(self
            .tables()?
            .subscriptions
            .values()
            .filter(|s| s.tenant_id == tenant_id && s.status == SubscriptionStatus::Active)
            .cloned()
            .collect())
    }

    async fn list_subscriptions(
        &self,
        status: Option<SubscriptionStatus>,
    ) -> Result<Vec<Subscription>> {
        Ok(self
            .tables()?
            .subscriptions
            .values()
            .filter(|s| status.map_or(true, |wanted| s.status == wanted))
            .cloned()
            .collect())
    }

    async fn upsert_subscription(&self, subscription: &Subscription) -> Result<Subscription> {
        self.tables()?
            .subscriptions
            .insert(subscription.id.clone(), subscription.clone());
        Ok(subscription.clone())
    }
}

#[async_trait]
impl UsageLedger for InMemoryStore {
    async fn count_in_period(
        &self,
        tenant_id: &str,
        resource_type: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<i64> {
        let window = BillingPeriod { start, end };
        Ok(self
            .tables()?
            .usage
            .iter()
            .filter(|e| {
                e.tenant_id == tenant_id
                    && e.resource_type == resource_type
                    && window.contains(e.created_at)
            })
            .map(|e| e.amount)
            .sum())
    }

    async fn record(&self, entry: NewUsageEntry) -> Result<UsageLogEntry> {
        if entry.amount <= 0 {
            return Err(anyhow!("usage amount must be positive"));
        }
        let entry = entry.into_entry(Utc::now());
        self.tables()?.usage.push(entry.clone());
        Ok(entry)
    }

    async fn reset(&self, tenant_id: &str, resource_type: Option<&str>) -> Result<u64> {
        let mut tables = self.tables()?;
        let before = tables.usage.len();
        tables.usage.retain(|e| {
            e.tenant_id != tenant_id || resource_type.is_some_and(|r| e.resource_type != r)
        });
        Ok((before - tables.usage.len()) as u64)
    }

    async fn prune_before(&self, tenant_id: &str, cutoff: DateTime<Utc>) -> Result<u64> {
        let mut tables = self.tables()?;
        let before = tables.usage.len();
        tables
            .usage
            .retain(|e| e.tenant_id != tenant_id || e.created_at >= cutoff);
        Ok((before - tables.usage.len()) as u64)
    }

    async fn stats(&self) -> Result<LedgerStats> {
        let tables = self.tables()?;
        let tenants: HashSet<&str> = tables
            .subscriptions
            .values()
            .map(|s| s.tenant_id.as_str())
            .collect();
        Ok(LedgerStats {
            total_tenants: tenants.len() as i64,
            active_subscriptions: tables
                .subscriptions
                .values()
                .filter(|s| s.status == SubscriptionStatus::Active)
                .count() as i64,
            total_usage: tables.usage.iter().map(|e| e.amount).sum(),
        })
    }
}
