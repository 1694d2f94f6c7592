//! The quota decision core.
//!
//! A check resolves the tenant's single active subscription, looks up the
//! effective limit for the resource type, sums the ledger over the current
//! billing period, and returns a [`QuotaVerdict`]. Every failure on that path
//! becomes a denied verdict: checks fail closed and never return `Err`.
//!
//! Checks do not reserve capacity. Two concurrent requests can both observe
//! `usage = limit - 1` and both be allowed, so a burst may overshoot a limit
//! by up to (concurrency - 1) units before the ledger catches up.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{error, info, warn};

use crate::error::QuotaError;
use crate::plan::{limit_for, UNLIMITED};
use crate::policy::{QuotaPolicy, UnknownActionPolicy};
use crate::store::QuotaStore;
use crate::subscription::{ActiveSubscription, SubscriptionStatus};
use crate::usage::{NewUsageEntry, ResourceUsage, UsageLogEntry, UsageReport};
use crate::verdict::{DenyReason, QuotaVerdict};

pub struct QuotaEngine {
    store: Arc<dyn QuotaStore>,
    policy: QuotaPolicy,
}

impl QuotaEngine {
    pub fn new(store: Arc<dyn QuotaStore>, policy: QuotaPolicy) -> Self {
        Self { store, policy }
    }

    pub fn policy(&self) -> &QuotaPolicy {
        &self.policy
    }

    pub fn store(&self) -> &Arc<dyn QuotaStore> {
        &self.store
    }

    /// The tenant's one active subscription, joined with its plan.
    ///
    /// More than one active row is a data-integrity violation and is reported
    /// as [`QuotaError::InconsistentState`] rather than resolved by picking one.
    pub async fn get_active_subscription(
        &self,
        tenant_id: &str,
    ) -> Result<ActiveSubscription, QuotaError> {
        let mut rows = self
            .store
            .active_subscriptions(tenant_id)
            .await
            .map_err(QuotaError::Store)?;

        let subscription = match rows.len() {
            0 => return Err(QuotaError::NoActiveSubscription(tenant_id.to_string())),
            1 => rows.remove(0),
            count => {
                return Err(QuotaError::InconsistentState {
                    tenant_id: tenant_id.to_string(),
                    count,
                })
            }
        };

        let plan = self
            .store
            .get_plan(&subscription.plan_id)
            .await
            .map_err(QuotaError::Store)?
            .ok_or_else(|| QuotaError::PlanNotFound(subscription.plan_id.clone()))?;

        Ok(ActiveSubscription { subscription, plan })
    }

    pub async fn check_quota(
        &self,
        tenant_id: &str,
        resource_type: &str,
        requested: i64,
    ) -> QuotaVerdict {
        self.check_quota_at(tenant_id, resource_type, requested, Utc::now())
            .await
    }

    pub async fn check_quota_at(
        &self,
        tenant_id: &str,
        resource_type: &str,
        requested: i64,
        now: DateTime<Utc>,
    ) -> QuotaVerdict {
        if requested < 1 {
            return deny_invalid_amount(tenant_id, Some(resource_type), requested);
        }

        let active = match self.get_active_subscription(tenant_id).await {
            Ok(active) => active,
            Err(e) => return deny_on_error(tenant_id, resource_type, e),
        };

        let period = active.period(now);
        let limit = limit_for(&active.effective_quotas(), resource_type);

        let mut verdict = if limit == UNLIMITED {
            // Usage is only reported for display; the decision does not need it.
            let usage = self
                .store
                .count_in_period(tenant_id, resource_type, period.start, period.end)
                .await
                .unwrap_or_else(|e| {
                    warn!(tenant_id, resource_type, error = %e, "Usage lookup failed for unlimited quota");
                    0
                });
            QuotaVerdict::unlimited(Some(resource_type), usage, Some(period.end))
        } else {
            match self
                .store
                .count_in_period(tenant_id, resource_type, period.start, period.end)
                .await
            {
                Ok(usage) => {
                    QuotaVerdict::evaluate(resource_type, limit, usage, requested, Some(period.end))
                }
                Err(e) => {
                    error!(tenant_id, resource_type, error = %e, "Usage ledger query failed, denying");
                    let mut verdict = QuotaVerdict::denied(
                        DenyReason::LedgerUnavailable,
                        Some(resource_type),
                        "Unable to verify usage, try again later",
                    );
                    verdict.limit = limit;
                    verdict.reset_date = Some(period.end);
                    verdict
                }
            }
        };

        if verdict.reason == Some(DenyReason::QuotaExceeded) {
            info!(
                tenant_id,
                resource_type,
                usage = verdict.usage,
                limit = verdict.limit,
                "Quota exceeded"
            );
        }
        verdict.subscription_id = Some(active.subscription.id);
        verdict
    }

    pub async fn check_action(&self, tenant_id: &str, action: &str, requested: i64) -> QuotaVerdict {
        self.check_action_at(tenant_id, action, requested, Utc::now())
            .await
    }

    /// Map `action` to its resource type, then check it.
    pub async fn check_action_at(
        &self,
        tenant_id: &str,
        action: &str,
        requested: i64,
        now: DateTime<Utc>,
    ) -> QuotaVerdict {
        if requested < 1 {
            return deny_invalid_amount(tenant_id, self.policy.resource_for(action), requested);
        }

        if let Some(resource_type) = self.policy.resource_for(action) {
            return self
                .check_quota_at(tenant_id, resource_type, requested, now)
                .await;
        }

        match self.policy.unknown_actions {
            UnknownActionPolicy::Deny => {
                warn!(tenant_id, action, "Unmapped action denied");
                QuotaVerdict::denied(
                    DenyReason::UnknownAction,
                    None,
                    format!("Unknown action: {action}"),
                )
            }
            UnknownActionPolicy::Allow => QuotaVerdict::unlimited(None, 0, None),
        }
    }

    /// Append one consumption fact to the ledger.
    pub async fn record_usage(&self, entry: NewUsageEntry) -> Result<UsageLogEntry, QuotaError> {
        if entry.amount <= 0 {
            return Err(QuotaError::InvalidAmount(entry.amount));
        }
        self.store
            .record(entry)
            .await
            .map_err(QuotaError::LedgerWrite)
    }

    /// Administrative reset: delete the tenant's ledger entries.
    pub async fn reset_usage(
        &self,
        tenant_id: &str,
        resource_type: Option<&str>,
    ) -> Result<u64, QuotaError> {
        let deleted = self
            .store
            .reset(tenant_id, resource_type)
            .await
            .map_err(QuotaError::LedgerWrite)?;
        info!(tenant_id, resource_type, deleted, "Quota usage reset");
        Ok(deleted)
    }

    pub async fn usage_report(&self, tenant_id: &str) -> Result<UsageReport, QuotaError> {
        self.usage_report_at(tenant_id, Utc::now()).await
    }

    /// Current-period usage for every quota key the tenant is entitled to.
    pub async fn usage_report_at(
        &self,
        tenant_id: &str,
        now: DateTime<Utc>,
    ) -> Result<UsageReport, QuotaError> {
        let active = self.get_active_subscription(tenant_id).await?;
        let period = active.period(now);
        let quotas = active.effective_quotas();

        let mut resources = Vec::with_capacity(quotas.len());
        for resource_type in quotas.keys() {
            let usage = self
                .store
                .count_in_period(tenant_id, resource_type, period.start, period.end)
                .await
                .map_err(QuotaError::LedgerQuery)?;
            let limit = limit_for(&quotas, resource_type);
            let remaining = if limit == UNLIMITED {
                UNLIMITED
            } else {
                (limit - usage).max(0)
            };
            resources.push(ResourceUsage {
                resource_type: resource_type.clone(),
                limit,
                usage,
                remaining,
            });
        }

        Ok(UsageReport {
            tenant_id: tenant_id.to_string(),
            subscription_id: active.subscription.id,
            plan_id: active.plan.id,
            plan_name: active.plan.name,
            period_start: period.start,
            period_end: period.end,
            resources,
        })
    }

    pub async fn prune_stale_usage(&self, tenant_id: &str) -> Result<u64, QuotaError> {
        self.prune_stale_usage_at(tenant_id, Utc::now()).await
    }

    /// Drop ledger entries that predate the tenant's current period.
    pub async fn prune_stale_usage_at(
        &self,
        tenant_id: &str,
        now: DateTime<Utc>,
    ) -> Result<u64, QuotaError> {
        let active = self.get_active_subscription(tenant_id).await?;
        let period = active.period(now);
        self.store
            .prune_before(tenant_id, period.start)
            .await
            .map_err(QuotaError::LedgerWrite)
    }

    /// Prune every tenant with an active subscription. Per-tenant failures are
    /// logged and skipped.
    pub async fn prune_all_stale_usage(&self) -> Result<u64, QuotaError> {
        let now = Utc::now();
        let tenants: BTreeSet<String> = self
            .store
            .list_subscriptions(Some(SubscriptionStatus::Active))
            .await
            .map_err(QuotaError::Store)?
            .into_iter()
            .map(|s| s.tenant_id)
            .collect();

        let mut total = 0;
        for tenant_id in &tenants {
            match self.prune_stale_usage_at(tenant_id, now).await {
                Ok(deleted) => total += deleted,
                Err(e) => error!(tenant_id = %tenant_id, error = %e, "Stale usage prune failed"),
            }
        }
        Ok(total)
    }
}

/// A non-positive request would always pass `usage + requested <= limit`.
fn deny_invalid_amount(tenant_id: &str, resource_type: Option<&str>, requested: i64) -> QuotaVerdict {
    warn!(tenant_id, resource_type, requested, "Rejected non-positive quota request");
    QuotaVerdict::denied(
        DenyReason::InvalidAmount,
        resource_type,
        format!("Requested amount must be positive (got {requested})"),
    )
}

fn deny_on_error(tenant_id: &str, resource_type: &str, err: QuotaError) -> QuotaVerdict {
    let message = match &err {
        QuotaError::NoActiveSubscription(_) => {
            info!(tenant_id, resource_type, "No active subscription");
            "No active subscription"
        }
        QuotaError::InconsistentState { count, .. } => {
            error!(
                tenant_id,
                resource_type,
                count = *count,
                "Multiple active subscriptions, refusing to pick one"
            );
            "Subscription state is inconsistent"
        }
        QuotaError::PlanNotFound(plan_id) => {
            error!(tenant_id, resource_type, plan_id = %plan_id, "Subscription references a missing plan");
            "Subscription plan not found"
        }
        other => {
            error!(tenant_id, resource_type, error = %other, "Subscription lookup failed, denying");
            "Unable to verify quota, try again later"
        }
    };
    QuotaVerdict::denied(err.deny_reason(), Some(resource_type), message)
}
