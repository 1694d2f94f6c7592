use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::period::{derive_period, BillingPeriod};
use crate::plan::{BillingInterval, Plan, QuotaMap};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    Trialing,
    PastDue,
    Canceled,
    Expired,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::Trialing => "trialing",
            SubscriptionStatus::PastDue => "past_due",
            SubscriptionStatus::Canceled => "canceled",
            SubscriptionStatus::Expired => "expired",
        }
    }

    pub fn parse(raw: &str) -> Result<Self> {
        match raw.trim() {
            "active" => Ok(Self::Active),
            "trialing" => Ok(Self::Trialing),
            "past_due" => Ok(Self::PastDue),
            "canceled" => Ok(Self::Canceled),
            "expired" => Ok(Self::Expired),
            other => Err(anyhow!(
                "status must be one of: active, trialing, past_due, canceled, expired (got {other:?})"
            )),
        }
    }
}

/// A tenant's subscription, kept current by the billing provider.
///
/// Older rows only carry `start_date`; for those the period is derived, see
/// [`Subscription::billing_period`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscription {
    pub id: String,
    pub tenant_id: String,
    pub plan_id: String,
    pub status: SubscriptionStatus,
    pub start_date: DateTime<Utc>,
    pub current_period_start: Option<DateTime<Utc>>,
    pub current_period_end: Option<DateTime<Utc>>,
    pub custom_quotas: Option<QuotaMap>,
    pub created_at: DateTime<Utc>,
}

impl Subscription {
    /// The window usage is aggregated over at instant `now`.
    pub fn billing_period(&self, interval: BillingInterval, now: DateTime<Utc>) -> BillingPeriod {
        match (self.current_period_start, self.current_period_end) {
            (Some(start), Some(end)) => BillingPeriod { start, end },
            _ => derive_period(self.start_date, interval, now),
        }
    }
}

/// The single active subscription of a tenant, joined with its plan.
#[derive(Debug, Clone)]
pub struct ActiveSubscription {
    pub subscription: Subscription,
    pub plan: Plan,
}

impl ActiveSubscription {
    pub fn period(&self, now: DateTime<Utc>) -> BillingPeriod {
        self.subscription
            .billing_period(self.plan.billing_period, now)
    }

    pub fn effective_quotas(&self) -> QuotaMap {
        crate::plan::effective_quotas(&self.plan, &self.subscription)
    }
}
