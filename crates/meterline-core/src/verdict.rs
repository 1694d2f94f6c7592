use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::plan::UNLIMITED;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DenyReason {
    NoActiveSubscription,
    QuotaExceeded,
    UnknownAction,
    InconsistentState,
    PlanNotFound,
    LedgerUnavailable,
    /// The caller asked for zero or fewer units.
    InvalidAmount,
}

impl DenyReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DenyReason::NoActiveSubscription => "no_active_subscription",
            DenyReason::QuotaExceeded => "quota_exceeded",
            DenyReason::UnknownAction => "unknown_action",
            DenyReason::InconsistentState => "inconsistent_state",
            DenyReason::PlanNotFound => "plan_not_found",
            DenyReason::LedgerUnavailable => "ledger_unavailable",
            DenyReason::InvalidAmount => "invalid_amount",
        }
    }

    /// `true` for denials caused by tenant entitlement rather than by the
    /// platform itself.
    pub fn is_policy(&self) -> bool {
        matches!(
            self,
            DenyReason::NoActiveSubscription | DenyReason::QuotaExceeded | DenyReason::UnknownAction
        )
    }
}

/// Outcome of a single quota check. Computed, never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaVerdict {
    pub allowed: bool,
    /// `-1` when unlimited.
    pub limit: i64,
    pub usage: i64,
    /// `-1` when unlimited.
    pub remaining: i64,
    pub reset_date: Option<DateTime<Utc>>,
    /// Subscription the verdict was evaluated against.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscription_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<DenyReason>,
}

impl QuotaVerdict {
    pub fn unlimited(
        resource_type: Option<&str>,
        usage: i64,
        reset_date: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            allowed: true,
            limit: UNLIMITED,
            usage,
            remaining: UNLIMITED,
            reset_date,
            subscription_id: None,
            resource_type: resource_type.map(str::to_string),
            message: None,
            reason: None,
        }
    }

    /// Verdict for a bounded quota: allowed iff `usage + requested <= limit`.
    pub fn evaluate(
        resource_type: &str,
        limit: i64,
        usage: i64,
        requested: i64,
        reset_date: Option<DateTime<Utc>>,
    ) -> Self {
        let remaining = (limit - usage).max(0);
        let allowed = usage.saturating_add(requested) <= limit;
        Self {
            allowed,
            limit,
            usage,
            remaining,
            reset_date,
            subscription_id: None,
            resource_type: Some(resource_type.to_string()),
            message: (!allowed)
                .then(|| format!("Quota exceeded: used {usage} of {limit} {resource_type}.")),
            reason: (!allowed).then_some(DenyReason::QuotaExceeded),
        }
    }

    /// Zeroed denial carrying `reason` and a human-readable message.
    pub fn denied(reason: DenyReason, resource_type: Option<&str>, message: impl Into<String>) -> Self {
        Self {
            allowed: false,
            limit: 0,
            usage: 0,
            remaining: 0,
            reset_date: None,
            subscription_id: None,
            resource_type: resource_type.map(str::to_string),
            message: Some(message.into()),
            reason: Some(reason),
        }
    }

    pub fn is_unlimited(&self) -> bool {
        self.limit == UNLIMITED
    }

    /// Remaining quota once `consumed` units of this verdict have been recorded.
    pub fn remaining_after(&self, consumed: i64) -> i64 {
        if self.is_unlimited() {
            UNLIMITED
        } else {
            (self.remaining - consumed).max(0)
        }
    }
}
