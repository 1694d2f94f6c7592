//! Plan definitions and effective-quota resolution.

use std::collections::BTreeMap;

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

use crate::subscription::Subscription;

/// Quota value meaning "no limit". `0` is a hard zero quota, never unlimited.
pub const UNLIMITED: i64 = -1;

/// Resource-type key → limit. A `BTreeMap` keeps usage reports sorted by key.
pub type QuotaMap = BTreeMap<String, i64>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BillingInterval {
    #[default]
    Monthly,
    Yearly,
}

impl BillingInterval {
    pub fn as_str(&self) -> &'static str {
        match self {
            BillingInterval::Monthly => "monthly",
            BillingInterval::Yearly => "yearly",
        }
    }

    pub fn parse(raw: &str) -> Result<Self> {
        match raw.trim() {
            "monthly" => Ok(Self::Monthly),
            "yearly" => Ok(Self::Yearly),
            other => Err(anyhow!(
                "billing_period must be one of: monthly, yearly (got {other:?})"
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub id: String,
    pub name: String,
    pub billing_period: BillingInterval,
    #[serde(default)]
    pub quotas: QuotaMap,
    #[serde(default = "empty_object")]
    pub features: serde_json::Value,
}

fn empty_object() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}

impl Plan {
    /// Reject limits below the unlimited sentinel and blank identifiers.
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(anyhow!("plan id must not be empty"));
        }
        if self.name.trim().is_empty() {
            return Err(anyhow!("plan name must not be empty"));
        }
        validate_quotas(&self.quotas)
    }
}

pub fn validate_quotas(quotas: &QuotaMap) -> Result<()> {
    for (resource_type, limit) in quotas {
        if resource_type.trim().is_empty() {
            return Err(anyhow!("quota resource type must not be empty"));
        }
        if *limit < UNLIMITED {
            return Err(anyhow!(
                "quota for {resource_type} must be >= -1 (got {limit})"
            ));
        }
    }
    Ok(())
}

/// Plan quotas with the subscription's custom quotas merged over them.
///
/// Custom values win per key; keys the subscription does not override fall
/// back to the plan default.
pub fn effective_quotas(plan: &Plan, subscription: &Subscription) -> QuotaMap {
    let mut merged = plan.quotas.clone();
    if let Some(custom) = &subscription.custom_quotas {
        for (resource_type, limit) in custom {
            merged.insert(resource_type.clone(), *limit);
        }
    }
    merged
}

/// Normalised limit for a single resource type.
///
/// Missing keys mean zero. Negative values other than [`UNLIMITED`] cannot be
/// written through [`Plan::validate`]; if one is read anyway it counts as zero.
pub fn limit_for(quotas: &QuotaMap, resource_type: &str) -> i64 {
    match quotas.get(resource_type).copied() {
        Some(UNLIMITED) => UNLIMITED,
        Some(limit) if limit >= 0 => limit,
        _ => 0,
    }
}
