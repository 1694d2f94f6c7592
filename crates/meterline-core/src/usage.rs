use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One immutable consumption fact in the usage ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageLogEntry {
    pub id: String,
    pub tenant_id: String,
    pub subscription_id: Option<String>,
    pub resource_type: String,
    pub amount: i64,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// Insert parameters for [`crate::store::UsageLedger::record`].
#[derive(Debug, Clone)]
pub struct NewUsageEntry {
    pub tenant_id: String,
    pub subscription_id: Option<String>,
    pub resource_type: String,
    pub amount: i64,
    pub metadata: serde_json::Value,
    /// Defaults to the store's clock when `None`.
    pub created_at: Option<DateTime<Utc>>,
}

impl NewUsageEntry {
    /// A single unit of `resource_type` with empty metadata.
    pub fn single(tenant_id: &str, resource_type: &str) -> Self {
        Self {
            tenant_id: tenant_id.to_string(),
            subscription_id: None,
            resource_type: resource_type.to_string(),
            amount: 1,
            metadata: serde_json::json!({}),
            created_at: None,
        }
    }

    /// Materialise the entry with a fresh id.
    pub fn into_entry(self, now: DateTime<Utc>) -> UsageLogEntry {
        UsageLogEntry {
            id: uuid::Uuid::new_v4().to_string(),
            tenant_id: self.tenant_id,
            subscription_id: self.subscription_id,
            resource_type: self.resource_type,
            amount: self.amount,
            metadata: self.metadata,
            created_at: self.created_at.unwrap_or(now),
        }
    }
}

/// Platform-wide counters for the admin overview.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerStats {
    pub total_tenants: i64,
    pub active_subscriptions: i64,
    pub total_usage: i64,
}

/// Per-resource line of a [`UsageReport`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceUsage {
    pub resource_type: String,
    pub limit: i64,
    pub usage: i64,
    pub remaining: i64,
}

/// Current-period consumption of every quota a tenant is entitled to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageReport {
    pub tenant_id: String,
    pub subscription_id: String,
    pub plan_id: String,
    pub plan_name: String,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub resources: Vec<ResourceUsage>,
}
