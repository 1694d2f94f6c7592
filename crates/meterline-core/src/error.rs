use thiserror::Error;

use crate::verdict::DenyReason;

/// Failures raised while evaluating or recording quota consumption.
///
/// Check-path variants never cross the middleware boundary as errors: the
/// engine folds them into a denied [`crate::verdict::QuotaVerdict`] through
/// [`QuotaError::deny_reason`].
#[derive(Debug, Error)]
pub enum QuotaError {
    #[error("no active subscription for tenant {0}")]
    NoActiveSubscription(String),

    #[error("tenant {tenant_id} has {count} active subscriptions")]
    InconsistentState { tenant_id: String, count: usize },

    #[error("plan not found: {0}")]
    PlanNotFound(String),

    #[error("usage ledger query failed: {0}")]
    LedgerQuery(anyhow::Error),

    #[error("usage ledger write failed: {0}")]
    LedgerWrite(anyhow::Error),

    #[error("unknown action: {0}")]
    UnknownAction(String),

    #[error("usage amount must be positive (got {0})")]
    InvalidAmount(i64),

    #[error("store error: {0}")]
    Store(anyhow::Error),
}

impl QuotaError {
    pub fn deny_reason(&self) -> DenyReason {
        match self {
            QuotaError::NoActiveSubscription(_) => DenyReason::NoActiveSubscription,
            QuotaError::InconsistentState { .. } => DenyReason::InconsistentState,
            QuotaError::PlanNotFound(_) => DenyReason::PlanNotFound,
            QuotaError::UnknownAction(_) => DenyReason::UnknownAction,
            QuotaError::InvalidAmount(_) => DenyReason::InvalidAmount,
            QuotaError::LedgerQuery(_) | QuotaError::LedgerWrite(_) | QuotaError::Store(_) => {
                DenyReason::LedgerUnavailable
            }
        }
    }
}
