//! Billing-period arithmetic.

use chrono::{DateTime, Datelike, Duration, Months, Utc};
use serde::{Deserialize, Serialize};

use crate::plan::BillingInterval;

/// Inclusive `[start, end]` window that usage is aggregated over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillingPeriod {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl BillingPeriod {
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start <= at && at <= self.end
    }
}

/// Derive the current period from a subscription's start date.
///
/// Anchors recur on the start's day-of-month (clamped to shorter months) and
/// time-of-day; the period begins at the most recent anchor `<= now` and ends
/// one microsecond before the next anchor. Before `start_date` the first
/// period is returned.
pub fn derive_period(
    start_date: DateTime<Utc>,
    interval: BillingInterval,
    now: DateTime<Utc>,
) -> BillingPeriod {
    let step: u32 = match interval {
        BillingInterval::Monthly => 1,
        BillingInterval::Yearly => 12,
    };

    let mut index = if now < start_date {
        0
    } else {
        let elapsed_months = (now.year() - start_date.year()) * 12 + now.month() as i32
            - start_date.month() as i32;
        elapsed_months.max(0) as u32 / step
    };

    let mut anchor = anchor_at(start_date, index * step);
    if anchor > now && index > 0 {
        index -= 1;
        anchor = anchor_at(start_date, index * step);
    }
    let next = anchor_at(start_date, (index + 1) * step);

    BillingPeriod {
        start: anchor,
        end: next - Duration::microseconds(1),
    }
}

/// `start_date` moved forward by whole months, clamped to the month's last day.
fn anchor_at(start_date: DateTime<Utc>, months: u32) -> DateTime<Utc> {
    start_date
        .checked_add_months(Months::new(months))
        .unwrap_or(start_date)
}
