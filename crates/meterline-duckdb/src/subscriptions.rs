use anyhow::{Context, Result};
use async_trait::async_trait;

use meterline_core::plan::{validate_quotas, QuotaMap};
use meterline_core::store::SubscriptionStore;
use meterline_core::subscription::{Subscription, SubscriptionStatus};

use crate::backend::{from_db_timestamp, from_db_timestamp_opt, to_db_timestamp};
use crate::DuckDbBackend;

const SUBSCRIPTION_SELECT: &str = "SELECT id, tenant_id, plan_id, status, \
     CAST(start_date AS VARCHAR), CAST(current_period_start AS VARCHAR), \
     CAST(current_period_end AS VARCHAR), custom_quotas, CAST(created_at AS VARCHAR) \
     FROM subscriptions";

struct SubscriptionRow {
    id: String,
    tenant_id: String,
    plan_id: String,
    status: String,
    start_date: String,
    current_period_start: Option<String>,
    current_period_end: Option<String>,
    custom_quotas: Option<String>,
    created_at: String,
}

impl SubscriptionRow {
    fn from_row(row: &duckdb::Row<'_>) -> duckdb::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            tenant_id: row.get(1)?,
            plan_id: row.get(2)?,
            status: row.get(3)?,
            start_date: row.get(4)?,
            current_period_start: row.get(5)?,
            current_period_end: row.get(6)?,
            custom_quotas: row.get(7)?,
            created_at: row.get(8)?,
        })
    }

    fn into_subscription(self) -> Result<Subscription> {
        let custom_quotas = self
            .custom_quotas
            .as_deref()
            .map(serde_json::from_str::<QuotaMap>)
            .transpose()
            .with_context(|| format!("subscription {} has malformed custom_quotas", self.id))?;
        Ok(Subscription {
            status: SubscriptionStatus::parse(&self.status)?,
            start_date: from_db_timestamp(&self.start_date)?,
            current_period_start: from_db_timestamp_opt(self.current_period_start)?,
            current_period_end: from_db_timestamp_opt(self.current_period_end)?,
            created_at: from_db_timestamp(&self.created_at)?,
            custom_quotas,
            id: self.id,
            tenant_id: self.tenant_id,
            plan_id: self.plan_id,
        })
    }
}

fn collect(rows: impl Iterator<Item = duckdb::Result<SubscriptionRow>>) -> Result<Vec<Subscription>> {
    let mut out = Vec::new();
    for row in rows {
        out.push(row?.into_subscription()?);
    }
    Ok(out)
}

#[async_trait]
impl SubscriptionStore for DuckDbBackend {
    async fn active_subscriptions(&self, tenant_id: &str) -> Result<Vec<Subscription>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(&format!(
            "{SUBSCRIPTION_SELECT} WHERE tenant_id = ?1 AND status = 'active' ORDER BY id"
        ))?;
        let rows = stmt.query_map(duckdb::params![tenant_id], SubscriptionRow::from_row)?;
        collect(rows)
    }

    async fn list_subscriptions(
        &self,
        status: Option<SubscriptionStatus>,
    ) -> Result<Vec<Subscription>> {
        let conn = self.conn.lock().await;
        match status {
            Some(status) => {
                let mut stmt = conn.prepare(&format!(
                    "{SUBSCRIPTION_SELECT} WHERE status = ?1 ORDER BY tenant_id, id"
                ))?;
                let rows =
                    stmt.query_map(duckdb::params![status.as_str()], SubscriptionRow::from_row)?;
                collect(rows)
            }
            None => {
                let mut stmt =
                    conn.prepare(&format!("{SUBSCRIPTION_SELECT} ORDER BY tenant_id, id"))?;
                let rows = stmt.query_map([], SubscriptionRow::from_row)?;
                collect(rows)
            }
        }
    }

    async fn upsert_subscription(&self, subscription: &Subscription) -> Result<Subscription> {
        if let Some(custom) = &subscription.custom_quotas {
            validate_quotas(custom)?;
        }
        let custom_quotas = subscription
            .custom_quotas
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        let conn = self.conn.lock().await;
        conn.execute(
            r#"INSERT INTO subscriptions (
                   id, tenant_id, plan_id, status, start_date,
                   current_period_start, current_period_end, custom_quotas, created_at
               ) VALUES (
                   ?1, ?2, ?3, ?4, CAST(?5 AS TIMESTAMP),
                   CAST(?6 AS TIMESTAMP), CAST(?7 AS TIMESTAMP), ?8, CAST(?9 AS TIMESTAMP)
               )
               ON CONFLICT (id) DO UPDATE SET
                   tenant_id = EXCLUDED.tenant_id,
                   plan_id = EXCLUDED.plan_id,
                   status = EXCLUDED.status,
                   start_date = EXCLUDED.start_date,
                   current_period_start = EXCLUDED.current_period_start,
                   current_period_end = EXCLUDED.current_period_end,
                   custom_quotas = EXCLUDED.custom_quotas"#,
            duckdb::params![
                subscription.id,
                subscription.tenant_id,
                subscription.plan_id,
                subscription.status.as_str(),
                to_db_timestamp(&subscription.start_date),
                subscription.current_period_start.as_ref().map(to_db_timestamp),
                subscription.current_period_end.as_ref().map(to_db_timestamp),
                custom_quotas,
                to_db_timestamp(&subscription.created_at),
            ],
        )?;
        Ok(subscription.clone())
    }
}
