use anyhow::{Context, Result};
use async_trait::async_trait;

use meterline_core::plan::{BillingInterval, Plan, QuotaMap};
use meterline_core::store::PlanRegistry;

use crate::DuckDbBackend;

const PLAN_SELECT: &str = "SELECT id, name, billing_period, quotas, features FROM plans";

struct PlanRow {
    id: String,
    name: String,
    billing_period: String,
    quotas: String,
    features: String,
}

impl PlanRow {
    fn from_row(row: &duckdb::Row<'_>) -> duckdb::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            billing_period: row.get(2)?,
            quotas: row.get(3)?,
            features: row.get(4)?,
        })
    }

    fn into_plan(self) -> Result<Plan> {
        let quotas: QuotaMap = serde_json::from_str(&self.quotas)
            .with_context(|| format!("plan {} has malformed quotas", self.id))?;
        let features = serde_json::from_str(&self.features)
            .with_context(|| format!("plan {} has malformed features", self.id))?;
        Ok(Plan {
            billing_period: BillingInterval::parse(&self.billing_period)?,
            id: self.id,
            name: self.name,
            quotas,
            features,
        })
    }
}

#[async_trait]
impl PlanRegistry for DuckDbBackend {
    async fn get_plan(&self, plan_id: &str) -> Result<Option<Plan>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(&format!("{PLAN_SELECT} WHERE id = ?1"))?;
        let mut rows = stmt.query_map(duckdb::params![plan_id], PlanRow::from_row)?;
        rows.next().transpose()?.map(PlanRow::into_plan).transpose()
    }

    async fn list_plans(&self) -> Result<Vec<Plan>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(&format!("{PLAN_SELECT} ORDER BY id"))?;
        let rows = stmt.query_map([], PlanRow::from_row)?;
        let mut plans = Vec::new();
        for row in rows {
            plans.push(row?.into_plan()?);
        }
        Ok(plans)
    }

    /// Insert or replace a plan. Limits below `-1` are rejected.
    async fn upsert_plan(&self, plan: &Plan) -> Result<Plan> {
        plan.validate()?;
        let quotas = serde_json::to_string(&plan.quotas)?;
        let features = serde_json::to_string(&plan.features)?;

        let conn = self.conn.lock().await;
        conn.execute(
            r#"INSERT INTO plans (id, name, billing_period, quotas, features, updated_at)
               VALUES (?1, ?2, ?3, ?4, ?5, CURRENT_TIMESTAMP)
               ON CONFLICT (id) DO UPDATE SET
                   name = EXCLUDED.name,
                   billing_period = EXCLUDED.billing_period,
                   quotas = EXCLUDED.quotas,
                   features = EXCLUDED.features,
                   updated_at = EXCLUDED.updated_at"#,
            duckdb::params![
                plan.id,
                plan.name,
                plan.billing_period.as_str(),
                quotas,
                features
            ],
        )?;
        Ok(plan.clone())
    }
}
