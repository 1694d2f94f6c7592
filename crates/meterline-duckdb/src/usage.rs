use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, SubsecRound, Utc};

use meterline_core::store::UsageLedger;
use meterline_core::usage::{LedgerStats, NewUsageEntry, UsageLogEntry};

use crate::backend::{from_db_timestamp, to_db_timestamp};
use crate::DuckDbBackend;

impl DuckDbBackend {
    /// A tenant's ledger entries, newest first. Used by tests and the admin
    /// tooling; the engine itself only aggregates.
    pub async fn list_usage(&self, tenant_id: &str, limit: i64) -> Result<Vec<UsageLogEntry>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT id, tenant_id, subscription_id, resource_type, amount, metadata, \
             CAST(created_at AS VARCHAR) \
             FROM usage_logs WHERE tenant_id = ?1 \
             ORDER BY created_at DESC, id DESC LIMIT ?2",
        )?;
        let rows = stmt.query_map(duckdb::params![tenant_id, limit], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Option<String>>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, i64>(4)?,
                row.get::<_, String>(5)?,
                row.get::<_, String>(6)?,
            ))
        })?;

        let mut entries = Vec::new();
        for row in rows {
            let (id, tenant_id, subscription_id, resource_type, amount, metadata, created_at) =
                row?;
            entries.push(UsageLogEntry {
                metadata: serde_json::from_str(&metadata)
                    .with_context(|| format!("usage entry {id} has malformed metadata"))?,
                created_at: from_db_timestamp(&created_at)?,
                id,
                tenant_id,
                subscription_id,
                resource_type,
                amount,
            });
        }
        Ok(entries)
    }
}

#[async_trait]
impl UsageLedger for DuckDbBackend {
    async fn count_in_period(
        &self,
        tenant_id: &str,
        resource_type: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<i64> {
        let conn = self.conn.lock().await;
        // SUM(BIGINT) yields HUGEINT in DuckDB; cast back down for i64.
        let total: i64 = conn.query_row(
            "SELECT CAST(COALESCE(SUM(amount), 0) AS BIGINT) FROM usage_logs \
             WHERE tenant_id = ?1 AND resource_type = ?2 \
               AND created_at >= CAST(?3 AS TIMESTAMP) \
               AND created_at <= CAST(?4 AS TIMESTAMP)",
            duckdb::params![
                tenant_id,
                resource_type,
                to_db_timestamp(&start),
                to_db_timestamp(&end)
            ],
            |row| row.get(0),
        )?;
        Ok(total)
    }

    async fn record(&self, entry: NewUsageEntry) -> Result<UsageLogEntry> {
        if entry.amount <= 0 {
            return Err(anyhow!("usage amount must be positive (got {})", entry.amount));
        }
        let mut entry = entry.into_entry(Utc::now());
        // TIMESTAMP columns hold microseconds; return what a later read sees.
        entry.created_at = entry.created_at.trunc_subsecs(6);
        let metadata = serde_json::to_string(&entry.metadata)?;

        let conn = self.conn.lock().await;
        conn.execute(
            r#"INSERT INTO usage_logs (
                   id, tenant_id, subscription_id, resource_type, amount, metadata, created_at
               ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, CAST(?7 AS TIMESTAMP))"#,
            duckdb::params![
                entry.id,
                entry.tenant_id,
                entry.subscription_id,
                entry.resource_type,
                entry.amount,
                metadata,
                to_db_timestamp(&entry.created_at),
            ],
        )?;
        Ok(entry)
    }

    async fn reset(&self, tenant_id: &str, resource_type: Option<&str>) -> Result<u64> {
        let conn = self.conn.lock().await;
        let deleted = match resource_type {
            Some(resource_type) => conn.execute(
                "DELETE FROM usage_logs WHERE tenant_id = ?1 AND resource_type = ?2",
                duckdb::params![tenant_id, resource_type],
            )?,
            None => conn.execute(
                "DELETE FROM usage_logs WHERE tenant_id = ?1",
                duckdb::params![tenant_id],
            )?,
        };
        Ok(deleted as u64)
    }

    async fn prune_before(&self, tenant_id: &str, cutoff: DateTime<Utc>) -> Result<u64> {
        let conn = self.conn.lock().await;
        let deleted = conn.execute(
            "DELETE FROM usage_logs WHERE tenant_id = ?1 AND created_at < CAST(?2 AS TIMESTAMP)",
            duckdb::params![tenant_id, to_db_timestamp(&cutoff)],
        )?;
        Ok(deleted as u64)
    }

    async fn stats(&self) -> Result<LedgerStats> {
        let conn = self.conn.lock().await;
        let (total_tenants, active_subscriptions): (i64, i64) = conn.query_row(
            "SELECT COUNT(DISTINCT tenant_id), \
                    COUNT(*) FILTER (WHERE status = 'active') \
             FROM subscriptions",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        let total_usage: i64 = conn.query_row(
            "SELECT CAST(COALESCE(SUM(amount), 0) AS BIGINT) FROM usage_logs",
            [],
            |row| row.get(0),
        )?;
        Ok(LedgerStats {
            total_tenants,
            active_subscriptions,
            total_usage,
        })
    }
}
