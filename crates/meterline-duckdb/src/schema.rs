/// DuckDB initialization SQL.
///
/// Executed once at database open time via `Connection::execute_batch`.
/// All statements use `IF NOT EXISTS` so they are safe to re-run on every
/// startup.
///
/// `memory_limit` comes from `Config.duckdb_memory_limit`
/// (env `METERLINE_DUCKDB_MEMORY`, default `"1GB"`).
///
/// NOTE: DuckDB rejects `ON CONFLICT DO UPDATE` that touches indexed columns.
/// `plans` and `subscriptions` therefore carry no secondary indexes; their
/// upserts only rewrite non-key columns.
///
/// Timestamps are stored as naive UTC `TIMESTAMP` values; see
/// [`crate::backend::to_db_timestamp`].
pub fn init_sql(memory_limit: &str) -> String {
    format!(
        r#"SET memory_limit = '{memory_limit}';
SET threads = 2;

-- ===========================================
-- PLANS (reference data, read-only to the quota engine)
-- ===========================================
-- quotas:   JSON object resource_type -> limit; -1 = unlimited, 0 = none
-- features: JSON object, opaque to the engine
CREATE TABLE IF NOT EXISTS plans (
    id              VARCHAR PRIMARY KEY,
    name            VARCHAR NOT NULL,
    billing_period  VARCHAR NOT NULL DEFAULT 'monthly',   -- 'monthly' | 'yearly'
    quotas          VARCHAR NOT NULL DEFAULT '{{}}',
    features        VARCHAR NOT NULL DEFAULT '{{}}',
    updated_at      TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
);

-- ===========================================
-- SUBSCRIPTIONS (written by billing sync, read by the engine)
-- ===========================================
-- At most one 'active' row per tenant is expected; the engine treats more
-- than one as an integrity error instead of choosing.
CREATE TABLE IF NOT EXISTS subscriptions (
    id                    VARCHAR PRIMARY KEY,
    tenant_id             VARCHAR NOT NULL,
    plan_id               VARCHAR NOT NULL,
    status                VARCHAR NOT NULL,       -- active | trialing | past_due | canceled | expired
    start_date            TIMESTAMP NOT NULL,
    current_period_start  TIMESTAMP,              -- NULL on legacy rows: period is derived from start_date
    current_period_end    TIMESTAMP,
    custom_quotas         VARCHAR,                -- JSON object overriding plan quotas per key
    created_at            TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
);

-- ===========================================
-- USAGE LOGS (append-only ledger)
-- ===========================================
CREATE TABLE IF NOT EXISTS usage_logs (
    id               VARCHAR PRIMARY KEY,        -- UUID v4
    tenant_id        VARCHAR NOT NULL,
    subscription_id  VARCHAR,
    resource_type    VARCHAR NOT NULL,
    amount           BIGINT NOT NULL CHECK (amount > 0),
    metadata         VARCHAR NOT NULL DEFAULT '{{}}',
    created_at       TIMESTAMP NOT NULL
);
-- Optimised for the period-scoped SUM in count_in_period
CREATE INDEX IF NOT EXISTS idx_usage_tenant_resource_created
    ON usage_logs(tenant_id, resource_type, created_at);

-- ===========================================
-- ITEMS (tenant records behind the metered item routes)
-- ===========================================
CREATE TABLE IF NOT EXISTS items (
    id              VARCHAR PRIMARY KEY,          -- 'item_' + 10 random chars
    tenant_id       VARCHAR NOT NULL,
    name            VARCHAR NOT NULL,
    description     VARCHAR,
    created_at      TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
    updated_at      TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
);
"#
    )
}

pub const MIGRATIONS_TABLE_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS _migrations (
    id          VARCHAR PRIMARY KEY,
    applied_at  TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
);
"#;
