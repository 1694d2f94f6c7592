use std::collections::HashSet;
use std::time::Duration;

use crate::policy::{parse_action_map, QuotaPolicy, UnknownActionPolicy};

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub data_dir: String,
    pub duckdb_memory_limit: String,
    pub cors_origins: Vec<String>,
    /// Lower-cased emails allowed on `/api/admin/*`.
    pub admin_emails: HashSet<String>,
    /// Header the upstream auth layer uses to pass the authenticated tenant.
    pub tenant_header: String,
    pub unknown_actions: UnknownActionPolicy,
    /// Extra `action → resource_type` mappings layered over the defaults.
    pub action_map: Vec<(String, String)>,
    pub request_timeout_secs: u64,
    /// `0` disables the stale-ledger pruning loop.
    pub prune_interval_secs: u64,
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        Ok(Self {
            port: std::env::var("METERLINE_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .map_err(|e| format!("invalid port: {e}"))?,
            data_dir: std::env::var("METERLINE_DATA_DIR")
                .unwrap_or_else(|_| "./data".to_string()),
            duckdb_memory_limit: std::env::var("METERLINE_DUCKDB_MEMORY")
                .unwrap_or_else(|_| "1GB".to_string()),
            cors_origins: std::env::var("METERLINE_CORS_ORIGINS")
                .map(|v| {
                    v.split(',')
                        .map(str::trim)
                        .filter(|o| !o.is_empty())
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default(),
            admin_emails: std::env::var("METERLINE_ADMIN_EMAILS")
                .map(|raw| parse_admin_emails(&raw))
                .unwrap_or_default(),
            tenant_header: std::env::var("METERLINE_TENANT_HEADER")
                .map(|v| v.trim().to_ascii_lowercase())
                .ok()
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| "x-tenant-id".to_string()),
            unknown_actions: match std::env::var("METERLINE_UNKNOWN_ACTIONS") {
                Ok(raw) => UnknownActionPolicy::parse(&raw)?,
                Err(_) => UnknownActionPolicy::Deny,
            },
            action_map: match std::env::var("METERLINE_ACTION_MAP") {
                Ok(raw) => parse_action_map(&raw)?,
                Err(_) => Vec::new(),
            },
            request_timeout_secs: std::env::var("METERLINE_REQUEST_TIMEOUT_SECS")
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .unwrap_or(30),
            prune_interval_secs: std::env::var("METERLINE_PRUNE_INTERVAL_SECS")
                .unwrap_or_else(|_| "0".to_string())
                .parse()
                .unwrap_or(0),
        })
    }

    pub fn quota_policy(&self) -> QuotaPolicy {
        QuotaPolicy::new(self.unknown_actions).with_actions(self.action_map.iter().cloned())
    }

    pub fn is_admin_email(&self, email: &str) -> bool {
        self.admin_emails.contains(&email.trim().to_lowercase())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    pub fn prune_interval(&self) -> Option<Duration> {
        (self.prune_interval_secs > 0).then(|| Duration::from_secs(self.prune_interval_secs))
    }
}

pub fn parse_admin_emails(raw: &str) -> HashSet<String> {
    raw.split(',')
        .map(|email| email.trim().to_lowercase())
        .filter(|email| !email.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> Config {
        Config {
            port: 0,
            data_dir: "/tmp/meterline-test".to_string(),
            duckdb_memory_limit: "1GB".to_string(),
            cors_origins: vec![],
            admin_emails: parse_admin_emails("Ops@Example.com, root@example.com,"),
            tenant_header: "x-tenant-id".to_string(),
            unknown_actions: UnknownActionPolicy::Deny,
            action_map: vec![("export_report".to_string(), "api_calls".to_string())],
            request_timeout_secs: 30,
            prune_interval_secs: 0,
        }
    }

    #[test]
    fn admin_emails_are_case_insensitive() {
        let cfg = config();
        assert_eq!(cfg.admin_emails.len(), 2);
        assert!(cfg.is_admin_email(" OPS@example.com "));
        assert!(!cfg.is_admin_email("someone@example.com"));
    }

    #[test]
    fn quota_policy_layers_configured_actions() {
        let policy = config().quota_policy();
        assert_eq!(policy.resource_for("export_report"), Some("api_calls"));
        assert_eq!(policy.resource_for("add_integration"), Some("integrations"));
    }

    #[test]
    fn prune_loop_is_off_by_default() {
        assert!(config().prune_interval().is_none());
    }
}
