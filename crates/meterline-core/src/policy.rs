//! Action → resource-type mapping and the unknown-action policy.

use std::collections::HashMap;

/// Built-in action map. Each entry meters the action against the resource
/// type's quota.
pub const DEFAULT_ACTIONS: &[(&str, &str)] = &[
    ("api_call", "api_calls"),
    ("create_item", "api_calls"),
    ("update_item", "api_calls"),
    ("list_items", "api_calls"),
    ("create_workflow", "workflows"),
    ("execute_workflow", "executions"),
    ("add_team_member", "team_members"),
    ("add_integration", "integrations"),
    ("upload_file", "storage_gb"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnknownActionPolicy {
    #[default]
    Deny,
    /// Unmapped actions pass unmetered. Must be opted into explicitly.
    Allow,
}

impl UnknownActionPolicy {
    pub fn parse(raw: &str) -> Result<Self, String> {
        match raw.trim() {
            "deny" => Ok(Self::Deny),
            "allow" => Ok(Self::Allow),
            other => Err(format!(
                "unknown-action policy must be 'deny' or 'allow' (got {other:?})"
            )),
        }
    }
}

#[derive(Debug, Clone)]
pub struct QuotaPolicy {
    actions: HashMap<String, String>,
    pub unknown_actions: UnknownActionPolicy,
}

impl Default for QuotaPolicy {
    fn default() -> Self {
        Self::new(UnknownActionPolicy::Deny)
    }
}

impl QuotaPolicy {
    /// Policy seeded with [`DEFAULT_ACTIONS`].
    pub fn new(unknown_actions: UnknownActionPolicy) -> Self {
        Self {
            actions: DEFAULT_ACTIONS
                .iter()
                .map(|(action, resource)| (action.to_string(), resource.to_string()))
                .collect(),
            unknown_actions,
        }
    }

    /// Add or override mappings.
    pub fn with_actions<I, A, R>(mut self, mappings: I) -> Self
    where
        I: IntoIterator<Item = (A, R)>,
        A: Into<String>,
        R: Into<String>,
    {
        for (action, resource) in mappings {
            self.actions.insert(action.into(), resource.into());
        }
        self
    }

    pub fn resource_for(&self, action: &str) -> Option<&str> {
        self.actions.get(action).map(String::as_str)
    }

    pub fn actions(&self) -> impl Iterator<Item = (&str, &str)> {
        self.actions
            .iter()
            .map(|(action, resource)| (action.as_str(), resource.as_str()))
    }
}

/// Parse `action=resource,action=resource`. Blank segments are skipped.
pub fn parse_action_map(raw: &str) -> Result<Vec<(String, String)>, String> {
    raw.split(',')
        .map(str::trim)
        .filter(|segment| !segment.is_empty())
        .map(|segment| {
            let (action, resource) = segment
                .split_once('=')
                .ok_or_else(|| format!("invalid action mapping {segment:?}, expected action=resource"))?;
            let (action, resource) = (action.trim(), resource.trim());
            if action.is_empty() || resource.is_empty() {
                return Err(format!("invalid action mapping {segment:?}"));
            }
            Ok((action.to_string(), resource.to_string()))
        })
        .collect()
}
