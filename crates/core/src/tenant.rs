//! Tenant configuration
//!
//! A tenant is one served retail brand/network. The directory owning these
//! records is an external collaborator; the core reads them only.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Serving configuration for one tenant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantConfig {
    /// Stable identifier, e.g. "kolesoplus"
    pub slug: String,
    /// Display name used in greetings and logs
    pub name: String,
    /// Dialed extensions routed to this tenant
    #[serde(default)]
    pub extensions: Vec<String>,
    /// Tools this tenant's agent may invoke
    #[serde(default)]
    pub enabled_tools: BTreeSet<String>,
    /// Opening line spoken when the call goes active
    pub greeting: String,
    /// Tenant-specific instructions appended after the scenario prompt
    #[serde(default)]
    pub prompt_suffix: String,
    /// Extension human operators are reachable on
    #[serde(default)]
    pub operator_extension: Option<String>,
    /// BCP-47-ish language tag for STT/TTS, e.g. "uk"
    #[serde(default = "default_language")]
    pub language: String,
    /// Scenario used when intent inference is inconclusive
    #[serde(default)]
    pub default_scenario: Option<String>,
}

fn default_language() -> String {
    "uk".to_string()
}

impl TenantConfig {
    /// Check whether a tool is enabled for this tenant. An empty set means
    /// every registered tool is allowed.
    pub fn allows_tool(&self, name: &str) -> bool {
        self.enabled_tools.is_empty() || self.enabled_tools.contains(name)
    }
}
