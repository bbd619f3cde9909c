//! Tenant directory
//!
//! Tenant definitions are read-mostly: a reload builds a fresh extension
//! index and swaps it in atomically, so lookups on the call path never see a
//! half-updated directory and never hold a lock across other work.

use parking_lot::RwLock;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use call_agent_core::{TenantConfig, TenantDirectory};

use crate::ConfigError;

/// On-disk shape of the tenant file.
#[derive(Debug, Deserialize)]
pub struct TenantFile {
    pub tenants: Vec<TenantConfig>,
    /// Slug of the tenant serving unmatched extensions, if any
    #[serde(default)]
    pub default_tenant: Option<String>,
}

type Snapshot = Arc<DirectorySnapshot>;

struct DirectorySnapshot {
    by_extension: HashMap<String, Arc<TenantConfig>>,
    default_tenant: Option<Arc<TenantConfig>>,
}

/// File-backed tenant directory with snapshot-swap reload.
pub struct StaticTenantDirectory {
    path: Option<PathBuf>,
    snapshot: RwLock<Snapshot>,
}

impl StaticTenantDirectory {
    /// Load the directory from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref().to_path_buf();
        let snapshot = Self::load_snapshot(&path)?;
        Ok(Self {
            path: Some(path),
            snapshot: RwLock::new(snapshot),
        })
    }

    /// Build a directory from in-memory definitions (tests, defaults).
    pub fn from_tenants(tenants: Vec<TenantConfig>, default_tenant: Option<&str>) -> Self {
        let snapshot = Self::build_snapshot(tenants, default_tenant);
        Self {
            path: None,
            snapshot: RwLock::new(snapshot),
        }
    }

    /// Re-read the backing file and swap the snapshot. Lookups racing the
    /// reload see either the old or the new directory, never a mix.
    pub fn reload(&self) -> Result<(), ConfigError> {
        let Some(ref path) = self.path else {
            return Ok(());
        };
        let snapshot = Self::load_snapshot(path)?;
        let tenant_count = snapshot.by_extension.len();
        *self.snapshot.write() = snapshot;
        tracing::info!(extensions = tenant_count, "tenant directory reloaded");
        Ok(())
    }

    fn load_snapshot(path: &Path) -> Result<Snapshot, ConfigError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|_| ConfigError::FileNotFound(path.display().to_string()))?;
        let file: TenantFile = serde_yaml::from_str(&raw)?;
        Ok(Self::build_snapshot(
            file.tenants,
            file.default_tenant.as_deref(),
        ))
    }

    fn build_snapshot(tenants: Vec<TenantConfig>, default_tenant: Option<&str>) -> Snapshot {
        let tenants: Vec<Arc<TenantConfig>> = tenants.into_iter().map(Arc::new).collect();

        let mut by_extension = HashMap::new();
        for tenant in &tenants {
            for extension in &tenant.extensions {
                if let Some(previous) =
                    by_extension.insert(extension.clone(), Arc::clone(tenant))
                {
                    tracing::warn!(
                        extension = %extension,
                        kept = %tenant.slug,
                        shadowed = %previous.slug,
                        "duplicate extension in tenant file"
                    );
                }
            }
        }

        let default_tenant = default_tenant
            .and_then(|slug| tenants.iter().find(|t| t.slug == slug).cloned());

        Arc::new(DirectorySnapshot {
            by_extension,
            default_tenant,
        })
    }

    /// Number of routable extensions in the current snapshot.
    pub fn extension_count(&self) -> usize {
        self.snapshot.read().by_extension.len()
    }
}

impl TenantDirectory for StaticTenantDirectory {
    fn lookup(&self, extension: &str) -> Option<Arc<TenantConfig>> {
        let snapshot = Arc::clone(&self.snapshot.read());
        snapshot
            .by_extension
            .get(extension)
            .cloned()
            .or_else(|| snapshot.default_tenant.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn tenant(slug: &str, extensions: &[&str]) -> TenantConfig {
        TenantConfig {
            slug: slug.to_string(),
            name: slug.to_uppercase(),
            extensions: extensions.iter().map(|s| s.to_string()).collect(),
            enabled_tools: BTreeSet::new(),
            greeting: format!("Вітаю, це {slug}!"),
            prompt_suffix: String::new(),
            operator_extension: Some("0".to_string()),
            language: "uk".to_string(),
            default_scenario: None,
        }
    }

    #[test]
    fn test_lookup_by_extension() {
        let dir = StaticTenantDirectory::from_tenants(
            vec![tenant("kolesoplus", &["101", "102"]), tenant("shynapro", &["201"])],
            None,
        );

        assert_eq!(dir.lookup("101").unwrap().slug, "kolesoplus");
        assert_eq!(dir.lookup("201").unwrap().slug, "shynapro");
        assert!(dir.lookup("999").is_none());
    }

    #[test]
    fn test_default_tenant_policy() {
        let dir = StaticTenantDirectory::from_tenants(
            vec![tenant("kolesoplus", &["101"])],
            Some("kolesoplus"),
        );

        // Unmatched extension falls back to the default tenant
        assert_eq!(dir.lookup("999").unwrap().slug, "kolesoplus");
    }

    #[test]
    fn test_yaml_roundtrip() {
        let yaml = r#"
tenants:
  - slug: kolesoplus
    name: КолесоПлюс
    extensions: ["101"]
    greeting: "Вітаю! Ви зателефонували до КолесоПлюс."
    prompt_suffix: "Завжди пропонуй запис на шиномонтаж."
    operator_extension: "0"
    language: uk
default_tenant: kolesoplus
"#;
        let file: TenantFile = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(file.tenants.len(), 1);
        assert_eq!(file.default_tenant.as_deref(), Some("kolesoplus"));
        assert!(file.tenants[0].allows_tool("search_tires"));
    }
}
