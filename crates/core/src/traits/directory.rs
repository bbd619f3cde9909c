//! Tenant directory trait

use std::sync::Arc;

use crate::tenant::TenantConfig;

/// Maps a dialed extension to its serving tenant.
///
/// Lookups read an immutable snapshot, so they are cheap and lock-free on
/// the hot path; the owning directory swaps snapshots on reload.
pub trait TenantDirectory: Send + Sync {
    fn lookup(&self, extension: &str) -> Option<Arc<TenantConfig>>;
}
