use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Tunables of a catalog registry node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Node identifier, used in log fields
    pub node_id: u64,
    /// First id handed out by the in-process id allocator
    pub first_catalog_id: i64,
    /// `use_meta_cache` value for catalogs that do not set it
    pub default_use_meta_cache: bool,
    /// Journal entries retained for follower catch-up
    pub max_journal_entries: usize,
    /// Where checkpoints are written
    pub snapshot_path: PathBuf,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            node_id: 1,
            first_catalog_id: 10_000,
            default_use_meta_cache: true,
            max_journal_entries: 100_000,
            snapshot_path: PathBuf::from("/var/lib/catalogd/catalog.snapshot"),
        }
    }
}
