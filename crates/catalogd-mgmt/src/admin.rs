//! Local registry state for one admin invocation.
//!
//! The registry is restored from the state snapshot, every change is
//! journaled through an [`EditJournal`], and [`AdminState::save`] checkpoints
//! the result back. Snapshot sequence numbers keep counting across runs.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use catalogd_meta::{CatalogRegistry, RegistrySnapshot};
use catalogd_repl::EditJournal;
use tracing::info;

use crate::config::AdminConfig;

/// A registry opened from (and saved back to) a snapshot file.
pub struct AdminState {
    registry: CatalogRegistry,
    journal: Arc<EditJournal>,
    base_sequence: u64,
    path: PathBuf,
}

impl AdminState {
    /// Opens the state at `path`. A missing file yields a registry holding
    /// only the internal catalog.
    pub fn open(config: &AdminConfig, path: &Path) -> anyhow::Result<Self> {
        let journal = Arc::new(EditJournal::new(config.registry.max_journal_entries));
        let collab = config.collaborators();

        let (registry, base_sequence) = if path.exists() {
            let snapshot = RegistrySnapshot::read_from(path)?;
            let registry = CatalogRegistry::from_snapshot(
                &snapshot,
                config.registry.clone(),
                journal.clone(),
                collab,
            )?;
            (registry, snapshot.log_sequence)
        } else {
            let registry = CatalogRegistry::new(config.registry.clone(), journal.clone(), collab);
            (registry, 0)
        };

        info!(
            path = %path.display(),
            catalogs = registry.catalog_count(),
            log_sequence = base_sequence,
            "admin state opened"
        );
        Ok(Self {
            registry,
            journal,
            base_sequence,
            path: path.to_path_buf(),
        })
    }

    /// The restored registry.
    pub fn registry(&self) -> &CatalogRegistry {
        &self.registry
    }

    /// Records journaled since the state was opened.
    pub fn pending_records(&self) -> anyhow::Result<usize> {
        Ok(self.journal.len()?)
    }

    /// Sequence of the last record, counted across every saved run.
    pub fn log_sequence(&self) -> anyhow::Result<u64> {
        Ok(self.base_sequence + self.journal.latest_sequence()?)
    }

    /// Writes the current registry back to the state file.
    pub fn save(&self) -> anyhow::Result<u64> {
        let mut snapshot = self.journal.checkpoint(&self.registry)?;
        snapshot.log_sequence += self.base_sequence;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        snapshot.write_to(&self.path)?;
        info!(
            path = %self.path.display(),
            catalogs = snapshot.catalogs.len(),
            log_sequence = snapshot.log_sequence,
            "admin state saved"
        );
        Ok(snapshot.log_sequence)
    }
}
