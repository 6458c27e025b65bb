//! Registry checkpoints.
//!
//! A snapshot is the ordered map of catalog images plus the edit-log sequence
//! it covers. Loading one rebuilds both indexes, the internal catalog handle,
//! resource references and the refresh index; followers then replay the log
//! from `log_sequence + 1`.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::catalog::{Catalog, CatalogImage};
use crate::collab::Collaborators;
use crate::config::RegistryConfig;
use crate::editlog::EditLog;
use crate::error::CatalogError;
use crate::registry::{CatalogRegistry, RegistryState};
use crate::types::{CatalogId, Timestamp};

/// Version written in front of every encoded snapshot.
pub const SNAPSHOT_FORMAT_VERSION: u32 = 1;

/// A point-in-time image of the registry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrySnapshot {
    /// When the snapshot was taken
    pub created_at: Timestamp,
    /// Last edit-log sequence reflected in `catalogs`
    pub log_sequence: u64,
    /// Highest catalog id ever handed out, dropped catalogs included
    pub max_catalog_id: i64,
    /// Every live catalog, internal included
    pub catalogs: BTreeMap<CatalogId, CatalogImage>,
}

impl RegistrySnapshot {
    /// Captures the registry. `log_sequence` is evaluated under the registry
    /// read lock so that it matches the captured state.
    pub fn capture(registry: &CatalogRegistry, log_sequence: impl FnOnce() -> u64) -> Self {
        let state = registry.state.read();
        let catalogs = state
            .by_id
            .iter()
            .map(|(id, c)| (*id, CatalogImage::from(c.as_ref())))
            .collect();
        Self {
            created_at: Timestamp::now(),
            log_sequence: log_sequence(),
            max_catalog_id: state.max_catalog_id,
            catalogs,
        }
    }

    /// Encodes as a little-endian format version followed by the bincode body.
    pub fn encode(&self) -> Result<Vec<u8>, CatalogError> {
        let body = bincode::serialize(self)?;
        let mut out = Vec::with_capacity(body.len() + 4);
        out.extend_from_slice(&SNAPSHOT_FORMAT_VERSION.to_le_bytes());
        out.extend_from_slice(&body);
        Ok(out)
    }

    /// Decodes bytes produced by [`RegistrySnapshot::encode`].
    pub fn decode(bytes: &[u8]) -> Result<Self, CatalogError> {
        if bytes.len() < 4 {
            return Err(CatalogError::Codec("snapshot too short".to_string()));
        }
        let mut prefix = [0u8; 4];
        prefix.copy_from_slice(&bytes[..4]);
        let version = u32::from_le_bytes(prefix);
        if version != SNAPSHOT_FORMAT_VERSION {
            return Err(CatalogError::Codec(format!(
                "unsupported snapshot version {}",
                version
            )));
        }
        Ok(bincode::deserialize(&bytes[4..])?)
    }

    /// Writes the snapshot atomically (temp file, then rename).
    pub fn write_to(&self, path: &Path) -> Result<(), CatalogError> {
        let bytes = self.encode()?;
        let tmp = path.with_extension("tmp");
        {
            let mut f = fs::File::create(&tmp)?;
            f.write_all(&bytes)?;
            f.sync_all()?;
        }
        fs::rename(&tmp, path)?;
        Ok(())
    }

    /// Reads a snapshot written by [`RegistrySnapshot::write_to`].
    pub fn read_from(path: &Path) -> Result<Self, CatalogError> {
        Self::decode(&fs::read(path)?)
    }
}

impl CatalogRegistry {
    /// Rebuilds a registry from a snapshot.
    ///
    /// External catalogs come back `Uninitialized` with no registered
    /// databases. The id allocator is advanced past every restored id.
    pub fn from_snapshot(
        snapshot: &RegistrySnapshot,
        config: RegistryConfig,
        edit_log: Arc<dyn EditLog>,
        collab: Collaborators,
    ) -> Result<Self, CatalogError> {
        let registry = CatalogRegistry {
            state: RwLock::new(RegistryState::default()),
            edit_log,
            collab,
            config,
        };

        {
            let mut state = registry.state.write();
            for (id, image) in &snapshot.catalogs {
                if *id != image.id {
                    return Err(CatalogError::InconsistentReplay {
                        catalog_id: *id,
                        reason: format!("snapshot key does not match image id {}", image.id),
                    });
                }
                if state.by_name.contains_key(&image.name) {
                    return Err(CatalogError::InconsistentReplay {
                        catalog_id: *id,
                        reason: format!("duplicate catalog name {} in snapshot", image.name),
                    });
                }
                if id.is_internal() {
                    let internal = image.clone().into_catalog();
                    state.by_name.insert(internal.name().to_string(), *id);
                    state.by_id.insert(*id, Arc::new(internal));
                } else {
                    registry.attach(&mut state, image.clone().into_catalog());
                }
            }
            if !state.by_id.contains_key(&CatalogId::INTERNAL) {
                let internal = Catalog::internal();
                if state.by_name.contains_key(internal.name()) {
                    return Err(CatalogError::InconsistentReplay {
                        catalog_id: CatalogId::INTERNAL,
                        reason: "internal catalog name held by another id".to_string(),
                    });
                }
                state.by_name.insert(internal.name().to_string(), internal.id());
                state.by_id.insert(internal.id(), Arc::new(internal));
            }
            let live_max = state.by_id.keys().next_back().map_or(0, |id| id.as_i64());
            state.max_catalog_id = live_max.max(snapshot.max_catalog_id);
            registry.collab.ids.ensure_above(state.max_catalog_id);
        }

        info!(
            catalogs = snapshot.catalogs.len(),
            log_sequence = snapshot.log_sequence,
            "registry restored from snapshot"
        );
        Ok(registry)
    }
}
