//! Replicated catalog log records and the append seam.
//!
//! The leader builds a [`CatalogLog`] for every committed DDL and hands it to
//! an [`EditLog`]. Followers receive the same records in order and feed them to
//! [`CatalogRegistry::replay`](crate::registry::CatalogRegistry::replay).

use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::CatalogError;
use crate::property::Properties;
use crate::types::{CatalogId, CatalogType, Timestamp};

/// A catalog mutation as it travels through the replication channel.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CatalogOp {
    /// Register a new catalog under `catalog_id`.
    Create {
        /// Catalog name
        name: String,
        /// Catalog kind
        catalog_type: CatalogType,
        /// Comment
        comment: String,
        /// Referenced shared resource
        resource: Option<String>,
        /// Full property map as validated by the leader
        properties: Properties,
    },
    /// Remove the catalog.
    Drop,
    /// Give the catalog a new name.
    RenameTo {
        /// New name
        new_name: String,
    },
    /// Replace the comment.
    SetComment {
        /// New comment
        comment: String,
    },
    /// Merge keys into the property map.
    SetProperties {
        /// Keys to set
        properties: Properties,
    },
    /// Mark an external catalog initialized.
    Init,
    /// Mark one external database of the catalog initialized.
    InitDb {
        /// Database id as registered on every node
        db_id: i64,
    },
}

/// Discriminant of a [`CatalogOp`], used for logging and journal indexing.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OpKind {
    /// Create
    Create,
    /// Drop
    Drop,
    /// RenameTo
    RenameTo,
    /// SetComment
    SetComment,
    /// SetProperties
    SetProperties,
    /// Init
    Init,
    /// InitDb
    InitDb,
}

impl OpKind {
    /// Stable lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            OpKind::Create => "create",
            OpKind::Drop => "drop",
            OpKind::RenameTo => "rename",
            OpKind::SetComment => "set_comment",
            OpKind::SetProperties => "set_properties",
            OpKind::Init => "init",
            OpKind::InitDb => "init_db",
        }
    }
}

impl std::fmt::Display for OpKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl CatalogOp {
    /// Discriminant of this op.
    pub fn kind(&self) -> OpKind {
        match self {
            CatalogOp::Create { .. } => OpKind::Create,
            CatalogOp::Drop => OpKind::Drop,
            CatalogOp::RenameTo { .. } => OpKind::RenameTo,
            CatalogOp::SetComment { .. } => OpKind::SetComment,
            CatalogOp::SetProperties { .. } => OpKind::SetProperties,
            CatalogOp::Init => OpKind::Init,
            CatalogOp::InitDb { .. } => OpKind::InitDb,
        }
    }
}

/// A self-contained, replay-idempotent catalog log record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogLog {
    /// Target catalog
    pub catalog_id: CatalogId,
    /// Leader commit time, applied as the catalog's last update time
    pub update_time: Timestamp,
    /// The mutation
    pub op: CatalogOp,
}

impl CatalogLog {
    /// Builds a record stamped with the current time.
    pub fn new(catalog_id: CatalogId, op: CatalogOp) -> Self {
        Self {
            catalog_id,
            update_time: Timestamp::now(),
            op,
        }
    }

    /// Encodes the record with bincode.
    pub fn encode(&self) -> Result<Vec<u8>, CatalogError> {
        Ok(bincode::serialize(self)?)
    }

    /// Decodes a record produced by [`CatalogLog::encode`].
    pub fn decode(bytes: &[u8]) -> Result<Self, CatalogError> {
        Ok(bincode::deserialize(bytes)?)
    }
}

/// The replication channel as seen by the leader.
///
/// `append` is called while the registry write lock is held and must not
/// call back into the registry.
pub trait EditLog: Send + Sync {
    /// Durably accepts a committed record; returns its sequence number.
    fn append(&self, record: &CatalogLog) -> Result<u64, CatalogError>;
}

/// In-memory edit log used by tests and single-node tools.
#[derive(Default)]
pub struct MemoryEditLog {
    records: Mutex<Vec<CatalogLog>>,
    fail: AtomicBool,
}

impl MemoryEditLog {
    /// Creates an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes subsequent appends fail with `ReplicationFailed`.
    pub fn fail_appends(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Copies out every accepted record in order.
    pub fn records(&self) -> Vec<CatalogLog> {
        self.records.lock().clone()
    }

    /// Number of accepted records.
    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    /// Returns true if no record was accepted yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl EditLog for MemoryEditLog {
    fn append(&self, record: &CatalogLog) -> Result<u64, CatalogError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(CatalogError::ReplicationFailed(
                "edit log rejected append".to_string(),
            ));
        }
        let mut records = self.records.lock();
        records.push(record.clone());
        Ok(records.len() as u64)
    }
}
