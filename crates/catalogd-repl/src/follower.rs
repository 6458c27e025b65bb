//! Follower apply loop.
//!
//! A follower owns a registry that only changes through replay. It applies
//! journal entries strictly in sequence order and remembers the last applied
//! sequence in a [`ReplicationCursor`]; entries at or below the cursor are
//! skipped, so resuming from a checkpoint and re-reading overlapping entries
//! is safe.

use std::sync::Arc;

use catalogd_meta::{CatalogRegistry, Collaborators, EditLog, RegistryConfig, RegistrySnapshot};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::ReplError;
use crate::journal::{EditJournal, JournalEntry, Subscription};

/// How far a follower has applied the journal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicationCursor {
    /// Follower identifier.
    pub follower_id: u64,
    /// Last sequence number applied to the follower's registry.
    pub last_applied: u64,
}

impl ReplicationCursor {
    /// Create a new replication cursor.
    pub fn new(follower_id: u64, last_applied: u64) -> Self {
        Self {
            follower_id,
            last_applied,
        }
    }
}

/// A passive replica of the catalog registry.
pub struct Follower {
    registry: Arc<CatalogRegistry>,
    cursor: ReplicationCursor,
}

impl Follower {
    /// Wraps a registry that has applied nothing yet.
    pub fn new(follower_id: u64, registry: Arc<CatalogRegistry>) -> Self {
        Self {
            registry,
            cursor: ReplicationCursor::new(follower_id, 0),
        }
    }

    /// Restores a follower from a checkpoint; it resumes after
    /// `snapshot.log_sequence`.
    pub fn from_snapshot(
        follower_id: u64,
        snapshot: &RegistrySnapshot,
        config: RegistryConfig,
        edit_log: Arc<dyn EditLog>,
        collab: Collaborators,
    ) -> Result<Self, ReplError> {
        let registry = CatalogRegistry::from_snapshot(snapshot, config, edit_log, collab)?;
        info!(
            follower_id,
            log_sequence = snapshot.log_sequence,
            "follower restored from checkpoint"
        );
        Ok(Self {
            registry: Arc::new(registry),
            cursor: ReplicationCursor::new(follower_id, snapshot.log_sequence),
        })
    }

    /// The follower's registry.
    pub fn registry(&self) -> &Arc<CatalogRegistry> {
        &self.registry
    }

    /// Current cursor.
    pub fn cursor(&self) -> ReplicationCursor {
        self.cursor
    }

    /// Applies one entry. Returns false when it was already applied.
    pub fn apply(&mut self, entry: &JournalEntry) -> Result<bool, ReplError> {
        if entry.sequence <= self.cursor.last_applied {
            debug!(
                follower_id = self.cursor.follower_id,
                sequence = entry.sequence,
                "entry already applied, skipped"
            );
            return Ok(false);
        }
        let expected = self.cursor.last_applied + 1;
        if entry.sequence != expected {
            return Err(ReplError::Gap {
                expected,
                got: entry.sequence,
            });
        }

        let record = entry.record()?;
        self.registry.replay(&record)?;
        self.cursor.last_applied = entry.sequence;
        Ok(true)
    }

    /// Applies everything the journal currently retains past the cursor.
    /// Returns the number of entries applied.
    pub fn drain(&mut self, journal: &EditJournal, batch_size: usize) -> Result<usize, ReplError> {
        let oldest = journal.oldest_sequence()?;
        if self.cursor.last_applied + 1 < oldest {
            return Err(ReplError::Lagged {
                requested: self.cursor.last_applied + 1,
                oldest,
            });
        }

        let mut applied = 0;
        loop {
            let batch = journal.read_from(self.cursor.last_applied + 1, batch_size.max(1))?;
            if batch.is_empty() {
                break;
            }
            for entry in &batch {
                if self.apply(entry)? {
                    applied += 1;
                }
            }
        }
        Ok(applied)
    }

    /// Subscribes to `journal` from just after the cursor.
    pub fn subscribe(&self, journal: &EditJournal) -> Result<Subscription, ReplError> {
        journal.subscribe(self.cursor.last_applied + 1)
    }

    /// Applies entries from `subscription` until the cursor reaches `target`.
    pub async fn catch_up(
        &mut self,
        subscription: &mut Subscription,
        target: u64,
    ) -> Result<u64, ReplError> {
        while self.cursor.last_applied < target {
            match subscription.next().await {
                Some(entry) => {
                    self.apply(&entry)?;
                }
                None => return Err(ReplError::Shutdown),
            }
        }
        Ok(self.cursor.last_applied)
    }

    /// Applies entries until the journal closes. Returns the final cursor.
    pub async fn run(mut self, mut subscription: Subscription) -> Result<Self, ReplError> {
        while let Some(entry) = subscription.next().await {
            self.apply(&entry)?;
        }
        info!(
            follower_id = self.cursor.follower_id,
            last_applied = self.cursor.last_applied,
            "journal closed, follower stopped"
        );
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use catalogd_meta::property::HIVE_METASTORE_URIS;
    use catalogd_meta::{CatalogType, CreateCatalogRequest, MemoryEditLog};

    fn leader(journal: Arc<EditJournal>) -> CatalogRegistry {
        CatalogRegistry::new(
            RegistryConfig::default(),
            journal,
            Collaborators::in_memory(10_000),
        )
    }

    fn follower(id: u64) -> Follower {
        let registry = CatalogRegistry::new(
            RegistryConfig::default(),
            Arc::new(MemoryEditLog::new()),
            Collaborators::in_memory(1),
        );
        Follower::new(id, Arc::new(registry))
    }

    fn hive(name: &str) -> CreateCatalogRequest {
        CreateCatalogRequest::new(name, CatalogType::Hms)
            .with_property(HIVE_METASTORE_URIS, "thrift://h:9083")
    }

    #[test]
    fn test_drain_applies_in_order() {
        let journal = Arc::new(EditJournal::new(100));
        let leader = leader(journal.clone());
        leader.create(hive("hive1"), false).unwrap();
        leader.rename("hive1", "hive2").unwrap();

        let mut f = follower(1);
        assert_eq!(f.drain(&journal, 1).unwrap(), 2);
        assert_eq!(f.cursor().last_applied, 2);
        assert!(f.registry().catalog_by_name("hive2").is_ok());
        assert_eq!(f.drain(&journal, 10).unwrap(), 0);
    }

    #[test]
    fn test_duplicate_entries_skipped_and_gaps_rejected() {
        let journal = Arc::new(EditJournal::new(100));
        let leader = leader(journal.clone());
        leader.create(hive("a"), false).unwrap();
        leader.create(hive("b"), false).unwrap();
        leader.create(hive("c"), false).unwrap();
        let entries = journal.read_from(1, 10).unwrap();

        let mut f = follower(1);
        assert!(f.apply(&entries[0]).unwrap());
        assert!(!f.apply(&entries[0]).unwrap());
        assert!(matches!(
            f.apply(&entries[2]),
            Err(ReplError::Gap {
                expected: 2,
                got: 3
            })
        ));
        assert!(f.apply(&entries[1]).unwrap());
    }

    #[test]
    fn test_drain_behind_compaction_is_lagged() {
        let journal = Arc::new(EditJournal::new(100));
        let leader = leader(journal.clone());
        leader.create(hive("a"), false).unwrap();
        leader.create(hive("b"), false).unwrap();
        journal.compact_before(2).unwrap();

        let mut f = follower(1);
        assert!(matches!(f.drain(&journal, 10), Err(ReplError::Lagged { .. })));
    }

    #[tokio::test]
    async fn test_catch_up_over_subscription() {
        let journal = Arc::new(EditJournal::new(100));
        let leader = leader(journal.clone());
        let mut f = follower(7);
        let mut sub = f.subscribe(&journal).unwrap();

        leader.create(hive("hive1"), false).unwrap();
        leader.set_comment("hive1", "from leader").unwrap();

        let target = journal.latest_sequence().unwrap();
        assert_eq!(f.catch_up(&mut sub, target).await.unwrap(), 2);
        assert_eq!(
            f.registry().catalog_by_name("hive1").unwrap().comment(),
            "from leader"
        );
    }
}
