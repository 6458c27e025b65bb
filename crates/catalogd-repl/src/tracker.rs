//! Per-follower replication progress.
//!
//! The leader records how far each follower has acknowledged the journal,
//! reports lag, serves pending entries, and compacts what every follower has
//! already applied.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use catalogd_meta::Timestamp;
use tracing::debug;

use crate::error::ReplError;
use crate::journal::{EditJournal, JournalEntry};

/// Replication state of one follower.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FollowerState {
    /// Follower identifier.
    pub follower_id: u64,
    /// Last sequence the follower confirmed applying.
    pub acknowledged: u64,
    /// When the last acknowledgement arrived.
    pub last_ack_at: Option<Timestamp>,
}

/// Tracks replication progress of every registered follower.
pub struct ReplicationTracker {
    journal: Arc<EditJournal>,
    followers: RwLock<HashMap<u64, FollowerState>>,
}

impl ReplicationTracker {
    /// Create a tracker over `journal`.
    pub fn new(journal: Arc<EditJournal>) -> Self {
        Self {
            journal,
            followers: RwLock::new(HashMap::new()),
        }
    }

    fn poisoned<E: std::fmt::Display>(e: E) -> ReplError {
        ReplError::Journal { msg: e.to_string() }
    }

    /// Register a follower starting at `acknowledged`.
    pub fn register_follower(&self, follower_id: u64, acknowledged: u64) -> Result<(), ReplError> {
        let mut followers = self.followers.write().map_err(Self::poisoned)?;
        followers.insert(
            follower_id,
            FollowerState {
                follower_id,
                acknowledged,
                last_ack_at: None,
            },
        );
        Ok(())
    }

    /// Forget a follower.
    pub fn remove_follower(&self, follower_id: u64) -> Result<(), ReplError> {
        self.followers
            .write()
            .map_err(Self::poisoned)?
            .remove(&follower_id);
        Ok(())
    }

    /// Record that a follower applied entries up to `sequence`.
    /// Acknowledgements never move backwards.
    pub fn acknowledge(&self, follower_id: u64, sequence: u64) -> Result<(), ReplError> {
        let mut followers = self.followers.write().map_err(Self::poisoned)?;
        if let Some(f) = followers.get_mut(&follower_id) {
            if sequence > f.acknowledged {
                f.acknowledged = sequence;
            }
            f.last_ack_at = Some(Timestamp::now());
        }
        Ok(())
    }

    /// Entries the follower has not acknowledged yet, at most `limit`.
    pub fn pending_entries(
        &self,
        follower_id: u64,
        limit: usize,
    ) -> Result<Vec<JournalEntry>, ReplError> {
        let from_seq = {
            let followers = self.followers.read().map_err(Self::poisoned)?;
            followers
                .get(&follower_id)
                .map(|f| f.acknowledged + 1)
                .unwrap_or(1)
        };
        self.journal.read_from(from_seq, limit)
    }

    /// Replication lag of a follower in entries.
    pub fn lag_for_follower(&self, follower_id: u64) -> Result<u64, ReplError> {
        let acknowledged = {
            let followers = self.followers.read().map_err(Self::poisoned)?;
            followers
                .get(&follower_id)
                .map(|f| f.acknowledged)
                .unwrap_or(0)
        };
        self.journal.replication_lag(acknowledged)
    }

    /// All follower states, ordered by id.
    pub fn follower_states(&self) -> Result<Vec<FollowerState>, ReplError> {
        let followers = self.followers.read().map_err(Self::poisoned)?;
        let mut states: Vec<_> = followers.values().cloned().collect();
        states.sort_by_key(|s| s.follower_id);
        Ok(states)
    }

    /// Drops journal entries every registered follower has acknowledged.
    /// Returns the number of entries removed.
    pub fn compact_acknowledged(&self) -> Result<usize, ReplError> {
        let min_ack = {
            let followers = self.followers.read().map_err(Self::poisoned)?;
            match followers.values().map(|f| f.acknowledged).min() {
                Some(seq) => seq,
                None => return Ok(0),
            }
        };
        let removed = self.journal.compact_before(min_ack + 1)?;
        debug!(min_ack, removed, "journal compacted");
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use catalogd_meta::{CatalogId, CatalogLog, CatalogOp};

    fn journal_with(n: i64) -> Arc<EditJournal> {
        let journal = Arc::new(EditJournal::new(100));
        for i in 0..n {
            journal
                .append_record(&CatalogLog::new(CatalogId::new(i), CatalogOp::Init))
                .unwrap();
        }
        journal
    }

    #[test]
    fn test_register_and_acknowledge() {
        let tracker = ReplicationTracker::new(journal_with(5));
        tracker.register_follower(1, 0).unwrap();
        assert_eq!(tracker.lag_for_follower(1).unwrap(), 5);

        tracker.acknowledge(1, 3).unwrap();
        assert_eq!(tracker.lag_for_follower(1).unwrap(), 2);
        tracker.acknowledge(1, 2).unwrap();
        assert_eq!(tracker.follower_states().unwrap()[0].acknowledged, 3);

        let pending = tracker.pending_entries(1, 10).unwrap();
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].sequence, 4);
    }

    #[test]
    fn test_unknown_follower_sees_everything() {
        let tracker = ReplicationTracker::new(journal_with(3));
        assert_eq!(tracker.pending_entries(9, 10).unwrap().len(), 3);
        assert_eq!(tracker.lag_for_follower(9).unwrap(), 3);
    }

    #[test]
    fn test_compact_acknowledged_uses_slowest_follower() {
        let journal = journal_with(6);
        let tracker = ReplicationTracker::new(journal.clone());
        assert_eq!(tracker.compact_acknowledged().unwrap(), 0);

        tracker.register_follower(1, 0).unwrap();
        tracker.register_follower(2, 0).unwrap();
        tracker.acknowledge(1, 5).unwrap();
        tracker.acknowledge(2, 2).unwrap();
        assert_eq!(tracker.compact_acknowledged().unwrap(), 2);
        assert_eq!(journal.oldest_sequence().unwrap(), 3);

        tracker.remove_follower(2).unwrap();
        assert_eq!(tracker.compact_acknowledged().unwrap(), 3);
    }
}
