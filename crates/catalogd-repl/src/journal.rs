//! Sequenced edit journal for catalog log records.
//!
//! The leader's registry appends every committed [`CatalogLog`] here through
//! the [`EditLog`] seam. Followers either poll with [`EditJournal::read_from`]
//! or hold a [`Subscription`] that yields the retained backlog followed by
//! live appends.
//!
//! The journal supports:
//! - Appending records with monotonic sequence numbers starting at 1
//! - Subscribing from a checkpoint sequence
//! - Batch read for follower catch-up
//! - Compaction of entries every follower has acknowledged

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use catalogd_meta::{
    CatalogError, CatalogId, CatalogLog, CatalogRegistry, EditLog, OpKind, RegistrySnapshot,
    Timestamp,
};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::ReplError;

/// A journal entry with a sequence number for replication tracking.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalEntry {
    /// Monotonically increasing sequence number.
    pub sequence: u64,
    /// Timestamp when the record was journaled.
    pub committed_at: Timestamp,
    /// Catalog the record targets.
    pub catalog_id: CatalogId,
    /// Kind of the record, for filtering without decoding.
    pub op: OpKind,
    /// bincode-encoded [`CatalogLog`].
    pub payload: Vec<u8>,
}

impl JournalEntry {
    /// Decodes the carried record.
    pub fn record(&self) -> Result<CatalogLog, ReplError> {
        Ok(bincode::deserialize(&self.payload)?)
    }
}

struct JournalInner {
    entries: VecDeque<JournalEntry>,
    next_sequence: u64,
    subscribers: Vec<mpsc::UnboundedSender<JournalEntry>>,
    closed: bool,
}

impl JournalInner {
    fn oldest_sequence(&self) -> u64 {
        self.entries
            .front()
            .map(|e| e.sequence)
            .unwrap_or(self.next_sequence)
    }
}

/// The edit journal: an append-only, bounded log of catalog records.
pub struct EditJournal {
    inner: Mutex<JournalInner>,
    /// Maximum number of entries to keep before dropping the oldest.
    max_entries: usize,
    fail_appends: AtomicBool,
}

impl EditJournal {
    /// Create a journal retaining at most `max_entries` entries.
    pub fn new(max_entries: usize) -> Self {
        Self {
            inner: Mutex::new(JournalInner {
                entries: VecDeque::new(),
                next_sequence: 1,
                subscribers: Vec::new(),
                closed: false,
            }),
            max_entries: max_entries.max(1),
            fail_appends: AtomicBool::new(false),
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, JournalInner>, ReplError> {
        self.inner.lock().map_err(|e| ReplError::Journal {
            msg: e.to_string(),
        })
    }

    /// Makes subsequent appends fail, for fault injection.
    pub fn fail_appends(&self, fail: bool) {
        self.fail_appends.store(fail, Ordering::SeqCst);
    }

    /// Append a record. Returns the assigned sequence number.
    pub fn append_record(&self, record: &CatalogLog) -> Result<u64, ReplError> {
        if self.fail_appends.load(Ordering::SeqCst) {
            return Err(ReplError::Journal {
                msg: "append rejected".to_string(),
            });
        }
        let payload = bincode::serialize(record)?;

        let mut inner = self.lock()?;
        if inner.closed {
            return Err(ReplError::Shutdown);
        }
        let sequence = inner.next_sequence;
        inner.next_sequence += 1;

        let entry = JournalEntry {
            sequence,
            committed_at: Timestamp::now(),
            catalog_id: record.catalog_id,
            op: record.op.kind(),
            payload,
        };

        inner
            .subscribers
            .retain(|tx| tx.send(entry.clone()).is_ok());
        inner.entries.push_back(entry);

        while inner.entries.len() > self.max_entries {
            inner.entries.pop_front();
        }

        debug!(sequence, catalog_id = %record.catalog_id, op = %record.op.kind(), "record journaled");
        Ok(sequence)
    }

    /// Subscribe from `from_sequence`: the retained backlog is delivered
    /// first, then every later append. Fails with `Lagged` if entries between
    /// `from_sequence` and the retained window were already dropped.
    pub fn subscribe(&self, from_sequence: u64) -> Result<Subscription, ReplError> {
        let from = from_sequence.max(1);
        let mut inner = self.lock()?;
        let oldest = inner.oldest_sequence();
        if from < oldest {
            warn!(requested = from, oldest, "subscriber is behind the retained journal");
            return Err(ReplError::Lagged {
                requested: from,
                oldest,
            });
        }

        let backlog: VecDeque<JournalEntry> = inner
            .entries
            .iter()
            .filter(|e| e.sequence >= from)
            .cloned()
            .collect();
        let (tx, rx) = mpsc::unbounded_channel();
        if !inner.closed {
            inner.subscribers.push(tx);
        }
        Ok(Subscription { backlog, rx })
    }

    /// Read entries starting from the given sequence number.
    /// Returns up to `limit` entries.
    pub fn read_from(
        &self,
        from_sequence: u64,
        limit: usize,
    ) -> Result<Vec<JournalEntry>, ReplError> {
        let inner = self.lock()?;
        Ok(inner
            .entries
            .iter()
            .filter(|e| e.sequence >= from_sequence)
            .take(limit)
            .cloned()
            .collect())
    }

    /// Get the latest sequence number, 0 when nothing was appended.
    pub fn latest_sequence(&self) -> Result<u64, ReplError> {
        Ok(self.lock()?.next_sequence.saturating_sub(1))
    }

    /// Oldest retained sequence number.
    pub fn oldest_sequence(&self) -> Result<u64, ReplError> {
        Ok(self.lock()?.oldest_sequence())
    }

    /// Get the number of entries currently in the journal.
    pub fn len(&self) -> Result<usize, ReplError> {
        Ok(self.lock()?.entries.len())
    }

    /// Returns true if the journal is empty.
    pub fn is_empty(&self) -> Result<bool, ReplError> {
        Ok(self.len()? == 0)
    }

    /// Difference between the latest sequence and `remote_sequence`.
    pub fn replication_lag(&self, remote_sequence: u64) -> Result<u64, ReplError> {
        let latest = self.latest_sequence()?;
        Ok(latest.saturating_sub(remote_sequence))
    }

    /// Remove entries older than `sequence`. Returns how many were removed.
    pub fn compact_before(&self, sequence: u64) -> Result<usize, ReplError> {
        let mut inner = self.lock()?;
        let original_len = inner.entries.len();

        while let Some(front) = inner.entries.front() {
            if front.sequence < sequence {
                inner.entries.pop_front();
            } else {
                break;
            }
        }

        Ok(original_len - inner.entries.len())
    }

    /// Captures a registry snapshot tagged with the current journal position.
    pub fn checkpoint(&self, registry: &CatalogRegistry) -> Result<RegistrySnapshot, ReplError> {
        let mut failure = None;
        let snapshot = RegistrySnapshot::capture(registry, || match self.latest_sequence() {
            Ok(seq) => seq,
            Err(e) => {
                failure = Some(e);
                0
            }
        });
        match failure {
            Some(e) => Err(e),
            None => Ok(snapshot),
        }
    }

    /// Stops accepting appends; live subscriptions end after their backlog.
    pub fn close(&self) -> Result<(), ReplError> {
        let mut inner = self.lock()?;
        inner.closed = true;
        inner.subscribers.clear();
        Ok(())
    }
}

impl EditLog for EditJournal {
    fn append(&self, record: &CatalogLog) -> Result<u64, CatalogError> {
        Ok(self.append_record(record)?)
    }
}

/// An ordered stream of journal entries for one follower.
pub struct Subscription {
    backlog: VecDeque<JournalEntry>,
    rx: mpsc::UnboundedReceiver<JournalEntry>,
}

impl Subscription {
    /// Next entry, waiting for a live append if the backlog is drained.
    /// Returns `None` once the journal is closed and everything was delivered.
    pub async fn next(&mut self) -> Option<JournalEntry> {
        if let Some(entry) = self.backlog.pop_front() {
            return Some(entry);
        }
        self.rx.recv().await
    }

    /// Next entry if one is available without waiting.
    pub fn try_next(&mut self) -> Option<JournalEntry> {
        self.backlog
            .pop_front()
            .or_else(|| self.rx.try_recv().ok())
    }
}
