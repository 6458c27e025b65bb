//! Collaborators the registry calls out to.
//!
//! Each seam is a small trait with an in-memory implementation. A registry is
//! built from a [`Collaborators`] bundle; tests and the admin tool use
//! [`Collaborators::in_memory`].

use std::collections::{BTreeSet, HashSet};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;

use crate::access::{AccessController, AllowAll};
use crate::resource::{MemoryResourceTracker, ResourceTracker};
use crate::session::{SessionCatalogs, SessionTracker};
use crate::types::{CatalogId, META_ID_FOR_NOT_EXISTS};

/// Hands out cluster-unique ids.
pub trait IdAllocator: Send + Sync {
    /// Returns the next id.
    fn next_id(&self) -> i64;

    /// Makes sure future ids are greater than `id`.
    fn ensure_above(&self, _id: i64) {}
}

/// Monotonic in-process id allocator.
pub struct SequentialIdAllocator {
    next: AtomicI64,
}

impl SequentialIdAllocator {
    /// Starts allocation at `first`.
    pub fn new(first: i64) -> Self {
        Self {
            next: AtomicI64::new(first),
        }
    }
}

impl IdAllocator for SequentialIdAllocator {
    fn next_id(&self) -> i64 {
        self.next.fetch_add(1, Ordering::SeqCst)
    }

    fn ensure_above(&self, id: i64) {
        self.next.fetch_max(id.saturating_add(1), Ordering::SeqCst);
    }
}

/// Maps external database/table names to ids when names cannot be hashed.
///
/// Returns [`META_ID_FOR_NOT_EXISTS`] for entities the mapper knows to be
/// gone upstream.
pub trait ExternalIdMapper: Send + Sync {
    /// Id of database `db` in `catalog`.
    fn db_id(&self, catalog: CatalogId, db: &str) -> i64;

    /// Id of table `db.table` in `catalog`.
    fn table_id(&self, catalog: CatalogId, db: &str, table: &str) -> i64;
}

/// Mapper that assigns ids on first lookup and remembers them.
pub struct MemoryIdMapper {
    next: AtomicI64,
    ids: DashMap<(CatalogId, String, Option<String>), i64>,
    deleted: DashMap<(CatalogId, String, Option<String>), ()>,
}

impl Default for MemoryIdMapper {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryIdMapper {
    /// Creates a mapper with no known entities.
    pub fn new() -> Self {
        Self {
            next: AtomicI64::new(1),
            ids: DashMap::new(),
            deleted: DashMap::new(),
        }
    }

    /// Marks `db` (or `db.table`) as removed upstream.
    pub fn mark_deleted(&self, catalog: CatalogId, db: &str, table: Option<&str>) {
        let key = (catalog, db.to_string(), table.map(str::to_string));
        self.ids.remove(&key);
        self.deleted.insert(key, ());
    }

    fn lookup(&self, key: (CatalogId, String, Option<String>)) -> i64 {
        if self.deleted.contains_key(&key) {
            return META_ID_FOR_NOT_EXISTS;
        }
        *self
            .ids
            .entry(key)
            .or_insert_with(|| self.next.fetch_add(1, Ordering::SeqCst))
    }
}

impl ExternalIdMapper for MemoryIdMapper {
    fn db_id(&self, catalog: CatalogId, db: &str) -> i64 {
        self.lookup((catalog, db.to_string(), None))
    }

    fn table_id(&self, catalog: CatalogId, db: &str, table: &str) -> i64 {
        self.lookup((catalog, db.to_string(), Some(table.to_string())))
    }
}

/// Cache of external metadata bodies, keyed by catalog.
pub trait MetaCache: Send + Sync {
    /// Evicts everything cached for `catalog`.
    fn remove_cache(&self, catalog: CatalogId);

    /// Adds partitions to a cached table.
    fn add_partitions(&self, catalog: CatalogId, db: &str, table: &str, partitions: &[String]);

    /// Drops partitions from a cached table.
    fn drop_partitions(&self, catalog: CatalogId, db: &str, table: &str, partitions: &[String]);
}

type TableKey = (CatalogId, String, String);

/// Partition-name cache used in tests and the admin tool.
#[derive(Default)]
pub struct MemoryMetaCache {
    partitions: DashMap<TableKey, BTreeSet<String>>,
}

impl MemoryMetaCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached partitions of a table, sorted.
    pub fn partitions(&self, catalog: CatalogId, db: &str, table: &str) -> Vec<String> {
        self.partitions
            .get(&(catalog, db.to_string(), table.to_string()))
            .map(|p| p.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Returns true if anything is cached for `catalog`.
    pub fn has_catalog(&self, catalog: CatalogId) -> bool {
        self.partitions.iter().any(|e| e.key().0 == catalog)
    }
}

impl MetaCache for MemoryMetaCache {
    fn remove_cache(&self, catalog: CatalogId) {
        self.partitions.retain(|k, _| k.0 != catalog);
    }

    fn add_partitions(&self, catalog: CatalogId, db: &str, table: &str, partitions: &[String]) {
        self.partitions
            .entry((catalog, db.to_string(), table.to_string()))
            .or_default()
            .extend(partitions.iter().cloned());
    }

    fn drop_partitions(&self, catalog: CatalogId, db: &str, table: &str, partitions: &[String]) {
        if let Some(mut cached) = self
            .partitions
            .get_mut(&(catalog, db.to_string(), table.to_string()))
        {
            for p in partitions {
                cached.remove(p);
            }
        }
    }
}

/// Per-catalog query statistics.
pub trait QueryStats: Send + Sync {
    /// Clears statistics of `catalog`.
    fn clear(&self, catalog: CatalogId);
}

/// Counts queries per catalog.
#[derive(Default)]
pub struct MemoryQueryStats {
    counts: DashMap<CatalogId, u64>,
    cleared: DashMap<CatalogId, ()>,
}

impl MemoryQueryStats {
    /// Creates empty statistics.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one query against `catalog`.
    pub fn record(&self, catalog: CatalogId) {
        *self.counts.entry(catalog).or_insert(0) += 1;
    }

    /// Queries recorded for `catalog`.
    pub fn count(&self, catalog: CatalogId) -> u64 {
        self.counts.get(&catalog).map(|c| *c).unwrap_or(0)
    }

    /// Catalogs whose statistics were cleared.
    pub fn cleared(&self) -> HashSet<CatalogId> {
        self.cleared.iter().map(|e| *e.key()).collect()
    }
}

impl QueryStats for MemoryQueryStats {
    fn clear(&self, catalog: CatalogId) {
        self.counts.remove(&catalog);
        self.cleared.insert(catalog, ());
    }
}

/// Everything the registry talks to besides its edit log.
#[derive(Clone)]
pub struct Collaborators {
    /// Catalog id source
    pub ids: Arc<dyn IdAllocator>,
    /// Shared resource references
    pub resources: Arc<dyn ResourceTracker>,
    /// Privilege checks
    pub access: Arc<dyn AccessController>,
    /// External id lookups when names are not hashed
    pub id_mapper: Arc<dyn ExternalIdMapper>,
    /// External metadata cache
    pub meta_cache: Arc<dyn MetaCache>,
    /// Per-catalog query statistics
    pub query_stats: Arc<dyn QueryStats>,
    /// Session bindings
    pub sessions: Arc<dyn SessionCatalogs>,
}

impl Collaborators {
    /// In-memory collaborators, ids starting at `first_id`.
    pub fn in_memory(first_id: i64) -> Self {
        Self {
            ids: Arc::new(SequentialIdAllocator::new(first_id)),
            resources: Arc::new(MemoryResourceTracker::new()),
            access: Arc::new(AllowAll),
            id_mapper: Arc::new(MemoryIdMapper::new()),
            meta_cache: Arc::new(MemoryMetaCache::new()),
            query_stats: Arc::new(MemoryQueryStats::new()),
            sessions: Arc::new(SessionTracker::new()),
        }
    }
}
