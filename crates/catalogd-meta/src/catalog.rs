//! Catalog objects held by the registry.
//!
//! A [`Catalog`] is a plain value: the registry clones it, edits the clone and
//! swaps the `Arc` under its write lock. The part of an external catalog that
//! event ingestion mutates (databases, tables, lifecycle) lives behind a
//! shared [`ExternalCatalog`] so that clones keep pointing at the same cache.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::CatalogError;
use crate::property::{self, Properties};
use crate::types::{CatalogId, CatalogType, LifecycleState, Timestamp, INTERNAL_CATALOG_NAME};

/// A table registered under an external database.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalTable {
    /// Table id, name-derived or mapped
    pub id: i64,
    /// Table name
    pub name: String,
    /// Time of the last event touching the table
    pub update_time: Timestamp,
}

/// A database registered under an external catalog.
///
/// The table index has its own lock; event ingestion holds it for writing
/// while it registers or removes tables.
#[derive(Debug)]
pub struct ExternalDatabase {
    id: i64,
    name: String,
    initialized: AtomicBool,
    tables: RwLock<BTreeMap<String, ExternalTable>>,
}

impl ExternalDatabase {
    /// Creates an empty database.
    pub fn new(id: i64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            initialized: AtomicBool::new(false),
            tables: RwLock::new(BTreeMap::new()),
        }
    }

    /// Database id.
    pub fn id(&self) -> i64 {
        self.id
    }

    /// Database name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the table with the given name.
    pub fn table(&self, name: &str) -> Option<ExternalTable> {
        self.tables.read().get(name).cloned()
    }

    /// Names of all registered tables, sorted.
    pub fn table_names(&self) -> Vec<String> {
        self.tables.read().keys().cloned().collect()
    }

    /// Number of registered tables.
    pub fn table_count(&self) -> usize {
        self.tables.read().len()
    }

    /// Whether the database's metadata has been loaded from the source.
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    pub(crate) fn mark_initialized(&self) {
        self.initialized.store(true, Ordering::Release);
    }

    pub(crate) fn tables(&self) -> &RwLock<BTreeMap<String, ExternalTable>> {
        &self.tables
    }
}

/// Shared mutable state of an external catalog.
#[derive(Debug)]
pub struct ExternalCatalog {
    state: RwLock<LifecycleState>,
    closed: AtomicBool,
    databases: RwLock<BTreeMap<String, Arc<ExternalDatabase>>>,
}

impl Default for ExternalCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl ExternalCatalog {
    /// Creates an uninitialized external catalog with no databases.
    pub fn new() -> Self {
        Self {
            state: RwLock::new(LifecycleState::Uninitialized),
            closed: AtomicBool::new(false),
            databases: RwLock::new(BTreeMap::new()),
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> LifecycleState {
        *self.state.read()
    }

    /// Returns true once the catalog has been removed from the registry.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Returns the database with the given name.
    pub fn database(&self, name: &str) -> Option<Arc<ExternalDatabase>> {
        self.databases.read().get(name).cloned()
    }

    /// Names of all registered databases, sorted.
    pub fn database_names(&self) -> Vec<String> {
        self.databases.read().keys().cloned().collect()
    }

    /// Finds a database by id.
    pub fn database_by_id(&self, id: i64) -> Option<Arc<ExternalDatabase>> {
        self.databases.read().values().find(|db| db.id == id).cloned()
    }

    pub(crate) fn mark_initialized(&self) {
        *self.state.write() = LifecycleState::Initialized;
    }

    /// Registers `db` unless a database with the same name exists.
    /// Returns false when it was already present.
    pub(crate) fn register_database(&self, db: ExternalDatabase) -> bool {
        let mut dbs = self.databases.write();
        if dbs.contains_key(&db.name) {
            return false;
        }
        dbs.insert(db.name.clone(), Arc::new(db));
        true
    }

    pub(crate) fn unregister_database(&self, name: &str) -> Option<Arc<ExternalDatabase>> {
        self.databases.write().remove(name)
    }

    /// Marks the catalog closed and drops its databases. Waits for event
    /// handlers still holding a table lock, so none of them forwards to the
    /// meta cache after the caller evicts it.
    fn close(&self) {
        self.closed.store(true, Ordering::Release);
        let dropped = {
            let mut dbs = self.databases.write();
            for db in dbs.values() {
                drop(db.tables.write());
            }
            let n = dbs.len();
            dbs.clear();
            n
        };
        debug!(databases = dropped, "external catalog closed");
    }
}

/// Variant-specific part of a catalog.
#[derive(Clone, Debug)]
pub enum CatalogKind {
    /// The engine's own storage catalog
    Internal,
    /// A catalog federated from an external metadata source
    External(Arc<ExternalCatalog>),
}

/// One catalog instance.
#[derive(Clone, Debug)]
pub struct Catalog {
    id: CatalogId,
    name: String,
    catalog_type: CatalogType,
    comment: String,
    resource: Option<String>,
    properties: Properties,
    last_update_time: Timestamp,
    kind: CatalogKind,
}

impl Catalog {
    /// The reserved internal catalog.
    pub fn internal() -> Self {
        Self {
            id: CatalogId::INTERNAL,
            name: INTERNAL_CATALOG_NAME.to_string(),
            catalog_type: CatalogType::Internal,
            comment: "built-in storage catalog".to_string(),
            resource: None,
            properties: Properties::new(),
            last_update_time: Timestamp::EPOCH,
            kind: CatalogKind::Internal,
        }
    }

    /// Builds an external catalog in the `Uninitialized` state.
    pub fn external(
        id: CatalogId,
        name: impl Into<String>,
        catalog_type: CatalogType,
        comment: impl Into<String>,
        resource: Option<String>,
        properties: Properties,
        update_time: Timestamp,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            catalog_type,
            comment: comment.into(),
            resource,
            properties,
            last_update_time: update_time,
            kind: CatalogKind::External(Arc::new(ExternalCatalog::new())),
        }
    }

    /// Catalog id.
    pub fn id(&self) -> CatalogId {
        self.id
    }

    /// Catalog name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Catalog kind.
    pub fn catalog_type(&self) -> CatalogType {
        self.catalog_type
    }

    /// Free-form comment.
    pub fn comment(&self) -> &str {
        &self.comment
    }

    /// Name of the shared resource this catalog references, if any.
    pub fn resource(&self) -> Option<&str> {
        self.resource.as_deref()
    }

    /// Current property map.
    pub fn properties(&self) -> &Properties {
        &self.properties
    }

    /// Time of the last committed change.
    pub fn last_update_time(&self) -> Timestamp {
        self.last_update_time
    }

    /// Returns true for the reserved internal catalog.
    pub fn is_internal(&self) -> bool {
        matches!(self.kind, CatalogKind::Internal)
    }

    /// Shared external state, `None` for the internal catalog.
    pub fn external_state(&self) -> Option<&Arc<ExternalCatalog>> {
        match &self.kind {
            CatalogKind::External(ext) => Some(ext),
            CatalogKind::Internal => None,
        }
    }

    /// Lifecycle state. The internal catalog is always initialized.
    pub fn lifecycle_state(&self) -> LifecycleState {
        match &self.kind {
            CatalogKind::Internal => LifecycleState::Initialized,
            CatalogKind::External(ext) => ext.state(),
        }
    }

    /// Checks `props` against this catalog's kind.
    pub fn validate_properties(&self, props: &Properties) -> Result<(), CatalogError> {
        property::validate(&self.name, self.catalog_type, props)
    }

    /// Whether external ids are derived from names.
    pub fn use_meta_cache(&self, default: bool) -> bool {
        property::use_meta_cache(&self.properties, default).unwrap_or(default)
    }

    /// Refresh interval carried by the property map, if valid.
    pub fn refresh_interval_secs(&self) -> Option<u64> {
        property::refresh_interval(&self.properties).and_then(Result::ok)
    }

    /// Releases cached external state. No-op for the internal catalog.
    pub fn on_close(&self) {
        if let CatalogKind::External(ext) = &self.kind {
            ext.close();
        }
    }

    pub(crate) fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub(crate) fn set_comment(&mut self, comment: impl Into<String>) {
        self.comment = comment.into();
    }

    pub(crate) fn set_properties(&mut self, properties: Properties) {
        self.properties = properties;
    }

    pub(crate) fn touch(&mut self, ts: Timestamp) {
        if ts > self.last_update_time {
            self.last_update_time = ts;
        }
    }
}

/// Serializable image of a catalog, used by snapshots.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogImage {
    /// Catalog id
    pub id: CatalogId,
    /// Catalog name
    pub name: String,
    /// Catalog kind
    pub catalog_type: CatalogType,
    /// Comment
    pub comment: String,
    /// Referenced resource
    pub resource: Option<String>,
    /// Property map
    pub properties: Properties,
    /// Last committed change
    pub last_update_time: Timestamp,
}

impl From<&Catalog> for CatalogImage {
    fn from(c: &Catalog) -> Self {
        Self {
            id: c.id,
            name: c.name.clone(),
            catalog_type: c.catalog_type,
            comment: c.comment.clone(),
            resource: c.resource.clone(),
            properties: c.properties.clone(),
            last_update_time: c.last_update_time,
        }
    }
}

impl CatalogImage {
    /// Rebuilds a live catalog. External catalogs restart uninitialized.
    pub fn into_catalog(self) -> Catalog {
        if self.catalog_type.is_external() {
            Catalog::external(
                self.id,
                self.name,
                self.catalog_type,
                self.comment,
                self.resource,
                self.properties,
                self.last_update_time,
            )
        } else {
            let mut c = Catalog::internal();
            c.comment = self.comment;
            c.properties = self.properties;
            c.last_update_time = self.last_update_time;
            c
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::property::HIVE_METASTORE_URIS;

    fn hive(id: i64) -> Catalog {
        let mut props = Properties::new();
        props.insert(HIVE_METASTORE_URIS.to_string(), "thrift://h:9083".to_string());
        Catalog::external(
            CatalogId::new(id),
            "hive1",
            CatalogType::Hms,
            "",
            None,
            props,
            Timestamp::from_millis(10),
        )
    }

    #[test]
    fn test_internal_catalog_shape() {
        let c = Catalog::internal();
        assert_eq!(c.id(), CatalogId::INTERNAL);
        assert_eq!(c.name(), INTERNAL_CATALOG_NAME);
        assert!(c.is_internal());
        assert!(c.external_state().is_none());
        assert_eq!(c.lifecycle_state(), LifecycleState::Initialized);
    }

    #[test]
    fn test_external_starts_uninitialized() {
        let c = hive(10001);
        assert_eq!(c.lifecycle_state(), LifecycleState::Uninitialized);
        c.external_state().unwrap().mark_initialized();
        assert_eq!(c.lifecycle_state(), LifecycleState::Initialized);
    }

    #[test]
    fn test_clone_shares_external_state() {
        let c = hive(10001);
        let mut renamed = c.clone();
        renamed.set_name("hive2");
        let ext = c.external_state().unwrap();
        assert!(ext.register_database(ExternalDatabase::new(1, "db1")));
        assert!(renamed.external_state().unwrap().database("db1").is_some());
        assert_eq!(c.name(), "hive1");
    }

    #[test]
    fn test_on_close_drops_databases() {
        let c = hive(10001);
        let ext = c.external_state().unwrap().clone();
        ext.register_database(ExternalDatabase::new(1, "db1"));
        assert!(!ext.register_database(ExternalDatabase::new(2, "db1")));
        c.on_close();
        assert!(ext.is_closed());
        assert!(ext.database_names().is_empty());
    }

    #[test]
    fn test_close_waits_for_table_writers() {
        use std::sync::{Arc, Barrier};
        use std::thread;
        use std::time::Duration;

        let c = hive(10001);
        let ext = c.external_state().unwrap().clone();
        ext.register_database(ExternalDatabase::new(1, "db1"));
        let db = ext.database("db1").unwrap();

        let writer_done = Arc::new(AtomicBool::new(false));
        let barrier = Arc::new(Barrier::new(2));
        let handle = {
            let db = db.clone();
            let writer_done = writer_done.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                let _tables = db.tables().write();
                barrier.wait();
                thread::sleep(Duration::from_millis(100));
                writer_done.store(true, Ordering::SeqCst);
            })
        };

        barrier.wait();
        c.on_close();
        assert!(writer_done.load(Ordering::SeqCst));
        assert!(ext.is_closed());
        handle.join().unwrap();
    }

    #[test]
    fn test_database_init_flag() {
        let db = ExternalDatabase::new(1, "db1");
        assert!(!db.is_initialized());
        db.mark_initialized();
        assert!(db.is_initialized());
    }

    #[test]
    fn test_touch_is_monotonic() {
        let mut c = hive(10001);
        c.touch(Timestamp::from_millis(5));
        assert_eq!(c.last_update_time(), Timestamp::from_millis(10));
        c.touch(Timestamp::from_millis(50));
        assert_eq!(c.last_update_time(), Timestamp::from_millis(50));
    }

    #[test]
    fn test_image_round_trip_resets_lifecycle() {
        let c = hive(10001);
        c.external_state().unwrap().mark_initialized();
        let image = CatalogImage::from(&c);
        let back = image.clone().into_catalog();
        assert_eq!(CatalogImage::from(&back), image);
        assert_eq!(back.lifecycle_state(), LifecycleState::Uninitialized);
    }
}
