//! Shared fixtures for catalogd-meta integration tests.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::Arc;

use catalogd_meta::catalog::CatalogImage;
use catalogd_meta::property::HIVE_METASTORE_URIS;
use catalogd_meta::resource::MemoryResourceTracker;
use catalogd_meta::session::SessionTracker;
use catalogd_meta::{
    CatalogId, CatalogRegistry, CatalogType, Collaborators, CreateCatalogRequest, MemoryEditLog,
    RefreshEntry, RegistryConfig, RegistrySnapshot,
};

/// Name of the shared resource every fixture registers.
pub const SHARED_RESOURCE: &str = "hms_shared";

/// A registry wired to in-memory collaborators that tests can inspect.
pub struct Fixture {
    pub registry: CatalogRegistry,
    pub log: Arc<MemoryEditLog>,
    pub resources: Arc<MemoryResourceTracker>,
    pub sessions: Arc<SessionTracker>,
}

impl Fixture {
    pub fn new() -> Self {
        let log = Arc::new(MemoryEditLog::new());
        let resources = Arc::new(MemoryResourceTracker::new());
        resources.create_resource(SHARED_RESOURCE);
        let sessions = Arc::new(SessionTracker::new());
        let mut collab = Collaborators::in_memory(10_000);
        collab.resources = resources.clone();
        collab.sessions = sessions.clone();
        let registry = CatalogRegistry::new(RegistryConfig::default(), log.clone(), collab);
        Self {
            registry,
            log,
            resources,
            sessions,
        }
    }

    /// Everything observable about the registry, for before/after comparisons.
    pub fn state(&self) -> (BTreeMap<CatalogId, CatalogImage>, Vec<RefreshEntry>, usize) {
        (
            RegistrySnapshot::capture(&self.registry, || 0).catalogs,
            self.registry.refresh_entries(),
            self.resources.reference_count(SHARED_RESOURCE),
        )
    }
}

/// A valid Hive catalog request.
pub fn hive(name: &str) -> CreateCatalogRequest {
    CreateCatalogRequest::new(name, CatalogType::Hms)
        .with_property(HIVE_METASTORE_URIS, "thrift://127.0.0.1:9083")
}
