//! Shared resource reference tracking.
//!
//! A catalog may name a shared resource (credentials, connection settings).
//! Each live catalog naming a resource holds exactly one reference on it.

use std::collections::BTreeSet;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::CatalogError;

/// Kind of object holding a reference.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ReferenceType {
    /// A catalog, identified by name
    Catalog,
}

/// Tracks which objects reference which shared resources.
pub trait ResourceTracker: Send + Sync {
    /// Returns true if the resource is known.
    fn contains(&self, resource: &str) -> bool;

    /// Records a reference. Adding an existing reference is a no-op.
    fn add_reference(
        &self,
        resource: &str,
        owner: &str,
        ref_type: ReferenceType,
    ) -> Result<(), CatalogError>;

    /// Drops a reference. Removing an absent reference is a no-op.
    fn remove_reference(
        &self,
        resource: &str,
        owner: &str,
        ref_type: ReferenceType,
    ) -> Result<(), CatalogError>;
}

/// In-memory resource tracker.
#[derive(Default)]
pub struct MemoryResourceTracker {
    resources: DashMap<String, BTreeSet<(ReferenceType, String)>>,
}

impl MemoryResourceTracker {
    /// Creates a tracker with no resources.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a resource. Existing references are kept.
    pub fn create_resource(&self, name: impl Into<String>) {
        self.resources.entry(name.into()).or_default();
    }

    /// Number of references on `resource`, zero if unknown.
    pub fn reference_count(&self, resource: &str) -> usize {
        self.resources.get(resource).map(|r| r.len()).unwrap_or(0)
    }

    /// Owners referencing `resource`, sorted.
    pub fn references(&self, resource: &str) -> Vec<(ReferenceType, String)> {
        self.resources
            .get(resource)
            .map(|r| r.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Names of every known resource, sorted.
    pub fn resource_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.resources.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }
}

impl ResourceTracker for MemoryResourceTracker {
    fn contains(&self, resource: &str) -> bool {
        self.resources.contains_key(resource)
    }

    fn add_reference(
        &self,
        resource: &str,
        owner: &str,
        ref_type: ReferenceType,
    ) -> Result<(), CatalogError> {
        let mut refs = self
            .resources
            .get_mut(resource)
            .ok_or_else(|| CatalogError::ResourceNotFound(resource.to_string()))?;
        if refs.insert((ref_type, owner.to_string())) {
            debug!(resource, owner, "resource reference added");
        }
        Ok(())
    }

    fn remove_reference(
        &self,
        resource: &str,
        owner: &str,
        ref_type: ReferenceType,
    ) -> Result<(), CatalogError> {
        if let Some(mut refs) = self.resources.get_mut(resource) {
            if refs.remove(&(ref_type, owner.to_string())) {
                debug!(resource, owner, "resource reference removed");
            }
        }
        Ok(())
    }
}
