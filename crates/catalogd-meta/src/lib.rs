#![warn(missing_docs)]

//! catalogd metadata core: catalog registry, replicated catalog log, external metadata events

pub mod access;
pub mod catalog;
pub mod collab;
pub mod config;
pub mod editlog;
pub mod error;
pub mod events;
pub mod property;
pub mod registry;
pub mod resource;
pub mod session;
pub mod show;
pub mod snapshot;
pub mod types;

pub use catalog::{Catalog, CatalogImage, ExternalDatabase, ExternalTable};
pub use collab::Collaborators;
pub use config::RegistryConfig;
pub use editlog::{CatalogLog, CatalogOp, EditLog, MemoryEditLog, OpKind};
pub use error::CatalogError;
pub use registry::{CatalogRegistry, CreateCatalogRequest};
pub use snapshot::RegistrySnapshot;
pub use types::{CatalogId, CatalogType, LifecycleState, RefreshEntry, Timestamp};
