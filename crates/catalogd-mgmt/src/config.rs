//! Admin tool configuration.

use catalogd_meta::access::{AccessController, AllowAll, PrivilegeAction, StaticAccessController};
use catalogd_meta::resource::MemoryResourceTracker;
use catalogd_meta::{Collaborators, RegistryConfig};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

/// A privilege grant loaded from the config file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grant {
    /// User receiving the grant
    pub user: String,
    /// Catalog name, or `*` for every catalog
    pub catalog: String,
    /// Granted action
    pub action: PrivilegeAction,
}

/// Configuration of `catd-admin`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Registry tunables, including where the state snapshot lives
    pub registry: RegistryConfig,
    /// Shared resources catalogs may reference
    pub resources: Vec<String>,
    /// Privilege grants. With no grants every user may do everything.
    pub grants: Vec<Grant>,
}

impl AdminConfig {
    /// Loads a config from a `.toml` or `.json` file.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();

        match ext.to_lowercase().as_str() {
            "toml" => {
                let config: AdminConfig = toml::from_str(&contents)?;
                Ok(config)
            }
            "json" => {
                let config: AdminConfig = serde_json::from_str(&contents)?;
                Ok(config)
            }
            _ => anyhow::bail!("Unsupported config file extension: {}", ext),
        }
    }

    /// In-memory collaborators seeded with the configured resources and grants.
    pub fn collaborators(&self) -> Collaborators {
        let resources = MemoryResourceTracker::new();
        for name in &self.resources {
            resources.create_resource(name.clone());
        }

        let access: Arc<dyn AccessController> = if self.grants.is_empty() {
            Arc::new(AllowAll)
        } else {
            let controller = StaticAccessController::new();
            for g in &self.grants {
                controller.grant(&g.user, &g.catalog, g.action);
            }
            Arc::new(controller)
        };

        let mut collab = Collaborators::in_memory(self.registry.first_catalog_id);
        collab.resources = Arc::new(resources);
        collab.access = access;
        collab
    }
}
