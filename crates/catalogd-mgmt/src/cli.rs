//! `catd-admin` command line.

use crate::admin::AdminState;
use crate::config::AdminConfig;
use anyhow::Result;
use catalogd_meta::access::{AccessController, Identity, PrivilegeAction};
use catalogd_meta::property::Properties;
use catalogd_meta::show::SHOW_CATALOGS_HEADER;
use catalogd_meta::types::INTERNAL_CATALOG_NAME;
use catalogd_meta::{CatalogError, CatalogType, CreateCatalogRequest};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Administers the catalog registry kept in a local state snapshot.
#[derive(Parser, Debug)]
#[command(name = "catd-admin")]
#[command(about = "catalogd catalog administration", long_about = None)]
pub struct Cli {
    /// Config file (.toml or .json)
    #[arg(short, long, env = "CATD_CONFIG")]
    pub config: Option<PathBuf>,

    /// State snapshot, overriding `registry.snapshot_path`
    #[arg(short, long, env = "CATD_STATE")]
    pub state: Option<PathBuf>,

    /// Acting user
    #[arg(short, long, env = "CATD_USER", default_value = "root")]
    pub user: String,

    /// Print listings as JSON
    #[arg(long)]
    pub json: bool,

    /// Operation to run
    #[command(subcommand)]
    pub command: Command,
}

/// Admin operations.
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Create an external catalog
    Create {
        /// Catalog name
        name: String,
        /// Catalog kind: hms, iceberg or jdbc
        #[arg(short = 't', long = "type")]
        catalog_type: String,
        /// Succeed if the name is already taken
        #[arg(long)]
        if_not_exists: bool,
        /// Catalog comment
        #[arg(long)]
        comment: Option<String>,
        /// Shared resource to reference
        #[arg(long)]
        resource: Option<String>,
        /// Property as key=value, repeatable
        #[arg(short = 'p', long = "property", value_parser = parse_property)]
        properties: Vec<(String, String)>,
    },
    /// Drop a catalog
    Drop {
        /// Catalog name
        name: String,
        /// Succeed if the catalog does not exist
        #[arg(long)]
        if_exists: bool,
    },
    /// Rename a catalog
    Rename {
        /// Current name
        name: String,
        /// New name
        new_name: String,
    },
    /// Replace a catalog comment
    Comment {
        /// Catalog name
        name: String,
        /// New comment
        comment: String,
    },
    /// Merge properties into a catalog
    Set {
        /// Catalog name
        name: String,
        /// Property as key=value, repeatable
        #[arg(short = 'p', long = "property", value_parser = parse_property, required = true)]
        properties: Vec<(String, String)>,
    },
    /// Mark an external catalog initialized
    Init {
        /// Catalog name
        name: String,
    },
    /// List catalogs
    List {
        /// SQL LIKE filter on the name
        #[arg(long)]
        like: Option<String>,
        /// Catalog flagged as current
        #[arg(long, default_value = INTERNAL_CATALOG_NAME)]
        current: String,
    },
    /// Show catalog properties, sensitive values masked
    Show {
        /// Catalog name
        name: String,
    },
    /// Print the DDL that recreates a catalog
    ShowCreate {
        /// Catalog name
        name: String,
    },
    /// List refresh schedule entries
    Refresh,
    /// Catalog count and log position
    Status,
}

/// Parses `key=value`.
pub fn parse_property(s: &str) -> std::result::Result<(String, String), String> {
    match s.split_once('=') {
        Some((k, v)) if !k.trim().is_empty() => Ok((k.trim().to_string(), v.to_string())),
        _ => Err(format!("expected key=value, got '{}'", s)),
    }
}

impl Cli {
    /// Loads config and state, runs the command, saves the state if it
    /// changed. Returns the lines to print.
    pub fn run(&self) -> Result<Vec<String>> {
        let config = match &self.config {
            Some(path) => AdminConfig::from_file(path)?,
            None => AdminConfig::default(),
        };
        let path = self
            .state
            .clone()
            .unwrap_or_else(|| config.registry.snapshot_path.clone());

        let state = AdminState::open(&config, &path)?;
        let lines = self.execute(&state)?;
        if state.pending_records()? > 0 {
            state.save()?;
        }
        Ok(lines)
    }

    fn identity(&self) -> Identity {
        Identity::new(self.user.as_str())
    }

    fn require(&self, state: &AdminState, catalog: &str, action: PrivilegeAction) -> Result<()> {
        let identity = self.identity();
        let allowed = state
            .registry()
            .collaborators()
            .access
            .check_catalog_privilege(&identity, catalog, action);
        if !allowed {
            return Err(CatalogError::AccessDenied {
                identity: identity.to_string(),
                catalog: catalog.to_string(),
            }
            .into());
        }
        Ok(())
    }

    /// Runs the command against an opened state.
    pub fn execute(&self, state: &AdminState) -> Result<Vec<String>> {
        let registry = state.registry();
        match &self.command {
            Command::Create {
                name,
                catalog_type,
                if_not_exists,
                comment,
                resource,
                properties,
            } => {
                self.require(state, name, PrivilegeAction::Alter)?;
                let kind: CatalogType = catalog_type.parse()?;
                let mut req = CreateCatalogRequest::new(name.as_str(), kind);
                for (k, v) in properties {
                    req = req.with_property(k.as_str(), v.as_str());
                }
                if let Some(comment) = comment {
                    req = req.with_comment(comment.as_str());
                }
                if let Some(resource) = resource {
                    req = req.with_resource(resource.as_str());
                }
                let id = registry.create(req, *if_not_exists)?;
                Ok(vec![format!("catalog {} id {}", name, id)])
            }
            Command::Drop { name, if_exists } => {
                self.require(state, name, PrivilegeAction::Drop)?;
                registry.drop(name, *if_exists)?;
                Ok(vec![format!("dropped {}", name)])
            }
            Command::Rename { name, new_name } => {
                self.require(state, name, PrivilegeAction::Alter)?;
                registry.rename(name, new_name)?;
                Ok(vec![format!("renamed {} to {}", name, new_name)])
            }
            Command::Comment { name, comment } => {
                self.require(state, name, PrivilegeAction::Alter)?;
                registry.set_comment(name, comment)?;
                Ok(vec![format!("comment of {} updated", name)])
            }
            Command::Set { name, properties } => {
                self.require(state, name, PrivilegeAction::Alter)?;
                let props: Properties = properties.iter().cloned().collect();
                let count = props.len();
                registry.set_properties(name, props)?;
                Ok(vec![format!("{} properties of {} updated", count, name)])
            }
            Command::Init { name } => {
                self.require(state, name, PrivilegeAction::Alter)?;
                registry.initialize_catalog(name)?;
                Ok(vec![format!("{} initialized", name)])
            }
            Command::List { like, current } => {
                let rows = registry.show_catalogs(&self.identity(), like.as_deref(), current)?;
                if self.json {
                    return Ok(vec![serde_json::to_string_pretty(&rows)?]);
                }
                let mut lines = vec![SHOW_CATALOGS_HEADER.join("\t")];
                lines.extend(rows.iter().map(|r| r.columns().join("\t")));
                Ok(lines)
            }
            Command::Show { name } => {
                let rows = registry.show_catalog_properties(&self.identity(), name)?;
                if self.json {
                    let map: serde_json::Map<String, serde_json::Value> = rows
                        .into_iter()
                        .map(|(k, v)| (k, serde_json::Value::String(v)))
                        .collect();
                    return Ok(vec![serde_json::to_string_pretty(&map)?]);
                }
                Ok(rows.into_iter().map(|(k, v)| format!("{}\t{}", k, v)).collect())
            }
            Command::ShowCreate { name } => {
                self.require(state, name, PrivilegeAction::Show)?;
                Ok(vec![registry.show_create_catalog(name)?])
            }
            Command::Refresh => {
                let entries = registry.refresh_entries();
                if self.json {
                    return Ok(vec![serde_json::to_string_pretty(&entries)?]);
                }
                Ok(entries
                    .iter()
                    .map(|e| format!("{}\t{}", e.catalog_id, e.interval_secs))
                    .collect())
            }
            Command::Status => Ok(vec![
                format!("catalogs: {}", registry.catalog_count()),
                format!("log_sequence: {}", state.log_sequence()?),
            ]),
        }
    }
}
