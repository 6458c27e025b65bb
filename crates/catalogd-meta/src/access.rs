//! Catalog-level privilege checks
//!
//! The registry consults an [`AccessController`] when listing catalogs or
//! showing their properties. Grants are per user and catalog; the `root` and
//! `admin` identities bypass every check.

use std::collections::HashSet;
use std::fmt;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

/// Grant target matching every catalog.
pub const ANY_CATALOG: &str = "*";

/// Privilege requested on a catalog.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PrivilegeAction {
    /// See the catalog in listings and read its properties.
    Show,
    /// Rename, comment or change properties.
    Alter,
    /// Drop the catalog.
    Drop,
}

/// A requesting user.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identity {
    /// User name
    pub user: String,
    /// Client host, `%` for any
    pub host: String,
}

impl Identity {
    /// Creates an identity connecting from any host.
    pub fn new(user: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            host: "%".to_string(),
        }
    }

    /// The superuser identity.
    pub fn root() -> Self {
        Self::new("root")
    }

    /// Returns true for identities that bypass privilege checks.
    pub fn is_superuser(&self) -> bool {
        self.user == "root" || self.user == "admin"
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'{}'@'{}'", self.user, self.host)
    }
}

/// Decides whether an identity may act on a catalog.
pub trait AccessController: Send + Sync {
    /// Returns true if `identity` holds `action` on `catalog`.
    fn check_catalog_privilege(
        &self,
        identity: &Identity,
        catalog: &str,
        action: PrivilegeAction,
    ) -> bool;
}

/// Grants everything.
#[derive(Clone, Copy, Debug, Default)]
pub struct AllowAll;

impl AccessController for AllowAll {
    fn check_catalog_privilege(&self, _: &Identity, _: &str, _: PrivilegeAction) -> bool {
        true
    }
}

/// Explicit grant table.
#[derive(Default)]
pub struct StaticAccessController {
    grants: DashMap<String, HashSet<(String, PrivilegeAction)>>,
}

impl StaticAccessController {
    /// Creates a controller with no grants.
    pub fn new() -> Self {
        Self::default()
    }

    /// Grants `action` on `catalog` (or [`ANY_CATALOG`]) to `user`.
    pub fn grant(&self, user: &str, catalog: &str, action: PrivilegeAction) {
        self.grants
            .entry(user.to_string())
            .or_default()
            .insert((catalog.to_string(), action));
    }

    /// Revokes a previous grant.
    pub fn revoke(&self, user: &str, catalog: &str, action: PrivilegeAction) {
        if let Some(mut g) = self.grants.get_mut(user) {
            g.remove(&(catalog.to_string(), action));
        }
    }
}

impl AccessController for StaticAccessController {
    fn check_catalog_privilege(
        &self,
        identity: &Identity,
        catalog: &str,
        action: PrivilegeAction,
    ) -> bool {
        if identity.is_superuser() {
            return true;
        }
        match self.grants.get(&identity.user) {
            Some(g) => {
                g.contains(&(catalog.to_string(), action))
                    || g.contains(&(ANY_CATALOG.to_string(), action))
            }
            None => false,
        }
    }
}
