//! Per-session "last used database" bindings.
//!
//! Sessions remember the database they last used in each catalog. When a
//! catalog is dropped those bindings are cleared; when it is renamed they move
//! to the new name.

use std::collections::HashMap;
use std::fmt;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier of a client session.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(Uuid);

impl SessionId {
    /// Creates a fresh random session id.
    pub fn new() -> Self {
        SessionId(Uuid::new_v4())
    }

    /// Returns the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Session-side hooks the registry calls on drop and rename.
pub trait SessionCatalogs: Send + Sync {
    /// Forgets every session's last database in `catalog`.
    fn remove_last_db_of_catalog(&self, catalog: &str);

    /// Moves every session's binding from `old_name` to `new_name`.
    fn rename_catalog(&self, old_name: &str, new_name: &str);
}

/// In-memory session binding table.
#[derive(Default)]
pub struct SessionTracker {
    sessions: DashMap<SessionId, HashMap<String, String>>,
}

impl SessionTracker {
    /// Creates an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that `session` last used `db` in `catalog`.
    pub fn set_last_db(&self, session: SessionId, catalog: &str, db: &str) {
        self.sessions
            .entry(session)
            .or_default()
            .insert(catalog.to_string(), db.to_string());
    }

    /// Last database `session` used in `catalog`.
    pub fn last_db(&self, session: &SessionId, catalog: &str) -> Option<String> {
        self.sessions
            .get(session)
            .and_then(|m| m.get(catalog).cloned())
    }

    /// Forgets a closed session.
    pub fn close_session(&self, session: &SessionId) {
        self.sessions.remove(session);
    }
}

impl SessionCatalogs for SessionTracker {
    fn remove_last_db_of_catalog(&self, catalog: &str) {
        for mut entry in self.sessions.iter_mut() {
            entry.value_mut().remove(catalog);
        }
    }

    fn rename_catalog(&self, old_name: &str, new_name: &str) {
        for mut entry in self.sessions.iter_mut() {
            let bindings = entry.value_mut();
            if let Some(db) = bindings.remove(old_name) {
                bindings.insert(new_name.to_string(), db);
            }
        }
    }
}
