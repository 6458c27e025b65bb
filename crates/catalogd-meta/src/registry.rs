//! The catalog registry.
//!
//! Holds the id and name indexes of every live catalog behind one
//! reader/writer lock. Leader-side DDL takes the write lock for its whole
//! duration: it validates, applies the change through the same replay
//! function followers use, then appends the record to the edit log. Replay
//! on followers takes the same lock and runs the same transitions.
//!
//! Replay functions are idempotent. Records naming a catalog id that is not
//! live are skipped, and a second `Create` for a live id is ignored, so a
//! follower may safely re-apply a suffix of the log after a restart.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, error, info, warn};

use crate::access::{Identity, PrivilegeAction};
use crate::catalog::Catalog;
use crate::collab::Collaborators;
use crate::config::RegistryConfig;
use crate::editlog::{CatalogLog, CatalogOp, EditLog};
use crate::error::CatalogError;
use crate::property::{self, Properties};
use crate::resource::ReferenceType;
use crate::types::{CatalogId, CatalogType, LifecycleState, RefreshEntry, Timestamp};

/// Parameters of a `CREATE CATALOG` request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CreateCatalogRequest {
    /// Catalog name
    pub name: String,
    /// Catalog kind, must be external
    pub catalog_type: CatalogType,
    /// Comment
    pub comment: String,
    /// Shared resource to reference
    pub resource: Option<String>,
    /// User-supplied properties
    pub properties: Properties,
}

impl CreateCatalogRequest {
    /// A request with no comment, resource or properties.
    pub fn new(name: impl Into<String>, catalog_type: CatalogType) -> Self {
        Self {
            name: name.into(),
            catalog_type,
            comment: String::new(),
            resource: None,
            properties: Properties::new(),
        }
    }

    /// Sets a property.
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Sets the comment.
    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = comment.into();
        self
    }

    /// Sets the referenced resource.
    pub fn with_resource(mut self, resource: impl Into<String>) -> Self {
        self.resource = Some(resource.into());
        self
    }
}

/// Indexes guarded by the registry lock.
#[derive(Default)]
pub(crate) struct RegistryState {
    pub(crate) by_id: BTreeMap<CatalogId, Arc<Catalog>>,
    pub(crate) by_name: HashMap<String, CatalogId>,
    pub(crate) refresh: BTreeMap<CatalogId, u64>,
    /// Highest catalog id ever attached; survives drops.
    pub(crate) max_catalog_id: i64,
}

impl RegistryState {
    pub(crate) fn with_internal() -> Self {
        let mut state = Self::default();
        let internal = Catalog::internal();
        state
            .by_name
            .insert(internal.name().to_string(), internal.id());
        state.by_id.insert(internal.id(), Arc::new(internal));
        state
    }

    fn lookup(&self, name: &str) -> Option<&Arc<Catalog>> {
        self.by_name.get(name).and_then(|id| self.by_id.get(id))
    }
}

/// The registry of every catalog known to this node.
pub struct CatalogRegistry {
    pub(crate) state: RwLock<RegistryState>,
    pub(crate) edit_log: Arc<dyn EditLog>,
    pub(crate) collab: Collaborators,
    pub(crate) config: RegistryConfig,
}

impl CatalogRegistry {
    /// Creates a registry holding only the internal catalog.
    pub fn new(config: RegistryConfig, edit_log: Arc<dyn EditLog>, collab: Collaborators) -> Self {
        Self {
            state: RwLock::new(RegistryState::with_internal()),
            edit_log,
            collab,
            config,
        }
    }

    /// Node configuration.
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Collaborators this registry calls out to.
    pub fn collaborators(&self) -> &Collaborators {
        &self.collab
    }

    // ---------------------------------------------------------------------
    // Reads
    // ---------------------------------------------------------------------

    /// Returns the live catalog with the given name.
    pub fn catalog_by_name(&self, name: &str) -> Result<Arc<Catalog>, CatalogError> {
        self.state
            .read()
            .lookup(name)
            .cloned()
            .ok_or_else(|| CatalogError::CatalogNotFound(name.to_string()))
    }

    /// Returns the live catalog with the given id.
    pub fn catalog_by_id(&self, id: CatalogId) -> Result<Arc<Catalog>, CatalogError> {
        self.state
            .read()
            .by_id
            .get(&id)
            .cloned()
            .ok_or(CatalogError::CatalogIdNotFound(id))
    }

    /// The internal catalog.
    pub fn internal_catalog(&self) -> Arc<Catalog> {
        self.state
            .read()
            .by_id
            .get(&CatalogId::INTERNAL)
            .cloned()
            .unwrap_or_else(|| Arc::new(Catalog::internal()))
    }

    /// Every live catalog ordered by id.
    pub fn list(&self) -> Vec<Arc<Catalog>> {
        self.state.read().by_id.values().cloned().collect()
    }

    /// Live catalogs `identity` may see, ordered by id.
    pub fn list_visible_to(&self, identity: &Identity) -> Vec<Arc<Catalog>> {
        self.list()
            .into_iter()
            .filter(|c| {
                self.collab
                    .access
                    .check_catalog_privilege(identity, c.name(), PrivilegeAction::Show)
            })
            .collect()
    }

    /// Ids of every live catalog, ascending.
    pub fn catalog_ids(&self) -> Vec<CatalogId> {
        self.state.read().by_id.keys().copied().collect()
    }

    /// Number of live catalogs, internal included.
    pub fn catalog_count(&self) -> usize {
        self.state.read().by_id.len()
    }

    /// The refresh index, ordered by catalog id.
    pub fn refresh_entries(&self) -> Vec<RefreshEntry> {
        self.state
            .read()
            .refresh
            .iter()
            .map(|(id, secs)| RefreshEntry {
                catalog_id: *id,
                interval_secs: *secs,
            })
            .collect()
    }

    /// Refresh interval scheduled for `id`.
    pub fn refresh_interval(&self, id: CatalogId) -> Option<u64> {
        self.state.read().refresh.get(&id).copied()
    }

    /// Returns true when the name and id indexes describe the same set.
    pub fn indexes_consistent(&self) -> bool {
        let state = self.state.read();
        state.by_id.len() == state.by_name.len()
            && state.by_name.iter().all(|(name, id)| {
                state
                    .by_id
                    .get(id)
                    .map(|c| c.name() == name)
                    .unwrap_or(false)
            })
    }

    // ---------------------------------------------------------------------
    // Leader DDL
    // ---------------------------------------------------------------------

    /// Creates an external catalog. Returns its id, or the id of the existing
    /// catalog when `if_not_exists` is set and the name is taken.
    pub fn create(
        &self,
        req: CreateCatalogRequest,
        if_not_exists: bool,
    ) -> Result<CatalogId, CatalogError> {
        if !req.catalog_type.is_external() {
            return Err(CatalogError::unsupported(
                &req.name,
                "cannot create a catalog of kind internal",
            ));
        }
        property::validate(&req.name, req.catalog_type, &req.properties)?;

        let id = CatalogId::new(self.collab.ids.next_id());
        let now = Timestamp::now();

        let mut state = self.state.write();
        if let Some(existing) = state.lookup(&req.name) {
            if if_not_exists {
                debug!(name = %req.name, "catalog exists, create skipped");
                return Ok(existing.id());
            }
            return Err(CatalogError::AlreadyExists(req.name));
        }
        if state.by_id.contains_key(&id) {
            return Err(inconsistent(id, "allocated id is held by a live catalog"));
        }
        if let Some(resource) = &req.resource {
            if !self.collab.resources.contains(resource) {
                return Err(CatalogError::ResourceNotFound(resource.clone()));
            }
        }

        let mut properties = req.properties;
        properties.insert(
            property::TYPE.to_string(),
            req.catalog_type.as_str().to_string(),
        );
        properties.insert(property::CREATE_TIME.to_string(), now.to_datetime_string());

        let record = CatalogLog {
            catalog_id: id,
            update_time: now,
            op: CatalogOp::Create {
                name: req.name.clone(),
                catalog_type: req.catalog_type,
                comment: req.comment,
                resource: req.resource,
                properties,
            },
        };
        self.apply(&mut state, &record)?;
        self.commit(&record)?;
        info!(node = self.config.node_id, catalog_id = %id, name = %req.name, kind = %req.catalog_type, "catalog created");
        Ok(id)
    }

    /// Drops a catalog by name.
    pub fn drop(&self, name: &str, if_exists: bool) -> Result<(), CatalogError> {
        let mut state = self.state.write();
        let catalog = match state.lookup(name) {
            Some(c) => c.clone(),
            None if if_exists => return Ok(()),
            None => return Err(CatalogError::CatalogNotFound(name.to_string())),
        };
        if catalog.is_internal() {
            return Err(CatalogError::unsupported(name, "the internal catalog cannot be dropped"));
        }

        let record = CatalogLog::new(catalog.id(), CatalogOp::Drop);
        self.apply(&mut state, &record)?;
        self.commit(&record)?;
        info!(node = self.config.node_id, catalog_id = %catalog.id(), name = %name, "catalog dropped");
        Ok(())
    }

    /// Renames a catalog.
    pub fn rename(&self, name: &str, new_name: &str) -> Result<(), CatalogError> {
        let mut state = self.state.write();
        let catalog = state
            .lookup(name)
            .cloned()
            .ok_or_else(|| CatalogError::CatalogNotFound(name.to_string()))?;
        if catalog.is_internal() {
            return Err(CatalogError::unsupported(name, "the internal catalog cannot be renamed"));
        }
        if state.by_name.contains_key(new_name) {
            return Err(CatalogError::AlreadyExists(new_name.to_string()));
        }

        let record = CatalogLog::new(
            catalog.id(),
            CatalogOp::RenameTo {
                new_name: new_name.to_string(),
            },
        );
        self.apply(&mut state, &record)?;
        self.commit(&record)?;
        info!(node = self.config.node_id, catalog_id = %catalog.id(), from = %name, to = %new_name, "catalog renamed");
        Ok(())
    }

    /// Replaces a catalog's comment.
    pub fn set_comment(&self, name: &str, comment: &str) -> Result<(), CatalogError> {
        let mut state = self.state.write();
        let catalog = state
            .lookup(name)
            .cloned()
            .ok_or_else(|| CatalogError::CatalogNotFound(name.to_string()))?;

        let record = CatalogLog::new(
            catalog.id(),
            CatalogOp::SetComment {
                comment: comment.to_string(),
            },
        );
        self.apply(&mut state, &record)?;
        self.commit(&record)?;
        info!(node = self.config.node_id, catalog_id = %catalog.id(), name = %name, "catalog comment changed");
        Ok(())
    }

    /// Merges `props` into a catalog's property map.
    ///
    /// The merged map is validated before anything changes; on failure the
    /// previous map stays in place and no record is written.
    pub fn set_properties(&self, name: &str, props: Properties) -> Result<(), CatalogError> {
        let mut state = self.state.write();
        let catalog = state
            .lookup(name)
            .cloned()
            .ok_or_else(|| CatalogError::CatalogNotFound(name.to_string()))?;
        if catalog.is_internal() {
            return Err(CatalogError::unsupported(
                name,
                "properties of the internal catalog cannot be altered",
            ));
        }
        if let Some(declared) = props.get(property::TYPE) {
            if !declared.eq_ignore_ascii_case(catalog.catalog_type().as_str()) {
                return Err(CatalogError::invalid(name, "the catalog type cannot be changed"));
            }
        }

        let merged = merge(catalog.properties(), &props);
        if let Err(e) = catalog.validate_properties(&merged) {
            warn!(catalog_id = %catalog.id(), name = %name, error = %e, "property update rejected");
            return Err(e);
        }

        let record = CatalogLog::new(catalog.id(), CatalogOp::SetProperties { properties: props });
        self.apply(&mut state, &record)?;
        self.commit(&record)?;
        info!(node = self.config.node_id, catalog_id = %catalog.id(), name = %name, "catalog properties altered");
        Ok(())
    }

    /// Marks an external catalog initialized and replicates the transition.
    pub fn initialize_catalog(&self, name: &str) -> Result<(), CatalogError> {
        let mut state = self.state.write();
        let catalog = state
            .lookup(name)
            .cloned()
            .ok_or_else(|| CatalogError::CatalogNotFound(name.to_string()))?;
        if catalog.lifecycle_state() == LifecycleState::Initialized {
            return Ok(());
        }

        let record = CatalogLog::new(catalog.id(), CatalogOp::Init);
        self.apply(&mut state, &record)?;
        self.commit(&record)?;
        debug!(catalog_id = %catalog.id(), name = %name, "catalog initialized");
        Ok(())
    }

    /// Marks one external database initialized and replicates the
    /// transition. The database must already be registered by events.
    pub fn initialize_database(&self, catalog: &str, db: &str) -> Result<(), CatalogError> {
        let mut state = self.state.write();
        let c = state
            .lookup(catalog)
            .cloned()
            .ok_or_else(|| CatalogError::CatalogNotFound(catalog.to_string()))?;
        let ext = c
            .external_state()
            .ok_or_else(|| CatalogError::unsupported(catalog, "not an external catalog"))?;
        let database = ext.database(db).ok_or_else(|| CatalogError::DatabaseNotFound {
            catalog: catalog.to_string(),
            db: db.to_string(),
        })?;
        if database.is_initialized() {
            return Ok(());
        }

        let record = CatalogLog::new(
            c.id(),
            CatalogOp::InitDb {
                db_id: database.id(),
            },
        );
        self.apply(&mut state, &record)?;
        self.commit(&record)?;
        debug!(catalog_id = %c.id(), db = %db, db_id = database.id(), "external database initialized");
        Ok(())
    }

    fn commit(&self, record: &CatalogLog) -> Result<u64, CatalogError> {
        self.edit_log.append(record).map_err(|e| {
            error!(
                catalog_id = %record.catalog_id,
                op = %record.op.kind(),
                error = %e,
                "edit log append failed after local apply"
            );
            match e {
                CatalogError::ReplicationFailed(_) => e,
                other => CatalogError::ReplicationFailed(other.to_string()),
            }
        })
    }

    // ---------------------------------------------------------------------
    // Replay
    // ---------------------------------------------------------------------

    /// Applies a record received from the edit log.
    pub fn replay(&self, record: &CatalogLog) -> Result<(), CatalogError> {
        let mut state = self.state.write();
        self.apply(&mut state, record)
    }

    fn apply(&self, state: &mut RegistryState, record: &CatalogLog) -> Result<(), CatalogError> {
        debug!(catalog_id = %record.catalog_id, op = %record.op.kind(), "applying catalog log");
        match &record.op {
            CatalogOp::Create {
                name,
                catalog_type,
                comment,
                resource,
                properties,
            } => {
                let catalog = Catalog::external(
                    record.catalog_id,
                    name.clone(),
                    *catalog_type,
                    comment.clone(),
                    resource.clone(),
                    properties.clone(),
                    record.update_time,
                );
                self.replay_create(state, catalog)
            }
            CatalogOp::Drop => self.replay_drop(state, record.catalog_id),
            CatalogOp::RenameTo { new_name } => {
                self.replay_rename(state, record.catalog_id, new_name, record.update_time)
            }
            CatalogOp::SetComment { comment } => {
                self.replay_set_comment(state, record.catalog_id, comment, record.update_time);
                Ok(())
            }
            CatalogOp::SetProperties { properties } => self.replay_set_properties(
                state,
                record.catalog_id,
                properties,
                record.update_time,
            ),
            CatalogOp::Init => {
                self.replay_init(state, record.catalog_id);
                Ok(())
            }
            CatalogOp::InitDb { db_id } => {
                self.replay_init_db(state, record.catalog_id, *db_id);
                Ok(())
            }
        }
    }

    fn replay_create(&self, state: &mut RegistryState, catalog: Catalog) -> Result<(), CatalogError> {
        let id = catalog.id();
        if state.by_id.contains_key(&id) {
            debug!(catalog_id = %id, "catalog already present, create replay skipped");
            return Ok(());
        }
        if id.is_internal() || !catalog.catalog_type().is_external() {
            return Err(inconsistent(id, "create record targets the internal catalog"));
        }
        if let Some(holder) = state.by_name.get(catalog.name()) {
            return Err(inconsistent(
                id,
                format!("name {} is held by catalog {}", catalog.name(), holder),
            ));
        }
        self.attach(state, catalog);
        Ok(())
    }

    fn replay_drop(&self, state: &mut RegistryState, id: CatalogId) -> Result<(), CatalogError> {
        let catalog = match state.by_id.get(&id) {
            Some(c) => c.clone(),
            None => {
                debug!(catalog_id = %id, "catalog absent, drop replay skipped");
                return Ok(());
            }
        };
        if catalog.is_internal() {
            return Err(inconsistent(id, "drop record targets the internal catalog"));
        }
        self.detach(state, &catalog);
        Ok(())
    }

    fn replay_rename(
        &self,
        state: &mut RegistryState,
        id: CatalogId,
        new_name: &str,
        ts: Timestamp,
    ) -> Result<(), CatalogError> {
        let current = match state.by_id.get(&id) {
            Some(c) => c.clone(),
            None => {
                debug!(catalog_id = %id, "catalog absent, rename replay skipped");
                return Ok(());
            }
        };
        if current.is_internal() {
            return Err(inconsistent(id, "rename record targets the internal catalog"));
        }
        if current.name() == new_name {
            return Ok(());
        }
        if let Some(holder) = state.by_name.get(new_name) {
            return Err(inconsistent(
                id,
                format!("name {} is held by catalog {}", new_name, holder),
            ));
        }

        let old_name = current.name().to_string();
        let mut renamed = (*current).clone();
        renamed.set_name(new_name);
        renamed.touch(ts);

        state.by_name.remove(&old_name);
        state.by_id.remove(&id);
        state.by_name.insert(new_name.to_string(), id);
        state.by_id.insert(id, Arc::new(renamed));

        if let Some(resource) = current.resource() {
            if let Err(e) =
                self.collab
                    .resources
                    .remove_reference(resource, &old_name, ReferenceType::Catalog)
            {
                warn!(catalog_id = %id, resource, error = %e, "failed to release resource reference");
            }
            if let Err(e) =
                self.collab
                    .resources
                    .add_reference(resource, new_name, ReferenceType::Catalog)
            {
                warn!(catalog_id = %id, resource, error = %e, "failed to add resource reference");
            }
        }
        self.collab.sessions.rename_catalog(&old_name, new_name);
        Ok(())
    }

    fn replay_set_comment(&self, state: &mut RegistryState, id: CatalogId, comment: &str, ts: Timestamp) {
        let Some(current) = state.by_id.get(&id) else {
            debug!(catalog_id = %id, "catalog absent, comment replay skipped");
            return;
        };
        let mut updated = (**current).clone();
        updated.set_comment(comment);
        updated.touch(ts);
        state.by_id.insert(id, Arc::new(updated));
    }

    fn replay_set_properties(
        &self,
        state: &mut RegistryState,
        id: CatalogId,
        delta: &Properties,
        ts: Timestamp,
    ) -> Result<(), CatalogError> {
        let Some(current) = state.by_id.get(&id) else {
            debug!(catalog_id = %id, "catalog absent, property replay skipped");
            return Ok(());
        };
        if current.is_internal() {
            return Err(inconsistent(id, "property record targets the internal catalog"));
        }
        let mut updated = (**current).clone();
        updated.set_properties(merge(current.properties(), delta));
        updated.touch(ts);

        match updated.refresh_interval_secs() {
            Some(secs) => {
                state.refresh.insert(id, secs);
            }
            None => {
                state.refresh.remove(&id);
            }
        }
        state.by_id.insert(id, Arc::new(updated));
        Ok(())
    }

    fn replay_init(&self, state: &mut RegistryState, id: CatalogId) {
        match state.by_id.get(&id).and_then(|c| c.external_state()) {
            Some(ext) => ext.mark_initialized(),
            None => debug!(catalog_id = %id, "no external catalog, init replay skipped"),
        }
    }

    fn replay_init_db(&self, state: &RegistryState, id: CatalogId, db_id: i64) {
        let database = state
            .by_id
            .get(&id)
            .and_then(|c| c.external_state())
            .and_then(|ext| ext.database_by_id(db_id));
        match database {
            Some(db) => db.mark_initialized(),
            None => debug!(catalog_id = %id, db_id, "database absent, init replay skipped"),
        }
    }

    /// Inserts a catalog into both indexes and registers its side entries.
    pub(crate) fn attach(&self, state: &mut RegistryState, catalog: Catalog) {
        let id = catalog.id();
        if let Some(resource) = catalog.resource() {
            if let Err(e) =
                self.collab
                    .resources
                    .add_reference(resource, catalog.name(), ReferenceType::Catalog)
            {
                warn!(catalog_id = %id, resource, error = %e, "failed to add resource reference");
            }
        }
        if let Some(secs) = catalog.refresh_interval_secs() {
            state.refresh.insert(id, secs);
        }
        state.max_catalog_id = state.max_catalog_id.max(id.as_i64());
        self.collab.ids.ensure_above(id.as_i64());
        state.by_name.insert(catalog.name().to_string(), id);
        state.by_id.insert(id, Arc::new(catalog));
    }

    fn detach(&self, state: &mut RegistryState, catalog: &Catalog) {
        let id = catalog.id();
        state.by_name.remove(catalog.name());
        state.by_id.remove(&id);
        state.refresh.remove(&id);

        catalog.on_close();
        self.collab.meta_cache.remove_cache(id);
        self.collab.query_stats.clear(id);
        self.collab.sessions.remove_last_db_of_catalog(catalog.name());
        if let Some(resource) = catalog.resource() {
            if let Err(e) =
                self.collab
                    .resources
                    .remove_reference(resource, catalog.name(), ReferenceType::Catalog)
            {
                warn!(catalog_id = %id, resource, error = %e, "failed to release resource reference");
            }
        }
    }
}

fn merge(base: &Properties, delta: &Properties) -> Properties {
    let mut merged = base.clone();
    for (k, v) in delta {
        merged.insert(k.clone(), v.clone());
    }
    merged
}

fn inconsistent(id: CatalogId, reason: impl Into<String>) -> CatalogError {
    let reason = reason.into();
    error!(catalog_id = %id, reason = %reason, "inconsistent catalog log replay");
    CatalogError::InconsistentReplay {
        catalog_id: id,
        reason,
    }
}
