//! External metadata event ingestion.
//!
//! Source systems notify the registry when databases, tables or partitions
//! appear or disappear upstream. Events race with local drops, so every
//! handler tolerates targets that are already gone when `ignore_if_missing`
//! is set. Database and table maps are mutated under their own locks; the
//! registry lock is only held long enough to resolve the catalog.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::catalog::{Catalog, ExternalCatalog, ExternalDatabase, ExternalTable};
use crate::error::CatalogError;
use crate::registry::CatalogRegistry;
use crate::types::{gen_id_by_name, CatalogId, CatalogType, Timestamp, META_ID_FOR_NOT_EXISTS};

impl CatalogRegistry {
    /// Registers a database that appeared upstream.
    pub fn register_external_database(
        &self,
        catalog: &str,
        db: &str,
        ignore_if_missing: bool,
    ) -> Result<(), CatalogError> {
        let Some((c, ext)) = self.resolve_external(catalog, ignore_if_missing)? else {
            return Ok(());
        };
        if ext.database(db).is_some() {
            debug!(catalog = %catalog, db = %db, "database already registered");
            return Ok(());
        }
        let id = self.external_db_id(&c, db);
        if id == META_ID_FOR_NOT_EXISTS {
            debug!(catalog = %catalog, db = %db, "database gone upstream, register skipped");
            return Ok(());
        }
        if ext.register_database(ExternalDatabase::new(id, db)) {
            debug!(catalog = %catalog, db = %db, db_id = id, "external database registered");
        }
        Ok(())
    }

    /// Removes a database that disappeared upstream.
    pub fn unregister_external_database(
        &self,
        catalog: &str,
        db: &str,
        ignore_if_missing: bool,
    ) -> Result<(), CatalogError> {
        let Some((_, ext)) = self.resolve_external(catalog, ignore_if_missing)? else {
            return Ok(());
        };
        match ext.unregister_database(db) {
            Some(removed) => {
                debug!(catalog = %catalog, db = %db, tables = removed.table_count(), "external database unregistered");
                Ok(())
            }
            None if ignore_if_missing => Ok(()),
            None => Err(CatalogError::DatabaseNotFound {
                catalog: catalog.to_string(),
                db: db.to_string(),
            }),
        }
    }

    /// Registers a table that appeared upstream. Re-registering an existing
    /// table only advances its update time.
    pub fn register_external_table(
        &self,
        catalog: &str,
        db: &str,
        table: &str,
        update_time: Timestamp,
        ignore_if_missing: bool,
    ) -> Result<(), CatalogError> {
        let Some((c, ext)) = self.resolve_external(catalog, ignore_if_missing)? else {
            return Ok(());
        };
        let Some(database) = resolve_db(&ext, catalog, db, ignore_if_missing)? else {
            return Ok(());
        };

        let mut tables = database.tables().write();
        if ext.is_closed() {
            return Ok(());
        }
        if let Some(existing) = tables.get_mut(table) {
            if update_time > existing.update_time {
                existing.update_time = update_time;
            }
            return Ok(());
        }
        let id = self.external_table_id(&c, db, table);
        if id == META_ID_FOR_NOT_EXISTS {
            debug!(catalog = %catalog, db = %db, table = %table, "table gone upstream, register skipped");
            return Ok(());
        }
        tables.insert(
            table.to_string(),
            ExternalTable {
                id,
                name: table.to_string(),
                update_time,
            },
        );
        debug!(catalog = %catalog, db = %db, table = %table, table_id = id, "external table registered");
        Ok(())
    }

    /// Removes a table that disappeared upstream.
    pub fn unregister_external_table(
        &self,
        catalog: &str,
        db: &str,
        table: &str,
        ignore_if_missing: bool,
    ) -> Result<(), CatalogError> {
        let Some((_, ext)) = self.resolve_external(catalog, ignore_if_missing)? else {
            return Ok(());
        };
        let Some(database) = resolve_db(&ext, catalog, db, ignore_if_missing)? else {
            return Ok(());
        };

        let mut tables = database.tables().write();
        match tables.remove(table) {
            Some(_) => {
                debug!(catalog = %catalog, db = %db, table = %table, "external table unregistered");
                Ok(())
            }
            None if ignore_if_missing => Ok(()),
            None => Err(CatalogError::TableNotFound {
                db: db.to_string(),
                table: table.to_string(),
            }),
        }
    }

    /// Forwards new partitions of a Hive table to the meta cache.
    pub fn add_external_partitions(
        &self,
        catalog: &str,
        db: &str,
        table: &str,
        partitions: &[String],
        update_time: Timestamp,
        ignore_if_missing: bool,
    ) -> Result<(), CatalogError> {
        self.apply_partition_event(catalog, db, table, partitions, update_time, ignore_if_missing, true)
    }

    /// Forwards dropped partitions of a Hive table to the meta cache.
    pub fn drop_external_partitions(
        &self,
        catalog: &str,
        db: &str,
        table: &str,
        partitions: &[String],
        update_time: Timestamp,
        ignore_if_missing: bool,
    ) -> Result<(), CatalogError> {
        self.apply_partition_event(catalog, db, table, partitions, update_time, ignore_if_missing, false)
    }

    /// Returns true if `db.table` is registered locally under `catalog`.
    pub fn external_table_exists_locally(
        &self,
        catalog: &str,
        db: &str,
        table: &str,
    ) -> Result<bool, CatalogError> {
        let Some((_, ext)) = self.resolve_external(catalog, false)? else {
            return Ok(false);
        };
        Ok(ext
            .database(db)
            .map(|d| d.table(table).is_some())
            .unwrap_or(false))
    }

    /// Finds a registered external database by id across all catalogs.
    pub fn find_database(&self, db_id: i64) -> Option<(CatalogId, Arc<ExternalDatabase>)> {
        self.list().into_iter().find_map(|c| {
            c.external_state()
                .and_then(|ext| ext.database_by_id(db_id))
                .map(|db| (c.id(), db))
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn apply_partition_event(
        &self,
        catalog: &str,
        db: &str,
        table: &str,
        partitions: &[String],
        update_time: Timestamp,
        ignore_if_missing: bool,
        add: bool,
    ) -> Result<(), CatalogError> {
        let Some((c, ext)) = self.resolve_external(catalog, ignore_if_missing)? else {
            return Ok(());
        };
        let Some(database) = resolve_db(&ext, catalog, db, ignore_if_missing)? else {
            return Ok(());
        };

        let mut tables = database.tables().write();
        if ext.is_closed() {
            debug!(catalog = %catalog, table = %table, "catalog dropped, partition event skipped");
            return Ok(());
        }
        let Some(entry) = tables.get_mut(table) else {
            if ignore_if_missing {
                return Ok(());
            }
            return Err(CatalogError::TableNotFound {
                db: db.to_string(),
                table: table.to_string(),
            });
        };
        if c.catalog_type() != CatalogType::Hms {
            warn!(
                catalog = %catalog,
                kind = %c.catalog_type(),
                table = %table,
                "partition events only apply to hive tables, ignored"
            );
            return Ok(());
        }

        if add {
            self.collab.meta_cache.add_partitions(c.id(), db, table, partitions);
        } else {
            self.collab.meta_cache.drop_partitions(c.id(), db, table, partitions);
        }
        if update_time > entry.update_time {
            entry.update_time = update_time;
        }
        debug!(
            catalog = %catalog,
            db = %db,
            table = %table,
            partitions = partitions.len(),
            add,
            "partition event applied"
        );
        Ok(())
    }

    fn resolve_external(
        &self,
        catalog: &str,
        ignore_if_missing: bool,
    ) -> Result<Option<(Arc<Catalog>, Arc<ExternalCatalog>)>, CatalogError> {
        let c = match self.catalog_by_name(catalog) {
            Ok(c) => c,
            Err(_) if ignore_if_missing => return Ok(None),
            Err(e) => return Err(e),
        };
        let ext = c
            .external_state()
            .cloned()
            .ok_or_else(|| CatalogError::unsupported(catalog, "not an external catalog"))?;
        Ok(Some((c, ext)))
    }

    fn external_db_id(&self, catalog: &Catalog, db: &str) -> i64 {
        if catalog.use_meta_cache(self.config.default_use_meta_cache) {
            gen_id_by_name(&[catalog.name(), db])
        } else {
            self.collab.id_mapper.db_id(catalog.id(), db)
        }
    }

    fn external_table_id(&self, catalog: &Catalog, db: &str, table: &str) -> i64 {
        if catalog.use_meta_cache(self.config.default_use_meta_cache) {
            gen_id_by_name(&[catalog.name(), db, table])
        } else {
            self.collab.id_mapper.table_id(catalog.id(), db, table)
        }
    }
}

fn resolve_db(
    ext: &ExternalCatalog,
    catalog: &str,
    db: &str,
    ignore_if_missing: bool,
) -> Result<Option<Arc<ExternalDatabase>>, CatalogError> {
    match ext.database(db) {
        Some(d) => Ok(Some(d)),
        None if ignore_if_missing => Ok(None),
        None => Err(CatalogError::DatabaseNotFound {
            catalog: catalog.to_string(),
            db: db.to_string(),
        }),
    }
}
