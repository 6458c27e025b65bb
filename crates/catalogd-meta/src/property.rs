//! Catalog property keys and per-kind validation.
//!
//! Every catalog carries a flat string map. A handful of keys are interpreted
//! by the registry itself; the rest are checked by the kind-specific predicate
//! before a leader-originated create or alter is committed.

use std::collections::BTreeMap;

use crate::error::CatalogError;
use crate::types::CatalogType;

/// Property map of a catalog, ordered by key.
pub type Properties = BTreeMap<String, String>;

/// Catalog kind, mirrored into the map on create.
pub const TYPE: &str = "type";
/// Interval at which the refresh scheduler reloads external metadata.
pub const METADATA_REFRESH_INTERVAL_SEC: &str = "metadata_refresh_interval_sec";
/// Whether external database/table ids are derived from names.
pub const USE_META_CACHE: &str = "use_meta_cache";
/// Creation time stamped by the leader.
pub const CREATE_TIME: &str = "create_time";

/// Hive metastore thrift endpoints.
pub const HIVE_METASTORE_URIS: &str = "hive.metastore.uris";
/// Iceberg catalog backend.
pub const ICEBERG_CATALOG_TYPE: &str = "iceberg.catalog.type";
/// Iceberg REST endpoint.
pub const ICEBERG_REST_URI: &str = "uri";
/// Warehouse location for filesystem-backed Iceberg catalogs.
pub const WAREHOUSE: &str = "warehouse";
/// JDBC connection URL.
pub const JDBC_URL: &str = "jdbc_url";
/// JDBC user.
pub const JDBC_USER: &str = "user";

/// Value shown instead of a sensitive property.
pub const PASSWORD_MASK: &str = "*XXX";

const SENSITIVE_KEYS: &[&str] = &[
    "password",
    "jdbc.password",
    "s3.secret_key",
    "AWS_SECRET_KEY",
    "glue.secret_key",
    "dlf.secret_key",
    "oss.secret_key",
];

const ICEBERG_BACKENDS: &[&str] = &["rest", "hms", "hadoop", "glue", "dlf"];

/// Returns true when the value of `key` must never be displayed.
pub fn is_sensitive(key: &str) -> bool {
    SENSITIVE_KEYS.contains(&key)
}

/// Returns the refresh interval if the map schedules one.
pub fn refresh_interval(props: &Properties) -> Option<Result<u64, String>> {
    props.get(METADATA_REFRESH_INTERVAL_SEC).map(|v| {
        match v.trim().parse::<u64>() {
            Ok(secs) if secs > 0 => Ok(secs),
            _ => Err(format!(
                "{} must be a positive integer, got '{}'",
                METADATA_REFRESH_INTERVAL_SEC, v
            )),
        }
    })
}

/// Parses the `use_meta_cache` flag, falling back to `default` when unset.
pub fn use_meta_cache(props: &Properties, default: bool) -> Result<bool, String> {
    match props.get(USE_META_CACHE) {
        None => Ok(default),
        Some(v) => match v.trim().to_ascii_lowercase().as_str() {
            "true" => Ok(true),
            "false" => Ok(false),
            _ => Err(format!("{} must be true or false, got '{}'", USE_META_CACHE, v)),
        },
    }
}

/// Checks `props` against the predicate of `catalog_type`.
pub fn validate(catalog: &str, catalog_type: CatalogType, props: &Properties) -> Result<(), CatalogError> {
    if let Some(declared) = props.get(TYPE) {
        if !declared.eq_ignore_ascii_case(catalog_type.as_str()) {
            return Err(CatalogError::invalid(
                catalog,
                format!("type '{}' does not match catalog kind '{}'", declared, catalog_type),
            ));
        }
    }

    if !catalog_type.is_external() {
        return Ok(());
    }

    if let Some(Err(reason)) = refresh_interval(props) {
        return Err(CatalogError::invalid(catalog, reason));
    }
    use_meta_cache(props, true).map_err(|reason| CatalogError::invalid(catalog, reason))?;

    match catalog_type {
        CatalogType::Hms => validate_hms(catalog, props),
        CatalogType::Iceberg => validate_iceberg(catalog, props),
        CatalogType::Jdbc => validate_jdbc(catalog, props),
        CatalogType::Internal => Ok(()),
    }
}

fn required<'a>(catalog: &str, props: &'a Properties, key: &str) -> Result<&'a str, CatalogError> {
    match props.get(key).map(|v| v.trim()) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(CatalogError::invalid(catalog, format!("missing {} property", key))),
    }
}

fn validate_hms(catalog: &str, props: &Properties) -> Result<(), CatalogError> {
    let uris = required(catalog, props, HIVE_METASTORE_URIS)?;
    for uri in uris.split(',').map(str::trim) {
        if !uri.starts_with("thrift://") {
            return Err(CatalogError::invalid(
                catalog,
                format!("{} must be thrift:// addresses, got '{}'", HIVE_METASTORE_URIS, uri),
            ));
        }
    }
    Ok(())
}

fn validate_iceberg(catalog: &str, props: &Properties) -> Result<(), CatalogError> {
    let backend = required(catalog, props, ICEBERG_CATALOG_TYPE)?.to_ascii_lowercase();
    if !ICEBERG_BACKENDS.contains(&backend.as_str()) {
        return Err(CatalogError::invalid(
            catalog,
            format!("unknown {} '{}'", ICEBERG_CATALOG_TYPE, backend),
        ));
    }
    match backend.as_str() {
        "rest" => required(catalog, props, ICEBERG_REST_URI).map(|_| ()),
        "hms" => validate_hms(catalog, props),
        "hadoop" => required(catalog, props, WAREHOUSE).map(|_| ()),
        _ => Ok(()),
    }
}

fn validate_jdbc(catalog: &str, props: &Properties) -> Result<(), CatalogError> {
    required(catalog, props, JDBC_USER)?;
    let url = required(catalog, props, JDBC_URL)?;
    if !url.starts_with("jdbc:") {
        return Err(CatalogError::invalid(
            catalog,
            format!("{} must start with jdbc:, got '{}'", JDBC_URL, url),
        ));
    }
    Ok(())
}

/// Returns a copy of `props` with sensitive values masked.
pub fn printable(props: &Properties) -> Properties {
    props
        .iter()
        .map(|(k, v)| {
            if is_sensitive(k) {
                (k.clone(), PASSWORD_MASK.to_string())
            } else {
                (k.clone(), v.clone())
            }
        })
        .collect()
}
