//! Identifiers, timestamps and catalog kinds.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CatalogError;

/// Name of the reserved internal catalog.
pub const INTERNAL_CATALOG_NAME: &str = "internal";

/// External id value meaning "already known to be deleted downstream".
pub const META_ID_FOR_NOT_EXISTS: i64 = -1;

/// Represents a unique identifier for a catalog in the registry
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CatalogId(i64);

impl CatalogId {
    /// The reserved internal catalog ID (always 0)
    pub const INTERNAL: CatalogId = CatalogId(0);

    /// Creates a new CatalogId from a raw i64 value
    pub fn new(id: i64) -> Self {
        CatalogId(id)
    }

    /// Returns the raw i64 value of this catalog ID
    pub fn as_i64(&self) -> i64 {
        self.0
    }

    /// Returns true if this is the reserved internal catalog ID
    pub fn is_internal(&self) -> bool {
        *self == Self::INTERNAL
    }
}

impl fmt::Display for CatalogId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Represents a point in time with millisecond precision
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(u64);

impl Timestamp {
    /// The Unix epoch
    pub const EPOCH: Timestamp = Timestamp(0);

    /// Returns the current timestamp
    pub fn now() -> Self {
        let millis = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        Timestamp(millis)
    }

    /// Creates a timestamp from milliseconds since the Unix epoch
    pub fn from_millis(millis: u64) -> Self {
        Timestamp(millis)
    }

    /// Returns milliseconds since the Unix epoch
    pub fn as_millis(&self) -> u64 {
        self.0
    }

    /// Formats the timestamp as `YYYY-MM-DD HH:MM:SS` in UTC.
    pub fn to_datetime_string(&self) -> String {
        chrono::DateTime::<chrono::Utc>::from_timestamp_millis(self.0 as i64)
            .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| "NULL".to_string())
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The kind of a catalog. Immutable once the catalog is created.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CatalogType {
    /// The engine's own storage catalog
    Internal,
    /// Hive-metastore-backed external catalog
    Hms,
    /// Iceberg external catalog
    Iceberg,
    /// JDBC-federated external catalog
    Jdbc,
}

impl CatalogType {
    /// Returns the value stored under the `type` property
    pub fn as_str(&self) -> &'static str {
        match self {
            CatalogType::Internal => "internal",
            CatalogType::Hms => "hms",
            CatalogType::Iceberg => "iceberg",
            CatalogType::Jdbc => "jdbc",
        }
    }

    /// Returns true for every kind backed by a third-party metadata source
    pub fn is_external(&self) -> bool {
        !matches!(self, CatalogType::Internal)
    }
}

impl fmt::Display for CatalogType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CatalogType {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "internal" => Ok(CatalogType::Internal),
            "hms" => Ok(CatalogType::Hms),
            "iceberg" => Ok(CatalogType::Iceberg),
            "jdbc" => Ok(CatalogType::Jdbc),
            other => Err(CatalogError::ValidationFailed {
                catalog: String::new(),
                reason: format!("unknown catalog type '{}'", other),
            }),
        }
    }
}

/// Initialization state of an external catalog
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LifecycleState {
    /// Registered, no metadata loaded from the source yet
    Uninitialized,
    /// Metadata has been accessed at least once
    Initialized,
}

/// Derived refresh schedule entry read by the refresh scheduler
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshEntry {
    /// Catalog to refresh
    pub catalog_id: CatalogId,
    /// Refresh interval in seconds
    pub interval_secs: u64,
}

/// Derives a stable, non-negative id from a sequence of names.
///
/// Used for external databases and tables when the catalog runs in
/// meta-cache mode. Never returns [`META_ID_FOR_NOT_EXISTS`].
pub fn gen_id_by_name(names: &[&str]) -> i64 {
    let mut hasher = blake3::Hasher::new();
    for name in names {
        hasher.update(name.as_bytes());
        hasher.update(&[0u8]);
    }
    let digest = hasher.finalize();
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest.as_bytes()[..8]);
    (u64::from_le_bytes(prefix) & i64::MAX as u64) as i64
}
