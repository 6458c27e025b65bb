//! Error types for catalog registry operations.

use thiserror::Error;

use crate::types::CatalogId;

/// Errors returned by the catalog registry and its collaborators.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// No live catalog has the given name.
    #[error("no catalog found with name: {0}")]
    CatalogNotFound(String),

    /// No live catalog has the given id.
    #[error("no catalog found with id: {0}")]
    CatalogIdNotFound(CatalogId),

    /// The database is not registered under the catalog.
    #[error("database {db} does not exist in catalog {catalog}")]
    DatabaseNotFound {
        /// Catalog name
        catalog: String,
        /// Database name
        db: String,
    },

    /// The table is not registered under the database.
    #[error("table {table} does not exist in db {db}")]
    TableNotFound {
        /// Database name
        db: String,
        /// Table name
        table: String,
    },

    /// The named shared resource is unknown to the resource tracker.
    #[error("resource {0} does not exist")]
    ResourceNotFound(String),

    /// A live catalog already holds the name.
    #[error("catalog had already exist with name: {0}")]
    AlreadyExists(String),

    /// The catalog kind's property check rejected the property map.
    #[error("invalid properties for catalog {catalog}: {reason}")]
    ValidationFailed {
        /// Catalog name
        catalog: String,
        /// Why the properties were rejected
        reason: String,
    },

    /// The operation is not valid for this catalog kind.
    #[error("unsupported operation on catalog {catalog}: {reason}")]
    Unsupported {
        /// Catalog name
        catalog: String,
        /// What was attempted
        reason: String,
    },

    /// The identity lacks the privilege on the catalog.
    #[error("access denied for user {identity} to catalog {catalog}")]
    AccessDenied {
        /// Requesting identity
        identity: String,
        /// Catalog name
        catalog: String,
    },

    /// The local mutation was applied but the replication channel did not accept the record.
    #[error("replication failed: {0}")]
    ReplicationFailed(String),

    /// A replayed record contradicts the local state in a way well-formed logs never do.
    #[error("inconsistent replay for catalog {catalog_id}: {reason}")]
    InconsistentReplay {
        /// Catalog the record targets
        catalog_id: CatalogId,
        /// What did not line up
        reason: String,
    },

    /// A record or snapshot could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(String),

    /// A lower-level I/O error occurred.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CatalogError {
    /// Returns true for every "does not exist" flavour of error.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            CatalogError::CatalogNotFound(_)
                | CatalogError::CatalogIdNotFound(_)
                | CatalogError::DatabaseNotFound { .. }
                | CatalogError::TableNotFound { .. }
                | CatalogError::ResourceNotFound(_)
        )
    }

    pub(crate) fn unsupported(catalog: &str, reason: impl Into<String>) -> Self {
        CatalogError::Unsupported {
            catalog: catalog.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid(catalog: &str, reason: impl Into<String>) -> Self {
        CatalogError::ValidationFailed {
            catalog: catalog.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<bincode::Error> for CatalogError {
    fn from(e: bincode::Error) -> Self {
        CatalogError::Codec(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CatalogError::CatalogNotFound("hive1".to_string());
        assert_eq!(format!("{}", err), "no catalog found with name: hive1");

        let err = CatalogError::DatabaseNotFound {
            catalog: "hive1".to_string(),
            db: "db1".to_string(),
        };
        assert_eq!(
            format!("{}", err),
            "database db1 does not exist in catalog hive1"
        );
    }

    #[test]
    fn test_is_not_found() {
        assert!(CatalogError::CatalogIdNotFound(CatalogId::new(7)).is_not_found());
        assert!(CatalogError::ResourceNotFound("s3".to_string()).is_not_found());
        assert!(!CatalogError::AlreadyExists("x".to_string()).is_not_found());
        assert!(!CatalogError::unsupported("internal", "drop").is_not_found());
    }
}
