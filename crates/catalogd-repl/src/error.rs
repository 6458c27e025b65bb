//! Error types for the replication channel.

use catalogd_meta::CatalogError;
use thiserror::Error;

/// Errors that can occur while journaling or applying catalog records.
#[derive(Debug, Error)]
pub enum ReplError {
    /// Journal read/write error.
    #[error("journal error: {msg}")]
    Journal {
        /// Error message describing the issue.
        msg: String,
    },

    /// The requested position was compacted away; the follower must resync
    /// from a snapshot.
    #[error("sequence {requested} is no longer retained (oldest is {oldest})")]
    Lagged {
        /// First sequence the follower asked for.
        requested: u64,
        /// Oldest sequence still in the journal.
        oldest: u64,
    },

    /// Delivery skipped a sequence.
    #[error("sequence gap: expected {expected}, got {got}")]
    Gap {
        /// Next sequence the follower expected.
        expected: u64,
        /// Sequence actually delivered.
        got: u64,
    },

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    /// Applying a record to the registry failed.
    #[error("apply failed: {0}")]
    Apply(#[from] CatalogError),

    /// The journal was closed.
    #[error("edit journal shut down")]
    Shutdown,
}

impl From<ReplError> for CatalogError {
    fn from(e: ReplError) -> Self {
        match e {
            ReplError::Apply(inner) => inner,
            ReplError::Serialization(inner) => CatalogError::Codec(inner.to_string()),
            other => CatalogError::ReplicationFailed(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ReplError::Lagged {
            requested: 3,
            oldest: 10,
        };
        assert_eq!(
            err.to_string(),
            "sequence 3 is no longer retained (oldest is 10)"
        );
        assert_eq!(ReplError::Shutdown.to_string(), "edit journal shut down");
    }

    #[test]
    fn test_into_catalog_error() {
        let e: CatalogError = ReplError::Shutdown.into();
        assert!(matches!(e, CatalogError::ReplicationFailed(_)));

        let e: CatalogError =
            ReplError::Apply(CatalogError::CatalogNotFound("x".to_string())).into();
        assert!(matches!(e, CatalogError::CatalogNotFound(_)));
    }
}
