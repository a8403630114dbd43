use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::storage::StorageError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Listing versions of bucket {bucket} (prefix {prefix:?}) failed: {source}")]
    Listing {
        bucket: String,
        prefix: Option<String>,
        #[source]
        source: StorageError,
    },

    #[error("Restoring {key} to {reference} failed (version {version_id:?}): {source}")]
    Mutation {
        key: String,
        version_id: Option<String>,
        reference: DateTime<Utc>,
        #[source]
        source: StorageError,
    },

    #[error("Operation cancelled: {0}")]
    Cancelled(String),
}

impl AppError {
    /// Whether the run stopped because the cancellation token fired rather
    /// than because the backend rejected a call.
    pub fn is_cancelled(&self) -> bool {
        match self {
            AppError::Cancelled(_) => true,
            AppError::Listing { source, .. } | AppError::Mutation { source, .. } => {
                matches!(source, StorageError::Cancelled)
            }
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_listing_error_carries_bucket_and_prefix() {
        let err = AppError::Listing {
            bucket: "photos".to_string(),
            prefix: Some("2023/".to_string()),
            source: StorageError::Sdk("AccessDenied".to_string()),
        };
        let message = err.to_string();
        assert!(message.contains("photos"));
        assert!(message.contains("2023/"));
        assert!(message.contains("AccessDenied"));
        assert!(!err.is_cancelled());
    }

    #[test]
    fn test_cancelled_storage_call_counts_as_cancellation() {
        let err = AppError::Mutation {
            key: "a.txt".to_string(),
            version_id: Some("v1".to_string()),
            reference: Utc::now(),
            source: StorageError::Cancelled,
        };
        assert!(err.is_cancelled());
        assert!(AppError::Cancelled("ctrl-c".to_string()).is_cancelled());
        assert!(!AppError::Config("bad".to_string()).is_cancelled());
    }
}
