//! Error types for docstore.

use thiserror::Error;

/// Common error type for docstore.
#[derive(Error, Debug)]
pub enum DocstoreError {
    /// Unsafe or malformed caller input, rejected before any I/O.
    #[error("validation error: {0}")]
    Validation(String),

    /// Record or blob absent.
    #[error("{0} not found")]
    NotFound(String),

    /// A blob with the same stored name already exists.
    #[error("{0} already exists")]
    AlreadyExists(String),

    /// A partial read would run past the end of the blob.
    #[error("range out of bounds: {start}+{length} exceeds size {size}")]
    RangeOutOfBounds {
        /// Requested offset.
        start: u64,
        /// Requested length.
        length: u64,
        /// Current blob size.
        size: u64,
    },

    /// The requested byte range cannot be served for a blob of this size.
    #[error("range not satisfiable: {reason} (size {size})")]
    RangeNotSatisfiable {
        /// Why the range was rejected.
        reason: String,
        /// Blob size the range was resolved against.
        size: u64,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Identity assignment failed.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The worker backlog is saturated.
    #[error("overloaded: {0}")]
    Overloaded(String),

    /// Database error.
    ///
    /// Database errors from sqlx are automatically converted.
    #[error("database error: {0}")]
    Database(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// A unit of work panicked or its worker went away.
    #[error("task failed: {0}")]
    TaskFailed(String),
}

// Conversion from sqlx errors
impl From<sqlx::Error> for DocstoreError {
    fn from(e: sqlx::Error) -> Self {
        DocstoreError::Database(e.to_string())
    }
}

/// Result type alias for docstore operations.
pub type Result<T> = std::result::Result<T, DocstoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_display() {
        let err = DocstoreError::Validation("unsafe title".to_string());
        assert_eq!(err.to_string(), "validation error: unsafe title");
    }

    #[test]
    fn test_not_found_error_display() {
        let err = DocstoreError::NotFound("blob".to_string());
        assert_eq!(err.to_string(), "blob not found");
    }

    #[test]
    fn test_range_out_of_bounds_display() {
        let err = DocstoreError::RangeOutOfBounds {
            start: 90,
            length: 20,
            size: 100,
        };
        assert_eq!(
            err.to_string(),
            "range out of bounds: 90+20 exceeds size 100"
        );
    }

    #[test]
    fn test_range_not_satisfiable_display() {
        let err = DocstoreError::RangeNotSatisfiable {
            reason: "start beyond end of file".to_string(),
            size: 100,
        };
        assert_eq!(
            err.to_string(),
            "range not satisfiable: start beyond end of file (size 100)"
        );
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: DocstoreError = io_err.into();
        assert!(matches!(err, DocstoreError::Io(_)));
        assert!(err.to_string().contains("denied"));
    }

    #[test]
    fn test_sqlx_error_conversion() {
        let err: DocstoreError = sqlx::Error::RowNotFound.into();
        assert!(matches!(err, DocstoreError::Database(_)));
    }

    #[test]
    fn test_result_alias() {
        fn sample_ok() -> Result<i32> {
            Ok(42)
        }

        fn sample_err() -> Result<i32> {
            Err(DocstoreError::Overloaded("backlog full".to_string()))
        }

        assert_eq!(sample_ok().unwrap(), 42);
        assert!(sample_err().is_err());
    }
}
