use thiserror::Error;

/// Main error type for the UBKG query engine
#[derive(Error, Debug)]
pub enum UbkgError {
    /// A relationship filter token is not of the form `Type[SAB]`
    #[error("Malformed relationship filter '{token}': {reason}")]
    MalformedFilter { token: String, reason: String },

    /// Request rejected before any query ran (depth bound, missing target)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The store reported a failure while executing a composed query
    #[error("Query execution failed: {0}")]
    TraversalExecution(String),

    /// A session against the store could not be obtained
    #[error("Store connectivity error: {0}")]
    StoreConnectivity(String),

    /// Database-related errors outside of query sessions (migrations, fixtures)
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// File system I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),
}

impl UbkgError {
    pub(crate) fn malformed(token: &str, reason: impl Into<String>) -> Self {
        UbkgError::MalformedFilter {
            token: token.to_string(),
            reason: reason.into(),
        }
    }

    /// True for errors caused by the caller's input (400-equivalent at the boundary).
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            UbkgError::MalformedFilter { .. } | UbkgError::InvalidRequest(_)
        )
    }
}

/// Convenient Result type using UbkgError
pub type Result<T> = std::result::Result<T, UbkgError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = UbkgError::Config("Test error".to_string());
        assert!(err.to_string().contains("Configuration error"));
        assert!(err.to_string().contains("Test error"));
    }

    #[test]
    fn test_malformed_filter_names_token() {
        let err = UbkgError::malformed("isa[", "missing closing bracket");
        assert!(err.to_string().contains("'isa['"));
        assert!(err.to_string().contains("missing closing bracket"));
        assert!(err.is_client_error());
    }

    #[test]
    fn test_execution_errors_are_not_client_errors() {
        assert!(!UbkgError::TraversalExecution("boom".into()).is_client_error());
        assert!(!UbkgError::StoreConnectivity("down".into()).is_client_error());
        assert!(UbkgError::InvalidRequest("depth".into()).is_client_error());
    }

    #[test]
    fn test_error_from_rusqlite() {
        let rusqlite_err = rusqlite::Error::InvalidQuery;
        let err: UbkgError = rusqlite_err.into();
        assert!(matches!(err, UbkgError::Database(_)));
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: UbkgError = io_err.into();
        assert!(matches!(err, UbkgError::Io(_)));
    }
}
