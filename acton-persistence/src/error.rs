//! Crate-level error type

use thiserror::Error;

use crate::repository::RepositoryError;
use crate::session::PersistenceError;

/// Result type alias using the crate error
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for configuration, setup and data access
///
/// Large error variants are boxed to reduce stack size
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(Box<figment::Error>),

    /// Structured repository error with operation context
    #[error("{0}")]
    Repository(#[from] RepositoryError),

    /// Failure reported by a persistence session
    #[error("{0}")]
    Persistence(#[from] PersistenceError),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Error::Config(Box::new(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::RepositoryOperation;

    #[test]
    fn test_repository_error_converts() {
        let err: Error = RepositoryError::read(RepositoryOperation::Count, "down").into();
        assert!(matches!(err, Error::Repository(_)));
        assert_eq!(err.to_string(), "Repository read error during count: down");
    }

    #[test]
    fn test_persistence_error_converts() {
        let err: Error = PersistenceError::timeout("statement timeout").into();
        assert_eq!(err.to_string(), "Persistence timeout error: statement timeout");
    }
}
