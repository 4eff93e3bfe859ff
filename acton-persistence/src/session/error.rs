//! Failures reported by a persistence session

use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

use thiserror::Error;

/// Category of persistence failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PersistenceErrorKind {
    /// Uniqueness, foreign key or not-null violation
    ConstraintViolation,
    /// Stale optimistic-lock version
    OptimisticLock,
    /// Named entity graph is not registered
    EntityGraphNotFound,
    /// Entity is not known to the session
    EntityNotManaged,
    /// A single-result query produced more than one row
    NonUniqueResult,
    /// Query could not be executed
    QueryFailed,
    /// Backend unreachable
    ConnectionFailed,
    /// Statement timed out
    Timeout,
    /// Other/unknown error
    Other,
}

impl fmt::Display for PersistenceErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConstraintViolation => write!(f, "constraint_violation"),
            Self::OptimisticLock => write!(f, "optimistic_lock"),
            Self::EntityGraphNotFound => write!(f, "entity_graph_not_found"),
            Self::EntityNotManaged => write!(f, "entity_not_managed"),
            Self::NonUniqueResult => write!(f, "non_unique_result"),
            Self::QueryFailed => write!(f, "query_failed"),
            Self::ConnectionFailed => write!(f, "connection_failed"),
            Self::Timeout => write!(f, "timeout"),
            Self::Other => write!(f, "other"),
        }
    }
}

/// Message reported by the database driver itself
///
/// Engines attach it as the source of a [`PersistenceError`] so the root
/// cause survives translation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct DriverError {
    /// Vendor error code (e.g. SQLSTATE `23505`)
    pub code: Option<String>,
    /// Raw driver message, possibly multi-line
    pub message: String,
}

impl DriverError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: Some(code.into()),
            message: message.into(),
        }
    }
}

/// Structured persistence failure with an optional cause chain
#[derive(Debug, Clone)]
pub struct PersistenceError {
    /// The category of error
    pub kind: PersistenceErrorKind,
    /// Human-readable error message
    pub message: String,
    source: Option<Arc<dyn StdError + Send + Sync>>,
}

impl PersistenceError {
    pub fn new(kind: PersistenceErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    /// Constraint violation caused by a driver error
    pub fn constraint_violation(message: impl Into<String>, driver: DriverError) -> Self {
        Self::new(PersistenceErrorKind::ConstraintViolation, message).with_source(driver)
    }

    /// Stale version detected on update
    pub fn optimistic_lock(message: impl Into<String>) -> Self {
        Self::new(PersistenceErrorKind::OptimisticLock, message)
    }

    /// Entity graph lookup failed
    pub fn entity_graph_not_found(name: &str) -> Self {
        Self::new(
            PersistenceErrorKind::EntityGraphNotFound,
            format!("entity graph '{}' is not registered", name),
        )
    }

    pub fn not_managed(message: impl Into<String>) -> Self {
        Self::new(PersistenceErrorKind::EntityNotManaged, message)
    }

    pub fn query_failed(message: impl Into<String>) -> Self {
        Self::new(PersistenceErrorKind::QueryFailed, message)
    }

    pub fn connection_failed(message: impl Into<String>) -> Self {
        Self::new(PersistenceErrorKind::ConnectionFailed, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(PersistenceErrorKind::Timeout, message)
    }

    /// Attach the underlying cause
    #[must_use]
    pub fn with_source(mut self, source: impl StdError + Send + Sync + 'static) -> Self {
        self.source = Some(Arc::new(source));
        self
    }

    /// Whether this is a uniqueness/referential-integrity or stale-version failure
    pub fn is_integrity_violation(&self) -> bool {
        matches!(
            self.kind,
            PersistenceErrorKind::ConstraintViolation | PersistenceErrorKind::OptimisticLock
        )
    }

    /// Check if this error is retriable (transient errors that may succeed on retry)
    pub fn is_retriable(&self) -> bool {
        matches!(
            self.kind,
            PersistenceErrorKind::ConnectionFailed | PersistenceErrorKind::Timeout
        )
    }
}

impl fmt::Display for PersistenceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Persistence {} error: {}", self.kind, self.message)
    }
}

impl StdError for PersistenceError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_deref()
            .map(|source| source as &(dyn StdError + 'static))
    }
}

/// Result type for session operations
pub type PersistenceResult<T> = std::result::Result<T, PersistenceError>;
