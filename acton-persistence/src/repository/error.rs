//! Repository error types
//!
//! Every public repository operation reports failures as a [`RepositoryError`]:
//! the operation that failed, a [`RepositoryErrorKind`] and structured context
//! (entity name, ids, page, graph, constraint message). Backend error types
//! stay behind [`std::error::Error::source`]; callers never have to parse the
//! message to react.
//!
//! # Example
//!
//! ```rust
//! use acton_persistence::repository::{RepositoryError, RepositoryErrorKind, RepositoryOperation};
//!
//! let error = RepositoryError::constraint(
//!     RepositoryOperation::Create,
//!     "duplicate key value violates unique constraint \"user_email_key\"",
//! )
//! .with_entity("User");
//! assert!(error.is_constraint());
//! assert_eq!(error.entity_type.as_deref(), Some("User"));
//! ```

use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use super::paged::Page;
use crate::session::PersistenceError;

/// Operation being performed when the repository error occurred
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RepositoryOperation {
    /// Reading every entity
    FindAll,
    /// Finding a single entity by ID
    FindById,
    /// Finding a single entity by business ID
    FindByBid,
    /// Finding entities by a set of IDs
    FindByIds,
    /// Reading an interval of all entities
    FindRange,
    /// Reading entities matching a caller-built query
    FindMatching,
    /// Reading entities matching a textual condition
    TextQuery,
    /// Executing a named query
    NamedQuery,
    /// Counting entities
    Count,
    /// Checking if an entity exists
    Exists,
    /// Reading every entity with its load graph
    LoadAll,
    /// Loading a single entity with its load graph
    LoadById,
    /// Loading entities by IDs with their load graph
    LoadByIds,
    /// Persisting new entities
    Create,
    /// Merging existing entities
    Update,
    /// Removing entities
    Delete,
    /// Bulk delete of one ID
    DeleteById,
    /// Bulk delete of a set of IDs
    DeleteByIds,
    /// Loading then removing every entity
    DeleteAll,
    /// Unconditional bulk delete statement
    DeleteAllByQuery,
    /// Bulk update statement
    UpdateByQuery,
    /// Applying a lock mode
    Lock,
    /// Reloading entity state
    Refresh,
    /// Executing a page of a paged query
    PageResult,
    /// Deriving the count query of a paged query
    DeriveCountQuery,
}

impl fmt::Display for RepositoryOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FindAll => write!(f, "find_all"),
            Self::FindById => write!(f, "find_by_id"),
            Self::FindByBid => write!(f, "find_by_bid"),
            Self::FindByIds => write!(f, "find_by_ids"),
            Self::FindRange => write!(f, "find_range"),
            Self::FindMatching => write!(f, "find_matching"),
            Self::TextQuery => write!(f, "text_query"),
            Self::NamedQuery => write!(f, "named_query"),
            Self::Count => write!(f, "count"),
            Self::Exists => write!(f, "exists"),
            Self::LoadAll => write!(f, "load_all"),
            Self::LoadById => write!(f, "load_by_id"),
            Self::LoadByIds => write!(f, "load_by_ids"),
            Self::Create => write!(f, "create"),
            Self::Update => write!(f, "update"),
            Self::Delete => write!(f, "delete"),
            Self::DeleteById => write!(f, "delete_by_id"),
            Self::DeleteByIds => write!(f, "delete_by_ids"),
            Self::DeleteAll => write!(f, "delete_all"),
            Self::DeleteAllByQuery => write!(f, "delete_all_by_query"),
            Self::UpdateByQuery => write!(f, "update_by_query"),
            Self::Lock => write!(f, "lock"),
            Self::Refresh => write!(f, "refresh"),
            Self::PageResult => write!(f, "page_result"),
            Self::DeriveCountQuery => write!(f, "derive_count_query"),
        }
    }
}

/// Category of repository error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RepositoryErrorKind {
    /// A find, load or count could not complete
    Read,
    /// Uniqueness, referential-integrity or stale-version conflict
    Constraint,
    /// Any other persist, merge, remove or bulk-delete failure
    Mutation,
    /// The query cannot be counted (caller/programming error)
    QueryShape,
    /// A page of a paged query could not be produced
    PageQuery,
}

impl fmt::Display for RepositoryErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Read => write!(f, "read"),
            Self::Constraint => write!(f, "constraint"),
            Self::Mutation => write!(f, "mutation"),
            Self::QueryShape => write!(f, "query_shape"),
            Self::PageQuery => write!(f, "page_query"),
        }
    }
}

/// Structured repository error with operation context
#[derive(Debug, Clone)]
pub struct RepositoryError {
    /// The operation being performed when the error occurred
    pub operation: RepositoryOperation,
    /// The category of error
    pub kind: RepositoryErrorKind,
    /// Human-readable error message
    pub message: String,
    /// The entity name involved (e.g., "User", "Order")
    pub entity_type: Option<String>,
    /// The IDs the operation was asked for
    pub entity_ids: Vec<String>,
    /// The page being produced
    pub page: Option<Page>,
    /// The entity graph applied
    pub graph: Option<String>,
    /// Best-effort driver message of a constraint violation
    pub constraint_message: Option<String>,
    source: Option<Arc<dyn StdError + Send + Sync>>,
}

impl RepositoryError {
    /// Create a new repository error
    pub fn new(
        operation: RepositoryOperation,
        kind: RepositoryErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            operation,
            kind,
            message: message.into(),
            entity_type: None,
            entity_ids: Vec::new(),
            page: None,
            graph: None,
            constraint_message: None,
            source: None,
        }
    }

    /// Create a read failure
    pub fn read(operation: RepositoryOperation, message: impl Into<String>) -> Self {
        Self::new(operation, RepositoryErrorKind::Read, message)
    }

    /// Create a constraint error carrying the driver message
    pub fn constraint(operation: RepositoryOperation, constraint_message: impl Into<String>) -> Self {
        let constraint_message = constraint_message.into();
        let mut error = Self::new(
            operation,
            RepositoryErrorKind::Constraint,
            format!("Constraint violation: {}", constraint_message),
        );
        error.constraint_message = Some(constraint_message);
        error
    }

    /// Create a generic mutation failure
    pub fn mutation(operation: RepositoryOperation, message: impl Into<String>) -> Self {
        Self::new(operation, RepositoryErrorKind::Mutation, message)
    }

    /// Create a query-shape failure
    pub fn query_shape(message: impl Into<String>) -> Self {
        Self::new(
            RepositoryOperation::DeriveCountQuery,
            RepositoryErrorKind::QueryShape,
            message,
        )
    }

    /// Create a page failure for `page` of a query over `entity_type`
    pub fn page_query(page: Page, entity_type: impl Into<String>) -> Self {
        let entity_type = entity_type.into();
        let mut error = Self::new(
            RepositoryOperation::PageResult,
            RepositoryErrorKind::PageQuery,
            format!(
                "Failed to get page {} (size {}) of {}",
                page.number(), page.size(), entity_type
            ),
        );
        error.page = Some(page);
        error.entity_type = Some(entity_type);
        error
    }

    /// Add the entity name
    #[must_use]
    pub fn with_entity(mut self, entity_type: impl Into<String>) -> Self {
        self.entity_type = Some(entity_type.into());
        self
    }

    /// Add the IDs the operation was asked for
    #[must_use]
    pub fn with_ids<I, T>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: fmt::Display,
    {
        self.entity_ids = ids.into_iter().map(|id| id.to_string()).collect();
        self
    }

    /// Add the page being produced
    #[must_use]
    pub fn with_page(mut self, page: Page) -> Self {
        self.page = Some(page);
        self
    }

    /// Add the entity graph name
    #[must_use]
    pub fn with_graph(mut self, graph: impl Into<String>) -> Self {
        self.graph = Some(graph.into());
        self
    }

    /// Attach the underlying cause
    #[must_use]
    pub fn with_source(mut self, source: impl StdError + Send + Sync + 'static) -> Self {
        self.source = Some(Arc::new(source));
        self
    }

    /// Attach an already shared cause
    #[must_use]
    pub(crate) fn with_shared_source(mut self, source: Arc<dyn StdError + Send + Sync>) -> Self {
        self.source = Some(source);
        self
    }

    /// Set the operation that caused the error
    #[must_use]
    pub fn with_operation(mut self, operation: RepositoryOperation) -> Self {
        self.operation = operation;
        self
    }

    /// Whether this is a constraint error (map to a "conflict" response)
    pub fn is_constraint(&self) -> bool {
        self.kind == RepositoryErrorKind::Constraint
    }

    /// Check if this error is retriable (transient errors that may succeed on retry)
    ///
    /// Nothing is retried internally; this only reports whether the
    /// underlying persistence failure was transient.
    pub fn is_retriable(&self) -> bool {
        let mut current: Option<&(dyn StdError + 'static)> = self.source();
        while let Some(error) = current {
            if let Some(persistence) = error.downcast_ref::<PersistenceError>() {
                if persistence.is_retriable() {
                    return true;
                }
            }
            current = error.source();
        }
        false
    }

    /// Structured, serializable diagnostic context
    pub fn context(&self) -> ErrorContext<'_> {
        ErrorContext {
            operation: self.operation.to_string(),
            kind: self.kind.to_string(),
            entity_type: self.entity_type.as_deref(),
            entity_ids: &self.entity_ids,
            page: self.page,
            graph: self.graph.as_deref(),
            constraint_message: self.constraint_message.as_deref(),
        }
    }
}

impl fmt::Display for RepositoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Repository {} error during {}: {}",
            self.kind, self.operation, self.message
        )?;
        if let Some(ref entity_type) = self.entity_type {
            write!(f, " [{}", entity_type)?;
            if !self.entity_ids.is_empty() {
                write!(f, ": {}", self.entity_ids.join(", "))?;
            }
            write!(f, "]")?;
        }
        if let Some(ref graph) = self.graph {
            write!(f, " [graph: {}]", graph)?;
        }
        Ok(())
    }
}

impl StdError for RepositoryError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_deref()
            .map(|source| source as &(dyn StdError + 'static))
    }
}

/// Serializable view of a [`RepositoryError`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorContext<'a> {
    pub operation: String,
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_type: Option<&'a str>,
    #[serde(skip_serializing_if = "no_ids")]
    pub entity_ids: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<Page>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub graph: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub constraint_message: Option<&'a str>,
}

fn no_ids(ids: &&[String]) -> bool {
    ids.is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repository_operation_display() {
        assert_eq!(format!("{}", RepositoryOperation::FindById), "find_by_id");
        assert_eq!(format!("{}", RepositoryOperation::FindByIds), "find_by_ids");
        assert_eq!(format!("{}", RepositoryOperation::LoadAll), "load_all");
        assert_eq!(
            format!("{}", RepositoryOperation::DeleteAllByQuery),
            "delete_all_by_query"
        );
        assert_eq!(format!("{}", RepositoryOperation::PageResult), "page_result");
    }

    #[test]
    fn test_repository_error_kind_display() {
        assert_eq!(format!("{}", RepositoryErrorKind::Read), "read");
        assert_eq!(format!("{}", RepositoryErrorKind::Constraint), "constraint");
        assert_eq!(format!("{}", RepositoryErrorKind::Mutation), "mutation");
        assert_eq!(format!("{}", RepositoryErrorKind::QueryShape), "query_shape");
        assert_eq!(format!("{}", RepositoryErrorKind::PageQuery), "page_query");
    }

    #[test]
    fn test_constraint_carries_message() {
        let error = RepositoryError::constraint(RepositoryOperation::Update, "stale row");
        assert!(error.is_constraint());
        assert_eq!(error.constraint_message.as_deref(), Some("stale row"));
        assert!(error.message.contains("stale row"));
    }

    #[test]
    fn test_page_query_context() {
        let error = RepositoryError::page_query(Page::of(3, 25), "Order");
        assert_eq!(error.kind, RepositoryErrorKind::PageQuery);
        assert_eq!(error.page, Some(Page::of(3, 25)));
        assert_eq!(error.message, "Failed to get page 3 (size 25) of Order");
    }

    #[test]
    fn test_display_with_ids_and_graph() {
        let error = RepositoryError::read(RepositoryOperation::LoadByIds, "query failed")
            .with_entity("User")
            .with_ids(["a", "b"])
            .with_graph("User.loadByGuid");
        assert_eq!(
            error.to_string(),
            "Repository read error during load_by_ids: query failed [User: a, b] [graph: User.loadByGuid]"
        );
    }

    #[test]
    fn test_context_serializes() {
        let error = RepositoryError::read(RepositoryOperation::FindByIds, "boom")
            .with_entity("User")
            .with_ids([1_i64, 2]);
        let json = serde_json::to_value(error.context()).expect("serializable");
        assert_eq!(json["operation"], "find_by_ids");
        assert_eq!(json["kind"], "read");
        assert_eq!(json["entity_type"], "User");
        assert_eq!(json["entity_ids"], serde_json::json!(["1", "2"]));
        assert!(json.get("page").is_none());
        assert!(json.get("graph").is_none());
    }

    #[test]
    fn test_retriable_follows_source() {
        let transient = RepositoryError::read(RepositoryOperation::Count, "down")
            .with_source(PersistenceError::connection_failed("refused"));
        assert!(transient.is_retriable());

        let permanent = RepositoryError::mutation(RepositoryOperation::Delete, "nope")
            .with_source(PersistenceError::query_failed("syntax"));
        assert!(!permanent.is_retriable());
        assert!(!RepositoryError::query_shape("no root").is_retriable());
    }

    #[test]
    fn test_with_operation() {
        let error = RepositoryError::mutation(RepositoryOperation::Create, "x")
            .with_operation(RepositoryOperation::Update);
        assert_eq!(error.operation, RepositoryOperation::Update);
    }
}
