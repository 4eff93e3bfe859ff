//! Persistence session contract
//!
//! A [`Session`] is the handle onto the relational-mapping engine: it
//! executes structural queries, manages entity lifecycle (persist, merge,
//! remove, refresh, lock) and resolves named entity graphs. Repositories and
//! paged queries are written purely against this trait.
//!
//! The trait uses RPITIT (Return Position Impl Trait In Traits) so that
//! implementations can write plain `async fn`s without `async_trait`.

mod error;

use std::fmt;
use std::future::Future;

use futures::stream::BoxStream;

use crate::entity::Entity;
use crate::query::{CriteriaQuery, DeleteQuery, QueryParameters, UpdateQuery};

pub use error::{DriverError, PersistenceError, PersistenceErrorKind, PersistenceResult};

/// Offset/limit slice of a result set
///
/// # Example
///
/// ```rust
/// use acton_persistence::session::Window;
///
/// let first = Window::first(20);
/// assert_eq!(first.offset, 0);
/// assert_eq!(first.limit, 20);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Window {
    /// Number of results to skip
    pub offset: u64,
    /// Maximum number of results to return
    pub limit: u64,
}

impl Window {
    pub fn new(offset: u64, limit: u64) -> Self {
        Self { offset, limit }
    }

    /// Window starting at the first result
    pub fn first(limit: u64) -> Self {
        Self::new(0, limit)
    }
}

/// Explicit lock modes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LockMode {
    /// No lock
    #[default]
    None,
    /// Optimistic read lock
    Optimistic,
    /// Optimistic lock that bumps the version
    OptimisticForceIncrement,
    /// Shared pessimistic lock
    PessimisticRead,
    /// Exclusive pessimistic lock
    PessimisticWrite,
    /// Exclusive pessimistic lock that bumps the version
    PessimisticForceIncrement,
}

impl LockMode {
    /// Whether acquiring this lock increments the entity version
    pub fn increments_version(self) -> bool {
        matches!(
            self,
            Self::OptimisticForceIncrement | Self::PessimisticForceIncrement
        )
    }
}

impl fmt::Display for LockMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Optimistic => write!(f, "optimistic"),
            Self::OptimisticForceIncrement => write!(f, "optimistic_force_increment"),
            Self::PessimisticRead => write!(f, "pessimistic_read"),
            Self::PessimisticWrite => write!(f, "pessimistic_write"),
            Self::PessimisticForceIncrement => write!(f, "pessimistic_force_increment"),
        }
    }
}

/// Named set of associations to load eagerly
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EntityGraph {
    /// Registered graph name
    pub name: String,
    /// Association attributes the graph loads
    pub attributes: Vec<String>,
}

impl EntityGraph {
    pub fn new(name: impl Into<String>, attributes: Vec<String>) -> Self {
        Self {
            name: name.into(),
            attributes,
        }
    }
}

/// Execution hints passed along with a read
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryHints {
    /// Entity graph used as a load graph
    pub load_graph: Option<EntityGraph>,
}

impl QueryHints {
    /// Hints applying `graph` as load graph
    pub fn load_graph(graph: EntityGraph) -> Self {
        Self {
            load_graph: Some(graph),
        }
    }
}

impl From<Option<EntityGraph>> for QueryHints {
    fn from(load_graph: Option<EntityGraph>) -> Self {
        Self { load_graph }
    }
}

/// Handle onto the relational-mapping engine for one unit of work
///
/// A session is used by one logical caller at a time; the repository never
/// shares it across concurrent callers.
pub trait Session: Send + Sync {
    /// Load an entity by identifier
    fn find<E: Entity>(
        &self,
        id: &E::Id,
        hints: &QueryHints,
    ) -> impl Future<Output = PersistenceResult<Option<E>>> + Send;

    /// Execute a query for a list, optionally windowed
    fn list<E: Entity>(
        &self,
        query: &CriteriaQuery<E>,
        window: Option<Window>,
        hints: &QueryHints,
    ) -> impl Future<Output = PersistenceResult<Vec<E>>> + Send;

    /// Execute a windowed query as a lazy, single-pass stream
    ///
    /// Nothing runs until the stream is first polled. The stream borrows the
    /// session and must be drained or dropped before the session is released.
    fn stream<'a, E: Entity>(
        &'a self,
        query: CriteriaQuery<E>,
        window: Window,
    ) -> BoxStream<'a, PersistenceResult<E>>;

    /// Execute a count query for its single scalar result
    fn count(
        &self,
        query: &CriteriaQuery<i64>,
    ) -> impl Future<Output = PersistenceResult<i64>> + Send;

    /// Execute a bulk delete and return the affected row count
    fn execute_delete(
        &self,
        query: &DeleteQuery,
    ) -> impl Future<Output = PersistenceResult<u64>> + Send;

    /// Execute a bulk update and return the affected row count
    fn execute_update<E: Entity>(
        &self,
        query: &UpdateQuery<E>,
    ) -> impl Future<Output = PersistenceResult<u64>> + Send;

    /// Select every `E` matching a textual condition
    ///
    /// `condition` references `:name` parameters bound from `parameters`; a
    /// parameter inside an `IN (...)` list expands to all of its values.
    fn text_query<E: Entity>(
        &self,
        condition: &str,
        parameters: &QueryParameters,
        window: Option<Window>,
    ) -> impl Future<Output = PersistenceResult<Vec<E>>> + Send;

    /// Execute a query registered with the engine under `name`
    ///
    /// Fails with [`PersistenceErrorKind::QueryFailed`] when no query of that
    /// name exists for `E`.
    fn named_query<E: Entity>(
        &self,
        name: &str,
        parameters: &QueryParameters,
        window: Option<Window>,
    ) -> impl Future<Output = PersistenceResult<Vec<E>>> + Send;

    /// Make a new entity persistent; assigns generated identifier and version
    fn persist<E: Entity>(&self, entity: &mut E)
        -> impl Future<Output = PersistenceResult<()>> + Send;

    /// Merge entity state and return the managed instance
    fn merge<E: Entity>(&self, entity: &E) -> impl Future<Output = PersistenceResult<E>> + Send;

    /// Remove a persistent entity
    fn remove<E: Entity>(&self, entity: &E) -> impl Future<Output = PersistenceResult<()>> + Send;

    /// Overwrite entity state from the database
    fn refresh<E: Entity>(&self, entity: &mut E)
        -> impl Future<Output = PersistenceResult<()>> + Send;

    /// Apply a lock mode to a managed entity
    fn lock<E: Entity>(
        &self,
        entity: &E,
        mode: LockMode,
    ) -> impl Future<Output = PersistenceResult<()>> + Send;

    /// Synchronize pending changes with the database
    fn flush(&self) -> impl Future<Output = PersistenceResult<()>> + Send;

    /// Look up a named entity graph
    ///
    /// Fails with [`PersistenceErrorKind::EntityGraphNotFound`] when no graph
    /// of that name is registered.
    fn entity_graph(&self, name: &str) -> PersistenceResult<EntityGraph>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_mode_increments() {
        assert!(LockMode::OptimisticForceIncrement.increments_version());
        assert!(LockMode::PessimisticForceIncrement.increments_version());
        assert!(!LockMode::PessimisticWrite.increments_version());
        assert_eq!(LockMode::PessimisticWrite.to_string(), "pessimistic_write");
    }

    #[test]
    fn test_hints_from_graph() {
        let graph = EntityGraph::new("User.loadAll", vec!["orders".to_string()]);
        let hints = QueryHints::from(Some(graph.clone()));
        assert_eq!(hints, QueryHints::load_graph(graph));
        assert_eq!(QueryHints::from(None), QueryHints::default());
    }
}
