//! # acton-persistence
//!
//! Generic data-access layer over a relational-mapping session.
//!
//! ## Features
//!
//! - **Repository**: CRUD, bulk update and delete, find/load by identifier
//!   lists or business id, textual and named queries, eager loading through
//!   named entity graphs, explicit locks
//! - **Paged queries**: page-at-a-time execution with a count query derived
//!   from the result query (roots, joins, grouping and restriction preserved)
//! - **Bounded membership clauses**: `IN` / `NOT IN` split into chunks of at
//!   most 1000 values
//! - **Constraint classification**: uniqueness and stale-version failures
//!   surface as constraint errors carrying the driver message
//! - **Audit fields**: creation/modification actor and timestamp populated
//!   before save
//! - **In-memory engine** (`memory` feature): a [`Session`](session::Session)
//!   implementation for tests and embedded use
//!
//! ## Example
//!
//! ```rust,ignore
//! use acton_persistence::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = Config::load()?;
//!     init_tracing(&config)?;
//!
//!     let users = EntityRepository::<User, _>::builder(MemorySession::new())
//!         .config(&config.persistence)
//!         .before_save(TraceableListener::new(|| Some("system".to_string())))
//!         .build();
//!
//!     let ids: Vec<String> = load_ids();
//!     let found = users.find_by_ids(&ids).await?;
//!
//!     let mut pages = users.create_page_query(users.criteria_query(), Page::first(50))?;
//!     let first = pages.page_result().await?;
//!     println!("{} users in {} pages", first.count, first.total_pages());
//!     pages.next();
//!
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod entity;
pub mod error;
pub mod observability;
pub mod query;
pub mod repository;
pub mod session;

#[cfg(feature = "memory")]
pub mod memory;

#[cfg(test)]
pub(crate) mod test_support;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::{Config, LoggingConfig, PersistenceConfig};
    pub use crate::error::{Error, Result};
    pub use crate::observability::{init_tracing, shutdown_tracing};

    pub use crate::entity::{
        BeforeSave, Entity, HasAuditFields, HasBusinessId, HasIdentity, HasVersion, Mapped, NoopHook,
        Persistent, PrincipalProvider, Row, SaveAction, Traceable, TraceableListener,
    };

    pub use crate::query::{
        chunked_text, derive_count_query, in_clause, in_clause_text, not_in_clause,
        not_in_clause_text, CriteriaQuery, DeleteQuery, Fetch, Join, JoinType, Membership, OrderDirection,
        Path, Predicate, QueryParameters, Root, TextClause, UpdateQuery, Value, MAX_IN_CLAUSE_SIZE,
    };

    pub use crate::repository::{
        classify_mutation, wildcard, wildcard_default, EntityMetadata, EntityRepository,
        InvalidPageSize, Page, PageResult, PagedQuery, Repository, RepositoryError, RepositoryErrorKind,
        RepositoryOperation, RepositoryResult,
    };

    pub use crate::session::{
        DriverError, EntityGraph, LockMode, PersistenceError, PersistenceErrorKind,
        PersistenceResult, QueryHints, Session, Window,
    };

    #[cfg(feature = "memory")]
    pub use crate::memory::MemorySession;

    pub use futures::{StreamExt, TryStreamExt};
}
