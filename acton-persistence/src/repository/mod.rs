//! Repository layer
//!
//! - [`EntityRepository`]: generic CRUD, bulk delete, eager loading and locking
//!   for one entity type over a [`Session`](crate::session::Session)
//! - [`PagedQuery`]: page-at-a-time execution with a derived count query
//! - [`classify_mutation`]: translation of integrity violations into
//!   constraint errors
//! - [`Repository`]: the entity-level trait application code depends on

mod classify;
mod error;
mod metadata;
mod paged;
mod search;
mod service;
mod traits;

pub use classify::{classify_mutation, classify_read};
pub use error::{ErrorContext, RepositoryError, RepositoryErrorKind, RepositoryOperation};
pub use metadata::EntityMetadata;
pub use paged::{InvalidPageSize, Page, PageResult, PagedQuery};
pub use search::{wildcard, wildcard_default};
pub use service::{EntityRepository, EntityRepositoryBuilder};
pub use traits::{Repository, RepositoryResult};
