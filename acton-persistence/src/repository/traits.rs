//! Repository trait definition
//!
//! [`Repository`] is the entity-level seam application services depend on.
//! It uses RPITIT (Return Position Impl Trait In Traits) so implementations
//! are written with plain `async fn`. [`EntityRepository`](super::EntityRepository)
//! implements it for every [`Entity`] over any [`Session`](crate::session::Session).
//!
//! # Example
//!
//! ```rust,ignore
//! use acton_persistence::repository::{Repository, RepositoryResult};
//!
//! async fn rename<R: Repository<User>>(repo: &R, id: &String, name: &str) -> RepositoryResult<Option<User>> {
//!     let Some(mut user) = repo.find_by_id(id).await? else {
//!         return Ok(None);
//!     };
//!     user.name = name.to_string();
//!     repo.update(user).await.map(Some)
//! }
//! ```

use std::future::Future;

use super::error::RepositoryError;
use crate::entity::Entity;

/// Result type for repository operations
pub type RepositoryResult<T> = std::result::Result<T, RepositoryError>;

/// CRUD operations over one entity type
pub trait Repository<E: Entity>: Send + Sync {
    /// Find an entity by its identifier; `Ok(None)` when absent
    fn find_by_id(&self, id: &E::Id) -> impl Future<Output = RepositoryResult<Option<E>>> + Send;

    /// Every entity (unbounded)
    fn find_all(&self) -> impl Future<Output = RepositoryResult<Vec<E>>> + Send;

    /// Number of entities
    fn count(&self) -> impl Future<Output = RepositoryResult<u64>> + Send;

    /// Whether an entity with this identifier exists
    fn exists(&self, id: &E::Id) -> impl Future<Output = RepositoryResult<bool>> + Send;

    /// Persist a new entity and return it with identifier and version assigned
    fn create(&self, entity: E) -> impl Future<Output = RepositoryResult<E>> + Send;

    /// Merge an entity and return the persisted state
    fn update(&self, entity: E) -> impl Future<Output = RepositoryResult<E>> + Send;

    /// Delete by identifier; `Ok(false)` when nothing matched
    fn delete_by_id(&self, id: &E::Id) -> impl Future<Output = RepositoryResult<bool>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{HasIdentity, HasVersion, Mapped, Persistent, Row};

    #[derive(Debug, Clone)]
    struct Note {
        persistent: Persistent<i64>,
    }

    impl HasIdentity for Note {
        type Id = i64;
        fn id(&self) -> Option<&i64> {
            self.persistent.id()
        }
        fn set_id(&mut self, id: i64) {
            self.persistent.set_id(id);
        }
    }

    impl HasVersion for Note {
        fn version(&self) -> Option<i32> {
            self.persistent.version()
        }
        fn set_version(&mut self, version: i32) {
            self.persistent.set_version(version);
        }
        fn is_persisted(&self) -> bool {
            self.persistent.is_persisted()
        }
        fn set_persisted(&mut self, persisted: bool) {
            self.persistent.set_persisted(persisted);
        }
    }

    impl Mapped for Note {
        fn to_row(&self) -> Row {
            Row::new()
        }
    }

    // Verifies the trait can be implemented with plain async fns
    struct MockRepository;

    impl Repository<Note> for MockRepository {
        async fn find_by_id(&self, _id: &i64) -> RepositoryResult<Option<Note>> {
            Ok(None)
        }

        async fn find_all(&self) -> RepositoryResult<Vec<Note>> {
            Ok(vec![])
        }

        async fn count(&self) -> RepositoryResult<u64> {
            Ok(0)
        }

        async fn exists(&self, _id: &i64) -> RepositoryResult<bool> {
            Ok(false)
        }

        async fn create(&self, mut entity: Note) -> RepositoryResult<Note> {
            entity.set_id(1);
            entity.set_version(0);
            Ok(entity)
        }

        async fn update(&self, entity: Note) -> RepositoryResult<Note> {
            Ok(entity)
        }

        async fn delete_by_id(&self, _id: &i64) -> RepositoryResult<bool> {
            Ok(false)
        }
    }

    #[tokio::test]
    async fn test_mock_repository() {
        let repo = MockRepository;
        let created = repo
            .create(Note {
                persistent: Persistent::new(),
            })
            .await
            .expect("create");
        assert_eq!(created.id(), Some(&1));
        assert_eq!(created.version(), Some(0));
        assert!(repo.find_by_id(&1).await.expect("find").is_none());
        assert!(!repo.delete_by_id(&1).await.expect("delete"));
    }
}
