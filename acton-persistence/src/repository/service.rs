//! Generic entity repository
//!
//! [`EntityRepository`] provides the standard data-access operations for one
//! entity type over any [`Session`]. Reads wrap failures as read errors;
//! mutations run failures through [`classify_mutation`] so uniqueness and
//! stale-version failures surface as constraint errors. Every mutating
//! operation except [`EntityRepository::delete_all_by_query`] flushes before
//! returning.
//!
//! # Example
//!
//! ```rust,ignore
//! use acton_persistence::prelude::*;
//!
//! let repository = EntityRepository::<User, _>::builder(MemorySession::new())
//!     .config(&config.persistence)
//!     .before_save(TraceableListener::new(|| Some("alice".to_string())))
//!     .build();
//!
//! let user = repository.create(User::new("a@example.com", "Ann")).await?;
//! let page = repository
//!     .create_page_query(repository.criteria_query(), Page::first(20))?
//!     .page_result()
//!     .await?;
//! ```

use std::sync::Arc;

use super::classify::{classify_mutation, classify_read};
use super::error::{RepositoryError, RepositoryOperation};
use super::metadata::EntityMetadata;
use super::paged::{Page, PagedQuery};
use super::search::wildcard;
use super::traits::{Repository, RepositoryResult};
use crate::config::PersistenceConfig;
use crate::entity::{BeforeSave, Entity, HasBusinessId, NoopHook, SaveAction};
use crate::query::{
    chunked, derive_count_query, CriteriaQuery, DeleteQuery, Membership, Path, Predicate,
    QueryParameters, TextClause, UpdateQuery, Value,
};
use crate::session::{
    EntityGraph, LockMode, PersistenceErrorKind, QueryHints, Session, Window,
};

/// Builder for [`EntityRepository`]
pub struct EntityRepositoryBuilder<E: Entity, S: Session> {
    session: S,
    metadata: EntityMetadata,
    config: PersistenceConfig,
    before_save: Arc<dyn BeforeSave<E>>,
}

impl<E: Entity, S: Session> EntityRepositoryBuilder<E, S> {
    /// Replace the entity metadata
    pub fn metadata(mut self, metadata: EntityMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Override the entity name used for graph names and error context
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.metadata = self.metadata.with_name(name);
        self
    }

    /// Apply persistence configuration
    pub fn config(mut self, config: &PersistenceConfig) -> Self {
        self.metadata = self.metadata.with_config(config);
        self.config = config.clone();
        self
    }

    /// Hook run before every create and update
    pub fn before_save(mut self, hook: impl BeforeSave<E> + 'static) -> Self {
        self.before_save = Arc::new(hook);
        self
    }

    /// Resolve the eager-loading graphs and build the repository
    ///
    /// A graph that is not registered with the session is logged once and
    /// the corresponding load operations fall back to default loading.
    pub fn build(self) -> EntityRepository<E, S> {
        let name = self.metadata.name().to_string();
        let load_all_graph = resolve_graph(&self.session, &name, &self.metadata.load_all_graph());
        let load_by_id_graph =
            resolve_graph(&self.session, &name, &self.metadata.load_by_id_graph());

        tracing::info!(
            entity = %name,
            load_all_graph = ?load_all_graph.as_ref().map(|g| g.name.as_str()),
            load_by_id_graph = ?load_by_id_graph.as_ref().map(|g| g.name.as_str()),
            "Repository initialized"
        );

        EntityRepository {
            session: self.session,
            metadata: self.metadata,
            config: self.config,
            before_save: self.before_save,
            load_all_graph,
            load_by_id_graph,
        }
    }
}

fn resolve_graph<S: Session>(session: &S, entity: &str, graph: &str) -> Option<EntityGraph> {
    match session.entity_graph(graph) {
        Ok(resolved) => Some(resolved),
        Err(err) if err.kind == PersistenceErrorKind::EntityGraphNotFound => {
            tracing::warn!(
                entity = %entity,
                graph = %graph,
                "Entity graph not registered, loading without it"
            );
            None
        }
        Err(err) => {
            tracing::warn!(
                entity = %entity,
                graph = %graph,
                error = %err,
                "Entity graph lookup failed, loading without it"
            );
            None
        }
    }
}

/// Data-access operations for entity type `E` over session `S`
pub struct EntityRepository<E: Entity, S: Session> {
    session: S,
    metadata: EntityMetadata,
    config: PersistenceConfig,
    before_save: Arc<dyn BeforeSave<E>>,
    load_all_graph: Option<EntityGraph>,
    load_by_id_graph: Option<EntityGraph>,
}

impl<E: Entity, S: Session> EntityRepository<E, S> {
    /// Start building a repository for `E` with default metadata and config
    pub fn builder(session: S) -> EntityRepositoryBuilder<E, S> {
        EntityRepositoryBuilder {
            session,
            metadata: EntityMetadata::of::<E>(),
            config: PersistenceConfig::default(),
            before_save: Arc::new(NoopHook),
        }
    }

    /// Repository with default metadata, config and no save hook
    pub fn new(session: S) -> Self {
        Self::builder(session).build()
    }

    /// Release the repository and hand back its session
    pub fn teardown(self) -> S {
        tracing::info!(entity = %self.metadata.name(), "Repository released");
        self.session
    }

    pub fn session(&self) -> &S {
        &self.session
    }

    pub fn metadata(&self) -> &EntityMetadata {
        &self.metadata
    }

    pub fn entity_name(&self) -> &str {
        self.metadata.name()
    }

    /// Load graph resolved for [`load_all`](Self::load_all), if any
    pub fn load_all_graph(&self) -> Option<&EntityGraph> {
        self.load_all_graph.as_ref()
    }

    /// Load graph resolved for [`load_by_id`](Self::load_by_id), if any
    pub fn load_by_id_graph(&self) -> Option<&EntityGraph> {
        self.load_by_id_graph.as_ref()
    }

    // ------------------------------------------------------------------
    // Query builders
    // ------------------------------------------------------------------

    /// Fresh query with a single root of `E`
    pub fn criteria_query(&self) -> CriteriaQuery<E> {
        CriteriaQuery::from_entity()
    }

    /// Fresh bulk delete over `E`
    pub fn delete_query(&self) -> DeleteQuery {
        DeleteQuery::of::<E>()
    }

    /// Fresh bulk update over `E`
    pub fn update_query(&self) -> UpdateQuery<E> {
        UpdateQuery::new()
    }

    /// Paged query over `criteria`, positioned on `page`
    pub fn create_page_query(
        &self,
        criteria: CriteriaQuery<E>,
        page: Page,
    ) -> RepositoryResult<PagedQuery<'_, E, S>> {
        PagedQuery::new(&self.session, self.entity_name(), criteria, page)
    }

    /// LIKE pattern for a glob-style search string, honoring the configured case mode
    pub fn search_pattern(&self, text: &str) -> String {
        wildcard(text, self.config.case_insensitive_search)
    }

    /// Membership restriction on the identifier, chunked to the configured clause size
    fn id_clause(&self, ids: &[E::Id]) -> Predicate {
        let values: Vec<Value> = ids.iter().cloned().map(Into::into).collect();
        chunked(
            Path::attr(E::ID_ATTRIBUTE),
            values,
            Membership::In,
            self.config.effective_in_clause_size(),
        )
    }

    fn id_equals(&self, id: &E::Id) -> Predicate {
        Predicate::eq(Path::attr(E::ID_ATTRIBUTE), id.clone())
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    /// Every entity, unbounded
    pub async fn find_all(&self) -> RepositoryResult<Vec<E>> {
        self.session
            .list(&self.criteria_query(), None, &QueryHints::default())
            .await
            .map_err(|err| classify_read(err, RepositoryOperation::FindAll, self.entity_name()))
    }

    /// Entity with identifier `id`; `Ok(None)` when absent
    pub async fn find_by_id(&self, id: &E::Id) -> RepositoryResult<Option<E>> {
        self.session
            .find::<E>(id, &QueryHints::default())
            .await
            .map_err(|err| {
                classify_read(err, RepositoryOperation::FindById, self.entity_name()).with_ids([id])
            })
    }

    /// Entities whose identifier is in `ids`; empty input issues no query
    pub async fn find_by_ids(&self, ids: &[E::Id]) -> RepositoryResult<Vec<E>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        tracing::debug!(
            entity = %self.entity_name(),
            ids = ids.len(),
            chunk = self.config.effective_in_clause_size(),
            "find_by_ids"
        );
        let query = self.criteria_query().filter(self.id_clause(ids));
        self.session
            .list(&query, None, &QueryHints::default())
            .await
            .map_err(|err| {
                classify_read(err, RepositoryOperation::FindByIds, self.entity_name()).with_ids(ids)
            })
    }

    /// At most `count` entities starting at offset `from`
    pub async fn find_range(&self, from: u64, count: u64) -> RepositoryResult<Vec<E>> {
        self.session
            .list(
                &self.criteria_query(),
                Some(Window::new(from, count)),
                &QueryHints::default(),
            )
            .await
            .map_err(|err| classify_read(err, RepositoryOperation::FindRange, self.entity_name()))
    }

    /// Entities matching an arbitrary query
    pub async fn find_matching(&self, criteria: &CriteriaQuery<E>) -> RepositoryResult<Vec<E>> {
        self.session
            .list(criteria, None, &QueryHints::default())
            .await
            .map_err(|err| classify_read(err, RepositoryOperation::FindMatching, self.entity_name()))
    }

    /// Entities matching a textual condition such as one built by
    /// [`in_clause_text`](crate::query::in_clause_text)
    pub async fn find_where(&self, clause: &TextClause) -> RepositoryResult<Vec<E>> {
        self.session
            .text_query(&clause.condition, &clause.parameters, None)
            .await
            .map_err(|err| classify_read(err, RepositoryOperation::TextQuery, self.entity_name()))
    }

    /// Entities returned by the session query registered as `name`
    pub async fn find_named(
        &self,
        name: &str,
        parameters: &QueryParameters,
    ) -> RepositoryResult<Vec<E>> {
        self.session
            .named_query(name, parameters, None)
            .await
            .map_err(|err| classify_read(err, RepositoryOperation::NamedQuery, self.entity_name()))
    }

    /// Number of entities
    pub async fn count(&self) -> RepositoryResult<u64> {
        self.count_matching(&self.criteria_query()).await
    }

    /// Number of rows matching `criteria`, ignoring ordering
    pub async fn count_matching(&self, criteria: &CriteriaQuery<E>) -> RepositoryResult<u64> {
        let count_query = derive_count_query(criteria).map_err(|err| {
            RepositoryError::query_shape(err.to_string())
                .with_entity(self.entity_name())
                .with_source(err)
        })?;
        let count = self
            .session
            .count(&count_query)
            .await
            .map_err(|err| classify_read(err, RepositoryOperation::Count, self.entity_name()))?;
        Ok(u64::try_from(count).unwrap_or_default())
    }

    /// Whether an entity with identifier `id` exists
    pub async fn exists(&self, id: &E::Id) -> RepositoryResult<bool> {
        self.count_matching(&self.criteria_query().filter(self.id_equals(id)))
            .await
            .map(|count| count > 0)
            .map_err(|err| err.with_operation(RepositoryOperation::Exists).with_ids([id]))
    }

    // ------------------------------------------------------------------
    // Eager loads
    // ------------------------------------------------------------------

    /// Every entity, distinct, with the load-all graph applied when registered
    pub async fn load_all(&self) -> RepositoryResult<Vec<E>> {
        self.load_all_using(self.load_all_graph.clone()).await
    }

    /// [`load_all`](Self::load_all) with an explicitly named graph
    ///
    /// Fails when `graph` is not registered.
    pub async fn load_all_with(&self, graph: &str) -> RepositoryResult<Vec<E>> {
        let graph = self.named_graph(graph, RepositoryOperation::LoadAll)?;
        self.load_all_using(Some(graph)).await
    }

    async fn load_all_using(&self, graph: Option<EntityGraph>) -> RepositoryResult<Vec<E>> {
        let graph_name = graph.as_ref().map(|g| g.name.clone());
        let query = self.criteria_query().distinct(true);
        self.session
            .list(&query, None, &QueryHints::from(graph))
            .await
            .map_err(|err| {
                with_graph(
                    classify_read(err, RepositoryOperation::LoadAll, self.entity_name()),
                    graph_name,
                )
            })
    }

    /// Entity with identifier `id`, with the load-by-id graph applied when registered
    pub async fn load_by_id(&self, id: &E::Id) -> RepositoryResult<Option<E>> {
        self.load_by_id_using(id, self.load_by_id_graph.clone()).await
    }

    /// [`load_by_id`](Self::load_by_id) with an explicitly named graph
    pub async fn load_by_id_with(&self, id: &E::Id, graph: &str) -> RepositoryResult<Option<E>> {
        let graph = self
            .named_graph(graph, RepositoryOperation::LoadById)
            .map_err(|err| err.with_ids([id]))?;
        self.load_by_id_using(id, Some(graph)).await
    }

    async fn load_by_id_using(
        &self,
        id: &E::Id,
        graph: Option<EntityGraph>,
    ) -> RepositoryResult<Option<E>> {
        let graph_name = graph.as_ref().map(|g| g.name.clone());
        self.session
            .find::<E>(id, &QueryHints::from(graph))
            .await
            .map_err(|err| {
                with_graph(
                    classify_read(err, RepositoryOperation::LoadById, self.entity_name()),
                    graph_name,
                )
                .with_ids([id])
            })
    }

    /// Entities whose identifier is in `ids`, distinct, with the load-by-id graph
    pub async fn load_by_ids(&self, ids: &[E::Id]) -> RepositoryResult<Vec<E>> {
        self.load_by_ids_using(ids, self.load_by_id_graph.clone()).await
    }

    /// [`load_by_ids`](Self::load_by_ids) with an explicitly named graph
    pub async fn load_by_ids_with(&self, ids: &[E::Id], graph: &str) -> RepositoryResult<Vec<E>> {
        let graph = self
            .named_graph(graph, RepositoryOperation::LoadByIds)
            .map_err(|err| err.with_ids(ids))?;
        self.load_by_ids_using(ids, Some(graph)).await
    }

    async fn load_by_ids_using(
        &self,
        ids: &[E::Id],
        graph: Option<EntityGraph>,
    ) -> RepositoryResult<Vec<E>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let graph_name = graph.as_ref().map(|g| g.name.clone());
        let query = self
            .criteria_query()
            .filter(self.id_clause(ids))
            .distinct(true);
        self.session
            .list(&query, None, &QueryHints::from(graph))
            .await
            .map_err(|err| {
                with_graph(
                    classify_read(err, RepositoryOperation::LoadByIds, self.entity_name()),
                    graph_name,
                )
                .with_ids(ids)
            })
    }

    fn named_graph(&self, graph: &str, operation: RepositoryOperation) -> RepositoryResult<EntityGraph> {
        self.session.entity_graph(graph).map_err(|err| {
            classify_read(err, operation, self.entity_name()).with_graph(graph)
        })
    }

    // ------------------------------------------------------------------
    // Mutations
    // ------------------------------------------------------------------

    fn prepare(&self, entity: &mut E, action: SaveAction) {
        let manual = self.before_save.manual_traceability(entity);
        self.before_save.before_save(entity, action, manual);
    }

    async fn flush(&self, operation: RepositoryOperation) -> RepositoryResult<()> {
        self.session
            .flush()
            .await
            .map_err(|err| classify_mutation(err, operation, self.entity_name()))
    }

    async fn persist_one(&self, entity: &mut E, operation: RepositoryOperation) -> RepositoryResult<()> {
        self.prepare(entity, SaveAction::Create);
        if let Err(err) = self.session.persist(entity).await {
            return Err(classify_mutation(err, operation, self.entity_name()).with_ids(entity.id()));
        }
        Ok(())
    }

    async fn merge_one(&self, mut entity: E, operation: RepositoryOperation) -> RepositoryResult<E> {
        self.prepare(&mut entity, SaveAction::Update);
        match self.session.merge(&entity).await {
            Ok(merged) => Ok(merged),
            Err(err) => {
                Err(classify_mutation(err, operation, self.entity_name()).with_ids(entity.id()))
            }
        }
    }

    /// Persist a new entity and flush
    pub async fn create(&self, mut entity: E) -> RepositoryResult<E> {
        tracing::debug!(entity = %self.entity_name(), "create");
        self.persist_one(&mut entity, RepositoryOperation::Create).await?;
        self.flush(RepositoryOperation::Create).await?;
        Ok(entity)
    }

    /// Persist every entity, then flush once
    pub async fn create_all(&self, entities: Vec<E>) -> RepositoryResult<Vec<E>> {
        let mut created = Vec::with_capacity(entities.len());
        for mut entity in entities {
            self.persist_one(&mut entity, RepositoryOperation::Create).await?;
            created.push(entity);
        }
        self.flush(RepositoryOperation::Create).await?;
        Ok(created)
    }

    /// Merge an entity and flush; a stale version is a constraint error
    pub async fn update(&self, entity: E) -> RepositoryResult<E> {
        tracing::debug!(entity = %self.entity_name(), id = ?entity.id(), "update");
        let merged = self.merge_one(entity, RepositoryOperation::Update).await?;
        self.flush(RepositoryOperation::Update).await?;
        Ok(merged)
    }

    /// Merge every entity, then flush once
    pub async fn update_all(&self, entities: Vec<E>) -> RepositoryResult<Vec<E>> {
        let mut merged = Vec::with_capacity(entities.len());
        for entity in entities {
            merged.push(self.merge_one(entity, RepositoryOperation::Update).await?);
        }
        self.flush(RepositoryOperation::Update).await?;
        Ok(merged)
    }

    /// Remove an entity and flush; `Ok(false)` for `None`
    pub async fn delete(&self, entity: Option<&E>) -> RepositoryResult<bool> {
        let Some(entity) = entity else {
            return Ok(false);
        };
        self.remove_one(entity, RepositoryOperation::Delete).await?;
        self.flush(RepositoryOperation::Delete).await?;
        Ok(true)
    }

    /// Remove every entity and flush; `Ok(false)` for an empty slice
    pub async fn delete_entities(&self, entities: &[E]) -> RepositoryResult<bool> {
        Ok(self.delete_entities_counted(entities).await? > 0)
    }

    /// Remove every entity and flush, returning how many were removed
    ///
    /// The first entity the session does not manage aborts the call.
    pub async fn delete_entities_counted(&self, entities: &[E]) -> RepositoryResult<u64> {
        if entities.is_empty() {
            return Ok(0);
        }
        let mut removed = 0;
        for entity in entities {
            self.remove_one(entity, RepositoryOperation::Delete).await?;
            removed += 1;
        }
        self.flush(RepositoryOperation::Delete).await?;
        Ok(removed)
    }

    async fn remove_one(&self, entity: &E, operation: RepositoryOperation) -> RepositoryResult<()> {
        self.session
            .remove(entity)
            .await
            .map_err(|err| classify_mutation(err, operation, self.entity_name()).with_ids(entity.id()))
    }

    /// Delete the entity with identifier `id`; `Ok(false)` when nothing matched
    pub async fn delete_by_id(&self, id: &E::Id) -> RepositoryResult<bool> {
        let query = self.delete_query().filter(self.id_equals(id));
        let removed = self
            .session
            .execute_delete(&query)
            .await
            .map_err(|err| {
                classify_mutation(err, RepositoryOperation::DeleteById, self.entity_name())
                    .with_ids([id])
            })?;
        self.flush(RepositoryOperation::DeleteById).await?;
        Ok(removed > 0)
    }

    /// Delete every entity whose identifier is in `ids`, returning the row count
    pub async fn delete_by_ids(&self, ids: &[E::Id]) -> RepositoryResult<u64> {
        if ids.is_empty() {
            return Ok(0);
        }
        tracing::debug!(entity = %self.entity_name(), ids = ids.len(), "delete_by_ids");
        let query = self.delete_query().filter(self.id_clause(ids));
        let removed = self
            .session
            .execute_delete(&query)
            .await
            .map_err(|err| {
                classify_mutation(err, RepositoryOperation::DeleteByIds, self.entity_name())
                    .with_ids(ids)
            })?;
        self.flush(RepositoryOperation::DeleteByIds).await?;
        Ok(removed)
    }

    /// Load and remove every entity one by one, then flush
    pub async fn delete_all(&self) -> RepositoryResult<u64> {
        let entities = self
            .find_all()
            .await
            .map_err(|err| classify_mutation(err, RepositoryOperation::DeleteAll, self.entity_name()))?;
        for entity in &entities {
            self.remove_one(entity, RepositoryOperation::DeleteAll).await?;
        }
        self.flush(RepositoryOperation::DeleteAll).await?;
        tracing::debug!(entity = %self.entity_name(), removed = entities.len(), "delete_all");
        Ok(entities.len() as u64)
    }

    /// Bulk delete every row of `E` in one statement
    ///
    /// Bypasses the save hook and per-entity lifecycle; nothing is flushed.
    pub async fn delete_all_by_query(&self) -> RepositoryResult<u64> {
        tracing::debug!(
            entity = %self.entity_name(),
            "Bulk delete skips per-entity callbacks"
        );
        self.session
            .execute_delete(&self.delete_query())
            .await
            .map_err(|err| {
                classify_mutation(err, RepositoryOperation::DeleteAllByQuery, self.entity_name())
            })
    }

    /// Execute a bulk update, returning the number of rows changed
    ///
    /// Like [`delete_all_by_query`](Self::delete_all_by_query) this bypasses
    /// the save hook and nothing is flushed.
    pub async fn update_by_query(&self, query: &UpdateQuery<E>) -> RepositoryResult<u64> {
        tracing::debug!(
            entity = %self.entity_name(),
            assignments = query.assignments().len(),
            "Bulk update skips per-entity callbacks"
        );
        self.session
            .execute_update(query)
            .await
            .map_err(|err| {
                classify_mutation(err, RepositoryOperation::UpdateByQuery, self.entity_name())
            })
    }

    /// Apply a lock mode to a managed entity
    pub async fn lock(&self, entity: &E, mode: LockMode) -> RepositoryResult<()> {
        self.session
            .lock(entity, mode)
            .await
            .map_err(|err| {
                classify_mutation(err, RepositoryOperation::Lock, self.entity_name())
                    .with_ids(entity.id())
            })
    }

    /// Reload entity state from the session
    pub async fn refresh(&self, entity: &mut E) -> RepositoryResult<()> {
        if let Err(err) = self.session.refresh(entity).await {
            return Err(
                classify_read(err, RepositoryOperation::Refresh, self.entity_name())
                    .with_ids(entity.id()),
            );
        }
        Ok(())
    }
}

impl<E: Entity + HasBusinessId, S: Session> EntityRepository<E, S> {
    /// Entity with business identifier `bid`; `Ok(None)` when absent
    pub async fn find_by_bid(&self, bid: i64) -> RepositoryResult<Option<E>> {
        let query = self
            .criteria_query()
            .filter(Predicate::eq(Path::attr(E::BID_ATTRIBUTE), bid));
        let found = self
            .session
            .list(&query, Some(Window::first(1)), &QueryHints::default())
            .await
            .map_err(|err| {
                classify_read(err, RepositoryOperation::FindByBid, self.entity_name()).with_ids([bid])
            })?;
        Ok(found.into_iter().next())
    }
}

fn with_graph(error: RepositoryError, graph: Option<String>) -> RepositoryError {
    match graph {
        Some(graph) => error.with_graph(graph),
        None => error,
    }
}

impl<E: Entity, S: Session> Repository<E> for EntityRepository<E, S> {
    async fn find_by_id(&self, id: &E::Id) -> RepositoryResult<Option<E>> {
        EntityRepository::find_by_id(self, id).await
    }

    async fn find_all(&self) -> RepositoryResult<Vec<E>> {
        EntityRepository::find_all(self).await
    }

    async fn count(&self) -> RepositoryResult<u64> {
        EntityRepository::count(self).await
    }

    async fn exists(&self, id: &E::Id) -> RepositoryResult<bool> {
        EntityRepository::exists(self, id).await
    }

    async fn create(&self, entity: E) -> RepositoryResult<E> {
        EntityRepository::create(self, entity).await
    }

    async fn update(&self, entity: E) -> RepositoryResult<E> {
        EntityRepository::update(self, entity).await
    }

    async fn delete_by_id(&self, id: &E::Id) -> RepositoryResult<bool> {
        EntityRepository::delete_by_id(self, id).await
    }
}
