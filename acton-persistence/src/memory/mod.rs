//! In-memory session engine
//!
//! [`MemorySession`] keeps entity snapshots in process memory and evaluates
//! structural queries against them. It behaves like a relational backend
//! where repositories can observe it: generated keys, optimistic versions,
//! unique constraints reported with driver-style messages, inner and left
//! joins over associations, sequence-generated attributes, named entity
//! graphs and named textual queries.
//!
//! Textual conditions alias the queried entity as `e`, so `e.guid` and
//! `guid` address the same attribute.
//!
//! Cloning a `MemorySession` yields another handle onto the same store.
//!
//! # Example
//!
//! ```rust,ignore
//! use acton_persistence::memory::MemorySession;
//! use acton_persistence::session::{EntityGraph, PersistenceError};
//!
//! let session = MemorySession::new();
//! session.register_unique::<User>("email");
//! session.register_graph(EntityGraph::new("User.loadAll", vec!["orders".into()]));
//! session.register_sequence::<Order>("bid");
//! session.register_named_query::<User>("User.byEmail", "e.email = :email");
//!
//! // Make the next operation fail
//! session.fail_next(PersistenceError::timeout("statement timeout")).await;
//! ```

mod eval;
mod text;

use std::any::{Any, TypeId};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use tokio::sync::Mutex;

use crate::entity::{Entity, Row};
use crate::query::{
    CriteriaQuery, DeleteQuery, Predicate, QueryParameters, Root, Selection, TypeKey, UpdateQuery,
    Value,
};
use crate::session::{
    DriverError, EntityGraph, LockMode, PersistenceError, PersistenceResult, QueryHints, Session,
    Window,
};
use eval::{entry_of, row_matches, Layout};

const VERSION_ATTRIBUTE: &str = "version";
const TEXT_ALIAS: &str = "e";

struct Stored {
    id: Value,
    version: i32,
    row: Row,
    entity: Box<dyn Any + Send + Sync>,
}

struct Table {
    name: String,
    entries: Vec<Stored>,
    sequence: u64,
    generated: HashMap<String, i64>,
}

impl Table {
    fn new(key: TypeKey) -> Self {
        Self {
            name: key.short_name().to_lowercase(),
            entries: Vec::new(),
            sequence: 0,
            generated: HashMap::new(),
        }
    }

    fn check_unique(
        &self,
        attribute: &str,
        constraint: &str,
        value: &Value,
        skip: Option<&Value>,
    ) -> PersistenceResult<()> {
        if value.is_null() {
            return Ok(());
        }
        let taken = self
            .entries
            .iter()
            .any(|stored| Some(&stored.id) != skip && stored.row.get(attribute) == *value);
        if !taken {
            return Ok(());
        }
        Err(duplicate_key(constraint, attribute, value))
    }

    fn primary_key(&self) -> String {
        format!("{}_pkey", self.name)
    }

    fn next_value(&mut self, attribute: &str) -> i64 {
        let current = self.generated.entry(attribute.to_string()).or_insert(0);
        *current += 1;
        *current
    }
}

fn duplicate_key(constraint: &str, attribute: &str, value: &Value) -> PersistenceError {
    let driver = DriverError::new(
        "23505",
        format!(
            "ERROR: duplicate key value violates unique constraint \"{}\"\n  Detail: Key ({})=({}) already exists.",
            constraint, attribute, value
        ),
    );
    PersistenceError::constraint_violation("could not execute statement", driver)
}

#[derive(Default)]
struct State {
    tables: HashMap<TypeId, Table>,
    failure: Option<PersistenceError>,
    applied_graphs: Vec<String>,
}

impl State {
    fn take_failure(&mut self) -> PersistenceResult<()> {
        match self.failure.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn table_mut(&mut self, key: TypeKey) -> &mut Table {
        self.tables
            .entry(key.id())
            .or_insert_with(|| Table::new(key))
    }

    fn record_graph(&mut self, hints: &QueryHints) {
        if let Some(graph) = &hints.load_graph {
            self.applied_graphs.push(graph.name.clone());
        }
    }
}

struct NamedQuery {
    entity: TypeId,
    condition: String,
}

#[derive(Default)]
struct Store {
    state: Mutex<State>,
    unique: DashMap<TypeId, Vec<String>>,
    sequences: DashMap<TypeId, Vec<String>>,
    graphs: DashMap<String, EntityGraph>,
    named: DashMap<String, NamedQuery>,
}

/// Session over an in-process store
#[derive(Clone, Default)]
pub struct MemorySession {
    inner: Arc<Store>,
}

impl MemorySession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a unique constraint on an attribute of `E`
    pub fn register_unique<E: 'static>(&self, attribute: impl Into<String>) {
        self.inner
            .unique
            .entry(TypeId::of::<E>())
            .or_default()
            .push(attribute.into());
    }

    /// Generate `attribute` of `E` from a sequence on insert
    ///
    /// Values start at 1 per table and are never changed by updates.
    pub fn register_sequence<E: 'static>(&self, attribute: impl Into<String>) {
        self.inner
            .sequences
            .entry(TypeId::of::<E>())
            .or_default()
            .push(attribute.into());
    }

    /// Register a named entity graph
    pub fn register_graph(&self, graph: EntityGraph) {
        self.inner.graphs.insert(graph.name.clone(), graph);
    }

    /// Register a textual query over `E` under `name`
    pub fn register_named_query<E: 'static>(
        &self,
        name: impl Into<String>,
        condition: impl Into<String>,
    ) {
        self.inner.named.insert(
            name.into(),
            NamedQuery {
                entity: TypeId::of::<E>(),
                condition: condition.into(),
            },
        );
    }

    /// Fail the next session operation with `error`
    pub async fn fail_next(&self, error: PersistenceError) {
        self.inner.state.lock().await.failure = Some(error);
    }

    /// Names of load graphs applied by reads so far, in order
    pub async fn applied_graphs(&self) -> Vec<String> {
        self.inner.state.lock().await.applied_graphs.clone()
    }

    /// Number of stored rows of `E`
    pub async fn row_count<E: 'static>(&self) -> usize {
        self.inner
            .state
            .lock()
            .await
            .tables
            .get(&TypeId::of::<E>())
            .map_or(0, |table| table.entries.len())
    }

    fn unique_attributes<E: 'static>(&self) -> Vec<String> {
        self.inner
            .unique
            .get(&TypeId::of::<E>())
            .map(|attributes| attributes.value().clone())
            .unwrap_or_default()
    }

    fn sequence_attributes<E: 'static>(&self) -> Vec<String> {
        self.inner
            .sequences
            .get(&TypeId::of::<E>())
            .map(|attributes| attributes.value().clone())
            .unwrap_or_default()
    }

    fn insert<E: Entity>(&self, state: &mut State, entity: &mut E) -> PersistenceResult<()> {
        let key = TypeKey::of::<E>();
        let unique = self.unique_attributes::<E>();
        let sequences = self.sequence_attributes::<E>();
        let table = state.table_mut(key);

        if entity.id().is_none() {
            table.sequence += 1;
            if let Some(id) = E::next_id(table.sequence) {
                entity.set_id(id);
            }
        }
        let Some(id) = entity.id().cloned() else {
            let driver = DriverError::new(
                "23502",
                format!(
                    "ERROR: null value in column \"{}\" of relation \"{}\" violates not-null constraint",
                    E::ID_ATTRIBUTE,
                    table.name
                ),
            );
            return Err(PersistenceError::constraint_violation(
                "could not execute statement",
                driver,
            ));
        };

        for attribute in &sequences {
            let value = Value::from(table.next_value(attribute));
            if !entity.assign(attribute, &value) {
                return Err(unassignable::<E>(attribute));
            }
        }

        let id: Value = id.into();
        let row = snapshot(entity, &id, 0);
        table.check_unique(E::ID_ATTRIBUTE, &table.primary_key(), &id, None)?;
        for attribute in &unique {
            let constraint = format!("{}_{}_key", table.name, attribute);
            table.check_unique(attribute, &constraint, &row.get(attribute), None)?;
        }

        entity.set_version(0);
        entity.set_persisted(true);
        tracing::trace!(table = %table.name, id = %id, "insert");
        table.entries.push(Stored {
            id,
            version: 0,
            row,
            entity: Box::new(entity.clone()),
        });
        Ok(())
    }
}

impl fmt::Debug for MemorySession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemorySession")
            .field("graphs", &self.inner.graphs.len())
            .finish_non_exhaustive()
    }
}

fn snapshot<E: Entity>(entity: &E, id: &Value, version: i32) -> Row {
    let mut row = entity.to_row();
    row.values.insert(E::ID_ATTRIBUTE.to_string(), id.clone());
    row.values
        .insert(VERSION_ATTRIBUTE.to_string(), Value::from(version));
    row
}

fn stale<E: Entity>(id: &E::Id) -> PersistenceError {
    PersistenceError::optimistic_lock(format!(
        "Row was updated or deleted by another transaction: [{}#{}]",
        TypeKey::of::<E>().short_name(),
        id
    ))
}

fn unassignable<E: 'static>(attribute: &str) -> PersistenceError {
    PersistenceError::query_failed(format!(
        "{} has no assignable attribute {}",
        TypeKey::of::<E>().short_name(),
        attribute
    ))
}

fn check_patterns(predicate: Option<&Predicate>) -> PersistenceResult<()> {
    predicate.map_or(Ok(()), |predicate| {
        predicate
            .check_patterns()
            .map_err(|err| PersistenceError::query_failed(format!("invalid LIKE pattern: {}", err)))
    })
}

fn not_managed<E: 'static>() -> PersistenceError {
    PersistenceError::not_managed(format!(
        "{} is not managed by this session",
        TypeKey::of::<E>().short_name()
    ))
}

fn window_bounds(window: Option<Window>) -> (usize, usize) {
    match window {
        Some(window) => (
            usize::try_from(window.offset).unwrap_or(usize::MAX),
            usize::try_from(window.limit).unwrap_or(usize::MAX),
        ),
        None => (0, usize::MAX),
    }
}

impl Session for MemorySession {
    async fn find<E: Entity>(&self, id: &E::Id, hints: &QueryHints) -> PersistenceResult<Option<E>> {
        let mut state = self.inner.state.lock().await;
        state.take_failure()?;
        state.record_graph(hints);

        let id: Value = id.clone().into();
        let found = state.tables.get(&TypeId::of::<E>()).and_then(|table| {
            table
                .position(&id)
                .and_then(|index| table.entries[index].entity.downcast_ref::<E>().cloned())
        });
        Ok(found)
    }

    async fn list<E: Entity>(
        &self,
        query: &CriteriaQuery<E>,
        window: Option<Window>,
        hints: &QueryHints,
    ) -> PersistenceResult<Vec<E>> {
        let mut state = self.inner.state.lock().await;
        state.take_failure()?;
        state.record_graph(hints);
        let state = &*state;
        check_patterns(query.restriction())?;
        check_patterns(query.having_predicate())?;

        let layout = Layout::of(query.roots());
        let slot = query
            .result_root()
            .and_then(|root| layout.root_slot(root))
            .ok_or_else(|| {
                PersistenceError::query_failed(format!(
                    "no root of result type {} in query",
                    query.result_type().short_name()
                ))
            })?;

        let tuples: Vec<_> = layout
            .tuples(state)
            .into_iter()
            .filter(|tuple| layout.matches(tuple, query.restriction()))
            .collect();
        let groups = layout.groups(tuples, query.group_by_paths(), query.having_predicate());
        let mut tuples: Vec<_> = if query.group_by_paths().is_empty() {
            groups.into_iter().flatten().collect()
        } else {
            groups
                .into_iter()
                .filter_map(|group| group.into_iter().next())
                .collect()
        };
        layout.sort(&mut tuples, query.ordering());

        let mut entries: Vec<usize> = tuples.iter().filter_map(|tuple| entry_of(tuple, slot)).collect();
        if query.is_distinct() {
            let mut seen = HashSet::new();
            entries.retain(|entry| seen.insert(*entry));
        }

        let (offset, limit) = window_bounds(window);
        let table = state.tables.get(&TypeId::of::<E>());
        entries
            .into_iter()
            .skip(offset)
            .take(limit)
            .map(|entry| {
                table
                    .and_then(|table| table.entries.get(entry))
                    .and_then(|stored| stored.entity.downcast_ref::<E>())
                    .cloned()
                    .ok_or_else(|| PersistenceError::query_failed("stored row does not match result type"))
            })
            .collect()
    }

    fn stream<'a, E: Entity>(
        &'a self,
        query: CriteriaQuery<E>,
        window: Window,
    ) -> BoxStream<'a, PersistenceResult<E>> {
        stream::once(async move { self.list(&query, Some(window), &QueryHints::default()).await })
            .map_ok(|entities| stream::iter(entities.into_iter().map(Ok::<E, PersistenceError>)))
            .try_flatten()
            .boxed()
    }

    async fn count(&self, query: &CriteriaQuery<i64>) -> PersistenceResult<i64> {
        let mut state = self.inner.state.lock().await;
        state.take_failure()?;
        let state = &*state;
        check_patterns(query.restriction())?;
        check_patterns(query.having_predicate())?;

        let Selection::Count { root, distinct } = query.selection() else {
            return Err(PersistenceError::query_failed("query does not select a count"));
        };
        let layout = Layout::of(query.roots());
        let slot = layout
            .root_slot(root)
            .ok_or_else(|| PersistenceError::query_failed("count root is out of range"))?;

        let tuples: Vec<_> = layout
            .tuples(state)
            .into_iter()
            .filter(|tuple| layout.matches(tuple, query.restriction()))
            .collect();
        let mut groups = layout.groups(tuples, query.group_by_paths(), query.having_predicate());
        if groups.len() > 1 {
            return Err(PersistenceError::new(
                crate::session::PersistenceErrorKind::NonUniqueResult,
                format!("count query returned {} rows", groups.len()),
            ));
        }
        let Some(group) = groups.pop() else {
            return Ok(0);
        };

        let counted = if distinct {
            group
                .iter()
                .filter_map(|tuple| entry_of(tuple, slot))
                .collect::<HashSet<_>>()
                .len()
        } else {
            group.len()
        };
        Ok(i64::try_from(counted).unwrap_or(i64::MAX))
    }

    async fn execute_delete(&self, query: &DeleteQuery) -> PersistenceResult<u64> {
        let mut state = self.inner.state.lock().await;
        state.take_failure()?;
        check_patterns(query.restriction())?;

        let Some(table) = state.tables.get_mut(&query.entity().id()) else {
            return Ok(0);
        };
        let before = table.entries.len();
        table
            .entries
            .retain(|stored| !row_matches(&stored.row, query.restriction()));
        let removed = before - table.entries.len();
        tracing::trace!(table = %table.name, removed, "bulk delete");
        Ok(removed as u64)
    }

    async fn execute_update<E: Entity>(&self, query: &UpdateQuery<E>) -> PersistenceResult<u64> {
        let mut state = self.inner.state.lock().await;
        state.take_failure()?;
        check_patterns(query.restriction())?;

        let sequences = self.sequence_attributes::<E>();
        if let Some((attribute, _)) = query.assignments().iter().find(|(attribute, _)| {
            attribute == E::ID_ATTRIBUTE || attribute == VERSION_ATTRIBUTE || sequences.contains(attribute)
        }) {
            return Err(PersistenceError::query_failed(format!(
                "{}.{} is not updatable",
                TypeKey::of::<E>().short_name(),
                attribute
            )));
        }
        let unique = self.unique_attributes::<E>();
        let Some(table) = state.tables.get_mut(&TypeId::of::<E>()) else {
            return Ok(0);
        };

        let mut updated = Vec::new();
        for (index, stored) in table.entries.iter().enumerate() {
            if !row_matches(&stored.row, query.restriction()) {
                continue;
            }
            let mut entity = stored
                .entity
                .downcast_ref::<E>()
                .cloned()
                .ok_or_else(|| PersistenceError::query_failed("stored row does not match update type"))?;
            for (attribute, value) in query.assignments() {
                if !entity.assign(attribute, value) {
                    return Err(unassignable::<E>(attribute));
                }
            }
            let version = stored.version + 1;
            entity.set_version(version);
            let row = snapshot(&entity, &stored.id, version);
            updated.push((
                index,
                Stored {
                    id: stored.id.clone(),
                    version,
                    row,
                    entity: Box::new(entity),
                },
            ));
        }

        // Constraints hold over the table as it would look after the update
        {
            let replaced: HashMap<usize, &Stored> =
                updated.iter().map(|(index, stored)| (*index, stored)).collect();
            for attribute in &unique {
                let mut seen = HashSet::new();
                for (index, stored) in table.entries.iter().enumerate() {
                    let row = &replaced.get(&index).copied().unwrap_or(stored).row;
                    let value = row.get(attribute);
                    if !value.is_null() && !seen.insert(value.clone()) {
                        let constraint = format!("{}_{}_key", table.name, attribute);
                        return Err(duplicate_key(&constraint, attribute, &value));
                    }
                }
            }
        }

        let count = updated.len();
        for (index, stored) in updated {
            table.entries[index] = stored;
        }
        tracing::trace!(table = %table.name, updated = count, "bulk update");
        Ok(count as u64)
    }

    async fn text_query<E: Entity>(
        &self,
        condition: &str,
        parameters: &QueryParameters,
        window: Option<Window>,
    ) -> PersistenceResult<Vec<E>> {
        let restriction = text::parse_condition(condition, parameters)?;
        let query = CriteriaQuery::<E>::new()
            .root(Root::of::<E>().alias(TEXT_ALIAS))
            .filter(restriction);
        self.list(&query, window, &QueryHints::default()).await
    }

    async fn named_query<E: Entity>(
        &self,
        name: &str,
        parameters: &QueryParameters,
        window: Option<Window>,
    ) -> PersistenceResult<Vec<E>> {
        let condition = self
            .inner
            .named
            .get(name)
            .filter(|named| named.entity == TypeId::of::<E>())
            .map(|named| named.condition.clone())
            .ok_or_else(|| {
                PersistenceError::query_failed(format!(
                    "no named query {} for {}",
                    name,
                    TypeKey::of::<E>().short_name()
                ))
            })?;
        tracing::trace!(name, "named query");
        self.text_query(&condition, parameters, window).await
    }

    async fn persist<E: Entity>(&self, entity: &mut E) -> PersistenceResult<()> {
        let mut state = self.inner.state.lock().await;
        state.take_failure()?;
        self.insert(&mut state, entity)
    }

    async fn merge<E: Entity>(&self, entity: &E) -> PersistenceResult<E> {
        let mut state = self.inner.state.lock().await;
        state.take_failure()?;

        let Some(id) = entity.id().cloned() else {
            let mut copy = entity.clone();
            self.insert(&mut state, &mut copy)?;
            return Ok(copy);
        };
        let id_value: Value = id.clone().into();
        let Some(index) = state.table_mut(TypeKey::of::<E>()).position(&id_value) else {
            if entity.version().is_some() {
                return Err(stale::<E>(&id));
            }
            let mut copy = entity.clone();
            self.insert(&mut state, &mut copy)?;
            return Ok(copy);
        };

        let unique = self.unique_attributes::<E>();
        let sequences = self.sequence_attributes::<E>();
        let table = state.table_mut(TypeKey::of::<E>());
        let current = table.entries[index].version;
        // An unversioned instance is a new row, which collides with the stored key
        let Some(expected) = entity.version() else {
            return Err(duplicate_key(&table.primary_key(), E::ID_ATTRIBUTE, &id_value));
        };
        if expected != current {
            return Err(stale::<E>(&id));
        }

        let mut merged = entity.clone();
        for attribute in &sequences {
            let generated = table.entries[index].row.get(attribute);
            if !merged.assign(attribute, &generated) {
                return Err(unassignable::<E>(attribute));
            }
        }

        let version = current + 1;
        let row = snapshot(&merged, &id_value, version);
        for attribute in &unique {
            let constraint = format!("{}_{}_key", table.name, attribute);
            table.check_unique(attribute, &constraint, &row.get(attribute), Some(&id_value))?;
        }

        merged.set_version(version);
        merged.set_persisted(true);
        tracing::trace!(table = %table.name, id = %id_value, version, "update");
        table.entries[index] = Stored {
            id: id_value,
            version,
            row,
            entity: Box::new(merged.clone()),
        };
        Ok(merged)
    }

    async fn remove<E: Entity>(&self, entity: &E) -> PersistenceResult<()> {
        let mut state = self.inner.state.lock().await;
        state.take_failure()?;

        let id: Value = entity.id().cloned().ok_or_else(not_managed::<E>)?.into();
        let table = state.table_mut(TypeKey::of::<E>());
        let index = table.position(&id).ok_or_else(not_managed::<E>)?;
        table.entries.remove(index);
        tracing::trace!(table = %table.name, id = %id, "delete");
        Ok(())
    }

    async fn refresh<E: Entity>(&self, entity: &mut E) -> PersistenceResult<()> {
        let mut state = self.inner.state.lock().await;
        state.take_failure()?;

        let stored = entity.id().cloned().and_then(|id| {
            let id: Value = id.into();
            let table = state.tables.get(&TypeId::of::<E>())?;
            let index = table.position(&id)?;
            table.entries[index].entity.downcast_ref::<E>().cloned()
        });
        match stored {
            Some(stored) => {
                *entity = stored;
                Ok(())
            }
            None => Err(not_managed::<E>()),
        }
    }

    async fn lock<E: Entity>(&self, entity: &E, mode: LockMode) -> PersistenceResult<()> {
        let mut state = self.inner.state.lock().await;
        state.take_failure()?;

        let id: Value = entity.id().cloned().ok_or_else(not_managed::<E>)?.into();
        let table = state.table_mut(TypeKey::of::<E>());
        let index = table.position(&id).ok_or_else(not_managed::<E>)?;

        if mode.increments_version() {
            let stored = &mut table.entries[index];
            stored.version += 1;
            stored
                .row
                .values
                .insert(VERSION_ATTRIBUTE.to_string(), Value::from(stored.version));
            if let Some(current) = stored.entity.downcast_mut::<E>() {
                current.set_version(stored.version);
            }
        }
        tracing::trace!(table = %table.name, id = %id, mode = %mode, "lock");
        Ok(())
    }

    async fn flush(&self) -> PersistenceResult<()> {
        self.inner.state.lock().await.take_failure()
    }

    fn entity_graph(&self, name: &str) -> PersistenceResult<EntityGraph> {
        self.inner
            .graphs
            .get(name)
            .map(|graph| graph.value().clone())
            .ok_or_else(|| PersistenceError::entity_graph_not_found(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::HasVersion;
    use crate::query::{derive_count_query, Join, OrderDirection};
    use crate::session::PersistenceErrorKind;
    use crate::test_support::{seed_users, Order, User};

    #[tokio::test]
    async fn test_persist_assigns_version_and_sequence_id() {
        let session = MemorySession::new();
        let mut order = Order::new(12);
        session.persist(&mut order).await.expect("persist");
        assert_eq!(order.persistent.id(), Some(&1));
        assert_eq!(order.version(), Some(0));
        assert!(order.is_persisted());

        let mut second = Order::new(3);
        session.persist(&mut second).await.expect("persist");
        assert_eq!(second.persistent.id(), Some(&2));
    }

    #[tokio::test]
    async fn test_duplicate_unique_value_reports_driver_message() {
        let session = MemorySession::new();
        session.register_unique::<User>("email");
        let mut first = User::new("a@example.com", "Ann", 1);
        session.persist(&mut first).await.expect("persist");

        let mut clash = User::new("a@example.com", "Another Ann", 2);
        let err = session.persist(&mut clash).await.unwrap_err();
        assert_eq!(err.kind, PersistenceErrorKind::ConstraintViolation);
        let driver = std::error::Error::source(&err)
            .and_then(|source| source.downcast_ref::<DriverError>())
            .expect("driver error");
        assert_eq!(driver.code.as_deref(), Some("23505"));
        assert!(driver.message.contains("\"user_email_key\""));
        assert!(driver.message.contains('\n'));
        assert_eq!(session.row_count::<User>().await, 1);
    }

    #[tokio::test]
    async fn test_merge_checks_version() {
        let session = MemorySession::new();
        let mut user = User::new("b@example.com", "Bo", 1);
        session.persist(&mut user).await.expect("persist");

        let updated = session.merge(&user).await.expect("merge");
        assert_eq!(updated.version(), Some(1));

        let err = session.merge(&user).await.unwrap_err();
        assert_eq!(err.kind, PersistenceErrorKind::OptimisticLock);
    }

    #[tokio::test]
    async fn test_merge_without_version_collides_with_stored_row() {
        let session = MemorySession::new();
        let mut user = User::new("g@example.com", "Gus", 1);
        session.persist(&mut user).await.expect("persist");

        let mut copy = User::new("h@example.com", "Hijack", 2);
        copy.persistent.set_id(user.persistent.id().cloned().expect("id"));
        let err = session.merge(&copy).await.unwrap_err();
        assert_eq!(err.kind, PersistenceErrorKind::ConstraintViolation);
        assert!(err.is_integrity_violation());

        let mut stored = user.clone();
        session.refresh(&mut stored).await.expect("refresh");
        assert_eq!(stored.name, "Gus");
        assert_eq!(stored.version(), Some(0));
    }

    #[tokio::test]
    async fn test_remove_requires_managed_row() {
        let session = MemorySession::new();
        let mut user = User::new("i@example.com", "Ida", 1);
        let err = session.remove(&user).await.unwrap_err();
        assert_eq!(err.kind, PersistenceErrorKind::EntityNotManaged);

        let order = Order::new(5);
        let err = session.remove(&order).await.unwrap_err();
        assert_eq!(err.kind, PersistenceErrorKind::EntityNotManaged);

        session.persist(&mut user).await.expect("persist");
        session.remove(&user).await.expect("remove");
        assert_eq!(session.row_count::<User>().await, 0);
        let err = session.remove(&user).await.unwrap_err();
        assert_eq!(err.kind, PersistenceErrorKind::EntityNotManaged);
    }

    #[tokio::test]
    async fn test_having_without_group_by_filters_everything() {
        let session = MemorySession::new();
        seed_users(&session, 5).await;

        let rejected = CriteriaQuery::<User>::from_entity().having(Predicate::eq("rank", 999_i64));
        let listed = session
            .list(&rejected, None, &QueryHints::default())
            .await
            .expect("list");
        assert!(listed.is_empty());
        let count = derive_count_query(&rejected).expect("countable");
        assert_eq!(session.count(&count).await.expect("count"), 0);

        let kept = CriteriaQuery::<User>::from_entity().having(Predicate::is_not_null("email"));
        let listed = session
            .list(&kept, None, &QueryHints::default())
            .await
            .expect("list");
        assert_eq!(listed.len(), 5);
        let count = derive_count_query(&kept).expect("countable");
        assert_eq!(session.count(&count).await.expect("count"), 5);
    }

    #[tokio::test]
    async fn test_lock_force_increment_makes_copies_stale() {
        let session = MemorySession::new();
        let mut user = User::new("c@example.com", "Cy", 1);
        session.persist(&mut user).await.expect("persist");

        session.lock(&user, LockMode::PessimisticRead).await.expect("lock");
        session
            .lock(&user, LockMode::OptimisticForceIncrement)
            .await
            .expect("lock");
        let err = session.merge(&user).await.unwrap_err();
        assert_eq!(err.kind, PersistenceErrorKind::OptimisticLock);

        session.refresh(&mut user).await.expect("refresh");
        assert_eq!(user.version(), Some(1));
    }

    #[tokio::test]
    async fn test_refresh_unknown_entity_is_not_managed() {
        let session = MemorySession::new();
        let mut user = User::new("d@example.com", "Di", 1);
        let err = session.refresh(&mut user).await.unwrap_err();
        assert_eq!(err.kind, PersistenceErrorKind::EntityNotManaged);
    }

    #[tokio::test]
    async fn test_list_orders_filters_and_windows() {
        let session = MemorySession::new();
        seed_users(&session, 20).await;

        let query = CriteriaQuery::<User>::from_entity()
            .filter(Predicate::gte("rank", 5_i64))
            .order_by("rank", OrderDirection::Descending);
        let users = session
            .list(&query, Some(Window::new(2, 3)), &QueryHints::default())
            .await
            .expect("list");
        let ranks: Vec<i64> = users.iter().map(|u| u.rank).collect();
        assert_eq!(ranks, vec![17, 16, 15]);
    }

    #[tokio::test]
    async fn test_join_fan_out_and_distinct_count() {
        let session = MemorySession::new();
        let mut user = User::new("e@example.com", "Ed", 1).with_orders(&[10, 20, 30]);
        session.persist(&mut user).await.expect("persist");
        let mut other = User::new("f@example.com", "Fa", 2);
        session.persist(&mut other).await.expect("persist");

        let joined = CriteriaQuery::<User>::new()
            .root(Root::of::<User>().alias("u").join(Join::inner("orders").alias("o")))
            .filter(Predicate::gt("o.total", 5_i64));
        let fan_out = session
            .list(&joined, None, &QueryHints::default())
            .await
            .expect("list");
        assert_eq!(fan_out.len(), 3);

        let count = derive_count_query(&joined.clone().distinct(true)).expect("countable");
        assert_eq!(session.count(&count).await.expect("count"), 1);
        let count = derive_count_query(&joined).expect("countable");
        assert_eq!(session.count(&count).await.expect("count"), 3);

        let left = CriteriaQuery::<User>::new()
            .root(Root::of::<User>().join(Join::left("orders")))
            .distinct(true);
        let everyone = session
            .list(&left, None, &QueryHints::default())
            .await
            .expect("list");
        assert_eq!(everyone.len(), 2);
    }

    #[tokio::test]
    async fn test_grouped_count_is_single_result_only() {
        let session = MemorySession::new();
        seed_users(&session, 4).await;

        let grouped = CriteriaQuery::<User>::from_entity().group_by("name");
        let count = derive_count_query(&grouped).expect("countable");
        let err = session.count(&count).await.unwrap_err();
        assert_eq!(err.kind, PersistenceErrorKind::NonUniqueResult);

        let single = CriteriaQuery::<User>::from_entity()
            .filter(Predicate::eq("rank", 2_i64))
            .group_by("name");
        let count = derive_count_query(&single).expect("countable");
        assert_eq!(session.count(&count).await.expect("count"), 1);
    }

    #[tokio::test]
    async fn test_execute_delete_and_failure_injection() {
        let session = MemorySession::new();
        seed_users(&session, 10).await;

        let removed = session
            .execute_delete(&DeleteQuery::of::<User>().filter(Predicate::lt("rank", 4_i64)))
            .await
            .expect("delete");
        assert_eq!(removed, 4);
        assert_eq!(session.row_count::<User>().await, 6);

        session.fail_next(PersistenceError::timeout("statement timeout")).await;
        assert!(session.flush().await.is_err());
        assert!(session.flush().await.is_ok());
    }

    #[tokio::test]
    async fn test_entity_graph_lookup() {
        let session = MemorySession::new();
        session.register_graph(EntityGraph::new("User.loadAll", vec!["orders".to_string()]));
        assert!(session.entity_graph("User.loadAll").is_ok());
        let err = session.entity_graph("User.loadByGuid").unwrap_err();
        assert_eq!(err.kind, PersistenceErrorKind::EntityGraphNotFound);
    }

    #[tokio::test]
    async fn test_stream_is_lazy() {
        let session = MemorySession::new();
        seed_users(&session, 5).await;

        let stream = session.stream(CriteriaQuery::<User>::from_entity(), Window::first(100));
        seed_users(&session, 5).await;
        let users: Vec<User> = stream.try_collect().await.expect("stream");
        assert_eq!(users.len(), 10);
    }

    #[tokio::test]
    async fn test_sequence_attributes_are_generated_once() {
        let session = MemorySession::new();
        session.register_sequence::<Order>("bid");
        let mut first = Order::new(10);
        session.persist(&mut first).await.expect("persist");
        let mut second = Order::new(20);
        second.bid = Some(99);
        session.persist(&mut second).await.expect("persist");
        assert_eq!(first.bid, Some(1));
        assert_eq!(second.bid, Some(2));

        let mut edited = second.clone();
        edited.bid = Some(7);
        edited.total = 25;
        let merged = session.merge(&edited).await.expect("merge");
        assert_eq!(merged.bid, Some(2));
        assert_eq!(merged.total, 25);

        let unassignable = MemorySession::new();
        unassignable.register_sequence::<User>("serial");
        let mut user = User::new("s@example.com", "Sam", 1);
        let err = unassignable.persist(&mut user).await.unwrap_err();
        assert_eq!(err.kind, PersistenceErrorKind::QueryFailed);
    }

    #[tokio::test]
    async fn test_execute_update_assigns_and_bumps_versions() {
        let session = MemorySession::new();
        seed_users(&session, 6).await;

        let updated = session
            .execute_update(
                &UpdateQuery::<User>::new()
                    .set("name", "Senior")
                    .filter(Predicate::gte("rank", 4_i64)),
            )
            .await
            .expect("update");
        assert_eq!(updated, 2);

        let seniors = session
            .list(
                &CriteriaQuery::<User>::from_entity().filter(Predicate::eq("name", "Senior")),
                None,
                &QueryHints::default(),
            )
            .await
            .expect("list");
        assert_eq!(seniors.len(), 2);
        assert!(seniors.iter().all(|user| user.version() == Some(1)));

        let err = session
            .execute_update(&UpdateQuery::<User>::new().set("version", 9_i64))
            .await
            .unwrap_err();
        assert_eq!(err.kind, PersistenceErrorKind::QueryFailed);
        let err = session
            .execute_update(&UpdateQuery::<User>::new().set("nickname", "x"))
            .await
            .unwrap_err();
        assert_eq!(err.kind, PersistenceErrorKind::QueryFailed);
    }

    #[tokio::test]
    async fn test_execute_update_respects_unique_constraints() {
        let session = MemorySession::new();
        session.register_unique::<User>("email");
        seed_users(&session, 3).await;

        let err = session
            .execute_update(&UpdateQuery::<User>::new().set("email", "same@example.com"))
            .await
            .unwrap_err();
        assert_eq!(err.kind, PersistenceErrorKind::ConstraintViolation);
        let driver = std::error::Error::source(&err)
            .and_then(|source| source.downcast_ref::<DriverError>())
            .expect("driver error");
        assert!(driver.message.contains("\"user_email_key\""));

        let untouched = session
            .text_query::<User>("e.email = :email", &parameters("email", "user0@example.com"), None)
            .await
            .expect("query");
        assert_eq!(untouched.len(), 1);
        assert_eq!(untouched[0].version(), Some(0));

        let renamed = session
            .execute_update(
                &UpdateQuery::<User>::new()
                    .set("email", "first@example.com")
                    .filter(Predicate::eq("rank", 0_i64)),
            )
            .await
            .expect("update");
        assert_eq!(renamed, 1);
    }

    fn parameters(name: &str, value: impl Into<Value>) -> QueryParameters {
        QueryParameters::from([(name.to_string(), vec![value.into()])])
    }

    #[tokio::test]
    async fn test_text_and_named_queries() {
        let session = MemorySession::new();
        seed_users(&session, 10).await;
        session.register_named_query::<User>("User.ranked", "rank >= :min AND e.name LIKE 'User %'");

        let found = session
            .text_query::<User>(
                "e.rank IN (:ranks) OR e.email = :email",
                &QueryParameters::from([
                    ("ranks".to_string(), vec![Value::from(1_i64), Value::from(2_i64)]),
                    ("email".to_string(), vec![Value::from("user9@example.com")]),
                ]),
                None,
            )
            .await
            .expect("text query");
        assert_eq!(found.len(), 3);

        let ranked = session
            .named_query::<User>("User.ranked", &parameters("min", 7_i64), Some(Window::first(2)))
            .await
            .expect("named query");
        assert_eq!(ranked.len(), 2);

        let err = session
            .named_query::<Order>("User.ranked", &parameters("min", 7_i64), None)
            .await
            .unwrap_err();
        assert_eq!(err.kind, PersistenceErrorKind::QueryFailed);
        let err = session
            .named_query::<User>("User.unknown", &QueryParameters::new(), None)
            .await
            .unwrap_err();
        assert_eq!(err.kind, PersistenceErrorKind::QueryFailed);
    }

    #[tokio::test]
    async fn test_invalid_like_pattern_fails_query() {
        let session = MemorySession::new();
        seed_users(&session, 2).await;

        let oversized = "_".repeat(2_000_000);
        let query = CriteriaQuery::<User>::from_entity().filter(Predicate::like("email", oversized));
        let err = session
            .list(&query, None, &QueryHints::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind, PersistenceErrorKind::QueryFailed);
    }
}
