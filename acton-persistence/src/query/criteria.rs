//! Structural query definitions handed to a session
//!
//! A [`CriteriaQuery`] is the engine-neutral form of a SELECT: roots with
//! their joins and fetches, a restriction, grouping, distinct-ness, ordering
//! and a selection. It is plain data so it can be copied and rewritten
//! (see [`derive_count_query`](super::count::derive_count_query)).
//!
//! # Example
//!
//! ```rust
//! use acton_persistence::query::{CriteriaQuery, Join, OrderDirection, Predicate, Root};
//!
//! struct Customer;
//! struct Invoice;
//!
//! let query = CriteriaQuery::<Customer>::new()
//!     .root(Root::of::<Customer>().alias("c").join(Join::inner("invoices").alias("i")))
//!     .filter(Predicate::gt("i.amount", 100_i64))
//!     .distinct(true)
//!     .order_by("c.name", OrderDirection::Ascending);
//!
//! assert_eq!(query.roots().len(), 1);
//! assert!(query.is_distinct());
//! ```

use std::any::TypeId;
use std::fmt;
use std::marker::PhantomData;

use super::predicate::{Path, Predicate};
use super::value::Value;

/// Runtime identity of an entity or result type
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeKey {
    id: TypeId,
    name: &'static str,
}

impl TypeKey {
    /// Key for type `T`
    pub fn of<T: 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    /// Underlying `TypeId`
    pub fn id(&self) -> TypeId {
        self.id
    }

    /// Fully qualified type name
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Unqualified type name (`app::model::User` becomes `User`)
    pub fn short_name(&self) -> &'static str {
        let base = self.name.split('<').next().unwrap_or(self.name);
        base.rsplit("::").next().unwrap_or(base)
    }
}

impl fmt::Debug for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeKey({})", self.name)
    }
}

/// Direction for ordering results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OrderDirection {
    /// Sort in ascending order (A-Z, 0-9)
    #[default]
    Ascending,
    /// Sort in descending order (Z-A, 9-0)
    Descending,
}

impl fmt::Display for OrderDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ascending => write!(f, "asc"),
            Self::Descending => write!(f, "desc"),
        }
    }
}

/// Ordering term
#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    /// Attribute to order by
    pub path: Path,
    /// Sort direction
    pub direction: OrderDirection,
}

/// Join type for associations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum JoinType {
    /// Rows without an associated element are dropped
    #[default]
    Inner,
    /// Rows without an associated element are kept with NULL attributes
    Left,
}

/// Association fetched eagerly with its owner
///
/// Fetches never restrict or multiply rows; they only tell the engine to
/// load the association together with the root.
#[derive(Debug, Clone, PartialEq)]
pub struct Fetch {
    /// Association attribute
    pub attribute: String,
    /// Join type used for the fetch
    pub join_type: JoinType,
    /// Nested fetches
    pub fetches: Vec<Fetch>,
}

impl Fetch {
    /// Fetch an association with the given join type
    pub fn new(attribute: impl Into<String>, join_type: JoinType) -> Self {
        Self {
            attribute: attribute.into(),
            join_type,
            fetches: Vec::new(),
        }
    }

    /// Add a nested fetch
    #[must_use]
    pub fn fetch(mut self, fetch: Fetch) -> Self {
        self.fetches.push(fetch);
        self
    }
}

/// Join along an association attribute
#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    /// Association attribute
    pub attribute: String,
    /// Join type
    pub join_type: JoinType,
    /// Alias referenced by predicates
    pub alias: Option<String>,
    /// Joins of this join
    pub joins: Vec<Join>,
    /// Fetches attached to this join
    pub fetches: Vec<Fetch>,
}

impl Join {
    /// Join with an explicit join type
    pub fn new(attribute: impl Into<String>, join_type: JoinType) -> Self {
        Self {
            attribute: attribute.into(),
            join_type,
            alias: None,
            joins: Vec::new(),
            fetches: Vec::new(),
        }
    }

    /// Inner join
    pub fn inner(attribute: impl Into<String>) -> Self {
        Self::new(attribute, JoinType::Inner)
    }

    /// Left outer join
    pub fn left(attribute: impl Into<String>) -> Self {
        Self::new(attribute, JoinType::Left)
    }

    /// Set the alias
    #[must_use]
    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// Add a nested join
    #[must_use]
    pub fn join(mut self, join: Join) -> Self {
        self.joins.push(join);
        self
    }

    /// Add a fetch
    #[must_use]
    pub fn fetch(mut self, fetch: Fetch) -> Self {
        self.fetches.push(fetch);
        self
    }
}

/// Query root over an entity type
#[derive(Debug, Clone, PartialEq)]
pub struct Root {
    /// Entity type of the root
    pub entity: TypeKey,
    /// Alias referenced by predicates
    pub alias: Option<String>,
    /// Joins from this root
    pub joins: Vec<Join>,
    /// Fetches from this root
    pub fetches: Vec<Fetch>,
}

impl Root {
    /// Root over entity type `E`
    pub fn of<E: 'static>() -> Self {
        Self::with_key(TypeKey::of::<E>())
    }

    /// Root over an entity type key
    pub fn with_key(entity: TypeKey) -> Self {
        Self {
            entity,
            alias: None,
            joins: Vec::new(),
            fetches: Vec::new(),
        }
    }

    /// Set the alias
    #[must_use]
    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// Add a join
    #[must_use]
    pub fn join(mut self, join: Join) -> Self {
        self.joins.push(join);
        self
    }

    /// Add a fetch
    #[must_use]
    pub fn fetch(mut self, fetch: Fetch) -> Self {
        self.fetches.push(fetch);
        self
    }
}

/// What a query returns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    /// The first root whose entity type equals the result type
    Entity,
    /// Row count over the root at the given index
    Count {
        /// Index into the query's roots
        root: usize,
        /// Count distinct root entities instead of rows
        distinct: bool,
    },
}

/// Engine-neutral SELECT definition producing values of type `R`
pub struct CriteriaQuery<R> {
    pub(crate) roots: Vec<Root>,
    pub(crate) group_by: Vec<Path>,
    pub(crate) having: Option<Predicate>,
    pub(crate) distinct: bool,
    pub(crate) restriction: Option<Predicate>,
    pub(crate) order_by: Vec<Order>,
    pub(crate) selection: Selection,
    pub(crate) result_type: TypeKey,
    _result: PhantomData<fn() -> R>,
}

impl<R: 'static> CriteriaQuery<R> {
    /// Empty query declaring `R` as its result type
    pub fn new() -> Self {
        Self {
            roots: Vec::new(),
            group_by: Vec::new(),
            having: None,
            distinct: false,
            restriction: None,
            order_by: Vec::new(),
            selection: Selection::Entity,
            result_type: TypeKey::of::<R>(),
            _result: PhantomData,
        }
    }

    /// Query with a single unaliased root over `R`
    pub fn from_entity() -> Self {
        Self::new().root(Root::of::<R>())
    }
}

impl<R: 'static> Default for CriteriaQuery<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R> CriteriaQuery<R> {
    /// Add a root
    #[must_use]
    pub fn root(mut self, root: Root) -> Self {
        self.roots.push(root);
        self
    }

    /// Replace the restriction
    #[must_use]
    pub fn restrict(mut self, predicate: Predicate) -> Self {
        self.restriction = Some(predicate);
        self
    }

    /// AND a predicate into the restriction
    #[must_use]
    pub fn filter(mut self, predicate: Predicate) -> Self {
        self.restriction = Some(match self.restriction.take() {
            Some(existing) => existing.and_also(predicate),
            None => predicate,
        });
        self
    }

    /// Add a group-by path
    #[must_use]
    pub fn group_by(mut self, path: impl Into<Path>) -> Self {
        self.group_by.push(path.into());
        self
    }

    /// Set the having predicate
    #[must_use]
    pub fn having(mut self, predicate: Predicate) -> Self {
        self.having = Some(predicate);
        self
    }

    /// Set the distinct flag
    #[must_use]
    pub fn distinct(mut self, distinct: bool) -> Self {
        self.distinct = distinct;
        self
    }

    /// Add an ordering term
    #[must_use]
    pub fn order_by(mut self, path: impl Into<Path>, direction: OrderDirection) -> Self {
        self.order_by.push(Order {
            path: path.into(),
            direction,
        });
        self
    }

    /// Roots in declaration order
    pub fn roots(&self) -> &[Root] {
        &self.roots
    }

    /// Group-by paths
    pub fn group_by_paths(&self) -> &[Path] {
        &self.group_by
    }

    /// Having predicate
    pub fn having_predicate(&self) -> Option<&Predicate> {
        self.having.as_ref()
    }

    /// Where restriction
    pub fn restriction(&self) -> Option<&Predicate> {
        self.restriction.as_ref()
    }

    /// Whether duplicate root entities are eliminated
    pub fn is_distinct(&self) -> bool {
        self.distinct
    }

    /// Ordering terms
    pub fn ordering(&self) -> &[Order] {
        &self.order_by
    }

    /// Selection
    pub fn selection(&self) -> Selection {
        self.selection
    }

    /// Declared result type
    pub fn result_type(&self) -> TypeKey {
        self.result_type
    }

    /// Index of the first root whose entity type equals the result type
    pub fn result_root(&self) -> Option<usize> {
        self.roots
            .iter()
            .position(|root| root.entity.id() == self.result_type.id())
    }
}

impl<R> Clone for CriteriaQuery<R> {
    fn clone(&self) -> Self {
        Self {
            roots: self.roots.clone(),
            group_by: self.group_by.clone(),
            having: self.having.clone(),
            distinct: self.distinct,
            restriction: self.restriction.clone(),
            order_by: self.order_by.clone(),
            selection: self.selection,
            result_type: self.result_type,
            _result: PhantomData,
        }
    }
}

impl<R> fmt::Debug for CriteriaQuery<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CriteriaQuery")
            .field("result_type", &self.result_type)
            .field("roots", &self.roots)
            .field("restriction", &self.restriction)
            .field("group_by", &self.group_by)
            .field("having", &self.having)
            .field("distinct", &self.distinct)
            .field("order_by", &self.order_by)
            .field("selection", &self.selection)
            .finish()
    }
}

/// Bulk DELETE over one entity type
///
/// Executed directly by the engine; per-entity lifecycle hooks do not run.
#[derive(Debug, Clone, PartialEq)]
pub struct DeleteQuery {
    entity: TypeKey,
    restriction: Option<Predicate>,
}

impl DeleteQuery {
    /// Unconditional delete of every `E`
    pub fn of<E: 'static>() -> Self {
        Self {
            entity: TypeKey::of::<E>(),
            restriction: None,
        }
    }

    /// AND a predicate into the restriction
    #[must_use]
    pub fn filter(mut self, predicate: Predicate) -> Self {
        self.restriction = Some(match self.restriction.take() {
            Some(existing) => existing.and_also(predicate),
            None => predicate,
        });
        self
    }

    /// Target entity type
    pub fn entity(&self) -> TypeKey {
        self.entity
    }

    /// Where restriction
    pub fn restriction(&self) -> Option<&Predicate> {
        self.restriction.as_ref()
    }
}

/// Bulk UPDATE over entity type `E`
///
/// Executed directly by the engine: the save hook does not run, but every
/// updated row gets a new version so stale copies fail on merge.
///
/// # Example
///
/// ```rust
/// use acton_persistence::query::{Predicate, UpdateQuery, Value};
///
/// struct Invoice;
///
/// let query = UpdateQuery::<Invoice>::new()
///     .set("status", "archived")
///     .filter(Predicate::lt("year", 2020_i64));
/// assert_eq!(query.assignments(), &[("status".to_string(), Value::from("archived"))]);
/// ```
pub struct UpdateQuery<E> {
    assignments: Vec<(String, Value)>,
    restriction: Option<Predicate>,
    _entity: PhantomData<fn() -> E>,
}

impl<E: 'static> UpdateQuery<E> {
    /// Update touching no attribute and every row
    pub fn new() -> Self {
        Self {
            assignments: Vec::new(),
            restriction: None,
            _entity: PhantomData,
        }
    }

    /// Target entity type
    pub fn entity(&self) -> TypeKey {
        TypeKey::of::<E>()
    }
}

impl<E: 'static> Default for UpdateQuery<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> UpdateQuery<E> {
    /// Assign `value` to `attribute`; a later assignment of the same attribute wins
    #[must_use]
    pub fn set(mut self, attribute: impl Into<String>, value: impl Into<Value>) -> Self {
        let attribute = attribute.into();
        let value = value.into();
        match self.assignments.iter_mut().find(|(name, _)| *name == attribute) {
            Some(existing) => existing.1 = value,
            None => self.assignments.push((attribute, value)),
        }
        self
    }

    /// AND a predicate into the restriction
    #[must_use]
    pub fn filter(mut self, predicate: Predicate) -> Self {
        self.restriction = Some(match self.restriction.take() {
            Some(existing) => existing.and_also(predicate),
            None => predicate,
        });
        self
    }

    /// Attribute assignments in order
    pub fn assignments(&self) -> &[(String, Value)] {
        &self.assignments
    }

    /// Where restriction
    pub fn restriction(&self) -> Option<&Predicate> {
        self.restriction.as_ref()
    }
}

impl<E> Clone for UpdateQuery<E> {
    fn clone(&self) -> Self {
        Self {
            assignments: self.assignments.clone(),
            restriction: self.restriction.clone(),
            _entity: PhantomData,
        }
    }
}

impl<E> fmt::Debug for UpdateQuery<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpdateQuery")
            .field("entity", &std::any::type_name::<E>())
            .field("assignments", &self.assignments)
            .field("restriction", &self.restriction)
            .finish()
    }
}
