//! Entity capability contracts
//!
//! Entities opt into the behavior they need by implementing small traits
//! instead of inheriting from base classes:
//!
//! - [`HasIdentity`]: unique external identifier (GUID or numeric key)
//! - [`HasVersion`]: optimistic-lock version and the derived "persisted" flag
//! - [`HasAuditFields`]: creation/modification actor and timestamp
//! - [`Mapped`]: attribute snapshot the mapping engine evaluates queries against
//! - [`HasBusinessId`]: sequence-generated business id next to the GUID
//!
//! [`Persistent`] and [`Traceable`] are ready-made field bundles a concrete
//! entity embeds and delegates to.
//!
//! # Example
//!
//! ```rust
//! use acton_persistence::entity::{HasIdentity, HasVersion, Mapped, Persistent, Row};
//!
//! #[derive(Debug, Clone)]
//! struct Tag {
//!     persistent: Persistent<String>,
//!     label: String,
//! }
//!
//! impl HasIdentity for Tag {
//!     type Id = String;
//!     fn id(&self) -> Option<&String> { self.persistent.id() }
//!     fn set_id(&mut self, id: String) { self.persistent.set_id(id) }
//! }
//!
//! impl HasVersion for Tag {
//!     fn version(&self) -> Option<i32> { self.persistent.version() }
//!     fn set_version(&mut self, version: i32) { self.persistent.set_version(version) }
//!     fn is_persisted(&self) -> bool { self.persistent.is_persisted() }
//!     fn set_persisted(&mut self, persisted: bool) { self.persistent.set_persisted(persisted) }
//! }
//!
//! impl Mapped for Tag {
//!     fn to_row(&self) -> Row {
//!         Row::new().with("label", self.label.as_str())
//!     }
//! }
//! ```

mod persistent;
mod traceable;

use std::collections::BTreeMap;
use std::fmt;
use std::hash::Hash;

use chrono::{DateTime, Utc};

use crate::query::Value;

pub use persistent::Persistent;
pub use traceable::{
    BeforeSave, NoopHook, PrincipalProvider, SaveAction, Traceable, TraceableListener,
};

/// Entity with a unique external identifier
pub trait HasIdentity {
    /// Identifier type (`String` GUIDs, `i64` surrogate keys, ...)
    type Id: Clone + Eq + Hash + fmt::Debug + fmt::Display + Into<Value> + Send + Sync + 'static;

    /// Attribute name the identifier is stored under
    const ID_ATTRIBUTE: &'static str = "guid";

    /// Current identifier, if assigned
    fn id(&self) -> Option<&Self::Id>;

    /// Assign the identifier
    fn set_id(&mut self, id: Self::Id);

    /// Identifier an engine may assign from its sequence when none is set
    ///
    /// Entities with pre-assigned GUIDs keep the default, which declines.
    fn next_id(_sequence: u64) -> Option<Self::Id> {
        None
    }
}

/// Entity carrying an optimistic-lock version
pub trait HasVersion {
    /// Version, `None` until first persisted
    fn version(&self) -> Option<i32>;

    /// Set the version
    fn set_version(&mut self, version: i32);

    /// Whether the engine has confirmed a load, insert or update
    fn is_persisted(&self) -> bool;

    /// Set the derived persisted flag
    fn set_persisted(&mut self, persisted: bool);
}

/// Entity carrying audit fields
pub trait HasAuditFields {
    fn creation_user(&self) -> Option<&str>;
    fn set_creation_user(&mut self, user: Option<String>);
    fn creation_date(&self) -> Option<DateTime<Utc>>;
    fn set_creation_date(&mut self, date: DateTime<Utc>);
    fn modification_user(&self) -> Option<&str>;
    fn set_modification_user(&mut self, user: Option<String>);
    fn modification_date(&self) -> Option<DateTime<Utc>>;
    fn set_modification_date(&mut self, date: DateTime<Utc>);

    /// When set, audit fields are maintained by the caller
    fn is_manual_traceability(&self) -> bool;
}

/// Entity that exposes its attributes to the mapping engine
pub trait Mapped {
    /// Snapshot of attribute values and associations
    ///
    /// The engine adds the identifier and version itself.
    fn to_row(&self) -> Row;

    /// Write an engine-supplied attribute value back into the entity
    ///
    /// Used for bulk updates and database-generated columns. Returns `false`
    /// when the attribute is unknown or the value has the wrong type.
    fn assign(&mut self, _attribute: &str, _value: &Value) -> bool {
        false
    }
}

/// Entity carrying a sequence-generated business identifier
///
/// The business id is filled by the engine on insert and is never written
/// by updates.
pub trait HasBusinessId {
    /// Attribute name the business id is stored under
    const BID_ATTRIBUTE: &'static str = "bid";

    fn bid(&self) -> Option<i64>;
    fn set_bid(&mut self, bid: i64);
}

/// Everything a repository needs from an entity type
pub trait Entity: HasIdentity + HasVersion + Mapped + Clone + Send + Sync + 'static {}

impl<T> Entity for T where T: HasIdentity + HasVersion + Mapped + Clone + Send + Sync + 'static {}

/// Attribute snapshot of a mapped entity
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    /// Scalar attributes by name
    pub values: BTreeMap<String, Value>,
    /// Associated rows by association attribute
    pub associations: BTreeMap<String, Vec<Row>>,
}

impl Row {
    /// Empty row
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a scalar attribute
    #[must_use]
    pub fn with(mut self, attribute: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.insert(attribute.into(), value.into());
        self
    }

    /// Add an association
    #[must_use]
    pub fn with_association(mut self, attribute: impl Into<String>, rows: Vec<Row>) -> Self {
        self.associations.insert(attribute.into(), rows);
        self
    }

    /// Attribute value, `Null` when absent
    pub fn get(&self, attribute: &str) -> Value {
        self.values.get(attribute).cloned().unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_builder() {
        let row = Row::new()
            .with("email", "a@example.com")
            .with_association("orders", vec![Row::new().with("total", 5_i64)]);
        assert_eq!(row.get("email"), Value::from("a@example.com"));
        assert_eq!(row.get("missing"), Value::Null);
        assert_eq!(row.associations["orders"].len(), 1);
    }
}
