use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{HasIdentity, HasVersion};
use crate::query::Value;

/// Identifier, optimistic-lock version and persisted flag
///
/// Equality and hashing follow the identifier once one is assigned; two
/// instances without an identifier compare structurally.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Persistent<K> {
    id: Option<K>,
    version: Option<i32>,
    #[serde(skip)]
    persisted: bool,
}

impl<K> Persistent<K> {
    /// Unpersisted, without identifier
    pub fn new() -> Self {
        Self {
            id: None,
            version: None,
            persisted: false,
        }
    }

    /// Unpersisted, with a pre-assigned identifier
    pub fn with_id(id: K) -> Self {
        Self {
            id: Some(id),
            version: None,
            persisted: false,
        }
    }

    pub fn id(&self) -> Option<&K> {
        self.id.as_ref()
    }

    pub fn set_id(&mut self, id: K) {
        self.id = Some(id);
    }

    pub fn version(&self) -> Option<i32> {
        self.version
    }

    pub fn set_version(&mut self, version: i32) {
        self.version = Some(version);
    }

    pub fn is_persisted(&self) -> bool {
        self.persisted
    }

    pub fn set_persisted(&mut self, persisted: bool) {
        self.persisted = persisted;
    }
}

impl Persistent<String> {
    /// Unpersisted, with a random v4 GUID
    pub fn with_random_guid() -> Self {
        Self::with_id(Uuid::new_v4().to_string())
    }
}

impl<K: PartialEq> PartialEq for Persistent<K> {
    fn eq(&self, other: &Self) -> bool {
        match (&self.id, &other.id) {
            (Some(a), Some(b)) => a == b,
            _ => {
                self.id == other.id
                    && self.version == other.version
                    && self.persisted == other.persisted
            }
        }
    }
}

impl<K: Eq> Eq for Persistent<K> {}

impl<K: Hash> Hash for Persistent<K> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match &self.id {
            Some(id) => id.hash(state),
            None => {
                self.version.hash(state);
                self.persisted.hash(state);
            }
        }
    }
}

impl<K> HasIdentity for Persistent<K>
where
    K: Clone + Eq + Hash + std::fmt::Debug + std::fmt::Display + Into<Value> + Send + Sync + 'static,
{
    type Id = K;

    fn id(&self) -> Option<&K> {
        Persistent::id(self)
    }

    fn set_id(&mut self, id: K) {
        Persistent::set_id(self, id);
    }
}

impl<K> HasVersion for Persistent<K> {
    fn version(&self) -> Option<i32> {
        Persistent::version(self)
    }

    fn set_version(&mut self, version: i32) {
        Persistent::set_version(self, version);
    }

    fn is_persisted(&self) -> bool {
        Persistent::is_persisted(self)
    }

    fn set_persisted(&mut self, persisted: bool) {
        Persistent::set_persisted(self, persisted);
    }
}
