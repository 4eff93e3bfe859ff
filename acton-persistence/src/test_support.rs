//! Entities shared by unit tests

use chrono::{DateTime, Utc};

use crate::entity::{
    HasAuditFields, HasBusinessId, HasIdentity, HasVersion, Mapped, Persistent, Row, Traceable,
};
use crate::query::Value;
#[cfg(feature = "memory")]
use crate::{memory::MemorySession, session::Session};

/// GUID-keyed entity with an `orders` association
#[derive(Debug, Clone)]
pub struct User {
    pub persistent: Persistent<String>,
    pub traceable: Traceable,
    pub email: String,
    pub name: String,
    pub rank: i64,
    pub orders: Vec<Order>,
}

impl User {
    pub fn new(email: &str, name: &str, rank: i64) -> Self {
        Self {
            persistent: Persistent::with_random_guid(),
            traceable: Traceable::default(),
            email: email.to_string(),
            name: name.to_string(),
            rank,
            orders: Vec::new(),
        }
    }

    pub fn with_orders(mut self, totals: &[i64]) -> Self {
        self.orders = totals.iter().map(|total| Order::new(*total)).collect();
        self
    }
}

impl HasIdentity for User {
    type Id = String;

    fn id(&self) -> Option<&String> {
        self.persistent.id()
    }

    fn set_id(&mut self, id: String) {
        self.persistent.set_id(id);
    }
}

impl HasVersion for User {
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

impl HasAuditFields for User {
    fn creation_user(&self) -> Option<&str> {
        self.traceable.creation_user()
    }

    fn set_creation_user(&mut self, user: Option<String>) {
        self.traceable.set_creation_user(user);
    }

    fn creation_date(&self) -> Option<DateTime<Utc>> {
        self.traceable.creation_date()
    }

    fn set_creation_date(&mut self, date: DateTime<Utc>) {
        self.traceable.set_creation_date(date);
    }

    fn modification_user(&self) -> Option<&str> {
        self.traceable.modification_user()
    }

    fn set_modification_user(&mut self, user: Option<String>) {
        self.traceable.set_modification_user(user);
    }

    fn modification_date(&self) -> Option<DateTime<Utc>> {
        self.traceable.modification_date()
    }

    fn set_modification_date(&mut self, date: DateTime<Utc>) {
        self.traceable.set_modification_date(date);
    }

    fn is_manual_traceability(&self) -> bool {
        self.traceable.is_manual_traceability()
    }
}

impl Mapped for User {
    fn to_row(&self) -> Row {
        Row::new()
            .with("email", self.email.as_str())
            .with("name", self.name.as_str())
            .with("rank", self.rank)
            .with("creation_user", self.traceable.creation_user.clone())
            .with("modification_date", self.traceable.modification_date)
            .with_association("orders", self.orders.iter().map(Order::to_row).collect())
    }

    fn assign(&mut self, attribute: &str, value: &Value) -> bool {
        match (attribute, value) {
            ("email", Value::Text(email)) => self.email = email.clone(),
            ("name", Value::Text(name)) => self.name = name.clone(),
            ("rank", Value::Integer(rank)) => self.rank = *rank,
            _ => return false,
        }
        true
    }
}

/// Entity with engine-generated numeric keys and a business id
#[derive(Debug, Clone)]
pub struct Order {
    pub persistent: Persistent<i64>,
    pub bid: Option<i64>,
    pub total: i64,
}

impl Order {
    pub fn new(total: i64) -> Self {
        Self {
            persistent: Persistent::new(),
            bid: None,
            total,
        }
    }
}

impl HasIdentity for Order {
    type Id = i64;

    const ID_ATTRIBUTE: &'static str = "id";

    fn id(&self) -> Option<&i64> {
        self.persistent.id()
    }

    fn set_id(&mut self, id: i64) {
        self.persistent.set_id(id);
    }

    fn next_id(sequence: u64) -> Option<i64> {
        i64::try_from(sequence).ok()
    }
}

impl HasVersion for Order {
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

impl Mapped for Order {
    fn to_row(&self) -> Row {
        Row::new().with("bid", self.bid).with("total", self.total)
    }

    fn assign(&mut self, attribute: &str, value: &Value) -> bool {
        match (attribute, value.as_i64()) {
            ("bid", Some(bid)) => self.set_bid(bid),
            ("total", Some(total)) => self.total = total,
            _ => return false,
        }
        true
    }
}

impl HasBusinessId for Order {
    fn bid(&self) -> Option<i64> {
        self.bid
    }

    fn set_bid(&mut self, bid: i64) {
        self.bid = Some(bid);
    }
}

/// Type that is never stored; used as a foreign query root
pub struct Address;

/// Persist `count` users with ranks `0..count`
#[cfg(feature = "memory")]
pub async fn seed_users(session: &MemorySession, count: i64) {
    for rank in 0..count {
        let mut user = User::new(
            &format!("user{}@example.com", rank),
            &format!("User {}", rank),
            rank,
        );
        session.persist(&mut user).await.expect("seed user");
    }
}
