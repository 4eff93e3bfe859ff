//! Bounded membership clauses
//!
//! Backends cap the number of values one `IN` list may bind. The builders here
//! split an arbitrarily large value set into clauses of at most
//! [`MAX_IN_CLAUSE_SIZE`] values: membership chunks are OR-ed, non-membership
//! chunks are AND-ed, so the combined predicate is equivalent to a single
//! unbounded test.
//!
//! # Example
//!
//! ```rust
//! use acton_persistence::query::{in_clause, Predicate, Value};
//!
//! let ids: Vec<Value> = (0..2500_i64).map(Value::from).collect();
//! match in_clause("guid", ids) {
//!     Predicate::Or(chunks) => assert_eq!(chunks.len(), 3),
//!     other => panic!("unexpected {:?}", other),
//! }
//! ```

use std::collections::BTreeMap;

use super::predicate::{Path, Predicate};
use super::value::Value;

/// Largest number of values bound into one membership clause
pub const MAX_IN_CLAUSE_SIZE: usize = 1000;

/// Polarity of a membership clause
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Membership {
    /// `IN`, chunks joined with OR
    In,
    /// `NOT IN`, chunks joined with AND
    NotIn,
}

impl Membership {
    fn keyword(self) -> &'static str {
        match self {
            Self::In => "IN",
            Self::NotIn => "NOT IN",
        }
    }

    fn connective(self) -> &'static str {
        match self {
            Self::In => " OR ",
            Self::NotIn => " AND ",
        }
    }
}

/// `path IN values`, chunked at [`MAX_IN_CLAUSE_SIZE`]
pub fn in_clause(path: impl Into<Path>, values: Vec<Value>) -> Predicate {
    chunked(path, values, Membership::In, MAX_IN_CLAUSE_SIZE)
}

/// `path NOT IN values`, chunked at [`MAX_IN_CLAUSE_SIZE`]
pub fn not_in_clause(path: impl Into<Path>, values: Vec<Value>) -> Predicate {
    chunked(path, values, Membership::NotIn, MAX_IN_CLAUSE_SIZE)
}

/// Membership predicate with an explicit chunk size
///
/// `max_size` is clamped to `1..=MAX_IN_CLAUSE_SIZE`. A value set that fits
/// in one chunk (including the empty set) yields a single clause.
pub fn chunked(
    path: impl Into<Path>,
    values: Vec<Value>,
    membership: Membership,
    max_size: usize,
) -> Predicate {
    let path = path.into();
    let max_size = max_size.clamp(1, MAX_IN_CLAUSE_SIZE);

    let clause = |path: Path, values: Vec<Value>| match membership {
        Membership::In => Predicate::In { path, values },
        Membership::NotIn => Predicate::NotIn { path, values },
    };

    if values.len() <= max_size {
        return clause(path, values);
    }

    let clauses = values
        .chunks(max_size)
        .map(|chunk| clause(path.clone(), chunk.to_vec()))
        .collect();

    match membership {
        Membership::In => Predicate::Or(clauses),
        Membership::NotIn => Predicate::And(clauses),
    }
}

/// Named parameter bindings of a textual query; list parameters bind every value
pub type QueryParameters = BTreeMap<String, Vec<Value>>;

/// Textual membership condition with its named parameter bindings
#[derive(Debug, Clone, PartialEq)]
pub struct TextClause {
    /// Condition text referencing `:name` parameters
    pub condition: String,
    /// Values to bind for each parameter name
    pub parameters: QueryParameters,
}

/// `attribute IN (:parameter)` text form, chunked at [`MAX_IN_CLAUSE_SIZE`]
pub fn in_clause_text(attribute: &str, parameter: &str, values: Vec<Value>) -> TextClause {
    chunked_text(attribute, parameter, values, Membership::In, MAX_IN_CLAUSE_SIZE)
}

/// `attribute NOT IN (:parameter)` text form, chunked at [`MAX_IN_CLAUSE_SIZE`]
pub fn not_in_clause_text(attribute: &str, parameter: &str, values: Vec<Value>) -> TextClause {
    chunked_text(
        attribute,
        parameter,
        values,
        Membership::NotIn,
        MAX_IN_CLAUSE_SIZE,
    )
}

/// Textual membership condition with an explicit chunk size
///
/// The final chunk binds to `parameter` itself; earlier chunks bind to
/// `parameter0`, `parameter1`, ... in order. An empty value set produces a
/// constant condition (`1 = 0` for `IN`, `1 = 1` for `NOT IN`) and no
/// parameters, since an empty bound list is not valid in most dialects.
pub fn chunked_text(
    attribute: &str,
    parameter: &str,
    values: Vec<Value>,
    membership: Membership,
    max_size: usize,
) -> TextClause {
    let max_size = max_size.clamp(1, MAX_IN_CLAUSE_SIZE);
    let mut parameters = BTreeMap::new();

    if values.is_empty() {
        let condition = match membership {
            Membership::In => "1 = 0",
            Membership::NotIn => "1 = 1",
        };
        return TextClause {
            condition: condition.to_string(),
            parameters,
        };
    }

    let keyword = membership.keyword();
    if values.len() <= max_size {
        parameters.insert(parameter.to_string(), values);
        return TextClause {
            condition: format!("{} {} (:{})", attribute, keyword, parameter),
            parameters,
        };
    }

    let mut chunks: Vec<Vec<Value>> = values.chunks(max_size).map(<[Value]>::to_vec).collect();
    let last = chunks.pop().unwrap_or_default();

    let mut terms = vec![format!("{} {} (:{})", attribute, keyword, parameter)];
    parameters.insert(parameter.to_string(), last);
    for (index, chunk) in chunks.into_iter().enumerate() {
        let name = format!("{}{}", parameter, index);
        terms.push(format!("{} {} (:{})", attribute, keyword, name));
        parameters.insert(name, chunk);
    }

    TextClause {
        condition: format!("({})", terms.join(membership.connective())),
        parameters,
    }
}
