//! Attribute paths and the restriction predicate tree
//!
//! Predicates are plain data: a [`Session`](crate::session::Session)
//! implementation translates them for its backend. [`Predicate::matches`]
//! gives the reference two-valued evaluation used by in-process engines.
//!
//! # Example
//!
//! ```rust
//! use acton_persistence::query::{Path, Predicate, Value};
//!
//! let active_admins = Predicate::and(vec![
//!     Predicate::eq("status", "active"),
//!     Predicate::in_values("role", vec![Value::from("admin"), Value::from("owner")]),
//! ]);
//!
//! let row = |path: &Path| match path.attribute.as_str() {
//!     "status" => Value::from("active"),
//!     "role" => Value::from("owner"),
//!     _ => Value::Null,
//! };
//! assert!(active_admins.matches(&row));
//! ```

use std::cmp::Ordering;
use std::fmt;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, PoisonError};

use lru::LruCache;
use regex::Regex;

use super::value::Value;

/// Reference to an attribute, optionally qualified by a root or join alias
///
/// An unqualified path resolves against the first root of the query.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Path {
    /// Alias of the root or join the attribute belongs to
    pub source: Option<String>,
    /// Attribute name
    pub attribute: String,
}

impl Path {
    /// Unqualified attribute of the primary root
    pub fn attr(attribute: impl Into<String>) -> Self {
        Self {
            source: None,
            attribute: attribute.into(),
        }
    }

    /// Attribute qualified by an alias
    pub fn of(source: impl Into<String>, attribute: impl Into<String>) -> Self {
        Self {
            source: Some(source.into()),
            attribute: attribute.into(),
        }
    }
}

impl From<&str> for Path {
    /// `"alias.attribute"` is qualified, `"attribute"` is not
    fn from(value: &str) -> Self {
        match value.split_once('.') {
            Some((source, attribute)) => Self::of(source, attribute),
            None => Self::attr(value),
        }
    }
}

impl From<String> for Path {
    fn from(value: String) -> Self {
        Self::from(value.as_str())
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.source {
            Some(source) => write!(f, "{}.{}", source, self.attribute),
            None => write!(f, "{}", self.attribute),
        }
    }
}

/// Ordering comparison operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareOp {
    /// Less than (<)
    LessThan,
    /// Less than or equal (<=)
    LessThanOrEqual,
    /// Greater than (>)
    GreaterThan,
    /// Greater than or equal (>=)
    GreaterThanOrEqual,
}

impl CompareOp {
    fn accepts(self, ordering: Ordering) -> bool {
        match self {
            Self::LessThan => ordering == Ordering::Less,
            Self::LessThanOrEqual => ordering != Ordering::Greater,
            Self::GreaterThan => ordering == Ordering::Greater,
            Self::GreaterThanOrEqual => ordering != Ordering::Less,
        }
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LessThan => write!(f, "<"),
            Self::LessThanOrEqual => write!(f, "<="),
            Self::GreaterThan => write!(f, ">"),
            Self::GreaterThanOrEqual => write!(f, ">="),
        }
    }
}

/// Composable boolean restriction over attribute paths
///
/// An empty [`Predicate::And`] is always true and an empty
/// [`Predicate::Or`] is always false, so an `IN` over no values matches
/// nothing and a `NOT IN` over no values matches every non-null value.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// `path = value`
    Equal(Path, Value),
    /// `path <> value`
    NotEqual(Path, Value),
    /// `path <op> value`
    Compare(Path, CompareOp, Value),
    /// `path LIKE pattern`, `%` and `_` wildcards
    Like {
        /// Attribute matched against the pattern
        path: Path,
        /// Pattern in backend wildcard syntax
        pattern: String,
        /// Compare lower-cased attribute text
        case_insensitive: bool,
    },
    /// `path IN (values)`
    In {
        /// Attribute tested for membership
        path: Path,
        /// Candidate values
        values: Vec<Value>,
    },
    /// `path NOT IN (values)`
    NotIn {
        /// Attribute tested for non-membership
        path: Path,
        /// Excluded values
        values: Vec<Value>,
    },
    /// `path IS NULL`
    IsNull(Path),
    /// `path IS NOT NULL`
    IsNotNull(Path),
    /// Conjunction
    And(Vec<Predicate>),
    /// Disjunction
    Or(Vec<Predicate>),
    /// Negation
    Not(Box<Predicate>),
}

impl Predicate {
    /// Equality predicate
    pub fn eq(path: impl Into<Path>, value: impl Into<Value>) -> Self {
        Self::Equal(path.into(), value.into())
    }

    /// Inequality predicate
    pub fn ne(path: impl Into<Path>, value: impl Into<Value>) -> Self {
        Self::NotEqual(path.into(), value.into())
    }

    /// Greater-than predicate
    pub fn gt(path: impl Into<Path>, value: impl Into<Value>) -> Self {
        Self::Compare(path.into(), CompareOp::GreaterThan, value.into())
    }

    /// Greater-than-or-equal predicate
    pub fn gte(path: impl Into<Path>, value: impl Into<Value>) -> Self {
        Self::Compare(path.into(), CompareOp::GreaterThanOrEqual, value.into())
    }

    /// Less-than predicate
    pub fn lt(path: impl Into<Path>, value: impl Into<Value>) -> Self {
        Self::Compare(path.into(), CompareOp::LessThan, value.into())
    }

    /// Less-than-or-equal predicate
    pub fn lte(path: impl Into<Path>, value: impl Into<Value>) -> Self {
        Self::Compare(path.into(), CompareOp::LessThanOrEqual, value.into())
    }

    /// Case-sensitive LIKE predicate
    pub fn like(path: impl Into<Path>, pattern: impl Into<String>) -> Self {
        Self::Like {
            path: path.into(),
            pattern: pattern.into(),
            case_insensitive: false,
        }
    }

    /// Case-insensitive LIKE predicate; `pattern` is expected lower-cased
    pub fn ilike(path: impl Into<Path>, pattern: impl Into<String>) -> Self {
        Self::Like {
            path: path.into(),
            pattern: pattern.into(),
            case_insensitive: true,
        }
    }

    /// Unbounded membership predicate
    ///
    /// Use [`in_clause`](super::chunk::in_clause) when the value list may
    /// exceed the backend's parameter limit.
    pub fn in_values(path: impl Into<Path>, values: Vec<Value>) -> Self {
        Self::In {
            path: path.into(),
            values,
        }
    }

    /// Unbounded non-membership predicate
    pub fn not_in_values(path: impl Into<Path>, values: Vec<Value>) -> Self {
        Self::NotIn {
            path: path.into(),
            values,
        }
    }

    /// `IS NULL` predicate
    pub fn is_null(path: impl Into<Path>) -> Self {
        Self::IsNull(path.into())
    }

    /// `IS NOT NULL` predicate
    pub fn is_not_null(path: impl Into<Path>) -> Self {
        Self::IsNotNull(path.into())
    }

    /// Conjunction of all predicates
    pub fn and(predicates: Vec<Predicate>) -> Self {
        Self::And(predicates)
    }

    /// Disjunction of all predicates
    pub fn or(predicates: Vec<Predicate>) -> Self {
        Self::Or(predicates)
    }

    /// Negation
    #[allow(clippy::should_implement_trait)]
    pub fn not(predicate: Predicate) -> Self {
        Self::Not(Box::new(predicate))
    }

    /// Predicate that is always true
    pub fn always() -> Self {
        Self::And(Vec::new())
    }

    /// Predicate that is always false
    pub fn never() -> Self {
        Self::Or(Vec::new())
    }

    /// Combine with another predicate, flattening nested conjunctions
    #[must_use]
    pub fn and_also(self, other: Predicate) -> Self {
        match self {
            Self::And(mut predicates) => {
                predicates.push(other);
                Self::And(predicates)
            }
            current => Self::And(vec![current, other]),
        }
    }

    /// Compile every LIKE pattern in the tree, reporting the first failure
    pub fn check_patterns(&self) -> Result<(), regex::Error> {
        match self {
            Self::Like {
                pattern,
                case_insensitive,
                ..
            } => compile_like(pattern, *case_insensitive).map(|_| ()),
            Self::And(predicates) | Self::Or(predicates) => {
                predicates.iter().try_for_each(Predicate::check_patterns)
            }
            Self::Not(predicate) => predicate.check_patterns(),
            _ => Ok(()),
        }
    }

    /// Evaluate against a resolver mapping paths to values
    ///
    /// Unresolvable paths should resolve to [`Value::Null`]. Comparisons
    /// involving NULL are false; negation is two-valued. A LIKE pattern that
    /// does not compile matches nothing, so engines run
    /// [`check_patterns`](Self::check_patterns) before evaluating.
    pub fn matches<F>(&self, resolve: &F) -> bool
    where
        F: Fn(&Path) -> Value,
    {
        match self {
            Self::Equal(path, value) => {
                let actual = resolve(path);
                !actual.is_null() && actual == *value
            }
            Self::NotEqual(path, value) => {
                let actual = resolve(path);
                !actual.is_null() && actual != *value
            }
            Self::Compare(path, op, value) => {
                let actual = resolve(path);
                !actual.is_null() && !value.is_null() && op.accepts(actual.cmp(value))
            }
            Self::Like {
                path,
                pattern,
                case_insensitive,
            } => match resolve(path) {
                Value::Text(text) => {
                    like_matches(pattern, &text, *case_insensitive).unwrap_or(false)
                }
                _ => false,
            },
            Self::In { path, values } => {
                let actual = resolve(path);
                !actual.is_null() && values.contains(&actual)
            }
            Self::NotIn { path, values } => {
                let actual = resolve(path);
                !actual.is_null() && !values.contains(&actual)
            }
            Self::IsNull(path) => resolve(path).is_null(),
            Self::IsNotNull(path) => !resolve(path).is_null(),
            Self::And(predicates) => predicates.iter().all(|p| p.matches(resolve)),
            Self::Or(predicates) => predicates.iter().any(|p| p.matches(resolve)),
            Self::Not(predicate) => !predicate.matches(resolve),
        }
    }
}

const LIKE_CACHE_CAPACITY: usize = 256;

lazy_static::lazy_static! {
    static ref LIKE_CACHE: Mutex<LruCache<(bool, String), Arc<Regex>>> =
        Mutex::new(LruCache::new(
            NonZeroUsize::new(LIKE_CACHE_CAPACITY).unwrap_or(NonZeroUsize::MIN),
        ));
}

fn like_to_regex(pattern: &str, case_insensitive: bool) -> String {
    let mut expression = String::with_capacity(pattern.len() + 8);
    expression.push_str(if case_insensitive { "(?is)^" } else { "(?s)^" });
    let mut buf = [0_u8; 4];
    for c in pattern.chars() {
        match c {
            '%' => expression.push_str(".*"),
            '_' => expression.push('.'),
            other => expression.push_str(&regex::escape(other.encode_utf8(&mut buf))),
        }
    }
    expression.push('$');
    expression
}

/// Compiled form of a LIKE pattern (`%` any sequence, `_` any single character)
///
/// Compiled patterns are kept in a process-wide LRU cache.
pub fn compile_like(pattern: &str, case_insensitive: bool) -> Result<Arc<Regex>, regex::Error> {
    let key = (case_insensitive, pattern.to_string());
    if let Some(regex) = LIKE_CACHE
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .get(&key)
    {
        return Ok(Arc::clone(regex));
    }

    let compiled = Arc::new(Regex::new(&like_to_regex(pattern, case_insensitive))?);
    LIKE_CACHE
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .put(key, Arc::clone(&compiled));
    Ok(compiled)
}

/// Evaluate a LIKE pattern against `text`
pub fn like_matches(pattern: &str, text: &str, case_insensitive: bool) -> Result<bool, regex::Error> {
    compile_like(pattern, case_insensitive).map(|regex| regex.is_match(text))
}
