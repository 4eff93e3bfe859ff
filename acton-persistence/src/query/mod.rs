//! Engine-neutral query representation
//!
//! - [`CriteriaQuery`], [`DeleteQuery`] and [`UpdateQuery`]: structural
//!   SELECT / DELETE / UPDATE definitions
//! - [`Predicate`]: restriction tree over attribute [`Path`]s
//! - [`in_clause`] / [`not_in_clause`]: membership predicates bounded to
//!   [`MAX_IN_CLAUSE_SIZE`] values per clause
//! - [`derive_count_query`]: row-count companion of a result query

mod chunk;
mod count;
mod criteria;
mod predicate;
mod value;

pub use chunk::{
    chunked, chunked_text, in_clause, in_clause_text, not_in_clause, not_in_clause_text,
    Membership, QueryParameters, TextClause, MAX_IN_CLAUSE_SIZE,
};
pub use count::{derive_count_query, derive_count_query_with, CountRootNotFound};
pub use criteria::{
    CriteriaQuery, DeleteQuery, Fetch, Join, JoinType, Order, OrderDirection, Root, Selection,
    TypeKey, UpdateQuery,
};
pub use predicate::{compile_like, like_matches, CompareOp, Path, Predicate};
pub use value::Value;
