//! Count-query derivation
//!
//! Turns a result query into a query that counts the rows the result query
//! would return before windowing. Roots, joins (recursively), group-by,
//! having, distinct and the restriction are copied; ordering is dropped and
//! fetches are dropped unless explicitly requested.

use std::collections::HashSet;

use thiserror::Error;

use super::criteria::{CriteriaQuery, Fetch, Join, Root, Selection, TypeKey};

/// The result type of a query has no matching root, so it cannot be counted
///
/// This is a programming error (typically a projection query), distinct from
/// any runtime data-access failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("no root of type {result_type} in query with roots [{roots}]")]
pub struct CountRootNotFound {
    /// Declared result type
    pub result_type: &'static str,
    /// Entity types of the query's roots
    pub roots: String,
}

/// Derive the count query for `query`, without fetches
pub fn derive_count_query<R>(
    query: &CriteriaQuery<R>,
) -> Result<CriteriaQuery<i64>, CountRootNotFound> {
    derive_count_query_with(query, false)
}

/// Derive the count query for `query`
///
/// With `copy_fetches`, fetch associations are copied with the same recursive
/// strategy as joins. Counting normally must not fetch.
pub fn derive_count_query_with<R>(
    query: &CriteriaQuery<R>,
    copy_fetches: bool,
) -> Result<CriteriaQuery<i64>, CountRootNotFound> {
    let mut aliases = AliasGenerator::seeded(query);

    let roots: Vec<Root> = query
        .roots
        .iter()
        .map(|root| Root {
            entity: root.entity,
            alias: Some(aliases.keep_or_generate(root.alias.as_deref())),
            joins: copy_joins(&root.joins, &mut aliases, copy_fetches),
            fetches: if copy_fetches {
                copy_fetches_of(&root.fetches)
            } else {
                Vec::new()
            },
        })
        .collect();

    let root = find_root(&roots, query.result_type).ok_or_else(|| CountRootNotFound {
        result_type: query.result_type.name(),
        roots: roots
            .iter()
            .map(|r| r.entity.name())
            .collect::<Vec<_>>()
            .join(", "),
    })?;

    let mut count = CriteriaQuery::<i64>::new();
    count.roots = roots;
    count.group_by = query.group_by.clone();
    count.distinct = query.distinct;
    count.having = query.having.clone();
    count.restriction = query.restriction.clone();
    count.selection = Selection::Count {
        root,
        distinct: query.distinct,
    };
    Ok(count)
}

/// First root whose entity type equals `result_type`
fn find_root(roots: &[Root], result_type: TypeKey) -> Option<usize> {
    roots
        .iter()
        .position(|root| root.entity.id() == result_type.id())
}

fn copy_joins(joins: &[Join], aliases: &mut AliasGenerator, copy_fetches: bool) -> Vec<Join> {
    joins
        .iter()
        .map(|join| Join {
            attribute: join.attribute.clone(),
            join_type: join.join_type,
            alias: Some(aliases.keep_or_generate(join.alias.as_deref())),
            joins: copy_joins(&join.joins, aliases, copy_fetches),
            fetches: if copy_fetches {
                copy_fetches_of(&join.fetches)
            } else {
                Vec::new()
            },
        })
        .collect()
}

fn copy_fetches_of(fetches: &[Fetch]) -> Vec<Fetch> {
    fetches
        .iter()
        .map(|fetch| Fetch {
            attribute: fetch.attribute.clone(),
            join_type: fetch.join_type,
            fetches: copy_fetches_of(&fetch.fetches),
        })
        .collect()
}

/// Hands out aliases that collide with nothing in the source query
struct AliasGenerator {
    taken: HashSet<String>,
    next: usize,
}

impl AliasGenerator {
    fn seeded<R>(query: &CriteriaQuery<R>) -> Self {
        fn collect(joins: &[Join], taken: &mut HashSet<String>) {
            for join in joins {
                if let Some(alias) = &join.alias {
                    taken.insert(alias.clone());
                }
                collect(&join.joins, taken);
            }
        }

        let mut taken = HashSet::new();
        for root in &query.roots {
            if let Some(alias) = &root.alias {
                taken.insert(alias.clone());
            }
            collect(&root.joins, &mut taken);
        }
        Self { taken, next: 0 }
    }

    fn keep_or_generate(&mut self, existing: Option<&str>) -> String {
        if let Some(alias) = existing {
            return alias.to_string();
        }
        loop {
            let candidate = format!("generated_alias_{}", self.next);
            self.next += 1;
            if self.taken.insert(candidate.clone()) {
                return candidate;
            }
        }
    }
}
