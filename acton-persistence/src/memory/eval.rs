//! Query evaluation over stored rows
//!
//! Roots and joins are expanded into tuples of bindings (one slot per root
//! or join), restricted, grouped and ordered the way a relational backend
//! would process the equivalent SELECT.

use std::any::TypeId;
use std::collections::HashMap;

use super::{State, Table};
use crate::entity::Row;
use crate::query::{Join, JoinType, Order, OrderDirection, Path, Predicate, Root, Value};

/// Row bound to one slot of a tuple
#[derive(Clone, Copy)]
pub(super) struct Binding<'a> {
    pub row: &'a Row,
    /// Index into the root table; `None` for joined association rows
    pub entry: Option<usize>,
}

pub(super) type Tuple<'a> = Vec<Option<Binding<'a>>>;

enum SlotSource {
    Root(TypeId),
    Join {
        parent: usize,
        attribute: String,
        join_type: JoinType,
    },
}

struct Slot {
    alias: Option<String>,
    source: SlotSource,
}

impl Slot {
    fn attribute(&self) -> Option<&str> {
        match &self.source {
            SlotSource::Join { attribute, .. } => Some(attribute.as_str()),
            SlotSource::Root(_) => None,
        }
    }
}

/// Slot layout of a query: every root followed by its joins, depth first
pub(super) struct Layout {
    slots: Vec<Slot>,
    root_slots: Vec<usize>,
}

impl Layout {
    pub fn of(roots: &[Root]) -> Self {
        let mut layout = Self {
            slots: Vec::new(),
            root_slots: Vec::with_capacity(roots.len()),
        };
        for root in roots {
            let index = layout.slots.len();
            layout.root_slots.push(index);
            layout.slots.push(Slot {
                alias: root.alias.clone(),
                source: SlotSource::Root(root.entity.id()),
            });
            layout.add_joins(index, &root.joins);
        }
        layout
    }

    fn add_joins(&mut self, parent: usize, joins: &[Join]) {
        for join in joins {
            let index = self.slots.len();
            self.slots.push(Slot {
                alias: join.alias.clone(),
                source: SlotSource::Join {
                    parent,
                    attribute: join.attribute.clone(),
                    join_type: join.join_type,
                },
            });
            self.add_joins(index, &join.joins);
        }
    }

    /// Slot index of the root at `root` position
    pub fn root_slot(&self, root: usize) -> Option<usize> {
        self.root_slots.get(root).copied()
    }

    /// Expand roots and joins into tuples
    pub fn tuples<'a>(&self, state: &'a State) -> Vec<Tuple<'a>> {
        let mut tuples: Vec<Tuple<'a>> = vec![Vec::with_capacity(self.slots.len())];
        for slot in &self.slots {
            let mut expanded = Vec::new();
            for tuple in tuples {
                match &slot.source {
                    SlotSource::Root(type_id) => {
                        let entries = state
                            .tables
                            .get(type_id)
                            .map(|table| table.entries.as_slice())
                            .unwrap_or(&[]);
                        for (index, stored) in entries.iter().enumerate() {
                            let mut next = tuple.clone();
                            next.push(Some(Binding {
                                row: &stored.row,
                                entry: Some(index),
                            }));
                            expanded.push(next);
                        }
                    }
                    SlotSource::Join {
                        parent,
                        attribute,
                        join_type,
                    } => {
                        let children = tuple[*parent]
                            .and_then(|binding| binding.row.associations.get(attribute))
                            .map(Vec::as_slice)
                            .unwrap_or(&[]);
                        if children.is_empty() {
                            if *join_type == JoinType::Left {
                                let mut next = tuple.clone();
                                next.push(None);
                                expanded.push(next);
                            }
                            continue;
                        }
                        for child in children {
                            let mut next = tuple.clone();
                            next.push(Some(Binding {
                                row: child,
                                entry: None,
                            }));
                            expanded.push(next);
                        }
                    }
                }
            }
            tuples = expanded;
        }
        if self.slots.is_empty() {
            tuples.clear();
        }
        tuples
    }

    /// Resolve a path against a tuple
    ///
    /// Unqualified paths use the first slot. A qualifier names a root or join
    /// alias, or else the attribute of an unaliased join.
    pub fn resolve(&self, tuple: &Tuple<'_>, path: &Path) -> Value {
        let slot = match path.source.as_deref() {
            None => Some(0),
            Some(source) => self
                .slots
                .iter()
                .position(|slot| slot.alias.as_deref() == Some(source))
                .or_else(|| {
                    self.slots
                        .iter()
                        .position(|slot| slot.attribute() == Some(source))
                }),
        };
        slot.and_then(|index| tuple.get(index).copied().flatten())
            .map(|binding| binding.row.get(&path.attribute))
            .unwrap_or(Value::Null)
    }

    pub fn matches(&self, tuple: &Tuple<'_>, predicate: Option<&Predicate>) -> bool {
        predicate.map_or(true, |p| p.matches(&|path: &Path| self.resolve(tuple, path)))
    }

    /// Partition tuples by the grouping paths, keeping groups that pass `having`
    ///
    /// Without grouping paths every tuple falls into one implicit group.
    /// `having` is evaluated against the first tuple of each group.
    pub fn groups<'a>(
        &self,
        tuples: Vec<Tuple<'a>>,
        group_by: &[Path],
        having: Option<&Predicate>,
    ) -> Vec<Vec<Tuple<'a>>> {
        if group_by.is_empty() {
            let keep = tuples.first().is_some_and(|first| self.matches(first, having));
            return if keep { vec![tuples] } else { Vec::new() };
        }

        let mut index: HashMap<Vec<Value>, usize> = HashMap::new();
        let mut groups: Vec<Vec<Tuple<'a>>> = Vec::new();
        for tuple in tuples {
            let key: Vec<Value> = group_by.iter().map(|path| self.resolve(&tuple, path)).collect();
            match index.get(&key) {
                Some(&position) => groups[position].push(tuple),
                None => {
                    index.insert(key, groups.len());
                    groups.push(vec![tuple]);
                }
            }
        }
        groups.retain(|group| group.first().is_some_and(|first| self.matches(first, having)));
        groups
    }

    /// Stable sort by the ordering list
    pub fn sort(&self, tuples: &mut [Tuple<'_>], order_by: &[Order]) {
        if order_by.is_empty() {
            return;
        }
        tuples.sort_by(|a, b| {
            order_by
                .iter()
                .map(|order| {
                    let ordering = self.resolve(a, &order.path).cmp(&self.resolve(b, &order.path));
                    match order.direction {
                        OrderDirection::Ascending => ordering,
                        OrderDirection::Descending => ordering.reverse(),
                    }
                })
                .find(|ordering| ordering.is_ne())
                .unwrap_or(std::cmp::Ordering::Equal)
        });
    }
}

/// Root table entry bound in `slot`, if any
pub(super) fn entry_of(tuple: &Tuple<'_>, slot: usize) -> Option<usize> {
    tuple.get(slot).copied().flatten().and_then(|binding| binding.entry)
}

/// Whether a stored row matches a single-table restriction
pub(super) fn row_matches(row: &Row, predicate: Option<&Predicate>) -> bool {
    predicate.map_or(true, |p| p.matches(&|path: &Path| row.get(&path.attribute)))
}

impl Table {
    pub(super) fn position(&self, id: &Value) -> Option<usize> {
        self.entries.iter().position(|stored| stored.id == *id)
    }
}
