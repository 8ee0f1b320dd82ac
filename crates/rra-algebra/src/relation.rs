//! The concrete relation shapes of spec.md §3: an in-memory set of rows, or
//! a relation backed by a `StorageAdapter`.
//!
//! Everything in this crate that can be iterated implements `Relation`.
//! Equality between two `Rc<dyn Relation>` handles is by identity
//! (`Rc::ptr_eq`), never by extensional content — the differentiator and
//! the observer registry both key on "is this the same node in the
//! expression tree", not "does it currently hold the same rows".

use hashbrown::HashSet;
use rra_core::{Attribute, Result, Row, Scheme, Value};
use rra_storage::StorageAdapter;
use std::rc::Rc;
use std::sync::Arc;

/// A lazy sequence of rows, fallible per-row. A single error aborts
/// iteration of *that* relation only — sibling operands of a combinator
/// iterate independently and may still succeed.
pub type RowIter<'a> = Box<dyn Iterator<Item = Result<Row>> + 'a>;

/// Any node in an expression tree: a base relation or the lazy result of
/// applying a combinator to one or two operands.
pub trait Relation {
    fn scheme(&self) -> &Arc<Scheme>;
    fn rows(&self) -> RowIter<'_>;

    /// Lets `Select` recognize a `StoredRelation` operand behind the
    /// `Rc<dyn Relation>` handle to offer it predicate pushdown.
    fn as_any(&self) -> &dyn std::any::Any;
}

/// A handle to a relation node, shared by reference so the same node can
/// be an operand of more than one combinator (and so the differentiator
/// can recognize "this leaf" across branches).
pub type RelationRef = Rc<dyn Relation>;

/// True when `a` and `b` are the same relation node, not merely relations
/// that currently hold equal rows.
pub fn same_relation(a: &RelationRef, b: &RelationRef) -> bool {
    Rc::ptr_eq(a, b)
}

/// An in-memory relation: a set of rows over a fixed scheme, held directly
/// rather than behind a `StorageAdapter`. Backing store is a `HashSet` so
/// construction enforces set semantics (no duplicate rows) the way spec.md
/// §3 requires of every relation.
#[derive(Clone)]
pub struct ConcreteRelation {
    scheme: Arc<Scheme>,
    rows: HashSet<Row>,
}

impl ConcreteRelation {
    pub fn new(scheme: Arc<Scheme>, rows: impl IntoIterator<Item = Row>) -> Self {
        ConcreteRelation {
            scheme,
            rows: rows.into_iter().collect(),
        }
    }

    pub fn empty(scheme: Arc<Scheme>) -> Self {
        ConcreteRelation {
            scheme,
            rows: HashSet::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn contains(&self, row: &Row) -> bool {
        self.rows.contains(row)
    }

    pub fn rows_set(&self) -> &HashSet<Row> {
        &self.rows
    }

    /// Inserts `row`, returning `true` if it was not already present.
    pub fn insert(&mut self, row: Row) -> bool {
        self.rows.insert(row)
    }

    /// Removes every row matching `predicate`, returning the count removed.
    pub fn retain_not_matching(&mut self, predicate: &rra_core::Expr) -> usize {
        let before = self.rows.len();
        self.rows.retain(|row| !predicate.matches(row));
        before - self.rows.len()
    }

    /// Overwrites the given attributes on every row matching `predicate`.
    pub fn update_matching(&mut self, predicate: &rra_core::Expr, new_values: &[(Attribute, Value)]) -> usize {
        let matching: Vec<Row> = self.rows.iter().filter(|row| predicate.matches(row)).cloned().collect();
        let mut count = 0;
        for row in matching {
            self.rows.remove(&row);
            self.rows.insert(row.with_overrides(new_values));
            count += 1;
        }
        count
    }

    /// Set union with `other` (both must share scheme; used by the
    /// differentiator to combine before/after snapshots without going
    /// through a lazy `Union` node).
    pub fn union_with(&self, other: &ConcreteRelation) -> ConcreteRelation {
        let mut rows = self.rows.clone();
        rows.extend(other.rows.iter().cloned());
        ConcreteRelation { scheme: self.scheme.clone(), rows }
    }

    pub fn difference_with(&self, other: &ConcreteRelation) -> ConcreteRelation {
        let rows = self.rows.iter().filter(|r| !other.rows.contains(*r)).cloned().collect();
        ConcreteRelation { scheme: self.scheme.clone(), rows }
    }

    pub fn intersect_with(&self, other: &ConcreteRelation) -> ConcreteRelation {
        let rows = self.rows.iter().filter(|r| other.rows.contains(*r)).cloned().collect();
        ConcreteRelation { scheme: self.scheme.clone(), rows }
    }
}

impl Relation for ConcreteRelation {
    fn scheme(&self) -> &Arc<Scheme> {
        &self.scheme
    }

    fn rows(&self) -> RowIter<'_> {
        Box::new(self.rows.iter().cloned().map(Ok))
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

/// A relation whose rows live behind a `StorageAdapter` — the leaf that
/// connects the algebra to persistent storage (spec.md §6).
pub struct StoredRelation {
    adapter: Box<dyn StorageAdapter>,
}

impl StoredRelation {
    pub fn new(adapter: Box<dyn StorageAdapter>) -> Self {
        StoredRelation { adapter }
    }

    pub fn adapter(&self) -> &dyn StorageAdapter {
        self.adapter.as_ref()
    }

    pub fn adapter_mut(&mut self) -> &mut dyn StorageAdapter {
        self.adapter.as_mut()
    }
}

impl Relation for StoredRelation {
    fn scheme(&self) -> &Arc<Scheme> {
        self.adapter.scheme()
    }

    fn rows(&self) -> RowIter<'_> {
        self.adapter.rows()
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

/// Materializes any relation into a `ConcreteRelation`, stopping at the
/// first error.
pub fn materialize(relation: &dyn Relation) -> Result<ConcreteRelation> {
    let scheme = relation.scheme().clone();
    let rows: Result<HashSet<Row>> = relation.rows().collect();
    Ok(ConcreteRelation { scheme, rows: rows? })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rra_core::{Attribute, Value};

    fn scheme() -> Arc<Scheme> {
        Arc::new(Scheme::new(vec![Attribute::new("id")]))
    }

    fn row(id: i64) -> Row {
        Row::new(scheme(), vec![Value::Integer(id)]).unwrap()
    }

    #[test]
    fn concrete_relation_deduplicates_rows() {
        let rel = ConcreteRelation::new(scheme(), vec![row(1), row(1), row(2)]);
        assert_eq!(rel.len(), 2);
    }

    #[test]
    fn same_relation_is_identity_not_content() {
        let a: RelationRef = Rc::new(ConcreteRelation::new(scheme(), vec![row(1)]));
        let b: RelationRef = Rc::new(ConcreteRelation::new(scheme(), vec![row(1)]));
        assert!(!same_relation(&a, &b));
        let a2 = a.clone();
        assert!(same_relation(&a, &a2));
    }

    #[test]
    fn materialize_collects_all_rows() {
        let rel = ConcreteRelation::new(scheme(), vec![row(1), row(2)]);
        let materialized = materialize(&rel).unwrap();
        assert_eq!(materialized.len(), 2);
    }
}
