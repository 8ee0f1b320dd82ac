//! Bridges a mutable change-logging relation into the lazy expression
//! tree as an ordinary leaf node (spec.md §4.5's `update`/`add`/`delete`
//! actions need `&mut` access to a `ChangeLoggingRelation` while the same
//! relation sits, read-only, as an `Rc<dyn Relation>` inside whatever
//! algebra an observer has built over it).
//!
//! Grounded on the teacher's `crates/reactive/src/observable.rs`, which
//! held its watched table behind an `Rc<RefCell<_>>` for exactly this
//! reason.

use rra_algebra::{Relation, RelationRef, RowIter};
use rra_core::{Attribute, Expr, Result, Row, Scheme, Value};
use rra_incremental::{ChangeLoggingRelation, RelationChange};
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

/// A shared handle to a `ChangeLoggingRelation` that also implements
/// `Relation`, so it can be an operand of `rra-algebra` combinators and a
/// leaf variable of `rra-incremental::Derivative` at the same time.
pub struct ChangeLogLeaf {
    relation: Rc<RefCell<ChangeLoggingRelation>>,
    scheme: Arc<Scheme>,
}

impl ChangeLogLeaf {
    pub fn new(relation: Rc<RefCell<ChangeLoggingRelation>>) -> Rc<Self> {
        let scheme = relation.borrow().scheme().clone();
        Rc::new(ChangeLogLeaf { relation, scheme })
    }

    pub fn add(&self, row: Row) -> Result<RelationChange> {
        self.relation.borrow_mut().add(row)
    }

    pub fn delete(&self, predicate: &Expr) -> Result<RelationChange> {
        self.relation.borrow_mut().delete(predicate)
    }

    pub fn update(&self, predicate: &Expr, new_values: &[(Attribute, Value)]) -> Result<RelationChange> {
        self.relation.borrow_mut().update(predicate, new_values)
    }
}

impl Relation for ChangeLogLeaf {
    fn scheme(&self) -> &Arc<Scheme> {
        &self.scheme
    }

    fn rows(&self) -> RowIter<'_> {
        let snapshot: Vec<Row> = self.relation.borrow().materialize().rows_set().iter().cloned().collect();
        Box::new(snapshot.into_iter().map(Ok))
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

/// Upcasts a leaf handle to the `RelationRef` used throughout the
/// algebra and differentiator.
pub fn leaf_ref(leaf: &Rc<ChangeLogLeaf>) -> RelationRef {
    leaf.clone()
}
