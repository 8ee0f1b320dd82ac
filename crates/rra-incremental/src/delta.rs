//! The differentiator's output type (spec.md §4.4).
//!
//! A `RelationChange` is a pair of relations — rows added, rows removed —
//! expressed in the same algebra as everything else in this workspace,
//! rather than a per-row `+1`/`-1` multiplicity. Two concrete relations
//! are easier to feed straight back into `rra-query`'s runner or into a
//! content observer than a signed multiset would be, and they compose
//! directly with the algebra's own set operations (`union_with`,
//! `difference_with`) when combinator rules need to combine deltas.

use rra_algebra::ConcreteRelation;
use rra_core::{Row, Scheme};
use std::sync::Arc;

/// `(added, removed)` over a fixed scheme. `eval(E after M) = (eval(E
/// before M) ∪ added) \ removed` is the invariant every differentiation
/// rule must preserve (spec.md §8 invariant 4).
#[derive(Clone)]
pub struct RelationChange {
    pub added: ConcreteRelation,
    pub removed: ConcreteRelation,
}

impl RelationChange {
    pub fn new(added: ConcreteRelation, removed: ConcreteRelation) -> Self {
        RelationChange { added, removed }
    }

    pub fn empty(scheme: Arc<Scheme>) -> Self {
        RelationChange {
            added: ConcreteRelation::empty(scheme.clone()),
            removed: ConcreteRelation::empty(scheme),
        }
    }

    pub fn added_only(scheme: Arc<Scheme>, rows: impl IntoIterator<Item = Row>) -> Self {
        RelationChange {
            added: ConcreteRelation::new(scheme.clone(), rows),
            removed: ConcreteRelation::empty(scheme),
        }
    }

    pub fn removed_only(scheme: Arc<Scheme>, rows: impl IntoIterator<Item = Row>) -> Self {
        RelationChange {
            added: ConcreteRelation::empty(scheme.clone()),
            removed: ConcreteRelation::new(scheme, rows),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }

    pub fn scheme(&self) -> &Arc<Scheme> {
        use rra_algebra::Relation;
        self.added.scheme()
    }

    /// Combines this change with `other` over the same scheme, as used
    /// when a union/equijoin rule contributes delta from both operands.
    pub fn merge(&self, other: &RelationChange) -> RelationChange {
        RelationChange {
            added: self.added.union_with(&other.added),
            removed: self.removed.union_with(&other.removed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rra_algebra::Relation;
    use rra_core::{Attribute, Value};

    fn scheme() -> Arc<Scheme> {
        Arc::new(Scheme::new(vec![Attribute::new("id")]))
    }

    fn row(id: i64) -> Row {
        Row::new(scheme(), vec![Value::Integer(id)]).unwrap()
    }

    #[test]
    fn empty_change_has_no_rows() {
        let change = RelationChange::empty(scheme());
        assert!(change.is_empty());
    }

    #[test]
    fn merge_unions_both_sides() {
        let a = RelationChange::added_only(scheme(), vec![row(1)]);
        let b = RelationChange::added_only(scheme(), vec![row(2)]);
        let merged = a.merge(&b);
        assert_eq!(merged.added.scheme(), &scheme());
        assert!(merged.added.contains(&row(1)));
        assert!(merged.added.contains(&row(2)));
    }
}
