//! The relation differentiator (C8, spec.md §4.4).
//!
//! Given a root expression and a delta on one of its leaf variables, a
//! `Derivative` produces the `RelationChange` the root itself undergoes,
//! by walking the same small set of combinator rules `rra-algebra` defines
//! rather than re-evaluating the whole tree. Grounded on the teacher's
//! dataflow dependency graph (`crates/incremental/src/dataflow/graph.rs`),
//! generalized here from `TableId`-keyed nodes to arbitrary leaf-relation
//! identity (`Rc::ptr_eq`, per `rra_algebra::same_relation`).

use crate::delta::RelationChange;
use hashbrown::HashSet;
use rra_algebra::{
    materialize, Aggregate, ConcreteRelation, Difference, Equijoin, Intersection, Otherwise, Project, Relation,
    RelationRef, Rename, Select, Union, Unique, Update,
};
use rra_core::{Expr, Result, Row, Scheme};
use std::rc::Rc;
use std::sync::Arc;

/// Result of the cheap consistency check of spec.md §4.4: "a mutation
/// whose predicate is provably inconsistent with the variable's filter is
/// skipped". Only equality-vs-equality on the same attribute with
/// different constants is recognized (spec.md's Open Question (a) leaves
/// extending this to inequalities as a future enhancement, not a
/// contract).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Inconsistency {
    ProvablyInconsistent,
    Possible,
}

/// A derivative over `root`, precomputed once per dispatch-tick batch
/// (spec.md §4.5 step 2: "for every affected variable, call
/// derivative.clear()"). This implementation is stateless beyond `root`
/// itself, so the update manager "clears" a derivative simply by
/// constructing a fresh one for the next drain rather than mutating this
/// one in place.
pub struct Derivative {
    root: RelationRef,
}

impl Derivative {
    /// Builds a derivative over `root`, precomputing nothing eagerly —
    /// `all_variables` and the bounding-filter walk are cheap enough over
    /// this engine's small expression trees to run per-call.
    pub fn new(root: RelationRef) -> Self {
        Derivative { root }
    }

    pub fn root(&self) -> &RelationRef {
        &self.root
    }

    /// Every leaf variable (a relation that isn't itself a combinator node)
    /// reachable from `root` without crossing an opaque boundary (spec.md
    /// §4.4).
    pub fn all_variables(&self) -> Vec<RelationRef> {
        let mut out = Vec::new();
        collect_variables(&self.root, &mut out);
        out
    }

    /// The cheap, conservative consistency check of spec.md §4.4: does
    /// `mutation_predicate` provably conflict with every `select` filter
    /// that bounds `variable`'s reachable region under `root`? A mutation
    /// this check flags should be skipped entirely (no `willChange`, no
    /// recomputation).
    pub fn check_consistency(&self, variable: &RelationRef, mutation_predicate: &Expr) -> Inconsistency {
        let Some((mutation_attr, mutation_value)) = mutation_predicate.as_attr_eq_const() else {
            return Inconsistency::Possible;
        };
        let mut filters = Vec::new();
        bounding_filters(&self.root, variable, &mut filters);
        for filter in &filters {
            if let Some((filter_attr, filter_value)) = filter.as_attr_eq_const() {
                if filter_attr == mutation_attr && filter_value != mutation_value {
                    return Inconsistency::ProvablyInconsistent;
                }
            }
        }
        Inconsistency::Possible
    }

    /// Computes the `RelationChange` that `root` undergoes given `delta`
    /// on `variable`. If `variable` is not reachable from `root` the
    /// result is empty (spec.md §8 invariant 4 restricted to the relevant
    /// subtree).
    pub fn derive(&self, variable: &RelationRef, delta: &RelationChange) -> Result<RelationChange> {
        derive_node(&self.root, variable, delta)
    }
}

// ------------------------------------------------------------- traversal ---

fn contains_variable(node: &RelationRef, variable: &RelationRef) -> bool {
    if Rc::ptr_eq(node, variable) {
        return true;
    }
    match children(node) {
        Children::None => false,
        Children::One(a) => contains_variable(a, variable),
        Children::Two(a, b) => contains_variable(a, variable) || contains_variable(b, variable),
    }
}

fn collect_variables(node: &RelationRef, out: &mut Vec<RelationRef>) {
    match children(node) {
        Children::None => {
            if !out.iter().any(|v| Rc::ptr_eq(v, node)) {
                out.push(node.clone());
            }
        }
        Children::One(a) => collect_variables(a, out),
        Children::Two(a, b) => {
            collect_variables(a, out);
            collect_variables(b, out);
        }
    }
}

/// Collects the `select` predicates on the path from `root` down to
/// `variable`, used by the consistency check. Only the branch(es) that
/// actually contain `variable` are descended.
fn bounding_filters(node: &RelationRef, variable: &RelationRef, out: &mut Vec<Expr>) {
    if Rc::ptr_eq(node, variable) {
        return;
    }
    if let Some(select) = node.as_any().downcast_ref::<Select>() {
        if contains_variable(select.operand(), variable) {
            out.push(select.expr().clone());
            bounding_filters(select.operand(), variable, out);
        }
        return;
    }
    match children(node) {
        Children::None => {}
        Children::One(a) => bounding_filters(a, variable, out),
        Children::Two(a, b) => {
            if contains_variable(a, variable) {
                bounding_filters(a, variable, out);
            }
            if contains_variable(b, variable) {
                bounding_filters(b, variable, out);
            }
        }
    }
}

enum Children<'a> {
    None,
    One(&'a RelationRef),
    Two(&'a RelationRef, &'a RelationRef),
}

/// Classifies `node` by downcasting to each of the eleven combinator
/// shapes in turn; anything that matches none of them is a leaf variable
/// (a `ConcreteRelation`, `StoredRelation`, or `ChangeLoggingRelation`).
fn children(node: &RelationRef) -> Children<'_> {
    let any = node.as_any();
    if let Some(n) = any.downcast_ref::<Union>() {
        Children::Two(n.left(), n.right())
    } else if let Some(n) = any.downcast_ref::<Intersection>() {
        Children::Two(n.left(), n.right())
    } else if let Some(n) = any.downcast_ref::<Difference>() {
        Children::Two(n.left(), n.right())
    } else if let Some(n) = any.downcast_ref::<Project>() {
        Children::One(n.operand())
    } else if let Some(n) = any.downcast_ref::<Select>() {
        Children::One(n.operand())
    } else if let Some(n) = any.downcast_ref::<Rename>() {
        Children::One(n.operand())
    } else if let Some(n) = any.downcast_ref::<Equijoin>() {
        Children::Two(n.left(), n.right())
    } else if let Some(n) = any.downcast_ref::<Aggregate>() {
        Children::One(n.operand())
    } else if let Some(n) = any.downcast_ref::<Otherwise>() {
        Children::Two(n.left(), n.right())
    } else if let Some(n) = any.downcast_ref::<Unique>() {
        Children::One(n.operand())
    } else if let Some(n) = any.downcast_ref::<Update>() {
        Children::One(n.operand())
    } else {
        Children::None
    }
}

// ------------------------------------------------------- before / after ---

fn after_content(node: &RelationRef) -> Result<ConcreteRelation> {
    materialize(node.as_ref())
}

/// The content `node` would have evaluated to *before* `delta` was applied
/// to `variable`, reconstructed by walking the same operators over
/// concrete snapshots rather than re-running the lazy tree against old
/// storage (spec.md §4.4's before/after snapshots).
fn before_content(node: &RelationRef, variable: &RelationRef, delta: &RelationChange) -> Result<ConcreteRelation> {
    if Rc::ptr_eq(node, variable) {
        let after = after_content(node)?;
        return Ok(after.union_with(&delta.removed).difference_with(&delta.added));
    }
    if !contains_variable(node, variable) {
        return after_content(node);
    }
    let any = node.as_any();
    if let Some(n) = any.downcast_ref::<Union>() {
        let l = before_content(n.left(), variable, delta)?;
        let r = before_content(n.right(), variable, delta)?;
        Ok(l.union_with(&r))
    } else if let Some(n) = any.downcast_ref::<Intersection>() {
        let l = before_content(n.left(), variable, delta)?;
        let r = before_content(n.right(), variable, delta)?;
        Ok(l.intersect_with(&r))
    } else if let Some(n) = any.downcast_ref::<Difference>() {
        let l = before_content(n.left(), variable, delta)?;
        let r = before_content(n.right(), variable, delta)?;
        Ok(l.difference_with(&r))
    } else if let Some(n) = any.downcast_ref::<Project>() {
        let operand_before = before_content(n.operand(), variable, delta)?;
        Ok(project_concrete(&operand_before, n.projected_scheme()))
    } else if let Some(n) = any.downcast_ref::<Select>() {
        let operand_before = before_content(n.operand(), variable, delta)?;
        Ok(filter_concrete(&operand_before, n.expr()))
    } else if let Some(n) = any.downcast_ref::<Rename>() {
        let operand_before = before_content(n.operand(), variable, delta)?;
        rename_concrete(n, &operand_before)
    } else if let Some(n) = any.downcast_ref::<Equijoin>() {
        let l = before_content(n.left(), variable, delta)?;
        let r = before_content(n.right(), variable, delta)?;
        materialize(&n.join_concrete(&l, &r))
    } else if let Some(n) = any.downcast_ref::<Aggregate>() {
        let operand_before = before_content(n.operand(), variable, delta)?;
        materialize(&n.over_concrete(&operand_before))
    } else if let Some(n) = any.downcast_ref::<Otherwise>() {
        let l = before_content(n.left(), variable, delta)?;
        if !l.is_empty() {
            Ok(l)
        } else {
            before_content(n.right(), variable, delta)
        }
    } else if let Some(n) = any.downcast_ref::<Unique>() {
        let operand_before = before_content(n.operand(), variable, delta)?;
        materialize(&n.over_concrete(&operand_before))
    } else if let Some(n) = any.downcast_ref::<Update>() {
        let operand_before = before_content(n.operand(), variable, delta)?;
        let rows: Vec<Row> = operand_before.rows_set().iter().map(|r| r.with_overrides(n.new_values())).collect();
        Ok(ConcreteRelation::new(operand_before.scheme().clone(), rows))
    } else {
        after_content(node)
    }
}

fn project_concrete(rows: &ConcreteRelation, scheme: &Arc<Scheme>) -> ConcreteRelation {
    let projected: HashSet<Row> = rows.rows_set().iter().map(|r| r.project(scheme)).collect();
    ConcreteRelation::new(scheme.clone(), projected)
}

fn filter_concrete(rows: &ConcreteRelation, expr: &Expr) -> ConcreteRelation {
    let filtered: Vec<Row> = rows.rows_set().iter().filter(|r| expr.matches(r)).cloned().collect();
    ConcreteRelation::new(rows.scheme().clone(), filtered)
}

fn rename_concrete(rename: &Rename, rows: &ConcreteRelation) -> Result<ConcreteRelation> {
    let out: Result<Vec<Row>> = rows.rows_set().iter().map(|r| rename.rename_row(r)).collect();
    let out = out?;
    let scheme = out.first().map(|r| r.scheme().clone());
    Ok(match scheme {
        Some(scheme) => ConcreteRelation::new(scheme, out),
        None => ConcreteRelation::empty(rows.scheme().clone()),
    })
}

// --------------------------------------------------------- derive rules ---

fn derive_node(node: &RelationRef, variable: &RelationRef, delta: &RelationChange) -> Result<RelationChange> {
    if Rc::ptr_eq(node, variable) {
        return Ok(delta.clone());
    }
    if !contains_variable(node, variable) {
        return Ok(RelationChange::empty(node.scheme().clone()));
    }

    let any = node.as_any();
    if let Some(n) = any.downcast_ref::<Union>() {
        let d_left = derive_node(n.left(), variable, delta)?;
        let d_right = derive_node(n.right(), variable, delta)?;
        let before = before_content(node, variable, delta)?;
        let after = after_content(node)?;
        let added = d_left.added.union_with(&d_right.added).difference_with(&before);
        let removed = d_left.removed.union_with(&d_right.removed).difference_with(&after);
        Ok(RelationChange::new(added, removed))
    } else if any.downcast_ref::<Intersection>().is_some()
        || any.downcast_ref::<Difference>().is_some()
    {
        // Both rely on the same combinator-rule shape: compute via the
        // before/after snapshots rather than duplicating the set algebra
        // spelled out in spec.md §4.4 twice.
        let before = before_content(node, variable, delta)?;
        let after = after_content(node)?;
        Ok(RelationChange::new(after.difference_with(&before), before.difference_with(&after)))
    } else if let Some(n) = any.downcast_ref::<Project>() {
        let d_operand = derive_node(n.operand(), variable, delta)?;
        let before = before_content(node, variable, delta)?;
        let after = after_content(node)?;
        let added = project_concrete(&d_operand.added, n.projected_scheme()).difference_with(&before);
        let removed = project_concrete(&d_operand.removed, n.projected_scheme()).difference_with(&after);
        Ok(RelationChange::new(added, removed))
    } else if let Some(n) = any.downcast_ref::<Select>() {
        // d(select(R,p)) = select(dR,p) — p is a fixed predicate on this
        // node, never itself the changed variable.
        let d_operand = derive_node(n.operand(), variable, delta)?;
        Ok(RelationChange::new(
            filter_concrete(&d_operand.added, n.expr()),
            filter_concrete(&d_operand.removed, n.expr()),
        ))
    } else if let Some(n) = any.downcast_ref::<Rename>() {
        let d_operand = derive_node(n.operand(), variable, delta)?;
        Ok(RelationChange::new(rename_concrete(n, &d_operand.added)?, rename_concrete(n, &d_operand.removed)?))
    } else if let Some(n) = any.downcast_ref::<Equijoin>() {
        // d(A⋈B) = dA⋈B_after ∪ A_before⋈dB, for both added and removed
        // (spec.md §4.4). Each removed pairing is caught by exactly one of
        // the two terms, whichever side's delta carries the removal.
        let d_left = derive_node(n.left(), variable, delta)?;
        let d_right = derive_node(n.right(), variable, delta)?;
        let left_before = before_content(n.left(), variable, delta)?;
        let right_after = after_content(n.right())?;

        let added_from_left = materialize(&n.join_concrete(&d_left.added, &right_after))?;
        let added_from_right = materialize(&n.join_concrete(&left_before, &d_right.added))?;
        let removed_from_left = materialize(&n.join_concrete(&d_left.removed, &right_after))?;
        let removed_from_right = materialize(&n.join_concrete(&left_before, &d_right.removed))?;
        Ok(RelationChange::new(
            added_from_left.union_with(&added_from_right),
            removed_from_left.union_with(&removed_from_right),
        ))
    } else if let Some(n) = any.downcast_ref::<Otherwise>() {
        // d(otherwise) is incremental except across the boundary where the
        // left operand flips between empty and non-empty (spec.md §4.4:
        // "recomputed on the transition boundary, incremental otherwise").
        let left_before = before_content(n.left(), variable, delta)?;
        let left_after = after_content(n.left())?;
        if left_before.is_empty() == left_after.is_empty() {
            if left_after.is_empty() {
                derive_node(n.right(), variable, delta)
            } else {
                derive_node(n.left(), variable, delta)
            }
        } else {
            let right_before = before_content(n.right(), variable, delta)?;
            let right_after = after_content(n.right())?;
            let before = if left_before.is_empty() { right_before } else { left_before };
            let after = if left_after.is_empty() { right_after } else { left_after };
            Ok(RelationChange::new(after.difference_with(&before), before.difference_with(&after)))
        }
    } else if let Some(n) = any.downcast_ref::<Unique>() {
        // Same two-regime rule as otherwise, keyed on whether "every row's
        // attr equals v" flips rather than on emptiness.
        let operand_before = before_content(n.operand(), variable, delta)?;
        let operand_after = after_content(n.operand())?;
        let holds_before = n.holds(&operand_before);
        let holds_after = n.holds(&operand_after);
        if holds_before == holds_after {
            if holds_after {
                derive_node(n.operand(), variable, delta)
            } else {
                Ok(RelationChange::empty(node.scheme().clone()))
            }
        } else {
            let before = materialize(&n.over_concrete(&operand_before))?;
            let after = materialize(&n.over_concrete(&operand_after))?;
            Ok(RelationChange::new(after.difference_with(&before), before.difference_with(&after)))
        }
    } else {
        // Aggregate: recomputed wholesale on every call, never
        // incrementally (spec.md §4.4: "d(aggregate) is recomputed").
        let before = before_content(node, variable, delta)?;
        let after = after_content(node)?;
        Ok(RelationChange::new(after.difference_with(&before), before.difference_with(&after)))
    }
}
