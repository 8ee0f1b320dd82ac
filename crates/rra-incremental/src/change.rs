//! The mutation log entry type of spec.md §4.2.
//!
//! A delete is never logged as its own variant: "a delete of predicate P
//! is stored as `Select(¬P)`, preserving rows that should remain" — so
//! `Change` has exactly the three shapes spec.md names.

use rra_algebra::ConcreteRelation;
use rra_core::{Attribute, Expr, Value};

/// One entry in a change-logging relation's mutation log.
pub enum Change {
    /// `add(row)`: union the underlying/cached content with this set.
    Union(ConcreteRelation),
    /// A delete-by-predicate, stored as "keep everything not matching the
    /// deleted predicate" (spec.md §4.2).
    Select(Expr),
    /// `update(expr, newValues)`: every row currently matching `expr` gets
    /// `newValues` overwritten.
    Update(Expr, Vec<(Attribute, Value)>),
}
