//! The storage adapter contract (spec.md §6).
//!
//! An adapter is a persistent (or merely out-of-process) row store behind
//! a common contract. The engine core treats every adapter as an external
//! collaborator — this crate specifies the contract and ships two worked
//! reference adapters; a real SQLite adapter is explicitly out of scope
//! (spec.md §1).

use rra_core::{Attribute, Expr, Result, Row, Scheme, Value};
use std::sync::Arc;

/// A single row, or the error that aborted producing it. Per spec.md
/// §4.1, a single error aborts iteration of *that* relation only.
pub type AdapterRowIter<'a> = Box<dyn Iterator<Item = Result<Row>> + 'a>;

/// Contract every storage adapter satisfies (spec.md §6).
pub trait StorageAdapter {
    /// The scheme shared by every row this adapter produces.
    fn scheme(&self) -> &Arc<Scheme>;

    /// Streams rows. Stable order is not required.
    fn rows(&self) -> AdapterRowIter<'_>;

    /// Adds `row`. A duplicate of an existing row is a no-op that returns
    /// `Ok(0)`; a genuine insertion returns `Ok(1)`.
    fn add(&mut self, row: Row) -> Result<usize>;

    /// Deletes every row matching `predicate`. Returns the number removed.
    fn delete(&mut self, predicate: &Expr) -> Result<usize>;

    /// Overwrites the given attributes on every row matching `predicate`.
    /// Returns the number updated.
    fn update(&mut self, predicate: &Expr, new_values: &[(Attribute, Value)]) -> Result<usize>;

    /// If this adapter can evaluate `predicate` natively (e.g. push it
    /// down to an index or a `WHERE` clause), returns a row iterator over
    /// just the matching rows instead of requiring the caller to filter
    /// every row in memory. `rra-algebra`'s `select` combinator calls this
    /// before falling back to in-memory filtering (spec.md §4.1, last
    /// bullet).
    fn select_native(&self, _predicate: &Expr) -> Option<AdapterRowIter<'_>> {
        None
    }
}
