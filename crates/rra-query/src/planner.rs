//! The planning surface of C9.
//!
//! For this engine's fixed algebra there is no plan search to perform —
//! every combinator already decides its own evaluation strategy at
//! construction time (`rra-algebra::Select`'s predicate-pushdown check
//! against a `StoredRelation`'s adapter, spec.md §4.1 last bullet). What
//! remains is bookkeeping shared across a batch of relation executions:
//! collecting per-row errors without letting one relation's failure abort
//! its siblings (spec.md §4.1).

use rra_core::Error;

/// Accumulates errors encountered while running one or more relations in
/// the same combined execution (spec.md §4.5 step 6), keeping them
/// separate from the rows that did stream successfully.
#[derive(Default)]
pub struct QueryContext {
    errors: Vec<Error>,
}

impl QueryContext {
    pub fn new() -> Self {
        QueryContext { errors: Vec::new() }
    }

    pub fn record_error(&mut self, err: Error) {
        self.errors.push(err);
    }

    pub fn errors(&self) -> &[Error] {
        &self.errors
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}
