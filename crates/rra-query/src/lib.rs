//! rra-query — the query planner/runner (C9, spec.md §4's "executes a
//! relation (or a change delta) and streams resulting rows").
//!
//! This is deliberately thin: the restricted algebra `rra-algebra` defines
//! has no plan search to do. "Planning" here is hosting the one decision
//! point spec.md names — predicate pushdown, which `rra-algebra::Select`
//! already performs at construction time — plus the `QueryContext` that
//! tracks per-row errors without poisoning the rest of a batch (spec.md
//! §4.1 "a single error aborts iteration of that relation only").
//! Grounded on `crates/query/src/executor/runner.rs`'s execute-and-stream
//! shape, trimmed to this engine's operator set: no SQL AST, no
//! cost-based optimizer.

mod planner;
mod runner;

pub use planner::QueryContext;
pub use runner::{run, run_change, run_plan, QueryOutcome, QueryPlan, QueryResult, QueryTarget};
