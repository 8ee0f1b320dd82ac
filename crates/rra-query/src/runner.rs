//! Executes a relation or a change delta and streams resulting rows
//! (spec.md §4's C9), grounded on `crates/query/src/executor/runner.rs`'s
//! execute-and-stream shape.

use rra_algebra::RelationRef;
use rra_core::{Result, Row};
use rra_incremental::RelationChange;

/// Streams every row of `relation` to `on_row`. Stops and returns the
/// error on the first failure — callers that need "one error doesn't
/// abort the whole batch" should run each relation through `run_plan`
/// instead, which isolates failures per target.
pub fn run(relation: &RelationRef, mut on_row: impl FnMut(Row)) -> Result<()> {
    for row in relation.rows() {
        on_row(row?);
    }
    Ok(())
}

/// Streams a `RelationChange`'s added rows then its removed rows.
pub fn run_change(change: &RelationChange, mut on_added: impl FnMut(Row), mut on_removed: impl FnMut(Row)) -> Result<()> {
    for row in change.added.rows() {
        on_added(row?);
    }
    for row in change.removed.rows() {
        on_removed(row?);
    }
    Ok(())
}

/// One entry in a combined execution: a full-content query, a
/// differentiated delta, or an ad-hoc `query` action — all routed by the
/// observer/action id the caller supplies (spec.md §4.5 step 6:
/// "submit both, plus any direct query actions, to the query planner in
/// one combined execution").
pub enum QueryTarget {
    /// An async-content observer: stream the relation's full current
    /// contents.
    FullContent(RelationRef),
    /// An async-delta observer: stream just what changed.
    Delta(RelationChange),
    /// A directly registered `query(R, callback)` action (spec.md §4.5).
    DirectQuery(RelationRef),
}

/// A batch of targets to execute together in one pass, keyed by an
/// opaque id the caller assigns (an observer id, in `rra-reactive`).
#[derive(Default)]
pub struct QueryPlan {
    targets: Vec<(u64, QueryTarget)>,
}

impl QueryPlan {
    pub fn new() -> Self {
        QueryPlan { targets: Vec::new() }
    }

    pub fn push(&mut self, id: u64, target: QueryTarget) {
        self.targets.push((id, target));
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

/// The result of running one `QueryTarget`.
pub enum QueryResult {
    Content(Vec<Row>),
    Delta { added: Vec<Row>, removed: Vec<Row> },
    Error(rra_core::Error),
}

pub struct QueryOutcome {
    pub id: u64,
    pub result: QueryResult,
}

/// Runs every target in `plan`. A failure on one target surfaces as that
/// target's `QueryResult::Error` and does not prevent the others from
/// completing (spec.md §4.1, §7: iteration errors are per-row/per-target,
/// never batch-wide).
pub fn run_plan(plan: &QueryPlan) -> Vec<QueryOutcome> {
    plan.targets
        .iter()
        .map(|(id, target)| {
            let result = match target {
                QueryTarget::FullContent(relation) | QueryTarget::DirectQuery(relation) => {
                    let mut rows = Vec::new();
                    match run(relation, |row| rows.push(row)) {
                        Ok(()) => QueryResult::Content(rows),
                        Err(e) => QueryResult::Error(e),
                    }
                }
                QueryTarget::Delta(change) => {
                    let mut added = Vec::new();
                    let mut removed = Vec::new();
                    match run_change(change, |row| added.push(row), |row| removed.push(row)) {
                        Ok(()) => QueryResult::Delta { added, removed },
                        Err(e) => QueryResult::Error(e),
                    }
                }
            };
            QueryOutcome { id: *id, result }
        })
        .collect()
}
