//! The asynchronous update manager (C10, spec.md §4.5).
//!
//! One instance per owning execution context. Registrations accumulate
//! in `pending`; a scheduled drain applies them inside a transaction,
//! differentiates the affected observers, and dispatches
//! willChange/payload/didChange. Grounded on the teacher's
//! `crates/reactive/src/observable.rs` dispatch loop, generalized from
//! one watched table to the full algebra via `rra_incremental::Derivative`.

use crate::action::Action;
use crate::registry::ObserverRegistry;
use rra_algebra::{materialize, ConcreteRelation, RelationRef};
use rra_core::{Error, Result, Row};
use rra_incremental::{Derivative, Inconsistency, RelationChange};
use rra_query::{run_plan, QueryContext, QueryOutcome, QueryPlan, QueryResult, QueryTarget};
use std::cell::RefCell;
use std::rc::{Rc, Weak};

/// `idle -> pending -> running -> stopping -> idle` of spec.md §4.5.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManagerState {
    Idle,
    Pending,
    Running,
    Stopping,
}

/// The abstraction over "the owning execution context" (an event loop, a
/// runloop) spec.md §4.5/§5 speaks of. `schedule` posts a unit of work to
/// run later on that context; `UpdateManager` never assumes a particular
/// runtime underneath it.
pub trait ExecutionContext {
    fn schedule(&self, work: Box<dyn FnOnce()>);
}

/// Runs scheduled work immediately, inline — the single-threaded test
/// harness context named in the ambient-stack notes.
#[derive(Default)]
pub struct ImmediateContext;

impl ExecutionContext for ImmediateContext {
    fn schedule(&self, work: Box<dyn FnOnce()>) {
        work();
    }
}

/// A `crossbeam-channel`-backed queue modeling "background worker plus
/// owning context" (spec.md §5): `schedule` posts into the channel,
/// `pump` (called by the host's own event loop, on the same thread) runs
/// everything currently queued. No OS thread is spawned — the channel
/// here is the cooperative hand-off primitive, not a thread-pool boundary
/// (spec.md's "asynchronous" is cooperative scheduling, not I/O-bound
/// async).
#[derive(Clone)]
pub struct ChannelContext {
    sender: crossbeam_channel::Sender<Box<dyn FnOnce()>>,
    receiver: crossbeam_channel::Receiver<Box<dyn FnOnce()>>,
}

impl Default for ChannelContext {
    fn default() -> Self {
        Self::new()
    }
}

impl ChannelContext {
    pub fn new() -> Self {
        let (sender, receiver) = crossbeam_channel::unbounded();
        ChannelContext { sender, receiver }
    }

    /// Drains and runs every currently queued unit of work. Returns the
    /// number run.
    pub fn pump(&self) -> usize {
        let mut ran = 0;
        while let Ok(work) = self.receiver.try_recv() {
            work();
            ran += 1;
        }
        ran
    }
}

impl ExecutionContext for ChannelContext {
    fn schedule(&self, work: Box<dyn FnOnce()>) {
        log::debug!("scheduling drain on channel context");
        let _ = self.sender.send(work);
    }
}

/// One leaf mutation produced while applying the current batch, paired
/// with the predicate that caused it (if any) so the consistency check
/// of spec.md §4.4 can run per observer root.
struct LeafDelta {
    variable: RelationRef,
    change: RelationChange,
    predicate: Option<rra_core::Expr>,
}

/// What a batch produced: each live root's delta (already filtered down
/// to the non-empty ones), plus any direct `query` actions still waiting
/// on a result — both get submitted to the planner together (spec.md
/// §4.5 step 6).
struct BatchOutcome {
    per_root: Vec<(RelationRef, RelationChange)>,
    query_actions: Vec<(RelationRef, Box<dyn FnOnce(Result<Vec<Row>>)>)>,
}

/// C10: the per-context state machine coordinating mutation batches and
/// observer notification.
pub struct UpdateManager<Ctx: ExecutionContext> {
    context: Ctx,
    registry: ObserverRegistry,
    state: RefCell<ManagerState>,
    pending: RefCell<Vec<Action>>,
    drain_scheduled: RefCell<bool>,
    /// True for the whole extent of a `drain()` call, including while an
    /// observer callback it dispatched is running. A `register` that
    /// lands while this is set does not ask the execution context to run
    /// another drain — the active `drain`'s own loop already rechecks
    /// `pending` on every iteration, so it picks the new action up itself
    /// (spec.md §8 S6) instead of recursing through `schedule` a second
    /// time, which under a synchronous context would otherwise re-enter
    /// the registry's callbacks while the first dispatch is still on the
    /// call stack.
    draining: RefCell<bool>,
    /// Lets `register` hand a strong, `'static` handle to itself to the
    /// execution context without requiring an unstable `self: &Rc<Self>`
    /// receiver — filled in once, right after construction.
    self_handle: RefCell<Weak<UpdateManager<Ctx>>>,
}

impl<Ctx: ExecutionContext> UpdateManager<Ctx> {
    pub fn new(context: Ctx, registry: ObserverRegistry) -> Rc<Self> {
        let manager = Rc::new(UpdateManager {
            context,
            registry,
            state: RefCell::new(ManagerState::Idle),
            pending: RefCell::new(Vec::new()),
            drain_scheduled: RefCell::new(false),
            draining: RefCell::new(false),
            self_handle: RefCell::new(Weak::new()),
        });
        *manager.self_handle.borrow_mut() = Rc::downgrade(&manager);
        manager
    }

    pub fn registry(&self) -> &ObserverRegistry {
        &self.registry
    }

    pub fn state(&self) -> ManagerState {
        *self.state.borrow()
    }

    /// Registers `action` and, if no drain is already scheduled for this
    /// batch, asks the execution context to run one (spec.md §4.5
    /// `idle --register--> pending`). Mutation *registration* returns
    /// immediately; effects happen on the next drain (spec.md §5).
    pub fn register(&self, action: Action) {
        self.pending.borrow_mut().push(action);
        if *self.state.borrow() == ManagerState::Idle {
            *self.state.borrow_mut() = ManagerState::Pending;
        }
        if *self.draining.borrow() {
            return;
        }
        if !*self.drain_scheduled.borrow() {
            *self.drain_scheduled.borrow_mut() = true;
            if let Some(this) = self.self_handle.borrow().upgrade() {
                self.context.schedule(Box::new(move || this.drain()));
            }
        }
    }

    /// Executes one full drain: steps 1-8 of spec.md §4.5. Loops in
    /// place (re-entrant registrations from inside a didChange callback,
    /// S6) rather than rescheduling, so the willChange/didChange pairing
    /// for this batch completes before `drain` returns.
    fn drain(self: Rc<Self>) {
        *self.drain_scheduled.borrow_mut() = false;
        *self.draining.borrow_mut() = true;
        loop {
            let actions: Vec<Action> = self.pending.borrow_mut().drain(..).collect();
            if actions.is_empty() {
                break;
            }
            *self.state.borrow_mut() = ManagerState::Running;
            self.registry.reset_will_change_flags();

            let outcome = self.run_batch(actions);

            *self.state.borrow_mut() = ManagerState::Stopping;
            self.dispatch(outcome.per_root, outcome.query_actions);

            if self.pending.borrow().is_empty() {
                break;
            }
            log::debug!("re-entrant actions registered during didChange; looping drain");
        }
        *self.draining.borrow_mut() = false;
        *self.state.borrow_mut() = ManagerState::Idle;
        debug_assert!(
            !self.registry.has_outstanding_will_change(),
            "willChange without matching didChange at idle"
        );
    }

    /// Steps 3-6: begin transactions, apply actions in order, end
    /// transactions, then derive each live root's delta.
    fn run_batch(&self, actions: Vec<Action>) -> BatchOutcome {
        let mut databases = Vec::new();
        for action in &actions {
            if let Some(db) = action.database() {
                if !databases.iter().any(|existing| Rc::ptr_eq(existing, db)) {
                    databases.push(db.clone());
                }
            }
        }
        if databases.len() > 1 {
            log::warn!("batch touches {} databases; cross-database atomicity is best-effort", databases.len());
        }
        for db in &databases {
            db.borrow_mut().begin();
        }

        // A `restoreSnapshot` isn't modeled as a leaf-level delta the
        // differentiator can replay, so if this batch contains one, every
        // live root's pre-batch content is captured up front — it's the
        // only "before" state `recompute_by_materialize` can diff against
        // once the restore has already landed (spec.md §8 invariant 4).
        let has_restore = actions.iter().any(|a| matches!(a, Action::RestoreSnapshot { .. }));
        let roots_before: Vec<(RelationRef, Result<ConcreteRelation>)> = if has_restore {
            self.registry.live_roots().into_iter().map(|root| {
                let before = materialize(root.as_ref());
                (root, before)
            }).collect()
        } else {
            Vec::new()
        };

        let mut leaf_deltas: Vec<LeafDelta> = Vec::new();
        let mut restored = false;
        let mut query_actions = Vec::new();
        let mut fatal: Option<Error> = None;

        for action in actions {
            if fatal.is_some() {
                break;
            }
            match action {
                Action::Add { relation, row, .. } => match relation.add(row) {
                    Ok(change) => leaf_deltas.push(LeafDelta {
                        variable: relation as RelationRef,
                        change,
                        predicate: None,
                    }),
                    Err(e) => fatal = Some(e),
                },
                Action::Update { relation, predicate, new_values, .. } => {
                    match relation.update(&predicate, &new_values) {
                        Ok(change) => leaf_deltas.push(LeafDelta {
                            variable: relation as RelationRef,
                            change,
                            predicate: Some(predicate),
                        }),
                        Err(e) => fatal = Some(e),
                    }
                }
                Action::Delete { relation, predicate, .. } => match relation.delete(&predicate) {
                    Ok(change) => leaf_deltas.push(LeafDelta {
                        variable: relation as RelationRef,
                        change,
                        predicate: Some(predicate),
                    }),
                    Err(e) => fatal = Some(e),
                },
                Action::RestoreSnapshot { database, snapshot } => {
                    if let Err(e) = database.borrow_mut().restore_snapshot(&snapshot) {
                        fatal = Some(e);
                    } else {
                        restored = true;
                    }
                }
                Action::Query { relation, callback } => {
                    query_actions.push((relation, callback));
                }
            }
        }

        for db in &databases {
            db.borrow_mut().end();
        }

        if let Some(err) = fatal {
            // Errors are fatal to the batch (spec.md §4.5 step 4) but the
            // transaction brackets above already closed; nothing to roll
            // back automatically (spec.md §7/§5 crossed-database caveat).
            log::warn!("batch aborted: {err}");
            for root in self.registry.live_roots() {
                self.registry.deliver_error(&root, &err);
                self.registry.deliver_did_change(&root);
            }
            return BatchOutcome { per_root: Vec::new(), query_actions: Vec::new() };
        }

        let mut per_root = Vec::new();
        for root in self.registry.live_roots() {
            let change = if restored {
                let before = roots_before.iter().find(|(existing, _)| Rc::ptr_eq(existing, &root)).map(|(_, before)| before);
                let result = match before {
                    Some(Ok(before)) => self.recompute_by_materialize(&root, before),
                    Some(Err(e)) => Err(e.clone()),
                    // A root registered after `roots_before` was captured
                    // (mid-drain re-entrant registration) has no "before"
                    // to diff against; treat it as freshly materialized.
                    None => materialize(root.as_ref()).map(|after| {
                        RelationChange::added_only(after.scheme().clone(), after.rows_set().iter().cloned())
                    }),
                };
                match result {
                    Ok(change) => change,
                    Err(e) => {
                        self.registry.deliver_error(&root, &e);
                        self.registry.deliver_did_change(&root);
                        continue;
                    }
                }
            } else {
                match self.derive_for_root(&root, &leaf_deltas) {
                    Ok(change) => change,
                    Err(e) => {
                        self.registry.deliver_error(&root, &e);
                        self.registry.deliver_did_change(&root);
                        continue;
                    }
                }
            };
            // A root this variable's mutation cannot possibly reach
            // derives to the empty change (spec.md §8 S2): skip the
            // willChange/didChange bracket entirely rather than notify
            // observers of nothing.
            if !change.is_empty() {
                per_root.push((root, change));
            }
        }

        BatchOutcome { per_root, query_actions }
    }

    /// `d(root)` for every touched leaf, merged, skipping any leaf whose
    /// mutation predicate the consistency check proves inconsistent with
    /// `root`'s bounding filters (spec.md §4.4: "no willChange, no
    /// recomputation").
    fn derive_for_root(&self, root: &RelationRef, leaf_deltas: &[LeafDelta]) -> Result<RelationChange> {
        let derivative = Derivative::new(root.clone());
        let mut accumulated: Option<RelationChange> = None;
        for leaf in leaf_deltas {
            if let Some(predicate) = &leaf.predicate {
                if derivative.check_consistency(&leaf.variable, predicate) == Inconsistency::ProvablyInconsistent {
                    continue;
                }
            }
            let contribution = derivative.derive(&leaf.variable, &leaf.change)?;
            accumulated = Some(match accumulated {
                Some(existing) => existing.merge(&contribution),
                None => contribution,
            });
        }
        Ok(accumulated.unwrap_or_else(|| RelationChange::empty(root.scheme().clone())))
    }

    /// Diffs `root`'s content before the restore against its content now,
    /// used only when a `restoreSnapshot` occurred this batch — restores
    /// are not modeled as leaf-level deltas the differentiator can replay
    /// incrementally (spec.md §8 invariant 4).
    fn recompute_by_materialize(&self, root: &RelationRef, before: &ConcreteRelation) -> Result<RelationChange> {
        let after = materialize(root.as_ref())?;
        Ok(RelationChange::new(after.difference_with(before), before.difference_with(&after)))
    }

    /// Steps 6-7: submit every observed root's delta, any root that needs
    /// its full content for an async-content observer, and every direct
    /// `query` action into one combined `QueryPlan`/`run_plan` execution
    /// (spec.md §4.5 step 6), then dispatch the outcomes to observers.
    fn dispatch(&self, per_root: Vec<(RelationRef, RelationChange)>, query_actions: Vec<(RelationRef, Box<dyn FnOnce(Result<Vec<Row>>)>)>) {
        let mut plan = QueryPlan::new();
        let mut context = QueryContext::new();

        // Each root gets a `Delta` target at id `2*index`, and — only if
        // it actually has an async-content observer — a `FullContent`
        // target at `2*index + 1` right after it.
        let mut content_ids: Vec<Option<u64>> = Vec::with_capacity(per_root.len());
        for (index, (root, change)) in per_root.iter().enumerate() {
            let delta_id = (index as u64) * 2;
            plan.push(delta_id, QueryTarget::Delta(change.clone()));
            if self.registry.has_content_observer(root) {
                let content_id = delta_id + 1;
                plan.push(content_id, QueryTarget::FullContent(root.clone()));
                content_ids.push(Some(content_id));
            } else {
                content_ids.push(None);
            }
        }

        // Direct `query` actions ride along past the per-root id range.
        let query_id_base = (per_root.len() as u64) * 2;
        for (offset, (relation, _)) in query_actions.iter().enumerate() {
            plan.push(query_id_base + offset as u64, QueryTarget::DirectQuery(relation.clone()));
        }

        let outcomes: Vec<QueryOutcome> = if plan.is_empty() { Vec::new() } else { run_plan(&plan) };
        for outcome in &outcomes {
            if let QueryResult::Error(err) = &outcome.result {
                context.record_error(err.clone());
            }
        }
        if context.has_errors() {
            log::warn!("{} target(s) failed in this drain's combined execution", context.errors().len());
        }

        for (index, (root, change)) in per_root.iter().enumerate() {
            let delta_id = (index as u64) * 2;
            if let Some(QueryOutcome { result: QueryResult::Error(err), .. }) = outcomes.iter().find(|o| o.id == delta_id) {
                self.registry.deliver_error(root, err);
                self.registry.deliver_did_change(root);
                continue;
            }

            let content_outcome = content_ids[index].and_then(|id| outcomes.iter().find(|o| o.id == id));
            if let Some(QueryOutcome { result: QueryResult::Error(err), .. }) = content_outcome {
                self.registry.deliver_error(root, err);
                self.registry.deliver_did_change(root);
                continue;
            }
            let content_rows: Vec<Row> = match content_outcome {
                Some(QueryOutcome { result: QueryResult::Content(rows), .. }) => rows.clone(),
                _ => Vec::new(),
            };
            self.registry.deliver(root, change, || content_rows.clone());
            self.registry.deliver_did_change(root);
        }

        for (offset, (_, callback)) in query_actions.into_iter().enumerate() {
            let id = query_id_base + offset as u64;
            let result = match outcomes.iter().find(|o| o.id == id).map(|o| &o.result) {
                Some(QueryResult::Content(rows)) => Ok(rows.clone()),
                Some(QueryResult::Error(err)) => Err(err.clone()),
                _ => Ok(Vec::new()),
            };
            callback(result);
        }
    }
}
