//! The observer registry (C11, spec.md §4.6).
//!
//! Three registration flavors — sync delta, async delta, async content —
//! stored by monotonically increasing 64-bit ID and keyed by the
//! *identity* of the root relation, not its current value. Grounded on
//! the teacher's `crates/reactive/src/subscription.rs`
//! `SubscriptionManager` (monotonic IDs, a flat map, an opaque remover)
//! and `crates/reactive/src/notify.rs` `QueryRegistry` (grouping
//! registrations by the table/relation they watch).

use hashbrown::HashMap;
use rra_algebra::RelationRef;
use rra_core::{Error, Row};
use rra_incremental::RelationChange;
use std::cell::RefCell;
use std::rc::{Rc, Weak};

pub type ObserverId = u64;

/// Callback surface for an async-delta registration (spec.md §4.6):
/// `willChange`, one or more `addedRows`/`removedRows` batches, an
/// optional terminal `error`, then `didChange`.
pub trait AsyncDeltaObserver {
    fn will_change(&mut self);
    fn added_rows(&mut self, rows: &[Row]);
    fn removed_rows(&mut self, rows: &[Row]);
    fn error(&mut self, err: &Error);
    fn did_change(&mut self);
}

/// Callback surface for an async-content registration (spec.md §4.6):
/// `willChange`, a single `newContents` or `error`, then `didChange`.
pub trait AsyncContentObserver {
    fn will_change(&mut self);
    fn new_contents(&mut self, rows: &[Row]);
    fn error(&mut self, err: &Error);
    fn did_change(&mut self);
}

enum Kind {
    SyncDelta(Box<dyn FnMut(&RelationChange)>),
    AsyncDelta(Box<dyn AsyncDeltaObserver>),
    AsyncContent(Box<dyn AsyncContentObserver>),
}

/// One registration. `did_send_will_change` is the flag spec.md §4.5
/// names explicitly: "a flag `didSendWillChange` on each observer entry
/// prevents duplicates" within a single drain.
struct Entry {
    root: Weak<dyn rra_algebra::Relation>,
    kind: Kind,
    did_send_will_change: bool,
}

impl Entry {
    fn is_sync(&self) -> bool {
        matches!(self.kind, Kind::SyncDelta(_))
    }
}

struct Inner {
    next_id: ObserverId,
    entries: HashMap<ObserverId, Entry>,
    by_root: HashMap<usize, Vec<ObserverId>>,
}

fn root_key(root: &RelationRef) -> usize {
    Rc::as_ptr(root) as *const () as usize
}

/// A cheaply-cloned handle to the registry (clone shares the same
/// underlying table, matching `SubscriptionManager`'s original
/// ownership shape — one manager, many clone-holders).
#[derive(Clone)]
pub struct ObserverRegistry {
    inner: Rc<RefCell<Inner>>,
}

impl Default for ObserverRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ObserverRegistry {
    pub fn new() -> Self {
        ObserverRegistry {
            inner: Rc::new(RefCell::new(Inner { next_id: 1, entries: HashMap::new(), by_root: HashMap::new() })),
        }
    }

    fn insert(&self, root: &RelationRef, kind: Kind) -> ObserverId {
        let mut inner = self.inner.borrow_mut();
        let id = inner.next_id;
        inner.next_id += 1;
        inner.entries.insert(id, Entry { root: Rc::downgrade(root), kind, did_send_will_change: false });
        inner.by_root.entry(root_key(root)).or_insert_with(Vec::new).push(id);
        id
    }

    pub fn register_sync_delta(&self, root: &RelationRef, callback: impl FnMut(&RelationChange) + 'static) -> Remover {
        let id = self.insert(root, Kind::SyncDelta(Box::new(callback)));
        Remover { registry: self.clone(), id }
    }

    pub fn register_async_delta(&self, root: &RelationRef, observer: impl AsyncDeltaObserver + 'static) -> Remover {
        let id = self.insert(root, Kind::AsyncDelta(Box::new(observer)));
        Remover { registry: self.clone(), id }
    }

    pub fn register_async_content(&self, root: &RelationRef, observer: impl AsyncContentObserver + 'static) -> Remover {
        let id = self.insert(root, Kind::AsyncContent(Box::new(observer)));
        Remover { registry: self.clone(), id }
    }

    /// Deregisters `id`. Idempotent — deregistering twice, or after the
    /// root relation was already dropped, is a no-op (spec.md §5: "a
    /// deregistration that races with an in-flight delivery ... is
    /// honored for subsequent deliveries").
    pub fn unregister(&self, id: ObserverId) {
        let mut inner = self.inner.borrow_mut();
        if let Some(entry) = inner.entries.remove(&id) {
            if let Some(root) = entry.root.upgrade() {
                let key = root_key(&root);
                if let Some(ids) = inner.by_root.get_mut(&key) {
                    ids.retain(|existing| *existing != id);
                }
            }
        }
    }

    /// Every root relation with at least one live observer, pruning
    /// entries whose root has been dropped (the registry "detaches" them,
    /// per spec.md's design note on dropping a watched relation).
    pub fn live_roots(&self) -> Vec<RelationRef> {
        let mut inner = self.inner.borrow_mut();
        let mut seen = hashbrown::HashSet::new();
        let mut dead_ids = Vec::new();
        let mut roots = Vec::new();
        for (id, entry) in inner.entries.iter() {
            match entry.root.upgrade() {
                Some(root) => {
                    let key = root_key(&root);
                    if seen.insert(key) {
                        roots.push(root);
                    }
                }
                None => dead_ids.push(*id),
            }
        }
        for id in dead_ids {
            inner.entries.remove(&id);
        }
        roots
    }

    fn ids_for(&self, root: &RelationRef) -> Vec<ObserverId> {
        self.inner.borrow().by_root.get(&root_key(root)).cloned().unwrap_or_default()
    }

    /// Whether `root` has at least one live async-content observer — lets
    /// the dispatcher skip materializing full content for roots nobody
    /// watches that way.
    pub fn has_content_observer(&self, root: &RelationRef) -> bool {
        let ids = self.ids_for(root);
        let inner = self.inner.borrow();
        ids.iter().any(|id| matches!(inner.entries.get(id).map(|e| &e.kind), Some(Kind::AsyncContent(_))))
    }

    /// Resets every observer's `did_send_will_change` flag, called once
    /// at the start of a fresh drain (spec.md §4.5 step 1).
    pub fn reset_will_change_flags(&self) {
        for entry in self.inner.borrow_mut().entries.values_mut() {
            entry.did_send_will_change = false;
        }
    }

    /// Checks an entry out of the table by ID so its observer callback can
    /// run without the table's `RefCell` held borrowed — a callback that
    /// re-entrantly calls back into this registry (e.g. unsubscribing
    /// itself, or a manager re-entering the drain that reaches this same
    /// root again) would otherwise hit a `BorrowMutError`. `unregister`
    /// racing against a checked-out entry is a harmless no-op, consistent
    /// with deregistration already being documented as idempotent.
    fn with_entry(&self, id: ObserverId, f: impl FnOnce(&mut Entry)) {
        let Some(mut entry) = self.inner.borrow_mut().entries.remove(&id) else { return };
        f(&mut entry);
        self.inner.borrow_mut().entries.insert(id, entry);
    }

    /// Delivers `change` to every observer of `root` (spec.md §4.5 steps
    /// 6-7). Sync observers receive it directly; async observers get the
    /// `willChange` (once per drain) / payload / `didChange` bracket.
    pub fn deliver(&self, root: &RelationRef, change: &RelationChange, full_contents: impl Fn() -> Vec<Row>) {
        let ids = self.ids_for(root);
        if ids.is_empty() {
            return;
        }
        let mut contents_cache: Option<Vec<Row>> = None;
        for id in ids {
            self.with_entry(id, |entry| match &mut entry.kind {
                Kind::SyncDelta(callback) => {
                    if !change.is_empty() {
                        callback(change);
                    }
                }
                Kind::AsyncDelta(observer) => {
                    if !entry.did_send_will_change {
                        observer.will_change();
                        entry.did_send_will_change = true;
                    }
                    let added: Vec<Row> = change.added.rows_set().iter().cloned().collect();
                    let removed: Vec<Row> = change.removed.rows_set().iter().cloned().collect();
                    if !added.is_empty() {
                        observer.added_rows(&added);
                    }
                    if !removed.is_empty() {
                        observer.removed_rows(&removed);
                    }
                }
                Kind::AsyncContent(observer) => {
                    if !entry.did_send_will_change {
                        observer.will_change();
                        entry.did_send_will_change = true;
                    }
                    let rows = contents_cache.get_or_insert_with(|| full_contents());
                    observer.new_contents(rows);
                }
            });
        }
    }

    /// Delivers a terminal error to every async observer of `root`,
    /// opening the `willChange` bracket first if it hasn't already been
    /// sent this drain (spec.md §7: "observer callbacks receive
    /// `relationError` as a terminal alternative to row delivery"; a
    /// `didChange` must still follow, via `deliver_did_change`). Sync
    /// delta observers have no error channel and are skipped.
    pub fn deliver_error(&self, root: &RelationRef, err: &Error) {
        let ids = self.ids_for(root);
        for id in ids {
            self.with_entry(id, |entry| match &mut entry.kind {
                Kind::SyncDelta(_) => {}
                Kind::AsyncDelta(observer) => {
                    if !entry.did_send_will_change {
                        observer.will_change();
                        entry.did_send_will_change = true;
                    }
                    observer.error(err);
                }
                Kind::AsyncContent(observer) => {
                    if !entry.did_send_will_change {
                        observer.will_change();
                        entry.did_send_will_change = true;
                    }
                    observer.error(err);
                }
            });
        }
    }

    /// Emits `didChange` to every async observer of `root` that currently
    /// has an outstanding `willChange` (i.e. `did_send_will_change`),
    /// clearing the flag (spec.md §4.5 step 8, §5 "a `didChange` still
    /// follows" even after an error).
    pub fn deliver_did_change(&self, root: &RelationRef) {
        let ids = self.ids_for(root);
        for id in ids {
            self.with_entry(id, |entry| {
                if entry.is_sync() || !entry.did_send_will_change {
                    return;
                }
                entry.did_send_will_change = false;
                match &mut entry.kind {
                    Kind::AsyncDelta(observer) => observer.did_change(),
                    Kind::AsyncContent(observer) => observer.did_change(),
                    Kind::SyncDelta(_) => unreachable!(),
                }
            });
        }
    }

    /// True if any live observer anywhere still has an outstanding
    /// `willChange` without a matching `didChange` — the per-drain half
    /// of spec.md §8 invariant 1.
    pub fn has_outstanding_will_change(&self) -> bool {
        self.inner.borrow().entries.values().any(|e| e.did_send_will_change)
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.inner.borrow().entries.len()
    }
}

/// The opaque remover every registration returns (spec.md §4.6).
pub struct Remover {
    registry: ObserverRegistry,
    id: ObserverId,
}

impl Remover {
    pub fn id(&self) -> ObserverId {
        self.id
    }

    pub fn remove(self) {
        self.registry.unregister(self.id);
    }
}
