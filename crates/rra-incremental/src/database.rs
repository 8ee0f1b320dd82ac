//! The transactional database (C7, spec.md §4.3).
//!
//! A named group of change-logging relations with nestable
//! begin/end-transaction scoping and atomic snapshot/restore across every
//! member. Grounded on the teacher's `crates/storage/src/transaction.rs`
//! `Transaction` (begin/commit/rollback over a journal), generalized here
//! to a nestable depth counter over several relations at once rather than
//! one journal at a time.

use crate::change_log::{ChangeLoggingRelation, LogSnapshot};
use hashbrown::HashMap;
use rra_core::Result;
use std::cell::RefCell;
use std::rc::Rc;

/// An atomic, in-memory snapshot of every member relation's mutation log
/// (spec.md §4.3 `takeSnapshot`/`restoreSnapshot`). Not a wire format
/// (spec.md §6) — a value meaningful only against the database it was
/// taken from.
pub struct DatabaseSnapshot {
    entries: HashMap<String, LogSnapshot>,
}

/// Owns a named set of change-logging relations and coordinates
/// transaction nesting across all of them (spec.md §4.3).
///
/// `begin`/`end` are nestable: only the outermost `end()` actually commits
/// visibility of the batch to observers (observer notification itself is
/// `rra-reactive`'s concern; this type just tracks depth and exposes
/// `in_transaction()` so the update manager knows whether to suppress
/// notifications).
pub struct TransactionalDatabase {
    relations: HashMap<String, Rc<RefCell<ChangeLoggingRelation>>>,
    depth: usize,
}

impl Default for TransactionalDatabase {
    fn default() -> Self {
        Self::new()
    }
}

impl TransactionalDatabase {
    pub fn new() -> Self {
        TransactionalDatabase { relations: HashMap::new(), depth: 0 }
    }

    /// Registers `relation` under `name`. Panics (a programmer error, not
    /// a runtime one) if the name is already taken — spec.md §4.3 treats
    /// the name-to-relation mapping as fixed membership, not a dynamic
    /// table-creation API.
    pub fn add_relation(&mut self, name: impl Into<String>, relation: Rc<RefCell<ChangeLoggingRelation>>) {
        let name = name.into();
        assert!(!self.relations.contains_key(&name), "relation {name} already registered");
        self.relations.insert(name, relation);
    }

    pub fn relation(&self, name: &str) -> Option<Rc<RefCell<ChangeLoggingRelation>>> {
        self.relations.get(name).cloned()
    }

    pub fn relation_names(&self) -> impl Iterator<Item = &str> {
        self.relations.keys().map(|s| s.as_str())
    }

    /// Enters a (possibly nested) transaction. While `depth() > 0`,
    /// observers of member relations receive no change notifications
    /// (spec.md §4.3) — enforcing that is `rra-reactive`'s job; this type
    /// only tracks the depth.
    pub fn begin(&mut self) {
        self.depth += 1;
    }

    /// Leaves one level of transaction nesting. Only the matching
    /// outermost `end()` brings `depth()` back to zero.
    pub fn end(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn in_transaction(&self) -> bool {
        self.depth > 0
    }

    /// Runs `f` inside a transaction scope, guaranteeing `end()` on every
    /// exit path (including `f` returning an error) via `TransactionGuard`.
    pub fn transaction<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        self.begin();
        let mut guard = TransactionGuard { db: self, ended: false };
        let result = f(guard.db);
        guard.finish();
        result
    }

    /// Runs `f` inside a transaction, capturing a snapshot immediately
    /// before and immediately after — the shape an undo manager needs to
    /// install `forward`/`backward` restore entries (spec.md §4.3, S4).
    pub fn transaction_with_snapshots<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<T>,
    ) -> Result<(DatabaseSnapshot, DatabaseSnapshot, T)> {
        let before = self.take_snapshot();
        let value = self.transaction(f)?;
        let after = self.take_snapshot();
        Ok((before, after, value))
    }

    /// Captures the mutation log of every member relation (spec.md §4.3).
    pub fn take_snapshot(&self) -> DatabaseSnapshot {
        let entries = self
            .relations
            .iter()
            .map(|(name, rel)| (name.clone(), rel.borrow().take_snapshot()))
            .collect();
        DatabaseSnapshot { entries }
    }

    /// Restores every member relation's log from `snapshot`, atomically
    /// with respect to the caller's view (no partial application is
    /// observable once this returns — spec.md §4.3 "atomic across all
    /// member relations").
    pub fn restore_snapshot(&mut self, snapshot: &DatabaseSnapshot) -> Result<()> {
        for (name, rel) in &self.relations {
            if let Some(log_snapshot) = snapshot.entries.get(name) {
                rel.borrow_mut().restore_snapshot(log_snapshot)?;
            }
        }
        Ok(())
    }
}

/// RAII guard ensuring `TransactionalDatabase::end()` runs exactly once
/// even if the transaction body returns early via `?`.
pub struct TransactionGuard<'a> {
    db: &'a mut TransactionalDatabase,
    ended: bool,
}

impl<'a> TransactionGuard<'a> {
    fn finish(&mut self) {
        if !self.ended {
            self.db.end();
            self.ended = true;
        }
    }
}

impl<'a> Drop for TransactionGuard<'a> {
    fn drop(&mut self) {
        self.finish();
    }
}
