//! The change-logging relation (C6, spec.md §4.2).

use crate::change::Change;
use crate::delta::RelationChange;
use rra_algebra::{ConcreteRelation, Relation, RelationRef, RowIter, StoredRelation};
use rra_core::{Attribute, Error, Expr, Result, Row, Scheme, Value};
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

/// Anything a change-logging relation can sit on top of and eventually
/// `save()` back to: a relation that also accepts direct row mutation.
/// `ConcreteRelation` implements this for the common "in-process table,
/// no persistence" case; `StoredRelation` implements it by delegating to
/// its `StorageAdapter` (spec.md §6), which is how `save()` reaches
/// persistent storage.
pub trait MutableRelation: Relation {
    fn add_row(&mut self, row: Row) -> Result<usize>;
    fn delete_rows(&mut self, predicate: &Expr) -> Result<usize>;
    fn update_rows(&mut self, predicate: &Expr, new_values: &[(Attribute, Value)]) -> Result<usize>;
}

impl MutableRelation for ConcreteRelation {
    fn add_row(&mut self, row: Row) -> Result<usize> {
        Ok(if self.insert(row) { 1 } else { 0 })
    }

    fn delete_rows(&mut self, predicate: &Expr) -> Result<usize> {
        Ok(self.retain_not_matching(predicate))
    }

    fn update_rows(&mut self, predicate: &Expr, new_values: &[(Attribute, Value)]) -> Result<usize> {
        Ok(self.update_matching(predicate, new_values))
    }
}

impl MutableRelation for StoredRelation {
    fn add_row(&mut self, row: Row) -> Result<usize> {
        self.adapter_mut().add(row)
    }

    fn delete_rows(&mut self, predicate: &Expr) -> Result<usize> {
        self.adapter_mut().delete(predicate)
    }

    fn update_rows(&mut self, predicate: &Expr, new_values: &[(Attribute, Value)]) -> Result<usize> {
        self.adapter_mut().update(predicate, new_values)
    }
}

/// An immutable copy of a change-logging relation's mutation log
/// (spec.md §4.2 `takeSnapshot`/`restoreSnapshot`). Snapshots are
/// in-memory values, not a wire format (spec.md §6).
pub struct LogSnapshot {
    entries: Vec<SnapshotEntry>,
}

enum SnapshotEntry {
    Union(ConcreteRelation),
    Select(Expr),
    Update(Expr, Vec<(Attribute, Value)>),
}

fn clone_change(change: &Change) -> SnapshotEntry {
    match change {
        Change::Union(r) => SnapshotEntry::Union(r.clone()),
        Change::Select(e) => SnapshotEntry::Select(e.clone()),
        Change::Update(e, nv) => SnapshotEntry::Update(e.clone(), nv.clone()),
    }
}

fn restore_change(entry: &SnapshotEntry) -> Change {
    match entry {
        SnapshotEntry::Union(r) => Change::Union(r.clone()),
        SnapshotEntry::Select(e) => Change::Select(e.clone()),
        SnapshotEntry::Update(e, nv) => Change::Update(e.clone(), nv.clone()),
    }
}

/// Replays `log` over `underlying`'s current content, producing the
/// relation's logical state (spec.md §4.2 `materialize`, and the
/// testable property of §8 invariant 2). This is the authoritative,
/// from-scratch definition; `ChangeLoggingRelation` maintains an
/// incrementally-updated cache so it does not have to call this on every
/// read, but every mutation is checked against it in this crate's tests.
pub fn replay(underlying: &dyn Relation, log: &[Change]) -> Result<ConcreteRelation> {
    let mut current = rra_algebra::materialize(underlying)?;
    for change in log {
        match change {
            Change::Union(rows) => current = current.union_with(rows),
            Change::Select(expr) => {
                current.retain_not_matching(&expr.negated());
            }
            Change::Update(expr, new_values) => {
                current.update_matching(expr, new_values);
            }
        }
    }
    Ok(current)
}

/// Wraps `underlying` with an append-only mutation log (spec.md §4.2).
/// `materialize()` is the log replayed over the underlying relation;
/// rather than recomputing that from scratch on every call, the cache is
/// maintained incrementally as each mutation is logged.
pub struct ChangeLoggingRelation {
    underlying: Rc<RefCell<dyn MutableRelation>>,
    log: Vec<Change>,
    cached: ConcreteRelation,
}

impl ChangeLoggingRelation {
    pub fn new(underlying: Rc<RefCell<dyn MutableRelation>>) -> Result<Self> {
        let cached = rra_algebra::materialize(&*underlying.borrow())?;
        Ok(ChangeLoggingRelation { underlying, log: Vec::new(), cached })
    }

    pub fn scheme(&self) -> &Arc<Scheme> {
        use rra_algebra::Relation as _;
        self.cached.scheme()
    }

    /// The relation's current logical content (spec.md §4.2
    /// `materialize`).
    pub fn materialize(&self) -> &ConcreteRelation {
        &self.cached
    }

    pub fn log_len(&self) -> usize {
        self.log.len()
    }

    /// `add(row)`: appends `Union({row})`, reports `added={row}`.
    pub fn add(&mut self, row: Row) -> Result<RelationChange> {
        let scheme = self.scheme().clone();
        self.log.push(Change::Union(ConcreteRelation::new(scheme.clone(), [row.clone()])));
        self.cached.insert(row.clone());
        Ok(RelationChange::added_only(scheme, [row]))
    }

    /// `delete(expr)`: rows currently matching `expr` become the removed
    /// set; appends `Select(¬expr)`.
    pub fn delete(&mut self, expr: &Expr) -> Result<RelationChange> {
        let scheme = self.scheme().clone();
        let removed: Vec<Row> = self.cached.rows_set().iter().filter(|row| expr.matches(row)).cloned().collect();
        self.log.push(Change::Select(expr.negated()));
        self.cached.retain_not_matching(expr);
        Ok(RelationChange::removed_only(scheme, removed))
    }

    /// `update(expr, newValues)`: rows matching `expr` (before) become
    /// `removed`; those same rows with `newValues` overwritten (after)
    /// become `added`. Appends `Update(expr, newValues)`.
    pub fn update(&mut self, expr: &Expr, new_values: &[(Attribute, Value)]) -> Result<RelationChange> {
        let scheme = self.scheme().clone();
        let before: Vec<Row> = self.cached.rows_set().iter().filter(|row| expr.matches(row)).cloned().collect();
        let after: Vec<Row> = before.iter().map(|row| row.with_overrides(new_values)).collect();
        self.log.push(Change::Update(expr.clone(), new_values.to_vec()));
        self.cached.update_matching(expr, new_values);
        Ok(RelationChange::new(
            ConcreteRelation::new(scheme.clone(), after),
            ConcreteRelation::new(scheme, before),
        ))
    }

    pub fn take_snapshot(&self) -> LogSnapshot {
        LogSnapshot { entries: self.log.iter().map(clone_change).collect() }
    }

    /// Replaces the log with `snapshot`'s and recomputes the cache
    /// (spec.md §4.2/§4.3; invariant of §8 #3: a `restore_snapshot` then
    /// `take_snapshot` round-trips).
    pub fn restore_snapshot(&mut self, snapshot: &LogSnapshot) -> Result<()> {
        self.log = snapshot.entries.iter().map(restore_change).collect();
        self.cached = replay(&*self.underlying.borrow(), &self.log)?;
        Ok(())
    }

    /// Diffs the current materialized state against `underlying` and
    /// issues the minimal add/delete to bring `underlying` in line
    /// (spec.md §4.2 `save`). Truncates the log on success; on a
    /// persistence error the log is left untouched so no logical state is
    /// lost (spec.md §4.3 "persistence errors from save() surface as
    /// errors without mutating the log").
    pub fn save(&mut self) -> Result<()> {
        let underlying_rows = rra_algebra::materialize(&*self.underlying.borrow())?;
        let to_add: Vec<Row> = self.cached.rows_set().iter().filter(|r| !underlying_rows.contains(r)).cloned().collect();
        let to_remove: Vec<Row> = underlying_rows.rows_set().iter().filter(|r| !self.cached.contains(r)).cloned().collect();

        let mut underlying = self.underlying.borrow_mut();
        for row in &to_remove {
            underlying.delete_rows(&row_equality_expr(row))?;
        }
        for row in to_add {
            underlying.add_row(row)?;
        }
        drop(underlying);
        self.log.clear();
        Ok(())
    }
}

impl Relation for ChangeLoggingRelation {
    fn scheme(&self) -> &Arc<Scheme> {
        use rra_algebra::Relation as _;
        self.cached.scheme()
    }

    fn rows(&self) -> RowIter<'_> {
        self.cached.rows()
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

/// Builds `attr1 == v1 AND attr2 == v2 AND ...` over every attribute of
/// `row`, used by `save()` to delete an exact row from the underlying
/// store through the predicate-shaped `MutableRelation::delete_rows` API.
fn row_equality_expr(row: &Row) -> Expr {
    let mut attrs = row.scheme().iter();
    let first = attrs.next().expect("row has at least one attribute");
    let mut expr = Expr::attr(first.clone()).eq(Expr::constant_value(row.get(first)));
    for attr in attrs {
        expr = expr.and(Expr::attr(attr.clone()).eq(Expr::constant_value(row.get(attr))));
    }
    expr
}

#[cfg(test)]
mod tests {
    use super::*;
    use rra_core::{Attribute, Value};

    fn scheme() -> Arc<Scheme> {
        Arc::new(Scheme::new(vec![Attribute::new("id"), Attribute::new("name")]))
    }

    fn row(id: i64, name: &str) -> Row {
        Row::new(scheme(), vec![Value::Integer(id), Value::Text(name.into())]).unwrap()
    }

    fn fresh() -> ChangeLoggingRelation {
        let underlying: Rc<RefCell<dyn MutableRelation>> = Rc::new(RefCell::new(ConcreteRelation::empty(scheme())));
        ChangeLoggingRelation::new(underlying).unwrap()
    }

    #[test]
    fn add_then_materialize_contains_the_row() {
        let mut rel = fresh();
        let change = rel.add(row(1, "cat")).unwrap();
        assert!(change.added.contains(&row(1, "cat")));
        assert!(rel.materialize().contains(&row(1, "cat")));
    }

    #[test]
    fn delete_reports_removed_rows_and_keeps_others() {
        let mut rel = fresh();
        rel.add(row(1, "cat")).unwrap();
        rel.add(row(2, "dog")).unwrap();
        let expr = Expr::attr("id").eq(Expr::constant(1i64));
        let change = rel.delete(&expr).unwrap();
        assert!(change.removed.contains(&row(1, "cat")));
        assert!(!rel.materialize().contains(&row(1, "cat")));
        assert!(rel.materialize().contains(&row(2, "dog")));
    }

    #[test]
    fn update_reports_before_and_after() {
        let mut rel = fresh();
        rel.add(row(1, "cat")).unwrap();
        let expr = Expr::attr("id").eq(Expr::constant(1i64));
        let change = rel.update(&expr, &[(Attribute::new("name"), Value::Text("kat".into()))]).unwrap();
        assert!(change.removed.contains(&row(1, "cat")));
        assert!(change.added.contains(&row(1, "kat")));
        assert!(rel.materialize().contains(&row(1, "kat")));
    }

    #[test]
    fn materialize_matches_log_replay() {
        let mut rel = fresh();
        rel.add(row(1, "cat")).unwrap();
        rel.add(row(2, "dog")).unwrap();
        let expr = Expr::attr("id").eq(Expr::constant(1i64));
        rel.update(&expr, &[(Attribute::new("name"), Value::Text("kat".into()))]).unwrap();

        let underlying: Rc<RefCell<dyn MutableRelation>> = Rc::new(RefCell::new(ConcreteRelation::empty(scheme())));
        let replayed = replay(&*underlying.borrow(), &rel.log).unwrap();
        assert_eq!(replayed.len(), rel.materialize().len());
        for r in replayed.rows_set() {
            assert!(rel.materialize().contains(r));
        }
    }

    #[test]
    fn snapshot_round_trips() {
        let mut rel = fresh();
        rel.add(row(1, "cat")).unwrap();
        let snap = rel.take_snapshot();
        rel.add(row(2, "dog")).unwrap();
        rel.restore_snapshot(&snap).unwrap();
        assert_eq!(rel.materialize().len(), 1);
        assert!(rel.materialize().contains(&row(1, "cat")));

        let snap2 = rel.take_snapshot();
        assert_eq!(snap.entries.len(), snap2.entries.len());
    }

    #[test]
    fn save_truncates_log_and_updates_underlying() {
        let underlying: Rc<RefCell<dyn MutableRelation>> = Rc::new(RefCell::new(ConcreteRelation::empty(scheme())));
        let mut rel = ChangeLoggingRelation::new(underlying.clone()).unwrap();
        rel.add(row(1, "cat")).unwrap();
        rel.save().unwrap();
        assert_eq!(rel.log_len(), 0);
        let underlying_rows = rra_algebra::materialize(&*underlying.borrow()).unwrap();
        assert!(underlying_rows.contains(&row(1, "cat")));
    }
}
