//! Integration tests for the six testable scenarios of spec.md §8.

use rra_algebra::{ConcreteRelation, Equijoin, Project, RelationRef, Rename, Select};
use rra_core::{Attribute, Error, Expr, Row, Scheme, Value};
use rra_incremental::{ChangeLoggingRelation, MutableRelation};
use rra_reactive::{
    Action, AsyncContentObserver, AsyncDeltaObserver, ChangeLogLeaf, ChannelContext, ImmediateContext, ObserverRegistry,
    UpdateManager,
};
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

fn scheme(attrs: &[&str]) -> Arc<Scheme> {
    Arc::new(Scheme::new(attrs.iter().map(|a| Attribute::new(*a))))
}

fn row(scheme: &Arc<Scheme>, values: Vec<Value>) -> Row {
    Row::new(scheme.clone(), values).unwrap()
}

fn change_log_leaf(scheme: Arc<Scheme>) -> (Rc<ChangeLogLeaf>, Rc<RefCell<ChangeLoggingRelation>>) {
    let underlying: Rc<RefCell<dyn MutableRelation>> = Rc::new(RefCell::new(ConcreteRelation::empty(scheme)));
    let log = Rc::new(RefCell::new(ChangeLoggingRelation::new(underlying).unwrap()));
    (ChangeLogLeaf::new(log.clone()), log)
}

/// Logs every callback it receives, in order, as a short tag string — the
/// shape every scenario below asserts against.
#[derive(Default)]
struct Recorder {
    log: Rc<RefCell<Vec<String>>>,
}

impl Recorder {
    fn handle(&self) -> Rc<RefCell<Vec<String>>> {
        self.log.clone()
    }
}

struct ContentObserver {
    log: Rc<RefCell<Vec<String>>>,
}

impl AsyncContentObserver for ContentObserver {
    fn will_change(&mut self) {
        self.log.borrow_mut().push("will_change".into());
    }

    fn new_contents(&mut self, rows: &[Row]) {
        let mut names: Vec<String> = rows.iter().map(|r| format!("{:?}", r.values())).collect();
        names.sort();
        self.log.borrow_mut().push(format!("new_contents:{}", names.join(",")));
    }

    fn error(&mut self, err: &Error) {
        self.log.borrow_mut().push(format!("error:{err}"));
    }

    fn did_change(&mut self) {
        self.log.borrow_mut().push("did_change".into());
    }
}

struct DeltaObserver {
    log: Rc<RefCell<Vec<String>>>,
}

impl AsyncDeltaObserver for DeltaObserver {
    fn will_change(&mut self) {
        self.log.borrow_mut().push("will_change".into());
    }

    fn added_rows(&mut self, rows: &[Row]) {
        let mut names: Vec<String> = rows.iter().map(|r| format!("{:?}", r.values())).collect();
        names.sort();
        self.log.borrow_mut().push(format!("added:{}", names.join(",")));
    }

    fn removed_rows(&mut self, rows: &[Row]) {
        let mut names: Vec<String> = rows.iter().map(|r| format!("{:?}", r.values())).collect();
        names.sort();
        self.log.borrow_mut().push(format!("removed:{}", names.join(",")));
    }

    fn error(&mut self, err: &Error) {
        self.log.borrow_mut().push(format!("error:{err}"));
    }

    fn did_change(&mut self) {
        self.log.borrow_mut().push("did_change".into());
    }
}

// --------------------------------------------------------------- S1 ---

#[test]
fn s1_basic_delta_reaches_a_dependent_observer() {
    let people = scheme(&["id", "name"]);
    let (leaf, log) = change_log_leaf(people.clone());
    log.borrow_mut().add(row(&people, vec![Value::Integer(1), Value::Text("cat".into())])).unwrap();

    let selected: RelationRef = Rc::new(Select::new(leaf.clone(), Expr::attr("id").eq(Expr::constant(1i64))));
    let projected: RelationRef = Rc::new(Project::new(selected, scheme(&["name"])).unwrap());

    let registry = ObserverRegistry::new();
    let recorder = Recorder::default();
    let _remover = registry.register_async_content(&projected, ContentObserver { log: recorder.handle() });

    let manager = UpdateManager::new(ImmediateContext, registry);
    manager.register(Action::Update {
        database: Rc::new(RefCell::new(rra_incremental::TransactionalDatabase::new())),
        relation: leaf,
        predicate: Expr::attr("id").eq(Expr::constant(1i64)),
        new_values: vec![(Attribute::new("name"), Value::Text("kat".into()))],
    });

    let log = recorder.handle();
    assert_eq!(
        *log.borrow(),
        vec!["will_change".to_string(), "new_contents:[Text(\"kat\")]".to_string(), "did_change".to_string()]
    );
}

// --------------------------------------------------------------- S2 ---

#[test]
fn s2_unrelated_mutation_produces_no_notification() {
    let people = scheme(&["id", "name"]);
    let (leaf, _log) = change_log_leaf(people.clone());

    let selected: RelationRef = Rc::new(Select::new(leaf.clone(), Expr::attr("id").eq(Expr::constant(1i64))));

    let registry = ObserverRegistry::new();
    let recorder = Recorder::default();
    let _remover = registry.register_async_content(&selected, ContentObserver { log: recorder.handle() });

    let manager = UpdateManager::new(ImmediateContext, registry);
    manager.register(Action::Add {
        database: Rc::new(RefCell::new(rra_incremental::TransactionalDatabase::new())),
        relation: leaf,
        row: row(&people, vec![Value::Integer(3), Value::Text("fish".into())]),
    });

    assert!(recorder.handle().borrow().is_empty());
}

// --------------------------------------------------------------- S3 ---

#[test]
fn s3_ordered_row_update_leaves_siblings_untouched() {
    let items = scheme(&["id", "parent", "position"]);
    let (leaf, log) = change_log_leaf(items.clone());
    {
        let mut log = log.borrow_mut();
        log.add(row(&items, vec![Value::Integer(1), Value::Integer(0), Value::Integer(0)])).unwrap();
        log.add(row(&items, vec![Value::Integer(2), Value::Integer(0), Value::Integer(1)])).unwrap();
        log.add(row(&items, vec![Value::Integer(3), Value::Integer(0), Value::Integer(2)])).unwrap();
    }

    let whole: RelationRef = leaf.clone();
    let registry = ObserverRegistry::new();
    let recorder = Recorder::default();
    let _remover = registry.register_async_content(&whole, ContentObserver { log: recorder.handle() });

    let manager = UpdateManager::new(ImmediateContext, registry);
    manager.register(Action::Update {
        database: Rc::new(RefCell::new(rra_incremental::TransactionalDatabase::new())),
        relation: leaf.clone(),
        predicate: Expr::attr("id").eq(Expr::constant(3i64)),
        new_values: vec![(Attribute::new("position"), Value::Integer(0))],
    });

    let after = leaf.as_ref();
    let materialized = rra_algebra::materialize(after).unwrap();
    assert!(materialized.contains(&row(&items, vec![Value::Integer(1), Value::Integer(0), Value::Integer(0)])));
    assert!(materialized.contains(&row(&items, vec![Value::Integer(2), Value::Integer(0), Value::Integer(1)])));
    assert!(materialized.contains(&row(&items, vec![Value::Integer(3), Value::Integer(0), Value::Integer(0)])));

    let log = recorder.handle();
    assert_eq!(log.borrow().iter().filter(|e| *e == "will_change").count(), 1);
    assert_eq!(log.borrow().iter().filter(|e| *e == "did_change").count(), 1);
}

// --------------------------------------------------------------- S4 ---

#[test]
fn s4_restore_snapshot_emits_exactly_one_bracket() {
    let people = scheme(&["id", "name"]);
    let underlying: Rc<RefCell<dyn MutableRelation>> = Rc::new(RefCell::new(ConcreteRelation::empty(people.clone())));
    let log = Rc::new(RefCell::new(ChangeLoggingRelation::new(underlying).unwrap()));
    let mut db = rra_incremental::TransactionalDatabase::new();
    db.add_relation("people", log.clone());
    let database = Rc::new(RefCell::new(db));

    let leaf = ChangeLogLeaf::new(log);
    let whole: RelationRef = leaf.clone();

    let registry = ObserverRegistry::new();
    let recorder = Recorder::default();
    let _remover = registry.register_async_content(&whole, ContentObserver { log: recorder.handle() });
    let manager = UpdateManager::new(ImmediateContext, registry);

    let before = database.borrow().take_snapshot();
    manager.register(Action::Add {
        database: database.clone(),
        relation: leaf.clone(),
        row: row(&people, vec![Value::Integer(1), Value::Text("cat".into())]),
    });
    assert_eq!(recorder.handle().borrow().iter().filter(|e| *e == "did_change").count(), 1);

    manager.register(Action::RestoreSnapshot { database: database.clone(), snapshot: Rc::new(before) });

    let log = recorder.handle();
    assert_eq!(log.borrow().iter().filter(|e| *e == "did_change").count(), 2);
    let materialized = rra_algebra::materialize(leaf.as_ref()).unwrap();
    assert_eq!(materialized.len(), 0);
}

/// A restore that shrinks a root's content must report the rows that
/// disappeared as `removed`, not just report everything left over as
/// `added` — spec.md §8 invariant 4 (`eval(E after M) = (eval(E before M)
/// ∪ added) \ removed`).
#[test]
fn s4_restore_snapshot_reports_removed_rows_to_a_delta_observer() {
    let people = scheme(&["id", "name"]);
    let underlying: Rc<RefCell<dyn MutableRelation>> = Rc::new(RefCell::new(ConcreteRelation::empty(people.clone())));
    let log = Rc::new(RefCell::new(ChangeLoggingRelation::new(underlying).unwrap()));
    let mut db = rra_incremental::TransactionalDatabase::new();
    db.add_relation("people", log.clone());
    let database = Rc::new(RefCell::new(db));

    let leaf = ChangeLogLeaf::new(log);
    let whole: RelationRef = leaf.clone();

    let registry = ObserverRegistry::new();
    let recorder = Recorder::default();
    let _remover = registry.register_async_delta(&whole, DeltaObserver { log: recorder.handle() });
    let manager = UpdateManager::new(ImmediateContext, registry);

    manager.register(Action::Add {
        database: database.clone(),
        relation: leaf.clone(),
        row: row(&people, vec![Value::Integer(1), Value::Text("cat".into())]),
    });
    let before = database.borrow().take_snapshot();
    manager.register(Action::Add {
        database: database.clone(),
        relation: leaf.clone(),
        row: row(&people, vec![Value::Integer(2), Value::Text("dog".into())]),
    });
    recorder.handle().borrow_mut().clear();

    manager.register(Action::RestoreSnapshot { database: database.clone(), snapshot: Rc::new(before) });

    let log = recorder.handle();
    assert_eq!(log.borrow().iter().filter(|e| *e == "will_change").count(), 1);
    assert_eq!(log.borrow().iter().filter(|e| *e == "did_change").count(), 1);
    assert!(!log.borrow().iter().any(|e| e.starts_with("added:")));
    assert!(log.borrow().iter().any(|e| e == "removed:[Integer(2), Text(\"dog\")]"));

    let materialized = rra_algebra::materialize(leaf.as_ref()).unwrap();
    assert_eq!(materialized.len(), 1);
    assert!(materialized.contains(&row(&people, vec![Value::Integer(1), Value::Text("cat".into())])));
}

// --------------------------------------------------------------- S5 ---

#[test]
fn s5_rename_over_equijoin_combines_rows_added_in_one_batch() {
    let routes_scheme = scheme(&["number", "from", "to"]);
    let based_scheme = scheme(&["pilot", "airport"]);
    let (routes, _routes_log) = change_log_leaf(routes_scheme.clone());
    let (based, _based_log) = change_log_leaf(based_scheme.clone());

    let renamed_based: RelationRef = Rc::new(
        Rename::new(based.clone(), vec![(Attribute::new("airport"), Attribute::new("from"))]).unwrap(),
    );
    let joined: RelationRef = Rc::new(
        Equijoin::new(routes.clone(), renamed_based, vec![(Attribute::new("from"), Attribute::new("from"))]).unwrap(),
    );

    let registry = ObserverRegistry::new();
    let recorder = Recorder::default();
    let _remover = registry.register_async_content(&joined, ContentObserver { log: recorder.handle() });

    let context = ChannelContext::new();
    let pump = context.clone();
    let manager = UpdateManager::new(context, registry);

    // Both registrations land in the channel before anything drains, so
    // they apply as one batch (spec.md §5: one row added to each side in
    // the same batch yields the combined row exactly once).
    manager.register(Action::Add {
        database: Rc::new(RefCell::new(rra_incremental::TransactionalDatabase::new())),
        relation: routes.clone(),
        row: row(&routes_scheme, vec![Value::Integer(117), Value::Text("Atlanta".into()), Value::Text("Boston".into())]),
    });
    manager.register(Action::Add {
        database: Rc::new(RefCell::new(rra_incremental::TransactionalDatabase::new())),
        relation: based.clone(),
        row: row(&based_scheme, vec![Value::Text("Temple".into()), Value::Text("Atlanta".into())]),
    });
    pump.pump();

    let log = recorder.handle();
    assert_eq!(log.borrow().iter().filter(|e| *e == "will_change").count(), 1);
    assert_eq!(log.borrow().iter().filter(|e| *e == "did_change").count(), 1);

    let materialized = rra_algebra::materialize(joined.as_ref()).unwrap();
    assert_eq!(materialized.len(), 1);
}

// --------------------------------------------------------------- S6 ---

struct ReentrantObserver {
    log: Rc<RefCell<Vec<String>>>,
    manager: Rc<UpdateManager<ImmediateContext>>,
    relation: Rc<ChangeLogLeaf>,
    database: Rc<RefCell<rra_incremental::TransactionalDatabase>>,
    scheme: Arc<Scheme>,
    fired: RefCell<bool>,
}

impl AsyncContentObserver for ReentrantObserver {
    fn will_change(&mut self) {
        self.log.borrow_mut().push("will_change".into());
    }

    fn new_contents(&mut self, rows: &[Row]) {
        self.log.borrow_mut().push(format!("new_contents:{}", rows.len()));
    }

    fn error(&mut self, err: &Error) {
        self.log.borrow_mut().push(format!("error:{err}"));
    }

    fn did_change(&mut self) {
        self.log.borrow_mut().push("did_change".into());
        if !*self.fired.borrow() {
            *self.fired.borrow_mut() = true;
            self.manager.register(Action::Add {
                database: self.database.clone(),
                relation: self.relation.clone(),
                row: row(&self.scheme, vec![Value::Integer(2), Value::Text("second".into())]),
            });
        }
    }
}

#[test]
fn s6_reentrant_registration_from_did_change_drains_in_the_same_call() {
    let people = scheme(&["id", "name"]);
    let (leaf, _log) = change_log_leaf(people.clone());
    let whole: RelationRef = leaf.clone();

    let registry = ObserverRegistry::new();
    let recorder_log = Rc::new(RefCell::new(Vec::new()));
    let manager = UpdateManager::new(ImmediateContext, registry.clone());
    let database = Rc::new(RefCell::new(rra_incremental::TransactionalDatabase::new()));

    let _remover = registry.register_async_content(
        &whole,
        ReentrantObserver {
            log: recorder_log.clone(),
            manager: manager.clone(),
            relation: leaf.clone(),
            database: database.clone(),
            scheme: people.clone(),
            fired: RefCell::new(false),
        },
    );

    manager.register(Action::Add {
        database: database.clone(),
        relation: leaf.clone(),
        row: row(&people, vec![Value::Integer(1), Value::Text("first".into())]),
    });

    let log = recorder_log.borrow();
    let will_changes = log.iter().filter(|e| *e == "will_change").count();
    let did_changes = log.iter().filter(|e| *e == "did_change").count();
    assert_eq!(will_changes, did_changes);
    assert_eq!(will_changes, 2);

    let materialized = rra_algebra::materialize(leaf.as_ref()).unwrap();
    assert_eq!(materialized.len(), 2);
}
