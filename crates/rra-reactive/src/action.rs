//! The registered-action vocabulary of spec.md §4.5: `update`, `add`,
//! `delete`, `restoreSnapshot`, `query`.

use crate::leaf::ChangeLogLeaf;
use rra_algebra::RelationRef;
use rra_core::{Attribute, Expr, Result, Row, Value};
use rra_incremental::{DatabaseSnapshot, TransactionalDatabase};
use std::cell::RefCell;
use std::rc::Rc;

/// One action registered on an `UpdateManager`, drained in registration
/// order within a single batch (spec.md §5 "actions registered with the
/// same manager drain in registration order").
pub enum Action {
    Add {
        database: Rc<RefCell<TransactionalDatabase>>,
        relation: Rc<ChangeLogLeaf>,
        row: Row,
    },
    Update {
        database: Rc<RefCell<TransactionalDatabase>>,
        relation: Rc<ChangeLogLeaf>,
        predicate: Expr,
        new_values: Vec<(Attribute, Value)>,
    },
    Delete {
        database: Rc<RefCell<TransactionalDatabase>>,
        relation: Rc<ChangeLogLeaf>,
        predicate: Expr,
    },
    RestoreSnapshot {
        database: Rc<RefCell<TransactionalDatabase>>,
        snapshot: Rc<DatabaseSnapshot>,
    },
    /// A direct query, submitted alongside derived deltas into the same
    /// combined execution (spec.md §4.5 step 6).
    Query {
        relation: RelationRef,
        callback: Box<dyn FnOnce(Result<Vec<Row>>)>,
    },
}

impl Action {
    /// The `TransactionalDatabase` this action's effects apply inside,
    /// if any — `Query` touches no database, it only reads.
    pub(crate) fn database(&self) -> Option<&Rc<RefCell<TransactionalDatabase>>> {
        match self {
            Action::Add { database, .. }
            | Action::Update { database, .. }
            | Action::Delete { database, .. }
            | Action::RestoreSnapshot { database, .. } => Some(database),
            Action::Query { .. } => None,
        }
    }
}
