//! rra-incremental — the change-logging relation (C6), the transactional
//! database (C7), and the incremental differentiator (C8) of spec.md §4.2,
//! §4.3, §4.4.
//!
//! Grounded on the teacher's journal/transaction split
//! (`crates/storage/src/{journal,transaction}.rs`) and its dataflow
//! dependency indexing (`crates/incremental/src/dataflow/graph.rs`),
//! generalized from `TableId`-keyed rows to the arbitrary-identity leaf
//! relations this engine's algebra actually has.

mod change;
mod change_log;
mod database;
mod delta;
mod differentiate;

pub use change::Change;
pub use change_log::{replay, ChangeLoggingRelation, LogSnapshot, MutableRelation};
pub use database::{DatabaseSnapshot, TransactionGuard, TransactionalDatabase};
pub use delta::RelationChange;
pub use differentiate::{Derivative, Inconsistency};
