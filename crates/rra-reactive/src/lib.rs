//! rra-reactive — the asynchronous update manager (C10) and observer
//! registry (C11) that sit atop `rra-incremental`'s differentiator,
//! turning mutation batches into willChange/payload/didChange
//! notification sequences (spec.md §4.5, §4.6).
//!
//! Unlike the rest of the workspace this crate is ordinary `std`: the
//! update manager coordinates shared, mutably-observed state (`Rc`,
//! `RefCell`) and dispatches through `crossbeam-channel`, neither of
//! which the `no_std` crates below it need.

mod action;
mod leaf;
mod manager;
mod registry;

pub use action::Action;
pub use leaf::{leaf_ref, ChangeLogLeaf};
pub use manager::{ChannelContext, ExecutionContext, ImmediateContext, ManagerState, UpdateManager};
pub use registry::{AsyncContentObserver, AsyncDeltaObserver, ObserverId, ObserverRegistry, Remover};
