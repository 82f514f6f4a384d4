//! Schedulers: outer loops that drive tasks through their lifecycle by
//! dispatching per-state handlers (which in turn run agents).

mod base;
mod simple;
mod tree;

pub use base::{Scheduler, StateHandler};
pub use simple::build_simple_scheduler;
pub use tree::build_tree_scheduler;
