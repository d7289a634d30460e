//! The periodic refresh loop and the published state it maintains.

mod scheduler;
mod state;

pub use scheduler::{OpmlSource, RefreshError, RunningScheduler, Scheduler};
pub use state::{RefreshPhase, RunState, StateReader, StateStore};
