//! Polling scheduler and self-update for autobuild.

mod error;
mod runtime;
pub mod self_update;

pub use error::{DaemonError, SelfUpdateError};
pub use runtime::{
    init_tracing, once_blocking, run, run_once, run_until, start_blocking, tick_blocking,
    RepoSummary, TickSummary,
};
pub use self_update::{HandOff, SelfUpdateOutcome, SelfUpdatePlan};
