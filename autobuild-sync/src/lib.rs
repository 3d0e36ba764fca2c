//! # autobuild-sync
//!
//! Keep local clones in step with their remotes and turn new commits into
//! published artifacts.
//!
//! Call [`process`] to run one sync/check/build cycle for a repository, or
//! [`process_all`] for a whole configuration.

pub mod artifact;
pub mod build;
pub mod error;
pub mod git;
pub mod pipeline;
pub mod runner;
pub mod tracker;

pub use build::{build_and_publish, PublishReport, PublishedArtifact, RestartOutcome};
pub use error::{BuildError, ProcessError, RunError, SyncError};
pub use git::{ensure_synced, SyncOutcome};
pub use pipeline::{process, process_all, ProcessMode, RepoOutcome};
pub use tracker::{has_diverged, read_marker, record_built, CommitMarker, Divergence};
