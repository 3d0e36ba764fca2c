//! autobuild core library — configuration types, loading, validation, errors.
//!
//! - [`types`] — newtypes and configuration structs
//! - [`error`] — [`ConfigError`]
//! - [`config`] — load / normalise / validate

pub mod config;
pub mod error;
pub mod types;

pub use error::ConfigError;
pub use types::{
    Auth, CommandSpec, Config, LogFormat, RepoName, RepositoryConfig, SelfUpdateConfig,
};
