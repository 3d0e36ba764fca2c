//! Error types for autobuild-core.

use std::path::PathBuf;

use thiserror::Error;

/// All errors that can arise while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Underlying I/O failure (file not found, permission denied, etc.).
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// YAML error for documents that did not come from a file.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// YAML parse error on load — includes file path and line context from serde_yaml.
    #[error("failed to parse config at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// The document parsed but describes something the daemon cannot run.
    #[error("invalid configuration ({context}): {reason}")]
    Invalid { context: String, reason: String },

    /// `dirs::home_dir()` returned `None` while expanding a `~` path.
    #[error("cannot determine home directory; set $HOME or equivalent")]
    HomeNotFound,
}

impl ConfigError {
    pub(crate) fn invalid(context: impl Into<String>, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            context: context.into(),
            reason: reason.into(),
        }
    }
}
