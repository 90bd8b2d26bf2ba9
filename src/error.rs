use std::path::PathBuf;
use thiserror::Error;

/// Result alias used by the dispatch engine.
pub type Result<T> = std::result::Result<T, DispatchError>;

/// Everything that can abort a dispatch.
///
/// Resolution errors (`Lookup`, `MissingExecutor`, `Usage`, `NoActions`) are
/// raised before any executor runs. `Action` wraps a failure coming out of an
/// executor; the sequence stops there.
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("action '{identifier}' doesn't exist")]
    Lookup { identifier: String },

    #[error("action '{action}' has no executor")]
    MissingExecutor { action: String },

    #[error("{message}")]
    Usage { message: String },

    #[error("no action given and no default actions configured")]
    NoActions,

    /// Only produced by [`crate::Registry::try_register`].
    #[error("identifier '{identifier}' is already taken by action '{existing}'")]
    DuplicateIdentifier { identifier: String, existing: String },

    #[error("action '{action}' failed: {source:#}")]
    Action {
        action: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl DispatchError {
    pub(crate) fn usage(message: impl Into<String>) -> Self {
        DispatchError::Usage {
            message: message.into(),
        }
    }

    /// Process exit status for this error: 2 for command-line misuse, 1 otherwise.
    pub fn exit_code(&self) -> i32 {
        match self {
            DispatchError::Usage { .. } | DispatchError::NoActions => 2,
            _ => 1,
        }
    }
}

/// Errors from reading an environment-mapping file.
#[derive(Error, Debug)]
pub enum EnvFileError {
    #[error("can't read env file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{}:{line}: expected exactly one '=' in {content:?}", path.display())]
    Malformed {
        path: PathBuf,
        line: usize,
        content: String,
    },
}
