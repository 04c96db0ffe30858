//! Error types surfaced by the runtime context.

use std::path::PathBuf;

use thiserror::Error;

use crate::NetworkHandle;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    ModelLoad,
    Optimization,
    UnknownHandle,
    Execution,
    InvalidConfig,
    InvalidInput,
}

/// Every failure an operation can report. None of them are retried.
#[derive(Debug, Error)]
pub enum AnnError {
    /// The model file could not be read or parsed, or a binding name is unknown.
    #[error("failed to load model {path:?}: {source:#}")]
    ModelLoad {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    /// The graph could not be compiled for, or brought up on, the target backend.
    #[error("failed to optimize network: {0:#}")]
    Optimization(#[source] anyhow::Error),

    /// The handle was never issued, or its network has been unloaded.
    #[error("unknown network handle {0}")]
    UnknownHandle(NetworkHandle),

    /// The backend failed while running or releasing a network.
    #[error("execution failed on network {handle}: {source:#}")]
    Execution {
        handle: NetworkHandle,
        #[source]
        source: anyhow::Error,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The backend rejected its creation options.
    #[error("failed to create backend: {0:#}")]
    BackendCreate(#[source] anyhow::Error),

    #[error("invalid input for network {handle}: {reason}")]
    InvalidInput {
        handle: NetworkHandle,
        reason: String,
    },
}

impl AnnError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AnnError::ModelLoad { .. } => ErrorKind::ModelLoad,
            AnnError::Optimization(_) => ErrorKind::Optimization,
            AnnError::UnknownHandle(_) => ErrorKind::UnknownHandle,
            AnnError::Execution { .. } => ErrorKind::Execution,
            AnnError::InvalidConfig(_) | AnnError::BackendCreate(_) => ErrorKind::InvalidConfig,
            AnnError::InvalidInput { .. } => ErrorKind::InvalidInput,
        }
    }

    pub fn model_load(path: impl Into<PathBuf>, source: anyhow::Error) -> Self {
        AnnError::ModelLoad {
            path: path.into(),
            source,
        }
    }
}

/// Specialized Result type for runtime operations.
pub type Result<T> = std::result::Result<T, AnnError>;
