//! Error types for the epochctl daemon
use thiserror::Error;

pub type Result<T, E = DaemonError> = core::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum DaemonError {
    #[error(transparent)]
    Core(#[from] epochctl_core::Error),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("internal: {0}")]
    Internal(String),
    #[error("queue full: {pending} requests pending, limit {limit}")]
    QueueFull { pending: usize, limit: usize },
    #[error("no batch in progress")]
    NoBatch,
    #[error("batch is empty")]
    EmptyBatch,
}

impl DaemonError {
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}
