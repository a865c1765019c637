use thiserror::Error;

/// Errors from lock backends and managed lock lifecycles.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LockError {
    #[error("connection error: {0}")]
    Connection(String),

    #[error("backend error: {0}")]
    Backend(String),

    /// A renewal was refused: the key expired or another owner holds it now.
    #[error("lost lock: {0}")]
    LockLost(String),

    #[error("refresh task aborted: {0}")]
    TaskAborted(String),
}

impl LockError {
    /// Whether this is the lost-lock sentinel rather than a transport failure.
    pub fn is_lost(&self) -> bool {
        matches!(self, Self::LockLost(_))
    }
}
