use thiserror::Error;

use crate::session::lane::LaneId;

#[derive(Error, Debug)]
pub enum TxError {
    /// A write was attempted while the innermost active scope is read-only.
    #[error("read-only scope: {operation} not permitted")]
    ReadOnlyViolation { operation: String },

    /// The effective deadline of a scope elapsed before its body completed.
    #[error("scope timed out after {elapsed:?} (limit {limit:?})")]
    TimeoutExceeded {
        elapsed: std::time::Duration,
        limit: std::time::Duration,
    },

    /// A session was touched from an execution lane other than the one the
    /// factory bound it to. Reachable only by retaining a session handle
    /// beyond the call that obtained it.
    #[error("session is bound to {expected} and was used from a different execution lane")]
    SessionLaneViolation {
        expected: LaneId,
        found: Option<LaneId>,
    },

    /// The session already finished (committed, rolled back, or released).
    #[error("session is no longer active: {0}")]
    SessionClosed(String),

    /// Commit was refused because a nested scope's deadline expired while the
    /// session was mid-statement; the owning scope can only roll back.
    #[error("transaction is rollback-only: a nested scope timed out")]
    RollbackOnly,

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("storage error: {0}")]
    Storage(String),

    /// Business errors raised inside a scope body, propagated unchanged after
    /// the owning scope rolls back.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, TxError>;
