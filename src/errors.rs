//! Error taxonomy for thread lifecycle operations.
//!
//! Failures raised from inside a running unit of work are deliberately not
//! represented here: they are absorbed at the thread boundary and logged,
//! so that a failing logging thread can never crash the host process.

use thiserror::Error;

/// Result type for thread lifecycle operations.
pub type ThreadResult<T> = Result<T, ThreadError>;

/// Umbrella error for all thread lifecycle operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ThreadError {
    /// Thread creation errors.
    #[error(transparent)]
    Spawn(#[from] SpawnError),
    /// Thread joining errors.
    #[error(transparent)]
    Join(#[from] JoinError),
}

/// Errors surfaced by [`Thread::start`](crate::Thread::start).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SpawnError {
    /// The OS declined to create a new thread, typically due to resource
    /// exhaustion. The entity's state has been fully rolled back.
    #[error("thread creation was not successful (os error {code})")]
    CreationFailed {
        /// Raw error code returned by the native creation call.
        code: i32,
    },
}

/// Errors surfaced by [`Thread::join`](crate::Thread::join).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JoinError {
    /// The thread was never successfully started, so there is nothing to
    /// wait for.
    #[error("thread was never started")]
    NotStarted,
}
