//! Detection-matrix error type.

use std::time::Duration;

use thiserror::Error;

use ad_core::ActorId;

#[derive(Debug, Error)]
pub enum MatrixError {
    #[error("ego actor {0} not present in the world")]
    EgoNotFound(ActorId),

    #[error("actor {0} is not on any lane")]
    OffRoad(ActorId),

    /// Recoverable failure of a single computation.
    #[error("transient matrix failure: {0}")]
    Transient(String),

    /// Runtime-level failure; terminates a background worker.
    #[error("fatal matrix failure: {0}")]
    Fatal(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("matrix worker did not stop within {0:?}")]
    StopTimeout(Duration),

    #[error("matrix worker panicked")]
    WorkerPanicked,

    /// The background worker ended on a fatal error.
    #[error("matrix worker failed: {0}")]
    WorkerFailed(#[source] Box<MatrixError>),
}

impl MatrixError {
    /// `true` for errors a background worker must not retry.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            MatrixError::Fatal(_) | MatrixError::Io(_) | MatrixError::WorkerPanicked | MatrixError::WorkerFailed(_)
        )
    }
}

pub type MatrixResult<T> = Result<T, MatrixError>;
