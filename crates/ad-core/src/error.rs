//! Core error type.
//!
//! Downstream crates define their own enums and wrap `CoreError` with a
//! `#[from]` variant.

use thiserror::Error;

use crate::Phase;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("no valid transition from phase {0}")]
    NoTransition(Phase),

    #[error("phase {requested} requested after {current}, expected {expected}")]
    PhaseViolation {
        current:   Phase,
        requested: Phase,
        expected:  Phase,
    },

    #[error("unknown phase {0:?}")]
    UnknownPhase(String),

    #[error("unknown hazard {0:?}")]
    UnknownHazard(String),

    #[error("configuration error: {0}")]
    Config(String),
}

pub type CoreResult<T> = Result<T, CoreError>;
