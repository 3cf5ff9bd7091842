//! Agent error type.

use thiserror::Error;

use ad_core::{ActorId, CoreError, Phase};
use ad_matrix::MatrixError;
use ad_rules::{RuleError, Signal};
use ad_world::WorldError;

/// Errors that end an agent session.
///
/// Control-flow [`Signal`]s are not errors; only a signal that escapes its
/// handler ends up here as [`AgentError::UnexpectedSignal`].
#[derive(Debug, Error)]
pub enum AgentError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Rule(#[from] RuleError),

    #[error(transparent)]
    World(#[from] WorldError),

    #[error(transparent)]
    Matrix(#[from] MatrixError),

    #[error("invalid settings: {0}")]
    Settings(String),

    #[error("settings parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("ego actor {0} not present in the world")]
    EgoNotFound(ActorId),

    #[error("ego actor {0} is not on any lane")]
    OffRoad(ActorId),

    #[error("tick restarted {0} times, assuming an endless re-plan loop")]
    ReplanLimit(u32),

    #[error("session interrupted")]
    Interrupted,

    #[error("rule fault during {phase}: {message}")]
    RuleFault { phase: Phase, message: String },

    #[error("signal `{signal}` escaped phase {phase}")]
    UnexpectedSignal { phase: Phase, signal: Signal },
}

pub type AgentResult<T> = Result<T, AgentError>;
