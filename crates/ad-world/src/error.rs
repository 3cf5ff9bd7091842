//! World-subsystem error type.

use thiserror::Error;

use ad_core::{ActorId, Location, RoadId, RoadLaneId};

/// Errors produced by `ad-world`.
#[derive(Debug, Error)]
pub enum WorldError {
    #[error("road {0} not found")]
    RoadNotFound(RoadId),

    #[error("lane {0} not found")]
    LaneNotFound(RoadLaneId),

    #[error("invalid road {road}: {reason}")]
    InvalidRoad { road: RoadId, reason: &'static str },

    #[error("actor {0} not found")]
    ActorNotFound(ActorId),

    #[error("no route from {from} to {to}")]
    NoRoute { from: Location, to: Location },
}

pub type WorldResult<T> = Result<T, WorldError>;
