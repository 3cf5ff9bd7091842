//! Control-flow signals raised by rule actions.
//!
//! A signal is not a failure; it redirects the rest of the tick.  Actions
//! return them on the `Err` side of [`Flow`] so `?` carries them outwards to
//! the single place that handles each one.

use thiserror::Error;

use ad_core::{HazardSet, VehicleControl};

use crate::value::RuleValue;

#[derive(Clone, Debug, PartialEq, Error)]
pub enum Signal {
    /// Unresolved hazards; the tick switches to emergency braking.
    #[error("emergency stop ({hazards})")]
    EmergencyStop { hazards: HazardSet },

    /// Use `control` as this tick's output and skip the remaining phases.
    #[error("skip inner loop")]
    SkipInnerLoop { control: VehicleControl },

    /// Keep the current control and end the tick early.
    #[error("continue loop")]
    ContinueLoop,

    /// The destination or path changed; restart the tick as a second pass.
    #[error("path updated")]
    PathUpdated,

    /// End the session.
    #[error("user interrupt")]
    UserInterrupt,

    /// Skip the remaining rules of the current phase; the value becomes the
    /// phase result.
    #[error("no further rules")]
    NoFurtherRules(RuleValue),

    /// Stop evaluating the children of the enclosing multi-rule.
    #[error("skip remaining children")]
    SkipChildren,

    /// Leave the enclosing blocking rule's loop with this result.
    #[error("unblock")]
    Unblock(RuleValue),

    /// A rule hit a condition it cannot handle.
    #[error("rule fault: {0}")]
    Fault(String),
}

impl Signal {
    pub fn fault(msg: impl Into<String>) -> Self {
        Signal::Fault(msg.into())
    }

    pub fn emergency(hazards: &HazardSet) -> Self {
        Signal::EmergencyStop { hazards: hazards.clone() }
    }
}

pub type Flow<T> = Result<T, Signal>;
