//! `ad-agent`: the phase-driven decision loop of one ego vehicle.
//!
//! # Tick
//!
//! ```text
//! run_step:
//!   UPDATE_INFORMATION   refresh live info (skipped on a second pass)
//!   DONE                 only when the route is exhausted → StepOutcome::Done
//!   PLAN_PATH
//!   DETECT_TRAFFIC_LIGHTS, DETECT_PEDESTRIANS   → hazards
//!   HAZARD               unresolved hazards → EMERGENCY
//!   DETECT_CARS          → CAR_DETECTED | TURNING_AT_JUNCTION | TAKE_NORMAL_STEP
//!   RSS_EVALUATION, EXECUTION
//!   apply control (once)
//! ```
//!
//! Rules redirect the tick with [`Signal`](ad_rules::Signal)s, all handled
//! in [`Agent::run_step`]:
//!
//! | Signal           | Recovery                                         |
//! |------------------|--------------------------------------------------|
//! | `EmergencyStop`  | Rest of the tick runs the emergency braking path |
//! | `SkipInnerLoop`  | Apply the carried control                        |
//! | `ContinueLoop`   | Apply the current control                        |
//! | `PathUpdated`    | Restart as a second pass, bounded                |
//! | `UserInterrupt`  | `AgentError::Interrupted`                        |
//!
//! # Crate layout
//!
//! | Module        | Contents                                              |
//! |---------------|-------------------------------------------------------|
//! | [`agent`]     | `Agent`, `StepOutcome`                                |
//! | [`builder`]   | `AgentBuilder`                                        |
//! | [`settings`]  | `AgentSettings` and its sections, TOML layering       |
//! | [`planner`]   | `LocalPlanner` waypoint queue                         |
//! | [`detect`]    | Traffic-light, pedestrian and leading-vehicle checks  |
//! | [`emergency`] | Emergency braking policy                              |
//! | [`observer`]  | `AgentObserver`, `NoopObserver`                       |
//! | [`error`]     | `AgentError`, `AgentResult<T>`                        |

pub mod agent;
pub mod builder;
pub mod detect;
pub mod emergency;
pub mod error;
pub mod observer;
pub mod planner;
pub mod settings;

#[cfg(test)]
mod tests;

pub use agent::{Agent, StepOutcome};
pub use builder::AgentBuilder;
pub use emergency::emergency_control;
pub use error::{AgentError, AgentResult};
pub use observer::{AgentObserver, NoopObserver};
pub use planner::LocalPlanner;
pub use settings::{
    AgentSettings, DistanceSettings, EmergencySettings, PlannerSettings, RuleSettings, SpeedSettings,
};
