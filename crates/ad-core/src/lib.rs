//! `ad-core`: foundational types for the autodrive decision core.
//!
//! Every other `ad-*` crate depends on this one.  It has no `ad-*`
//! dependencies and only `rand` and `thiserror` externally (plus optional
//! `serde`).
//!
//! # What lives here
//!
//! | Module      | Contents                                                  |
//! |-------------|-----------------------------------------------------------|
//! | [`ids`]     | `ActorId`, `RoadId`, `LaneId`, `RoadLaneId`               |
//! | [`geom`]    | `Vec3`/`Location`, `Rotation`, `Transform`                |
//! | [`time`]    | `Tick`                                                    |
//! | [`rng`]     | `AgentRng`, cumulative-weight sampling                    |
//! | [`control`] | `VehicleControl`, `RoadOption`                            |
//! | [`phase`]   | `Phase` bit-flags and `next_phase`                        |
//! | [`hazard`]  | `Hazard`, `Severity`, `HazardSet`, `MatchMode`            |
//! | [`error`]   | `CoreError`, `CoreResult`                                 |
//!
//! # Feature flags
//!
//! | Flag    | Effect                                                     |
//! |---------|------------------------------------------------------------|
//! | `serde` | Adds `Serialize`/`Deserialize` to the public value types.  |

pub mod control;
pub mod error;
pub mod geom;
pub mod hazard;
pub mod ids;
pub mod phase;
pub mod rng;
pub mod time;

#[cfg(test)]
mod tests;

// ── Re-exports ────────────────────────────────────────────────────────────────

pub use control::{RoadOption, VehicleControl};
pub use error::{CoreError, CoreResult};
pub use geom::{Location, Rotation, Transform, Vec3};
pub use hazard::{Hazard, HazardSet, MatchMode, Severity};
pub use ids::{ActorId, LaneId, RoadId, RoadLaneId};
pub use phase::Phase;
pub use rng::{cumulative, AgentRng};
pub use time::Tick;
