//! `ad-world`: the world the decision core reads from.
//!
//! # Crate layout
//!
//! | Module         | Contents                                                  |
//! |----------------|-----------------------------------------------------------|
//! | [`map`]        | `Waypoint`, `MapView` topology trait                      |
//! | [`actors`]     | `ActorSnapshot`, `ActorKind`, traffic-light info          |
//! | [`world`]      | `WorldView` (read-only), `World` (apply control, tick)    |
//! | [`network`]    | `LaneNetwork` (straight roads + R-tree), builder          |
//! | [`router`]     | `Router` trait, `LaneFollowRouter`                        |
//! | [`controller`] | `Controller` trait, `ProportionalController`              |
//! | [`scripted`]   | `ScriptedWorld` in-process world for tests and demos      |
//! | [`error`]      | `WorldError`, `WorldResult<T>`                            |

pub mod actors;
pub mod controller;
pub mod error;
pub mod map;
pub mod network;
pub mod router;
pub mod scripted;
pub mod world;


pub use actors::{ActorKind, ActorSnapshot, LightState, TrafficLightInfo};
pub use controller::{Controller, FixedController, ProportionalController, VehicleState};
pub use error::{WorldError, WorldResult};
pub use map::{MapView, Waypoint};
pub use network::{LaneNetwork, LaneNetworkBuilder, Road};
pub use router::{LaneFollowRouter, Route, Router};
pub use scripted::ScriptedWorld;
pub use world::{World, WorldView};
