//! World collaborator traits.
//!
//! The decision core only reads from the world, with two exceptions owned by
//! the caller's loop: applying the final control and advancing the tick.
//! Both traits take `&self` because simulator clients are shared handles;
//! implementations use interior mutability where they hold state.

use std::sync::Arc;

use ad_core::{ActorId, Tick, VehicleControl};

use crate::{ActorKind, ActorSnapshot, MapView};

/// Read-only view of actors and the map.
///
/// `Send + Sync` because the asynchronous detection-matrix worker reads it
/// from its own thread.
pub trait WorldView: Send + Sync + 'static {
    type Map: MapView;

    fn map(&self) -> Arc<Self::Map>;

    fn actors(&self) -> Vec<ActorSnapshot>;

    fn actor(&self, id: ActorId) -> Option<ActorSnapshot> {
        self.actors().into_iter().find(|a| a.id == id)
    }

    fn actors_of_kind(&self, kind: ActorKind) -> Vec<ActorSnapshot> {
        self.actors().into_iter().filter(|a| a.kind == kind).collect()
    }
}

/// A world the agent can drive in.
pub trait World: WorldView {
    /// Queue `control` for `actor`; takes effect on the next tick.
    fn apply_control(&self, actor: ActorId, control: VehicleControl);

    /// Advance the simulation by one step and return the new tick.
    fn tick(&self) -> Tick;

    fn current_tick(&self) -> Tick;
}
