//! A scripted in-process world.
//!
//! Non-ego actors move at constant velocity.  Actors that received a
//! control this tick follow a point-mass longitudinal model along their
//! heading; steering is ignored.  This is a stand-in for the simulator in
//! tests and demos, not a physics model.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use ad_core::{ActorId, Tick, VehicleControl};

use crate::{ActorSnapshot, LaneNetwork, World, WorldView};

const MAX_ACCEL_MS2: f32 = 3.5;
const MAX_DECEL_MS2: f32 = 8.0;

#[derive(Default)]
struct ScriptedState {
    tick: Tick,
    actors: Vec<ActorSnapshot>,
    pending: HashMap<ActorId, VehicleControl>,
    applied: Vec<(Tick, ActorId, VehicleControl)>,
}

pub struct ScriptedWorld {
    map: Arc<LaneNetwork>,
    delta_secs: f32,
    state: Mutex<ScriptedState>,
}

impl ScriptedWorld {
    pub fn new(map: LaneNetwork, delta_secs: f32) -> Self {
        Self { map: Arc::new(map), delta_secs, state: Mutex::new(ScriptedState::default()) }
    }

    fn state(&self) -> MutexGuard<'_, ScriptedState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add or replace an actor.
    pub fn spawn(&self, actor: ActorSnapshot) {
        let mut st = self.state();
        st.actors.retain(|a| a.id != actor.id);
        st.actors.push(actor);
    }

    pub fn despawn(&self, id: ActorId) {
        self.state().actors.retain(|a| a.id != id);
    }

    /// Every control applied so far, in order.
    pub fn applied_controls(&self) -> Vec<(Tick, ActorId, VehicleControl)> {
        self.state().applied.clone()
    }
}

impl WorldView for ScriptedWorld {
    type Map = LaneNetwork;

    fn map(&self) -> Arc<LaneNetwork> {
        Arc::clone(&self.map)
    }

    fn actors(&self) -> Vec<ActorSnapshot> {
        self.state().actors.clone()
    }
}

impl World for ScriptedWorld {
    fn apply_control(&self, actor: ActorId, control: VehicleControl) {
        let mut st = self.state();
        let tick = st.tick;
        st.pending.insert(actor, control);
        st.applied.push((tick, actor, control));
    }

    fn tick(&self) -> Tick {
        let dt = self.delta_secs;
        let mut st = self.state();
        let pending = std::mem::take(&mut st.pending);
        for actor in &mut st.actors {
            if let Some(control) = pending.get(&actor.id) {
                let forward = actor.transform.forward_vector();
                let speed = actor.velocity.length();
                let accel = control.throttle * MAX_ACCEL_MS2
                    - control.brake.max(if control.hand_brake { 1.0 } else { 0.0 }) * MAX_DECEL_MS2;
                let speed = (speed + accel * dt).max(0.0);
                actor.velocity = forward * speed;
            }
            actor.transform.location = actor.transform.location + actor.velocity * dt;
        }
        st.tick = st.tick.next();
        st.tick
    }

    fn current_tick(&self) -> Tick {
        self.state().tick
    }
}
