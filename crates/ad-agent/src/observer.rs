//! Hooks the step loop calls while a tick runs.

use ad_core::{Phase, Tick, VehicleControl};
use ad_rules::{Context, Signal};

/// Hooks called by [`Agent::run_step`](crate::Agent::run_step).
///
/// Every method has a default no-op implementation; override only what you
/// need.
pub trait AgentObserver {
    /// Called before the first phase of a tick.
    fn on_tick_start(&mut self, _tick: Tick) {}

    /// Called after the rules of `phase` ran, with the context they left.
    fn on_phase(&mut self, _phase: Phase, _ctx: &Context) {}

    /// Called when a signal reaches the agent's handler.
    fn on_signal(&mut self, _tick: Tick, _signal: &Signal) {}

    /// Called each time a control is handed to the world, including inside
    /// a blocking rule's loop.
    fn on_control_applied(&mut self, _tick: Tick, _control: &VehicleControl) {}

    /// Called once when the agent has nowhere left to go.
    fn on_session_end(&mut self, _tick: Tick) {}
}

/// An observer that does nothing.
pub struct NoopObserver;

impl AgentObserver for NoopObserver {}
