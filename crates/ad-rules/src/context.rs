//! Per-tick mutable state threaded through rule evaluation.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use ad_core::{Hazard, HazardSet, Location, MatchMode, Phase, RoadOption, Severity, Tick, VehicleControl};
use ad_matrix::MatrixReport;
use ad_world::{ActorSnapshot, Controller, VehicleState, Waypoint};

use crate::rule::RuleId;
use crate::value::{RuleValue, Verdict};

/// Information refreshed during `UPDATE_INFORMATION`.
#[derive(Clone, Debug, Default)]
pub struct LiveInfo {
    pub ego: Option<ActorSnapshot>,
    pub speed_kmh: f32,
    pub speed_limit_kmh: f32,
    /// Number of queued waypoints to look ahead when judging the next manoeuvre.
    pub look_ahead_steps: usize,
    pub current_waypoint: Option<Waypoint>,
    pub incoming_waypoint: Option<Waypoint>,
    pub incoming_direction: RoadOption,
    pub vehicles_nearby: Vec<ActorSnapshot>,
    pub walkers_nearby: Vec<ActorSnapshot>,
    pub traffic_lights: Vec<ActorSnapshot>,
    pub matrix: Option<MatrixReport>,
    /// Waypoints left in the local plan.
    pub route_remaining: usize,
}

impl LiveInfo {
    pub fn is_taking_turn(&self) -> bool {
        self.incoming_direction.is_turn()
    }
}

/// Inputs of the low-level controller for the default control.
#[derive(Copy, Clone, Debug, Default)]
pub struct ControlInputs {
    pub state: VehicleState,
    pub target: Option<Waypoint>,
    pub target_speed_kmh: f32,
}

/// State for one outer tick.
///
/// Created at the start of a tick and replaced at the start of the next;
/// the previous context stays reachable through [`last_context`] for one
/// tick only.
///
/// [`last_context`]: Context::last_context
pub struct Context {
    pub tick: Tick,
    pub phase: Phase,
    /// Control being built this tick; `None` until something sets or computes it.
    pub control: Option<VehicleControl>,
    pub hazards: HazardSet,
    /// Result handed to the current phase by the previous one.
    pub prior_result: Option<RuleValue>,
    pub evaluation_results: HashMap<Phase, Verdict>,
    pub action_results: HashMap<Phase, RuleValue>,
    /// Names of rules whose action ran this tick, in order.
    pub fired: Vec<String>,
    /// Set when the tick restarted after a path change.
    pub second_pass: bool,
    pub live: LiveInfo,
    pub inputs: ControlInputs,
    /// Destination requested by a rule; picked up by the planner.
    pub route_request: Option<Location>,
    /// Blocking rules currently running their sub-loop.
    pub active_blocking: Vec<RuleId>,
    last_context: Option<Box<Context>>,
    controller: Arc<dyn Controller>,
    control_computations: u32,
}

impl Context {
    pub fn new(tick: Tick, controller: Arc<dyn Controller>) -> Self {
        Self {
            tick,
            phase: Phase::NONE,
            control: None,
            hazards: HazardSet::new(),
            prior_result: None,
            evaluation_results: HashMap::new(),
            action_results: HashMap::new(),
            fired: Vec::new(),
            second_pass: false,
            live: LiveInfo::default(),
            inputs: ControlInputs::default(),
            route_request: None,
            active_blocking: Vec::new(),
            last_context: None,
            controller,
            control_computations: 0,
        }
    }

    /// Context for the tick after `prev`.  `prev` keeps no link of its own,
    /// so at most one previous context is ever retained.
    pub fn next(mut prev: Context, tick: Tick) -> Self {
        prev.last_context = None;
        let mut ctx = Context::new(tick, Arc::clone(&prev.controller));
        ctx.live = prev.live.clone();
        ctx.inputs = prev.inputs;
        ctx.last_context = Some(Box::new(prev));
        ctx
    }

    pub fn last_context(&self) -> Option<&Context> {
        self.last_context.as_deref()
    }

    /// Drop the link to the previous tick.
    pub fn sever(&mut self) {
        self.last_context = None;
    }

    /// Move to a new simulation tick inside the same outer tick, as a
    /// blocking rule's sub-loop does.  The control is recomputed on demand.
    pub fn enter_tick(&mut self, tick: Tick) {
        self.tick = tick;
        self.control = None;
        self.control_computations = 0;
        self.prior_result = None;
    }

    /// Drop per-pass state before the same tick is planned again.  The
    /// control is recomputed against the new target on demand.
    pub fn restart_pass(&mut self) {
        self.control = None;
        self.control_computations = 0;
        self.prior_result = None;
    }

    // ── Phases ────────────────────────────────────────────────────────────

    pub fn begin_phase(&mut self, phase: Phase, prior: Option<RuleValue>) {
        self.phase = phase;
        self.prior_result = prior;
    }

    /// Clear per-phase transient state.
    pub fn end_phase(&mut self) {
        self.prior_result = None;
    }

    pub fn result_of(&self, phase: Phase) -> Option<&RuleValue> {
        self.action_results.get(&phase)
    }

    // ── Control ───────────────────────────────────────────────────────────

    /// The control for this tick, computing the path-following default once.
    ///
    /// Repeated calls in the same tick return the stored value without
    /// invoking the controller again.  With no target waypoint the default
    /// is a full stop.
    pub fn get_or_calculate_control(&mut self) -> VehicleControl {
        if let Some(c) = self.control {
            return c;
        }
        let c = match &self.inputs.target {
            Some(target) => self.controller.control(&self.inputs.state, target, self.inputs.target_speed_kmh),
            None => VehicleControl::STOP,
        };
        self.control_computations += 1;
        self.control = Some(c);
        c
    }

    /// How often the controller ran since the tick began.
    pub fn control_computations(&self) -> u32 {
        self.control_computations
    }

    pub fn controller(&self) -> &Arc<dyn Controller> {
        &self.controller
    }

    // ── Hazards ───────────────────────────────────────────────────────────

    pub fn add_hazard(&mut self, hazard: Hazard, severity: Severity) {
        self.hazards.add(hazard, severity);
    }

    /// Remove every recorded hazard containing `hazard`.
    pub fn discard_hazard(&mut self, hazard: Hazard) -> usize {
        self.hazards.discard(hazard, MatchMode::Subset)
    }

    pub fn discard_hazard_with(&mut self, hazard: Hazard, mode: MatchMode) -> usize {
        self.hazards.discard(hazard, mode)
    }

    /// `true` if any recorded hazard shares a bit with `hazard`.
    pub fn has_hazard(&self, hazard: Hazard) -> bool {
        self.hazards.has(hazard, MatchMode::Intersection)
    }

    pub fn has_hazard_with(&self, hazard: Hazard, mode: MatchMode) -> bool {
        self.hazards.has(hazard, mode)
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("tick", &self.tick)
            .field("phase", &self.phase)
            .field("control", &self.control)
            .field("hazards", &self.hazards)
            .field("second_pass", &self.second_pass)
            .field("fired", &self.fired)
            .field("has_last_context", &self.last_context.is_some())
            .finish_non_exhaustive()
    }
}
