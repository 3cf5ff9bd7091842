//! The `Agent` struct and its step loop.

use std::sync::Arc;

use tracing::{debug, info, warn};

use ad_core::{ActorId, AgentRng, Hazard, HazardSet, Location, Phase, Severity, Tick, VehicleControl};
use ad_matrix::MatrixUpdater;
use ad_rules::{
    information_pass, run_phase, Context, ControlInputs, Flow, Gate, LiveInfo, ObstacleDetection, RuleHost,
    RuleTable, RuleValue, Signal,
};
use ad_world::{ActorKind, Controller, LightState, MapView, VehicleState, World};

use crate::detect;
use crate::emergency::emergency_control;
use crate::error::{AgentError, AgentResult};
use crate::observer::AgentObserver;
use crate::planner::LocalPlanner;
use crate::settings::AgentSettings;

/// What one call to [`Agent::run_step`] produced.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum StepOutcome {
    /// The control applied to ego this tick.
    Continue(VehicleControl),
    /// No route is left and no rule supplied a new one.
    Done,
}

// ── Drive ─────────────────────────────────────────────────────────────────────

/// Everything the agent reads from or writes to the world.
pub(crate) struct Drive<W: World> {
    pub(crate) world: Arc<W>,
    pub(crate) ego: ActorId,
    pub(crate) settings: Arc<AgentSettings>,
    pub(crate) planner: LocalPlanner,
    pub(crate) matrix: Option<Box<dyn MatrixUpdater>>,
}

impl<W: World> Drive<W> {
    /// Re-read the world into `ctx.live` and `ctx.inputs`.
    pub(crate) fn refresh(&mut self, ctx: &mut Context) -> AgentResult<()> {
        let actors = self.world.actors();
        let ego = *actors.iter().find(|a| a.id == self.ego).ok_or(AgentError::EgoNotFound(self.ego))?;
        let map = self.world.map();
        let current = map.waypoint(ego.location()).ok_or(AgentError::OffRoad(self.ego))?;
        self.planner.advance_to(&ego.transform);

        let s = &self.settings;
        let speed_limit = map.speed_limit(current.road);
        let look_ahead = (speed_limit / s.planner.look_ahead_divisor) as usize;
        let incoming = self.planner.incoming(look_ahead);

        let mut live = LiveInfo {
            ego: Some(ego),
            speed_kmh: ego.speed_kmh(),
            speed_limit_kmh: speed_limit,
            look_ahead_steps: look_ahead,
            current_waypoint: Some(current),
            incoming_waypoint: incoming.map(|(wp, _)| wp),
            incoming_direction: incoming.map(|(_, opt)| opt).unwrap_or_default(),
            route_remaining: self.planner.len(),
            ..LiveInfo::default()
        };
        let radius = s.distance.nearby_radius_m;
        for actor in actors.into_iter().filter(|a| a.id != self.ego) {
            match actor.kind {
                // Stop lines can sit far from the light itself.
                ActorKind::TrafficLight => live.traffic_lights.push(actor),
                _ if actor.location().distance(ego.location()) > radius => {}
                ActorKind::Vehicle => live.vehicles_nearby.push(actor),
                ActorKind::Walker => live.walkers_nearby.push(actor),
            }
        }
        if let Some(matrix) = self.matrix.as_mut() {
            matrix.update()?;
            live.matrix = matrix.snapshot();
        }

        ctx.live = live;
        ctx.inputs = ControlInputs {
            state: VehicleState { transform: ego.transform, speed_kmh: ego.speed_kmh() },
            target: self.planner.target(),
            target_speed_kmh: s.target_speed(speed_limit),
        };
        Ok(())
    }

    /// Plan a new route from ego's current lane to `to`.
    pub(crate) fn reroute(&mut self, to: Location) -> AgentResult<usize> {
        let ego = self.world.actor(self.ego).ok_or(AgentError::EgoNotFound(self.ego))?;
        let map = self.world.map();
        let from = map.waypoint(ego.location()).ok_or(AgentError::OffRoad(self.ego))?;
        let n = self.planner.set_destination(&*map, &from, to)?;
        info!(ego = %self.ego, %to, waypoints = n, "route updated");
        Ok(n)
    }

    fn stop_matrix(&mut self) -> AgentResult<()> {
        if let Some(matrix) = self.matrix.as_mut() {
            matrix.stop(self.settings.matrix.stop_timeout())?;
        }
        Ok(())
    }
}

// ── Host ──────────────────────────────────────────────────────────────────────

/// Runs rules against the live world.  Advancing applies the control,
/// ticks the world and refreshes the context.
struct AgentHost<'a, W: World, O: AgentObserver + ?Sized> {
    rules: &'a mut RuleTable,
    drive: &'a mut Drive<W>,
    obs: &'a mut O,
}

impl<W: World, O: AgentObserver + ?Sized> RuleHost for AgentHost<'_, W, O> {
    fn table(&mut self) -> &mut RuleTable {
        &mut *self.rules
    }

    fn advance(&mut self, ctx: &mut Context, control: VehicleControl) -> Flow<()> {
        self.drive.world.apply_control(self.drive.ego, control);
        self.obs.on_control_applied(ctx.tick, &control);
        let tick = self.drive.world.tick();
        ctx.enter_tick(tick);
        self.drive.refresh(ctx).map_err(|e| Signal::fault(e.to_string()))?;
        information_pass(self, ctx)
    }
}

// ── Unwinding ─────────────────────────────────────────────────────────────────

/// Why the inner loop stopped early.
enum Unwind {
    Signal(Signal),
    Error(AgentError),
}

impl From<Signal> for Unwind {
    fn from(s: Signal) -> Self {
        Unwind::Signal(s)
    }
}

impl From<AgentError> for Unwind {
    fn from(e: AgentError) -> Self {
        Unwind::Error(e)
    }
}

impl From<ad_core::CoreError> for Unwind {
    fn from(e: ad_core::CoreError) -> Self {
        Unwind::Error(e.into())
    }
}

type Step<T> = Result<T, Unwind>;

enum Inner {
    Control(VehicleControl),
    Done,
}

enum Entry {
    Normal,
    Emergency(HazardSet),
}

// ── Agent ─────────────────────────────────────────────────────────────────────

/// The per-tick decision loop for one ego vehicle.
///
/// Each [`run_step`](Agent::run_step) walks the phase cycle
///
/// 1. `UPDATE_INFORMATION`: refresh live information (skipped on a second pass).
/// 2. `DONE` if the route is exhausted.
/// 3. `PLAN_PATH`.
/// 4. `DETECT_TRAFFIC_LIGHTS`, `DETECT_PEDESTRIANS`: add hazards.
/// 5. `HAZARD` if any were added; unresolved hazards divert the tick into
///    `EMERGENCY`.
/// 6. `DETECT_CARS`, then exactly one of `CAR_DETECTED`,
///    `TURNING_AT_JUNCTION` or `TAKE_NORMAL_STEP`.
/// 7. `RSS_EVALUATION`, `EXECUTION`.
///
/// and applies the resulting control to the world exactly once.  Signals
/// raised by rules are handled in `run_step` and nowhere else.
///
/// Create via [`AgentBuilder`](crate::AgentBuilder).
pub struct Agent<W: World> {
    pub(crate) drive: Drive<W>,
    pub(crate) rules: RuleTable,
    pub(crate) ctx: Context,
    pub(crate) rng: AgentRng,
    pub(crate) controller: Arc<dyn Controller>,
    /// Last phase executed this tick, for strict validation.
    pub(crate) last_phase: Phase,
    /// Last main-cycle phase executed this tick; detours return here.
    pub(crate) cycle_phase: Phase,
    /// The braking policy has been applied to this pass's control.
    pub(crate) braked: bool,
}

impl<W: World> Agent<W> {
    // ── Public API ────────────────────────────────────────────────────────

    /// Run one tick of the decision loop and apply its control.
    pub fn run_step<O: AgentObserver>(&mut self, obs: &mut O) -> AgentResult<StepOutcome> {
        let tick = self.drive.world.current_tick();
        let prev = std::mem::replace(&mut self.ctx, Context::new(tick, Arc::clone(&self.controller)));
        self.ctx = Context::next(prev, tick);
        self.last_phase = Phase::NONE;
        self.cycle_phase = Phase::NONE;
        self.braked = false;
        obs.on_tick_start(tick);

        let dispatch = &self.drive.settings.dispatch;
        let (warn_after, max_replans) = (dispatch.replan_warn_after, dispatch.max_replans);
        let mut entry = Entry::Normal;
        let mut restarts = 0u32;

        let control = loop {
            let res = match &entry {
                Entry::Normal => self.inner_step(obs),
                Entry::Emergency(hazards) => self.emergency_step(obs, hazards),
            };
            let signal = match res {
                Ok(Inner::Control(c)) => break c,
                Ok(Inner::Done) => {
                    info!(ego = %self.drive.ego, %tick, "route finished");
                    obs.on_session_end(self.ctx.tick);
                    return Ok(StepOutcome::Done);
                }
                Err(Unwind::Error(e)) => return Err(e),
                Err(Unwind::Signal(s)) => s,
            };
            obs.on_signal(self.ctx.tick, &signal);
            debug!(tick = %self.ctx.tick, phase = %self.ctx.phase, %signal, "signal");

            match signal {
                Signal::PathUpdated => {
                    restarts += 1;
                    if restarts > max_replans {
                        return Err(AgentError::ReplanLimit(restarts));
                    }
                    if restarts == warn_after {
                        warn!(%tick, restarts, "tick keeps re-planning");
                    }
                    self.ctx.restart_pass();
                    self.ctx.second_pass = true;
                    self.braked = false;
                    entry = Entry::Normal;
                }
                Signal::ContinueLoop => break self.ctx.get_or_calculate_control(),
                Signal::SkipInnerLoop { control } => break control,
                Signal::EmergencyStop { hazards } => {
                    // Raised again from inside EMERGENCY: brake at most once.
                    if matches!(entry, Entry::Emergency(_)) {
                        self.ctx.hazards.merge(&hazards);
                        break if self.braked { self.ctx.get_or_calculate_control() } else { self.brake() };
                    }
                    entry = Entry::Emergency(hazards);
                }
                other => return Err(self.fatal(other)),
            }
        };

        self.ctx.control = Some(control);
        self.drive.world.apply_control(self.drive.ego, control);
        obs.on_control_applied(self.ctx.tick, &control);
        Ok(StepOutcome::Continue(control))
    }

    /// Step until the route is finished or `max_ticks` ticks have passed,
    /// advancing the world after each step.  Returns the ticks driven.
    pub fn run<O: AgentObserver>(&mut self, max_ticks: u64, obs: &mut O) -> AgentResult<u64> {
        for n in 0..max_ticks {
            if self.run_step(obs)? == StepOutcome::Done {
                return Ok(n);
            }
            self.drive.world.tick();
        }
        Ok(max_ticks)
    }

    /// Run the rules of one phase against the current context.
    ///
    /// Used by the step loop for every phase, and by callers driving
    /// user-controlled stages such as `CUSTOM_CYCLE`.  A signal escaping
    /// the phase is an error here.
    pub fn execute_phase<O: AgentObserver>(
        &mut self,
        obs: &mut O,
        phase: Phase,
        prior: Option<RuleValue>,
    ) -> AgentResult<Option<RuleValue>> {
        match self.execute(obs, phase, prior) {
            Ok(v) => Ok(v),
            Err(Unwind::Error(e)) => Err(e),
            Err(Unwind::Signal(s)) => Err(self.fatal(s)),
        }
    }

    /// Plan a route to `to` from ego's current position.
    pub fn set_destination(&mut self, to: Location) -> AgentResult<usize> {
        self.drive.reroute(to)
    }

    /// Run the `TERMINATING` phase pair and stop the detection matrix.
    pub fn shutdown<O: AgentObserver>(&mut self, obs: &mut O) -> AgentResult<()> {
        let ran = self
            .execute_phase(obs, Phase::begin(Phase::TERMINATING), None)
            .and_then(|_| self.execute_phase(obs, Phase::end(Phase::TERMINATING), None));
        let stopped = self.drive.stop_matrix();
        ran?;
        stopped
    }

    /// Current simulation tick as seen by the context.
    pub fn tick(&self) -> Tick {
        self.ctx.tick
    }

    pub fn ego(&self) -> ActorId {
        self.drive.ego
    }

    pub fn world(&self) -> &Arc<W> {
        &self.drive.world
    }

    pub fn settings(&self) -> &AgentSettings {
        &self.drive.settings
    }

    /// The context of the tick in progress, or of the last finished tick.
    pub fn context(&self) -> &Context {
        &self.ctx
    }

    pub fn rules(&self) -> &RuleTable {
        &self.rules
    }

    pub fn rules_mut(&mut self) -> &mut RuleTable {
        &mut self.rules
    }

    pub fn planner(&self) -> &LocalPlanner {
        &self.drive.planner
    }

    // ── Phase dispatch ────────────────────────────────────────────────────

    /// Record `phase` as current, rejecting it in strict mode if it neither
    /// follows the last phase nor resumes the main cycle after a detour.
    fn enter(&mut self, phase: Phase) -> AgentResult<()> {
        if self.drive.settings.dispatch.strict_phases {
            let resumes = self.cycle_phase.next_phase().is_ok_and(|p| p == phase);
            if !resumes {
                self.last_phase.check_transition(phase)?;
            }
        }
        self.last_phase = phase;
        if Phase::main_stages().contains(&phase.stage()) {
            self.cycle_phase = phase;
        }
        Ok(())
    }

    fn execute<O: AgentObserver + ?Sized>(&mut self, obs: &mut O, phase: Phase, prior: Option<RuleValue>) -> Step<Option<RuleValue>> {
        self.enter(phase)?;
        self.ctx.begin_phase(phase, prior);
        let out = {
            let mut host = AgentHost { rules: &mut self.rules, drive: &mut self.drive, obs: &mut *obs };
            run_phase(&mut host, &mut self.ctx, Gate::NORMAL)
        };
        self.ctx.end_phase();
        obs.on_phase(phase, &self.ctx);
        let out = out?;

        if let Some(to) = self.ctx.route_request.take() {
            self.drive.reroute(to)?;
            return Err(Signal::PathUpdated.into());
        }
        Ok(out)
    }

    fn pair<O: AgentObserver + ?Sized>(&mut self, obs: &mut O, stage: Phase, prior: Option<RuleValue>) -> Step<Option<RuleValue>> {
        self.execute(obs, Phase::begin(stage), prior.clone())?;
        self.execute(obs, Phase::end(stage), prior)
    }

    fn fatal(&self, signal: Signal) -> AgentError {
        match signal {
            Signal::UserInterrupt => AgentError::Interrupted,
            Signal::Fault(message) => AgentError::RuleFault { phase: self.ctx.phase, message },
            signal => AgentError::UnexpectedSignal { phase: self.ctx.phase, signal },
        }
    }

    // ── Tick body ─────────────────────────────────────────────────────────

    fn inner_step<O: AgentObserver + ?Sized>(&mut self, obs: &mut O) -> Step<Inner> {
        if self.ctx.second_pass {
            // Live information is tick-constant; resume after it.
            self.last_phase = Phase::end(Phase::UPDATE_INFORMATION);
            self.cycle_phase = self.last_phase;
        } else {
            self.execute(obs, Phase::begin(Phase::UPDATE_INFORMATION), None)?;
            self.drive.refresh(&mut self.ctx)?;
            self.execute(obs, Phase::end(Phase::UPDATE_INFORMATION), None)?;
        }

        if self.drive.planner.done() {
            // A rule requesting a destination here restarts the tick.
            self.pair(obs, Phase::DONE, None)?;
            return Ok(Inner::Done);
        }

        self.execute(obs, Phase::begin(Phase::PLAN_PATH), None)?;
        self.ctx.inputs.target = self.drive.planner.target();
        self.ctx.live.route_remaining = self.drive.planner.len();
        self.execute(obs, Phase::end(Phase::PLAN_PATH), None)?;

        self.detect_non_cars(obs)?;
        self.drive_step(obs)
    }

    fn detect_non_cars<O: AgentObserver + ?Sized>(&mut self, obs: &mut O) -> Step<()> {
        let settings = Arc::clone(&self.drive.settings);

        self.execute(obs, Phase::begin(Phase::DETECT_TRAFFIC_LIGHTS), None)?;
        let light = detect::traffic_light(&self.ctx.live, &settings);
        if light.found {
            let (hazard, severity) = match light.state {
                Some(LightState::Yellow) => (Hazard::TRAFFIC_LIGHT_YELLOW, Severity::CRITICAL),
                _ => (Hazard::TRAFFIC_LIGHT_RED, Severity::EMERGENCY),
            };
            debug!(tick = %self.ctx.tick, distance = light.distance, %hazard, "traffic light ahead");
            self.ctx.add_hazard(hazard, severity);
        }
        self.execute(obs, Phase::end(Phase::DETECT_TRAFFIC_LIGHTS), Some(RuleValue::TrafficLight(light)))?;

        self.execute(obs, Phase::begin(Phase::DETECT_PEDESTRIANS), None)?;
        let max_d = settings.max_detection_distance(self.ctx.live.speed_limit_kmh, true);
        let walker = detect::pedestrian(&self.ctx.live, max_d);
        if walker.found {
            let severity = if walker.distance <= settings.distance.braking_distance_m {
                Severity::EMERGENCY
            } else {
                Severity::WARNING
            };
            debug!(tick = %self.ctx.tick, distance = walker.distance, "pedestrian ahead");
            self.ctx.add_hazard(Hazard::PEDESTRIAN, severity);
        }
        self.execute(obs, Phase::end(Phase::DETECT_PEDESTRIANS), Some(RuleValue::Obstacle(walker)))?;

        if !self.ctx.hazards.is_empty() {
            let hazards = self.ctx.hazards.clone();
            self.pair(obs, Phase::HAZARD, Some(RuleValue::Hazards(hazards)))?;
            if !self.ctx.hazards.is_empty() {
                return Err(Signal::emergency(&self.ctx.hazards).into());
            }
        }
        Ok(())
    }

    /// Exactly one of the car-following, junction or normal branches.
    fn drive_step<O: AgentObserver + ?Sized>(&mut self, obs: &mut O) -> Step<Inner> {
        let settings = Arc::clone(&self.drive.settings);
        self.execute(obs, Phase::begin(Phase::DETECT_CARS), None)?;
        let max_d = settings.max_detection_distance(self.ctx.live.speed_limit_kmh, true);
        let car = detect::vehicle_ahead(&self.ctx.live, max_d);

        if car.found {
            let prior = Some(RuleValue::Obstacle(car));
            self.execute(obs, Phase::begin(Phase::CAR_DETECTED), prior.clone())?;
            self.follow(&car, &settings)?;
            self.execute(obs, Phase::end(Phase::CAR_DETECTED), prior)?;
            return self.finish(obs);
        }
        self.execute(obs, Phase::end(Phase::DETECT_CARS), Some(RuleValue::Obstacle(car)))?;

        let live = &self.ctx.live;
        let turning = live.incoming_waypoint.is_some_and(|wp| wp.is_junction) && live.is_taking_turn();
        let stage = if turning { Phase::TURNING_AT_JUNCTION } else { Phase::TAKE_NORMAL_STEP };
        self.execute(obs, Phase::begin(stage), None)?;
        let control = self.ctx.get_or_calculate_control();
        self.execute(obs, Phase::end(stage), Some(RuleValue::Control(control)))?;
        self.finish(obs)
    }

    /// Slow down behind `car`, or stop if it is inside the braking distance.
    /// A control already set by a rule is kept.
    fn follow(&mut self, car: &ObstacleDetection, settings: &AgentSettings) -> Step<()> {
        if car.distance <= settings.distance.braking_distance_m {
            self.ctx.add_hazard(Hazard::CAR, Severity::EMERGENCY);
            return Err(Signal::emergency(&self.ctx.hazards).into());
        }
        let live = &self.ctx.live;
        let leader_kmh = car
            .actor
            .and_then(|id| live.vehicles_nearby.iter().find(|a| a.id == id))
            .map_or(0.0, |a| a.speed_kmh());
        let target = detect::following_speed(live.speed_kmh, leader_kmh, car.distance, live.speed_limit_kmh, settings);
        self.ctx.inputs.target_speed_kmh = target;
        self.ctx.get_or_calculate_control();
        Ok(())
    }

    fn emergency_step<O: AgentObserver + ?Sized>(&mut self, obs: &mut O, hazards: &HazardSet) -> Step<Inner> {
        warn!(ego = %self.drive.ego, tick = %self.ctx.tick, %hazards, "emergency stop");
        self.ctx.hazards.merge(hazards);
        self.execute(obs, Phase::begin(Phase::EMERGENCY), Some(RuleValue::Hazards(hazards.clone())))?;
        let control = self.brake();
        self.execute(obs, Phase::end(Phase::EMERGENCY), Some(RuleValue::Control(control)))?;
        self.finish(obs)
    }

    /// Replace the current control with the emergency braking policy.
    fn brake(&mut self) -> VehicleControl {
        let base = self.ctx.get_or_calculate_control();
        let control = emergency_control(base, &self.ctx.hazards, &self.drive.settings.emergency, &mut self.rng);
        self.ctx.control = Some(control);
        self.braked = true;
        control
    }

    fn finish<O: AgentObserver + ?Sized>(&mut self, obs: &mut O) -> Step<Inner> {
        self.pair(obs, Phase::RSS_EVALUATION, None)?;
        let control = self.ctx.get_or_calculate_control();
        self.pair(obs, Phase::EXECUTION, Some(RuleValue::Control(control)))?;
        Ok(Inner::Control(self.ctx.get_or_calculate_control()))
    }
}
