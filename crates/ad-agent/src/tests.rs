//! Unit tests for ad-agent.

use std::io::Write;
use std::sync::Arc;

use ad_core::{
    ActorId, AgentRng, CoreError, Hazard, HazardSet, Location, Phase, RoadLaneId, RoadOption, Rotation, Severity, Tick,
    Transform, Vec3, VehicleControl,
};
use ad_matrix::MatrixMode;
use ad_rules::{Context, Rule, RuleError, RuleRegistry, RuleValue, Signal};
use ad_world::{
    ActorSnapshot, Controller, FixedController, LaneNetwork, LaneNetworkBuilder, LightState, MapView,
    ProportionalController, Road, Route, Router, ScriptedWorld, TrafficLightInfo, Waypoint, World, WorldError,
    WorldResult,
};

use crate::{
    detect, emergency_control, Agent, AgentBuilder, AgentError, AgentObserver, AgentSettings, EmergencySettings,
    NoopObserver, StepOutcome,
};

// ── Helpers ───────────────────────────────────────────────────────────────────

const EGO: ActorId = ActorId(1);

const CRUISE: VehicleControl = VehicleControl { throttle: 0.5, steer: 0.0, brake: 0.0, hand_brake: false, reverse: false };

fn road(lanes: &[i32]) -> LaneNetwork {
    let mut b = LaneNetworkBuilder::new();
    b.add_road(Road::straight(1, Vec3::ZERO, 0.0, 300.0).lanes(lanes).speed_limit(50.0));
    b.build().unwrap()
}

/// Centre of lane -1 at `x`, heading along +x.
fn on_lane(x: f32) -> Transform {
    Transform::new(Vec3::xy(x, 1.75), Rotation::yaw(0.0))
}

fn world_with(lanes: &[i32], others: &[ActorSnapshot]) -> Arc<ScriptedWorld> {
    let world = ScriptedWorld::new(road(lanes), 0.1);
    world.spawn(ActorSnapshot::vehicle(EGO, on_lane(10.0)));
    for a in others {
        world.spawn(*a);
    }
    Arc::new(world)
}

fn world() -> Arc<ScriptedWorld> {
    world_with(&[-1, 1], &[])
}

fn builder(world: &Arc<ScriptedWorld>) -> AgentBuilder<ScriptedWorld> {
    AgentBuilder::new(Arc::clone(world), EGO)
        .controller(FixedController(CRUISE))
        .destination(Vec3::xy(250.0, 1.75))
}

fn agent(world: &Arc<ScriptedWorld>) -> Agent<ScriptedWorld> {
    builder(world).build().unwrap()
}

#[derive(Default)]
struct Recorder {
    ticks: Vec<Tick>,
    phases: Vec<Phase>,
    signals: Vec<Signal>,
    applied: Vec<(Tick, VehicleControl)>,
    ended: u32,
}

impl Recorder {
    fn saw(&self, phase: Phase) -> usize {
        self.phases.iter().filter(|&&p| p == phase).count()
    }
}

impl AgentObserver for Recorder {
    fn on_tick_start(&mut self, tick: Tick) {
        self.ticks.push(tick);
    }

    fn on_phase(&mut self, phase: Phase, _ctx: &Context) {
        self.phases.push(phase);
    }

    fn on_signal(&mut self, _tick: Tick, signal: &Signal) {
        self.signals.push(signal.clone());
    }

    fn on_control_applied(&mut self, tick: Tick, control: &VehicleControl) {
        self.applied.push((tick, *control));
    }

    fn on_session_end(&mut self, _tick: Tick) {
        self.ended += 1;
    }
}

fn signalling(name: &str, phase: Phase, signal: Signal) -> Rule {
    Rule::builder(name).phase(phase).on_true(move |_| Err(signal.clone())).build().unwrap()
}

// ── Settings ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod settings {
    use super::*;

    #[test]
    fn file_overrides_only_listed_keys() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "seed = 9\n\n[speed]\ntarget_speed_kmh = 40.0\n\n[matrix]\nmode = \"sync\"").unwrap();

        let s = AgentSettings::load(f.path()).unwrap();
        assert_eq!(s.seed, 9);
        assert_eq!(s.speed.target_speed_kmh, 40.0);
        assert_eq!(s.speed.safety_time_s, 3.0);
        assert_eq!(s.matrix.mode, MatrixMode::Sync);
        assert_eq!(s.matrix.ahead_m, [10.0, 20.0, 30.0, 40.0]);
        assert_eq!(s.distance, AgentSettings::default().distance);
    }

    #[test]
    fn runtime_override_wins() {
        let s = AgentSettings::from_toml_str("[speed]\ntarget_speed_kmh = 40.0")
            .unwrap()
            .with_override(|s| s.speed.target_speed_kmh = 25.0);
        assert_eq!(s.speed.target_speed_kmh, 25.0);
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(matches!(
            AgentSettings::from_toml_str("[emergency]\nmax_brake = 2.0"),
            Err(AgentError::Settings(_))
        ));
        assert!(matches!(
            AgentSettings::from_toml_str("[dispatch]\nmax_replans = 0"),
            Err(AgentError::Settings(_))
        ));
        assert!(matches!(AgentSettings::from_toml_str("speed = 3"), Err(AgentError::Parse(_))));
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(AgentSettings::load(&dir.path().join("absent.toml")), Err(AgentError::Io(_))));
    }

    #[test]
    fn detection_distance_has_a_floor() {
        let s = AgentSettings::default();
        assert_eq!(s.max_detection_distance(20.0, true), 10.0);
        assert_eq!(s.max_detection_distance(60.0, true), 20.0);
        assert_eq!(s.max_detection_distance(60.0, false), 30.0);
    }

    #[test]
    fn target_speed_stays_under_the_limit() {
        let s = AgentSettings::default();
        assert_eq!(s.target_speed(50.0), 30.0);
        assert_eq!(s.target_speed(20.0), 17.0);
        let follow = s.clone().with_override(|s| s.speed.follow_speed_limits = true);
        assert_eq!(follow.target_speed(50.0), 47.0);
    }
}

// ── Tick ──────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tick {
    use super::*;

    #[test]
    fn normal_tick_walks_the_cycle() {
        let w = world();
        let mut a = agent(&w);
        let mut rec = Recorder::default();
        assert_eq!(a.run_step(&mut rec).unwrap(), StepOutcome::Continue(CRUISE));

        let expected: Vec<Phase> = [
            Phase::UPDATE_INFORMATION,
            Phase::PLAN_PATH,
            Phase::DETECT_TRAFFIC_LIGHTS,
            Phase::DETECT_PEDESTRIANS,
            Phase::DETECT_CARS,
            Phase::TAKE_NORMAL_STEP,
            Phase::RSS_EVALUATION,
            Phase::EXECUTION,
        ]
        .into_iter()
        .flat_map(|s| [Phase::begin(s), Phase::end(s)])
        .collect();
        assert_eq!(rec.phases, expected);
        assert_eq!(rec.ticks, vec![Tick(0)]);
        assert!(rec.signals.is_empty());
    }

    #[test]
    fn control_is_applied_once_per_tick() {
        let w = world();
        let mut a = agent(&w);
        let mut rec = Recorder::default();
        assert_eq!(a.run(5, &mut rec).unwrap(), 5);

        let applied = w.applied_controls();
        assert_eq!(applied.len(), 5);
        let ticks: Vec<Tick> = applied.iter().map(|&(t, _, _)| t).collect();
        assert_eq!(ticks, (0..5).map(Tick).collect::<Vec<_>>());
        assert!(applied.iter().all(|&(_, id, c)| id == EGO && c == CRUISE));
        assert_eq!(rec.applied.len(), 5);
    }

    #[test]
    fn controller_runs_once_per_tick() {
        let w = world();
        let mut a = agent(&w);
        a.run_step(&mut NoopObserver).unwrap();
        assert_eq!(a.context().control_computations(), 1);
        assert_eq!(a.context().control, Some(CRUISE));
    }

    #[test]
    fn previous_context_is_kept_for_one_tick() {
        let w = world();
        let mut a = agent(&w);
        a.run(3, &mut NoopObserver).unwrap();
        let ctx = a.context();
        assert_eq!(ctx.tick, Tick(2));
        let last = ctx.last_context().unwrap();
        assert_eq!(last.tick, Tick(1));
        assert!(last.last_context().is_none());
    }

    #[test]
    fn no_route_ends_the_session() {
        let w = world();
        let mut a = AgentBuilder::new(Arc::clone(&w), EGO).build().unwrap();
        let mut rec = Recorder::default();
        assert_eq!(a.run_step(&mut rec).unwrap(), StepOutcome::Done);
        assert_eq!(rec.ended, 1);
        assert!(w.applied_controls().is_empty());
        assert_eq!(rec.saw(Phase::begin(Phase::DONE)), 1);
        assert_eq!(rec.saw(Phase::begin(Phase::PLAN_PATH)), 0);
    }

    #[test]
    fn done_rule_can_supply_a_new_route() {
        let w = world();
        let rule = Rule::builder("keep_going")
            .phase(Phase::end(Phase::DONE))
            .on_true(|ctx| {
                ctx.route_request = Some(Vec3::xy(100.0, 1.75));
                Ok(RuleValue::Unit)
            })
            .build()
            .unwrap();
        let mut a = AgentBuilder::new(Arc::clone(&w), EGO)
            .controller(FixedController(CRUISE))
            .rule(rule)
            .build()
            .unwrap();
        let mut rec = Recorder::default();
        assert_eq!(a.run_step(&mut rec).unwrap(), StepOutcome::Continue(CRUISE));
        assert_eq!(rec.signals, vec![Signal::PathUpdated]);
        assert!(!a.planner().done());
    }

    #[test]
    fn missing_ego_is_an_error() {
        let w = world();
        let mut a = agent(&w);
        w.despawn(EGO);
        assert!(matches!(a.run_step(&mut NoopObserver), Err(AgentError::EgoNotFound(id)) if id == EGO));
    }
}

// ── Signals ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod signals {
    use super::*;

    #[test]
    fn skip_inner_loop_applies_carried_control() {
        let w = world();
        let stop = Signal::SkipInnerLoop { control: VehicleControl::STOP };
        let mut a = builder(&w).rule(signalling("halt", Phase::end(Phase::PLAN_PATH), stop)).build().unwrap();
        let mut rec = Recorder::default();

        assert_eq!(a.run_step(&mut rec).unwrap(), StepOutcome::Continue(VehicleControl::STOP));
        assert_eq!(rec.phases.last(), Some(&Phase::end(Phase::PLAN_PATH)));
        assert_eq!(w.applied_controls().len(), 1);
        assert_eq!(w.applied_controls()[0].2, VehicleControl::STOP);
    }

    #[test]
    fn continue_loop_keeps_current_control() {
        let w = world();
        let coast = VehicleControl::new(0.1, 0.0, 0.0);
        let rule = Rule::builder("coast")
            .phase(Phase::begin(Phase::DETECT_TRAFFIC_LIGHTS))
            .on_true(move |ctx| {
                ctx.control = Some(coast);
                Err(Signal::ContinueLoop)
            })
            .build()
            .unwrap();
        let mut a = builder(&w).rule(rule).build().unwrap();
        assert_eq!(a.run_step(&mut NoopObserver).unwrap(), StepOutcome::Continue(coast));
    }

    #[test]
    fn user_interrupt_ends_the_session() {
        let w = world();
        let rule = signalling("quit", Phase::begin(Phase::EXECUTION), Signal::UserInterrupt);
        let mut a = builder(&w).rule(rule).build().unwrap();
        assert!(matches!(a.run_step(&mut NoopObserver), Err(AgentError::Interrupted)));
        assert!(w.applied_controls().is_empty());
    }

    #[test]
    fn fault_carries_phase() {
        let w = world();
        let rule = signalling("broken", Phase::begin(Phase::PLAN_PATH), Signal::fault("no map"));
        let mut a = builder(&w).rule(rule).build().unwrap();
        match a.run_step(&mut NoopObserver) {
            Err(AgentError::RuleFault { phase, message }) => {
                assert_eq!(phase, Phase::begin(Phase::PLAN_PATH));
                assert_eq!(message, "no map");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn stray_rule_signal_is_reported() {
        let w = world();
        let rule = signalling("stray", Phase::end(Phase::PLAN_PATH), Signal::SkipChildren);
        let mut a = builder(&w).rule(rule).build().unwrap();
        assert!(matches!(
            a.run_step(&mut NoopObserver),
            Err(AgentError::UnexpectedSignal { signal: Signal::SkipChildren, .. })
        ));
    }

    #[test]
    fn path_update_restarts_as_second_pass() {
        let w = world();
        let rule = Rule::builder("detour")
            .phase(Phase::end(Phase::PLAN_PATH))
            .condition(|ctx: &Context| !ctx.second_pass)
            .on_true(|ctx| {
                ctx.route_request = Some(Vec3::xy(120.0, 1.75));
                Ok(RuleValue::Unit)
            })
            .build()
            .unwrap();
        let mut a = builder(&w).rule(rule).build().unwrap();
        let mut rec = Recorder::default();

        assert_eq!(a.run_step(&mut rec).unwrap(), StepOutcome::Continue(CRUISE));
        assert_eq!(rec.signals, vec![Signal::PathUpdated]);
        assert_eq!(rec.saw(Phase::begin(Phase::UPDATE_INFORMATION)), 1);
        assert_eq!(rec.saw(Phase::begin(Phase::PLAN_PATH)), 2);
        assert!(a.context().second_pass);
        assert_eq!(a.planner().destination(), Some(Vec3::xy(120.0, 1.75)));
    }

    /// Routes straight to the lane point nearest the destination.
    struct DirectRouter;

    impl Router for DirectRouter {
        fn route(&self, map: &dyn MapView, from: &Waypoint, to: Location) -> WorldResult<Route> {
            let wp = map.waypoint(to).ok_or(WorldError::NoRoute { from: from.location(), to })?;
            Ok(vec![(wp, RoadOption::LaneFollow)])
        }
    }

    #[test]
    fn replan_recomputes_control_for_the_new_target() {
        let w = world();
        let swerve = Rule::builder("swerve")
            .phase(Phase::end(Phase::TAKE_NORMAL_STEP))
            .condition(|ctx: &Context| !ctx.second_pass)
            .on_true(|ctx| {
                ctx.route_request = Some(Vec3::xy(30.0, -1.75));
                Ok(RuleValue::Unit)
            })
            .build()
            .unwrap();
        let mut a = builder(&w)
            .controller(ProportionalController::default())
            .router(DirectRouter)
            .rule(swerve)
            .build()
            .unwrap();

        let StepOutcome::Continue(applied) = a.run_step(&mut NoopObserver).unwrap() else { panic!("session ended") };
        let ctx = a.context();
        let target = ctx.inputs.target.unwrap();
        assert!((target.location() - Vec3::xy(30.0, -1.75)).length() < 1e-3);
        let fresh = ProportionalController::default().control(&ctx.inputs.state, &target, ctx.inputs.target_speed_kmh);
        assert_eq!(applied, fresh);
        assert!(applied.steer < 0.0);
        assert_eq!(ctx.control_computations(), 1);
        assert_eq!(w.applied_controls()[0].2, fresh);
    }

    #[test]
    fn endless_replanning_is_fatal() {
        let w = world();
        let rule = Rule::builder("dither")
            .phase(Phase::end(Phase::PLAN_PATH))
            .on_true(|ctx| {
                ctx.route_request = Some(Vec3::xy(120.0, 1.75));
                Ok(RuleValue::Unit)
            })
            .build()
            .unwrap();
        let settings = AgentSettings::default().with_override(|s| s.dispatch.max_replans = 3);
        let mut a = builder(&w).settings(settings).rule(rule).build().unwrap();
        assert!(matches!(a.run_step(&mut NoopObserver), Err(AgentError::ReplanLimit(4))));
    }
}

// ── Hazards ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod hazards {
    use super::*;

    fn walker_at(x: f32) -> ActorSnapshot {
        ActorSnapshot::walker(ActorId(7), on_lane(x))
    }

    fn light(state: LightState) -> ActorSnapshot {
        let info = TrafficLightInfo { state, controls: RoadLaneId::new(1, -1), stop_location: Vec3::xy(25.0, 1.75) };
        ActorSnapshot::traffic_light(ActorId(9), Transform::new(Vec3::xy(25.0, 5.0), Rotation::default()), info)
    }

    #[test]
    fn walker_ahead_triggers_emergency_brake() {
        let w = world_with(&[-1, 1], &[walker_at(16.0)]);
        let mut a = agent(&w);
        let mut rec = Recorder::default();

        let StepOutcome::Continue(c) = a.run_step(&mut rec).unwrap() else { panic!("session ended") };
        assert_eq!(c.throttle, 0.0);
        assert_eq!(c.brake, 1.0);
        assert_eq!(a.context().hazards.severity(Hazard::PEDESTRIAN), Some(Severity::EMERGENCY));
        assert_eq!(rec.saw(Phase::end(Phase::HAZARD)), 1);
        assert_eq!(rec.saw(Phase::end(Phase::EMERGENCY)), 1);
        assert_eq!(rec.saw(Phase::begin(Phase::TAKE_NORMAL_STEP)), 0);
        assert_eq!(rec.phases.last(), Some(&Phase::end(Phase::EXECUTION)));
        assert!(matches!(rec.signals.as_slice(), [Signal::EmergencyStop { .. }]));
    }

    #[test]
    fn repeated_emergency_still_brakes() {
        let w = world_with(&[-1, 1], &[walker_at(16.0)]);
        let escalate = Rule::builder("escalate")
            .phase(Phase::begin(Phase::EMERGENCY))
            .on_true(|ctx| Err(Signal::emergency(&ctx.hazards)))
            .build()
            .unwrap();
        let mut a = builder(&w).rule(escalate).build().unwrap();
        let mut rec = Recorder::default();

        let StepOutcome::Continue(c) = a.run_step(&mut rec).unwrap() else { panic!("session ended") };
        assert_eq!(c.throttle, 0.0);
        assert_eq!(c.brake, 1.0);
        assert_eq!(w.applied_controls()[0].2, c);
        assert_eq!(rec.signals.len(), 2);
        assert_eq!(rec.saw(Phase::end(Phase::EMERGENCY)), 0);
    }

    #[test]
    fn walker_beside_the_lane_is_ignored() {
        let beside = ActorSnapshot::walker(ActorId(7), Transform::new(Vec3::xy(16.0, 8.0), Rotation::default()));
        let w = world_with(&[-1, 1], &[beside]);
        let mut a = agent(&w);
        assert_eq!(a.run_step(&mut NoopObserver).unwrap(), StepOutcome::Continue(CRUISE));
        assert!(a.context().hazards.is_empty());
    }

    #[test]
    fn hazard_rule_can_resolve_and_resume_the_cycle() {
        let w = world_with(&[-1, 1], &[walker_at(16.0)]);
        let rule = Rule::builder("wave_through")
            .phase(Phase::end(Phase::HAZARD))
            .on_true(|ctx| {
                ctx.discard_hazard(Hazard::PEDESTRIAN);
                Ok(RuleValue::Unit)
            })
            .build()
            .unwrap();
        let mut a = builder(&w).rule(rule).build().unwrap();
        let mut rec = Recorder::default();

        assert_eq!(a.run_step(&mut rec).unwrap(), StepOutcome::Continue(CRUISE));
        assert_eq!(rec.saw(Phase::begin(Phase::DETECT_CARS)), 1);
        assert_eq!(rec.saw(Phase::begin(Phase::EMERGENCY)), 0);
    }

    #[test]
    fn red_light_stops_green_does_not() {
        let w = world_with(&[-1, 1], &[light(LightState::Red)]);
        let mut a = agent(&w);
        let StepOutcome::Continue(c) = a.run_step(&mut NoopObserver).unwrap() else { panic!("session ended") };
        assert!(c.is_braking());
        assert!(a.context().has_hazard(Hazard::TRAFFIC_LIGHT_RED));

        let w = world_with(&[-1, 1], &[light(LightState::Green)]);
        let mut a = agent(&w);
        assert_eq!(a.run_step(&mut NoopObserver).unwrap(), StepOutcome::Continue(CRUISE));
        assert!(!a.context().has_hazard(Hazard::TRAFFIC_LIGHT));
    }

    #[test]
    fn traffic_light_result_is_handed_to_the_end_phase() {
        let w = world_with(&[-1, 1], &[light(LightState::Yellow)]);
        let seen = Arc::new(std::sync::Mutex::new(None));
        let sink = Arc::clone(&seen);
        let rule = Rule::builder("look")
            .phase(Phase::end(Phase::DETECT_TRAFFIC_LIGHTS))
            .on_true(move |ctx| {
                *sink.lock().unwrap() = ctx.prior_result.clone();
                Ok(RuleValue::Unit)
            })
            .build()
            .unwrap();
        let mut a = builder(&w).rule(rule).build().unwrap();
        a.run_step(&mut NoopObserver).unwrap();

        let prior = seen.lock().unwrap().clone().unwrap();
        let tl = prior.as_traffic_light().unwrap();
        assert!(tl.found);
        assert_eq!(tl.state, Some(LightState::Yellow));
        assert_eq!(tl.light, Some(ActorId(9)));
        assert!((tl.distance - 15.0).abs() < 1e-3);
    }

    #[test]
    fn close_car_ahead_is_an_emergency() {
        let car = ActorSnapshot::vehicle(ActorId(3), on_lane(16.0));
        let w = world_with(&[-1, 1], &[car]);
        let mut a = agent(&w);
        let mut rec = Recorder::default();
        let StepOutcome::Continue(c) = a.run_step(&mut rec).unwrap() else { panic!("session ended") };
        assert_eq!(c.brake, 1.0);
        assert!(a.context().has_hazard(Hazard::CAR));
        assert_eq!(rec.saw(Phase::begin(Phase::CAR_DETECTED)), 1);
        assert_eq!(rec.saw(Phase::end(Phase::CAR_DETECTED)), 0);
    }

    #[test]
    fn car_ahead_sets_following_speed() {
        let car = ActorSnapshot::vehicle(ActorId(3), on_lane(30.0));
        let w = ScriptedWorld::new(road(&[-1, 1]), 0.1);
        w.spawn(ActorSnapshot::vehicle(EGO, on_lane(10.0)).with_velocity(Vec3::xy(10.0, 0.0)));
        w.spawn(car);
        let w = Arc::new(w);
        let mut a = agent(&w);
        let mut rec = Recorder::default();

        assert_eq!(a.run_step(&mut rec).unwrap(), StepOutcome::Continue(CRUISE));
        assert_eq!(rec.saw(Phase::end(Phase::CAR_DETECTED)), 1);
        assert_eq!(rec.saw(Phase::begin(Phase::TAKE_NORMAL_STEP)), 0);
        // Closing at 10 m/s with 15.2 m left is inside the safety time.
        assert_eq!(a.context().inputs.target_speed_kmh, 0.0);
    }
}

// ── Emergency policy ──────────────────────────────────────────────────────────

#[cfg(test)]
mod emergency {
    use super::*;
    use proptest::prelude::*;

    fn hazards() -> HazardSet {
        [(Hazard::PEDESTRIAN, Severity::EMERGENCY)].into_iter().collect()
    }

    #[test]
    fn ignore_all_keeps_base_control() {
        let s = EmergencySettings { ignore_percentage: 100.0, ..Default::default() };
        let mut rng = AgentRng::from_seed(1);
        assert_eq!(emergency_control(CRUISE, &hazards(), &s, &mut rng), CRUISE);
    }

    #[test]
    fn certain_modify_chance_flips_hand_brake() {
        let s = EmergencySettings { hand_brake: false, hand_brake_modify_chance: 100.0, ..Default::default() };
        let mut rng = AgentRng::from_seed(1);
        assert!(emergency_control(CRUISE, &hazards(), &s, &mut rng).hand_brake);
    }

    proptest! {
        #[test]
        fn braking_policy_holds(seed in any::<u64>(), max_brake in 0.0f32..=1.0, half in 0.0f32..0.5) {
            let s = EmergencySettings {
                max_brake,
                do_random_steering: true,
                random_steer_range: [-half, half],
                ..Default::default()
            };
            let mut rng = AgentRng::from_seed(seed);
            let c = emergency_control(CRUISE, &hazards(), &s, &mut rng);
            prop_assert_eq!(c.throttle, 0.0);
            prop_assert_eq!(c.brake, max_brake);
            prop_assert!(c.steer >= -half && c.steer <= half);
            prop_assert!(!c.hand_brake);
        }

        #[test]
        fn following_never_exceeds_cruise(ego in 0.0f32..120.0, leader in 0.0f32..120.0, gap in 0.0f32..100.0) {
            let s = AgentSettings::default();
            let v = detect::following_speed(ego, leader, gap, 50.0, &s);
            prop_assert!(v >= 0.0);
            prop_assert!(v <= s.target_speed(50.0));
        }
    }
}

// ── Blocking rules ────────────────────────────────────────────────────────────

#[cfg(test)]
mod blocking {
    use super::*;

    #[test]
    fn takeover_advances_the_world_exactly_ten_ticks() {
        let w = world();
        let hold = Rule::blocking("hold")
            .phase(Phase::begin(Phase::TAKE_NORMAL_STEP))
            .budget(50)
            .condition(|ctx: &Context| ctx.tick < Tick(10))
            .on_true(|_| Ok(RuleValue::Unit))
            .build()
            .unwrap();
        let mut a = builder(&w).rule(hold).build().unwrap();
        let mut rec = Recorder::default();

        let out = a.run_step(&mut rec).unwrap();
        assert_eq!(out, StepOutcome::Continue(CRUISE));
        assert_eq!(w.current_tick(), Tick(10));
        assert_eq!(a.tick(), Tick(10));
        assert!(matches!(rec.signals.as_slice(), [Signal::SkipInnerLoop { .. }]));
        // Ten inside the takeover, one for the outer tick.
        assert_eq!(rec.applied.len(), 11);
        assert_eq!(w.applied_controls().len(), 11);
        assert_eq!(rec.applied.last().map(|&(t, _)| t), Some(Tick(10)));
        assert!(a.context().active_blocking.is_empty());
        // The takeover stops before any of the later phases run.
        assert_eq!(rec.saw(Phase::begin(Phase::RSS_EVALUATION)), 0);
    }

    #[test]
    fn takeover_refreshes_live_information() {
        let w = world();
        let hold = Rule::blocking("hold")
            .phase(Phase::begin(Phase::TAKE_NORMAL_STEP))
            .budget(3)
            .on_true(|_| Ok(RuleValue::Unit))
            .build()
            .unwrap();
        let mut a = builder(&w).rule(hold).build().unwrap();
        a.run_step(&mut NoopObserver).unwrap();

        let live = &a.context().live;
        let ego = live.ego.unwrap();
        assert_eq!(w.current_tick(), Tick(3));
        assert!(ego.location().x > 10.0);
        assert!(live.speed_kmh > 0.0);
    }
}

// ── Phase validation ──────────────────────────────────────────────────────────

#[cfg(test)]
mod strict {
    use super::*;

    #[test]
    fn out_of_order_phase_is_rejected() {
        let w = world();
        let mut a = agent(&w);
        let err = a.execute_phase(&mut NoopObserver, Phase::end(Phase::DETECT_CARS), None).unwrap_err();
        match err {
            AgentError::Core(CoreError::PhaseViolation { current, requested, expected }) => {
                assert_eq!(current, Phase::NONE);
                assert_eq!(requested, Phase::end(Phase::DETECT_CARS));
                assert_eq!(expected, Phase::begin(Phase::UPDATE_INFORMATION));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn user_controlled_stage_is_always_allowed() {
        let w = world();
        let mut a = agent(&w);
        let mut rec = Recorder::default();
        a.execute_phase(&mut rec, Phase::begin(Phase::CUSTOM_CYCLE), None).unwrap();
        a.execute_phase(&mut rec, Phase::end(Phase::CUSTOM_CYCLE), None).unwrap();
        assert_eq!(rec.phases, vec![Phase::begin(Phase::CUSTOM_CYCLE), Phase::end(Phase::CUSTOM_CYCLE)]);
    }

    #[test]
    fn alias_groups_are_never_a_phase() {
        let w = world();
        let mut a = agent(&w);
        let res = a.execute_phase(&mut NoopObserver, Phase::EXCEPTIONS | Phase::BEGIN, None);
        assert!(matches!(res, Err(AgentError::Core(_))));
    }

    #[test]
    fn lenient_mode_accepts_any_order() {
        let w = world();
        let settings = AgentSettings::default().with_override(|s| s.dispatch.strict_phases = false);
        let mut a = builder(&w).settings(settings).build().unwrap();
        assert!(a.execute_phase(&mut NoopObserver, Phase::end(Phase::DETECT_CARS), None).is_ok());
    }

    #[test]
    fn shutdown_runs_terminating_pair() {
        let w = world();
        let mut a = agent(&w);
        let mut rec = Recorder::default();
        a.run_step(&mut rec).unwrap();
        a.shutdown(&mut rec).unwrap();
        assert_eq!(&rec.phases[rec.phases.len() - 2..], [Phase::begin(Phase::TERMINATING), Phase::end(Phase::TERMINATING)]);
    }
}

// ── Detection matrix ──────────────────────────────────────────────────────────

#[cfg(test)]
mod matrix {
    use super::*;

    fn matrix_settings(mode: MatrixMode) -> AgentSettings {
        AgentSettings::default().with_override(|s| {
            s.matrix.mode = mode;
            s.matrix.async_sleep_ms = 5;
        })
    }

    #[test]
    fn sync_snapshot_reaches_the_context() {
        let other = ActorSnapshot::vehicle(ActorId(4), Transform::new(Vec3::xy(25.0, 5.25), Rotation::default()));
        let w = world_with(&[-1, -2, 1, 2], &[other]);
        let mut a = builder(&w).settings(matrix_settings(MatrixMode::Sync)).build().unwrap();
        a.run_step(&mut NoopObserver).unwrap();

        let report = a.context().live.matrix.clone().unwrap();
        assert_eq!(report.matrix.ego_position(), Some((RoadLaneId::new(1, -1), 3)));
        assert!(!report.on_highway);
        a.shutdown(&mut NoopObserver).unwrap();
    }

    #[test]
    fn matrix_off_leaves_no_snapshot() {
        let w = world_with(&[-1, -2, 1, 2], &[]);
        let mut a = agent(&w);
        a.run_step(&mut NoopObserver).unwrap();
        assert!(a.context().live.matrix.is_none());
    }

    #[test]
    fn background_worker_stops_on_shutdown() {
        let w = world_with(&[-1, -2, 1, 2], &[]);
        let mut a = builder(&w).settings(matrix_settings(MatrixMode::Async)).build().unwrap();
        a.run_step(&mut NoopObserver).unwrap();
        a.shutdown(&mut NoopObserver).unwrap();
        // Stopping twice is harmless.
        a.shutdown(&mut NoopObserver).unwrap();
    }
}

// ── Declared rules ────────────────────────────────────────────────────────────

#[cfg(test)]
mod declared {
    use super::*;

    const RULES: &str = r#"
[[rules]]
name     = "halt"
phases   = ["PLAN_PATH|END"]
priority = "HIGH"
action   = "halt"
"#;

    fn registry() -> RuleRegistry {
        let mut reg = RuleRegistry::new();
        reg.register_action("halt", |_| Err(Signal::SkipInnerLoop { control: VehicleControl::STOP }));
        reg
    }

    #[test]
    fn settings_rules_resolve_through_the_registry() {
        let w = world();
        let settings = AgentSettings::from_toml_str(RULES).unwrap();
        assert_eq!(settings.rules.len(), 1);
        let mut a = builder(&w).settings(settings).registry(registry()).build().unwrap();
        assert!(a.rules().get("halt").is_some());
        assert_eq!(a.run_step(&mut NoopObserver).unwrap(), StepOutcome::Continue(VehicleControl::STOP));
    }

    #[test]
    fn unknown_action_fails_the_build() {
        let w = world();
        let settings = AgentSettings::from_toml_str(RULES).unwrap();
        let res = builder(&w).settings(settings).build();
        assert!(matches!(res, Err(AgentError::Rule(RuleError::UnknownAction(n))) if n == "halt"));
    }

    #[test]
    fn agents_do_not_share_cooldowns() {
        let w = world();
        let rule = Rule::builder("rare")
            .phase(Phase::begin(Phase::PLAN_PATH))
            .cooldown(100)
            .on_true(|_| Ok(RuleValue::Unit))
            .build()
            .unwrap();
        let mut first = builder(&w).rule(rule.clone()).build().unwrap();
        let mut second = builder(&w).rule(rule).build().unwrap();
        first.run_step(&mut NoopObserver).unwrap();
        assert_eq!(first.context().fired, vec!["rare".to_owned()]);

        w.tick();
        first.run_step(&mut NoopObserver).unwrap();
        assert!(first.context().fired.is_empty());
        second.run_step(&mut NoopObserver).unwrap();
        assert_eq!(second.context().fired, vec!["rare".to_owned()]);
    }
}
