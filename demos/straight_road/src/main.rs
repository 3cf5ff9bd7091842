//! straight_road: one ego vehicle on a four-lane road.
//!
//! Ego waits at the start line for two seconds (a blocking rule), then
//! drives towards the far end behind a slow leader.  An overtaking car
//! shows up in the detection matrix, a school zone caps the cruise speed and
//! a walker crosses the road further down.  Hazards are reported by a rule
//! declared in the embedded settings file.
//!
//! `RUST_LOG=ad_agent=debug` shows every signal and fired rule.  Ctrl-C
//! stops the matrix workers and ends the drive at the next tick.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Result;
use tracing::info;
use tracing_subscriber::EnvFilter;

use ad_agent::{AgentBuilder, AgentError, AgentObserver, AgentSettings};
use ad_core::{ActorId, Phase, Rotation, Tick, Transform, Vec3, VehicleControl};
use ad_rules::{Context, Rule, RuleRegistry, RuleSetTemplate, RuleValue, Signal};
use ad_world::{ActorSnapshot, LaneNetwork, LaneNetworkBuilder, Road, ScriptedWorld, World};

// ── Constants ─────────────────────────────────────────────────────────────────

const EGO:            ActorId = ActorId(1);
const DELTA_SECS:     f32     = 0.1;
const MAX_TICKS:      u64     = 3_000;
const ROAD_LENGTH_M:  f32     = 400.0;
const HOLD_TICKS:     u64     = 20;           // 2 s at the start line
const SCHOOL_ZONE:    (f32, f32) = (120.0, 170.0);
const SCHOOL_ZONE_KMH: f32    = 15.0;

/// Set by the Ctrl-C handler.
static INTERRUPTED: AtomicBool = AtomicBool::new(false);

const SETTINGS_TOML: &str = r#"
seed = 7

[speed]
target_speed_kmh = 40.0

[matrix]
mode                = "sync"
sync_interval_ticks = 5

[[rules]]
name        = "report_hazards"
description = "Log every hazard the detectors raise"
phases      = ["HAZARD|BEGIN"]
cooldown    = 10
action      = "report_hazards"
"#;

// ── Scene ─────────────────────────────────────────────────────────────────────

/// Lane `-1` centre at `x`, heading along the road.
fn lane_1(x: f32) -> Transform {
    Transform::new(Vec3::xy(x, 1.75), Rotation::yaw(0.0))
}

fn build_road() -> Result<LaneNetwork> {
    let mut b = LaneNetworkBuilder::new();
    b.add_road(Road::straight(1, Vec3::ZERO, 0.0, ROAD_LENGTH_M).lanes(&[-1, -2, 1, 2]).speed_limit(50.0));
    Ok(b.build()?)
}

fn populate(world: &ScriptedWorld) {
    world.spawn(ActorSnapshot::vehicle(EGO, lane_1(10.0)));
    // Slow leader in ego's lane.
    world.spawn(ActorSnapshot::vehicle(ActorId(2), lane_1(70.0)).with_velocity(Vec3::xy(4.0, 0.0)));
    // Overtaking in lane -2.
    world.spawn(
        ActorSnapshot::vehicle(ActorId(3), Transform::new(Vec3::xy(30.0, 5.25), Rotation::yaw(0.0)))
            .with_velocity(Vec3::xy(9.0, 0.0)),
    );
    world.spawn(
        ActorSnapshot::walker(ActorId(10), Transform::new(Vec3::xy(260.0, 12.0), Rotation::yaw(-90.0)))
            .with_velocity(Vec3::xy(0.0, -1.2)),
    );
}

// ── Rules ─────────────────────────────────────────────────────────────────────

fn coded_rules() -> Result<RuleSetTemplate> {
    let wait = Rule::blocking("wait_at_start")
        .describe("Hold ego at the start line")
        .phase(Phase::end(Phase::PLAN_PATH))
        .budget(HOLD_TICKS as u32 + 5)
        .condition(|ctx: &Context| ctx.tick < Tick(HOLD_TICKS))
        .on_true(|ctx| {
            ctx.control = Some(VehicleControl::STOP);
            Ok(RuleValue::Control(VehicleControl::STOP))
        })
        .build()?;

    let school_zone = Rule::builder("school_zone")
        .phase(Phase::begin(Phase::TAKE_NORMAL_STEP))
        .condition(|ctx: &Context| {
            ctx.live.ego.is_some_and(|e| (SCHOOL_ZONE.0..SCHOOL_ZONE.1).contains(&e.location().x))
        })
        .on_true(|ctx| {
            ctx.inputs.target_speed_kmh = ctx.inputs.target_speed_kmh.min(SCHOOL_ZONE_KMH);
            Ok(RuleValue::Unit)
        })
        .build()?;

    let interrupt = Rule::builder("stop_on_interrupt")
        .describe("End the drive after Ctrl-C")
        .phase(Phase::begin(Phase::UPDATE_INFORMATION))
        .condition(|_: &Context| INTERRUPTED.load(Ordering::Relaxed))
        .on_true(|_| Err(Signal::UserInterrupt))
        .build()?;

    Ok(RuleSetTemplate::new().with(wait).with(school_zone).with(interrupt))
}

fn registry() -> RuleRegistry {
    let mut reg = RuleRegistry::new();
    reg.register_action("report_hazards", |ctx| {
        info!(tick = %ctx.tick, hazards = %ctx.hazards, "hazards ahead");
        Ok(RuleValue::Unit)
    });
    reg
}

// ── Observer ──────────────────────────────────────────────────────────────────

#[derive(Default)]
struct DriveStats {
    ticks: u64,
    controls: u64,
    emergencies: u64,
    following: u64,
    school_zone: u64,
    top_speed_kmh: f32,
}

impl AgentObserver for DriveStats {
    fn on_tick_start(&mut self, _tick: Tick) {
        self.ticks += 1;
    }

    fn on_phase(&mut self, phase: Phase, ctx: &Context) {
        if phase == Phase::begin(Phase::CAR_DETECTED) {
            self.following += 1;
        }
        if phase == Phase::end(Phase::EXECUTION) {
            self.top_speed_kmh = self.top_speed_kmh.max(ctx.live.speed_kmh);
            if ctx.fired.iter().any(|r| r == "school_zone") {
                self.school_zone += 1;
            }
        }
    }

    fn on_signal(&mut self, _tick: Tick, signal: &Signal) {
        if matches!(signal, Signal::EmergencyStop { .. }) {
            self.emergencies += 1;
        }
    }

    fn on_control_applied(&mut self, _tick: Tick, _control: &VehicleControl) {
        self.controls += 1;
    }

    fn on_session_end(&mut self, tick: Tick) {
        info!(%tick, "destination reached");
    }
}

// ── main ──────────────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("straight_road=info,ad_agent=info")),
        )
        .init();

    ctrlc::set_handler(|| {
        INTERRUPTED.store(true, Ordering::Relaxed);
        ad_matrix::shutdown::stop_all();
    })?;

    println!("=== straight_road ===");

    // 1. World.
    let world = Arc::new(ScriptedWorld::new(build_road()?, DELTA_SECS));
    populate(&world);

    // 2. Settings: embedded file, then a runtime override.
    let settings = AgentSettings::from_toml_str(SETTINGS_TOML)?.with_override(|s| s.dispatch.replan_warn_after = 3);
    println!(
        "Target speed: {} km/h  |  Matrix: {:?}  |  Declared rules: {}",
        settings.speed.target_speed_kmh,
        settings.matrix.mode,
        settings.rules.len()
    );

    // 3. Agent.
    let mut agent = AgentBuilder::new(Arc::clone(&world), EGO)
        .settings(settings)
        .rules(&coded_rules()?)
        .registry(registry())
        .destination(Vec3::xy(ROAD_LENGTH_M - 20.0, 1.75))
        .build()?;
    println!("Rules: {}  |  Route: {} waypoints", agent.rules().len(), agent.planner().len());
    println!();

    // 4. Drive.
    let mut stats = DriveStats::default();
    let steps = match agent.run(MAX_TICKS, &mut stats) {
        Ok(steps) => steps,
        Err(AgentError::Interrupted) => {
            info!(tick = %world.current_tick(), "interrupted");
            stats.ticks
        }
        Err(e) => return Err(e.into()),
    };

    if let Some(report) = &agent.context().live.matrix {
        println!("Last detection matrix:");
        println!("{}", report.matrix);
    }
    agent.shutdown(&mut stats)?;
    // Workers of any agent dropped without a shutdown.
    ad_matrix::shutdown::stop_all();

    // 5. Summary.
    let ego_x = agent.context().live.ego.map_or(0.0, |e| e.location().x);
    println!("Steps:            {steps}");
    println!("Simulation ticks: {}", world.current_tick());
    println!("Controls applied: {}", stats.controls);
    println!("Ticks following:  {}", stats.following);
    println!("In school zone:   {}", stats.school_zone);
    println!("Emergency stops:  {}", stats.emergencies);
    println!("Top speed:        {:.1} km/h", stats.top_speed_kmh);
    println!("Final position:   x = {ego_x:.1} m");
    println!("Outer ticks:      {}", stats.ticks);
    Ok(())
}
