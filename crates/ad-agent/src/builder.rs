//! Fluent builder for constructing an [`Agent`].

use std::sync::Arc;

use tracing::info;

use ad_core::{ActorId, AgentRng, Location, Phase};
use ad_matrix::{BuildOptions, MatrixMode, MatrixUpdater, MatrixWorker, SyncMatrix, WorldMatrixSource};
use ad_rules::{Context, Rule, RuleRegistry, RuleSetTemplate};
use ad_world::{Controller, LaneFollowRouter, ProportionalController, Router, World};

use crate::agent::{Agent, Drive};
use crate::error::AgentResult;
use crate::planner::LocalPlanner;
use crate::settings::AgentSettings;

/// Fluent builder for [`Agent<W>`].
///
/// # Required inputs
///
/// - `world: Arc<W>`: the world ego drives in
/// - `ego`: ego's actor id; must already be spawned
///
/// # Optional inputs (have defaults)
///
/// | Method               | Default                                         |
/// |----------------------|-------------------------------------------------|
/// | `.settings(s)`       | `AgentSettings::default()`                      |
/// | `.controller(c)`     | `ProportionalController::default()`             |
/// | `.router(r)`         | `LaneFollowRouter` at the planner's resolution  |
/// | `.rules(t)`          | No coded rules                                  |
/// | `.registry(r)`       | `RuleRegistry::new()` (built-ins only)          |
/// | `.destination(loc)`  | None; the first step ends the session           |
/// | `.matrix_options(o)` | `BuildOptions::default()`                       |
///
/// Rules listed in `settings.rules` are resolved through the registry and
/// appended after the coded ones.
///
/// # Example
///
/// ```rust,ignore
/// let mut agent = AgentBuilder::new(Arc::clone(&world), ego)
///     .settings(AgentSettings::load(path)?)
///     .rules(&template)
///     .destination(Vec3::xy(180.0, 1.75))
///     .build()?;
/// agent.run(1_000, &mut NoopObserver)?;
/// ```
pub struct AgentBuilder<W: World> {
    world: Arc<W>,
    ego: ActorId,
    settings: AgentSettings,
    controller: Option<Arc<dyn Controller>>,
    router: Option<Arc<dyn Router>>,
    template: RuleSetTemplate,
    registry: RuleRegistry,
    destination: Option<Location>,
    matrix_options: BuildOptions,
}

impl<W: World> AgentBuilder<W> {
    pub fn new(world: Arc<W>, ego: ActorId) -> Self {
        Self {
            world,
            ego,
            settings: AgentSettings::default(),
            controller: None,
            router: None,
            template: RuleSetTemplate::new(),
            registry: RuleRegistry::new(),
            destination: None,
            matrix_options: BuildOptions::default(),
        }
    }

    pub fn settings(mut self, settings: AgentSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn controller(mut self, controller: impl Controller + 'static) -> Self {
        self.controller = Some(Arc::new(controller));
        self
    }

    pub fn router(mut self, router: impl Router + 'static) -> Self {
        self.router = Some(Arc::new(router));
        self
    }

    /// Append the prototypes of `template`.
    pub fn rules(mut self, template: &RuleSetTemplate) -> Self {
        self.template.extend(template);
        self
    }

    pub fn rule(mut self, rule: Rule) -> Self {
        self.template.push(rule);
        self
    }

    /// Conditions and actions that `settings.rules` may name.
    pub fn registry(mut self, registry: RuleRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn destination(mut self, to: Location) -> Self {
        self.destination = Some(to);
        self
    }

    pub fn matrix_options(mut self, opts: BuildOptions) -> Self {
        self.matrix_options = opts;
        self
    }

    /// Validate the settings, materialise the rule table and start the
    /// detection matrix.
    pub fn build(self) -> AgentResult<Agent<W>> {
        self.settings.validate()?;
        let settings = Arc::new(self.settings);
        let mut rng = AgentRng::new(settings.seed, self.ego);

        let registry = self.registry.with_default_budget(settings.dispatch.blocking_budget);
        let mut template = self.template;
        template.extend(&RuleSetTemplate::from_specs(&settings.rules, &registry)?);
        let rules = template.materialize(rng.child(1))?;

        let source = || {
            WorldMatrixSource::new(Arc::clone(&self.world), self.ego, settings.matrix)
                .with_options(self.matrix_options.clone())
        };
        let matrix: Option<Box<dyn MatrixUpdater>> = match settings.matrix.mode {
            MatrixMode::Off => None,
            MatrixMode::Sync => Some(Box::new(SyncMatrix::new(source(), settings.matrix.sync_interval_ticks))),
            MatrixMode::Async => Some(Box::new(MatrixWorker::spawn(source(), settings.matrix.sleep())?)),
        };

        let controller: Arc<dyn Controller> = match self.controller {
            Some(c) => c,
            None => Arc::new(ProportionalController::default()),
        };
        let router: Arc<dyn Router> = match self.router {
            Some(r) => r,
            None => Arc::new(LaneFollowRouter {
                resolution: settings.planner.sampling_resolution_m,
                ..LaneFollowRouter::default()
            }),
        };
        let planner = LocalPlanner::new(router, settings.planner.clone());

        info!(ego = %self.ego, rules = rules.len(), matrix = ?settings.matrix.mode, "agent built");

        let mut agent = Agent {
            ctx: Context::new(self.world.current_tick(), Arc::clone(&controller)),
            drive: Drive { world: self.world, ego: self.ego, settings, planner, matrix },
            rules,
            rng,
            controller,
            last_phase: Phase::NONE,
            cycle_phase: Phase::NONE,
            braked: false,
        };
        if let Some(to) = self.destination {
            agent.set_destination(to)?;
        }
        Ok(agent)
    }
}
