//! Local waypoint queue fed by a pluggable [`Router`].

use std::collections::VecDeque;
use std::sync::Arc;

use tracing::debug;

use ad_core::{Location, RoadOption, Transform};
use ad_world::{MapView, Route, Router, Waypoint};

use crate::error::AgentResult;
use crate::settings::PlannerSettings;

/// The waypoints ego still has to reach, nearest first.
pub struct LocalPlanner {
    queue: VecDeque<(Waypoint, RoadOption)>,
    router: Arc<dyn Router>,
    settings: PlannerSettings,
    destination: Option<Location>,
}

impl LocalPlanner {
    pub fn new(router: Arc<dyn Router>, settings: PlannerSettings) -> Self {
        Self { queue: VecDeque::new(), router, settings, destination: None }
    }

    /// Replace the plan with a route from `from` to `to`.  Returns the
    /// number of queued waypoints.
    pub fn set_destination(&mut self, map: &dyn MapView, from: &Waypoint, to: Location) -> AgentResult<usize> {
        let route = self.router.route(map, from, to)?;
        self.destination = Some(to);
        self.set_plan(route);
        debug!(%to, waypoints = self.queue.len(), "route planned");
        Ok(self.queue.len())
    }

    pub fn set_plan(&mut self, route: Route) {
        self.queue = route.into();
    }

    pub fn destination(&self) -> Option<Location> {
        self.destination
    }

    pub fn done(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Drop waypoints ego has reached or already passed.
    pub fn advance_to(&mut self, ego: &Transform) {
        let forward = ego.forward_vector();
        while let Some((wp, _)) = self.queue.front() {
            let offset = wp.location() - ego.location;
            let reached = offset.length() < self.settings.min_distance_m;
            let behind = offset.dot_2d(forward) < 0.0;
            if !(reached || behind) {
                break;
            }
            self.queue.pop_front();
        }
    }

    /// Next waypoint to steer at.
    pub fn target(&self) -> Option<Waypoint> {
        self.queue.front().map(|&(wp, _)| wp)
    }

    /// The waypoint `steps` ahead in the queue, or the last one if the
    /// queue is shorter.
    pub fn incoming(&self, steps: usize) -> Option<(Waypoint, RoadOption)> {
        self.queue.get(steps).or_else(|| self.queue.back()).copied()
    }
}

impl std::fmt::Debug for LocalPlanner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalPlanner")
            .field("queued", &self.queue.len())
            .field("destination", &self.destination)
            .finish_non_exhaustive()
    }
}
