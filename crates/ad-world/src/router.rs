//! Route planning trait and a lane-following default.
//!
//! Global route planning belongs to the simulator tooling; the core only
//! needs a way to turn "drive to this location" into a waypoint queue.
//! Applications plug in their own planner through [`Router`].

use ad_core::{Location, RoadOption};

use crate::{MapView, Waypoint, WorldError, WorldResult};

/// A planned route: waypoints with the maneuver that reaches each.
pub type Route = Vec<(Waypoint, RoadOption)>;

/// Pluggable route planner.
pub trait Router: Send + Sync {
    /// Plan from `from` to the lane point nearest `to`.
    fn route(&self, map: &dyn MapView, from: &Waypoint, to: Location) -> WorldResult<Route>;
}

/// Follows the current lane (first successor at forks) until the
/// destination is within `arrive_radius`.
#[derive(Clone, Debug)]
pub struct LaneFollowRouter {
    /// Distance between consecutive route waypoints, metres.
    pub resolution: f32,
    pub arrive_radius: f32,
    pub max_steps: usize,
}

impl Default for LaneFollowRouter {
    fn default() -> Self {
        Self { resolution: 2.0, arrive_radius: 2.0, max_steps: 5_000 }
    }
}

impl Router for LaneFollowRouter {
    fn route(&self, map: &dyn MapView, from: &Waypoint, to: Location) -> WorldResult<Route> {
        let no_route = || WorldError::NoRoute { from: from.location(), to };
        let mut route = Route::new();
        let mut current = *from;

        for _ in 0..self.max_steps {
            if current.location().distance_2d(to) <= self.arrive_radius {
                return Ok(route);
            }
            let next = *map.next(&current, self.resolution).first().ok_or_else(no_route)?;
            let option = if next.is_junction { RoadOption::Straight } else { RoadOption::LaneFollow };
            route.push((next, option));
            current = next;
        }
        Err(no_route())
    }
}
