//! Read-only lane topology queries.

use ad_core::{LaneId, Location, RoadId, RoadLaneId, Rotation, Transform};

/// A point on a lane's centre line.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Waypoint {
    pub transform: Transform,
    pub road: RoadId,
    pub lane: LaneId,
    /// Distance along the road's reference line, metres.
    pub s: f32,
    pub lane_width: f32,
    pub is_junction: bool,
}

impl Waypoint {
    #[inline]
    pub fn location(&self) -> Location {
        self.transform.location
    }

    #[inline]
    pub fn rotation(&self) -> Rotation {
        self.transform.rotation
    }

    #[inline]
    pub fn road_lane(&self) -> RoadLaneId {
        RoadLaneId { road: self.road, lane: self.lane }
    }
}

/// Lane topology provider.
///
/// Implemented by the simulator binding and by [`LaneNetwork`][crate::LaneNetwork].
/// All queries are read-only; the map never changes during a session.
pub trait MapView: Send + Sync {
    /// Project `location` onto the nearest lane centre line.
    fn waypoint(&self, location: Location) -> Option<Waypoint>;

    /// Waypoints `distance` metres ahead along the direction of travel.
    /// Empty at a dead end; more than one entry at a fork.
    fn next(&self, wp: &Waypoint, distance: f32) -> Vec<Waypoint>;

    /// Waypoints `distance` metres behind.
    fn previous(&self, wp: &Waypoint, distance: f32) -> Vec<Waypoint>;

    /// The lane to the left of `wp` relative to its direction of travel.
    /// Crossing the centre line yields the first opposing lane.
    fn left_lane(&self, wp: &Waypoint) -> Option<Waypoint>;

    /// The lane to the right of `wp` relative to its direction of travel.
    fn right_lane(&self, wp: &Waypoint) -> Option<Waypoint>;

    /// Every lane id present on `road`, both directions, unsorted.
    fn road_lanes(&self, road: RoadId) -> Vec<LaneId>;

    /// Posted speed limit on `road` in km/h.
    fn speed_limit(&self, _road: RoadId) -> f32 {
        50.0
    }
}
