//! Road-shape queries used while placing vehicles.

use std::collections::HashSet;

use ad_core::{LaneId, Location, RoadId};
use ad_world::{MapView, Waypoint};

use crate::lanes::is_consecutive;

/// Farthest look-ahead, metres, when searching for the adjacent road.
const ROAD_LOOKAHEAD_M: u32 = 60;
const ROAD_LOOKAHEAD_STEP_M: usize = 5;

/// Lanes walked sideways before giving up on a perpendicular point.
const MAX_LATERAL_STEPS: usize = 16;

fn looks_like_highway(lanes: &[LaneId]) -> bool {
    lanes.len() >= 6 || (lanes.len() >= 3 && is_consecutive(lanes))
}

/// `true` if `wp`'s road, or the road of its left or right neighbour lane,
/// has at least six lanes or a gap-free run of at least three.
pub fn is_on_highway(map: &dyn MapView, wp: &Waypoint) -> bool {
    [Some(*wp), map.left_lane(wp), map.right_lane(wp)]
        .into_iter()
        .flatten()
        .any(|w| looks_like_highway(&map.road_lanes(w.road)))
}

/// The first different road found ahead (`forward`) or behind within 60 m,
/// returned only if its lane layout equals the current road's.
pub fn adjacent_road(map: &dyn MapView, wp: &Waypoint, forward: bool) -> Option<(RoadId, Vec<LaneId>)> {
    let found = (1..ROAD_LOOKAHEAD_M).step_by(ROAD_LOOKAHEAD_STEP_M).find_map(|d| {
        let near = if forward { map.next(wp, d as f32) } else { map.previous(wp, d as f32) };
        near.into_iter().next().filter(|w| w.road != wp.road)
    })?;

    let mut ours = map.road_lanes(wp.road);
    let mut theirs = map.road_lanes(found.road);
    ours.sort_unstable();
    theirs.sort_unstable();
    (ours == theirs).then_some((found.road, theirs))
}

/// Straight-line distance reduced by the lateral component.
///
/// Walks sideways from `ego_wp` to the lane `other` is on; the distance to
/// that lane's point is treated as the lateral leg.  Falls back to the plain
/// distance if the lane cannot be reached.
pub fn longitudinal_distance(map: &dyn MapView, ego: Location, ego_wp: &Waypoint, other: Location, other_wp: &Waypoint) -> f32 {
    let direct = ego.distance(other);
    if ego_wp.lane == other_wp.lane {
        return direct;
    }
    let Some(beside) = walk_to_lane(map, ego_wp, other_wp.lane) else {
        return direct;
    };
    let lateral = ego.distance(beside.location());
    (direct * direct - lateral * lateral).abs().sqrt()
}

fn walk_to_lane(map: &dyn MapView, from: &Waypoint, lane: LaneId) -> Option<Waypoint> {
    let sides: [fn(&dyn MapView, &Waypoint) -> Option<Waypoint>; 2] =
        [|m, w| m.left_lane(w), |m, w| m.right_lane(w)];
    for step in sides {
        let mut seen = HashSet::from([from.lane]);
        let mut cur = *from;
        for _ in 0..MAX_LATERAL_STEPS {
            let Some(next) = step(map, &cur) else { break };
            if next.lane == lane {
                return Some(next);
            }
            if !seen.insert(next.lane) {
                break;
            }
            cur = next;
        }
    }
    None
}

/// Road ids of a highway entry/exit, supplied by the caller.
///
/// Vehicles on any of these roads are reported separately instead of being
/// placed in the matrix.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HighwayShape {
    pub entry_roads: Vec<RoadId>,
    pub exit_roads: Vec<RoadId>,
}

impl HighwayShape {
    pub fn is_ramp(&self, road: RoadId) -> bool {
        self.entry_roads.contains(&road) || self.exit_roads.contains(&road)
    }
}
