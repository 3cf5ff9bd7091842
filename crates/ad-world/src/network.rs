//! In-memory lane network of straight road segments.
//!
//! # Geometry
//!
//! Each road is a straight reference line from `origin` along `heading`.
//! Negative lane ids lie to the right of the reference line and travel along
//! it; positive lane ids lie to the left and travel against it.  Lane `±k`
//! is centred `(k - 0.5) * lane_width` from the reference line.
//!
//! Roads chain through `successor` / `predecessor` links; a lane continues
//! onto the linked road only if that road has the same lane id.
//!
//! # Spatial index
//!
//! An R-tree (via `rstar`) holds lane centre-line samples every metre and
//! answers "which lane is this location on".  The exact waypoint is then
//! obtained by projecting onto the road's reference line.

use std::collections::BTreeMap;

use rstar::{PointDistance, RTree, RTreeObject, AABB};

use ad_core::{LaneId, Location, RoadId, Rotation, Transform, Vec3};

use crate::{MapView, Waypoint, WorldError, WorldResult};

/// Spacing of centre-line samples in the R-tree, metres.
const SAMPLE_SPACING_M: f32 = 1.0;

/// Guard against link cycles when walking across many short roads.
const MAX_ROAD_HOPS: usize = 64;

// ── R-tree entry ──────────────────────────────────────────────────────────────

#[derive(Clone)]
struct LaneSample {
    point: [f32; 2],
    road: RoadId,
    lane: LaneId,
}

impl RTreeObject for LaneSample {
    type Envelope = AABB<[f32; 2]>;
    fn envelope(&self) -> Self::Envelope {
        AABB::from_point(self.point)
    }
}

impl PointDistance for LaneSample {
    fn distance_2(&self, point: &[f32; 2]) -> f32 {
        let dx = self.point[0] - point[0];
        let dy = self.point[1] - point[1];
        dx * dx + dy * dy
    }
}

// ── Road ──────────────────────────────────────────────────────────────────────

/// One straight road segment.
#[derive(Clone, Debug)]
pub struct Road {
    pub id: RoadId,
    pub origin: Location,
    pub heading_deg: f32,
    pub length: f32,
    pub lanes: Vec<LaneId>,
    pub lane_width: f32,
    pub speed_limit_kmh: f32,
    pub is_junction: bool,
    pub successor: Option<RoadId>,
    pub predecessor: Option<RoadId>,
}

impl Road {
    /// A straight road with no lanes; add them with [`lanes`](Self::lanes).
    pub fn straight(id: i32, origin: Location, heading_deg: f32, length: f32) -> Self {
        Self {
            id: RoadId(id),
            origin,
            heading_deg,
            length,
            lanes: Vec::new(),
            lane_width: 3.5,
            speed_limit_kmh: 50.0,
            is_junction: false,
            successor: None,
            predecessor: None,
        }
    }

    pub fn lanes(mut self, ids: &[i32]) -> Self {
        self.lanes = ids.iter().copied().map(LaneId).collect();
        self
    }

    pub fn speed_limit(mut self, kmh: f32) -> Self {
        self.speed_limit_kmh = kmh;
        self
    }

    pub fn junction(mut self) -> Self {
        self.is_junction = true;
        self
    }

    #[inline]
    fn forward(&self) -> Vec3 {
        Rotation::yaw(self.heading_deg).forward_vector()
    }

    #[inline]
    fn has_lane(&self, lane: LaneId) -> bool {
        self.lanes.contains(&lane)
    }

    /// Signed lateral offset of a lane centre, positive to the right.
    fn lane_offset(&self, lane: LaneId) -> f32 {
        let k = lane.0.unsigned_abs() as f32 - 0.5;
        if lane.0 < 0 { k * self.lane_width } else { -k * self.lane_width }
    }

    fn waypoint_at(&self, lane: LaneId, s: f32) -> Waypoint {
        let s = s.clamp(0.0, self.length);
        let right = Rotation::yaw(self.heading_deg).right_vector();
        let location = self.origin + self.forward() * s + right * self.lane_offset(lane);
        let yaw = if travels_forward(lane) { self.heading_deg } else { self.heading_deg + 180.0 };
        Waypoint {
            transform: Transform::new(location, Rotation::yaw(yaw)),
            road: self.id,
            lane,
            s,
            lane_width: self.lane_width,
            is_junction: self.is_junction,
        }
    }

    /// Distance along the reference line of the projection of `location`.
    fn project(&self, location: Location) -> f32 {
        (location - self.origin).dot_2d(self.forward()).clamp(0.0, self.length)
    }
}

#[inline]
fn travels_forward(lane: LaneId) -> bool {
    lane.0 < 0
}

/// Lane to the left relative to the lane's own direction of travel.
fn left_of(lane: LaneId) -> LaneId {
    if lane.0.abs() == 1 { LaneId(-lane.0) } else { LaneId(lane.0 - lane.0.signum()) }
}

fn right_of(lane: LaneId) -> LaneId {
    LaneId(lane.0 + lane.0.signum())
}

// ── LaneNetwork ───────────────────────────────────────────────────────────────

/// Lane topology plus a spatial index for waypoint snapping.
///
/// Do not construct directly; use [`LaneNetworkBuilder`].
pub struct LaneNetwork {
    roads: BTreeMap<RoadId, Road>,
    spatial_idx: RTree<LaneSample>,
}

impl LaneNetwork {
    pub fn road(&self, id: RoadId) -> Option<&Road> {
        self.roads.get(&id)
    }

    pub fn road_count(&self) -> usize {
        self.roads.len()
    }

    /// Waypoint on `(road, lane)` at distance `s` along the reference line.
    pub fn waypoint_on(&self, road: RoadId, lane: LaneId, s: f32) -> WorldResult<Waypoint> {
        let r = self.roads.get(&road).ok_or(WorldError::RoadNotFound(road))?;
        if !r.has_lane(lane) {
            return Err(WorldError::LaneNotFound(ad_core::RoadLaneId { road, lane }));
        }
        Ok(r.waypoint_at(lane, s))
    }

    /// Walk `distance` metres from `wp`, `ahead` meaning along its direction of
    /// travel, hopping onto linked roads as needed.
    fn walk(&self, wp: &Waypoint, distance: f32, ahead: bool) -> Option<Waypoint> {
        let lane = wp.lane;
        let mut road = self.roads.get(&wp.road)?;
        let mut s = wp.s;
        let mut remaining = distance;
        // Moving with increasing s?
        let increasing = travels_forward(lane) == ahead;

        for _ in 0..MAX_ROAD_HOPS {
            let target = if increasing { s + remaining } else { s - remaining };
            if (0.0..=road.length).contains(&target) {
                return Some(road.waypoint_at(lane, target));
            }
            let link = if increasing { road.successor } else { road.predecessor }?;
            let next = self.roads.get(&link)?;
            if !next.has_lane(lane) {
                return None;
            }
            if increasing {
                remaining = target - road.length;
                s = 0.0;
            } else {
                remaining = -target;
                s = next.length;
            }
            road = next;
        }
        None
    }

    fn neighbour(&self, wp: &Waypoint, lane: LaneId) -> Option<Waypoint> {
        let road = self.roads.get(&wp.road)?;
        road.has_lane(lane).then(|| road.waypoint_at(lane, wp.s))
    }
}

impl MapView for LaneNetwork {
    fn waypoint(&self, location: Location) -> Option<Waypoint> {
        let sample = self.spatial_idx.nearest_neighbor(&[location.x, location.y])?;
        let road = self.roads.get(&sample.road)?;
        Some(road.waypoint_at(sample.lane, road.project(location)))
    }

    fn next(&self, wp: &Waypoint, distance: f32) -> Vec<Waypoint> {
        self.walk(wp, distance, true).into_iter().collect()
    }

    fn previous(&self, wp: &Waypoint, distance: f32) -> Vec<Waypoint> {
        self.walk(wp, distance, false).into_iter().collect()
    }

    fn left_lane(&self, wp: &Waypoint) -> Option<Waypoint> {
        self.neighbour(wp, left_of(wp.lane))
    }

    fn right_lane(&self, wp: &Waypoint) -> Option<Waypoint> {
        self.neighbour(wp, right_of(wp.lane))
    }

    fn road_lanes(&self, road: RoadId) -> Vec<LaneId> {
        self.roads.get(&road).map(|r| r.lanes.clone()).unwrap_or_default()
    }

    fn speed_limit(&self, road: RoadId) -> f32 {
        self.roads.get(&road).map_or(50.0, |r| r.speed_limit_kmh)
    }
}

// ── LaneNetworkBuilder ────────────────────────────────────────────────────────

/// Construct a [`LaneNetwork`] incrementally, then call [`build`](Self::build).
///
/// # Example
///
/// ```
/// use ad_core::Vec3;
/// use ad_world::{LaneNetworkBuilder, MapView, Road};
///
/// let mut b = LaneNetworkBuilder::new();
/// b.add_road(Road::straight(1, Vec3::ZERO, 0.0, 100.0).lanes(&[-1, -2, 1, 2]));
/// b.add_road(Road::straight(2, Vec3::xy(100.0, 0.0), 0.0, 100.0).lanes(&[-1, -2, 1, 2]));
/// b.connect(1, 2);
/// let net = b.build().unwrap();
///
/// let wp = net.waypoint(Vec3::xy(95.0, 1.75)).unwrap();
/// assert_eq!(net.next(&wp, 10.0)[0].road.0, 2);
/// ```
#[derive(Default)]
pub struct LaneNetworkBuilder {
    roads: Vec<Road>,
    links: Vec<(RoadId, RoadId)>,
}

impl LaneNetworkBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_road(&mut self, road: Road) -> RoadId {
        let id = road.id;
        self.roads.push(road);
        id
    }

    /// Link the end of `from` to the start of `to`.
    pub fn connect(&mut self, from: i32, to: i32) {
        self.links.push((RoadId(from), RoadId(to)));
    }

    /// Validate roads, resolve links, and bulk-load the R-tree.
    pub fn build(self) -> WorldResult<LaneNetwork> {
        let mut roads: BTreeMap<RoadId, Road> = BTreeMap::new();
        for road in self.roads {
            if road.lanes.is_empty() {
                return Err(WorldError::InvalidRoad { road: road.id, reason: "road has no lanes" });
            }
            if !(road.length > 0.0) {
                return Err(WorldError::InvalidRoad { road: road.id, reason: "length must be positive" });
            }
            if road.lanes.iter().any(|l| l.0 == 0) {
                return Err(WorldError::InvalidRoad { road: road.id, reason: "lane id 0 is the reference line" });
            }
            roads.insert(road.id, road);
        }

        for (from, to) in self.links {
            if !roads.contains_key(&to) {
                return Err(WorldError::RoadNotFound(to));
            }
            roads.get_mut(&from).ok_or(WorldError::RoadNotFound(from))?.successor = Some(to);
            if let Some(r) = roads.get_mut(&to) {
                r.predecessor = Some(from);
            }
        }

        let samples: Vec<LaneSample> = roads
            .values()
            .flat_map(|road| {
                let steps = (road.length / SAMPLE_SPACING_M).ceil() as usize;
                road.lanes.iter().flat_map(move |&lane| {
                    (0..=steps).map(move |i| {
                        let s = (i as f32 * SAMPLE_SPACING_M).min(road.length);
                        let p = road.waypoint_at(lane, s).location();
                        LaneSample { point: [p.x, p.y], road: road.id, lane }
                    })
                })
            })
            .collect();

        tracing::debug!(roads = roads.len(), samples = samples.len(), "lane network built");

        Ok(LaneNetwork { roads, spatial_idx: RTree::bulk_load(samples) })
    }
}
