//! One-shot matrix construction from a world snapshot.

use std::sync::Arc;

use tracing::{debug, trace};

use ad_core::{ActorId, RoadLaneId};
use ad_world::{ActorKind, ActorSnapshot, MapView, WorldView};

use crate::error::{MatrixError, MatrixResult};
use crate::geometry::{adjacent_road, is_on_highway, longitudinal_distance, HighwayShape};
use crate::lanes::LaneRuns;
use crate::matrix::{Cell, DetectionMatrix, ALIGNED_COL};
use crate::settings::MatrixSettings;
use crate::template::Template;

/// Per-build switches that are not thresholds.
#[derive(Clone, Debug, Default)]
pub struct BuildOptions {
    /// Place ego like any other vehicle, using each vehicle's own heading.
    pub ghost: bool,
    /// Ego drives on a road whose lane ids are offset by one from the
    /// highway it merges with.  Shifts ego's row one lane outwards.
    pub bad_highway_street: bool,
    pub highway: Option<HighwayShape>,
}

/// A built matrix plus the vehicles left out of it.
#[derive(Clone, Debug, PartialEq)]
pub struct MatrixReport {
    pub matrix: DetectionMatrix,
    /// Vehicles (ego included, if applicable) on highway ramp roads.
    pub ramp_vehicles: Vec<ActorId>,
    pub on_highway: bool,
}

/// Build a matrix centred on `ego`.
///
/// `Ok(None)` when ego's road has a lane layout without a template.
pub fn build_matrix(
    map: &dyn MapView,
    ego: &ActorSnapshot,
    actors: &[ActorSnapshot],
    settings: &MatrixSettings,
    opts: &BuildOptions,
) -> MatrixResult<Option<MatrixReport>> {
    let ego_loc = ego.location();
    let ego_wp = map.waypoint(ego_loc).ok_or(MatrixError::OffRoad(ego.id))?;
    let road = ego_wp.road;
    let lanes = map.road_lanes(road);

    let Some(runs) = LaneRuns::classify(&lanes, ego_wp.lane) else {
        debug!(%road, lane = %ego_wp.lane, "ego lane missing from road layout");
        return Ok(None);
    };
    let Some(template) = Template::select(runs.ego.len(), runs.other.len()) else {
        debug!(%road, ego = runs.ego.len(), other = runs.other.len(), "no matrix layout for lane counts");
        return Ok(None);
    };
    let mut matrix = template.instantiate(road, &runs);

    if !opts.ghost {
        let exact = ego_wp.road_lane();
        let shifted = RoadLaneId::new(road, ego_wp.lane.0 + ego_wp.lane.0.signum());
        let row = if opts.bad_highway_street && matrix.has_lane(shifted) { shifted } else { exact };
        matrix.place(row, ALIGNED_COL, Cell::Ego);
    }

    let on_highway = is_on_highway(map, &ego_wp);
    let lanes_continue = adjacent_road(map, &ego_wp, true).is_some()
        || adjacent_road(map, &ego_wp, false).is_some();

    let mut ramp_vehicles = Vec::new();
    let ramp = |r| opts.highway.as_ref().is_some_and(|h| h.is_ramp(r));
    if ramp(road) {
        ramp_vehicles.push(ego.id);
    }

    for other in actors {
        if other.kind != ActorKind::Vehicle || (other.id == ego.id && !opts.ghost) {
            continue;
        }
        let loc = other.location();
        if loc.distance(ego_loc) > settings.radius_m {
            continue;
        }
        let Some(wp) = map.waypoint(loc) else { continue };
        if ramp(wp.road) {
            ramp_vehicles.push(other.id);
            continue;
        }

        let heading = if opts.ghost { other.transform.rotation } else { ego.transform.rotation };
        let dot = (loc - ego_loc).dot_2d(heading.forward_vector());
        let distance = longitudinal_distance(map, ego_loc, &ego_wp, loc, &wp);

        // Cars on a neighbouring road with the same layout map onto our lanes.
        let row = if matrix.has_lane(wp.road_lane()) {
            wp.road_lane()
        } else if lanes_continue && matrix.has_lane_id(wp.lane) {
            RoadLaneId { road, lane: wp.lane }
        } else {
            trace!(actor = %other.id, lane = %wp.road_lane(), "vehicle outside matrix lanes");
            continue;
        };

        // Checked on the resolved row, so a car just past a road change can sit alongside ego.
        let alongside_free = matrix.lane_row(row).is_some_and(|r| r[ALIGNED_COL] != Cell::Ego);
        let Some(col) = settings.column(dot, distance, on_highway, alongside_free) else {
            continue;
        };
        let cell = if other.id == ego.id { Cell::Ego } else { Cell::Car };
        matrix.place(row, col, cell);
    }

    Ok(Some(MatrixReport { matrix, ramp_vehicles, on_highway }))
}

/// Something that can produce a fresh matrix on demand.
///
/// Background workers own their source; implementations must therefore be
/// `Send + 'static`.
pub trait MatrixSource: Send + 'static {
    fn compute(&mut self) -> MatrixResult<Option<MatrixReport>>;
}

/// Reads the live world for each computation.
pub struct WorldMatrixSource<W: WorldView> {
    world: Arc<W>,
    ego: ActorId,
    settings: MatrixSettings,
    opts: BuildOptions,
}

impl<W: WorldView> WorldMatrixSource<W> {
    pub fn new(world: Arc<W>, ego: ActorId, settings: MatrixSettings) -> Self {
        Self { world, ego, settings, opts: BuildOptions::default() }
    }

    pub fn with_options(mut self, opts: BuildOptions) -> Self {
        self.opts = opts;
        self
    }
}

impl<W: WorldView> MatrixSource for WorldMatrixSource<W> {
    fn compute(&mut self) -> MatrixResult<Option<MatrixReport>> {
        let map = self.world.map();
        let actors = self.world.actors();
        let ego = actors
            .iter()
            .find(|a| a.id == self.ego)
            .ok_or(MatrixError::EgoNotFound(self.ego))?;
        build_matrix(&*map, ego, &actors, &self.settings, &self.opts)
    }
}

impl<F> MatrixSource for F
where
    F: FnMut() -> MatrixResult<Option<MatrixReport>> + Send + 'static,
{
    fn compute(&mut self) -> MatrixResult<Option<MatrixReport>> {
        self()
    }
}
