//! Unit tests for ad-matrix.

use std::sync::Arc;
use std::time::{Duration, Instant};

use ad_core::{ActorId, LaneId, RoadId, RoadLaneId, Rotation, Transform, Vec3};
use ad_world::{ActorSnapshot, LaneNetwork, LaneNetworkBuilder, Road, ScriptedWorld};

use crate::{
    build_matrix, BuildOptions, Cell, HighwayShape, MatrixError, MatrixReport, MatrixSettings,
    Placeholder, RowKey,
};

// ── Helpers ───────────────────────────────────────────────────────────────────

const EGO: ActorId = ActorId(0);

fn single_road(lanes: &[i32]) -> LaneNetwork {
    let mut b = LaneNetworkBuilder::new();
    b.add_road(Road::straight(1, Vec3::ZERO, 0.0, 200.0).lanes(lanes));
    b.build().unwrap()
}

/// Centre of a forward-travelling lane at `x` on a road along +x.
fn on_lane(lane: i32, x: f32) -> Transform {
    let k = lane.unsigned_abs() as f32;
    let y = if lane < 0 { (k - 0.5) * 3.5 } else { -(k - 0.5) * 3.5 };
    Transform::new(Vec3::xy(x, y), Rotation::default())
}

fn vehicle(id: u32, lane: i32, x: f32) -> ActorSnapshot {
    ActorSnapshot::vehicle(ActorId(id), on_lane(lane, x))
}

fn build(net: &LaneNetwork, actors: &[ActorSnapshot], opts: &BuildOptions) -> Option<MatrixReport> {
    let ego = actors.iter().find(|a| a.id == EGO).unwrap();
    build_matrix(net, ego, actors, &MatrixSettings::default(), opts).unwrap()
}

fn lane_key(road: i32, lane: i32) -> RowKey {
    RowKey::Lane(RoadLaneId::new(road, lane))
}

fn placeholder_keys(report: &MatrixReport) -> Vec<RowKey> {
    report.matrix.keys().copied().collect()
}

// ── Lane runs ─────────────────────────────────────────────────────────────────

#[cfg(test)]
mod lanes {
    use super::*;
    use crate::lanes::{is_consecutive, split_runs, LaneRuns};

    fn ids(v: &[i32]) -> Vec<LaneId> {
        v.iter().map(|&l| LaneId(l)).collect()
    }

    #[test]
    fn runs_split_at_gaps_and_order_outermost_first() {
        let runs = split_runs(&ids(&[3, -1, 1, -2, 2, -3]));
        assert_eq!(runs, vec![ids(&[-3, -2, -1]), ids(&[3, 2, 1])]);
    }

    #[test]
    fn classify_picks_ego_run() {
        let runs = LaneRuns::classify(&ids(&[-2, -1, 1, 2]), LaneId(1)).unwrap();
        assert_eq!(runs.ego, ids(&[2, 1]));
        assert_eq!(runs.other, ids(&[-2, -1]));
        assert!(LaneRuns::classify(&ids(&[-2, -1]), LaneId(4)).is_none());
    }

    #[test]
    fn consecutive() {
        assert!(is_consecutive(&ids(&[-3, -1, -2])));
        assert!(!is_consecutive(&ids(&[-1, 1])));
    }
}

// ── Templates ─────────────────────────────────────────────────────────────────

#[cfg(test)]
mod templates {
    use super::*;
    use crate::Template;
    use Placeholder::*;

    fn p(x: Placeholder) -> RowKey {
        RowKey::Placeholder(x)
    }

    fn alone_on(lanes: &[i32]) -> MatrixReport {
        let net = single_road(lanes);
        build(&net, &[vehicle(0, -1, 50.0)], &BuildOptions::default()).unwrap()
    }

    #[test]
    fn one_way_single_lane() {
        let r = alone_on(&[-1]);
        assert_eq!(
            placeholder_keys(&r),
            vec![
                p(LeftOuterLane), p(LeftInnerLane), p(NoOtherRightLane), p(NoOpposingDirection),
                lane_key(1, -1), p(NoOwnRightLane), p(RightInnerLane), p(RightOuterLane),
            ]
        );
    }

    #[test]
    fn one_way_two_lanes() {
        let r = alone_on(&[-1, -2]);
        assert_eq!(
            placeholder_keys(&r),
            vec![
                p(LeftOuterLane), p(LeftInnerLane), p(NoOpposingDirection), p(NoOpposingDirection),
                lane_key(1, -1), lane_key(1, -2), p(RightInnerLane), p(RightOuterLane),
            ]
        );
    }

    #[test]
    fn one_way_three_lanes() {
        let r = alone_on(&[-1, -2, -3]);
        assert_eq!(
            placeholder_keys(&r),
            vec![
                p(LeftOuterLane), p(LeftInnerLane), lane_key(1, -1), lane_key(1, -2),
                lane_key(1, -3), p(NoFourthLane), p(RightInnerLane), p(RightOuterLane),
            ]
        );
    }

    #[test]
    fn one_way_four_lanes() {
        let r = alone_on(&[-1, -2, -3, -4]);
        assert_eq!(
            placeholder_keys(&r),
            vec![
                p(LeftOuterLane), p(LeftInnerLane), lane_key(1, -1), lane_key(1, -2),
                lane_key(1, -3), lane_key(1, -4), p(RightInnerLane), p(RightOuterLane),
            ]
        );
    }

    #[test]
    fn single_lane_each_way() {
        let r = alone_on(&[-1, 1]);
        assert_eq!(
            placeholder_keys(&r),
            vec![
                p(LeftOuterLane), p(LeftInnerLane), p(NoOpposingDirection), lane_key(1, 1),
                lane_key(1, -1), p(NoOwnRightLane), p(RightInnerLane), p(RightOuterLane),
            ]
        );
    }

    #[test]
    fn placeholders_are_filled_and_ego_marked() {
        let r = alone_on(&[-1]);
        let rows = r.matrix.to_rows();
        assert_eq!(rows.len(), 8);
        assert_eq!(rows[0], [3; 8]);
        assert_eq!(rows[4], [0, 0, 0, 1, 0, 0, 0, 0]);
        assert_eq!(r.matrix.count(Cell::Ego), 1);
    }

    #[test]
    fn unsupported_layout_yields_none() {
        assert_eq!(Template::select(2, 1), None);
        assert_eq!(Template::select(5, 3), Some(Template::Wide));
        let net = single_road(&[-2, -1, 1]);
        assert!(build(&net, &[vehicle(0, -1, 50.0)], &BuildOptions::default()).is_none());
    }
}

// ── Placement ─────────────────────────────────────────────────────────────────

#[cfg(test)]
mod placement {
    use super::*;

    fn two_by_two(others: &[ActorSnapshot]) -> MatrixReport {
        let net = single_road(&[-2, -1, 1, 2]);
        let mut actors = vec![vehicle(0, -1, 50.0)];
        actors.extend_from_slice(others);
        build(&net, &actors, &BuildOptions::default()).unwrap()
    }

    #[test]
    fn car_ahead_in_own_lane() {
        let r = two_by_two(&[vehicle(1, -1, 65.0)]);
        assert_eq!(
            r.matrix.to_rows(),
            vec![
                [3; 8],
                [3; 8],
                [0; 8],
                [0; 8],
                [0, 0, 0, 1, 0, 2, 0, 0],
                [0; 8],
                [3; 8],
                [3; 8],
            ]
        );
        assert!(!r.on_highway);
    }

    #[test]
    fn car_alongside_lands_in_aligned_column() {
        let r = two_by_two(&[vehicle(1, -2, 51.0)]);
        assert_eq!(r.matrix.lane_row(RoadLaneId::new(1, -2)).unwrap()[3], Cell::Car);
    }

    #[test]
    fn ego_cell_is_never_overwritten() {
        let r = two_by_two(&[vehicle(1, -1, 51.0)]);
        let row = r.matrix.lane_row(RoadLaneId::new(1, -1)).unwrap();
        assert_eq!(row[3], Cell::Ego);
        assert_eq!(row[4], Cell::Car);
    }

    #[test]
    fn buckets_behind_and_beyond() {
        let r = two_by_two(&[vehicle(1, -1, 35.0), vehicle(2, -1, 24.0), vehicle(3, -1, 95.0)]);
        let row = r.matrix.lane_row(RoadLaneId::new(1, -1)).unwrap();
        assert_eq!(*row, [Cell::Car, Cell::Car, Cell::Empty, Cell::Ego, Cell::Empty, Cell::Empty, Cell::Empty, Cell::Empty]);
    }

    #[test]
    fn adjacent_lane_distance_drops_lateral_leg() {
        // Straight-line distance is ~10.4 m; along the road it is 9.8 m.
        let r = two_by_two(&[vehicle(1, -2, 59.8)]);
        assert_eq!(r.matrix.lane_row(RoadLaneId::new(1, -2)).unwrap()[4], Cell::Car);
    }

    #[test]
    fn unreachable_lane_falls_back_to_direct_distance() {
        // Walking left from ego stops at the centre line, so lane 2 is never
        // reached and the plain distance (~16.6 m) is used.
        let r = two_by_two(&[vehicle(1, 2, 65.0)]);
        assert_eq!(r.matrix.lane_row(RoadLaneId::new(1, 2)).unwrap()[5], Cell::Car);
    }

    #[test]
    fn highway_widens_buckets() {
        let net = single_road(&[-3, -2, -1]);
        let actors = [vehicle(0, -1, 50.0), vehicle(1, -1, 75.0)];
        let r = build(&net, &actors, &BuildOptions::default()).unwrap();
        assert!(r.on_highway);
        assert_eq!(r.matrix.lane_row(RoadLaneId::new(1, -1)).unwrap()[5], Cell::Car);
    }

    #[test]
    fn bad_highway_street_shifts_ego_outwards() {
        let net = single_road(&[-3, -2, -1]);
        let opts = BuildOptions { bad_highway_street: true, ..Default::default() };
        let r = build(&net, &[vehicle(0, -1, 50.0)], &opts).unwrap();
        assert_eq!(r.matrix.ego_position(), Some((RoadLaneId::new(1, -2), 3)));
    }

    #[test]
    fn ghost_places_ego_as_a_vehicle() {
        let net = single_road(&[-2, -1, 1, 2]);
        let opts = BuildOptions { ghost: true, ..Default::default() };
        let r = build(&net, &[vehicle(0, -1, 50.0), vehicle(1, -2, 62.0)], &opts).unwrap();
        assert_eq!(r.matrix.ego_position(), Some((RoadLaneId::new(1, -1), 3)));
        assert_eq!(r.matrix.lane_row(RoadLaneId::new(1, -2)).unwrap()[5], Cell::Car);
    }

    #[test]
    fn walkers_are_ignored() {
        let walker = ActorSnapshot::walker(ActorId(7), on_lane(-1, 60.0));
        let r = two_by_two(&[walker]);
        assert_eq!(r.matrix.count(Cell::Car), 0);
    }

    #[test]
    fn ramp_vehicles_are_reported_separately() {
        let mut b = LaneNetworkBuilder::new();
        b.add_road(Road::straight(1, Vec3::ZERO, 0.0, 200.0).lanes(&[-2, -1]));
        b.add_road(Road::straight(3, Vec3::xy(0.0, 30.0), 0.0, 200.0).lanes(&[-1]));
        let net = b.build().unwrap();
        let ramp_car = ActorSnapshot::vehicle(ActorId(5), Transform::new(Vec3::xy(60.0, 31.75), Rotation::default()));
        let opts = BuildOptions {
            highway: Some(HighwayShape { entry_roads: vec![RoadId(3)], exit_roads: vec![] }),
            ..Default::default()
        };
        let r = build(&net, &[vehicle(0, -1, 50.0), ramp_car], &opts).unwrap();
        assert_eq!(r.ramp_vehicles, vec![ActorId(5)]);
        assert_eq!(r.matrix.count(Cell::Car), 0);
    }

    #[test]
    fn cars_on_matching_next_road_map_onto_ego_road() {
        let mut b = LaneNetworkBuilder::new();
        b.add_road(Road::straight(1, Vec3::ZERO, 0.0, 100.0).lanes(&[-2, -1]));
        b.add_road(Road::straight(2, Vec3::xy(100.0, 0.0), 0.0, 100.0).lanes(&[-2, -1]));
        b.connect(1, 2);
        let net = b.build().unwrap();
        let r = build(&net, &[vehicle(0, -1, 95.0), vehicle(1, -1, 108.0)], &BuildOptions::default()).unwrap();
        assert_eq!(r.matrix.lane_row(RoadLaneId::new(1, -1)).unwrap()[5], Cell::Car);
    }

    #[test]
    fn car_across_road_change_can_sit_alongside() {
        let mut b = LaneNetworkBuilder::new();
        b.add_road(Road::straight(1, Vec3::ZERO, 0.0, 100.0).lanes(&[-2, -1]));
        b.add_road(Road::straight(2, Vec3::xy(100.0, 0.0), 0.0, 100.0).lanes(&[-2, -1]));
        b.connect(1, 2);
        let net = b.build().unwrap();
        let r = build(&net, &[vehicle(0, -1, 98.0), vehicle(1, -2, 101.0)], &BuildOptions::default()).unwrap();
        assert_eq!(r.matrix.lane_row(RoadLaneId::new(1, -2)).unwrap()[3], Cell::Car);
        assert_eq!(r.matrix.ego_position(), Some((RoadLaneId::new(1, -1), 3)));
    }

    #[test]
    fn cars_on_differing_next_road_are_dropped() {
        let mut b = LaneNetworkBuilder::new();
        b.add_road(Road::straight(1, Vec3::ZERO, 0.0, 100.0).lanes(&[-2, -1]));
        b.add_road(Road::straight(2, Vec3::xy(100.0, 0.0), 0.0, 100.0).lanes(&[-3, -2, -1]));
        b.connect(1, 2);
        let net = b.build().unwrap();
        let r = build(&net, &[vehicle(0, -1, 95.0), vehicle(1, -1, 108.0)], &BuildOptions::default()).unwrap();
        assert_eq!(r.matrix.count(Cell::Car), 0);
    }

    #[test]
    fn column_thresholds_are_configurable() {
        let s = MatrixSettings { ahead_m: [5.0, 10.0, 15.0, 20.0], ..Default::default() };
        assert_eq!(s.column(12.0, 12.0, false, true), Some(6));
        assert_eq!(s.column(-25.0, 25.0, false, true), Some(0));
        assert_eq!(s.column(-35.0, 35.0, false, true), None);
        assert_eq!(s.column(1.0, 1.0, false, false), Some(4));
    }
}

// ── Updaters ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod updaters {
    use super::*;
    use crate::{MatrixWorker, MatrixResult, MatrixUpdater, SyncMatrix, WorldMatrixSource};

    fn sample_report() -> MatrixReport {
        let net = single_road(&[-1]);
        build(&net, &[vehicle(0, -1, 50.0)], &BuildOptions::default()).unwrap()
    }

    fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        false
    }

    #[test]
    fn sync_recomputes_on_interval() {
        let calls = Arc::new(std::sync::atomic::AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let report = sample_report();
        let mut m = SyncMatrix::new(
            move || -> MatrixResult<Option<MatrixReport>> {
                counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                Ok(Some(report.clone()))
            },
            2,
        );
        for _ in 0..5 {
            m.update().unwrap();
        }
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 3);
        assert!(m.snapshot().is_some());
    }

    #[test]
    fn sync_keeps_previous_on_transient_error() {
        let report = sample_report();
        let mut n = 0;
        let mut m = SyncMatrix::new(
            move || -> MatrixResult<Option<MatrixReport>> {
                n += 1;
                match n {
                    1 => Ok(Some(report.clone())),
                    2 => Err(MatrixError::Transient("lost actor".into())),
                    _ => Err(MatrixError::Fatal("map gone".into())),
                }
            },
            1,
        );
        m.update().unwrap();
        m.update().unwrap();
        assert!(m.snapshot().is_some());
        assert!(matches!(m.update(), Err(MatrixError::Fatal(_))));
    }

    #[test]
    fn sync_stop_clears() {
        let report = sample_report();
        let mut m = SyncMatrix::new(move || -> MatrixResult<Option<MatrixReport>> { Ok(Some(report.clone())) }, 1);
        m.update().unwrap();
        m.stop(None).unwrap();
        m.stop(None).unwrap();
        assert!(m.snapshot().is_none());
        assert!(!m.is_running());
    }

    #[test]
    fn async_publishes_and_stops() {
        let world = Arc::new(ScriptedWorld::new(single_road(&[-2, -1, 1, 2]), 0.05));
        world.spawn(vehicle(0, -1, 50.0));
        world.spawn(vehicle(1, -1, 65.0));
        let source = WorldMatrixSource::new(Arc::clone(&world), EGO, MatrixSettings::default());
        let mut m = MatrixWorker::spawn(source, Duration::from_millis(10)).unwrap();

        assert!(wait_until(|| m.snapshot().is_some()));
        let snap = m.snapshot().unwrap();
        assert_eq!(snap.matrix.lane_row(RoadLaneId::new(1, -1)).unwrap()[5], Cell::Car);
        assert!(m.is_running());
        m.update().unwrap();

        m.stop(Some(Duration::from_secs(2))).unwrap();
        assert!(!m.is_running());
        assert!(m.snapshot().is_none());
        // Second stop only warns.
        m.stop(Some(Duration::from_secs(2))).unwrap();
    }

    #[test]
    fn async_fatal_error_ends_worker() {
        let mut m = MatrixWorker::spawn(
            || -> MatrixResult<Option<MatrixReport>> { Err(MatrixError::Fatal("simulator gone".into())) },
            Duration::from_millis(10),
        )
        .unwrap();
        let mut seen = None;
        assert!(wait_until(|| match m.update() {
            Err(e) => {
                seen = Some(e);
                true
            }
            Ok(()) => false,
        }));
        match seen {
            Some(MatrixError::WorkerFailed(inner)) => assert!(matches!(*inner, MatrixError::Fatal(_))),
            other => panic!("unexpected {other:?}"),
        }
        assert!(!m.is_running());
    }

    #[test]
    fn async_retries_transient_errors() {
        let report = sample_report();
        let mut n = 0;
        let m = MatrixWorker::spawn(
            move || -> MatrixResult<Option<MatrixReport>> {
                n += 1;
                if n < 3 {
                    Err(MatrixError::Transient("not ready".into()))
                } else {
                    Ok(Some(report.clone()))
                }
            },
            Duration::from_millis(1),
        )
        .unwrap();
        assert!(wait_until(|| m.snapshot().is_some()));
    }
}
