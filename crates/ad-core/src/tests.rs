//! Unit tests for ad-core primitives.

#[cfg(test)]
mod ids {
    use crate::{LaneId, RoadLaneId};

    #[test]
    fn road_lane_display() {
        assert_eq!(RoadLaneId::new(12, -1).to_string(), "12_-1");
    }

    #[test]
    fn adjacency_respects_side() {
        assert!(LaneId(-1).is_adjacent(LaneId(-2)));
        assert!(!LaneId(-1).is_adjacent(LaneId(1)));
        assert!(!LaneId(2).is_adjacent(LaneId(4)));
    }

    #[test]
    fn invalid_default() {
        assert!(!LaneId::default().is_valid());
    }
}

#[cfg(test)]
mod geom {
    use crate::{Rotation, Vec3};

    #[test]
    fn forward_vector_of_zero_yaw_is_x() {
        let f = Rotation::yaw(0.0).forward_vector();
        assert!((f.x - 1.0).abs() < 1e-6);
        assert!(f.y.abs() < 1e-6);
    }

    #[test]
    fn forward_vector_of_ninety_yaw_is_y() {
        let f = Rotation::yaw(90.0).forward_vector();
        assert!(f.x.abs() < 1e-6);
        assert!((f.y - 1.0).abs() < 1e-6);
    }

    #[test]
    fn dot_2d_ignores_z() {
        let a = Vec3::new(1.0, 2.0, 100.0);
        let b = Vec3::new(3.0, 4.0, 100.0);
        assert_eq!(a.dot_2d(b), 11.0);
    }
}

#[cfg(test)]
mod time {
    use crate::Tick;

    #[test]
    fn tick_arithmetic() {
        assert_eq!(Tick(10) + 5, Tick(15));
        assert_eq!(Tick(15) - Tick(10), 5u64);
        assert_eq!(Tick(3).since(Tick(5)), 0);
    }

    #[test]
    fn ticks_display_and_step() {
        assert_eq!(Tick::ZERO.next(), Tick(1));
        assert_eq!(Tick(42).to_string(), "T42");
    }
}

#[cfg(test)]
mod rng {
    use crate::{ActorId, AgentRng, cumulative};

    #[test]
    fn same_seed_same_stream() {
        let mut a = AgentRng::new(7, ActorId(1));
        let mut b = AgentRng::new(7, ActorId(1));
        let xs: Vec<u32> = (0..8).map(|_| a.random()).collect();
        let ys: Vec<u32> = (0..8).map(|_| b.random()).collect();
        assert_eq!(xs, ys);
    }

    #[test]
    fn cumulative_weights() {
        assert_eq!(cumulative([1.0, 2.0, 3.0]), vec![1.0, 3.0, 6.0]);
    }

    #[test]
    fn pick_skips_zero_weight() {
        let mut rng = AgentRng::from_seed(3);
        let cum = cumulative([0.0, 1.0, 0.0]);
        for _ in 0..100 {
            assert_eq!(rng.pick_cumulative(&cum), Some(1));
        }
    }

    #[test]
    fn pick_empty_is_none() {
        let mut rng = AgentRng::from_seed(3);
        assert_eq!(rng.pick_cumulative(&[]), None);
        assert_eq!(rng.pick_cumulative(&[0.0, 0.0]), None);
    }
}

#[cfg(test)]
mod phase {
    use proptest::prelude::*;

    use crate::{CoreError, Phase};

    fn begin(s: Phase) -> Phase {
        Phase::begin(s)
    }

    fn end(s: Phase) -> Phase {
        Phase::end(s)
    }

    #[test]
    fn none_starts_the_cycle() {
        assert_eq!(Phase::NONE.next_phase().unwrap(), begin(Phase::UPDATE_INFORMATION));
    }

    #[test]
    fn normal_cycle_order() {
        let mut p = begin(Phase::UPDATE_INFORMATION);
        let mut visited = vec![p];
        for _ in 0..15 {
            p = p.next_phase().unwrap();
            visited.push(p);
        }
        let expected: Vec<Phase> = Phase::CYCLE.iter().flat_map(|&s| [begin(s), end(s)]).collect();
        assert_eq!(visited, expected);
        // Execution closes the loop.
        assert_eq!(p.next_phase().unwrap(), begin(Phase::UPDATE_INFORMATION));
    }

    #[test]
    fn exceptions_skip_to_validation() {
        for stage in [Phase::EMERGENCY, Phase::CAR_DETECTED, Phase::TURNING_AT_JUNCTION, Phase::DONE] {
            assert_eq!(end(stage).next_phase().unwrap(), begin(Phase::RSS_EVALUATION));
        }
    }

    #[test]
    fn terminating_ends_the_loop() {
        assert_eq!(end(Phase::TERMINATING).next_phase().unwrap(), Phase::NONE);
    }

    #[test]
    fn aliases_have_no_transition() {
        for alias in [Phase::EXCEPTIONS, Phase::NORMAL_LOOP, Phase::UPDATE_INFORMATION, Phase::BEGIN] {
            assert!(matches!(alias.next_phase(), Err(CoreError::NoTransition(_))));
        }
        let both = Phase::DETECT_CARS | Phase::BEGIN | Phase::END;
        assert!(both.next_phase().is_err());
    }

    #[test]
    fn strict_validation() {
        let current = end(Phase::PLAN_PATH);
        assert!(current.check_transition(begin(Phase::DETECT_TRAFFIC_LIGHTS)).is_ok());
        assert!(current.check_transition(begin(Phase::EMERGENCY)).is_ok());
        assert!(current.check_transition(begin(Phase::CUSTOM_CYCLE)).is_ok());
        let err = current.check_transition(begin(Phase::TAKE_NORMAL_STEP)).unwrap_err();
        assert!(matches!(err, CoreError::PhaseViolation { .. }));
    }

    #[test]
    fn display_and_parse() {
        let p = Phase::DETECT_CARS | Phase::END;
        assert_eq!(p.to_string(), "DETECT_CARS|END");
        assert_eq!("DETECT_CARS|END".parse::<Phase>().unwrap(), p);
        assert_eq!("Phase.DETECT_CARS | Phase.END".parse::<Phase>().unwrap(), p);
        assert!("DETECT_BICYCLES|END".parse::<Phase>().is_err());
    }

    #[test]
    fn all_phases_are_concrete() {
        let all: Vec<Phase> = Phase::all_phases().collect();
        assert_eq!(all.len(), 2 * 16);
        assert!(all.iter().all(|p| p.is_concrete()));
    }

    proptest! {
        #[test]
        fn next_phase_alternates_halves(p in proptest::sample::select(Phase::all_phases().collect::<Vec<_>>())) {
            let next = p.next_phase().unwrap();
            if p.is_begin() {
                prop_assert_eq!(next, end(p.stage()));
            } else if next != Phase::NONE {
                prop_assert!(next.is_begin());
                prop_assert!(next.is_concrete());
            }
        }

        #[test]
        fn successors_stay_in_the_phase_space(p in proptest::sample::select(Phase::all_phases().collect::<Vec<_>>())) {
            let next = p.next_phase().unwrap();
            prop_assert!(next == Phase::NONE || Phase::all_phases().any(|q| q == next));
        }
    }
}

#[cfg(test)]
mod hazard {
    use crate::{Hazard, HazardSet, MatchMode, Severity};

    #[test]
    fn add_merges_severity() {
        let mut set = HazardSet::new();
        set.add(Hazard::PEDESTRIAN, Severity::WARNING);
        set.add(Hazard::PEDESTRIAN, Severity::EMERGENCY_ONLY);
        assert_eq!(set.len(), 1);
        let sev = set.severity(Hazard::PEDESTRIAN).unwrap();
        assert!(sev.contains(Severity::WARNING));
        assert!(sev.is_emergency());
    }

    #[test]
    fn subset_discard_removes_supersets() {
        let mut set = HazardSet::new();
        set.add(Hazard::OBSTACLE, Severity::CRITICAL);
        set.add(Hazard::TRAFFIC_LIGHT_RED, Severity::EMERGENCY);
        // CAR is contained in OBSTACLE.
        assert_eq!(set.discard(Hazard::CAR, MatchMode::Subset), 1);
        // TRAFFIC_LIGHT is not contained in TRAFFIC_LIGHT_RED.
        assert_eq!(set.discard(Hazard::TRAFFIC_LIGHT, MatchMode::Subset), 0);
        assert_eq!(set.discard(Hazard::TRAFFIC_LIGHT, MatchMode::Intersection), 1);
        assert!(set.is_empty());
    }

    #[test]
    fn has_modes() {
        let mut set = HazardSet::new();
        set.add(Hazard::TRAFFIC_LIGHT_RED, Severity::EMERGENCY);
        assert!(set.has(Hazard::TRAFFIC_LIGHT, MatchMode::Intersection));
        assert!(!set.has(Hazard::TRAFFIC_LIGHT, MatchMode::Exact));
        assert!(set.has(Hazard::TRAFFIC_LIGHT_RED, MatchMode::Exact));
        assert!(!set.has(Hazard::CAR, MatchMode::Intersection));
    }

    #[test]
    fn parse_aliases() {
        assert_eq!("OBSTACLE".parse::<Hazard>().unwrap(), Hazard::OBSTACLE);
        assert_eq!(
            "CAR|PEDESTRIAN".parse::<Hazard>().unwrap(),
            Hazard::CAR | Hazard::PEDESTRIAN
        );
        assert_eq!(Hazard::TRAFFIC_LIGHT.to_string(), "TRAFFIC_LIGHT_RED|TRAFFIC_LIGHT_YELLOW");
    }

    #[test]
    fn severity_levels_are_cumulative() {
        assert!(Severity::EMERGENCY.contains(Severity::CRITICAL));
        assert!(Severity::CRITICAL.contains(Severity::WARNING));
        assert!(!Severity::CRITICAL.is_emergency());
    }
}

#[cfg(test)]
mod control {
    use crate::{RoadOption, VehicleControl};

    #[test]
    fn clamped() {
        let c = VehicleControl::new(1.5, -3.0, -0.2).clamped();
        assert_eq!(c, VehicleControl::new(1.0, -1.0, 0.0));
    }

    #[test]
    fn road_option_turns() {
        assert!(RoadOption::Left.is_turn());
        assert!(!RoadOption::LaneFollow.is_turn());
        assert_eq!(RoadOption::ChangeLaneLeft.to_string(), "change_lane_left");
    }
}
