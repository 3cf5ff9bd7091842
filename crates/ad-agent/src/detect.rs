//! Traffic-light, pedestrian and leading-vehicle checks.
//!
//! Pure functions of the tick's [`LiveInfo`]; the agent turns their results
//! into hazards and phase results.

use ad_core::Vec3;
use ad_rules::{LiveInfo, ObstacleDetection, TrafficLightDetection};
use ad_world::{ActorSnapshot, LightState};

use crate::settings::AgentSettings;

/// Gap between two bounding boxes, approximated by their larger half extent.
pub fn exact_distance(a: &ActorSnapshot, b: &ActorSnapshot) -> f32 {
    let reach = |s: &ActorSnapshot| s.extent.x.max(s.extent.y);
    (a.location().distance(b.location()) - reach(a) - reach(b)).max(0.0)
}

/// Nearest red or yellow light that controls ego's lane and whose stop
/// line lies ahead within `traffic_light_range_m`.
pub fn traffic_light(live: &LiveInfo, settings: &AgentSettings) -> TrafficLightDetection {
    let (Some(ego), Some(wp)) = (&live.ego, &live.current_waypoint) else {
        return TrafficLightDetection::default();
    };
    let lane = wp.road_lane();
    let forward = ego.transform.forward_vector();
    let range = settings.distance.traffic_light_range_m;

    live.traffic_lights
        .iter()
        .filter_map(|tl| {
            let info = tl.light?;
            if info.controls != lane || !matches!(info.state, LightState::Red | LightState::Yellow) {
                return None;
            }
            let ahead = (info.stop_location - ego.location()).dot_2d(forward);
            (0.0..=range).contains(&ahead).then_some(TrafficLightDetection {
                found: true,
                light: Some(tl.id),
                state: Some(info.state),
                distance: ahead,
            })
        })
        .min_by(|a, b| a.distance.total_cmp(&b.distance))
        .unwrap_or_default()
}

/// Nearest walker in ego's path within `max_distance`.
pub fn pedestrian(live: &LiveInfo, max_distance: f32) -> ObstacleDetection {
    nearest_in_path(live, &live.walkers_nearby, max_distance)
}

/// Nearest vehicle in ego's lane ahead within `max_distance`.
pub fn vehicle_ahead(live: &LiveInfo, max_distance: f32) -> ObstacleDetection {
    nearest_in_path(live, &live.vehicles_nearby, max_distance)
}

fn nearest_in_path(live: &LiveInfo, candidates: &[ActorSnapshot], max_distance: f32) -> ObstacleDetection {
    let Some(ego) = &live.ego else {
        return ObstacleDetection::default();
    };
    let half_width = live.current_waypoint.map_or(1.75, |wp| wp.lane_width / 2.0);
    let forward = ego.transform.forward_vector();
    let right = ego.transform.rotation.right_vector();

    candidates
        .iter()
        .filter(|other| other.id != ego.id)
        .filter_map(|other| {
            let offset: Vec3 = other.location() - ego.location();
            if offset.dot_2d(forward) <= 0.0 || offset.dot_2d(right).abs() > half_width + other.extent.y {
                return None;
            }
            let gap = exact_distance(ego, other);
            (gap <= max_distance).then_some(ObstacleDetection { found: true, actor: Some(other.id), distance: gap })
        })
        .min_by(|a, b| a.distance.total_cmp(&b.distance))
        .unwrap_or_default()
}

/// Target speed behind a leader driving at `leader_kmh`, `gap_m` ahead.
///
/// Below `safety_time_s` to collision the agent drops `speed_decrease_kmh`
/// under the leader; below twice that it matches the leader.  Never above
/// the cruise speed for `speed_limit_kmh`.
pub fn following_speed(
    ego_kmh: f32,
    leader_kmh: f32,
    gap_m: f32,
    speed_limit_kmh: f32,
    settings: &AgentSettings,
) -> f32 {
    let s = &settings.speed;
    let cruise = settings.target_speed(speed_limit_kmh);
    let closing_ms = (ego_kmh - leader_kmh) / 3.6;
    let ttc = if closing_ms > 0.0 { gap_m / closing_ms } else { f32::INFINITY };

    let wanted = if ttc < s.safety_time_s {
        (leader_kmh - s.speed_decrease_kmh).max(0.0)
    } else if ttc < 2.0 * s.safety_time_s {
        leader_kmh.max(s.min_speed_kmh)
    } else {
        cruise
    };
    wanted.min(cruise)
}
