//! Splitting a road's lane ids into per-direction runs.

use ad_core::LaneId;

/// Split lane ids into runs of consecutive ids.
///
/// Ids are sorted ascending and deduplicated; a new run starts wherever two
/// neighbours differ by more than one.  Each run is then ordered by absolute
/// id, outermost lane first.
///
/// ```
/// use ad_core::LaneId;
/// use ad_matrix::lanes::split_runs;
///
/// let runs = split_runs(&[LaneId(1), LaneId(-1), LaneId(-2), LaneId(2)]);
/// assert_eq!(runs, vec![vec![LaneId(-2), LaneId(-1)], vec![LaneId(2), LaneId(1)]]);
/// ```
pub fn split_runs(lanes: &[LaneId]) -> Vec<Vec<LaneId>> {
    let mut sorted: Vec<LaneId> = lanes.to_vec();
    sorted.sort_unstable();
    sorted.dedup();

    let mut runs: Vec<Vec<LaneId>> = Vec::new();
    for lane in sorted {
        match runs.last_mut() {
            Some(run) if run.last().is_some_and(|prev| lane.0 - prev.0 == 1) => run.push(lane),
            _ => runs.push(vec![lane]),
        }
    }
    for run in &mut runs {
        run.sort_by_key(|l| std::cmp::Reverse(l.0.abs()));
    }
    runs
}

/// Lanes grouped into the ego vehicle's direction and the opposing one.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct LaneRuns {
    /// Outermost first.
    pub ego: Vec<LaneId>,
    /// Outermost first; empty on a one-way road.
    pub other: Vec<LaneId>,
}

impl LaneRuns {
    /// Group `lanes` relative to `ego_lane`.  `None` if `ego_lane` is not on
    /// the road at all.
    pub fn classify(lanes: &[LaneId], ego_lane: LaneId) -> Option<Self> {
        let mut out = LaneRuns::default();
        for run in split_runs(lanes) {
            if run.contains(&ego_lane) {
                out.ego = run;
            } else {
                out.other = run;
            }
        }
        (!out.ego.is_empty()).then_some(out)
    }
}

/// `true` if the sorted ids form a single run with no gaps.
pub fn is_consecutive(lanes: &[LaneId]) -> bool {
    let mut sorted: Vec<i32> = lanes.iter().map(|l| l.0).collect();
    sorted.sort_unstable();
    sorted.windows(2).all(|w| w[1] - w[0] == 1)
}
