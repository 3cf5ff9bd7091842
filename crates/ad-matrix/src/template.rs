//! Fixed row layouts keyed by lane-count combination.

use ad_core::{LaneId, RoadId, RoadLaneId};

use crate::lanes::LaneRuns;
use crate::matrix::{DetectionMatrix, Placeholder, RowKey};

/// Supported (ego-direction, other-direction) lane-count combinations.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum Template {
    /// Four or more lanes in the ego direction; opposing lanes are not shown.
    Wide,
    /// Three lanes in the ego direction; opposing lanes are not shown.
    Three,
    TwoTwo,
    TwoNone,
    OneOne,
    OneNone,
}

impl Template {
    /// Pick the layout for `ego` and `other` lane counts.  `None` for any
    /// combination without a layout, e.g. 2+1.
    pub fn select(ego: usize, other: usize) -> Option<Self> {
        match (ego, other) {
            (e, _) if e >= 4 => Some(Template::Wide),
            (3, _) => Some(Template::Three),
            (2, 2) => Some(Template::TwoTwo),
            (2, 0) => Some(Template::TwoNone),
            (1, 1) => Some(Template::OneOne),
            (1, 0) => Some(Template::OneNone),
            _ => None,
        }
    }

    /// Lay out the eight rows for `road`.
    ///
    /// Lanes are read from `runs` outermost first, so `e[0]` is the ego
    /// direction's rightmost lane.  `runs` must match the counts this
    /// template was selected for.
    pub fn instantiate(self, road: RoadId, runs: &LaneRuns) -> DetectionMatrix {
        use Placeholder::*;

        let e = |i: usize| lane_row(road, runs.ego[i]);
        let o = |i: usize| lane_row(road, runs.other[i]);
        let p = RowKey::Placeholder;

        let middle: [RowKey; 4] = match self {
            Template::Wide    => [e(3), e(2), e(1), e(0)],
            Template::Three   => [e(2), e(1), e(0), p(NoFourthLane)],
            Template::TwoTwo  => [o(0), o(1), e(1), e(0)],
            Template::TwoNone => [p(NoOpposingDirection), p(NoOpposingDirection), e(1), e(0)],
            Template::OneOne  => [p(NoOpposingDirection), o(0), e(0), p(NoOwnRightLane)],
            Template::OneNone => [p(NoOtherRightLane), p(NoOpposingDirection), e(0), p(NoOwnRightLane)],
        };

        DetectionMatrix::from_keys(
            [p(LeftOuterLane), p(LeftInnerLane)]
                .into_iter()
                .chain(middle)
                .chain([p(RightInnerLane), p(RightOuterLane)]),
        )
    }
}

fn lane_row(road: RoadId, lane: LaneId) -> RowKey {
    RowKey::Lane(RoadLaneId { road, lane })
}
