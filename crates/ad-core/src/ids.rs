//! Strongly typed identifier wrappers for simulator entities.
//!
//! The simulator hands out signed integers for roads and lanes (lane ids are
//! negative on the right-hand side of the reference line), and unsigned ids
//! for actors.  Wrapping them keeps `RoadId(3)` and `LaneId(3)` from being
//! swapped silently.

use std::fmt;

/// Generate a typed ID wrapper around a primitive integer.
macro_rules! typed_id {
    ($(#[$attr:meta])* $vis:vis struct $name:ident($inner:ty);) => {
        $(#[$attr])*
        #[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
        #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
        $vis struct $name(pub $inner);

        impl $name {
            /// Sentinel meaning "no valid ID".
            pub const INVALID: $name = $name(<$inner>::MAX);

            #[inline(always)]
            pub fn is_valid(self) -> bool {
                self != Self::INVALID
            }
        }

        impl Default for $name {
            /// Returns the `INVALID` sentinel so uninitialized IDs are visibly invalid.
            #[inline(always)]
            fn default() -> Self {
                Self::INVALID
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }

        impl From<$inner> for $name {
            #[inline(always)]
            fn from(raw: $inner) -> $name {
                $name(raw)
            }
        }
    };
}

typed_id! {
    /// Simulator actor (vehicle, walker, traffic light).
    pub struct ActorId(u32);
}

typed_id! {
    /// OpenDRIVE road identifier.
    pub struct RoadId(i32);
}

typed_id! {
    /// Lane identifier within a road.  Sign encodes the side of the
    /// reference line; consecutive ids are adjacent lanes.
    pub struct LaneId(i32);
}

impl LaneId {
    /// `true` if `other` is the lane directly beside `self` with the same sign.
    #[inline]
    pub fn is_adjacent(self, other: LaneId) -> bool {
        (self.0 - other.0).abs() == 1 && self.0.signum() == other.0.signum()
    }
}

// ── RoadLaneId ────────────────────────────────────────────────────────────────

/// A concrete lane: the pair `(road, lane)`.
///
/// Displayed as `"road_lane"`, e.g. `"12_-1"`.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RoadLaneId {
    pub road: RoadId,
    pub lane: LaneId,
}

impl RoadLaneId {
    #[inline]
    pub fn new(road: impl Into<RoadId>, lane: impl Into<LaneId>) -> Self {
        Self { road: road.into(), lane: lane.into() }
    }

    /// The same lane number on a different road.
    #[inline]
    pub fn on_road(self, road: RoadId) -> Self {
        Self { road, lane: self.lane }
    }
}

impl fmt::Display for RoadLaneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.road.0, self.lane.0)
    }
}
