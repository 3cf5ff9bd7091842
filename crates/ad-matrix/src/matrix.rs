//! The detection matrix value type.
//!
//! Eight rows, each an array of eight cells.  Rows are either real lanes or
//! placeholders standing in for lanes the road does not have.  Columns run
//! from far behind (0) through alongside (3) to far ahead (7).

use std::fmt;

use ad_core::{LaneId, RoadLaneId};

/// Column holding the ego vehicle and anything exactly alongside it.
pub const ALIGNED_COL: usize = 3;

pub const COLS: usize = 8;

#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, Default)]
#[repr(u8)]
pub enum Cell {
    #[default]
    Empty = 0,
    Ego = 1,
    Car = 2,
    NoLane = 3,
}

impl Cell {
    #[inline]
    pub fn code(self) -> u8 {
        self as u8
    }
}

/// Placeholder rows for lanes that do not exist.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum Placeholder {
    LeftOuterLane,
    LeftInnerLane,
    NoFourthLane,
    NoOpposingDirection,
    NoOtherRightLane,
    NoOwnRightLane,
    RightInnerLane,
    RightOuterLane,
}

impl Placeholder {
    pub fn as_str(self) -> &'static str {
        match self {
            Placeholder::LeftOuterLane       => "left_outer_lane",
            Placeholder::LeftInnerLane       => "left_inner_lane",
            Placeholder::NoFourthLane        => "no_4th_lane",
            Placeholder::NoOpposingDirection => "no_opposing_direction",
            Placeholder::NoOtherRightLane    => "no_other_right_lane",
            Placeholder::NoOwnRightLane      => "no_own_right_lane",
            Placeholder::RightInnerLane      => "right_inner_lane",
            Placeholder::RightOuterLane      => "right_outer_lane",
        }
    }
}

#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum RowKey {
    Lane(RoadLaneId),
    Placeholder(Placeholder),
}

impl RowKey {
    #[inline]
    pub fn lane(&self) -> Option<RoadLaneId> {
        match self {
            RowKey::Lane(rl) => Some(*rl),
            RowKey::Placeholder(_) => None,
        }
    }
}

impl fmt::Display for RowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RowKey::Lane(rl) => write!(f, "{rl}"),
            RowKey::Placeholder(p) => f.write_str(p.as_str()),
        }
    }
}

pub type Row = [Cell; COLS];

/// Ordered rows of the occupancy grid.
///
/// Placeholder rows are all [`Cell::NoLane`] and never change; lane rows
/// start all [`Cell::Empty`].
#[derive(Clone, Debug, PartialEq)]
pub struct DetectionMatrix {
    rows: Vec<(RowKey, Row)>,
}

impl DetectionMatrix {
    pub(crate) fn from_keys(keys: impl IntoIterator<Item = RowKey>) -> Self {
        let rows = keys
            .into_iter()
            .map(|k| {
                let fill = match k {
                    RowKey::Lane(_) => Cell::Empty,
                    RowKey::Placeholder(_) => Cell::NoLane,
                };
                (k, [fill; COLS])
            })
            .collect();
        Self { rows }
    }

    pub fn rows(&self) -> impl Iterator<Item = (&RowKey, &Row)> {
        self.rows.iter().map(|(k, r)| (k, r))
    }

    pub fn keys(&self) -> impl Iterator<Item = &RowKey> {
        self.rows.iter().map(|(k, _)| k)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn lane_row(&self, lane: RoadLaneId) -> Option<&Row> {
        self.rows.iter().find(|(k, _)| *k == RowKey::Lane(lane)).map(|(_, r)| r)
    }

    fn lane_row_mut(&mut self, lane: RoadLaneId) -> Option<&mut Row> {
        self.rows.iter_mut().find(|(k, _)| *k == RowKey::Lane(lane)).map(|(_, r)| r)
    }

    pub fn has_lane(&self, lane: RoadLaneId) -> bool {
        self.lane_row(lane).is_some()
    }

    /// `true` if any lane row carries `lane` regardless of road.
    pub fn has_lane_id(&self, lane: LaneId) -> bool {
        self.keys().any(|k| k.lane().is_some_and(|rl| rl.lane == lane))
    }

    /// Write `cell` at (`lane`, `col`).  Ego cells are never overwritten and
    /// placeholder rows cannot be addressed.  Returns `false` if nothing was
    /// written.
    pub fn place(&mut self, lane: RoadLaneId, col: usize, cell: Cell) -> bool {
        let Some(row) = self.lane_row_mut(lane) else { return false };
        match row.get_mut(col) {
            Some(slot) if *slot != Cell::Ego => {
                *slot = cell;
                true
            }
            _ => false,
        }
    }

    /// Position of the ego cell, if marked.
    pub fn ego_position(&self) -> Option<(RoadLaneId, usize)> {
        self.rows.iter().find_map(|(k, r)| {
            let col = r.iter().position(|&c| c == Cell::Ego)?;
            k.lane().map(|rl| (rl, col))
        })
    }

    pub fn count(&self, cell: Cell) -> usize {
        self.rows.iter().flat_map(|(_, r)| r.iter()).filter(|&&c| c == cell).count()
    }

    /// Row values as integer codes, in row order.
    pub fn to_rows(&self) -> Vec<[u8; COLS]> {
        self.rows.iter().map(|(_, r)| r.map(Cell::code)).collect()
    }

    /// `true` if any cell in columns `cols` of `lane` holds another vehicle.
    pub fn occupied(&self, lane: RoadLaneId, cols: std::ops::RangeInclusive<usize>) -> bool {
        self.lane_row(lane)
            .is_some_and(|r| r[cols].iter().any(|&c| c == Cell::Car))
    }
}

impl fmt::Display for DetectionMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (key, row) in &self.rows {
            write!(f, "{key:>24}:")?;
            for c in row {
                write!(f, " {}", c.code())?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
