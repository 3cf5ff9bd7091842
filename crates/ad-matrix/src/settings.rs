//! Tunable thresholds for matrix construction and refresh.

use std::time::Duration;

/// How the agent keeps its detection matrix fresh.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum MatrixMode {
    /// No matrix is built.
    #[default]
    Off,
    /// Rebuilt on the agent thread every `sync_interval_ticks` updates.
    Sync,
    /// Rebuilt continuously on a background worker thread.
    Async,
}

/// Distance buckets and refresh cadence.
///
/// Distances are metres.  `ahead_m[i]` is the upper bound of column `4 + i`;
/// `behind_m[i]` of column `2 - i`.  On a highway every bound is multiplied
/// by `highway_factor`.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct MatrixSettings {
    pub mode: MatrixMode,
    /// Vehicles farther than this from ego are ignored.
    pub radius_m: f32,
    /// Longitudinal offset below which a vehicle counts as alongside ego.
    pub alongside_m: f32,
    pub ahead_m: [f32; 4],
    pub behind_m: [f32; 3],
    pub highway_factor: f32,
    pub sync_interval_ticks: u32,
    /// Pause between background rebuilds.
    pub async_sleep_ms: u64,
    /// Join bound when stopping the background worker; `None` waits forever.
    pub stop_timeout_ms: Option<u64>,
}

impl Default for MatrixSettings {
    fn default() -> Self {
        Self {
            mode: MatrixMode::Off,
            radius_m: 100.0,
            alongside_m: 4.0,
            ahead_m: [10.0, 20.0, 30.0, 40.0],
            behind_m: [10.0, 20.0, 30.0],
            highway_factor: 2.0,
            sync_interval_ticks: 1,
            async_sleep_ms: 100,
            stop_timeout_ms: Some(2_000),
        }
    }
}

impl MatrixSettings {
    /// Column for a vehicle at longitudinal offset `dot` and road distance
    /// `distance`, or `None` if it falls outside every bucket.
    ///
    /// `alongside_free` must be `false` when the vehicle's row already holds
    /// ego in the aligned column.
    pub fn column(&self, dot: f32, distance: f32, on_highway: bool, alongside_free: bool) -> Option<usize> {
        if dot.abs() < self.alongside_m && alongside_free {
            return Some(crate::matrix::ALIGNED_COL);
        }
        let factor = if on_highway { self.highway_factor } else { 1.0 };
        if dot > 0.0 {
            self.ahead_m.iter().position(|&t| distance < t * factor).map(|i| 4 + i)
        } else {
            self.behind_m.iter().position(|&t| distance < t * factor).map(|i| 2 - i)
        }
    }

    pub fn sleep(&self) -> Duration {
        Duration::from_millis(self.async_sleep_ms)
    }

    pub fn stop_timeout(&self) -> Option<Duration> {
        self.stop_timeout_ms.map(Duration::from_millis)
    }
}
