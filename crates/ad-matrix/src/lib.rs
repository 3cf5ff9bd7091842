//! `ad-matrix`: lane-relative occupancy grid around the ego vehicle.
//!
//! # Crate layout
//!
//! | Module         | Contents                                                  |
//! |----------------|-----------------------------------------------------------|
//! | [`matrix`]     | `DetectionMatrix`, `Cell`, `RowKey`, placeholders         |
//! | [`lanes`]      | Splitting lane ids into direction runs                    |
//! | [`template`]   | The six row layouts and their selection                   |
//! | [`geometry`]   | Highway test, adjacent-road lookup, longitudinal distance |
//! | [`build`]      | `build_matrix`, `MatrixSource`, `WorldMatrixSource`       |
//! | [`settings`]   | `MatrixSettings`, `MatrixMode`                            |
//! | [`updater`]    | `MatrixUpdater`, `SyncMatrix`, `MatrixWorker`              |
//! | [`shutdown`]   | `stop_all` for interrupt handlers                         |
//! | [`error`]      | `MatrixError`, `MatrixResult<T>`                          |
//!
//! # Feature flags
//!
//! | Feature | Effect                                                    |
//! |---------|-----------------------------------------------------------|
//! | `serde` | Adds `Serialize`/`Deserialize` to `MatrixSettings`.       |

pub mod build;
pub mod error;
pub mod geometry;
pub mod lanes;
pub mod matrix;
pub mod settings;
pub mod shutdown;
pub mod template;
pub mod updater;

#[cfg(test)]
mod tests;

// ── Re-exports ────────────────────────────────────────────────────────────────

pub use build::{build_matrix, BuildOptions, MatrixReport, MatrixSource, WorldMatrixSource};
pub use error::{MatrixError, MatrixResult};
pub use geometry::HighwayShape;
pub use matrix::{Cell, DetectionMatrix, Placeholder, RowKey, ALIGNED_COL};
pub use settings::{MatrixMode, MatrixSettings};
pub use template::Template;
pub use updater::{MatrixWorker, MatrixUpdater, SyncMatrix};
