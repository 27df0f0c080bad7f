// Timeline - Beat grid anchored at a start instant and driven by a tempo
// Beat, bar and phrase numbers/phases are derived from (origin, tempo, config)

pub mod clock;
pub mod config;
pub mod grid;
pub mod marker;
pub mod ratio;
pub mod snapshot;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::GridConfig;
pub use grid::BeatGrid;
pub use marker::MarkerUnit;
pub use ratio::Ratio;
pub use snapshot::Snapshot;

use thiserror::Error;

/// Beat grid errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GridError {
    #[error("Validation failed: {0}")]
    Validation(String),
}

pub type GridResult<T> = Result<T, GridError>;
