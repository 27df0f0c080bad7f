// Beat Grid - Library exports
// Beat, bar and phrase positions derived from a tempo and a start instant

pub mod timeline;

// Re-export commonly used types for convenience
pub use timeline::marker::{
    beats_to_milliseconds, enhanced_phase, enhanced_phase_for_ratio, find_closest_delta,
    marker_number, marker_phase, normalize_phase,
};
pub use timeline::{
    BeatGrid, Clock, GridConfig, GridError, GridResult, ManualClock, MarkerUnit, Ratio, Snapshot,
    SystemClock,
};
