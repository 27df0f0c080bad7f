// Clock - Source of "now" for beat grid queries
// The embedding system owns the wall clock; the grid only reads it

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

/// Millisecond wall-clock source
pub trait Clock: Send + Sync {
    /// Current instant as a millisecond timestamp
    fn now_millis(&self) -> i64;
}

/// System wall clock (milliseconds since the Unix epoch, UTC)
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

/// Externally driven clock
///
/// Clones share the same instant, so one handle can be given to a grid while
/// another advances it (e.g. from an external sync source or a test).
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    instant: Arc<AtomicI64>,
}

impl ManualClock {
    pub fn new(instant: i64) -> Self {
        Self {
            instant: Arc::new(AtomicI64::new(instant)),
        }
    }

    /// Set the current instant
    pub fn set(&self, instant: i64) {
        self.instant.store(instant, Ordering::Relaxed);
    }

    /// Move the current instant forward (or back, for negative values)
    pub fn advance(&self, millis: i64) -> i64 {
        self.instant.fetch_add(millis, Ordering::Relaxed) + millis
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> i64 {
        self.instant.load(Ordering::Relaxed)
    }
}
