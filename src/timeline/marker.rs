// Marker arithmetic - Pure conversions between instants and marker numbers/phases
// A marker is a beat, bar or phrase: a 1-based number plus a phase in [0.0, 1.0)

use super::ratio::Ratio;
use super::GridResult;
use std::fmt;

/// Milliseconds in one minute (tempo is expressed in beats per minute)
pub const MILLIS_PER_MINUTE: f64 = 60_000.0;

/// Marker level of the grid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum MarkerUnit {
    Beat,
    Bar,
    Phrase,
}

impl MarkerUnit {
    /// All marker levels, shortest first
    pub const ALL: [MarkerUnit; 3] = [MarkerUnit::Beat, MarkerUnit::Bar, MarkerUnit::Phrase];

    /// Number of beats spanned by one marker of this level
    pub fn beats(self, beats_per_bar: u32, bars_per_phrase: u32) -> u64 {
        match self {
            MarkerUnit::Beat => 1,
            MarkerUnit::Bar => beats_per_bar as u64,
            MarkerUnit::Phrase => beats_per_bar as u64 * bars_per_phrase as u64,
        }
    }

    /// Duration of one marker of this level in milliseconds
    pub fn interval(self, tempo: f64, beats_per_bar: u32, bars_per_phrase: u32) -> f64 {
        beat_interval(tempo) * self.beats(beats_per_bar, bars_per_phrase) as f64
    }
}

impl fmt::Display for MarkerUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MarkerUnit::Beat => "beat",
            MarkerUnit::Bar => "bar",
            MarkerUnit::Phrase => "phrase",
        };
        f.write_str(name)
    }
}

/// Duration of one beat in milliseconds.
///
/// A zero or negative tempo is not rejected here: it yields an infinite or
/// negative interval and every derived value degenerates accordingly.
pub fn beat_interval(tempo: f64) -> f64 {
    MILLIS_PER_MINUTE / tempo
}

/// Milliseconds taken by `beats` beats at `tempo`, rounded to the nearest millisecond
pub fn beats_to_milliseconds(beats: i64, tempo: f64) -> i64 {
    (beat_interval(tempo) * beats as f64).round() as i64
}

/// Marker number in effect at `instant` for a grid starting at `origin`.
///
/// Instants before the origin give numbers <= 0. Degenerate intervals saturate
/// instead of overflowing.
pub fn marker_number(instant: i64, origin: i64, interval: f64) -> i64 {
    let elapsed = instant.saturating_sub(origin) as f64 / interval;
    (elapsed.floor() as i64).saturating_add(1)
}

/// Progress through the current marker at `instant`, in [0.0, 1.0)
pub fn marker_phase(instant: i64, origin: i64, interval: f64) -> f64 {
    fractional_part(instant.saturating_sub(origin) as f64 / interval)
}

/// Map any phase into [0.0, 1.0) by discarding its integer part
pub fn normalize_phase(phase: f64) -> f64 {
    let fractional = phase.fract();
    if fractional < 0.0 {
        wrap_unit(fractional + 1.0)
    } else {
        fractional
    }
}

/// Smallest-magnitude delta that reaches the same phase as `delta` modulo 1.
///
/// Keeps phase corrections within half a marker in either direction.
pub fn find_closest_delta(delta: f64) -> f64 {
    if delta > 0.5 {
        delta - 1.0
    } else if delta < -0.5 {
        delta + 1.0
    } else {
        delta
    }
}

/// Phase of a virtual oscillator completing `denominator` cycles every `numerator` markers.
///
/// `marker` and `phase` are the current marker number and phase. A ratio of 1/1 returns
/// `phase` unchanged; 1/2 runs twice per marker; 2/1 takes two markers per cycle.
/// Only positive numerators and denominators are meaningful.
///
/// The position within the `numerator`-marker cycle is
/// `(((marker - 1) mod numerator) + phase) / numerator`, so the marker index
/// always counts toward the cycle, including when `denominator` is 1. Adding
/// `phase / numerator` to the bare index instead would make every 2/1 cycle
/// restart at each marker.
pub fn enhanced_phase(marker: i64, phase: f64, numerator: i64, denominator: i64) -> f64 {
    let base = if numerator > 1 {
        (marker.saturating_sub(1).rem_euclid(numerator) as f64 + phase) / numerator as f64
    } else {
        phase
    };
    fractional_part(base * denominator as f64)
}

/// Like [`enhanced_phase`], with the ratio given as a real number.
///
/// The ratio is converted with [`Ratio::approximate`], so `0.5` becomes 1/2 and
/// `0.333...` becomes 1/3.
pub fn enhanced_phase_for_ratio(marker: i64, phase: f64, desired_ratio: f64) -> GridResult<f64> {
    let ratio = Ratio::approximate(desired_ratio)?;
    Ok(enhanced_phase(
        marker,
        phase,
        ratio.numerator(),
        ratio.denominator(),
    ))
}

/// `value - floor(value)`, kept strictly below 1.0
fn fractional_part(value: f64) -> f64 {
    wrap_unit(value - value.floor())
}

// Tiny negative inputs round up to exactly 1.0
fn wrap_unit(value: f64) -> f64 {
    if value >= 1.0 { 0.0 } else { value }
}
