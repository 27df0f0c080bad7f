// Snapshot - Frozen view of a beat grid at one instant
// Every query is a pure function of the captured configuration and instant,
// so a series of questions about the same snapshot always agree

use super::config::GridConfig;
use super::marker::{self, MarkerUnit};
use super::GridResult;
use chrono::{DateTime, SecondsFormat, Utc};
use std::fmt;

/// Immutable beat grid state at a fixed instant
///
/// Holds copies of the grid's origin, tempo and meter; the grid may keep
/// changing without affecting a snapshot already taken.
///
/// Serializes as its five defining fields. The cached intervals are always
/// recomputed on deserialization, so they can never contradict the tempo.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(from = "FrozenGrid", into = "FrozenGrid")]
pub struct Snapshot {
    origin: i64,
    tempo: f64,
    beats_per_bar: u32,
    bars_per_phrase: u32,
    instant: i64,
    beat_interval: f64,
    bar_interval: f64,
    phrase_interval: f64,
}

/// Serialized form of a [`Snapshot`]
#[derive(serde::Serialize, serde::Deserialize)]
struct FrozenGrid {
    origin: i64,
    tempo: f64,
    beats_per_bar: u32,
    bars_per_phrase: u32,
    instant: i64,
}

impl From<FrozenGrid> for Snapshot {
    fn from(frozen: FrozenGrid) -> Self {
        let config = GridConfig::new(frozen.tempo, frozen.beats_per_bar, frozen.bars_per_phrase);
        Snapshot::new(frozen.origin, config, frozen.instant)
    }
}

impl From<Snapshot> for FrozenGrid {
    fn from(snapshot: Snapshot) -> Self {
        Self {
            origin: snapshot.origin,
            tempo: snapshot.tempo,
            beats_per_bar: snapshot.beats_per_bar,
            bars_per_phrase: snapshot.bars_per_phrase,
            instant: snapshot.instant,
        }
    }
}

impl Snapshot {
    /// Freeze a grid configuration with origin `origin` at `instant`
    pub fn new(origin: i64, config: GridConfig, instant: i64) -> Self {
        let GridConfig {
            tempo,
            beats_per_bar,
            bars_per_phrase,
        } = config;

        Self {
            origin,
            tempo,
            beats_per_bar,
            bars_per_phrase,
            instant,
            beat_interval: MarkerUnit::Beat.interval(tempo, beats_per_bar, bars_per_phrase),
            bar_interval: MarkerUnit::Bar.interval(tempo, beats_per_bar, bars_per_phrase),
            phrase_interval: MarkerUnit::Phrase.interval(tempo, beats_per_bar, bars_per_phrase),
        }
    }

    /// Timestamp at which beat 1 / bar 1 / phrase 1 begins
    pub fn origin(&self) -> i64 {
        self.origin
    }

    pub fn tempo(&self) -> f64 {
        self.tempo
    }

    pub fn beats_per_bar(&self) -> u32 {
        self.beats_per_bar
    }

    pub fn bars_per_phrase(&self) -> u32 {
        self.bars_per_phrase
    }

    /// The moment this snapshot describes
    pub fn instant(&self) -> i64 {
        self.instant
    }

    pub fn config(&self) -> GridConfig {
        GridConfig::new(self.tempo, self.beats_per_bar, self.bars_per_phrase)
    }

    // Intervals

    /// Duration of one marker of `unit` in milliseconds
    pub fn interval(&self, unit: MarkerUnit) -> f64 {
        match unit {
            MarkerUnit::Beat => self.beat_interval,
            MarkerUnit::Bar => self.bar_interval,
            MarkerUnit::Phrase => self.phrase_interval,
        }
    }

    pub fn beat_interval(&self) -> f64 {
        self.beat_interval
    }

    pub fn bar_interval(&self) -> f64 {
        self.bar_interval
    }

    pub fn phrase_interval(&self) -> f64 {
        self.phrase_interval
    }

    // Marker numbers (1-based, <= 0 before the origin)

    pub fn number(&self, unit: MarkerUnit) -> i64 {
        marker::marker_number(self.instant, self.origin, self.interval(unit))
    }

    pub fn beat(&self) -> i64 {
        self.number(MarkerUnit::Beat)
    }

    pub fn bar(&self) -> i64 {
        self.number(MarkerUnit::Bar)
    }

    pub fn phrase(&self) -> i64 {
        self.number(MarkerUnit::Phrase)
    }

    // Phases in [0.0, 1.0)

    pub fn phase(&self, unit: MarkerUnit) -> f64 {
        marker::marker_phase(self.instant, self.origin, self.interval(unit))
    }

    pub fn beat_phase(&self) -> f64 {
        self.phase(MarkerUnit::Beat)
    }

    pub fn bar_phase(&self) -> f64 {
        self.phase(MarkerUnit::Bar)
    }

    pub fn phrase_phase(&self) -> f64 {
        self.phase(MarkerUnit::Phrase)
    }

    // Marker start times

    /// Timestamp at which marker `number` of `unit` begins, rounded to the millisecond
    pub fn time_of(&self, unit: MarkerUnit, number: i64) -> i64 {
        let offset = (number.saturating_sub(1) as f64 * self.interval(unit)).round() as i64;
        self.origin.saturating_add(offset)
    }

    pub fn time_of_beat(&self, beat: i64) -> i64 {
        self.time_of(MarkerUnit::Beat, beat)
    }

    pub fn time_of_bar(&self, bar: i64) -> i64 {
        self.time_of(MarkerUnit::Bar, bar)
    }

    pub fn time_of_phrase(&self, phrase: i64) -> i64 {
        self.time_of(MarkerUnit::Phrase, phrase)
    }

    // Position within the enclosing marker

    /// Beat number within the current bar, 1 ..= beats_per_bar
    pub fn beat_within_bar(&self) -> u32 {
        position_within(self.bar_phase(), self.beats_per_bar)
    }

    /// True during the first beat of a bar
    pub fn is_down_beat(&self) -> bool {
        self.beat_within_bar() == 1
    }

    /// Beat number within the current phrase, 1 ..= beats_per_bar * bars_per_phrase
    pub fn beat_within_phrase(&self) -> u32 {
        position_within(
            self.phrase_phase(),
            self.beats_per_bar.saturating_mul(self.bars_per_phrase),
        )
    }

    /// True during the first beat of a phrase
    pub fn is_phrase_start(&self) -> bool {
        self.beat_within_phrase() == 1
    }

    /// Bar number within the current phrase, 1 ..= bars_per_phrase
    pub fn bar_within_phrase(&self) -> u32 {
        position_within(self.phrase_phase(), self.bars_per_phrase)
    }

    // Distance to the nearest boundary

    /// Signed milliseconds to the closest `unit` boundary.
    ///
    /// Positive when the boundary has just passed, negative when it is upcoming.
    pub fn distance_from(&self, unit: MarkerUnit) -> f64 {
        marker::find_closest_delta(self.phase(unit)) * self.interval(unit)
    }

    pub fn distance_from_beat(&self) -> f64 {
        self.distance_from(MarkerUnit::Beat)
    }

    pub fn distance_from_bar(&self) -> f64 {
        self.distance_from(MarkerUnit::Bar)
    }

    pub fn distance_from_phrase(&self) -> f64 {
        self.distance_from(MarkerUnit::Phrase)
    }

    // Enhanced phases

    /// Phase of an oscillator running at `ratio` times the period of `unit`
    /// (0.5 runs twice per marker, 2.0 once every two markers)
    pub fn enhanced_phase(&self, unit: MarkerUnit, ratio: f64) -> GridResult<f64> {
        marker::enhanced_phase_for_ratio(self.number(unit), self.phase(unit), ratio)
    }

    pub fn enhanced_beat_phase(&self, ratio: f64) -> GridResult<f64> {
        self.enhanced_phase(MarkerUnit::Beat, ratio)
    }

    pub fn enhanced_bar_phase(&self, ratio: f64) -> GridResult<f64> {
        self.enhanced_phase(MarkerUnit::Bar, ratio)
    }

    pub fn enhanced_phrase_phase(&self, ratio: f64) -> GridResult<f64> {
        self.enhanced_phase(MarkerUnit::Phrase, ratio)
    }

    /// Position as "phrase.bar.beat" (bar within phrase, beat within bar)
    pub fn marker(&self) -> String {
        format!(
            "{}.{}.{}",
            self.phrase(),
            self.bar_within_phrase(),
            self.beat_within_bar()
        )
    }
}

impl fmt::Display for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Snapshot[marker: {}, origin: {} ({}), instant: {} ({}), beat phase: {:.4}, \
             bar phase: {:.4}, phrase phase: {:.4}, tempo: {:.2}, beats/bar: {}, \
             bars/phrase: {}, intervals: {:.2}/{:.2}/{:.2} ms]",
            self.marker(),
            self.origin,
            format_timestamp(self.origin),
            self.instant,
            format_timestamp(self.instant),
            self.beat_phase(),
            self.bar_phase(),
            self.phrase_phase(),
            self.tempo,
            self.beats_per_bar,
            self.bars_per_phrase,
            self.beat_interval,
            self.bar_interval,
            self.phrase_interval
        )
    }
}

/// 1-based slot of `phase` when a marker is split into `count` equal parts
fn position_within(phase: f64, count: u32) -> u32 {
    let size = 1.0 / count as f64;
    let slot = (phase / size).floor() as u32;
    slot.saturating_add(1).min(count.max(1))
}

fn format_timestamp(millis: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(millis)
        .map(|time| time.to_rfc3339_opts(SecondsFormat::Millis, true))
        .unwrap_or_else(|| "out of range".to_string())
}
