// Beat grid - Shared, mutable timeline of beats, bars and phrases
// Mutators keep the audible position continuous by moving only the origin

use super::clock::{Clock, SystemClock};
use super::config::{validate_positive, GridConfig};
use super::marker::{self, MarkerUnit};
use super::snapshot::Snapshot;
use super::GridResult;
use std::sync::{PoisonError, RwLock, RwLockWriteGuard};

/// Origin plus configuration, guarded as one unit
#[derive(Debug, Clone, Copy, PartialEq)]
struct GridState {
    origin: i64,
    config: GridConfig,
}

impl GridState {
    fn snapshot(&self, instant: i64) -> Snapshot {
        Snapshot::new(self.origin, self.config, instant)
    }

    fn interval(&self, unit: MarkerUnit) -> f64 {
        unit.interval(
            self.config.tempo,
            self.config.beats_per_bar,
            self.config.bars_per_phrase,
        )
    }
}

/// Beat grid anchored at an origin instant and driven by a tempo
///
/// Safe to share between threads (`Arc<BeatGrid>`). Single-value queries read
/// the clock at call time, so consecutive queries may drift relative to each
/// other; take a [`Snapshot`] when several values must agree.
///
/// Getters take a short read lock and copy the state out. They never block
/// each other, but may briefly wait while a mutator holds the write lock.
///
/// Tempo is not validated: a zero, negative or non-finite tempo yields
/// degenerate intervals and positions (saturated or NaN values, never a panic).
/// Keeping it positive is up to the caller.
#[derive(Debug)]
pub struct BeatGrid<C: Clock = SystemClock> {
    state: RwLock<GridState>,
    clock: C,
}

impl BeatGrid<SystemClock> {
    /// Grid starting now at 120 BPM, 4 beats per bar, 8 bars per phrase
    pub fn new() -> Self {
        Self::with_clock(SystemClock)
    }

    /// Grid starting now with the given configuration
    pub fn with_config(config: GridConfig) -> GridResult<Self> {
        Self::with_config_and_clock(config, SystemClock)
    }
}

impl Default for BeatGrid<SystemClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Clock> BeatGrid<C> {
    /// Default grid whose origin is `clock`'s current instant
    pub fn with_clock(clock: C) -> Self {
        let origin = clock.now_millis();
        Self::from_parts(origin, GridConfig::default(), clock)
    }

    pub fn with_config_and_clock(config: GridConfig, clock: C) -> GridResult<Self> {
        config.validate()?;
        let origin = clock.now_millis();
        Ok(Self::from_parts(origin, config, clock))
    }

    fn from_parts(origin: i64, config: GridConfig, clock: C) -> Self {
        log::debug!("Beat grid created at {} ({})", origin, config);
        Self {
            state: RwLock::new(GridState { origin, config }),
            clock,
        }
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    // A poisoned lock still holds consistent plain data

    fn read(&self) -> GridState {
        *self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, GridState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run a read-compute-write step under the write lock, with "now" read inside it
    fn update<R>(&self, apply: impl FnOnce(&mut GridState, i64) -> R) -> R {
        let mut state = self.write();
        let now = self.clock.now_millis();
        apply(&mut *state, now)
    }

    // Configuration

    /// Timestamp at which beat 1 / bar 1 / phrase 1 begins
    pub fn origin(&self) -> i64 {
        self.read().origin
    }

    /// Beats per minute
    pub fn tempo(&self) -> f64 {
        self.read().config.tempo
    }

    pub fn beats_per_bar(&self) -> u32 {
        self.read().config.beats_per_bar
    }

    pub fn bars_per_phrase(&self) -> u32 {
        self.read().config.bars_per_phrase
    }

    pub fn config(&self) -> GridConfig {
        self.read().config
    }

    // Snapshots

    /// Freeze the grid at the current instant
    pub fn snapshot(&self) -> Snapshot {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        let now = self.clock.now_millis();
        let snapshot = state.snapshot(now);
        log::trace!("Snapshot taken at {}: {}", now, snapshot.marker());
        snapshot
    }

    /// Freeze the grid as it would be at `instant`
    pub fn snapshot_at(&self, instant: i64) -> Snapshot {
        self.read().snapshot(instant)
    }

    // Intervals

    pub fn interval(&self, unit: MarkerUnit) -> f64 {
        self.read().interval(unit)
    }

    pub fn beat_interval(&self) -> f64 {
        self.interval(MarkerUnit::Beat)
    }

    pub fn bar_interval(&self) -> f64 {
        self.interval(MarkerUnit::Bar)
    }

    pub fn phrase_interval(&self) -> f64 {
        self.interval(MarkerUnit::Phrase)
    }

    // Positions at the current instant

    pub fn number(&self, unit: MarkerUnit) -> i64 {
        self.snapshot().number(unit)
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

    pub fn phase(&self, unit: MarkerUnit) -> f64 {
        self.snapshot().phase(unit)
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

    /// Timestamp at which marker `number` of `unit` begins, rounded to the millisecond
    pub fn time_of(&self, unit: MarkerUnit, number: i64) -> i64 {
        self.snapshot().time_of(unit, number)
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

    pub fn beat_within_bar(&self) -> u32 {
        self.snapshot().beat_within_bar()
    }

    pub fn is_down_beat(&self) -> bool {
        self.snapshot().is_down_beat()
    }

    pub fn beat_within_phrase(&self) -> u32 {
        self.snapshot().beat_within_phrase()
    }

    pub fn bar_within_phrase(&self) -> u32 {
        self.snapshot().bar_within_phrase()
    }

    pub fn is_phrase_start(&self) -> bool {
        self.snapshot().is_phrase_start()
    }

    /// Signed milliseconds to the closest `unit` boundary (positive = just passed)
    pub fn distance_from(&self, unit: MarkerUnit) -> f64 {
        self.snapshot().distance_from(unit)
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

    /// Current position as "phrase.bar.beat"
    pub fn marker(&self) -> String {
        self.snapshot().marker()
    }

    // Mutators

    /// Change the tempo without moving the current beat or beat phase.
    ///
    /// Only the pacing of future beats changes. The value is not validated.
    pub fn set_tempo(&self, bpm: f64) {
        if !bpm.is_finite() || bpm <= 0.0 {
            log::warn!("Beat grid tempo set to {} BPM; positions will be degenerate", bpm);
        }

        self.update(|state, now| {
            let current = state.snapshot(now);
            let beats_elapsed = current.beat().saturating_sub(1) as f64 + current.beat_phase();
            let shift = marker::beat_interval(bpm) * beats_elapsed;
            let origin = (now as f64 - shift).round() as i64;

            log::debug!(
                "Tempo {} -> {} BPM, origin {} -> {}",
                state.config.tempo,
                bpm,
                state.origin,
                origin
            );
            state.origin = origin;
            state.config.tempo = bpm;
        });
    }

    /// Change the bar length; bar and phrase numbering shift, the origin does not
    pub fn set_beats_per_bar(&self, beats_per_bar: u32) -> GridResult<()> {
        validate_positive("beats_per_bar", beats_per_bar).inspect_err(|err| {
            log::warn!("Rejected beats per bar change: {}", err);
        })?;
        self.update(|state, _| {
            log::debug!(
                "Beats per bar {} -> {}",
                state.config.beats_per_bar,
                beats_per_bar
            );
            state.config.beats_per_bar = beats_per_bar;
        });
        Ok(())
    }

    /// Change the phrase length; phrase numbering shifts, the origin does not
    pub fn set_bars_per_phrase(&self, bars_per_phrase: u32) -> GridResult<()> {
        validate_positive("bars_per_phrase", bars_per_phrase).inspect_err(|err| {
            log::warn!("Rejected bars per phrase change: {}", err);
        })?;
        self.update(|state, _| {
            log::debug!(
                "Bars per phrase {} -> {}",
                state.config.bars_per_phrase,
                bars_per_phrase
            );
            state.config.bars_per_phrase = bars_per_phrase;
        });
        Ok(())
    }

    /// Add `ms` to the origin, e.g. to correct drift against an external clock
    pub fn adjust_start(&self, ms: i64) {
        self.update(|state, _| {
            log::debug!("Origin nudged by {} ms", ms);
            state.origin = state.origin.saturating_add(ms);
        });
    }

    /// Make the current instant the start of marker `number` of `unit`.
    ///
    /// Jumping to a beat resets the beat phase to zero. Jumping to a bar or
    /// phrase keeps the beat phase, folded to its closest boundary, so beat
    /// sync with an external source survives the jump.
    pub fn jump_to(&self, unit: MarkerUnit, number: i64) {
        self.update(|state, now| {
            let beat_shift = match unit {
                MarkerUnit::Beat => 0.0,
                MarkerUnit::Bar | MarkerUnit::Phrase => {
                    let beat_phase = state.snapshot(now).beat_phase();
                    marker::find_closest_delta(beat_phase) * state.interval(MarkerUnit::Beat)
                }
            };
            let offset = number.saturating_sub(1) as f64 * state.interval(unit);
            let origin = (now as f64 - beat_shift - offset).round() as i64;

            log::debug!(
                "Jump to {} {}, origin {} -> {}",
                unit,
                number,
                state.origin,
                origin
            );
            state.origin = origin;
        });
    }

    pub fn jump_to_beat(&self, beat: i64) {
        self.jump_to(MarkerUnit::Beat, beat);
    }

    pub fn jump_to_bar(&self, bar: i64) {
        self.jump_to(MarkerUnit::Bar, bar);
    }

    pub fn jump_to_phrase(&self, phrase: i64) {
        self.jump_to(MarkerUnit::Phrase, phrase);
    }

    /// Nudge the origin so the current `unit` phase becomes `phase`.
    ///
    /// `phase` is normalized into [0.0, 1.0) first. The origin moves by at most
    /// half a `unit` interval in either direction.
    pub fn set_phase(&self, unit: MarkerUnit, phase: f64) {
        self.update(|state, now| {
            let current = state.snapshot(now).phase(unit);
            let delta = marker::find_closest_delta(marker::normalize_phase(phase) - current);
            let shift = (state.interval(unit) * delta).round() as i64;

            log::debug!(
                "{} phase {:.4} -> {:.4}, origin shifted by {} ms",
                unit,
                current,
                phase,
                -shift
            );
            state.origin = state.origin.saturating_sub(shift);
        });
    }

    pub fn set_beat_phase(&self, phase: f64) {
        self.set_phase(MarkerUnit::Beat, phase);
    }

    pub fn set_bar_phase(&self, phase: f64) {
        self.set_phase(MarkerUnit::Bar, phase);
    }

    pub fn set_phrase_phase(&self, phase: f64) {
        self.set_phase(MarkerUnit::Phrase, phase);
    }
}

/// Independent grid with the same origin and configuration
impl<C: Clock + Clone> Clone for BeatGrid<C> {
    fn clone(&self) -> Self {
        Self {
            state: RwLock::new(self.read()),
            clock: self.clock.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timeline::clock::ManualClock;
    use crate::timeline::GridError;

    const EPSILON: f64 = 1e-9;

    fn grid_at_zero() -> (BeatGrid<ManualClock>, ManualClock) {
        let clock = ManualClock::new(0);
        (BeatGrid::with_clock(clock.clone()), clock)
    }

    #[test]
    fn test_defaults() {
        let clock = ManualClock::new(42_000);
        let grid = BeatGrid::with_clock(clock);

        assert_eq!(grid.origin(), 42_000);
        assert_eq!(grid.tempo(), 120.0);
        assert_eq!(grid.beats_per_bar(), 4);
        assert_eq!(grid.bars_per_phrase(), 8);
        assert_eq!(grid.beat(), 1);
        assert_eq!(grid.beat_phase(), 0.0);
        assert_eq!(grid.marker(), "1.1.1");
    }

    #[test]
    fn test_with_config() {
        let clock = ManualClock::new(0);
        let grid =
            BeatGrid::with_config_and_clock(GridConfig::new(90.0, 3, 4), clock.clone()).unwrap();
        assert_eq!(grid.config(), GridConfig::new(90.0, 3, 4));
        assert!((grid.bar_interval() - 2000.0).abs() < EPSILON);

        let result = BeatGrid::with_config_and_clock(GridConfig::new(90.0, 0, 4), clock);
        assert!(matches!(result, Err(GridError::Validation(_))));
    }

    #[test]
    fn test_queries_follow_clock() {
        let (grid, clock) = grid_at_zero();

        clock.set(30000);
        assert_eq!(grid.beat(), 61);
        assert_eq!(grid.beat_phase(), 0.0);

        clock.set(30250);
        assert_eq!(grid.beat(), 61);
        assert!((grid.beat_phase() - 0.5).abs() < EPSILON);
        assert_eq!(grid.bar(), 16);
        assert_eq!(grid.phrase(), 2);
        assert_eq!(grid.time_of_beat(61), 30000);
        assert_eq!(grid.time_of_bar(16), 30000);
        assert_eq!(grid.time_of_phrase(2), 16000);
    }

    #[test]
    fn test_set_tempo_preserves_position() {
        let (grid, clock) = grid_at_zero();
        clock.set(30250);
        let before = grid.snapshot();

        grid.set_tempo(140.0);
        let after = grid.snapshot();

        assert_eq!(grid.tempo(), 140.0);
        assert_eq!(after.beat(), before.beat());
        let tolerance = 1.0 / after.beat_interval();
        assert!((after.beat_phase() - before.beat_phase()).abs() <= tolerance);

        // Future beats follow the new tempo
        let next = after.time_of_beat(after.beat() + 1);
        clock.set(next);
        assert_eq!(grid.beat(), before.beat() + 1);
    }

    #[test]
    fn test_zero_tempo_before_first_beat() {
        // Negative beat position with an infinite beat interval
        let clock = ManualClock::new(1_700_000_000_000);
        let grid = BeatGrid::with_clock(clock.clone());
        grid.jump_to_beat(0);
        grid.set_tempo(0.0);

        assert_eq!(grid.tempo(), 0.0);
        assert!(grid.beat_interval().is_infinite());
        assert_eq!(grid.origin(), i64::MAX);

        clock.advance(250);
        let _ = grid.beat();
        let _ = grid.beat_phase();
        let _ = grid.marker();
        let _ = grid.snapshot().to_string();
        let _ = grid.time_of_beat(i64::MIN);
        let _ = grid.time_of_bar(i64::MAX);
        let _ = grid.distance_from_beat();

        grid.set_beat_phase(0.3);
        grid.jump_to_bar(2);
        grid.adjust_start(i64::MAX);
        grid.adjust_start(i64::MIN);
        assert_eq!(grid.tempo(), 0.0);
    }

    #[test]
    fn test_degenerate_tempos_accepted() {
        let (grid, clock) = grid_at_zero();
        clock.set(30250);

        grid.set_tempo(-120.0);
        assert_eq!(grid.tempo(), -120.0);
        assert_eq!(grid.beat_interval(), -500.0);
        let _ = grid.snapshot().to_string();
        assert!((1..=4).contains(&grid.beat_within_bar()));

        grid.set_tempo(f64::NAN);
        assert!(grid.tempo().is_nan());
        assert!(grid.beat_interval().is_nan());
        clock.advance(1_000);
        let _ = grid.beat();
        let _ = grid.marker();
        let _ = grid.distance_from_phrase();
        grid.set_bar_phase(0.5);
        grid.jump_to_phrase(3);

        // Recovers once a usable tempo is set again
        grid.set_tempo(120.0);
        grid.jump_to_beat(5);
        assert_eq!(grid.beat(), 5);
        assert_eq!(grid.beat_phase(), 0.0);
    }

    #[test]
    fn test_set_beats_per_bar() {
        let (grid, _clock) = grid_at_zero();

        assert!(grid.set_beats_per_bar(3).is_ok());
        assert_eq!(grid.beats_per_bar(), 3);
        assert_eq!(grid.bar_interval(), 1500.0);
        assert_eq!(grid.origin(), 0);

        let err = grid.set_beats_per_bar(0).unwrap_err();
        assert!(matches!(err, GridError::Validation(_)));
        assert_eq!(grid.beats_per_bar(), 3);
    }

    #[test]
    fn test_set_bars_per_phrase() {
        let (grid, _clock) = grid_at_zero();

        assert!(grid.set_bars_per_phrase(0).is_err());
        assert_eq!(grid.bars_per_phrase(), 8);

        grid.set_bars_per_phrase(16).unwrap();
        assert_eq!(grid.phrase_interval(), 32000.0);
    }

    #[test]
    fn test_adjust_start() {
        let (grid, clock) = grid_at_zero();
        clock.set(1000);

        grid.adjust_start(-100);
        assert_eq!(grid.origin(), -100);
        assert!((grid.beat_phase() - 0.2).abs() < EPSILON);
    }

    #[test]
    fn test_jump_to_beat() {
        let (grid, clock) = grid_at_zero();
        clock.set(12_345);

        grid.jump_to_beat(5);
        assert_eq!(grid.origin(), 10_345);
        assert_eq!(grid.beat(), 5);
        assert_eq!(grid.beat_phase(), 0.0);
    }

    #[test]
    fn test_jump_to_bar_keeps_beat_phase() {
        let (grid, clock) = grid_at_zero();
        clock.set(1100); // beat phase 0.2

        grid.jump_to_bar(3);
        assert_eq!(grid.origin(), -3000);
        assert_eq!(grid.bar(), 3);
        assert!((grid.beat_phase() - 0.2).abs() < EPSILON);
    }

    #[test]
    fn test_jump_to_bar_late_in_beat() {
        let (grid, clock) = grid_at_zero();
        clock.set(1450); // beat phase 0.9, folds to -0.1

        grid.jump_to_bar(3);
        assert_eq!(grid.origin(), -2500);
        // Bar 3 starts 50ms from now
        assert!((grid.distance_from_bar() - (-50.0)).abs() < EPSILON);
        assert!((grid.beat_phase() - 0.9).abs() < EPSILON);
    }

    #[test]
    fn test_jump_to_phrase() {
        let (grid, clock) = grid_at_zero();
        clock.set(1100);

        grid.jump_to_phrase(2);
        assert_eq!(grid.origin(), -15_000);
        assert_eq!(grid.phrase(), 2);
        assert!(grid.is_phrase_start());
        assert!((grid.beat_phase() - 0.2).abs() < EPSILON);
    }

    #[test]
    fn test_set_beat_phase_moves_least() {
        let (grid, clock) = grid_at_zero();
        clock.set(1100); // beat 3, phase 0.2

        grid.set_beat_phase(0.75);
        assert_eq!(grid.origin(), 225);
        assert!((grid.beat_phase() - 0.75).abs() < EPSILON);
        assert_eq!(grid.beat(), 2);

        grid.set_beat_phase(1.25);
        assert!((grid.beat_phase() - 0.25).abs() < EPSILON);
    }

    #[test]
    fn test_set_bar_and_phrase_phase() {
        let (grid, clock) = grid_at_zero();
        clock.set(500);

        grid.set_bar_phase(-0.25);
        assert!((grid.bar_phase() - 0.75).abs() < EPSILON);
        assert!(grid.origin().abs() <= 1000);

        grid.set_phrase_phase(0.5);
        assert!((grid.phrase_phase() - 0.5).abs() < EPSILON);
    }

    #[test]
    fn test_distance_from_beat() {
        let (grid, clock) = grid_at_zero();

        clock.set(450);
        assert!(grid.distance_from_beat() < 0.0);

        clock.set(550);
        assert!(grid.distance_from_beat() > 0.0);
    }

    #[test]
    fn test_snapshot_is_frozen() {
        let (grid, clock) = grid_at_zero();
        clock.set(30250);
        let snapshot = grid.snapshot();

        clock.advance(10_000);
        grid.set_tempo(90.0);
        grid.adjust_start(123);

        assert_eq!(snapshot.instant(), 30250);
        assert_eq!(snapshot.origin(), 0);
        assert_eq!(snapshot.tempo(), 120.0);
        assert_eq!(snapshot.beat(), 61);
        assert!((snapshot.beat_phase() - 0.5).abs() < EPSILON);
    }

    #[test]
    fn test_snapshot_at() {
        let (grid, _clock) = grid_at_zero();
        let snapshot = grid.snapshot_at(2100);
        assert_eq!(snapshot.bar(), 2);
        assert!(snapshot.is_down_beat());
    }

    #[test]
    fn test_clone_is_independent() {
        let (grid, clock) = grid_at_zero();
        grid.set_tempo(100.0);
        let copy = grid.clone();

        assert_eq!(copy.origin(), grid.origin());
        assert_eq!(copy.config(), grid.config());

        copy.adjust_start(500);
        copy.set_beats_per_bar(7).unwrap();
        assert_eq!(grid.beats_per_bar(), 4);
        assert_ne!(copy.origin(), grid.origin());

        // Clock handle is shared
        clock.set(9_000);
        assert_eq!(copy.clock().now_millis(), 9_000);
    }
}
