// Grid configuration - Tempo and meter of a beat grid

use super::{GridError, GridResult};
use std::fmt;

/// Default tempo in beats per minute
pub const DEFAULT_TEMPO: f64 = 120.0;
/// Default number of beats in a bar
pub const DEFAULT_BEATS_PER_BAR: u32 = 4;
/// Default number of bars in a phrase
pub const DEFAULT_BARS_PER_PHRASE: u32 = 8;

/// Tempo and meter of a beat grid (everything but the origin)
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct GridConfig {
    /// Beats per minute
    pub tempo: f64,
    pub beats_per_bar: u32,
    pub bars_per_phrase: u32,
}

impl GridConfig {
    pub fn new(tempo: f64, beats_per_bar: u32, bars_per_phrase: u32) -> Self {
        Self {
            tempo,
            beats_per_bar,
            bars_per_phrase,
        }
    }

    /// Check the meter fields.
    ///
    /// Tempo is deliberately left unchecked: a zero or negative tempo is the
    /// caller's responsibility and produces degenerate intervals.
    pub fn validate(&self) -> GridResult<()> {
        validate_positive("beats_per_bar", self.beats_per_bar)?;
        validate_positive("bars_per_phrase", self.bars_per_phrase)
    }
}

impl Default for GridConfig {
    fn default() -> Self {
        Self::new(DEFAULT_TEMPO, DEFAULT_BEATS_PER_BAR, DEFAULT_BARS_PER_PHRASE)
    }
}

impl fmt::Display for GridConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:.1} BPM, {} beats/bar, {} bars/phrase",
            self.tempo, self.beats_per_bar, self.bars_per_phrase
        )
    }
}

pub(crate) fn validate_positive(field: &str, value: u32) -> GridResult<()> {
    if value > 0 {
        Ok(())
    } else {
        Err(GridError::Validation(format!(
            "{} must be greater than zero",
            field
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = GridConfig::default();
        assert_eq!(config.tempo, 120.0);
        assert_eq!(config.beats_per_bar, 4);
        assert_eq!(config.bars_per_phrase, 8);
        assert!(config.validate().is_ok());
        assert_eq!(config.to_string(), "120.0 BPM, 4 beats/bar, 8 bars/phrase");
    }

    #[test]
    fn test_validation() {
        let err = GridConfig::new(120.0, 0, 8).validate().unwrap_err();
        assert_eq!(
            err,
            GridError::Validation("beats_per_bar must be greater than zero".to_string())
        );
        assert!(GridConfig::new(120.0, 3, 0).validate().is_err());

        // Tempo is not validated
        assert!(GridConfig::new(0.0, 4, 8).validate().is_ok());
    }
}
