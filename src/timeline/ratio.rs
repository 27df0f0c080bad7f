// Ratio - Rational approximation of real-valued oscillator ratios
// Continued-fraction expansion with an absolute error bound and a denominator cap

use super::{GridError, GridResult};
use std::fmt;

/// Absolute error accepted when converting a real ratio to a fraction
pub const RATIO_TOLERANCE: f64 = 2.0e-8;

/// Largest denominator a converted ratio may have
pub const MAX_RATIO_DENOMINATOR: i64 = 10_000;

/// Upper bound on continued-fraction terms
const MAX_ITERATIONS: usize = 100;

/// Positive fraction `numerator / denominator`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ratio {
    numerator: i64,
    denominator: i64,
}

impl Ratio {
    /// Best fraction for `value` within [`RATIO_TOLERANCE`] and [`MAX_RATIO_DENOMINATOR`]
    pub fn approximate(value: f64) -> GridResult<Self> {
        Self::approximate_within(value, RATIO_TOLERANCE, MAX_RATIO_DENOMINATOR)
    }

    /// Continued-fraction approximation of `value`.
    ///
    /// Stops at the first convergent within `tolerance` of `value`, or at the last
    /// convergent whose denominator does not exceed `max_denominator`. The result is
    /// deterministic for a given input and bounds.
    ///
    /// Values too small to reach a non-zero numerator within the bounds are rejected.
    pub fn approximate_within(
        value: f64,
        tolerance: f64,
        max_denominator: i64,
    ) -> GridResult<Self> {
        if !value.is_finite() || value <= 0.0 {
            return Err(GridError::Validation(format!(
                "ratio must be a positive finite number, got {}",
                value
            )));
        }

        let whole = value.floor();
        if whole >= i64::MAX as f64 {
            return Err(GridError::Validation(format!(
                "ratio {} is too large to express as a fraction",
                value
            )));
        }

        let mut term = whole as i64;
        if (whole - value).abs() <= tolerance {
            return Self::positive(value, term, 1, max_denominator);
        }

        // Convergents h(n-2)/k(n-2) and h(n-1)/k(n-1)
        let (mut p0, mut q0) = (1i64, 0i64);
        let (mut p1, mut q1) = (term, 1i64);
        let mut remainder = value;

        for _ in 0..MAX_ITERATIONS {
            let next_remainder = 1.0 / (remainder - term as f64);
            if !next_remainder.is_finite() {
                break;
            }
            let next_term = next_remainder.floor() as i64;

            let p2 = next_term.checked_mul(p1).and_then(|p| p.checked_add(p0));
            let q2 = next_term.checked_mul(q1).and_then(|q| q.checked_add(q0));
            let (Some(p2), Some(q2)) = (p2, q2) else {
                break;
            };
            if q2 > max_denominator {
                break;
            }

            p0 = p1;
            q0 = q1;
            p1 = p2;
            q1 = q2;

            if (p2 as f64 / q2 as f64 - value).abs() <= tolerance {
                break;
            }

            term = next_term;
            remainder = next_remainder;
        }

        Self::positive(value, p1, q1, max_denominator)
    }

    fn positive(
        value: f64,
        numerator: i64,
        denominator: i64,
        max_denominator: i64,
    ) -> GridResult<Self> {
        if numerator <= 0 {
            return Err(GridError::Validation(format!(
                "ratio {} is too small to express with a denominator of at most {}",
                value, max_denominator
            )));
        }
        Ok(Self {
            numerator,
            denominator,
        })
    }

    pub fn numerator(&self) -> i64 {
        self.numerator
    }

    pub fn denominator(&self) -> i64 {
        self.denominator
    }

    /// Real value of the fraction
    pub fn value(&self) -> f64 {
        self.numerator as f64 / self.denominator as f64
    }
}

impl fmt::Display for Ratio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.numerator, self.denominator)
    }
}
