//! Kelly Sizer
//!
//! Fractional Kelly: `f* = (p(b + 1) - 1) / b`, floored at zero and scaled
//! by the configured fraction. Negative expectancy sizes to exactly zero.

use crate::domain::Signal;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KellyQuote {
    /// Full Kelly fraction, may be negative
    pub raw_fraction: f64,
    /// max(0, raw) * kelly_fraction
    pub base_fraction: f64,
}

impl KellyQuote {
    pub fn has_edge(&self) -> bool {
        self.raw_fraction > 0.0
    }
}

/// Full Kelly fraction for win probability `p` at net odds `b`
pub fn full_kelly(p: f64, b: f64) -> f64 {
    if b.is_nan() || b <= 0.0 {
        return 0.0;
    }
    (p * (b + 1.0) - 1.0) / b
}

pub fn quote(win_probability: f64, payout_ratio: f64, kelly_fraction: f64) -> KellyQuote {
    let raw_fraction = full_kelly(win_probability, payout_ratio);
    KellyQuote {
        raw_fraction,
        base_fraction: raw_fraction.max(0.0) * kelly_fraction,
    }
}

/// Baseline bankroll fraction for a signal
pub fn base_fraction(signal: &Signal, kelly_fraction: f64) -> f64 {
    quote(signal.win_probability(), signal.payout_ratio(), kelly_fraction).base_fraction
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Venue;
    use approx::assert_relative_eq;

    #[test]
    fn test_even_odds_edge() {
        let q = quote(0.55, 1.0, 0.5);
        assert_relative_eq!(q.raw_fraction, 0.10, epsilon = 1e-12);
        assert_relative_eq!(q.base_fraction, 0.05, epsilon = 1e-12);
        assert!(q.has_edge());
    }

    #[test]
    fn test_negative_edge_is_zero() {
        let q = quote(0.40, 1.0, 0.5);
        assert_relative_eq!(q.raw_fraction, -0.20, epsilon = 1e-12);
        assert_eq!(q.base_fraction, 0.0);
        assert!(!q.has_edge());
    }

    #[test]
    fn test_breakeven_is_not_edge() {
        // p * b = 1 - p  ->  f* = 0
        let q = quote(0.25, 3.0, 1.0);
        assert_relative_eq!(q.raw_fraction, 0.0, epsilon = 1e-12);
        assert_eq!(q.base_fraction, 0.0);
    }

    #[test]
    fn test_long_odds() {
        // 30% at 4:1 -> (0.3 * 5 - 1) / 4 = 0.125
        assert_relative_eq!(full_kelly(0.3, 4.0), 0.125, epsilon = 1e-12);
        assert_eq!(full_kelly(0.9, 0.0), 0.0);
    }

    #[test]
    fn test_base_fraction_from_signal() {
        let signal = Signal::new("m", Venue::PredictionMarket, 0.55, 1.0, 0.0).unwrap();
        assert_relative_eq!(base_fraction(&signal, 0.5), 0.05, epsilon = 1e-12);
        assert_relative_eq!(base_fraction(&signal, 1.0), 0.10, epsilon = 1e-12);
    }
}
