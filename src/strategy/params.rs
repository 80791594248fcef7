//! Engine Parameters
//!
//! Numeric knobs for sizing and risk, and the personality presets that map
//! onto them. Every value is checked against its domain before an engine can
//! be built; nothing is clamped silently.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::RiskLimits;
use std::str::FromStr;

/// Smallest bet worth placing, in USD
pub const DEFAULT_MIN_TRADABLE_USD: f64 = 0.10;

/// Losing streak length after which recovery scaling stands down
pub const DEFAULT_LOSS_STREAK_RESET: u32 = 5;

/// Strategy personality. Each variant maps to a fixed parameter set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Personality {
    Conservative,
    #[default]
    Moderate,
    Optimistic,
    Delusional,
    Ascended,
}

impl Personality {
    pub fn params(self) -> EngineConfig {
        // (kelly, max_bet, max_dd, stop, step, max_mult, momentum_w)
        let (k, bet, dd, stop, step, mult, mw) = match self {
            Personality::Conservative => (0.25, 0.10, 0.25, 0.10, 0.00, 1.0, 0.05),
            Personality::Moderate => (0.50, 0.25, 0.50, 0.15, 0.15, 1.8, 0.10),
            Personality::Optimistic => (0.65, 0.25, 0.50, 0.15, 0.25, 2.0, 0.15),
            Personality::Delusional => (0.80, 0.30, 0.60, 0.20, 0.35, 2.5, 0.20),
            Personality::Ascended => (1.00, 0.35, 0.70, 0.25, 0.50, 3.0, 0.25),
        };

        EngineConfig {
            kelly_fraction: k,
            max_single_bet_pct: bet,
            max_drawdown_pct: dd,
            stop_loss_pct: stop,
            recovery_step: step,
            max_recovery_multiplier: mult,
            momentum_weight: mw,
            min_tradable_usd: DEFAULT_MIN_TRADABLE_USD,
            loss_streak_reset: DEFAULT_LOSS_STREAK_RESET,
        }
    }
}

impl fmt::Display for Personality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Personality::Conservative => "CONSERVATIVE",
            Personality::Moderate => "MODERATE",
            Personality::Optimistic => "OPTIMISTIC",
            Personality::Delusional => "DELUSIONAL",
            Personality::Ascended => "ASCENDED",
        };
        write!(f, "{}", name)
    }
}

impl FromStr for Personality {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "conservative" => Ok(Personality::Conservative),
            "moderate" => Ok(Personality::Moderate),
            "optimistic" => Ok(Personality::Optimistic),
            "delusional" => Ok(Personality::Delusional),
            "ascended" => Ok(Personality::Ascended),
            other => Err(ConfigurationError::UnknownPersonality(other.to_string())),
        }
    }
}

/// Sizing and risk parameters consumed by the engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Fraction of full Kelly to bet, (0, 1]
    pub kelly_fraction: f64,
    /// Hard cap on a single bet as a fraction of bankroll, (0, 1]
    pub max_single_bet_pct: f64,
    /// Drawdown from peak at which new entries halt, (0, 1]
    pub max_drawdown_pct: f64,
    /// Stop distance attached to every entry, (0, 1]
    pub stop_loss_pct: f64,
    /// Scale added per consecutive loss, >= 0
    pub recovery_step: f64,
    /// Ceiling on the recovery scale, >= 1
    pub max_recovery_multiplier: f64,
    /// Weight of momentum score on win probability, [0, 1]
    pub momentum_weight: f64,
    /// Smallest accepted bet in USD, > 0
    pub min_tradable_usd: f64,
    /// Losing streak at which recovery scaling resets to 1.0, >= 1
    pub loss_streak_reset: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Personality::default().params()
    }
}

impl EngineConfig {
    pub fn with_kelly_fraction(mut self, v: f64) -> Self {
        self.kelly_fraction = v;
        self
    }

    pub fn with_max_single_bet_pct(mut self, v: f64) -> Self {
        self.max_single_bet_pct = v;
        self
    }

    pub fn with_max_drawdown_pct(mut self, v: f64) -> Self {
        self.max_drawdown_pct = v;
        self
    }

    pub fn with_stop_loss_pct(mut self, v: f64) -> Self {
        self.stop_loss_pct = v;
        self
    }

    pub fn with_recovery(mut self, step: f64, max_multiplier: f64) -> Self {
        self.recovery_step = step;
        self.max_recovery_multiplier = max_multiplier;
        self
    }

    pub fn with_momentum_weight(mut self, v: f64) -> Self {
        self.momentum_weight = v;
        self
    }

    pub fn with_min_tradable_usd(mut self, v: f64) -> Self {
        self.min_tradable_usd = v;
        self
    }

    pub fn with_loss_streak_reset(mut self, v: u32) -> Self {
        self.loss_streak_reset = v;
        self
    }

    /// The subset of parameters enforced by the risk governor
    pub fn risk_limits(&self) -> RiskLimits {
        RiskLimits {
            max_single_bet_pct: self.max_single_bet_pct,
            max_drawdown_pct: self.max_drawdown_pct,
            stop_loss_pct: self.stop_loss_pct,
            min_tradable_usd: self.min_tradable_usd,
        }
    }

    /// Validate every parameter against its domain
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if !unit_interval(self.kelly_fraction) {
            return Err(ConfigurationError::InvalidKellyFraction(self.kelly_fraction));
        }
        if !unit_interval(self.max_single_bet_pct) {
            return Err(ConfigurationError::InvalidMaxSingleBet(self.max_single_bet_pct));
        }
        if !unit_interval(self.max_drawdown_pct) {
            return Err(ConfigurationError::InvalidMaxDrawdown(self.max_drawdown_pct));
        }
        if !unit_interval(self.stop_loss_pct) {
            return Err(ConfigurationError::InvalidStopLoss(self.stop_loss_pct));
        }
        if !(self.recovery_step.is_finite() && self.recovery_step >= 0.0) {
            return Err(ConfigurationError::InvalidRecoveryStep(self.recovery_step));
        }
        if !(self.max_recovery_multiplier.is_finite() && self.max_recovery_multiplier >= 1.0) {
            return Err(ConfigurationError::InvalidRecoveryMultiplier(
                self.max_recovery_multiplier,
            ));
        }
        if !(0.0..=1.0).contains(&self.momentum_weight) {
            return Err(ConfigurationError::InvalidMomentumWeight(self.momentum_weight));
        }
        if !(self.min_tradable_usd.is_finite() && self.min_tradable_usd > 0.0) {
            return Err(ConfigurationError::InvalidMinTradable(self.min_tradable_usd));
        }
        if self.loss_streak_reset == 0 {
            return Err(ConfigurationError::InvalidLossStreakReset(self.loss_streak_reset));
        }
        Ok(())
    }
}

/// (0, 1]; NaN fails
fn unit_interval(v: f64) -> bool {
    v > 0.0 && v <= 1.0
}

/// Parameter outside its domain. Fatal at startup.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigurationError {
    #[error("Invalid kelly_fraction: {0} (must be 0 < k <= 1)")]
    InvalidKellyFraction(f64),
    #[error("Invalid max_single_bet_pct: {0} (must be 0 < pct <= 1)")]
    InvalidMaxSingleBet(f64),
    #[error("Invalid max_drawdown_pct: {0} (must be 0 < pct <= 1)")]
    InvalidMaxDrawdown(f64),
    #[error("Invalid stop_loss_pct: {0} (must be 0 < pct <= 1)")]
    InvalidStopLoss(f64),
    #[error("Invalid recovery_step: {0} (must be >= 0)")]
    InvalidRecoveryStep(f64),
    #[error("Invalid max_recovery_multiplier: {0} (must be >= 1)")]
    InvalidRecoveryMultiplier(f64),
    #[error("Invalid momentum_weight: {0} (must be 0-1)")]
    InvalidMomentumWeight(f64),
    #[error("Invalid min_tradable_usd: {0} (must be > 0)")]
    InvalidMinTradable(f64),
    #[error("Invalid loss_streak_reset: {0} (must be >= 1)")]
    InvalidLossStreakReset(u32),
    #[error("Unknown personality: {0}")]
    UnknownPersonality(String),
}
