//! Recovery Modulator
//!
//! Bounded martingale scaling after consecutive losses. Stateless: it reads
//! the loss counter kept by the ledger and never writes it.

use super::params::EngineConfig;

/// Recovery scale for a losing streak: `min(max_mult, 1 + losses * step)`,
/// or 1.0 once the streak reaches `loss_streak_reset`.
pub fn scale(consecutive_losses: u32, config: &EngineConfig) -> f64 {
    if consecutive_losses >= config.loss_streak_reset {
        return 1.0;
    }
    let scale = 1.0 + consecutive_losses as f64 * config.recovery_step;
    scale.min(config.max_recovery_multiplier).max(1.0)
}

pub fn adjust(base_fraction: f64, consecutive_losses: u32, config: &EngineConfig) -> f64 {
    base_fraction * scale(consecutive_losses, config)
}
