use serde::{Deserialize, Serialize};

use super::decision::SkipReason;
use super::ledger::PortfolioState;

/// Slack on the minimum-size check so a size computed as exactly the minimum
/// is not rejected over float rounding
const SIZE_EPSILON: f64 = 1e-9;

/// Hard limits applied to every proposed bet
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiskLimits {
    pub max_single_bet_pct: f64,
    pub max_drawdown_pct: f64,
    pub stop_loss_pct: f64,
    pub min_tradable_usd: f64,
}

/// Outcome of running a proposed fraction through the governor
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RiskCheck {
    Approved {
        fraction: f64,
        size_usd: f64,
        stop_loss_pct: f64,
        /// True if any cap shrank the proposal
        capped: bool,
    },
    Rejected(SkipReason),
}

impl RiskCheck {
    pub fn is_approved(&self) -> bool {
        matches!(self, RiskCheck::Approved { .. })
    }
}

/// Applies the hard caps in fixed order. Each step may only shrink or reject.
#[derive(Debug, Clone)]
pub struct RiskGovernor {
    limits: RiskLimits,
}

impl RiskGovernor {
    pub fn new(limits: RiskLimits) -> Self {
        Self { limits }
    }

    pub fn limits(&self) -> &RiskLimits {
        &self.limits
    }

    /// 1. cap at max_single_bet_pct, then at uncommitted cash
    /// 2. reject DRAWDOWN_LIMIT once drawdown >= max_drawdown_pct
    /// 3. reject INSUFFICIENT_BANKROLL below min_tradable_usd
    /// 4. attach stop_loss_pct
    pub fn clamp(&self, proposed_fraction: f64, portfolio: &PortfolioState) -> RiskCheck {
        let bankroll = portfolio.bankroll_usd;
        let proposed = if proposed_fraction.is_finite() {
            proposed_fraction.max(0.0)
        } else {
            0.0
        };

        let mut fraction = proposed.min(self.limits.max_single_bet_pct);
        let mut size_usd = fraction * bankroll;

        let available = portfolio.available_usd();
        if size_usd > available {
            size_usd = available;
            fraction = if bankroll > 0.0 { size_usd / bankroll } else { 0.0 };
        }
        let capped = fraction < proposed;

        let drawdown = portfolio.drawdown();
        if drawdown >= self.limits.max_drawdown_pct {
            tracing::warn!(
                "Drawdown {:.1}% at or past limit {:.1}%, halting entries",
                drawdown * 100.0,
                self.limits.max_drawdown_pct * 100.0
            );
            return RiskCheck::Rejected(SkipReason::DrawdownLimit);
        }

        if size_usd + SIZE_EPSILON < self.limits.min_tradable_usd {
            tracing::debug!(
                "Size ${:.4} below minimum ${:.2}",
                size_usd,
                self.limits.min_tradable_usd
            );
            return RiskCheck::Rejected(SkipReason::InsufficientBankroll);
        }

        RiskCheck::Approved {
            fraction,
            size_usd,
            stop_loss_pct: self.limits.stop_loss_pct,
            capped,
        }
    }
}
