//! Gambler's Logic Engine
//!
//! One fixed pipeline per signal:
//!
//! 1. momentum bias on win probability: `clamp(p + w * m, 0.01, 0.99)`
//! 2. fractional Kelly on the biased probability
//! 3. recovery scaling from the ledger's losing streak
//! 4. risk governor caps and halts
//!
//! Any stage that says SKIP ends the pipeline. Kelly, martingale recovery,
//! momentum and contrarian entries are all folded into this one path; there
//! is no per-strategy branching.

use std::cmp::Ordering;

use super::kelly;
use super::params::{ConfigurationError, EngineConfig};
use super::recovery;
use crate::domain::{
    Aggression, PortfolioState, RiskCheck, RiskGovernor, Signal, SkipReason, TradeDecision,
};

/// Bounds on the momentum-adjusted probability
pub const MIN_ADJUSTED_PROBABILITY: f64 = 0.01;
pub const MAX_ADJUSTED_PROBABILITY: f64 = 0.99;

/// Ranking boost for full-degen sized bets
pub const FULL_DEGEN_WEIGHT: f64 = 1.2;

#[derive(Debug, Clone)]
pub struct GamblersLogic {
    config: EngineConfig,
    governor: RiskGovernor,
}

impl GamblersLogic {
    /// Fails fast on any out-of-domain parameter
    pub fn new(config: EngineConfig) -> Result<Self, ConfigurationError> {
        config.validate()?;
        let governor = RiskGovernor::new(config.risk_limits());
        Ok(Self { config, governor })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Win probability after the momentum/contrarian bias
    pub fn adjusted_probability(&self, signal: &Signal) -> f64 {
        (signal.win_probability() + self.config.momentum_weight * signal.momentum_score())
            .clamp(MIN_ADJUSTED_PROBABILITY, MAX_ADJUSTED_PROBABILITY)
    }

    /// Size one signal against the current portfolio. Pure: reads state,
    /// never writes it.
    pub fn evaluate(&self, signal: &Signal, portfolio: &PortfolioState) -> TradeDecision {
        // Momentum may trim an edge but never manufactures one
        if signal.edge() <= 0.0 {
            tracing::debug!(
                "{}: no edge (p={:.3}, b={:.3})",
                signal.asset_id(),
                signal.win_probability(),
                signal.payout_ratio()
            );
            return TradeDecision::skip(signal, SkipReason::NegativeEdge);
        }

        let p_adjusted = self.adjusted_probability(signal);
        let quote = kelly::quote(p_adjusted, signal.payout_ratio(), self.config.kelly_fraction);
        if !quote.has_edge() {
            tracing::debug!(
                "{}: momentum {:+.2} erased edge (p {:.3} -> {:.3})",
                signal.asset_id(),
                signal.momentum_score(),
                signal.win_probability(),
                p_adjusted
            );
            return TradeDecision::skip(signal, SkipReason::NegativeEdge);
        }

        let losses = portfolio.consecutive_losses;
        let scaled = recovery::adjust(quote.base_fraction, losses, &self.config);

        tracing::debug!(
            "{}: p={:.3} p_adj={:.3} b={:.3} kelly={:.4} base={:.4} recovery x{:.2} -> {:.4}",
            signal.asset_id(),
            signal.win_probability(),
            p_adjusted,
            signal.payout_ratio(),
            quote.raw_fraction,
            quote.base_fraction,
            recovery::scale(losses, &self.config),
            scaled
        );

        match self.governor.clamp(scaled, portfolio) {
            RiskCheck::Approved {
                fraction,
                size_usd,
                stop_loss_pct,
                capped,
            } => {
                if capped {
                    tracing::debug!(
                        "{}: capped {:.4} -> {:.4} of bankroll",
                        signal.asset_id(),
                        scaled,
                        fraction
                    );
                }
                TradeDecision::enter(signal, p_adjusted, size_usd, fraction, stop_loss_pct)
            }
            RiskCheck::Rejected(reason) => TradeDecision::skip(signal, reason),
        }
    }

    /// Evaluate every signal and return the ENTER decisions, best first.
    /// Score is expected profit weighted by `1 + time_sensitivity`, with
    /// full-degen bets boosted by [`FULL_DEGEN_WEIGHT`].
    pub fn rank(&self, signals: &[Signal], portfolio: &PortfolioState) -> Vec<TradeDecision> {
        self.rank_indexed(signals, portfolio)
            .into_iter()
            .map(|(_, d)| d)
            .collect()
    }

    /// Like [`rank`](Self::rank), keeping each decision's index into `signals`
    pub fn rank_indexed(
        &self,
        signals: &[Signal],
        portfolio: &PortfolioState,
    ) -> Vec<(usize, TradeDecision)> {
        let mut entries: Vec<(f64, usize, TradeDecision)> = signals
            .iter()
            .enumerate()
            .map(|(i, s)| (i, self.evaluate(s, portfolio)))
            .filter(|(_, d)| d.is_enter())
            .map(|(i, d)| (opportunity_score(&d), i, d))
            .collect();

        entries.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(Ordering::Equal));
        entries.into_iter().map(|(_, i, d)| (i, d)).collect()
    }
}

fn opportunity_score(decision: &TradeDecision) -> f64 {
    let weight = match decision.aggression() {
        Aggression::FullDegen => FULL_DEGEN_WEIGHT,
        _ => 1.0,
    };
    decision.expected_profit_usd() * (1.0 + decision.time_sensitivity()) * weight
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Fill, Outcome, PortfolioLedger, TradeAction, Venue};
    use approx::assert_relative_eq;

    fn engine() -> GamblersLogic {
        GamblersLogic::new(EngineConfig::default()).unwrap()
    }

    fn signal(p: f64, b: f64, momentum: f64) -> Signal {
        Signal::new("mkt", Venue::PredictionMarket, p, b, momentum).unwrap()
    }

    #[test]
    fn test_rejects_invalid_config() {
        let config = EngineConfig::default().with_kelly_fraction(1.5);
        assert!(matches!(
            GamblersLogic::new(config),
            Err(ConfigurationError::InvalidKellyFraction(_))
        ));
    }

    #[test]
    fn test_small_bankroll_entry() {
        let state = PortfolioState::new(2.0);
        let d = engine().evaluate(&signal(0.55, 1.0, 0.0), &state);
        assert_eq!(d.action(), TradeAction::Enter);
        assert_relative_eq!(d.size_usd(), 0.10, epsilon = 1e-9);
        assert_eq!(d.stop_loss_pct(), 0.15);
    }

    #[test]
    fn test_negative_edge_ignores_momentum() {
        let state = PortfolioState::new(100.0);
        for momentum in [-1.0, 0.0, 1.0] {
            let d = engine().evaluate(&signal(0.40, 1.0, momentum), &state);
            assert_eq!(d.reason(), Some(SkipReason::NegativeEdge));
        }
    }

    #[test]
    fn test_momentum_can_erase_edge() {
        let state = PortfolioState::new(100.0);
        // p=0.52 at even odds, momentum -1 at weight 0.10 -> 0.42
        let d = engine().evaluate(&signal(0.52, 1.0, -1.0), &state);
        assert_eq!(d.reason(), Some(SkipReason::NegativeEdge));
    }

    #[test]
    fn test_momentum_rides_winners() {
        let state = PortfolioState::new(100.0);
        let flat = engine().evaluate(&signal(0.55, 1.0, 0.0), &state);
        let hot = engine().evaluate(&signal(0.55, 1.0, 0.5), &state);
        assert!(hot.size_usd() > flat.size_usd());
        assert_relative_eq!(hot.win_probability(), 0.60, epsilon = 1e-12);
    }

    #[test]
    fn test_adjusted_probability_clamped() {
        let e = GamblersLogic::new(EngineConfig::default().with_momentum_weight(1.0)).unwrap();
        assert_eq!(e.adjusted_probability(&signal(0.95, 1.0, 1.0)), 0.99);
        assert_eq!(e.adjusted_probability(&signal(0.05, 30.0, -1.0)), 0.01);
    }

    #[test]
    fn test_drawdown_halts_entries() {
        let mut ledger = PortfolioLedger::new(100.0).unwrap();
        let s = signal(0.6, 1.0, 0.0);
        let big = TradeDecision::enter(&s, 0.6, 60.0, 0.6, 0.15);
        let p = ledger.apply_open(&big, &Fill::simulated(0.5, 60.0, 0.0)).unwrap();
        ledger.apply_close(&p.id, Outcome::Loss { loss_usd: 60.0 }).unwrap();

        let d = engine().evaluate(&signal(0.9, 2.0, 0.5), ledger.state());
        assert_eq!(d.reason(), Some(SkipReason::DrawdownLimit));
    }

    #[test]
    fn test_recovery_scales_after_losses() {
        let config = EngineConfig::default().with_recovery(0.5, 2.0);
        let e = GamblersLogic::new(config).unwrap();
        let mut state = PortfolioState::new(100.0);
        let s = signal(0.55, 1.0, 0.0);

        let base = e.evaluate(&s, &state).size_usd();
        state.consecutive_losses = 3;
        let scaled = e.evaluate(&s, &state).size_usd();
        assert_relative_eq!(scaled, base * 2.0, epsilon = 1e-9);
    }

    #[test]
    fn test_rank_orders_by_weighted_payout() {
        let state = PortfolioState::new(100.0);
        let weak = Signal::new("weak", Venue::PredictionMarket, 0.55, 1.0, 0.0).unwrap();
        let strong = Signal::new("strong", Venue::DexToken, 0.6, 1.5, 0.0).unwrap();
        let urgent = Signal::new("urgent", Venue::PredictionMarket, 0.55, 1.0, 0.0)
            .unwrap()
            .with_time_sensitivity(1.0);
        let dead = Signal::new("dead", Venue::PredictionMarket, 0.3, 1.0, 0.0).unwrap();

        let ranked = engine().rank(&[weak, dead, urgent, strong], &state);
        let ids: Vec<&str> = ranked.iter().map(|d| d.asset_id()).collect();
        assert_eq!(ids, vec!["strong", "urgent", "weak"]);
    }

    #[test]
    fn test_full_degen_score_boost() {
        let s = signal(0.6, 1.0, 0.0);
        let degen = TradeDecision::enter(&s, 0.6, 10.0, 0.25, 0.15);
        let calm = TradeDecision::enter(&s, 0.6, 10.0, 0.15, 0.15);
        assert_eq!(degen.aggression(), Aggression::FullDegen);
        assert_eq!(calm.aggression(), Aggression::Aggressive);
        assert_relative_eq!(
            opportunity_score(&degen),
            FULL_DEGEN_WEIGHT * opportunity_score(&calm),
            epsilon = 1e-12
        );
    }
}
