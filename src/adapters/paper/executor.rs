//! Paper Executor
//!
//! Fills ENTER decisions without touching a venue. Every fill pays adverse
//! slippage and a venue fee, and can come back partial, so the engine is
//! exercised the same way a live venue would exercise it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::domain::position::price_direction;
use crate::domain::{ExecutionMode, Fill, TradeDecision, Venue};
use crate::ports::{ExecutionError, ExecutionPort};

/// Highest price a simulated outcome token can fill at
const MAX_OUTCOME_FILL: f64 = 0.999;

/// Fees and slippage per venue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PaperConfig {
    pub prediction_market_fee_rate: f64,
    pub dex_fee_rate: f64,
    pub prediction_market_max_slippage: f64,
    pub dex_max_slippage: f64,
    /// Chance a fill comes back partial (50-100% of requested)
    pub partial_fill_probability: f64,
    /// Chance the venue rejects the order outright
    pub reject_probability: f64,
}

impl Default for PaperConfig {
    fn default() -> Self {
        Self {
            prediction_market_fee_rate: 0.002,
            dex_fee_rate: 0.003,
            prediction_market_max_slippage: 0.01,
            dex_max_slippage: 0.02,
            partial_fill_probability: 0.0,
            reject_probability: 0.0,
        }
    }
}

impl PaperConfig {
    pub fn fee_rate(&self, venue: Venue) -> f64 {
        match venue {
            Venue::PredictionMarket => self.prediction_market_fee_rate,
            Venue::DexToken => self.dex_fee_rate,
        }
    }

    pub fn max_slippage(&self, venue: Venue) -> f64 {
        match venue {
            Venue::PredictionMarket => self.prediction_market_max_slippage,
            Venue::DexToken => self.dex_max_slippage,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        let rates = [
            ("prediction_market_fee_rate", self.prediction_market_fee_rate),
            ("dex_fee_rate", self.dex_fee_rate),
            ("prediction_market_max_slippage", self.prediction_market_max_slippage),
            ("dex_max_slippage", self.dex_max_slippage),
            ("partial_fill_probability", self.partial_fill_probability),
            ("reject_probability", self.reject_probability),
        ];
        for (name, value) in rates {
            if !(0.0..1.0).contains(&value) {
                return Err(format!("{} must be in [0, 1), got {}", name, value));
            }
        }
        Ok(())
    }
}

#[derive(Debug)]
pub struct PaperExecutor {
    config: PaperConfig,
    rng: Mutex<StdRng>,
    order_seq: AtomicU64,
}

impl PaperExecutor {
    pub fn new(config: PaperConfig, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_entropy(),
        };
        Self {
            config,
            rng: Mutex::new(rng),
            order_seq: AtomicU64::new(1),
        }
    }

    pub fn config(&self) -> &PaperConfig {
        &self.config
    }

    /// Draw (slippage, fill ratio, rejected) for one order
    fn draw(&self, venue: Venue) -> (f64, f64, bool) {
        let mut rng = self
            .rng
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let rejected = rng.gen::<f64>() < self.config.reject_probability;
        let max_slip = self.config.max_slippage(venue);
        let slippage = if max_slip > 0.0 {
            rng.gen_range(0.0..max_slip)
        } else {
            0.0
        };
        let ratio = if rng.gen::<f64>() < self.config.partial_fill_probability {
            rng.gen_range(0.5..1.0)
        } else {
            1.0
        };
        (slippage, ratio, rejected)
    }
}

#[async_trait]
impl ExecutionPort for PaperExecutor {
    fn mode(&self) -> ExecutionMode {
        ExecutionMode::Simulation
    }

    async fn submit(&self, decision: &TradeDecision) -> Result<Fill, ExecutionError> {
        if !decision.is_enter() {
            return Err(ExecutionError::InvalidDecision(format!(
                "{} is not an entry",
                decision.asset_id()
            )));
        }
        let reference = decision.reference_price().ok_or_else(|| {
            ExecutionError::InvalidDecision(format!("{} has no reference price", decision.asset_id()))
        })?;

        let venue = decision.venue();
        let (slippage, ratio, rejected) = self.draw(venue);
        if rejected {
            return Err(ExecutionError::Rejected(format!(
                "paper venue declined {}",
                decision.asset_id()
            )));
        }

        // Adverse: pay up when buying, receive less when shorting
        let direction = price_direction(venue, decision.side());
        let mut price = reference * (1.0 + direction * slippage);
        if venue == Venue::PredictionMarket {
            price = price.min(MAX_OUTCOME_FILL);
        }

        let gross = decision.size_usd() * ratio;
        let fees = gross * self.config.fee_rate(venue);
        let order = self.order_seq.fetch_add(1, Ordering::Relaxed);

        tracing::debug!(
            "Paper fill #{} {}: ${:.4} @ {:.6} (ref {:.6}, slip {:.2}%, fee ${:.4})",
            order,
            decision.asset_id(),
            gross - fees,
            price,
            reference,
            slippage * 100.0,
            fees
        );

        Ok(Fill {
            price,
            size_usd: gross - fees,
            fees_usd: fees,
            mode: ExecutionMode::Simulation,
            reference: Some(format!("paper-{}", order)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Side, Signal, SkipReason};
    use approx::assert_relative_eq;

    fn decision(venue: Venue, side: Side, price: f64) -> TradeDecision {
        let signal = Signal::new("asset", venue, 0.6, 1.0, 0.0)
            .unwrap()
            .with_side(side)
            .with_reference_price(price);
        TradeDecision::enter(&signal, 0.6, 10.0, 0.1, 0.15)
    }

    #[tokio::test]
    async fn test_fee_comes_out_of_size() {
        let config = PaperConfig {
            prediction_market_max_slippage: 0.0,
            ..Default::default()
        };
        let executor = PaperExecutor::new(config, Some(7));
        let fill = executor
            .submit(&decision(Venue::PredictionMarket, Side::Long, 0.4))
            .await
            .unwrap();

        assert_relative_eq!(fill.fees_usd, 0.02, epsilon = 1e-12);
        assert_relative_eq!(fill.size_usd, 9.98, epsilon = 1e-12);
        assert_relative_eq!(fill.total_cost_usd(), 10.0, epsilon = 1e-12);
        assert_eq!(fill.price, 0.4);
        assert_eq!(fill.reference.as_deref(), Some("paper-1"));
    }

    #[tokio::test]
    async fn test_slippage_is_adverse() {
        let executor = PaperExecutor::new(PaperConfig::default(), Some(42));
        for _ in 0..20 {
            let long = executor
                .submit(&decision(Venue::DexToken, Side::Long, 2.0))
                .await
                .unwrap();
            assert!(long.price >= 2.0 && long.price <= 2.0 * 1.02);

            let short = executor
                .submit(&decision(Venue::DexToken, Side::Short, 2.0))
                .await
                .unwrap();
            assert!(short.price <= 2.0 && short.price >= 2.0 * 0.98);
        }
    }

    #[tokio::test]
    async fn test_outcome_price_stays_below_one() {
        let config = PaperConfig {
            prediction_market_max_slippage: 0.5,
            ..Default::default()
        };
        let executor = PaperExecutor::new(config, Some(1));
        for _ in 0..20 {
            let fill = executor
                .submit(&decision(Venue::PredictionMarket, Side::Long, 0.98))
                .await
                .unwrap();
            assert!(fill.price < 1.0);
        }
    }

    #[tokio::test]
    async fn test_partial_fills_never_exceed_request() {
        let config = PaperConfig {
            partial_fill_probability: 0.9,
            ..Default::default()
        };
        let executor = PaperExecutor::new(config, Some(3));
        for _ in 0..20 {
            let fill = executor
                .submit(&decision(Venue::DexToken, Side::Long, 1.0))
                .await
                .unwrap();
            assert!(fill.total_cost_usd() <= 10.0 + 1e-9);
            assert!(fill.total_cost_usd() >= 5.0 - 1e-9);
        }
    }

    #[tokio::test]
    async fn test_rejects_skip_and_missing_price() {
        let executor = PaperExecutor::new(PaperConfig::default(), Some(0));
        let signal = Signal::new("asset", Venue::DexToken, 0.4, 1.0, 0.0).unwrap();
        let skip = TradeDecision::skip(&signal, SkipReason::NegativeEdge);
        assert!(matches!(
            executor.submit(&skip).await,
            Err(ExecutionError::InvalidDecision(_))
        ));

        let no_price = TradeDecision::enter(&signal, 0.6, 1.0, 0.1, 0.15);
        assert!(matches!(
            executor.submit(&no_price).await,
            Err(ExecutionError::InvalidDecision(_))
        ));
    }

    #[tokio::test]
    async fn test_reject_probability() {
        let config = PaperConfig {
            reject_probability: 0.999,
            ..Default::default()
        };
        let executor = PaperExecutor::new(config, Some(9));
        let mut rejected = 0;
        for _ in 0..10 {
            if let Err(ExecutionError::Rejected(_)) = executor
                .submit(&decision(Venue::DexToken, Side::Long, 1.0))
                .await
            {
                rejected += 1;
            }
        }
        assert!(rejected >= 9);
    }

    #[test]
    fn test_config_validation() {
        assert!(PaperConfig::default().validate().is_ok());
        let bad = PaperConfig {
            dex_fee_rate: 1.5,
            ..Default::default()
        };
        assert!(bad.validate().is_err());
    }
}
