//! Signal Model
//!
//! Normalizes a raw market observation into a [`Signal`]: win probability,
//! net payout odds and a momentum/contrarian score. Pure, no state is kept
//! between calls.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use super::position::Side;

/// Scale applied to the recent trend before squashing it into [-1, 1]
pub const MOMENTUM_SENSITIVITY: f64 = 5.0;

/// A drop at least this deep is read as panic selling (contrarian entry)
pub const PANIC_DROP: f64 = 0.25;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SignalError {
    #[error("Invalid signal for {asset_id}: {reason}")]
    InvalidSignal { asset_id: String, reason: String },
}

impl SignalError {
    fn invalid(asset_id: &str, reason: impl Into<String>) -> Self {
        SignalError::InvalidSignal {
            asset_id: asset_id.to_string(),
            reason: reason.into(),
        }
    }
}

/// Where a trade is placed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Venue {
    PredictionMarket,
    DexToken,
}

impl fmt::Display for Venue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Venue::PredictionMarket => write!(f, "PREDICTION_MARKET"),
            Venue::DexToken => write!(f, "DEX_TOKEN"),
        }
    }
}

/// Top of book as reported by the market data collaborator
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OrderBookTop {
    pub best_bid: f64,
    pub best_ask: f64,
}

impl OrderBookTop {
    pub fn mid(&self) -> Option<f64> {
        if self.best_bid > 0.0 && self.best_ask > 0.0 && self.best_bid <= self.best_ask {
            Some((self.best_bid + self.best_ask) / 2.0)
        } else {
            None
        }
    }
}

/// Raw market observation, as delivered by a market scan.
///
/// `price`, `trend` and `model_probability` always describe the quoted
/// instrument (the YES token on a prediction market, the token on a DEX).
/// `side` says which way the bet goes; normalization flips the numbers for
/// `Side::Short` (buying NO / shorting the token).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawObservation {
    pub asset_id: String,
    pub name: String,
    pub venue: Venue,
    pub side: Side,
    /// Last traded or quoted price
    pub price: Option<f64>,
    /// Used for a mid price when `price` is missing
    pub order_book: Option<OrderBookTop>,
    /// Depth available to trade against, in USD
    pub liquidity_usd: f64,
    /// Fractional price change over the scan lookback (0.1 = +10%)
    pub trend: f64,
    /// Model estimate of the YES probability / token win probability
    pub model_probability: Option<f64>,
    /// Estimated fair token price (DEX only)
    pub fair_value: Option<f64>,
    /// 0-1, how soon the opportunity expires
    #[serde(default)]
    pub time_sensitivity: f64,
}

impl RawObservation {
    pub fn prediction_market(asset_id: &str, yes_price: f64, liquidity_usd: f64) -> Self {
        Self {
            asset_id: asset_id.to_string(),
            name: asset_id.to_string(),
            venue: Venue::PredictionMarket,
            side: Side::Long,
            price: Some(yes_price),
            order_book: None,
            liquidity_usd,
            trend: 0.0,
            model_probability: None,
            fair_value: None,
            time_sensitivity: 0.0,
        }
    }

    pub fn dex_token(asset_id: &str, price: f64, fair_value: f64, liquidity_usd: f64) -> Self {
        Self {
            asset_id: asset_id.to_string(),
            name: asset_id.to_string(),
            venue: Venue::DexToken,
            side: Side::Long,
            price: Some(price),
            order_book: None,
            liquidity_usd,
            trend: 0.0,
            model_probability: None,
            fair_value: Some(fair_value),
            time_sensitivity: 0.0,
        }
    }

    pub fn with_side(mut self, side: Side) -> Self {
        self.side = side;
        self
    }

    pub fn with_model_probability(mut self, p: f64) -> Self {
        self.model_probability = Some(p);
        self
    }

    pub fn with_trend(mut self, trend: f64) -> Self {
        self.trend = trend;
        self
    }

    pub fn with_order_book(mut self, best_bid: f64, best_ask: f64) -> Self {
        self.order_book = Some(OrderBookTop { best_bid, best_ask });
        self
    }

    pub fn with_time_sensitivity(mut self, t: f64) -> Self {
        self.time_sensitivity = t;
        self
    }
}

/// Normalized trade signal. Construction enforces `0 < p < 1`,
/// `payout_ratio > 0` and `momentum_score` in [-1, 1].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Signal {
    asset_id: String,
    venue: Venue,
    side: Side,
    win_probability: f64,
    payout_ratio: f64,
    momentum_score: f64,
    reference_price: Option<f64>,
    time_sensitivity: f64,
}

impl Signal {
    pub fn new(
        asset_id: impl Into<String>,
        venue: Venue,
        win_probability: f64,
        payout_ratio: f64,
        momentum_score: f64,
    ) -> Result<Self, SignalError> {
        let asset_id = asset_id.into();
        if !win_probability.is_finite() || win_probability <= 0.0 || win_probability >= 1.0 {
            return Err(SignalError::invalid(
                &asset_id,
                format!("win probability {} outside (0, 1)", win_probability),
            ));
        }
        if !payout_ratio.is_finite() || payout_ratio <= 0.0 {
            return Err(SignalError::invalid(
                &asset_id,
                format!("payout ratio {} must be > 0", payout_ratio),
            ));
        }
        if !momentum_score.is_finite() || !(-1.0..=1.0).contains(&momentum_score) {
            return Err(SignalError::invalid(
                &asset_id,
                format!("momentum score {} outside [-1, 1]", momentum_score),
            ));
        }

        Ok(Self {
            asset_id,
            venue,
            side: Side::Long,
            win_probability,
            payout_ratio,
            momentum_score,
            reference_price: None,
            time_sensitivity: 0.0,
        })
    }

    pub fn with_side(mut self, side: Side) -> Self {
        self.side = side;
        self
    }

    pub fn with_reference_price(mut self, price: f64) -> Self {
        self.reference_price = Some(price);
        self
    }

    pub fn with_time_sensitivity(mut self, t: f64) -> Self {
        self.time_sensitivity = t.clamp(0.0, 1.0);
        self
    }

    pub fn asset_id(&self) -> &str {
        &self.asset_id
    }

    pub fn venue(&self) -> Venue {
        self.venue
    }

    pub fn side(&self) -> Side {
        self.side
    }

    pub fn win_probability(&self) -> f64 {
        self.win_probability
    }

    pub fn payout_ratio(&self) -> f64 {
        self.payout_ratio
    }

    pub fn momentum_score(&self) -> f64 {
        self.momentum_score
    }

    /// Price of the instrument in the direction of the bet
    pub fn reference_price(&self) -> Option<f64> {
        self.reference_price
    }

    pub fn time_sensitivity(&self) -> f64 {
        self.time_sensitivity
    }

    /// Raw edge: p * (b + 1) - 1. Non-positive means no edge.
    pub fn edge(&self) -> f64 {
        self.win_probability * (self.payout_ratio + 1.0) - 1.0
    }
}

/// Normalize a raw observation into a [`Signal`].
pub fn normalize(obs: &RawObservation) -> Result<Signal, SignalError> {
    let id = obs.asset_id.as_str();

    if !obs.liquidity_usd.is_finite() || obs.liquidity_usd <= 0.0 {
        return Err(SignalError::invalid(id, "zero liquidity"));
    }
    if !obs.trend.is_finite() {
        return Err(SignalError::invalid(id, "trend is not a number"));
    }

    let quoted = match (obs.price, obs.order_book) {
        (Some(p), _) if p.is_finite() && p > 0.0 => p,
        (_, Some(book)) => book
            .mid()
            .ok_or_else(|| SignalError::invalid(id, "crossed or empty order book"))?,
        _ => return Err(SignalError::invalid(id, "missing price and order book")),
    };

    let (win_probability, payout_ratio, entry_price) = match obs.venue {
        Venue::PredictionMarket => {
            if quoted >= 1.0 {
                return Err(SignalError::invalid(
                    id,
                    format!("prediction market price {} outside (0, 1)", quoted),
                ));
            }
            // No model estimate: the market price itself is the probability
            let p_yes = obs.model_probability.unwrap_or(quoted);
            let (p, price) = match obs.side {
                Side::Long => (p_yes, quoted),
                Side::Short => (1.0 - p_yes, 1.0 - quoted),
            };
            (p, (1.0 - price) / price, price)
        }
        Venue::DexToken => {
            let fair = obs
                .fair_value
                .filter(|f| f.is_finite() && *f > 0.0)
                .ok_or_else(|| SignalError::invalid(id, "no fair value estimate"))?;
            let p = obs
                .model_probability
                .ok_or_else(|| SignalError::invalid(id, "no win probability estimate"))?;
            let upside = match obs.side {
                Side::Long => fair - quoted,
                Side::Short => quoted - fair,
            };
            if upside <= 0.0 {
                return Err(SignalError::invalid(
                    id,
                    format!("no payout: fair value {:.6} vs price {:.6}", fair, quoted),
                ));
            }
            (p, upside / quoted, quoted)
        }
    };

    let directional_trend = match obs.side {
        Side::Long => obs.trend,
        Side::Short => -obs.trend,
    };

    Ok(Signal::new(
        obs.asset_id.clone(),
        obs.venue,
        win_probability,
        payout_ratio,
        momentum_score(directional_trend),
    )?
    .with_side(obs.side)
    .with_reference_price(entry_price)
    .with_time_sensitivity(obs.time_sensitivity))
}

/// Momentum for ordinary moves, contrarian score for a panic drop.
pub fn momentum_score(trend: f64) -> f64 {
    if trend <= -PANIC_DROP {
        (-trend).min(1.0)
    } else {
        (trend * MOMENTUM_SENSITIVITY).tanh()
    }
}
