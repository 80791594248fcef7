use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::position::Side;
use super::signal::{Signal, Venue};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TradeAction {
    Enter,
    Skip,
}

/// Why a signal was not traded. Not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SkipReason {
    NegativeEdge,
    DrawdownLimit,
    InsufficientBankroll,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::NegativeEdge => write!(f, "NEGATIVE_EDGE"),
            SkipReason::DrawdownLimit => write!(f, "DRAWDOWN_LIMIT"),
            SkipReason::InsufficientBankroll => write!(f, "INSUFFICIENT_BANKROLL"),
        }
    }
}

/// How hard a bet leans on the bankroll
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Aggression {
    Calculated,
    Aggressive,
    FullDegen,
}

impl Aggression {
    pub fn from_fraction(fraction: f64) -> Self {
        if fraction > 0.20 {
            Aggression::FullDegen
        } else if fraction > 0.10 {
            Aggression::Aggressive
        } else {
            Aggression::Calculated
        }
    }
}

/// One recommendation for one signal at one point in time.
///
/// Fields are read-only; a decision is consumed by the executor and never
/// stored as state. `stop_loss_pct` and `size_usd` are zero on a skip.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TradeDecision {
    action: TradeAction,
    asset_id: String,
    venue: Venue,
    side: Side,
    size_usd: f64,
    bankroll_fraction: f64,
    stop_loss_pct: f64,
    reason: Option<SkipReason>,
    win_probability: f64,
    payout_ratio: f64,
    reference_price: Option<f64>,
    time_sensitivity: f64,
    created_at: DateTime<Utc>,
}

impl TradeDecision {
    /// Accepted entry. `win_probability` is the momentum-adjusted estimate.
    pub fn enter(
        signal: &Signal,
        win_probability: f64,
        size_usd: f64,
        bankroll_fraction: f64,
        stop_loss_pct: f64,
    ) -> Self {
        Self {
            action: TradeAction::Enter,
            size_usd,
            bankroll_fraction,
            stop_loss_pct,
            reason: None,
            win_probability,
            ..Self::base(signal)
        }
    }

    pub fn skip(signal: &Signal, reason: SkipReason) -> Self {
        Self {
            reason: Some(reason),
            ..Self::base(signal)
        }
    }

    fn base(signal: &Signal) -> Self {
        Self {
            action: TradeAction::Skip,
            asset_id: signal.asset_id().to_string(),
            venue: signal.venue(),
            side: signal.side(),
            size_usd: 0.0,
            bankroll_fraction: 0.0,
            stop_loss_pct: 0.0,
            reason: None,
            win_probability: signal.win_probability(),
            payout_ratio: signal.payout_ratio(),
            reference_price: signal.reference_price(),
            time_sensitivity: signal.time_sensitivity(),
            created_at: Utc::now(),
        }
    }

    pub fn action(&self) -> TradeAction {
        self.action
    }

    pub fn is_enter(&self) -> bool {
        self.action == TradeAction::Enter
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

    pub fn size_usd(&self) -> f64 {
        self.size_usd
    }

    /// Final size as a fraction of bankroll at decision time
    pub fn bankroll_fraction(&self) -> f64 {
        self.bankroll_fraction
    }

    pub fn stop_loss_pct(&self) -> f64 {
        self.stop_loss_pct
    }

    pub fn reason(&self) -> Option<SkipReason> {
        self.reason
    }

    pub fn win_probability(&self) -> f64 {
        self.win_probability
    }

    pub fn payout_ratio(&self) -> f64 {
        self.payout_ratio
    }

    pub fn reference_price(&self) -> Option<f64> {
        self.reference_price
    }

    pub fn time_sensitivity(&self) -> f64 {
        self.time_sensitivity
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Expected net profit in USD: size * (p(b + 1) - 1)
    pub fn expected_profit_usd(&self) -> f64 {
        self.size_usd * (self.win_probability * (self.payout_ratio + 1.0) - 1.0)
    }

    pub fn aggression(&self) -> Aggression {
        Aggression::from_fraction(self.bankroll_fraction)
    }
}

impl fmt::Display for TradeDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.action, self.reason) {
            (TradeAction::Enter, _) => write!(
                f,
                "ENTER {} {:?} ${:.2} ({:.1}% of bankroll, stop {:.0}%)",
                self.asset_id,
                self.side,
                self.size_usd,
                self.bankroll_fraction * 100.0,
                self.stop_loss_pct * 100.0
            ),
            (TradeAction::Skip, Some(reason)) => write!(f, "SKIP {}: {}", self.asset_id, reason),
            (TradeAction::Skip, None) => write!(f, "SKIP {}", self.asset_id),
        }
    }
}

/// Which execution path produced a fill
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    Simulation,
    Live,
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionMode::Simulation => write!(f, "simulation"),
            ExecutionMode::Live => write!(f, "live"),
        }
    }
}

/// Confirmed execution of an ENTER decision. May be smaller than requested.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fill {
    /// Average fill price of the purchased instrument
    pub price: f64,
    /// USD actually put into the position, net of fees
    pub size_usd: f64,
    pub fees_usd: f64,
    pub mode: ExecutionMode,
    /// Venue order id or transaction hash
    pub reference: Option<String>,
}

impl Fill {
    pub fn simulated(price: f64, size_usd: f64, fees_usd: f64) -> Self {
        Self {
            price,
            size_usd,
            fees_usd,
            mode: ExecutionMode::Simulation,
            reference: None,
        }
    }

    /// Cash that leaves the bankroll's free balance
    pub fn total_cost_usd(&self) -> f64 {
        self.size_usd + self.fees_usd
    }
}
