use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use super::signal::Venue;

/// Floor for prediction-market stop prices
pub const MIN_OUTCOME_PRICE: f64 = 0.01;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    /// YES on a prediction market, long the token on a DEX
    Long,
    /// NO on a prediction market, short the token on a DEX
    Short,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    Open,
    ClosedWin,
    ClosedLoss,
    ClosedStopped,
}

impl Status {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Status::Open)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Open => write!(f, "OPEN"),
            Status::ClosedWin => write!(f, "CLOSED_WIN"),
            Status::ClosedLoss => write!(f, "CLOSED_LOSS"),
            Status::ClosedStopped => write!(f, "CLOSED_STOPPED"),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum PositionError {
    #[error("Position is already closed")]
    AlreadyClosed,
    #[error("Cannot transition position to {0}")]
    InvalidTransition(Status),
    #[error("Invalid size: {0}")]
    InvalidSize(f64),
    #[error("Invalid entry price: {0}")]
    InvalidEntryPrice(f64),
    #[error("Invalid price: {0}")]
    InvalidPrice(f64),
    #[error("Invalid stop loss pct: {0}")]
    InvalidStopLoss(f64),
}

/// A position owned by the ledger.
///
/// On a prediction market the position always holds the purchased outcome
/// token (YES or NO) and `entry_price` is that token's price, so value moves
/// with the price for either side. Only a DEX short gains when price falls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub id: String,
    pub asset_id: String,
    pub venue: Venue,
    pub side: Side,
    pub entry_price: f64,
    pub size_usd: f64,
    pub fees_usd: f64,
    pub stop_loss_price: f64,
    pub opened_at: DateTime<Utc>,
    pub status: Status,
    pub last_price: f64,
    pub exit_price: Option<f64>,
    pub realized_pnl_usd: Option<f64>,
    pub closed_at: Option<DateTime<Utc>>,
}

impl Position {
    #[allow(clippy::too_many_arguments)]
    pub fn open(
        id: String,
        asset_id: String,
        venue: Venue,
        side: Side,
        entry_price: f64,
        size_usd: f64,
        fees_usd: f64,
        stop_loss_pct: f64,
        opened_at: DateTime<Utc>,
    ) -> Result<Self, PositionError> {
        if !size_usd.is_finite() || size_usd <= 0.0 {
            return Err(PositionError::InvalidSize(size_usd));
        }
        if !entry_price.is_finite() || entry_price <= 0.0 {
            return Err(PositionError::InvalidEntryPrice(entry_price));
        }
        if venue == Venue::PredictionMarket && entry_price >= 1.0 {
            return Err(PositionError::InvalidEntryPrice(entry_price));
        }
        if !stop_loss_pct.is_finite() || stop_loss_pct <= 0.0 || stop_loss_pct > 1.0 {
            return Err(PositionError::InvalidStopLoss(stop_loss_pct));
        }

        Ok(Self {
            id,
            asset_id,
            venue,
            side,
            entry_price,
            size_usd,
            fees_usd,
            stop_loss_price: stop_loss_price(venue, side, entry_price, stop_loss_pct),
            opened_at,
            status: Status::Open,
            last_price: entry_price,
            exit_price: None,
            realized_pnl_usd: None,
            closed_at: None,
        })
    }

    pub fn is_open(&self) -> bool {
        self.status == Status::Open
    }

    /// +1 when value rises with price, -1 for a DEX short
    fn direction(&self) -> f64 {
        price_direction(self.venue, self.side)
    }

    /// P&L if the position were exited at `price`
    pub fn pnl_at(&self, price: f64) -> f64 {
        self.direction() * (price - self.entry_price) / self.entry_price * self.size_usd
    }

    pub fn unrealized_pnl(&self) -> f64 {
        if self.is_open() {
            self.pnl_at(self.last_price)
        } else {
            0.0
        }
    }

    /// True once `price` has reached or passed the stop
    pub fn is_stop_crossed(&self, price: f64) -> bool {
        if self.direction() > 0.0 {
            price <= self.stop_loss_price
        } else {
            price >= self.stop_loss_price
        }
    }

    pub fn mark(&mut self, price: f64) -> Result<(), PositionError> {
        if !self.is_open() {
            return Err(PositionError::AlreadyClosed);
        }
        if !price.is_finite() || price <= 0.0 {
            return Err(PositionError::InvalidPrice(price));
        }
        self.last_price = price;
        Ok(())
    }

    /// OPEN -> terminal. Terminal states never change again.
    pub fn close(
        &mut self,
        status: Status,
        exit_price: Option<f64>,
        pnl_usd: f64,
        closed_at: DateTime<Utc>,
    ) -> Result<(), PositionError> {
        if !self.is_open() {
            return Err(PositionError::AlreadyClosed);
        }
        if !status.is_terminal() {
            return Err(PositionError::InvalidTransition(status));
        }
        self.status = status;
        self.exit_price = exit_price;
        if let Some(p) = exit_price {
            self.last_price = p;
        }
        self.realized_pnl_usd = Some(pnl_usd);
        self.closed_at = Some(closed_at);
        Ok(())
    }
}

pub fn price_direction(venue: Venue, side: Side) -> f64 {
    match (venue, side) {
        (Venue::DexToken, Side::Short) => -1.0,
        _ => 1.0,
    }
}

/// Stop price for a fill at `entry_price`
pub fn stop_loss_price(venue: Venue, side: Side, entry_price: f64, stop_loss_pct: f64) -> f64 {
    if price_direction(venue, side) > 0.0 {
        let stop = entry_price * (1.0 - stop_loss_pct);
        if venue == Venue::PredictionMarket {
            stop.max(MIN_OUTCOME_PRICE)
        } else {
            stop
        }
    } else {
        entry_price * (1.0 + stop_loss_pct)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn pm_position() -> Position {
        Position::open(
            "pos-1".to_string(),
            "btc-100k".to_string(),
            Venue::PredictionMarket,
            Side::Long,
            0.40,
            10.0,
            0.02,
            0.15,
            Utc::now(),
        )
        .unwrap()
    }

    #[test]
    fn test_open_position() {
        let position = pm_position();
        assert_eq!(position.status, Status::Open);
        assert_relative_eq!(position.stop_loss_price, 0.34, epsilon = 1e-12);
        assert_eq!(position.last_price, 0.40);
    }

    #[test]
    fn test_open_invalid_inputs() {
        let now = Utc::now();
        let open = |price: f64, size: f64, stop: f64| {
            Position::open(
                "p".into(),
                "a".into(),
                Venue::PredictionMarket,
                Side::Long,
                price,
                size,
                0.0,
                stop,
                now,
            )
        };
        assert!(matches!(open(0.5, 0.0, 0.15), Err(PositionError::InvalidSize(_))));
        assert!(matches!(open(0.0, 1.0, 0.15), Err(PositionError::InvalidEntryPrice(_))));
        assert!(matches!(open(1.2, 1.0, 0.15), Err(PositionError::InvalidEntryPrice(_))));
        assert!(matches!(open(0.5, 1.0, 0.0), Err(PositionError::InvalidStopLoss(_))));
    }

    #[test]
    fn test_prediction_market_stop_floor() {
        let stop = stop_loss_price(Venue::PredictionMarket, Side::Long, 0.011, 0.5);
        assert_relative_eq!(stop, MIN_OUTCOME_PRICE);
    }

    #[test]
    fn test_dex_short_stop_above_entry() {
        let stop = stop_loss_price(Venue::DexToken, Side::Short, 2.0, 0.10);
        assert_relative_eq!(stop, 2.2, epsilon = 1e-12);

        let position = Position::open(
            "p".into(),
            "SOL".into(),
            Venue::DexToken,
            Side::Short,
            2.0,
            100.0,
            0.0,
            0.10,
            Utc::now(),
        )
        .unwrap();
        assert!(!position.is_stop_crossed(2.1));
        assert!(position.is_stop_crossed(2.25));
        assert_relative_eq!(position.pnl_at(1.8), 10.0, epsilon = 1e-9);
    }

    #[test]
    fn test_stop_crossing_long() {
        let position = pm_position();
        assert!(!position.is_stop_crossed(0.35));
        assert!(position.is_stop_crossed(position.stop_loss_price));
        assert!(position.is_stop_crossed(0.33));
        assert!(position.is_stop_crossed(0.20));
    }

    #[test]
    fn test_mark_and_unrealized() {
        let mut position = pm_position();
        position.mark(0.50).unwrap();
        assert_relative_eq!(position.unrealized_pnl(), 2.5, epsilon = 1e-9);
        assert!(matches!(position.mark(-1.0), Err(PositionError::InvalidPrice(_))));
    }

    #[test]
    fn test_close_is_terminal() {
        let mut position = pm_position();
        position.close(Status::ClosedWin, None, 15.0, Utc::now()).unwrap();
        assert_eq!(position.status, Status::ClosedWin);
        assert_eq!(position.unrealized_pnl(), 0.0);

        let result = position.close(Status::ClosedLoss, None, -10.0, Utc::now());
        assert!(matches!(result, Err(PositionError::AlreadyClosed)));
        assert_eq!(position.status, Status::ClosedWin);
        assert!(matches!(position.mark(0.5), Err(PositionError::AlreadyClosed)));
    }

    #[test]
    fn test_close_rejects_open_status() {
        let mut position = pm_position();
        let result = position.close(Status::Open, None, 0.0, Utc::now());
        assert!(matches!(result, Err(PositionError::InvalidTransition(Status::Open))));
        assert!(position.is_open());
    }
}
