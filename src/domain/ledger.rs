//! Portfolio Ledger
//!
//! The authoritative record of bankroll, open positions and realized P&L.
//! `apply_open` and `apply_close` are the only operations that move money;
//! each validates everything up front and then mutates in one step, so a
//! failed call leaves the state untouched.
//!
//! Bankroll accounting: stakes stay inside `bankroll_usd` while a position is
//! open (tracked as `committed_usd`), fees leave it at entry, and P&L lands on
//! close. So `bankroll = starting capital + realized P&L - fees paid`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

use super::decision::{Fill, TradeDecision};
use super::position::{Position, PositionError, Side, Status};
use super::signal::Venue;

/// Relative slack allowed when checking a fill against the requested size
const FILL_TOLERANCE: f64 = 1e-9;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum LedgerError {
    #[error("Unknown position: {0}")]
    UnknownPosition(String),
    #[error("Position {0} is already closed")]
    AlreadyClosed(String),
    #[error("Decision for {0} is not an entry")]
    NotAnEntry(String),
    #[error("Fill for {0} is empty")]
    EmptyFill(String),
    #[error("Fill cost ${filled:.4} exceeds requested ${requested:.4}")]
    Overfill { filled: f64, requested: f64 },
    #[error("Invalid fill: {0}")]
    InvalidFill(String),
    #[error("Invalid outcome for {id}: {reason}")]
    InvalidOutcome { id: String, reason: String },
    #[error("Stop for {id} at {stop:.6} not crossed by exit price {price:.6}")]
    StopNotCrossed { id: String, stop: f64, price: f64 },
    #[error("Insufficient funds: need ${needed:.4}, available ${available:.4}")]
    InsufficientFunds { needed: f64, available: f64 },
    #[error("Invalid starting capital: {0}")]
    InvalidCapital(f64),
}

impl LedgerError {
    /// The caller and the ledger disagree about which positions exist
    pub fn is_desync(&self) -> bool {
        matches!(
            self,
            LedgerError::UnknownPosition(_) | LedgerError::AlreadyClosed(_)
        )
    }
}

/// Settlement result reported for an OPEN position
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Outcome {
    /// Closed in profit; `pnl_usd` >= 0
    Win { pnl_usd: f64 },
    /// Closed at a loss; `loss_usd` is the positive amount lost
    Loss { loss_usd: f64 },
    /// Resolved or exited at a price; win or loss follows the P&L sign
    Settled { exit_price: f64 },
    /// Price crossed the stop before any other settlement
    StopLoss { exit_price: f64 },
}

/// Durable portfolio state. Mutated only through [`PortfolioLedger`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioState {
    pub starting_capital_usd: f64,
    pub bankroll_usd: f64,
    pub peak_bankroll_usd: f64,
    pub open_positions: BTreeMap<String, Position>,
    pub consecutive_losses: u32,
    pub consecutive_wins: u32,
    pub realized_pnl_usd: f64,
    pub committed_usd: f64,
    pub fees_paid_usd: f64,
}

impl PortfolioState {
    pub fn new(starting_capital_usd: f64) -> Self {
        Self {
            starting_capital_usd,
            bankroll_usd: starting_capital_usd,
            peak_bankroll_usd: starting_capital_usd,
            open_positions: BTreeMap::new(),
            consecutive_losses: 0,
            consecutive_wins: 0,
            realized_pnl_usd: 0.0,
            committed_usd: 0.0,
            fees_paid_usd: 0.0,
        }
    }

    /// `(peak - bankroll) / peak`, 0 when the peak is 0
    pub fn drawdown(&self) -> f64 {
        if self.peak_bankroll_usd <= 0.0 {
            return 0.0;
        }
        ((self.peak_bankroll_usd - self.bankroll_usd) / self.peak_bankroll_usd).max(0.0)
    }

    /// Bankroll not tied up in open stakes
    pub fn available_usd(&self) -> f64 {
        (self.bankroll_usd - self.committed_usd).max(0.0)
    }

    pub fn unrealized_pnl_usd(&self) -> f64 {
        self.open_positions.values().map(|p| p.unrealized_pnl()).sum()
    }

    /// Bankroll marked to market
    pub fn equity_usd(&self) -> f64 {
        self.bankroll_usd + self.unrealized_pnl_usd()
    }
}

/// One closed trade
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub position_id: String,
    pub asset_id: String,
    pub venue: Venue,
    pub side: Side,
    pub status: Status,
    pub size_usd: f64,
    pub entry_price: f64,
    pub exit_price: Option<f64>,
    pub pnl_usd: f64,
    pub opened_at: DateTime<Utc>,
    pub closed_at: DateTime<Utc>,
}

/// Aggregate performance over the trade history
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TradeStats {
    pub total_trades: usize,
    pub wins: usize,
    pub losses: usize,
    pub stopped: usize,
    pub win_rate: f64,
    pub gross_profit_usd: f64,
    pub gross_loss_usd: f64,
    /// Gross profit / gross loss; infinite with profit and no losses
    pub profit_factor: f64,
    pub largest_win_usd: f64,
    pub largest_loss_usd: f64,
}

impl TradeStats {
    pub fn from_history(history: &[TradeRecord]) -> Self {
        let mut stats = TradeStats {
            total_trades: history.len(),
            ..Default::default()
        };

        for record in history {
            match record.status {
                Status::ClosedWin => stats.wins += 1,
                Status::ClosedStopped => stats.stopped += 1,
                _ => stats.losses += 1,
            }
            if record.pnl_usd > 0.0 {
                stats.gross_profit_usd += record.pnl_usd;
                stats.largest_win_usd = stats.largest_win_usd.max(record.pnl_usd);
            } else {
                stats.gross_loss_usd += -record.pnl_usd;
                stats.largest_loss_usd = stats.largest_loss_usd.min(record.pnl_usd);
            }
        }

        if stats.total_trades > 0 {
            stats.win_rate = stats.wins as f64 / stats.total_trades as f64;
        }
        stats.profit_factor = if stats.gross_loss_usd > 0.0 {
            stats.gross_profit_usd / stats.gross_loss_usd
        } else if stats.gross_profit_usd > 0.0 {
            f64::INFINITY
        } else {
            0.0
        };
        stats
    }
}

/// Snapshot for display: where the bankroll stands against the moonshot
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusReport {
    pub bankroll_usd: f64,
    pub peak_bankroll_usd: f64,
    pub drawdown: f64,
    pub realized_pnl_usd: f64,
    pub unrealized_pnl_usd: f64,
    pub fees_paid_usd: f64,
    pub open_positions: usize,
    pub streak: String,
    pub stats: TradeStats,
    pub target_usd: f64,
    pub progress_pct: f64,
    pub doublings_achieved: u32,
    pub doublings_needed: u32,
}

impl fmt::Display for StatusReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Bankroll:      ${:.2} (peak ${:.2})", self.bankroll_usd, self.peak_bankroll_usd)?;
        writeln!(f, "Drawdown:      {:.1}%", self.drawdown * 100.0)?;
        writeln!(
            f,
            "P&L:           ${:+.2} realized, ${:+.2} unrealized, ${:.2} fees",
            self.realized_pnl_usd, self.unrealized_pnl_usd, self.fees_paid_usd
        )?;
        writeln!(f, "Open:          {}", self.open_positions)?;
        writeln!(
            f,
            "Trades:        {} ({:.1}% win, PF {:.2}, streak {})",
            self.stats.total_trades,
            self.stats.win_rate * 100.0,
            self.stats.profit_factor,
            self.streak
        )?;
        write!(
            f,
            "Target:        ${:.0} ({:.4}%, {}/{} doublings)",
            self.target_usd, self.progress_pct, self.doublings_achieved, self.doublings_needed
        )
    }
}

/// Single-writer ledger. Callers serialize access (one owner, or one lock).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortfolioLedger {
    state: PortfolioState,
    closed_positions: BTreeMap<String, Position>,
    history: Vec<TradeRecord>,
}

impl PortfolioLedger {
    pub fn new(starting_capital_usd: f64) -> Result<Self, LedgerError> {
        if !starting_capital_usd.is_finite() || starting_capital_usd <= 0.0 {
            return Err(LedgerError::InvalidCapital(starting_capital_usd));
        }
        Ok(Self {
            state: PortfolioState::new(starting_capital_usd),
            closed_positions: BTreeMap::new(),
            history: Vec::new(),
        })
    }

    pub fn state(&self) -> &PortfolioState {
        &self.state
    }

    pub fn history(&self) -> &[TradeRecord] {
        &self.history
    }

    pub fn position(&self, id: &str) -> Option<&Position> {
        self.state
            .open_positions
            .get(id)
            .or_else(|| self.closed_positions.get(id))
    }

    pub fn closed_positions(&self) -> impl Iterator<Item = &Position> {
        self.closed_positions.values()
    }

    /// Record a confirmed fill for an ENTER decision and open the position.
    pub fn apply_open(
        &mut self,
        decision: &TradeDecision,
        fill: &Fill,
    ) -> Result<Position, LedgerError> {
        if !decision.is_enter() {
            return Err(LedgerError::NotAnEntry(decision.asset_id().to_string()));
        }
        if !fill.size_usd.is_finite() || fill.size_usd <= 0.0 {
            return Err(LedgerError::EmptyFill(decision.asset_id().to_string()));
        }
        if !fill.fees_usd.is_finite() || fill.fees_usd < 0.0 {
            return Err(LedgerError::InvalidFill(format!("fees {}", fill.fees_usd)));
        }

        let cost = fill.total_cost_usd();
        if cost > decision.size_usd() * (1.0 + FILL_TOLERANCE) {
            return Err(LedgerError::Overfill {
                filled: cost,
                requested: decision.size_usd(),
            });
        }
        let available = self.state.available_usd();
        if cost > available * (1.0 + FILL_TOLERANCE) {
            return Err(LedgerError::InsufficientFunds {
                needed: cost,
                available,
            });
        }

        let position = Position::open(
            format!("pos_{}", uuid::Uuid::new_v4().simple()),
            decision.asset_id().to_string(),
            decision.venue(),
            decision.side(),
            fill.price,
            fill.size_usd,
            fill.fees_usd,
            decision.stop_loss_pct(),
            Utc::now(),
        )
        .map_err(|e| LedgerError::InvalidFill(e.to_string()))?;

        let state = &mut self.state;
        state.bankroll_usd = (state.bankroll_usd - fill.fees_usd).max(0.0);
        state.committed_usd += fill.size_usd;
        state.fees_paid_usd += fill.fees_usd;
        state
            .open_positions
            .insert(position.id.clone(), position.clone());

        tracing::info!(
            "Opened {} {} {:?} ${:.2} @ {:.4} (stop {:.4}, fees ${:.4}, {})",
            position.id,
            position.asset_id,
            position.side,
            position.size_usd,
            position.entry_price,
            position.stop_loss_price,
            fill.fees_usd,
            fill.mode
        );

        Ok(position)
    }

    /// Settle an OPEN position. Bankroll, realized P&L, peak and streak
    /// counters move together or not at all.
    pub fn apply_close(
        &mut self,
        position_id: &str,
        outcome: Outcome,
    ) -> Result<PortfolioState, LedgerError> {
        let position = match self.state.open_positions.get(position_id) {
            Some(p) => p,
            None if self.closed_positions.contains_key(position_id) => {
                return Err(LedgerError::AlreadyClosed(position_id.to_string()));
            }
            None => return Err(LedgerError::UnknownPosition(position_id.to_string())),
        };

        let (status, exit_price, pnl) = resolve(position, outcome)?;

        let mut position = match self.state.open_positions.remove(position_id) {
            Some(p) => p,
            None => return Err(LedgerError::UnknownPosition(position_id.to_string())),
        };
        let closed_at = Utc::now();
        position
            .close(status, exit_price, pnl, closed_at)
            .map_err(|e| match e {
                PositionError::AlreadyClosed => LedgerError::AlreadyClosed(position_id.to_string()),
                other => LedgerError::InvalidOutcome {
                    id: position_id.to_string(),
                    reason: other.to_string(),
                },
            })?;

        let state = &mut self.state;
        state.bankroll_usd = (state.bankroll_usd + pnl).max(0.0);
        state.peak_bankroll_usd = state.peak_bankroll_usd.max(state.bankroll_usd);
        state.committed_usd = (state.committed_usd - position.size_usd).max(0.0);
        state.realized_pnl_usd += pnl;
        if status == Status::ClosedWin {
            state.consecutive_losses = 0;
            state.consecutive_wins += 1;
        } else {
            state.consecutive_losses += 1;
            state.consecutive_wins = 0;
        }

        self.history.push(TradeRecord {
            position_id: position.id.clone(),
            asset_id: position.asset_id.clone(),
            venue: position.venue,
            side: position.side,
            status,
            size_usd: position.size_usd,
            entry_price: position.entry_price,
            exit_price,
            pnl_usd: pnl,
            opened_at: position.opened_at,
            closed_at,
        });

        tracing::info!(
            "Closed {} {} as {} | P&L ${:+.4} | bankroll ${:.2} (peak ${:.2}, drawdown {:.1}%)",
            position.id,
            position.asset_id,
            status,
            pnl,
            state.bankroll_usd,
            state.peak_bankroll_usd,
            state.drawdown() * 100.0
        );

        self.closed_positions.insert(position.id.clone(), position);
        Ok(self.state.clone())
    }

    /// Update the mark on an OPEN position. Returns true if the stop has
    /// been crossed at this price.
    pub fn mark_price(&mut self, position_id: &str, price: f64) -> Result<bool, LedgerError> {
        let position = match self.state.open_positions.get_mut(position_id) {
            Some(p) => p,
            None if self.closed_positions.contains_key(position_id) => {
                return Err(LedgerError::AlreadyClosed(position_id.to_string()));
            }
            None => return Err(LedgerError::UnknownPosition(position_id.to_string())),
        };
        position
            .mark(price)
            .map_err(|e| LedgerError::InvalidOutcome {
                id: position_id.to_string(),
                reason: e.to_string(),
            })?;
        Ok(position.is_stop_crossed(price))
    }

    /// OPEN positions whose last mark is at or through the stop
    pub fn stop_loss_triggers(&self) -> Vec<(String, f64)> {
        self.state
            .open_positions
            .values()
            .filter(|p| p.is_stop_crossed(p.last_price))
            .map(|p| (p.id.clone(), p.last_price))
            .collect()
    }

    pub fn stats(&self) -> TradeStats {
        TradeStats::from_history(&self.history)
    }

    pub fn status_report(&self, target_usd: f64) -> StatusReport {
        let state = &self.state;
        let start = state.starting_capital_usd;
        let doublings = |value: f64| -> u32 {
            if value > start && start > 0.0 {
                (value / start).log2().floor() as u32
            } else {
                0
            }
        };
        let doublings_needed = if target_usd > start && start > 0.0 {
            (target_usd / start).log2().ceil() as u32
        } else {
            0
        };
        let streak = if state.consecutive_wins > 0 {
            format!("W{}", state.consecutive_wins)
        } else if state.consecutive_losses > 0 {
            format!("L{}", state.consecutive_losses)
        } else {
            "N/A".to_string()
        };
        let progress_pct = if target_usd > 0.0 {
            (state.equity_usd() / target_usd * 100.0).min(100.0)
        } else {
            0.0
        };

        StatusReport {
            bankroll_usd: state.bankroll_usd,
            peak_bankroll_usd: state.peak_bankroll_usd,
            drawdown: state.drawdown(),
            realized_pnl_usd: state.realized_pnl_usd,
            unrealized_pnl_usd: state.unrealized_pnl_usd(),
            fees_paid_usd: state.fees_paid_usd,
            open_positions: state.open_positions.len(),
            streak,
            stats: self.stats(),
            target_usd,
            progress_pct,
            doublings_achieved: doublings(state.peak_bankroll_usd),
            doublings_needed,
        }
    }

    /// Invariant check used when restoring from disk
    pub fn check_consistency(&self) -> Result<(), String> {
        let s = &self.state;
        if !(s.bankroll_usd.is_finite() && s.bankroll_usd >= 0.0) {
            return Err(format!("bankroll {}", s.bankroll_usd));
        }
        if s.peak_bankroll_usd < s.bankroll_usd {
            return Err(format!(
                "peak {} below bankroll {}",
                s.peak_bankroll_usd, s.bankroll_usd
            ));
        }
        if let Some(p) = s.open_positions.values().find(|p| !p.is_open()) {
            return Err(format!("position {} in open set with status {}", p.id, p.status));
        }
        if let Some(p) = self.closed_positions.values().find(|p| p.is_open()) {
            return Err(format!("position {} in closed set is OPEN", p.id));
        }
        let committed: f64 = s.open_positions.values().map(|p| p.size_usd).sum();
        if (committed - s.committed_usd).abs() > 1e-6 {
            return Err(format!(
                "committed {} does not match open stakes {}",
                s.committed_usd, committed
            ));
        }
        Ok(())
    }
}

/// Validate an outcome against the position and work out status and P&L
fn resolve(position: &Position, outcome: Outcome) -> Result<(Status, Option<f64>, f64), LedgerError> {
    let invalid = |reason: String| LedgerError::InvalidOutcome {
        id: position.id.clone(),
        reason,
    };
    let valid_price = |price: f64| price.is_finite() && price >= 0.0;

    match outcome {
        Outcome::Win { pnl_usd } => {
            if !pnl_usd.is_finite() || pnl_usd < 0.0 {
                return Err(invalid(format!("win with P&L {}", pnl_usd)));
            }
            Ok((Status::ClosedWin, None, pnl_usd))
        }
        Outcome::Loss { loss_usd } => {
            if !loss_usd.is_finite() || loss_usd < 0.0 {
                return Err(invalid(format!("loss amount {}", loss_usd)));
            }
            Ok((Status::ClosedLoss, None, -loss_usd))
        }
        Outcome::Settled { exit_price } => {
            if !valid_price(exit_price) {
                return Err(invalid(format!("exit price {}", exit_price)));
            }
            let pnl = position.pnl_at(exit_price);
            let status = if pnl > 0.0 {
                Status::ClosedWin
            } else {
                Status::ClosedLoss
            };
            Ok((status, Some(exit_price), pnl))
        }
        Outcome::StopLoss { exit_price } => {
            if !valid_price(exit_price) {
                return Err(invalid(format!("exit price {}", exit_price)));
            }
            if !position.is_stop_crossed(exit_price) {
                return Err(LedgerError::StopNotCrossed {
                    id: position.id.clone(),
                    stop: position.stop_loss_price,
                    price: exit_price,
                });
            }
            Ok((Status::ClosedStopped, Some(exit_price), position.pnl_at(exit_price)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::signal::Signal;
    use approx::assert_relative_eq;

    fn enter(size: f64) -> TradeDecision {
        let signal = Signal::new("btc-100k", Venue::PredictionMarket, 0.55, 1.0, 0.0)
            .unwrap()
            .with_reference_price(0.5);
        TradeDecision::enter(&signal, 0.55, size, size / 100.0, 0.15)
    }

    fn open(ledger: &mut PortfolioLedger, size: f64) -> Position {
        ledger
            .apply_open(&enter(size), &Fill::simulated(0.5, size, 0.0))
            .unwrap()
    }

    #[test]
    fn test_new_ledger() {
        let ledger = PortfolioLedger::new(100.0).unwrap();
        assert_eq!(ledger.state().bankroll_usd, 100.0);
        assert_eq!(ledger.state().peak_bankroll_usd, 100.0);
        assert_eq!(ledger.state().drawdown(), 0.0);
        assert!(PortfolioLedger::new(0.0).is_err());
        assert!(PortfolioLedger::new(f64::NAN).is_err());
    }

    #[test]
    fn test_apply_open_commits_stake() {
        let mut ledger = PortfolioLedger::new(100.0).unwrap();
        let position = ledger
            .apply_open(&enter(10.0), &Fill::simulated(0.5, 9.98, 0.02))
            .unwrap();

        assert_eq!(position.status, Status::Open);
        assert_relative_eq!(position.stop_loss_price, 0.425, epsilon = 1e-12);
        let state = ledger.state();
        assert_relative_eq!(state.bankroll_usd, 99.98, epsilon = 1e-9);
        assert_relative_eq!(state.committed_usd, 9.98, epsilon = 1e-9);
        assert_relative_eq!(state.available_usd(), 90.0, epsilon = 1e-9);
        assert_eq!(state.open_positions.len(), 1);
    }

    #[test]
    fn test_partial_fill_uses_actual_size() {
        let mut ledger = PortfolioLedger::new(100.0).unwrap();
        let position = ledger
            .apply_open(&enter(10.0), &Fill::simulated(0.5, 4.0, 0.0))
            .unwrap();
        assert_eq!(position.size_usd, 4.0);
        assert_relative_eq!(ledger.state().committed_usd, 4.0);
    }

    #[test]
    fn test_apply_open_rejections() {
        let mut ledger = PortfolioLedger::new(100.0).unwrap();
        let signal = Signal::new("m", Venue::PredictionMarket, 0.4, 1.0, 0.0).unwrap();
        let skip = TradeDecision::skip(&signal, crate::domain::SkipReason::NegativeEdge);

        assert!(matches!(
            ledger.apply_open(&skip, &Fill::simulated(0.5, 1.0, 0.0)),
            Err(LedgerError::NotAnEntry(_))
        ));
        assert!(matches!(
            ledger.apply_open(&enter(10.0), &Fill::simulated(0.5, 0.0, 0.0)),
            Err(LedgerError::EmptyFill(_))
        ));
        assert!(matches!(
            ledger.apply_open(&enter(10.0), &Fill::simulated(0.5, 10.0, 0.5)),
            Err(LedgerError::Overfill { .. })
        ));
        assert!(matches!(
            ledger.apply_open(&enter(10.0), &Fill::simulated(1.5, 10.0, 0.0)),
            Err(LedgerError::InvalidFill(_))
        ));
        assert!(matches!(
            ledger.apply_open(&enter(150.0), &Fill::simulated(0.5, 150.0, 0.0)),
            Err(LedgerError::InsufficientFunds { .. })
        ));

        // Nothing moved
        assert_eq!(ledger.state(), PortfolioLedger::new(100.0).unwrap().state());
    }

    #[test]
    fn test_close_win_resets_losses() {
        let mut ledger = PortfolioLedger::new(100.0).unwrap();
        let a = open(&mut ledger, 10.0);
        let b = open(&mut ledger, 10.0);

        let state = ledger.apply_close(&a.id, Outcome::Loss { loss_usd: 10.0 }).unwrap();
        assert_eq!(state.consecutive_losses, 1);
        assert_relative_eq!(state.bankroll_usd, 90.0);
        assert_relative_eq!(state.drawdown(), 0.10, epsilon = 1e-12);

        let state = ledger.apply_close(&b.id, Outcome::Win { pnl_usd: 25.0 }).unwrap();
        assert_eq!(state.consecutive_losses, 0);
        assert_eq!(state.consecutive_wins, 1);
        assert_relative_eq!(state.bankroll_usd, 115.0);
        assert_relative_eq!(state.peak_bankroll_usd, 115.0);
        assert_relative_eq!(state.realized_pnl_usd, 15.0);
        assert_relative_eq!(state.committed_usd, 0.0);
        assert!(state.open_positions.is_empty());
    }

    #[test]
    fn test_double_close_fails_without_change() {
        let mut ledger = PortfolioLedger::new(100.0).unwrap();
        let p = open(&mut ledger, 10.0);
        let after_first = ledger.apply_close(&p.id, Outcome::Win { pnl_usd: 5.0 }).unwrap();

        let second = ledger.apply_close(&p.id, Outcome::Win { pnl_usd: 5.0 });
        assert!(matches!(second, Err(LedgerError::AlreadyClosed(_))));
        assert_eq!(ledger.state(), &after_first);
        assert_eq!(ledger.history().len(), 1);
    }

    #[test]
    fn test_unknown_position() {
        let mut ledger = PortfolioLedger::new(100.0).unwrap();
        let result = ledger.apply_close("pos_missing", Outcome::Loss { loss_usd: 1.0 });
        assert!(matches!(result, Err(LedgerError::UnknownPosition(_))));
        assert!(matches!(
            ledger.mark_price("pos_missing", 0.5),
            Err(LedgerError::UnknownPosition(_))
        ));
    }

    #[test]
    fn test_stop_loss_requires_crossing() {
        let mut ledger = PortfolioLedger::new(100.0).unwrap();
        let p = open(&mut ledger, 10.0);

        let early = ledger.apply_close(&p.id, Outcome::StopLoss { exit_price: 0.45 });
        assert!(matches!(early, Err(LedgerError::StopNotCrossed { .. })));
        assert!(ledger.state().open_positions.contains_key(&p.id));

        let state = ledger
            .apply_close(&p.id, Outcome::StopLoss { exit_price: 0.40 })
            .unwrap();
        assert_eq!(state.consecutive_losses, 1);
        // 20% adverse move on $10
        assert_relative_eq!(state.bankroll_usd, 98.0, epsilon = 1e-9);
        assert_eq!(ledger.position(&p.id).unwrap().status, Status::ClosedStopped);
    }

    #[test]
    fn test_settled_outcome_classifies() {
        let mut ledger = PortfolioLedger::new(100.0).unwrap();
        let won = open(&mut ledger, 10.0);
        let lost = open(&mut ledger, 10.0);

        // YES resolves to 1.0: bought at 0.5, doubles
        ledger.apply_close(&won.id, Outcome::Settled { exit_price: 1.0 }).unwrap();
        assert_eq!(ledger.position(&won.id).unwrap().status, Status::ClosedWin);
        assert_relative_eq!(ledger.state().bankroll_usd, 110.0, epsilon = 1e-9);

        ledger.apply_close(&lost.id, Outcome::Settled { exit_price: 0.0 }).unwrap();
        assert_eq!(ledger.position(&lost.id).unwrap().status, Status::ClosedLoss);
        assert_relative_eq!(ledger.state().bankroll_usd, 100.0, epsilon = 1e-9);
    }

    #[test]
    fn test_invalid_outcome_leaves_state() {
        let mut ledger = PortfolioLedger::new(100.0).unwrap();
        let p = open(&mut ledger, 10.0);
        let before = ledger.state().clone();

        assert!(ledger.apply_close(&p.id, Outcome::Win { pnl_usd: -1.0 }).is_err());
        assert!(ledger.apply_close(&p.id, Outcome::Loss { loss_usd: f64::NAN }).is_err());
        assert_eq!(ledger.state(), &before);
    }

    #[test]
    fn test_bankroll_never_negative() {
        let mut ledger = PortfolioLedger::new(10.0).unwrap();
        let p = open(&mut ledger, 10.0);
        let state = ledger.apply_close(&p.id, Outcome::Loss { loss_usd: 50.0 }).unwrap();
        assert_eq!(state.bankroll_usd, 0.0);
        assert_relative_eq!(state.drawdown(), 1.0);
    }

    #[test]
    fn test_mark_price_and_triggers() {
        let mut ledger = PortfolioLedger::new(100.0).unwrap();
        let p = open(&mut ledger, 10.0);

        assert!(!ledger.mark_price(&p.id, 0.48).unwrap());
        assert!(ledger.stop_loss_triggers().is_empty());
        assert_relative_eq!(ledger.state().unrealized_pnl_usd(), -0.4, epsilon = 1e-9);

        assert!(ledger.mark_price(&p.id, 0.40).unwrap());
        assert_eq!(ledger.stop_loss_triggers(), vec![(p.id.clone(), 0.40)]);

        ledger.apply_close(&p.id, Outcome::StopLoss { exit_price: 0.40 }).unwrap();
        assert!(matches!(
            ledger.mark_price(&p.id, 0.30),
            Err(LedgerError::AlreadyClosed(_))
        ));
    }

    #[test]
    fn test_stats_and_report() {
        let mut ledger = PortfolioLedger::new(2.0).unwrap();
        let a = open(&mut ledger, 0.5);
        let b = open(&mut ledger, 0.5);
        let c = open(&mut ledger, 0.5);
        ledger.apply_close(&a.id, Outcome::Win { pnl_usd: 2.5 }).unwrap();
        ledger.apply_close(&b.id, Outcome::Win { pnl_usd: 4.0 }).unwrap();
        ledger.apply_close(&c.id, Outcome::Loss { loss_usd: 0.5 }).unwrap();

        let stats = ledger.stats();
        assert_eq!(stats.total_trades, 3);
        assert_eq!(stats.wins, 2);
        assert_relative_eq!(stats.win_rate, 2.0 / 3.0, epsilon = 1e-12);
        assert_relative_eq!(stats.profit_factor, 13.0, epsilon = 1e-9);
        assert_relative_eq!(stats.largest_win_usd, 4.0);
        assert_relative_eq!(stats.largest_loss_usd, -0.5);

        let report = ledger.status_report(2_000_000.0);
        assert_relative_eq!(report.bankroll_usd, 8.0, epsilon = 1e-9);
        assert_eq!(report.doublings_achieved, 2); // peak 8.5 / 2 = 4.25x
        assert_eq!(report.doublings_needed, 20);
        assert_eq!(report.streak, "L1");
        assert!(format!("{}", report).contains("Bankroll:"));
    }

    #[test]
    fn test_accounting_identity() {
        let mut ledger = PortfolioLedger::new(50.0).unwrap();
        let a = ledger
            .apply_open(&enter(10.0), &Fill::simulated(0.5, 9.97, 0.03))
            .unwrap();
        let b = ledger
            .apply_open(&enter(5.0), &Fill::simulated(0.5, 4.99, 0.01))
            .unwrap();
        ledger.apply_close(&a.id, Outcome::Settled { exit_price: 0.6 }).unwrap();
        ledger.apply_close(&b.id, Outcome::Loss { loss_usd: 2.0 }).unwrap();

        let s = ledger.state();
        assert_relative_eq!(
            s.bankroll_usd,
            s.starting_capital_usd + s.realized_pnl_usd - s.fees_paid_usd,
            epsilon = 1e-9
        );
        assert!(ledger.check_consistency().is_ok());
    }
}
