//! Domain Layer - Core types and state for the Gambler's Logic engine
//!
//! Pure types and logic with no I/O beyond ledger snapshots.
//! All external interactions happen through the ports layer.
//!
//! - `signal`: raw observation → normalized Signal
//! - `decision`: TradeDecision, SkipReason, Fill
//! - `position`: Position and its OPEN → CLOSED_* state machine
//! - `risk`: Risk Governor (hard caps, drawdown halt)
//! - `ledger`: Portfolio Ledger, the only mutator of bankroll state
//! - `persistence`: JSON snapshots of the ledger

pub mod signal;
pub mod decision;
pub mod position;
pub mod risk;
pub mod ledger;
pub mod persistence;

pub use signal::{normalize, momentum_score, OrderBookTop, RawObservation, Signal, SignalError, Venue};
pub use decision::{Aggression, ExecutionMode, Fill, SkipReason, TradeAction, TradeDecision};
pub use position::{Position, PositionError, Side, Status};
pub use risk::{RiskCheck, RiskGovernor, RiskLimits};
pub use ledger::{LedgerError, Outcome, PortfolioLedger, PortfolioState, StatusReport, TradeRecord, TradeStats};
pub use persistence::{LedgerStore, PersistError, RecoveryStatus};
