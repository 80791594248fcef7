//! Ports Layer - Trait definitions for external collaborators
//!
//! The engine talks to the outside world only through these traits:
//! - Market data (raw observations per venue)
//! - Execution (submit ENTER decision, await fill or rejection)
//! - Settlement (outcomes and price updates for open positions)

pub mod market_data;
pub mod execution;
pub mod settlement;
pub mod mocks;

pub use market_data::{MarketDataError, MarketDataPort};
pub use execution::{ExecutionError, ExecutionPort};
pub use settlement::{SettlementError, SettlementEvent, SettlementPort};
