//! Paper Trading Adapters
//!
//! Simulation-path implementations of every port: a slippage-and-fee
//! executor, a synthetic market feed per venue and a settlement feed.
//! All three take an optional seed so runs can be replayed.

mod executor;
mod market;
mod settlement;

pub use executor::{PaperConfig, PaperExecutor};
pub use market::SyntheticMarket;
pub use settlement::{SettlementConfig, SimulatedSettlement};
