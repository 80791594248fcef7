//! Adapters Layer - External System Implementations
//!
//! - Paper: simulated executor, synthetic venue feeds and settlement
//! - CLI: Command-line interface handlers

pub mod cli;
pub mod paper;

pub use cli::CliApp;
pub use paper::{PaperConfig, PaperExecutor, SettlementConfig, SimulatedSettlement, SyntheticMarket};
