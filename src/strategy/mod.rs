//! Strategy Layer - Kelly sizing with bounded recovery and momentum bias
//!
//! Composable pure functions run in one fixed order by the engine:
//! - `kelly`: fractional Kelly baseline from win probability and payout odds
//! - `recovery`: bounded martingale scaling after consecutive losses
//! - `gamblers_logic`: the pipeline (momentum bias → Kelly → recovery → risk governor)
//! - `params`: engine parameters and personality presets

pub mod params;
pub mod kelly;
pub mod recovery;
pub mod gamblers_logic;

pub use params::{ConfigurationError, EngineConfig, Personality};
pub use kelly::KellyQuote;
pub use gamblers_logic::GamblersLogic;
