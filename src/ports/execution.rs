use async_trait::async_trait;
use thiserror::Error;

use crate::domain::{ExecutionMode, Fill, TradeDecision};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ExecutionError {
    #[error("Order rejected by venue: {0}")]
    Rejected(String),
    #[error("Venue request failed: {0}")]
    VenueError(String),
    #[error("Slippage tolerance exceeded")]
    SlippageExceeded,
    #[error("Invalid decision: {0}")]
    InvalidDecision(String),
}

/// Places ENTER decisions on a venue.
///
/// A fill may be smaller than requested and at a different price; callers
/// record what the fill says, not what was asked for. Retries for transient
/// venue failures belong here, never in the engine.
#[async_trait]
pub trait ExecutionPort: Send + Sync {
    fn mode(&self) -> ExecutionMode;

    async fn submit(&self, decision: &TradeDecision) -> Result<Fill, ExecutionError>;
}
