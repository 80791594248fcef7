use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{Outcome, Position};

#[derive(Debug, Error, Clone)]
pub enum SettlementError {
    #[error("Price feed error: {0}")]
    FeedError(String),
    #[error("Resolution source error: {0}")]
    ResolutionError(String),
}

/// What the settlement feed reports about an OPEN position
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SettlementEvent {
    /// Final outcome: market resolved, position exited or stop filled
    Resolved { position_id: String, outcome: Outcome },
    /// Latest observed price; may cross the stop
    Price { position_id: String, price: f64 },
}

impl SettlementEvent {
    pub fn position_id(&self) -> &str {
        match self {
            SettlementEvent::Resolved { position_id, .. } => position_id,
            SettlementEvent::Price { position_id, .. } => position_id,
        }
    }
}

/// Feed of outcomes and prices for open positions
#[async_trait]
pub trait SettlementPort: Send + Sync {
    /// Events for the given OPEN positions since the last poll
    async fn poll(&self, open_positions: &[Position]) -> Result<Vec<SettlementEvent>, SettlementError>;
}
