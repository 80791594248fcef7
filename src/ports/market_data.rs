use async_trait::async_trait;
use thiserror::Error;

use crate::domain::{RawObservation, Venue};

/// Market data error type
#[derive(Error, Debug, Clone)]
pub enum MarketDataError {
    #[error("Venue request failed: {0}")]
    RequestError(String),

    #[error("Data parsing error: {0}")]
    ParseError(String),

    #[error("Venue unavailable: {0}")]
    Unavailable(String),
}

/// Source of raw observations for one venue.
///
/// Scans for different venues may run concurrently; implementations must
/// not touch portfolio state.
#[async_trait]
pub trait MarketDataPort: Send + Sync {
    /// Venue this source scans
    fn venue(&self) -> Venue;

    /// Short label for logs
    fn name(&self) -> &str;

    /// One pass over the venue's current opportunities
    async fn scan(&self) -> Result<Vec<RawObservation>, MarketDataError>;
}
