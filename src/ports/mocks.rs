//! Recording mocks for the port traits
//!
//! Each mock records every call and replays scripted responses so tests can
//! drive the orchestrator without a venue.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;

use super::execution::{ExecutionError, ExecutionPort};
use super::market_data::{MarketDataError, MarketDataPort};
use super::settlement::{SettlementError, SettlementEvent, SettlementPort};
use crate::domain::{ExecutionMode, Fill, Position, RawObservation, TradeDecision, Venue};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Mock market data port. Each scan pops the next scripted batch; once the
/// script is exhausted scans return nothing.
#[derive(Debug)]
pub struct MockMarketData {
    venue: Venue,
    name: String,
    scans: Arc<Mutex<VecDeque<Result<Vec<RawObservation>, MarketDataError>>>>,
    calls: Arc<Mutex<usize>>,
}

impl MockMarketData {
    pub fn new(venue: Venue) -> Self {
        Self {
            venue,
            name: format!("mock-{}", venue),
            scans: Arc::default(),
            calls: Arc::default(),
        }
    }

    /// Builder method to queue one scan result
    pub fn with_scan(self, observations: Vec<RawObservation>) -> Self {
        lock(&self.scans).push_back(Ok(observations));
        self
    }

    pub fn with_failure(self, error: MarketDataError) -> Self {
        lock(&self.scans).push_back(Err(error));
        self
    }

    /// Number of scans performed
    pub fn call_count(&self) -> usize {
        *lock(&self.calls)
    }
}

#[async_trait]
impl MarketDataPort for MockMarketData {
    fn venue(&self) -> Venue {
        self.venue
    }

    fn name(&self) -> &str {
        &self.name
    }

    async fn scan(&self) -> Result<Vec<RawObservation>, MarketDataError> {
        *lock(&self.calls) += 1;
        lock(&self.scans).pop_front().unwrap_or_else(|| Ok(Vec::new()))
    }
}

/// Scripted executor response
#[derive(Debug, Clone)]
pub enum MockFill {
    /// Fill the requested size at the decision's reference price, no fees
    Full,
    /// Fill this fraction of the requested size
    Partial(f64),
    /// Return this exact fill
    Exact(Fill),
    Reject(String),
    /// Sleep before filling in full
    Delay(Duration),
}

/// Mock execution port. Unscripted submits fill in full.
#[derive(Debug, Default)]
pub struct MockExecution {
    script: Arc<Mutex<VecDeque<MockFill>>>,
    calls: Arc<Mutex<Vec<(String, f64)>>>,
}

impl MockExecution {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method to queue the response for the next submit
    pub fn with_response(self, response: MockFill) -> Self {
        lock(&self.script).push_back(response);
        self
    }

    /// (asset_id, requested size) for every submit
    pub fn get_calls(&self) -> Vec<(String, f64)> {
        lock(&self.calls).clone()
    }

    fn full_fill(decision: &TradeDecision, fraction: f64) -> Fill {
        Fill::simulated(
            decision.reference_price().unwrap_or(0.5),
            decision.size_usd() * fraction,
            0.0,
        )
    }
}

#[async_trait]
impl ExecutionPort for MockExecution {
    fn mode(&self) -> ExecutionMode {
        ExecutionMode::Simulation
    }

    async fn submit(&self, decision: &TradeDecision) -> Result<Fill, ExecutionError> {
        lock(&self.calls).push((decision.asset_id().to_string(), decision.size_usd()));
        let next = lock(&self.script).pop_front().unwrap_or(MockFill::Full);

        match next {
            MockFill::Full => Ok(Self::full_fill(decision, 1.0)),
            MockFill::Partial(fraction) => Ok(Self::full_fill(decision, fraction)),
            MockFill::Exact(fill) => Ok(fill),
            MockFill::Reject(reason) => Err(ExecutionError::Rejected(reason)),
            MockFill::Delay(delay) => {
                tokio::time::sleep(delay).await;
                Ok(Self::full_fill(decision, 1.0))
            }
        }
    }
}

/// Mock settlement feed. Each poll pops the next scripted batch.
#[derive(Debug, Default)]
pub struct MockSettlement {
    polls: Arc<Mutex<VecDeque<Vec<SettlementEvent>>>>,
    seen: Arc<Mutex<Vec<Vec<String>>>>,
}

impl MockSettlement {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_events(self, events: Vec<SettlementEvent>) -> Self {
        lock(&self.polls).push_back(events);
        self
    }

    /// Queue events for the next poll after construction
    pub fn push_events(&self, events: Vec<SettlementEvent>) {
        lock(&self.polls).push_back(events);
    }

    /// Open position ids passed to each poll
    pub fn get_calls(&self) -> Vec<Vec<String>> {
        lock(&self.seen).clone()
    }
}

#[async_trait]
impl SettlementPort for MockSettlement {
    async fn poll(&self, open_positions: &[Position]) -> Result<Vec<SettlementEvent>, SettlementError> {
        lock(&self.seen).push(open_positions.iter().map(|p| p.id.clone()).collect());
        Ok(lock(&self.polls).pop_front().unwrap_or_default())
    }
}
