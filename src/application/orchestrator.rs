//! Trading Orchestrator
//!
//! The agent loop around the engine. Each tick:
//!
//! 1. polls settlement for open positions and closes what resolved or stopped
//! 2. scans every venue in parallel and normalizes observations
//! 3. ranks candidates, then for each one, under the ledger lock:
//!    re-evaluates against current state, submits to the executor with a
//!    timeout, and records the fill
//!
//! The ledger lock is held from evaluation through `apply_open`, so no two
//! entries can be sized against the same stale bankroll.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinSet;

use crate::domain::{
    normalize, LedgerError, LedgerStore, Outcome, PersistError, PortfolioLedger, PortfolioState,
    Signal, SkipReason,
};
use crate::ports::{
    ExecutionError, ExecutionPort, MarketDataPort, SettlementError, SettlementEvent,
    SettlementPort,
};
use crate::strategy::GamblersLogic;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// Rejected ledger mutation; never retried
    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),
    #[error("Settlement error: {0}")]
    Settlement(#[from] SettlementError),
    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistError),
}

impl OrchestratorError {
    /// Errors that must stop the agent loop
    pub fn is_fatal(&self) -> bool {
        matches!(self, OrchestratorError::Ledger(_))
    }
}

/// Counts for one tick
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickReport {
    pub observations: usize,
    pub invalid_signals: usize,
    pub entered: usize,
    pub skipped: usize,
    pub rejected: usize,
    pub timed_out: usize,
    pub closed: usize,
    pub stopped: usize,
}

/// Status snapshot of the orchestrator
#[derive(Debug, Clone)]
pub struct OrchestratorStatus {
    pub is_running: bool,
    pub rounds: u64,
    pub bankroll_usd: f64,
    pub drawdown: f64,
    pub open_positions: usize,
    pub entries: u64,
    pub rejections: u64,
    pub timeouts: u64,
    pub skips: HashMap<SkipReason, u64>,
}

#[derive(Debug, Default)]
struct Counters {
    rounds: u64,
    entries: u64,
    rejections: u64,
    timeouts: u64,
    skips: HashMap<SkipReason, u64>,
}

/// Main trading orchestrator that coordinates engine, ledger and ports
pub struct TradingOrchestrator {
    engine: GamblersLogic,
    ledger: Arc<Mutex<PortfolioLedger>>,
    markets: Vec<Arc<dyn MarketDataPort>>,
    executor: Arc<dyn ExecutionPort>,
    settlement: Arc<dyn SettlementPort>,
    store: Option<LedgerStore>,
    fill_timeout: Duration,
    poll_interval: Duration,
    is_running: Arc<RwLock<bool>>,
    counters: Arc<RwLock<Counters>>,
}

impl TradingOrchestrator {
    pub fn new(
        engine: GamblersLogic,
        ledger: PortfolioLedger,
        executor: Arc<dyn ExecutionPort>,
        settlement: Arc<dyn SettlementPort>,
    ) -> Self {
        Self {
            engine,
            ledger: Arc::new(Mutex::new(ledger)),
            markets: Vec::new(),
            executor,
            settlement,
            store: None,
            fill_timeout: Duration::from_secs(5),
            poll_interval: Duration::from_secs(60),
            is_running: Arc::new(RwLock::new(false)),
            counters: Arc::new(RwLock::new(Counters::default())),
        }
    }

    /// Add a venue to scan
    pub fn with_market(mut self, market: Arc<dyn MarketDataPort>) -> Self {
        self.markets.push(market);
        self
    }

    /// Save the ledger here after every tick, failed or not
    pub fn with_store(mut self, store: LedgerStore) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_fill_timeout(mut self, timeout: Duration) -> Self {
        self.fill_timeout = timeout;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Shared handle to the ledger
    pub fn ledger(&self) -> Arc<Mutex<PortfolioLedger>> {
        Arc::clone(&self.ledger)
    }

    pub async fn portfolio(&self) -> PortfolioState {
        self.ledger.lock().await.state().clone()
    }

    /// Run until stopped, `max_rounds` reached, or a fatal error
    pub async fn run(&self, max_rounds: Option<u64>) -> Result<(), OrchestratorError> {
        *self.is_running.write().await = true;

        tracing::info!(
            "Starting orchestrator: {} venue(s), {} execution, fill timeout {:?}, poll interval {:?}",
            self.markets.len(),
            self.executor.mode(),
            self.fill_timeout,
            self.poll_interval
        );

        let mut round = 0u64;
        let result = loop {
            if !*self.is_running.read().await {
                break Ok(());
            }

            round += 1;
            match self.tick().await {
                Ok(report) => tracing::info!(
                    "Round {}: {} obs, {} entered, {} skipped, {} rejected, {} timed out, {} closed ({} stopped)",
                    round,
                    report.observations,
                    report.entered,
                    report.skipped,
                    report.rejected,
                    report.timed_out,
                    report.closed,
                    report.stopped
                ),
                Err(e) if e.is_fatal() => {
                    tracing::error!("Fatal: {}", e);
                    break Err(e);
                }
                // Continue running despite transient errors
                Err(e) => tracing::error!("Tick error: {}", e),
            }

            if max_rounds.is_some_and(|max| round >= max) {
                break Ok(());
            }
            tokio::time::sleep(self.poll_interval).await;
        };

        *self.is_running.write().await = false;
        tracing::info!("Trading orchestrator stopped after {} round(s)", round);
        result
    }

    /// Execute one trading cycle. The ledger is saved on every exit path,
    /// so fills applied before a fatal error are never lost.
    pub async fn tick(&self) -> Result<TickReport, OrchestratorError> {
        let mut report = TickReport::default();
        self.counters.write().await.rounds += 1;

        let traded = self.trade_round(&mut report).await;
        let saved = self.save_snapshot().await;

        match (traded, saved) {
            (Err(e), Err(save_err)) => {
                tracing::error!("Ledger save after failed tick: {}", save_err);
                Err(e)
            }
            (Err(e), Ok(())) => Err(e),
            (Ok(()), saved) => saved.map(|()| report),
        }
    }

    async fn trade_round(&self, report: &mut TickReport) -> Result<(), OrchestratorError> {
        self.process_settlements(report).await?;
        let signals = self.scan(report).await;
        self.enter_positions(&signals, report).await
    }

    /// Write the ledger to the store, if one is configured
    pub async fn save_snapshot(&self) -> Result<(), OrchestratorError> {
        if let Some(store) = &self.store {
            let ledger = self.ledger.lock().await;
            store.save(&ledger)?;
        }
        Ok(())
    }

    /// Poll settlement and close resolved or stopped positions
    pub async fn process_settlements(&self, report: &mut TickReport) -> Result<(), OrchestratorError> {
        let open: Vec<_> = {
            let ledger = self.ledger.lock().await;
            ledger.state().open_positions.values().cloned().collect()
        };
        if open.is_empty() {
            return Ok(());
        }

        let events = self.settlement.poll(&open).await?;

        let mut ledger = self.ledger.lock().await;
        for event in events {
            let result = match event {
                SettlementEvent::Resolved {
                    position_id,
                    outcome,
                } => ledger.apply_close(&position_id, outcome).map(|_| {
                    report.closed += 1;
                    if matches!(outcome, Outcome::StopLoss { .. }) {
                        report.stopped += 1;
                    }
                }),
                SettlementEvent::Price { position_id, price } => {
                    match ledger.mark_price(&position_id, price) {
                        Ok(true) => {
                            tracing::warn!("Stop hit on {} at {:.6}", position_id, price);
                            ledger
                                .apply_close(&position_id, Outcome::StopLoss { exit_price: price })
                                .map(|_| {
                                    report.closed += 1;
                                    report.stopped += 1;
                                })
                        }
                        Ok(false) => Ok(()),
                        Err(e) => Err(e),
                    }
                }
            };

            match result {
                Ok(()) => {}
                Err(e) if e.is_desync() => {
                    tracing::error!("Settlement for unknown or closed position: {}", e);
                    return Err(e.into());
                }
                Err(e) => tracing::warn!("Settlement event discarded: {}", e),
            }
        }
        Ok(())
    }

    /// Scan all venues concurrently and normalize what comes back
    pub async fn scan(&self, report: &mut TickReport) -> Vec<Signal> {
        let mut tasks = JoinSet::new();
        for market in &self.markets {
            let market = Arc::clone(market);
            tasks.spawn(async move {
                let name = market.name().to_string();
                (name, market.scan().await)
            });
        }

        let mut signals = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            let (name, scanned) = match joined {
                Ok(result) => result,
                Err(e) => {
                    tracing::error!("Scan task failed: {}", e);
                    continue;
                }
            };
            let observations = match scanned {
                Ok(observations) => observations,
                Err(e) => {
                    tracing::warn!("Scan of {} failed: {}", name, e);
                    continue;
                }
            };

            report.observations += observations.len();
            for obs in &observations {
                match normalize(obs) {
                    Ok(signal) => signals.push(signal),
                    Err(e) => {
                        report.invalid_signals += 1;
                        tracing::debug!("Discarding observation: {}", e);
                    }
                }
            }
        }
        signals
    }

    /// Rank signals and enter in order, one at a time under the ledger lock
    async fn enter_positions(
        &self,
        signals: &[Signal],
        report: &mut TickReport,
    ) -> Result<(), OrchestratorError> {
        let mut skips: HashMap<SkipReason, u64> = HashMap::new();
        let ranked = {
            let ledger = self.ledger.lock().await;
            let ranked = self.engine.rank_indexed(signals, ledger.state());
            let chosen: Vec<usize> = ranked.iter().map(|(i, _)| *i).collect();
            for (i, signal) in signals.iter().enumerate() {
                if chosen.contains(&i) {
                    continue;
                }
                if let Some(reason) = self.engine.evaluate(signal, ledger.state()).reason() {
                    report.skipped += 1;
                    *skips.entry(reason).or_default() += 1;
                }
            }
            ranked
        };

        for (index, _) in ranked {
            let signal = &signals[index];
            let mut ledger = self.ledger.lock().await;

            // Earlier entries this tick moved the bankroll
            let decision = self.engine.evaluate(signal, ledger.state());
            if let Some(reason) = decision.reason() {
                report.skipped += 1;
                *skips.entry(reason).or_default() += 1;
                if reason == SkipReason::DrawdownLimit {
                    tracing::warn!("{}: {}", signal.asset_id(), decision);
                }
                continue;
            }

            tracing::info!(
                "{} [{:?}] EV ${:+.4}",
                decision,
                decision.aggression(),
                decision.expected_profit_usd()
            );

            let fill = match tokio::time::timeout(self.fill_timeout, self.executor.submit(&decision)).await {
                Ok(Ok(fill)) => fill,
                Ok(Err(e)) => {
                    report.rejected += 1;
                    self.counters.write().await.rejections += 1;
                    match e {
                        ExecutionError::Rejected(_) => tracing::warn!("{}: {}", decision.asset_id(), e),
                        _ => tracing::error!("{}: {}", decision.asset_id(), e),
                    }
                    continue;
                }
                Err(_) => {
                    report.timed_out += 1;
                    self.counters.write().await.timeouts += 1;
                    tracing::warn!(
                        "{}: no fill within {:?}, not applied",
                        decision.asset_id(),
                        self.fill_timeout
                    );
                    continue;
                }
            };

            ledger.apply_open(&decision, &fill)?;
            report.entered += 1;
            self.counters.write().await.entries += 1;
        }

        let mut counters = self.counters.write().await;
        for (reason, n) in skips {
            *counters.skips.entry(reason).or_default() += n;
        }
        Ok(())
    }

    /// Stop the trading loop
    pub async fn stop(&self) {
        *self.is_running.write().await = false;
        tracing::info!("Stop signal sent to orchestrator");
    }

    /// Get current status snapshot
    pub async fn status(&self) -> OrchestratorStatus {
        let is_running = *self.is_running.read().await;
        let state = self.portfolio().await;
        let counters = self.counters.read().await;

        OrchestratorStatus {
            is_running,
            rounds: counters.rounds,
            bankroll_usd: state.bankroll_usd,
            drawdown: state.drawdown(),
            open_positions: state.open_positions.len(),
            entries: counters.entries,
            rejections: counters.rejections,
            timeouts: counters.timeouts,
            skips: counters.skips.clone(),
        }
    }
}
