//! Agent Gambler - Kelly-sized moonshot trading agent
//!
//! Turns prediction-market and DEX-token observations into sized bets:
//! fractional Kelly with a momentum bias and loss-streak recovery, clamped
//! by a risk governor, recorded in a single-writer portfolio ledger.
//!
//! # Modules
//!
//! - `domain`: Core types and state (Signal, TradeDecision, Position, Ledger, RiskGovernor)
//! - `ports`: Trait abstractions (MarketDataPort, ExecutionPort, SettlementPort)
//! - `strategy`: Gambler's Logic engine (Kelly, recovery, personalities)
//! - `adapters`: Paper trading implementations and the CLI
//! - `config`: Configuration loading and validation
//! - `application`: Agent loop orchestrator

pub mod domain;
pub mod ports;
pub mod strategy;
pub mod adapters;
pub mod config;
pub mod application;
