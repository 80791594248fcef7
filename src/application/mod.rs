pub mod orchestrator;

pub use orchestrator::{OrchestratorError, OrchestratorStatus, TickReport, TradingOrchestrator};
