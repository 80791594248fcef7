//! CLI Command Handlers
//!
//! Every command loads the TOML config first; logging starts from its
//! `[logging]` level unless `-v`/`--debug` or `RUST_LOG` say otherwise.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use crate::adapters::paper::{PaperExecutor, SimulatedSettlement, SyntheticMarket};
use crate::application::TradingOrchestrator;
use crate::config::{load_config, Config};
use crate::domain::{normalize, LedgerStore, PortfolioLedger, RecoveryStatus, Venue};
use crate::ports::MarketDataPort;
use crate::strategy::GamblersLogic;

const DEFAULT_CONFIG: &str = "config/paper.toml";

/// Agent Gambler - Kelly-sized moonshot trading agent
#[derive(Parser, Debug)]
#[command(
    name = "agent-gambler",
    version = env!("CARGO_PKG_VERSION"),
    about = "Kelly-sized moonshot trading agent for prediction markets and DEX tokens",
    long_about = "Agent Gambler sizes every opportunity with fractional Kelly, momentum bias \
                  and loss-streak recovery, under hard risk caps, and tracks the bankroll \
                  in a persistent ledger. Execution is simulated."
)]
pub struct CliApp {
    /// The command to execute
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the agent loop
    Run(RunCmd),

    /// Load and validate a config file, then print the effective parameters
    Validate(ValidateCmd),

    /// Show bankroll, streak and progress toward the target
    Status(StatusCmd),

    /// Scan once and print ranked decisions without trading
    Scan(ScanCmd),
}

/// Start the agent loop
#[derive(Parser, Debug)]
pub struct RunCmd {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", default_value = DEFAULT_CONFIG)]
    pub config: PathBuf,

    /// Stop after this many rounds (runs until Ctrl+C otherwise)
    #[arg(short, long, value_name = "N")]
    pub rounds: Option<u64>,

    /// Seed the simulated feeds and executor for a replayable run
    #[arg(long, value_name = "SEED")]
    pub seed: Option<u64>,
}

/// Validate configuration
#[derive(Parser, Debug)]
pub struct ValidateCmd {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", default_value = DEFAULT_CONFIG)]
    pub config: PathBuf,
}

/// Show portfolio status
#[derive(Parser, Debug)]
pub struct StatusCmd {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", default_value = DEFAULT_CONFIG)]
    pub config: PathBuf,

    /// Output format (text, json)
    #[arg(short, long, value_name = "FORMAT", default_value = "text")]
    pub format: String,
}

/// One-shot scan
#[derive(Parser, Debug)]
pub struct ScanCmd {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", default_value = DEFAULT_CONFIG)]
    pub config: PathBuf,

    /// Seed the simulated feeds
    #[arg(long, value_name = "SEED")]
    pub seed: Option<u64>,
}

impl Command {
    fn config_path(&self) -> &PathBuf {
        match self {
            Command::Run(cmd) => &cmd.config,
            Command::Validate(cmd) => &cmd.config,
            Command::Status(cmd) => &cmd.config,
            Command::Scan(cmd) => &cmd.config,
        }
    }
}

/// Execute the CLI command
pub async fn execute(app: CliApp) -> Result<()> {
    let path = app.command.config_path().clone();
    let config = load_config(&path)
        .with_context(|| format!("Failed to load configuration from {}", path.display()))?;

    init_logging(app.verbose, app.debug, &config.logging.level)?;

    match app.command {
        Command::Run(cmd) => run_command(cmd, config).await,
        Command::Validate(cmd) => validate_command(cmd, config),
        Command::Status(cmd) => status_command(cmd, config),
        Command::Scan(cmd) => scan_command(cmd, config).await,
    }
}

/// Initialize logging system
fn init_logging(verbose: bool, debug: bool, config_level: &str) -> Result<()> {
    use tracing_subscriber::{fmt, EnvFilter};

    let level = if debug {
        "debug"
    } else if verbose {
        "info"
    } else {
        config_level
    };
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .with_context(|| format!("Invalid log level '{}'", level))?;

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    Ok(())
}

fn open_store(config: &Config) -> Result<LedgerStore> {
    let path = config
        .persistence
        .state_path()
        .context("Invalid persistence.state_file")?;
    Ok(LedgerStore::new(path))
}

fn recover_ledger(store: &LedgerStore, config: &Config) -> Result<PortfolioLedger> {
    match store.try_recover() {
        RecoveryStatus::Recovered(ledger) => Ok(ledger),
        RecoveryStatus::Fresh => {
            tracing::info!(
                "No ledger at {}, starting with ${:.2}",
                store.path().display(),
                config.portfolio.starting_capital_usd
            );
            PortfolioLedger::new(config.portfolio.starting_capital_usd)
                .context("Failed to create ledger")
        }
        RecoveryStatus::Corrupted(reason) => bail!(
            "Ledger snapshot {} cannot be trusted: {}\n\n\
             Inspect or move the file aside before running again.",
            store.path().display(),
            reason
        ),
    }
}

fn synthetic_markets(config: &Config, seed: Option<u64>) -> Vec<Arc<dyn MarketDataPort>> {
    let per_scan = config.execution.observations_per_scan;
    let prediction: Arc<dyn MarketDataPort> =
        Arc::new(SyntheticMarket::new(Venue::PredictionMarket, per_scan, seed));
    let dex: Arc<dyn MarketDataPort> = Arc::new(SyntheticMarket::new(
        Venue::DexToken,
        per_scan,
        seed.map(|s| s.wrapping_add(1)),
    ));
    vec![prediction, dex]
}

/// Wire the paper adapters, engine and recovered ledger into an orchestrator
pub fn build_orchestrator(config: &Config, seed: Option<u64>) -> Result<TradingOrchestrator> {
    let engine = GamblersLogic::new(config.engine_config()).context("Invalid engine parameters")?;
    let store = open_store(config)?;
    let ledger = recover_ledger(&store, config)?;

    let executor = Arc::new(PaperExecutor::new(
        config.execution.paper.clone(),
        seed.map(|s| s.wrapping_add(2)),
    ));
    let settlement = Arc::new(SimulatedSettlement::new(
        config.execution.settlement.clone(),
        seed.map(|s| s.wrapping_add(3)),
    ));

    let mut orchestrator = TradingOrchestrator::new(engine, ledger, executor, settlement)
        .with_store(store)
        .with_fill_timeout(config.execution.fill_timeout())
        .with_poll_interval(config.execution.scan_interval());
    for market in synthetic_markets(config, seed) {
        orchestrator = orchestrator.with_market(market);
    }
    Ok(orchestrator)
}

/// Handle run command
async fn run_command(cmd: RunCmd, config: Config) -> Result<()> {
    tracing::info!("Starting Agent Gambler...");
    tracing::info!("Config: {}", cmd.config.display());
    tracing::warn!("PAPER TRADING MODE - all fills are simulated");

    let orchestrator = Arc::new(build_orchestrator(&config, cmd.seed)?);

    // Setup Ctrl+C handler
    let orch = Arc::clone(&orchestrator);
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        tracing::info!("Shutdown signal received");
        orch.stop().await;
    });

    let result = orchestrator.run(cmd.rounds).await;
    if let Err(e) = orchestrator.save_snapshot().await {
        tracing::error!("Failed to save ledger on exit: {}", e);
    }

    let ledger = orchestrator.ledger();
    let ledger = ledger.lock().await;
    println!("{}", ledger.status_report(config.portfolio.moonshot_target_usd));

    result.context("Agent loop halted")?;
    tracing::info!("Agent Gambler stopped");
    Ok(())
}

/// Handle validate command
fn validate_command(cmd: ValidateCmd, config: Config) -> Result<()> {
    let engine = config.engine_config();
    let state_path = config.persistence.state_path()?;

    println!("✓ {} is valid", cmd.config.display());
    println!("  Personality:        {}", config.engine.personality);
    println!("  Kelly fraction:     {:.2}", engine.kelly_fraction);
    println!("  Max single bet:     {:.1}%", engine.max_single_bet_pct * 100.0);
    println!("  Max drawdown:       {:.1}%", engine.max_drawdown_pct * 100.0);
    println!("  Stop loss:          {:.1}%", engine.stop_loss_pct * 100.0);
    println!(
        "  Recovery:           +{:.2}/loss, max x{:.2}, reset after {}",
        engine.recovery_step, engine.max_recovery_multiplier, engine.loss_streak_reset
    );
    println!("  Momentum weight:    {:.2}", engine.momentum_weight);
    println!("  Min tradable:       ${:.2}", engine.min_tradable_usd);
    println!(
        "  Capital / target:   ${:.2} -> ${:.0}",
        config.portfolio.starting_capital_usd, config.portfolio.moonshot_target_usd
    );
    println!("  State file:         {}", state_path.display());
    Ok(())
}

/// Handle status command
fn status_command(cmd: StatusCmd, config: Config) -> Result<()> {
    let store = open_store(&config)?;
    let ledger = recover_ledger(&store, &config)?;
    let report = ledger.status_report(config.portfolio.moonshot_target_usd);

    match cmd.format.as_str() {
        "json" => println!(
            "{}",
            serde_json::to_string_pretty(&report).context("Failed to serialize status")?
        ),
        "text" => {
            println!("Agent Gambler - {}", store.path().display());
            println!("{}", report);
            for position in ledger.state().open_positions.values() {
                println!(
                    "  {} {} {:?} ${:.2} @ {:.4} (stop {:.4}, last {:.4})",
                    position.id,
                    position.asset_id,
                    position.side,
                    position.size_usd,
                    position.entry_price,
                    position.stop_loss_price,
                    position.last_price
                );
            }
        }
        other => bail!("Unknown format '{}', expected text or json", other),
    }
    Ok(())
}

/// Handle scan command
async fn scan_command(cmd: ScanCmd, config: Config) -> Result<()> {
    let engine = GamblersLogic::new(config.engine_config()).context("Invalid engine parameters")?;
    let store = open_store(&config)?;
    let ledger = recover_ledger(&store, &config)?;

    let mut signals = Vec::new();
    for market in synthetic_markets(&config, cmd.seed) {
        let observations = market
            .scan()
            .await
            .with_context(|| format!("Scan of {} failed", market.name()))?;
        for obs in &observations {
            match normalize(obs) {
                Ok(signal) => signals.push(signal),
                Err(e) => tracing::debug!("Discarding observation: {}", e),
            }
        }
    }

    let mut skips = BTreeMap::new();
    for signal in &signals {
        if let Some(reason) = engine.evaluate(signal, ledger.state()).reason() {
            *skips.entry(reason.to_string()).or_insert(0usize) += 1;
        }
    }

    let ranked = engine.rank(&signals, ledger.state());
    println!(
        "{} signal(s) against ${:.2} bankroll, {} entry candidate(s)",
        signals.len(),
        ledger.state().bankroll_usd,
        ranked.len()
    );
    for decision in &ranked {
        println!(
            "  {}  EV ${:+.4}  [{:?}]",
            decision,
            decision.expected_profit_usd(),
            decision.aggression()
        );
    }
    for (reason, count) in skips {
        println!("  skipped {}: {}", reason, count);
    }
    Ok(())
}
