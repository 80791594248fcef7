//! Configuration Loader
//!
//! Loads and validates configuration from TOML files, then applies
//! environment overrides. Any out-of-domain value is fatal at load.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::adapters::paper::{PaperConfig, SettlementConfig};
use crate::domain::persistence::DEFAULT_STATE_FILE;
use crate::strategy::{EngineConfig, Personality};

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub engine: EngineSection,
    #[serde(default)]
    pub portfolio: PortfolioSection,
    #[serde(default)]
    pub execution: ExecutionSection,
    #[serde(default)]
    pub persistence: PersistenceSection,
    #[serde(default)]
    pub logging: LoggingSection,
}

/// Engine section: a personality preset plus optional per-field overrides
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EngineSection {
    #[serde(default)]
    pub personality: Personality,
    pub kelly_fraction: Option<f64>,
    pub max_single_bet_pct: Option<f64>,
    pub max_drawdown_pct: Option<f64>,
    pub stop_loss_pct: Option<f64>,
    pub recovery_step: Option<f64>,
    pub max_recovery_multiplier: Option<f64>,
    pub momentum_weight: Option<f64>,
    pub min_tradable_usd: Option<f64>,
    pub loss_streak_reset: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PortfolioSection {
    /// Bankroll for a fresh ledger
    #[serde(default = "default_starting_capital")]
    pub starting_capital_usd: f64,
    /// Target shown in status reports
    #[serde(default = "default_moonshot_target")]
    pub moonshot_target_usd: f64,
}

impl Default for PortfolioSection {
    fn default() -> Self {
        Self {
            starting_capital_usd: default_starting_capital(),
            moonshot_target_usd: default_moonshot_target(),
        }
    }
}

fn default_starting_capital() -> f64 {
    2.0
}

fn default_moonshot_target() -> f64 {
    2_000_000.0
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExecutionSection {
    /// How long to wait for a fill before treating the decision as not applied
    #[serde(default = "default_fill_timeout_ms")]
    pub fill_timeout_ms: u64,
    /// Pause between agent loop rounds
    #[serde(default = "default_scan_interval_secs")]
    pub scan_interval_secs: u64,
    /// Synthetic observations per venue per scan
    #[serde(default = "default_observations_per_scan")]
    pub observations_per_scan: usize,
    #[serde(default)]
    pub paper: PaperConfig,
    #[serde(default)]
    pub settlement: SettlementConfig,
}

impl Default for ExecutionSection {
    fn default() -> Self {
        Self {
            fill_timeout_ms: default_fill_timeout_ms(),
            scan_interval_secs: default_scan_interval_secs(),
            observations_per_scan: default_observations_per_scan(),
            paper: PaperConfig::default(),
            settlement: SettlementConfig::default(),
        }
    }
}

fn default_fill_timeout_ms() -> u64 {
    5_000
}

fn default_scan_interval_secs() -> u64 {
    60
}

fn default_observations_per_scan() -> usize {
    8
}

impl ExecutionSection {
    pub fn fill_timeout(&self) -> Duration {
        Duration::from_millis(self.fill_timeout_ms)
    }

    pub fn scan_interval(&self) -> Duration {
        Duration::from_secs(self.scan_interval_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PersistenceSection {
    /// Ledger snapshot path, `~` and `$VARS` expanded
    #[serde(default = "default_state_file")]
    pub state_file: String,
}

impl Default for PersistenceSection {
    fn default() -> Self {
        Self {
            state_file: default_state_file(),
        }
    }
}

fn default_state_file() -> String {
    format!("data/{}", DEFAULT_STATE_FILE)
}

impl PersistenceSection {
    pub fn state_path(&self) -> Result<PathBuf, ConfigError> {
        let expanded = shellexpand::full(&self.state_file).map_err(|e| {
            ConfigError::ValidationError(format!("state_file '{}': {}", self.state_file, e))
        })?;
        Ok(PathBuf::from(expanded.as_ref()))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingSection {
    /// Log level: "trace", "debug", "info", "warn", "error"
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("Validation failed: {0}")]
    ValidationError(String),
}

impl From<crate::strategy::ConfigurationError> for ConfigError {
    fn from(e: crate::strategy::ConfigurationError) -> Self {
        ConfigError::ValidationError(e.to_string())
    }
}

/// Load configuration from a TOML file, apply environment overrides and validate
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let mut config: Config = toml::from_str(&content)?;
    config.apply_overrides(|key| std::env::var(key).ok())?;
    config.validate()?;
    Ok(config)
}

fn parse_override<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T, ConfigError> {
    raw.trim()
        .parse()
        .map_err(|_| ConfigError::ValidationError(format!("{}='{}' is not a valid value", key, raw)))
}

impl Config {
    /// Environment variables win over file values. `lookup` is
    /// `std::env::var` in production.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup("OPTIMISM_LEVEL") {
            self.engine.personality = raw.parse()?;
        }
        if let Some(raw) = lookup("KELLY_FRACTION") {
            self.engine.kelly_fraction = Some(parse_override("KELLY_FRACTION", &raw)?);
        }
        if let Some(raw) = lookup("MAX_SINGLE_BET_PCT") {
            self.engine.max_single_bet_pct = Some(parse_override("MAX_SINGLE_BET_PCT", &raw)?);
        }
        if let Some(raw) = lookup("STOP_LOSS_PCT") {
            self.engine.stop_loss_pct = Some(parse_override("STOP_LOSS_PCT", &raw)?);
        }
        if let Some(raw) = lookup("STARTING_CAPITAL_USD") {
            self.portfolio.starting_capital_usd = parse_override("STARTING_CAPITAL_USD", &raw)?;
        }
        if let Some(raw) = lookup("MOONSHOT_TARGET_USD") {
            self.portfolio.moonshot_target_usd = parse_override("MOONSHOT_TARGET_USD", &raw)?;
        }
        Ok(())
    }

    /// Personality preset with the section's overrides applied
    pub fn engine_config(&self) -> EngineConfig {
        let e = &self.engine;
        let mut config = e.personality.params();
        if let Some(v) = e.kelly_fraction {
            config.kelly_fraction = v;
        }
        if let Some(v) = e.max_single_bet_pct {
            config.max_single_bet_pct = v;
        }
        if let Some(v) = e.max_drawdown_pct {
            config.max_drawdown_pct = v;
        }
        if let Some(v) = e.stop_loss_pct {
            config.stop_loss_pct = v;
        }
        if let Some(v) = e.recovery_step {
            config.recovery_step = v;
        }
        if let Some(v) = e.max_recovery_multiplier {
            config.max_recovery_multiplier = v;
        }
        if let Some(v) = e.momentum_weight {
            config.momentum_weight = v;
        }
        if let Some(v) = e.min_tradable_usd {
            config.min_tradable_usd = v;
        }
        if let Some(v) = e.loss_streak_reset {
            config.loss_streak_reset = v;
        }
        config
    }

    /// Validate all configuration parameters
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.engine_config().validate()?;

        let start = self.portfolio.starting_capital_usd;
        if !(start.is_finite() && start > 0.0) {
            return Err(ConfigError::ValidationError(format!(
                "starting_capital_usd must be > 0, got {}",
                start
            )));
        }
        if !(self.portfolio.moonshot_target_usd > start) {
            return Err(ConfigError::ValidationError(format!(
                "moonshot_target_usd must exceed starting capital, got {}",
                self.portfolio.moonshot_target_usd
            )));
        }

        if self.execution.fill_timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "fill_timeout_ms must be > 0".to_string(),
            ));
        }
        if self.execution.observations_per_scan == 0 {
            return Err(ConfigError::ValidationError(
                "observations_per_scan must be > 0".to_string(),
            ));
        }
        self.execution
            .paper
            .validate()
            .map_err(ConfigError::ValidationError)?;
        let s = &self.execution.settlement;
        if !(0.0..=1.0).contains(&s.resolve_probability) {
            return Err(ConfigError::ValidationError(format!(
                "settlement.resolve_probability must be 0-1, got {}",
                s.resolve_probability
            )));
        }
        if !(0.0..1.0).contains(&s.volatility) {
            return Err(ConfigError::ValidationError(format!(
                "settlement.volatility must be in [0, 1), got {}",
                s.volatility
            )));
        }
        if !(-1.0..=1.0).contains(&s.edge) {
            return Err(ConfigError::ValidationError(format!(
                "settlement.edge must be in [-1, 1], got {}",
                s.edge
            )));
        }

        if self.persistence.state_file.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "state_file cannot be empty".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_valid_config() -> String {
        r#"
[engine]
personality = "delusional"
kelly_fraction = 0.6

[portfolio]
starting_capital_usd = 2.0
moonshot_target_usd = 2000000.0

[execution]
fill_timeout_ms = 2500
scan_interval_secs = 30

[execution.paper]
prediction_market_fee_rate = 0.002
dex_fee_rate = 0.003

[persistence]
state_file = "/tmp/gambler/ledger.json"

[logging]
level = "debug"
"#
        .to_string()
    }

    fn write(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_load_valid_config() {
        let file = write(&create_valid_config());
        let content = std::fs::read_to_string(file.path()).unwrap();
        let config: Config = toml::from_str(&content).unwrap();
        config.validate().unwrap();

        assert_eq!(config.engine.personality, Personality::Delusional);
        assert_eq!(config.execution.fill_timeout(), Duration::from_millis(2500));
        assert_eq!(config.logging.level, "debug");

        let engine = config.engine_config();
        assert_eq!(engine.kelly_fraction, 0.6);
        // Rest comes from the preset
        assert_eq!(engine.max_single_bet_pct, 0.30);
        assert_eq!(engine.stop_loss_pct, 0.20);
    }

    #[test]
    fn test_empty_file_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        config.validate().unwrap();
        assert_eq!(config.engine_config(), EngineConfig::default());
        assert_eq!(config.portfolio.starting_capital_usd, 2.0);
        assert_eq!(config.execution.fill_timeout_ms, 5_000);
        assert!(config.persistence.state_file.ends_with("ledger_state.json"));
    }

    #[test]
    fn test_load_missing_file() {
        let result = load_config("/nonexistent/path/config.toml");
        assert!(matches!(result.unwrap_err(), ConfigError::IoError(_)));
    }

    #[test]
    fn test_parse_error() {
        let file = write("[engine\npersonality = ");
        assert!(matches!(load_config(file.path()), Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_unknown_personality_rejected() {
        let result: Result<Config, _> = toml::from_str("[engine]\npersonality = \"yolo\"\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_kelly_above_one_is_fatal() {
        let config: Config = toml::from_str("[engine]\nkelly_fraction = 1.2\n").unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn test_invalid_portfolio() {
        let config: Config = toml::from_str(
            "[portfolio]\nstarting_capital_usd = 100.0\nmoonshot_target_usd = 50.0\n",
        )
        .unwrap();
        assert!(config.validate().is_err());

        let config: Config = toml::from_str("[portfolio]\nstarting_capital_usd = 0.0\n").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_execution() {
        let config: Config = toml::from_str("[execution]\nfill_timeout_ms = 0\n").unwrap();
        assert!(config.validate().is_err());

        let config: Config =
            toml::from_str("[execution.paper]\ndex_fee_rate = 2.0\n").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_settlement_edge_must_be_finite() {
        let config: Config = toml::from_str("[execution.settlement]\nedge = nan\n").unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::ValidationError(_))));

        let config: Config = toml::from_str("[execution.settlement]\nedge = 1.5\n").unwrap();
        assert!(config.validate().is_err());

        let config: Config = toml::from_str("[execution.settlement]\nedge = -0.05\n").unwrap();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_overrides() {
        let mut config: Config = toml::from_str(&create_valid_config()).unwrap();
        config
            .apply_overrides(env(&[
                ("OPTIMISM_LEVEL", "CONSERVATIVE"),
                ("KELLY_FRACTION", "0.3"),
                ("STOP_LOSS_PCT", "0.12"),
                ("STARTING_CAPITAL_USD", "50"),
            ]))
            .unwrap();

        assert_eq!(config.engine.personality, Personality::Conservative);
        assert_eq!(config.portfolio.starting_capital_usd, 50.0);
        let engine = config.engine_config();
        assert_eq!(engine.kelly_fraction, 0.3);
        assert_eq!(engine.stop_loss_pct, 0.12);
        assert_eq!(engine.max_single_bet_pct, 0.10);
    }

    #[test]
    fn test_bad_env_override() {
        let mut config = Config::default();
        let result = config.apply_overrides(env(&[("KELLY_FRACTION", "lots")]));
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));

        let result = config.apply_overrides(env(&[("OPTIMISM_LEVEL", "unhinged")]));
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn test_state_path_expansion() {
        let section = PersistenceSection {
            state_file: "~/gambler/ledger.json".to_string(),
        };
        let path = section.state_path().unwrap();
        assert!(!path.to_string_lossy().starts_with('~'));
        assert!(path.ends_with("gambler/ledger.json"));
    }
}
