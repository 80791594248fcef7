//! Configuration Module
//!
//! Loads and validates configuration from TOML files with environment overrides.

pub mod loader;

pub use loader::{
    Config, ConfigError, EngineSection, ExecutionSection, LoggingSection, PersistenceSection,
    PortfolioSection, load_config,
};
