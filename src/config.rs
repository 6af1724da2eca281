//! Configuration module for loading and parsing TOML configuration files.

use serde::Deserialize;
use std::fs;
use std::path::Path;
use thiserror::Error;

/// Configuration error types.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),
    /// Failed to parse TOML configuration.
    #[error("failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),
    /// Invalid configuration value.
    #[error("invalid config value: {0}")]
    InvalidValue(String),
}

/// Root configuration structure.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Sync behavior configuration.
    #[serde(default)]
    pub sync: SyncConfig,
    /// Simulated broker configuration for development mode.
    #[serde(default)]
    pub simulation: SimulationConfig,
    /// Accounts known at startup.
    #[serde(default)]
    pub accounts: Vec<AccountConfig>,
}

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to.
    pub host: String,
    /// Port number to listen on.
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

/// Sync behavior configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    /// Symbols dropped at ingestion.
    #[serde(default)]
    pub excluded_symbols: Vec<String>,
    /// Default fetch window in days when the caller gives none.
    pub lookback_days: i64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            excluded_symbols: Vec::new(),
            lookback_days: 365,
        }
    }
}

/// Simulated broker configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SimulationConfig {
    /// Whether the simulated broker serves as the execution/price source.
    pub enabled: bool,
    /// Seeded price table.
    #[serde(default)]
    pub prices: Vec<PriceSeedConfig>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            prices: Vec::new(),
        }
    }
}

/// One seeded price for the simulated broker.
#[derive(Debug, Clone, Deserialize)]
pub struct PriceSeedConfig {
    /// Symbol or contract key.
    pub symbol: String,
    /// Price in dollars.
    pub price: f64,
}

/// Account configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AccountConfig {
    /// Broker account id, e.g. "U1234567".
    pub id: String,
}

impl Config {
    /// Loads configuration from a TOML file.
    ///
    /// # Arguments
    /// * `path` - Path to the configuration file.
    ///
    /// # Errors
    /// Returns error if file cannot be read or parsed.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Parses configuration from a TOML string.
    ///
    /// # Arguments
    /// * `content` - TOML content as string.
    ///
    /// # Errors
    /// Returns error if content cannot be parsed.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration values.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.sync.lookback_days <= 0 {
            return Err(ConfigError::InvalidValue(
                "sync lookback_days must be positive".to_string(),
            ));
        }

        for account in &self.accounts {
            if account.id.trim().is_empty() {
                return Err(ConfigError::InvalidValue(
                    "account id cannot be empty".to_string(),
                ));
            }
        }

        for seed in &self.simulation.prices {
            if seed.symbol.trim().is_empty() {
                return Err(ConfigError::InvalidValue(
                    "simulation price symbol cannot be empty".to_string(),
                ));
            }
            if seed.price <= 0.0 {
                return Err(ConfigError::InvalidValue(format!(
                    "simulation price for {} must be positive",
                    seed.symbol
                )));
            }
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            sync: SyncConfig::default(),
            simulation: SimulationConfig::default(),
            accounts: vec![AccountConfig {
                id: "DEMO".to_string(),
            }],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_config() {
        let toml_content = r#"
[server]
host = "127.0.0.1"
port = 3000

[sync]
excluded_symbols = ["GOOGL", "ABN"]
lookback_days = 90

[simulation]
enabled = true

[[simulation.prices]]
symbol = "AAPL"
price = 155.0

[[accounts]]
id = "U1234567"
"#;

        let config = Config::parse(toml_content).expect("should parse");
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.sync.excluded_symbols, vec!["GOOGL", "ABN"]);
        assert_eq!(config.sync.lookback_days, 90);
        assert!(config.simulation.enabled);
        assert_eq!(config.simulation.prices.len(), 1);
        assert_eq!(config.accounts.len(), 1);
        assert_eq!(config.accounts[0].id, "U1234567");
    }

    #[test]
    fn test_defaults_apply_for_missing_sections() {
        let config = Config::parse("").expect("should parse empty config");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.sync.lookback_days, 365);
        assert!(config.sync.excluded_symbols.is_empty());
        assert!(config.simulation.enabled);
    }

    #[test]
    fn test_validation_rejects_bad_lookback() {
        let toml_content = r#"
[sync]
lookback_days = 0
"#;
        assert!(Config::parse(toml_content).is_err());
    }

    #[test]
    fn test_validation_rejects_empty_account_id() {
        let toml_content = r#"
[[accounts]]
id = "  "
"#;
        assert!(Config::parse(toml_content).is_err());
    }

    #[test]
    fn test_validation_rejects_non_positive_price() {
        let toml_content = r#"
[[simulation.prices]]
symbol = "AAPL"
price = 0.0
"#;
        assert!(Config::parse(toml_content).is_err());
    }
}
