//! Layered configuration: defaults, optional TOML file, then `SPOTBOT__*` env vars.

use config::{Config, Environment, File};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{BotError, Result};
use crate::models::TradingPair;

const DEFAULT_CONFIG_FILE: &str = "spotbot";
const ENV_PREFIX: &str = "SPOTBOT";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct BotConfig {
    pub trading: TradingConfig,
    pub exchange: ExchangeConfig,
    pub logging: LoggingConfig,
}

/// Strategy and loop settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TradingConfig {
    pub pair: String,
    pub interval_seconds: u64,
    /// Quote currency spent on each buy
    pub initial_capital: Decimal,
    pub short_period: usize,
    pub long_period: usize,
    pub history_candle_count: u16,
    pub candle_interval: String,
    /// Re-sync position from balance every N ticks (0 = never)
    pub reconcile_every_ticks: u32,
    pub dry_run: bool,
}

impl Default for TradingConfig {
    fn default() -> Self {
        Self {
            pair: "ETHUSDT".to_string(),
            interval_seconds: 20,
            initial_capital: Decimal::from(20),
            short_period: 12,
            long_period: 26,
            history_candle_count: 100,
            candle_interval: "15m".to_string(),
            reconcile_every_ticks: 0,
            dry_run: false,
        }
    }
}

/// Binance REST settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExchangeConfig {
    pub base_url: String,
    /// Name of the env var holding the API key
    pub api_key_env: String,
    pub api_secret_env: String,
    pub recv_window_ms: u64,
    pub requests_per_minute: u32,
    pub timeout_secs: u64,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.binance.com".to_string(),
            api_key_env: "BINANCE_API_KEY".to_string(),
            api_secret_env: "BINANCE_API_SECRET".to_string(),
            recv_window_ms: 5000,
            requests_per_minute: 600,
            timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "spotbot=info".to_string(),
            json: false,
        }
    }
}

/// API key pair read from the environment
#[derive(Clone)]
pub struct Credentials {
    pub api_key: String,
    pub api_secret: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &"***")
            .field("api_secret", &"***")
            .finish()
    }
}

impl Credentials {
    /// Read the key pair from the env vars named in the exchange config
    pub fn from_env(exchange: &ExchangeConfig) -> Option<Self> {
        let api_key = std::env::var(&exchange.api_key_env).ok()?;
        let api_secret = std::env::var(&exchange.api_secret_env).ok()?;

        if api_key.trim().is_empty() || api_secret.trim().is_empty() {
            return None;
        }

        Some(Self {
            api_key,
            api_secret,
        })
    }
}

impl BotConfig {
    /// Load configuration.
    ///
    /// An explicit `path` must exist; otherwise `spotbot.toml` in the working
    /// directory is read if present.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();

        builder = match path {
            Some(path) => builder.add_source(File::from(path).required(true)),
            None => builder.add_source(File::with_name(DEFAULT_CONFIG_FILE).required(false)),
        };

        let config: BotConfig = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.trading.validate()
    }
}

impl TradingConfig {
    pub fn validate(&self) -> Result<()> {
        TradingPair::parse(&self.pair)?;

        if self.interval_seconds == 0 {
            return Err(BotError::Config("interval_seconds must be > 0".to_string()));
        }
        if self.initial_capital <= Decimal::ZERO {
            return Err(BotError::Config(format!(
                "initial_capital must be > 0, got {}",
                self.initial_capital
            )));
        }
        if self.short_period == 0 {
            return Err(BotError::InvalidPeriod(self.short_period));
        }
        if self.short_period >= self.long_period {
            return Err(BotError::Config(format!(
                "short_period ({}) must be less than long_period ({})",
                self.short_period, self.long_period
            )));
        }
        if (self.history_candle_count as usize) < self.long_period {
            return Err(BotError::Config(format!(
                "history_candle_count ({}) must be >= long_period ({})",
                self.history_candle_count, self.long_period
            )));
        }
        if self.candle_interval.trim().is_empty() {
            return Err(BotError::Config("candle_interval must not be empty".to_string()));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = BotConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.trading.pair, "ETHUSDT");
        assert_eq!(config.trading.short_period, 12);
        assert_eq!(config.trading.long_period, 26);
        assert_eq!(config.trading.initial_capital, Decimal::from(20));
    }

    #[test]
    fn test_rejects_bad_settings() {
        let cases = [
            TradingConfig {
                interval_seconds: 0,
                ..Default::default()
            },
            TradingConfig {
                initial_capital: Decimal::ZERO,
                ..Default::default()
            },
            TradingConfig {
                short_period: 26,
                long_period: 12,
                ..Default::default()
            },
            TradingConfig {
                history_candle_count: 20,
                ..Default::default()
            },
            TradingConfig {
                pair: "NOPE".to_string(),
                ..Default::default()
            },
        ];

        for case in cases {
            assert!(case.validate().is_err(), "accepted {:?}", case);
        }
    }

    #[test]
    fn test_zero_short_period_is_invalid_period() {
        let config = TradingConfig {
            short_period: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(BotError::InvalidPeriod(0))));
    }

    #[test]
    fn test_load_from_file() {
        let path = std::env::temp_dir().join(format!("spotbot-test-{}.toml", uuid::Uuid::new_v4()));
        {
            let mut file = std::fs::File::create(&path).unwrap();
            writeln!(
                file,
                "[trading]\npair = \"BTCUSDT\"\ninitial_capital = \"50.5\"\nreconcile_every_ticks = 10\n\n[logging]\njson = true"
            )
            .unwrap();
        }

        let config = BotConfig::load(Some(&path)).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(config.trading.pair, "BTCUSDT");
        assert_eq!(config.trading.initial_capital, "50.5".parse::<Decimal>().unwrap());
        assert_eq!(config.trading.reconcile_every_ticks, 10);
        // Untouched fields keep their defaults
        assert_eq!(config.trading.long_period, 26);
        assert!(config.logging.json);
    }

    #[test]
    fn test_missing_explicit_file_fails() {
        let path = std::env::temp_dir().join("spotbot-does-not-exist.toml");
        assert!(BotConfig::load(Some(&path)).is_err());
    }

    #[test]
    fn test_credentials_debug_is_redacted() {
        let creds = Credentials {
            api_key: "key".to_string(),
            api_secret: "secret".to_string(),
        };
        let printed = format!("{:?}", creds);
        assert!(!printed.contains("\"secret\""));
        assert!(!printed.contains("\"key\""));
        assert!(printed.contains("***"));
    }
}
