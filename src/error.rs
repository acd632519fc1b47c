use rust_decimal::Decimal;
use thiserror::Error;

/// Failures reported by the market data and order gateways
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Exchange rejected request: code {code}, msg: {msg}")]
    ExchangeRejected { code: i64, msg: String },

    #[error("Unexpected response: {0}")]
    InvalidResponse(String),

    #[error("Missing API credentials: {0}")]
    MissingCredentials(String),
}

impl From<reqwest::Error> for GatewayError {
    fn from(e: reqwest::Error) -> Self {
        GatewayError::Network(e.to_string())
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(e: serde_json::Error) -> Self {
        GatewayError::InvalidResponse(e.to_string())
    }
}

/// Top-level error for the trading core.
///
/// Everything except [`BotError::Config`] and [`BotError::InvalidPeriod`] is
/// scoped to a single tick: the monitor loop logs it and moves on.
#[derive(Error, Debug)]
pub enum BotError {
    #[error("Insufficient data: need {required} prices, have {available}")]
    InsufficientData { required: usize, available: usize },

    #[error("Invalid EMA period: {0}")]
    InvalidPeriod(usize),

    #[error("Invalid lot step size: {0}")]
    InvalidStepSize(Decimal),

    #[error("Quantity {quantity} is below the exchange minimum {min_qty}")]
    QuantityTooSmall { quantity: Decimal, min_qty: Decimal },

    #[error("Invalid price: {0}")]
    InvalidPrice(Decimal),

    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayError),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl BotError {
    /// Whether the loop can skip the current tick and keep running
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, BotError::Config(_) | BotError::InvalidPeriod(_))
    }
}

impl From<config::ConfigError> for BotError {
    fn from(e: config::ConfigError) -> Self {
        BotError::Config(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, BotError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tick_errors_are_recoverable() {
        let insufficient = BotError::InsufficientData {
            required: 26,
            available: 10,
        };
        assert!(insufficient.is_recoverable());
        assert!(BotError::InvalidStepSize(Decimal::ZERO).is_recoverable());
        assert!(BotError::Gateway(GatewayError::Network("timeout".to_string())).is_recoverable());
    }

    #[test]
    fn test_config_errors_are_fatal() {
        assert!(!BotError::Config("bad pair".to_string()).is_recoverable());
        assert!(!BotError::InvalidPeriod(0).is_recoverable());
    }

    #[test]
    fn test_error_messages() {
        let err = BotError::InsufficientData {
            required: 26,
            available: 3,
        };
        assert_eq!(err.to_string(), "Insufficient data: need 26 prices, have 3");

        let err = GatewayError::ExchangeRejected {
            code: -2010,
            msg: "Account has insufficient balance".to_string(),
        };
        assert!(err.to_string().contains("-2010"));
    }
}
