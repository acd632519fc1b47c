use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::BotError;

// Checked longest-first so "FDUSD" wins over "USD"-style suffix overlaps
const QUOTE_ASSETS: &[&str] = &[
    "FDUSD", "USDT", "USDC", "TUSD", "BUSD", "EUR", "TRY", "BTC", "ETH", "BNB",
];

/// A spot trading pair, e.g. ETHUSDT = ETH (base) priced in USDT (quote)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TradingPair {
    pub symbol: String,
    pub base: String,
    pub quote: String,
}

impl TradingPair {
    /// Split a symbol into base and quote by matching a known quote suffix
    pub fn parse(symbol: &str) -> Result<Self, BotError> {
        let symbol = symbol.trim().to_uppercase();

        let quote = QUOTE_ASSETS
            .iter()
            .find(|q| symbol.len() > q.len() && symbol.ends_with(*q))
            .ok_or_else(|| BotError::Config(format!("Unrecognized quote asset in {}", symbol)))?;

        let base = symbol[..symbol.len() - quote.len()].to_string();

        Ok(Self {
            symbol: symbol.clone(),
            base,
            quote: quote.to_string(),
        })
    }
}

impl fmt::Display for TradingPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.symbol)
    }
}

/// What the position controller believes it holds
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum PositionState {
    Flat,
    Long,
}

impl PositionState {
    /// Startup seeding rule: any non-zero free balance means we are long
    pub fn from_balance(free_balance: Decimal) -> Self {
        if free_balance > Decimal::ZERO {
            PositionState::Long
        } else {
            PositionState::Flat
        }
    }
}

impl fmt::Display for PositionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PositionState::Flat => write!(f, "FLAT"),
            PositionState::Long => write!(f, "LONG"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TradeSide {
    Buy,
    Sell,
}

impl TradeSide {
    /// Binance wire value
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeSide::Buy => "BUY",
            TradeSide::Sell => "SELL",
        }
    }
}

/// How much a trade intent should move
#[derive(Debug, Clone, PartialEq)]
pub enum IntentAmount {
    /// Spend this much quote currency
    Capital(Decimal),
    /// Sell whatever free base balance the account holds at execution time
    FullBalance,
}

/// A decided trade, consumed immediately by the order gateway
#[derive(Debug, Clone, PartialEq)]
pub struct TradeIntent {
    pub side: TradeSide,
    pub pair: TradingPair,
    pub amount: IntentAmount,
}

/// Binance LOT_SIZE filter for a symbol
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct LotConstraint {
    pub step_size: Decimal,
    pub min_qty: Decimal,
}

/// Result of a placed market order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderResult {
    pub order_id: String,
    pub symbol: String,
    pub side: TradeSide,
    pub executed_qty: Decimal,
    pub status: String,
    pub transact_time: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Crossover {
    /// Short EMA above long EMA
    Bullish,
    /// Short EMA below long EMA
    Bearish,
    Neutral,
}

/// Short and long EMA computed from the same closes
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EmaPair {
    pub short: f64,
    pub long: f64,
}

impl EmaPair {
    pub fn crossover(&self) -> Crossover {
        if self.short > self.long {
            Crossover::Bullish
        } else if self.short < self.long {
            Crossover::Bearish
        } else {
            Crossover::Neutral
        }
    }

    pub fn spread(&self) -> f64 {
        self.short - self.long
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_pair() {
        let pair = TradingPair::parse("ETHUSDT").unwrap();
        assert_eq!(pair.base, "ETH");
        assert_eq!(pair.quote, "USDT");
        assert_eq!(pair.to_string(), "ETHUSDT");

        let pair = TradingPair::parse("solfdusd").unwrap();
        assert_eq!(pair.base, "SOL");
        assert_eq!(pair.quote, "FDUSD");

        let pair = TradingPair::parse("ETHBTC").unwrap();
        assert_eq!(pair.base, "ETH");
        assert_eq!(pair.quote, "BTC");
    }

    #[test]
    fn test_parse_pair_rejects_unknown_or_bare_quote() {
        assert!(TradingPair::parse("ETHXYZ").is_err());
        assert!(TradingPair::parse("USDT").is_err());
        assert!(TradingPair::parse("").is_err());
    }

    #[test]
    fn test_position_from_balance() {
        assert_eq!(PositionState::from_balance(Decimal::ZERO), PositionState::Flat);
        assert_eq!(
            PositionState::from_balance(Decimal::new(1, 8)),
            PositionState::Long
        );
    }

    #[test]
    fn test_crossover() {
        let pair = EmaPair { short: 101.0, long: 100.0 };
        assert_eq!(pair.crossover(), Crossover::Bullish);

        let pair = EmaPair { short: 99.0, long: 100.0 };
        assert_eq!(pair.crossover(), Crossover::Bearish);

        let pair = EmaPair { short: 100.0, long: 100.0 };
        assert_eq!(pair.crossover(), Crossover::Neutral);
        assert_eq!(pair.spread(), 0.0);
    }
}
