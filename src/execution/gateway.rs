//! Gateway traits the trading core is written against.

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::error::GatewayError;
use crate::models::{LotConstraint, OrderResult};

/// Read-only market data for a symbol.
#[async_trait]
pub trait MarketDataGateway: Send + Sync {
    /// Latest traded price.
    async fn current_price(&self, symbol: &str) -> Result<Decimal, GatewayError>;

    /// Closing prices of the most recent `limit` candles, oldest first.
    ///
    /// # Arguments
    /// * `interval` - Candle interval in exchange notation (e.g. "15m")
    async fn historical_closes(
        &self,
        symbol: &str,
        interval: &str,
        limit: u16,
    ) -> Result<Vec<Decimal>, GatewayError>;

    /// LOT_SIZE constraint for the symbol.
    async fn lot_constraint(&self, symbol: &str) -> Result<LotConstraint, GatewayError>;
}

/// Order execution and account balances.
#[async_trait]
pub trait OrderGateway: Send + Sync {
    /// Free balance of an asset, zero when the account holds none.
    async fn free_balance(&self, asset: &str) -> Result<Decimal, GatewayError>;

    async fn market_buy(&self, symbol: &str, quantity: Decimal) -> Result<OrderResult, GatewayError>;

    async fn market_sell(&self, symbol: &str, quantity: Decimal)
        -> Result<OrderResult, GatewayError>;
}
