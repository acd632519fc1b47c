use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

use super::gateway::OrderGateway;
use crate::error::GatewayError;
use crate::models::{OrderResult, TradeSide, TradingPair};

// Binance code for "Account has insufficient balance for requested action"
const INSUFFICIENT_BALANCE_CODE: i64 = -2010;

/// In-memory order gateway for dry runs.
///
/// Fills every market order in full and tracks only the base asset balance,
/// which is all the position controller ever reads back.
pub struct PaperOrderGateway {
    pair: TradingPair,
    balances: Mutex<HashMap<String, Decimal>>,
    orders: Mutex<Vec<OrderResult>>,
}

impl PaperOrderGateway {
    pub fn new(pair: TradingPair) -> Self {
        Self {
            pair,
            balances: Mutex::new(HashMap::new()),
            orders: Mutex::new(Vec::new()),
        }
    }

    /// Start with an existing base asset balance
    pub fn with_base_balance(self, balance: Decimal) -> Self {
        self.set_balance(&self.pair.base.clone(), balance);
        self
    }

    pub fn set_balance(&self, asset: &str, balance: Decimal) {
        let mut balances = self.balances.lock().unwrap_or_else(|e| e.into_inner());
        balances.insert(asset.to_string(), balance);
    }

    /// Orders filled so far, oldest first
    pub fn filled_orders(&self) -> Vec<OrderResult> {
        self.orders.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn check_symbol(&self, symbol: &str) -> Result<(), GatewayError> {
        if symbol != self.pair.symbol {
            return Err(GatewayError::NotFound(format!(
                "Paper gateway only trades {}, got {}",
                self.pair.symbol, symbol
            )));
        }
        Ok(())
    }

    fn fill(&self, side: TradeSide, quantity: Decimal) -> OrderResult {
        let order = OrderResult {
            order_id: Uuid::new_v4().to_string(),
            symbol: self.pair.symbol.clone(),
            side,
            executed_qty: quantity,
            status: "FILLED".to_string(),
            transact_time: Utc::now(),
        };

        tracing::info!(
            symbol = %order.symbol,
            side = side.as_str(),
            quantity = %quantity,
            order_id = %order.order_id,
            "[PAPER] Simulated market order"
        );

        self.orders
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(order.clone());
        order
    }
}

#[async_trait]
impl OrderGateway for PaperOrderGateway {
    async fn free_balance(&self, asset: &str) -> Result<Decimal, GatewayError> {
        let balances = self.balances.lock().unwrap_or_else(|e| e.into_inner());
        Ok(balances.get(asset).copied().unwrap_or(Decimal::ZERO))
    }

    async fn market_buy(&self, symbol: &str, quantity: Decimal) -> Result<OrderResult, GatewayError> {
        self.check_symbol(symbol)?;

        {
            let mut balances = self.balances.lock().unwrap_or_else(|e| e.into_inner());
            *balances.entry(self.pair.base.clone()).or_insert(Decimal::ZERO) += quantity;
        }

        Ok(self.fill(TradeSide::Buy, quantity))
    }

    async fn market_sell(
        &self,
        symbol: &str,
        quantity: Decimal,
    ) -> Result<OrderResult, GatewayError> {
        self.check_symbol(symbol)?;

        {
            let mut balances = self.balances.lock().unwrap_or_else(|e| e.into_inner());
            let held = balances.entry(self.pair.base.clone()).or_insert(Decimal::ZERO);
            if quantity > *held {
                return Err(GatewayError::ExchangeRejected {
                    code: INSUFFICIENT_BALANCE_CODE,
                    msg: format!("Insufficient {} balance: have {}, need {}", self.pair.base, held, quantity),
                });
            }
            *held -= quantity;
        }

        Ok(self.fill(TradeSide::Sell, quantity))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use tokio_test::{assert_err, assert_ok};

    fn eth_usdt() -> TradingPair {
        TradingPair::parse("ETHUSDT").unwrap()
    }

    #[tokio::test]
    async fn test_unknown_asset_has_zero_balance() {
        let paper = PaperOrderGateway::new(eth_usdt());
        assert_eq!(paper.free_balance("BTC").await.unwrap(), Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_buy_then_sell_round_trip() {
        let paper = PaperOrderGateway::new(eth_usdt());

        let order = assert_ok!(paper.market_buy("ETHUSDT", dec!(0.25)).await);
        assert_eq!(order.side, TradeSide::Buy);
        assert_eq!(paper.free_balance("ETH").await.unwrap(), dec!(0.25));

        assert_ok!(paper.market_sell("ETHUSDT", dec!(0.25)).await);
        assert_eq!(paper.free_balance("ETH").await.unwrap(), Decimal::ZERO);
        assert_eq!(paper.filled_orders().len(), 2);
    }

    #[tokio::test]
    async fn test_oversell_is_rejected() {
        let paper = PaperOrderGateway::new(eth_usdt()).with_base_balance(dec!(0.1));

        let err = assert_err!(paper.market_sell("ETHUSDT", dec!(0.2)).await);
        assert!(matches!(err, GatewayError::ExchangeRejected { code: -2010, .. }));
        assert_eq!(paper.free_balance("ETH").await.unwrap(), dec!(0.1));
        assert!(paper.filled_orders().is_empty());
    }

    #[tokio::test]
    async fn test_other_symbol_is_not_found() {
        let paper = PaperOrderGateway::new(eth_usdt());
        let err = assert_err!(paper.market_buy("BTCUSDT", dec!(1)).await);
        assert!(matches!(err, GatewayError::NotFound(_)));
    }
}
