use rust_decimal::Decimal;
use std::sync::Arc;

use super::gateway::{MarketDataGateway, OrderGateway};
use super::quantity::{normalize_for_lot, normalize_quantity};
use crate::error::{BotError, Result};
use crate::models::{
    Crossover, EmaPair, IntentAmount, OrderResult, PositionState, TradeIntent, TradeSide,
    TradingPair,
};

/// What a single controller step did
#[derive(Debug, Clone)]
pub enum TickOutcome {
    /// No crossover against the current position
    Hold,
    Bought(OrderResult),
    Sold(OrderResult),
    /// Sell signal while long, but the free balance is below one lot
    ClosedWithoutOrder { free_balance: Decimal },
}

/// Flat/Long state machine for one trading pair.
///
/// The position belief changes only after the order gateway confirms an
/// order, or when [`PositionController::reconcile`] re-reads the balance.
pub struct PositionController {
    pair: TradingPair,
    capital: Decimal,
    market: Arc<dyn MarketDataGateway>,
    orders: Arc<dyn OrderGateway>,
    state: PositionState,
}

impl PositionController {
    /// Create a controller with an explicit starting state
    pub fn new(
        pair: TradingPair,
        capital: Decimal,
        market: Arc<dyn MarketDataGateway>,
        orders: Arc<dyn OrderGateway>,
        state: PositionState,
    ) -> Self {
        Self {
            pair,
            capital,
            market,
            orders,
            state,
        }
    }

    /// Create a controller seeded from the account's base asset balance
    pub async fn initialize(
        pair: TradingPair,
        capital: Decimal,
        market: Arc<dyn MarketDataGateway>,
        orders: Arc<dyn OrderGateway>,
    ) -> Result<Self> {
        let balance = orders.free_balance(&pair.base).await?;
        let state = PositionState::from_balance(balance);

        match state {
            PositionState::Long => tracing::info!(
                "Existing {} position detected: {} {}",
                pair.base,
                balance,
                pair.base
            ),
            PositionState::Flat => {
                tracing::info!("No {} position detected, ready to trade", pair.base)
            }
        }

        Ok(Self::new(pair, capital, market, orders, state))
    }

    pub fn state(&self) -> PositionState {
        self.state
    }

    pub fn pair(&self) -> &TradingPair {
        &self.pair
    }

    /// Pure transition table: which trade, if any, this EMA pair calls for
    pub fn decide(&self, ema: &EmaPair) -> Option<TradeIntent> {
        let side = match (self.state, ema.crossover()) {
            (PositionState::Flat, Crossover::Bullish) => TradeSide::Buy,
            (PositionState::Long, Crossover::Bearish) => TradeSide::Sell,
            _ => return None,
        };

        let amount = match side {
            TradeSide::Buy => IntentAmount::Capital(self.capital),
            TradeSide::Sell => IntentAmount::FullBalance,
        };

        Some(TradeIntent {
            side,
            pair: self.pair.clone(),
            amount,
        })
    }

    /// Evaluate one tick and execute at most one trade.
    ///
    /// On error the state is left untouched.
    pub async fn on_tick(&mut self, ema: &EmaPair) -> Result<TickOutcome> {
        let Some(intent) = self.decide(ema) else {
            return Ok(TickOutcome::Hold);
        };

        tracing::info!(
            pair = %self.pair,
            side = intent.side.as_str(),
            short = ema.short,
            long = ema.long,
            "Crossover signal"
        );

        match intent.side {
            TradeSide::Buy => {
                let order = self.execute_buy(&intent).await?;
                self.state = PositionState::Long;
                Ok(TickOutcome::Bought(order))
            }
            TradeSide::Sell => match self.execute_sell().await? {
                SellExecution::Filled(order) => {
                    self.state = PositionState::Flat;
                    Ok(TickOutcome::Sold(order))
                }
                SellExecution::NothingToSell(free_balance) => {
                    tracing::warn!(
                        "Sell signal but {} {} is below one lot, marking position flat",
                        free_balance,
                        self.pair.base
                    );
                    self.state = PositionState::Flat;
                    Ok(TickOutcome::ClosedWithoutOrder { free_balance })
                }
            },
        }
    }

    /// Re-derive the position from the actual balance.
    ///
    /// Long iff the free base balance covers at least one tradeable lot, so
    /// leftover dust after a sell does not flip the belief back to long.
    pub async fn reconcile(&mut self) -> Result<PositionState> {
        let balance = self.orders.free_balance(&self.pair.base).await?;
        let lot = self.market.lot_constraint(&self.pair.symbol).await?;

        let tradeable = normalize_quantity(balance, lot.step_size)?;
        let actual = if tradeable > Decimal::ZERO && tradeable >= lot.min_qty {
            PositionState::Long
        } else {
            PositionState::Flat
        };

        if actual != self.state {
            tracing::warn!(
                "Position belief {} diverged from balance {} {}, reconciling to {}",
                self.state,
                balance,
                self.pair.base,
                actual
            );
            self.state = actual;
        } else {
            tracing::debug!("Position {} confirmed by balance {}", actual, balance);
        }

        Ok(self.state)
    }

    async fn execute_buy(&self, intent: &TradeIntent) -> Result<OrderResult> {
        let capital = match intent.amount {
            IntentAmount::Capital(capital) => capital,
            IntentAmount::FullBalance => self.capital,
        };

        let price = self.market.current_price(&self.pair.symbol).await?;
        if price <= Decimal::ZERO {
            return Err(BotError::InvalidPrice(price));
        }

        let lot = self.market.lot_constraint(&self.pair.symbol).await?;
        let raw_quantity = capital
            .checked_div(price)
            .ok_or(BotError::InvalidPrice(price))?;
        let quantity = normalize_for_lot(raw_quantity, &lot)?;

        tracing::info!(
            "  → BUY {} {} @ {} (capital: {} {})",
            quantity,
            self.pair.base,
            price,
            capital,
            self.pair.quote
        );

        let order = self.orders.market_buy(&self.pair.symbol, quantity).await?;
        tracing::info!("  ✓ Buy filled: order {} ({})", order.order_id, order.status);
        Ok(order)
    }

    async fn execute_sell(&self) -> Result<SellExecution> {
        let balance = self.orders.free_balance(&self.pair.base).await?;
        let lot = self.market.lot_constraint(&self.pair.symbol).await?;

        let quantity = match normalize_for_lot(balance, &lot) {
            Ok(quantity) => quantity,
            Err(BotError::QuantityTooSmall { .. }) => {
                return Ok(SellExecution::NothingToSell(balance))
            }
            Err(e) => return Err(e),
        };

        tracing::info!(
            "  → SELL {} {} (free balance: {})",
            quantity,
            self.pair.base,
            balance
        );

        let order = self.orders.market_sell(&self.pair.symbol, quantity).await?;
        tracing::info!("  ✓ Sell filled: order {} ({})", order.order_id, order.status);
        Ok(SellExecution::Filled(order))
    }
}

enum SellExecution {
    Filled(OrderResult),
    NothingToSell(Decimal),
}
