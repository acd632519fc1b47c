use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::{interval, Duration, MissedTickBehavior};

use super::gateway::{MarketDataGateway, OrderGateway};
use super::position_controller::{PositionController, TickOutcome};
use crate::config::TradingConfig;
use crate::error::{BotError, GatewayError, Result};
use crate::indicators::compute_ema_pair;
use crate::models::{EmaPair, PositionState, TradingPair};

/// Summary of one completed tick
#[derive(Debug, Clone)]
pub struct TickReport {
    pub ema: EmaPair,
    pub last_close: f64,
    pub candles: usize,
    pub outcome: TickOutcome,
    pub state: PositionState,
}

/// Drives the position controller on a fixed interval until shut down
pub struct MonitorLoop {
    settings: TradingConfig,
    pair: TradingPair,
    reconcile_every_ticks: u32,
    market: Arc<dyn MarketDataGateway>,
    controller: PositionController,
}

impl MonitorLoop {
    /// Seed the position controller from the account and build the loop
    pub async fn start(
        settings: TradingConfig,
        market: Arc<dyn MarketDataGateway>,
        orders: Arc<dyn OrderGateway>,
    ) -> Result<Self> {
        let pair = TradingPair::parse(&settings.pair)?;
        let controller =
            PositionController::initialize(pair, settings.initial_capital, market.clone(), orders)
                .await?;

        Self::with_controller(settings, market, controller)
    }

    /// Build the loop around an existing controller; the controller's pair
    /// is the one traded and queried
    pub fn with_controller(
        settings: TradingConfig,
        market: Arc<dyn MarketDataGateway>,
        controller: PositionController,
    ) -> Result<Self> {
        settings.validate()?;
        let pair = controller.pair().clone();
        let reconcile_every_ticks = if settings.dry_run {
            0
        } else {
            settings.reconcile_every_ticks
        };

        Ok(Self {
            settings,
            pair,
            reconcile_every_ticks,
            market,
            controller,
        })
    }

    pub fn state(&self) -> PositionState {
        self.controller.state()
    }

    pub fn controller(&self) -> &PositionController {
        &self.controller
    }

    /// Fetch closes and compute the EMA pair without trading
    pub async fn signal(&self) -> Result<(EmaPair, Vec<f64>)> {
        let closes = self
            .market
            .historical_closes(
                &self.pair.symbol,
                &self.settings.candle_interval,
                self.settings.history_candle_count,
            )
            .await?;

        let prices = to_f64_series(&closes)?;
        let ema = compute_ema_pair(
            &prices,
            self.settings.short_period,
            self.settings.long_period,
        )?;

        Ok((ema, prices))
    }

    /// One fetch-compute-decide cycle
    pub async fn tick(&mut self) -> Result<TickReport> {
        let (ema, prices) = self.signal().await?;
        let last_close = prices.last().copied().unwrap_or_default();

        tracing::info!(
            "  EMA short({}): {:.4} | EMA long({}): {:.4} | close: {:.4}",
            self.settings.short_period,
            ema.short,
            self.settings.long_period,
            ema.long,
            last_close
        );

        let outcome = self.controller.on_tick(&ema).await?;

        Ok(TickReport {
            ema,
            last_close,
            candles: prices.len(),
            outcome,
            state: self.controller.state(),
        })
    }

    /// Run until `shutdown` flips to true or its sender is dropped.
    ///
    /// Shutdown is checked before each tick and while waiting for the next
    /// one; a tick that has started always runs to completion.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> PositionState {
        let period = Duration::from_secs(self.settings.interval_seconds);
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        tracing::info!(
            "💹 Monitoring {} every {}s ({} x {} candles, EMA {}/{}), position {}",
            self.pair,
            period.as_secs(),
            self.settings.history_candle_count,
            self.settings.candle_interval,
            self.settings.short_period,
            self.settings.long_period,
            self.controller.state()
        );

        let mut tick_count = 0u64;

        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                _ = ticker.tick() => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
            }

            tick_count += 1;
            tracing::info!("💹 [TICK {}] {}", tick_count, self.pair);

            match self.tick().await {
                Ok(report) => log_report(&report),
                Err(e) => log_tick_error(&e),
            }

            if self.reconcile_every_ticks > 0
                && tick_count % u64::from(self.reconcile_every_ticks) == 0
            {
                if let Err(e) = self.controller.reconcile().await {
                    tracing::warn!("  ✗ Reconciliation failed: {}", e);
                }
            }

            tracing::info!(
                "Monitoring... next check in {} seconds",
                period.as_secs()
            );
        }

        tracing::info!(
            "Monitor loop stopped after {} ticks, position {}",
            tick_count,
            self.controller.state()
        );
        self.controller.state()
    }
}

fn to_f64_series(closes: &[Decimal]) -> Result<Vec<f64>> {
    closes
        .iter()
        .map(|c| {
            c.to_f64().ok_or_else(|| {
                BotError::Gateway(GatewayError::InvalidResponse(format!(
                    "Close price {} is not representable",
                    c
                )))
            })
        })
        .collect()
}

fn log_report(report: &TickReport) {
    match &report.outcome {
        TickOutcome::Hold => {
            tracing::info!("  → Hold ({}, spread {:.4})", report.state, report.ema.spread())
        }
        TickOutcome::Bought(order) => tracing::info!(
            "  ✓ Now {} after buying {} (order {})",
            report.state,
            order.executed_qty,
            order.order_id
        ),
        TickOutcome::Sold(order) => tracing::info!(
            "  ✓ Now {} after selling {} (order {})",
            report.state,
            order.executed_qty,
            order.order_id
        ),
        TickOutcome::ClosedWithoutOrder { free_balance } => tracing::info!(
            "  ✓ Now {} (balance {} below one lot)",
            report.state,
            free_balance
        ),
    }
}

fn log_tick_error(e: &BotError) {
    match e {
        BotError::InsufficientData { required, available } => tracing::info!(
            "  → Insufficient history ({}/{} candles), skipping tick",
            available,
            required
        ),
        e if e.is_recoverable() => tracing::warn!("  ✗ Tick skipped: {}", e),
        e => tracing::error!("  ✗ Tick failed: {}", e),
    }
}
