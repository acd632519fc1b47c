use crate::error::{BotError, Result};
use crate::models::EmaPair;

/// Calculate Simple Moving Average (SMA) over the most recent `period` prices
pub fn calculate_sma(prices: &[f64], period: usize) -> Option<f64> {
    if period == 0 || prices.len() < period {
        return None;
    }

    let sum: f64 = prices.iter().rev().take(period).sum();
    Some(sum / period as f64)
}

/// Calculate Exponential Moving Average (EMA)
///
/// Seeded with the SMA of the first `period` prices, then smoothed over the
/// rest of the series with `k = 2 / (period + 1)`.
pub fn calculate_ema(prices: &[f64], period: usize) -> Result<f64> {
    if period == 0 {
        return Err(BotError::InvalidPeriod(period));
    }
    if prices.len() < period {
        return Err(BotError::InsufficientData {
            required: period,
            available: prices.len(),
        });
    }

    let k = 2.0 / (period as f64 + 1.0);

    let mut ema = calculate_sma(&prices[..period], period).ok_or(BotError::InsufficientData {
        required: period,
        available: prices.len(),
    })?;

    for price in &prices[period..] {
        ema = price * k + ema * (1.0 - k);
    }

    Ok(ema)
}

/// Compute the short/long EMA pair used for the crossover signal
pub fn compute_ema_pair(prices: &[f64], short_period: usize, long_period: usize) -> Result<EmaPair> {
    let required = short_period.max(long_period);
    if prices.len() < required {
        return Err(BotError::InsufficientData {
            required,
            available: prices.len(),
        });
    }

    Ok(EmaPair {
        short: calculate_ema(prices, short_period)?,
        long: calculate_ema(prices, long_period)?,
    })
}
