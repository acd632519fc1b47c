// Technical indicators module
// Trend signal is a dual EMA crossover over closing prices

pub mod moving_average;

pub use moving_average::{calculate_ema, calculate_sma, compute_ema_pair};
