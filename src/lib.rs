// Core modules
pub mod api;
pub mod config;
pub mod error;
pub mod execution;
pub mod indicators;
pub mod models;

// Re-export commonly used types
pub use error::{BotError, GatewayError, Result};
pub use models::*;
