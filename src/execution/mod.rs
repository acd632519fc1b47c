// Position state machine, order sizing and the polling loop
pub mod gateway;
pub mod monitor;
pub mod paper;
pub mod position_controller;
pub mod quantity;

pub use gateway::{MarketDataGateway, OrderGateway};
pub use monitor::{MonitorLoop, TickReport};
pub use paper::PaperOrderGateway;
pub use position_controller::{PositionController, TickOutcome};
pub use quantity::{normalize_for_lot, normalize_quantity, step_precision};
