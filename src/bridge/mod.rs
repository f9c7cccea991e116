pub mod connection;
pub mod encoder;
pub mod handler;

pub use encoder::{Tick, TickEvent};
pub use handler::{BridgeSettings, BridgeStats, TickBridge};
