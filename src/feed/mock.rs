use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use chrono::Local;
use rand::Rng;
use log::{debug, info};

use crate::bridge::{BridgeStats, TickBridge, TickEvent};

pub const MIN_PRICE: f64 = 10.0;
pub const MAX_PRICE: f64 = 500.0;
pub const MAX_VOLUME: i64 = 1000;

/// Random tick source standing in for the terminal's market data.
pub struct TickGenerator<R: Rng> {
    symbol: String,
    rng: R,
}

impl<R: Rng> TickGenerator<R> {
    pub fn new(symbol: impl Into<String>, rng: R) -> Self {
        Self {
            symbol: symbol.into(),
            rng,
        }
    }

    pub fn next_event(&mut self) -> TickEvent {
        let price: f64 = self.rng.gen_range(MIN_PRICE..MAX_PRICE);
        TickEvent {
            symbol: self.symbol.clone(),
            last_price: (price * 100.0).round() / 100.0,
            last_volume: self.rng.gen_range(1..=MAX_VOLUME),
            time: Local::now().naive_local(),
        }
    }
}

/// Drives a bridge the way the trading terminal does: init, a sequence of
/// ticks delivered one at a time, then stop.
pub struct MockHost {
    interval: Duration,
    max_ticks: u64,
    stop: Arc<AtomicBool>,
}

impl MockHost {
    pub fn new(interval: Duration, max_ticks: u64, stop: Arc<AtomicBool>) -> Self {
        Self {
            interval,
            max_ticks,
            stop,
        }
    }

    pub fn run<R: Rng>(&self, bridge: &mut TickBridge, generator: &mut TickGenerator<R>) -> BridgeStats {
        bridge.on_init();
        if !bridge.is_connected() {
            info!("Peer for {} not reachable yet, retrying on each tick", bridge.symbol());
        }

        let mut delivered = 0u64;
        while !self.stop.load(Ordering::Relaxed) {
            if self.max_ticks > 0 && delivered >= self.max_ticks {
                info!("Mock feed reached {} ticks", self.max_ticks);
                break;
            }

            let event = generator.next_event();
            let outcome = bridge.on_tick(&event);
            debug!("{} {} x {} -> {:?}", event.symbol, event.last_price, event.last_volume, outcome);
            delivered += 1;

            if !self.interval.is_zero() {
                thread::sleep(self.interval);
            }
        }

        bridge.on_stop();
        bridge.stats()
    }
}
