use std::time::Duration;
use log::{error, info, warn};

use crate::bridge::connection::{ConnectionManager, SendError};
use crate::bridge::encoder::{Tick, TickEncoder, TickEvent};
use crate::config::Config;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    NotConnected,
    Encode,
    WriteFailed,
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Sent,
    Dropped(DropReason),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BridgeStats {
    pub sent: u64,
    pub dropped: u64,
    pub send_failures: u64,
    pub connect_attempts: u64,
}

#[derive(Debug, Clone)]
pub struct BridgeSettings {
    pub host: String,
    pub port: u16,
    pub symbol: String,
    pub source: String,
    pub connect_timeout: Duration,
    pub write_timeout: Duration,
}

impl BridgeSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            host: config.host.clone(),
            port: config.port,
            symbol: config.symbol.clone(),
            source: config.source.clone(),
            connect_timeout: Duration::from_millis(config.connect_timeout_ms),
            write_timeout: Duration::from_millis(config.write_timeout_ms),
        }
    }
}

/// Entry points the host drives: `on_init` once, `on_tick` per update,
/// `on_stop` at shutdown. Nothing here fails the host; problems are logged
/// and surface only as a dropped tick.
pub struct TickBridge {
    settings: BridgeSettings,
    connection: ConnectionManager,
    stats: BridgeStats,
    stopped: bool,
}

impl TickBridge {
    pub fn new(settings: BridgeSettings) -> Self {
        let connection = ConnectionManager::new(settings.connect_timeout, settings.write_timeout);
        Self {
            settings,
            connection,
            stats: BridgeStats::default(),
            stopped: false,
        }
    }

    pub fn symbol(&self) -> &str {
        &self.settings.symbol
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_connected()
    }

    pub fn stats(&self) -> BridgeStats {
        BridgeStats {
            connect_attempts: self.connection.connect_attempts(),
            ..self.stats
        }
    }

    pub fn on_init(&mut self) {
        info!(
            "Tick bridge started for {} -> {}:{}",
            self.settings.symbol, self.settings.host, self.settings.port
        );
        self.connect();
    }

    pub fn on_tick(&mut self, event: &TickEvent) -> TickOutcome {
        if self.stopped {
            return self.drop_tick(DropReason::Stopped);
        }

        if !self.connection.is_connected() && !self.connect() {
            return self.drop_tick(DropReason::NotConnected);
        }

        let tick = Tick::from_event(event, &self.settings.source);
        let payload = match TickEncoder::encode(&tick) {
            Ok(payload) => payload,
            Err(e) => {
                error!("Failed to encode tick for {}: {}", tick.symbol, e);
                return self.drop_tick(DropReason::Encode);
            }
        };

        match self.connection.send(&payload) {
            Ok(()) => {
                self.stats.sent += 1;
                TickOutcome::Sent
            }
            Err(SendError::NotConnected) => self.drop_tick(DropReason::NotConnected),
            Err(e @ SendError::WriteFailed(_)) => {
                warn!("Tick send failed, connection marked down: {}", e);
                self.stats.send_failures += 1;
                self.drop_tick(DropReason::WriteFailed)
            }
        }
    }

    pub fn on_stop(&mut self) {
        if self.stopped {
            return;
        }
        self.connection.close();
        self.stopped = true;

        let stats = self.stats();
        info!(
            "Tick bridge stopped - sent: {}, dropped: {}, send failures: {}, connect attempts: {}",
            stats.sent, stats.dropped, stats.send_failures, stats.connect_attempts
        );
    }

    fn connect(&mut self) -> bool {
        match self
            .connection
            .ensure_connected(&self.settings.host, self.settings.port)
        {
            Ok(()) => true,
            Err(e) => {
                warn!("Bridge connection error: {}", e);
                false
            }
        }
    }

    fn drop_tick(&mut self, reason: DropReason) -> TickOutcome {
        self.stats.dropped += 1;
        TickOutcome::Dropped(reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::io::{BufRead, BufReader};
    use std::net::TcpListener;

    fn settings(port: u16) -> BridgeSettings {
        BridgeSettings {
            host: "127.0.0.1".to_string(),
            port,
            symbol: "THYAO".to_string(),
            source: "MatriksIQ".to_string(),
            connect_timeout: Duration::from_millis(500),
            write_timeout: Duration::from_millis(500),
        }
    }

    fn event() -> TickEvent {
        TickEvent {
            symbol: "THYAO".to_string(),
            last_price: 123.45,
            last_volume: 5000,
            time: NaiveDate::from_ymd_opt(2024, 1, 1)
                .unwrap()
                .and_hms_opt(10, 0, 0)
                .unwrap(),
        }
    }

    #[test]
    fn test_forwards_tick_as_one_line() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let mut bridge = TickBridge::new(settings(listener.local_addr().unwrap().port()));

        bridge.on_init();
        assert!(bridge.is_connected());
        let (peer, _) = listener.accept().unwrap();

        assert_eq!(bridge.on_tick(&event()), TickOutcome::Sent);

        let mut line = String::new();
        BufReader::new(peer).read_line(&mut line).unwrap();
        assert_eq!(
            line,
            "{\"symbol\":\"THYAO\",\"price\":123.45,\"volume\":5000,\"timestamp\":\"2024-01-01 10:00:00\",\"source\":\"MatriksIQ\"}\n"
        );
        assert_eq!(bridge.stats().sent, 1);
    }

    #[test]
    fn test_drops_tick_when_peer_is_down() {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let mut bridge = TickBridge::new(settings(port));

        bridge.on_init();
        assert!(!bridge.is_connected());

        let outcome = bridge.on_tick(&event());
        assert_eq!(outcome, TickOutcome::Dropped(DropReason::NotConnected));

        let stats = bridge.stats();
        assert_eq!(stats.dropped, 1);
        assert_eq!(stats.sent, 0);
        // one from on_init, one retry from on_tick
        assert_eq!(stats.connect_attempts, 2);
    }

    #[test]
    fn test_reconnects_on_next_tick_when_peer_comes_up() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let mut bridge = TickBridge::new(settings(port));
        bridge.on_init();
        assert!(!bridge.is_connected());

        let listener = match TcpListener::bind(("127.0.0.1", port)) {
            Ok(listener) => listener,
            // port was taken by someone else in between; nothing to check
            Err(_) => return,
        };

        assert_eq!(bridge.on_tick(&event()), TickOutcome::Sent);
        assert!(listener.accept().is_ok());
    }

    #[test]
    fn test_stop_is_terminal_and_idempotent() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let mut bridge = TickBridge::new(settings(listener.local_addr().unwrap().port()));

        bridge.on_init();
        bridge.on_stop();
        bridge.on_stop();
        assert!(!bridge.is_connected());

        let attempts = bridge.stats().connect_attempts;
        assert_eq!(
            bridge.on_tick(&event()),
            TickOutcome::Dropped(DropReason::Stopped)
        );
        assert_eq!(bridge.stats().connect_attempts, attempts);
    }
}
