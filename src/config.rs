use std::env;
use std::str::FromStr;
use log::warn;

// Destination Configuration
pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 5555;
pub const DEFAULT_SYMBOL: &str = "THYAO";
pub const DEFAULT_SOURCE: &str = "MatriksIQ";

// Socket Configuration
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 2000;
pub const DEFAULT_WRITE_TIMEOUT_MS: u64 = 1000;

// Mock Feed Configuration
pub const DEFAULT_FEED_INTERVAL_MS: u64 = 100;

// Receiver Configuration
pub const DEFAULT_LISTEN_ADDRESS: &str = "127.0.0.1:5555";
pub const RECEIVER_CHANNEL_SIZE: usize = 100;

pub struct Config {
    pub host: String,
    pub port: u16,
    pub symbol: String,
    pub source: String,
    pub connect_timeout_ms: u64,
    pub write_timeout_ms: u64,
    pub feed_interval_ms: u64,
    pub feed_max_ticks: u64,
    pub listen_address: String,
    pub log_level: String,
    /// Env vars that were set but unparseable and fell back to their default.
    pub invalid_vars: Vec<String>,
}

fn parse_env<T: FromStr>(key: &str, default: T, invalid_vars: &mut Vec<String>) -> T {
    match env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("{} has invalid value '{}', using default", key, raw);
            invalid_vars.push(key.to_string());
            default
        }),
        Err(_) => default,
    }
}

impl Config {
    pub fn from_env() -> Self {
        let mut invalid_vars = Vec::new();
        Self {
            host: env::var("BRIDGE_HOST")
                .unwrap_or_else(|_| DEFAULT_HOST.to_string()),
            port: parse_env("BRIDGE_PORT", DEFAULT_PORT, &mut invalid_vars),
            symbol: env::var("BRIDGE_SYMBOL")
                .unwrap_or_else(|_| DEFAULT_SYMBOL.to_string()),
            source: env::var("BRIDGE_SOURCE")
                .unwrap_or_else(|_| DEFAULT_SOURCE.to_string()),
            connect_timeout_ms: parse_env("CONNECT_TIMEOUT_MS", DEFAULT_CONNECT_TIMEOUT_MS, &mut invalid_vars),
            write_timeout_ms: parse_env("WRITE_TIMEOUT_MS", DEFAULT_WRITE_TIMEOUT_MS, &mut invalid_vars),
            feed_interval_ms: parse_env("FEED_INTERVAL_MS", DEFAULT_FEED_INTERVAL_MS, &mut invalid_vars),
            feed_max_ticks: parse_env("FEED_MAX_TICKS", 0, &mut invalid_vars),
            listen_address: env::var("LISTEN_ADDRESS")
                .unwrap_or_else(|_| DEFAULT_LISTEN_ADDRESS.to_string()),
            log_level: env::var("RUST_LOG")
                .unwrap_or_else(|_| "info".to_string()),
            invalid_vars,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.host.trim().is_empty() {
            return Err("Destination host must not be empty".to_string());
        }

        if self.port == 0 {
            return Err("Destination port must be non-zero".to_string());
        }

        if self.symbol.trim().is_empty() {
            return Err("Symbol must not be empty".to_string());
        }

        if self.connect_timeout_ms == 0 || self.write_timeout_ms == 0 {
            return Err("Socket timeouts must be greater than zero".to_string());
        }

        if self.source.is_empty() {
            warn!("BRIDGE_SOURCE is empty - ticks will carry an empty source field");
        }

        Ok(())
    }

    pub fn summary(&self) -> Vec<String> {
        let max_ticks = if self.feed_max_ticks == 0 {
            "unlimited".to_string()
        } else {
            self.feed_max_ticks.to_string()
        };

        let mut lines = vec![
            format!("Destination: {}:{}", self.host, self.port),
            format!("Symbol: {}", self.symbol),
            format!("Source: {}", self.source),
            format!("Connect Timeout: {}ms", self.connect_timeout_ms),
            format!("Write Timeout: {}ms", self.write_timeout_ms),
            format!("Feed Interval: {}ms", self.feed_interval_ms),
            format!("Feed Max Ticks: {}", max_ticks),
            format!("Listen Address: {}", self.listen_address),
            format!("Log Level: {}", self.log_level),
        ];
        if !self.invalid_vars.is_empty() {
            lines.push(format!("Defaulted (invalid): {}", self.invalid_vars.join(", ")));
        }
        lines
    }

    pub fn log_config(&self) {
        println!("Bridge Configuration:");
        for line in self.summary() {
            println!("  {}", line);
        }
    }
}
