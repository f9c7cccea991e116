use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// One market update as the host delivers it.
#[derive(Debug, Clone)]
pub struct TickEvent {
    pub symbol: String,
    pub last_price: f64,
    pub last_volume: i64,
    pub time: NaiveDateTime,
}

/// Wire representation of a tick. Field order here is the key order on the wire.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Tick {
    pub symbol: String,
    pub price: f64,
    pub volume: i64,
    pub timestamp: String,
    #[serde(default)]
    pub source: String,
}

impl Tick {
    pub fn from_event(event: &TickEvent, source: &str) -> Self {
        Self {
            symbol: event.symbol.clone(),
            price: event.last_price,
            volume: event.last_volume,
            timestamp: event.time.format(TIMESTAMP_FORMAT).to_string(),
            source: source.to_string(),
        }
    }

    pub fn parsed_timestamp(&self) -> Option<NaiveDateTime> {
        NaiveDateTime::parse_from_str(&self.timestamp, TIMESTAMP_FORMAT).ok()
    }
}

pub struct TickEncoder;

impl TickEncoder {
    /// Serializes `tick` as compact JSON followed by a single `\n`.
    ///
    /// Prices and volumes are written as given; no rounding or range checks.
    pub fn encode(tick: &Tick) -> Result<Vec<u8>, serde_json::Error> {
        let mut payload = serde_json::to_vec(tick)?;
        payload.push(b'\n');
        Ok(payload)
    }
}
