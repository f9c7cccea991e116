mod bridge;
mod config;
mod feed;
mod receiver;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use log::{info, error};

use crate::config::{Config, RECEIVER_CHANNEL_SIZE};
use crate::bridge::{BridgeSettings, TickBridge};
use crate::feed::{MockHost, TickGenerator};
use crate::receiver::TickReceiver;

async fn run_feed(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let stop = Arc::new(AtomicBool::new(false));

    let stop_signal = stop.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown requested, stopping feed");
            stop_signal.store(true, Ordering::Relaxed);
        }
    });

    let settings = BridgeSettings::from_config(&config);
    let host = MockHost::new(
        Duration::from_millis(config.feed_interval_ms),
        config.feed_max_ticks,
        stop,
    );

    info!("Starting mock feed for {} -> {}:{}", settings.symbol, settings.host, settings.port);

    // The bridge is synchronous; keep it off the async workers.
    let stats = tokio::task::spawn_blocking(move || {
        let mut bridge = TickBridge::new(settings);
        let mut generator = TickGenerator::new(bridge.symbol().to_string(), rand::thread_rng());
        host.run(&mut bridge, &mut generator)
    })
    .await?;

    info!("Feed finished - sent: {}, dropped: {}", stats.sent, stats.dropped);
    Ok(())
}

async fn run_listener(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let receiver = TickReceiver::bind(&config.listen_address).await?;
    info!("Tick receiver listening on {}", receiver.local_addr()?);

    let (tx, mut rx) = mpsc::channel(RECEIVER_CHANNEL_SIZE);
    tokio::spawn(receiver.run(tx));

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            tick = rx.recv() => {
                match tick {
                    Some(tick) => info!(
                        "Tick received: {} {} x {} @ {} ({})",
                        tick.symbol, tick.price, tick.volume, tick.timestamp, tick.source
                    ),
                    None => {
                        error!("Receiver stopped unexpectedly");
                        break;
                    }
                }
            }
            _ = &mut shutdown => {
                info!("Shutdown requested, stopping receiver");
                break;
            }
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logger first so config fallbacks are reported
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    // Load configuration
    let config = Config::from_env();

    config.log_config();

    if let Err(e) = config.validate() {
        error!("Configuration validation failed: {}", e);
        return Err(e.into());
    }

    let mode = std::env::args().nth(1).unwrap_or_else(|| "feed".to_string());
    match mode.as_str() {
        "feed" => run_feed(config).await,
        "listen" => run_listener(config).await,
        other => {
            error!("Unknown mode '{}'", other);
            Err(format!("Unknown mode '{}' (expected 'feed' or 'listen')", other).into())
        }
    }
}
