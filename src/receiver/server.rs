use std::io;
use std::net::SocketAddr;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use log::{debug, error, info, warn};

use crate::bridge::Tick;

/// Parses one wire line. Blank lines yield `None`.
pub fn parse_line(line: &str) -> Result<Option<Tick>, serde_json::Error> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }

    let tick: Tick = serde_json::from_str(line)?;
    if tick.parsed_timestamp().is_none() {
        debug!("Tick for {} has non-standard timestamp '{}'", tick.symbol, tick.timestamp);
    }
    Ok(Some(tick))
}

/// The other end of the bridge: accepts any number of senders and forwards
/// every decoded tick into a channel.
pub struct TickReceiver {
    listener: TcpListener,
}

impl TickReceiver {
    pub async fn bind(addr: &str) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self { listener })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub async fn run(self, tx: mpsc::Sender<Tick>) {
        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, addr)) => {
                            info!("Accepted tick connection from {}", addr);
                            tokio::spawn(handle_client(stream, addr.to_string(), tx.clone()));
                        }
                        Err(e) => {
                            error!("Error accepting connection: {}", e);
                        }
                    }
                }
                _ = tx.closed() => {
                    info!("Tick consumer gone, receiver stopping");
                    break;
                }
            }
        }
    }
}

async fn handle_client(stream: TcpStream, peer_addr: String, tx: mpsc::Sender<Tick>) {
    let mut reader = BufReader::new(stream);
    let mut buf = Vec::new();
    let mut received = 0usize;

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) => {
                warn!("Connection error from {}: {}", peer_addr, e);
                break;
            }
        }

        let line = match std::str::from_utf8(&buf) {
            Ok(line) => line,
            Err(e) => {
                warn!("Skipping undecodable line from {}: {}", peer_addr, e);
                continue;
            }
        };

        match parse_line(line) {
            Ok(Some(tick)) => {
                received += 1;
                if tx.send(tick).await.is_err() {
                    break;
                }
            }
            Ok(None) => {}
            Err(e) => {
                warn!("Skipping malformed line from {}: {}", peer_addr, e);
            }
        }
    }

    info!("Connection from {} closed after {} ticks", peer_addr, received);
}
