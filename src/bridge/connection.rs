use std::io::{self, ErrorKind, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;
use log::{debug, info};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConnectError {
    #[error("connection refused by {0}")]
    Refused(String),
    #[error("connect to {0} timed out")]
    TimedOut(String),
    #[error("could not resolve {0}")]
    Unresolved(String),
    #[error("connect to {addr} failed: {source}")]
    Io {
        addr: String,
        #[source]
        source: io::Error,
    },
}

impl ConnectError {
    fn from_io(addr: String, err: io::Error) -> Self {
        match err.kind() {
            ErrorKind::ConnectionRefused => ConnectError::Refused(addr),
            ErrorKind::TimedOut | ErrorKind::WouldBlock => ConnectError::TimedOut(addr),
            _ => ConnectError::Io { addr, source: err },
        }
    }
}

#[derive(Error, Debug)]
pub enum SendError {
    #[error("not connected")]
    NotConnected,
    #[error("write failed: {0}")]
    WriteFailed(#[source] io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connected,
}

/// Owns the single outbound socket. Every failure is reported as a value and
/// leaves the manager `Disconnected`, so the caller can retry on its next call.
pub struct ConnectionManager {
    stream: Option<TcpStream>,
    state: ConnectionState,
    connect_timeout: Duration,
    write_timeout: Duration,
    connect_attempts: u64,
}

impl ConnectionManager {
    pub fn new(connect_timeout: Duration, write_timeout: Duration) -> Self {
        Self {
            stream: None,
            state: ConnectionState::Disconnected,
            connect_timeout,
            write_timeout,
            connect_attempts: 0,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    pub fn connect_attempts(&self) -> u64 {
        self.connect_attempts
    }

    pub fn connect(&mut self, host: &str, port: u16) -> Result<(), ConnectError> {
        self.release();
        self.connect_attempts += 1;

        let endpoint = format!("{}:{}", host, port);
        let addrs: Vec<SocketAddr> = (host, port)
            .to_socket_addrs()
            .map_err(|e| ConnectError::Unresolved(format!("{} ({})", endpoint, e)))?
            .collect();

        if addrs.is_empty() {
            return Err(ConnectError::Unresolved(endpoint));
        }

        let mut last_error = None;
        for addr in addrs {
            match TcpStream::connect_timeout(&addr, self.connect_timeout) {
                Ok(stream) => {
                    self.configure(&stream)
                        .map_err(|e| ConnectError::from_io(endpoint.clone(), e))?;
                    self.stream = Some(stream);
                    self.state = ConnectionState::Connected;
                    info!("Connected to {} ({})", endpoint, addr);
                    return Ok(());
                }
                Err(e) => {
                    debug!("Connect attempt to {} failed: {}", addr, e);
                    last_error = Some(e);
                }
            }
        }

        let err = last_error
            .unwrap_or_else(|| io::Error::new(ErrorKind::NotConnected, "no address attempted"));
        Err(ConnectError::from_io(endpoint, err))
    }

    pub fn ensure_connected(&mut self, host: &str, port: u16) -> Result<(), ConnectError> {
        if self.is_connected() {
            return Ok(());
        }
        self.connect(host, port)
    }

    /// Writes the whole payload once. A failed write drops the socket; the
    /// payload is not retried.
    pub fn send(&mut self, payload: &[u8]) -> Result<(), SendError> {
        let stream = match (self.state, self.stream.as_mut()) {
            (ConnectionState::Connected, Some(stream)) => stream,
            _ => return Err(SendError::NotConnected),
        };

        let result = stream.write_all(payload).and_then(|_| stream.flush());
        if let Err(e) = result {
            self.release();
            return Err(SendError::WriteFailed(e));
        }
        Ok(())
    }

    pub fn close(&mut self) {
        if self.stream.is_some() {
            info!("Closing bridge connection");
        }
        self.release();
    }

    fn configure(&self, stream: &TcpStream) -> io::Result<()> {
        stream.set_write_timeout(Some(self.write_timeout))?;
        stream.set_nodelay(true)?;
        Ok(())
    }

    fn release(&mut self) {
        if let Some(stream) = self.stream.take() {
            // Already-closed sockets report NotConnected here; nothing to do.
            let _ = stream.shutdown(Shutdown::Both);
        }
        self.state = ConnectionState::Disconnected;
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;
    use std::thread;

    fn manager() -> ConnectionManager {
        ConnectionManager::new(Duration::from_millis(500), Duration::from_millis(500))
    }

    fn unused_port() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    }

    #[test]
    fn test_new_manager_is_disconnected() {
        let conn = manager();
        assert_eq!(conn.state(), ConnectionState::Disconnected);
        assert_eq!(conn.connect_attempts(), 0);
    }

    #[test]
    fn test_send_when_disconnected_touches_nothing() {
        let mut conn = manager();
        let result = conn.send(b"{}\n");
        assert!(matches!(result, Err(SendError::NotConnected)));
        assert_eq!(conn.connect_attempts(), 0);
        assert_eq!(conn.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_ensure_connected_is_idempotent() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let mut conn = manager();

        conn.ensure_connected("127.0.0.1", port).unwrap();
        conn.ensure_connected("127.0.0.1", port).unwrap();
        conn.ensure_connected("127.0.0.1", port).unwrap();

        assert!(conn.is_connected());
        assert_eq!(conn.connect_attempts(), 1);

        listener.set_nonblocking(true).unwrap();
        assert!(listener.accept().is_ok());
        let second = listener.accept();
        assert!(matches!(second, Err(ref e) if e.kind() == ErrorKind::WouldBlock));
    }

    #[test]
    fn test_unreachable_endpoint() {
        let port = unused_port();
        let mut conn = manager();

        let result = conn.ensure_connected("127.0.0.1", port);
        assert!(matches!(result, Err(ConnectError::Refused(_))));
        assert_eq!(conn.state(), ConnectionState::Disconnected);

        let send = conn.send(b"{}\n");
        assert!(matches!(send, Err(SendError::NotConnected)));
    }

    #[test]
    fn test_unresolvable_host() {
        let mut conn = manager();
        assert!(conn.connect("host.invalid", 5555).is_err());
        assert_eq!(conn.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_send_delivers_payload() {
        use std::io::{BufRead, BufReader};

        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let mut conn = manager();
        conn.ensure_connected("127.0.0.1", port).unwrap();

        let (peer, _) = listener.accept().unwrap();
        conn.send(b"{\"symbol\":\"THYAO\"}\n").unwrap();

        let mut line = String::new();
        BufReader::new(peer).read_line(&mut line).unwrap();
        assert_eq!(line, "{\"symbol\":\"THYAO\"}\n");
    }

    #[test]
    fn test_peer_close_flips_state_and_reconnects_once() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let mut conn = manager();
        conn.ensure_connected("127.0.0.1", port).unwrap();

        let (peer, _) = listener.accept().unwrap();
        drop(peer);

        // The first write after a peer close may still land in the send
        // buffer; the RST it provokes fails a later one.
        let mut result = Ok(());
        for _ in 0..50 {
            result = conn.send(b"{\"symbol\":\"THYAO\"}\n");
            if result.is_err() {
                break;
            }
            thread::sleep(Duration::from_millis(10));
        }

        assert!(matches!(result, Err(SendError::WriteFailed(_))));
        assert_eq!(conn.state(), ConnectionState::Disconnected);
        assert_eq!(conn.connect_attempts(), 1);

        conn.ensure_connected("127.0.0.1", port).unwrap();
        assert_eq!(conn.connect_attempts(), 2);
        assert!(conn.is_connected());
    }

    #[test]
    fn test_close_twice() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let mut conn = manager();
        conn.connect("127.0.0.1", port).unwrap();

        conn.close();
        assert_eq!(conn.state(), ConnectionState::Disconnected);
        conn.close();
        assert_eq!(conn.state(), ConnectionState::Disconnected);
        assert!(matches!(conn.send(b"x\n"), Err(SendError::NotConnected)));
    }

    #[test]
    fn test_connect_error_mapping() {
        let refused = ConnectError::from_io(
            "127.0.0.1:1".to_string(),
            io::Error::from(ErrorKind::ConnectionRefused),
        );
        assert!(matches!(refused, ConnectError::Refused(_)));

        let timed_out = ConnectError::from_io(
            "10.0.0.1:5555".to_string(),
            io::Error::from(ErrorKind::TimedOut),
        );
        assert!(matches!(timed_out, ConnectError::TimedOut(_)));
        assert_eq!(timed_out.to_string(), "connect to 10.0.0.1:5555 timed out");

        let other = ConnectError::from_io(
            "10.0.0.1:5555".to_string(),
            io::Error::from(ErrorKind::PermissionDenied),
        );
        assert!(matches!(other, ConnectError::Io { .. }));
    }
}
