// TCP link to the robot dog's command server
//
// One persistent stream per device. Writers are serialized so concurrent
// motion calls never interleave partial command lines on the wire.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::SEND_TIMEOUT;

/// Network address of the actuator server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Failure to establish the link. Without it the device is unusable.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("Failed to connect to {endpoint}: {source}")]
    Connect {
        endpoint: Endpoint,
        source: std::io::Error,
    },
}

/// Failure to write a line on an established (or torn down) link
#[derive(Debug, thiserror::Error)]
pub enum TransmissionError {
    #[error("Not connected to the robot dog")]
    NotConnected,

    #[error("Timed out after {0:?} writing to the robot dog")]
    Timeout(Duration),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Anything that can carry newline-terminated command lines
pub trait LineSink: Send + Sync {
    /// Write one complete line; implementations must not interleave lines
    fn send_line(&self, line: &str) -> impl Future<Output = Result<(), TransmissionError>> + Send;
}

struct Link {
    endpoint: Endpoint,
    stream: TcpStream,
    /// Cleared while a line is being written; a link left dirty may hold a
    /// partial line and is never written to again
    clean: bool,
}

impl Link {
    fn new(endpoint: Endpoint, stream: TcpStream) -> Self {
        Self {
            endpoint,
            stream,
            clean: true,
        }
    }
}

/// The single live connection to the actuator server
pub struct Connection {
    link: Mutex<Option<Link>>,
    send_timeout: Duration,
}

impl Connection {
    /// Open a connection, failing loudly if the server can't be reached
    pub async fn connect(endpoint: Endpoint) -> Result<Self, ConnectionError> {
        let stream = Self::open(&endpoint).await?;
        Ok(Self {
            link: Mutex::new(Some(Link::new(endpoint, stream))),
            send_timeout: SEND_TIMEOUT,
        })
    }

    /// Override the per-line write deadline
    pub fn with_send_timeout(mut self, send_timeout: Duration) -> Self {
        self.send_timeout = send_timeout;
        self
    }

    async fn open(endpoint: &Endpoint) -> Result<TcpStream, ConnectionError> {
        info!("Connecting to robot dog at {}", endpoint);
        let stream = TcpStream::connect((endpoint.host.as_str(), endpoint.port))
            .await
            .map_err(|source| ConnectionError::Connect {
                endpoint: endpoint.clone(),
                source,
            })?;

        // Command lines are tiny; don't let Nagle hold them back
        if let Err(e) = stream.set_nodelay(true) {
            warn!("Failed to set TCP_NODELAY: {}", e);
        }

        info!("Connected to {}", endpoint);
        Ok(stream)
    }

    /// Replace the current connection with a new one.
    ///
    /// The new socket is opened before the old one is touched, then swapped
    /// in under the writer lock. The old socket is shut down rather than
    /// abandoned. If the new connect fails the old connection stays live.
    pub async fn reconnect(&self, endpoint: Endpoint) -> Result<(), ConnectionError> {
        let stream = Self::open(&endpoint).await?;

        let old = {
            let mut link = self.link.lock().await;
            link.replace(Link::new(endpoint, stream))
        };

        if let Some(old) = old {
            Self::close(old).await;
        }
        Ok(())
    }

    /// Tear down the connection; later sends fail with `NotConnected`
    pub async fn disconnect(&self) {
        let old = self.link.lock().await.take();
        if let Some(old) = old {
            Self::close(old).await;
        }
    }

    async fn close(mut link: Link) {
        if let Err(e) = link.stream.shutdown().await {
            debug!("Shutdown of {} failed: {}", link.endpoint, e);
        }
        info!("Closed connection to {}", link.endpoint);
    }

    /// Endpoint of the live connection, if any
    pub async fn endpoint(&self) -> Option<Endpoint> {
        self.link.lock().await.as_ref().map(|l| l.endpoint.clone())
    }

    pub async fn is_connected(&self) -> bool {
        self.link.lock().await.is_some()
    }
}

impl LineSink for Connection {
    async fn send_line(&self, line: &str) -> Result<(), TransmissionError> {
        let mut guard = self.link.lock().await;

        // A previous send was dropped mid-write
        if let Some(stale) = guard.take_if(|l| !l.clean) {
            warn!("Dropping {} after an interrupted write", stale.endpoint);
        }
        let link = guard.as_mut().ok_or(TransmissionError::NotConnected)?;

        debug!("Sending {:?} to {}", line.trim_end(), link.endpoint);
        link.clean = false;
        let write = async {
            link.stream.write_all(line.as_bytes()).await?;
            link.stream.flush().await
        };
        let result = match tokio::time::timeout(self.send_timeout, write).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(TransmissionError::Io(e)),
            Err(_) => Err(TransmissionError::Timeout(self.send_timeout)),
        };

        match result {
            Ok(()) => {
                link.clean = true;
                Ok(())
            }
            Err(e) => {
                // The socket may hold a partial line; sends fail until reconnect
                if let Some(broken) = guard.take() {
                    warn!("Dropping {} after failed write: {}", broken.endpoint, e);
                }
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
    use tokio::net::TcpListener;

    async fn listener() -> (TcpListener, Endpoint) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        (listener, Endpoint::new("127.0.0.1", port))
    }

    #[test]
    fn test_endpoint_display() {
        assert_eq!(Endpoint::new("192.168.1.20", 5001).to_string(), "192.168.1.20:5001");
    }

    #[tokio::test]
    async fn test_send_line_reaches_server() {
        let (listener, endpoint) = listener().await;
        let conn = Connection::connect(endpoint.clone()).await.unwrap();
        let (server, _) = listener.accept().await.unwrap();

        conn.send_line("CMD_MOVE_STOP#8\n").await.unwrap();
        assert_eq!(conn.endpoint().await, Some(endpoint));

        let mut lines = BufReader::new(server).lines();
        assert_eq!(lines.next_line().await.unwrap().unwrap(), "CMD_MOVE_STOP#8");
    }

    #[tokio::test]
    async fn test_connect_failure_propagates() {
        let (listener, endpoint) = listener().await;
        drop(listener);

        let err = Connection::connect(endpoint.clone()).await.err().unwrap();
        let ConnectionError::Connect { endpoint: failed, .. } = err;
        assert_eq!(failed, endpoint);
    }

    #[tokio::test]
    async fn test_concurrent_sends_do_not_interleave() {
        let (listener, endpoint) = listener().await;
        let conn = Arc::new(Connection::connect(endpoint).await.unwrap());
        let (server, _) = listener.accept().await.unwrap();

        let mut tasks = Vec::new();
        for i in 0..16 {
            let conn = conn.clone();
            tasks.push(tokio::spawn(async move {
                for j in 0..20 {
                    let line = format!("CMD_TURN_LEFT#{}.{}\n", i, j);
                    conn.send_line(&line).await.unwrap();
                }
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }
        conn.disconnect().await;

        let mut received = Vec::new();
        let mut lines = BufReader::new(server).lines();
        while let Some(line) = lines.next_line().await.unwrap() {
            received.push(line);
        }

        assert_eq!(received.len(), 16 * 20);
        for line in &received {
            assert!(line.parse::<crate::base::protocol::Command>().is_ok(), "mangled line {}", line);
        }
    }

    #[tokio::test]
    async fn test_reconnect_swaps_and_closes_old() {
        let (first, first_endpoint) = listener().await;
        let (second, second_endpoint) = listener().await;

        let conn = Connection::connect(first_endpoint).await.unwrap();
        let (mut old_server, _) = first.accept().await.unwrap();

        conn.reconnect(second_endpoint.clone()).await.unwrap();
        let (new_server, _) = second.accept().await.unwrap();
        assert_eq!(conn.endpoint().await, Some(second_endpoint));

        conn.send_line("CMD_MOVE_STOP#8\n").await.unwrap();

        // Old socket sees EOF
        let mut buf = Vec::new();
        old_server.read_to_end(&mut buf).await.unwrap();
        assert!(buf.is_empty());

        let mut lines = BufReader::new(new_server).lines();
        assert_eq!(lines.next_line().await.unwrap().unwrap(), "CMD_MOVE_STOP#8");
    }

    #[tokio::test]
    async fn test_failed_reconnect_keeps_old_link() {
        let (listener, endpoint) = listener().await;
        let (dead, dead_endpoint) = self::listener().await;
        drop(dead);

        let conn = Connection::connect(endpoint.clone()).await.unwrap();
        let (server, _) = listener.accept().await.unwrap();

        assert!(conn.reconnect(dead_endpoint).await.is_err());
        assert_eq!(conn.endpoint().await, Some(endpoint));

        conn.send_line("CMD_MOVE_STOP#8\n").await.unwrap();
        let mut lines = BufReader::new(server).lines();
        assert_eq!(lines.next_line().await.unwrap().unwrap(), "CMD_MOVE_STOP#8");
    }

    /// Send 4 KB lines until the peer's receive window fills up
    async fn fill_until_stalled(conn: &Connection) -> TransmissionError {
        let line = format!("CMD_MOVE_FORWARD#{}.0\n", "1".repeat(4096));
        for _ in 0..100_000 {
            if let Err(e) = conn.send_line(&line).await {
                return e;
            }
        }
        panic!("peer never stalled");
    }

    #[tokio::test]
    async fn test_stalled_peer_times_out_and_drops_link() {
        let (other, other_endpoint) = listener().await;
        let (listener, endpoint) = listener().await;
        let conn = Connection::connect(endpoint)
            .await
            .unwrap()
            .with_send_timeout(Duration::from_millis(200));
        // Accepted but never read
        let (_stalled, _) = listener.accept().await.unwrap();

        let err = fill_until_stalled(&conn).await;
        assert!(matches!(err, TransmissionError::Timeout(_)), "got {}", err);

        // Half-written socket is not reused
        assert!(!conn.is_connected().await);
        assert!(matches!(
            conn.send_line("CMD_MOVE_STOP#8\n").await,
            Err(TransmissionError::NotConnected)
        ));

        // Reconfiguration recovers without waiting on the old writer
        tokio::time::timeout(Duration::from_secs(5), conn.reconnect(other_endpoint))
            .await
            .expect("reconnect hung")
            .unwrap();
        let (server, _) = other.accept().await.unwrap();
        conn.send_line("CMD_MOVE_STOP#8\n").await.unwrap();
        let mut lines = BufReader::new(server).lines();
        assert_eq!(lines.next_line().await.unwrap().unwrap(), "CMD_MOVE_STOP#8");
    }

    #[tokio::test]
    async fn test_interrupted_write_is_not_reused() {
        let (listener, endpoint) = listener().await;
        let conn = Connection::connect(endpoint).await.unwrap();
        let (_stalled, _) = listener.accept().await.unwrap();

        // Cancel sends from outside once the peer stops draining
        let line = format!("CMD_MOVE_FORWARD#{}.0\n", "1".repeat(4096));
        let mut interrupted = false;
        for _ in 0..100_000 {
            if tokio::time::timeout(Duration::from_millis(100), conn.send_line(&line))
                .await
                .is_err()
            {
                interrupted = true;
                break;
            }
        }
        assert!(interrupted);

        assert!(matches!(
            conn.send_line("CMD_MOVE_STOP#8\n").await,
            Err(TransmissionError::NotConnected)
        ));
        assert!(!conn.is_connected().await);
    }

    #[tokio::test]
    async fn test_send_after_disconnect_is_rejected() {
        let (listener, endpoint) = listener().await;
        let conn = Connection::connect(endpoint).await.unwrap();
        let _server = listener.accept().await.unwrap();

        conn.disconnect().await;
        assert!(!conn.is_connected().await);
        assert!(matches!(
            conn.send_line("CMD_MOVE_STOP#8\n").await,
            Err(TransmissionError::NotConnected)
        ));
    }
}
