//! Connection Handler Module
//!
//! This module handles individual client connections. Each client gets its
//! own handler task that runs in a loop, reading requests and sending
//! responses, until the client quits, a fatal status is sent, or the
//! transport fails.
//!
//! ## Connection Lifecycle
//!
//! ```text
//! 1. Client connects (TCP handshake)
//!        │
//!        ▼
//! 2. ConnectionHandler spawned
//!        │
//!        ▼
//! 3. ┌──────────────────────────────┐
//!    │   Main Loop (connected)      │
//!    │                              │
//!    │  ┌─────────────────────────┐ │
//!    │  │ Read bytes from socket  │ │  idle timeout only while the
//!    │  └───────────┬─────────────┘ │  buffer is empty
//!    │              ▼               │
//!    │  ┌─────────────────────────┐ │
//!    │  │ Frame request lines     │ │
//!    │  └───────────┬─────────────┘ │
//!    │              ▼               │
//!    │  ┌─────────────────────────┐ │
//!    │  │ Execute command         │ │
//!    │  └───────────┬─────────────┘ │
//!    │              ▼               │
//!    │  ┌─────────────────────────┐ │
//!    │  │ Send response           │ │
//!    │  └───────────┬─────────────┘ │
//!    │              ▼               │
//!    │         [Loop back]          │
//!    └──────────────────────────────┘
//!        │
//!        ▼
//! 4. quit / fatal status / timeout / transport error
//!        │
//!        ▼
//! 5. Stream shut down once, handler task ends
//! ```
//!
//! ## Buffer Management
//!
//! We use a BytesMut buffer to accumulate incoming data. A read may carry a
//! partial request or several pipelined ones; every complete request in the
//! buffer is answered before the next read.

use crate::commands::CommandHandler;
use crate::protocol::{parser::DEFAULT_MAX_REQUEST_SIZE, Request, RequestFramer, Response};
use bytes::BytesMut;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufWriter};
use tracing::{debug, info, trace, warn};

/// Seconds a connection may sit idle waiting for its next request
pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 5 * 60;

/// How long a connection may sit idle waiting for its next request
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(DEFAULT_IDLE_TIMEOUT_SECS);

/// Initial buffer capacity
const INITIAL_BUFFER_SIZE: usize = 4096;

/// Per-connection settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// Maximum wait for the first byte of a new request
    pub idle_timeout: Duration,

    /// Largest unterminated request kept in the receive buffer
    pub max_request_size: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            max_request_size: DEFAULT_MAX_REQUEST_SIZE,
        }
    }
}

/// Statistics for connection handling
#[derive(Debug, Default)]
pub struct ConnectionStats {
    /// Total number of connections accepted
    pub connections_accepted: AtomicU64,
    /// Currently active connections
    pub active_connections: AtomicU64,
    /// Total requests dispatched to a command
    pub requests_processed: AtomicU64,
    /// Total bytes read
    pub bytes_read: AtomicU64,
    /// Total bytes written
    pub bytes_written: AtomicU64,
}

impl ConnectionStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connection_opened(&self) {
        self.connections_accepted.fetch_add(1, Ordering::Relaxed);
        self.active_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn request_processed(&self) {
        self.requests_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn bytes_read(&self, count: usize) {
        self.bytes_read.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn bytes_written(&self, count: usize) {
        self.bytes_written
            .fetch_add(count as u64, Ordering::Relaxed);
    }
}

/// Handles a single client connection.
///
/// This struct owns the receive buffer, the framer and the outgoing stream
/// for one connected client. It is generic over the stream so it can run on
/// a `TcpStream` or on any other `AsyncRead + AsyncWrite` transport.
pub struct ConnectionHandler<S> {
    /// The client stream, buffered for writing
    stream: BufWriter<S>,

    /// Client's address (for logging)
    addr: SocketAddr,

    /// Bytes received but not yet framed into a request
    buffer: BytesMut,

    /// Request framer
    framer: RequestFramer,

    /// The command handler
    command_handler: CommandHandler,

    /// Connection settings
    config: ConnectionConfig,

    /// False once the connection must end
    connected: bool,

    /// Connection statistics (shared)
    stats: Arc<ConnectionStats>,
}

impl<S> ConnectionHandler<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Creates a new connection handler.
    ///
    /// # Arguments
    ///
    /// * `stream` - The client stream for this connection
    /// * `addr` - The client's socket address
    /// * `command_handler` - The command handler for executing requests
    /// * `config` - Idle timeout and request size limit
    /// * `stats` - Shared connection statistics
    pub fn new(
        stream: S,
        addr: SocketAddr,
        command_handler: CommandHandler,
        config: ConnectionConfig,
        stats: Arc<ConnectionStats>,
    ) -> Self {
        Self {
            stream: BufWriter::new(stream),
            addr,
            buffer: BytesMut::with_capacity(INITIAL_BUFFER_SIZE),
            framer: RequestFramer::new(config.max_request_size),
            command_handler,
            config,
            connected: true,
            stats,
        }
    }

    /// Runs the connection until it ends.
    ///
    /// Returns `Ok(())` when the server ended the connection (`quit` or a
    /// fatal status) and an error when the transport did. Either way the
    /// stream is shut down exactly once before returning.
    pub async fn run(mut self) -> Result<(), ConnectionError> {
        self.stats.connection_opened();
        info!(client = %self.addr, "Client connected");

        let result = self.main_loop().await;

        match &result {
            Ok(()) => info!(client = %self.addr, "Connection closed by server"),
            Err(e) => match e {
                ConnectionError::ClientDisconnected => {
                    info!(client = %self.addr, "Client disconnected")
                }
                ConnectionError::IdleTimeout(idle) => {
                    warn!(client = %self.addr, idle_secs = idle.as_secs(), "Connection timed out")
                }
                ConnectionError::IoError(io_err)
                    if io_err.kind() == std::io::ErrorKind::ConnectionReset =>
                {
                    debug!(client = %self.addr, "Connection reset by client")
                }
                _ => warn!(client = %self.addr, error = %e, "Connection error"),
            },
        }

        // Every response is flushed as it is sent; anything still buffered
        // belongs to a failed write and must not be retried
        self.connected = false;
        if let Err(e) = self.stream.get_mut().shutdown().await {
            trace!(client = %self.addr, error = %e, "Shutdown failed");
        }

        self.stats.connection_closed();
        result
    }

    /// The main read-execute-respond loop.
    async fn main_loop(&mut self) -> Result<(), ConnectionError> {
        while self.connected {
            self.read_more_data().await?;
            self.process_buffer().await?;
        }
        Ok(())
    }

    /// Frames and answers every complete request in the buffer.
    async fn process_buffer(&mut self) -> Result<(), ConnectionError> {
        while self.connected {
            let line = match self.framer.next_request(&mut self.buffer) {
                Ok(Some(line)) => line,
                Ok(None) => {
                    trace!(
                        client = %self.addr,
                        buffered = self.buffer.len(),
                        "Incomplete request, need more data"
                    );
                    break;
                }
                Err(e) => {
                    warn!(client = %self.addr, error = %e, "Framing error");
                    self.respond(Response::Error(e.status())).await?;
                    break;
                }
            };

            let request = match Request::parse(&line) {
                Some(request) => request,
                None => {
                    trace!(client = %self.addr, "Ignoring empty request");
                    continue;
                }
            };

            debug!(client = %self.addr, request = %line, "Request");
            let response = self.command_handler.execute(&request).await;
            self.stats.request_processed();

            self.respond(response).await?;
        }
        Ok(())
    }

    /// Reads more data from the socket into the buffer.
    ///
    /// The idle timeout applies only while no part of a request is
    /// buffered, so a client that is mid-request is never cut off.
    async fn read_more_data(&mut self) -> Result<(), ConnectionError> {
        // Ensure we have some capacity
        if self.buffer.capacity() - self.buffer.len() < 1024 {
            self.buffer.reserve(INITIAL_BUFFER_SIZE);
        }

        let start = self.buffer.len();
        let idle = self.buffer.is_empty();
        let idle_timeout = self.config.idle_timeout;

        let read = self.stream.get_mut().read_buf(&mut self.buffer);
        let n = if idle {
            tokio::time::timeout(idle_timeout, read)
                .await
                .map_err(|_| ConnectionError::IdleTimeout(idle_timeout))??
        } else {
            read.await?
        };

        if n == 0 {
            // Connection closed by client
            if self.buffer.is_empty() {
                return Err(ConnectionError::ClientDisconnected);
            } else {
                // Partial request in buffer
                return Err(ConnectionError::UnexpectedEof);
            }
        }

        self.stats.bytes_read(n);
        trace!(client = %self.addr, bytes = n, "Read data");

        if let Err(e) = RequestFramer::check_chunk(&self.buffer[start..]) {
            warn!(client = %self.addr, error = %e, "Malformed request");
            self.buffer.truncate(start);
            self.respond(Response::Error(e.status())).await?;
        }

        Ok(())
    }

    /// Sends a response to the client, ending the connection if the response
    /// demands it.
    async fn respond(&mut self, response: Response) -> Result<(), ConnectionError> {
        let bytes = response.serialize();
        self.stream.write_all(&bytes).await?;
        self.stream.flush().await?;
        self.stats.bytes_written(bytes.len());
        trace!(
            client = %self.addr,
            status = response.status().code(),
            bytes = bytes.len(),
            "Sent response"
        );

        if response.closes_connection() {
            if response.status().is_fatal() {
                warn!(client = %self.addr, status = %response.status(), "Fatal status sent");
            }
            self.connected = false;
        }
        Ok(())
    }
}

/// Errors that end a connection from the transport side.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// I/O error (network issue)
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Client disconnected between requests
    #[error("Client disconnected")]
    ClientDisconnected,

    /// Unexpected end of stream (partial request)
    #[error("Unexpected end of stream")]
    UnexpectedEof,

    /// No request arrived within the idle timeout
    #[error("Idle for {0:?}")]
    IdleTimeout(Duration),
}

/// Handles a client connection.
///
/// This is a convenience function that creates a ConnectionHandler
/// and runs it to completion.
///
/// # Arguments
///
/// * `stream` - The client stream for this connection
/// * `addr` - The client's socket address
/// * `command_handler` - The command handler for executing requests
/// * `config` - Idle timeout and request size limit
/// * `stats` - Shared connection statistics
pub async fn handle_connection<S>(
    stream: S,
    addr: SocketAddr,
    command_handler: CommandHandler,
    config: ConnectionConfig,
    stats: Arc<ConnectionStats>,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let handler = ConnectionHandler::new(stream, addr, command_handler, config, stats);
    if let Err(e) = handler.run().await {
        debug!(client = %addr, error = %e, "Connection ended by transport");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::FileStore;
    use tempfile::TempDir;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};
    use tokio_test::io::{Builder, Mock};

    fn create_serving_dir() -> TempDir {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.txt"), b"abcd").unwrap();
        std::fs::write(dir.path().join("b.txt"), b"hello").unwrap();
        dir
    }

    fn client_addr() -> SocketAddr {
        "127.0.0.1:40000".parse().unwrap()
    }

    fn mock_handler(
        dir: &TempDir,
        mock: Mock,
        config: ConnectionConfig,
    ) -> ConnectionHandler<Mock> {
        let handler = CommandHandler::new(Arc::new(FileStore::new(dir.path())));
        let stats = Arc::new(ConnectionStats::new());
        ConnectionHandler::new(mock, client_addr(), handler, config, stats)
    }

    async fn run_mock(mock: Mock) -> Result<(), ConnectionError> {
        let dir = create_serving_dir();
        mock_handler(&dir, mock, ConnectionConfig::default())
            .run()
            .await
    }

    #[tokio::test]
    async fn test_quit() {
        let mock = Builder::new().read(b"quit\r\n").write(b"0 OK \r\n").build();
        assert!(run_mock(mock).await.is_ok());
    }

    #[tokio::test]
    async fn test_pipelined_requests() {
        let mock = Builder::new()
            .read(b"get_metadata a.txt\r\nget_slice a.txt 1 2\r\nquit\r\n")
            .write(b"0 OK \r\n4\r\n")
            .write(b"0 OK \r\nYmM=\r\n")
            .write(b"0 OK \r\n")
            .build();
        assert!(run_mock(mock).await.is_ok());
    }

    #[tokio::test]
    async fn test_get_file_listing() {
        let mock = Builder::new()
            .read(b"get_file_listing\r\nquit\r\n")
            .write(b"0 OK \r\na.txt\r\nb.txt\r\n\r\n")
            .write(b"0 OK \r\n")
            .build();
        assert!(run_mock(mock).await.is_ok());
    }

    #[tokio::test]
    async fn test_request_split_across_reads() {
        let mock = Builder::new()
            .read(b"get_meta")
            .read(b"data b.txt\r")
            .read(b"\nqu")
            .write(b"0 OK \r\n5\r\n")
            .read(b"it\r\n")
            .write(b"0 OK \r\n")
            .build();
        assert!(run_mock(mock).await.is_ok());
    }

    #[tokio::test]
    async fn test_empty_requests_are_ignored() {
        let mock = Builder::new()
            .read(b"\r\n   \r\nquit\r\n")
            .write(b"0 OK \r\n")
            .build();
        assert!(run_mock(mock).await.is_ok());
    }

    #[tokio::test]
    async fn test_vertical_tab_is_whitespace() {
        let mock = Builder::new()
            .read(b"get_metadata\x0ba.txt\r\nquit\x0b\r\n")
            .write(b"0 OK \r\n4\r\n")
            .write(b"0 OK \r\n")
            .build();
        assert!(run_mock(mock).await.is_ok());
    }

    #[tokio::test]
    async fn test_non_fatal_errors_keep_connection() {
        let mock = Builder::new()
            .read(b"get_everything\r\nquit now\r\nget_metadata c.txt\r\n")
            .write(b"200 NO SUCH COMMAND \r\n")
            .write(b"201 INVALID ARGUMENTS FOR COMMAND \r\n")
            .write(b"202 FILE NOT FOUND \r\n")
            .read(b"get_slice a.txt 3 2\r\nquit\r\n")
            .write(b"203 OFFSET EXCEEDS FILE SIZE \r\n")
            .write(b"0 OK \r\n")
            .build();
        assert!(run_mock(mock).await.is_ok());
    }

    #[tokio::test]
    async fn test_bad_eol_closes_connection() {
        // The quit after the bad line is never answered
        let mock = Builder::new()
            .read(b"get_file\nlisting\r\nquit\r\n")
            .write(b"100 BAD EOL \r\n")
            .build();
        assert!(run_mock(mock).await.is_ok());
    }

    #[tokio::test]
    async fn test_non_ascii_closes_connection() {
        let mock = Builder::new()
            .read(b"get_metadata \xffa.txt\r\n")
            .write(b"101 BAD REQUEST \r\n")
            .build();
        assert!(run_mock(mock).await.is_ok());
    }

    #[tokio::test]
    async fn test_oversized_request_closes_connection() {
        let dir = create_serving_dir();
        let config = ConnectionConfig {
            max_request_size: 16,
            ..ConnectionConfig::default()
        };
        let mock = Builder::new()
            .read(b"get_metadata aaaaaaaaaaaaaaaaaaaa")
            .write(b"101 BAD REQUEST \r\n")
            .build();
        assert!(mock_handler(&dir, mock, config).run().await.is_ok());
    }

    #[tokio::test]
    async fn test_internal_error_closes_connection() {
        let dir = create_serving_dir();
        let handler = CommandHandler::new(Arc::new(FileStore::new(dir.path().join("gone"))));
        let mock = Builder::new()
            .read(b"get_file_listing\r\nquit\r\n")
            .write(b"199 INTERNAL SERVER ERROR \r\n")
            .build();

        let stats = Arc::new(ConnectionStats::new());
        let connection = ConnectionHandler::new(
            mock,
            client_addr(),
            handler,
            ConnectionConfig::default(),
            stats,
        );
        assert!(connection.run().await.is_ok());
    }

    #[tokio::test]
    async fn test_client_disconnect() {
        let mock = Builder::new()
            .read(b"get_metadata a.txt\r\n")
            .write(b"0 OK \r\n4\r\n")
            .build();
        assert!(matches!(
            run_mock(mock).await,
            Err(ConnectionError::ClientDisconnected)
        ));
    }

    #[tokio::test]
    async fn test_disconnect_mid_request() {
        let mock = Builder::new().read(b"get_meta").build();
        assert!(matches!(
            run_mock(mock).await,
            Err(ConnectionError::UnexpectedEof)
        ));
    }

    async fn create_test_server(
        dir: &TempDir,
        config: ConnectionConfig,
    ) -> (SocketAddr, Arc<ConnectionStats>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let store = Arc::new(FileStore::new(dir.path()));
        let stats = Arc::new(ConnectionStats::new());

        let stats_clone = Arc::clone(&stats);

        tokio::spawn(async move {
            while let Ok((stream, client_addr)) = listener.accept().await {
                let handler = CommandHandler::new(Arc::clone(&store));
                let stats = Arc::clone(&stats_clone);
                tokio::spawn(handle_connection(stream, client_addr, handler, config, stats));
            }
        });

        (addr, stats)
    }

    /// Reads until the server closes the connection or `timeout` elapses.
    async fn read_to_close(client: &mut TcpStream, timeout: Duration) -> Vec<u8> {
        let mut received = Vec::new();
        tokio::time::timeout(timeout, client.read_to_end(&mut received))
            .await
            .expect("server did not close the connection")
            .unwrap();
        received
    }

    #[tokio::test]
    async fn test_tcp_session() {
        let dir = create_serving_dir();
        let (addr, _) = create_test_server(&dir, ConnectionConfig::default()).await;

        let mut client = TcpStream::connect(addr).await.unwrap();
        client
            .write_all(b"get_slice b.txt 0 5\r\nquit\r\n")
            .await
            .unwrap();

        let received = read_to_close(&mut client, Duration::from_secs(2)).await;
        assert_eq!(received, b"0 OK \r\naGVsbG8=\r\n0 OK \r\n");
    }

    #[tokio::test]
    async fn test_idle_connection_is_dropped_silently() {
        let dir = create_serving_dir();
        let config = ConnectionConfig {
            idle_timeout: Duration::from_millis(100),
            ..ConnectionConfig::default()
        };
        let (addr, stats) = create_test_server(&dir, config).await;

        let mut client = TcpStream::connect(addr).await.unwrap();
        let received = read_to_close(&mut client, Duration::from_secs(2)).await;
        assert!(received.is_empty());

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(stats.active_connections.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn test_slow_request_is_not_cut_off() {
        let dir = create_serving_dir();
        let config = ConnectionConfig {
            idle_timeout: Duration::from_millis(100),
            ..ConnectionConfig::default()
        };
        let (addr, _) = create_test_server(&dir, config).await;

        let mut client = TcpStream::connect(addr).await.unwrap();
        client.write_all(b"get_meta").await.unwrap();
        tokio::time::sleep(Duration::from_millis(300)).await;
        client.write_all(b"data a.txt\r\nquit\r\n").await.unwrap();

        let received = read_to_close(&mut client, Duration::from_secs(2)).await;
        assert_eq!(received, b"0 OK \r\n4\r\n0 OK \r\n");
    }

    #[tokio::test]
    async fn test_connection_stats() {
        let dir = create_serving_dir();
        let (addr, stats) = create_test_server(&dir, ConnectionConfig::default()).await;

        assert_eq!(stats.active_connections.load(Ordering::Relaxed), 0);

        let mut client = TcpStream::connect(addr).await.unwrap();

        // Give the server time to accept the connection
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(stats.connections_accepted.load(Ordering::Relaxed), 1);
        assert_eq!(stats.active_connections.load(Ordering::Relaxed), 1);

        client.write_all(b"get_metadata a.txt\r\n").await.unwrap();
        let mut buf = [0u8; 64];
        let _ = client.read(&mut buf).await.unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(stats.requests_processed.load(Ordering::Relaxed), 1);
        assert!(stats.bytes_read.load(Ordering::Relaxed) > 0);
        assert!(stats.bytes_written.load(Ordering::Relaxed) > 0);

        // Close connection
        drop(client);

        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(stats.active_connections.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn test_stats_count_only_run_handlers() {
        let dir = create_serving_dir();
        let stats = Arc::new(ConnectionStats::new());
        let new_handler = |mock: Mock| {
            let handler = CommandHandler::new(Arc::new(FileStore::new(dir.path())));
            ConnectionHandler::new(
                mock,
                client_addr(),
                handler,
                ConnectionConfig::default(),
                Arc::clone(&stats),
            )
        };

        drop(new_handler(Builder::new().build()));
        assert_eq!(stats.connections_accepted.load(Ordering::Relaxed), 0);
        assert_eq!(stats.active_connections.load(Ordering::Relaxed), 0);

        let mock = Builder::new().read(b"quit\r\n").write(b"0 OK \r\n").build();
        assert!(new_handler(mock).run().await.is_ok());
        assert_eq!(stats.connections_accepted.load(Ordering::Relaxed), 1);
        assert_eq!(stats.active_connections.load(Ordering::Relaxed), 0);
    }
}
