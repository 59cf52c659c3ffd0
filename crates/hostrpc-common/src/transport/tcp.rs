use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::Notify;

use super::{Transport, TransportEvent};
use crate::protocol::error::{HostRpcError, Result};

/// Default maximum frame size (100 MB)
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 100 * 1024 * 1024;

/// Default timeout for establishing a connection (5 seconds)
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// TCP transport configuration.
///
/// # Default Configuration
///
/// - `max_message_size`: 100 MB
/// - `connect_timeout`: 5 seconds
///
/// # Example
///
/// ```rust
/// use hostrpc_common::transport::TcpConfig;
/// use std::time::Duration;
///
/// let config = TcpConfig::default()
///     .with_max_message_size(1024 * 1024)
///     .with_connect_timeout(Duration::from_secs(1));
/// assert_eq!(config.max_message_size, 1024 * 1024);
/// ```
#[derive(Debug, Clone)]
pub struct TcpConfig {
    /// Largest frame accepted in either direction
    pub max_message_size: usize,
    /// Upper bound on establishing the connection
    pub connect_timeout: Duration,
}

impl Default for TcpConfig {
    fn default() -> Self {
        Self {
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

impl TcpConfig {
    pub fn with_max_message_size(mut self, max_message_size: usize) -> Self {
        self.max_message_size = max_message_size;
        self
    }

    pub fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }
}

enum Outbound {
    Frame(String),
    Shutdown,
}

/// Transport over one TCP stream.
///
/// # Wire Protocol
///
/// Every message is one frame: a 4-byte length prefix (big-endian u32)
/// followed by the UTF-8 encoded message:
///
/// ```text
/// [4-byte length] [UTF-8 JSON]
/// ```
///
/// A reader task turns frames into [`TransportEvent::Message`]; a writer
/// task drains outgoing frames in order. End of stream and read failures
/// surface as [`TransportEvent::Closed`] (a failure is reported as
/// [`TransportEvent::Error`] first).
///
/// # Example
///
/// ```no_run
/// use hostrpc_common::transport::{TcpConfig, TcpTransport, Transport};
///
/// # #[tokio::main]
/// # async fn main() -> hostrpc_common::Result<()> {
/// let transport = TcpTransport::connect("127.0.0.1:7400", TcpConfig::default()).await?;
/// transport.send_message(r#"{"method":"ping"}"#.to_string())?;
/// # Ok(())
/// # }
/// ```
pub struct TcpTransport {
    outbound: UnboundedSender<Outbound>,
    events: UnboundedSender<TransportEvent>,
    inbound: Mutex<Option<UnboundedReceiver<TransportEvent>>>,
    closed: Arc<AtomicBool>,
    shutdown: Arc<Notify>,
    max_message_size: usize,
    peer_addr: Option<SocketAddr>,
}

impl TcpTransport {
    /// Connects to a remote endpoint.
    ///
    /// The address may resolve to several socket addresses; each is tried
    /// in turn until one accepts within `config.connect_timeout`.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The address cannot be resolved
    /// - Connection fails (or times out) for every resolved address
    pub async fn connect(addr: &str, config: TcpConfig) -> Result<Self> {
        let socket_addrs = addr
            .to_socket_addrs()
            .map_err(|e| HostRpcError::Transport(format!("Invalid address '{}': {}", addr, e)))?;

        let mut last_err = None;
        for socket_addr in socket_addrs {
            match tokio::time::timeout(config.connect_timeout, TcpStream::connect(socket_addr)).await {
                Ok(Ok(stream)) => return Ok(Self::from_stream(stream, config)),
                Ok(Err(e)) => last_err = Some(e.to_string()),
                Err(_) => {
                    last_err = Some(format!(
                        "timed out after {}ms",
                        config.connect_timeout.as_millis()
                    ))
                }
            }
        }

        Err(HostRpcError::Transport(format!(
            "Failed to connect to {}: {}",
            addr,
            last_err.unwrap_or_else(|| "no addresses resolved".to_string())
        )))
    }

    /// Wraps an established stream. Must be called inside a tokio runtime.
    pub fn from_stream(stream: TcpStream, config: TcpConfig) -> Self {
        let peer_addr = stream.peer_addr().ok();
        let _ = stream.set_nodelay(true);
        let (reader, writer) = stream.into_split();

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let closed = Arc::new(AtomicBool::new(false));
        let shutdown = Arc::new(Notify::new());

        tokio::spawn(read_loop(
            reader,
            config.max_message_size,
            events_tx.clone(),
            closed.clone(),
            shutdown.clone(),
        ));
        tokio::spawn(write_loop(writer, outbound_rx, events_tx.clone()));

        Self {
            outbound: outbound_tx,
            events: events_tx,
            inbound: Mutex::new(Some(events_rx)),
            closed,
            shutdown,
            max_message_size: config.max_message_size,
            peer_addr,
        }
    }

    /// Address of the remote end, when the socket could report it.
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer_addr
    }
}

impl Transport for TcpTransport {
    fn send_message(&self, message: String) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(HostRpcError::Transport("tcp transport is closed".into()));
        }
        if message.len() > self.max_message_size {
            return Err(HostRpcError::Transport(format!(
                "Message too large: {} bytes (max {} bytes)",
                message.len(),
                self.max_message_size
            )));
        }
        self.outbound
            .send(Outbound::Frame(message))
            .map_err(|_| HostRpcError::Transport("tcp writer has stopped".into()))
    }

    fn incoming(&self) -> Result<UnboundedReceiver<TransportEvent>> {
        self.inbound
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or_else(|| HostRpcError::Transport("inbound stream already taken".into()))
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        tracing::debug!(peer = ?self.peer_addr, "closing tcp transport");
        let _ = self.outbound.send(Outbound::Shutdown);
        self.shutdown.notify_one();
        let _ = self.events.send(TransportEvent::Closed);
    }
}

async fn read_loop<R: AsyncRead + Unpin>(
    mut reader: R,
    max_message_size: usize,
    events: UnboundedSender<TransportEvent>,
    closed: Arc<AtomicBool>,
    shutdown: Arc<Notify>,
) {
    loop {
        let frame = tokio::select! {
            _ = shutdown.notified() => return,
            frame = read_frame(&mut reader, max_message_size) => frame,
        };

        match frame {
            Ok(Some(data)) => {
                let event = match String::from_utf8(data) {
                    Ok(message) => TransportEvent::Message(message),
                    Err(e) => TransportEvent::Error(format!("frame is not valid UTF-8: {}", e)),
                };
                if events.send(event).is_err() {
                    return;
                }
            }
            Ok(None) => break,
            Err(e) => {
                let _ = events.send(TransportEvent::Error(e.to_string()));
                break;
            }
        }
    }

    if !closed.swap(true, Ordering::SeqCst) {
        let _ = events.send(TransportEvent::Closed);
    }
}

async fn write_loop<W: AsyncWrite + Unpin>(
    mut writer: W,
    mut outbound: UnboundedReceiver<Outbound>,
    events: UnboundedSender<TransportEvent>,
) {
    while let Some(item) = outbound.recv().await {
        match item {
            Outbound::Frame(message) => {
                if let Err(e) = write_frame(&mut writer, message.as_bytes()).await {
                    let _ = events.send(TransportEvent::Error(e.to_string()));
                    return;
                }
            }
            Outbound::Shutdown => break,
        }
    }
    let _ = writer.shutdown().await;
}

/// Writes one frame with its length prefix.
///
/// Wire format: `[4-byte length as u32 big-endian] + [data]`
pub async fn write_frame<W: AsyncWrite + Unpin>(writer: &mut W, data: &[u8]) -> Result<()> {
    let len = u32::try_from(data.len())
        .map_err(|_| HostRpcError::Transport(format!("Message too large: {} bytes", data.len())))?;

    writer
        .write_all(&len.to_be_bytes())
        .await
        .map_err(|e| map_io_error(e, "writing length prefix"))?;
    writer
        .write_all(data)
        .await
        .map_err(|e| map_io_error(e, "writing data"))?;
    writer
        .flush()
        .await
        .map_err(|e| map_io_error(e, "flushing stream"))?;

    Ok(())
}

/// Reads one frame; `Ok(None)` means the peer closed cleanly between frames.
///
/// # Errors
///
/// Returns an error if:
/// - The stream ends in the middle of a frame
/// - The frame exceeds `max_message_size`
/// - Reading fails
pub async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R, max_message_size: usize) -> Result<Option<Vec<u8>>> {
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(map_io_error(e, "reading length prefix")),
    }

    let len = u32::from_be_bytes(len_buf) as usize;

    // Validate length to prevent allocation of excessively large buffers
    if len > max_message_size {
        return Err(HostRpcError::Transport(format!(
            "Message too large: {} bytes (max {} bytes)",
            len, max_message_size
        )));
    }

    let mut buf = vec![0u8; len];
    reader
        .read_exact(&mut buf)
        .await
        .map_err(|e| map_io_error(e, "reading data"))?;

    Ok(Some(buf))
}

/// Map IO errors to transport errors
///
/// - Connection errors -> `Transport` with "Connection lost"
/// - Other IO errors -> `Io`
fn map_io_error(err: std::io::Error, context: &str) -> HostRpcError {
    match err.kind() {
        std::io::ErrorKind::ConnectionReset
        | std::io::ErrorKind::ConnectionAborted
        | std::io::ErrorKind::BrokenPipe
        | std::io::ErrorKind::NotConnected
        | std::io::ErrorKind::UnexpectedEof => {
            HostRpcError::Transport(format!("{}: Connection lost", context))
        }
        _ => HostRpcError::Io(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_frame_round_trip() {
        let (mut client, mut server) = tokio::io::duplex(64);
        write_frame(&mut client, b"{\"method\":\"a\"}").await.unwrap();
        let frame = read_frame(&mut server, 1024).await.unwrap();
        assert_eq!(frame.as_deref(), Some(&b"{\"method\":\"a\"}"[..]));
    }

    #[tokio::test]
    async fn test_clean_eof_is_none() {
        let (client, mut server) = tokio::io::duplex(64);
        drop(client);
        assert!(read_frame(&mut server, 1024).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_oversized_frame_is_rejected() {
        let (mut client, mut server) = tokio::io::duplex(64);
        client.write_all(&(2048u32).to_be_bytes()).await.unwrap();
        let err = read_frame(&mut server, 1024).await.unwrap_err();
        assert!(err.to_string().contains("too large"));
    }

    #[tokio::test]
    async fn test_truncated_frame_is_connection_lost() {
        let (mut client, mut server) = tokio::io::duplex(64);
        client.write_all(&(10u32).to_be_bytes()).await.unwrap();
        client.write_all(b"abc").await.unwrap();
        drop(client);
        let err = read_frame(&mut server, 1024).await.unwrap_err();
        assert!(err.to_string().contains("Connection lost"));
    }

    #[test]
    fn test_config_defaults() {
        let config = TcpConfig::default();
        assert_eq!(config.max_message_size, DEFAULT_MAX_MESSAGE_SIZE);
        assert_eq!(config.connect_timeout, DEFAULT_CONNECT_TIMEOUT);
    }

    #[tokio::test]
    async fn test_connect_to_unresolvable_address_fails() {
        let result = TcpTransport::connect("not an address", TcpConfig::default()).await;
        assert!(matches!(result, Err(HostRpcError::Transport(_))));
    }
}
