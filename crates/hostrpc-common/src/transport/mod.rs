//! Transport Layer
//!
//! The engine only needs a duplex channel of opaque strings. This module
//! defines that contract and ships two adapters for it.
//!
//! # Components
//!
//! - **[`Transport`]**: the contract (send, take the inbound stream, close)
//! - **[`JsonCodec`]**: envelope <-> string conversion
//! - **[`MemoryTransport`]**: cross-wired in-process pair
//! - **[`TcpTransport`]** / **[`TcpServer`]**: length-prefixed frames over TCP
//!
//! # Example
//!
//! ```
//! use hostrpc_common::transport::{MemoryTransport, Transport, TransportEvent};
//!
//! # #[tokio::main]
//! # async fn main() -> hostrpc_common::Result<()> {
//! let (left, right) = MemoryTransport::pair();
//! let mut inbound = right.incoming()?;
//!
//! left.send_message("hello".to_string())?;
//! assert_eq!(inbound.recv().await, Some(TransportEvent::Message("hello".into())));
//! # Ok(())
//! # }
//! ```

pub mod codec;
pub mod memory;
pub mod tcp;
pub mod tcp_server;

pub use codec::JsonCodec;
pub use memory::MemoryTransport;
pub use tcp::{TcpConfig, TcpTransport};
pub use tcp_server::TcpServer;

use tokio::sync::mpsc::UnboundedReceiver;

use crate::protocol::error::Result;

/// Something the transport reports to its owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// One complete message from the peer
    Message(String),
    /// A non-fatal transport failure
    Error(String),
    /// The channel is gone; no further events follow
    Closed,
}

/// Duplex channel of opaque string messages.
///
/// Implementations own the medium; the connection that owns a transport
/// never looks past this trait.
pub trait Transport: Send + Sync + 'static {
    /// Sends one message to the peer.
    fn send_message(&self, message: String) -> Result<()>;

    /// Hands over the inbound event stream.
    ///
    /// The stream can be taken once; later calls fail with
    /// [`HostRpcError::Transport`](crate::HostRpcError::Transport).
    fn incoming(&self) -> Result<UnboundedReceiver<TransportEvent>>;

    /// Closes the channel. Idempotent.
    fn close(&self);
}
