//! hostrpc Common Types, Transports and RPC Engine
//!
//! This crate provides the wire protocol, the transport contract and the
//! connection engine shared by both sides of a hostrpc connection.
//!
//! # Overview
//!
//! hostrpc lets a host expose named modules over a bidirectional message
//! channel. A client asks the host to load modules, calls their exposed
//! methods and subscribes to their events. This crate contains the pieces
//! both ends need:
//!
//! - **Protocol Layer**: envelopes (request, response, notification), error
//!   taxonomy and built-in method names
//! - **Transport Layer**: the [`Transport`](transport::Transport) contract,
//!   the JSON codec, in-memory and TCP adapters
//! - **Connection**: call correlation, request dispatch and the local event bus
//!
//! # Architecture
//!
//! - **Serialization**: JSON, one envelope per transport message
//! - **Envelope**: `{id?, method?, params?, result?, error?}`
//! - **TCP framing**: `[4-byte length prefix as u32 big-endian] + [JSON data]`
//! - **Max Message Size**: 100 MB by default
//!
//! # Components
//!
//! - [`protocol`] - Envelope types, errors and built-in names
//! - [`transport`] - Transport contract, codec and adapters
//! - [`connection`] - The RPC engine
//!
//! # Example
//!
//! ```
//! use hostrpc_common::{Connection, HostRpcError, MemoryTransport};
//! use serde_json::json;
//!
//! # #[tokio::main]
//! # async fn main() -> hostrpc_common::Result<()> {
//! let (left, right) = MemoryTransport::pair();
//! let server = Connection::new(left)?;
//! let client = Connection::new(right)?;
//!
//! server.expose("fail", |_| async { Err(HostRpcError::handler("boom")) });
//! server.enable();
//! client.enable();
//!
//! let err = client.call("fail", json!(null)).await.unwrap_err();
//! assert_eq!(err.to_string(), "boom");
//! # Ok(())
//! # }
//! ```

pub mod connection;
pub mod protocol;
pub mod transport;

pub use connection::{Connection, ConnectionState, ListenerId, WeakConnection};
pub use protocol::*;
pub use transport::{MemoryTransport, TcpConfig, TcpServer, TcpTransport, Transport, TransportEvent};
