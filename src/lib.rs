//! hostrpc
//!
//! Modules hosted over a bidirectional message channel. A host exposes
//! named modules; a client loads them, calls their methods and subscribes
//! to their events.
//!
//! - [`common`]: wire protocol, transports and the RPC engine
//! - [`server`]: module registry, capability exposure and the Host
//! - [`client`]: client connection, remote module handles and subscriptions
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use hostrpc::client::RpcClient;
//! use hostrpc::common::{MemoryTransport, Result};
//! use hostrpc::server::{ExposedMethods, Host, Module, ModuleContext, Registry};
//! use serde_json::json;
//!
//! struct Greeter;
//!
//! impl Module for Greeter {
//!     fn create(_ctx: ModuleContext) -> Result<Self> {
//!         Ok(Greeter)
//!     }
//!
//!     fn exposed_methods() -> ExposedMethods<Self> {
//!         ExposedMethods::new().method("hello", |_, name| async move {
//!             Ok(json!(format!("hello {}", name.as_str().unwrap_or("stranger"))))
//!         })
//!     }
//! }
//!
//! # #[tokio::main]
//! # async fn main() -> Result<()> {
//! let registry = Arc::new(Registry::new().with::<Greeter>("Greeter")?);
//! let (host_side, client_side) = MemoryTransport::pair();
//!
//! let host = Host::new(host_side, registry)?;
//! host.enable();
//!
//! let client = RpcClient::new(client_side)?;
//! let greeter = client.load_modules(&["Greeter"]).await?.remove(0);
//! assert_eq!(greeter.call("hello", json!("world")).await?, json!("hello world"));
//! # Ok(())
//! # }
//! ```

pub use hostrpc_client as client;
pub use hostrpc_common as common;
pub use hostrpc_server as server;

pub use hostrpc_client::{EventSubscriber, RemoteModule, RpcClient};
pub use hostrpc_common::{Connection, HostRpcError, Result, Transport};
pub use hostrpc_server::{Host, Module, Registry};
