//! hostrpc Client
//!
//! Client side of a hostrpc connection: asking the host to load modules,
//! calling their methods through [`RemoteModule`] handles and subscribing to
//! their events through the ref-counted [`EventSubscriber`].

pub mod client;
pub mod remote;
pub mod subscriber;

pub use client::RpcClient;
pub use remote::RemoteModule;
pub use subscriber::EventSubscriber;
