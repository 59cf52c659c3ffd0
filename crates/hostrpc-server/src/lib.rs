//! hostrpc Server
//!
//! This crate provides the host side of a hostrpc connection: the module
//! registry, capability exposure and the per-connection [`Host`] that
//! instantiates, mounts and unmounts modules.

pub mod context;
pub mod host;
pub mod module;
pub mod registry;
pub mod subscribable;

pub use context::ModuleContext;
pub use host::{Host, HostState};
pub use module::{ExposedMethods, HookFuture, Module, ModuleRef};
pub use registry::{AnyModule, ModuleDescriptor, Registry};
pub use subscribable::{publish, subscribable_methods, SubscribableModule, Subscriptions};
