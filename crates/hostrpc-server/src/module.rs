//! Modules and Capability Exposure
//!
//! A module is a type implementing [`Module`]. Its remotely callable methods
//! are declared in a table returned by [`Module::exposed_methods`]; the Host
//! binds that table to the live instance and exposes every entry as
//! `"<apiName>.<method>"`.
//!
//! # Inheritance
//!
//! Shared behavior is modelled with traits. A trait that wants to contribute
//! exposed methods ships a generic table builder (see
//! [`subscribable_methods`](crate::subscribable::subscribable_methods)); an
//! implementor starts from that table and extends it. Adding an entry whose
//! name already exists overrides the inherited one while keeping it exposed.
//!
//! # Example
//!
//! ```
//! use hostrpc_common::{single_param, Result};
//! use hostrpc_server::{ExposedMethods, Module, ModuleContext};
//! use serde_json::{json, Value};
//!
//! struct Greeter;
//!
//! impl Greeter {
//!     fn greet(&self, params: Value) -> Result<Value> {
//!         let name: String = single_param(params)?;
//!         Ok(json!(format!("hello {}", name)))
//!     }
//! }
//!
//! impl Module for Greeter {
//!     fn create(_ctx: ModuleContext) -> Result<Self> {
//!         Ok(Greeter)
//!     }
//!
//!     fn exposed_methods() -> ExposedMethods<Self> {
//!         ExposedMethods::new().method("greet", |this: std::sync::Arc<Self>, params| async move { this.greet(params) })
//!     }
//! }
//!
//! assert_eq!(Greeter::exposed_methods().names(), vec!["greet"]);
//! ```

use std::any::TypeId;
use std::future::Future;
use std::sync::{Arc, Weak};

use futures_util::future::{BoxFuture, FutureExt};
use hostrpc_common::connection::{Handler, HandlerFuture};
use hostrpc_common::{HostRpcError, Result};
use serde_json::Value;

use crate::context::ModuleContext;

/// Future returned by the lifecycle hooks of a [`Module`].
pub type HookFuture = BoxFuture<'static, Result<()>>;

/// A module that a Host can instantiate and expose.
///
/// Lifecycle hooks return a future. One that is already complete on its
/// first poll finishes in place, before the Host moves on; anything still
/// waiting continues on a spawned task. A hook that fails is reported on
/// the host's `error` event and never stops other modules from mounting or
/// unmounting.
///
/// ```
/// use std::sync::Arc;
/// use hostrpc_common::Result;
/// use hostrpc_server::{HookFuture, Module, ModuleContext};
/// use serde_json::Value;
///
/// struct Warmup {
///     ctx: ModuleContext,
/// }
///
/// impl Module for Warmup {
///     fn create(ctx: ModuleContext) -> Result<Self> {
///         Ok(Warmup { ctx })
///     }
///
///     fn api_did_mount(self: Arc<Self>) -> HookFuture {
///         Box::pin(async move {
///             tokio::task::yield_now().await;
///             self.ctx.emit("ready", &Value::Null);
///             Ok(())
///         })
///     }
/// }
/// ```
pub trait Module: Send + Sync + Sized + 'static {
    /// Builds the instance. `ctx` is namespaced to the module's api name.
    fn create(ctx: ModuleContext) -> Result<Self>;

    /// Methods callable by the peer. A module without any is still valid
    /// (useful as a namespace for events only).
    fn exposed_methods() -> ExposedMethods<Self> {
        ExposedMethods::new()
    }

    /// Runs when the Host enables, or right after creation on an enabled Host.
    fn api_did_mount(self: Arc<Self>) -> HookFuture {
        Box::pin(async { Ok(()) })
    }

    /// Runs when the Host unmounts.
    fn api_will_unmount(self: Arc<Self>) -> HookFuture {
        Box::pin(async { Ok(()) })
    }
}

/// Handler bound to a module type but not yet to an instance.
pub type MethodHandler<M> = Arc<dyn Fn(Arc<M>, Value) -> HandlerFuture + Send + Sync>;

/// Table of exposed methods for module type `M`.
///
/// Entries keep their declaration order. Declaring a name twice keeps the
/// original position but the later handler.
pub struct ExposedMethods<M> {
    entries: Vec<(String, MethodHandler<M>)>,
}

impl<M: Send + Sync + 'static> ExposedMethods<M> {
    pub fn new() -> Self {
        Self { entries: Vec::new() }
    }

    /// Declares (or overrides) an exposed method.
    ///
    /// # Arguments
    ///
    /// * `name` - Method name without the api name prefix
    /// * `handler` - Receives the instance and the raw params
    pub fn method<F, Fut>(self, name: &str, handler: F) -> Self
    where
        F: Fn(Arc<M>, Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        self.insert(name.to_string(), Arc::new(move |this, params| handler(this, params).boxed()))
    }

    /// Merges `other` into this table; entries of `other` win on conflicts.
    pub fn extend(self, other: ExposedMethods<M>) -> Self {
        other
            .entries
            .into_iter()
            .fold(self, |table, (name, handler)| table.insert(name, handler))
    }

    fn insert(mut self, name: String, handler: MethodHandler<M>) -> Self {
        match self.entries.iter_mut().find(|(existing, _)| *existing == name) {
            Some(entry) => entry.1 = handler,
            None => self.entries.push((name, handler)),
        }
        self
    }

    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|(name, _)| name.as_str()).collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|(existing, _)| existing == name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Binds every entry to `instance`.
    ///
    /// Handlers hold the instance weakly: once the Host drops it, calls fail
    /// with [`HostRpcError::Unmounted`].
    pub fn bind(self, instance: &Arc<M>) -> Vec<(String, Handler)> {
        self.entries
            .into_iter()
            .map(|(name, handler)| {
                let weak: Weak<M> = Arc::downgrade(instance);
                let bound: Handler = Arc::new(move |params| match weak.upgrade() {
                    Some(this) => handler(this, params),
                    None => async { Err(HostRpcError::Unmounted) }.boxed(),
                });
                (name, bound)
            })
            .collect()
    }
}

impl<M: Send + Sync + 'static> Default for ExposedMethods<M> {
    fn default() -> Self {
        Self::new()
    }
}

/// Reference to a registered module, by api name or by type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ModuleRef {
    ByName(String),
    ByType(TypeId),
}

impl ModuleRef {
    pub fn of<M: Module>() -> Self {
        ModuleRef::ByType(TypeId::of::<M>())
    }
}

impl From<&str> for ModuleRef {
    fn from(name: &str) -> Self {
        ModuleRef::ByName(name.to_string())
    }
}

impl From<String> for ModuleRef {
    fn from(name: String) -> Self {
        ModuleRef::ByName(name)
    }
}

impl std::fmt::Display for ModuleRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModuleRef::ByName(name) => write!(f, "{}", name),
            ModuleRef::ByType(type_id) => write!(f, "{:?}", type_id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Counter {
        base: i64,
    }

    fn base_methods<M: Send + Sync + 'static>() -> ExposedMethods<M> {
        ExposedMethods::new()
            .method("kind", |_, _| async { Ok(json!("base")) })
            .method("ping", |_, _| async { Ok(json!("pong")) })
    }

    #[tokio::test]
    async fn test_bound_handler_sees_instance() {
        let instance = Arc::new(Counter { base: 40 });
        let table = ExposedMethods::<Counter>::new().method("add", |this, params| async move {
            Ok(json!(this.base + params.as_i64().unwrap_or(0)))
        });

        let bound = table.bind(&instance);
        assert_eq!(bound.len(), 1);
        let (name, handler) = &bound[0];
        assert_eq!(name, "add");
        assert_eq!(handler(json!(2)).await.unwrap(), json!(42));
    }

    #[test]
    fn test_extend_overrides_but_keeps_inherited_entries() {
        let table = base_methods::<Counter>()
            .extend(ExposedMethods::new().method("kind", |_, _| async { Ok(json!("derived")) }))
            .method("extra", |_, _| async { Ok(Value::Null) });

        assert_eq!(table.names(), vec!["kind", "ping", "extra"]);
    }

    #[tokio::test]
    async fn test_override_wins() {
        let instance = Arc::new(Counter { base: 0 });
        let table = base_methods::<Counter>()
            .extend(ExposedMethods::new().method("kind", |_, _| async { Ok(json!("derived")) }));

        let bound = table.bind(&instance);
        let (_, kind) = bound.iter().find(|(name, _)| name == "kind").unwrap();
        assert_eq!(kind(Value::Null).await.unwrap(), json!("derived"));
    }

    #[tokio::test]
    async fn test_dropped_instance_reports_unmounted() {
        let instance = Arc::new(Counter { base: 0 });
        let bound = base_methods::<Counter>().bind(&instance);
        drop(instance);

        let (_, ping) = &bound[1];
        assert!(matches!(ping(Value::Null).await, Err(HostRpcError::Unmounted)));
    }

    #[test]
    fn test_module_ref_from_name() {
        assert_eq!(ModuleRef::from("Store"), ModuleRef::ByName("Store".into()));
        assert_eq!(ModuleRef::from("Store").to_string(), "Store");
    }
}
