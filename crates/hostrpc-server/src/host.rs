use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::thread::{self, ThreadId};

use futures_util::future::FutureExt;
use hostrpc_common::connection::ListenerId;
use hostrpc_common::protocol::builtin::{
    namespaced, KILL, LOAD_MODULES, SYSTEM_DID_UNMOUNT, SYSTEM_WILL_ENABLE, SYSTEM_WILL_UNMOUNT,
};
use hostrpc_common::{from_params, single_param, Connection, HostRpcError, Result, Transport};
use serde_json::Value;

use crate::context::ModuleContext;
use crate::module::{HookFuture, Module, ModuleRef};
use crate::registry::{AnyModule, ModuleDescriptor, Registry};

/// Lifecycle of a [`Host`]. `Unmounted` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostState {
    Created,
    Enabled,
    Unmounted,
}

#[derive(Clone)]
struct Instance {
    descriptor: Arc<ModuleDescriptor>,
    module: AnyModule,
    mounted: Arc<AtomicBool>,
}

impl Instance {
    fn api_name(&self) -> &str {
        self.descriptor.api_name()
    }
}

/// Serializes construction of one api name.
///
/// Whoever holds `turn` is the only caller allowed to run that module's
/// constructor; `owner` lets a constructor that asks for its own module
/// fail instead of deadlocking.
#[derive(Default)]
struct ConstructionSlot {
    turn: Mutex<()>,
    owner: Mutex<Option<ThreadId>>,
}

impl ConstructionSlot {
    fn owner(&self) -> MutexGuard<'_, Option<ThreadId>> {
        self.owner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Blocks until no other caller is constructing this module.
    fn enter(&self, api_name: &str) -> Result<ConstructionTurn<'_>> {
        let me = thread::current().id();
        if *self.owner() == Some(me) {
            return Err(HostRpcError::handler(format!(
                "{} requested itself while being constructed",
                api_name
            )));
        }
        let guard = self.turn.lock().unwrap_or_else(PoisonError::into_inner);
        *self.owner() = Some(me);
        Ok(ConstructionTurn {
            slot: self,
            _guard: guard,
        })
    }
}

struct ConstructionTurn<'a> {
    slot: &'a ConstructionSlot,
    _guard: MutexGuard<'a, ()>,
}

impl Drop for ConstructionTurn<'_> {
    fn drop(&mut self) {
        *self.slot.owner() = None;
    }
}

/// Per-connection service container.
///
/// A Host wraps one [`Connection`] and owns at most one instance of every
/// registered module. Instances are created on demand (locally or through
/// the peer's `LoadModules` request), mounted when the Host enables, and
/// unmounted and dropped when it unmounts.
///
/// Lifecycle signals (`systemWillEnable`, `systemWillUnmount`,
/// `systemDidUnmount`) and local errors (`error`) are emitted on the
/// connection's event bus.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use hostrpc_common::{MemoryTransport, Result};
/// use hostrpc_server::{Host, Module, ModuleContext, Registry};
///
/// struct Clock;
/// impl Module for Clock {
///     fn create(_ctx: ModuleContext) -> Result<Self> {
///         Ok(Clock)
///     }
/// }
///
/// # #[tokio::main]
/// # async fn main() -> Result<()> {
/// let registry = Arc::new(Registry::new().with::<Clock>("Clock")?);
/// let (host_side, _peer_side) = MemoryTransport::pair();
///
/// let host = Host::new(host_side, registry)?;
/// let by_type = host.module::<Clock>()?;
/// let by_name = host.get_or_create_instance("Clock")?;
/// assert!(Arc::ptr_eq(&(by_type as Arc<dyn std::any::Any + Send + Sync>), &by_name));
///
/// host.enable();
/// host.unmount();
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Host {
    inner: Arc<HostInner>,
}

pub(crate) struct HostInner {
    connection: Connection,
    registry: Arc<Registry>,
    state: Mutex<HostState>,
    instances: Mutex<Vec<Instance>>,
    construction: Mutex<HashMap<String, Arc<ConstructionSlot>>>,
}

impl Host {
    /// Creates a Host on a fresh connection over `transport`.
    ///
    /// Must be called inside a tokio runtime.
    pub fn new<T: Transport>(transport: T, registry: Arc<Registry>) -> Result<Self> {
        Ok(Self::with_connection(Connection::new(transport)?, registry))
    }

    /// Creates a Host on an existing, not yet enabled connection.
    ///
    /// Exposes the built-in `LoadModules` method.
    pub fn with_connection(connection: Connection, registry: Arc<Registry>) -> Self {
        let inner = Arc::new(HostInner {
            connection,
            registry,
            state: Mutex::new(HostState::Created),
            instances: Mutex::new(Vec::new()),
            construction: Mutex::new(HashMap::new()),
        });

        let weak = Arc::downgrade(&inner);
        inner.connection.expose(LOAD_MODULES, move |params| {
            let result = rpc_load_modules(&weak, params);
            async move { result }
        });

        Self { inner }
    }

    pub(crate) fn from_inner(inner: Arc<HostInner>) -> Self {
        Self { inner }
    }

    pub fn connection(&self) -> &Connection {
        &self.inner.connection
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.inner.registry
    }

    pub fn state(&self) -> HostState {
        *self.inner.state()
    }

    /// Api names of the live instances, in creation order.
    pub fn instance_names(&self) -> Vec<String> {
        self.inner
            .instances()
            .iter()
            .map(|instance| instance.api_name().to_string())
            .collect()
    }

    /// Existing instance for `api_name`, without creating one.
    pub fn instance(&self, api_name: &str) -> Option<AnyModule> {
        self.inner.find(api_name).map(|instance| instance.module)
    }

    // ========================================================================
    // Service location
    // ========================================================================

    /// Returns the instance for `module`, creating it on first use.
    ///
    /// A new instance gets a [`ModuleContext`] namespaced to its api name,
    /// has its exposed methods bound to the connection, and is mounted right
    /// away if the Host is already enabled.
    ///
    /// Constructors of one api name never run concurrently: a caller that
    /// finds construction in progress blocks until it finishes and then
    /// gets the same instance. Constructors may look up other modules.
    ///
    /// # Errors
    ///
    /// - [`HostRpcError::Unmounted`] after [`Host::unmount`]
    /// - [`HostRpcError::UnregisteredModule`] if `module` was never registered
    /// - [`HostRpcError::Handler`] if a constructor asks for its own module
    /// - Whatever the module's constructor returns
    pub fn get_or_create_instance(&self, module: impl Into<ModuleRef>) -> Result<AnyModule> {
        if self.state() == HostState::Unmounted {
            return Err(HostRpcError::Unmounted);
        }

        let descriptor = self.inner.registry.resolve(&module.into())?;
        if let Some(existing) = self.inner.find(descriptor.api_name()) {
            return Ok(existing.module);
        }

        let slot = self.inner.construction_slot(descriptor.api_name());
        let _turn = slot.enter(descriptor.api_name())?;

        // Another caller may have finished while we waited for the turn.
        if let Some(existing) = self.inner.find(descriptor.api_name()) {
            return Ok(existing.module);
        }
        if self.state() == HostState::Unmounted {
            return Err(HostRpcError::Unmounted);
        }

        // Build without holding the table lock, so constructors can look up
        // other modules.
        let ctx = ModuleContext::new(
            descriptor.api_name(),
            self.inner.connection.clone(),
            Arc::downgrade(&self.inner),
        );
        let module = descriptor.construct(ctx)?;

        let instance = {
            let mut instances = self.inner.instances();
            let instance = Instance {
                descriptor: descriptor.clone(),
                module: module.clone(),
                mounted: Arc::new(AtomicBool::new(false)),
            };
            instances.push(instance.clone());
            instance
        };

        for (method, handler) in descriptor.bind(&module) {
            self.inner
                .connection
                .expose_handler(namespaced(descriptor.api_name(), &method), handler);
        }
        tracing::debug!(module = %descriptor.api_name(), "module instantiated");

        if self.state() == HostState::Enabled {
            self.inner.mount(&instance);
        }

        Ok(module)
    }

    /// Typed [`Host::get_or_create_instance`].
    pub fn module<M: Module>(&self) -> Result<Arc<M>> {
        let module = self
            .get_or_create_instance(ModuleRef::of::<M>())
            .map_err(|err| match err {
                HostRpcError::UnregisteredModule(_) => {
                    HostRpcError::UnregisteredModule(std::any::type_name::<M>().to_string())
                }
                other => other,
            })?;
        module
            .downcast::<M>()
            .map_err(|_| HostRpcError::UnregisteredModule(std::any::type_name::<M>().to_string()))
    }

    /// Instantiates every named module, or none if any name is unknown.
    ///
    /// Names are validated before anything is created. If a constructor
    /// fails part-way, modules created before it stay instantiated.
    ///
    /// # Errors
    ///
    /// Returns [`HostRpcError::ModulesNotFound`] listing every unknown name.
    pub fn load_modules(&self, names: &[String]) -> Result<()> {
        if self.state() == HostState::Unmounted {
            return Err(HostRpcError::Unmounted);
        }

        let missing: Vec<String> = names
            .iter()
            .filter(|name| !self.inner.registry.contains(name))
            .cloned()
            .collect();
        if !missing.is_empty() {
            return Err(HostRpcError::ModulesNotFound(missing));
        }

        for name in names {
            self.get_or_create_instance(name.as_str())?;
        }
        Ok(())
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Mounts every instantiated module and enables the connection.
    ///
    /// Idempotent; does nothing once unmounted. A failing mount hook is
    /// reported and the remaining modules still mount.
    pub fn enable(&self) {
        {
            let mut state = self.inner.state();
            if *state != HostState::Created {
                return;
            }
            *state = HostState::Enabled;
        }

        tracing::info!("host enabling");
        self.inner.connection.emit(SYSTEM_WILL_ENABLE, &Value::Null);

        let instances = self.inner.instances().clone();
        for instance in &instances {
            self.inner.mount(instance);
        }

        self.inner.connection.enable();
    }

    /// Tears the Host down. Idempotent.
    ///
    /// Sends a best-effort `SIGKILL` notification, runs every unmount hook
    /// (reporting failures), drops all instances, fails pending calls,
    /// closes the transport and finally emits `systemDidUnmount`.
    pub fn unmount(&self) {
        {
            let mut state = self.inner.state();
            if *state == HostState::Unmounted {
                return;
            }
            *state = HostState::Unmounted;
        }

        let connection = &self.inner.connection;
        tracing::info!("host unmounting");

        if let Err(err) = connection.notify(KILL, Value::Null) {
            tracing::debug!(error = %err, "could not send kill notification");
        }
        connection.emit(SYSTEM_WILL_UNMOUNT, &Value::Null);

        let instances = std::mem::take(&mut *self.inner.instances());
        for instance in &instances {
            let hook = instance.descriptor.will_unmount(&instance.module);
            self.inner.run_hook(instance.api_name(), "unmount", hook);
            connection.unexpose_prefix(&namespaced(instance.api_name(), ""));
        }
        drop(instances);

        connection.disable();
        connection.close_transport();

        connection.emit(SYSTEM_DID_UNMOUNT, &Value::Null);
        tracing::info!("host unmounted");
    }

    /// Resolves once the underlying connection is disabled.
    pub async fn closed(&self) {
        self.inner.connection.closed().await;
    }

    /// Listens on the Host's local event bus.
    pub fn on<F>(&self, event: &str, listener: F) -> ListenerId
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.inner.connection.on(event, listener)
    }

    pub fn off(&self, event: &str, id: ListenerId) -> bool {
        self.inner.connection.off(event, id)
    }
}

impl std::fmt::Debug for Host {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Host")
            .field("state", &self.state())
            .field("instances", &self.instance_names())
            .finish()
    }
}

impl HostInner {
    fn state(&self) -> MutexGuard<'_, HostState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn instances(&self) -> MutexGuard<'_, Vec<Instance>> {
        self.instances.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn find(&self, api_name: &str) -> Option<Instance> {
        self.instances()
            .iter()
            .find(|instance| instance.api_name() == api_name)
            .cloned()
    }

    fn construction_slot(&self, api_name: &str) -> Arc<ConstructionSlot> {
        self.construction
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(api_name.to_string())
            .or_default()
            .clone()
    }

    /// Runs the mount hook at most once per instance.
    fn mount(&self, instance: &Instance) {
        if instance.mounted.swap(true, Ordering::SeqCst) {
            return;
        }
        tracing::debug!(module = %instance.api_name(), "mounting module");
        let hook = instance.descriptor.did_mount(&instance.module);
        self.run_hook(instance.api_name(), "mount", hook);
    }

    /// Drives a lifecycle hook: in place if it completes on the first poll,
    /// otherwise on its own task. Failures are reported either way.
    fn run_hook(&self, api_name: &str, stage: &'static str, mut hook: HookFuture) {
        match (&mut hook).now_or_never() {
            Some(Ok(())) => {}
            Some(Err(err)) => {
                tracing::warn!(module = %api_name, "{} hook failed", stage);
                self.connection.report(&err);
            }
            None => {
                let connection = self.connection.clone();
                let api_name = api_name.to_string();
                tokio::spawn(async move {
                    if let Err(err) = hook.await {
                        tracing::warn!(module = %api_name, "{} hook failed", stage);
                        connection.report(&err);
                    }
                });
            }
        }
    }
}

/// `LoadModules` accepts the names either as the params array itself or
/// wrapped as its single positional argument.
fn parse_module_names(params: Value) -> Result<Vec<String>> {
    match params {
        Value::Array(items) if items.iter().all(Value::is_string) => from_params(Value::Array(items)),
        other => single_param(other).map_err(|_| {
            HostRpcError::InvalidParams(format!("{}(names) expects an array of strings", LOAD_MODULES))
        }),
    }
}

fn rpc_load_modules(host: &Weak<HostInner>, params: Value) -> Result<Value> {
    let host = host.upgrade().map(Host::from_inner).ok_or(HostRpcError::Unmounted)?;
    let names = parse_module_names(params)?;
    host.load_modules(&names)?;
    Ok(Value::Null)
}
