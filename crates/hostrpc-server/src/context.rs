use std::future::Future;
use std::sync::{Arc, Weak};

use hostrpc_common::connection::{Handler, ListenerId};
use hostrpc_common::protocol::builtin::namespaced;
use hostrpc_common::{Connection, HostRpcError, Result};
use serde_json::Value;

use crate::host::{Host, HostInner};
use crate::module::{Module, ModuleRef};
use crate::registry::AnyModule;

/// Namespaced view of the Host handed to a module when it is created.
///
/// Every name passed in is prefixed with `"<apiName>."`, so a module never
/// needs to know the name it was registered under.
#[derive(Clone)]
pub struct ModuleContext {
    api_name: Arc<str>,
    connection: Connection,
    host: Weak<HostInner>,
}

impl ModuleContext {
    pub(crate) fn new(api_name: &str, connection: Connection, host: Weak<HostInner>) -> Self {
        Self {
            api_name: Arc::from(api_name),
            connection,
            host,
        }
    }

    pub fn api_name(&self) -> &str {
        &self.api_name
    }

    fn name(&self, member: &str) -> String {
        namespaced(&self.api_name, member)
    }

    /// Exposes `"<apiName>.<method>"`, replacing any previous handler.
    pub fn expose<F, Fut>(&self, method: &str, handler: F)
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        self.connection.expose(self.name(method), handler);
    }

    pub fn expose_handler(&self, method: &str, handler: Handler) {
        self.connection.expose_handler(self.name(method), handler);
    }

    /// Sends `"<apiName>.<event>"` to the peer.
    pub fn notify(&self, event: &str, params: Value) -> Result<()> {
        self.connection.notify(&self.name(event), params)
    }

    /// Listens for `"<apiName>.<event>"` on the local bus, which includes
    /// notifications the peer sends under that name.
    pub fn on<F>(&self, event: &str, listener: F) -> ListenerId
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.connection.on(&self.name(event), listener)
    }

    pub fn off(&self, event: &str, id: ListenerId) -> bool {
        self.connection.off(&self.name(event), id)
    }

    pub fn emit(&self, event: &str, data: &Value) {
        self.connection.emit(&self.name(event), data);
    }

    /// Reports a local error on the Host's `error` event.
    pub fn report(&self, err: &HostRpcError) {
        self.connection.report(err);
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    /// The owning Host, unless it is gone.
    pub fn host(&self) -> Option<Host> {
        self.host.upgrade().map(Host::from_inner)
    }

    /// Another module of the same Host, created on demand.
    ///
    /// May be called from [`Module::create`].
    pub fn module<M: Module>(&self) -> Result<Arc<M>> {
        self.host().ok_or(HostRpcError::Unmounted)?.module::<M>()
    }

    pub fn module_by_name(&self, api_name: &str) -> Result<AnyModule> {
        self.host()
            .ok_or(HostRpcError::Unmounted)?
            .get_or_create_instance(ModuleRef::from(api_name))
    }
}

impl std::fmt::Debug for ModuleContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleContext")
            .field("api_name", &self.api_name)
            .finish()
    }
}
