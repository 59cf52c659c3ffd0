use std::sync::Arc;

use hostrpc_common::connection::ListenerId;
use hostrpc_common::protocol::builtin::namespaced;
use hostrpc_common::{Connection, Result};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::subscriber::EventSubscriber;

/// Handle to one module on the host.
///
/// Every member name is namespaced under the module's api name, so
/// `store.call("get", ..)` goes out as `Store.get`.
#[derive(Clone)]
pub struct RemoteModule {
    api_name: Arc<str>,
    connection: Connection,
}

impl RemoteModule {
    pub fn new(api_name: &str, connection: Connection) -> Self {
        Self {
            api_name: Arc::from(api_name),
            connection,
        }
    }

    pub fn api_name(&self) -> &str {
        &self.api_name
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    /// Calls `method` on the remote module.
    ///
    /// # Errors
    ///
    /// Remote handler failures come back as
    /// [`HostRpcError::RemoteExecution`](hostrpc_common::HostRpcError::RemoteExecution)
    /// carrying the host's message. A method the module does not expose
    /// fails with `UnknownMethod`.
    pub async fn call(&self, method: &str, params: Value) -> Result<Value> {
        self.connection.call(&self.wire_name(method), params).await
    }

    /// Calls `method` and deserializes its result.
    pub async fn call_as<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T> {
        let value = self.call(method, params).await?;
        Ok(serde_json::from_value(value)?)
    }

    pub fn notify(&self, method: &str, params: Value) -> Result<()> {
        self.connection.notify(&self.wire_name(method), params)
    }

    /// Listens for notifications the module sends as `event`.
    pub fn on<F>(&self, event: &str, listener: F) -> ListenerId
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.connection.on(&self.wire_name(event), listener)
    }

    pub fn off(&self, event: &str, id: ListenerId) -> bool {
        self.connection.off(&self.wire_name(event), id)
    }

    /// Ref-counted subscription manager for a subscribable module.
    pub fn subscriber(&self) -> EventSubscriber {
        EventSubscriber::new(self.clone())
    }

    fn wire_name(&self, member: &str) -> String {
        namespaced(&self.api_name, member)
    }
}

impl std::fmt::Debug for RemoteModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteModule")
            .field("api_name", &self.api_name)
            .finish_non_exhaustive()
    }
}
