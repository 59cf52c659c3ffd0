use hostrpc_common::connection::ListenerId;
use hostrpc_common::protocol::builtin::{KILL, LOAD_MODULES};
use hostrpc_common::{Connection, Result, TcpConfig, TcpTransport, Transport};
use serde_json::{json, Value};

use crate::remote::RemoteModule;

/// Client side of a hostrpc connection.
///
/// The connection is enabled as soon as the client is built. When the host
/// sends its `SIGKILL` notification the client disables itself, failing any
/// call still waiting for a response.
///
/// # Example
///
/// ```no_run
/// use hostrpc_client::RpcClient;
/// use hostrpc_common::TcpConfig;
/// use serde_json::json;
///
/// # #[tokio::main]
/// # async fn main() -> hostrpc_common::Result<()> {
/// let client = RpcClient::connect("127.0.0.1:7400", TcpConfig::default()).await?;
/// let modules = client.load_modules(&["Store"]).await?;
///
/// modules[0].call("set", json!(["answer", 42])).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct RpcClient {
    connection: Connection,
}

impl RpcClient {
    /// Creates a client on `transport`. Must be called inside a tokio runtime.
    pub fn new<T: Transport>(transport: T) -> Result<Self> {
        Ok(Self::from_connection(Connection::new(transport)?))
    }

    /// Connects over TCP.
    pub async fn connect(addr: &str, config: TcpConfig) -> Result<Self> {
        let transport = TcpTransport::connect(addr, config).await?;
        Self::new(transport)
    }

    /// Wraps an existing connection and enables it.
    pub fn from_connection(connection: Connection) -> Self {
        let weak = connection.downgrade();
        connection.on(KILL, move |_| {
            if let Some(connection) = weak.upgrade() {
                tracing::info!("host sent {}, disabling client", KILL);
                connection.disable();
            }
        });
        connection.enable();

        Self { connection }
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    /// Asks the host to instantiate `names`, returning a handle per name.
    ///
    /// # Errors
    ///
    /// Fails (and nothing is returned) if any name is unknown to the host;
    /// the error message lists the missing names.
    pub async fn load_modules(&self, names: &[&str]) -> Result<Vec<RemoteModule>> {
        self.connection.call(LOAD_MODULES, json!(names)).await?;
        Ok(names.iter().map(|name| self.module(name)).collect())
    }

    /// Handle for `api_name` without asking the host to preload it.
    pub fn module(&self, api_name: &str) -> RemoteModule {
        RemoteModule::new(api_name, self.connection.clone())
    }

    pub async fn call(&self, method: &str, params: Value) -> Result<Value> {
        self.connection.call(method, params).await
    }

    pub fn notify(&self, method: &str, params: Value) -> Result<()> {
        self.connection.notify(method, params)
    }

    pub fn on<F>(&self, event: &str, listener: F) -> ListenerId
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.connection.on(event, listener)
    }

    pub fn off(&self, event: &str, id: ListenerId) -> bool {
        self.connection.off(event, id)
    }

    /// Disables the connection and closes the transport.
    pub fn close(&self) {
        self.connection.disable();
        self.connection.close_transport();
    }

    /// Resolves once the connection is disabled (closed locally, by the
    /// host's `SIGKILL`, or by the transport going away).
    pub async fn closed(&self) {
        self.connection.closed().await;
    }
}

impl std::fmt::Debug for RpcClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcClient")
            .field("connection", &self.connection)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hostrpc_common::{ConnectionState, HostRpcError, MemoryTransport};
    use std::time::Duration;

    fn client_and_fake_host() -> (RpcClient, Connection) {
        let (client_side, host_side) = MemoryTransport::pair();
        let host = Connection::new(host_side).unwrap();
        host.enable();
        (RpcClient::new(client_side).unwrap(), host)
    }

    #[tokio::test]
    async fn test_client_is_enabled_on_creation() {
        let (client, _host) = client_and_fake_host();
        assert_eq!(client.connection().state(), ConnectionState::Enabled);
    }

    #[tokio::test]
    async fn test_load_modules_sends_names_and_returns_handles() {
        let (client, host) = client_and_fake_host();
        host.expose(LOAD_MODULES, |params| async move {
            if params == json!(["A", "B"]) {
                Ok(Value::Null)
            } else {
                Err(HostRpcError::handler(format!("unexpected params {}", params)))
            }
        });

        let modules = client.load_modules(&["A", "B"]).await.unwrap();
        let names: Vec<&str> = modules.iter().map(RemoteModule::api_name).collect();
        assert_eq!(names, vec!["A", "B"]);
    }

    #[tokio::test]
    async fn test_load_modules_failure_is_returned() {
        let (client, host) = client_and_fake_host();
        host.expose(LOAD_MODULES, |_| async {
            Err(HostRpcError::ModulesNotFound(vec!["Ghost".into()]))
        });

        let err = client.load_modules(&["Ghost"]).await.unwrap_err();
        assert_eq!(err.to_string(), "These modules are not exposed: Ghost");
    }

    #[tokio::test]
    async fn test_kill_notification_disables_client() {
        let (client, host) = client_and_fake_host();
        host.notify(KILL, Value::Null).unwrap();

        tokio::time::timeout(Duration::from_secs(5), client.closed())
            .await
            .unwrap();
        assert!(matches!(
            client.call("anything", Value::Null).await,
            Err(HostRpcError::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn test_close_fails_pending_call() {
        let (client, host) = client_and_fake_host();
        host.expose("never", |_| std::future::pending::<Result<Value>>());
        let pending = tokio::spawn({
            let client = client.clone();
            async move { client.call("never", Value::Null).await }
        });
        tokio::task::yield_now().await;

        client.close();
        assert!(matches!(
            pending.await.unwrap(),
            Err(HostRpcError::ConnectionClosed)
        ));
    }
}
