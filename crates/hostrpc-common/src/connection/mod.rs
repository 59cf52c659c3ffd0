//! RPC Engine
//!
//! A [`Connection`] owns one [`Transport`] and does everything between the
//! wire and the application: it correlates outbound calls with their
//! responses, dispatches inbound requests and notifications to exposed
//! handlers, and runs a local event bus.
//!
//! # Dispatch
//!
//! One task per connection reads transport events in delivery order, but
//! only once the connection is enabled; anything delivered earlier waits in
//! the transport queue. Request handlers run as independent tasks, so a slow
//! handler never holds up the next message and responses may leave out of
//! order (the correlation id makes this safe for the caller).
//!
//! Wire-level problems (malformed envelopes, responses nobody waits for,
//! failing notification handlers) never stop the loop: they are logged and
//! emitted as the local `error` event.
//!
//! # Example
//!
//! ```
//! use hostrpc_common::connection::Connection;
//! use hostrpc_common::transport::MemoryTransport;
//! use serde_json::json;
//!
//! # #[tokio::main]
//! # async fn main() -> hostrpc_common::Result<()> {
//! let (left, right) = MemoryTransport::pair();
//! let server = Connection::new(left)?;
//! let client = Connection::new(right)?;
//!
//! server.expose("echo", |params| async move { Ok(params) });
//! server.enable();
//! client.enable();
//!
//! assert_eq!(client.call("echo", json!([1, 2])).await?, json!([1, 2]));
//! # Ok(())
//! # }
//! ```

pub mod events;


pub use events::{EventBus, Listener, ListenerId};

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

use futures_util::future::{BoxFuture, FutureExt};
use serde_json::Value;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::{oneshot, watch};

use crate::protocol::builtin::ERROR_EVENT;
use crate::protocol::envelope::{Envelope, ErrorPayload, Notification, Request, RequestId, Response};
use crate::protocol::error::{HostRpcError, Result};
use crate::transport::{JsonCodec, Transport, TransportEvent};

/// Boxed future returned by a [`Handler`].
pub type HandlerFuture = BoxFuture<'static, Result<Value>>;

/// Type-erased method handler.
pub type Handler = Arc<dyn Fn(Value) -> HandlerFuture + Send + Sync>;

/// Lifecycle of a connection. `Disabled` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Created,
    Enabled,
    Disabled,
}

type PendingCall = oneshot::Sender<Result<Value>>;

/// Handle to one RPC connection. Cloning is cheap and shares the connection.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<Inner>,
}

/// Non-owning handle to a [`Connection`], for listeners that must not keep
/// the connection alive.
#[derive(Clone)]
pub struct WeakConnection {
    inner: Weak<Inner>,
}

impl WeakConnection {
    pub fn upgrade(&self) -> Option<Connection> {
        self.inner.upgrade().map(|inner| Connection { inner })
    }
}

struct Inner {
    transport: Arc<dyn Transport>,
    handlers: Mutex<HashMap<String, Handler>>,
    pending: Mutex<HashMap<RequestId, PendingCall>>,
    next_id: AtomicU64,
    state: watch::Sender<ConnectionState>,
    events: EventBus,
}

impl Connection {
    /// Binds a new connection to `transport`.
    ///
    /// Must be called inside a tokio runtime: the dispatch task is spawned
    /// here, although it does nothing until [`Connection::enable`].
    ///
    /// # Errors
    ///
    /// Fails if the transport's inbound stream was already taken.
    pub fn new<T: Transport>(transport: T) -> Result<Self> {
        Self::with_transport(Arc::new(transport))
    }

    /// Like [`Connection::new`] for a transport that is already shared.
    pub fn with_transport(transport: Arc<dyn Transport>) -> Result<Self> {
        let inbound = transport.incoming()?;
        let (state, state_rx) = watch::channel(ConnectionState::Created);

        let inner = Arc::new(Inner {
            transport,
            handlers: Mutex::new(HashMap::new()),
            pending: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            state,
            events: EventBus::new(),
        });

        tokio::spawn(dispatch_loop(Arc::downgrade(&inner), inbound, state_rx));

        Ok(Self { inner })
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Starts dispatching inbound messages. Idempotent; a disabled
    /// connection stays disabled.
    pub fn enable(&self) {
        let changed = self.inner.state.send_if_modified(|state| {
            if *state == ConnectionState::Created {
                *state = ConnectionState::Enabled;
                true
            } else {
                false
            }
        });
        if changed {
            tracing::debug!("connection enabled");
        }
    }

    /// Stops dispatching and fails every pending call with
    /// [`HostRpcError::ConnectionClosed`]. Idempotent.
    ///
    /// The transport itself is left open; see [`Connection::close_transport`].
    pub fn disable(&self) {
        self.inner.disable();
    }

    pub fn state(&self) -> ConnectionState {
        *self.inner.state.borrow()
    }

    pub fn is_enabled(&self) -> bool {
        self.state() == ConnectionState::Enabled
    }

    /// Resolves once the connection is disabled.
    pub async fn closed(&self) {
        let mut state = self.inner.state.subscribe();
        // The sender lives in `self`, so the channel cannot close under us.
        let _ = state.wait_for(|state| *state == ConnectionState::Disabled).await;
    }

    pub fn downgrade(&self) -> WeakConnection {
        WeakConnection {
            inner: Arc::downgrade(&self.inner),
        }
    }

    pub fn close_transport(&self) {
        self.inner.transport.close();
    }

    // ========================================================================
    // Exposed methods
    // ========================================================================

    /// Registers a handler for `method`, replacing any previous one.
    pub fn expose<F, Fut>(&self, method: impl Into<String>, handler: F)
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        self.expose_handler(method, Arc::new(move |params| handler(params).boxed()));
    }

    /// Registers an already type-erased handler, replacing any previous one.
    pub fn expose_handler(&self, method: impl Into<String>, handler: Handler) {
        let method = method.into();
        tracing::debug!(method = %method, "exposing method");
        self.inner.handlers().insert(method, handler);
    }

    /// Removes the handler for `method`. Returns whether one was exposed.
    pub fn unexpose(&self, method: &str) -> bool {
        self.inner.handlers().remove(method).is_some()
    }

    /// Removes every handler whose name starts with `prefix`.
    pub fn unexpose_prefix(&self, prefix: &str) -> usize {
        let mut handlers = self.inner.handlers();
        let before = handlers.len();
        handlers.retain(|method, _| !method.starts_with(prefix));
        before - handlers.len()
    }

    pub fn is_exposed(&self, method: &str) -> bool {
        self.inner.handlers().contains_key(method)
    }

    /// Names of all exposed methods, sorted.
    pub fn exposed_methods(&self) -> Vec<String> {
        let mut methods: Vec<String> = self.inner.handlers().keys().cloned().collect();
        methods.sort();
        methods
    }

    // ========================================================================
    // Outbound traffic
    // ========================================================================

    /// Calls `method` on the peer and waits for its response.
    ///
    /// There is no timeout; race the returned future against a timer if a
    /// deadline is needed. Dropping the future abandons the call and frees
    /// its pending entry; a response arriving later is reported as
    /// unmatched.
    ///
    /// # Errors
    ///
    /// - [`HostRpcError::ConnectionClosed`] if the connection is or becomes
    ///   disabled before the response arrives
    /// - [`HostRpcError::UnknownMethod`] if the peer exposes no such method
    /// - [`HostRpcError::RemoteExecution`] if the peer's handler failed
    /// - [`HostRpcError::Transport`] if the request could not be sent
    pub async fn call(&self, method: &str, params: Value) -> Result<Value> {
        if self.state() == ConnectionState::Disabled {
            return Err(HostRpcError::ConnectionClosed);
        }

        let id = RequestId::from(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = oneshot::channel();
        self.inner.pending().insert(id.clone(), tx);
        let _entry = PendingEntry {
            inner: &*self.inner,
            id: id.clone(),
        };

        // A disable that raced the insert has already drained the table.
        if self.state() == ConnectionState::Disabled {
            return Err(HostRpcError::ConnectionClosed);
        }

        tracing::debug!(id = %id, method = %method, "sending request");
        self.inner.send(Request::new(id, method, params).into())?;

        rx.await.unwrap_or(Err(HostRpcError::ConnectionClosed))
    }

    /// Number of calls still waiting for a response.
    pub fn pending_calls(&self) -> usize {
        self.inner.pending().len()
    }

    /// Sends a notification. No response, no delivery guarantee beyond the
    /// transport's own.
    pub fn notify(&self, method: &str, params: Value) -> Result<()> {
        if self.state() == ConnectionState::Disabled {
            return Err(HostRpcError::ConnectionClosed);
        }
        self.inner.send(Notification::new(method, params).into())
    }

    // ========================================================================
    // Local event bus
    // ========================================================================

    pub fn on<F>(&self, event: &str, listener: F) -> ListenerId
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.inner.events.on(event, Arc::new(listener))
    }

    pub fn off(&self, event: &str, id: ListenerId) -> bool {
        self.inner.events.off(event, id)
    }

    pub fn emit(&self, event: &str, data: &Value) {
        self.inner.events.emit(event, data);
    }

    /// Logs `err` and emits it as the local `error` event.
    pub fn report(&self, err: &HostRpcError) {
        self.inner.report(err);
    }

    pub fn events(&self) -> &EventBus {
        &self.inner.events
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("state", &self.state())
            .field("pending", &self.pending_calls())
            .finish()
    }
}

/// Pending-table entry owned by an in-flight [`Connection::call`].
///
/// Ids are never reused, so removing an entry that was already settled or
/// drained is a no-op; dropping the call future early clears it.
struct PendingEntry<'a> {
    inner: &'a Inner,
    id: RequestId,
}

impl Drop for PendingEntry<'_> {
    fn drop(&mut self) {
        self.inner.pending().remove(&self.id);
    }
}

impl Inner {
    fn handlers(&self) -> std::sync::MutexGuard<'_, HashMap<String, Handler>> {
        self.handlers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn pending(&self) -> std::sync::MutexGuard<'_, HashMap<RequestId, PendingCall>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn send(&self, envelope: Envelope) -> Result<()> {
        let message = JsonCodec::encode(&envelope)?;
        self.transport.send_message(message)
    }

    fn report(&self, err: &HostRpcError) {
        tracing::warn!(kind = err.kind(), "{}", err);
        self.events.emit(ERROR_EVENT, &err.to_event());
    }

    fn disable(&self) {
        let changed = self.state.send_if_modified(|state| {
            if *state == ConnectionState::Disabled {
                false
            } else {
                *state = ConnectionState::Disabled;
                true
            }
        });
        if !changed {
            return;
        }

        let pending: Vec<PendingCall> = self.pending().drain().map(|(_, tx)| tx).collect();
        tracing::info!(pending = pending.len(), "connection disabled");
        for tx in pending {
            let _ = tx.send(Err(HostRpcError::ConnectionClosed));
        }
    }

    fn handle_message(self: &Arc<Self>, message: &str) {
        match JsonCodec::decode(message) {
            Ok(Envelope::Request(request)) => self.dispatch_request(request),
            Ok(Envelope::Notification(notification)) => self.dispatch_notification(notification),
            Ok(Envelope::Response(response)) => self.settle(response),
            Err(err) => self.report(&err),
        }
    }

    fn dispatch_request(self: &Arc<Self>, request: Request) {
        let Request { id, method, params } = request;
        let handler = self.handlers().get(&method).cloned();

        let Some(handler) = handler else {
            tracing::debug!(id = %id, method = %method, "request for unexposed method");
            let err = HostRpcError::UnknownMethod(method);
            self.respond(Response::error(id, ErrorPayload::from(&err)));
            return;
        };

        tracing::debug!(id = %id, method = %method, "dispatching request");
        let inner = self.clone();
        tokio::spawn(async move {
            let response = match handler(params).await {
                Ok(result) => Response::success(id, result),
                Err(err) => {
                    tracing::debug!(method = %method, error = %err, "handler failed");
                    Response::error(id, ErrorPayload::from(&err))
                }
            };
            inner.respond(response);
        });
    }

    fn respond(&self, response: Response) {
        let id = response.id.clone();
        if let Err(err) = self.send(response.into()) {
            tracing::debug!(id = %id, error = %err, "could not send response");
        }
    }

    fn dispatch_notification(self: &Arc<Self>, notification: Notification) {
        let Notification { method, params } = notification;
        let handler = self.handlers().get(&method).cloned();

        if let Some(handler) = handler {
            let inner = self.clone();
            let handler_params = params.clone();
            let handler_method = method.clone();
            tokio::spawn(async move {
                if let Err(err) = handler(handler_params).await {
                    tracing::debug!(method = %handler_method, "notification handler failed");
                    inner.report(&err);
                }
            });
        }

        self.events.emit(&method, &params);
    }

    fn settle(&self, response: Response) {
        let Response { id, outcome } = response;
        let waiter = self.pending().remove(&id);

        match waiter {
            Some(tx) => {
                // The caller may have stopped waiting; nothing to do then.
                let _ = tx.send(outcome.map_err(HostRpcError::from));
            }
            None => self.report(&HostRpcError::Protocol(format!(
                "response for unknown request id {}",
                id
            ))),
        }
    }
}

/// Waits for `Enabled`, then feeds transport events to the connection in
/// order until it is disabled, dropped, or the transport closes.
async fn dispatch_loop(
    inner: Weak<Inner>,
    mut inbound: UnboundedReceiver<TransportEvent>,
    mut state: watch::Receiver<ConnectionState>,
) {
    match state
        .wait_for(|state| *state != ConnectionState::Created)
        .await
        .map(|state| *state)
    {
        Ok(ConnectionState::Enabled) => {}
        _ => return,
    }

    loop {
        let event = tokio::select! {
            biased;
            changed = state.changed() => {
                if changed.is_err() || *state.borrow() == ConnectionState::Disabled {
                    return;
                }
                continue;
            }
            event = inbound.recv() => event,
        };

        let Some(inner) = inner.upgrade() else {
            return;
        };

        match event {
            Some(TransportEvent::Message(message)) => inner.handle_message(&message),
            Some(TransportEvent::Error(message)) => inner.report(&HostRpcError::Transport(message)),
            Some(TransportEvent::Closed) | None => {
                tracing::debug!("transport closed");
                inner.disable();
                return;
            }
        }
    }
}
