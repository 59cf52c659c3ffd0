//! Subscription Manager
//!
//! Publish/subscribe on top of plain calls. Local listeners are counted per
//! event name: the first listener for an event issues one `subscribe` call to
//! the host, removing the last one issues one `unsubscribe` call, and every
//! listener in between is purely local.
//!
//! The host answers with `"<apiName>.SubscribedEvent"` notifications carrying
//! `{event, data}`; those are fanned out to the local listeners of `event`.

use std::sync::{Arc, Mutex, PoisonError, Weak};

use hostrpc_common::connection::events::EventBus;
use hostrpc_common::connection::ListenerId;
use hostrpc_common::protocol::builtin::{SubscribedEvent, SUBSCRIBE, SUBSCRIBED_EVENT, UNSUBSCRIBE};
use hostrpc_common::HostRpcError;
use serde_json::{json, Value};

use crate::remote::RemoteModule;

/// Ref-counted event subscriptions to one subscribable module.
///
/// Clones share the same listener table. Subscribe and unsubscribe failures
/// are reported on the connection's local `error` event; a listener whose
/// subscribe call failed is still registered.
///
/// # Example
///
/// ```no_run
/// # async fn run(client: hostrpc_client::RpcClient) {
/// let ticker = client.module("Ticker").subscriber();
///
/// let id = ticker.on("tick", |data| println!("tick {}", data)).await;
/// // ...
/// ticker.off("tick", id).await;
/// # }
/// ```
#[derive(Clone)]
pub struct EventSubscriber {
    shared: Arc<Shared>,
}

struct Shared {
    module: RemoteModule,
    local: EventBus,
    /// Serializes the 0 -> 1 and 1 -> 0 transitions, which await a call.
    transitions: tokio::sync::Mutex<()>,
    forward: Mutex<Option<ListenerId>>,
}

impl EventSubscriber {
    pub fn new(module: RemoteModule) -> Self {
        let shared = Arc::new(Shared {
            module,
            local: EventBus::new(),
            transitions: tokio::sync::Mutex::new(()),
            forward: Mutex::new(None),
        });

        let weak: Weak<Shared> = Arc::downgrade(&shared);
        let forward = shared.module.on(SUBSCRIBED_EVENT, move |data| {
            if let Some(shared) = weak.upgrade() {
                shared.forward(data);
            }
        });
        *shared.forward.lock().unwrap_or_else(PoisonError::into_inner) = Some(forward);

        Self { shared }
    }

    pub fn module(&self) -> &RemoteModule {
        &self.shared.module
    }

    /// Adds a listener for the remote `event`.
    ///
    /// Subscribes on the host first when this is the first local listener
    /// for `event`.
    pub async fn on<F>(&self, event: &str, listener: F) -> ListenerId
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        let _transition = self.shared.transitions.lock().await;

        if self.shared.local.listener_count(event) == 0 {
            tracing::debug!(module = %self.shared.module.api_name(), event = %event, "subscribing");
            if let Err(err) = self.shared.module.call(SUBSCRIBE, json!([event])).await {
                self.shared.report(err);
            }
        }

        self.shared.local.on(event, Arc::new(listener))
    }

    /// Removes a listener. Returns `false` if it was not registered for `event`.
    ///
    /// Unsubscribes on the host when the last local listener for `event`
    /// goes away.
    pub async fn off(&self, event: &str, id: ListenerId) -> bool {
        let _transition = self.shared.transitions.lock().await;

        if !self.shared.local.off(event, id) {
            return false;
        }

        if self.shared.local.listener_count(event) == 0 {
            tracing::debug!(module = %self.shared.module.api_name(), event = %event, "unsubscribing");
            if let Err(err) = self.shared.module.call(UNSUBSCRIBE, json!([event])).await {
                self.shared.report(err);
            }
        }
        true
    }

    pub fn listener_count(&self, event: &str) -> usize {
        self.shared.local.listener_count(event)
    }
}

impl Shared {
    fn forward(&self, data: &Value) {
        match serde_json::from_value::<SubscribedEvent>(data.clone()) {
            Ok(published) => self.local.emit(&published.event, &published.data),
            Err(e) => self.report(HostRpcError::Protocol(format!(
                "malformed {} from {}: {}",
                SUBSCRIBED_EVENT,
                self.module.api_name(),
                e
            ))),
        }
    }

    fn report(&self, err: HostRpcError) {
        self.module.connection().report(&err);
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        let forward = self.forward.get_mut().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(id) = forward {
            self.module.off(SUBSCRIBED_EVENT, id);
        }
    }
}

impl std::fmt::Debug for EventSubscriber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventSubscriber")
            .field("module", &self.shared.module.api_name())
            .finish_non_exhaustive()
    }
}
