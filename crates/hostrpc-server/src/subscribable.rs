//! Subscribable modules
//!
//! Host side of the pub/sub protocol. A subscribable module exposes
//! `subscribe(event)` and `unsubscribe(event)`; while an event is subscribed
//! it publishes `"<apiName>.SubscribedEvent"` notifications carrying
//! `{event, data}`.

use std::collections::HashSet;
use std::sync::{Mutex, PoisonError};

use hostrpc_common::protocol::builtin::{SubscribedEvent, SUBSCRIBE, SUBSCRIBED_EVENT, UNSUBSCRIBE};
use hostrpc_common::{single_param, Result};
use serde_json::Value;

use crate::context::ModuleContext;
use crate::module::{ExposedMethods, Module};

/// A module whose events a peer can subscribe to.
pub trait SubscribableModule: Module {
    fn subscribe(&self, event: &str) -> Result<()>;

    fn unsubscribe(&self, event: &str) -> Result<()>;
}

/// Exposed-method table shared by every [`SubscribableModule`].
///
/// Implementors extend it in their own [`Module::exposed_methods`]:
///
/// ```ignore
/// fn exposed_methods() -> ExposedMethods<Self> {
///     subscribable_methods::<Self>().method("reset", |this, _| async move { this.reset() })
/// }
/// ```
pub fn subscribable_methods<M: SubscribableModule>() -> ExposedMethods<M> {
    ExposedMethods::new()
        .method(SUBSCRIBE, |this: std::sync::Arc<M>, params| {
            let result = single_param::<String>(params).and_then(|event| this.subscribe(&event));
            async move { result.map(|_| Value::Null) }
        })
        .method(UNSUBSCRIBE, |this: std::sync::Arc<M>, params| {
            let result = single_param::<String>(params).and_then(|event| this.unsubscribe(&event));
            async move { result.map(|_| Value::Null) }
        })
}

/// Bookkeeping for a subscribable module: which events the peer wants, and
/// publishing to it.
#[derive(Debug)]
pub struct Subscriptions {
    ctx: ModuleContext,
    active: Mutex<HashSet<String>>,
}

impl Subscriptions {
    pub fn new(ctx: ModuleContext) -> Self {
        Self {
            ctx,
            active: Mutex::new(HashSet::new()),
        }
    }

    /// Marks `event` as subscribed. Returns `false` if it already was.
    pub fn add(&self, event: &str) -> bool {
        let added = self.active().insert(event.to_string());
        if added {
            tracing::debug!(module = %self.ctx.api_name(), event = %event, "peer subscribed");
        }
        added
    }

    /// Marks `event` as unsubscribed. Returns `false` if it was not.
    pub fn remove(&self, event: &str) -> bool {
        let removed = self.active().remove(event);
        if removed {
            tracing::debug!(module = %self.ctx.api_name(), event = %event, "peer unsubscribed");
        }
        removed
    }

    pub fn is_active(&self, event: &str) -> bool {
        self.active().contains(event)
    }

    /// Subscribed event names, sorted.
    pub fn active_events(&self) -> Vec<String> {
        let mut events: Vec<String> = self.active().iter().cloned().collect();
        events.sort();
        events
    }

    /// Sends `event` to the peer if it is subscribed.
    ///
    /// Returns whether a notification was sent.
    pub fn publish(&self, event: &str, data: Value) -> Result<bool> {
        if !self.is_active(event) {
            return Ok(false);
        }
        publish(&self.ctx, event, data)?;
        Ok(true)
    }

    pub fn clear(&self) {
        self.active().clear();
    }

    fn active(&self) -> std::sync::MutexGuard<'_, HashSet<String>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Sends one `"<apiName>.SubscribedEvent"` notification unconditionally.
pub fn publish(ctx: &ModuleContext, event: &str, data: Value) -> Result<()> {
    let payload = serde_json::to_value(SubscribedEvent::new(event, data))?;
    ctx.notify(SUBSCRIBED_EVENT, payload)
}
