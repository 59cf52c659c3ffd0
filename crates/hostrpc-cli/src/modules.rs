//! Demo modules served by `hostrpc serve`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use hostrpc_common::{from_params, single_param, HostRpcError, Result};
use hostrpc_server::{
    subscribable_methods, ExposedMethods, HookFuture, Module, ModuleContext, Registry,
    SubscribableModule, Subscriptions,
};
use serde_json::{json, Value};

/// How often `Ticker` publishes `tick`.
pub const TICK_INTERVAL: Duration = Duration::from_secs(1);

/// Registry with every demo module under its own name.
pub fn demo_registry() -> Result<Registry> {
    Registry::new()
        .with::<Echo>("Echo")?
        .with::<Store>("Store")?
        .with::<Ticker>("Ticker")
}

// ============================================================================
// Echo
// ============================================================================

/// Returns its params, or fails with them as the message.
pub struct Echo;

impl Module for Echo {
    fn create(_ctx: ModuleContext) -> Result<Self> {
        Ok(Echo)
    }

    fn exposed_methods() -> ExposedMethods<Self> {
        ExposedMethods::new()
            .method("echo", |_, params| async move { Ok(params) })
            .method("fail", |_, params| {
                let message = match params {
                    Value::String(message) => message,
                    other => other.to_string(),
                };
                async move { Err(HostRpcError::handler(message)) }
            })
    }
}

// ============================================================================
// Store
// ============================================================================

/// Per-connection key/value store.
pub struct Store {
    values: Mutex<HashMap<String, Value>>,
}

impl Store {
    /// `set([key, value])`, returns the previous value or null.
    fn set(&self, params: Value) -> Result<Value> {
        let (key, value): (String, Value) = from_params(params)?;
        let previous = self.values().insert(key, value);
        Ok(previous.unwrap_or(Value::Null))
    }

    fn get(&self, params: Value) -> Result<Value> {
        let key: String = single_param(params)?;
        Ok(self.values().get(&key).cloned().unwrap_or(Value::Null))
    }

    fn keys(&self) -> Value {
        let mut keys: Vec<String> = self.values().keys().cloned().collect();
        keys.sort();
        json!(keys)
    }

    fn values(&self) -> std::sync::MutexGuard<'_, HashMap<String, Value>> {
        self.values.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Module for Store {
    fn create(_ctx: ModuleContext) -> Result<Self> {
        Ok(Store {
            values: Mutex::new(HashMap::new()),
        })
    }

    fn exposed_methods() -> ExposedMethods<Self> {
        ExposedMethods::new()
            .method("set", |this: Arc<Self>, params| {
                let result = this.set(params);
                async move { result }
            })
            .method("get", |this, params| {
                let result = this.get(params);
                async move { result }
            })
            .method("keys", |this, _| {
                let keys = this.keys();
                async move { Ok(keys) }
            })
    }
}

// ============================================================================
// Ticker
// ============================================================================

/// Publishes `tick` with a running count once per [`TICK_INTERVAL`] while
/// the peer is subscribed to it.
pub struct Ticker {
    ctx: ModuleContext,
    subscriptions: Arc<Subscriptions>,
    count: Arc<AtomicU64>,
}

impl Ticker {
    fn spawn_clock(ctx: ModuleContext, subscriptions: Arc<Subscriptions>, count: Arc<AtomicU64>) {
        tokio::spawn(async move {
            let connection = ctx.connection().clone();
            let mut interval = tokio::time::interval(TICK_INTERVAL);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = connection.closed() => break,
                    _ = interval.tick() => {
                        let n = count.fetch_add(1, Ordering::Relaxed) + 1;
                        if let Err(err) = subscriptions.publish("tick", json!({ "count": n })) {
                            ctx.report(&err);
                        }
                    }
                }
            }
            tracing::debug!(module = %ctx.api_name(), "ticker stopped");
        });
    }
}

impl SubscribableModule for Ticker {
    fn subscribe(&self, event: &str) -> Result<()> {
        self.subscriptions.add(event);
        Ok(())
    }

    fn unsubscribe(&self, event: &str) -> Result<()> {
        self.subscriptions.remove(event);
        Ok(())
    }
}

impl Module for Ticker {
    fn create(ctx: ModuleContext) -> Result<Self> {
        Ok(Ticker {
            subscriptions: Arc::new(Subscriptions::new(ctx.clone())),
            count: Arc::new(AtomicU64::new(0)),
            ctx,
        })
    }

    fn exposed_methods() -> ExposedMethods<Self> {
        subscribable_methods::<Self>().method("count", |this, _| {
            let count = this.count.load(Ordering::Relaxed);
            async move { Ok(json!(count)) }
        })
    }

    /// Starts the clock; it stops with the connection.
    fn api_did_mount(self: Arc<Self>) -> HookFuture {
        Ticker::spawn_clock(self.ctx.clone(), self.subscriptions.clone(), self.count.clone());
        Box::pin(async { Ok(()) })
    }

    fn api_will_unmount(self: Arc<Self>) -> HookFuture {
        self.subscriptions.clear();
        Box::pin(async { Ok(()) })
    }
}
