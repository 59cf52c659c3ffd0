// Integration tests for hostrpc-client
//
// A real Host on one end of an in-memory transport pair, an RpcClient on
// the other.

use hostrpc_client::RpcClient;
use hostrpc_common::{HostRpcError, MemoryTransport, Result};
use hostrpc_server::{
    subscribable_methods, ExposedMethods, Host, Module, ModuleContext, Registry,
    SubscribableModule, Subscriptions,
};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

// ============================================================================
// Host-side modules
// ============================================================================

struct Calculator;

impl Module for Calculator {
    fn create(_ctx: ModuleContext) -> Result<Self> {
        Ok(Calculator)
    }

    fn exposed_methods() -> ExposedMethods<Self> {
        ExposedMethods::new()
            .method("add", |_, params| {
                let sum = hostrpc_common::from_params::<(i64, i64)>(params).map(|(a, b)| json!(a + b));
                async move { sum }
            })
            .method("fail", |_, _| async { Err(HostRpcError::handler("division by zero")) })
    }
}

struct Ticker {
    subscriptions: Subscriptions,
    subscribe_calls: AtomicUsize,
    unsubscribe_calls: AtomicUsize,
}

impl Ticker {
    fn fire(&self, params: Value) -> Result<Value> {
        let event: String = hostrpc_common::single_param(params)?;
        let sent = self.subscriptions.publish(&event, json!({ "event": event }))?;
        Ok(json!(sent))
    }

    fn counts(&self) -> Value {
        json!([
            self.subscribe_calls.load(Ordering::SeqCst),
            self.unsubscribe_calls.load(Ordering::SeqCst)
        ])
    }
}

impl SubscribableModule for Ticker {
    fn subscribe(&self, event: &str) -> Result<()> {
        self.subscribe_calls.fetch_add(1, Ordering::SeqCst);
        self.subscriptions.add(event);
        Ok(())
    }

    fn unsubscribe(&self, event: &str) -> Result<()> {
        self.unsubscribe_calls.fetch_add(1, Ordering::SeqCst);
        self.subscriptions.remove(event);
        Ok(())
    }
}

impl Module for Ticker {
    fn create(ctx: ModuleContext) -> Result<Self> {
        Ok(Ticker {
            subscriptions: Subscriptions::new(ctx),
            subscribe_calls: AtomicUsize::new(0),
            unsubscribe_calls: AtomicUsize::new(0),
        })
    }

    fn exposed_methods() -> ExposedMethods<Self> {
        subscribable_methods::<Self>()
            .method("fire", |this, params| async move { this.fire(params) })
            .method("counts", |this, _| async move { Ok(this.counts()) })
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn registry() -> Arc<Registry> {
    Arc::new(
        Registry::new()
            .with::<Calculator>("Calculator")
            .unwrap()
            .with::<Ticker>("Ticker")
            .unwrap(),
    )
}

fn setup() -> (Host, RpcClient) {
    let (host_side, client_side) = MemoryTransport::pair();
    let host = Host::new(host_side, registry()).unwrap();
    host.enable();
    let client = RpcClient::new(client_side).unwrap();
    (host, client)
}

async fn within<F: std::future::Future>(future: F) -> F::Output {
    tokio::time::timeout(Duration::from_secs(5), future)
        .await
        .expect("timed out")
}

// ============================================================================
// Calls
// ============================================================================

#[tokio::test]
async fn test_load_and_call() {
    let (host, client) = setup();

    let modules = within(client.load_modules(&["Calculator"])).await.unwrap();
    let sum = within(modules[0].call("add", json!([2, 3]))).await.unwrap();

    assert_eq!(sum, json!(5));
    assert_eq!(host.instance_names(), vec!["Calculator".to_string()]);
}

#[tokio::test]
async fn test_load_unknown_lists_missing_names() {
    let (host, client) = setup();

    let err = within(client.load_modules(&["Calculator", "Ghost", "Phantom"]))
        .await
        .unwrap_err();

    assert_eq!(err.to_string(), "These modules are not exposed: Ghost,Phantom");
    assert!(host.instance_names().is_empty());
}

#[tokio::test]
async fn test_remote_failure_keeps_message() {
    let (_host, client) = setup();
    let calculator = within(client.load_modules(&["Calculator"])).await.unwrap().remove(0);

    let err = within(calculator.call("fail", Value::Null)).await.unwrap_err();
    assert!(matches!(err, HostRpcError::RemoteExecution { .. }));
    assert_eq!(err.to_string(), "division by zero");

    // The connection is still usable afterwards.
    let sum = within(calculator.call("add", json!([1, 1]))).await.unwrap();
    assert_eq!(sum, json!(2));
}

#[tokio::test]
async fn test_module_without_preload_is_unknown() {
    let (_host, client) = setup();

    let err = within(client.module("Calculator").call("add", json!([1, 2])))
        .await
        .unwrap_err();
    assert!(matches!(err, HostRpcError::UnknownMethod(ref m) if m == "Calculator.add"));
}

// ============================================================================
// Subscriptions
// ============================================================================

#[tokio::test]
async fn test_subscription_ref_counting_against_host() {
    let (_host, client) = setup();
    let ticker = within(client.load_modules(&["Ticker"])).await.unwrap().remove(0);
    let subscriber = ticker.subscriber();

    let first = within(subscriber.on("tick", |_| {})).await;
    let second = within(subscriber.on("tick", |_| {})).await;
    assert_eq!(within(ticker.call("counts", Value::Null)).await.unwrap(), json!([1, 0]));

    assert!(within(subscriber.off("tick", first)).await);
    assert_eq!(within(ticker.call("counts", Value::Null)).await.unwrap(), json!([1, 0]));

    assert!(within(subscriber.off("tick", second)).await);
    assert_eq!(within(ticker.call("counts", Value::Null)).await.unwrap(), json!([1, 1]));
}

#[tokio::test]
async fn test_published_events_are_delivered() {
    let (_host, client) = setup();
    let ticker = within(client.load_modules(&["Ticker"])).await.unwrap().remove(0);
    let subscriber = ticker.subscriber();

    let (tx, mut rx) = mpsc::unbounded_channel();
    within(subscriber.on("tick", move |data| {
        let _ = tx.send(data.clone());
    }))
    .await;

    let sent = within(ticker.call("fire", json!(["tick"]))).await.unwrap();
    assert_eq!(sent, json!(true));

    let data = within(rx.recv()).await.unwrap();
    assert_eq!(data, json!({ "event": "tick" }));
}

#[tokio::test]
async fn test_unsubscribed_events_are_not_published() {
    let (_host, client) = setup();
    let ticker = within(client.load_modules(&["Ticker"])).await.unwrap().remove(0);
    let subscriber = ticker.subscriber();

    let id = within(subscriber.on("tick", |_| {})).await;
    within(subscriber.off("tick", id)).await;

    let sent = within(ticker.call("fire", json!(["tick"]))).await.unwrap();
    assert_eq!(sent, json!(false));
}

// ============================================================================
// Teardown
// ============================================================================

#[tokio::test]
async fn test_host_unmount_disables_client() {
    let (host, client) = setup();
    within(client.load_modules(&["Calculator"])).await.unwrap();

    host.unmount();
    within(client.closed()).await;

    let err = within(client.call("Calculator.add", json!([1, 2]))).await.unwrap_err();
    assert!(matches!(err, HostRpcError::ConnectionClosed));
}

#[tokio::test]
async fn test_client_close_disables_host_connection() {
    let (host, client) = setup();

    client.close();
    within(host.closed()).await;
}
