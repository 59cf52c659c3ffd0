//! Local event bus
//!
//! Purely in-process signalling: nothing emitted here crosses the wire.
//! Connections use it for `error` and lifecycle signals, and re-emit peer
//! notifications on it so listeners can observe them by method name.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use serde_json::Value;

/// Callback invoked with the event data.
pub type Listener = Arc<dyn Fn(&Value) + Send + Sync>;

/// Handle returned by [`EventBus::on`], used to remove the listener again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

#[derive(Default)]
pub struct EventBus {
    next_id: AtomicU64,
    listeners: Mutex<HashMap<String, Vec<(ListenerId, Listener)>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a listener for `event`.
    pub fn on(&self, event: &str, listener: Listener) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(event.to_string())
            .or_default()
            .push((id, listener));
        id
    }

    /// Removes a listener. Returns `false` if it was not registered for `event`.
    pub fn off(&self, event: &str, id: ListenerId) -> bool {
        let mut listeners = self.listeners.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(entries) = listeners.get_mut(event) else {
            return false;
        };

        let before = entries.len();
        entries.retain(|(existing, _)| *existing != id);
        let removed = entries.len() != before;
        if entries.is_empty() {
            listeners.remove(event);
        }
        removed
    }

    /// Calls every listener of `event` in registration order.
    ///
    /// Listeners run outside the internal lock, so a listener may add or
    /// remove listeners (its changes apply from the next emit on).
    pub fn emit(&self, event: &str, data: &Value) {
        let snapshot: Vec<Listener> = self
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(event)
            .map(|entries| entries.iter().map(|(_, listener)| listener.clone()).collect())
            .unwrap_or_default();

        for listener in snapshot {
            listener(data);
        }
    }

    pub fn listener_count(&self, event: &str) -> usize {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(event)
            .map_or(0, Vec::len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;

    fn counter() -> (Arc<AtomicUsize>, Listener) {
        let count = Arc::new(AtomicUsize::new(0));
        let seen = count.clone();
        (count, Arc::new(move |_: &Value| {
            seen.fetch_add(1, Ordering::SeqCst);
        }))
    }

    #[test]
    fn test_emit_reaches_only_matching_listeners() {
        let bus = EventBus::new();
        let (ticks, on_tick) = counter();
        let (tocks, on_tock) = counter();
        bus.on("tick", on_tick);
        bus.on("tock", on_tock);

        bus.emit("tick", &json!(1));
        bus.emit("tick", &json!(2));

        assert_eq!(ticks.load(Ordering::SeqCst), 2);
        assert_eq!(tocks.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_off_removes_one_listener() {
        let bus = EventBus::new();
        let (count, listener) = counter();
        let first = bus.on("tick", listener.clone());
        bus.on("tick", listener);

        assert!(bus.off("tick", first));
        assert!(!bus.off("tick", first));
        assert_eq!(bus.listener_count("tick"), 1);

        bus.emit("tick", &Value::Null);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_listener_may_unregister_itself() {
        let bus = Arc::new(EventBus::new());
        let slot: Arc<Mutex<Option<ListenerId>>> = Arc::new(Mutex::new(None));

        let bus_in = bus.clone();
        let slot_in = slot.clone();
        let id = bus.on(
            "once",
            Arc::new(move |_: &Value| {
                if let Some(id) = slot_in.lock().unwrap().take() {
                    bus_in.off("once", id);
                }
            }),
        );
        *slot.lock().unwrap() = Some(id);

        bus.emit("once", &Value::Null);
        assert_eq!(bus.listener_count("once"), 0);
    }

    #[test]
    fn test_data_is_passed_through() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        bus.on("data", Arc::new(move |v: &Value| sink.lock().unwrap().push(v.clone())));

        bus.emit("data", &json!({"a": [1, 2]}));
        assert_eq!(*seen.lock().unwrap(), vec![json!({"a": [1, 2]})]);
    }
}
