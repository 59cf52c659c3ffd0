//! Built-in method, notification and event names
//!
//! Names shared by both sides of a connection. Keeping them in one place is
//! the single source of truth for the wire contract between host and client.

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ============================================================================
// Peer-facing methods
// ============================================================================

/// Host request: instantiate every named module, failing if any is unknown.
pub const LOAD_MODULES: &str = "LoadModules";

/// Subscribable module request: start forwarding an event.
pub const SUBSCRIBE: &str = "subscribe";

/// Subscribable module request: stop forwarding an event.
pub const UNSUBSCRIBE: &str = "unsubscribe";

/// Best-effort teardown notification sent by a host before it unmounts.
pub const KILL: &str = "SIGKILL";

/// Notification a subscribable module publishes for every forwarded event.
pub const SUBSCRIBED_EVENT: &str = "SubscribedEvent";

// ============================================================================
// Local event bus names
// ============================================================================

/// Local errors: handler failures, protocol errors, hook failures.
pub const ERROR_EVENT: &str = "error";

pub const SYSTEM_WILL_ENABLE: &str = "systemWillEnable";
pub const SYSTEM_WILL_UNMOUNT: &str = "systemWillUnmount";
pub const SYSTEM_DID_UNMOUNT: &str = "systemDidUnmount";

/// Joins a module's api name and a member name into its wire name.
///
/// # Example
/// ```rust
/// use hostrpc_common::protocol::builtin::namespaced;
///
/// assert_eq!(namespaced("Store", "get"), "Store.get");
/// ```
pub fn namespaced(api_name: &str, member: &str) -> String {
    format!("{}.{}", api_name, member)
}

/// Payload of a [`SUBSCRIBED_EVENT`] notification.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SubscribedEvent {
    /// Name of the event on the publishing side
    pub event: String,
    /// Event data, forwarded untouched
    #[serde(default)]
    pub data: Value,
}

impl SubscribedEvent {
    pub fn new(event: impl Into<String>, data: Value) -> Self {
        Self {
            event: event.into(),
            data,
        }
    }
}
