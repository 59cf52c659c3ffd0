//! Envelope Types
//!
//! The three units of wire communication: requests, responses and
//! notifications. Error payloads follow the JSON-RPC 2.0 error object
//! (`{code, message, data}`) and reuse its standard codes.
//!
//! # Error Codes
//!
//! - `-32700`: Parse error
//! - `-32600`: Invalid request
//! - `-32601`: Method not found
//! - `-32602`: Invalid params
//! - `-32603`: Internal error
//! - `-32000`: Remote execution error (a handler failed)
//! - `-32004`: Requested modules are not registered
//!
//! # Example
//!
//! ```
//! use hostrpc_common::protocol::{Envelope, ErrorPayload, Request, Response, RequestId};
//! use serde_json::json;
//!
//! let request = Request::new(RequestId::from(1), "Echo.echo", json!(["hi"]));
//! let ok = Response::success(request.id.clone(), json!("hi"));
//! let failed = Response::error(request.id.clone(), ErrorPayload::method_not_found("Echo.echo"));
//!
//! assert!(matches!(Envelope::from(ok), Envelope::Response(_)));
//! assert!(failed.outcome.is_err());
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Invalid JSON was received
pub const PARSE_ERROR: i32 = -32700;
/// The JSON sent is not a valid envelope
pub const INVALID_REQUEST: i32 = -32600;
/// The method does not exist / is not exposed
pub const METHOD_NOT_FOUND: i32 = -32601;
/// Invalid method parameter(s)
pub const INVALID_PARAMS: i32 = -32602;
/// Internal error on the responding side
pub const INTERNAL_ERROR: i32 = -32603;
/// A handler raised an error while executing
pub const REMOTE_EXECUTION_ERROR: i32 = -32000;
/// `LoadModules` named at least one unregistered module
pub const MODULES_NOT_FOUND: i32 = -32004;

/// Correlation id tying a response to its request.
///
/// Ids this crate allocates are always non-negative integers. A peer may use
/// any JSON number or string; its ids are echoed back untouched.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    Number(serde_json::Number),
    String(String),
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RequestId::Number(n) => write!(f, "{}", n),
            RequestId::String(s) => write!(f, "{:?}", s),
        }
    }
}

impl From<u64> for RequestId {
    fn from(id: u64) -> Self {
        RequestId::Number(id.into())
    }
}

/// Error object carried by a failed response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorPayload {
    /// Error code (standard codes are negative integers). Peers may omit
    /// it, in which case the failure counts as a remote execution error.
    #[serde(default = "default_error_code")]
    pub code: i32,
    /// Human readable description, preserved across the boundary
    pub message: String,
    /// Additional structured data
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

fn default_error_code() -> i32 {
    REMOTE_EXECUTION_ERROR
}

impl ErrorPayload {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    /// Method-not-found error naming the missing method in `data.method`.
    pub fn method_not_found(method: &str) -> Self {
        Self {
            code: METHOD_NOT_FOUND,
            message: format!("Method not found: {}", method),
            data: Some(json!({ "method": method })),
        }
    }

    pub fn invalid_request(msg: &str) -> Self {
        Self::new(INVALID_REQUEST, msg)
    }

    pub fn remote_execution(msg: &str) -> Self {
        Self::new(REMOTE_EXECUTION_ERROR, msg)
    }

    pub fn internal_error(msg: &str) -> Self {
        Self::new(INTERNAL_ERROR, msg)
    }
}

/// A call expecting exactly one response.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub id: RequestId,
    pub method: String,
    pub params: Value,
}

impl Request {
    pub fn new(id: RequestId, method: impl Into<String>, params: Value) -> Self {
        Self {
            id,
            method: method.into(),
            params,
        }
    }
}

/// The answer to a request: exactly one of a result or an error.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub id: RequestId,
    pub outcome: std::result::Result<Value, ErrorPayload>,
}

impl Response {
    /// Creates a successful response.
    ///
    /// # Arguments
    ///
    /// * `id` - The request identifier (must match the request's ID)
    /// * `result` - The result value, `null` included
    pub fn success(id: RequestId, result: Value) -> Self {
        Self {
            id,
            outcome: Ok(result),
        }
    }

    /// Creates an error response.
    ///
    /// # Arguments
    ///
    /// * `id` - The request identifier (must match the request's ID)
    /// * `error` - The error payload describing the failure
    pub fn error(id: RequestId, error: ErrorPayload) -> Self {
        Self {
            id,
            outcome: Err(error),
        }
    }
}

/// Fire-and-forget message; never answered.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub method: String,
    pub params: Value,
}

impl Notification {
    pub fn new(method: impl Into<String>, params: Value) -> Self {
        Self {
            method: method.into(),
            params,
        }
    }
}

/// Tagged union of everything that crosses a transport.
#[derive(Debug, Clone, PartialEq)]
pub enum Envelope {
    Request(Request),
    Response(Response),
    Notification(Notification),
}

impl From<Request> for Envelope {
    fn from(request: Request) -> Self {
        Envelope::Request(request)
    }
}

impl From<Response> for Envelope {
    fn from(response: Response) -> Self {
        Envelope::Response(response)
    }
}

impl From<Notification> for Envelope {
    fn from(notification: Notification) -> Self {
        Envelope::Notification(notification)
    }
}
