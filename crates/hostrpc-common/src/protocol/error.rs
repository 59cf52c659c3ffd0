use serde_json::{json, Value};
use thiserror::Error;

use super::envelope::{
    ErrorPayload, INTERNAL_ERROR, INVALID_PARAMS, METHOD_NOT_FOUND, MODULES_NOT_FOUND, PARSE_ERROR,
    REMOTE_EXECUTION_ERROR,
};

#[derive(Error, Debug)]
pub enum HostRpcError {
    /// A wire message could not be decoded into an envelope.
    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Method not found: {0}")]
    UnknownMethod(String),

    #[error("Module is not registered: {0}")]
    UnregisteredModule(String),

    #[error("Module is already registered: {0}")]
    DuplicateRegistration(String),

    #[error("These modules are not exposed: {}", .0.join(","))]
    ModulesNotFound(Vec<String>),

    /// A handler on the peer failed. Displays the peer's message verbatim.
    #[error("{message}")]
    RemoteExecution {
        message: String,
        code: i32,
        data: Option<Value>,
    },

    /// Raised by a local handler; travels to the caller as a remote execution error.
    #[error("{0}")]
    Handler(String),

    #[error("Invalid params: {0}")]
    InvalidParams(String),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Host has been unmounted")]
    Unmounted,

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("JSON serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl HostRpcError {
    /// Shorthand for the error a failing handler returns.
    pub fn handler(message: impl Into<String>) -> Self {
        HostRpcError::Handler(message.into())
    }

    /// Short machine-friendly name of the variant, used in local `error` events.
    pub fn kind(&self) -> &'static str {
        match self {
            HostRpcError::Protocol(_) => "protocol",
            HostRpcError::UnknownMethod(_) => "unknown_method",
            HostRpcError::UnregisteredModule(_) => "unregistered_module",
            HostRpcError::DuplicateRegistration(_) => "duplicate_registration",
            HostRpcError::ModulesNotFound(_) => "modules_not_found",
            HostRpcError::RemoteExecution { .. } => "remote_execution",
            HostRpcError::Handler(_) => "handler",
            HostRpcError::InvalidParams(_) => "invalid_params",
            HostRpcError::ConnectionClosed => "connection_closed",
            HostRpcError::Unmounted => "unmounted",
            HostRpcError::Transport(_) => "transport",
            HostRpcError::Serialization(_) => "serialization",
            HostRpcError::Io(_) => "io",
        }
    }

    /// Payload for the local `error` event.
    pub fn to_event(&self) -> Value {
        json!({ "kind": self.kind(), "message": self.to_string() })
    }
}

impl From<&HostRpcError> for ErrorPayload {
    fn from(err: &HostRpcError) -> Self {
        match err {
            HostRpcError::UnknownMethod(method) => ErrorPayload {
                code: METHOD_NOT_FOUND,
                message: err.to_string(),
                data: Some(json!({ "method": method })),
            },
            HostRpcError::ModulesNotFound(names) => ErrorPayload {
                code: MODULES_NOT_FOUND,
                message: err.to_string(),
                data: Some(json!({ "missing": names })),
            },
            HostRpcError::InvalidParams(_) => ErrorPayload::new(INVALID_PARAMS, err.to_string()),
            HostRpcError::Protocol(_) => ErrorPayload::new(PARSE_ERROR, err.to_string()),
            // Forwarded errors keep their original code so chained hosts stay faithful.
            HostRpcError::RemoteExecution { message, code, data } => ErrorPayload {
                code: *code,
                message: message.clone(),
                data: data.clone(),
            },
            HostRpcError::Handler(message) => ErrorPayload::new(REMOTE_EXECUTION_ERROR, message.clone()),
            _ => ErrorPayload::new(INTERNAL_ERROR, err.to_string()),
        }
    }
}

impl From<ErrorPayload> for HostRpcError {
    fn from(payload: ErrorPayload) -> Self {
        if payload.code == METHOD_NOT_FOUND {
            if let Some(method) = payload
                .data
                .as_ref()
                .and_then(|data| data.get("method"))
                .and_then(Value::as_str)
            {
                return HostRpcError::UnknownMethod(method.to_string());
            }
        }

        HostRpcError::RemoteExecution {
            message: payload.message,
            code: payload.code,
            data: payload.data,
        }
    }
}

pub type Result<T> = std::result::Result<T, HostRpcError>;
