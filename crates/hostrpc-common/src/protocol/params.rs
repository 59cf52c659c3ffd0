//! Decoding helpers for handler params.
//!
//! Params are opaque JSON on the wire. Callers usually send either a single
//! value, a positional array or an object; these helpers turn them into
//! typed values and report mismatches as [`HostRpcError::InvalidParams`].

use serde::de::DeserializeOwned;
use serde_json::Value;

use super::error::{HostRpcError, Result};

/// Deserializes the whole params value into `T`.
pub fn from_params<T: DeserializeOwned>(params: Value) -> Result<T> {
    serde_json::from_value(params).map_err(|e| HostRpcError::InvalidParams(e.to_string()))
}

/// Deserializes a single argument.
///
/// A one-element array is unwrapped first, so `"x"` and `["x"]` both decode
/// to the same value.
pub fn single_param<T: DeserializeOwned>(params: Value) -> Result<T> {
    let value = match params {
        Value::Array(mut items) if items.len() == 1 => items.remove(0),
        other => other,
    };
    from_params(value)
}
