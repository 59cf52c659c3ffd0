use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::protocol::envelope::{Envelope, ErrorPayload, Notification, Request, RequestId, Response};
use crate::protocol::error::{HostRpcError, Result};

/// Wire shape shared by all three envelope kinds.
///
/// Presence of `method` marks a request or notification (requests also carry
/// `id`); presence of `result` or `error` marks a response.
#[derive(Debug, Default, Serialize, Deserialize)]
struct WireEnvelope {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<RequestId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    method: Option<String>,
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    params: Option<Value>,
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<ErrorPayload>,
}

/// Keeps an explicit `null` distinct from an absent field.
fn present<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Option<Value>, D::Error> {
    Value::deserialize(deserializer).map(Some)
}

/// JSON codec turning envelopes into transport strings and back.
///
/// Encoding is pure. Decoding rejects anything that is not exactly one of
/// the three envelope kinds with [`HostRpcError::Protocol`].
///
/// # Example
///
/// ```
/// use hostrpc_common::protocol::{Envelope, Notification};
/// use hostrpc_common::transport::JsonCodec;
/// use serde_json::json;
///
/// let envelope = Envelope::from(Notification::new("Ticker.tick", json!([1])));
/// let wire = JsonCodec::encode(&envelope).unwrap();
/// assert_eq!(JsonCodec::decode(&wire).unwrap(), envelope);
///
/// assert!(JsonCodec::decode("{\"id\": 1}").is_err());
/// ```
pub struct JsonCodec;

impl JsonCodec {
    /// Encode an envelope to its wire string
    pub fn encode(envelope: &Envelope) -> Result<String> {
        let wire = match envelope {
            Envelope::Request(request) => WireEnvelope {
                id: Some(request.id.clone()),
                method: Some(request.method.clone()),
                params: Some(request.params.clone()),
                ..WireEnvelope::default()
            },
            Envelope::Notification(notification) => WireEnvelope {
                method: Some(notification.method.clone()),
                params: Some(notification.params.clone()),
                ..WireEnvelope::default()
            },
            Envelope::Response(response) => match &response.outcome {
                Ok(result) => WireEnvelope {
                    id: Some(response.id.clone()),
                    result: Some(result.clone()),
                    ..WireEnvelope::default()
                },
                Err(error) => WireEnvelope {
                    id: Some(response.id.clone()),
                    error: Some(error.clone()),
                    ..WireEnvelope::default()
                },
            },
        };

        Ok(serde_json::to_string(&wire)?)
    }

    /// Decode a wire string into an envelope
    ///
    /// # Errors
    ///
    /// Returns [`HostRpcError::Protocol`] if:
    /// - The string is not valid JSON or not a JSON object
    /// - Both `method` and `result`/`error` are present
    /// - Both `result` and `error` are present
    /// - A response has no `id`
    /// - Neither `method` nor `result`/`error` is present
    pub fn decode(data: &str) -> Result<Envelope> {
        let value: Value =
            serde_json::from_str(data).map_err(|e| HostRpcError::Protocol(format!("invalid JSON: {}", e)))?;

        if !value.is_object() {
            return Err(HostRpcError::Protocol("envelope must be a JSON object".into()));
        }

        let wire: WireEnvelope = serde_json::from_value(value)
            .map_err(|e| HostRpcError::Protocol(format!("malformed envelope: {}", e)))?;

        let WireEnvelope {
            id,
            method,
            params,
            result,
            error,
        } = wire;

        match (method, result, error) {
            (Some(_), Some(_), _) | (Some(_), _, Some(_)) => Err(HostRpcError::Protocol(
                "envelope cannot carry both a method and a result or error".into(),
            )),
            (Some(method), None, None) => {
                let params = params.unwrap_or(Value::Null);
                Ok(match id {
                    Some(id) => Envelope::Request(Request::new(id, method, params)),
                    None => Envelope::Notification(Notification::new(method, params)),
                })
            }
            (None, Some(_), Some(_)) => Err(HostRpcError::Protocol(
                "response cannot carry both a result and an error".into(),
            )),
            (None, Some(result), None) => Ok(Envelope::Response(Response::success(
                Self::response_id(id)?,
                result,
            ))),
            (None, None, Some(error)) => Ok(Envelope::Response(Response::error(
                Self::response_id(id)?,
                error,
            ))),
            (None, None, None) => Err(HostRpcError::Protocol(
                "envelope has neither a method nor a result or error".into(),
            )),
        }
    }

    fn response_id(id: Option<RequestId>) -> Result<RequestId> {
        id.ok_or_else(|| HostRpcError::Protocol("response without id".into()))
    }
}
