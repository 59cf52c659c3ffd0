//! Tests for the error taxonomy and its wire representation
//!
//! These tests verify that errors survive the trip through an error payload
//! with their message (and, for unknown methods, their identity) intact.

#[cfg(test)]
mod tests {
    use super::super::envelope::*;
    use super::super::*;
    use serde_json::json;

    #[test]
    fn test_handler_error_keeps_message() {
        let err = HostRpcError::handler("boom");
        let payload = ErrorPayload::from(&err);
        assert_eq!(payload.code, REMOTE_EXECUTION_ERROR);
        assert_eq!(payload.message, "boom");

        let rebuilt = HostRpcError::from(payload);
        assert_eq!(rebuilt.to_string(), "boom");
        assert!(matches!(rebuilt, HostRpcError::RemoteExecution { .. }));
    }

    #[test]
    fn test_unknown_method_identity_survives() {
        let err = HostRpcError::UnknownMethod("Ghost.haunt".into());
        let rebuilt = HostRpcError::from(ErrorPayload::from(&err));
        match rebuilt {
            HostRpcError::UnknownMethod(method) => assert_eq!(method, "Ghost.haunt"),
            other => panic!("Expected UnknownMethod, got {:?}", other),
        }
    }

    #[test]
    fn test_method_not_found_without_data_is_remote_execution() {
        let payload = ErrorPayload::new(METHOD_NOT_FOUND, "Method not found");
        let rebuilt = HostRpcError::from(payload);
        assert!(matches!(
            rebuilt,
            HostRpcError::RemoteExecution { code: METHOD_NOT_FOUND, .. }
        ));
    }

    #[test]
    fn test_modules_not_found_lists_names() {
        let err = HostRpcError::ModulesNotFound(vec!["A".into(), "B".into()]);
        assert_eq!(err.to_string(), "These modules are not exposed: A,B");

        let payload = ErrorPayload::from(&err);
        assert_eq!(payload.code, MODULES_NOT_FOUND);
        assert_eq!(payload.data, Some(json!({"missing": ["A", "B"]})));
    }

    #[test]
    fn test_forwarded_remote_error_keeps_code() {
        let err = HostRpcError::RemoteExecution {
            message: "nested".into(),
            code: -32099,
            data: Some(json!({"hop": 2})),
        };
        let payload = ErrorPayload::from(&err);
        assert_eq!(payload.code, -32099);
        assert_eq!(payload.message, "nested");
        assert_eq!(payload.data, Some(json!({"hop": 2})));
    }

    #[test]
    fn test_error_event_payload() {
        let event = HostRpcError::ConnectionClosed.to_event();
        assert_eq!(event["kind"], "connection_closed");
        assert_eq!(event["message"], "Connection closed");
    }
}
