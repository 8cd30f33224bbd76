//! Typed payloads for the protocol events and results the generator reads.
//!
//! Only the fields that are consumed are declared; everything else in the
//! browser's payload is ignored during deserialization.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const LOAD_EVENT_FIRED: &str = "Page.loadEventFired";
pub const LIFECYCLE_EVENT: &str = "Page.lifecycleEvent";
pub const REQUEST_WILL_BE_SENT: &str = "Network.requestWillBeSent";
pub const RESPONSE_RECEIVED: &str = "Network.responseReceived";
pub const LOADING_FAILED: &str = "Network.loadingFailed";
pub const CONSOLE_API_CALLED: &str = "Runtime.consoleAPICalled";
pub const EXCEPTION_THROWN: &str = "Runtime.exceptionThrown";

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestWillBeSent {
    pub request_id: String,
    #[serde(default)]
    pub frame_id: Option<String>,
    #[serde(default, rename = "type")]
    pub resource_type: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseReceived {
    pub request_id: String,
    pub response: ResponsePayload,
}

/// Response metadata as reported by `Network.responseReceived`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponsePayload {
    pub url: String,
    pub status: u16,
    #[serde(default)]
    pub status_text: String,
    #[serde(default)]
    pub headers: BTreeMap<String, Value>,
    #[serde(default)]
    pub mime_type: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadingFailed {
    pub request_id: String,
    #[serde(default)]
    pub error_text: String,
    #[serde(default)]
    pub canceled: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LifecycleEvent {
    #[serde(default)]
    pub frame_id: Option<String>,
    pub name: String,
}

/// Mirror of the protocol's `Runtime.RemoteObject`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteObject {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtype: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unserializable_value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl RemoteObject {
    /// Human-readable rendering, preferring the by-value payload.
    pub fn display_text(&self) -> String {
        match (&self.value, &self.unserializable_value, &self.description) {
            (Some(Value::String(s)), _, _) => s.clone(),
            (Some(v), _, _) => v.to_string(),
            (None, Some(u), _) => u.clone(),
            (None, None, Some(d)) => d.clone(),
            (None, None, None) => self.kind.clone(),
        }
    }
}

/// Console message forwarded to `NetworkConfig::console_handler`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsoleApiCalled {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub args: Vec<RemoteObject>,
    #[serde(default)]
    pub timestamp: f64,
}

impl ConsoleApiCalled {
    /// Arguments joined with spaces, the way a devtools console shows them.
    pub fn text(&self) -> String {
        self.args
            .iter()
            .map(RemoteObject::display_text)
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExceptionDetails {
    #[serde(default)]
    pub exception_id: i64,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub line_number: i64,
    #[serde(default)]
    pub column_number: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exception: Option<RemoteObject>,
}

impl ExceptionDetails {
    /// The thrown value when available, otherwise the summary text.
    pub fn message(&self) -> String {
        self.exception
            .as_ref()
            .map(RemoteObject::display_text)
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| self.text.clone())
    }
}

/// Uncaught page exception forwarded to `NetworkConfig::exception_handler`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExceptionThrown {
    #[serde(default)]
    pub timestamp: f64,
    pub exception_details: ExceptionDetails,
}

/// Result of `Runtime.evaluate`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluateResult {
    #[serde(default)]
    pub result: RemoteObject,
    #[serde(default)]
    pub exception_details: Option<ExceptionDetails>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn response_received_reads_status_and_headers() {
        let event: ResponseReceived = serde_json::from_value(json!({
            "requestId": "1000.1",
            "type": "Document",
            "response": {
                "url": "https://example.com/",
                "status": 200,
                "statusText": "OK",
                "headers": {"content-type": "text/html"},
                "mimeType": "text/html",
                "connectionReused": false
            }
        }))
        .unwrap();
        assert_eq!(event.request_id, "1000.1");
        assert_eq!(event.response.status, 200);
        assert_eq!(event.response.headers["content-type"], "text/html");
        assert_eq!(event.response.mime_type.as_deref(), Some("text/html"));
    }

    #[test]
    fn console_text_joins_arguments() {
        let message: ConsoleApiCalled = serde_json::from_value(json!({
            "type": "log",
            "args": [
                {"type": "string", "value": "count"},
                {"type": "number", "value": 3},
                {"type": "number", "unserializableValue": "NaN"},
                {"type": "object", "description": "Window"}
            ],
            "executionContextId": 1,
            "timestamp": 10.0
        }))
        .unwrap();
        assert_eq!(message.kind, "log");
        assert_eq!(message.text(), "count 3 NaN Window");
    }

    #[test]
    fn exception_message_prefers_thrown_value() {
        let details: ExceptionDetails = serde_json::from_value(json!({
            "exceptionId": 1,
            "text": "Uncaught",
            "lineNumber": 0,
            "columnNumber": 0,
            "exception": {"type": "string", "value": "CompletionTrigger timed out."}
        }))
        .unwrap();
        assert_eq!(details.message(), "CompletionTrigger timed out.");

        let bare: ExceptionDetails =
            serde_json::from_value(json!({"text": "Uncaught SyntaxError"})).unwrap();
        assert_eq!(bare.message(), "Uncaught SyntaxError");
    }

    #[test]
    fn evaluate_result_tolerates_missing_fields() {
        let result: EvaluateResult =
            serde_json::from_value(json!({"result": {"type": "undefined"}})).unwrap();
        assert!(result.exception_details.is_none());
        assert_eq!(result.result.kind, "undefined");
    }
}
