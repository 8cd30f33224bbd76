use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::ParseError;

/// Message reported when the operation-wide deadline elapses.
pub const TIMEOUT_MESSAGE: &str = "generation timed out";

/// Message reported when the main document fails to load.
pub const NAVIGATION_FAILED_MESSAGE: &str = "page navigation failed";

/// Message reported when the protocol connection drops mid-operation.
pub const CONNECTION_LOST_MESSAGE: &str = "connection to the browser was lost";

#[derive(Debug, Error)]
pub enum HtmlPdfError {
    #[error("Failed to launch browser: {0}")]
    Launch(String),

    #[error("{}", TIMEOUT_MESSAGE)]
    Timeout,

    /// Carries the trigger's own configured message verbatim.
    #[error("{0}")]
    TriggerTimeout(String),

    #[error("{}", NAVIGATION_FAILED_MESSAGE)]
    NavigationFailed { reason: String },

    #[error("{}", CONNECTION_LOST_MESSAGE)]
    ConnectionLost,

    #[error("Completion trigger failed: {0}")]
    TriggerEvaluation(String),

    #[error("Failed to connect to DevTools at {url}: {reason}")]
    Connect { url: String, reason: String },

    #[error("Protocol error in {method} ({code}): {message}")]
    Protocol {
        method: String,
        code: i64,
        message: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] ParseError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid base64 payload: {0}")]
    Decode(#[from] base64::DecodeError),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl HtmlPdfError {
    pub fn launch(message: impl Into<String>) -> Self {
        HtmlPdfError::Launch(message.into())
    }

    pub fn protocol(method: impl Into<String>, code: i64, message: impl Into<String>) -> Self {
        HtmlPdfError::Protocol {
            method: method.into(),
            code,
            message: message.into(),
        }
    }

    /// True for the outcomes recorded by the exit-condition arbiter.
    pub fn is_terminal_signal(&self) -> bool {
        matches!(
            self,
            HtmlPdfError::Timeout
                | HtmlPdfError::NavigationFailed { .. }
                | HtmlPdfError::ConnectionLost
        )
    }

    pub fn to_payload(&self) -> ErrorPayload {
        match self {
            HtmlPdfError::Launch(msg) => ErrorPayload::new(
                ErrorCategory::Launch,
                format!("Failed to launch browser: {msg}"),
                "Install Chrome/Chromium or pass --chrome-path (or set CHROME_PATH).",
            ),
            HtmlPdfError::Timeout => ErrorPayload::new(
                ErrorCategory::Timeout,
                self.to_string(),
                "Increase --timeout or check that the page finishes loading.",
            ),
            HtmlPdfError::TriggerTimeout(msg) => ErrorPayload::new(
                ErrorCategory::Trigger,
                msg.clone(),
                "Check that the page signals completion, or raise --wait-timeout.",
            ),
            HtmlPdfError::NavigationFailed { reason } => ErrorPayload::new(
                ErrorCategory::Navigation,
                format!("{self} ({reason})"),
                "Verify the URL is reachable from the browser host.",
            ),
            HtmlPdfError::ConnectionLost => ErrorPayload::new(
                ErrorCategory::Connection,
                self.to_string(),
                "The browser exited or closed the tab; re-run with --verbose for details.",
            ),
            HtmlPdfError::TriggerEvaluation(text) => ErrorPayload::new(
                ErrorCategory::Trigger,
                text.clone(),
                "Inspect the page script that the completion trigger depends on.",
            ),
            HtmlPdfError::Connect { .. } => ErrorPayload::new(
                ErrorCategory::Connection,
                self.to_string(),
                "Check --host/--port and that the browser was started with remote debugging.",
            ),
            HtmlPdfError::Protocol { .. } => ErrorPayload::new(
                ErrorCategory::Protocol,
                self.to_string(),
                "Re-run with --verbose; the browser may not support this option.",
            ),
            HtmlPdfError::Io(e) => ErrorPayload::new(
                ErrorCategory::Io,
                e.to_string(),
                "Check file paths/permissions.",
            ),
            HtmlPdfError::Network(e) => ErrorPayload::new(
                ErrorCategory::Connection,
                e.to_string(),
                "Check that the DevTools HTTP endpoint is reachable.",
            ),
            HtmlPdfError::InvalidUrl(e) => ErrorPayload::new(
                ErrorCategory::Config,
                e.to_string(),
                "Verify URL/format (e.g., https://example.com).",
            ),
            HtmlPdfError::Serialization(e) => ErrorPayload::new(
                ErrorCategory::Protocol,
                e.to_string(),
                "Re-run with --verbose for details.",
            ),
            HtmlPdfError::Decode(e) => ErrorPayload::new(
                ErrorCategory::Protocol,
                e.to_string(),
                "The browser returned a malformed payload; re-run with --verbose.",
            ),
            HtmlPdfError::Config(msg) => {
                let lower = msg.to_ascii_lowercase();
                if lower.contains("wait-for") || lower.contains("trigger") {
                    ErrorPayload::new(
                        ErrorCategory::Config,
                        msg.clone(),
                        "Use one of: timer, event:NAME[@SELECTOR], callback[:NAME], element:SELECTOR, variable[:NAME], lifecycle[:NAME].",
                    )
                } else if lower.contains("viewport") {
                    ErrorPayload::new(
                        ErrorCategory::Config,
                        msg.clone(),
                        "Use WIDTHxHEIGHT with positive values (e.g., 1920x1080).",
                    )
                } else {
                    ErrorPayload::new(
                        ErrorCategory::Config,
                        msg.clone(),
                        "Check flags/paths and the config file.",
                    )
                }
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, HtmlPdfError>;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ErrorCategory {
    Config,
    Launch,
    Timeout,
    Navigation,
    Connection,
    Trigger,
    Protocol,
    Io,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorPayload {
    pub category: ErrorCategory,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remediation: Option<String>,
}

impl ErrorPayload {
    pub fn new(category: ErrorCategory, message: String, remediation: impl Into<String>) -> Self {
        Self {
            category,
            message,
            remediation: Some(remediation.into()),
        }
    }
}
