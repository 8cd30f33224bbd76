use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::ErrorPayload;
use crate::generator::OutputKind;
use crate::result::MainResponse;
use crate::Viewport;

/// Schema version for output payloads.
pub const HTMLPDF_OUTPUT_VERSION: &str = "0.1.0";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "kebab-case")]
pub enum HtmlPdfOutput {
    Render(RenderOutput),
    Error(ErrorOutput),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InputKind {
    Url,
    Html,
    File,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputDescriptor {
    pub kind: InputKind,
    /// The URL or file path; inline HTML is summarized by its length.
    pub value: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    Pdf,
    Screenshot,
}

impl From<OutputKind> for ArtifactKind {
    fn from(kind: OutputKind) -> Self {
        match kind {
            OutputKind::Pdf => ArtifactKind::Pdf,
            OutputKind::Screenshot => ArtifactKind::Screenshot,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderOutput {
    pub version: String,
    pub kind: ArtifactKind,
    pub input: InputDescriptor,
    pub output_path: PathBuf,
    /// Decoded size of the written file.
    pub bytes: usize,
    pub elapsed_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub viewport: Option<Viewport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trigger: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<MainResponse>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorOutput {
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub error: ErrorPayload,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCategory;
    use std::collections::BTreeMap;

    #[test]
    fn render_output_serializes() {
        let output = HtmlPdfOutput::Render(RenderOutput {
            version: HTMLPDF_OUTPUT_VERSION.to_string(),
            kind: ArtifactKind::Pdf,
            input: InputDescriptor {
                kind: InputKind::Url,
                value: "https://example.com".to_string(),
            },
            output_path: PathBuf::from("out.pdf"),
            bytes: 2048,
            elapsed_ms: 840,
            viewport: None,
            trigger: Some("variable:htmlPdfDone".to_string()),
            response: Some(MainResponse {
                url: "https://example.com/".to_string(),
                status: 200,
                status_text: "OK".to_string(),
                headers: BTreeMap::new(),
                mime_type: Some("text/html".to_string()),
            }),
        });

        let json = serde_json::to_string(&output).expect("serialize render output");
        assert!(json.contains("\"mode\":\"render\""));
        assert!(json.contains("\"kind\":\"pdf\""));
        assert!(json.contains("\"outputPath\":\"out.pdf\""));
        assert!(json.contains("\"status\":200"));
        assert!(!json.contains("viewport"));
    }

    #[test]
    fn error_output_serializes() {
        let output = HtmlPdfOutput::Error(ErrorOutput {
            version: HTMLPDF_OUTPUT_VERSION.to_string(),
            message: Some("generation timed out".to_string()),
            error: ErrorPayload::new(
                ErrorCategory::Timeout,
                "generation timed out".to_string(),
                "Increase --timeout",
            ),
        });

        let json = serde_json::to_string(&output).expect("serialize error output");
        assert!(json.contains("\"mode\":\"error\""));
        assert!(json.contains("\"category\":\"timeout\""));
    }
}
