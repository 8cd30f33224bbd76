//! The value returned by a successful generation.

use std::collections::BTreeMap;
use std::io::Cursor;
use std::path::Path;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::cdp::events::ResponsePayload;
use crate::Result;

/// Metadata of the main document's response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MainResponse {
    pub url: String,
    pub status: u16,
    pub status_text: String,
    pub headers: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

impl From<ResponsePayload> for MainResponse {
    fn from(payload: ResponsePayload) -> Self {
        let headers = payload
            .headers
            .into_iter()
            .map(|(name, value)| {
                let value = match value {
                    Value::String(s) => s,
                    other => other.to_string(),
                };
                (name, value)
            })
            .collect();
        Self {
            url: payload.url,
            status: payload.status,
            status_text: payload.status_text,
            headers,
            mime_type: payload.mime_type,
        }
    }
}

/// Base64 output of the capture call plus the main response, if one was seen.
#[derive(Debug, Clone, PartialEq)]
pub struct CreateResult {
    data: String,
    response: Option<MainResponse>,
}

impl CreateResult {
    pub fn new(data: String, response: Option<MainResponse>) -> Self {
        Self { data, response }
    }

    /// The payload exactly as the browser reported it.
    pub fn to_base64(&self) -> &str {
        &self.data
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(STANDARD.decode(&self.data)?)
    }

    /// A reader over the decoded payload; also usable as a tokio `AsyncRead`.
    pub fn to_reader(&self) -> Result<Cursor<Vec<u8>>> {
        Ok(Cursor::new(self.to_bytes()?))
    }

    /// Writes the decoded payload to `path`, creating parent directories.
    pub async fn to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, self.to_bytes()?).await?;
        Ok(())
    }

    pub fn response(&self) -> Option<&MainResponse> {
        self.response.as_ref()
    }

    pub fn into_base64(self) -> String {
        self.data
    }
}
