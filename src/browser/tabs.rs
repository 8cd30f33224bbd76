//! Tab (target) management over the DevTools HTTP interface.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::{debug, info};

use crate::cdp::{connect_websocket, CdpSession};
use crate::options::Endpoint;
use crate::{HtmlPdfError, Result};

const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// A browser tab opened for one request.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tab {
    pub id: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub web_socket_debugger_url: Option<String>,
}

/// Opens, closes and attaches to tabs on a browser endpoint.
#[async_trait]
pub trait TabConnector: Send + Sync {
    async fn open_tab(&self, endpoint: &Endpoint) -> Result<Tab>;

    /// Closes `tab`. A tab that is already gone is not an error.
    async fn close_tab(&self, endpoint: &Endpoint, tab: &Tab) -> Result<()>;

    async fn connect(&self, endpoint: &Endpoint, tab: &Tab) -> Result<CdpSession>;
}

/// [`TabConnector`] backed by the `/json/*` HTTP endpoints and a websocket.
#[derive(Debug, Clone)]
pub struct DevToolsConnector {
    client: Client,
}

impl DevToolsConnector {
    pub fn new() -> Result<Self> {
        let client = Client::builder().timeout(HTTP_TIMEOUT).build()?;
        Ok(Self { client })
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl TabConnector for DevToolsConnector {
    async fn open_tab(&self, endpoint: &Endpoint) -> Result<Tab> {
        let url = format!("{}/json/new?about:blank", endpoint.http_base());
        debug!(%url, "opening tab");

        let mut response = self.client.put(&url).send().await.map_err(|e| connect_error(&url, e))?;
        // Browsers before M111 only accept GET here.
        if response.status() == StatusCode::METHOD_NOT_ALLOWED {
            response = self.client.get(&url).send().await.map_err(|e| connect_error(&url, e))?;
        }
        if !response.status().is_success() {
            return Err(HtmlPdfError::Connect {
                url,
                reason: format!("tab creation returned {}", response.status()),
            });
        }

        let tab: Tab = response.json().await?;
        info!(tab = %tab.id, %endpoint, "tab opened");
        Ok(tab)
    }

    async fn close_tab(&self, endpoint: &Endpoint, tab: &Tab) -> Result<()> {
        let url = format!("{}/json/close/{}", endpoint.http_base(), tab.id);
        let response = self.client.get(&url).send().await.map_err(|e| connect_error(&url, e))?;
        match response.status() {
            status if status.is_success() => {
                debug!(tab = %tab.id, "tab closed");
                Ok(())
            }
            StatusCode::NOT_FOUND => {
                debug!(tab = %tab.id, "tab already closed");
                Ok(())
            }
            status => Err(HtmlPdfError::Connect {
                url,
                reason: format!("tab close returned {status}"),
            }),
        }
    }

    async fn connect(&self, endpoint: &Endpoint, tab: &Tab) -> Result<CdpSession> {
        let ws_url = websocket_url(endpoint, tab)?;
        connect_websocket(&ws_url).await
    }
}

fn connect_error(url: &str, err: reqwest::Error) -> HtmlPdfError {
    HtmlPdfError::Connect {
        url: url.to_string(),
        reason: err.to_string(),
    }
}

/// The tab's websocket URL, addressed at `endpoint`.
///
/// The browser reports URLs using its own idea of its host, which is wrong
/// when it sits behind a proxy or inside a container.
pub(crate) fn websocket_url(endpoint: &Endpoint, tab: &Tab) -> Result<String> {
    let reported = tab
        .web_socket_debugger_url
        .clone()
        .unwrap_or_else(|| format!("ws://{}/devtools/page/{}", endpoint, tab.id));
    let mut url = url::Url::parse(&reported)?;
    url.set_host(Some(&endpoint.host))?;
    url.set_port(Some(endpoint.port)).map_err(|_| HtmlPdfError::Connect {
        url: reported.clone(),
        reason: "websocket URL cannot carry a port".to_string(),
    })?;
    Ok(url.to_string())
}
