//! Caller-facing request configuration.
//!
//! Everything here is read-only for the generator. Per-run arbitration
//! state lives in [`crate::generator::ControlState`], never in these types.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::cdp::events::{ConsoleApiCalled, ExceptionThrown};
use crate::trigger::CompletionTrigger;
use crate::Viewport;

/// Host used when only a port is supplied.
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Remote debugging port used when only a host is supplied.
pub const DEFAULT_PORT: u16 = 9222;

/// Default time allowed for a launched browser to report its DevTools endpoint.
pub const DEFAULT_STARTUP_TIMEOUT: Duration = Duration::from_secs(30);

/// Flags every launched browser gets, regardless of caller flags.
pub const REQUIRED_FLAGS: [&str; 3] = ["--disable-gpu", "--headless", "--hide-scrollbars"];

/// Address of a browser's remote debugging HTTP endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub fn local(port: u16) -> Self {
        Self::new(DEFAULT_HOST, port)
    }

    /// Base URL of the DevTools HTTP interface.
    pub fn http_base(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Launch-time settings, consumed only when no endpoint is supplied.
#[derive(Debug, Clone)]
pub struct LaunchConfig {
    /// Browser binary; discovered automatically when absent.
    pub chrome_path: Option<PathBuf>,
    /// Extra flags merged after [`REQUIRED_FLAGS`].
    pub chrome_flags: Vec<String>,
    pub startup_timeout: Duration,
}

impl Default for LaunchConfig {
    fn default() -> Self {
        Self {
            chrome_path: None,
            chrome_flags: Vec::new(),
            startup_timeout: DEFAULT_STARTUP_TIMEOUT,
        }
    }
}

impl LaunchConfig {
    /// Required flags followed by caller flags, without duplicates.
    pub fn effective_flags(&self) -> Vec<String> {
        let mut flags: Vec<String> = REQUIRED_FLAGS.iter().map(|f| f.to_string()).collect();
        for flag in &self.chrome_flags {
            let name = flag.split('=').next().unwrap_or(flag);
            let overrides = flags
                .iter()
                .position(|f| f.split('=').next().unwrap_or(f) == name);
            match overrides {
                Some(idx) => flags[idx] = flag.clone(),
                None => flags.push(flag.clone()),
            }
        }
        flags
    }
}

/// `Page.printToPDF` parameters, passed through untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrintOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub landscape: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_header_footer: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub print_background: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scale: Option<f64>,
    /// Inches.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paper_width: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paper_height: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub margin_top: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub margin_bottom: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub margin_left: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub margin_right: Option<f64>,
    /// e.g. `1-5, 8, 11-13`; empty prints everything.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_ranges: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub header_template: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub footer_template: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prefer_css_page_size: Option<bool>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    #[default]
    Png,
    Jpeg,
    Webp,
}

/// Region passed as `clip` to `Page.captureScreenshot`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Clip {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub scale: f64,
}

/// Screenshot settings: emulation applied before navigation plus the
/// `Page.captureScreenshot` parameters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScreenshotOptions {
    pub viewport: Viewport,
    pub mobile: bool,
    /// Grow the viewport to the document height before capturing.
    pub full_page: bool,
    pub format: ImageFormat,
    /// JPEG quality, 0-100.
    pub quality: Option<u8>,
    pub clip: Option<Clip>,
    pub from_surface: Option<bool>,
}

impl ScreenshotOptions {
    pub fn capture_params(&self) -> Value {
        let mut params = json!({ "format": self.format });
        if let Some(quality) = self.quality {
            params["quality"] = json!(quality.min(100));
        }
        if let Some(clip) = self.clip {
            params["clip"] = json!(clip);
        }
        if let Some(from_surface) = self.from_surface {
            params["fromSurface"] = json!(from_surface);
        }
        params
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SameSite {
    Strict,
    Lax,
    None,
}

/// A cookie set before navigation through `Network.setCookies`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cookie {
    pub name: String,
    pub value: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secure: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http_only: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub same_site: Option<SameSite>,
    /// Seconds since the UNIX epoch.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires: Option<f64>,
}

impl Cookie {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            url: None,
            domain: None,
            path: None,
            secure: None,
            http_only: None,
            same_site: None,
            expires: None,
        }
    }

    pub fn for_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }
}

pub type ConsoleHandler = Arc<dyn Fn(&ConsoleApiCalled) + Send + Sync>;
pub type ExceptionHandler = Arc<dyn Fn(&ExceptionThrown) + Send + Sync>;

/// Network state and page observers installed before navigation.
#[derive(Clone, Default)]
pub struct NetworkConfig {
    pub clear_cache: bool,
    pub cookies: Vec<Cookie>,
    pub extra_headers: BTreeMap<String, String>,
    pub console_handler: Option<ConsoleHandler>,
    pub exception_handler: Option<ExceptionHandler>,
}

impl fmt::Debug for NetworkConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NetworkConfig")
            .field("clear_cache", &self.clear_cache)
            .field("cookies", &self.cookies)
            .field("extra_headers", &self.extra_headers)
            .field("console_handler", &self.console_handler.is_some())
            .field("exception_handler", &self.exception_handler.is_some())
            .finish()
    }
}

/// Options for one generation request.
#[derive(Debug, Clone, Default)]
pub struct CreateOptions {
    /// Host of an already-running browser.
    pub host: Option<String>,
    /// Remote debugging port of an already-running browser.
    pub port: Option<u16>,
    pub launch: LaunchConfig,
    pub print: PrintOptions,
    pub screenshot: ScreenshotOptions,
    pub completion_trigger: Option<CompletionTrigger>,
    /// Deadline for the whole operation; `None` waits indefinitely.
    pub timeout: Option<Duration>,
    pub network: NetworkConfig,
}

impl CreateOptions {
    /// The externally supplied endpoint, or `None` when a browser must be launched.
    pub fn endpoint(&self) -> Option<Endpoint> {
        match (&self.host, self.port) {
            (None, None) => None,
            (host, port) => Some(Endpoint::new(
                host.clone().unwrap_or_else(|| DEFAULT_HOST.to_string()),
                port.unwrap_or(DEFAULT_PORT),
            )),
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_trigger(mut self, trigger: CompletionTrigger) -> Self {
        self.completion_trigger = Some(trigger);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_absent_only_when_host_and_port_are_absent() {
        assert!(CreateOptions::default().endpoint().is_none());

        let port_only = CreateOptions::default().with_port(9333).endpoint().unwrap();
        assert_eq!(port_only, Endpoint::new(DEFAULT_HOST, 9333));

        let host_only = CreateOptions {
            host: Some("chrome.internal".to_string()),
            ..CreateOptions::default()
        }
        .endpoint()
        .unwrap();
        assert_eq!(host_only.to_string(), "chrome.internal:9222");
        assert_eq!(host_only.http_base(), "http://chrome.internal:9222");
    }

    #[test]
    fn required_flags_come_first_and_caller_flags_are_merged() {
        let config = LaunchConfig {
            chrome_flags: vec![
                "--no-sandbox".to_string(),
                "--headless=new".to_string(),
                "--disable-gpu".to_string(),
            ],
            ..LaunchConfig::default()
        };
        assert_eq!(
            config.effective_flags(),
            vec!["--disable-gpu", "--headless=new", "--hide-scrollbars", "--no-sandbox"]
        );
    }

    #[test]
    fn print_options_serialize_only_set_fields() {
        let options = PrintOptions {
            landscape: Some(true),
            margin_top: Some(0.4),
            page_ranges: Some("1-2".to_string()),
            ..PrintOptions::default()
        };
        let value = serde_json::to_value(&options).unwrap();
        assert_eq!(
            value,
            json!({"landscape": true, "marginTop": 0.4, "pageRanges": "1-2"})
        );
        assert_eq!(serde_json::to_value(PrintOptions::default()).unwrap(), json!({}));
    }

    #[test]
    fn screenshot_capture_params_clamp_quality() {
        let options = ScreenshotOptions {
            format: ImageFormat::Jpeg,
            quality: Some(150),
            ..ScreenshotOptions::default()
        };
        let params = options.capture_params();
        assert_eq!(params["format"], "jpeg");
        assert_eq!(params["quality"], 100);
        assert!(params.get("clip").is_none());
    }

    #[test]
    fn cookies_serialize_with_protocol_names() {
        let mut cookie = Cookie::new("session", "abc").for_url("https://example.com");
        cookie.http_only = Some(true);
        cookie.same_site = Some(SameSite::Lax);
        let value = serde_json::to_value(&cookie).unwrap();
        assert_eq!(value["httpOnly"], true);
        assert_eq!(value["sameSite"], "Lax");
        assert_eq!(value["url"], "https://example.com");
        assert!(value.get("domain").is_none());
    }

    #[test]
    fn network_config_debug_hides_handlers() {
        let config = NetworkConfig {
            console_handler: Some(Arc::new(|_: &ConsoleApiCalled| {})),
            ..NetworkConfig::default()
        };
        let rendered = format!("{config:?}");
        assert!(rendered.contains("console_handler: true"));
        assert!(rendered.contains("exception_handler: false"));
    }
}
