//! HtmlPdf Library
//!
//! Renders HTML documents or URLs to PDF or images by driving a headless
//! Chrome over the DevTools protocol. Every request either produces a result
//! or fails with one attributable error, and never leaks the browser process,
//! tab or protocol session it acquired.
//!
//! # Module Overview
//!
//! - [`generator`] - the orchestrator and its exit-condition arbitration
//! - [`trigger`] - pluggable "rendering is done" wait strategies
//! - [`browser`] - browser process launch and tab management
//! - [`cdp`] - DevTools protocol session and event payloads
//! - [`options`] - request configuration
//! - [`result`] - the generated payload and main response metadata
//! - [`config`] - configuration file support
//! - [`output`] - JSON output schemas
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use htmlpdf_lib::{create_pdf, CompletionTrigger, CreateOptions};
//!
//! # async fn example() -> htmlpdf_lib::Result<()> {
//! let options = CreateOptions::default()
//!     .with_timeout(Duration::from_secs(30))
//!     .with_trigger(CompletionTrigger::variable().with_timeout(Duration::from_secs(5)));
//!
//! let result = create_pdf("<p>Hello</p><script>htmlPdfDone = true</script>", &options).await?;
//! result.to_file("hello.pdf").await?;
//! # Ok(())
//! # }
//! ```

pub mod browser;
pub mod cdp;
pub mod config;
pub mod error;
pub mod generator;
pub mod options;
pub mod output;
pub mod result;
pub mod trigger;
pub mod viewport;

pub use browser::{
    BrowserProcess, ChromeLauncher, DevToolsConnector, LaunchedChrome, Launcher, Tab, TabConnector,
};
pub use cdp::CdpSession;
pub use config::Config;
pub use error::{ErrorCategory, ErrorPayload, HtmlPdfError, Result};
pub use generator::{
    create_pdf, create_screenshot, is_navigable_url, ControlState, ExitCondition, ExitReason,
    Generator, OutputKind,
};
pub use options::{
    Clip, Cookie, CreateOptions, Endpoint, ImageFormat, LaunchConfig, NetworkConfig, PrintOptions,
    SameSite, ScreenshotOptions,
};
pub use output::{
    ArtifactKind, ErrorOutput, HtmlPdfOutput, InputDescriptor, InputKind, RenderOutput,
    HTMLPDF_OUTPUT_VERSION,
};
pub use result::{CreateResult, MainResponse};
pub use trigger::{CompletionTrigger, TriggerKind, TriggerWatch, WaitResult};
pub use viewport::Viewport;
