//! The generation orchestrator.
//!
//! One call to [`Generator::create_pdf`] or [`Generator::create_screenshot`]
//! runs this pipeline, with every await gated by the request's
//! [`ExitCondition`]:
//!
//! 1. launch a browser, unless an endpoint was supplied
//! 2. open a tab and attach a protocol session
//! 3. prepare the page, run the trigger's `init`, navigate
//! 4. wait for the completion trigger, if any
//! 5. capture
//!
//! The operation deadline and connection loss race the pipeline. Whatever
//! trips the exit condition first is the outcome. Tab creation is the one
//! step allowed to finish after a trip, so cleanup always sees the tab.
//! Cleanup runs afterwards no matter how the pipeline ended.

mod capture;
mod exit;
mod navigation;

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::browser::{BrowserProcess, ChromeLauncher, DevToolsConnector, Launcher, Tab, TabConnector};
use crate::cdp::CdpSession;
use crate::options::{CreateOptions, Endpoint};
use crate::result::CreateResult;
use crate::Result;

pub use exit::{ControlState, ExitCondition, ExitReason};
pub use navigation::is_navigable_url;

/// What the terminal capture call produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputKind {
    Pdf,
    Screenshot,
}

/// Runs generation requests against pluggable browser backends.
///
/// A generator holds no per-request state; one instance can serve
/// concurrent requests.
#[derive(Clone)]
pub struct Generator {
    launcher: Arc<dyn Launcher>,
    connector: Arc<dyn TabConnector>,
}

impl std::fmt::Debug for Generator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Generator").finish_non_exhaustive()
    }
}

/// What a request acquired, released by [`Generator::cleanup`].
#[derive(Default)]
struct Resources {
    process: Option<Box<dyn BrowserProcess>>,
    endpoint: Option<Endpoint>,
    tab: Option<Tab>,
    session: Option<CdpSession>,
}

impl Generator {
    /// A generator that launches local Chrome and talks DevTools over HTTP.
    pub fn new() -> Result<Self> {
        Ok(Self::with_backends(
            Arc::new(ChromeLauncher::new()),
            Arc::new(DevToolsConnector::new()?),
        ))
    }

    pub fn with_backends(launcher: Arc<dyn Launcher>, connector: Arc<dyn TabConnector>) -> Self {
        Self {
            launcher,
            connector,
        }
    }

    /// Renders `input` (a URL or inline HTML) to PDF.
    pub async fn create_pdf(&self, input: &str, options: &CreateOptions) -> Result<CreateResult> {
        self.create(input, options, OutputKind::Pdf).await
    }

    /// Renders `input` (a URL or inline HTML) to an image.
    pub async fn create_screenshot(
        &self,
        input: &str,
        options: &CreateOptions,
    ) -> Result<CreateResult> {
        self.create(input, options, OutputKind::Screenshot).await
    }

    pub async fn create(
        &self,
        input: &str,
        options: &CreateOptions,
        kind: OutputKind,
    ) -> Result<CreateResult> {
        let state = ControlState::new();
        let exit = state.exit.clone();
        if options.timeout == Some(Duration::ZERO) {
            exit.trip(ExitReason::Timeout);
        }

        info!(?kind, timeout = ?options.timeout, "generation started");
        let mut resources = Resources::default();
        let outcome = tokio::select! {
            result = self.run(input, options, kind, &state, &mut resources) => result,
            never = deadline(options.timeout, &exit) => match never {},
        };

        self.cleanup(resources, &exit).await;

        // A recorded outcome beats whatever the pipeline returned.
        match exit.reason() {
            Some(reason) => {
                warn!(?reason, "generation aborted");
                Err(reason.clone().into())
            }
            None => {
                match &outcome {
                    Ok(result) => info!(bytes = result.to_base64().len(), "generation finished"),
                    Err(e) => warn!(error = %e, "generation failed"),
                }
                outcome
            }
        }
    }

    async fn run(
        &self,
        input: &str,
        options: &CreateOptions,
        kind: OutputKind,
        state: &Arc<ControlState>,
        resources: &mut Resources,
    ) -> Result<CreateResult> {
        let exit = &state.exit;
        exit.check()?;

        let endpoint = match options.endpoint() {
            Some(endpoint) => {
                debug!(%endpoint, "using existing browser");
                endpoint
            }
            None => {
                let process = exit
                    .race(self.launcher.launch(&options.launch))
                    .await
                    .ok_or_else(|| exit.to_error())??;
                let endpoint = process.endpoint();
                resources.process = Some(process);
                endpoint
            }
        };
        resources.endpoint = Some(endpoint.clone());
        exit.check()?;

        // Not raced: a tab created on the browser must reach cleanup. The
        // connector bounds this call on its own.
        let tab = self.connector.open_tab(&endpoint).await?;
        resources.tab = Some(tab.clone());
        exit.check()?;

        let session = exit
            .race(self.connector.connect(&endpoint, &tab))
            .await
            .ok_or_else(|| exit.to_error())??;
        resources.session = Some(session.clone());
        exit.check()?;

        tokio::select! {
            result = render(&session, input, options, kind, state) => result,
            never = watch_connection(&session, exit) => match never {},
        }
    }

    /// Releases everything in `resources`. Failures are logged, never returned.
    async fn cleanup(&self, resources: Resources, exit: &ExitCondition) {
        // Render can fail on a dropped connection before the watcher records it.
        let mut lost = exit.reason() == Some(&ExitReason::ConnectionLost);
        if let Some(session) = &resources.session {
            lost |= session.is_disconnected() && !session.was_closed_locally();
            session.close();
        }

        if let (Some(endpoint), Some(tab)) = (&resources.endpoint, &resources.tab) {
            if lost {
                debug!(tab = %tab.id, "connection lost; skipping tab close");
            } else if let Err(e) = self.connector.close_tab(endpoint, tab).await {
                warn!(error = %e, tab = %tab.id, "failed to close tab");
            }
        }

        if let Some(process) = &resources.process {
            if let Err(e) = process.kill().await {
                warn!(error = %e, "failed to kill browser");
            }
        }
    }
}

async fn render(
    session: &CdpSession,
    input: &str,
    options: &CreateOptions,
    kind: OutputKind,
    state: &Arc<ControlState>,
) -> Result<CreateResult> {
    let exit = &state.exit;
    let page = navigation::prepare(session, input, options, kind, state).await?;

    let trigger = match &options.completion_trigger {
        Some(trigger) => Some((trigger, exit.guard(trigger.init(session)).await?)),
        None => None,
    };

    navigation::navigate(session, input, &page.frame_id, exit).await?;

    if kind == OutputKind::Screenshot && options.screenshot.full_page {
        navigation::fit_to_content(session, &options.screenshot, exit).await?;
    }

    if let Some((trigger, watch)) = &trigger {
        info!(%trigger, "waiting for completion trigger");
        exit.guard(trigger.wait(session, watch)).await?;
    }

    let data = capture::capture(session, kind, options, exit).await?;
    Ok(CreateResult::new(data, state.main_response()))
}

/// Trips the exit condition when the deadline passes. Never completes.
async fn deadline(timeout: Option<Duration>, exit: &ExitCondition) -> Infallible {
    if let Some(timeout) = timeout {
        tokio::time::sleep(timeout).await;
        exit.trip(ExitReason::Timeout);
    }
    std::future::pending().await
}

/// Trips the exit condition when the session drops unexpectedly. Never completes.
async fn watch_connection(session: &CdpSession, exit: &ExitCondition) -> Infallible {
    session.disconnected().await;
    if !session.was_closed_locally() {
        exit.trip(ExitReason::ConnectionLost);
    }
    std::future::pending().await
}

/// Renders `input` to PDF with the default backends.
pub async fn create_pdf(input: &str, options: &CreateOptions) -> Result<CreateResult> {
    Generator::new()?.create_pdf(input, options).await
}

/// Renders `input` to an image with the default backends.
pub async fn create_screenshot(input: &str, options: &CreateOptions) -> Result<CreateResult> {
    Generator::new()?.create_screenshot(input, options).await
}
