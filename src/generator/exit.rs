//! Per-request arbitration state.

use std::future::Future;
use std::sync::{Arc, Mutex, OnceLock};

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::result::MainResponse;
use crate::{HtmlPdfError, Result};

/// The asynchronous failure signals that can end a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitReason {
    Timeout,
    NavigationFailed { reason: String },
    ConnectionLost,
}

impl From<ExitReason> for HtmlPdfError {
    fn from(reason: ExitReason) -> Self {
        match reason {
            ExitReason::Timeout => HtmlPdfError::Timeout,
            ExitReason::NavigationFailed { reason } => HtmlPdfError::NavigationFailed { reason },
            ExitReason::ConnectionLost => HtmlPdfError::ConnectionLost,
        }
    }
}

/// Once-settable terminal outcome shared by every task of one request.
///
/// The first [`ExitCondition::trip`] wins; later ones are ignored.
#[derive(Debug, Clone, Default)]
pub struct ExitCondition {
    inner: Arc<ExitInner>,
}

#[derive(Debug, Default)]
struct ExitInner {
    reason: OnceLock<ExitReason>,
    tripped: CancellationToken,
}

impl ExitCondition {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `reason` unless an outcome is already set. Returns true when
    /// this call set it.
    pub fn trip(&self, reason: ExitReason) -> bool {
        let won = self.inner.reason.set(reason.clone()).is_ok();
        if won {
            debug!(?reason, "exit condition set");
            self.inner.tripped.cancel();
        }
        won
    }

    pub fn reason(&self) -> Option<&ExitReason> {
        self.inner.reason.get()
    }

    pub fn is_set(&self) -> bool {
        self.inner.reason.get().is_some()
    }

    /// Checkpoint: fails with the recorded outcome if there is one.
    pub fn check(&self) -> Result<()> {
        match self.inner.reason.get() {
            Some(reason) => Err(reason.clone().into()),
            None => Ok(()),
        }
    }

    /// Resolves once an outcome is recorded.
    pub async fn tripped(&self) {
        self.inner.tripped.cancelled().await;
    }

    /// The recorded outcome as an error.
    pub fn to_error(&self) -> HtmlPdfError {
        // The token is only cancelled after the reason is stored, so callers
        // reacting to `tripped` always find one.
        self.reason()
            .cloned()
            .map(HtmlPdfError::from)
            .unwrap_or(HtmlPdfError::Timeout)
    }

    /// Polls `fut` until it completes or the condition is set, whichever
    /// comes first. `None` means the future was dropped unfinished.
    ///
    /// Unlike [`ExitCondition::guard`] a completed output is always handed
    /// back, so resources it owns can be released by the caller.
    pub async fn race<T, F>(&self, fut: F) -> Option<T>
    where
        F: Future<Output = T>,
    {
        tokio::select! {
            biased;
            _ = self.tripped() => None,
            output = fut => Some(output),
        }
    }

    /// Runs `fut` between two checkpoints, abandoning it as soon as the exit
    /// condition is set.
    ///
    /// A result that arrives after the condition was set is discarded in
    /// favor of the recorded outcome, even if it is an error.
    pub async fn guard<T, F>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        self.check()?;
        let result = self.race(fut).await.ok_or_else(|| self.to_error())?;
        self.check()?;
        result
    }
}

/// Mutable run-time state of one request, kept apart from its options.
#[derive(Debug, Default)]
pub struct ControlState {
    /// Id of the first network request seen in the tab; never overwritten.
    pub main_request_id: OnceLock<String>,
    pub main_response: Mutex<Option<MainResponse>>,
    pub exit: ExitCondition,
}

impl ControlState {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn is_main_request(&self, request_id: &str) -> bool {
        self.main_request_id.get().map(String::as_str) == Some(request_id)
    }

    pub fn main_response(&self) -> Option<MainResponse> {
        self.main_response
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    pub(crate) fn set_main_response(&self, response: MainResponse) {
        let mut slot = self
            .main_response
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *slot = Some(response);
    }
}
