//! Render-completion wait strategies.
//!
//! A [`CompletionTrigger`] decides when a page is "done" and capture may
//! proceed. `init` runs once before navigation, `wait` once after the load
//! event. Every variant except [`TriggerKind::Timer`] fails with exactly its
//! configured `timeout_message` when its deadline passes.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::cdp::events::{EvaluateResult, LifecycleEvent, LIFECYCLE_EVENT};
use crate::cdp::{next_event, CdpSession};
use crate::{HtmlPdfError, Result};

pub const DEFAULT_TRIGGER_TIMEOUT: Duration = Duration::from_millis(1000);
pub const DEFAULT_TIMEOUT_MESSAGE: &str = "CompletionTrigger timed out.";
pub const DEFAULT_CALLBACK_NAME: &str = "htmlPdfCb";
pub const DEFAULT_VARIABLE_NAME: &str = "htmlPdfDone";
pub const DEFAULT_LIFECYCLE_EVENT: &str = "firstMeaningfulPaint";

/// Extra time granted to the in-page timer before the host-side deadline
/// gives up on an unanswered evaluation.
const EVALUATION_GRACE: Duration = Duration::from_millis(250);

/// What a trigger waits for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerKind {
    /// Fixed delay, no page interaction.
    Timer,
    /// A DOM event fired once on `selector` (document body when absent).
    Event {
        event: String,
        selector: Option<String>,
    },
    /// The page calls the global function `name` once.
    Callback { name: String },
    /// A node matching `selector` is inserted under the document body.
    Element { selector: String },
    /// The global `name` becomes `true`.
    Variable { name: String },
    /// A `Page.lifecycleEvent` named `name` fires.
    LifecycleEvent { name: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionTrigger {
    pub kind: TriggerKind,
    pub timeout: Duration,
    pub timeout_message: String,
}

/// How a successful wait ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitResult {
    /// A timer trigger ran out its delay.
    Elapsed,
    /// The page signalled readiness.
    Ready,
}

/// State armed by [`CompletionTrigger::init`] and consumed by `wait`.
#[derive(Debug, Default)]
pub struct TriggerWatch {
    fired: Option<CancellationToken>,
    task: Option<JoinHandle<()>>,
}

impl TriggerWatch {
    fn none() -> Self {
        Self::default()
    }
}

impl Drop for TriggerWatch {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl CompletionTrigger {
    fn with_kind(kind: TriggerKind) -> Self {
        Self {
            kind,
            timeout: DEFAULT_TRIGGER_TIMEOUT,
            timeout_message: DEFAULT_TIMEOUT_MESSAGE.to_string(),
        }
    }

    pub fn timer(delay: Duration) -> Self {
        Self::with_kind(TriggerKind::Timer).with_timeout(delay)
    }

    pub fn event(event: impl Into<String>, selector: Option<String>) -> Self {
        Self::with_kind(TriggerKind::Event {
            event: event.into(),
            selector,
        })
    }

    pub fn callback() -> Self {
        Self::callback_named(DEFAULT_CALLBACK_NAME)
    }

    pub fn callback_named(name: impl Into<String>) -> Self {
        Self::with_kind(TriggerKind::Callback { name: name.into() })
    }

    pub fn element(selector: impl Into<String>) -> Self {
        Self::with_kind(TriggerKind::Element {
            selector: selector.into(),
        })
    }

    pub fn variable() -> Self {
        Self::variable_named(DEFAULT_VARIABLE_NAME)
    }

    pub fn variable_named(name: impl Into<String>) -> Self {
        Self::with_kind(TriggerKind::Variable { name: name.into() })
    }

    pub fn lifecycle_event() -> Self {
        Self::lifecycle_event_named(DEFAULT_LIFECYCLE_EVENT)
    }

    pub fn lifecycle_event_named(name: impl Into<String>) -> Self {
        Self::with_kind(TriggerKind::LifecycleEvent { name: name.into() })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_timeout_message(mut self, message: impl Into<String>) -> Self {
        self.timeout_message = message.into();
        self
    }

    /// Pre-navigation hook. Only lifecycle triggers do anything here: the
    /// event may fire before `wait` runs, so the listener is armed now.
    pub async fn init(&self, session: &CdpSession) -> Result<TriggerWatch> {
        let TriggerKind::LifecycleEvent { name } = &self.kind else {
            return Ok(TriggerWatch::none());
        };

        session
            .call("Page.setLifecycleEventsEnabled", json!({ "enabled": true }))
            .await?;

        let fired = CancellationToken::new();
        let mut events = session.subscribe();
        let latch = fired.clone();
        let watched = session.clone();
        let name = name.clone();
        let task = tokio::spawn(async move {
            let seen = next_event(&mut events, LIFECYCLE_EVENT, |params| {
                serde_json::from_value::<LifecycleEvent>(params.clone())
                    .map(|e| e.name == name)
                    .unwrap_or(false)
            });
            tokio::select! {
                result = seen => {
                    if result.is_ok() {
                        debug!(event = %name, "lifecycle event observed");
                        latch.cancel();
                    }
                }
                _ = watched.disconnected() => {}
            }
        });

        Ok(TriggerWatch {
            fired: Some(fired),
            task: Some(task),
        })
    }

    /// Waits until the page signals readiness or the trigger's own deadline passes.
    pub async fn wait(&self, session: &CdpSession, watch: &TriggerWatch) -> Result<WaitResult> {
        match &self.kind {
            TriggerKind::Timer => {
                tokio::time::sleep(self.timeout).await;
                Ok(WaitResult::Elapsed)
            }
            TriggerKind::LifecycleEvent { .. } => {
                let fired = watch.fired.as_ref().ok_or_else(|| {
                    HtmlPdfError::TriggerEvaluation(
                        "lifecycle trigger waited without being initialized".to_string(),
                    )
                })?;
                tokio::time::timeout(self.timeout, fired.cancelled())
                    .await
                    .map(|_| WaitResult::Ready)
                    .map_err(|_| self.timed_out())
            }
            _ => {
                let expression = self.page_expression();
                let evaluation = session.call(
                    "Runtime.evaluate",
                    json!({
                        "expression": expression,
                        "awaitPromise": true,
                        "returnByValue": true,
                    }),
                );
                let raw = tokio::time::timeout(self.timeout + EVALUATION_GRACE, evaluation)
                    .await
                    .map_err(|_| self.timed_out())??;
                self.interpret(raw)
            }
        }
    }

    fn timed_out(&self) -> HtmlPdfError {
        HtmlPdfError::TriggerTimeout(self.timeout_message.clone())
    }

    fn interpret(&self, raw: Value) -> Result<WaitResult> {
        let evaluated: EvaluateResult = serde_json::from_value(raw)?;
        let Some(details) = evaluated.exception_details else {
            return Ok(WaitResult::Ready);
        };
        let message = details.message();
        if message == self.timeout_message {
            Err(self.timed_out())
        } else {
            Err(HtmlPdfError::TriggerEvaluation(message))
        }
    }

    /// The promise evaluated in the page for the page-side variants.
    ///
    /// Names and selectors are embedded as JSON string literals so quotes in
    /// them cannot break out of the expression.
    pub(crate) fn page_expression(&self) -> String {
        let message = js_string(&self.timeout_message);
        let millis = self.timeout.as_millis();
        let body = match &self.kind {
            TriggerKind::Timer | TriggerKind::LifecycleEvent { .. } => return String::new(),
            TriggerKind::Event { event, selector } => {
                let target = match selector {
                    Some(selector) => format!("document.querySelector({})", js_string(selector)),
                    None => "document.body".to_string(),
                };
                format!(
                    "const target = {target};
  if (!target) {{ reject('no element matches the event selector'); return; }}
  target.addEventListener({event}, () => resolve(), {{ once: true }});",
                    event = js_string(event),
                )
            }
            TriggerKind::Callback { name } => {
                format!("window[{name}] = () => resolve();", name = js_string(name))
            }
            TriggerKind::Element { selector } => format!(
                "const selector = {selector};
  new MutationObserver((mutations, observer) => {{
    const found = mutations.some((m) => [...m.addedNodes].some((node) =>
      node.nodeType === 1 && (node.matches(selector) || node.querySelector(selector) !== null)));
    if (found) {{ observer.disconnect(); resolve(); }}
  }}).observe(document.body, {{ childList: true, subtree: true }});",
                selector = js_string(selector),
            ),
            TriggerKind::Variable { name } => format!(
                "const name = {name};
  if (window[name] === true) {{ resolve(); return; }}
  let current = window[name];
  Object.defineProperty(window, name, {{
    configurable: true,
    get: () => current,
    set: (value) => {{ current = value; if (value === true) resolve(); }},
  }});",
                name = js_string(name),
            ),
        };
        format!(
            "new Promise((resolve, reject) => {{
  {body}
  setTimeout(() => reject({message}), {millis});
}})"
        )
    }
}

fn js_string(raw: &str) -> String {
    // serde_json string literals are valid JavaScript string literals.
    serde_json::to_string(raw).unwrap_or_else(|_| "\"\"".to_string())
}

impl fmt::Display for CompletionTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            TriggerKind::Timer => write!(f, "timer"),
            TriggerKind::Event {
                event,
                selector: Some(selector),
            } => write!(f, "event:{event}@{selector}"),
            TriggerKind::Event { event, .. } => write!(f, "event:{event}"),
            TriggerKind::Callback { name } => write!(f, "callback:{name}"),
            TriggerKind::Element { selector } => write!(f, "element:{selector}"),
            TriggerKind::Variable { name } => write!(f, "variable:{name}"),
            TriggerKind::LifecycleEvent { name } => write!(f, "lifecycle:{name}"),
        }
    }
}

/// Parses the `--wait-for` syntax. The timeout is left at its default.
impl FromStr for CompletionTrigger {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let (kind, arg) = match s.split_once(':') {
            Some((kind, arg)) => (kind.trim(), Some(arg.trim()).filter(|a| !a.is_empty())),
            None => (s.trim(), None),
        };
        match (kind.to_ascii_lowercase().as_str(), arg) {
            ("timer", None) => Ok(Self::with_kind(TriggerKind::Timer)),
            ("event", Some(arg)) => {
                let (event, selector) = match arg.split_once('@') {
                    Some((event, selector)) => (event, Some(selector.to_string())),
                    None => (arg, None),
                };
                Ok(Self::event(event, selector))
            }
            ("callback", None) => Ok(Self::callback()),
            ("callback", Some(name)) => Ok(Self::callback_named(name)),
            ("element", Some(selector)) => Ok(Self::element(selector)),
            ("variable", None) => Ok(Self::variable()),
            ("variable", Some(name)) => Ok(Self::variable_named(name)),
            ("lifecycle", None) => Ok(Self::lifecycle_event()),
            ("lifecycle", Some(name)) => Ok(Self::lifecycle_event_named(name)),
            ("event" | "element", None) => Err(format!("--wait-for trigger '{kind}' needs an argument")),
            _ => Err(format!("Unknown --wait-for trigger '{s}'")),
        }
    }
}
