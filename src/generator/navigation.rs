//! Page preparation, observers and navigation.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::{json, Value};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use super::exit::{ControlState, ExitCondition, ExitReason};
use super::OutputKind;
use crate::cdp::events::{
    ConsoleApiCalled, ExceptionThrown, LoadingFailed, RequestWillBeSent, ResponseReceived,
    CONSOLE_API_CALLED, EXCEPTION_THROWN, LOADING_FAILED, LOAD_EVENT_FIRED, REQUEST_WILL_BE_SENT,
    RESPONSE_RECEIVED,
};
use crate::cdp::{next_event, CdpEvent, CdpSession};
use crate::options::{CreateOptions, NetworkConfig, ScreenshotOptions};
use crate::result::MainResponse;
use crate::{HtmlPdfError, Result};

const NAVIGABLE_SCHEMES: [&str; 4] = ["http:", "https:", "file:", "data:"];

/// True when `input` starts with a scheme the browser is asked to navigate
/// to; anything else is loaded as inline HTML.
///
/// This is a prefix test only: `http:not a url` is still navigated to and
/// fails the way the browser fails any invalid URL.
pub fn is_navigable_url(input: &str) -> bool {
    let head = input.trim_start();
    NAVIGABLE_SCHEMES.iter().any(|scheme| {
        head.get(..scheme.len())
            .is_some_and(|prefix| prefix.eq_ignore_ascii_case(scheme))
    })
}

/// Background task feeding network and runtime events into the request's
/// control state. Stops when dropped.
#[derive(Debug)]
pub(crate) struct PageObserver {
    task: JoinHandle<()>,
}

/// A tab ready for navigation.
#[derive(Debug)]
pub(crate) struct PreparedPage {
    pub frame_id: String,
    _observer: PageObserver,
}

impl Drop for PageObserver {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Everything that must happen before navigation: domains, cache, observers,
/// headers, emulation, cookies.
pub(crate) async fn prepare(
    session: &CdpSession,
    input: &str,
    options: &CreateOptions,
    kind: OutputKind,
    state: &Arc<ControlState>,
) -> Result<PreparedPage> {
    let exit = &state.exit;

    for domain in ["Page", "Network", "Runtime"] {
        exit.guard(session.enable(domain)).await?;
    }
    let tree = exit
        .guard(session.call("Page.getFrameTree", json!({})))
        .await?;
    let frame_id = tree
        .pointer("/frameTree/frame/id")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| {
            HtmlPdfError::protocol("Page.getFrameTree", -1, "response has no main frame id")
        })?;

    let network = &options.network;
    if network.clear_cache {
        debug!("clearing browser cache");
        exit.guard(session.call("Network.clearBrowserCache", json!({})))
            .await?;
    }

    // Subscribed before anything can trigger a request.
    let observer = PageObserver {
        task: tokio::spawn(observe(
            session.subscribe(),
            Arc::clone(state),
            network.clone(),
            frame_id.clone(),
        )),
    };

    if !network.extra_headers.is_empty() {
        let headers: BTreeMap<&str, &str> = network
            .extra_headers
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        exit.guard(session.call(
            "Network.setExtraHTTPHeaders",
            json!({ "headers": headers }),
        ))
        .await?;
    }

    if kind == OutputKind::Screenshot {
        let screenshot = &options.screenshot;
        exit.guard(session.call(
            "Emulation.setDeviceMetricsOverride",
            screenshot.viewport.device_metrics(screenshot.mobile),
        ))
        .await?;
    }

    if !network.cookies.is_empty() {
        exit.guard(session.call(
            "Network.setCookies",
            json!({ "cookies": cookie_params(network, input)? }),
        ))
        .await?;
    }

    Ok(PreparedPage {
        frame_id,
        _observer: observer,
    })
}

/// Cookies without a url or domain are scoped to the navigation target.
fn cookie_params(network: &NetworkConfig, input: &str) -> Result<Vec<Value>> {
    let target = is_navigable_url(input).then(|| input.trim());
    network
        .cookies
        .iter()
        .map(|cookie| {
            let mut cookie = cookie.clone();
            if cookie.url.is_none() && cookie.domain.is_none() {
                cookie.url = target.map(str::to_string);
            }
            serde_json::to_value(&cookie).map_err(HtmlPdfError::from)
        })
        .collect()
}

async fn observe(
    mut events: broadcast::Receiver<CdpEvent>,
    state: Arc<ControlState>,
    network: NetworkConfig,
    frame_id: String,
) {
    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "page observer lagged behind protocol events");
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => break,
        };
        handle_event(&event, &state, &network, &frame_id);
    }
}

/// Events come from this request's own tab only, so the main request is the
/// first document request of its top-level frame.
fn handle_event(event: &CdpEvent, state: &ControlState, network: &NetworkConfig, frame_id: &str) {
    match event.method.as_str() {
        REQUEST_WILL_BE_SENT => {
            if let Ok(request) = serde_json::from_value::<RequestWillBeSent>(event.params.clone()) {
                let top_level_document = request.resource_type.as_deref() == Some("Document")
                    && request.frame_id.as_deref() == Some(frame_id);
                if top_level_document && state.main_request_id.set(request.request_id.clone()).is_ok() {
                    debug!(request_id = %request.request_id, "main request observed");
                }
            }
        }
        RESPONSE_RECEIVED => {
            if let Ok(received) = serde_json::from_value::<ResponseReceived>(event.params.clone()) {
                if state.is_main_request(&received.request_id) {
                    debug!(status = received.response.status, "main response received");
                    state.set_main_response(MainResponse::from(received.response));
                }
            }
        }
        LOADING_FAILED => {
            if let Ok(failed) = serde_json::from_value::<LoadingFailed>(event.params.clone()) {
                if state.is_main_request(&failed.request_id) {
                    warn!(error = %failed.error_text, "main document failed to load");
                    state.exit.trip(ExitReason::NavigationFailed {
                        reason: failed.error_text,
                    });
                }
            }
        }
        CONSOLE_API_CALLED => {
            if let Some(handler) = &network.console_handler {
                match serde_json::from_value::<ConsoleApiCalled>(event.params.clone()) {
                    Ok(message) => handler(&message),
                    Err(e) => trace!(error = %e, "unreadable console event"),
                }
            }
        }
        EXCEPTION_THROWN => {
            if let Some(handler) = &network.exception_handler {
                match serde_json::from_value::<ExceptionThrown>(event.params.clone()) {
                    Ok(thrown) => handler(&thrown),
                    Err(e) => trace!(error = %e, "unreadable exception event"),
                }
            }
        }
        _ => {}
    }
}

/// Loads `input` and waits for both the command acknowledgement and the
/// load event, which may arrive in either order.
pub(crate) async fn navigate(
    session: &CdpSession,
    input: &str,
    frame_id: &str,
    exit: &ExitCondition,
) -> Result<()> {
    let mut events = session.subscribe();
    let load = next_event(&mut events, LOAD_EVENT_FIRED, |_| true);
    let command = issue_navigation(session, input, frame_id, exit);
    tokio::pin!(load, command);

    let (mut acknowledged, mut loaded) = (false, false);
    let settle = async {
        while !(acknowledged && loaded) {
            tokio::select! {
                result = &mut command, if !acknowledged => {
                    result?;
                    trace!("navigation acknowledged");
                    acknowledged = true;
                }
                result = &mut load, if !loaded => {
                    result?;
                    trace!("load event fired");
                    loaded = true;
                }
            }
        }
        Ok::<(), HtmlPdfError>(())
    };
    exit.guard(settle).await?;
    info!("page loaded");
    Ok(())
}

async fn issue_navigation(
    session: &CdpSession,
    input: &str,
    frame_id: &str,
    exit: &ExitCondition,
) -> Result<()> {
    if is_navigable_url(input) {
        let url = input.trim();
        info!(%url, "navigating");
        let response = session.call("Page.navigate", json!({ "url": url })).await?;
        if let Some(error_text) = response
            .get("errorText")
            .and_then(Value::as_str)
            .filter(|text| !text.is_empty())
        {
            warn!(error = %error_text, "navigation rejected");
            exit.trip(ExitReason::NavigationFailed {
                reason: error_text.to_string(),
            });
            return exit.check();
        }
        Ok(())
    } else {
        info!(bytes = input.len(), "loading inline HTML");
        session
            .call(
                "Page.setDocumentContent",
                json!({ "frameId": frame_id, "html": input }),
            )
            .await?;
        Ok(())
    }
}

/// Grows the emulated viewport to the document's full height.
pub(crate) async fn fit_to_content(
    session: &CdpSession,
    screenshot: &ScreenshotOptions,
    exit: &ExitCondition,
) -> Result<()> {
    let metrics = exit
        .guard(session.call("Page.getLayoutMetrics", json!({})))
        .await?;
    let height = metrics
        .pointer("/cssContentSize/height")
        .or_else(|| metrics.pointer("/contentSize/height"))
        .and_then(Value::as_f64)
        .ok_or_else(|| {
            HtmlPdfError::protocol("Page.getLayoutMetrics", -1, "response has no content size")
        })?;
    let viewport = screenshot.viewport.with_height(height.ceil() as u32);
    debug!(%viewport, "resizing viewport to full page");
    exit.guard(session.call(
        "Emulation.setDeviceMetricsOverride",
        viewport.device_metrics(screenshot.mobile),
    ))
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::Cookie;

    #[test]
    fn classifies_urls_by_scheme_prefix() {
        for url in [
            "https://example.com",
            "HTTP://EXAMPLE.COM",
            "file:///tmp/page.html",
            "data:text/html,<p>hi</p>",
            "  https://padded.example",
            "http:not-really-a-url",
        ] {
            assert!(is_navigable_url(url), "{url}");
        }
        for html in [
            "<html><body>hi</body></html>",
            "ftp://example.com/file",
            "javascript:alert(1)",
            "",
            "htt",
        ] {
            assert!(!is_navigable_url(html), "{html}");
        }
    }

    #[test]
    fn unscoped_cookies_follow_the_target_url() {
        let network = NetworkConfig {
            cookies: vec![
                Cookie::new("a", "1"),
                Cookie {
                    domain: Some("other.example".to_string()),
                    ..Cookie::new("b", "2")
                },
            ],
            ..NetworkConfig::default()
        };
        let params = cookie_params(&network, "https://example.com/report").unwrap();
        assert_eq!(params[0]["url"], "https://example.com/report");
        assert!(params[1].get("url").is_none());

        let inline = cookie_params(&network, "<p>inline</p>").unwrap();
        assert!(inline[0].get("url").is_none());
    }

    fn request(id: &str, frame: &str, kind: &str) -> CdpEvent {
        CdpEvent {
            method: REQUEST_WILL_BE_SENT.to_string(),
            params: json!({"requestId": id, "frameId": frame, "type": kind}),
        }
    }

    #[test]
    fn main_request_is_the_first_top_level_document() {
        let state = ControlState::default();
        let network = NetworkConfig::default();
        handle_event(&request("99.1", "F1", "Image"), &state, &network, "F1");
        handle_event(&request("99.2", "CHILD", "Document"), &state, &network, "F1");
        assert!(state.main_request_id.get().is_none());

        handle_event(&request("100.1", "F1", "Document"), &state, &network, "F1");
        handle_event(&request("100.2", "F1", "Document"), &state, &network, "F1");
        assert!(state.is_main_request("100.1"));

        handle_event(
            &CdpEvent {
                method: LOADING_FAILED.to_string(),
                params: json!({"requestId": "100.2", "errorText": "net::ERR_FAILED"}),
            },
            &state,
            &network,
            "F1",
        );
        assert!(!state.exit.is_set(), "subresource failure must not end the request");

        handle_event(
            &CdpEvent {
                method: LOADING_FAILED.to_string(),
                params: json!({"requestId": "100.1", "errorText": "net::ERR_CONNECTION_REFUSED"}),
            },
            &state,
            &network,
            "F1",
        );
        assert_eq!(
            state.exit.reason(),
            Some(&ExitReason::NavigationFailed {
                reason: "net::ERR_CONNECTION_REFUSED".to_string()
            })
        );
    }

    #[test]
    fn console_events_reach_the_handler() {
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let network = NetworkConfig {
            console_handler: Some(Arc::new(move |message: &ConsoleApiCalled| {
                sink.lock().unwrap().push(message.text());
            })),
            ..NetworkConfig::default()
        };
        handle_event(
            &CdpEvent {
                method: CONSOLE_API_CALLED.to_string(),
                params: json!({"type": "log", "args": [{"type": "string", "value": "ready"}], "timestamp": 1.0}),
            },
            &ControlState::default(),
            &network,
            "F1",
        );
        assert_eq!(seen.lock().unwrap().as_slice(), ["ready"]);
    }
}
