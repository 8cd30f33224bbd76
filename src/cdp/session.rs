//! Command/response correlation and event fan-out for one DevTools session.
//!
//! The session does not own a socket. It exchanges raw JSON text frames with
//! whatever transport spawned it (a websocket in production, an in-memory
//! channel pair in tests), which keeps the correlation logic independent of
//! the wire.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::{broadcast, mpsc, oneshot, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::{HtmlPdfError, Result};

/// Capacity of the per-session event broadcast.
pub const EVENT_BUFFER: usize = 1024;

/// A protocol event received from the browser.
#[derive(Debug, Clone)]
pub struct CdpEvent {
    /// The event method name (e.g. "Page.loadEventFired").
    pub method: String,
    /// The event parameters.
    pub params: Value,
}

/// Error object carried by a failed command response.
#[derive(Debug, Clone, Deserialize)]
pub struct CdpResponseError {
    pub code: i64,
    pub message: String,
    #[serde(default)]
    pub data: Option<String>,
}

type Reply = std::result::Result<Value, CdpResponseError>;
type PendingMap = Arc<Mutex<HashMap<u64, oneshot::Sender<Reply>>>>;

struct Inner {
    next_id: AtomicU64,
    pending: PendingMap,
    outgoing: mpsc::UnboundedSender<String>,
    events: broadcast::Sender<CdpEvent>,
    disconnected: CancellationToken,
    shutdown: CancellationToken,
    closed_locally: AtomicBool,
}

/// A bidirectional protocol session bound to a single tab.
///
/// Cloning is cheap; all clones share the same connection.
#[derive(Clone)]
pub struct CdpSession {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for CdpSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CdpSession")
            .field("disconnected", &self.is_disconnected())
            .field("closed_locally", &self.was_closed_locally())
            .finish()
    }
}

impl CdpSession {
    /// Binds a session to an arbitrary message transport.
    ///
    /// `outgoing` receives serialized command frames; `incoming` yields every
    /// frame the browser sends. When `incoming` ends the session is treated
    /// as disconnected and every pending command fails.
    pub fn spawn(
        outgoing: mpsc::UnboundedSender<String>,
        incoming: mpsc::UnboundedReceiver<String>,
    ) -> Self {
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        let disconnected = CancellationToken::new();
        let shutdown = CancellationToken::new();

        tokio::spawn(read_loop(
            incoming,
            Arc::clone(&pending),
            events.clone(),
            disconnected.clone(),
            shutdown.clone(),
        ));

        Self {
            inner: Arc::new(Inner {
                next_id: AtomicU64::new(1),
                pending,
                outgoing,
                events,
                disconnected,
                shutdown,
                closed_locally: AtomicBool::new(false),
            }),
        }
    }

    /// Token cancelled when the session is closed locally; transports watch
    /// it to tear down the underlying connection.
    pub(crate) fn shutdown_signal(&self) -> CancellationToken {
        self.inner.shutdown.clone()
    }

    /// Sends a command and waits for its response.
    pub async fn call(&self, method: &str, params: Value) -> Result<Value> {
        if self.is_disconnected() {
            return Err(HtmlPdfError::ConnectionLost);
        }

        let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        self.inner.pending.lock().await.insert(id, tx);

        // The reader cancels `disconnected` before draining, so a command
        // registered after the drain is caught here.
        if self.is_disconnected() {
            self.inner.pending.lock().await.remove(&id);
            return Err(HtmlPdfError::ConnectionLost);
        }

        let frame = serde_json::to_string(&json!({
            "id": id,
            "method": method,
            "params": params,
        }))?;
        debug!(id, method, "sending protocol command");

        if self.inner.outgoing.send(frame).is_err() {
            self.inner.pending.lock().await.remove(&id);
            return Err(HtmlPdfError::ConnectionLost);
        }

        match rx.await {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(err)) => Err(HtmlPdfError::protocol(method, err.code, err.message)),
            Err(_) => Err(HtmlPdfError::ConnectionLost),
        }
    }

    /// Enables a protocol domain (e.g. "Page", "Network", "Runtime").
    pub async fn enable(&self, domain: &str) -> Result<()> {
        self.call(&format!("{domain}.enable"), json!({})).await?;
        Ok(())
    }

    /// Subscribes to every event emitted from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<CdpEvent> {
        self.inner.events.subscribe()
    }

    /// Resolves once the connection is gone, for whatever reason.
    pub async fn disconnected(&self) {
        self.inner.disconnected.cancelled().await;
    }

    pub fn is_disconnected(&self) -> bool {
        self.inner.disconnected.is_cancelled()
    }

    /// True when [`CdpSession::close`] was called on this session.
    pub fn was_closed_locally(&self) -> bool {
        self.inner.closed_locally.load(Ordering::SeqCst)
    }

    /// Closes the session. Safe to call more than once.
    pub fn close(&self) {
        if !self.inner.closed_locally.swap(true, Ordering::SeqCst) {
            debug!("closing protocol session");
        }
        self.inner.shutdown.cancel();
    }
}

/// Waits on `rx` for the next event named `method` that satisfies `filter`.
pub async fn next_event(
    rx: &mut broadcast::Receiver<CdpEvent>,
    method: &str,
    filter: impl Fn(&Value) -> bool,
) -> Result<CdpEvent> {
    loop {
        match rx.recv().await {
            Ok(event) if event.method == method && filter(&event.params) => return Ok(event),
            Ok(_) => continue,
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, method, "event subscriber lagged");
            }
            Err(broadcast::error::RecvError::Closed) => return Err(HtmlPdfError::ConnectionLost),
        }
    }
}

async fn read_loop(
    mut incoming: mpsc::UnboundedReceiver<String>,
    pending: PendingMap,
    events: broadcast::Sender<CdpEvent>,
    disconnected: CancellationToken,
    shutdown: CancellationToken,
) {
    loop {
        let frame = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            frame = incoming.recv() => match frame {
                Some(frame) => frame,
                None => {
                    debug!("protocol transport closed");
                    break;
                }
            },
        };
        dispatch(&frame, &pending, &events).await;
    }

    disconnected.cancel();
    // Dropping the senders fails every waiter with ConnectionLost.
    pending.lock().await.clear();
}

async fn dispatch(frame: &str, pending: &PendingMap, events: &broadcast::Sender<CdpEvent>) {
    let message: Value = match serde_json::from_str(frame) {
        Ok(v) => v,
        Err(e) => {
            warn!(error = %e, "failed to parse protocol frame");
            return;
        }
    };

    if let Some(id) = message.get("id").and_then(Value::as_u64) {
        let reply = match message.get("error") {
            Some(error) => Err(serde_json::from_value(error.clone()).unwrap_or(
                CdpResponseError {
                    code: -1,
                    message: error.to_string(),
                    data: None,
                },
            )),
            None => Ok(message.get("result").cloned().unwrap_or(Value::Null)),
        };
        match pending.lock().await.remove(&id) {
            Some(tx) => {
                let _ = tx.send(reply);
            }
            None => trace!(id, "response for abandoned command"),
        }
    } else if let Some(method) = message.get("method").and_then(Value::as_str) {
        trace!(method, "protocol event");
        let _ = events.send(CdpEvent {
            method: method.to_string(),
            params: message.get("params").cloned().unwrap_or(Value::Null),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair() -> (
        CdpSession,
        mpsc::UnboundedReceiver<String>,
        mpsc::UnboundedSender<String>,
    ) {
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        (CdpSession::spawn(out_tx, in_rx), out_rx, in_tx)
    }

    #[tokio::test]
    async fn correlates_responses_by_id() {
        let (session, mut browser_rx, browser_tx) = pair();

        let call = tokio::spawn({
            let session = session.clone();
            async move { session.call("Page.navigate", json!({"url": "about:blank"})).await }
        });

        let frame: Value = serde_json::from_str(&browser_rx.recv().await.unwrap()).unwrap();
        assert_eq!(frame["method"], "Page.navigate");
        assert_eq!(frame["params"]["url"], "about:blank");
        let id = frame["id"].as_u64().unwrap();
        browser_tx
            .send(json!({"id": id, "result": {"frameId": "F1"}}).to_string())
            .unwrap();

        let result = call.await.unwrap().unwrap();
        assert_eq!(result["frameId"], "F1");
    }

    #[tokio::test]
    async fn error_responses_become_protocol_errors() {
        let (session, mut browser_rx, browser_tx) = pair();
        let call = tokio::spawn({
            let session = session.clone();
            async move { session.call("Page.bogus", json!({})).await }
        });
        let frame: Value = serde_json::from_str(&browser_rx.recv().await.unwrap()).unwrap();
        browser_tx
            .send(
                json!({"id": frame["id"], "error": {"code": -32601, "message": "not found"}})
                    .to_string(),
            )
            .unwrap();

        match call.await.unwrap() {
            Err(HtmlPdfError::Protocol { method, code, .. }) => {
                assert_eq!(method, "Page.bogus");
                assert_eq!(code, -32601);
            }
            other => panic!("expected protocol error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn events_reach_subscribers() {
        let (session, _browser_rx, browser_tx) = pair();
        let mut rx = session.subscribe();
        browser_tx
            .send(json!({"method": "Page.frameNavigated", "params": {}}).to_string())
            .unwrap();
        browser_tx
            .send(json!({"method": "Page.loadEventFired", "params": {"timestamp": 1.5}}).to_string())
            .unwrap();

        let event = next_event(&mut rx, "Page.loadEventFired", |_| true)
            .await
            .unwrap();
        assert_eq!(event.params["timestamp"], 1.5);
    }

    #[tokio::test]
    async fn transport_loss_fails_pending_commands() {
        let (session, mut browser_rx, browser_tx) = pair();
        let call = tokio::spawn({
            let session = session.clone();
            async move { session.call("Page.printToPDF", json!({})).await }
        });
        browser_rx.recv().await.unwrap();
        drop(browser_tx);

        assert!(matches!(call.await.unwrap(), Err(HtmlPdfError::ConnectionLost)));
        session.disconnected().await;
        assert!(session.is_disconnected());
        assert!(!session.was_closed_locally());
        assert!(matches!(
            session.call("Page.enable", json!({})).await,
            Err(HtmlPdfError::ConnectionLost)
        ));
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let (session, _browser_rx, _browser_tx) = pair();
        session.close();
        session.close();
        session.disconnected().await;
        assert!(session.was_closed_locally());
    }
}
