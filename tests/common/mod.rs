//! In-memory browser doubles for driving the generator without Chrome.
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use htmlpdf_lib::options::Endpoint;
use htmlpdf_lib::{
    BrowserProcess, CdpSession, Generator, HtmlPdfError, LaunchConfig, Launcher, Result, Tab,
    TabConnector,
};
use serde_json::{json, Value};
use tokio::sync::mpsc;

pub const PDF_DATA: &str = "JVBERi0xLjQKJcfsj6IKNSAwIG9iago=";
pub const PNG_DATA: &str = "iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAYAAAAfFcSJAAAADUlEQVR42mNk+M9QDwADhgGAWjR9awAAAABJRU5ErkJggg==";
pub const MAIN_FRAME: &str = "F-MAIN";

/// How the fake page answers `Runtime.evaluate`.
#[derive(Debug, Clone)]
pub enum Evaluate {
    Resolve,
    /// Never answers, as a page whose promise never settles.
    Hang,
    Reject(String),
}

/// Knobs for one scripted browser. URLs also steer navigation: a URL
/// containing `unreachable` is rejected by `Page.navigate`, and one
/// containing `broken` fails its main document request.
#[derive(Debug, Clone)]
pub struct Script {
    pub evaluate: Evaluate,
    /// Lifecycle events emitted after the load event.
    pub lifecycle: Vec<String>,
    /// Command that is never answered.
    pub hang_on: Option<String>,
    /// Command on receipt of which the connection drops.
    pub drop_on: Option<String>,
    pub console: Vec<String>,
    pub content_height: f64,
}

impl Default for Script {
    fn default() -> Self {
        Self {
            evaluate: Evaluate::Resolve,
            lifecycle: vec!["DOMContentLoaded".into(), "load".into()],
            hang_on: None,
            drop_on: None,
            console: Vec::new(),
            content_height: 2400.0,
        }
    }
}

/// Commands received by every fake browser of a connector, in order.
#[derive(Debug, Clone, Default)]
pub struct CommandLog(Arc<Mutex<Vec<(String, Value)>>>);

impl CommandLog {
    fn push(&self, method: &str, params: &Value) {
        self.0
            .lock()
            .unwrap()
            .push((method.to_string(), params.clone()));
    }

    pub fn methods(&self) -> Vec<String> {
        self.0.lock().unwrap().iter().map(|(m, _)| m.clone()).collect()
    }

    pub fn contains(&self, method: &str) -> bool {
        self.methods().iter().any(|m| m == method)
    }

    pub fn params(&self, method: &str) -> Option<Value> {
        self.0
            .lock()
            .unwrap()
            .iter()
            .find(|(m, _)| m == method)
            .map(|(_, p)| p.clone())
    }

    pub fn all_params(&self, method: &str) -> Vec<Value> {
        self.0
            .lock()
            .unwrap()
            .iter()
            .filter(|(m, _)| m == method)
            .map(|(_, p)| p.clone())
            .collect()
    }

    pub fn position(&self, method: &str) -> Option<usize> {
        self.methods().iter().position(|m| m == method)
    }
}

/// Starts a scripted browser and returns the session attached to it.
pub fn fake_session(script: Script, log: CommandLog) -> CdpSession {
    let (out_tx, out_rx) = mpsc::unbounded_channel();
    let (in_tx, in_rx) = mpsc::unbounded_channel();
    tokio::spawn(serve(script, log, out_rx, in_tx));
    CdpSession::spawn(out_tx, in_rx)
}

async fn serve(
    script: Script,
    log: CommandLog,
    mut commands: mpsc::UnboundedReceiver<String>,
    page: mpsc::UnboundedSender<String>,
) {
    let reply = |id: u64, result: Value| {
        let _ = page.send(json!({ "id": id, "result": result }).to_string());
    };
    let emit = |method: &str, params: Value| {
        let _ = page.send(json!({ "method": method, "params": params }).to_string());
    };

    while let Some(frame) = commands.recv().await {
        let Ok(command) = serde_json::from_str::<Value>(&frame) else {
            continue;
        };
        let id = command["id"].as_u64().unwrap_or_default();
        let method = command["method"].as_str().unwrap_or_default().to_string();
        let params = command["params"].clone();
        log.push(&method, &params);

        if script.drop_on.as_deref() == Some(method.as_str()) {
            return;
        }
        if script.hang_on.as_deref() == Some(method.as_str()) {
            continue;
        }

        match method.as_str() {
            "Page.getFrameTree" => {
                reply(id, json!({ "frameTree": { "frame": { "id": MAIN_FRAME } } }))
            }
            "Page.navigate" => {
                let url = params["url"].as_str().unwrap_or_default().to_string();
                if url.contains("unreachable") {
                    reply(
                        id,
                        json!({ "frameId": MAIN_FRAME, "errorText": "net::ERR_NAME_NOT_RESOLVED" }),
                    );
                    continue;
                }
                // Chrome reports the load before acknowledging fast navigations.
                emit(
                    "Network.requestWillBeSent",
                    json!({ "requestId": "R-MAIN", "frameId": MAIN_FRAME, "type": "Document" }),
                );
                if url.contains("broken") {
                    reply(id, json!({ "frameId": MAIN_FRAME, "loaderId": "L1" }));
                    emit(
                        "Network.loadingFailed",
                        json!({ "requestId": "R-MAIN", "errorText": "net::ERR_CONNECTION_RESET" }),
                    );
                    continue;
                }
                emit(
                    "Network.responseReceived",
                    json!({
                        "requestId": "R-MAIN",
                        "response": {
                            "url": url,
                            "status": 200,
                            "statusText": "OK",
                            "headers": { "content-type": "text/html" },
                            "mimeType": "text/html"
                        }
                    }),
                );
                load_page(&script, &emit);
                reply(id, json!({ "frameId": MAIN_FRAME, "loaderId": "L1" }));
            }
            "Page.setDocumentContent" => {
                reply(id, json!({}));
                load_page(&script, &emit);
            }
            "Runtime.evaluate" => match &script.evaluate {
                Evaluate::Resolve => reply(id, json!({ "result": { "type": "undefined" } })),
                Evaluate::Hang => {}
                Evaluate::Reject(message) => reply(
                    id,
                    json!({
                        "result": { "type": "string", "value": message },
                        "exceptionDetails": {
                            "exceptionId": 1,
                            "text": "Uncaught (in promise)",
                            "lineNumber": 0,
                            "columnNumber": 0,
                            "exception": { "type": "string", "value": message }
                        }
                    }),
                ),
            },
            "Page.getLayoutMetrics" => reply(
                id,
                json!({ "cssContentSize": { "x": 0, "y": 0, "width": 1920, "height": script.content_height } }),
            ),
            "Page.printToPDF" => reply(id, json!({ "data": PDF_DATA })),
            "Page.captureScreenshot" => reply(id, json!({ "data": PNG_DATA })),
            _ => reply(id, json!({})),
        }
    }
}

fn load_page(script: &Script, emit: &impl Fn(&str, Value)) {
    for text in &script.console {
        emit(
            "Runtime.consoleAPICalled",
            json!({ "type": "log", "args": [{ "type": "string", "value": text }], "timestamp": 1.0 }),
        );
    }
    emit("Page.loadEventFired", json!({ "timestamp": 1.0 }));
    for name in &script.lifecycle {
        emit(
            "Page.lifecycleEvent",
            json!({ "frameId": MAIN_FRAME, "loaderId": "L1", "name": name, "timestamp": 1.0 }),
        );
    }
}

#[derive(Debug)]
pub struct FakeProcess {
    kills: Arc<AtomicUsize>,
}

#[async_trait]
impl BrowserProcess for FakeProcess {
    fn endpoint(&self) -> Endpoint {
        Endpoint::local(45123)
    }

    async fn kill(&self) -> Result<()> {
        self.kills.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Launcher that records launches and kills.
#[derive(Debug, Default)]
pub struct FakeLauncher {
    pub launches: Arc<AtomicUsize>,
    pub kills: Arc<AtomicUsize>,
    pub fail_with: Option<String>,
    pub startup_delay: Option<Duration>,
}

#[async_trait]
impl Launcher for FakeLauncher {
    async fn launch(&self, _config: &LaunchConfig) -> Result<Box<dyn BrowserProcess>> {
        self.launches.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.startup_delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(message) = &self.fail_with {
            return Err(HtmlPdfError::launch(message.clone()));
        }
        Ok(Box::new(FakeProcess {
            kills: Arc::clone(&self.kills),
        }))
    }
}

/// Connector handing out scripted sessions and recording tab lifecycles.
#[derive(Debug, Default)]
pub struct FakeConnector {
    pub script: Script,
    pub log: CommandLog,
    pub opened: Arc<AtomicUsize>,
    pub closed: Arc<Mutex<Vec<String>>>,
    pub endpoints: Arc<Mutex<Vec<Endpoint>>>,
    /// The tab exists on the browser as soon as the call starts; the
    /// answer arrives after this delay.
    pub open_delay: Option<Duration>,
}

#[async_trait]
impl TabConnector for FakeConnector {
    async fn open_tab(&self, endpoint: &Endpoint) -> Result<Tab> {
        let n = self.opened.fetch_add(1, Ordering::SeqCst) + 1;
        self.endpoints.lock().unwrap().push(endpoint.clone());
        if let Some(delay) = self.open_delay {
            tokio::time::sleep(delay).await;
        }
        Ok(Tab {
            id: format!("TAB-{n}"),
            kind: "page".to_string(),
            url: "about:blank".to_string(),
            web_socket_debugger_url: None,
        })
    }

    async fn close_tab(&self, _endpoint: &Endpoint, tab: &Tab) -> Result<()> {
        self.closed.lock().unwrap().push(tab.id.clone());
        Ok(())
    }

    async fn connect(&self, _endpoint: &Endpoint, _tab: &Tab) -> Result<CdpSession> {
        Ok(fake_session(self.script.clone(), self.log.clone()))
    }
}

/// A generator wired to fakes, plus handles for inspecting them.
pub struct Harness {
    pub generator: Generator,
    pub launches: Arc<AtomicUsize>,
    pub kills: Arc<AtomicUsize>,
    pub opened: Arc<AtomicUsize>,
    pub closed: Arc<Mutex<Vec<String>>>,
    pub endpoints: Arc<Mutex<Vec<Endpoint>>>,
    pub log: CommandLog,
}

impl Harness {
    pub fn new(script: Script) -> Self {
        Self::with_launcher(script, FakeLauncher::default())
    }

    pub fn with_launcher(script: Script, launcher: FakeLauncher) -> Self {
        Self::with_backends(
            launcher,
            FakeConnector {
                script,
                ..FakeConnector::default()
            },
        )
    }

    /// A harness whose tab creation answers only after `delay`.
    pub fn with_open_delay(script: Script, delay: Duration) -> Self {
        Self::with_backends(
            FakeLauncher::default(),
            FakeConnector {
                script,
                open_delay: Some(delay),
                ..FakeConnector::default()
            },
        )
    }

    fn with_backends(launcher: FakeLauncher, connector: FakeConnector) -> Self {
        let launches = Arc::clone(&launcher.launches);
        let kills = Arc::clone(&launcher.kills);
        let opened = Arc::clone(&connector.opened);
        let closed = Arc::clone(&connector.closed);
        let endpoints = Arc::clone(&connector.endpoints);
        let log = connector.log.clone();
        Self {
            generator: Generator::with_backends(Arc::new(launcher), Arc::new(connector)),
            launches,
            kills,
            opened,
            closed,
            endpoints,
            log,
        }
    }

    pub fn kills(&self) -> usize {
        self.kills.load(Ordering::SeqCst)
    }

    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }

    pub fn closed_tabs(&self) -> Vec<String> {
        self.closed.lock().unwrap().clone()
    }
}
