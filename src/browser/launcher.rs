//! Local browser process management.

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{debug, info, trace, warn};

use crate::options::{Endpoint, LaunchConfig};
use crate::{HtmlPdfError, Result};

/// Environment variable consulted when no explicit binary is configured.
pub const CHROME_PATH_ENV: &str = "CHROME_PATH";

/// Names searched on `PATH`, in order.
const CHROME_CANDIDATES: [&str; 5] = [
    "google-chrome-stable",
    "google-chrome",
    "chromium",
    "chromium-browser",
    "chrome",
];

#[cfg(target_os = "macos")]
const MAC_APP_BINARY: &str = "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome";

const DEVTOOLS_BANNER: &str = "DevTools listening on ";

/// Time allowed for a killed process to be reaped.
const KILL_GRACE: Duration = Duration::from_secs(5);

/// A running browser whose remote debugging endpoint is known.
#[async_trait]
pub trait BrowserProcess: Send + Sync + fmt::Debug {
    fn endpoint(&self) -> Endpoint;

    /// Terminates the process. Calling it again is a no-op.
    async fn kill(&self) -> Result<()>;
}

/// Starts browser processes.
///
/// Implementations must not leave a process running when `launch` fails.
#[async_trait]
pub trait Launcher: Send + Sync {
    async fn launch(&self, config: &LaunchConfig) -> Result<Box<dyn BrowserProcess>>;
}

/// Launches a local headless Chrome/Chromium.
#[derive(Debug, Clone, Default)]
pub struct ChromeLauncher;

impl ChromeLauncher {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Launcher for ChromeLauncher {
    async fn launch(&self, config: &LaunchConfig) -> Result<Box<dyn BrowserProcess>> {
        let binary = resolve_binary(config.chrome_path.as_deref())?;
        let profile = tempfile::Builder::new()
            .prefix("htmlpdf-profile-")
            .tempdir()
            .map_err(|e| HtmlPdfError::launch(format!("failed to create profile dir: {e}")))?;

        let mut cmd = Command::new(&binary);
        cmd.args(config.effective_flags())
            .arg("--remote-debugging-port=0")
            .arg(format!("--user-data-dir={}", profile.path().display()))
            .arg("--no-first-run")
            .arg("--no-default-browser-check")
            .arg("about:blank")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        info!(binary = %binary.display(), "launching browser");
        let mut child = cmd.spawn().map_err(|err| map_spawn_error(err, &binary))?;

        match wait_for_endpoint(&mut child, config.startup_timeout).await {
            Ok(endpoint) => {
                info!(%endpoint, pid = child.id(), "browser ready");
                Ok(Box::new(LaunchedChrome {
                    endpoint,
                    child: Mutex::new(Some(child)),
                    profile: Mutex::new(Some(profile)),
                }))
            }
            Err(err) => {
                // Partial startup: the process may be alive without an endpoint.
                let _ = child.start_kill();
                let _ = timeout(KILL_GRACE, child.wait()).await;
                Err(err)
            }
        }
    }
}

/// A browser started by [`ChromeLauncher`]; owns its throwaway profile.
pub struct LaunchedChrome {
    endpoint: Endpoint,
    child: Mutex<Option<Child>>,
    profile: Mutex<Option<TempDir>>,
}

impl fmt::Debug for LaunchedChrome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LaunchedChrome")
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl BrowserProcess for LaunchedChrome {
    fn endpoint(&self) -> Endpoint {
        self.endpoint.clone()
    }

    async fn kill(&self) -> Result<()> {
        let Some(mut child) = self.child.lock().await.take() else {
            return Ok(());
        };
        debug!(pid = child.id(), "killing browser");
        if let Err(e) = child.start_kill() {
            // Already exited on its own.
            trace!(error = %e, "browser kill signal not delivered");
        }
        if timeout(KILL_GRACE, child.wait()).await.is_err() {
            warn!("browser did not exit within {:?} after kill", KILL_GRACE);
        }
        if let Some(profile) = self.profile.lock().await.take() {
            if let Err(e) = profile.close() {
                warn!(error = %e, "failed to remove browser profile dir");
            }
        }
        Ok(())
    }
}

fn resolve_binary(explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        return if path.exists() {
            Ok(path.to_path_buf())
        } else {
            which::which(path).map_err(|_| {
                HtmlPdfError::launch(format!("browser binary not found at {}", path.display()))
            })
        };
    }

    if let Some(path) = std::env::var_os(CHROME_PATH_ENV).filter(|p| !p.is_empty()) {
        return Ok(PathBuf::from(path));
    }

    if let Some(found) = CHROME_CANDIDATES
        .iter()
        .find_map(|name| which::which(name).ok())
    {
        return Ok(found);
    }

    #[cfg(target_os = "macos")]
    {
        let app = Path::new(MAC_APP_BINARY);
        if app.exists() {
            return Ok(app.to_path_buf());
        }
    }

    Err(HtmlPdfError::launch(format!(
        "no Chrome/Chromium binary found on PATH (tried {})",
        CHROME_CANDIDATES.join(", ")
    )))
}

fn map_spawn_error(err: std::io::Error, binary: &Path) -> HtmlPdfError {
    if err.kind() == std::io::ErrorKind::NotFound {
        HtmlPdfError::launch(format!("browser binary not found: {}", binary.display()))
    } else {
        HtmlPdfError::launch(format!("failed to start {}: {err}", binary.display()))
    }
}

/// Reads stderr until the DevTools banner appears, then keeps draining it in
/// the background so the pipe never fills.
async fn wait_for_endpoint(child: &mut Child, startup: Duration) -> Result<Endpoint> {
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| HtmlPdfError::launch("browser stderr was not captured"))?;
    let mut lines = BufReader::new(stderr).lines();
    let mut tail: Vec<String> = Vec::new();

    let found = timeout(startup, async {
        while let Some(line) = lines.next_line().await? {
            trace!(line = %line, "browser stderr");
            if let Some(endpoint) = parse_devtools_banner(&line) {
                return Ok(Some(endpoint));
            }
            if tail.len() == 5 {
                tail.remove(0);
            }
            tail.push(line);
        }
        Ok::<_, std::io::Error>(None)
    })
    .await;

    match found {
        Ok(Ok(Some(endpoint))) => {
            tokio::spawn(async move {
                while let Ok(Some(line)) = lines.next_line().await {
                    trace!(line = %line, "browser stderr");
                }
            });
            Ok(endpoint)
        }
        Ok(Ok(None)) => Err(HtmlPdfError::launch(format!(
            "browser exited before reporting a DevTools endpoint: {}",
            tail.join(" | ")
        ))),
        Ok(Err(e)) => Err(HtmlPdfError::launch(format!(
            "failed to read browser output: {e}"
        ))),
        Err(_) => Err(HtmlPdfError::launch(format!(
            "browser did not report a DevTools endpoint within {startup:?}"
        ))),
    }
}

/// Extracts the endpoint from `DevTools listening on ws://HOST:PORT/devtools/browser/ID`.
pub(crate) fn parse_devtools_banner(line: &str) -> Option<Endpoint> {
    let raw = line.trim().strip_prefix(DEVTOOLS_BANNER)?;
    let url = url::Url::parse(raw.trim()).ok()?;
    let host = url.host_str()?.to_string();
    let port = url.port()?;
    Some(Endpoint::new(host, port))
}
