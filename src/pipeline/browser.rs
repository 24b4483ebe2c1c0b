//! Headless-browser capability probe and session lifecycle.
//!
//! Whether a usable Chrome/Chromium exists is an expensive question — it
//! involves a filesystem scan and a trial launch — and the answer does
//! not change while the process runs. [`BrowserRuntime`] memoises it in
//! a [`tokio::sync::OnceCell`]: the first caller performs the probe,
//! concurrent callers wait on the same initialisation, and everyone
//! afterwards reads the cached verdict. Re-probing happens only through
//! an explicit [`BrowserRuntime::reset`].
//!
//! The probe can only ever produce a capability fact. A missing binary,
//! a version mismatch, or a launch crash all mean `available == false`;
//! nothing here is an error the pipeline would surface.

use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::page::ScreenshotParams;
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::OnceCell;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Environment override for the browser binary, checked before the
/// well-known install locations.
pub const BROWSER_ENV: &str = "DEALCARD_BROWSER";

/// Executable names probed on `$PATH`.
const PATH_CANDIDATES: &[&str] = &[
    "google-chrome",
    "google-chrome-stable",
    "chromium",
    "chromium-browser",
    "chrome",
];

/// Well-known install locations per OS.
#[cfg(target_os = "linux")]
const INSTALL_CANDIDATES: &[&str] = &[
    "/usr/bin/google-chrome",
    "/usr/bin/google-chrome-stable",
    "/usr/bin/chromium",
    "/usr/bin/chromium-browser",
    "/snap/bin/chromium",
    "/opt/google/chrome/chrome",
];

#[cfg(target_os = "macos")]
const INSTALL_CANDIDATES: &[&str] = &[
    "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
    "/Applications/Chromium.app/Contents/MacOS/Chromium",
];

#[cfg(target_os = "windows")]
const INSTALL_CANDIDATES: &[&str] = &[
    r"C:\Program Files\Google\Chrome\Application\chrome.exe",
    r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
];

#[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
const INSTALL_CANDIDATES: &[&str] = &[];

/// Failures inside the browser-backed paths.
///
/// These never leave the pipeline: the renderer falls back to the
/// procedural backend and the extractor falls through to its final
/// verdict. The type exists so call sites can log *why* a session died.
#[derive(Debug)]
pub enum BrowserFailure {
    Launch(String),
    Navigation(String),
    Capture(String),
    Timeout,
}

impl std::fmt::Display for BrowserFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Launch(d) => write!(f, "launch failed: {d}"),
            Self::Navigation(d) => write!(f, "navigation failed: {d}"),
            Self::Capture(d) => write!(f, "capture failed: {d}"),
            Self::Timeout => write!(f, "browser operation timed out"),
        }
    }
}

/// Process-wide browser capability, threaded explicitly into the stages
/// that branch on it.
pub struct BrowserRuntime {
    explicit: Option<PathBuf>,
    disabled: bool,
    launch_timeout: Duration,
    user_agent: String,
    probe: OnceCell<Option<PathBuf>>,
}

impl BrowserRuntime {
    pub fn new(
        explicit: Option<PathBuf>,
        disabled: bool,
        launch_timeout: Duration,
        user_agent: impl Into<String>,
    ) -> Self {
        Self {
            explicit,
            disabled,
            launch_timeout,
            user_agent: user_agent.into(),
            probe: OnceCell::new(),
        }
    }

    /// Build from pipeline configuration.
    pub fn from_config(config: &crate::config::PipelineConfig) -> Self {
        Self::new(
            config.browser_executable.clone(),
            config.disable_browser,
            Duration::from_secs(config.browser_launch_timeout_secs),
            config.user_agent.clone(),
        )
    }

    /// Whether browser-backed strategies may be used.
    ///
    /// First call performs the probe; concurrent first calls share one
    /// probe; later calls return the memoised verdict.
    pub async fn available(&self) -> bool {
        self.executable().await.is_some()
    }

    /// The probed executable, if the capability check passed.
    pub async fn executable(&self) -> Option<PathBuf> {
        if self.disabled {
            return None;
        }
        self.probe
            .get_or_init(|| async {
                let verdict = probe_executable(
                    self.explicit.as_deref(),
                    self.launch_timeout,
                )
                .await;
                match &verdict {
                    Some(path) => info!("Browser backend available: {}", path.display()),
                    None => info!("Browser backend unavailable; procedural paths only"),
                }
                verdict
            })
            .await
            .clone()
    }

    /// Discard the memoised verdict so the next call probes again.
    ///
    /// Exclusive access makes the reset race-free: no session can hold a
    /// stale verdict across it.
    pub fn reset(&mut self) {
        self.probe = OnceCell::new();
    }

    /// Open a headless session sized to `width`×`height`.
    ///
    /// Returns `None` when the capability probe failed; the caller is
    /// expected to take its non-browser path.
    pub async fn session(&self, width: u32, height: u32) -> Option<BrowserSession> {
        let executable = self.executable().await?;
        match BrowserSession::launch(
            &executable,
            width,
            height,
            &self.user_agent,
            self.launch_timeout,
        )
        .await
        {
            Ok(session) => Some(session),
            Err(e) => {
                warn!("Browser session failed to open: {e}");
                None
            }
        }
    }
}

impl std::fmt::Debug for BrowserRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrowserRuntime")
            .field("explicit", &self.explicit)
            .field("disabled", &self.disabled)
            .field("probed", &self.probe.get())
            .finish()
    }
}

/// Locate a browser binary and verify it actually starts.
///
/// Order: explicit config path, `DEALCARD_BROWSER`, well-known install
/// locations, `$PATH`. The first existing binary is trial-launched; a
/// binary that exists but cannot start headless yields `None` rather
/// than trying further candidates — a broken install is not fixed by a
/// second copy of the same install.
async fn probe_executable(
    explicit: Option<&Path>,
    launch_timeout: Duration,
) -> Option<PathBuf> {
    let candidate = find_candidate(explicit)?;
    debug!("Probing browser candidate: {}", candidate.display());

    match liveness_check(&candidate, launch_timeout).await {
        Ok(()) => Some(candidate),
        Err(e) => {
            warn!("Browser candidate '{}' failed liveness: {e}", candidate.display());
            None
        }
    }
}

fn find_candidate(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return path.exists().then(|| path.to_path_buf());
    }

    if let Some(env_path) = std::env::var_os(BROWSER_ENV) {
        let path = PathBuf::from(env_path);
        if path.exists() {
            return Some(path);
        }
    }

    for location in INSTALL_CANDIDATES {
        let path = PathBuf::from(location);
        if path.exists() {
            return Some(path);
        }
    }

    let search_path = std::env::var_os("PATH")?;
    for dir in std::env::split_paths(&search_path) {
        for name in PATH_CANDIDATES {
            let path = dir.join(name);
            if path.exists() {
                return Some(path);
            }
        }
    }
    None
}

/// Start and immediately stop a headless session.
async fn liveness_check(executable: &Path, launch_timeout: Duration) -> Result<(), BrowserFailure> {
    let session = BrowserSession::launch(
        executable,
        800,
        600,
        crate::config::DEFAULT_USER_AGENT,
        launch_timeout,
    )
    .await?;
    session.close().await;
    Ok(())
}

/// One exclusive headless browser process.
///
/// The CDP event handler runs on a companion task for the session's
/// lifetime; [`BrowserSession::close`] tears both down. Dropping a
/// session without closing leaks the child briefly until the handler
/// task notices the closed pipe, so the render and extract paths close
/// explicitly on success and failure alike.
pub struct BrowserSession {
    browser: Browser,
    handler_task: JoinHandle<()>,
    op_timeout: Duration,
}

impl BrowserSession {
    async fn launch(
        executable: &Path,
        width: u32,
        height: u32,
        user_agent: &str,
        launch_timeout: Duration,
    ) -> Result<Self, BrowserFailure> {
        let config = BrowserConfig::builder()
            .chrome_executable(executable)
            .window_size(width, height)
            .no_sandbox()
            .arg("--disable-dev-shm-usage")
            .arg("--disable-blink-features=AutomationControlled")
            .arg(format!("--user-agent={user_agent}"))
            .build()
            .map_err(BrowserFailure::Launch)?;

        let (browser, mut handler) = timeout(launch_timeout, Browser::launch(config))
            .await
            .map_err(|_| BrowserFailure::Timeout)?
            .map_err(|e| BrowserFailure::Launch(e.to_string()))?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        Ok(Self {
            browser,
            handler_task,
            op_timeout: launch_timeout,
        })
    }

    /// Navigate to `url`, wait `settle` for script-rendered content,
    /// and return the rendered DOM.
    pub async fn rendered_html(
        &self,
        url: &str,
        settle: Duration,
    ) -> Result<String, BrowserFailure> {
        let page = timeout(self.op_timeout, self.browser.new_page(url))
            .await
            .map_err(|_| BrowserFailure::Timeout)?
            .map_err(|e| BrowserFailure::Navigation(e.to_string()))?;

        tokio::time::sleep(settle).await;

        let html = timeout(self.op_timeout, page.content())
            .await
            .map_err(|_| BrowserFailure::Timeout)?
            .map_err(|e| BrowserFailure::Capture(e.to_string()))?;

        let _ = page.close().await;
        Ok(html)
    }

    /// Navigate to `url` and capture a PNG screenshot of the viewport.
    pub async fn screenshot(
        &self,
        url: &str,
        settle: Duration,
    ) -> Result<Vec<u8>, BrowserFailure> {
        let page = timeout(self.op_timeout, self.browser.new_page(url))
            .await
            .map_err(|_| BrowserFailure::Timeout)?
            .map_err(|e| BrowserFailure::Navigation(e.to_string()))?;

        tokio::time::sleep(settle).await;

        let params = ScreenshotParams::builder()
            .format(CaptureScreenshotFormat::Png)
            .full_page(false)
            .build();
        let bytes = timeout(self.op_timeout, page.screenshot(params))
            .await
            .map_err(|_| BrowserFailure::Timeout)?
            .map_err(|e| BrowserFailure::Capture(e.to_string()))?;

        let _ = page.close().await;
        Ok(bytes)
    }

    /// Shut the browser down and reap its process.
    pub async fn close(mut self) {
        if let Err(e) = self.browser.close().await {
            debug!("Browser close: {e}");
        }
        let _ = self.browser.wait().await;
        self.handler_task.abort();
    }
}
