// src/driver/chromium.rs

//! Chrome / Edge driver over the DevTools protocol.
//!
//! Locators are resolved inside the page with a small script, so text
//! filters and parent scoping behave the same as in the unit-test fake.
//! Clicks and typing go through real input events: the resolved element
//! is tagged with a one-off attribute and then addressed by CSS.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig as CdpConfig};
use chromiumoxide::cdp::browser_protocol::browser::{
    DownloadProgressState, EventDownloadProgress, EventDownloadWillBegin,
    SetDownloadBehaviorBehavior, SetDownloadBehaviorParams,
};
use chromiumoxide::handler::viewport::Viewport;
use chromiumoxide::listeners::EventStream;
use chromiumoxide::Page;
use futures::StreamExt;
use serde_json::Value;
use tokio::sync::{Mutex, broadcast};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::{Download, Launcher, Locator, PortalPage};
use crate::error::{AppError, Result};
use crate::models::BrowserConfig;

const POLL_INTERVAL: Duration = Duration::from_millis(250);
const TARGET_ATTR: &str = "data-unify-target";

/// Launches a browser with a persistent profile.
pub struct ChromiumLauncher {
    config: BrowserConfig,
}

impl ChromiumLauncher {
    pub fn new(config: BrowserConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Launcher for ChromiumLauncher {
    async fn launch(&self, download_dir: &Path) -> Result<Arc<dyn PortalPage>> {
        let page = ChromiumPage::launch(&self.config, download_dir).await?;
        Ok(Arc::new(page))
    }
}

/// One page in a dedicated browser process.
pub struct ChromiumPage {
    browser: Mutex<Browser>,
    page: Page,
    handler_task: JoinHandle<()>,
    progress_task: JoinHandle<()>,
    /// Cancelled once the DevTools connection ends
    closed: CancellationToken,
    download_dir: PathBuf,
    /// Held across a click and its short start window so concurrent
    /// downloads pair up with their clicks
    begins: Mutex<EventStream<EventDownloadWillBegin>>,
    progress: broadcast::Sender<Progress>,
}

#[derive(Debug, Clone)]
struct Progress {
    guid: String,
    state: DownloadProgressState,
}

impl Drop for ChromiumPage {
    fn drop(&mut self) {
        self.progress_task.abort();
        self.handler_task.abort();
    }
}

impl ChromiumPage {
    pub async fn launch(config: &BrowserConfig, download_dir: &Path) -> Result<Self> {
        tokio::fs::create_dir_all(download_dir).await?;
        tokio::fs::create_dir_all(&config.user_data_dir).await?;
        let download_dir = tokio::fs::canonicalize(download_dir).await?;

        let executable = match &config.executable {
            Some(path) => path.clone(),
            None => find_browser().ok_or_else(|| {
                AppError::config("no Chrome or Edge executable found; set browser.executable")
            })?,
        };
        log::debug!("Launching {}", executable.display());

        let mut builder = CdpConfig::builder()
            .chrome_executable(&executable)
            .user_data_dir(&config.user_data_dir)
            .viewport(None::<Viewport>);
        if !config.headless {
            builder = builder.with_head();
        }
        for arg in &config.args {
            builder = builder.arg(arg.as_str());
        }
        let cdp_config = builder.build().map_err(AppError::driver)?;

        let (browser, mut handler) = Browser::launch(cdp_config).await.map_err(AppError::driver)?;

        let closed = CancellationToken::new();
        let handler_closed = closed.clone();
        let handler_task = tokio::spawn(async move {
            while handler.next().await.is_some() {}
            log::debug!("DevTools connection ended");
            handler_closed.cancel();
        });

        let behavior = SetDownloadBehaviorParams::builder()
            .behavior(SetDownloadBehaviorBehavior::AllowAndName)
            .download_path(download_dir.to_string_lossy().to_string())
            .events_enabled(true)
            .build()
            .map_err(AppError::driver)?;
        browser.execute(behavior).await.map_err(AppError::driver)?;

        let begins = browser
            .event_listener::<EventDownloadWillBegin>()
            .await
            .map_err(AppError::driver)?;
        let mut progress_events = browser
            .event_listener::<EventDownloadProgress>()
            .await
            .map_err(AppError::driver)?;

        let (progress, _) = broadcast::channel(256);
        let sender = progress.clone();
        let progress_task = tokio::spawn(async move {
            while let Some(event) = progress_events.next().await {
                let _ = sender.send(Progress {
                    guid: event.guid.clone(),
                    state: event.state.clone(),
                });
            }
        });

        let page = browser.new_page("about:blank").await.map_err(AppError::driver)?;

        Ok(Self {
            browser: Mutex::new(browser),
            page,
            handler_task,
            progress_task,
            closed,
            download_dir,
            begins: Mutex::new(begins),
            progress,
        })
    }

    /// Race `fut` against the browser going away.
    async fn guarded<T>(&self, fut: impl Future<Output = Result<T>> + Send) -> Result<T> {
        let result = tokio::select! {
            biased;
            _ = self.closed.cancelled() => return Err(AppError::SessionClosed),
            result = fut => result,
        };
        result.map_err(|e| {
            if self.closed.is_cancelled() {
                AppError::SessionClosed
            } else {
                e
            }
        })
    }

    async fn eval(&self, script: String) -> Result<Value> {
        let result = self.page.evaluate(script).await.map_err(AppError::driver)?;
        Ok(result.into_value::<Value>()?)
    }

    /// Run `body` with `el` bound to the resolved element, or `null`.
    async fn with_element(&self, locator: &Locator, body: &str) -> Result<Value> {
        let script = format!(
            "(() => {{ {RESOLVE_JS} const el = resolve({}); {body} }})()",
            serde_json::to_string(locator)?
        );
        self.eval(script).await
    }

    /// Tag the element so it can be addressed by a plain CSS selector.
    async fn tag(&self, locator: &Locator) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        let found = self
            .with_element(
                locator,
                &format!("if (!el) return false; el.setAttribute('{TARGET_ATTR}', '{id}'); return true;"),
            )
            .await?;
        if found.as_bool() != Some(true) {
            return Err(AppError::ElementNotFound(locator.to_string()));
        }
        Ok(format!("[{TARGET_ATTR}=\"{id}\"]"))
    }

    async fn real_click(&self, locator: &Locator) -> Result<()> {
        let css = self.tag(locator).await?;
        let element = self.page.find_element(css).await.map_err(AppError::driver)?;
        element.click().await.map_err(AppError::driver)?;
        Ok(())
    }

    async fn is_visible(&self, locator: &Locator) -> Result<bool> {
        let visible = self
            .with_element(
                locator,
                "if (!el) return false; \
                 const style = window.getComputedStyle(el); \
                 return style.visibility !== 'hidden' && el.getClientRects().length > 0;",
            )
            .await?;
        Ok(visible.as_bool().unwrap_or(false))
    }

    async fn current_url(&self) -> Result<String> {
        let url = self.page.url().await.map_err(AppError::driver)?;
        Ok(url.unwrap_or_default())
    }
}

#[async_trait]
impl PortalPage for ChromiumPage {
    async fn goto(&self, url: &str, timeout: Duration) -> Result<()> {
        self.guarded(async {
            match tokio::time::timeout(timeout, self.page.goto(url)).await {
                Ok(result) => result.map(|_| ()).map_err(AppError::driver),
                Err(_) => Err(AppError::timeout(url, timeout)),
            }
        })
        .await
    }

    async fn wait_for_url(&self, url: &str, timeout: Duration) -> Result<()> {
        let wanted = url.trim_end_matches('/');
        self.guarded(async {
            let deadline = tokio::time::Instant::now() + timeout;
            loop {
                if self.current_url().await?.trim_end_matches('/') == wanted {
                    return Ok(());
                }
                if tokio::time::Instant::now() >= deadline {
                    return Err(AppError::timeout(format!("URL {url}"), timeout));
                }
                tokio::time::sleep(POLL_INTERVAL).await;
            }
        })
        .await
    }

    async fn wait_visible(&self, locator: &Locator, timeout: Duration) -> Result<()> {
        self.guarded(async {
            let deadline = tokio::time::Instant::now() + timeout;
            loop {
                if self.is_visible(locator).await? {
                    return Ok(());
                }
                if tokio::time::Instant::now() >= deadline {
                    return Err(AppError::timeout(locator.to_string(), timeout));
                }
                tokio::time::sleep(POLL_INTERVAL).await;
            }
        })
        .await
    }

    async fn fill(&self, locator: &Locator, value: &str) -> Result<()> {
        self.guarded(async {
            let css = self.tag(locator).await?;
            self.with_element(locator, "if (el) { el.value = ''; } return true;")
                .await?;
            let element = self.page.find_element(css).await.map_err(AppError::driver)?;
            element.click().await.map_err(AppError::driver)?;
            element.type_str(value).await.map_err(AppError::driver)?;
            Ok(())
        })
        .await
    }

    async fn click(&self, locator: &Locator) -> Result<()> {
        self.guarded(self.real_click(locator)).await
    }

    async fn check(&self, locator: &Locator) -> Result<()> {
        self.guarded(async {
            let state = self
                .with_element(
                    locator,
                    "if (!el) return 'missing'; \
                     const box = el.matches('input') ? el \
                       : (el.closest('label') && el.closest('label').control) \
                         || el.querySelector('input[type=checkbox]'); \
                     return box && box.checked ? 'checked' : 'unchecked';",
                )
                .await?;
            match state.as_str() {
                Some("checked") => Ok(()),
                Some("missing") => Err(AppError::ElementNotFound(locator.to_string())),
                _ => self.real_click(locator).await,
            }
        })
        .await
    }

    async fn select_option(&self, locator: &Locator, option: &str) -> Result<()> {
        self.guarded(async {
            let body = format!(
                "if (!el) return 'missing'; \
                 const wanted = {}; \
                 const opt = Array.from(el.options || []) \
                   .find(o => o.value === wanted || o.label.trim() === wanted || o.text.trim() === wanted); \
                 if (!opt) return 'no-option'; \
                 el.value = opt.value; \
                 el.dispatchEvent(new Event('input', {{ bubbles: true }})); \
                 el.dispatchEvent(new Event('change', {{ bubbles: true }})); \
                 return 'ok';",
                serde_json::to_string(option)?
            );
            match self.with_element(locator, &body).await?.as_str() {
                Some("ok") => Ok(()),
                Some("no-option") => Err(AppError::driver(format!(
                    "option {option:?} not present in {locator}"
                ))),
                _ => Err(AppError::ElementNotFound(locator.to_string())),
            }
        })
        .await
    }

    async fn count(&self, locator: &Locator) -> Result<usize> {
        self.guarded(async {
            let script = format!(
                "(() => {{ {RESOLVE_JS} return matches({}).length; }})()",
                serde_json::to_string(locator)?
            );
            let count = self.eval(script).await?;
            Ok(count.as_u64().unwrap_or(0) as usize)
        })
        .await
    }

    async fn attribute(&self, locator: &Locator, name: &str) -> Result<Option<String>> {
        self.guarded(async {
            let body = format!(
                "if (!el) return {{ found: false }}; return {{ found: true, value: el.getAttribute({}) }};",
                serde_json::to_string(name)?
            );
            let result = self.with_element(locator, &body).await?;
            if result["found"].as_bool() != Some(true) {
                return Err(AppError::ElementNotFound(locator.to_string()));
            }
            Ok(result["value"].as_str().map(str::to_string))
        })
        .await
    }

    async fn inner_text(&self, locator: &Locator) -> Result<String> {
        self.guarded(async {
            let text = self
                .with_element(locator, "return el ? (el.innerText || el.textContent || '') : null;")
                .await?;
            text.as_str()
                .map(str::to_string)
                .ok_or_else(|| AppError::ElementNotFound(locator.to_string()))
        })
        .await
    }

    async fn click_for_download(
        &self,
        locator: &Locator,
        timeout: Duration,
    ) -> Result<Box<dyn Download>> {
        self.guarded(async {
            let mut begins = self.begins.lock().await;
            let progress = self.progress.subscribe();
            self.real_click(locator).await?;

            let begin = match tokio::time::timeout(timeout, begins.next()).await {
                Ok(Some(event)) => event,
                Ok(None) => return Err(AppError::SessionClosed),
                Err(_) => return Err(AppError::timeout(format!("download from {locator}"), timeout)),
            };
            log::debug!("Download started: {} ({})", begin.suggested_filename, begin.guid);

            let download: Box<dyn Download> = Box::new(ChromiumDownload {
                guid: begin.guid.clone(),
                suggested: begin.suggested_filename.clone(),
                download_dir: self.download_dir.clone(),
                progress,
                closed: self.closed.clone(),
            });
            Ok(download)
        })
        .await
    }

    async fn close(&self) -> Result<()> {
        if self.closed.is_cancelled() {
            return Ok(());
        }
        let mut browser = self.browser.lock().await;
        browser.close().await.map_err(AppError::driver)?;
        if let Err(e) = browser.wait().await {
            log::debug!("Waiting for browser exit: {e}");
        }
        Ok(())
    }
}

/// A transfer identified by its DevTools guid.
struct ChromiumDownload {
    guid: String,
    suggested: String,
    download_dir: PathBuf,
    progress: broadcast::Receiver<Progress>,
    closed: CancellationToken,
}

impl ChromiumDownload {
    async fn wait_completed(&mut self) -> Result<()> {
        loop {
            let update = tokio::select! {
                biased;
                _ = self.closed.cancelled() => return Err(AppError::SessionClosed),
                update = self.progress.recv() => update,
            };
            match update {
                Ok(p) if p.guid != self.guid => {}
                Ok(p) => match p.state {
                    DownloadProgressState::Completed => return Ok(()),
                    DownloadProgressState::Canceled => {
                        return Err(AppError::download(&self.suggested, "cancelled by the browser"));
                    }
                    _ => {}
                },
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    log::debug!("Missed {missed} download progress event(s)");
                    if self.download_dir.join(&self.guid).exists() {
                        return Ok(());
                    }
                }
                Err(broadcast::error::RecvError::Closed) => return Err(AppError::SessionClosed),
            }
        }
    }
}

#[async_trait]
impl Download for ChromiumDownload {
    fn suggested_filename(&self) -> Option<&str> {
        Some(self.suggested.as_str()).filter(|name| !name.is_empty())
    }

    async fn save_as(&mut self, path: &Path) -> Result<()> {
        self.wait_completed().await?;

        let source = self.download_dir.join(&self.guid);
        if tokio::fs::rename(&source, path).await.is_err() {
            tokio::fs::copy(&source, path).await?;
            tokio::fs::remove_file(&source).await?;
        }
        Ok(())
    }
}

/// In-page locator resolution shared by every script.
const RESOLVE_JS: &str = r#"
const matches = (loc) => {
  let root = document;
  if (loc.parent) {
    root = resolve(loc.parent);
    if (!root) return [];
  }
  let found = Array.from(root.querySelectorAll(loc.selector));
  if (loc.has_text != null) {
    found = found.filter(e => (e.innerText || e.textContent || '').includes(loc.has_text));
  }
  return found;
};
const resolve = (loc) => matches(loc)[loc.nth ?? 0] || null;
"#;

/// Look for an installed Chrome or Edge.
fn find_browser() -> Option<PathBuf> {
    let mut candidates: Vec<PathBuf> = Vec::new();
    if let Some(local) = std::env::var_os("LOCALAPPDATA") {
        candidates.push(PathBuf::from(local).join(r"Google\Chrome\Application\chrome.exe"));
    }
    candidates.extend(
        [
            r"C:\Program Files\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files (x86)\Microsoft\Edge\Application\msedge.exe",
            r"C:\Program Files\Microsoft\Edge\Application\msedge.exe",
            "/usr/bin/google-chrome",
            "/usr/bin/google-chrome-stable",
            "/usr/bin/chromium",
            "/usr/bin/chromium-browser",
            "/usr/bin/microsoft-edge",
            "/snap/bin/chromium",
            "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
            "/Applications/Microsoft Edge.app/Contents/MacOS/Microsoft Edge",
        ]
        .into_iter()
        .map(PathBuf::from),
    );
    candidates.into_iter().find(|path| path.exists())
}
