//! Scripted page used by the unit tests.

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use crate::driver::{Download, Launcher, Locator, PortalPage};
use crate::error::{AppError, Result};
use crate::models::PortalSelectors;

/// A notification feed row.
#[derive(Debug, Clone)]
pub struct FakeRow {
    pub title_attr: Option<String>,
    /// `None` makes reading the visible text fail
    pub title_text: Option<String>,
    pub time: String,
}

impl FakeRow {
    pub fn new(title: &str, time: &str) -> Self {
        Self {
            title_attr: Some(title.to_string()),
            title_text: Some(title.to_string()),
            time: time.to_string(),
        }
    }

    pub fn broken() -> Self {
        Self {
            title_attr: None,
            title_text: None,
            time: String::new(),
        }
    }
}

/// Scripted behaviour of one download attempt.
#[derive(Debug, Clone)]
pub enum FakeAttempt {
    Save { delay: Duration, bytes: Vec<u8> },
    Fail(String),
    Timeout,
    /// No download ever starts; fails once the start window passes
    Stall,
    /// Starts at once, the transfer takes `delay`
    SlowTransfer(Duration),
    Closed,
}

impl FakeAttempt {
    pub fn ok() -> Self {
        Self::Save {
            delay: Duration::ZERO,
            bytes: b"PK".to_vec(),
        }
    }
}

#[derive(Default)]
struct State {
    url_results: VecDeque<Result<()>>,
    hidden: HashSet<(String, Option<String>)>,
    actions: Vec<String>,
    rows: Vec<FakeRow>,
    attempts: HashMap<String, VecDeque<FakeAttempt>>,
    download_calls: HashMap<String, u32>,
    /// Locators that went through `wait_visible`
    waited: HashSet<String>,
    /// Clicks fail unless the locator was waited for first
    strict_clicks: bool,
}

pub struct FakePage {
    selectors: PortalSelectors,
    state: Mutex<State>,
    closed: AtomicBool,
}

impl FakePage {
    pub fn new() -> Self {
        Self {
            selectors: PortalSelectors::default(),
            state: Mutex::new(State::default()),
            closed: AtomicBool::new(false),
        }
    }

    /// Queue the outcome of the next `wait_for_url` call.
    pub fn push_url_result(&self, result: Result<()>) {
        self.state.lock().unwrap().url_results.push_back(result);
    }

    /// Make a selector (with optional text filter) never become visible.
    pub fn hide(&self, selector: &str, text: Option<&str>) {
        self.state
            .lock()
            .unwrap()
            .hidden
            .insert((selector.to_string(), text.map(String::from)));
    }

    pub fn set_rows(&self, rows: Vec<FakeRow>) {
        self.state.lock().unwrap().rows = rows;
    }

    /// Script the attempts for downloads of `title`; unscripted attempts succeed.
    pub fn script_downloads(&self, title: &str, attempts: Vec<FakeAttempt>) {
        self.state
            .lock()
            .unwrap()
            .attempts
            .insert(title.to_string(), attempts.into());
    }

    /// Make clicks on elements nobody waited for fail, like a page that
    /// has not rendered them yet.
    pub fn require_wait_before_click(&self) {
        self.state.lock().unwrap().strict_clicks = true;
    }

    /// Simulate the user closing the browser window.
    pub fn terminate(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    pub fn actions(&self) -> Vec<String> {
        self.state.lock().unwrap().actions.clone()
    }

    pub fn download_calls(&self, title: &str) -> u32 {
        self.state
            .lock()
            .unwrap()
            .download_calls
            .get(title)
            .copied()
            .unwrap_or(0)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            Err(AppError::SessionClosed)
        } else {
            Ok(())
        }
    }

    fn record(&self, action: String) {
        self.state.lock().unwrap().actions.push(action);
    }

    fn row_index(locator: &Locator) -> Option<usize> {
        locator.parent.as_ref().and_then(|p| p.nth).or(locator.nth)
    }

    fn row(&self, locator: &Locator) -> Result<FakeRow> {
        let index = Self::row_index(locator)
            .ok_or_else(|| AppError::ElementNotFound(locator.to_string()))?;
        self.state
            .lock()
            .unwrap()
            .rows
            .get(index)
            .cloned()
            .ok_or_else(|| AppError::ElementNotFound(locator.to_string()))
    }
}

#[async_trait]
impl PortalPage for FakePage {
    async fn goto(&self, url: &str, _timeout: Duration) -> Result<()> {
        self.ensure_open()?;
        self.record(format!("goto {url}"));
        Ok(())
    }

    async fn wait_for_url(&self, url: &str, timeout: Duration) -> Result<()> {
        self.ensure_open()?;
        self.record(format!("wait_for_url {url}"));
        let next = self.state.lock().unwrap().url_results.pop_front();
        match next {
            Some(Err(AppError::Timeout { .. })) => Err(AppError::timeout(url, timeout)),
            Some(result) => result,
            None => Ok(()),
        }
    }

    async fn wait_visible(&self, locator: &Locator, timeout: Duration) -> Result<()> {
        self.ensure_open()?;
        let mut state = self.state.lock().unwrap();
        let key = (locator.selector.clone(), locator.has_text.clone());
        let empty_feed =
            locator.selector == self.selectors.notification_row && state.rows.is_empty();
        if state.hidden.contains(&key) || empty_feed {
            return Err(AppError::timeout(locator.to_string(), timeout));
        }
        state.waited.insert(locator.to_string());
        Ok(())
    }

    async fn fill(&self, locator: &Locator, value: &str) -> Result<()> {
        self.ensure_open()?;
        self.record(format!("fill {locator} = {value}"));
        Ok(())
    }

    async fn click(&self, locator: &Locator) -> Result<()> {
        self.ensure_open()?;
        {
            let state = self.state.lock().unwrap();
            if state.strict_clicks && !state.waited.contains(&locator.to_string()) {
                return Err(AppError::ElementNotFound(locator.to_string()));
            }
        }
        self.record(format!("click {locator}"));
        Ok(())
    }

    async fn check(&self, locator: &Locator) -> Result<()> {
        self.ensure_open()?;
        self.record(format!("check {locator}"));
        Ok(())
    }

    async fn select_option(&self, locator: &Locator, option: &str) -> Result<()> {
        self.ensure_open()?;
        self.record(format!("select {locator} = {option}"));
        Ok(())
    }

    async fn count(&self, locator: &Locator) -> Result<usize> {
        self.ensure_open()?;
        if locator.selector == self.selectors.notification_row {
            Ok(self.state.lock().unwrap().rows.len())
        } else {
            Ok(1)
        }
    }

    async fn attribute(&self, locator: &Locator, name: &str) -> Result<Option<String>> {
        self.ensure_open()?;
        if name != self.selectors.title_attr {
            return Ok(None);
        }
        Ok(self.row(locator)?.title_attr)
    }

    async fn inner_text(&self, locator: &Locator) -> Result<String> {
        self.ensure_open()?;
        let row = self.row(locator)?;
        if locator.selector == self.selectors.notification_time {
            return Ok(row.time);
        }
        row.title_text
            .ok_or_else(|| AppError::driver(format!("{locator} detached")))
    }

    async fn close(&self) -> Result<()> {
        self.record("close".into());
        Ok(())
    }

    async fn click_for_download(
        &self,
        locator: &Locator,
        timeout: Duration,
    ) -> Result<Box<dyn Download>> {
        self.ensure_open()?;
        let row = self.row(locator)?;
        let title = row.title_attr.or(row.title_text).unwrap_or_default();

        let attempt = {
            let mut state = self.state.lock().unwrap();
            *state.download_calls.entry(title.clone()).or_insert(0) += 1;
            state
                .attempts
                .get_mut(&title)
                .and_then(VecDeque::pop_front)
                .unwrap_or_else(FakeAttempt::ok)
        };

        match attempt {
            FakeAttempt::Save { delay, bytes } => {
                tokio::time::sleep(delay).await;
                Ok(Box::new(FakeDownload {
                    bytes,
                    transfer: Duration::ZERO,
                }))
            }
            FakeAttempt::SlowTransfer(transfer) => Ok(Box::new(FakeDownload {
                bytes: b"PK".to_vec(),
                transfer,
            })),
            FakeAttempt::Fail(message) => Err(AppError::download(title, message)),
            FakeAttempt::Timeout => Err(AppError::timeout("download event", timeout)),
            FakeAttempt::Stall => {
                tokio::time::sleep(timeout).await;
                Err(AppError::timeout("download event", timeout))
            }
            FakeAttempt::Closed => Err(AppError::SessionClosed),
        }
    }
}

struct FakeDownload {
    bytes: Vec<u8>,
    transfer: Duration,
}

#[async_trait]
impl Download for FakeDownload {
    fn suggested_filename(&self) -> Option<&str> {
        None
    }

    async fn save_as(&mut self, path: &Path) -> Result<()> {
        tokio::time::sleep(self.transfer).await;
        tokio::fs::write(path, &self.bytes).await?;
        Ok(())
    }
}

/// Hands out the same scripted page on every launch.
pub struct FakeLauncher {
    pub page: Arc<FakePage>,
    launches: Mutex<u32>,
}

impl FakeLauncher {
    pub fn new(page: FakePage) -> Self {
        Self {
            page: Arc::new(page),
            launches: Mutex::new(0),
        }
    }

    pub fn launches(&self) -> u32 {
        *self.launches.lock().unwrap()
    }
}

#[async_trait]
impl Launcher for FakeLauncher {
    async fn launch(&self, _download_dir: &Path) -> Result<Arc<dyn PortalPage>> {
        *self.launches.lock().unwrap() += 1;
        let page: Arc<dyn PortalPage> = self.page.clone();
        Ok(page)
    }
}
