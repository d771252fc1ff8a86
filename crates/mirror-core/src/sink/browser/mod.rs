//! Upload through a web form driven by a headless browser.
//!
//! The browser performs the transfer, so there is nothing to measure: progress
//! is synthesized from elapsed time and an assumed throughput, flagged as
//! `estimated`, and held below 100% until the download link shows up.

mod webdriver;

pub use webdriver::WebDriverClient;

use std::sync::Arc;
use std::time::{Duration, Instant};

use super::{expect_local, Link, Links, Sink};
use crate::config::BrowserConfig;
use crate::control::CancelToken;
use crate::error::MirrorError;
use crate::progress::{Progress, ProgressReporter};
use crate::source::Artifact;

/// Opaque element reference within a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementId(pub String);

/// Starts browser sessions.
pub trait BrowserDriver: Send + Sync {
    fn open_session(&self) -> Result<Box<dyn BrowserSession>, MirrorError>;
}

/// One live browser session. `close` must be idempotent.
pub trait BrowserSession {
    fn navigate(&mut self, url: &str) -> Result<(), MirrorError>;
    /// First element matching the CSS selector, `None` when nothing matches.
    fn find(&mut self, selector: &str) -> Result<Option<ElementId>, MirrorError>;
    fn send_keys(&mut self, element: &ElementId, text: &str) -> Result<(), MirrorError>;
    fn click(&mut self, element: &ElementId) -> Result<(), MirrorError>;
    fn attribute(&mut self, element: &ElementId, name: &str) -> Result<Option<String>, MirrorError>;
    fn text(&mut self, element: &ElementId) -> Result<String, MirrorError>;
    fn close(&mut self) -> Result<(), MirrorError>;
}

/// Closes the session on every exit path.
struct SessionGuard(Box<dyn BrowserSession>);

impl Drop for SessionGuard {
    fn drop(&mut self) {
        if let Err(e) = self.0.close() {
            tracing::warn!("close browser session: {}", e);
        }
    }
}

/// Page, selectors and pacing of a browser upload.
#[derive(Debug, Clone)]
pub struct UploadPage {
    pub page_url: String,
    pub file_input_selector: String,
    pub submit_selector: Option<String>,
    pub link_selector: String,
    pub poll: Duration,
    pub timeout: Duration,
    pub assumed_rate_bytes_per_sec: u64,
}

impl UploadPage {
    pub fn from_config(cfg: &BrowserConfig) -> Self {
        Self {
            page_url: cfg.page_url.clone(),
            file_input_selector: cfg.file_input_selector.clone(),
            submit_selector: cfg.submit_selector.clone(),
            link_selector: cfg.link_selector.clone(),
            poll: Duration::from_millis(cfg.poll_ms),
            timeout: Duration::from_secs(cfg.timeout_secs),
            assumed_rate_bytes_per_sec: cfg.assumed_rate_bytes_per_sec,
        }
    }
}

/// Synthesized upload progress: `rate * elapsed`, capped at 99% of `size`.
pub fn estimate(size: u64, elapsed: Duration, rate: u64) -> Progress {
    let cap = size.saturating_sub((size / 100).max(1));
    let done = ((rate as f64 * elapsed.as_secs_f64()) as u64).min(cap);
    Progress::with_rate(done, Some(size), rate as f64).estimated()
}

pub struct BrowserUploadSink {
    driver: Arc<dyn BrowserDriver>,
    page: UploadPage,
}

impl BrowserUploadSink {
    pub fn new(driver: Arc<dyn BrowserDriver>, page: UploadPage) -> Self {
        Self { driver, page }
    }

    pub fn from_config(cfg: &BrowserConfig) -> Self {
        Self::new(Arc::new(WebDriverClient::from_config(cfg)), UploadPage::from_config(cfg))
    }

    fn find_required(&self, session: &mut dyn BrowserSession, selector: &str) -> Result<ElementId, MirrorError> {
        session
            .find(selector)?
            .ok_or_else(|| MirrorError::remote(format!("no element matches {} on {}", selector, self.page.page_url)))
    }

    /// Link target of the result element, when it has one yet.
    fn link_target(session: &mut dyn BrowserSession, element: &ElementId) -> Result<Option<String>, MirrorError> {
        let href = session.attribute(element, "href")?.filter(|h| !h.trim().is_empty());
        if href.is_some() {
            return Ok(href.map(|h| h.trim().to_string()));
        }
        let text = session.text(element)?;
        let text = text.trim();
        Ok((text.starts_with("http://") || text.starts_with("https://")).then(|| text.to_string()))
    }
}

impl Sink for BrowserUploadSink {
    fn name(&self) -> &'static str {
        "browser_upload"
    }

    fn publish(
        &self,
        artifact: &Artifact,
        reporter: &ProgressReporter,
        cancel: &CancelToken,
    ) -> Result<Links, MirrorError> {
        let local = expect_local(self.name(), artifact)?;
        if local.is_dir() {
            return Err(MirrorError::UnsupportedArtifact(format!(
                "browser upload takes a single file, {} is a directory",
                local.path.display()
            )));
        }
        let file = std::fs::canonicalize(&local.path)
            .map_err(|e| MirrorError::UnsupportedArtifact(format!("{}: {}", local.path.display(), e)))?;
        cancel.check()?;

        let mut guard = SessionGuard(self.driver.open_session()?);
        let session = guard.0.as_mut();
        tracing::info!(job_id = reporter.job_id(), page = %self.page.page_url, "browser upload starting");
        session.navigate(&self.page.page_url)?;
        let input = self.find_required(session, &self.page.file_input_selector)?;
        session.send_keys(&input, &file.to_string_lossy())?;
        if let Some(submit) = &self.page.submit_selector {
            let button = self.find_required(session, submit)?;
            session.click(&button)?;
        }

        let started = Instant::now();
        loop {
            cancel.check()?;
            if let Some(element) = session.find(&self.page.link_selector)? {
                if let Some(url) = Self::link_target(session, &element)? {
                    reporter.report(
                        Progress::with_rate(local.size_bytes, Some(local.size_bytes), 0.0).estimated(),
                    );
                    tracing::info!(job_id = reporter.job_id(), url = %url, "browser upload complete");
                    return Ok(vec![Link {
                        display_name: local.name.clone(),
                        url,
                        size_bytes: Some(local.size_bytes),
                    }]);
                }
            }
            let elapsed = started.elapsed();
            if elapsed >= self.page.timeout {
                tracing::warn!(job_id = reporter.job_id(), "no download link after {:?}", self.page.timeout);
                return Err(MirrorError::UploadTimeout);
            }
            reporter.report(estimate(local.size_bytes, elapsed, self.page.assumed_rate_bytes_per_sec));
            cancel.sleep(self.page.poll)?;
        }
    }
}
