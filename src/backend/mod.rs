//! Execution backend
//!
//! A backend turns a capability into a live browser session. Tests only
//! ever see the `Session` trait; the WebDriver wire protocol lives in
//! `webdriver` and the platform dispatch in `grid`.

pub mod grid;
pub mod webdriver;

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;

use crate::capability::Capability;
use crate::common::{Error, Result};

pub use grid::GridBackend;
pub use webdriver::{WebDriverFactory, WebDriverSession};

/// A condition a session can be polled for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition {
    /// Page title contains the text
    TitleContains(String),
    /// Current URL contains the text
    UrlContains(String),
    /// An element matching the CSS selector is present
    ElementPresent(String),
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Condition::TitleContains(text) => write!(f, "title containing '{}'", text),
            Condition::UrlContains(text) => write!(f, "url containing '{}'", text),
            Condition::ElementPresent(css) => write!(f, "element matching '{}'", css),
        }
    }
}

/// A live browser session, exclusively owned by one cell
#[async_trait]
pub trait Session: Send {
    /// Job identifier assigned by the driver or grid
    fn id(&self) -> &str;

    /// Load a URL
    async fn navigate(&mut self, url: &str) -> Result<()>;

    /// Evaluate a condition once
    async fn check(&mut self, condition: &Condition) -> Result<bool>;

    /// Current page title
    async fn title(&mut self) -> Result<String>;

    /// End the session
    async fn close(&mut self) -> Result<()>;
}

/// Produces fresh sessions for a local driver
#[async_trait]
pub trait SessionFactory: Send + Sync {
    /// Driver name, used as the report column label
    fn name(&self) -> &str;

    /// Start a new session
    async fn create(&self) -> Result<Box<dyn Session>>;
}

/// Job metadata attached to a remote session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobLabel {
    /// e.g. "LoadHomePage on chrome latest on Windows 10"
    pub name: String,
    /// Build identifier used to group jobs on the grid
    pub build: Option<String>,
}

/// Source of sessions for a trial
#[async_trait]
pub trait ExecutionBackend: Send + Sync {
    /// Acquire a session for the capability
    ///
    /// Any failure is reported as `Error::SessionAcquisition` or
    /// `Error::MissingCredentials`.
    async fn acquire(&self, capability: &Capability, job: &JobLabel) -> Result<Box<dyn Session>>;

    /// Report the outcome of a job to the grid
    async fn push_status(&self, job_id: &str, passed: bool) -> Result<()>;
}

/// Poll `condition` until it holds or `timeout` elapses
pub async fn wait_until(
    session: &mut dyn Session,
    condition: &Condition,
    timeout: Duration,
    poll_interval: Duration,
) -> Result<()> {
    let deadline = tokio::time::Instant::now() + timeout;
    let timed_out = || Error::WaitTimeout {
        condition: condition.to_string(),
        timeout,
    };

    loop {
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        match tokio::time::timeout(remaining, session.check(condition)).await {
            Ok(Ok(true)) => return Ok(()),
            Ok(Ok(false)) => {}
            Ok(Err(e)) => return Err(e),
            Err(_) => return Err(timed_out()),
        }

        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        if remaining.is_zero() {
            return Err(timed_out());
        }
        tokio::time::sleep(poll_interval.min(remaining)).await;
    }
}
