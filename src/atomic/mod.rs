//! Atomic tests
//!
//! An atomic test is a self-contained end-to-end check that can run in any
//! order relative to its peers. Every attempt gets a fresh session wrapped
//! in a [`Browser`], so a test must never rely on state left behind by
//! another one.

pub mod registry;

use std::time::Duration;

use async_trait::async_trait;

use crate::backend::{self, Condition, Session};
use crate::capability::PanelMode;
use crate::common::{Error, Result};

pub use registry::{TestRef, TestRegistry};

/// Class-level metadata of an atomic test
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TestInfo {
    /// Unique name, used as the report row label
    pub name: &'static str,
    /// Grouping tag used to select subsets of tests
    pub suite_key: &'static str,
    /// May run in desktop-like layouts
    pub multi_panel: bool,
    /// May run in mobile-like layouts
    pub single_panel: bool,
    /// Part of the reduced set run on every CI build
    pub every_build: bool,
    /// Name of the test this one is a variant of
    pub extends: Option<&'static str>,
}

impl TestInfo {
    /// Metadata for a test that runs in both panel modes
    pub const fn new(name: &'static str, suite_key: &'static str) -> Self {
        Self {
            name,
            suite_key,
            multi_panel: true,
            single_panel: true,
            every_build: false,
            extends: None,
        }
    }

    pub const fn desktop_only(mut self) -> Self {
        self.multi_panel = true;
        self.single_panel = false;
        self
    }

    pub const fn mobile_only(mut self) -> Self {
        self.multi_panel = false;
        self.single_panel = true;
        self
    }

    pub const fn every_build(mut self) -> Self {
        self.every_build = true;
        self
    }

    pub const fn extends(mut self, parent: &'static str) -> Self {
        self.extends = Some(parent);
        self
    }

    /// Check the class invariants
    pub fn validate(&self) -> Result<()> {
        if self.suite_key.trim().is_empty() {
            return Err(Error::invalid_test(self.name, "missing required suite key"));
        }
        if !self.multi_panel && !self.single_panel {
            return Err(Error::invalid_test(
                self.name,
                "must run on at least one of multi-panel or single-panel",
            ));
        }
        Ok(())
    }

    /// Whether the test may run in the given mode
    ///
    /// `Unknown` is never supported.
    pub fn supports(&self, mode: PanelMode) -> bool {
        match mode {
            PanelMode::MultiPanel => self.multi_panel,
            PanelMode::SinglePanel => self.single_panel,
            PanelMode::Unknown => false,
        }
    }
}

/// A composable end-to-end test
#[async_trait]
pub trait AtomicTest: Send + Sync {
    /// Get test metadata
    fn info(&self) -> &TestInfo;

    /// Run the test against a fresh session
    ///
    /// Every concrete test must override this.
    async fn run(&self, _browser: &mut Browser<'_>) -> Result<()> {
        Err(Error::NotImplemented(self.info().name.to_string()))
    }
}

/// Per-attempt view of a session, bound to the site's base URL
pub struct Browser<'a> {
    base_url: &'a str,
    session: &'a mut dyn Session,
    wait_timeout: Duration,
    poll_interval: Duration,
}

impl<'a> Browser<'a> {
    pub fn new(
        base_url: &'a str,
        session: &'a mut dyn Session,
        wait_timeout: Duration,
        poll_interval: Duration,
    ) -> Self {
        Self {
            base_url,
            session,
            wait_timeout,
            poll_interval,
        }
    }

    pub fn base_url(&self) -> &str {
        self.base_url
    }

    /// Absolute URL for a path on the site under test
    pub fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    pub fn session_id(&self) -> &str {
        self.session.id()
    }

    /// Direct access to the underlying session
    pub fn session(&mut self) -> &mut dyn Session {
        &mut *self.session
    }

    /// Navigate to a path on the site under test
    pub async fn open(&mut self, path: &str) -> Result<()> {
        let url = self.url(path);
        self.session.navigate(&url).await
    }

    /// Navigate to an absolute URL
    pub async fn navigate(&mut self, url: &str) -> Result<()> {
        self.session.navigate(url).await
    }

    pub async fn title(&mut self) -> Result<String> {
        self.session.title().await
    }

    /// Fail immediately unless the current title contains `text`
    pub async fn assert_title_contains(&mut self, text: &str) -> Result<()> {
        let title = self.session.title().await?;
        if title.contains(text) {
            Ok(())
        } else {
            Err(Error::TestAssertion(format!(
                "expected title containing '{}', got '{}'",
                text, title
            )))
        }
    }

    /// Wait for a condition, bounded by the configured wait timeout
    pub async fn wait_until(&mut self, condition: Condition) -> Result<()> {
        backend::wait_until(
            &mut *self.session,
            &condition,
            self.wait_timeout,
            self.poll_interval,
        )
        .await
    }

    pub async fn wait_for_title(&mut self, text: &str) -> Result<()> {
        self.wait_until(Condition::TitleContains(text.to_string()))
            .await
    }

    pub async fn wait_for_element(&mut self, css: &str) -> Result<()> {
        self.wait_until(Condition::ElementPresent(css.to_string()))
            .await
    }

    /// Open a path and wait until the title contains `text`
    pub async fn load(&mut self, path: &str, text: &str) -> Result<()> {
        self.open(path).await?;
        self.wait_for_title(text).await
    }
}

/// One execution attempt of a test: the test bound to a base URL and session
pub struct Attempt<'a> {
    test: &'a dyn AtomicTest,
    browser: Browser<'a>,
}

impl<'a> Attempt<'a> {
    /// Bind a test to a session, checking the test's invariants first
    pub fn new(test: &'a dyn AtomicTest, browser: Browser<'a>) -> Result<Self> {
        test.info().validate()?;
        Ok(Self { test, browser })
    }

    pub async fn run(mut self) -> Result<()> {
        self.test.run(&mut self.browser).await
    }
}


#[cfg(test)]
mod tests {
    use super::testing::{FakeSession, SessionLog};
    use super::*;
    use std::sync::Arc;

    struct LoadTexts;

    static LOAD_TEXTS: TestInfo = TestInfo::new("LoadTexts", "toc");

    #[async_trait]
    impl AtomicTest for LoadTexts {
        fn info(&self) -> &TestInfo {
            &LOAD_TEXTS
        }

        async fn run(&self, browser: &mut Browser<'_>) -> Result<()> {
            browser.load("/texts", "texts").await
        }
    }

    struct Unfinished;

    static UNFINISHED: TestInfo = TestInfo::new("Unfinished", "toc");

    #[async_trait]
    impl AtomicTest for Unfinished {
        fn info(&self) -> &TestInfo {
            &UNFINISHED
        }
    }

    struct Headless;

    static HEADLESS: TestInfo = TestInfo {
        multi_panel: false,
        single_panel: false,
        ..TestInfo::new("Headless", "toc")
    };

    #[async_trait]
    impl AtomicTest for Headless {
        fn info(&self) -> &TestInfo {
            &HEADLESS
        }

        async fn run(&self, _browser: &mut Browser<'_>) -> Result<()> {
            Ok(())
        }
    }

    fn session() -> FakeSession {
        FakeSession::new("s", Arc::new(SessionLog::default()))
    }

    fn browser<'a>(session: &'a mut FakeSession) -> Browser<'a> {
        Browser::new(
            "http://localhost:8000/",
            session,
            Duration::from_millis(50),
            Duration::from_millis(5),
        )
    }

    #[test]
    fn test_validate_rejects_missing_suite_key() {
        let info = TestInfo::new("NoSuite", "");
        assert!(matches!(info.validate(), Err(Error::InvalidTest { .. })));
    }

    #[test]
    fn test_validate_rejects_no_panel_mode() {
        let err = HEADLESS.validate().unwrap_err();
        assert!(err.is_configuration());
        assert!(err.to_string().contains("Headless"));
    }

    #[test]
    fn test_supports_modes() {
        let mobile = TestInfo::new("M", "s").mobile_only();
        assert!(mobile.supports(PanelMode::SinglePanel));
        assert!(!mobile.supports(PanelMode::MultiPanel));
        assert!(!mobile.supports(PanelMode::Unknown));

        let desktop = TestInfo::new("D", "s").desktop_only().every_build();
        assert!(desktop.supports(PanelMode::MultiPanel));
        assert!(desktop.every_build);
    }

    #[test]
    fn test_browser_url_joins_paths() {
        let mut s = session();
        let b = browser(&mut s);
        assert_eq!(b.url("/texts"), "http://localhost:8000/texts");
        assert_eq!(b.url("sheets"), "http://localhost:8000/sheets");
    }

    #[tokio::test]
    async fn test_attempt_runs_test() {
        let mut s = session();
        let attempt = Attempt::new(&LoadTexts, browser(&mut s)).unwrap();
        attempt.run().await.unwrap();
        assert_eq!(s.current, "http://localhost:8000/texts");
    }

    #[tokio::test]
    async fn test_default_run_is_not_implemented() {
        let mut s = session();
        let err = Attempt::new(&Unfinished, browser(&mut s))
            .unwrap()
            .run()
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Unfinished.run() is not implemented");
    }

    #[tokio::test]
    async fn test_attempt_rejects_invalid_test() {
        let mut s = session();
        assert!(Attempt::new(&Headless, browser(&mut s)).is_err());
    }

    #[tokio::test]
    async fn test_assert_title_contains() {
        let mut s = session();
        let mut b = browser(&mut s);
        b.open("/texts").await.unwrap();
        b.assert_title_contains("texts").await.unwrap();

        let err = b.assert_title_contains("sheets").await.unwrap_err();
        assert!(matches!(err, Error::TestAssertion(_)));
        assert_eq!(
            err.to_string(),
            "Test assertion failed: expected title containing 'sheets', got 'http://localhost:8000/texts'"
        );
    }

    #[tokio::test]
    async fn test_wait_for_element_times_out() {
        let mut s = session();
        let mut b = browser(&mut s);
        let err = b.wait_for_element(".never").await.unwrap_err();
        assert!(matches!(err, Error::WaitTimeout { .. }));
    }
}
