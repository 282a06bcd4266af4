//! Trial orchestration
//!
//! A trial runs every resolved test against every resolved capability and
//! collects one result per executed cell. Tests are processed one at a time
//! in list order. In parallel mode the cells of a single test are spread
//! over a pool bounded by the platform's concurrency limit, and the whole
//! batch is merged before the next test starts.
//!
//! Failures inside a cell (session setup, test body, panics) become failed
//! results for that cell only. Only configuration problems detected while
//! building the trial are returned as errors.

use std::any::Any;
use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use futures_util::FutureExt;
use tokio::sync::Semaphore;
use tracing::Instrument;

use crate::atomic::registry::{self, every_build_tests, TestRef, TestRegistry};
use crate::atomic::{AtomicTest, Attempt, Browser};
use crate::backend::webdriver::http_client;
use crate::backend::{ExecutionBackend, GridBackend, JobLabel, Session, WebDriverFactory};
use crate::capability::{Capability, PanelMode};
use crate::common::config::Config;
use crate::common::{Error, Result};
use crate::platform::Platform;
use crate::result::{ResultSet, TestResult};

/// Caller-supplied trial settings; `None` fields fall back to defaults
#[derive(Default)]
pub struct TrialOptions {
    /// "local", "sauce", "bstack" or "travis"
    pub platform: String,
    /// Build identifier attached to remote jobs
    pub build: Option<String>,
    /// Tests to run; defaults to the registry's tests
    pub tests: Option<Vec<TestRef>>,
    /// Capabilities to run on; defaults to the platform's default set
    pub caps: Option<Vec<Capability>>,
    /// Run the capability cells of a test concurrently
    pub parallel: Option<bool>,
    /// Registry used for default test discovery; defaults to the global one
    pub registry: Option<TestRegistry>,
}

impl TrialOptions {
    pub fn new(platform: &str) -> Self {
        Self {
            platform: platform.to_string(),
            ..Self::default()
        }
    }

    pub fn build(mut self, build: &str) -> Self {
        self.build = Some(build.to_string());
        self
    }

    pub fn tests(mut self, tests: Vec<TestRef>) -> Self {
        self.tests = Some(tests);
        self
    }

    pub fn caps(mut self, caps: Vec<Capability>) -> Self {
        self.caps = Some(caps);
        self
    }

    pub fn parallel(mut self, parallel: bool) -> Self {
        self.parallel = Some(parallel);
        self
    }

    pub fn registry(mut self, registry: TestRegistry) -> Self {
        self.registry = Some(registry);
        self
    }
}

/// What happened to one (test, capability) cell
#[derive(Debug)]
pub enum CellOutcome {
    /// The test does not support the capability's panel mode
    Skipped(PanelMode),
    /// The cell ran (or failed to start) and produced a result
    Completed(TestResult),
}

/// One orchestration run over a fixed set of tests and capabilities
pub struct Trial {
    platform: Platform,
    build: Option<String>,
    base_url: String,
    tests: Vec<TestRef>,
    caps: Vec<Capability>,
    parallel: bool,
    max_concurrency: usize,
    mode_attribute: String,
    wait_timeout: Duration,
    poll_interval: Duration,
    backend: Arc<dyn ExecutionBackend>,
    results: ResultSet,
}

impl Trial {
    /// Resolve platform, tests and capabilities
    ///
    /// Fails with a configuration error for an unknown platform or an
    /// invalid test.
    pub fn new(config: &Config, options: TrialOptions) -> Result<Self> {
        let requested: Platform = options.platform.parse()?;
        let platform = requested.effective();

        let discovered = || match &options.registry {
            Some(registry) => registry.all_tests(),
            None => registry::all_tests(),
        };

        let (base_url, tests, caps, build) = match requested {
            Platform::Local => {
                let caps = match options.caps {
                    Some(caps) => caps,
                    None => vec![default_local_capability(config)?],
                };
                let tests = options.tests.unwrap_or_else(discovered);
                (config.urls.local.clone(), tests, caps, options.build.clone())
            }
            Platform::Travis => {
                let provider = &config.providers.sauce;
                let caps = options.caps.unwrap_or_else(|| provider.core_capabilities());
                let caps = match config.ci.tunnel_id() {
                    Some(tunnel) => caps
                        .iter()
                        .map(|c| c.with_attribute("tunnelIdentifier", &tunnel))
                        .collect(),
                    None => caps,
                };
                let tests = options
                    .tests
                    .unwrap_or_else(|| every_build_tests(&discovered()));
                let build = options.build.clone().or_else(|| config.ci.build_id());
                (config.urls.local.clone(), tests, caps, build)
            }
            Platform::Sauce | Platform::BrowserStack => {
                let provider = requested.provider(config).ok_or_else(|| {
                    Error::Config(format!("No provider configured for {}", requested))
                })?;
                let caps = options
                    .caps
                    .unwrap_or_else(|| provider.default_capabilities());
                let tests = options.tests.unwrap_or_else(discovered);
                (config.urls.remote.clone(), tests, caps, options.build.clone())
            }
        };

        let mut selected = HashSet::new();
        for test in &tests {
            let info = test.info();
            info.validate()?;
            if !selected.insert(info.name) {
                return Err(Error::invalid_test(info.name, "already selected"));
            }
        }

        let parallel = options.parallel.unwrap_or(platform.is_remote());
        let max_concurrency = match platform.provider(config) {
            Some(provider) => provider.max_concurrency,
            None => config.local.max_concurrency,
        }
        .max(1);

        let backend: Arc<dyn ExecutionBackend> = Arc::new(GridBackend::new(platform, config)?);

        tracing::debug!(
            platform = %platform,
            tests = tests.len(),
            caps = caps.len(),
            parallel,
            max_concurrency,
            "Trial configured"
        );

        Ok(Self {
            platform,
            build,
            base_url,
            tests,
            caps,
            parallel,
            max_concurrency,
            mode_attribute: config.mode_attribute.clone(),
            wait_timeout: config.timeouts.wait(),
            poll_interval: config.timeouts.poll_interval(),
            backend,
            results: ResultSet::new(),
        })
    }

    /// Replace the execution backend
    pub fn with_backend(mut self, backend: Arc<dyn ExecutionBackend>) -> Self {
        self.backend = backend;
        self
    }

    /// Run every test on every capability
    pub async fn run(mut self) -> Self {
        let runner = Arc::new(CellRunner {
            backend: Arc::clone(&self.backend),
            remote: self.platform.is_remote(),
            base_url: self.base_url.clone(),
            build: self.build.clone(),
            mode_attribute: self.mode_attribute.clone(),
            wait_timeout: self.wait_timeout,
            poll_interval: self.poll_interval,
        });

        for test in &self.tests {
            let outcomes = if self.parallel {
                runner
                    .run_parallel(test, &self.caps, self.max_concurrency)
                    .await
            } else {
                runner.run_serial(test, &self.caps).await
            };

            for (cap, outcome) in self.caps.iter().zip(outcomes) {
                match outcome {
                    CellOutcome::Completed(result) => self.results.include(result),
                    CellOutcome::Skipped(_) => self
                        .results
                        .note_skipped(test.info().name, cap.short_label()),
                }
            }
        }

        tracing::info!(
            passed = self.results.number_passed(),
            failed = self.results.number_failed(),
            "Trial finished"
        );
        self
    }

    pub fn results(&self) -> &ResultSet {
        &self.results
    }

    pub fn into_results(self) -> ResultSet {
        self.results
    }

    /// Platform used for sessions (`travis` resolves to `sauce`)
    pub fn platform(&self) -> Platform {
        self.platform
    }

    pub fn build(&self) -> Option<&str> {
        self.build.as_deref()
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn tests(&self) -> &[TestRef] {
        &self.tests
    }

    pub fn capabilities(&self) -> &[Capability] {
        &self.caps
    }

    pub fn is_parallel(&self) -> bool {
        self.parallel
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }
}

fn default_local_capability(config: &Config) -> Result<Capability> {
    let http = http_client(config.timeouts.request())?;
    let factory = WebDriverFactory::new(&config.local.driver, &config.local.webdriver_url, http);
    Ok(Capability::local(Arc::new(factory)))
}

/// Everything a cell needs, shared by all workers of a trial
struct CellRunner {
    backend: Arc<dyn ExecutionBackend>,
    remote: bool,
    base_url: String,
    build: Option<String>,
    mode_attribute: String,
    wait_timeout: Duration,
    poll_interval: Duration,
}

impl CellRunner {
    /// Cells one after another, in capability order
    async fn run_serial(&self, test: &TestRef, caps: &[Capability]) -> Vec<CellOutcome> {
        let mut outcomes = Vec::with_capacity(caps.len());
        for cap in caps {
            outcomes.push(self.run_cell(test, cap).await);
        }
        outcomes
    }

    /// Cells on at most `limit` concurrent workers; outcomes in capability order
    async fn run_parallel(
        self: &Arc<Self>,
        test: &TestRef,
        caps: &[Capability],
        limit: usize,
    ) -> Vec<CellOutcome> {
        let semaphore = Arc::new(Semaphore::new(limit));

        let handles: Vec<_> = caps
            .iter()
            .map(|cap| {
                let runner = Arc::clone(self);
                let semaphore = Arc::clone(&semaphore);
                let test = Arc::clone(test);
                let cap = cap.clone();
                tokio::spawn(async move {
                    let _permit = semaphore.acquire_owned().await.ok();
                    runner.run_cell(&test, &cap).await
                })
            })
            .collect();

        join_all(handles)
            .await
            .into_iter()
            .zip(caps)
            .map(|(joined, cap)| match joined {
                Ok(outcome) => outcome,
                Err(e) => {
                    tracing::error!(
                        test = test.info().name,
                        capability = %cap.short_label(),
                        "Cell worker failed: {}",
                        e
                    );
                    CellOutcome::Completed(TestResult::failed(
                        test.info().name,
                        cap.clone(),
                        format!("cell aborted: {}", e),
                    ))
                }
            })
            .collect()
    }

    /// Mode check, then execution inside a fault boundary
    async fn run_cell(&self, test: &TestRef, cap: &Capability) -> CellOutcome {
        let info = test.info();
        let mode = if self.remote {
            cap.declared_mode(&self.mode_attribute)
        } else {
            PanelMode::MultiPanel
        };

        if !info.supports(mode) {
            tracing::debug!(test = info.name, capability = %cap.short_label(), %mode, "Skipped");
            return CellOutcome::Skipped(mode);
        }

        let span = tracing::info_span!("cell", test = info.name, capability = %cap.short_label());
        let outcome = AssertUnwindSafe(self.execute(test.as_ref(), cap))
            .catch_unwind()
            .instrument(span)
            .await;

        match outcome {
            Ok(result) => CellOutcome::Completed(result),
            Err(panic) => {
                let message = format!("aborted: {}", panic_message(panic.as_ref()));
                tracing::error!("{} / {} - {}", info.name, cap.description(), message);
                CellOutcome::Completed(TestResult::failed(info.name, cap.clone(), message))
            }
        }
    }

    /// Acquire, run, tear down, report
    async fn execute(&self, test: &dyn AtomicTest, cap: &Capability) -> TestResult {
        let name = test.info().name;
        let label = format!("{} / {}", name, cap.description());
        tracing::info!("{} - Starting", label);

        let job = JobLabel {
            name: format!("{} on {}", name, cap.description()),
            build: self.build.clone(),
        };

        let mut session = match self.backend.acquire(cap, &job).await {
            Ok(session) => session,
            Err(e) => {
                tracing::warn!("{} - Aborted: {}", label, e);
                return TestResult::failed(name, cap.clone(), e.to_string());
            }
        };

        let outcome = self.attempt(test, session.as_mut()).await;

        if let Err(e) = session.close().await {
            tracing::warn!(session = %session.id(), "Failed to close session: {}", e);
        }

        if self.remote && !cap.is_local() {
            if let Err(e) = self.backend.push_status(session.id(), outcome.is_ok()).await {
                tracing::warn!(session = %session.id(), "Status update ignored: {}", e);
            }
        }

        match outcome {
            Ok(()) => {
                tracing::info!("{} - Passed", label);
                TestResult::passed(name, cap.clone())
            }
            Err(e) => {
                tracing::warn!("{} - Failed: {}", label, e);
                TestResult::failed(name, cap.clone(), e.to_string())
            }
        }
    }

    /// Bind the test to the session and run it, containing panics
    async fn attempt(&self, test: &dyn AtomicTest, session: &mut dyn Session) -> Result<()> {
        let browser = Browser::new(
            &self.base_url,
            session,
            self.wait_timeout,
            self.poll_interval,
        );
        let attempt = Attempt::new(test, browser)?;

        match AssertUnwindSafe(attempt.run()).catch_unwind().await {
            Ok(result) => result,
            Err(panic) => Err(Error::execution(format!(
                "test panicked: {}",
                panic_message(panic.as_ref())
            ))),
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
