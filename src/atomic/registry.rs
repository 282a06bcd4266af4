//! Test registry
//!
//! Test modules register their tests here when they are initialised, so
//! the set of runnable tests never depends on a hand-maintained list. A
//! process-wide registry backs the default test selection of a trial;
//! standalone registries can be built for explicit selections.

use std::collections::BTreeSet;
use std::sync::{Arc, OnceLock, RwLock};

use super::AtomicTest;
use crate::common::{Error, Result};

/// Shared handle to a registered test
pub type TestRef = Arc<dyn AtomicTest>;

/// A set of registered tests
#[derive(Default, Clone)]
pub struct TestRegistry {
    tests: Vec<TestRef>,
}

impl TestRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a test
    ///
    /// Fails if the test's metadata is invalid or its name is taken.
    pub fn register(&mut self, test: TestRef) -> Result<()> {
        let info = test.info();
        info.validate()?;
        if self.get(info.name).is_some() {
            return Err(Error::invalid_test(info.name, "already registered"));
        }
        tracing::trace!(test = info.name, suite = info.suite_key, "Registered test");
        self.tests.push(test);
        Ok(())
    }

    /// Every registered test, in registration order
    pub fn all_tests(&self) -> Vec<TestRef> {
        self.tests.clone()
    }

    /// Get a test by name
    pub fn get(&self, name: &str) -> Option<TestRef> {
        self.tests.iter().find(|t| t.info().name == name).cloned()
    }

    /// Tests whose suite key equals `key`
    pub fn tests_in_suite(&self, key: &str) -> Vec<TestRef> {
        self.tests
            .iter()
            .filter(|t| t.info().suite_key == key)
            .cloned()
            .collect()
    }

    /// Distinct suite keys, sorted
    pub fn suite_keys(&self) -> Vec<&'static str> {
        self.tests
            .iter()
            .map(|t| t.info().suite_key)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Tests that extend `name`, directly or through other variants
    pub fn variants_of(&self, name: &str) -> Vec<TestRef> {
        let mut found: Vec<TestRef> = Vec::new();
        let mut frontier = vec![name.to_string()];

        while let Some(parent) = frontier.pop() {
            for test in &self.tests {
                let info = test.info();
                if info.extends == Some(parent.as_str())
                    && !found.iter().any(|f| f.info().name == info.name)
                {
                    frontier.push(info.name.to_string());
                    found.push(Arc::clone(test));
                }
            }
        }
        found
    }

    pub fn len(&self) -> usize {
        self.tests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tests.is_empty()
    }
}

/// Tests flagged to run on every build
pub fn every_build_tests(tests: &[TestRef]) -> Vec<TestRef> {
    tests.iter().filter(|t| t.info().every_build).cloned().collect()
}

/// Tests that may run in multi-panel mode
pub fn multi_panel_tests(tests: &[TestRef]) -> Vec<TestRef> {
    tests.iter().filter(|t| t.info().multi_panel).cloned().collect()
}

/// Tests that may run in single-panel mode
pub fn single_panel_tests(tests: &[TestRef]) -> Vec<TestRef> {
    tests.iter().filter(|t| t.info().single_panel).cloned().collect()
}

/// Tests that may run in both modes
pub fn multiplatform_tests(tests: &[TestRef]) -> Vec<TestRef> {
    tests
        .iter()
        .filter(|t| t.info().multi_panel && t.info().single_panel)
        .cloned()
        .collect()
}

static GLOBAL: OnceLock<RwLock<TestRegistry>> = OnceLock::new();

/// The process-wide registry
pub fn global() -> &'static RwLock<TestRegistry> {
    GLOBAL.get_or_init(|| RwLock::new(TestRegistry::new()))
}

/// Register a test in the process-wide registry
pub fn register(test: TestRef) -> Result<()> {
    global()
        .write()
        .unwrap_or_else(|e| e.into_inner())
        .register(test)
}

/// Every test in the process-wide registry
pub fn all_tests() -> Vec<TestRef> {
    global().read().unwrap_or_else(|e| e.into_inner()).all_tests()
}

/// Tests of one suite in the process-wide registry
pub fn tests_in_suite(key: &str) -> Vec<TestRef> {
    global()
        .read()
        .unwrap_or_else(|e| e.into_inner())
        .tests_in_suite(key)
}
