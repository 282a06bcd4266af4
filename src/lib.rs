//! E2E Trial - an end-to-end test orchestrator
//!
//! Runs a matrix of atomic browser tests against a set of capabilities,
//! locally or on a remote grid, isolating every failure to its own cell and
//! summarising the outcome as a pass/fail matrix.

pub mod atomic;
pub mod backend;
pub mod capability;
pub mod common;
pub mod platform;
pub mod result;
pub mod trial;

pub use atomic::{AtomicTest, Browser, TestInfo, TestRef, TestRegistry};
pub use capability::{Capability, PanelMode};
pub use common::{Error, Result};
pub use platform::Platform;
pub use result::{ResultSet, TestResult};
pub use trial::{Trial, TrialOptions};
