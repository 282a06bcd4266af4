//! Error types for the trial runner
//!
//! Only configuration errors are meant to escape a trial. Everything that
//! goes wrong inside a cell is turned into a failed test result, so most
//! variants here end up as the message of a `TestResult`.

use std::time::Duration;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the trial runner
#[derive(Error, Debug)]
pub enum Error {
    // === Configuration Errors ===
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration file: {0}")]
    ConfigParse(String),

    #[error("Unrecognized platform '{0}'. Supported platforms: local, sauce, bstack, travis")]
    UnknownPlatform(String),

    #[error("Invalid test '{name}': {reason}")]
    InvalidTest { name: String, reason: String },

    // === Session Errors ===
    #[error("Failed to acquire session: {0}")]
    SessionAcquisition(String),

    #[error("No credentials configured for provider '{0}'")]
    MissingCredentials(String),

    #[error("WebDriver command '{command}' failed: {message}")]
    WebDriver { command: String, message: String },

    // === Execution Errors ===
    #[error("Timed out after {} seconds waiting for {condition}", .timeout.as_secs())]
    WaitTimeout { condition: String, timeout: Duration },

    #[error("Test assertion failed: {0}")]
    TestAssertion(String),

    /// Free-form failure raised by a test body; displays the message as-is
    #[error("{0}")]
    Execution(String),

    #[error("{0}.run() is not implemented")]
    NotImplemented(String),

    // === Reporting Errors ===
    #[error("Failed to push job status: {0}")]
    StatusPush(String),

    // === IO Errors ===
    #[error("Failed to read file '{path}': {error}")]
    FileRead { path: String, error: String },

    // === Serialization Errors ===
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // === HTTP Errors ===
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl Error {
    /// Create an invalid test error
    pub fn invalid_test(name: &str, reason: &str) -> Self {
        Self::InvalidTest {
            name: name.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Create a WebDriver command failure
    pub fn webdriver(command: &str, message: impl Into<String>) -> Self {
        Self::WebDriver {
            command: command.to_string(),
            message: message.into(),
        }
    }

    /// Create a failure with a plain message, for use inside test bodies
    pub fn execution(message: impl Into<String>) -> Self {
        Self::Execution(message.into())
    }

    /// Whether this error belongs to the setup phase and may abort a trial
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Error::Config(_)
                | Error::ConfigParse(_)
                | Error::UnknownPlatform(_)
                | Error::InvalidTest { .. }
                | Error::FileRead { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_execution_message_is_verbatim() {
        let err = Error::execution("timeout waiting for element");
        assert_eq!(err.to_string(), "timeout waiting for element");
    }

    #[test]
    fn test_configuration_classification() {
        assert!(Error::UnknownPlatform("nope".into()).is_configuration());
        assert!(Error::invalid_test("Foo", "missing suite key").is_configuration());
        assert!(!Error::SessionAcquisition("down".into()).is_configuration());
        assert!(!Error::StatusPush("503".into()).is_configuration());
    }

    #[test]
    fn test_wait_timeout_message() {
        let err = Error::WaitTimeout {
            condition: "title containing 'Texts'".into(),
            timeout: Duration::from_secs(10),
        };
        assert_eq!(
            err.to_string(),
            "Timed out after 10 seconds waiting for title containing 'Texts'"
        );
    }
}
