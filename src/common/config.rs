//! Configuration file handling
//!
//! Everything a trial needs from its surroundings (base URLs, provider
//! endpoints, credentials, default capability sets, concurrency limits) is
//! collected here once and then passed around as an immutable value.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::time::Duration;

use super::paths::config_path;
use super::Result;
use crate::capability::Capability;

/// Main configuration structure
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Base URLs of the site under test
    #[serde(default)]
    pub urls: Urls,

    /// Timeout settings
    #[serde(default)]
    pub timeouts: Timeouts,

    /// Local driver settings
    #[serde(default)]
    pub local: LocalConfig,

    /// Remote grid providers
    #[serde(default)]
    pub providers: Providers,

    /// CI environment lookups
    #[serde(default)]
    pub ci: CiConfig,

    /// Capability attribute that declares the panel mode of a remote cell
    #[serde(default = "default_mode_attribute")]
    pub mode_attribute: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            urls: Urls::default(),
            timeouts: Timeouts::default(),
            local: LocalConfig::default(),
            providers: Providers::default(),
            ci: CiConfig::default(),
            mode_attribute: default_mode_attribute(),
        }
    }
}

fn default_mode_attribute() -> String {
    "panel_mode".to_string()
}

/// Base URLs of the site under test
#[derive(Debug, Deserialize, Clone)]
pub struct Urls {
    /// Used by the local platform and by CI runs tunnelled to a local server
    #[serde(default = "default_local_url")]
    pub local: String,

    /// Used by remote grid platforms
    #[serde(default = "default_remote_url")]
    pub remote: String,
}

impl Default for Urls {
    fn default() -> Self {
        Self {
            local: default_local_url(),
            remote: default_remote_url(),
        }
    }
}

fn default_local_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_remote_url() -> String {
    "http://localhost:8000".to_string()
}

/// Timeout settings
#[derive(Debug, Deserialize, Clone)]
pub struct Timeouts {
    /// Upper bound for a single wait inside a test
    #[serde(default = "default_wait")]
    pub wait_secs: u64,

    /// Delay between two checks of a wait condition
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// Timeout for a single HTTP request to a driver or provider
    #[serde(default = "default_request")]
    pub request_secs: u64,
}

impl Timeouts {
    pub fn wait(&self) -> Duration {
        Duration::from_secs(self.wait_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn request(&self) -> Duration {
        Duration::from_secs(self.request_secs)
    }
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            wait_secs: default_wait(),
            poll_interval_ms: default_poll_interval(),
            request_secs: default_request(),
        }
    }
}

fn default_wait() -> u64 {
    10
}
fn default_poll_interval() -> u64 {
    250
}
fn default_request() -> u64 {
    60
}

/// Local driver settings
#[derive(Debug, Deserialize, Clone)]
pub struct LocalConfig {
    /// Browser driven by the local driver server
    #[serde(default = "default_driver")]
    pub driver: String,

    /// Address of the locally running driver server (chromedriver, geckodriver, ...)
    #[serde(default = "default_webdriver_url")]
    pub webdriver_url: String,

    /// Maximum number of concurrent local sessions in parallel mode
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self {
            driver: default_driver(),
            webdriver_url: default_webdriver_url(),
            max_concurrency: default_max_concurrency(),
        }
    }
}

fn default_driver() -> String {
    "chrome".to_string()
}

fn default_webdriver_url() -> String {
    "http://localhost:9515".to_string()
}

/// Remote grid providers
#[derive(Debug, Deserialize, Clone)]
pub struct Providers {
    #[serde(default = "default_sauce")]
    pub sauce: ProviderConfig,

    #[serde(default = "default_bstack")]
    pub bstack: ProviderConfig,
}

impl Default for Providers {
    fn default() -> Self {
        Self {
            sauce: default_sauce(),
            bstack: default_bstack(),
        }
    }
}

/// Configuration for one remote grid provider
#[derive(Debug, Deserialize, Clone)]
pub struct ProviderConfig {
    /// WebDriver hub endpoint
    pub hub_url: String,

    /// Job status endpoint; `{user}` and `{job}` are substituted
    #[serde(default)]
    pub status_url: Option<String>,

    /// Inline username (takes precedence over `username_env`)
    #[serde(default)]
    pub username: Option<String>,

    /// Inline access key (takes precedence over `access_key_env`)
    #[serde(default)]
    pub access_key: Option<String>,

    /// Environment variable holding the username
    #[serde(default)]
    pub username_env: Option<String>,

    /// Environment variable holding the access key
    #[serde(default)]
    pub access_key_env: Option<String>,

    /// Maximum number of concurrent sessions
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Default capability set
    #[serde(default)]
    pub capabilities: Vec<CapabilityConfig>,
}

fn default_max_concurrency() -> usize {
    2
}

impl ProviderConfig {
    /// Resolve the provider credentials
    ///
    /// Inline values win over environment variables. Returns `None` unless
    /// both halves are present.
    pub fn credentials(&self) -> Option<Credentials> {
        let username = self
            .username
            .clone()
            .or_else(|| self.username_env.as_deref().and_then(env_value))?;
        let access_key = self
            .access_key
            .clone()
            .or_else(|| self.access_key_env.as_deref().and_then(env_value))?;
        Some(Credentials {
            username,
            access_key,
        })
    }

    /// Default capabilities of this provider
    pub fn default_capabilities(&self) -> Vec<Capability> {
        self.capabilities.iter().map(CapabilityConfig::to_capability).collect()
    }

    /// The subset of default capabilities flagged as core, used by CI runs
    pub fn core_capabilities(&self) -> Vec<Capability> {
        self.capabilities
            .iter()
            .filter(|c| c.core)
            .map(CapabilityConfig::to_capability)
            .collect()
    }
}

fn env_value(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

/// Username / access key pair for a remote provider
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub access_key: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("access_key", &"<redacted>")
            .finish()
    }
}

/// One remote capability as written in the config file
#[derive(Debug, Deserialize, Clone)]
pub struct CapabilityConfig {
    /// Column label in reports
    pub short_label: String,

    /// Part of the reduced set used by CI runs
    #[serde(default)]
    pub core: bool,

    /// Desired capabilities sent to the hub
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

impl CapabilityConfig {
    pub fn to_capability(&self) -> Capability {
        Capability::remote(self.attributes.clone(), &self.short_label)
    }
}

/// CI environment lookups
#[derive(Debug, Deserialize, Clone)]
pub struct CiConfig {
    /// Environment variable carrying the CI build identifier
    #[serde(default = "default_build_env")]
    pub build_env: String,

    /// Environment variable carrying the tunnel identifier for remote sessions
    #[serde(default = "default_tunnel_env")]
    pub tunnel_env: String,
}

impl CiConfig {
    pub fn build_id(&self) -> Option<String> {
        env_value(&self.build_env)
    }

    pub fn tunnel_id(&self) -> Option<String> {
        env_value(&self.tunnel_env)
    }
}

impl Default for CiConfig {
    fn default() -> Self {
        Self {
            build_env: default_build_env(),
            tunnel_env: default_tunnel_env(),
        }
    }
}

fn default_build_env() -> String {
    "TRAVIS_BUILD_NUMBER".to_string()
}

fn default_tunnel_env() -> String {
    "TRAVIS_JOB_NUMBER".to_string()
}

fn cap(short_label: &str, core: bool, attributes: &[(&str, &str)]) -> CapabilityConfig {
    CapabilityConfig {
        short_label: short_label.to_string(),
        core,
        attributes: attributes
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
    }
}

fn default_sauce() -> ProviderConfig {
    ProviderConfig {
        hub_url: "https://ondemand.saucelabs.com/wd/hub".to_string(),
        status_url: Some("https://saucelabs.com/rest/v1/{user}/jobs/{job}".to_string()),
        username: None,
        access_key: None,
        username_env: Some("SAUCE_USERNAME".to_string()),
        access_key_env: Some("SAUCE_ACCESS_KEY".to_string()),
        max_concurrency: 4,
        capabilities: vec![
            cap(
                "chrome",
                true,
                &[
                    ("browserName", "chrome"),
                    ("platform", "Windows 10"),
                    ("version", "latest"),
                    ("panel_mode", "multi_panel"),
                ],
            ),
            cap(
                "ff",
                false,
                &[
                    ("browserName", "firefox"),
                    ("platform", "macOS 10.13"),
                    ("version", "latest"),
                    ("panel_mode", "multi_panel"),
                ],
            ),
            cap(
                "safari",
                false,
                &[
                    ("browserName", "safari"),
                    ("platform", "macOS 10.13"),
                    ("version", "11.1"),
                    ("panel_mode", "multi_panel"),
                ],
            ),
            cap(
                "iphone",
                true,
                &[
                    ("deviceName", "iPhone X Simulator"),
                    ("platformName", "iOS"),
                    ("platformVersion", "11.2"),
                    ("browserName", "Safari"),
                    ("panel_mode", "single_panel"),
                ],
            ),
        ],
    }
}

fn default_bstack() -> ProviderConfig {
    ProviderConfig {
        hub_url: "https://hub.browserstack.com/wd/hub".to_string(),
        status_url: None,
        username: None,
        access_key: None,
        username_env: Some("BROWSERSTACK_USERNAME".to_string()),
        access_key_env: Some("BROWSERSTACK_ACCESS_KEY".to_string()),
        max_concurrency: 2,
        capabilities: vec![
            cap(
                "chrome",
                true,
                &[
                    ("browser", "Chrome"),
                    ("browser_version", "62.0"),
                    ("os", "Windows"),
                    ("os_version", "10"),
                    ("panel_mode", "multi_panel"),
                ],
            ),
            cap(
                "iphone",
                true,
                &[
                    ("device", "iPhone 8"),
                    ("realMobile", "true"),
                    ("os_version", "11.0"),
                    ("panel_mode", "single_panel"),
                ],
            ),
            cap(
                "galaxy",
                false,
                &[
                    ("device", "Samsung Galaxy S8"),
                    ("realMobile", "true"),
                    ("os_version", "7.0"),
                    ("panel_mode", "single_panel"),
                ],
            ),
        ],
    }
}

impl Config {
    /// Load configuration from the default config file
    ///
    /// Returns default configuration if file doesn't exist
    pub fn load() -> Result<Self> {
        if let Some(path) = config_path() {
            if path.exists() {
                return Self::load_from(&path);
            }
        }
        Ok(Self::default())
    }

    /// Load configuration from an explicit file
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| super::Error::FileRead {
            path: path.display().to_string(),
            error: e.to_string(),
        })?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| super::Error::ConfigParse(e.to_string()))
    }
}
