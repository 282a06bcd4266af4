//! Capability descriptors
//!
//! A capability names one target execution environment: either a local
//! driver factory or a set of desired capabilities for a remote grid.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::backend::SessionFactory;

/// Execution context category a cell runs in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PanelMode {
    /// Desktop-like layout
    MultiPanel,
    /// Mobile-like layout
    SinglePanel,
    /// Missing or unrecognized mode metadata; such cells are skipped
    Unknown,
}

impl PanelMode {
    /// Parse a declared mode value
    pub fn parse(value: &str) -> Self {
        match value.trim() {
            "multi_panel" | "multi-panel" | "desktop" => PanelMode::MultiPanel,
            "single_panel" | "single-panel" | "mobile" => PanelMode::SinglePanel,
            _ => PanelMode::Unknown,
        }
    }
}

impl fmt::Display for PanelMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PanelMode::MultiPanel => write!(f, "multi_panel"),
            PanelMode::SinglePanel => write!(f, "single_panel"),
            PanelMode::Unknown => write!(f, "unknown"),
        }
    }
}

/// A local driver: a named factory producing fresh sessions
#[derive(Clone)]
pub struct LocalDriver {
    factory: Arc<dyn SessionFactory>,
}

impl LocalDriver {
    pub fn new(factory: Arc<dyn SessionFactory>) -> Self {
        Self { factory }
    }

    pub fn name(&self) -> &str {
        self.factory.name()
    }

    pub fn factory(&self) -> &Arc<dyn SessionFactory> {
        &self.factory
    }
}

impl fmt::Debug for LocalDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalDriver").field("name", &self.name()).finish()
    }
}

/// Desired capabilities for a remote grid session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteCapability {
    pub attributes: BTreeMap<String, String>,
    pub short_label: String,
}

/// Target execution environment for one column of the result matrix
#[derive(Debug, Clone)]
pub enum Capability {
    Local(LocalDriver),
    Remote(RemoteCapability),
}

impl Capability {
    /// Create a local capability from a session factory
    pub fn local(factory: Arc<dyn SessionFactory>) -> Self {
        Capability::Local(LocalDriver::new(factory))
    }

    /// Create a remote capability
    pub fn remote(attributes: BTreeMap<String, String>, short_label: &str) -> Self {
        Capability::Remote(RemoteCapability {
            attributes,
            short_label: short_label.to_string(),
        })
    }

    /// Label used as a report column header
    pub fn short_label(&self) -> &str {
        match self {
            Capability::Local(driver) => driver.name(),
            Capability::Remote(remote) => &remote.short_label,
        }
    }

    /// Human readable description, e.g. "chrome latest on Windows 10"
    pub fn description(&self) -> String {
        match self {
            Capability::Local(driver) => driver.name().to_string(),
            Capability::Remote(remote) => {
                let get = |key: &str| remote.attributes.get(key).map(String::as_str);
                let or_none = |key: &str| get(key).unwrap_or("None");

                if let Some(device) = get("deviceName").or_else(|| get("device")) {
                    device.to_string()
                } else if let Some(browser) = get("browser") {
                    format!(
                        "{} {} on {} {}",
                        browser,
                        or_none("browser_version"),
                        or_none("os"),
                        or_none("os_version")
                    )
                } else {
                    format!(
                        "{} {} on {}",
                        or_none("browserName"),
                        or_none("version"),
                        or_none("platform")
                    )
                }
            }
        }
    }

    /// Look up a remote attribute
    pub fn attribute(&self, key: &str) -> Option<&str> {
        match self {
            Capability::Local(_) => None,
            Capability::Remote(remote) => remote.attributes.get(key).map(String::as_str),
        }
    }

    /// Panel mode declared by this capability under `mode_attribute`
    ///
    /// Local drivers are always treated as multi-panel.
    pub fn declared_mode(&self, mode_attribute: &str) -> PanelMode {
        match self {
            Capability::Local(_) => PanelMode::MultiPanel,
            Capability::Remote(_) => self
                .attribute(mode_attribute)
                .map(PanelMode::parse)
                .unwrap_or(PanelMode::Unknown),
        }
    }

    /// Copy of this capability with one more remote attribute set
    ///
    /// Local capabilities are returned unchanged.
    pub fn with_attribute(&self, key: &str, value: &str) -> Self {
        match self {
            Capability::Local(_) => self.clone(),
            Capability::Remote(remote) => {
                let mut attributes = remote.attributes.clone();
                attributes.insert(key.to_string(), value.to_string());
                Capability::Remote(RemoteCapability {
                    attributes,
                    short_label: remote.short_label.clone(),
                })
            }
        }
    }

    pub fn is_local(&self) -> bool {
        matches!(self, Capability::Local(_))
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn remote(pairs: &[(&str, &str)], label: &str) -> Capability {
        Capability::remote(
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
            label,
        )
    }

    #[test]
    fn test_description_prefers_device_name() {
        let cap = remote(&[("deviceName", "iPhone X Simulator"), ("browserName", "Safari")], "iphone");
        assert_eq!(cap.description(), "iPhone X Simulator");

        let cap = remote(&[("device", "Samsung Galaxy S8")], "galaxy");
        assert_eq!(cap.description(), "Samsung Galaxy S8");
    }

    #[test]
    fn test_description_desktop_variants() {
        let cap = remote(
            &[("browser", "Chrome"), ("browser_version", "62.0"), ("os", "Windows"), ("os_version", "10")],
            "chrome",
        );
        assert_eq!(cap.description(), "Chrome 62.0 on Windows 10");

        let cap = remote(&[("browserName", "firefox"), ("version", "latest"), ("platform", "macOS 10.13")], "ff");
        assert_eq!(cap.description(), "firefox latest on macOS 10.13");
        assert_eq!(cap.short_label(), "ff");
    }

    #[test]
    fn test_declared_mode() {
        let cap = remote(&[("panel_mode", "single_panel")], "m");
        assert_eq!(cap.declared_mode("panel_mode"), PanelMode::SinglePanel);

        let cap = remote(&[("panel_mode", "multi_panel")], "d");
        assert_eq!(cap.declared_mode("panel_mode"), PanelMode::MultiPanel);

        let cap = remote(&[("browserName", "chrome")], "c");
        assert_eq!(cap.declared_mode("panel_mode"), PanelMode::Unknown);

        let cap = remote(&[("panel_mode", "tablet")], "t");
        assert_eq!(cap.declared_mode("panel_mode"), PanelMode::Unknown);
    }

    #[test]
    fn test_with_attribute_leaves_original_untouched() {
        let cap = remote(&[("browserName", "chrome")], "chrome");
        let tagged = cap.with_attribute("tunnelIdentifier", "42.1");
        assert_eq!(cap.attribute("tunnelIdentifier"), None);
        assert_eq!(tagged.attribute("tunnelIdentifier"), Some("42.1"));
        assert_eq!(tagged.short_label(), "chrome");
    }
}
