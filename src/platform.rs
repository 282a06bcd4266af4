//! Execution platforms

use std::fmt;
use std::str::FromStr;

use crate::common::config::{Config, ProviderConfig};
use crate::common::Error;

/// Where sessions are created
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    /// A driver server on this machine
    Local,
    /// Sauce Labs grid
    Sauce,
    /// BrowserStack grid
    BrowserStack,
    /// CI run: Sauce Labs grid tunnelled to a locally served site
    Travis,
}

impl Platform {
    pub fn is_remote(&self) -> bool {
        !matches!(self, Platform::Local)
    }

    /// Platform actually used for sessions once CI setup is done
    pub fn effective(&self) -> Platform {
        match self {
            Platform::Travis => Platform::Sauce,
            other => *other,
        }
    }

    /// Provider configuration backing this platform
    pub fn provider<'a>(&self, config: &'a Config) -> Option<&'a ProviderConfig> {
        match self.effective() {
            Platform::Local => None,
            Platform::BrowserStack => Some(&config.providers.bstack),
            _ => Some(&config.providers.sauce),
        }
    }
}

impl FromStr for Platform {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "local" => Ok(Platform::Local),
            "sauce" => Ok(Platform::Sauce),
            "bstack" => Ok(Platform::BrowserStack),
            "travis" => Ok(Platform::Travis),
            other => Err(Error::UnknownPlatform(other.to_string())),
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Platform::Local => write!(f, "local"),
            Platform::Sauce => write!(f, "sauce"),
            Platform::BrowserStack => write!(f, "bstack"),
            Platform::Travis => write!(f, "travis"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_platforms() {
        assert_eq!("local".parse::<Platform>().unwrap(), Platform::Local);
        assert_eq!("bstack".parse::<Platform>().unwrap(), Platform::BrowserStack);
        assert_eq!("travis".parse::<Platform>().unwrap().effective(), Platform::Sauce);

        let err = "grid".parse::<Platform>().unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_provider_lookup() {
        let config = Config::default();
        assert!(Platform::Local.provider(&config).is_none());
        assert_eq!(
            Platform::Travis.provider(&config).map(|p| p.hub_url.as_str()),
            Some(config.providers.sauce.hub_url.as_str())
        );
        assert_eq!(
            Platform::BrowserStack.provider(&config).map(|p| p.max_concurrency),
            Some(2)
        );
    }
}
