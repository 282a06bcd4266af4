//! Platform-aware backend
//!
//! Local capabilities go to their own driver factory. Remote capabilities
//! go to the hub of the provider behind the trial's platform, using
//! credentials that were resolved once when the backend was built.

use async_trait::async_trait;
use serde_json::{json, Value};

use super::webdriver::{http_client, WebDriverSession};
use super::{ExecutionBackend, JobLabel, Session};
use crate::capability::Capability;
use crate::common::config::{Config, Credentials};
use crate::common::{Error, Result};
use crate::platform::Platform;

/// Remote hub settings for one provider
#[derive(Debug, Clone)]
pub struct RemoteEndpoint {
    /// Provider name, for messages
    pub provider: String,
    pub hub_url: String,
    pub status_url: Option<String>,
    pub credentials: Option<Credentials>,
}

/// Backend used by trials unless a custom one is supplied
pub struct GridBackend {
    http: reqwest::Client,
    remote: Option<RemoteEndpoint>,
}

impl GridBackend {
    /// Build the backend for a platform
    pub fn new(platform: Platform, config: &Config) -> Result<Self> {
        let http = http_client(config.timeouts.request())?;
        let remote = platform.provider(config).map(|provider| RemoteEndpoint {
            provider: platform.effective().to_string(),
            hub_url: provider.hub_url.clone(),
            status_url: provider.status_url.clone(),
            credentials: provider.credentials(),
        });
        Ok(Self { http, remote })
    }

    /// Build a backend against an explicit endpoint
    pub fn with_endpoint(http: reqwest::Client, remote: Option<RemoteEndpoint>) -> Self {
        Self { http, remote }
    }

    async fn open_remote(
        &self,
        attributes: &std::collections::BTreeMap<String, String>,
        job: &JobLabel,
    ) -> Result<Box<dyn Session>> {
        let endpoint = self.remote.as_ref().ok_or_else(|| {
            Error::SessionAcquisition(
                "remote capability used on a platform without a remote hub".to_string(),
            )
        })?;
        let credentials = endpoint
            .credentials
            .as_ref()
            .ok_or_else(|| Error::MissingCredentials(endpoint.provider.clone()))?;

        let mut desired: serde_json::Map<String, Value> = attributes
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect();
        desired.insert("name".to_string(), Value::String(job.name.clone()));
        if let Some(build) = &job.build {
            desired.insert("build".to_string(), Value::String(build.clone()));
        }

        let payload = json!({ "desiredCapabilities": desired });
        let session =
            WebDriverSession::open(&self.http, &endpoint.hub_url, Some(credentials), &payload)
                .await?;
        Ok(Box::new(session))
    }
}

#[async_trait]
impl ExecutionBackend for GridBackend {
    async fn acquire(&self, capability: &Capability, job: &JobLabel) -> Result<Box<dyn Session>> {
        let result = match capability {
            Capability::Local(driver) => driver.factory().create().await,
            Capability::Remote(remote) => self.open_remote(&remote.attributes, job).await,
        };
        result.map_err(|e| match e {
            Error::SessionAcquisition(_) | Error::MissingCredentials(_) => e,
            other => Error::SessionAcquisition(other.to_string()),
        })
    }

    async fn push_status(&self, job_id: &str, passed: bool) -> Result<()> {
        let Some(endpoint) = &self.remote else {
            return Ok(());
        };
        let Some(template) = &endpoint.status_url else {
            tracing::debug!(provider = %endpoint.provider, "No status endpoint configured");
            return Ok(());
        };
        let credentials = endpoint
            .credentials
            .as_ref()
            .ok_or_else(|| Error::StatusPush(format!("no credentials for {}", endpoint.provider)))?;

        let url = template
            .replace("{user}", &credentials.username)
            .replace("{job}", job_id);

        let response = self
            .http
            .put(&url)
            .basic_auth(&credentials.username, Some(&credentials.access_key))
            .json(&json!({ "passed": passed }))
            .send()
            .await
            .map_err(|e| Error::StatusPush(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Error::StatusPush(format!(
                "{} answered {}",
                endpoint.provider,
                response.status()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use std::collections::BTreeMap;
    use std::time::Duration;

    fn endpoint(server: &mockito::ServerGuard, credentials: Option<Credentials>) -> RemoteEndpoint {
        RemoteEndpoint {
            provider: "sauce".into(),
            hub_url: format!("{}/wd/hub", server.url()),
            status_url: Some(format!("{}/rest/v1/{{user}}/jobs/{{job}}", server.url())),
            credentials,
        }
    }

    fn creds() -> Option<Credentials> {
        Some(Credentials {
            username: "alice".into(),
            access_key: "secret".into(),
        })
    }

    fn backend(remote: RemoteEndpoint) -> GridBackend {
        GridBackend::with_endpoint(http_client(Duration::from_secs(5)).unwrap(), Some(remote))
    }

    fn chrome() -> Capability {
        let mut attributes = BTreeMap::new();
        attributes.insert("browserName".to_string(), "chrome".to_string());
        attributes.insert("panel_mode".to_string(), "multi_panel".to_string());
        Capability::remote(attributes, "chrome")
    }

    #[tokio::test]
    async fn test_acquire_remote_sends_job_label() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/wd/hub/session")
            .match_body(Matcher::Json(json!({
                "desiredCapabilities": {
                    "browserName": "chrome",
                    "panel_mode": "multi_panel",
                    "name": "LoadToc on chrome None on None",
                    "build": "build-7"
                }
            })))
            .with_body(r#"{"value":{"sessionId":"job-1"}}"#)
            .create_async()
            .await;

        let job = JobLabel {
            name: "LoadToc on chrome None on None".into(),
            build: Some("build-7".into()),
        };
        let session = backend(endpoint(&server, creds()))
            .acquire(&chrome(), &job)
            .await
            .unwrap();

        assert_eq!(session.id(), "job-1");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_acquire_without_credentials_fails() {
        let server = mockito::Server::new_async().await;
        let job = JobLabel {
            name: "t".into(),
            build: None,
        };
        let err = match backend(endpoint(&server, None)).acquire(&chrome(), &job).await {
            Ok(_) => panic!("Expected missing credentials"),
            Err(e) => e,
        };
        assert!(matches!(err, Error::MissingCredentials(ref p) if p == "sauce"));
    }

    #[tokio::test]
    async fn test_remote_capability_on_local_platform_fails() {
        let backend = GridBackend::new(Platform::Local, &Config::default()).unwrap();
        let job = JobLabel {
            name: "t".into(),
            build: None,
        };
        let err = match backend.acquire(&chrome(), &job).await {
            Ok(_) => panic!("Expected acquisition failure"),
            Err(e) => e,
        };
        assert!(matches!(err, Error::SessionAcquisition(_)));
    }

    #[tokio::test]
    async fn test_push_status_puts_passed_flag() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("PUT", "/rest/v1/alice/jobs/job-9")
            .match_header("authorization", "Basic YWxpY2U6c2VjcmV0")
            .match_body(Matcher::Json(json!({ "passed": false })))
            .with_status(200)
            .create_async()
            .await;

        backend(endpoint(&server, creds()))
            .push_status("job-9", false)
            .await
            .unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_push_status_reports_non_success() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("PUT", "/rest/v1/alice/jobs/job-9")
            .with_status(503)
            .create_async()
            .await;

        let err = backend(endpoint(&server, creds()))
            .push_status("job-9", true)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::StatusPush(_)));
    }

    #[tokio::test]
    async fn test_push_status_without_endpoint_is_noop() {
        let server = mockito::Server::new_async().await;
        let mut remote = endpoint(&server, creds());
        remote.status_url = None;
        backend(remote).push_status("job-9", true).await.unwrap();
    }
}
