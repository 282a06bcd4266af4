//! WebDriver wire protocol client
//!
//! Speaks just enough of the protocol to run atomic tests: create a
//! session, navigate, read the title and URL, look for an element and quit.
//! Both legacy JSON wire responses (`sessionId` at the top level, numeric
//! `status`) and W3C responses (`value.sessionId`, `value.error`) are
//! understood.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use serde_json::{json, Value};

use super::{Condition, Session, SessionFactory};
use crate::common::config::Credentials;
use crate::common::{Error, Result};

/// Legacy JSON wire status code for "no such element"
const LEGACY_NO_SUCH_ELEMENT: i64 = 7;

/// Build an HTTP client for driver traffic
///
/// A client that cannot be built is a setup problem, so the failure is
/// reported as a configuration error.
pub fn http_client(request_timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(request_timeout)
        .user_agent("e2e-trial")
        .build()
        .map_err(client_setup_error)
}

fn client_setup_error(e: reqwest::Error) -> Error {
    Error::Config(format!("Failed to build HTTP client: {}", e))
}

/// A session on a WebDriver server or grid hub
pub struct WebDriverSession {
    http: reqwest::Client,
    endpoint: String,
    credentials: Option<Credentials>,
    id: String,
    closed: bool,
}

impl WebDriverSession {
    /// Create a new session
    ///
    /// `payload` is the body of the `POST /session` request.
    pub async fn open(
        http: &reqwest::Client,
        endpoint: &str,
        credentials: Option<&Credentials>,
        payload: &Value,
    ) -> Result<Self> {
        let endpoint = endpoint.trim_end_matches('/').to_string();
        let url = format!("{}/session", endpoint);

        let mut request = http.post(&url).json(payload);
        if let Some(creds) = credentials {
            request = request.basic_auth(&creds.username, Some(&creds.access_key));
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::SessionAcquisition(format!("{} unreachable: {}", endpoint, e)))?;
        let status = response.status();
        let body: Value = response.json().await.unwrap_or(Value::Null);

        if !status.is_success() {
            return Err(Error::SessionAcquisition(format!(
                "{} refused new session ({}): {}",
                endpoint,
                status,
                error_message(&body)
            )));
        }

        let id = body
            .get("sessionId")
            .and_then(Value::as_str)
            .or_else(|| body.pointer("/value/sessionId").and_then(Value::as_str))
            .ok_or_else(|| {
                Error::SessionAcquisition(format!("{} returned no session id", endpoint))
            })?
            .to_string();

        tracing::debug!(session = %id, endpoint = %endpoint, "WebDriver session created");

        Ok(Self {
            http: http.clone(),
            endpoint,
            credentials: credentials.cloned(),
            id,
            closed: false,
        })
    }

    fn session_url(&self, path: &str) -> String {
        format!("{}/session/{}{}", self.endpoint, self.id, path)
    }

    /// Send a command and return the raw status and body
    async fn call(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<(StatusCode, Value)> {
        let mut request = self.http.request(method, self.session_url(path));
        if let Some(creds) = &self.credentials {
            request = request.basic_auth(&creds.username, Some(&creds.access_key));
        }
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request.send().await?;
        let status = response.status();
        let value: Value = response.json().await.unwrap_or(Value::Null);
        Ok((status, value))
    }

    /// Send a command and fail on any error response
    async fn command(
        &self,
        name: &str,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<Value> {
        let (status, value) = self
            .call(method, path, body)
            .await
            .map_err(|e| Error::webdriver(name, e.to_string()))?;

        if !status.is_success() || legacy_status(&value).is_some_and(|code| code != 0) {
            return Err(Error::webdriver(name, error_message(&value)));
        }
        Ok(value.get("value").cloned().unwrap_or(Value::Null))
    }

    async fn current_url(&self) -> Result<String> {
        let value = self.command("getCurrentUrl", Method::GET, "/url", None).await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn element_present(&self, css: &str) -> Result<bool> {
        let body = json!({ "using": "css selector", "value": css });
        let (status, value) = self
            .call(Method::POST, "/element", Some(body))
            .await
            .map_err(|e| Error::webdriver("findElement", e.to_string()))?;

        if is_no_such_element(status, &value) {
            return Ok(false);
        }
        if !status.is_success() || legacy_status(&value).is_some_and(|code| code != 0) {
            return Err(Error::webdriver("findElement", error_message(&value)));
        }
        Ok(true)
    }
}

#[async_trait]
impl Session for WebDriverSession {
    fn id(&self) -> &str {
        &self.id
    }

    async fn navigate(&mut self, url: &str) -> Result<()> {
        self.command("get", Method::POST, "/url", Some(json!({ "url": url })))
            .await?;
        Ok(())
    }

    async fn check(&mut self, condition: &Condition) -> Result<bool> {
        match condition {
            Condition::TitleContains(text) => Ok(self.title().await?.contains(text.as_str())),
            Condition::UrlContains(text) => Ok(self.current_url().await?.contains(text.as_str())),
            Condition::ElementPresent(css) => self.element_present(css).await,
        }
    }

    async fn title(&mut self) -> Result<String> {
        let value = self.command("getTitle", Method::GET, "/title", None).await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.command("quit", Method::DELETE, "", None).await?;
        tracing::debug!(session = %self.id, "WebDriver session closed");
        Ok(())
    }
}

fn legacy_status(value: &Value) -> Option<i64> {
    value.get("status").and_then(Value::as_i64)
}

fn is_no_such_element(status: StatusCode, value: &Value) -> bool {
    let w3c = value.pointer("/value/error").and_then(Value::as_str) == Some("no such element");
    w3c || legacy_status(value) == Some(LEGACY_NO_SUCH_ELEMENT)
        || (status == StatusCode::NOT_FOUND && value.pointer("/value/error").is_none())
}

/// Best human readable message from an error response
fn error_message(value: &Value) -> String {
    value
        .pointer("/value/message")
        .or_else(|| value.get("message"))
        .or_else(|| value.pointer("/value/error"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| "no error message returned".to_string())
}

/// Session factory for a driver server running on this machine
pub struct WebDriverFactory {
    name: String,
    url: String,
    http: reqwest::Client,
}

impl WebDriverFactory {
    pub fn new(name: &str, url: &str, http: reqwest::Client) -> Self {
        Self {
            name: name.to_string(),
            url: url.to_string(),
            http,
        }
    }
}

#[async_trait]
impl SessionFactory for WebDriverFactory {
    fn name(&self) -> &str {
        &self.name
    }

    async fn create(&self) -> Result<Box<dyn Session>> {
        let payload = json!({
            "capabilities": { "alwaysMatch": { "browserName": self.name } },
            "desiredCapabilities": { "browserName": self.name },
        });
        let session = WebDriverSession::open(&self.http, &self.url, None, &payload).await?;
        Ok(Box::new(session))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    fn client() -> reqwest::Client {
        http_client(Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_client_setup_failure_is_configuration_error() {
        let e = reqwest::Client::new()
            .get("not a url")
            .build()
            .unwrap_err();
        let err = client_setup_error(e);
        assert!(err.is_configuration());
        assert!(err.to_string().starts_with("Configuration error: Failed to build HTTP client"));
    }

    #[tokio::test]
    async fn test_open_reads_w3c_session_id() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/wd/hub/session")
            .match_header("authorization", Matcher::Regex("^Basic ".into()))
            .match_body(Matcher::PartialJson(json!({
                "desiredCapabilities": { "browserName": "chrome" }
            })))
            .with_status(200)
            .with_body(r#"{"value":{"sessionId":"abc123","capabilities":{}}}"#)
            .create_async()
            .await;

        let creds = Credentials {
            username: "alice".into(),
            access_key: "secret".into(),
        };
        let payload = json!({ "desiredCapabilities": { "browserName": "chrome" } });
        let endpoint = format!("{}/wd/hub/", server.url());
        let session = WebDriverSession::open(&client(), &endpoint, Some(&creds), &payload)
            .await
            .unwrap();

        assert_eq!(session.id(), "abc123");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_open_reads_legacy_session_id() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/session")
            .with_status(200)
            .with_body(r#"{"sessionId":"legacy-1","status":0,"value":{}}"#)
            .create_async()
            .await;

        let session = WebDriverSession::open(&client(), &server.url(), None, &json!({}))
            .await
            .unwrap();
        assert_eq!(session.id(), "legacy-1");
    }

    #[tokio::test]
    async fn test_open_refused_is_acquisition_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/session")
            .with_status(401)
            .with_body(r#"{"value":{"error":"invalid credentials","message":"Sauce could not verify your user"}}"#)
            .create_async()
            .await;

        let err = match WebDriverSession::open(&client(), &server.url(), None, &json!({})).await {
            Ok(_) => panic!("Expected session creation to fail"),
            Err(e) => e,
        };
        assert!(matches!(err, Error::SessionAcquisition(_)));
        assert!(err.to_string().contains("Sauce could not verify your user"));
    }

    #[tokio::test]
    async fn test_commands_and_close() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/session")
            .with_body(r#"{"value":{"sessionId":"s1"}}"#)
            .create_async()
            .await;
        let navigate = server
            .mock("POST", "/session/s1/url")
            .match_body(Matcher::Json(json!({ "url": "http://localhost:8000/texts" })))
            .with_body(r#"{"value":null}"#)
            .create_async()
            .await;
        server
            .mock("GET", "/session/s1/title")
            .with_body(r#"{"value":"Texts | Library"}"#)
            .create_async()
            .await;
        server
            .mock("POST", "/session/s1/element")
            .match_body(Matcher::PartialJson(json!({ "value": ".missing" })))
            .with_status(404)
            .with_body(r#"{"value":{"error":"no such element","message":"Unable to locate element"}}"#)
            .create_async()
            .await;
        server
            .mock("POST", "/session/s1/element")
            .match_body(Matcher::PartialJson(json!({ "value": ".present" })))
            .with_body(r#"{"value":{"element-6066-11e4-a52e-4f735466cecf":"e1"}}"#)
            .create_async()
            .await;
        let quit = server
            .mock("DELETE", "/session/s1")
            .with_body(r#"{"value":null}"#)
            .expect(1)
            .create_async()
            .await;

        let mut session = WebDriverSession::open(&client(), &server.url(), None, &json!({}))
            .await
            .unwrap();

        session.navigate("http://localhost:8000/texts").await.unwrap();
        assert!(session
            .check(&Condition::TitleContains("Texts".into()))
            .await
            .unwrap());
        assert!(!session
            .check(&Condition::ElementPresent(".missing".into()))
            .await
            .unwrap());
        assert!(session
            .check(&Condition::ElementPresent(".present".into()))
            .await
            .unwrap());

        session.close().await.unwrap();
        session.close().await.unwrap();

        navigate.assert_async().await;
        quit.assert_async().await;
    }

    #[tokio::test]
    async fn test_command_error_carries_driver_message() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/session")
            .with_body(r#"{"value":{"sessionId":"s2"}}"#)
            .create_async()
            .await;
        server
            .mock("GET", "/session/s2/title")
            .with_status(500)
            .with_body(r#"{"value":{"error":"unknown error","message":"tab crashed"}}"#)
            .create_async()
            .await;

        let mut session = WebDriverSession::open(&client(), &server.url(), None, &json!({}))
            .await
            .unwrap();
        let err = session.title().await.unwrap_err();
        assert_eq!(err.to_string(), "WebDriver command 'getTitle' failed: tab crashed");
    }
}
