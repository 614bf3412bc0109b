//! HTTP transport for WPS endpoints.
//!
//! `WpsService` is the boundary the client core talks to; `HttpWpsService`
//! implements it over reqwest:
//! - KVP GET for `GetCapabilities` and `DescribeProcess`
//! - XML POST for `Execute`
//! - plain GET for status locations and output references

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::Client as HttpClient;
use url::Url;

use super::errors::ServiceError;
use super::types::{Capabilities, ExecuteRequest, ProcessDescriptor, StatusReport};
use super::xml;

// ─── Constants ───────────────────────────────────────────────────────────────

/// Default WPS protocol version.
pub const DEFAULT_VERSION: &str = "1.0.0";

/// TCP connection timeout.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Total request timeout. Synchronous executions hold the connection open
/// for the whole computation, so this is generous.
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(600);

// ─── Service Boundary ────────────────────────────────────────────────────────

/// Operations the client core needs from a WPS server.
#[async_trait]
pub trait WpsService: Send + Sync {
    /// Base URL of the endpoint.
    fn url(&self) -> &str;

    async fn get_capabilities(&self) -> Result<Capabilities, ServiceError>;

    async fn describe_process(&self, identifier: &str) -> Result<ProcessDescriptor, ServiceError>;

    async fn execute(&self, request: &ExecuteRequest) -> Result<StatusReport, ServiceError>;

    /// Fetch the current execute response document from a status location.
    async fn check_status(&self, status_location: &str) -> Result<StatusReport, ServiceError>;

    /// Download referenced output content.
    async fn fetch(&self, reference: &str) -> Result<Vec<u8>, ServiceError>;
}

// ─── HTTP Options ────────────────────────────────────────────────────────────

/// Connection settings for `HttpWpsService`.
#[derive(Debug, Clone)]
pub struct HttpOptions {
    pub username: Option<String>,
    pub password: Option<String>,
    pub headers: HashMap<String, String>,
    /// Verify TLS certificates.
    pub verify: bool,
    pub timeout: Duration,
    pub connect_timeout: Duration,
}

impl Default for HttpOptions {
    fn default() -> Self {
        Self {
            username: None,
            password: None,
            headers: HashMap::new(),
            verify: true,
            timeout: DEFAULT_REQUEST_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

// ─── HttpWpsService ──────────────────────────────────────────────────────────

/// WPS client transport over HTTP(S).
pub struct HttpWpsService {
    url: String,
    version: String,
    http: HttpClient,
    username: Option<String>,
    password: Option<String>,
}

impl HttpWpsService {
    /// Build a transport for `url`. Does not contact the server.
    pub fn new(url: &str, version: &str, options: &HttpOptions) -> Result<Self, ServiceError> {
        Url::parse(url).map_err(|e| ServiceError::Transport {
            url: url.to_string(),
            reason: format!("invalid service URL: {e}"),
        })?;

        let mut headers = HeaderMap::new();
        for (name, value) in &options.headers {
            let name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
                ServiceError::Transport {
                    url: url.to_string(),
                    reason: format!("invalid header name '{name}': {e}"),
                }
            })?;
            let value = HeaderValue::from_str(value).map_err(|e| ServiceError::Transport {
                url: url.to_string(),
                reason: format!("invalid header value for '{name}': {e}"),
            })?;
            headers.insert(name, value);
        }

        let http = HttpClient::builder()
            .connect_timeout(options.connect_timeout)
            .timeout(options.timeout)
            .default_headers(headers)
            .danger_accept_invalid_certs(!options.verify)
            .user_agent(concat!("wps-client/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ServiceError::Transport {
                url: url.to_string(),
                reason: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self {
            url: url.to_string(),
            version: version.to_string(),
            http,
            username: options.username.clone(),
            password: options.password.clone(),
        })
    }

    /// Build a KVP request URL for `request` with extra parameters.
    fn kvp_url(&self, request: &str, extra: &[(&str, &str)]) -> Result<Url, ServiceError> {
        let mut url = Url::parse(&self.url).map_err(|e| ServiceError::Transport {
            url: self.url.clone(),
            reason: e.to_string(),
        })?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs
                .append_pair("service", "WPS")
                .append_pair("request", request)
                .append_pair("version", &self.version);
            for (key, value) in extra {
                pairs.append_pair(key, value);
            }
        }
        Ok(url)
    }

    fn authorize(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.username {
            Some(user) => builder.basic_auth(user, self.password.as_deref()),
            None => builder,
        }
    }

    /// Send a request and return the body, mapping HTTP failures and
    /// exception reports to `ServiceError`.
    async fn send(
        &self,
        builder: reqwest::RequestBuilder,
        url: &str,
    ) -> Result<String, ServiceError> {
        let response = self
            .authorize(builder)
            .send()
            .await
            .map_err(|e| ServiceError::Transport {
                url: url.to_string(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| ServiceError::Transport {
            url: url.to_string(),
            reason: format!("failed to read response body: {e}"),
        })?;

        if !status.is_success() {
            if let Some(exception) = xml::parse_exception_report(&body) {
                return Err(exception);
            }
            return Err(ServiceError::Http {
                status: status.as_u16(),
                body,
            });
        }

        Ok(body)
    }
}

#[async_trait]
impl WpsService for HttpWpsService {
    fn url(&self) -> &str {
        &self.url
    }

    async fn get_capabilities(&self) -> Result<Capabilities, ServiceError> {
        let url = self.kvp_url("GetCapabilities", &[])?;
        tracing::debug!(url = %url, "GetCapabilities");
        let body = self.send(self.http.get(url.clone()), url.as_str()).await?;
        xml::parse_capabilities(&body)
    }

    async fn describe_process(&self, identifier: &str) -> Result<ProcessDescriptor, ServiceError> {
        let url = self.kvp_url("DescribeProcess", &[("identifier", identifier)])?;
        tracing::debug!(url = %url, process = identifier, "DescribeProcess");
        let body = self.send(self.http.get(url.clone()), url.as_str()).await?;
        xml::parse_process_description(&body, identifier)
    }

    async fn execute(&self, request: &ExecuteRequest) -> Result<StatusReport, ServiceError> {
        let document = xml::encode_execute_request(request, &self.version);
        tracing::debug!(
            url = %self.url,
            process = %request.identifier,
            mode = %request.mode,
            input_count = request.inputs.len(),
            "Execute"
        );
        let builder = self
            .http
            .post(&self.url)
            .header(CONTENT_TYPE, "text/xml; charset=utf-8")
            .body(document);
        let body = self.send(builder, &self.url).await?;
        xml::parse_execute_response(&body)
    }

    async fn check_status(&self, status_location: &str) -> Result<StatusReport, ServiceError> {
        let body = self
            .send(self.http.get(status_location), status_location)
            .await?;
        xml::parse_execute_response(&body)
    }

    async fn fetch(&self, reference: &str) -> Result<Vec<u8>, ServiceError> {
        if let Ok(url) = Url::parse(reference) {
            if url.scheme() == "file" {
                let path = url.to_file_path().map_err(|_| ServiceError::Transport {
                    url: reference.to_string(),
                    reason: "not a local file URL".into(),
                })?;
                return Ok(tokio::fs::read(path).await?);
            }
        }

        let response = self
            .authorize(self.http.get(reference))
            .send()
            .await
            .map_err(|e| ServiceError::Transport {
                url: reference.to_string(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ServiceError::Http {
                status: status.as_u16(),
                body,
            });
        }

        let bytes = response.bytes().await.map_err(|e| ServiceError::Transport {
            url: reference.to_string(),
            reason: format!("failed to read response body: {e}"),
        })?;
        Ok(bytes.to_vec())
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
