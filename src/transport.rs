//! The HTTP transport boundary and the per-attempt invoker.
//!
//! [`Transport`] is the only place where network I/O happens. The engine uses
//! [`ReqwestTransport`] by default; tests and embedders can inject their own.

use crate::{
    config::HeaderBag,
    merge::ResolvedRequest,
    response::HttpResponse,
    stack_trace::{StackTraceEntry, StackTraceLog},
    Error, Result,
};
use async_trait::async_trait;
use chrono::Utc;
use http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use serde_json::{Map, Value};
use std::time::{Duration, Instant};
use url::Url;

/// What the transport sends: method, headers and rendered body.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportRequest {
    /// The HTTP method.
    pub method: Method,
    /// Headers, keys lowercased.
    pub headers: HeaderBag,
    /// Rendered body.
    pub body: Option<String>,
}

impl TransportRequest {
    /// Renders a resolved request. JSON bodies get a JSON content type unless one is set.
    pub fn from_resolved(request: &ResolvedRequest) -> Self {
        let mut headers = request.headers.clone();

        let is_json = request.body.as_ref().is_some_and(|b| b.is_json());
        if is_json && !headers.contains_key("content-type") {
            headers.insert("content-type".to_string(), "application/json".to_string());
        }

        Self {
            method: request.method.clone(),
            headers,
            body: request.body.as_ref().map(|b| b.render()),
        }
    }
}

/// A response whose body has not been read yet.
#[async_trait]
pub trait TransportReply: Send {
    /// The HTTP status code.
    fn status(&self) -> StatusCode;

    /// The response headers.
    fn headers(&self) -> &HeaderMap;

    /// Reads the body as text. Called at most once.
    async fn text(&mut self) -> Result<String>;
}

/// Sends one HTTP request.
///
/// A non-2xx status is a valid reply, not an error. Errors are reserved for
/// network-level failures.
///
/// # Examples
///
/// ```
/// use apiengine::transport::{StaticReply, Transport, TransportReply, TransportRequest};
/// use apiengine::Result;
/// use async_trait::async_trait;
///
/// struct AlwaysNotFound;
///
/// #[async_trait]
/// impl Transport for AlwaysNotFound {
///     async fn send(&self, _url: &str, _request: &TransportRequest) -> Result<Box<dyn TransportReply>> {
///         Ok(Box::new(StaticReply::new(404, "Not found")))
///     }
/// }
/// ```
#[async_trait]
pub trait Transport: Send + Sync {
    /// Sends `request` to `url`.
    async fn send(&self, url: &str, request: &TransportRequest) -> Result<Box<dyn TransportReply>>;
}

/// A reply with a fixed status and body, for injected transports.
#[derive(Debug, Clone)]
pub struct StaticReply {
    status: StatusCode,
    headers: HeaderMap,
    body: String,
}

impl StaticReply {
    /// Creates a reply. Invalid status codes fall back to 500.
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status: StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            headers: HeaderMap::new(),
            body: body.into(),
        }
    }

    /// Adds a response header. Invalid names or values are ignored.
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (HeaderName::try_from(name), HeaderValue::try_from(value)) {
            self.headers.insert(name, value);
        }
        self
    }
}

#[async_trait]
impl TransportReply for StaticReply {
    fn status(&self) -> StatusCode {
        self.status
    }

    fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    async fn text(&mut self) -> Result<String> {
        Ok(std::mem::take(&mut self.body))
    }
}

struct ReqwestReply {
    status: StatusCode,
    headers: HeaderMap,
    response: Option<reqwest::Response>,
}

#[async_trait]
impl TransportReply for ReqwestReply {
    fn status(&self) -> StatusCode {
        self.status
    }

    fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    async fn text(&mut self) -> Result<String> {
        match self.response.take() {
            Some(response) => Ok(response.text().await?),
            None => Err(Error::Transport("response body already consumed".to_string())),
        }
    }
}

/// The default transport, backed by a pooled `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
    timeout: Option<Duration>,
}

impl ReqwestTransport {
    /// Creates a transport without a timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying client cannot be built.
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder().build().map_err(|e| {
            Error::ConfigurationError(format!("Failed to build HTTP client: {}", e))
        })?;

        Ok(Self {
            client,
            timeout: None,
        })
    }

    /// Sets a per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, url: &str, request: &TransportRequest) -> Result<Box<dyn TransportReply>> {
        let url = Url::parse(url)?;
        let mut builder = self.client.request(request.method.clone(), url);

        for (name, value) in &request.headers {
            let name = HeaderName::try_from(name.as_str())
                .map_err(|e| Error::ConfigurationError(format!("Invalid header name: {}", e)))?;
            let value = HeaderValue::try_from(value.as_str())
                .map_err(|e| Error::ConfigurationError(format!("Invalid header value: {}", e)))?;
            builder = builder.header(name, value);
        }

        if let Some(timeout) = self.timeout {
            builder = builder.timeout(timeout);
        }

        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let response = builder.send().await?;

        Ok(Box::new(ReqwestReply {
            status: response.status(),
            headers: response.headers().clone(),
            response: Some(response),
        }))
    }
}

/// The outcome of one successful transport attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct Attempt {
    /// Status and headers.
    pub response: HttpResponse,
    /// Body parsed as JSON when possible, otherwise a JSON string.
    pub body: Value,
}

fn parse_body(text: String) -> Value {
    serde_json::from_str(&text).unwrap_or(Value::String(text))
}

fn header_bag(headers: &HeaderMap) -> HeaderBag {
    headers
        .iter()
        .map(|(name, value)| {
            (
                name.as_str().to_string(),
                String::from_utf8_lossy(value.as_bytes()).into_owned(),
            )
        })
        .collect()
}

/// Performs single attempts and records each one in the stack trace log.
pub(crate) struct Invoker<'a> {
    pub(crate) transport: &'a dyn Transport,
    pub(crate) log: &'a StackTraceLog,
}

impl Invoker<'_> {
    /// Sends one request and appends exactly one log entry, whatever the outcome.
    pub(crate) async fn invoke(
        &self,
        url: &str,
        request: &TransportRequest,
        extra_properties: &Map<String, Value>,
    ) -> Result<Attempt> {
        let start_timestamp = Utc::now();
        let outcome = self.exchange(url, request).await;

        let (response_headers, response_body, status_code, error_message) = match &outcome {
            Ok(attempt) => (
                header_bag(&attempt.response.headers),
                attempt.body.clone(),
                Some(attempt.response.status.as_u16()),
                None,
            ),
            Err(e) => (HeaderBag::new(), Value::String(String::new()), None, Some(e.to_string())),
        };

        self.log.push(StackTraceEntry {
            start_timestamp,
            end_timestamp: Utc::now(),
            request_url: url.to_string(),
            request_method: request.method.to_string(),
            request_headers: request.headers.clone(),
            response_headers,
            request_body: request.body.clone().unwrap_or_default(),
            response_body,
            status_code,
            error_message,
            extra_properties: extra_properties.clone(),
        });

        outcome
    }

    async fn exchange(&self, url: &str, request: &TransportRequest) -> Result<Attempt> {
        let started = Instant::now();

        tracing::debug!(
            method = %request.method,
            url = %url,
            "Executing HTTP request"
        );

        let mut reply = self.transport.send(url, request).await.map_err(|e| {
            tracing::error!(error = %e, url = %url, "Transport failed");
            e
        })?;

        let status = reply.status();
        let headers = reply.headers().clone();

        let body = match reply.text().await {
            Ok(text) => parse_body(text),
            Err(e) => {
                tracing::warn!(error = %e, url = %url, "Failed to read response body");
                Value::String(String::new())
            }
        };

        tracing::info!(
            status = status.as_u16(),
            latency_ms = started.elapsed().as_millis(),
            "Received HTTP response"
        );

        Ok(Attempt {
            response: HttpResponse { status, headers },
            body,
        })
    }
}
