//! The result of a call.
//!
//! A [`CallResult`] is returned for every call that reaches the server,
//! whatever the status code. Use [`CallResult::is_success`] or
//! [`CallResult::error_status`] to detect logical failures.

use crate::merge::ResolvedRequest;
use http::{HeaderMap, StatusCode};
use serde::Serialize;
use serde_json::{Map, Value};

/// Status line and headers of a transport response.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    /// The HTTP status code.
    pub status: StatusCode,
    /// The response headers.
    pub headers: HeaderMap,
}

impl HttpResponse {
    /// Returns `true` for 2xx statuses.
    pub fn ok(&self) -> bool {
        self.status.is_success()
    }

    /// Returns a header value by name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)?.to_str().ok()
    }
}

/// Retry history of a call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Retries {
    /// Number of retry attempts made (the first attempt is not counted).
    pub quantity: u32,
    /// Status code observed on each retry attempt, in order.
    pub conditions: Vec<u16>,
}

/// Logical error classification of the final response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorStatus {
    /// `true` when the status matches a configured error message.
    pub is_error: bool,
    /// Code of the matching error message.
    pub code: Option<String>,
    /// Text of the matching error message.
    pub message: Option<String>,
}

/// The outcome of [`ApiEngine::call`](crate::ApiEngine::call).
///
/// # Examples
///
/// ```no_run
/// # async fn example(engine: apiengine::ApiEngine) -> Result<(), apiengine::Error> {
/// let result = engine.call("getPost", None).await?;
///
/// if result.is_success() {
///     println!("body: {}", result.response_body);
/// } else if let Some(message) = &result.error_status.message {
///     eprintln!("{}: {}", result.response.status, message);
/// }
///
/// if result.was_retried() {
///     println!("statuses seen while retrying: {:?}", result.retries.conditions);
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct CallResult {
    /// The request as sent, after request interceptors.
    pub request: ResolvedRequest,

    /// The final response.
    pub response: HttpResponse,

    /// The final response body, parsed as JSON when possible, otherwise a JSON string.
    pub response_body: Value,

    /// Retry history.
    pub retries: Retries,

    /// Error classification of the final response.
    pub error_status: ErrorStatus,

    /// Merged output of the response interceptors.
    pub interceptor_response: Map<String, Value>,
}

impl CallResult {
    /// Returns `true` if the final response has a 2xx status.
    pub fn is_success(&self) -> bool {
        self.response.ok()
    }

    /// Returns `true` if at least one retry attempt was made.
    pub fn was_retried(&self) -> bool {
        self.retries.quantity > 0
    }

    /// Returns the response body as text.
    ///
    /// JSON bodies are re-serialized; plain text bodies are returned as-is.
    pub fn body_text(&self) -> String {
        match &self.response_body {
            Value::String(text) => text.clone(),
            other => other.to_string(),
        }
    }
}
