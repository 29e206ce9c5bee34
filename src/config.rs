//! Declarative engine configuration: endpoints, global parameters and call parameters.
//!
//! Everything except callbacks can be loaded from JSON with
//! [`ApiConstants::from_json`]. Interceptors and actions are attached with the
//! builder methods.

use crate::{
    interceptor::{Action, RequestInterceptor, ResponseInterceptor},
    template::{ParamValue, PathQueryParameter},
    Error, Result,
};
use http::Method;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Header names and values. Keys are compared after lowercasing during merges.
pub type HeaderBag = BTreeMap<String, String>;

/// A configuration category that an endpoint can exclude from global merging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum IgnoreGlobalParam {
    /// Method, headers and body.
    Request,
    /// The retry count.
    Retry,
    /// The status codes that trigger a retry.
    RetryCondition,
    /// Status-code actions.
    StatusCodesActions,
    /// Error messages.
    ErrorMessages,
    /// Extra properties attached to stack trace entries.
    #[serde(alias = "stackTraceExtraParams")]
    StackTraceLogExtraParams,
    /// The opaque extra parameter bag.
    ExtraParams,
    /// The request interceptor.
    RequestInterceptor,
    /// The response interceptor.
    ResponseInterceptor,
}

/// A request body.
///
/// Strings deserialize to [`Body::Text`] and are sent verbatim; any other
/// JSON value is kept structured so it can be deep-merged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Body {
    /// A raw text body.
    Text(String),
    /// A structured JSON body.
    Json(Value),
}

impl Body {
    /// Serializes any value into a JSON body.
    pub fn json<T: Serialize>(value: &T) -> Result<Self> {
        serde_json::to_value(value)
            .map(Body::from)
            .map_err(|e| Error::ConfigurationError(format!("Invalid body: {}", e)))
    }

    /// Returns the body as sent on the wire.
    pub fn render(&self) -> String {
        match self {
            Body::Text(text) => text.clone(),
            Body::Json(value) => value.to_string(),
        }
    }

    /// Returns `true` for structured JSON bodies.
    pub fn is_json(&self) -> bool {
        matches!(self, Body::Json(_))
    }

    fn is_empty(&self) -> bool {
        match self {
            Body::Text(text) => text.is_empty(),
            Body::Json(Value::Object(map)) => map.is_empty(),
            Body::Json(Value::Null) => true,
            Body::Json(_) => false,
        }
    }
}

impl From<Value> for Body {
    fn from(value: Value) -> Self {
        match value {
            Value::String(text) => Body::Text(text),
            other => Body::Json(other),
        }
    }
}

impl From<&str> for Body {
    fn from(text: &str) -> Self {
        Body::Text(text.to_string())
    }
}

impl From<String> for Body {
    fn from(text: String) -> Self {
        Body::Text(text)
    }
}

fn deserialize_method<'de, D>(deserializer: D) -> std::result::Result<Option<Method>, D::Error>
where
    D: Deserializer<'de>,
{
    let Some(raw) = Option::<String>::deserialize(deserializer)? else {
        return Ok(None);
    };
    Method::from_bytes(raw.to_ascii_uppercase().as_bytes())
        .map(Some)
        .map_err(serde::de::Error::custom)
}

/// Method, headers and body of a request. All optional.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RequestConfig {
    /// The HTTP method.
    #[serde(default, deserialize_with = "deserialize_method")]
    pub method: Option<Method>,

    /// Request headers.
    #[serde(default)]
    pub headers: HeaderBag,

    /// Request body.
    #[serde(default)]
    pub body: Option<Body>,
}

impl RequestConfig {
    /// Creates an empty request configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the HTTP method.
    pub fn method(mut self, method: Method) -> Self {
        self.method = Some(method);
        self
    }

    /// Adds a header.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Sets the body.
    pub fn body(mut self, body: impl Into<Body>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Returns `true` when no method, header or body is configured.
    pub fn is_empty(&self) -> bool {
        self.method.is_none() && self.headers.is_empty() && self.body.is_none()
    }
}

/// When a status-code action runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Phase {
    /// On the first attempt and on every retry.
    #[default]
    Any,
    /// Only on the first attempt.
    FirstCall,
    /// Only on retry attempts.
    Retry,
}

impl Phase {
    /// Returns `true` if an action registered for `self` runs during `current`.
    pub fn covers(self, current: Phase) -> bool {
        self == Phase::Any || self == current
    }
}

/// A callback run when an attempt returns a given status code.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusCodeAction {
    /// The status code that triggers the action.
    pub status_code: u16,
    /// The phase in which the action runs.
    pub phase: Phase,
    /// The callback.
    pub action: Action,
}

impl StatusCodeAction {
    /// Creates a status-code action.
    pub fn new(status_code: u16, phase: Phase, action: Action) -> Self {
        Self {
            status_code,
            phase,
            action,
        }
    }
}

/// A logical error description attached to a status code.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorMessage {
    /// The status code this message describes.
    pub status_code: u16,
    /// Application error code.
    pub code: String,
    /// Human readable message.
    pub message: String,
    /// Optional callback run when the message matches.
    #[serde(skip)]
    pub action: Option<Action>,
}

impl ErrorMessage {
    /// Creates an error message without an action.
    pub fn new(status_code: u16, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status_code,
            code: code.into(),
            message: message.into(),
            action: None,
        }
    }

    /// Attaches an action.
    pub fn with_action(mut self, action: Action) -> Self {
        self.action = Some(action);
        self
    }
}

// Builder methods shared by `GlobalParams` and `EndpointDefinition`.
macro_rules! layer_builders {
    ($ty:ident) => {
        impl $ty {
            /// Replaces the request configuration.
            pub fn request(mut self, request: RequestConfig) -> Self {
                self.request = request;
                self
            }

            /// Sets the HTTP method.
            pub fn method(mut self, method: Method) -> Self {
                self.request.method = Some(method);
                self
            }

            /// Adds a request header.
            pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
                self.request.headers.insert(name.into(), value.into());
                self
            }

            /// Sets the request body.
            pub fn body(mut self, body: impl Into<Body>) -> Self {
                self.request.body = Some(body.into());
                self
            }

            /// Sets the maximum number of retries.
            pub fn retry(mut self, retry: i32) -> Self {
                self.retry = Some(retry);
                self
            }

            /// Sets the status codes that trigger a retry.
            pub fn retry_condition(mut self, codes: impl IntoIterator<Item = u16>) -> Self {
                self.retry_condition = codes.into_iter().collect();
                self
            }

            /// Registers a status-code action.
            pub fn status_code_action(mut self, status_code: u16, phase: Phase, action: Action) -> Self {
                self.status_codes_actions
                    .push(StatusCodeAction::new(status_code, phase, action));
                self
            }

            /// Registers an error message.
            pub fn error_message(mut self, message: ErrorMessage) -> Self {
                self.error_messages.push(message);
                self
            }

            /// Adds an extra property attached to every stack trace entry.
            pub fn stack_trace_extra(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
                self.stack_trace_log_extra_params
                    .insert(key.into(), value.into());
                self
            }

            /// Adds an opaque extra parameter.
            pub fn extra_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
                self.extra_params.insert(key.into(), value.into());
                self
            }

            /// Sets the request interceptor.
            pub fn request_interceptor(mut self, interceptor: RequestInterceptor) -> Self {
                self.request_interceptor = Some(interceptor);
                self
            }

            /// Sets the response interceptor.
            pub fn response_interceptor(mut self, interceptor: ResponseInterceptor) -> Self {
                self.response_interceptor = Some(interceptor);
                self
            }
        }
    };
}

/// Defaults applied beneath every endpoint.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GlobalParams {
    /// Default method, headers and body.
    pub request: RequestConfig,
    /// Default retry count.
    pub retry: Option<i32>,
    /// Status codes that trigger a retry.
    pub retry_condition: Vec<u16>,
    /// Status-code actions.
    #[serde(skip)]
    pub status_codes_actions: Vec<StatusCodeAction>,
    /// Error messages.
    pub error_messages: Vec<ErrorMessage>,
    /// Extra properties attached to stack trace entries.
    #[serde(alias = "stackTraceExtraParams")]
    pub stack_trace_log_extra_params: Map<String, Value>,
    /// Opaque pass-through parameters.
    pub extra_params: Map<String, Value>,
    /// Request interceptor run before the endpoint's.
    #[serde(skip)]
    pub request_interceptor: Option<RequestInterceptor>,
    /// Response interceptor run before the endpoint's.
    #[serde(skip)]
    pub response_interceptor: Option<ResponseInterceptor>,
}

impl GlobalParams {
    /// Creates empty global parameters.
    pub fn new() -> Self {
        Self::default()
    }
}

layer_builders!(GlobalParams);

/// A named, reusable HTTP call template.
///
/// # Examples
///
/// ```
/// use apiengine::config::{EndpointDefinition, IgnoreGlobalParam};
/// use http::Method;
///
/// let endpoint = EndpointDefinition::new("/posts/{id}")
///     .method(Method::GET)
///     .retry(3)
///     .retry_condition([500, 503])
///     .ignore_global(IgnoreGlobalParam::RetryCondition);
///
/// assert!(endpoint.ignores(IgnoreGlobalParam::RetryCondition));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointDefinition {
    /// Overrides the engine base URL for this endpoint.
    #[serde(default)]
    pub base_url: Option<String>,
    /// Path template with `{name}` placeholders.
    pub path: String,
    /// Method, headers and body.
    #[serde(default)]
    pub request: RequestConfig,
    /// Maximum number of retries.
    #[serde(default)]
    pub retry: Option<i32>,
    /// Status codes that trigger a retry.
    #[serde(default)]
    pub retry_condition: Vec<u16>,
    /// Categories excluded from global merging.
    #[serde(default)]
    pub ignore_global_params: Vec<IgnoreGlobalParam>,
    /// Status-code actions.
    #[serde(skip)]
    pub status_codes_actions: Vec<StatusCodeAction>,
    /// Error messages.
    #[serde(default)]
    pub error_messages: Vec<ErrorMessage>,
    /// Extra properties attached to stack trace entries.
    #[serde(default, alias = "stackTraceExtraParams")]
    pub stack_trace_log_extra_params: Map<String, Value>,
    /// Opaque pass-through parameters.
    #[serde(default)]
    pub extra_params: Map<String, Value>,
    /// Request interceptor.
    #[serde(skip)]
    pub request_interceptor: Option<RequestInterceptor>,
    /// Response interceptor.
    #[serde(skip)]
    pub response_interceptor: Option<ResponseInterceptor>,
}

impl EndpointDefinition {
    /// Creates an endpoint for the given path template.
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    /// Overrides the base URL.
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Excludes a category from global merging.
    pub fn ignore_global(mut self, param: IgnoreGlobalParam) -> Self {
        if !self.ignores(param) {
            self.ignore_global_params.push(param);
        }
        self
    }

    /// Returns `true` if the endpoint excludes `param` from global merging.
    pub fn ignores(&self, param: IgnoreGlobalParam) -> bool {
        self.ignore_global_params.contains(&param)
    }
}

layer_builders!(EndpointDefinition);

/// The full engine configuration.
///
/// # Examples
///
/// ```
/// use apiengine::ApiConstants;
///
/// let constants = ApiConstants::from_json(r#"{
///     "baseUrl": "https://jsonplaceholder.typicode.com",
///     "globalParams": { "retryCondition": [404, 404, 404] },
///     "endpoints": {
///         "getPost": { "path": "/posts/{id}", "request": { "method": "GET" } }
///     }
/// }"#).unwrap();
///
/// assert!(constants.endpoints.unwrap().contains_key("getPost"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiConstants {
    /// Base URL prepended to every endpoint path.
    #[serde(default)]
    pub base_url: String,
    /// Defaults for every endpoint.
    #[serde(default)]
    pub global_params: GlobalParams,
    /// Endpoints by name. `None` means the map was never supplied.
    #[serde(default)]
    pub endpoints: Option<BTreeMap<String, EndpointDefinition>>,
}

impl ApiConstants {
    /// Creates a configuration with a base URL and no endpoint map.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }

    /// Sets the global parameters.
    pub fn global_params(mut self, global_params: GlobalParams) -> Self {
        self.global_params = global_params;
        self
    }

    /// Registers an endpoint, creating the endpoint map if needed.
    pub fn endpoint(mut self, name: impl Into<String>, endpoint: EndpointDefinition) -> Self {
        self.endpoints
            .get_or_insert_with(BTreeMap::new)
            .insert(name.into(), endpoint);
        self
    }

    /// Parses a JSON document.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| Error::ConfigurationError(format!("Invalid API constants: {}", e)))
    }

    /// Converts a JSON value.
    pub fn from_value(value: Value) -> Result<Self> {
        serde_json::from_value(value)
            .map_err(|e| Error::ConfigurationError(format!("Invalid API constants: {}", e)))
    }

    /// Checks the configuration before the engine is built.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigurationMissing`] when no endpoint map was supplied
    /// and [`Error::InvalidRetryConfiguration`] for negative retry counts.
    pub fn validate(&self) -> Result<()> {
        let endpoints = self.endpoints.as_ref().ok_or(Error::ConfigurationMissing)?;

        if let Some(retry) = self.global_params.retry.filter(|r| *r < 0) {
            return Err(Error::InvalidRetryConfiguration {
                endpoint: "globalParams".to_string(),
                retry,
            });
        }

        for (name, endpoint) in endpoints {
            if let Some(retry) = endpoint.retry.filter(|r| *r < 0) {
                return Err(Error::InvalidRetryConfiguration {
                    endpoint: name.clone(),
                    retry,
                });
            }
        }

        Ok(())
    }
}

/// Per-call parameters.
///
/// # Examples
///
/// ```
/// use apiengine::CallParameters;
///
/// let params = CallParameters::new()
///     .param("id", "1")
///     .header("Authorization", "Bearer token")
///     .body(serde_json::json!({ "title": "hello" }));
///
/// assert_eq!(params.path_query_parameters.len(), 1);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CallParameters {
    /// Values for path and query placeholders, in order.
    pub path_query_parameters: Vec<PathQueryParameter>,
    /// Headers overlaid on the configured ones.
    pub headers: HeaderBag,
    /// Body overlaid on (or deep-merged into) the configured one.
    pub body: Option<Body>,
}

impl CallParameters {
    /// Creates empty call parameters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an encoded placeholder value.
    pub fn param(mut self, name: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.path_query_parameters
            .push(PathQueryParameter::new(name, value));
        self
    }

    /// Adds a placeholder value injected verbatim.
    pub fn raw_param(mut self, name: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.path_query_parameters
            .push(PathQueryParameter::raw(name, value));
        self
    }

    /// Adds a header.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Sets the body.
    pub fn body(mut self, body: impl Into<Body>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub(crate) fn effective_body(&self) -> Option<&Body> {
        self.body.as_ref().filter(|b| !b.is_empty())
    }
}
