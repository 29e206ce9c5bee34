//! Resolution of an endpoint into the request actually sent.
//!
//! Precedence is call-time parameters over the endpoint definition over the
//! global parameters. A category listed in the endpoint's
//! `ignore_global_params` skips the global layer entirely.

use crate::{
    config::{
        ApiConstants, Body, CallParameters, ErrorMessage, HeaderBag, IgnoreGlobalParam,
        RequestConfig, StatusCodeAction,
    },
    interceptor::{RequestInterceptor, ResponseInterceptor},
    template::{build_url, PathQueryParameter},
    Error, Result,
};
use http::{Method, StatusCode};
use serde_json::{Map, Value};

/// The effective request for one call.
///
/// Computed fresh for every call and never cached, so call-time data cannot
/// leak from one call to the next.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedRequest {
    /// The endpoint name.
    pub name: String,
    /// Base URL (endpoint override or engine base URL).
    pub base_url: String,
    /// Path template.
    pub path: String,
    /// HTTP method. Defaults to GET.
    pub method: Method,
    /// Merged headers, keys lowercased.
    pub headers: HeaderBag,
    /// Merged body.
    pub body: Option<Body>,
    /// Maximum number of retries.
    pub retry: i32,
    /// Status codes that trigger a retry, duplicates kept.
    pub retry_condition: Vec<u16>,
    /// Status-code actions.
    pub status_codes_actions: Vec<StatusCodeAction>,
    /// Error messages.
    pub error_messages: Vec<ErrorMessage>,
    /// Extra properties attached to stack trace entries.
    pub stack_trace_extra_params: Map<String, Value>,
    /// Opaque pass-through parameters.
    pub extra_params: Map<String, Value>,
    /// Request interceptors, global first.
    pub request_interceptors: Vec<RequestInterceptor>,
    /// Response interceptors, global first.
    pub response_interceptors: Vec<ResponseInterceptor>,
}

impl ResolvedRequest {
    /// Builds the URL for this request.
    pub fn url(&self, parameters: &[PathQueryParameter]) -> String {
        build_url(&self.base_url, &self.path, parameters)
    }

    /// Returns `true` if `status` is listed in the retry condition.
    pub fn should_retry(&self, status: StatusCode) -> bool {
        self.retry_condition.iter().any(|code| *code == status.as_u16())
    }
}

/// Recursively merges `overlay` into `target`, overlay winning per key.
fn deep_merge(target: &mut Map<String, Value>, overlay: &Map<String, Value>) {
    for (key, value) in overlay {
        match (target.get_mut(key), value) {
            (Some(Value::Object(existing)), Value::Object(incoming)) => {
                deep_merge(existing, incoming)
            }
            _ => {
                target.insert(key.clone(), value.clone());
            }
        }
    }
}

/// Two JSON objects are deep-merged; anything else is replaced by `overlay`.
fn merge_body(base: Option<Body>, overlay: &Body) -> Body {
    match (base, overlay) {
        (Some(Body::Json(Value::Object(mut merged))), Body::Json(Value::Object(incoming))) => {
            deep_merge(&mut merged, incoming);
            Body::Json(Value::Object(merged))
        }
        _ => overlay.clone(),
    }
}

fn merge_request(
    layers: &[&RequestConfig],
    params: &CallParameters,
) -> (Method, HeaderBag, Option<Body>) {
    let method = layers
        .iter()
        .rev()
        .find_map(|layer| layer.method.clone())
        .unwrap_or_default();

    let headers = layers
        .iter()
        .flat_map(|layer| layer.headers.iter())
        .chain(params.headers.iter())
        .map(|(name, value)| (name.to_ascii_lowercase(), value.clone()))
        .collect();

    let body = layers
        .iter()
        .filter_map(|layer| layer.body.as_ref())
        .chain(params.effective_body())
        .fold(None, |acc, body| Some(merge_body(acc, body)));

    (method, headers, body)
}

/// Global entries whose status code the endpoint redefines are dropped.
fn override_by_status_code<T: Clone>(global: &[T], endpoint: &[T], code: fn(&T) -> u16) -> Vec<T> {
    global
        .iter()
        .filter(|g| !endpoint.iter().any(|e| code(e) == code(g)))
        .chain(endpoint)
        .cloned()
        .collect()
}

fn overlay_map(global: &Map<String, Value>, endpoint: &Map<String, Value>) -> Map<String, Value> {
    let mut merged = global.clone();
    merged.extend(endpoint.iter().map(|(k, v)| (k.clone(), v.clone())));
    merged
}

impl ApiConstants {
    /// Resolves the named endpoint against the global parameters and the call parameters.
    ///
    /// Pure: the same inputs always produce the same output.
    ///
    /// # Errors
    ///
    /// - [`Error::ConfigurationMissing`] if no endpoint map was supplied
    /// - [`Error::EndpointNotFound`] for an unknown name
    /// - [`Error::MissingRequestParameter`] if neither the endpoint nor the
    ///   global parameters configure a request
    ///
    /// # Examples
    ///
    /// ```
    /// use apiengine::{ApiConstants, CallParameters, EndpointDefinition, GlobalParams};
    /// use http::Method;
    ///
    /// let constants = ApiConstants::new("https://example.com")
    ///     .global_params(
    ///         GlobalParams::new()
    ///             .method(Method::GET)
    ///             .retry_condition([404, 404, 404]),
    ///     )
    ///     .endpoint("posts", EndpointDefinition::new("/posts").retry_condition([400]));
    ///
    /// let resolved = constants.resolve("posts", &CallParameters::new()).unwrap();
    /// assert_eq!(resolved.retry_condition, vec![404, 404, 404, 400]);
    /// assert_eq!(resolved.method, Method::GET);
    /// ```
    pub fn resolve(&self, name: &str, params: &CallParameters) -> Result<ResolvedRequest> {
        let endpoints = self.endpoints.as_ref().ok_or(Error::ConfigurationMissing)?;
        let endpoint = endpoints
            .get(name)
            .ok_or_else(|| Error::EndpointNotFound(name.to_string()))?;
        let global = &self.global_params;

        if endpoint.request.is_empty() && global.request.is_empty() {
            return Err(Error::MissingRequestParameter {
                endpoint: name.to_string(),
            });
        }

        let ignores = |param| endpoint.ignores(param);

        let (method, headers, body) = if ignores(IgnoreGlobalParam::Request) {
            merge_request(&[&endpoint.request], params)
        } else {
            merge_request(&[&global.request, &endpoint.request], params)
        };

        let retry = if ignores(IgnoreGlobalParam::Retry) {
            endpoint.retry.unwrap_or(0)
        } else {
            endpoint.retry.or(global.retry).unwrap_or(0)
        };

        let retry_condition = if ignores(IgnoreGlobalParam::RetryCondition) {
            endpoint.retry_condition.clone()
        } else {
            [global.retry_condition.as_slice(), endpoint.retry_condition.as_slice()].concat()
        };

        let status_codes_actions = if ignores(IgnoreGlobalParam::StatusCodesActions) {
            endpoint.status_codes_actions.clone()
        } else {
            override_by_status_code(
                &global.status_codes_actions,
                &endpoint.status_codes_actions,
                |a| a.status_code,
            )
        };

        let error_messages = if ignores(IgnoreGlobalParam::ErrorMessages) {
            endpoint.error_messages.clone()
        } else {
            override_by_status_code(&global.error_messages, &endpoint.error_messages, |m| {
                m.status_code
            })
        };

        let stack_trace_extra_params = if ignores(IgnoreGlobalParam::StackTraceLogExtraParams) {
            endpoint.stack_trace_log_extra_params.clone()
        } else {
            overlay_map(
                &global.stack_trace_log_extra_params,
                &endpoint.stack_trace_log_extra_params,
            )
        };

        let extra_params = if ignores(IgnoreGlobalParam::ExtraParams) {
            endpoint.extra_params.clone()
        } else {
            overlay_map(&global.extra_params, &endpoint.extra_params)
        };

        let request_interceptors = if ignores(IgnoreGlobalParam::RequestInterceptor) {
            endpoint.request_interceptor.iter().cloned().collect()
        } else {
            global
                .request_interceptor
                .iter()
                .chain(&endpoint.request_interceptor)
                .cloned()
                .collect()
        };

        let response_interceptors = if ignores(IgnoreGlobalParam::ResponseInterceptor) {
            endpoint.response_interceptor.iter().cloned().collect()
        } else {
            global
                .response_interceptor
                .iter()
                .chain(&endpoint.response_interceptor)
                .cloned()
                .collect()
        };

        Ok(ResolvedRequest {
            name: name.to_string(),
            base_url: endpoint
                .base_url
                .clone()
                .unwrap_or_else(|| self.base_url.clone()),
            path: endpoint.path.clone(),
            method,
            headers,
            body,
            retry,
            retry_condition,
            status_codes_actions,
            error_messages,
            stack_trace_extra_params,
            extra_params,
            request_interceptors,
            response_interceptors,
        })
    }
}
