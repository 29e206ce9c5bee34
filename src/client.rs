//! The call orchestrator.
//!
//! [`ApiEngine`] is the main entry point. Build one from an [`ApiConstants`]
//! map with [`ApiEngine::new`] or [`ApiEngineBuilder`], then invoke endpoints
//! by name with [`ApiEngine::call`].

use crate::{
    config::{ApiConstants, CallParameters, Phase},
    interceptor::{
        compose_request_interceptors, compose_response_interceptors, lookup_error_status,
        run_status_code_actions,
    },
    response::{CallResult, Retries},
    retry::manage_retry,
    stack_trace::{StackTraceEntry, StackTraceLog},
    transport::{Invoker, ReqwestTransport, Transport, TransportRequest},
    Error, Result,
};
use serde_json::Map;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// A configurable HTTP request engine.
///
/// The engine is cheap to clone; clones share the configuration, the
/// transport and the stack trace log.
///
/// # Examples
///
/// ```no_run
/// use apiengine::{ApiConstants, ApiEngine, CallParameters, EndpointDefinition, GlobalParams};
/// use http::Method;
///
/// # async fn example() -> Result<(), apiengine::Error> {
/// let constants = ApiConstants::new("https://jsonplaceholder.typicode.com")
///     .global_params(GlobalParams::new().header("accept", "application/json"))
///     .endpoint(
///         "getPost",
///         EndpointDefinition::new("/posts/{id}")
///             .method(Method::GET)
///             .retry(2)
///             .retry_condition([500, 503]),
///     );
///
/// let engine = ApiEngine::new(constants)?;
///
/// let result = engine
///     .call("getPost", Some(CallParameters::new().param("id", "1")))
///     .await?;
/// println!("{} after {} retries", result.response.status, result.retries.quantity);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct ApiEngine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    constants: ApiConstants,
    transport: Arc<dyn Transport>,
    log: StackTraceLog,
}

impl ApiEngine {
    /// Creates an engine with the default reqwest transport.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigurationMissing`] if `constants` has no endpoint
    /// map and [`Error::InvalidRetryConfiguration`] for negative retry counts.
    pub fn new(constants: ApiConstants) -> Result<Self> {
        Self::builder().constants(constants).build()
    }

    /// Creates a new `ApiEngineBuilder`.
    pub fn builder() -> ApiEngineBuilder {
        ApiEngineBuilder::new()
    }

    /// Returns the configuration the engine was built with.
    pub fn constants(&self) -> &ApiConstants {
        &self.inner.constants
    }

    /// Returns every configured endpoint name mapped to itself.
    ///
    /// ```
    /// use apiengine::{ApiConstants, ApiEngine, EndpointDefinition};
    /// use http::Method;
    ///
    /// let engine = ApiEngine::new(
    ///     ApiConstants::new("https://example.com")
    ///         .endpoint("getPosts", EndpointDefinition::new("/posts").method(Method::GET)),
    /// )
    /// .unwrap();
    ///
    /// assert_eq!(engine.endpoint_names()["getPosts"], "getPosts");
    /// ```
    pub fn endpoint_names(&self) -> BTreeMap<String, String> {
        self.inner
            .constants
            .endpoints
            .iter()
            .flatten()
            .map(|(name, _)| (name.clone(), name.clone()))
            .collect()
    }

    /// Returns a snapshot of every transport attempt made so far, oldest first.
    pub fn stack_trace_log(&self) -> Vec<StackTraceEntry> {
        self.inner.log.entries()
    }

    /// Calls the named endpoint.
    ///
    /// The pipeline runs strictly in order:
    ///
    /// 1. resolve the endpoint against the global and call parameters
    /// 2. run the request interceptors
    /// 3. build the URL and send the first attempt
    /// 4. run first-call status-code actions
    /// 5. retry while the first status is in the retry condition
    /// 6. look up the error status of the final response
    /// 7. run the response interceptors
    ///
    /// A non-2xx response is returned as `Ok`; check [`CallResult::is_success`],
    /// or [`CallResult::error_status`] for statuses with a configured error message.
    ///
    /// # Errors
    ///
    /// Resolution errors, transport errors, interceptor and action failures,
    /// and [`Error::InvalidRetryConfiguration`] when the retry path is entered
    /// with a negative retry count.
    pub async fn call(
        &self,
        name: &str,
        parameters: Option<CallParameters>,
    ) -> Result<CallResult> {
        let parameters = parameters.unwrap_or_default();
        let resolved = self.inner.constants.resolve(name, &parameters)?;

        let request_chain = compose_request_interceptors(&resolved.request_interceptors);
        let request = request_chain
            .call(resolved)
            .await
            .map_err(Error::Interceptor)?;

        let url = request.url(&parameters.path_query_parameters);
        let transport_request = TransportRequest::from_resolved(&request);
        let extra_properties = &request.stack_trace_extra_params;

        tracing::debug!(endpoint = %name, url = %url, "Calling endpoint");

        let invoker = Invoker {
            transport: self.inner.transport.as_ref(),
            log: &self.inner.log,
        };

        let first = invoker
            .invoke(&url, &transport_request, extra_properties)
            .await?;
        run_status_code_actions(&request.status_codes_actions, Phase::FirstCall, &first).await?;

        let (last, retries) = if request.should_retry(first.response.status) {
            tracing::info!(
                endpoint = %name,
                status = first.response.status.as_u16(),
                max_retries = request.retry,
                "Status matches retry condition"
            );

            let outcome = manage_retry(&request, first, || {
                invoker.invoke(&url, &transport_request, extra_properties)
            })
            .await?;
            (outcome.last, outcome.retries)
        } else {
            (first, Retries::default())
        };

        let error_status = lookup_error_status(&request.error_messages, &last).await?;

        let response_chain = compose_response_interceptors(&request.response_interceptors);
        let mut result = CallResult {
            request,
            response: last.response,
            response_body: last.body,
            retries,
            error_status,
            interceptor_response: Map::new(),
        };

        if let Some(output) = response_chain
            .call(result.clone())
            .await
            .map_err(Error::Interceptor)?
        {
            result.interceptor_response = output;
        }

        tracing::debug!(
            endpoint = %name,
            status = result.response.status.as_u16(),
            retries = result.retries.quantity,
            is_error = result.error_status.is_error,
            "Call completed"
        );

        Ok(result)
    }
}

impl fmt::Debug for ApiEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiEngine")
            .field("base_url", &self.inner.constants.base_url)
            .field("endpoints", &self.endpoint_names().len())
            .field("log", &self.inner.log)
            .finish()
    }
}

/// Builder for configuring and creating an [`ApiEngine`].
///
/// # Examples
///
/// ```no_run
/// use apiengine::{ApiConstants, ApiEngineBuilder};
/// use std::time::Duration;
///
/// # fn example(constants: ApiConstants) -> Result<(), apiengine::Error> {
/// let engine = ApiEngineBuilder::new()
///     .constants(constants)
///     .timeout(Duration::from_secs(30))
///     .on_stack_trace(|entry| {
///         println!("{} {} -> {:?}", entry.request_method, entry.request_url, entry.status_code);
///     })
///     .build()?;
/// # Ok(())
/// # }
/// ```
pub struct ApiEngineBuilder {
    constants: Option<ApiConstants>,
    transport: Option<Arc<dyn Transport>>,
    timeout: Option<Duration>,
    on_stack_trace: Option<Arc<dyn Fn(&StackTraceEntry) + Send + Sync>>,
}

impl ApiEngineBuilder {
    /// Creates a new `ApiEngineBuilder` with default settings.
    pub fn new() -> Self {
        Self {
            constants: None,
            transport: None,
            timeout: None,
            on_stack_trace: None,
        }
    }

    /// Sets the configuration.
    pub fn constants(mut self, constants: ApiConstants) -> Self {
        self.constants = Some(constants);
        self
    }

    /// Replaces the default reqwest transport.
    pub fn transport(mut self, transport: impl Transport + 'static) -> Self {
        self.transport = Some(Arc::new(transport));
        self
    }

    /// Sets the request timeout of the default transport.
    ///
    /// Ignored when a custom transport is supplied.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Registers a callback invoked with every new stack trace entry.
    pub fn on_stack_trace<F>(mut self, observer: F) -> Self
    where
        F: Fn(&StackTraceEntry) + Send + Sync + 'static,
    {
        self.on_stack_trace = Some(Arc::new(observer));
        self
    }

    /// Builds the configured `ApiEngine`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigurationMissing`] if no configuration or no
    /// endpoint map was supplied, [`Error::InvalidRetryConfiguration`] for
    /// negative retry counts, and [`Error::ConfigurationError`] if the default
    /// transport cannot be created.
    pub fn build(self) -> Result<ApiEngine> {
        let constants = self.constants.ok_or(Error::ConfigurationMissing)?;
        constants.validate()?;

        let transport: Arc<dyn Transport> = match self.transport {
            Some(transport) => transport,
            None => {
                let mut transport = ReqwestTransport::new()?;
                if let Some(timeout) = self.timeout {
                    transport = transport.with_timeout(timeout);
                }
                Arc::new(transport)
            }
        };

        let log = match self.on_stack_trace {
            Some(observer) => StackTraceLog::with_observer(observer),
            None => StackTraceLog::new(),
        };

        Ok(ApiEngine {
            inner: Arc::new(EngineInner {
                constants,
                transport,
                log,
            }),
        })
    }
}

impl Default for ApiEngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}
