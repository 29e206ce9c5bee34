//! Error types for endpoint resolution and calls.
//!
//! Every failure of [`ApiEngine::call`](crate::ApiEngine::call) surfaces as one of
//! these variants. A response with a non-2xx status is *not* an error: inspect
//! [`CallResult::is_success`](crate::CallResult::is_success) for that.

/// Boxed error returned by user-supplied callbacks (interceptors and actions).
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// The main error type for the engine.
///
/// # Examples
///
/// ```no_run
/// use apiengine::{ApiEngine, ApiConstants, Error};
///
/// # async fn example(constants: ApiConstants) -> Result<(), Error> {
/// let engine = ApiEngine::new(constants)?;
///
/// match engine.call("getUser", None).await {
///     Ok(result) => println!("status {}", result.response.status),
///     Err(Error::EndpointNotFound(name)) => eprintln!("no endpoint called {}", name),
///     Err(e) => eprintln!("call failed: {}", e),
/// }
/// # Ok(())
/// # }
/// ```
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The engine was constructed without an endpoint map.
    #[error("Error on API constructor: apiConstants not defined.")]
    ConfigurationMissing,

    /// The requested endpoint name is not registered.
    #[error("Api type not defined: {0}")]
    EndpointNotFound(String),

    /// Neither the endpoint nor the global parameters declare any request shape.
    #[error("Request parameter not defined for endpoint {endpoint}")]
    MissingRequestParameter {
        /// The endpoint being resolved
        endpoint: String,
    },

    /// The resolved `retry` count is below the valid minimum.
    #[error("Invalid retry configuration for endpoint {endpoint}: retry = {retry} (must be >= 0)")]
    InvalidRetryConfiguration {
        /// The endpoint being resolved
        endpoint: String,
        /// The offending retry count
        retry: i32,
    },

    /// A network-level error from the default reqwest transport.
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// A network-level error reported by an injected transport.
    #[error("Transport error: {0}")]
    Transport(String),

    /// A request interceptor, response interceptor or status-code action failed.
    ///
    /// The original message is kept as-is.
    #[error("{0}")]
    Interceptor(BoxError),

    /// An action attached to an error message failed.
    #[error("Error executing errorMessage action: {0}")]
    ErrorMessageAction(BoxError),

    /// Invalid configuration (bad header, bad method, malformed JSON document).
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// The built URL could not be parsed.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

impl Error {
    /// Returns `true` for errors caused by the engine configuration rather than by a call.
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            Error::ConfigurationMissing
                | Error::MissingRequestParameter { .. }
                | Error::InvalidRetryConfiguration { .. }
                | Error::ConfigurationError(_)
        )
    }

    /// Returns `true` if the error came from the network layer.
    pub fn is_transport_error(&self) -> bool {
        matches!(self, Error::Network(_) | Error::Transport(_))
    }

    /// Returns the endpoint name attached to this error, if any.
    pub fn endpoint(&self) -> Option<&str> {
        match self {
            Error::EndpointNotFound(name) => Some(name),
            Error::MissingRequestParameter { endpoint } => Some(endpoint),
            Error::InvalidRetryConfiguration { endpoint, .. } => Some(endpoint),
            _ => None,
        }
    }
}

/// A specialized `Result` type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;
