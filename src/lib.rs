//! # apiengine - A configurable HTTP request engine
//!
//! apiengine turns a declarative map of named endpoints into HTTP calls. Each
//! endpoint describes a path template, a request shape and a retry policy;
//! global parameters supply defaults for every endpoint. At call time the
//! engine merges the layers, substitutes path and query parameters, sends the
//! request, retries on configured status codes and records every attempt in a
//! stack trace log.
//!
//! ## Quick Start
//!
//! ```no_run
//! use apiengine::{ApiConstants, ApiEngine, CallParameters};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), apiengine::Error> {
//!     let constants = ApiConstants::from_json(r#"{
//!         "baseUrl": "https://jsonplaceholder.typicode.com",
//!         "globalParams": {
//!             "request": { "headers": { "accept": "application/json" } },
//!             "retry": 3,
//!             "retryCondition": [500, 502, 503]
//!         },
//!         "endpoints": {
//!             "getPost": { "path": "/posts/{id}", "request": { "method": "GET" } },
//!             "searchPosts": {
//!                 "path": "/posts?userId={userId}&title={title}",
//!                 "request": { "method": "GET" }
//!             }
//!         }
//!     }"#)?;
//!
//!     let engine = ApiEngine::new(constants)?;
//!
//!     let post = engine
//!         .call("getPost", Some(CallParameters::new().param("id", "1")))
//!         .await?;
//!     println!("{}: {}", post.response.status, post.response_body);
//!
//!     // Unfilled query placeholders are dropped: GET /posts?userId=1
//!     let posts = engine
//!         .call("searchPosts", Some(CallParameters::new().param("userId", "1")))
//!         .await?;
//!     println!("retried {} times", posts.retries.quantity);
//!
//!     for entry in engine.stack_trace_log() {
//!         println!("{} {} -> {:?}", entry.request_method, entry.request_url, entry.status_code);
//!     }
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - **Declarative endpoints** - Load the endpoint map from JSON or build it in code
//! - **Layered merging** - Global defaults, endpoint values and call parameters, with per-endpoint opt-outs
//! - **URL templating** - Percent-encoded path and query placeholders, empty query segments removed
//! - **Status-code retries** - Bounded retry loop driven by a list of status codes
//! - **Interceptors and actions** - Async callbacks that rewrite requests, observe results or react to status codes
//! - **Stack trace log** - One entry per physical attempt, readable or pushed to an observer
//! - **Pluggable transport** - `reqwest` by default, any [`transport::Transport`] for tests
//!
//! ## Error Handling
//!
//! A non-2xx status is not an error. The call returns a [`CallResult`]; its
//! [`ErrorStatus`] is set when the status matches a configured error message:
//!
//! ```no_run
//! use apiengine::{ApiEngine, Error};
//!
//! # async fn example(engine: ApiEngine) {
//! match engine.call("getPost", None).await {
//!     Ok(result) if result.error_status.is_error => {
//!         eprintln!(
//!             "{} {:?}: {:?}",
//!             result.response.status, result.error_status.code, result.error_status.message
//!         );
//!     }
//!     Ok(result) => println!("Success: {}", result.response_body),
//!     Err(Error::EndpointNotFound(name)) => eprintln!("Unknown endpoint {}", name),
//!     Err(e) => eprintln!("Call failed: {}", e),
//! }
//! # }
//! ```
//!
//! ## Interceptors
//!
//! ```no_run
//! use apiengine::{ApiConstants, ApiEngine, EndpointDefinition, Phase};
//! use apiengine::interceptor::{Action, RequestInterceptor};
//! use http::Method;
//!
//! # fn example() -> Result<(), apiengine::Error> {
//! let endpoint = EndpointDefinition::new("/posts")
//!     .method(Method::GET)
//!     .request_interceptor(RequestInterceptor::from_fn(|request| {
//!         let mut request = request;
//!         request.headers.insert("x-request-id".into(), "42".into());
//!         Ok(request)
//!     }))
//!     .status_code_action(401, Phase::FirstCall, Action::from_fn(|_| {
//!         eprintln!("token expired");
//!         Ok(())
//!     }));
//!
//! let engine = ApiEngine::new(ApiConstants::new("https://example.com").endpoint("posts", endpoint))?;
//! # let _ = engine;
//! # Ok(())
//! # }
//! ```

mod client;
pub mod config;
mod error;
pub mod interceptor;
mod merge;
mod response;
pub mod retry;
pub mod stack_trace;
pub mod template;
pub mod transport;

pub use client::{ApiEngine, ApiEngineBuilder};
pub use config::{
    ApiConstants, Body, CallParameters, EndpointDefinition, ErrorMessage, GlobalParams,
    IgnoreGlobalParam, Phase, RequestConfig,
};
pub use error::{BoxError, Error, Result};
pub use merge::ResolvedRequest;
pub use response::{CallResult, ErrorStatus, HttpResponse, Retries};
pub use stack_trace::{StackTraceEntry, StackTraceLog};
