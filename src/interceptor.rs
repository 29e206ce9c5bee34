//! Interceptors and actions.
//!
//! Every user callback in the engine is a [`Callback`]: a shared async function
//! from one input to a fallible output. Request interceptors rewrite the
//! resolved request before it is sent, response interceptors observe the final
//! result and contribute fields to
//! [`CallResult::interceptor_response`](crate::CallResult::interceptor_response),
//! and actions run when an attempt returns a given status code.
//!
//! # Examples
//!
//! ```
//! use apiengine::interceptor::{RequestInterceptor, ResponseInterceptor};
//! use serde_json::{json, Map};
//!
//! // Rewrite the path of every request.
//! let rewrite = RequestInterceptor::from_fn(|mut request| {
//!     request.path = "/posts/1".to_string();
//!     Ok(request)
//! });
//!
//! // Expose the status code to the caller.
//! let observe = ResponseInterceptor::new(|result| async move {
//!     let mut out = Map::new();
//!     out.insert("statusCode".into(), json!(result.response.status.as_u16()));
//!     Ok(Some(out))
//! });
//! # let _ = (rewrite, observe);
//! ```

use crate::{
    config::{ErrorMessage, Phase, StatusCodeAction},
    error::BoxError,
    merge::ResolvedRequest,
    response::{CallResult, ErrorStatus},
    transport::Attempt,
    Error, Result,
};
use futures::future::{self, BoxFuture};
use serde_json::{Map, Value};
use std::fmt;
use std::future::Future;
use std::sync::Arc;

type CallbackFn<I, O> =
    dyn Fn(I) -> BoxFuture<'static, std::result::Result<O, BoxError>> + Send + Sync;

/// A shared, possibly asynchronous, fallible callback.
///
/// Two callbacks compare equal when they are clones of the same registration.
pub struct Callback<I, O> {
    f: Arc<CallbackFn<I, O>>,
}

impl<I: 'static, O: Send + 'static> Callback<I, O> {
    /// Wraps an async function.
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<O, BoxError>> + Send + 'static,
    {
        Self {
            f: Arc::new(move |input| Box::pin(f(input))),
        }
    }

    /// Wraps a synchronous function.
    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn(I) -> std::result::Result<O, BoxError> + Send + Sync + 'static,
    {
        Self::new(move |input| future::ready(f(input)))
    }

    /// Invokes the callback.
    pub async fn call(&self, input: I) -> std::result::Result<O, BoxError> {
        (self.f)(input).await
    }
}

impl<I, O> Clone for Callback<I, O> {
    fn clone(&self) -> Self {
        Self {
            f: Arc::clone(&self.f),
        }
    }
}

impl<I, O> PartialEq for Callback<I, O> {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.f, &other.f)
    }
}

impl<I, O> fmt::Debug for Callback<I, O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callback").finish_non_exhaustive()
    }
}

/// Rewrites the resolved request before it is sent.
pub type RequestInterceptor = Callback<ResolvedRequest, ResolvedRequest>;

/// Observes the final result; a returned map is merged into the interceptor response.
pub type ResponseInterceptor = Callback<CallResult, Option<Map<String, Value>>>;

/// Runs when an attempt returns a configured status code.
pub type Action = Callback<Attempt, ()>;

/// Composes request interceptors into one, applied in order.
///
/// Each interceptor receives the output of the previous one. An empty list
/// yields the identity transform. The first failure aborts the chain.
pub fn compose_request_interceptors(interceptors: &[RequestInterceptor]) -> RequestInterceptor {
    let chain: Arc<[RequestInterceptor]> = interceptors.into();

    RequestInterceptor::new(move |mut request| {
        let chain = Arc::clone(&chain);
        async move {
            for interceptor in chain.iter() {
                request = interceptor.call(request).await?;
            }
            Ok(request)
        }
    })
}

/// Composes response interceptors into one producing the merged output.
///
/// Outputs are shallow-merged in order, later keys winning. `None` contributes
/// nothing. An empty list yields an empty map.
pub fn compose_response_interceptors(interceptors: &[ResponseInterceptor]) -> ResponseInterceptor {
    let chain: Arc<[ResponseInterceptor]> = interceptors.into();

    ResponseInterceptor::new(move |result| {
        let chain = Arc::clone(&chain);
        async move {
            let mut merged = Map::new();
            for interceptor in chain.iter() {
                if let Some(output) = interceptor.call(result.clone()).await? {
                    merged.extend(output);
                }
            }
            Ok(Some(merged))
        }
    })
}

/// Runs the action registered for the attempt's status code, if its phase covers `phase`.
///
/// Only the first action for a status code is considered.
pub(crate) async fn run_status_code_actions(
    actions: &[StatusCodeAction],
    phase: Phase,
    attempt: &Attempt,
) -> Result<()> {
    let status = attempt.response.status.as_u16();

    let Some(entry) = actions.iter().find(|a| a.status_code == status) else {
        return Ok(());
    };
    if !entry.phase.covers(phase) {
        return Ok(());
    }

    tracing::debug!(status = status, phase = ?phase, "Running status code action");
    entry
        .action
        .call(attempt.clone())
        .await
        .map_err(Error::Interceptor)
}

/// Matches the attempt against the configured error messages.
///
/// The first message for the status code wins; its action, if any, runs here.
pub(crate) async fn lookup_error_status(
    messages: &[ErrorMessage],
    attempt: &Attempt,
) -> Result<ErrorStatus> {
    let status = attempt.response.status;
    let matched = messages.iter().find(|m| m.status_code == status.as_u16());

    let Some(message) = matched else {
        return Ok(ErrorStatus::default());
    };

    if let Some(action) = &message.action {
        action
            .call(attempt.clone())
            .await
            .map_err(Error::ErrorMessageAction)?;
    }

    Ok(ErrorStatus {
        is_error: true,
        code: Some(message.code.clone()),
        message: Some(message.message.clone()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        response::{HttpResponse, Retries},
        ResolvedRequest,
    };
    use http::{HeaderMap, StatusCode};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn attempt(status: u16) -> Attempt {
        Attempt {
            response: HttpResponse {
                status: StatusCode::from_u16(status).unwrap(),
                headers: HeaderMap::new(),
            },
            body: Value::Null,
        }
    }

    fn call_result() -> CallResult {
        let attempt = attempt(200);
        CallResult {
            request: ResolvedRequest::default(),
            response: attempt.response,
            response_body: json!({ "id": 1 }),
            retries: Retries::default(),
            error_status: ErrorStatus::default(),
            interceptor_response: Map::new(),
        }
    }

    #[tokio::test]
    async fn test_request_chain_threads_output_in_order() {
        let first = RequestInterceptor::from_fn(|mut r: ResolvedRequest| {
            r.path = "/posts/1".to_string();
            r.retry = 1;
            Ok(r)
        });
        let second = RequestInterceptor::new(|mut r: ResolvedRequest| async move {
            r.path.push_str("/comments");
            Ok(r)
        });

        let chain = compose_request_interceptors(&[first, second]);
        let out = chain.call(ResolvedRequest::default()).await.unwrap();

        assert_eq!(out.path, "/posts/1/comments");
        assert_eq!(out.retry, 1);
    }

    #[tokio::test]
    async fn test_empty_request_chain_is_identity() {
        let request = ResolvedRequest {
            path: "/same".to_string(),
            ..Default::default()
        };
        let out = compose_request_interceptors(&[])
            .call(request.clone())
            .await
            .unwrap();
        assert_eq!(out, request);
    }

    #[tokio::test]
    async fn test_request_chain_aborts_on_failure() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counted = Arc::clone(&calls);

        let failing = RequestInterceptor::from_fn(|_| Err("nope".into()));
        let never = RequestInterceptor::from_fn(move |r| {
            counted.fetch_add(1, Ordering::SeqCst);
            Ok(r)
        });

        let err = compose_request_interceptors(&[failing, never])
            .call(ResolvedRequest::default())
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "nope");
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_response_chain_merges_outputs() {
        let global = ResponseInterceptor::from_fn(|result: CallResult| {
            let mut out = Map::new();
            out.insert("statusCode".into(), json!(result.response.status.as_u16()));
            out.insert("source".into(), json!("global"));
            Ok(Some(out))
        });
        let silent = ResponseInterceptor::from_fn(|_| Ok(None));
        let endpoint = ResponseInterceptor::new(|_| async {
            let mut out = Map::new();
            out.insert("source".into(), json!("endpoint"));
            Ok(Some(out))
        });

        let merged = compose_response_interceptors(&[global, silent, endpoint])
            .call(call_result())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(merged["statusCode"], json!(200));
        assert_eq!(merged["source"], json!("endpoint"));
    }

    #[tokio::test]
    async fn test_empty_response_chain_yields_empty_map() {
        let merged = compose_response_interceptors(&[])
            .call(call_result())
            .await
            .unwrap();
        assert_eq!(merged, Some(Map::new()));
    }

    #[tokio::test]
    async fn test_status_code_actions_respect_phase() {
        let calls = Arc::new(AtomicUsize::new(0));
        let make = |weight: usize| {
            let calls = Arc::clone(&calls);
            Action::from_fn(move |_| {
                calls.fetch_add(weight, Ordering::SeqCst);
                Ok(())
            })
        };

        let actions = vec![
            StatusCodeAction::new(404, Phase::Retry, make(1)),
            StatusCodeAction::new(404, Phase::FirstCall, make(10)),
            StatusCodeAction::new(500, Phase::Any, make(100)),
        ];

        // The first 404 action is retry-only, so a first call runs nothing.
        run_status_code_actions(&actions, Phase::FirstCall, &attempt(404))
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        run_status_code_actions(&actions, Phase::Retry, &attempt(404))
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        run_status_code_actions(&actions, Phase::FirstCall, &attempt(500))
            .await
            .unwrap();
        run_status_code_actions(&actions, Phase::Retry, &attempt(500))
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 201);

        run_status_code_actions(&actions, Phase::FirstCall, &attempt(200))
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 201);
    }

    #[tokio::test]
    async fn test_error_status_lookup() {
        let messages = vec![ErrorMessage::new(404, "NOT_FOUND", "Resource not found")];

        let status = lookup_error_status(&messages, &attempt(404)).await.unwrap();
        assert!(status.is_error);
        assert_eq!(status.code.as_deref(), Some("NOT_FOUND"));
        assert_eq!(status.message.as_deref(), Some("Resource not found"));

        let status = lookup_error_status(&messages, &attempt(200)).await.unwrap();
        assert!(!status.is_error);
        assert_eq!(status.code, None);

        // Unconfigured statuses are not classified, even 5xx.
        let status = lookup_error_status(&messages, &attempt(500)).await.unwrap();
        assert!(!status.is_error);
        assert_eq!(status.code, None);

        let status = lookup_error_status(&[], &attempt(500)).await.unwrap();
        assert_eq!(status, ErrorStatus::default());
    }

    #[tokio::test]
    async fn test_error_message_action_failure_is_wrapped() {
        let messages = vec![ErrorMessage::new(404, "NOT_FOUND", "Missing")
            .with_action(Action::from_fn(|_| Err("action blew up".into())))];

        let err = lookup_error_status(&messages, &attempt(404))
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Error executing errorMessage action: action blew up"
        );
    }
}
