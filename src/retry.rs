//! Status-code driven retries.
//!
//! A call enters the retry loop only when its first attempt returns a status
//! listed in the endpoint's retry condition. The loop then makes up to
//! `retry` further attempts, one at a time, and stops at the first 2xx.
//!
//! ```text
//! NotStarted -> Attempting -> Resolved   (an attempt returned 2xx)
//!                          -> Exhausted  (retry budget spent)
//! ```

use crate::{
    config::Phase, interceptor::run_status_code_actions, merge::ResolvedRequest,
    response::Retries, transport::Attempt, Error, Result,
};
use std::future::Future;

/// Smallest valid `retry` value. `0` means "never retry".
pub const MIN_RETRY: i32 = 0;

/// Where the retry loop stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RetryState {
    /// No retry attempt made yet.
    #[default]
    NotStarted,
    /// Retry attempts in progress.
    Attempting,
    /// An attempt returned a 2xx status.
    Resolved,
    /// The retry budget was spent without a 2xx status.
    Exhausted,
}

/// Result of the retry loop.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryOutcome {
    /// Final state.
    pub state: RetryState,
    /// Retry history.
    pub retries: Retries,
    /// The last observed attempt (the first attempt if no retry was made).
    pub last: Attempt,
}

/// Runs the retry loop for `request`.
///
/// `first` is the attempt that triggered the loop; `attempt` performs one more
/// transport call. Each retry records its status into
/// [`Retries::conditions`] and runs the status-code actions registered for
/// the retry phase. Transport errors abort the loop immediately.
///
/// # Errors
///
/// Returns [`Error::InvalidRetryConfiguration`] if `request.retry` is below
/// [`MIN_RETRY`], and propagates errors from `attempt` and from actions.
pub async fn manage_retry<F, Fut>(
    request: &ResolvedRequest,
    first: Attempt,
    mut attempt: F,
) -> Result<RetryOutcome>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Attempt>>,
{
    if request.retry < MIN_RETRY {
        return Err(Error::InvalidRetryConfiguration {
            endpoint: request.name.clone(),
            retry: request.retry,
        });
    }

    let mut state = RetryState::NotStarted;
    let mut retries = Retries::default();
    let mut last = first;

    for index in 0..request.retry {
        state = RetryState::Attempting;

        let current = attempt().await?;
        let status = current.response.status;

        retries.quantity += 1;
        retries.conditions.push(status.as_u16());

        tracing::info!(
            endpoint = %request.name,
            retry = index + 1,
            max_retries = request.retry,
            status = status.as_u16(),
            "Retry attempt completed"
        );

        run_status_code_actions(&request.status_codes_actions, Phase::Retry, &current).await?;
        last = current;

        if status.is_success() {
            state = RetryState::Resolved;
            break;
        }
    }

    if state != RetryState::Resolved {
        state = RetryState::Exhausted;
        tracing::warn!(
            endpoint = %request.name,
            attempts = retries.quantity,
            status = last.response.status.as_u16(),
            "Retries exhausted"
        );
    }

    Ok(RetryOutcome {
        state,
        retries,
        last,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::StatusCodeAction, interceptor::Action, response::HttpResponse};
    use http::{HeaderMap, StatusCode};
    use serde_json::Value;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    fn attempt(status: u16) -> Attempt {
        Attempt {
            response: HttpResponse {
                status: StatusCode::from_u16(status).unwrap(),
                headers: HeaderMap::new(),
            },
            body: Value::Null,
        }
    }

    fn request(retry: i32) -> ResolvedRequest {
        ResolvedRequest {
            name: "test".to_string(),
            retry,
            retry_condition: vec![400, 404],
            ..Default::default()
        }
    }

    /// Returns a closure replaying `statuses` and a counter of calls made.
    fn scripted(
        statuses: &[u16],
    ) -> (
        impl FnMut() -> std::future::Ready<Result<Attempt>>,
        Arc<AtomicUsize>,
    ) {
        let queue = Arc::new(Mutex::new(statuses.iter().copied().collect::<VecDeque<_>>()));
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);

        let f = move || {
            counter.fetch_add(1, Ordering::SeqCst);
            let status = queue.lock().unwrap().pop_front().unwrap_or(200);
            std::future::ready(Ok(attempt(status)))
        };
        (f, calls)
    }

    #[tokio::test]
    async fn test_exhausts_budget() {
        let (f, calls) = scripted(&[404, 404, 404, 200]);
        let outcome = manage_retry(&request(3), attempt(404), f).await.unwrap();

        assert_eq!(outcome.state, RetryState::Exhausted);
        assert_eq!(outcome.retries.quantity, 3);
        assert_eq!(outcome.retries.conditions, vec![404, 404, 404]);
        assert_eq!(outcome.last.response.status, StatusCode::NOT_FOUND);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_stops_at_first_success() {
        let (f, calls) = scripted(&[404, 200, 404]);
        let outcome = manage_retry(&request(5), attempt(404), f).await.unwrap();

        assert_eq!(outcome.state, RetryState::Resolved);
        assert_eq!(outcome.retries.quantity, 2);
        assert_eq!(outcome.retries.conditions, vec![404, 200]);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_zero_retry_keeps_first_attempt() {
        let (f, calls) = scripted(&[200]);
        let outcome = manage_retry(&request(0), attempt(404), f).await.unwrap();

        assert_eq!(outcome.state, RetryState::Exhausted);
        assert_eq!(outcome.retries, Retries::default());
        assert_eq!(outcome.last.response.status, StatusCode::NOT_FOUND);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_negative_retry_is_rejected() {
        let (f, _) = scripted(&[]);
        let err = manage_retry(&request(-1), attempt(404), f).await.unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidRetryConfiguration { retry: -1, .. }
        ));
    }

    #[tokio::test]
    async fn test_transport_error_aborts_loop() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let f = move || {
            counter.fetch_add(1, Ordering::SeqCst);
            std::future::ready(Err(Error::Transport("connection reset".to_string())))
        };

        let err = manage_retry(&request(3), attempt(404), f).await.unwrap_err();
        assert!(err.is_transport_error());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retry_phase_actions_run_per_attempt() {
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);
        let action = Action::from_fn(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        let mut request = request(3);
        request.status_codes_actions = vec![
            StatusCodeAction::new(404, Phase::Retry, action.clone()),
            StatusCodeAction::new(404, Phase::FirstCall, action),
        ];

        let (f, _) = scripted(&[404, 404, 200]);
        let outcome = manage_retry(&request, attempt(404), f).await.unwrap();

        assert_eq!(outcome.retries.conditions, vec![404, 404, 200]);
        assert_eq!(seen.load(Ordering::SeqCst), 2);
    }
}
