//! Bounded retry, failover and deadline enforcement.
//!
//! A logical request moves through
//! `Pending -> Trying(endpoint) -> {Success | TransientFailure -> Trying(next) | PermanentFailure | Exhausted}`.
//! Only transient failures move on to another endpoint. Each attempt runs
//! under `min(attempt timeout, remaining deadline)`; an attempt that runs
//! out of time is dropped, which discards any connection it held.

use std::collections::HashSet;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, warn};

use crate::config::{FailoverMode, RetryPolicy, ServerEndpoint};
use crate::error::{DirectoryError, DirectoryResult};
use crate::selector::ServerSelector;

/// State of one logical request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestState {
    /// Not started.
    Pending,
    /// An attempt is running against the endpoint.
    Trying {
        /// Endpoint name.
        endpoint: String,
        /// 1-based attempt number.
        attempt: u32,
    },
    /// The last attempt failed transiently.
    TransientFailure,
    /// The request succeeded.
    Success,
    /// The request failed with a non-transient error.
    PermanentFailure,
    /// Attempts, deadline or candidates ran out.
    Exhausted,
}

impl RequestState {
    /// Returns true for terminal states.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::PermanentFailure | Self::Exhausted)
    }
}

impl fmt::Display for RequestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => f.write_str("pending"),
            Self::Trying { endpoint, attempt } => write!(f, "trying({endpoint}, #{attempt})"),
            Self::TransientFailure => f.write_str("transient_failure"),
            Self::Success => f.write_str("success"),
            Self::PermanentFailure => f.write_str("permanent_failure"),
            Self::Exhausted => f.write_str("exhausted"),
        }
    }
}

/// Runs operations with retry and failover across endpoints.
#[derive(Debug)]
pub struct RetryCoordinator {
    selector: Arc<ServerSelector>,
    policy: RetryPolicy,
}

impl RetryCoordinator {
    /// Creates a coordinator.
    #[must_use]
    pub const fn new(selector: Arc<ServerSelector>, policy: RetryPolicy) -> Self {
        Self { selector, policy }
    }

    /// Returns the retry policy.
    #[must_use]
    pub const fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Returns the selector.
    #[must_use]
    pub fn selector(&self) -> &Arc<ServerSelector> {
        &self.selector
    }

    /// Runs `operation` under the configured policy.
    ///
    /// In [`FailoverMode::NextRequest`] a single attempt is made; a
    /// transient failure demotes the endpoint for later requests.
    ///
    /// ## Errors
    ///
    /// Returns the first permanent error, or the last transient error once
    /// attempts, deadline or candidates run out.
    pub async fn execute<T, F, Fut>(&self, operation: &str, op: F) -> DirectoryResult<T>
    where
        F: FnMut(Arc<ServerEndpoint>) -> Fut,
        Fut: Future<Output = DirectoryResult<T>>,
    {
        let max_attempts = match self.policy.failover {
            FailoverMode::Transparent => self.policy.max_attempts,
            FailoverMode::NextRequest => 1,
        };
        self.execute_with(operation, max_attempts, self.policy.deadline(), op)
            .await
    }

    /// Runs `operation` with explicit attempt and deadline bounds.
    ///
    /// ## Errors
    ///
    /// See [`RetryCoordinator::execute`].
    pub async fn execute_with<T, F, Fut>(
        &self,
        operation: &str,
        max_attempts: u32,
        deadline: Duration,
        mut op: F,
    ) -> DirectoryResult<T>
    where
        F: FnMut(Arc<ServerEndpoint>) -> Fut,
        Fut: Future<Output = DirectoryResult<T>>,
    {
        let started = Instant::now();
        let mut tried = HashSet::new();
        let mut attempt = 0u32;
        let mut last_error: Option<DirectoryError> = None;
        let mut state = RequestState::Pending;

        loop {
            if attempt >= max_attempts.max(1) {
                break;
            }

            if attempt > 0 {
                let delay = self.policy.backoff_delay(attempt - 1);
                if !delay.is_zero() {
                    if started.elapsed() + delay >= deadline {
                        break;
                    }
                    tokio::time::sleep(delay).await;
                }
            }

            let remaining = deadline.saturating_sub(started.elapsed());
            if remaining.is_zero() {
                break;
            }
            let Some(endpoint) = self.selector.next_candidate(&tried) else {
                break;
            };

            attempt += 1;
            tried.insert(endpoint.name.clone());
            state = RequestState::Trying {
                endpoint: endpoint.name.clone(),
                attempt,
            };
            debug!(operation, %state, "Starting attempt");

            let budget = self.policy.attempt_timeout().min(remaining);
            let result = match tokio::time::timeout(budget, op(endpoint.clone())).await {
                Ok(result) => result,
                Err(_) => Err(DirectoryError::timeout(format!(
                    "{operation} on {} after {}ms",
                    endpoint.name,
                    budget.as_millis()
                ))),
            };

            match result {
                Ok(value) => {
                    self.selector.report_success(&endpoint.name);
                    state = RequestState::Success;
                    debug!(operation, %state, attempts = attempt, "Request finished");
                    return Ok(value);
                }
                Err(e) if e.is_transient() => {
                    self.selector.report_failure(&endpoint.name);
                    state = RequestState::TransientFailure;
                    warn!(
                        operation,
                        endpoint = %endpoint.name,
                        attempt,
                        error = %e,
                        "Attempt failed, trying next endpoint"
                    );
                    last_error = Some(e);
                }
                Err(e) => {
                    state = RequestState::PermanentFailure;
                    debug!(operation, %state, endpoint = %endpoint.name, error = %e, "Request failed");
                    return Err(e);
                }
            }
        }

        let previous = std::mem::replace(&mut state, RequestState::Exhausted);
        warn!(
            operation,
            %state,
            last = %previous,
            attempts = attempt,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Request exhausted"
        );
        Err(last_error.unwrap_or(DirectoryError::NoCandidates))
    }
}
