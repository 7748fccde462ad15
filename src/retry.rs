//! Bounded, fixed-delay retry around a single batch or page request.
//!
//! Attempts move through a small state machine. The transition function is
//! pure; all waiting goes through an injected [`Sleeper`] so tests can drive
//! the controller without real delays.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::error::FetchError;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(5);
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_RATE_LIMIT_DELAY: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Wait between two attempts of the same request.
    pub retry_delay: Duration,
    /// Wait after every chunk/page, including the last one.
    pub rate_limit_delay: Duration,
    pub request_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_delay: DEFAULT_RETRY_DELAY,
            rate_limit_delay: DEFAULT_RATE_LIMIT_DELAY,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryState {
    /// About to make attempt `n` (1-based).
    Attempting(u32),
    Succeeded,
    Exhausted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    Success,
    TransientFailure,
}

impl RetryPolicy {
    pub fn transition(&self, state: RetryState, outcome: AttemptOutcome) -> RetryState {
        match (state, outcome) {
            (RetryState::Attempting(_), AttemptOutcome::Success) => RetryState::Succeeded,
            (RetryState::Attempting(n), AttemptOutcome::TransientFailure) => {
                if n < self.max_attempts {
                    RetryState::Attempting(n + 1)
                } else {
                    RetryState::Exhausted
                }
            }
            (terminal, _) => terminal,
        }
    }
}

#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Records requested delays instead of waiting.
#[cfg(test)]
#[derive(Default, Clone)]
pub struct RecordingSleeper {
    slept: Arc<std::sync::Mutex<Vec<Duration>>>,
}

#[cfg(test)]
impl RecordingSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn recorded(&self) -> Vec<Duration> {
        self.slept.lock().map(|v| v.clone()).unwrap_or_default()
    }
}

#[cfg(test)]
#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        if let Ok(mut slept) = self.slept.lock() {
            slept.push(duration);
        }
    }
}

/// Run-level cancellation flag, shared by every project of a run.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn check(&self) -> Result<(), FetchError> {
        if self.is_cancelled() {
            Err(FetchError::Cancelled)
        } else {
            Ok(())
        }
    }
}

#[derive(Debug)]
pub enum RetryOutcome<T> {
    Succeeded(T),
    Exhausted { attempts: u32, last_error: FetchError },
}

/// Per-project retry controller. Owns no state shared with other projects.
#[derive(Clone)]
pub struct RetryController {
    policy: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
    cancel: CancelToken,
}

impl RetryController {
    pub fn new(policy: RetryPolicy, sleeper: Arc<dyn Sleeper>, cancel: CancelToken) -> Self {
        Self {
            policy,
            sleeper,
            cancel,
        }
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// Run `op` until it succeeds or the attempt budget is spent.
    ///
    /// Only transient failures are retried; any other error is returned
    /// immediately, as is cancellation observed before a retry sleep.
    pub async fn run<T, F, Fut>(&self, label: &str, mut op: F) -> Result<RetryOutcome<T>, FetchError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, FetchError>>,
    {
        let mut state = RetryState::Attempting(1);
        let mut attempts = 0;
        let mut last_error = FetchError::transient("no attempt made");

        while let RetryState::Attempting(attempt) = state {
            if attempt > 1 {
                self.cancel.check()?;
                self.sleeper.sleep(self.policy.retry_delay).await;
            }
            attempts = attempt;

            match op().await {
                Ok(value) => {
                    let state = self.policy.transition(state, AttemptOutcome::Success);
                    debug!(unit = label, attempt, ?state, "request succeeded");
                    return Ok(RetryOutcome::Succeeded(value));
                }
                Err(err) if err.is_transient() => {
                    warn!(unit = label, attempt, error = %err, "request failed");
                    state = self.policy.transition(state, AttemptOutcome::TransientFailure);
                    last_error = err;
                }
                Err(err) => return Err(err),
            }
        }

        warn!(unit = label, attempts, "max retries reached, moving on");
        Ok(RetryOutcome::Exhausted {
            attempts,
            last_error,
        })
    }

    /// The fixed post-request pause that keeps us under the rate limit.
    pub async fn pace(&self) {
        self.sleeper.sleep(self.policy.rate_limit_delay).await;
    }
}
