//! Bounded retries with capped exponential backoff.
//!
//! A call moves through `Attempting -> (Success | BackingOff -> Attempting) ->
//! Exhausted`. The optional deadline is checked on every transition, so a
//! cancelled call never sits out the rest of a backoff.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio::time::Instant;
use tracing::debug;

use crate::SourceError;

/// Upper bound on any single backoff delay.
pub const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Why a retried call did not produce a value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RetryError {
    /// Every allowed attempt failed.
    #[error("retries exhausted after {attempts} attempt(s): {last_error}")]
    Exhausted {
        attempts: u32,
        last_error: SourceError,
    },
    /// The call failed with an error the source marked as not retryable.
    #[error("attempt {attempts} failed permanently: {error}")]
    Rejected { attempts: u32, error: SourceError },
    /// The deadline passed before the call could succeed.
    #[error("deadline reached after {attempts} attempt(s)")]
    Cancelled {
        attempts: u32,
        last_error: Option<SourceError>,
    },
}

impl RetryError {
    pub const fn attempts(&self) -> u32 {
        match self {
            Self::Exhausted { attempts, .. }
            | Self::Rejected { attempts, .. }
            | Self::Cancelled { attempts, .. } => *attempts,
        }
    }

    /// Collapse into the per-source error recorded in an aggregated result.
    pub fn into_source_error(self) -> SourceError {
        match self {
            Self::Exhausted {
                attempts,
                last_error,
            } => {
                let message = format!(
                    "retries exhausted after {attempts} attempt(s): {}",
                    last_error.message()
                );
                last_error.with_message(message)
            }
            Self::Rejected { error, .. } => error,
            Self::Cancelled { attempts, .. } => SourceError::timeout(format!(
                "query deadline reached after {attempts} attempt(s)"
            )),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum RetryState {
    Attempting { attempt: u32 },
    BackingOff { attempt: u32, delay: Duration },
}

/// Retry configuration for one source call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_retries: u32,
    base_delay: Duration,
    max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(1))
    }
}

impl RetryPolicy {
    /// `max_retries` is the total number of attempts; zero is treated as one.
    pub const fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            max_delay: MAX_BACKOFF,
        }
    }

    pub const fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_retries.max(1)
    }

    /// Delay after the failed attempt with 0-based index `attempt`:
    /// `min(base * 2^attempt, max_delay)`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let scale = 2_f64.powi(attempt.min(63) as i32);
        let seconds = self.base_delay.as_secs_f64() * scale;
        Duration::from_secs_f64(seconds.min(self.max_delay.as_secs_f64()))
    }

    /// Run `op` until it succeeds or the attempts are used up.
    ///
    /// `op` receives the 0-based attempt index.
    pub async fn execute<T, F, Fut>(&self, op: F) -> Result<T, RetryError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, SourceError>>,
    {
        self.execute_until(None, op).await
    }

    /// Like [`execute`](Self::execute), but gives up once `deadline` is reached.
    pub async fn execute_until<T, F, Fut>(
        &self,
        deadline: Option<Instant>,
        mut op: F,
    ) -> Result<T, RetryError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, SourceError>>,
    {
        let max_attempts = self.max_attempts();
        let mut state = RetryState::Attempting { attempt: 0 };
        let mut attempts = 0;
        let mut last_error = None;

        loop {
            if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                return Err(RetryError::Cancelled {
                    attempts,
                    last_error,
                });
            }

            state = match state {
                RetryState::Attempting { attempt } => {
                    attempts = attempt + 1;
                    match op(attempt).await {
                        Ok(value) => return Ok(value),
                        Err(error) if !error.retryable() => {
                            return Err(RetryError::Rejected { attempts, error });
                        }
                        Err(error) if attempts >= max_attempts => {
                            return Err(RetryError::Exhausted {
                                attempts,
                                last_error: error,
                            });
                        }
                        Err(error) => {
                            let delay = self.delay_for_attempt(attempt);
                            debug!(attempt = attempts, delay_ms = delay.as_millis() as u64, error = %error, "attempt failed, backing off");
                            last_error = Some(error);
                            RetryState::BackingOff { attempt, delay }
                        }
                    }
                }
                RetryState::BackingOff { attempt, delay } => {
                    let wake_at = Instant::now() + delay;
                    if deadline.is_some_and(|deadline| wake_at >= deadline) {
                        return Err(RetryError::Cancelled {
                            attempts,
                            last_error,
                        });
                    }
                    tokio::time::sleep_until(wake_at).await;
                    RetryState::Attempting {
                        attempt: attempt + 1,
                    }
                }
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn delay_doubles_from_base_and_caps_at_thirty_seconds() {
        let policy = RetryPolicy::new(10, Duration::from_secs(1));

        assert_eq!(policy.delay_for_attempt(0), Duration::from_secs(1));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_secs(2));
        assert_eq!(policy.delay_for_attempt(4), Duration::from_secs(16));
        assert_eq!(policy.delay_for_attempt(5), Duration::from_secs(30));
        assert_eq!(policy.delay_for_attempt(200), Duration::from_secs(30));
    }

    #[test]
    fn zero_retries_still_attempts_once() {
        assert_eq!(RetryPolicy::new(0, Duration::from_secs(1)).max_attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn always_failing_call_is_attempted_max_retries_times() {
        let policy = RetryPolicy::new(3, Duration::from_secs(1));
        let calls = Arc::new(Mutex::new(Vec::new()));
        let started = Instant::now();

        let result: Result<(), RetryError> = policy
            .execute(|attempt| {
                let calls = Arc::clone(&calls);
                async move {
                    calls.lock().expect("lock").push((attempt, started.elapsed()));
                    Err(SourceError::unavailable("upstream down"))
                }
            })
            .await;

        let calls = calls.lock().expect("lock").clone();
        assert_eq!(
            calls,
            vec![
                (0, Duration::ZERO),
                (1, Duration::from_secs(1)),
                (2, Duration::from_secs(3)),
            ]
        );
        let error = result.expect_err("all attempts fail");
        assert!(matches!(error, RetryError::Exhausted { attempts: 3, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn returns_first_success() {
        let policy = RetryPolicy::new(5, Duration::from_millis(10));
        let result = policy
            .execute(|attempt| async move {
                if attempt < 2 {
                    Err(SourceError::timeout("slow"))
                } else {
                    Ok(attempt)
                }
            })
            .await;

        assert_eq!(result, Ok(2));
    }

    #[tokio::test(start_paused = true)]
    async fn non_retryable_error_stops_immediately() {
        let policy = RetryPolicy::new(5, Duration::from_secs(1));
        let result: Result<(), RetryError> = policy
            .execute(|_| async { Err(SourceError::invalid_request("bad target")) })
            .await;

        assert!(matches!(result, Err(RetryError::Rejected { attempts: 1, .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_aborts_backoff_without_waiting() {
        let policy = RetryPolicy::new(5, Duration::from_secs(10));
        let started = Instant::now();
        let deadline = started + Duration::from_secs(5);

        let result: Result<(), RetryError> = policy
            .execute_until(Some(deadline), |_| async {
                Err(SourceError::unavailable("down"))
            })
            .await;

        let error = result.expect_err("cancelled");
        assert!(matches!(error, RetryError::Cancelled { attempts: 1, last_error: Some(_) }));
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(
            error.into_source_error().kind(),
            crate::SourceErrorKind::Timeout
        );
    }

    #[test]
    fn exhausted_error_keeps_kind_of_last_failure() {
        let error = RetryError::Exhausted {
            attempts: 3,
            last_error: SourceError::upstream_throttled("429 from upstream"),
        };

        let source_error = error.into_source_error();
        assert_eq!(source_error.kind(), crate::SourceErrorKind::RateLimited);
        assert!(source_error.message().contains("3 attempt(s)"));
    }
}
