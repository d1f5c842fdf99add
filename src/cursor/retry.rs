use crate::errors::{CursorError, Result};
use crate::telemetry;
use std::fmt;
use std::sync::Arc;

/// Decides whether a failure is worth another attempt.
pub type Classifier = Arc<dyn Fn(&CursorError) -> bool + Send + Sync>;

/// Something that can throw away its server-side state and rebuild it.
pub trait Recreate {
    fn recreate(&mut self) -> Result<()>;
}

/// Bounded retry with first-failure identity.
///
/// With a bound of `n` an operation runs at most `n + 1` times. When every
/// attempt fails transiently the caller receives the failure from the first
/// attempt, never a later one. Permanent failures are returned immediately.
#[derive(Clone)]
pub struct RetryPolicy {
    bound: u32,
    classify: Classifier,
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy").field("bound", &self.bound).finish_non_exhaustive()
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(0)
    }
}

impl RetryPolicy {
    #[must_use]
    pub fn new(bound: u32) -> Self {
        Self { bound, classify: Arc::new(CursorError::is_transient) }
    }

    #[must_use]
    pub fn with_classifier<F>(mut self, classify: F) -> Self
    where
        F: Fn(&CursorError) -> bool + Send + Sync + 'static,
    {
        self.classify = Arc::new(classify);
        self
    }

    #[must_use]
    pub fn bound(&self) -> u32 {
        self.bound
    }

    pub fn set_bound(&mut self, bound: u32) {
        self.bound = bound;
    }

    #[must_use]
    pub fn is_retryable(&self, err: &CursorError) -> bool {
        (self.classify)(err)
    }

    /// Run `operation` against `subject`.
    ///
    /// When `recreate_on_failure` is set, a transient failure makes the subject
    /// recreate itself before the next attempt. A transient failure of that
    /// recreate counts as the attempt's failure.
    pub fn execute<S, T, F>(&self, subject: &mut S, recreate_on_failure: bool, mut operation: F) -> Result<T>
    where
        S: Recreate + ?Sized,
        F: FnMut(&mut S) -> Result<T>,
    {
        if self.bound == 0 {
            telemetry::record_attempt();
            return operation(subject).inspect_err(|e| {
                if self.is_retryable(e) {
                    telemetry::record_transient();
                } else {
                    telemetry::record_permanent();
                }
            });
        }

        let mut first: Option<CursorError> = None;
        let mut pending_recreate = false;
        let mut attempt: u32 = 0;
        loop {
            let outcome = if pending_recreate {
                subject.recreate().and_then(|()| {
                    telemetry::record_attempt();
                    operation(&mut *subject)
                })
            } else {
                telemetry::record_attempt();
                operation(subject)
            };
            match outcome {
                Ok(value) => return Ok(value),
                Err(err) if self.is_retryable(&err) => {
                    telemetry::record_transient();
                    crate::cursor_event!(
                        "attempt_failed",
                        "attempt" => attempt,
                        "bound" => self.bound,
                        "error" => err.to_string(),
                    );
                    log::warn!("transient cursor failure on attempt {attempt}/{}: {err}", self.bound);
                    let recorded = first.unwrap_or(err);
                    if attempt >= self.bound {
                        telemetry::record_exhausted();
                        crate::cursor_event!("retries_exhausted", "attempts" => attempt + 1);
                        log::error!("giving up after {} attempts: {recorded}", attempt + 1);
                        return Err(recorded);
                    }
                    first = Some(recorded);
                    pending_recreate = recreate_on_failure;
                    attempt += 1;
                }
                Err(err) => {
                    telemetry::record_permanent();
                    log::debug!("permanent cursor failure, not retrying: {err}");
                    return Err(err);
                }
            }
        }
    }
}
