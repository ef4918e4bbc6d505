use rand::Rng;
use std::time::Duration;

/// Backoff policy for a retrying caller. Declared per step in config (§9, resolved open
/// question) for forward compatibility with an outer scheduler; the core executor itself
/// never re-invokes a failed step, so nothing in this crate calls [`RetryPolicy::execute`]
/// on the hot path — it exists for hosts layered above the core that choose to retry.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of retry attempts (0 = no retries).
    pub max_attempts: u32,

    /// Initial delay before first retry.
    pub initial_delay: Duration,

    /// Maximum delay between retries.
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (typically 2.0).
    pub backoff_multiplier: f64,

    /// Random jitter to prevent thundering herd (0.0 = none, 1.0 = full jitter).
    pub jitter_factor: f64,

    /// Maximum total duration across all attempts.
    pub max_total_duration: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            jitter_factor: 0.1,
            max_total_duration: Some(Duration::from_secs(60)),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, initial_delay: Duration) -> Self {
        Self {
            max_attempts,
            initial_delay,
            ..Default::default()
        }
    }

    pub fn no_retry() -> Self {
        Self {
            max_attempts: 0,
            ..Default::default()
        }
    }

    pub fn aggressive() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_millis(50),
            max_delay: Duration::from_secs(10),
            backoff_multiplier: 1.5,
            jitter_factor: 0.2,
            max_total_duration: Some(Duration::from_secs(30)),
        }
    }

    pub fn conservative() -> Self {
        Self {
            max_attempts: 2,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            backoff_multiplier: 3.0,
            jitter_factor: 0.1,
            max_total_duration: Some(Duration::from_secs(120)),
        }
    }

    /// Calculate delay for a given attempt number (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base_delay =
            self.initial_delay.as_millis() as f64 * self.backoff_multiplier.powi(attempt as i32);

        let clamped = base_delay.min(self.max_delay.as_millis() as f64);

        let jittered = if self.jitter_factor > 0.0 {
            let mut rng = rand::thread_rng();
            let jitter = rng.gen::<f64>() * self.jitter_factor * clamped;
            clamped + jitter
        } else {
            clamped
        };

        Duration::from_millis(jittered as u64)
    }

    /// Execute an async operation, retrying on error up to `max_attempts` additional
    /// times. Retryability is entirely the caller's call: pass a predicate over `E`
    /// rather than relying on any built-in error taxonomy, since what counts as
    /// transient differs per host (a worker crash is not retryable; a remote state
    /// backend timeout might be).
    pub async fn execute<F, Fut, T, E>(
        &self,
        mut operation: F,
        is_retryable: impl Fn(&E) -> bool,
    ) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
    {
        let start = std::time::Instant::now();
        let mut last_error = None;

        for attempt in 0..=self.max_attempts {
            if let Some(max_duration) = self.max_total_duration {
                if start.elapsed() > max_duration {
                    break;
                }
            }

            match operation().await {
                Ok(result) => return Ok(result),
                Err(e) => {
                    let should_retry = is_retryable(&e);
                    last_error = Some(e);

                    if attempt >= self.max_attempts || !should_retry {
                        break;
                    }

                    let delay = self.delay_for_attempt(attempt);
                    tokio::time::sleep(delay).await;
                }
            }
        }

        Err(last_error.expect("at least one attempt always runs"))
    }
}
