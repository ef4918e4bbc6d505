use crate::error::{CoreError, TimeoutError};
use std::time::Duration;
use tokio::time::timeout;

/// Optional timeout bounds for a host-initiated operation. Per §5, the step executor
/// imposes no default timeout on a worker invocation — a worker that never calls `result`
/// and never exits simply runs until the parent kills it. This type exists for hosts that
/// want to bound operations explicitly (an outer scheduler wrapping `execute()`, a
/// supervising process enforcing an SLA), not for the executor's own hot path.
#[derive(Debug, Clone)]
pub struct TimeoutConfig {
    /// Overall timeout for the entire operation.
    pub total: Option<Duration>,

    /// Timeout for the first response (useful for streaming operations).
    pub first_response: Option<Duration>,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            total: None,
            first_response: None,
        }
    }
}

impl TimeoutConfig {
    /// No timeout (operations can run indefinitely).
    pub fn none() -> Self {
        Self {
            total: None,
            first_response: None,
        }
    }

    pub fn quick() -> Self {
        Self {
            total: Some(Duration::from_secs(30)),
            first_response: Some(Duration::from_secs(5)),
        }
    }

    pub fn long() -> Self {
        Self {
            total: Some(Duration::from_secs(600)),
            first_response: Some(Duration::from_secs(60)),
        }
    }

    pub fn custom(total: Duration, first_response: Option<Duration>) -> Self {
        Self {
            total: Some(total),
            first_response,
        }
    }

    /// Execute an async operation under this timeout's `total` bound, if any.
    pub async fn execute<F, T>(&self, operation_name: &str, operation: F) -> Result<T, CoreError>
    where
        F: std::future::Future<Output = Result<T, CoreError>>,
    {
        match self.total {
            Some(duration) => with_timeout(duration, operation_name, operation).await,
            None => operation.await,
        }
    }

    /// Execute an async operation under this timeout's `first_response` bound, if any.
    /// Intended for wrapping the wait on a worker's first streamed chunk, not its full
    /// completion.
    pub async fn execute_with_first_response<F, T>(
        &self,
        operation_name: &str,
        operation: F,
    ) -> Result<T, CoreError>
    where
        F: std::future::Future<Output = Result<T, CoreError>>,
    {
        match self.first_response {
            Some(duration) => {
                with_timeout(duration, &format!("{operation_name} (first response)"), operation).await
            }
            None => operation.await,
        }
    }
}

/// Run `operation` and fail with [`TimeoutError`] if it does not complete within `duration`.
pub async fn with_timeout<F, T>(
    duration: Duration,
    operation_name: &str,
    operation: F,
) -> Result<T, CoreError>
where
    F: std::future::Future<Output = Result<T, CoreError>>,
{
    let start = std::time::Instant::now();
    match timeout(duration, operation).await {
        Ok(result) => result,
        Err(_) => Err(CoreError::Timeout(TimeoutError {
            operation: operation_name.to_string(),
            duration_ms: start.elapsed().as_millis() as u64,
        })),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{RunnerError, RunnerErrorCode};

    #[tokio::test]
    async fn operation_completes_within_timeout() {
        let config = TimeoutConfig::custom(Duration::from_secs(1), None);
        let result: Result<&str, CoreError> = config
            .execute("test_op", async {
                tokio::time::sleep(Duration::from_millis(10)).await;
                Ok("success")
            })
            .await;
        assert_eq!(result.unwrap(), "success");
    }

    #[tokio::test]
    async fn operation_exceeds_timeout() {
        let config = TimeoutConfig::custom(Duration::from_millis(50), None);
        let result: Result<&str, CoreError> = config
            .execute("test_op", async {
                tokio::time::sleep(Duration::from_millis(200)).await;
                Ok("success")
            })
            .await;

        match result.unwrap_err() {
            CoreError::Timeout(e) => {
                assert_eq!(e.operation, "test_op");
                assert!(e.duration_ms >= 50);
            }
            other => panic!("expected Timeout error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn no_timeout_allows_long_operations() {
        let config = TimeoutConfig::none();
        let result: Result<&str, CoreError> = config
            .execute("test_op", async {
                tokio::time::sleep(Duration::from_millis(100)).await;
                Ok("success")
            })
            .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn with_timeout_convenience_function() {
        let result: Result<&str, CoreError> =
            with_timeout(Duration::from_secs(1), "test_op", async { Ok("done") }).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn non_timeout_errors_pass_through_unchanged() {
        let config = TimeoutConfig::custom(Duration::from_secs(1), None);
        let result: Result<&str, CoreError> = config
            .execute("test_op", async {
                Err(CoreError::Runner(RunnerError {
                    code: RunnerErrorCode::ExecutableNotFound,
                    message: "python3 not found".to_string(),
                    step_name: Some("ingest".to_string()),
                }))
            })
            .await;

        match result.unwrap_err() {
            CoreError::Runner(_) => {}
            other => panic!("expected Runner error, got {other:?}"),
        }
    }

    #[test]
    fn quick_and_long_presets_differ() {
        assert_eq!(TimeoutConfig::quick().total, Some(Duration::from_secs(30)));
        assert_eq!(TimeoutConfig::long().total, Some(Duration::from_secs(600)));
    }
}
