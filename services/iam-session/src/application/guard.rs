//! 依赖调用保护：超时 + 瞬时错误重试

use std::future::Future;
use std::time::Duration;

use carelink_common::{RetryConfig, with_conditional_retry};
use carelink_config::SessionConfig;
use carelink_errors::{AppError, AppResult};

/// 所有缓存 / 主存储调用都经由它执行
///
/// 每次尝试受 `timeout` 约束，超时记为 `AppError::Unavailable`；
/// 只有 `Unavailable` 会按 `retry` 重试。
#[derive(Debug, Clone, Copy)]
pub struct DependencyGuard {
    timeout: Duration,
    retry: RetryConfig,
}

impl DependencyGuard {
    pub fn new(timeout: Duration, retry: RetryConfig) -> Self {
        Self { timeout, retry }
    }

    pub fn from_config(config: &SessionConfig) -> Self {
        let backoff = Duration::from_millis(config.retry_backoff_ms);
        Self::new(
            Duration::from_millis(config.io_timeout_ms),
            RetryConfig::new(config.retry_attempts, backoff, backoff * 4),
        )
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// 带超时与重试执行，仅用于幂等操作
    pub async fn run<T, F, Fut>(&self, name: &str, mut operation: F) -> AppResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = AppResult<T>>,
    {
        with_conditional_retry(
            &self.retry,
            name,
            || bounded(self.timeout, name, operation()),
            AppError::is_transient,
        )
        .await
    }

    /// 只带超时，不重试（插入、比较并替换等非幂等操作）
    pub async fn run_once<T, Fut>(&self, name: &str, operation: Fut) -> AppResult<T>
    where
        Fut: Future<Output = AppResult<T>>,
    {
        bounded(self.timeout, name, operation).await
    }
}

async fn bounded<T, Fut>(timeout: Duration, name: &str, operation: Fut) -> AppResult<T>
where
    Fut: Future<Output = AppResult<T>>,
{
    tokio::time::timeout(timeout, operation)
        .await
        .map_err(|_| AppError::unavailable(format!("{} timed out", name)))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn guard() -> DependencyGuard {
        DependencyGuard::new(
            Duration::from_millis(20),
            RetryConfig::new(2, Duration::from_millis(1), Duration::from_millis(2)),
        )
    }

    #[tokio::test]
    async fn test_timeout_becomes_unavailable() {
        let calls = AtomicU32::new(0);
        let result: AppResult<()> = guard()
            .run("hang", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    Ok(())
                }
            })
            .await;

        assert!(matches!(result, Err(AppError::Unavailable(_))));
        // 超时是瞬时错误，重试一次
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_transient_failure_retried_once() {
        let calls = AtomicU32::new(0);
        let result = guard()
            .run("flaky", || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n == 0 {
                        Err(AppError::unavailable("connection reset"))
                    } else {
                        Ok(7)
                    }
                }
            })
            .await;
        assert_eq!(result.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_non_transient_failure_not_retried() {
        let calls = AtomicU32::new(0);
        let result: AppResult<()> = guard()
            .run("conflict", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(AppError::conflict("phone already registered")) }
            })
            .await;
        assert!(matches!(result, Err(AppError::Conflict(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_run_once_times_out() {
        let result: AppResult<()> = guard()
            .run_once("hang", async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await;
        assert!(matches!(result, Err(AppError::Unavailable(_))));
    }

    #[test]
    fn test_from_config() {
        let guard = DependencyGuard::from_config(&SessionConfig::default());
        assert_eq!(guard.timeout(), Duration::from_millis(500));
    }
}
