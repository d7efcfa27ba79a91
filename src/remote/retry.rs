// ==========================================
// ERP 导入连接器 - 远程调用重试与超时
// ==========================================
// 规则:
// - 每次调用受 call_timeout 约束,超时视为 Connectivity
// - Connectivity 按指数退避重试,至多 max_attempts 次
// - Auth / Protocol 立即返回,不重试
// ==========================================

use crate::remote::client::{CollectionQuery, ObjectSchema, RemoteClient, RemotePage};
use crate::remote::error::{RemoteError, RemoteResult};
use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub multiplier: f64,
    pub call_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(8),
            multiplier: 2.0,
            call_timeout: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// 计算下一次退避时长,上限为 max_backoff
    pub fn next_delay(&self, current: Duration) -> Duration {
        let next_ms = (current.as_millis() as f64 * self.multiplier) as u64;
        Duration::from_millis(next_ms).min(self.max_backoff)
    }

    /// 带超时与重试执行一次远程调用
    pub async fn run<T, F, Fut>(&self, operation: &str, mut call: F) -> RemoteResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = RemoteResult<T>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut delay = self.initial_backoff;
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            let result = match tokio::time::timeout(self.call_timeout, call()).await {
                Ok(result) => result,
                Err(_) => Err(RemoteError::Connectivity(format!(
                    "{} 超时 ({} ms)",
                    operation,
                    self.call_timeout.as_millis()
                ))),
            };

            match result {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(operation, attempt, "远程调用重试成功");
                    }
                    return Ok(value);
                }
                Err(e) if e.is_retryable() && attempt < max_attempts => {
                    warn!(
                        operation,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "远程调用失败,准备重试"
                    );
                    tokio::time::sleep(delay).await;
                    delay = self.next_delay(delay);
                }
                Err(e) => {
                    if e.is_retryable() {
                        warn!(operation, attempt, error = %e, "远程调用重试次数耗尽");
                    }
                    return Err(e);
                }
            }
        }
    }
}

// ==========================================
// Retrying<C> - 重试装饰器
// ==========================================
pub struct Retrying<C> {
    inner: C,
    policy: RetryPolicy,
}

impl<C> Retrying<C> {
    pub fn new(inner: C, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn inner(&self) -> &C {
        &self.inner
    }
}

#[async_trait]
impl<C: RemoteClient> RemoteClient for Retrying<C> {
    async fn fetch_page(
        &self,
        query: &CollectionQuery,
        cursor: Option<&str>,
    ) -> RemoteResult<RemotePage> {
        let operation = format!("load {}", query.object);
        self.policy
            .run(&operation, || self.inner.fetch_page(query, cursor))
            .await
    }

    async fn describe_schema(&self, object: &str) -> RemoteResult<ObjectSchema> {
        let operation = format!("info {}", object);
        self.policy
            .run(&operation, || self.inner.describe_schema(object))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(4),
            multiplier: 2.0,
            call_timeout: Duration::from_millis(200),
        }
    }

    #[test]
    fn test_next_delay_doubles_and_clamps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.next_delay(Duration::from_millis(500)), Duration::from_secs(1));
        assert_eq!(policy.next_delay(Duration::from_secs(6)), Duration::from_secs(8));
        assert_eq!(policy.next_delay(Duration::from_secs(8)), Duration::from_secs(8));
    }

    #[tokio::test]
    async fn test_connectivity_retried_until_success() {
        let calls = AtomicU32::new(0);
        let result = fast_policy(4)
            .run("load SLItems", || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(RemoteError::Connectivity("reset".into()))
                    } else {
                        Ok(n)
                    }
                }
            })
            .await;

        assert_eq!(result, Ok(2));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retries_exhausted_returns_connectivity() {
        let calls = AtomicU32::new(0);
        let result: RemoteResult<()> = fast_policy(3)
            .run("load SLItems", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(RemoteError::Connectivity("down".into())) }
            })
            .await;

        assert!(matches!(result, Err(RemoteError::Connectivity(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_auth_never_retried() {
        let calls = AtomicU32::new(0);
        let result: RemoteResult<()> = fast_policy(5)
            .run("load SLItems", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(RemoteError::Auth("rejected".into())) }
            })
            .await;

        assert!(matches!(result, Err(RemoteError::Auth(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_call_timeout_becomes_connectivity() {
        let policy = RetryPolicy {
            call_timeout: Duration::from_millis(10),
            ..fast_policy(2)
        };
        let result: RemoteResult<()> = policy
            .run("info SLItems", || async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await;

        match result {
            Err(RemoteError::Connectivity(msg)) => assert!(msg.contains("超时")),
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
