//! 带线性退避的有限重试

use crate::config::RetrySettings;
use crate::error::SyncError;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// 重试策略：第 n 次失败后等待 n * 步长
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff_step: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetrySettings::default())
    }
}

impl From<&RetrySettings> for RetryPolicy {
    fn from(settings: &RetrySettings) -> Self {
        Self {
            max_attempts: settings.max_attempts.max(1),
            backoff_step: Duration::from_secs(settings.backoff_step_secs),
        }
    }
}

impl RetryPolicy {
    /// 第 attempt 次失败后的等待时间
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.backoff_step * attempt
    }
}

/// 成功结果及实际尝试次数
#[derive(Debug)]
pub struct Retried<T> {
    pub value: T,
    pub attempts: u32,
}

/// 执行操作，失败时按策略重试
///
/// 不可重试的错误立即返回；次数用尽时返回 [`SyncError::RetriesExhausted`]。
/// 退避等待期间取消会立即结束。
pub async fn with_retry<T, F, Fut>(
    policy: RetryPolicy,
    label: &str,
    cancel: &CancellationToken,
    mut op: F,
) -> Result<Retried<T>, SyncError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, SyncError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;
        debug!("{}: 第 {}/{} 次尝试", label, attempt, max_attempts);

        let err = match op(attempt).await {
            Ok(value) => {
                return Ok(Retried {
                    value,
                    attempts: attempt,
                })
            }
            Err(e) => e,
        };

        if !err.is_retryable() {
            return Err(err);
        }

        if attempt >= max_attempts {
            warn!("{}: {} 次尝试后仍然失败: {}", label, attempt, err);
            return Err(SyncError::RetriesExhausted {
                attempts: attempt,
                last: Box::new(err),
            });
        }

        let delay = policy.delay_for(attempt);
        warn!(
            "{}: 第 {} 次尝试失败 ({}), {}秒后重试",
            label,
            attempt,
            err,
            delay.as_secs_f32()
        );

        tokio::select! {
            _ = cancel.cancelled() => return Err(SyncError::Cancelled),
            _ = tokio::time::sleep(delay) => {}
        }
    }
}
