//! 通用重试工具
//!
//! `retry(operation, max_attempts, backoff)` 被编译、光栅化、写文件和文本生成共用。
//! 每次尝试返回 `AttemptError`，其中 `retryable = false` 会立即终止重试。

use std::future::Future;
use std::time::Duration;

use tracing::debug;

/// 单次尝试的失败
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptError {
    pub message: String,
    pub retryable: bool,
}

impl AttemptError {
    pub fn retryable(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: true,
        }
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: false,
        }
    }
}

/// 全部尝试失败后的汇总
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryFailure {
    /// 每次尝试的错误，格式为 "(attempt n) message"
    pub errors: Vec<String>,
    pub attempts: u32,
}

impl std::fmt::Display for RetryFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} 次尝试均失败: {}", self.attempts, self.errors.join("; "))
    }
}

impl std::error::Error for RetryFailure {}

/// 线性退避：第 n 次失败后等待 `base * n`
pub fn linear_backoff(base: Duration) -> impl Fn(u32) -> Duration + Send + Sync + Clone {
    move |attempt| base * attempt
}

/// 带退避的重试
///
/// `operation` 接收从 1 开始的尝试序号；`backoff` 接收刚失败的尝试序号，
/// 返回下一次尝试前的等待时间。最后一次失败后不再等待。
pub async fn retry<T, F, Fut, B>(mut operation: F, max_attempts: u32, backoff: B) -> Result<T, RetryFailure>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, AttemptError>>,
    B: Fn(u32) -> Duration,
{
    let max_attempts = max_attempts.max(1);
    let mut errors = Vec::new();

    for attempt in 1..=max_attempts {
        match operation(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) => {
                debug!("第 {}/{} 次尝试失败: {}", attempt, max_attempts, e.message);
                errors.push(format!("(attempt {}) {}", attempt, e.message));
                if !e.retryable {
                    return Err(RetryFailure { errors, attempts: attempt });
                }
                if attempt < max_attempts {
                    tokio::time::sleep(backoff(attempt)).await;
                }
            }
        }
    }

    Err(RetryFailure {
        errors,
        attempts: max_attempts,
    })
}
