//! 재시도 정책 모듈
//! 페이지 수집과 상세 재조회에서 공유하는 백오프 계산

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::domain::{CrawlError, CrawlResult};

/// 재시도 정책 설정
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// 최대 재시도 횟수 (첫 시도 제외)
    pub max_retries: u32,
    /// 기본 지연 시간
    pub base_delay: Duration,
    /// 백오프 승수 (1.0 = 고정 지연)
    pub backoff_multiplier: f64,
    /// 최대 지연 시간
    pub max_delay: Duration,
    /// 지터 범위 (0 = 지터 없음)
    pub jitter: Duration,
}

impl RetryPolicy {
    pub const fn fixed(max_retries: u32, delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay: delay,
            backoff_multiplier: 1.0,
            max_delay: delay,
            jitter: Duration::ZERO,
        }
    }

    /// `retries_so_far` retries have already been spent on this operation.
    pub const fn should_retry(&self, retries_so_far: u32) -> bool {
        retries_so_far < self.max_retries
    }

    /// 지연 시간 계산 (Exponential Backoff). `attempt` is 1-based.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let factor = self.backoff_multiplier.max(1.0).powi(exponent);
        let scaled_ms = self.base_delay.as_millis() as f64 * factor;

        let max_ms = self.max_delay.max(self.base_delay).as_millis() as f64;
        let capped = Duration::from_millis(scaled_ms.min(max_ms) as u64);

        capped + self.jitter_sample()
    }

    fn jitter_sample(&self) -> Duration {
        let range_ms = u64::try_from(self.jitter.as_millis()).unwrap_or(u64::MAX);
        if range_ms == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(fastrand::u64(0..=range_ms))
    }
}

/// 오류 종류별 재시도 정책 묶음
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrawlRetryPolicy {
    pub rate_limit: RetryPolicy,
    pub transport: RetryPolicy,
}

impl CrawlRetryPolicy {
    /// Policy governing `error`, or `None` when the error is fatal.
    pub const fn policy_for(&self, error: &CrawlError) -> Option<&RetryPolicy> {
        match error {
            CrawlError::RateLimited { .. } => Some(&self.rate_limit),
            CrawlError::Transport { .. } => Some(&self.transport),
            _ => None,
        }
    }

    /// Backoff before retry number `attempt` of `error`. A server hint
    /// wins when it asks for a longer wait.
    pub fn backoff_for(&self, error: &CrawlError, attempt: u32) -> Option<Duration> {
        let policy = self.policy_for(error)?;
        let computed = policy.delay_for(attempt);
        Some(error.retry_after().map_or(computed, |hint| hint.max(computed)))
    }
}

/// Separate retry counters per failure kind for one operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetryCounters {
    pub rate_limited: u32,
    pub transport: u32,
}

impl RetryCounters {
    /// Record one more failure of the error's kind and return the new
    /// count, or `None` for fatal errors.
    pub fn bump(&mut self, error: &CrawlError) -> Option<u32> {
        let counter = match error {
            CrawlError::RateLimited { .. } => &mut self.rate_limited,
            CrawlError::Transport { .. } => &mut self.transport,
            _ => return None,
        };
        *counter += 1;
        Some(*counter)
    }
}

/// Sleep unless cancelled first.
pub async fn cancellable_sleep(delay: Duration, cancel: &CancellationToken) -> CrawlResult<()> {
    if delay.is_zero() {
        return if cancel.is_cancelled() {
            Err(CrawlError::Cancelled)
        } else {
            Ok(())
        };
    }
    tokio::select! {
        () = tokio::time::sleep(delay) => Ok(()),
        () = cancel.cancelled() => Err(CrawlError::Cancelled),
    }
}

/// Run `operation` until it succeeds, a fatal error occurs, or the
/// policy's bound for the error's kind is exhausted. Used where no
/// per-attempt events are published (bulk collection, detail refresh).
pub async fn retry_with_policy<T, F, Fut>(
    policy: &CrawlRetryPolicy,
    cancel: &CancellationToken,
    label: &str,
    mut operation: F,
) -> CrawlResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = CrawlResult<T>>,
{
    let mut counters = RetryCounters::default();
    loop {
        if cancel.is_cancelled() {
            return Err(CrawlError::Cancelled);
        }
        let result = tokio::select! {
            result = operation() => result,
            () = cancel.cancelled() => Err(CrawlError::Cancelled),
        };

        let error = match result {
            Ok(value) => return Ok(value),
            Err(error) => error,
        };

        let Some(attempt) = counters.bump(&error) else {
            return Err(error);
        };
        let within_bound = policy
            .policy_for(&error)
            .is_some_and(|p| p.should_retry(attempt - 1));
        let Some(delay) = policy.backoff_for(&error, attempt).filter(|_| within_bound) else {
            warn!("❌ {}: giving up after {} retries: {}", label, attempt - 1, error);
            return Err(error);
        };

        warn!(
            "⏳ {}: {} (attempt {}), sleeping for {:?}",
            label, error, attempt, delay
        );
        cancellable_sleep(delay, cancel).await?;
    }
}
