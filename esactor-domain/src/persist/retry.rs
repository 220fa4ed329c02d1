//! 存储重试装饰器（RetryingEventStore）
//!
//! 以装饰器包裹任意 `EventStore`，按 `RetryPolicy` 重试瞬时故障。
//! 版本冲突、序列化错误等确定性失败不重试，直接返回。
//!
use crate::{
    error::DomainResult as Result,
    persist::{EventStore, SerializedEvent, SerializedSnapshot},
    value_object::{AggregateId, AggregateVersion},
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::{future::Future, time::Duration};

/// 存储操作重试策略，默认不重试
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RetryPolicy {
    #[default]
    None,
    /// 固定间隔；`attempts` 为总尝试次数（含首次）
    Fixed { attempts: u32, delay_ms: u64 },
    /// 指数退避，间隔从 `initial_ms` 翻倍直至 `max_ms`
    Exponential {
        attempts: u32,
        initial_ms: u64,
        max_ms: u64,
    },
}

impl RetryPolicy {
    pub fn max_attempts(&self) -> u32 {
        match self {
            RetryPolicy::None => 1,
            RetryPolicy::Fixed { attempts, .. } | RetryPolicy::Exponential { attempts, .. } => {
                (*attempts).max(1)
            }
        }
    }

    /// 第 `attempt` 次失败（从 1 开始）之后的等待时间
    pub fn delay_after(&self, attempt: u32) -> Duration {
        match self {
            RetryPolicy::None => Duration::ZERO,
            RetryPolicy::Fixed { delay_ms, .. } => Duration::from_millis(*delay_ms),
            RetryPolicy::Exponential {
                initial_ms, max_ms, ..
            } => {
                let factor = 1u64 << attempt.saturating_sub(1).min(20);
                Duration::from_millis(initial_ms.saturating_mul(factor).min(*max_ms))
            }
        }
    }
}

pub struct RetryingEventStore<S> {
    inner: S,
    policy: RetryPolicy,
}

impl<S> RetryingEventStore<S>
where
    S: EventStore,
{
    pub fn new(inner: S, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    async fn run<T, F, Fut>(&self, operation: &'static str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let max = self.policy.max_attempts();
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() && attempt < max => {
                    let delay = self.policy.delay_after(attempt);
                    tracing::warn!(
                        operation,
                        attempt,
                        max_attempts = max,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "transient store failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[async_trait]
impl<S> EventStore for RetryingEventStore<S>
where
    S: EventStore,
{
    async fn load_latest_snapshot(
        &self,
        aggregate_id: AggregateId,
    ) -> Result<Option<SerializedSnapshot>> {
        self.run("load_latest_snapshot", || {
            self.inner.load_latest_snapshot(aggregate_id)
        })
        .await
    }

    async fn load_events(
        &self,
        aggregate_id: AggregateId,
        from_version: AggregateVersion,
    ) -> Result<Vec<SerializedEvent>> {
        self.run("load_events", || {
            self.inner.load_events(aggregate_id, from_version)
        })
        .await
    }

    async fn append_events(
        &self,
        aggregate_id: AggregateId,
        events: Vec<SerializedEvent>,
    ) -> Result<usize> {
        self.run("append_events", || {
            self.inner.append_events(aggregate_id, events.clone())
        })
        .await
    }

    async fn append_snapshot(&self, snapshot: SerializedSnapshot) -> Result<usize> {
        self.run("append_snapshot", || {
            self.inner.append_snapshot(snapshot.clone())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DomainError;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// 前 `failures` 次读取返回给定错误
    struct Flaky {
        calls: AtomicU32,
        failures: u32,
        transient: bool,
    }

    #[async_trait]
    impl EventStore for Flaky {
        async fn load_latest_snapshot(
            &self,
            _aggregate_id: AggregateId,
        ) -> Result<Option<SerializedSnapshot>> {
            Ok(None)
        }

        async fn load_events(
            &self,
            _aggregate_id: AggregateId,
            _from_version: AggregateVersion,
        ) -> Result<Vec<SerializedEvent>> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if n <= self.failures {
                if self.transient {
                    Err(DomainError::Unavailable {
                        reason: "connection refused".into(),
                    })
                } else {
                    Err(DomainError::Parse {
                        reason: "bad row".into(),
                    })
                }
            } else {
                Ok(vec![])
            }
        }

        async fn append_events(
            &self,
            _aggregate_id: AggregateId,
            events: Vec<SerializedEvent>,
        ) -> Result<usize> {
            Ok(events.len())
        }

        async fn append_snapshot(&self, _snapshot: SerializedSnapshot) -> Result<usize> {
            Ok(1)
        }
    }

    fn flaky(failures: u32, transient: bool) -> Flaky {
        Flaky {
            calls: AtomicU32::new(0),
            failures,
            transient,
        }
    }

    #[tokio::test]
    async fn default_policy_does_not_retry() {
        let store = RetryingEventStore::new(flaky(1, true), RetryPolicy::default());
        let res = store
            .load_events(AggregateId::new(), AggregateVersion::INITIAL)
            .await;
        assert!(res.is_err());
        assert_eq!(store.inner().calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn fixed_policy_retries_transient_failures() {
        let policy = RetryPolicy::Fixed {
            attempts: 3,
            delay_ms: 1,
        };
        let store = RetryingEventStore::new(flaky(2, true), policy);
        let res = store
            .load_events(AggregateId::new(), AggregateVersion::INITIAL)
            .await;
        assert!(res.is_ok());
        assert_eq!(store.inner().calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn deterministic_failures_are_not_retried() {
        let policy = RetryPolicy::Fixed {
            attempts: 5,
            delay_ms: 1,
        };
        let store = RetryingEventStore::new(flaky(1, false), policy);
        let res = store
            .load_events(AggregateId::new(), AggregateVersion::INITIAL)
            .await;
        assert!(matches!(res, Err(DomainError::Parse { .. })));
        assert_eq!(store.inner().calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn exponential_delay_is_capped() {
        let policy = RetryPolicy::Exponential {
            attempts: 10,
            initial_ms: 10,
            max_ms: 50,
        };
        assert_eq!(policy.delay_after(1), Duration::from_millis(10));
        assert_eq!(policy.delay_after(2), Duration::from_millis(20));
        assert_eq!(policy.delay_after(3), Duration::from_millis(40));
        assert_eq!(policy.delay_after(4), Duration::from_millis(50));
        assert_eq!(policy.max_attempts(), 10);
        assert_eq!(RetryPolicy::None.max_attempts(), 1);
    }
}
