//! 运行时错误
//!
//! - `BusError`：消息投递层面的失败（无处理器、超时、无应答、类型不符）；
//! - `CommandFailure`：命令处理的类型化失败，作为值经应答通道回传，从不以 panic 越过消息边界。
//!
use esactor_domain::{
    error::DomainError,
    message::ErrorEvent,
    value_object::{AggregateId, CorrelationId},
};
use std::time::Duration;
use thiserror::Error;

#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BusError {
    #[error("no handlers for address {address}")]
    NoHandlers { address: String },

    #[error("timed out after {after:?} waiting for reply from {address}")]
    Timeout { address: String, after: Duration },

    #[error("handler at {address} dropped the reply")]
    NoReply { address: String },

    #[error("type mismatch: expected={expected}, found={found}")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },
}

#[non_exhaustive]
#[derive(Debug, Error)]
pub enum CommandFailure {
    /// 业务规则拒绝
    #[error("validation failed: {}", issues.join("; "))]
    Validation { issues: Vec<String> },

    /// 版本守卫：重复创建或向未初始化聚合发送命令
    #[error("version guard: {0}")]
    VersionGuard(#[from] ErrorEvent),

    /// 事件已在内存中应用但未能落库，聚合需失效
    #[error("unable to store {event_count} events of aggregate {aggregate_id} (correlation {correlation_id})")]
    UnableToStoreAggregateEvents {
        aggregate_id: AggregateId,
        correlation_id: CorrelationId,
        event_count: usize,
        #[source]
        source: DomainError,
    },

    #[error("storage failure for aggregate {aggregate_id} (correlation {correlation_id})")]
    Storage {
        aggregate_id: AggregateId,
        correlation_id: CorrelationId,
        #[source]
        source: DomainError,
    },

    #[error("unable to find aggregate factory for {persisted_type} (aggregate {aggregate_id})")]
    UnableToFindAggregateFactory {
        aggregate_id: AggregateId,
        persisted_type: String,
    },

    #[error("aggregate {0} not found")]
    AggregateNotFound(AggregateId),

    #[error("aggregate {0} invalidated")]
    AggregateInvalidated(AggregateId),

    #[error("failed to deploy aggregate {aggregate_id}: {reason}")]
    Deployment {
        aggregate_id: AggregateId,
        reason: String,
    },

    #[error(transparent)]
    Bus(#[from] BusError),
}

impl CommandFailure {
    pub fn validation(issues: impl IntoIterator<Item = impl Into<String>>) -> Self {
        CommandFailure::Validation {
            issues: issues.into_iter().map(Into::into).collect(),
        }
    }

    /// 调用方可自行处理的预期结果（重试或修正命令）
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            CommandFailure::Validation { .. }
                | CommandFailure::VersionGuard(_)
                | CommandFailure::AggregateNotFound(_)
                | CommandFailure::AggregateInvalidated(_)
        )
    }

    /// 内存状态已与事实来源分叉
    pub fn requires_invalidation(&self) -> bool {
        matches!(self, CommandFailure::UnableToStoreAggregateEvents { .. })
    }
}
