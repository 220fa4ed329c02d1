use crate::{
    error::DomainResult,
    persist::SerializedEvent,
    value_object::{AggregateId, AggregateVersion, CorrelationId},
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// 错误事件：需要在更高层（或其它观察者）处理的误用/异常情况
///
/// 错误事件会被发布到事件总线，但不会写入聚合的事件流。
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ErrorEvent {
    /// 创建命令重复到达已初始化的聚合
    #[error("attempt to initialize already initialized aggregate {aggregate_id} with {command}")]
    AttemptToInitializeAlreadyInitialized {
        aggregate_id: AggregateId,
        command: String,
        correlation_id: CorrelationId,
    },
    /// 普通命令到达从未被创建（未初始化）的聚合
    #[error("attempt to send {command} to uninitialized aggregate {aggregate_id}")]
    AttemptToSendCommandToUninitialized {
        aggregate_id: AggregateId,
        command: String,
        correlation_id: CorrelationId,
    },
    /// 聚合内存状态已与事实来源分叉，已被卸载
    #[error("aggregate {aggregate_id} invalidated: {reason}")]
    AggregateInvalidated {
        aggregate_id: AggregateId,
        correlation_id: CorrelationId,
        reason: String,
    },
}

impl ErrorEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            ErrorEvent::AttemptToInitializeAlreadyInitialized { .. } => {
                "ErrorEvent.AttemptToInitializeAlreadyInitialized"
            }
            ErrorEvent::AttemptToSendCommandToUninitialized { .. } => {
                "ErrorEvent.AttemptToSendCommandToUninitialized"
            }
            ErrorEvent::AggregateInvalidated { .. } => "ErrorEvent.AggregateInvalidated",
        }
    }

    pub fn aggregate_id(&self) -> AggregateId {
        match self {
            ErrorEvent::AttemptToInitializeAlreadyInitialized { aggregate_id, .. }
            | ErrorEvent::AttemptToSendCommandToUninitialized { aggregate_id, .. }
            | ErrorEvent::AggregateInvalidated { aggregate_id, .. } => *aggregate_id,
        }
    }

    pub fn correlation_id(&self) -> CorrelationId {
        match self {
            ErrorEvent::AttemptToInitializeAlreadyInitialized { correlation_id, .. }
            | ErrorEvent::AttemptToSendCommandToUninitialized { correlation_id, .. }
            | ErrorEvent::AggregateInvalidated { correlation_id, .. } => *correlation_id,
        }
    }

    /// 转为总线上的记录形态；`version` 为出错时聚合所处的版本
    pub fn to_serialized(
        &self,
        aggregate_type: &str,
        version: AggregateVersion,
    ) -> DomainResult<SerializedEvent> {
        Ok(SerializedEvent::builder()
            .event_id(Uuid::new_v4())
            .event_type(self.event_type().to_string())
            .aggregate_id(self.aggregate_id())
            .aggregate_type(aggregate_type.to_string())
            .aggregate_version(version)
            .correlation_id(self.correlation_id())
            .occurred_at(Utc::now())
            .payload(serde_json::to_value(self)?)
            .build())
    }
}
