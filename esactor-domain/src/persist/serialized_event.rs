//! 事件持久化模型（SerializedEvent）
//!
//! 事件在存储层与事件总线上的标准形态，以及与类型化聚合事件之间的转换。
//! 一行存储记录对应一个 JSON 编码的事件。
//!
use crate::{
    error::{DomainError, DomainResult},
    message::AggregateEvent,
    value_object::{AggregateId, AggregateVersion, CorrelationId},
};
use bon::Builder;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Builder, Serialize, Deserialize)]
pub struct SerializedEvent {
    /// 事件唯一标识符
    event_id: Uuid,
    /// 持久化类型，用于反序列化与查找聚合工厂
    event_type: String,
    /// 聚合 ID，标识事件所属的聚合实例
    aggregate_id: AggregateId,
    /// 聚合类型
    aggregate_type: String,
    /// 该事件产生的聚合版本
    aggregate_version: AggregateVersion,
    /// 触发命令的关联 ID
    correlation_id: CorrelationId,
    /// 事件发生时间
    occurred_at: DateTime<Utc>,
    /// 事件负载
    payload: Value,
}

impl SerializedEvent {
    pub fn event_id(&self) -> Uuid {
        self.event_id
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn aggregate_id(&self) -> AggregateId {
        self.aggregate_id
    }

    pub fn aggregate_type(&self) -> &str {
        &self.aggregate_type
    }

    pub fn aggregate_version(&self) -> AggregateVersion {
        self.aggregate_version
    }

    pub fn correlation_id(&self) -> CorrelationId {
        self.correlation_id
    }

    pub fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }

    pub fn payload(&self) -> &Value {
        &self.payload
    }

    /// 从类型化事件创建持久化记录
    pub fn from_event<E>(aggregate_type: &str, event: &E) -> DomainResult<Self>
    where
        E: AggregateEvent,
    {
        Ok(Self {
            event_id: Uuid::new_v4(),
            event_type: event.event_type().to_string(),
            aggregate_id: event.aggregate_id(),
            aggregate_type: aggregate_type.to_string(),
            aggregate_version: event.aggregate_version(),
            correlation_id: event.correlation_id(),
            occurred_at: Utc::now(),
            payload: serde_json::to_value(event)?,
        })
    }

    /// 反序列化为类型化事件；事件类型不属于 `E` 时报错
    pub fn to_event<E>(&self) -> DomainResult<E>
    where
        E: AggregateEvent,
    {
        if !E::EVENT_TYPES.contains(&self.event_type.as_str()) {
            return Err(DomainError::TypeMismatch {
                expected: E::EVENT_TYPES.join("|"),
                found: self.event_type.clone(),
            });
        }

        Ok(serde_json::from_value(self.payload.clone())?)
    }
}

pub fn serialize_events<E>(aggregate_type: &str, events: &[E]) -> DomainResult<Vec<SerializedEvent>>
where
    E: AggregateEvent,
{
    events
        .iter()
        .map(|e| SerializedEvent::from_event(aggregate_type, e))
        .collect()
}

pub fn deserialize_events<E>(events: &[SerializedEvent]) -> DomainResult<Vec<E>>
where
    E: AggregateEvent,
{
    events.iter().map(SerializedEvent::to_event).collect()
}
