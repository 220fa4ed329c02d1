use crate::value_object::{AggregateId, AggregateVersion, CorrelationId};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fmt;

/// 聚合事件载荷需要满足的通用能力边界
///
/// 通常由 `#[aggregate_event]` 宏为事件枚举生成实现。
pub trait AggregateEvent:
    Clone + PartialEq + fmt::Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// 该事件枚举可能持久化出的全部事件类型
    const EVENT_TYPES: &'static [&'static str];

    /// 持久化类型（形如 `OrderEvent.Created`），用于查找聚合工厂
    fn event_type(&self) -> &'static str;

    fn aggregate_id(&self) -> AggregateId;

    /// 该事件产生的聚合版本
    fn aggregate_version(&self) -> AggregateVersion;

    fn correlation_id(&self) -> CorrelationId;
}
