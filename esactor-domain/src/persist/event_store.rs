//! 事件/快照存储协议（EventStore）
//!
//! 外部协作者接口：运行时只通过这四个操作访问事件流与快照，
//! 具体后端（内存、Postgres 等）由上层选择并注入。
//!
use crate::{
    error::DomainResult as Result,
    persist::{SerializedEvent, SerializedSnapshot},
    value_object::{AggregateId, AggregateVersion},
};
use async_trait::async_trait;
use std::sync::Arc;

#[async_trait]
pub trait EventStore: Send + Sync {
    /// 读取最新（版本最大）的快照，至多一条
    async fn load_latest_snapshot(
        &self,
        aggregate_id: AggregateId,
    ) -> Result<Option<SerializedSnapshot>>;

    /// 读取版本号 `>= from_version` 的事件，按版本升序
    async fn load_events(
        &self,
        aggregate_id: AggregateId,
        from_version: AggregateVersion,
    ) -> Result<Vec<SerializedEvent>>;

    /// 追加事件，返回写入条数
    async fn append_events(
        &self,
        aggregate_id: AggregateId,
        events: Vec<SerializedEvent>,
    ) -> Result<usize>;

    /// 追加快照，返回写入条数
    async fn append_snapshot(&self, snapshot: SerializedSnapshot) -> Result<usize>;
}

#[async_trait]
impl<T> EventStore for Arc<T>
where
    T: EventStore + ?Sized,
{
    async fn load_latest_snapshot(
        &self,
        aggregate_id: AggregateId,
    ) -> Result<Option<SerializedSnapshot>> {
        (**self).load_latest_snapshot(aggregate_id).await
    }

    async fn load_events(
        &self,
        aggregate_id: AggregateId,
        from_version: AggregateVersion,
    ) -> Result<Vec<SerializedEvent>> {
        (**self).load_events(aggregate_id, from_version).await
    }

    async fn append_events(
        &self,
        aggregate_id: AggregateId,
        events: Vec<SerializedEvent>,
    ) -> Result<usize> {
        (**self).append_events(aggregate_id, events).await
    }

    async fn append_snapshot(&self, snapshot: SerializedSnapshot) -> Result<usize> {
        (**self).append_snapshot(snapshot).await
    }
}
