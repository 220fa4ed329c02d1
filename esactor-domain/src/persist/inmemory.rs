//! 内存版事件存储（InMemoryEventStore）
//!
//! 每个聚合一条有序事件向量与一组快照，语义与 Postgres 后端一致：
//! `(aggregate_id, version)` 唯一，事件版本必须紧接在已存最后一个版本之后。
//! 典型用途：测试环境、示例与本地开发。
//!
use crate::{
    error::{DomainError, DomainResult as Result},
    persist::{EventStore, SerializedEvent, SerializedSnapshot},
    value_object::{AggregateId, AggregateVersion},
};
use async_trait::async_trait;
use std::{collections::HashMap, sync::Arc};
use tokio::sync::RwLock;

#[derive(Default)]
struct Streams {
    events: HashMap<AggregateId, Vec<SerializedEvent>>,
    snapshots: HashMap<AggregateId, Vec<SerializedSnapshot>>,
}

#[derive(Clone, Default)]
pub struct InMemoryEventStore {
    inner: Arc<RwLock<Streams>>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 某聚合已存事件数
    pub async fn event_count(&self, aggregate_id: AggregateId) -> usize {
        let streams = self.inner.read().await;
        streams.events.get(&aggregate_id).map_or(0, Vec::len)
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn load_latest_snapshot(
        &self,
        aggregate_id: AggregateId,
    ) -> Result<Option<SerializedSnapshot>> {
        let streams = self.inner.read().await;
        Ok(streams
            .snapshots
            .get(&aggregate_id)
            .and_then(|snaps| snaps.iter().max_by_key(|s| s.aggregate_version()))
            .cloned())
    }

    async fn load_events(
        &self,
        aggregate_id: AggregateId,
        from_version: AggregateVersion,
    ) -> Result<Vec<SerializedEvent>> {
        let streams = self.inner.read().await;
        Ok(streams
            .events
            .get(&aggregate_id)
            .map(|stream| {
                stream
                    .iter()
                    .filter(|e| e.aggregate_version() >= from_version)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn append_events(
        &self,
        aggregate_id: AggregateId,
        events: Vec<SerializedEvent>,
    ) -> Result<usize> {
        let mut streams = self.inner.write().await;
        let stream = streams.events.entry(aggregate_id).or_default();

        // 先整体校验再写入，保证一批事件要么全部落库要么全部拒绝
        let mut last = stream
            .last()
            .map(|e| e.aggregate_version())
            .unwrap_or(AggregateVersion::INITIAL);
        for event in &events {
            if event.aggregate_id() != aggregate_id {
                return Err(DomainError::event_store(format!(
                    "event {} belongs to aggregate {}, not {}",
                    event.event_id(),
                    event.aggregate_id(),
                    aggregate_id
                )));
            }
            if event.aggregate_version() != last.next() {
                return Err(DomainError::VersionConflict {
                    aggregate_id: aggregate_id.to_string(),
                    expected: last.next().value(),
                    actual: event.aggregate_version().value(),
                });
            }
            last = event.aggregate_version();
        }

        let count = events.len();
        stream.extend(events);
        Ok(count)
    }

    async fn append_snapshot(&self, snapshot: SerializedSnapshot) -> Result<usize> {
        let mut streams = self.inner.write().await;
        let snaps = streams.snapshots.entry(snapshot.aggregate_id()).or_default();
        if snaps
            .iter()
            .any(|s| s.aggregate_version() == snapshot.aggregate_version())
        {
            return Err(DomainError::SnapshotExists {
                aggregate_id: snapshot.aggregate_id().to_string(),
                version: snapshot.aggregate_version().value(),
            });
        }
        snaps.push(snapshot);
        Ok(1)
    }
}
