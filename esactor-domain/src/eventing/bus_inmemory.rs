//! 内存版事件总线（InMemoryEventBus）
//!
//! 基于 `tokio::sync::broadcast`：发布即克隆并广播，无订阅者时静默丢弃。
//! 订阅者落后超过缓冲区容量时，其事件流会收到一次 `EventBus` 错误（lagged）。
//!
use crate::error::{DomainError, DomainResult as Result};
use crate::eventing::EventBus;
use crate::persist::SerializedEvent;
use async_trait::async_trait;
use futures_core::stream::BoxStream;
use futures_util::StreamExt;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

pub const DEFAULT_BUS_CAPACITY: usize = 1024;

#[derive(Clone)]
pub struct InMemoryEventBus {
    tx: broadcast::Sender<SerializedEvent>,
}

impl InMemoryEventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for InMemoryEventBus {
    fn default() -> Self {
        Self::new(DEFAULT_BUS_CAPACITY)
    }
}

#[async_trait]
impl EventBus for InMemoryEventBus {
    async fn publish(&self, event: &SerializedEvent) -> Result<()> {
        if self.tx.send(event.clone()).is_err() {
            tracing::trace!(event_type = event.event_type(), "no subscribers, event dropped");
        }
        Ok(())
    }

    async fn subscribe(&self) -> BoxStream<'static, Result<SerializedEvent>> {
        let stream = BroadcastStream::new(self.tx.subscribe())
            .map(|r| r.map_err(|e| DomainError::event_bus(e.to_string())));
        Box::pin(stream)
    }
}
