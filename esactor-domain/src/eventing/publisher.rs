//! 事件发布器（EventPublisher）
//!
//! “发后即忘”：每个事件单独发布一次，保持传入顺序；
//! 总线错误只记录日志，不回传给调用方。
//!
use crate::{
    eventing::EventBus, message::ErrorEvent, persist::SerializedEvent,
    value_object::AggregateVersion,
};
use std::sync::Arc;

#[derive(Clone)]
pub struct EventPublisher {
    bus: Arc<dyn EventBus>,
}

impl EventPublisher {
    pub fn new(bus: Arc<dyn EventBus>) -> Self {
        Self { bus }
    }

    pub fn bus(&self) -> &Arc<dyn EventBus> {
        &self.bus
    }

    pub async fn publish(&self, event: &SerializedEvent) {
        if let Err(err) = self.bus.publish(event).await {
            tracing::error!(
                event_type = event.event_type(),
                aggregate_id = %event.aggregate_id(),
                version = event.aggregate_version().value(),
                error = %err,
                "failed to publish event"
            );
        }
    }

    pub async fn publish_all(&self, events: &[SerializedEvent]) {
        for event in events {
            self.publish(event).await;
        }
    }

    /// 发布错误事件（错误事件只上总线，不入事件流）
    pub async fn publish_error(
        &self,
        aggregate_type: &str,
        version: AggregateVersion,
        error: &ErrorEvent,
    ) {
        match error.to_serialized(aggregate_type, version) {
            Ok(event) => self.publish(&event).await,
            Err(err) => tracing::error!(
                event_type = error.event_type(),
                aggregate_id = %error.aggregate_id(),
                error = %err,
                "failed to encode error event"
            ),
        }
    }
}
