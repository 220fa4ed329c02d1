//! 事件总线（EventBus）协议
//!
//! 订阅者拿到的是 `'static` 生命周期事件流，便于在 `tokio::spawn` 中消费。
//!
use crate::{error::DomainResult as Result, persist::SerializedEvent};
use async_trait::async_trait;
use futures_core::stream::BoxStream;
use futures_util::StreamExt;
use std::sync::Arc;

#[async_trait]
pub trait EventBus: Send + Sync {
    /// 将事件投递给当前全部订阅者
    async fn publish(&self, event: &SerializedEvent) -> Result<()>;

    async fn subscribe(&self) -> BoxStream<'static, Result<SerializedEvent>>;

    /// 仅订阅给定持久化类型的事件（地址即事件类型名）
    async fn subscribe_to(
        &self,
        event_types: &[&str],
    ) -> BoxStream<'static, Result<SerializedEvent>> {
        let wanted: Vec<String> = event_types.iter().map(|t| t.to_string()).collect();
        let stream = self.subscribe().await.filter(move |item| {
            let keep = match item {
                Ok(event) => wanted.iter().any(|t| t == event.event_type()),
                Err(_) => true,
            };
            std::future::ready(keep)
        });
        Box::pin(stream)
    }
}

#[async_trait]
impl<T> EventBus for Arc<T>
where
    T: EventBus + ?Sized,
{
    async fn publish(&self, event: &SerializedEvent) -> Result<()> {
        (**self).publish(event).await
    }

    async fn subscribe(&self) -> BoxStream<'static, Result<SerializedEvent>> {
        (**self).subscribe().await
    }

    async fn subscribe_to(
        &self,
        event_types: &[&str],
    ) -> BoxStream<'static, Result<SerializedEvent>> {
        (**self).subscribe_to(event_types).await
    }
}
