//! 事件溯源委托（EventSourcingDelegate）
//!
//! 每个常驻聚合 actor 一个实例，独占该聚合的版本计数并中介所有新事件的“先存储、后发布”。
//! actor 的邮箱一次只交付一条消息，因此版本字段无需内部加锁。
//!
use crate::error::CommandFailure;
use esactor_domain::{
    error::DomainError,
    eventing::EventPublisher,
    message::{AggregateCommand, AggregateEvent, AggregateSnapshot, ErrorEvent},
    persist::{EventStore, SerializedSnapshot, serialize_events},
    value_object::{AggregateId, AggregateVersion, CorrelationId},
};
use std::sync::Arc;

pub struct EventSourcingDelegate {
    aggregate_id: AggregateId,
    aggregate_type: &'static str,
    version: AggregateVersion,
    store: Arc<dyn EventStore>,
    publisher: EventPublisher,
}

impl EventSourcingDelegate {
    pub fn new(
        aggregate_id: AggregateId,
        aggregate_type: &'static str,
        store: Arc<dyn EventStore>,
        publisher: EventPublisher,
    ) -> Self {
        Self {
            aggregate_id,
            aggregate_type,
            version: AggregateVersion::INITIAL,
            store,
            publisher,
        }
    }

    pub fn aggregate_id(&self) -> AggregateId {
        self.aggregate_id
    }

    pub fn aggregate_type(&self) -> &'static str {
        self.aggregate_type
    }

    pub fn version(&self) -> AggregateVersion {
        self.version
    }

    pub fn is_initialized(&self) -> bool {
        !self.version.is_initial()
    }

    /// 创建命令取得版本 1；聚合已初始化时返回错误事件，版本不变
    pub fn first_version<C: AggregateCommand>(
        &mut self,
        command: &C,
    ) -> Result<AggregateVersion, ErrorEvent> {
        if self.is_initialized() {
            return Err(ErrorEvent::AttemptToInitializeAlreadyInitialized {
                aggregate_id: self.aggregate_id,
                command: command.command_name().to_string(),
                correlation_id: command.correlation_id(),
            });
        }
        self.version = self.version.next();
        Ok(self.version)
    }

    /// 普通命令取得下一个版本；聚合未初始化时返回错误事件，版本不变
    pub fn next_version<C: AggregateCommand>(
        &mut self,
        command: &C,
    ) -> Result<AggregateVersion, ErrorEvent> {
        if !self.is_initialized() {
            return Err(ErrorEvent::AttemptToSendCommandToUninitialized {
                aggregate_id: self.aggregate_id,
                command: command.command_name().to_string(),
                correlation_id: command.correlation_id(),
            });
        }
        self.version = self.version.next();
        Ok(self.version)
    }

    /// 重放快照时直接采用其版本，绕过递增守卫
    pub fn apply_snapshot<S: AggregateSnapshot>(&mut self, snapshot: &S) {
        self.version = snapshot.aggregate_version();
    }

    /// 重放已持久化事件时采用其版本
    pub fn apply_replayed_event<E: AggregateEvent>(&mut self, event: &E) {
        self.version = event.aggregate_version();
    }

    /// 命令被拒绝时回退 `handle` 期间分配的版本
    pub(crate) fn restore_version(&mut self, version: AggregateVersion) {
        self.version = version;
    }

    /// 追加事件，成功后逐条发布（保持顺序）；追加失败时不发布任何事件
    pub async fn store_and_publish_events<E: AggregateEvent>(
        &self,
        events: &[E],
        correlation_id: CorrelationId,
    ) -> Result<(), CommandFailure> {
        if events.is_empty() {
            return Ok(());
        }

        let unable_to_store = |source: DomainError| CommandFailure::UnableToStoreAggregateEvents {
            aggregate_id: self.aggregate_id,
            correlation_id,
            event_count: events.len(),
            source,
        };

        let serialized = serialize_events(self.aggregate_type, events).map_err(unable_to_store)?;

        if let Err(err) = self
            .store
            .append_events(self.aggregate_id, serialized.clone())
            .await
        {
            tracing::error!(
                aggregate_id = %self.aggregate_id,
                correlation_id = %correlation_id,
                count = events.len(),
                error = %err,
                "unable to store aggregate events"
            );
            return Err(unable_to_store(err));
        }

        tracing::debug!(
            aggregate_id = %self.aggregate_id,
            version = self.version.value(),
            count = serialized.len(),
            "events stored"
        );
        self.publisher.publish_all(&serialized).await;
        Ok(())
    }

    /// 发布错误事件（不入事件流）
    pub async fn fail(&self, error: &ErrorEvent) {
        tracing::warn!(
            aggregate_id = %self.aggregate_id,
            correlation_id = %error.correlation_id(),
            error = %error,
            "command rejected by version guard"
        );
        self.publisher
            .publish_error(self.aggregate_type, self.version, error)
            .await;
    }

    pub async fn store_snapshot<S: AggregateSnapshot>(
        &self,
        snapshot: &S,
        correlation_id: CorrelationId,
    ) -> Result<(), CommandFailure> {
        let storage = |source: DomainError| CommandFailure::Storage {
            aggregate_id: self.aggregate_id,
            correlation_id,
            source,
        };
        let serialized =
            SerializedSnapshot::from_snapshot(self.aggregate_type, snapshot).map_err(storage)?;
        self.store
            .append_snapshot(serialized)
            .await
            .map_err(storage)?;
        tracing::debug!(
            aggregate_id = %self.aggregate_id,
            version = snapshot.aggregate_version().value(),
            "snapshot stored"
        );
        Ok(())
    }
}
