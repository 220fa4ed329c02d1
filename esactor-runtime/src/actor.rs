//! 聚合 actor
//!
//! 每个常驻聚合一个任务、一个邮箱、一个消费循环，消息逐条处理完毕后才取下一条。
//! 邮箱中的消息先解码为 `Inbox` 再穷尽匹配。
//!
//! 退出路径：
//! - 卸载：取得该地址的加载锁，解绑地址并移除目录项，处理完已入队消息后退出；
//! - 失效（事件未能落库或收到失效消息）：解绑、移除目录项，
//!   对积压消息一律应答 `AggregateInvalidated`，发布错误事件后退出；
//! - 重放失败：解绑、移除目录项，拒绝积压消息后退出。
//!
use crate::aggregate::EventSourcedAggregate;
use crate::bus::{Delivery, Envelope, Mailbox, MessageConsumer};
use crate::delegate::EventSourcingDelegate;
use crate::directory::AggregateDirectory;
use crate::error::CommandFailure;
use crate::messages::{
    ApplySnapshotAndEvents, CommandAck, CommandResult, InvalidateAggregate, ReplayResult,
    UnloadAggregate,
};
use crate::named_lock::NamedLocks;
use esactor_domain::{
    error::DomainError,
    eventing::EventPublisher,
    message::{AggregateCommand, DomainCommand, ErrorEvent},
    persist::{EventStore, SnapshotPolicy},
    value_object::{AggregateId, AggregateVersion, CorrelationId},
};
use std::marker::PhantomData;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::Instrument;

/// 工厂产出的、尚未启动的聚合实例
pub trait AggregateInstance: Send + 'static {
    fn aggregate_type(&self) -> &'static str;

    /// 在已绑定的邮箱上启动消费循环
    fn start(self: Box<Self>, mailbox: Mailbox, context: ActorContext) -> JoinHandle<()>;
}

/// 部署时注入给 actor 的协作者
pub struct ActorContext {
    aggregate_id: AggregateId,
    address: String,
    consumer: MessageConsumer,
    store: Arc<dyn EventStore>,
    publisher: EventPublisher,
    directory: Arc<AggregateDirectory>,
    locks: NamedLocks,
    snapshot_policy: SnapshotPolicy,
    retired: bool,
}

impl ActorContext {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        aggregate_id: AggregateId,
        address: String,
        consumer: MessageConsumer,
        store: Arc<dyn EventStore>,
        publisher: EventPublisher,
        directory: Arc<AggregateDirectory>,
        locks: NamedLocks,
        snapshot_policy: SnapshotPolicy,
    ) -> Self {
        Self {
            aggregate_id,
            address,
            consumer,
            store,
            publisher,
            directory,
            locks,
            snapshot_policy,
            retired: false,
        }
    }

    pub fn aggregate_id(&self) -> AggregateId {
        self.aggregate_id
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn publisher(&self) -> &EventPublisher {
        &self.publisher
    }

    pub fn delegate(&self, aggregate_type: &'static str) -> EventSourcingDelegate {
        EventSourcingDelegate::new(
            self.aggregate_id,
            aggregate_type,
            self.store.clone(),
            self.publisher.clone(),
        )
    }

    /// 停止接收新消息并移除目录项，只生效一次
    ///
    /// 之后同一地址上可能已有新的部署，再次移除会误删新目录项。
    pub fn retire(&mut self) {
        if self.retired {
            return;
        }
        self.retired = true;
        self.consumer.unregister();
        self.directory.forget_if_at(self.aggregate_id, &self.address);
    }
}

enum Inbox<C> {
    Apply(Delivery<ApplySnapshotAndEvents>),
    Invalidate(Delivery<InvalidateAggregate>),
    Unload(Delivery<UnloadAggregate>),
    Command(Delivery<C>),
    Unknown(Envelope),
}

impl<C: Send + 'static> From<Envelope> for Inbox<C> {
    fn from(envelope: Envelope) -> Self {
        let envelope = match envelope.downcast() {
            Ok(d) => return Inbox::Command(d),
            Err(e) => e,
        };
        let envelope = match envelope.downcast() {
            Ok(d) => return Inbox::Apply(d),
            Err(e) => e,
        };
        let envelope = match envelope.downcast() {
            Ok(d) => return Inbox::Invalidate(d),
            Err(e) => e,
        };
        match envelope.downcast() {
            Ok(d) => Inbox::Unload(d),
            Err(e) => Inbox::Unknown(e),
        }
    }
}

enum Exit {
    Unload,
    Invalidate {
        correlation_id: CorrelationId,
        reason: String,
    },
    ReplayFailed,
}

pub(crate) struct AggregateActor<A> {
    aggregate_id: AggregateId,
    _aggregate: PhantomData<fn() -> A>,
}

impl<A> AggregateActor<A> {
    pub(crate) fn new(aggregate_id: AggregateId) -> Self {
        Self {
            aggregate_id,
            _aggregate: PhantomData,
        }
    }
}

impl<A: EventSourcedAggregate> AggregateInstance for AggregateActor<A> {
    fn aggregate_type(&self) -> &'static str {
        A::TYPE
    }

    fn start(self: Box<Self>, mailbox: Mailbox, context: ActorContext) -> JoinHandle<()> {
        let runner = Runner::<A> {
            aggregate: A::new(self.aggregate_id),
            delegate: context.delegate(A::TYPE),
            context,
        };
        tokio::spawn(runner.run(mailbox))
    }
}

struct Runner<A: EventSourcedAggregate> {
    aggregate: A,
    delegate: EventSourcingDelegate,
    context: ActorContext,
}

impl<A: EventSourcedAggregate> Runner<A> {
    async fn run(mut self, mut mailbox: Mailbox) {
        tracing::info!(
            aggregate_type = A::TYPE,
            aggregate_id = %self.context.aggregate_id,
            address = %self.context.address,
            "aggregate actor started"
        );

        let exit = loop {
            let Some(envelope) = mailbox.recv().await else {
                break None;
            };
            if let Some(exit) = self.handle(envelope).await {
                break Some(exit);
            }
        };

        match exit {
            Some(Exit::Unload) => self.unload(mailbox).await,
            Some(Exit::Invalidate {
                correlation_id,
                reason,
            }) => self.invalidate(mailbox, correlation_id, &reason).await,
            Some(Exit::ReplayFailed) => {
                self.context.retire();
                mailbox.close();
                reject_pending::<A::Command>(&mut mailbox, self.context.aggregate_id);
            }
            None => self.context.retire(),
        }
    }

    async fn handle(&mut self, envelope: Envelope) -> Option<Exit> {
        match Inbox::<A::Command>::from(envelope) {
            Inbox::Command(delivery) => {
                let (command, reply) = delivery.into_parts();
                let correlation_id = command.correlation_id();
                let span = tracing::info_span!(
                    "handle_command",
                    aggregate_type = A::TYPE,
                    aggregate_id = %self.context.aggregate_id,
                    correlation_id = %correlation_id,
                    command = command.command_name(),
                );
                let result = self.execute(command).instrument(span).await;
                let exit = match &result {
                    Err(failure) if failure.requires_invalidation() => {
                        // 应答前解绑，调用方随后的命令会触发重新加载
                        self.context.retire();
                        Some(Exit::Invalidate {
                            correlation_id,
                            reason: failure.to_string(),
                        })
                    }
                    _ => None,
                };
                reply.reply::<CommandResult>(result);
                exit
            }
            Inbox::Apply(delivery) => {
                let (message, reply) = delivery.into_parts();
                let result = self.replay(message);
                let exit = result.is_err().then_some(Exit::ReplayFailed);
                if exit.is_some() {
                    self.context.retire();
                }
                reply.reply::<ReplayResult>(result);
                exit
            }
            Inbox::Invalidate(delivery) => {
                let (message, reply) = delivery.into_parts();
                reply.reply(());
                Some(Exit::Invalidate {
                    correlation_id: message.correlation_id,
                    reason: message.reason,
                })
            }
            Inbox::Unload(delivery) => {
                delivery.reply(());
                Some(Exit::Unload)
            }
            Inbox::Unknown(envelope) => {
                tracing::warn!(
                    aggregate_id = %self.context.aggregate_id,
                    address = envelope.address(),
                    codec = envelope.codec(),
                    "dropping message of unknown type"
                );
                None
            }
        }
    }

    async fn execute(&mut self, command: A::Command) -> CommandResult {
        let correlation_id = command.correlation_id();
        let before = self.delegate.version();

        let events = match self.aggregate.handle(command, &mut self.delegate) {
            Ok(events) => events,
            Err(failure) => {
                self.delegate.restore_version(before);
                if let CommandFailure::VersionGuard(error) = &failure {
                    self.delegate.fail(error).await;
                }
                return Err(failure);
            }
        };

        for event in &events {
            self.aggregate.apply_event(event);
        }
        self.delegate
            .store_and_publish_events(&events, correlation_id)
            .await?;
        self.maybe_snapshot(before, correlation_id).await;

        Ok(CommandAck {
            aggregate_id: self.context.aggregate_id,
            version: self.delegate.version(),
            events: events.len(),
        })
    }

    async fn maybe_snapshot(&mut self, before: AggregateVersion, correlation_id: CorrelationId) {
        let policy = self.context.snapshot_policy;
        let after = self.delegate.version().value();
        if !(before.value() + 1..=after).any(|v| policy.should_snapshot(v)) {
            return;
        }
        let Some(snapshot) = self.aggregate.snapshot() else {
            return;
        };
        if let Err(err) = self.delegate.store_snapshot(&snapshot, correlation_id).await {
            // 快照只是加速，失败不影响命令结果
            tracing::warn!(
                aggregate_id = %self.context.aggregate_id,
                error = %err,
                "failed to store snapshot"
            );
        }
    }

    fn replay(&mut self, message: ApplySnapshotAndEvents) -> ReplayResult {
        let storage = |source: DomainError| CommandFailure::Storage {
            aggregate_id: message.aggregate_id,
            correlation_id: message.correlation_id,
            source,
        };

        if let Some(serialized) = &message.snapshot {
            let snapshot: A::Snapshot = serialized.to_snapshot().map_err(storage)?;
            self.delegate.apply_snapshot(&snapshot);
            self.aggregate.apply_snapshot(snapshot);
        }
        for serialized in &message.events {
            let event: A::Event = serialized.to_event().map_err(storage)?;
            self.aggregate.apply_event(&event);
            self.delegate.apply_replayed_event(&event);
        }

        tracing::debug!(
            aggregate_id = %self.context.aggregate_id,
            snapshot = message.snapshot.is_some(),
            events = message.events.len(),
            version = self.delegate.version().value(),
            "aggregate state replayed"
        );
        Ok(self.delegate.version())
    }

    async fn unload(mut self, mut mailbox: Mailbox) {
        // 排空期间持有加载锁，同一地址的重新部署须等待排空结束
        let locks = self.context.locks.clone();
        let _guard = locks.lock(&self.context.address).await;
        self.context.retire();
        mailbox.close();
        while let Some(envelope) = mailbox.recv().await {
            if let Some(Exit::Invalidate {
                correlation_id,
                reason,
            }) = self.handle(envelope).await
            {
                self.invalidate(mailbox, correlation_id, &reason).await;
                return;
            }
        }
        tracing::info!(
            aggregate_type = A::TYPE,
            aggregate_id = %self.context.aggregate_id,
            "aggregate unloaded"
        );
    }

    async fn invalidate(mut self, mut mailbox: Mailbox, correlation_id: CorrelationId, reason: &str) {
        self.context.retire();
        mailbox.close();
        let rejected = reject_pending::<A::Command>(&mut mailbox, self.context.aggregate_id);

        let event = ErrorEvent::AggregateInvalidated {
            aggregate_id: self.context.aggregate_id,
            correlation_id,
            reason: reason.to_string(),
        };
        self.context
            .publisher
            .publish_error(A::TYPE, self.delegate.version(), &event)
            .await;

        tracing::info!(
            aggregate_type = A::TYPE,
            aggregate_id = %self.context.aggregate_id,
            correlation_id = %correlation_id,
            rejected,
            reason,
            "aggregate invalidated"
        );
    }
}

/// 对邮箱中剩余的消息逐一应答失败
fn reject_pending<C: Send + 'static>(mailbox: &mut Mailbox, aggregate_id: AggregateId) -> usize {
    let mut rejected = 0;
    while let Some(envelope) = mailbox.try_recv() {
        match Inbox::<C>::from(envelope) {
            Inbox::Command(d) => {
                d.reply::<CommandResult>(Err(CommandFailure::AggregateInvalidated(aggregate_id)));
            }
            Inbox::Apply(d) => {
                d.reply::<ReplayResult>(Err(CommandFailure::AggregateInvalidated(aggregate_id)));
            }
            Inbox::Invalidate(d) => {
                d.reply(());
            }
            Inbox::Unload(d) => {
                d.reply(());
            }
            Inbox::Unknown(_) => {}
        }
        rejected += 1;
    }
    rejected
}
