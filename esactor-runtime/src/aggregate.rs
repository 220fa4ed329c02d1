//! 事件溯源聚合（EventSourcedAggregate）
//!
//! 聚合只负责两件事：根据当前状态决定命令产生的事件（`handle`），
//! 以及把事件/快照折叠进状态（`apply_event`/`apply_snapshot`）。
//! 版本分配经由 `EventSourcingDelegate`，存储与发布由 actor 完成。
//!
use crate::actor::{AggregateActor, AggregateInstance};
use crate::delegate::EventSourcingDelegate;
use crate::directory::{AggregateDirectory, AggregateFactory};
use crate::error::CommandFailure;
use esactor_domain::{
    message::{AggregateCommand, AggregateEvent, AggregateSnapshot, Message, NoSnapshot},
    value_object::AggregateId,
};
use std::sync::Arc;

pub trait EventSourcedAggregate: Send + 'static {
    /// 聚合类型名，写入持久化记录
    const TYPE: &'static str;

    type Command: AggregateCommand;
    type Event: AggregateEvent;
    type Snapshot: AggregateSnapshot;

    fn new(aggregate_id: AggregateId) -> Self;

    fn apply_event(&mut self, event: &Self::Event);

    fn apply_snapshot(&mut self, snapshot: Self::Snapshot);

    /// 决定阶段：不修改状态，只返回新事件
    ///
    /// 创建命令调用 `delegate.first_version`，其余命令调用 `delegate.next_version`，
    /// 版本守卫失败经 `?` 转为 `CommandFailure::VersionGuard`。
    fn handle(
        &self,
        command: Self::Command,
        delegate: &mut EventSourcingDelegate,
    ) -> Result<Vec<Self::Event>, CommandFailure>;

    /// 当前状态的快照；返回 `None` 表示不支持
    fn snapshot(&self) -> Option<Self::Snapshot> {
        None
    }
}

pub fn aggregate_factory<A: EventSourcedAggregate>() -> AggregateFactory {
    Arc::new(|aggregate_id: AggregateId| -> Box<dyn AggregateInstance> {
        Box::new(AggregateActor::<A>::new(aggregate_id))
    })
}

/// 以同一工厂注册聚合的全部事件类型、快照类型与命令地址（创建命令据此实例化）
pub fn register_aggregate<A: EventSourcedAggregate>(directory: &AggregateDirectory) {
    let factory = aggregate_factory::<A>();
    for event_type in <A::Event as AggregateEvent>::EVENT_TYPES {
        directory.register_factory(*event_type, A::TYPE, factory.clone());
    }
    let snapshot_type = <A::Snapshot as AggregateSnapshot>::SNAPSHOT_TYPE;
    if snapshot_type != NoSnapshot::SNAPSHOT_TYPE {
        directory.register_factory(snapshot_type, A::TYPE, factory.clone());
    }
    directory.register_factory(<A::Command as Message>::ADDRESS, A::TYPE, factory);
    tracing::info!(aggregate_type = A::TYPE, "aggregate registered");
}
