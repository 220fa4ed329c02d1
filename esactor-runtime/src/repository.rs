//! 聚合仓储（AggregateRepository）
//!
//! 保证聚合在被寻址前已部署：在该聚合地址的命名锁内读取快照与其后的事件，
//! 按持久化类型找到工厂，部署 actor 并等待其完成重放。
//! 同一聚合的并发加载只会有一次存储读取与一次部署；常驻数超出上限时淘汰最久未用者。
//!
use crate::actor::ActorContext;
use crate::bus::{CommandRegistrar, CommandSender};
use crate::config::DEFAULT_MAX_CACHED_AGGREGATES;
use crate::directory::AggregateDirectory;
use crate::error::CommandFailure;
use crate::messages::{ApplySnapshotAndEvents, InvalidateAggregate, ReplayResult, UnloadAggregate};
use crate::named_lock::NamedLocks;
use bon::Builder;
use esactor_domain::{
    address::AggregateAddressStrategy,
    error::DomainError,
    eventing::EventPublisher,
    persist::{EventStore, SerializedEvent, SerializedSnapshot, SnapshotPolicy},
    value_object::{AggregateId, AggregateVersion, CorrelationId},
};
use std::sync::Arc;

/// 一次加载请求的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// 已常驻，未访问存储
    Resident,
    /// 从存储重放后部署
    Loaded { version: AggregateVersion },
    /// 无任何历史，按创建命令部署了空白聚合
    Created,
    /// 无历史且不是创建命令：未部署
    NeverExisted,
}

impl LoadOutcome {
    pub fn is_deployed(&self) -> bool {
        !matches!(self, LoadOutcome::NeverExisted)
    }
}

#[derive(Builder)]
pub struct AggregateRepository {
    directory: Arc<AggregateDirectory>,
    strategy: Arc<dyn AggregateAddressStrategy>,
    store: Arc<dyn EventStore>,
    publisher: EventPublisher,
    registrar: CommandRegistrar,
    sender: CommandSender,
    #[builder(default)]
    locks: NamedLocks,
    #[builder(default)]
    snapshot_policy: SnapshotPolicy,
    #[builder(default = DEFAULT_MAX_CACHED_AGGREGATES)]
    max_cached_aggregates: usize,
}

struct History {
    snapshot: Option<SerializedSnapshot>,
    events: Vec<SerializedEvent>,
}

impl History {
    fn is_empty(&self) -> bool {
        self.snapshot.is_none() && self.events.is_empty()
    }

    fn persisted_type(&self) -> Option<&str> {
        self.snapshot
            .as_ref()
            .map(|s| s.snapshot_type())
            .or_else(|| self.events.first().map(|e| e.event_type()))
    }
}

impl AggregateRepository {
    pub fn directory(&self) -> &Arc<AggregateDirectory> {
        &self.directory
    }

    pub fn locks(&self) -> &NamedLocks {
        &self.locks
    }

    pub fn max_cached_aggregates(&self) -> usize {
        self.max_cached_aggregates
    }

    /// 确保已有历史的聚合常驻；没有历史时返回 `NeverExisted`
    pub async fn ensure_loaded(
        &self,
        aggregate_id: AggregateId,
        correlation_id: CorrelationId,
    ) -> Result<LoadOutcome, CommandFailure> {
        self.load(aggregate_id, None, correlation_id).await
    }

    /// 同 `ensure_loaded`，但没有历史时以 `creation_type` 查找工厂部署空白聚合
    pub async fn ensure_loaded_or_create(
        &self,
        aggregate_id: AggregateId,
        creation_type: &str,
        correlation_id: CorrelationId,
    ) -> Result<LoadOutcome, CommandFailure> {
        self.load(aggregate_id, Some(creation_type), correlation_id)
            .await
    }

    /// 投递失败后调用：地址上已无消费者时移除过期的目录项
    pub fn forget_unroutable(&self, aggregate_id: AggregateId, address: &str) -> bool {
        if self.sender.bus().has_handlers(address) {
            return false;
        }
        let removed = self.directory.forget_if_at(aggregate_id, address);
        if removed {
            tracing::debug!(aggregate_id = %aggregate_id, address, "stale deployment forgotten");
        }
        removed
    }

    /// 要求常驻聚合失效；未常驻时返回 false
    pub fn invalidate(
        &self,
        aggregate_id: AggregateId,
        correlation_id: CorrelationId,
        reason: impl Into<String>,
    ) -> bool {
        let Some(address) = self.directory.address_of(aggregate_id) else {
            return false;
        };
        let message = InvalidateAggregate {
            aggregate_id,
            correlation_id,
            reason: reason.into(),
        };
        match self.sender.send_to(&address, message) {
            Ok(()) => true,
            Err(_) => {
                self.directory.forget_if_at(aggregate_id, &address);
                false
            }
        }
    }

    async fn load(
        &self,
        aggregate_id: AggregateId,
        creation_type: Option<&str>,
        correlation_id: CorrelationId,
    ) -> Result<LoadOutcome, CommandFailure> {
        if self.directory.is_deployed(aggregate_id) {
            self.directory.mark_recently_used(aggregate_id);
            return Ok(LoadOutcome::Resident);
        }

        let address = self.strategy.resolve_address(aggregate_id);
        let _guard = self.locks.lock(&address).await;

        // 等锁期间其他调用方可能已完成部署
        if self.directory.is_deployed(aggregate_id) {
            self.directory.mark_recently_used(aggregate_id);
            return Ok(LoadOutcome::Resident);
        }

        let history = self.read_history(aggregate_id, correlation_id).await?;
        let Some(persisted_type) = history.persisted_type().or(creation_type) else {
            return Ok(LoadOutcome::NeverExisted);
        };
        let persisted_type = persisted_type.to_string();
        let created = history.is_empty();

        let Some(factory) = self.directory.find_factory(&persisted_type) else {
            tracing::error!(
                aggregate_id = %aggregate_id,
                persisted_type = %persisted_type,
                "unable to find aggregate factory"
            );
            return Err(CommandFailure::UnableToFindAggregateFactory {
                aggregate_id,
                persisted_type,
            });
        };

        if self.sender.bus().has_handlers(&address) {
            return Err(CommandFailure::Deployment {
                aggregate_id,
                reason: format!("address {address} is still bound"),
            });
        }

        let instance = factory(aggregate_id);
        let aggregate_type = instance.aggregate_type();
        let (consumer, mailbox) = self.registrar.mailbox(&address);
        let context = ActorContext::new(
            aggregate_id,
            address.clone(),
            consumer,
            self.store.clone(),
            self.publisher.clone(),
            self.directory.clone(),
            self.locks.clone(),
            self.snapshot_policy,
        );
        instance.start(mailbox, context);

        // 重放消息先于任何命令入队，之后才对外可见
        let replay = ApplySnapshotAndEvents {
            aggregate_id,
            correlation_id,
            snapshot: history.snapshot,
            events: history.events,
        };
        let pending = self
            .sender
            .dispatch::<ReplayResult>(&address, Box::new(replay))
            .map_err(|(err, _)| CommandFailure::Bus(err))?;
        self.directory.record_deployment(aggregate_id, address.as_str());

        let version = match pending.wait().await {
            Ok(Ok(version)) => version,
            Ok(Err(failure)) => {
                self.directory.forget_if_at(aggregate_id, &address);
                tracing::error!(
                    aggregate_id = %aggregate_id,
                    error = %failure,
                    "aggregate replay failed"
                );
                return Err(failure);
            }
            Err(err) => {
                self.directory.forget_if_at(aggregate_id, &address);
                // 仍在运行的 actor 收到后自行退出
                let _ = self.sender.send_to(
                    &address,
                    InvalidateAggregate {
                        aggregate_id,
                        correlation_id,
                        reason: err.to_string(),
                    },
                );
                return Err(CommandFailure::Bus(err));
            }
        };

        tracing::info!(
            aggregate_type,
            aggregate_id = %aggregate_id,
            address = %address,
            version = version.value(),
            "aggregate deployed"
        );
        self.evict_if_needed(aggregate_id);

        Ok(if created {
            LoadOutcome::Created
        } else {
            LoadOutcome::Loaded { version }
        })
    }

    async fn read_history(
        &self,
        aggregate_id: AggregateId,
        correlation_id: CorrelationId,
    ) -> Result<History, CommandFailure> {
        let storage = |source: DomainError| {
            tracing::error!(aggregate_id = %aggregate_id, error = %source, "failed to load aggregate");
            CommandFailure::Storage {
                aggregate_id,
                correlation_id,
                source,
            }
        };

        let snapshot = self
            .store
            .load_latest_snapshot(aggregate_id)
            .await
            .map_err(storage)?;
        let from = snapshot
            .as_ref()
            .map_or(AggregateVersion::INITIAL, |s| s.aggregate_version().next());
        let events = self
            .store
            .load_events(aggregate_id, from)
            .await
            .map_err(storage)?;

        Ok(History { snapshot, events })
    }

    /// 常驻数超出上限时按最久未用依次卸载，刚部署的聚合不参与
    fn evict_if_needed(&self, loaded: AggregateId) {
        while self.directory.resident_count() > self.max_cached_aggregates {
            let Some(victim) = self.directory.least_recently_used(loaded) else {
                return;
            };
            if !self.directory.begin_unload(victim) {
                continue;
            }
            let Some(address) = self.directory.address_of(victim) else {
                continue;
            };
            tracing::debug!(aggregate_id = %victim, address = %address, "evicting aggregate");
            if self
                .sender
                .send_to(&address, UnloadAggregate { aggregate_id: victim })
                .is_err()
            {
                self.directory.forget_if_at(victim, &address);
            }
        }
    }
}
