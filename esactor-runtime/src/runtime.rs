//! 运行时装配（AggregateRuntime）
//!
//! 在进程启动时以构造注入的方式把总线、目录、仓储与路由器连接起来。
//! 须在 tokio 运行时内调用 `start`：路由器的消费循环随即启动。
//!
use crate::aggregate::{self, EventSourcedAggregate};
use crate::bus::{CommandRegistrar, CommandSender, MessageBus, MessageConsumer};
use crate::config::RuntimeConfig;
use crate::directory::AggregateDirectory;
use crate::error::CommandFailure;
use crate::messages::{CommandResult, UnloadAggregate};
use crate::repository::{AggregateRepository, LoadOutcome};
use crate::router::AggregateCommandRouter;
use esactor_domain::{
    address::{AggregateAddressStrategy, DefaultAggregateAddressStrategy},
    eventing::{EventBus, EventPublisher},
    message::AggregateCommand,
    persist::{EventStore, RetryPolicy, RetryingEventStore},
    value_object::{AggregateId, CorrelationId},
};
use std::sync::Arc;

pub struct AggregateRuntime {
    config: RuntimeConfig,
    bus: MessageBus,
    sender: CommandSender,
    registrar: CommandRegistrar,
    directory: Arc<AggregateDirectory>,
    repository: Arc<AggregateRepository>,
    publisher: EventPublisher,
    router: MessageConsumer,
}

impl AggregateRuntime {
    /// 使用默认寻址策略（全部聚合视为本地）
    pub fn start(
        config: RuntimeConfig,
        store: Arc<dyn EventStore>,
        event_bus: Arc<dyn EventBus>,
    ) -> Self {
        let strategy = match &config.address_prefix {
            Some(prefix) => DefaultAggregateAddressStrategy::with_prefix(prefix.clone()),
            None => DefaultAggregateAddressStrategy::new(),
        };
        Self::start_with_strategy(config, store, event_bus, Arc::new(strategy))
    }

    pub fn start_with_strategy(
        config: RuntimeConfig,
        store: Arc<dyn EventStore>,
        event_bus: Arc<dyn EventBus>,
        strategy: Arc<dyn AggregateAddressStrategy>,
    ) -> Self {
        let store: Arc<dyn EventStore> = match config.retry_policy {
            RetryPolicy::None => store,
            policy => Arc::new(RetryingEventStore::new(store, policy)),
        };

        let bus = MessageBus::new(config.node_id.clone());
        let sender = CommandSender::new(bus.clone(), config.delivery.clone());
        let registrar = CommandRegistrar::new(bus.clone());
        let directory = Arc::new(AggregateDirectory::new());
        let publisher = EventPublisher::new(event_bus);

        let repository = Arc::new(
            AggregateRepository::builder()
                .directory(directory.clone())
                .strategy(strategy.clone())
                .store(store)
                .publisher(publisher.clone())
                .registrar(registrar.clone())
                .sender(sender.clone())
                .snapshot_policy(config.snapshot_policy)
                .max_cached_aggregates(config.max_cached_aggregates)
                .build(),
        );
        let router = Arc::new(AggregateCommandRouter::new(
            repository.clone(),
            strategy,
            sender.clone(),
        ));
        let router = router.start(&registrar);

        tracing::info!(
            node_id = %config.node_id,
            max_cached_aggregates = config.max_cached_aggregates,
            "aggregate runtime started"
        );

        Self {
            config,
            bus,
            sender,
            registrar,
            directory,
            repository,
            publisher,
            router,
        }
    }

    /// 注册聚合类型的工厂
    pub fn register_aggregate<A: EventSourcedAggregate>(&self) {
        aggregate::register_aggregate::<A>(&self.directory);
    }

    pub async fn send_command<C: AggregateCommand>(&self, command: C) -> CommandResult {
        self.sender.send_aggregate_command(command).await
    }

    pub async fn ensure_loaded(
        &self,
        aggregate_id: AggregateId,
    ) -> Result<LoadOutcome, CommandFailure> {
        self.repository
            .ensure_loaded(aggregate_id, CorrelationId::new())
            .await
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn bus(&self) -> &MessageBus {
        &self.bus
    }

    pub fn sender(&self) -> &CommandSender {
        &self.sender
    }

    pub fn registrar(&self) -> &CommandRegistrar {
        &self.registrar
    }

    pub fn directory(&self) -> &Arc<AggregateDirectory> {
        &self.directory
    }

    pub fn repository(&self) -> &Arc<AggregateRepository> {
        &self.repository
    }

    pub fn publisher(&self) -> &EventPublisher {
        &self.publisher
    }

    /// 停止接收命令并卸载全部常驻聚合（已入队的命令仍会处理完）
    pub fn shutdown(&self) {
        self.router.unregister();
        let deployments = self.directory.snapshot().deployments;
        for (aggregate_id, address) in deployments {
            self.directory.begin_unload(aggregate_id);
            if self
                .sender
                .send_to(&address, UnloadAggregate { aggregate_id })
                .is_err()
            {
                self.directory.forget_if_at(aggregate_id, &address);
            }
        }
        tracing::info!(node_id = %self.config.node_id, "aggregate runtime stopped");
    }
}
