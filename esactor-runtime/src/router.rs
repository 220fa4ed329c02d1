//! 聚合命令路由器（AggregateCommandRouter）
//!
//! 在 `AGGREGATE_COMMAND_ADDRESS`（本地与集群地址）上接收 `RouteAggregateCommand`，
//! 确保目标聚合已部署后把命令转发到聚合地址并回传应答。
//! 转发时发现地址已无消费者（聚合刚被卸载或失效），经仓储重新加载后重试一次。
//!
use crate::bus::{AnyBody, CommandRegistrar, CommandSender, Delivery, MessageConsumer};
use crate::error::{BusError, CommandFailure};
use crate::messages::{AGGREGATE_COMMAND_ADDRESS, CommandResult, RouteAggregateCommand};
use crate::repository::{AggregateRepository, LoadOutcome};
use esactor_domain::address::AggregateAddressStrategy;
use std::any::type_name;
use std::sync::Arc;

pub struct AggregateCommandRouter {
    repository: Arc<AggregateRepository>,
    strategy: Arc<dyn AggregateAddressStrategy>,
    sender: CommandSender,
}

impl AggregateCommandRouter {
    pub fn new(
        repository: Arc<AggregateRepository>,
        strategy: Arc<dyn AggregateAddressStrategy>,
        sender: CommandSender,
    ) -> Self {
        Self {
            repository,
            strategy,
            sender,
        }
    }

    /// 注册到路由地址；每条命令一个任务，互不相关的聚合并行推进
    pub fn start(self: &Arc<Self>, registrar: &CommandRegistrar) -> MessageConsumer {
        let router = self.clone();
        registrar.register_with_local_and_cluster_addresses(
            AGGREGATE_COMMAND_ADDRESS,
            true,
            move |delivery: Delivery<RouteAggregateCommand>| {
                let router = router.clone();
                async move {
                    let (command, reply) = delivery.into_parts();
                    let result = router.route(command).await;
                    reply.reply::<CommandResult>(result);
                }
            },
        )
    }

    pub async fn route(&self, command: RouteAggregateCommand) -> CommandResult {
        let aggregate_id = command.aggregate_id();
        let correlation_id = command.correlation_id();
        let is_creation = command.is_creation();
        let creation_type = command.creation_type();
        let command_name = command.command_name();

        if !self.strategy.is_local(aggregate_id) {
            let address = self.strategy.resolve_address(aggregate_id);
            tracing::debug!(
                aggregate_id = %aggregate_id,
                address = %address,
                command = command_name,
                "forwarding command to remote aggregate"
            );
            return match self.sender.forward(&address, command.into_command()).await {
                Ok(reply) => decode(reply),
                Err(_) => Err(BusError::NoHandlers { address }.into()),
            };
        }

        let mut body = command.into_command();
        let mut retried = false;
        loop {
            let outcome = if is_creation {
                self.repository
                    .ensure_loaded_or_create(aggregate_id, creation_type, correlation_id)
                    .await?
            } else {
                self.repository
                    .ensure_loaded(aggregate_id, correlation_id)
                    .await?
            };
            if outcome == LoadOutcome::NeverExisted {
                tracing::debug!(
                    aggregate_id = %aggregate_id,
                    correlation_id = %correlation_id,
                    command = command_name,
                    "command addressed to aggregate that never existed"
                );
                return Err(CommandFailure::AggregateNotFound(aggregate_id));
            }

            let address = self
                .repository
                .directory()
                .address_of(aggregate_id)
                .unwrap_or_else(|| self.strategy.resolve_address(aggregate_id));

            match self.sender.forward(&address, body).await {
                Ok(reply) => return decode(reply),
                Err(returned) if !retried => {
                    tracing::debug!(
                        aggregate_id = %aggregate_id,
                        address = %address,
                        "aggregate unreachable, reloading"
                    );
                    self.repository.forget_unroutable(aggregate_id, &address);
                    body = returned;
                    retried = true;
                }
                Err(_) => return Err(BusError::NoHandlers { address }.into()),
            }
        }
    }
}

fn decode(reply: Result<AnyBody, BusError>) -> CommandResult {
    let body = reply?;
    match body.downcast::<CommandResult>() {
        Ok(result) => *result,
        Err(_) => Err(BusError::TypeMismatch {
            expected: type_name::<CommandResult>(),
            found: "unknown",
        }
        .into()),
    }
}
