//! 运行时内部消息
//!
//! 仓储与路由器投递给聚合 actor 的控制消息，以及经路由器转发的聚合命令信封。
//!
use crate::bus::AnyBody;
use crate::error::CommandFailure;
use esactor_domain::{
    message::{AggregateCommand, Message},
    persist::{SerializedEvent, SerializedSnapshot},
    value_object::{AggregateId, AggregateVersion, CorrelationId},
};

/// 聚合命令路由器的地址
pub const AGGREGATE_COMMAND_ADDRESS: &str = "esactor.aggregate.command";

/// 聚合命令的成功应答
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandAck {
    pub aggregate_id: AggregateId,
    /// 处理完成后的聚合版本
    pub version: AggregateVersion,
    /// 本次落库的事件数
    pub events: usize,
}

pub type CommandResult = Result<CommandAck, CommandFailure>;

/// 部署后的第一条消息：重放快照与其后的事件
#[derive(Debug, Clone)]
pub struct ApplySnapshotAndEvents {
    pub aggregate_id: AggregateId,
    pub correlation_id: CorrelationId,
    pub snapshot: Option<SerializedSnapshot>,
    pub events: Vec<SerializedEvent>,
}

/// 重放应答：重放后的版本
pub type ReplayResult = Result<AggregateVersion, CommandFailure>;

/// 要求聚合失效：停止接收、应答积压消息并退出
#[derive(Debug, Clone)]
pub struct InvalidateAggregate {
    pub aggregate_id: AggregateId,
    pub correlation_id: CorrelationId,
    pub reason: String,
}

/// 淘汰常驻聚合：处理完已入队消息后退出
#[derive(Debug, Clone, Copy)]
pub struct UnloadAggregate {
    pub aggregate_id: AggregateId,
}

/// 经路由器转发的聚合命令
pub struct RouteAggregateCommand {
    aggregate_id: AggregateId,
    correlation_id: CorrelationId,
    is_creation: bool,
    creation_type: &'static str,
    command_name: &'static str,
    command: AnyBody,
}

impl RouteAggregateCommand {
    pub fn new<C: AggregateCommand>(command: C) -> Self {
        Self {
            aggregate_id: command.aggregate_id(),
            correlation_id: command.correlation_id(),
            is_creation: command.is_creation(),
            creation_type: C::ADDRESS,
            command_name: command.command_name(),
            command: Box::new(command),
        }
    }

    pub fn aggregate_id(&self) -> AggregateId {
        self.aggregate_id
    }

    pub fn correlation_id(&self) -> CorrelationId {
        self.correlation_id
    }

    pub fn is_creation(&self) -> bool {
        self.is_creation
    }

    /// 创建命令据此查找聚合工厂
    pub fn creation_type(&self) -> &'static str {
        self.creation_type
    }

    pub fn command_name(&self) -> &'static str {
        self.command_name
    }

    pub fn into_command(self) -> AnyBody {
        self.command
    }
}

impl Message for RouteAggregateCommand {
    const ADDRESS: &'static str = AGGREGATE_COMMAND_ADDRESS;
}
