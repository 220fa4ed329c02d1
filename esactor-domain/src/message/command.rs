use crate::value_object::{AggregateId, CorrelationId};

/// 带地址的消息
///
/// `ADDRESS` 是消息的默认地址：按约定为消息类型的完全限定名，
/// 由 `#[derive(Message)]` 以 `module_path!()::TypeName` 生成，无需单独的注册表文件。
/// 需要稳定地址时可通过 `#[message(address = "...")]` 覆写。
pub trait Message: Send + 'static {
    const ADDRESS: &'static str;
}

/// 领域命令：携带关联 id 以便追踪因果链
pub trait DomainCommand: Message {
    fn correlation_id(&self) -> CorrelationId;
}

/// 面向单个聚合的命令
pub trait AggregateCommand: DomainCommand {
    fn aggregate_id(&self) -> AggregateId;

    /// 是否为创建命令：创建命令允许实例化一个从未存在过的聚合
    fn is_creation(&self) -> bool {
        false
    }

    /// 命令名称，出现在错误事件与日志中
    fn command_name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}
