//! 每个聚合一个 actor 的 CQRS/事件溯源运行时（esactor-runtime）
//!
//! 命令从路由器进入：解析聚合地址，经仓储确保聚合已部署，再转发到聚合地址；
//! 聚合 actor 借助自身的事件溯源委托执行版本规则并存储、发布新事件。
//!
//! - `bus`：寻址消息总线、注册器与发送器
//! - `directory`：聚合 id → 地址 / 最近使用时刻，持久化类型 → 工厂
//! - `named_lock`：按地址的加载锁
//! - `delegate`：版本计数与“先存储、后发布”
//! - `aggregate` / `actor`：聚合契约与 actor 消费循环
//! - `repository` / `router`：加载编排与命令路由
//! - `runtime`：装配与配置
//!
pub mod actor;
pub mod aggregate;
pub mod bus;
pub mod config;
pub mod delegate;
pub mod directory;
pub mod error;
pub mod messages;
pub mod named_lock;
pub mod repository;
pub mod router;
pub mod runtime;

pub use actor::{ActorContext, AggregateInstance};
pub use aggregate::{EventSourcedAggregate, aggregate_factory, register_aggregate};
pub use config::{DeliveryOptions, RuntimeConfig};
pub use delegate::EventSourcingDelegate;
pub use directory::{AggregateDirectory, AggregateFactory};
pub use error::{BusError, CommandFailure};
pub use messages::{CommandAck, CommandResult};
pub use repository::{AggregateRepository, LoadOutcome};
pub use router::AggregateCommandRouter;
pub use runtime::AggregateRuntime;
