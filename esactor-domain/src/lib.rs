//! 事件溯源领域层基础库（esactor-domain）
//!
//! 为“每个聚合一个 actor”的 CQRS/事件溯源运行时提供与执行模型无关的构件：
//! - 标识与版本（`value_object`）：`AggregateId`、`CorrelationId`、`AggregateVersion`
//! - 消息契约（`message`）：命令、聚合事件、快照与错误事件
//! - 聚合寻址策略（`address`）：聚合 id 到路由地址及本地性判断
//! - 持久化协议（`persist`）：事件/快照存储接口、序列化记录与重试装饰器
//! - 事件发布（`eventing`）：事件总线与“发后即忘”的发布器
//!
//! 本 crate 不包含 actor 与邮箱实现，这部分位于 `esactor-runtime`。
//!
pub mod address;
pub mod error;
pub mod eventing;
pub mod message;
pub mod persist;
pub mod value_object;

// 允许在本 crate 内部通过 ::esactor_domain 进行自引用，
// 以便过程宏在本 crate 的单元测试中也能解析到 ::esactor_domain 路径。
extern crate self as esactor_domain;
