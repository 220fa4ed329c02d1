//! 消息契约（Message）
//!
//! 运行时中的一切交互都是带地址的异步消息。本模块定义：
//! - `Message`：具备默认地址（完全限定类型名）的消息；
//! - `DomainCommand` / `AggregateCommand`：携带关联 id（以及目标聚合 id）的命令；
//! - `AggregateEvent` / `AggregateSnapshot`：携带聚合 id 与版本号的事件与快照；
//! - `ErrorEvent`：版本守卫等误用场景下发布的错误事件（不会写入事件流）。

mod command;
mod error_event;
mod event;
mod snapshot;

pub use command::{AggregateCommand, DomainCommand, Message};
pub use error_event::ErrorEvent;
pub use event::AggregateEvent;
pub use snapshot::{AggregateSnapshot, NoSnapshot};
