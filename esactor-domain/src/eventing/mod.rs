//! 事件子系统（eventing）
//!
//! - `EventBus`：发布/订阅协议；
//! - `InMemoryEventBus`：基于 broadcast 的进程内实现；
//! - `EventPublisher`：聚合侧使用的“发后即忘”发布器。
//!
pub mod bus;
pub mod bus_inmemory;
pub mod publisher;

pub use bus::EventBus;
pub use bus_inmemory::{DEFAULT_BUS_CAPACITY, InMemoryEventBus};
pub use publisher::EventPublisher;
