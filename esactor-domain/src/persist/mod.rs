//! 持久化（persist）
//!
//! 事件/快照在存储与总线上的记录形态，以及运行时依赖的存储协议：
//! - 序列化记录（`SerializedEvent`、`SerializedSnapshot`）；
//! - 存储协议（`EventStore`）与内存实现（`InMemoryEventStore`）；
//! - 可配置的重试装饰器（`RetryingEventStore`/`RetryPolicy`）；
//! - 快照策略（`SnapshotPolicy`）；
//! - 可选的 Postgres 后端（`infra-sqlx` 特性）。
//!
mod event_store;
mod inmemory;
#[cfg(feature = "infra-sqlx")]
mod postgres;
mod retry;
mod serialized_event;
mod serialized_snapshot;
mod snapshot_policy;

pub use event_store::EventStore;
pub use inmemory::InMemoryEventStore;
#[cfg(feature = "infra-sqlx")]
pub use postgres::PostgresEventStore;
pub use retry::{RetryPolicy, RetryingEventStore};
pub use serialized_event::{SerializedEvent, deserialize_events, serialize_events};
pub use serialized_snapshot::SerializedSnapshot;
pub use snapshot_policy::SnapshotPolicy;
