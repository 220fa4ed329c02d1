//! 领域层统一错误定义
//!
//! 聚焦序列化、事件存储、版本冲突与类型校验等最小必要集合，
//! 便于在运行时层统一转换为命令失败（`CommandFailure`）。
//!
use thiserror::Error;

/// 统一错误类型（基础库最小必要集）
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum DomainError {
    // --- 序列化 ---
    #[error("serialization error: {source}")]
    Serde {
        #[from]
        source: serde_json::Error,
    },
    #[error("parse error: {reason}")]
    Parse { reason: String },
    #[error("type mismatch: expected={expected}, found={found}")]
    TypeMismatch { expected: String, found: String },

    // --- 事件系统 ---
    #[error("event bus error: {reason}")]
    EventBus { reason: String },

    // --- 存储 ---
    #[error("event store error: {reason}")]
    EventStore { reason: String },
    #[error("snapshot store error: {reason}")]
    SnapshotStore { reason: String },
    #[error("database error: {reason}")]
    Database { reason: String },
    #[error("store count mismatch: expected={expected}, stored={stored}")]
    StoreCountMismatch { expected: usize, stored: usize },
    #[error("version conflict: aggregate={aggregate_id}, expected={expected}, actual={actual}")]
    VersionConflict {
        aggregate_id: String,
        expected: i64,
        actual: i64,
    },
    #[error("snapshot already exists: aggregate={aggregate_id}, version={version}")]
    SnapshotExists { aggregate_id: String, version: i64 },
    #[error("store unavailable: {reason}")]
    Unavailable { reason: String },

    // --- 通用 ---
    #[error("invalid aggregate id: {0}")]
    InvalidAggregateId(String),
}

impl DomainError {
    pub fn event_bus(reason: impl Into<String>) -> Self {
        DomainError::EventBus {
            reason: reason.into(),
        }
    }

    pub fn event_store(reason: impl Into<String>) -> Self {
        DomainError::EventStore {
            reason: reason.into(),
        }
    }

    /// 是否为可重试的瞬时故障（连接、超时一类），版本冲突与数据错误不重试
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            DomainError::Database { .. }
                | DomainError::Unavailable { .. }
                | DomainError::EventStore { .. }
                | DomainError::SnapshotStore { .. }
        )
    }
}

/// 统一 Result 类型别名
pub type DomainResult<T> = Result<T, DomainError>;

// ---- Cross-crate conversions for infrastructure convenience ----

#[cfg(feature = "infra-sqlx")]
impl From<sqlx::Error> for DomainError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                DomainError::Unavailable {
                    reason: err.to_string(),
                }
            }
            other => DomainError::Database {
                reason: other.to_string(),
            },
        }
    }
}

impl From<uuid::Error> for DomainError {
    fn from(err: uuid::Error) -> Self {
        DomainError::InvalidAggregateId(err.to_string())
    }
}

impl From<std::num::ParseIntError> for DomainError {
    fn from(err: std::num::ParseIntError) -> Self {
        DomainError::Parse {
            reason: err.to_string(),
        }
    }
}
