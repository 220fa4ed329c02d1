use crate::{
    error::{DomainError, DomainResult as Result},
    message::AggregateSnapshot,
    value_object::{AggregateId, AggregateVersion},
};
use bon::Builder;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Builder, Serialize, Deserialize)]
pub struct SerializedSnapshot {
    aggregate_id: AggregateId,
    aggregate_type: String,
    snapshot_type: String,
    aggregate_version: AggregateVersion,
    taken_at: DateTime<Utc>,
    payload: Value,
}

impl SerializedSnapshot {
    pub fn aggregate_id(&self) -> AggregateId {
        self.aggregate_id
    }

    pub fn aggregate_type(&self) -> &str {
        &self.aggregate_type
    }

    pub fn snapshot_type(&self) -> &str {
        &self.snapshot_type
    }

    pub fn aggregate_version(&self) -> AggregateVersion {
        self.aggregate_version
    }

    pub fn taken_at(&self) -> DateTime<Utc> {
        self.taken_at
    }

    pub fn payload(&self) -> &Value {
        &self.payload
    }

    /// 将快照反序列化为类型化快照
    pub fn to_snapshot<S>(&self) -> Result<S>
    where
        S: AggregateSnapshot,
    {
        if S::SNAPSHOT_TYPE != self.snapshot_type {
            return Err(DomainError::TypeMismatch {
                expected: S::SNAPSHOT_TYPE.to_string(),
                found: self.snapshot_type.clone(),
            });
        }

        Ok(serde_json::from_value(self.payload.clone())?)
    }

    /// 从类型化快照创建持久化记录
    pub fn from_snapshot<S>(aggregate_type: &str, snapshot: &S) -> Result<Self>
    where
        S: AggregateSnapshot,
    {
        Ok(Self {
            aggregate_id: snapshot.aggregate_id(),
            aggregate_type: aggregate_type.to_string(),
            snapshot_type: S::SNAPSHOT_TYPE.to_string(),
            aggregate_version: snapshot.aggregate_version(),
            taken_at: Utc::now(),
            payload: serde_json::to_value(snapshot)?,
        })
    }
}
