use crate::value_object::{AggregateId, AggregateVersion};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fmt;

/// 聚合快照：某一版本时刻的状态物化，用于限定重放范围
pub trait AggregateSnapshot:
    Clone + fmt::Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// 快照的持久化类型
    const SNAPSHOT_TYPE: &'static str;

    fn aggregate_id(&self) -> AggregateId;

    /// 捕获快照时的聚合版本
    fn aggregate_version(&self) -> AggregateVersion;
}

/// 不使用快照的聚合以此作为快照类型（无法构造）
#[derive(Debug, Clone, Serialize, serde::Deserialize)]
pub enum NoSnapshot {}

impl AggregateSnapshot for NoSnapshot {
    const SNAPSHOT_TYPE: &'static str = "NoSnapshot";

    fn aggregate_id(&self) -> AggregateId {
        match *self {}
    }

    fn aggregate_version(&self) -> AggregateVersion {
        match *self {}
    }
}
