use serde::{Deserialize, Serialize};

/// 快照落盘策略（按版本间隔）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotPolicy {
    #[default]
    Never,
    Every(u32),
}

impl SnapshotPolicy {
    pub fn should_snapshot(&self, version: i64) -> bool {
        match self {
            SnapshotPolicy::Never => false,
            SnapshotPolicy::Every(interval) => {
                let interval = i64::from((*interval).max(1));
                version > 0 && version % interval == 0
            }
        }
    }
}
