//! 值对象（Value Object）
//!
//! 聚合标识、关联标识与聚合版本号。三者都是不可变的小型值，
//! 既作为 map 键使用，也参与地址推导与持久化。
//!

use crate::error::DomainError;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use uuid::Uuid;

/// 聚合标识（128 位，聚合生命周期内稳定）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AggregateId(Uuid);

impl AggregateId {
    /// 生成新的随机聚合标识
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// 定长（36 字符、小写、带连字符）编码，直接写入栈上缓冲区，
    /// 用作聚合的直连地址。
    pub fn to_string_fast(&self) -> String {
        let mut buf = Uuid::encode_buffer();
        let encoded: &str = self.0.hyphenated().encode_lower(&mut buf);
        encoded.to_owned()
    }
}

impl Default for AggregateId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for AggregateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0.hyphenated(), f)
    }
}

impl FromStr for AggregateId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl From<Uuid> for AggregateId {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

/// 关联标识：沿一条因果链在多条消息间传递，用于追踪
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(Uuid);

impl CorrelationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0.hyphenated(), f)
    }
}

impl FromStr for CorrelationId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self).map_err(|e| DomainError::Parse {
            reason: e.to_string(),
        })
    }
}

/// 聚合版本号（用于乐观并发控制）
///
/// 从哨兵值 0（“未初始化”）开始单调递增；同一聚合的事件流中版本必须连续且严格递增。
///
/// # 示例
///
/// ```
/// use esactor_domain::value_object::AggregateVersion;
///
/// let v0 = AggregateVersion::INITIAL;
/// assert!(v0.is_initial());
///
/// let v1 = v0.next();
/// assert_eq!(v1.value(), 1);
/// assert!(v1 > v0);
/// ```
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct AggregateVersion(i64);

impl AggregateVersion {
    /// 未初始化哨兵值
    pub const INITIAL: AggregateVersion = AggregateVersion(0);

    pub const fn from_value(value: i64) -> Self {
        Self(value)
    }

    pub const fn value(&self) -> i64 {
        self.0
    }

    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }

    /// 检查是否仍为哨兵值（聚合尚未被任何创建命令初始化）
    pub fn is_initial(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for AggregateVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}
