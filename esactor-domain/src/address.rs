//! 聚合寻址策略（AggregateAddressStrategy）
//!
//! 把聚合 id 映射为路由地址，并判断该聚合是否由本进程承载。
//! 默认实现视所有聚合为本地，地址由 id 的定长编码直接得到；
//! 集群感知的实现可在此接口后查询分区/归属元数据。
//!
use crate::value_object::AggregateId;
use std::sync::Arc;

pub trait AggregateAddressStrategy: Send + Sync {
    fn is_local(&self, aggregate_id: AggregateId) -> bool;

    fn resolve_address(&self, aggregate_id: AggregateId) -> String;
}

impl<T> AggregateAddressStrategy for Arc<T>
where
    T: AggregateAddressStrategy + ?Sized,
{
    fn is_local(&self, aggregate_id: AggregateId) -> bool {
        (**self).is_local(aggregate_id)
    }

    fn resolve_address(&self, aggregate_id: AggregateId) -> String {
        (**self).resolve_address(aggregate_id)
    }
}

#[derive(Debug, Clone, Default)]
pub struct DefaultAggregateAddressStrategy {
    prefix: Option<String>,
}

impl DefaultAggregateAddressStrategy {
    pub fn new() -> Self {
        Self::default()
    }

    /// 地址形如 `{prefix}::{id}`
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: Some(prefix.into()),
        }
    }
}

impl AggregateAddressStrategy for DefaultAggregateAddressStrategy {
    fn is_local(&self, _aggregate_id: AggregateId) -> bool {
        true
    }

    fn resolve_address(&self, aggregate_id: AggregateId) -> String {
        match &self.prefix {
            Some(prefix) => format!("{prefix}::{}", aggregate_id.to_string_fast()),
            None => aggregate_id.to_string_fast(),
        }
    }
}
