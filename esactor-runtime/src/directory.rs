//! 聚合目录（AggregateDirectory）
//!
//! 进程级簿记：聚合 id → 部署地址、聚合 id → 最近使用时刻、持久化类型 → 聚合工厂。
//! 不持有聚合状态本身。所有操作均为并发安全的常数时间 map 操作，不阻塞。
//!
use crate::actor::AggregateInstance;
use dashmap::{DashMap, mapref::entry::Entry};
use esactor_domain::value_object::AggregateId;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

/// 按聚合 id 实例化 actor
pub type AggregateFactory = Arc<dyn Fn(AggregateId) -> Box<dyn AggregateInstance> + Send + Sync>;

#[derive(Default)]
pub struct AggregateDirectory {
    deployments: DashMap<AggregateId, String>,
    last_used: DashMap<AggregateId, Instant>,
    factories: DashMap<String, RegisteredFactory>,
}

struct RegisteredFactory {
    aggregate_type: &'static str,
    factory: AggregateFactory,
}

/// 调试用的目录副本
#[derive(Debug, Clone, Default)]
pub struct DirectorySnapshot {
    pub deployments: HashMap<AggregateId, String>,
    pub last_used: HashMap<AggregateId, Instant>,
    pub factory_types: Vec<String>,
}

impl AggregateDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_deployed(&self, aggregate_id: AggregateId) -> bool {
        self.deployments.contains_key(&aggregate_id)
    }

    pub fn address_of(&self, aggregate_id: AggregateId) -> Option<String> {
        self.deployments.get(&aggregate_id).map(|a| a.value().clone())
    }

    /// 幂等，后写者生效
    pub fn record_deployment(&self, aggregate_id: AggregateId, address: impl Into<String>) {
        self.deployments.insert(aggregate_id, address.into());
        self.last_used.insert(aggregate_id, Instant::now());
    }

    /// 仅更新仍为淘汰候选的聚合
    pub fn mark_recently_used(&self, aggregate_id: AggregateId) {
        if let Some(mut at) = self.last_used.get_mut(&aggregate_id) {
            *at = Instant::now();
        }
    }

    /// 同一聚合类型重复注册时替换；持久化类型已属于其他聚合类型时保留原工厂并返回 false
    pub fn register_factory(
        &self,
        persisted_type: impl Into<String>,
        aggregate_type: &'static str,
        factory: AggregateFactory,
    ) -> bool {
        let persisted_type = persisted_type.into();
        match self.factories.entry(persisted_type) {
            Entry::Occupied(entry) if entry.get().aggregate_type != aggregate_type => {
                tracing::warn!(
                    persisted_type = %entry.key(),
                    registered = entry.get().aggregate_type,
                    rejected = aggregate_type,
                    "persisted type already belongs to another aggregate"
                );
                false
            }
            entry => {
                tracing::debug!(
                    persisted_type = %entry.key(),
                    aggregate_type,
                    "aggregate factory registered"
                );
                entry.insert(RegisteredFactory {
                    aggregate_type,
                    factory,
                });
                true
            }
        }
    }

    pub fn find_factory(&self, persisted_type: &str) -> Option<AggregateFactory> {
        self.factories
            .get(persisted_type)
            .map(|f| f.value().factory.clone())
    }

    /// 仅当记录的地址与给定地址一致时移除
    pub fn forget_if_at(&self, aggregate_id: AggregateId, address: &str) -> bool {
        let removed = self
            .deployments
            .remove_if(&aggregate_id, |_, a| a == address)
            .is_some();
        if removed {
            self.last_used.remove(&aggregate_id);
        }
        removed
    }

    pub fn deployed_count(&self) -> usize {
        self.deployments.len()
    }

    /// 仍参与淘汰的常驻聚合数
    pub fn resident_count(&self) -> usize {
        self.last_used.len()
    }

    /// 最久未使用的常驻聚合
    pub fn least_recently_used(&self, exclude: AggregateId) -> Option<AggregateId> {
        self.last_used
            .iter()
            .filter(|e| *e.key() != exclude)
            .min_by_key(|e| *e.value())
            .map(|e| *e.key())
    }

    /// 标记开始卸载：保留部署记录，退出淘汰候选
    pub fn begin_unload(&self, aggregate_id: AggregateId) -> bool {
        self.last_used.remove(&aggregate_id).is_some()
    }

    pub fn snapshot(&self) -> DirectorySnapshot {
        DirectorySnapshot {
            deployments: self
                .deployments
                .iter()
                .map(|e| (*e.key(), e.value().clone()))
                .collect(),
            last_used: self
                .last_used
                .iter()
                .map(|e| (*e.key(), *e.value()))
                .collect(),
            factory_types: self.factories.iter().map(|e| e.key().clone()).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deployment_bookkeeping() {
        let dir = AggregateDirectory::new();
        let id = AggregateId::new();
        assert!(!dir.is_deployed(id));

        dir.record_deployment(id, "addr-1");
        dir.record_deployment(id, "addr-2");
        assert!(dir.is_deployed(id));
        assert_eq!(dir.address_of(id).as_deref(), Some("addr-2"));
        assert_eq!(dir.deployed_count(), 1);

        assert!(!dir.forget_if_at(id, "addr-1"));
        assert!(dir.forget_if_at(id, "addr-2"));
        assert!(!dir.is_deployed(id));
        assert_eq!(dir.resident_count(), 0);
    }

    #[test]
    fn least_recently_used_skips_excluded_and_unloading() {
        let dir = AggregateDirectory::new();
        let (a, b, c) = (AggregateId::new(), AggregateId::new(), AggregateId::new());
        dir.record_deployment(a, "a");
        std::thread::sleep(std::time::Duration::from_millis(2));
        dir.record_deployment(b, "b");
        std::thread::sleep(std::time::Duration::from_millis(2));
        dir.record_deployment(c, "c");

        assert_eq!(dir.least_recently_used(c), Some(a));
        std::thread::sleep(std::time::Duration::from_millis(2));
        dir.mark_recently_used(a);
        assert_eq!(dir.least_recently_used(c), Some(b));

        assert!(dir.begin_unload(b));
        assert_eq!(dir.least_recently_used(c), Some(a));
        assert!(dir.is_deployed(b));
        assert_eq!(dir.resident_count(), 2);
        assert_eq!(dir.deployed_count(), 3);

        // 卸载中的聚合不会因再次使用而重新成为候选
        dir.mark_recently_used(b);
        assert_eq!(dir.resident_count(), 2);
    }

    struct Noop(&'static str);

    impl AggregateInstance for Noop {
        fn aggregate_type(&self) -> &'static str {
            self.0
        }

        fn start(
            self: Box<Self>,
            _mailbox: crate::bus::Mailbox,
            _context: crate::actor::ActorContext,
        ) -> tokio::task::JoinHandle<()> {
            tokio::spawn(async {})
        }
    }

    fn factory_of(aggregate_type: &'static str) -> AggregateFactory {
        Arc::new(move |_id: AggregateId| -> Box<dyn AggregateInstance> {
            Box::new(Noop(aggregate_type))
        })
    }

    #[test]
    fn persisted_type_stays_with_its_first_aggregate_type() {
        let dir = AggregateDirectory::new();
        assert!(dir.register_factory("OrderEvent.Placed", "sales", factory_of("sales")));
        assert!(!dir.register_factory("OrderEvent.Placed", "billing", factory_of("billing")));

        let factory = dir.find_factory("OrderEvent.Placed").unwrap();
        assert_eq!(factory(AggregateId::new()).aggregate_type(), "sales");

        // 同一聚合类型再次注册视为替换
        assert!(dir.register_factory("OrderEvent.Placed", "sales", factory_of("sales")));
        assert_eq!(dir.snapshot().factory_types, vec!["OrderEvent.Placed".to_string()]);
    }

    #[test]
    fn unknown_factory_is_absent() {
        let dir = AggregateDirectory::new();
        assert!(dir.find_factory("Nope.Created").is_none());
        assert!(dir.snapshot().factory_types.is_empty());
    }
}
