//! 按名称加锁（NamedLocks）
//!
//! 每个名称一把异步互斥锁，按需创建；最后一个持有者释放时删除表项。
//! 释放由 guard 的 `Drop` 完成，成功、失败与 panic 各条退出路径都会执行。
//!
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

#[derive(Clone, Default)]
pub struct NamedLocks {
    locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

impl NamedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, name: &str) -> NamedLockGuard {
        // 先取出 Arc 再等待，避免持有分片锁跨越 await
        let mutex = self
            .locks
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let guard = mutex.lock_owned().await;
        NamedLockGuard {
            name: name.to_string(),
            locks: self.locks.clone(),
            guard: Some(guard),
        }
    }

    /// 当前存在的锁数量（持有或等待中）
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }

    pub fn is_locked(&self, name: &str) -> bool {
        self.locks
            .get(name)
            .is_some_and(|m| m.try_lock().is_err())
    }
}

pub struct NamedLockGuard {
    name: String,
    locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for NamedLockGuard {
    fn drop(&mut self) {
        drop(self.guard.take());
        // 仅表本身持有引用时说明没有等待者
        self.locks
            .remove_if(&self.name, |_, m| Arc::strong_count(m) == 1);
    }
}
