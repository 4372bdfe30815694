//! 实例缓存
//!
//! 每个作用域（根或子作用域）各持有一个缓存，按令牌保存已创建的实例。

use indexmap::IndexMap;
use parking_lot::RwLock;

use super::registration::Instance;
use super::token::{AnyToken, TokenId};
use crate::metrics::SinkSlot;

pub(crate) struct InstanceCache {
    instances: RwLock<IndexMap<TokenId, (AnyToken, Instance)>>,
    /// 关闭性能追踪时不上报命中率
    tracking: bool,
    metrics: SinkSlot,
}

impl InstanceCache {
    pub(crate) fn new(tracking: bool, metrics: SinkSlot) -> Self {
        Self {
            instances: RwLock::new(IndexMap::new()),
            tracking,
            metrics,
        }
    }

    pub(crate) fn is_tracking(&self) -> bool {
        self.tracking
    }

    fn record(&self, hit: bool) {
        if !self.tracking {
            return;
        }
        if let Some(sink) = self.metrics.read().as_ref() {
            sink.record_cache_access(hit);
        }
    }

    pub(crate) fn get(&self, token: &AnyToken) -> Option<Instance> {
        let found = self
            .instances
            .read()
            .get(&token.id())
            .map(|(_, instance)| instance.clone());
        self.record(found.is_some());
        found
    }

    /// 写入实例；已有实例时保留先写入者并返回它
    pub(crate) fn insert(&self, token: &AnyToken, instance: Instance) -> Instance {
        let mut instances = self.instances.write();
        instances
            .entry(token.id())
            .or_insert_with(|| (token.clone(), instance))
            .1
            .clone()
    }

    /// 按插入顺序取出全部实例
    pub(crate) fn entries(&self) -> Vec<(AnyToken, Instance)> {
        self.instances.read().values().cloned().collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.instances.read().len()
    }

    pub(crate) fn clear(&self) {
        self.instances.write().clear();
    }
}
