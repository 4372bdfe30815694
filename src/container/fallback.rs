//! 备用工厂注册表
//!
//! 独立于任何容器实例的令牌到零参工厂映射。`ServiceContainer::resolve`
//! 仅在令牌完全未注册时才会查询它。

use std::any::Any;
use std::sync::Arc;

use dashmap::DashMap;
use lazy_static::lazy_static;

use super::token::{Token, TokenId};

type FallbackFactory = Arc<dyn Fn() -> Arc<dyn Any + Send + Sync> + Send + Sync>;

#[derive(Default)]
pub struct FallbackRegistry {
    factories: DashMap<TokenId, FallbackFactory>,
}

lazy_static! {
    static ref GLOBAL_FALLBACKS: Arc<FallbackRegistry> = Arc::new(FallbackRegistry::new());
}

impl FallbackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 进程级共享的备用注册表
    pub fn global() -> Arc<FallbackRegistry> {
        GLOBAL_FALLBACKS.clone()
    }

    /// 注册备用工厂，同一令牌后注册者覆盖先注册者
    pub fn register<T, F>(&self, token: &Token<T>, factory: F)
    where
        T: Send + Sync + 'static,
        F: Fn() -> T + Send + Sync + 'static,
    {
        let erased: FallbackFactory =
            Arc::new(move || -> Arc<dyn Any + Send + Sync> { Arc::new(factory()) });
        self.factories.insert(token.id(), erased);
    }

    pub fn contains<T: ?Sized>(&self, token: &Token<T>) -> bool {
        self.factories.contains_key(&token.id())
    }

    /// 调用备用工厂创建实例
    pub fn create<T: Send + Sync + 'static>(&self, token: &Token<T>) -> Option<Arc<T>> {
        // 先克隆工厂再调用，避免持有分片锁
        let factory = self.factories.get(&token.id())?.value().clone();
        factory().downcast::<T>().ok()
    }

    pub fn remove<T: ?Sized>(&self, token: &Token<T>) -> bool {
        self.factories.remove(&token.id()).is_some()
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}
