//! 注册表

use std::collections::HashMap;

use indexmap::{IndexMap, IndexSet};

use super::registration::{Lifecycle, Registration};
use super::token::{AnyToken, TokenId};
use crate::errors::{ContainerError, ErrorKind};

/// 默认最大注册数量
pub const DEFAULT_MAX_REGISTRATIONS: usize = 10_000;

/// 令牌到注册信息的映射，按插入顺序保存，附带生命周期索引
#[derive(Debug, Clone)]
pub struct ServiceRegistry {
    registrations: IndexMap<TokenId, (AnyToken, Registration)>,
    by_lifecycle: HashMap<Lifecycle, IndexSet<TokenId>>,
    max_registrations: usize,
}

impl Default for ServiceRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_REGISTRATIONS)
    }
}

impl ServiceRegistry {
    pub fn new(max_registrations: usize) -> Self {
        Self {
            registrations: IndexMap::new(),
            by_lifecycle: HashMap::new(),
            max_registrations,
        }
    }

    /// 添加注册；重复令牌或超出上限时失败
    pub fn register(
        &mut self,
        token: AnyToken,
        registration: Registration,
    ) -> Result<(), ContainerError> {
        if self.registrations.contains_key(&token.id()) {
            return Err(ContainerError::new(
                ErrorKind::DuplicateRegistration,
                format!("Service {} is already registered", token),
            )
            .with_token(&token));
        }

        if self.registrations.len() >= self.max_registrations {
            return Err(ContainerError::invalid_operation(format!(
                "Maximum registrations ({}) exceeded",
                self.max_registrations
            ))
            .with_token(&token));
        }

        self.by_lifecycle
            .entry(registration.lifecycle())
            .or_default()
            .insert(token.id());
        self.registrations
            .insert(token.id(), (token, registration));
        Ok(())
    }

    pub fn get(&self, token: &AnyToken) -> Option<&Registration> {
        self.registrations
            .get(&token.id())
            .map(|(_, registration)| registration)
    }

    pub fn has(&self, token: &AnyToken) -> bool {
        self.registrations.contains_key(&token.id())
    }

    /// 全部注册的副本（插入顺序）
    pub fn get_all(&self) -> Vec<(AnyToken, Registration)> {
        self.registrations.values().cloned().collect()
    }

    /// 指定生命周期的令牌，基于索引而非全表扫描
    pub fn get_by_lifecycle(&self, lifecycle: Lifecycle) -> Vec<AnyToken> {
        self.by_lifecycle
            .get(&lifecycle)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| self.registrations.get(id).map(|(token, _)| token.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn tokens(&self) -> impl Iterator<Item = &AnyToken> {
        self.registrations.values().map(|(token, _)| token)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&AnyToken, &Registration)> {
        self.registrations
            .values()
            .map(|(token, registration)| (token, registration))
    }

    pub fn len(&self) -> usize {
        self.registrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }

    pub fn max_registrations(&self) -> usize {
        self.max_registrations
    }

    pub fn clear(&mut self) {
        self.registrations.clear();
        self.by_lifecycle.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::registration::{Factory, Value};
    use crate::container::token::Token;

    fn transient_factory() -> Registration {
        Registration::factory(Factory::new(|| Ok(1u32)), Lifecycle::Transient, Vec::new())
    }

    #[test]
    fn test_duplicate_registration() {
        let mut registry = ServiceRegistry::default();
        let token = Token::<u32>::new("Counter");

        registry.register(token.erase(), transient_factory()).unwrap();
        let error = registry
            .register(token.erase(), transient_factory())
            .unwrap_err();

        assert_eq!(error.kind(), ErrorKind::DuplicateRegistration);
        assert_eq!(error.token(), Some("Counter"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_max_registrations() {
        let mut registry = ServiceRegistry::new(2);
        for name in ["A", "B"] {
            let token = Token::<u32>::new(name);
            registry.register(token.erase(), transient_factory()).unwrap();
        }

        let overflow = Token::<u32>::new("C");
        let error = registry
            .register(overflow.erase(), transient_factory())
            .unwrap_err();
        assert_eq!(error.kind(), ErrorKind::InvalidOperation);
        assert!(!registry.has(&overflow.erase()));
    }

    #[test]
    fn test_lifecycle_index() {
        let mut registry = ServiceRegistry::default();
        let a = Token::<u32>::new("A");
        let b = Token::<&'static str>::new("B");
        let c = Token::<u32>::new("C");

        registry.register(a.erase(), transient_factory()).unwrap();
        registry
            .register(
                b.erase(),
                Registration::value(Value::new("b"), &b.erase()).unwrap(),
            )
            .unwrap();
        registry.register(c.erase(), transient_factory()).unwrap();

        assert_eq!(
            registry.get_by_lifecycle(Lifecycle::Transient),
            vec![a.erase(), c.erase()]
        );
        assert_eq!(registry.get_by_lifecycle(Lifecycle::Singleton), vec![b.erase()]);
        assert!(registry.get_by_lifecycle(Lifecycle::Scoped).is_empty());
    }

    #[test]
    fn test_clone_is_independent() {
        let mut original = ServiceRegistry::default();
        let a = Token::<u32>::new("A");
        original.register(a.erase(), transient_factory()).unwrap();

        let mut copy = original.clone();
        let b = Token::<u32>::new("B");
        copy.register(b.erase(), transient_factory()).unwrap();

        assert!(copy.has(&a.erase()));
        assert!(!original.has(&b.erase()));
        assert_eq!(original.get_by_lifecycle(Lifecycle::Transient).len(), 1);
        assert_eq!(copy.get_by_lifecycle(Lifecycle::Transient).len(), 2);
    }

    #[test]
    fn test_clear() {
        let mut registry = ServiceRegistry::default();
        let a = Token::<u32>::new("A");
        registry.register(a.erase(), transient_factory()).unwrap();

        registry.clear();

        assert!(registry.is_empty());
        assert!(registry.get_by_lifecycle(Lifecycle::Transient).is_empty());
        assert!(registry.get(&a.erase()).is_none());
    }
}
