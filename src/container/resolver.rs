//! 服务解析器
//!
//! 查找注册、递归解析依赖、调用生产者并应用生命周期策略。单例优先委托给
//! 父解析器，作用域服务只在子作用域中缓存。
//!
//! 同一作用域内的解析通过可重入锁串行化：生产者可以在同一线程上回调容器，
//! 其他线程的调用者等待，从而保证每个单例或作用域注册最多创建一个实例。
//! 加锁顺序总是子作用域先于父作用域。调用生产者时不持有注册表锁。

use std::cell::RefCell;
use std::sync::Arc;

use parking_lot::{ReentrantMutex, RwLock};

use super::cache::InstanceCache;
use super::registration::{Dependencies, Instance, Lifecycle, Producer, Registration};
use super::registry::ServiceRegistry;
use super::token::{AnyToken, Token};
use super::validator::render_path;
use crate::errors::{ContainerError, ErrorKind};
use crate::metrics::PerformanceTracker;

/// 解析栈上的一帧，离开作用域时出栈（包括生产者 panic 展开时）
struct StackFrame<'a> {
    stack: &'a RefCell<Vec<AnyToken>>,
}

impl<'a> StackFrame<'a> {
    fn push(stack: &'a RefCell<Vec<AnyToken>>, token: &AnyToken) -> Self {
        stack.borrow_mut().push(token.clone());
        Self { stack }
    }
}

impl Drop for StackFrame<'_> {
    fn drop(&mut self) {
        self.stack.borrow_mut().pop();
    }
}

pub(crate) struct ServiceResolver {
    registry: Arc<RwLock<ServiceRegistry>>,
    cache: Arc<InstanceCache>,
    parent: Option<Arc<ServiceResolver>>,
    scope_name: String,
    tracker: PerformanceTracker,
    /// 当前线程上正在解析的令牌
    resolution_stack: ReentrantMutex<RefCell<Vec<AnyToken>>>,
}

impl ServiceResolver {
    pub(crate) fn new(
        registry: Arc<RwLock<ServiceRegistry>>,
        cache: Arc<InstanceCache>,
        parent: Option<Arc<ServiceResolver>>,
        scope_name: impl Into<String>,
        tracker: PerformanceTracker,
    ) -> Self {
        Self {
            registry,
            cache,
            parent,
            scope_name: scope_name.into(),
            tracker,
            resolution_stack: ReentrantMutex::new(RefCell::new(Vec::new())),
        }
    }

    pub(crate) fn scope_name(&self) -> &str {
        &self.scope_name
    }

    /// 解析并向下转型为服务类型
    pub(crate) fn resolve_typed<T: Send + Sync + 'static>(
        &self,
        token: &Token<T>,
    ) -> Result<Arc<T>, ContainerError> {
        let instance = self.resolve(token.key())?;
        instance.downcast::<T>().ok_or_else(|| {
            ContainerError::invalid_operation(format!(
                "Service {} is not a {}",
                token,
                std::any::type_name::<T>()
            ))
            .with_token(token)
        })
    }

    pub(crate) fn resolve(&self, token: &AnyToken) -> Result<Instance, ContainerError> {
        let stack = self.resolution_stack.lock();
        self.tracker.track(token, || {
            if stack.borrow().contains(token) {
                let mut path = stack.borrow().clone();
                path.push(token.clone());
                return Err(ContainerError::new(
                    ErrorKind::CircularDependency,
                    format!("Circular dependency: {}", render_path(&path)),
                )
                .with_token(token));
            }

            let _frame = StackFrame::push(&stack, token);
            self.resolve_registration(token)
        })
    }

    fn resolve_registration(&self, token: &AnyToken) -> Result<Instance, ContainerError> {
        let registration = self
            .registry
            .read()
            .get(token)
            .cloned()
            .ok_or_else(|| ContainerError::not_registered(token))?;

        if let Some(target) = registration.alias_target() {
            return self.resolve(target);
        }

        match registration.lifecycle() {
            Lifecycle::Singleton => self.resolve_singleton(token, &registration),
            Lifecycle::Transient => self.instantiate(token, &registration),
            Lifecycle::Scoped => self.resolve_scoped(token, &registration),
        }
    }

    fn resolve_singleton(
        &self,
        token: &AnyToken,
        registration: &Registration,
    ) -> Result<Instance, ContainerError> {
        if let Some(parent) = &self.parent {
            match parent.resolve(token) {
                Ok(instance) => return Ok(instance),
                Err(error) if error.kind() == ErrorKind::CircularDependency => return Err(error),
                // 父级无法提供时使用本作用域的注册
                Err(_) => {}
            }
        }
        self.resolve_cached(token, registration)
    }

    fn resolve_scoped(
        &self,
        token: &AnyToken,
        registration: &Registration,
    ) -> Result<Instance, ContainerError> {
        if self.parent.is_none() {
            return Err(ContainerError::new(
                ErrorKind::ScopeRequired,
                format!("Scoped service {} requires a scope container", token),
            )
            .with_token(token));
        }
        self.resolve_cached(token, registration)
    }

    fn resolve_cached(
        &self,
        token: &AnyToken,
        registration: &Registration,
    ) -> Result<Instance, ContainerError> {
        if let Some(instance) = self.cache.get(token) {
            return Ok(instance);
        }
        let instance = self.instantiate(token, registration)?;
        Ok(self.cache.insert(token, instance))
    }

    fn instantiate(
        &self,
        token: &AnyToken,
        registration: &Registration,
    ) -> Result<Instance, ContainerError> {
        match registration.producer() {
            Producer::Class(constructor) => {
                let mut resolved = Vec::with_capacity(registration.dependencies().len());
                for dependency in registration.dependencies() {
                    let instance = self.resolve(dependency).map_err(|cause| {
                        ContainerError::new(
                            ErrorKind::DependencyResolveFailed,
                            format!("Cannot resolve dependency {} for {}", dependency, token),
                        )
                        .with_token(dependency)
                        .with_cause(cause)
                    })?;
                    resolved.push((dependency.clone(), instance));
                }

                let mut dependencies = Dependencies::new(token.clone(), resolved);
                constructor(&mut dependencies).map_err(|cause| {
                    ContainerError::new(
                        ErrorKind::FactoryFailed,
                        format!("Constructor failed for {}: {}", token, cause),
                    )
                    .with_token(token)
                    .with_boxed_cause(cause)
                })
            }
            Producer::Factory(factory) => factory().map_err(|cause| {
                ContainerError::new(
                    ErrorKind::FactoryFailed,
                    format!("Factory failed for {}: {}", token, cause),
                )
                .with_token(token)
                .with_boxed_cause(cause)
            }),
            Producer::Value(instance) => Ok(instance.clone()),
            Producer::Alias(target) => self.resolve(target),
        }
    }
}
