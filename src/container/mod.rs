//! 依赖注入容器
//!
//! [`ServiceContainer`] 是对外的门面：一个有限状态对象
//! （`Registering → Validated [→ Disposed]`），持有一个注册表、一个实例缓存、
//! 一个解析器，以及（子作用域）指向父级的链接。
//!
//! ```
//! use service_container::{deps, Class, Factory, Lifecycle, ServiceContainer, Token};
//!
//! struct Config {
//!     url: String,
//! }
//!
//! struct Database {
//!     url: String,
//! }
//!
//! let config = Token::<Config>::new("Config");
//! let database = Token::<Database>::new("Database");
//!
//! let container = ServiceContainer::new();
//! container
//!     .register_factory(
//!         &config,
//!         Factory::new(|| Ok(Config { url: "postgres://localhost".into() })),
//!         Lifecycle::Singleton,
//!         deps![],
//!     )
//!     .unwrap();
//! container
//!     .register_class(
//!         &database,
//!         Class::new(|deps| {
//!             let config = deps.next::<Config>()?;
//!             Ok(Database { url: config.url.clone() })
//!         }),
//!         Lifecycle::Singleton,
//!         deps![&config],
//!     )
//!     .unwrap();
//!
//! container.validate().unwrap();
//! let db = container.resolve_with_error(&database).unwrap();
//! assert_eq!(db.url, "postgres://localhost");
//! ```

mod cache;
mod fallback;
mod registration;
mod registry;
mod resolver;
mod scope;
mod token;
mod validator;

pub use fallback::FallbackRegistry;
pub use registration::{
    AsyncDisposable, Class, Dependencies, Disposable, Factory, Lifecycle, ProviderKind,
    Registration, Value,
};
pub use registry::{ServiceRegistry, DEFAULT_MAX_REGISTRATIONS};
pub use scope::DEFAULT_MAX_SCOPE_DEPTH;
pub use token::{AnyToken, DeprecationInfo, Deprecations, Token, TokenId};
pub use validator::ContainerValidator;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::ContainerConfig;
use crate::errors::{ContainerError, ErrorKind};
use crate::logging::OperationTimer;
use crate::metrics::{empty_slot, MetricsSink, PerformanceTracker, SinkSlot};
use cache::InstanceCache;
use registration::Producer;
use resolver::ServiceResolver;
use scope::ScopeManager;

/// 容器状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerState {
    /// 可以注册服务
    Registering,
    /// 验证进行中
    Validating,
    /// 已验证，可以解析服务
    Validated,
    /// 已销毁（终态）
    Disposed,
}

impl fmt::Display for ContainerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ContainerState::Registering => "registering",
            ContainerState::Validating => "validating",
            ContainerState::Validated => "validated",
            ContainerState::Disposed => "disposed",
        };
        f.write_str(name)
    }
}

struct ContainerInner {
    registry: Arc<RwLock<ServiceRegistry>>,
    resolver: Arc<ServiceResolver>,
    scope: Arc<ScopeManager>,
    state: Mutex<ContainerState>,
    /// 父子作用域共享同一个验证器
    validator: Arc<Mutex<ContainerValidator>>,
    /// 串行化异步验证
    validation_gate: tokio::sync::Mutex<()>,
    config: ContainerConfig,
    fallbacks: Arc<FallbackRegistry>,
    deprecations: Arc<Deprecations>,
    metrics: SinkSlot,
}

/// 验证期间持有；未提交就被丢弃时把状态退回 `Registering`
struct ValidationGuard<'a> {
    state: &'a Mutex<ContainerState>,
    armed: bool,
}

impl ValidationGuard<'_> {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for ValidationGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut state = self.state.lock();
        if *state == ContainerState::Validating {
            *state = ContainerState::Registering;
        }
    }
}

/// 服务容器
#[derive(Clone)]
pub struct ServiceContainer {
    inner: Arc<ContainerInner>,
}

/// 根容器构建器
#[derive(Default)]
pub struct ContainerBuilder {
    name: Option<String>,
    config: ContainerConfig,
    fallbacks: Option<Arc<FallbackRegistry>>,
    metrics: Option<Arc<dyn MetricsSink>>,
}

impl ContainerBuilder {
    /// 根作用域名称，默认为 `root`
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn config(mut self, config: ContainerConfig) -> Self {
        self.config = config;
        self
    }

    /// 使用独立的备用注册表代替进程级共享实例
    pub fn fallbacks(mut self, fallbacks: Arc<FallbackRegistry>) -> Self {
        self.fallbacks = Some(fallbacks);
        self
    }

    pub fn metrics(mut self, sink: Arc<dyn MetricsSink>) -> Self {
        self.metrics = Some(sink);
        self
    }

    pub fn build(self) -> ServiceContainer {
        let name = self.name.unwrap_or_else(|| "root".to_string());
        let metrics = empty_slot();
        if let Some(sink) = self.metrics {
            *metrics.write() = Some(sink);
        }

        let registry = Arc::new(RwLock::new(ServiceRegistry::new(
            self.config.max_registrations,
        )));
        let cache = Arc::new(InstanceCache::new(
            self.config.performance_tracking,
            metrics.clone(),
        ));
        let scope = Arc::new(ScopeManager::root(
            name.clone(),
            cache.clone(),
            self.config.max_scope_depth,
        ));
        let resolver = Arc::new(ServiceResolver::new(
            registry.clone(),
            cache,
            None,
            name,
            tracker_for(&self.config, &metrics),
        ));

        ServiceContainer::assemble(
            registry,
            resolver,
            scope,
            Arc::new(Mutex::new(ContainerValidator::new())),
            self.config,
            self.fallbacks.unwrap_or_else(FallbackRegistry::global),
            Arc::new(Deprecations::new()),
            metrics,
        )
    }
}

fn tracker_for(config: &ContainerConfig, metrics: &SinkSlot) -> PerformanceTracker {
    PerformanceTracker::new(
        config.performance_tracking,
        config.sampling_rate,
        metrics.clone(),
    )
}

impl ServiceContainer {
    /// 使用默认配置创建根容器
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn with_config(config: ContainerConfig) -> Self {
        Self::builder().config(config).build()
    }

    pub fn builder() -> ContainerBuilder {
        ContainerBuilder::default()
    }

    #[allow(clippy::too_many_arguments)]
    fn assemble(
        registry: Arc<RwLock<ServiceRegistry>>,
        resolver: Arc<ServiceResolver>,
        scope: Arc<ScopeManager>,
        validator: Arc<Mutex<ContainerValidator>>,
        config: ContainerConfig,
        fallbacks: Arc<FallbackRegistry>,
        deprecations: Arc<Deprecations>,
        metrics: SinkSlot,
    ) -> Self {
        Self {
            inner: Arc::new(ContainerInner {
                registry,
                resolver,
                scope,
                state: Mutex::new(ContainerState::Registering),
                validator,
                validation_gate: tokio::sync::Mutex::new(()),
                config,
                fallbacks,
                deprecations,
                metrics,
            }),
        }
    }

    // ---- 状态 ----

    /// 当前状态；父作用域的级联销毁也会反映在这里
    pub fn get_validation_state(&self) -> ContainerState {
        if self.inner.scope.is_disposed() {
            return ContainerState::Disposed;
        }
        *self.inner.state.lock()
    }

    pub fn is_disposed(&self) -> bool {
        self.get_validation_state() == ContainerState::Disposed
    }

    /// 层级作用域名称，例如 `root.request`
    pub fn scope_name(&self) -> &str {
        self.inner.scope.name()
    }

    /// 作用域深度，根为 0
    pub fn scope_depth(&self) -> usize {
        self.inner.scope.depth()
    }

    /// 作用域关联 ID
    pub fn scope_id(&self) -> Uuid {
        self.inner.scope.id()
    }

    pub fn config(&self) -> &ContainerConfig {
        &self.inner.config
    }

    /// 生产环境下清洗错误，完整错误先记录到 debug 日志
    fn sanitize(&self, error: ContainerError) -> ContainerError {
        if !self.inner.config.environment.sanitizes_errors() {
            return error;
        }
        debug!(scope = %self.scope_name(), error = %error, "Sanitizing container error");
        error.sanitized()
    }

    fn sanitize_all(&self, errors: Vec<ContainerError>) -> Vec<ContainerError> {
        errors.into_iter().map(|error| self.sanitize(error)).collect()
    }

    // ---- 注册 ----

    fn register(&self, token: &AnyToken, registration: Registration) -> Result<(), ContainerError> {
        let state = self.inner.state.lock();
        let current = if self.inner.scope.is_disposed() {
            ContainerState::Disposed
        } else {
            *state
        };

        match current {
            ContainerState::Registering => {}
            ContainerState::Disposed => {
                return Err(ContainerError::disposed(format!(
                    "Cannot register {} on disposed container",
                    token
                ))
                .with_token(token));
            }
            ContainerState::Validating | ContainerState::Validated => {
                return Err(ContainerError::invalid_operation(format!(
                    "Cannot register {} after container validation",
                    token
                ))
                .with_token(token));
            }
        }

        let lifecycle = registration.lifecycle();
        let kind = registration.provider_kind();
        self.inner.registry.write().register(token.clone(), registration)?;
        debug!(
            scope = %self.scope_name(),
            token = %token,
            lifecycle = %lifecycle,
            provider = %kind,
            "Service registered"
        );
        Ok(())
    }

    /// 注册构造器；依赖按声明顺序解析后交给构造闭包
    pub fn register_class<T: Send + Sync + 'static>(
        &self,
        token: &Token<T>,
        class: Class<T>,
        lifecycle: Lifecycle,
        dependencies: Vec<AnyToken>,
    ) -> Result<(), ContainerError> {
        let registration = Registration::class(class, lifecycle, dependencies);
        self.register(token.key(), registration)
            .map_err(|error| self.sanitize(error))
    }

    /// 注册零参工厂；依赖列表只参与验证
    pub fn register_factory<T: Send + Sync + 'static>(
        &self,
        token: &Token<T>,
        factory: Factory<T>,
        lifecycle: Lifecycle,
        dependencies: Vec<AnyToken>,
    ) -> Result<(), ContainerError> {
        let registration = Registration::factory(factory, lifecycle, dependencies);
        self.register(token.key(), registration)
            .map_err(|error| self.sanitize(error))
    }

    /// 注册预先计算好的值（总是单例）
    pub fn register_value<T: Send + Sync + 'static>(
        &self,
        token: &Token<T>,
        value: impl Into<Value<T>>,
    ) -> Result<(), ContainerError> {
        Registration::value(value.into(), token.key())
            .and_then(|registration| self.register(token.key(), registration))
            .map_err(|error| self.sanitize(error))
    }

    /// 注册别名，解析 `alias` 时转而解析 `target`
    pub fn register_alias<T: ?Sized>(
        &self,
        alias: &Token<T>,
        target: &Token<T>,
    ) -> Result<(), ContainerError> {
        self.register(alias.key(), Registration::alias(target))
            .map_err(|error| self.sanitize(error))
    }

    pub fn is_registered<T: ?Sized>(&self, token: &Token<T>) -> Result<bool, ContainerError> {
        if self.is_disposed() {
            return Err(self.sanitize(ContainerError::disposed(
                "Cannot query registrations on disposed container",
            )));
        }
        Ok(self.inner.registry.read().has(token.key()))
    }

    /// 注册信息的副本
    pub fn get_registration<T: ?Sized>(&self, token: &Token<T>) -> Option<Registration> {
        self.inner.registry.read().get(token.key()).cloned()
    }

    /// 全部注册的副本（插入顺序）
    pub fn get_all_registrations(&self) -> Vec<(AnyToken, Registration)> {
        self.inner.registry.read().get_all()
    }

    /// 指定生命周期的全部令牌
    pub fn get_by_lifecycle(&self, lifecycle: Lifecycle) -> Vec<AnyToken> {
        self.inner.registry.read().get_by_lifecycle(lifecycle)
    }

    /// 注册表快照，可交给独立的 [`ContainerValidator`] 检查
    pub fn registry_snapshot(&self) -> ServiceRegistry {
        self.inner.registry.read().clone()
    }

    /// 直接读取已注册的常量值，不要求先验证
    pub fn get_registered_value<T: Send + Sync + 'static>(&self, token: &Token<T>) -> Option<Arc<T>> {
        if self.is_disposed() {
            return None;
        }
        let registry = self.inner.registry.read();
        match registry.get(token.key())?.producer() {
            Producer::Value(instance) => instance.downcast::<T>(),
            _ => None,
        }
    }

    /// 在备用注册表中登记工厂
    pub fn register_fallback<T, F>(&self, token: &Token<T>, factory: F)
    where
        T: Send + Sync + 'static,
        F: Fn() -> T + Send + Sync + 'static,
    {
        self.inner.fallbacks.register(token, factory);
    }

    /// 标记令牌为弃用；经 `resolve` 解析时提示一次
    pub fn deprecate<T: ?Sized>(
        &self,
        token: &Token<T>,
        reason: impl Into<String>,
        replacement: Option<&str>,
    ) {
        self.inner
            .deprecations
            .mark(token.key(), reason, replacement.map(str::to_string));
    }

    pub fn deprecations(&self) -> &Deprecations {
        &self.inner.deprecations
    }

    /// 设置指标收集器，对本容器及共享同一槽位的作用域生效
    pub fn set_metrics_sink(&self, sink: Arc<dyn MetricsSink>) {
        *self.inner.metrics.write() = Some(sink);
    }

    // ---- 验证 ----

    /// 进入 `Validating`；已验证时返回 `None`
    fn begin_validation(&self) -> Result<Option<ValidationGuard<'_>>, Vec<ContainerError>> {
        let mut state = self.inner.state.lock();
        if self.inner.scope.is_disposed() {
            return Err(vec![ContainerError::disposed(
                "Cannot validate disposed container",
            )]);
        }
        match *state {
            ContainerState::Validated => Ok(None),
            ContainerState::Validating => Err(vec![ContainerError::invalid_operation(
                "Validation already in progress",
            )]),
            ContainerState::Disposed => Err(vec![ContainerError::disposed(
                "Cannot validate disposed container",
            )]),
            ContainerState::Registering => {
                *state = ContainerState::Validating;
                Ok(Some(ValidationGuard {
                    state: &self.inner.state,
                    armed: true,
                }))
            }
        }
    }

    fn commit_validation(
        &self,
        guard: ValidationGuard<'_>,
        outcome: Result<(), Vec<ContainerError>>,
    ) -> Result<(), Vec<ContainerError>> {
        guard.disarm();
        let mut state = self.inner.state.lock();
        if *state != ContainerState::Validating || self.inner.scope.is_disposed() {
            return Err(vec![ContainerError::disposed(
                "Container was disposed during validation",
            )]);
        }

        match outcome {
            Ok(()) => {
                *state = ContainerState::Validated;
                info!(
                    scope = %self.scope_name(),
                    services = self.inner.registry.read().len(),
                    "Container validated"
                );
                Ok(())
            }
            Err(errors) => {
                *state = ContainerState::Registering;
                for error in &errors {
                    warn!(scope = %self.scope_name(), error = %error, "Validation failed");
                }
                Err(errors)
            }
        }
    }

    /// 验证依赖图；已验证时直接成功
    pub fn validate(&self) -> Result<(), Vec<ContainerError>> {
        self.validate_blocking()
            .map_err(|errors| self.sanitize_all(errors))
    }

    fn validate_blocking(&self) -> Result<(), Vec<ContainerError>> {
        let Some(guard) = self.begin_validation()? else {
            return Ok(());
        };

        let timer =
            OperationTimer::new("container_validate").with_metadata("scope", self.scope_name());
        let outcome = {
            let registry = self.inner.registry.read();
            self.inner.validator.lock().validate(&registry)
        };
        timer.finish();
        self.commit_validation(guard, outcome)
    }

    /// 在阻塞线程池上验证，受 `validation_timeout_ms` 限制；超时后迟到的结果被丢弃。
    /// 未完成就被丢弃的 future 会把状态退回 `Registering`
    pub async fn validate_async(&self) -> Result<(), Vec<ContainerError>> {
        let _gate = self.inner.validation_gate.lock().await;
        let result = self.validate_in_background().await;
        result.map_err(|errors| self.sanitize_all(errors))
    }

    async fn validate_in_background(&self) -> Result<(), Vec<ContainerError>> {
        let Some(guard) = self.begin_validation()? else {
            return Ok(());
        };

        let snapshot = self.inner.registry.read().clone();
        let validator = self.inner.validator.clone();
        let task = tokio::task::spawn_blocking(move || validator.lock().validate(&snapshot));
        let timeout_ms = self.inner.config.validation_timeout_ms;

        match tokio::time::timeout(Duration::from_millis(timeout_ms), task).await {
            Ok(Ok(outcome)) => self.commit_validation(guard, outcome),
            Ok(Err(join_error)) => {
                drop(guard);
                Err(vec![ContainerError::invalid_operation(format!(
                    "Validation task failed: {}",
                    join_error
                ))])
            }
            Err(_) => {
                drop(guard);
                warn!(scope = %self.scope_name(), timeout_ms, "Validation timed out");
                Err(vec![ContainerError::invalid_operation(format!(
                    "Validation timed out after {}ms",
                    timeout_ms
                ))])
            }
        }
    }

    // ---- 解析 ----

    fn resolve_inner<T: Send + Sync + 'static>(
        &self,
        token: &Token<T>,
    ) -> Result<Arc<T>, ContainerError> {
        match self.get_validation_state() {
            ContainerState::Validated => self.inner.resolver.resolve_typed(token),
            ContainerState::Disposed => Err(ContainerError::disposed(format!(
                "Cannot resolve {} from disposed container",
                token
            ))
            .with_token(token)),
            _ => Err(ContainerError::new(
                ErrorKind::NotValidated,
                "Container must be validated before resolving. Call validate() first.",
            )
            .with_token(token)),
        }
    }

    /// 解析服务，失败以错误值返回
    pub fn resolve_with_error<T: Send + Sync + 'static>(
        &self,
        token: &Token<T>,
    ) -> Result<Arc<T>, ContainerError> {
        self.resolve_inner(token).map_err(|error| self.sanitize(error))
    }

    /// 解析服务；令牌完全未注册时使用备用工厂
    ///
    /// # Panics
    ///
    /// 解析失败且没有可用的备用工厂时 panic。需要错误值时使用
    /// [`ServiceContainer::resolve_with_error`]。
    pub fn resolve<T: Send + Sync + 'static>(&self, token: &Token<T>) -> Arc<T> {
        if let Some(info) = self.inner.deprecations.take_warning(token.key()) {
            warn!(
                token = %token,
                reason = %info.reason,
                replacement = ?info.replacement,
                "Resolving deprecated service"
            );
        }

        let error = match self.resolve_with_error(token) {
            Ok(service) => return service,
            Err(error) => error,
        };

        let unregistered = error.kind() == ErrorKind::TokenNotRegistered
            && !self.inner.registry.read().has(token.key());
        if unregistered {
            if let Some(service) = self.inner.fallbacks.create(token) {
                debug!(token = %token, "Resolved from fallback factory");
                return service;
            }
        }

        panic!(
            "Cannot resolve service: {}. No fallback factory registered for this token.",
            error
        );
    }

    // ---- 作用域 ----

    /// 创建子作用域；父容器必须已验证，子容器需要单独验证
    pub fn create_scope(&self, name: Option<&str>) -> Result<ServiceContainer, ContainerError> {
        self.create_scope_inner(name)
            .map_err(|error| self.sanitize(error))
    }

    fn create_scope_inner(&self, name: Option<&str>) -> Result<ServiceContainer, ContainerError> {
        match self.get_validation_state() {
            ContainerState::Validated => {}
            ContainerState::Disposed => {
                return Err(ContainerError::disposed(
                    "Cannot create scope from disposed container",
                ));
            }
            _ => {
                return Err(ContainerError::new(
                    ErrorKind::NotValidated,
                    "Parent must be validated before creating scopes. Call validate() first.",
                ));
            }
        }

        let inner = &self.inner;
        let scope = inner.scope.create_child(name, inner.metrics.clone())?;
        let registry = Arc::new(RwLock::new(inner.registry.read().clone()));
        let resolver = Arc::new(ServiceResolver::new(
            registry.clone(),
            scope.cache().clone(),
            Some(inner.resolver.clone()),
            scope.name(),
            tracker_for(&inner.config, &inner.metrics),
        ));
        debug!(
            scope = %resolver.scope_name(),
            parent = %self.scope_name(),
            "Scope container created"
        );

        Ok(Self::assemble(
            registry,
            resolver,
            scope,
            inner.validator.clone(),
            inner.config.clone(),
            inner.fallbacks.clone(),
            inner.deprecations.clone(),
            inner.metrics.clone(),
        ))
    }

    // ---- 销毁 ----

    /// 同步销毁本作用域及其全部子作用域
    pub fn dispose(&self) -> Result<(), ContainerError> {
        let result = self.inner.scope.dispose();
        *self.inner.state.lock() = ContainerState::Disposed;
        result.map_err(|error| self.sanitize(error))
    }

    /// 异步销毁，等待每个子作用域和实例的销毁钩子完成
    pub async fn dispose_async(&self) -> Result<(), ContainerError> {
        let result = self.inner.scope.dispose_async().await;
        *self.inner.state.lock() = ContainerState::Disposed;
        result.map_err(|error| self.sanitize(error))
    }

    /// 清空注册和实例缓存，回到 `Registering`
    pub fn clear(&self) -> Result<(), ContainerError> {
        let mut state = self.inner.state.lock();
        if self.inner.scope.is_disposed() || *state == ContainerState::Disposed {
            return Err(self.sanitize(ContainerError::disposed(
                "Cannot clear disposed container",
            )));
        }

        self.inner.registry.write().clear();
        self.inner.scope.cache().clear();
        *state = ContainerState::Registering;
        debug!(scope = %self.scope_name(), "Container cleared");
        Ok(())
    }

    /// 当前作用域缓存的实例数
    pub fn cached_instance_count(&self) -> usize {
        self.inner.scope.cache().len()
    }

    /// 活跃子作用域数
    pub fn child_scope_count(&self) -> usize {
        self.inner.scope.child_count()
    }
}

impl Default for ServiceContainer {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ServiceContainer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceContainer")
            .field("scope", &self.scope_name())
            .field("state", &self.get_validation_state())
            .field("registrations", &self.inner.registry.read().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Environment;
    use crate::errors::SANITIZED_MESSAGE;

    #[test]
    fn test_state_transitions() {
        let container = ServiceContainer::new();
        assert_eq!(container.get_validation_state(), ContainerState::Registering);

        container.validate().unwrap();
        assert_eq!(container.get_validation_state(), ContainerState::Validated);

        container.clear().unwrap();
        assert_eq!(container.get_validation_state(), ContainerState::Registering);

        container.dispose().unwrap();
        assert_eq!(container.get_validation_state(), ContainerState::Disposed);
        assert_eq!(container.clear().unwrap_err().kind(), ErrorKind::Disposed);
    }

    #[test]
    fn test_validation_already_in_progress() {
        let container = ServiceContainer::new();
        *container.inner.state.lock() = ContainerState::Validating;

        let errors = container.validate().unwrap_err();
        assert_eq!(errors[0].kind(), ErrorKind::InvalidOperation);
        assert_eq!(errors[0].message(), "Validation already in progress");
    }

    #[test]
    fn test_dropped_validation_guard_restores_registering() {
        let container = ServiceContainer::new();
        let guard = container.begin_validation().unwrap();
        assert!(guard.is_some());
        assert_eq!(container.get_validation_state(), ContainerState::Validating);

        drop(guard);

        assert_eq!(container.get_validation_state(), ContainerState::Registering);
        container
            .register_value(&Token::<u32>::new("Late"), 1u32)
            .unwrap();
    }

    #[tokio::test]
    async fn test_cancelled_validate_async_can_be_retried() {
        use futures::FutureExt;

        let container = ServiceContainer::builder()
            .fallbacks(Arc::new(FallbackRegistry::new()))
            .build();
        container
            .register_value(&Token::<u32>::new("Port"), 8080u32)
            .unwrap();

        // 只轮询一次后丢弃
        let _ = container.validate_async().now_or_never();

        assert_ne!(container.get_validation_state(), ContainerState::Validating);
        container.validate().unwrap();
        assert_eq!(container.get_validation_state(), ContainerState::Validated);
    }

    #[test]
    fn test_production_sanitizes_errors() {
        let config = ContainerConfig {
            environment: Environment::Production,
            ..ContainerConfig::default()
        };
        let container = ServiceContainer::with_config(config);
        let secret = Token::<String>::new("DatabasePassword");
        container.validate().unwrap();

        let error = container.resolve_with_error(&secret).unwrap_err();

        assert_eq!(error.kind(), ErrorKind::TokenNotRegistered);
        assert_eq!(error.message(), SANITIZED_MESSAGE);
        assert!(error.token().is_none());
        assert!(!error.to_string().contains("DatabasePassword"));
    }

    #[test]
    fn test_clear_drops_registrations_and_instances() {
        let container = ServiceContainer::new();
        let token = Token::<u32>::new("Answer");
        container.register_value(&token, 42u32).unwrap();
        container.validate().unwrap();
        container.resolve_with_error(&token).unwrap();
        assert_eq!(container.cached_instance_count(), 1);

        container.clear().unwrap();

        assert!(!container.is_registered(&token).unwrap());
        assert_eq!(container.cached_instance_count(), 0);
        container.register_value(&token, 7u32).unwrap();
    }

    #[test]
    fn test_debug_output() {
        let container = ServiceContainer::builder().name("app").build();
        let rendered = format!("{:?}", container);
        assert!(rendered.contains("app"));
        assert!(rendered.contains("Registering"));
    }
}
