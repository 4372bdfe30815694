//! 注册信息与生产者
//!
//! 每条注册记录一个生命周期、一个有序依赖列表以及恰好一种生产者：
//! 构造器（`Class`）、零参工厂（`Factory`）、预先计算好的值（`Value`）
//! 或指向另一令牌的别名。

use std::any::Any;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::token::{AnyToken, Token};
use crate::errors::{BoxError, ContainerError, ErrorKind};

/// 服务生命周期
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Lifecycle {
    /// 单例 - 整棵作用域树共享一个实例
    Singleton,
    /// 瞬态 - 每次解析都创建新实例
    Transient,
    /// 作用域 - 每个子作用域一个实例
    Scoped,
}

impl Lifecycle {
    pub fn as_str(&self) -> &'static str {
        match self {
            Lifecycle::Singleton => "singleton",
            Lifecycle::Transient => "transient",
            Lifecycle::Scoped => "scoped",
        }
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Lifecycle::Singleton
    }
}

impl fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Lifecycle {
    type Err = ContainerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "singleton" => Ok(Lifecycle::Singleton),
            "transient" => Ok(Lifecycle::Transient),
            "scoped" => Ok(Lifecycle::Scoped),
            other => Err(ContainerError::new(
                ErrorKind::InvalidLifecycle,
                format!("Invalid lifecycle: {}", other),
            )),
        }
    }
}

/// 生产者类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    Class,
    Factory,
    Value,
    Alias,
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProviderKind::Class => "class",
            ProviderKind::Factory => "factory",
            ProviderKind::Value => "value",
            ProviderKind::Alias => "alias",
        };
        f.write_str(name)
    }
}

/// 同步销毁能力
pub trait Disposable: Send + Sync {
    fn dispose(&self) -> Result<(), BoxError>;
}

/// 异步销毁能力
#[async_trait]
pub trait AsyncDisposable: Send + Sync {
    async fn dispose_async(&self) -> Result<(), BoxError>;
}

/// 实例上登记的销毁钩子
#[derive(Clone, Default)]
pub(crate) struct DisposalHooks {
    pub(crate) sync: Option<Arc<dyn Disposable>>,
    pub(crate) asynchronous: Option<Arc<dyn AsyncDisposable>>,
}

impl DisposalHooks {
    pub(crate) fn is_empty(&self) -> bool {
        self.sync.is_none() && self.asynchronous.is_none()
    }
}

/// 类型擦除的服务实例
#[derive(Clone)]
pub(crate) struct Instance {
    pub(crate) value: Arc<dyn Any + Send + Sync>,
    pub(crate) hooks: DisposalHooks,
}

impl Instance {
    pub(crate) fn downcast<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.value.clone().downcast::<T>().ok()
    }
}

type SyncHookFn<T> = fn(Arc<T>) -> Arc<dyn Disposable>;
type AsyncHookFn<T> = fn(Arc<T>) -> Arc<dyn AsyncDisposable>;

/// 构建器上记录的销毁能力，实例创建时转换为 [`DisposalHooks`]
struct HookBuilder<T> {
    sync: Option<SyncHookFn<T>>,
    asynchronous: Option<AsyncHookFn<T>>,
}

impl<T> Default for HookBuilder<T> {
    fn default() -> Self {
        Self {
            sync: None,
            asynchronous: None,
        }
    }
}

impl<T: Send + Sync + 'static> HookBuilder<T> {
    fn wrap(&self, value: T) -> Instance {
        let value = Arc::new(value);
        let hooks = DisposalHooks {
            sync: self.sync.map(|hook| hook(value.clone())),
            asynchronous: self.asynchronous.map(|hook| hook(value.clone())),
        };
        Instance { value, hooks }
    }
}

fn sync_hook<T: Disposable + 'static>(value: Arc<T>) -> Arc<dyn Disposable> {
    value
}

fn async_hook<T: AsyncDisposable + 'static>(value: Arc<T>) -> Arc<dyn AsyncDisposable> {
    value
}

/// 构造器收到的已解析依赖（按声明顺序）
pub struct Dependencies {
    owner: AnyToken,
    resolved: Vec<(AnyToken, Instance)>,
    position: usize,
}

impl Dependencies {
    pub(crate) fn new(owner: AnyToken, resolved: Vec<(AnyToken, Instance)>) -> Self {
        Self {
            owner,
            resolved,
            position: 0,
        }
    }

    /// 按声明顺序取出下一个依赖
    pub fn next<U: Send + Sync + 'static>(&mut self) -> Result<Arc<U>, ContainerError> {
        let (token, instance) = self.resolved.get(self.position).ok_or_else(|| {
            ContainerError::invalid_operation(format!(
                "{} requested more dependencies than the {} it declared",
                self.owner,
                self.resolved.len()
            ))
            .with_token(&self.owner)
        })?;
        self.position += 1;
        Self::cast(&self.owner, token, instance)
    }

    /// 按令牌取依赖，令牌必须在依赖列表中
    pub fn get<U: Send + Sync + 'static>(&self, token: &Token<U>) -> Result<Arc<U>, ContainerError> {
        let (found, instance) = self
            .resolved
            .iter()
            .find(|(candidate, _)| candidate == token.key())
            .ok_or_else(|| {
                ContainerError::invalid_operation(format!(
                    "{} is not a declared dependency of {}",
                    token, self.owner
                ))
                .with_token(token)
            })?;
        Self::cast(&self.owner, found, instance)
    }

    pub fn len(&self) -> usize {
        self.resolved.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resolved.is_empty()
    }

    fn cast<U: Send + Sync + 'static>(
        owner: &AnyToken,
        token: &AnyToken,
        instance: &Instance,
    ) -> Result<Arc<U>, ContainerError> {
        instance.downcast::<U>().ok_or_else(|| {
            ContainerError::invalid_operation(format!(
                "Dependency {} of {} is not a {}",
                token,
                owner,
                std::any::type_name::<U>()
            ))
            .with_token(token)
        })
    }
}

pub(crate) type ClassFn =
    Arc<dyn Fn(&mut Dependencies) -> Result<Instance, BoxError> + Send + Sync>;
pub(crate) type FactoryFn = Arc<dyn Fn() -> Result<Instance, BoxError> + Send + Sync>;

/// 注册中实际保存的生产者
#[derive(Clone)]
pub(crate) enum Producer {
    Class(ClassFn),
    Factory(FactoryFn),
    Value(Instance),
    Alias(AnyToken),
}

/// 构造器生产者：先解析依赖，再按声明顺序交给构造闭包
pub struct Class<T> {
    constructor: Box<dyn Fn(&mut Dependencies) -> Result<T, BoxError> + Send + Sync>,
    hooks: HookBuilder<T>,
}

impl<T: Send + Sync + 'static> Class<T> {
    pub fn new<F>(constructor: F) -> Self
    where
        F: Fn(&mut Dependencies) -> Result<T, BoxError> + Send + Sync + 'static,
    {
        Self {
            constructor: Box::new(constructor),
            hooks: HookBuilder::default(),
        }
    }

    pub fn disposable(mut self) -> Self
    where
        T: Disposable,
    {
        self.hooks.sync = Some(sync_hook::<T>);
        self
    }

    pub fn async_disposable(mut self) -> Self
    where
        T: AsyncDisposable,
    {
        self.hooks.asynchronous = Some(async_hook::<T>);
        self
    }

    pub(crate) fn into_producer(self) -> Producer {
        let Class { constructor, hooks } = self;
        Producer::Class(Arc::new(move |deps: &mut Dependencies| {
            constructor(deps).map(|value| hooks.wrap(value))
        }))
    }
}

/// 零参工厂生产者
pub struct Factory<T> {
    factory: Box<dyn Fn() -> Result<T, BoxError> + Send + Sync>,
    hooks: HookBuilder<T>,
}

impl<T: Send + Sync + 'static> Factory<T> {
    pub fn new<F>(factory: F) -> Self
    where
        F: Fn() -> Result<T, BoxError> + Send + Sync + 'static,
    {
        Self {
            factory: Box::new(factory),
            hooks: HookBuilder::default(),
        }
    }

    pub fn disposable(mut self) -> Self
    where
        T: Disposable,
    {
        self.hooks.sync = Some(sync_hook::<T>);
        self
    }

    pub fn async_disposable(mut self) -> Self
    where
        T: AsyncDisposable,
    {
        self.hooks.asynchronous = Some(async_hook::<T>);
        self
    }

    pub(crate) fn into_producer(self) -> Producer {
        let Factory { factory, hooks } = self;
        Producer::Factory(Arc::new(move || factory().map(|value| hooks.wrap(value))))
    }
}

/// 预先计算好的值
pub struct Value<T> {
    value: T,
    hooks: HookBuilder<T>,
}

impl<T: Send + Sync + 'static> Value<T> {
    pub fn new(value: T) -> Self {
        Self {
            value,
            hooks: HookBuilder::default(),
        }
    }

    pub fn disposable(mut self) -> Self
    where
        T: Disposable,
    {
        self.hooks.sync = Some(sync_hook::<T>);
        self
    }

    pub fn async_disposable(mut self) -> Self
    where
        T: AsyncDisposable,
    {
        self.hooks.asynchronous = Some(async_hook::<T>);
        self
    }

    /// 函数与闭包不能作为值注册
    pub(crate) fn into_producer(self, token: &AnyToken) -> Result<Producer, ContainerError> {
        let type_name = std::any::type_name::<T>();
        if is_callable_type(type_name) {
            return Err(ContainerError::invalid_operation(format!(
                "Value for {} must not be a function ({})",
                token, type_name
            ))
            .with_token(token));
        }
        Ok(Producer::Value(self.hooks.wrap(self.value)))
    }
}

impl<T: Send + Sync + 'static> From<T> for Value<T> {
    fn from(value: T) -> Self {
        Value::new(value)
    }
}

/// 按类型名识别函数值，覆盖 `Box<dyn Fn>`、`Arc<dyn FnMut>` 等装箱形式
fn is_callable_type(type_name: &str) -> bool {
    type_name.contains("{{closure}}")
        || type_name.contains("dyn core::ops::function::Fn")
        || type_name.starts_with("fn(")
        || type_name.starts_with("unsafe fn(")
        || type_name.starts_with("extern ")
}

/// 不可变的注册信息
#[derive(Clone)]
pub struct Registration {
    lifecycle: Lifecycle,
    dependencies: Vec<AnyToken>,
    producer: Producer,
    type_name: &'static str,
}

impl Registration {
    pub(crate) fn class<T: Send + Sync + 'static>(
        class: Class<T>,
        lifecycle: Lifecycle,
        dependencies: Vec<AnyToken>,
    ) -> Self {
        Self {
            lifecycle,
            dependencies,
            producer: class.into_producer(),
            type_name: std::any::type_name::<T>(),
        }
    }

    /// 工厂不接收参数，依赖列表只参与验证
    pub(crate) fn factory<T: Send + Sync + 'static>(
        factory: Factory<T>,
        lifecycle: Lifecycle,
        dependencies: Vec<AnyToken>,
    ) -> Self {
        Self {
            lifecycle,
            dependencies,
            producer: factory.into_producer(),
            type_name: std::any::type_name::<T>(),
        }
    }

    /// 值注册总是单例
    pub(crate) fn value<T: Send + Sync + 'static>(
        value: Value<T>,
        token: &AnyToken,
    ) -> Result<Self, ContainerError> {
        Ok(Self {
            lifecycle: Lifecycle::Singleton,
            dependencies: Vec::new(),
            producer: value.into_producer(token)?,
            type_name: std::any::type_name::<T>(),
        })
    }

    /// 别名注册总是单例，目标同时记为唯一依赖
    pub(crate) fn alias<T: ?Sized>(target: &Token<T>) -> Self {
        Self {
            lifecycle: Lifecycle::Singleton,
            dependencies: vec![target.erase()],
            producer: Producer::Alias(target.erase()),
            type_name: std::any::type_name::<T>(),
        }
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    pub fn dependencies(&self) -> &[AnyToken] {
        &self.dependencies
    }

    pub fn provider_kind(&self) -> ProviderKind {
        match self.producer {
            Producer::Class(_) => ProviderKind::Class,
            Producer::Factory(_) => ProviderKind::Factory,
            Producer::Value(_) => ProviderKind::Value,
            Producer::Alias(_) => ProviderKind::Alias,
        }
    }

    pub fn alias_target(&self) -> Option<&AnyToken> {
        match &self.producer {
            Producer::Alias(target) => Some(target),
            _ => None,
        }
    }

    /// 注册时的服务类型名（仅用于诊断）
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub(crate) fn producer(&self) -> &Producer {
        &self.producer
    }
}

impl fmt::Debug for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration")
            .field("lifecycle", &self.lifecycle)
            .field("provider_kind", &self.provider_kind())
            .field("dependencies", &self.dependencies)
            .field("type_name", &self.type_name)
            .finish()
    }
}
