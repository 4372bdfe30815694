//! 注入令牌
//!
//! `Token<T>` 是注册与解析的键：一个不透明的唯一标识，带有仅在编译期
//! 存在的服务类型标记。相等性基于标识而非描述文本。

use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

static NEXT_TOKEN_ID: AtomicU64 = AtomicU64::new(1);

/// 令牌的进程内唯一标识
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TokenId(u64);

impl TokenId {
    fn next() -> Self {
        TokenId(NEXT_TOKEN_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

/// 类型化的注入令牌
///
/// ```
/// use service_container::Token;
///
/// struct Logger;
///
/// let a = Token::<Logger>::new("Logger");
/// let b = Token::<Logger>::new("Logger");
/// assert_ne!(a, b); // 相同描述，不同身份
/// assert_eq!(a, a.clone());
/// ```
pub struct Token<T: ?Sized> {
    key: AnyToken,
    _marker: PhantomData<fn() -> T>,
}

impl<T: ?Sized> Token<T> {
    /// 铸造一个新令牌
    pub fn new(description: impl Into<Arc<str>>) -> Self {
        Self {
            key: AnyToken {
                id: TokenId::next(),
                description: description.into(),
            },
            _marker: PhantomData,
        }
    }

    pub fn id(&self) -> TokenId {
        self.key.id
    }

    pub fn description(&self) -> &str {
        &self.key.description
    }

    /// 擦除类型标记，得到可放入依赖列表的键
    pub fn erase(&self) -> AnyToken {
        self.key.clone()
    }

    pub(crate) fn key(&self) -> &AnyToken {
        &self.key
    }
}

impl<T: ?Sized> Clone for Token<T> {
    fn clone(&self) -> Self {
        Self {
            key: self.key.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T: ?Sized> PartialEq for Token<T> {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl<T: ?Sized> Eq for Token<T> {}

impl<T: ?Sized> Hash for Token<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}

impl<T: ?Sized> fmt::Debug for Token<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Token")
            .field("id", &self.key.id.0)
            .field("description", &self.key.description)
            .field("type", &std::any::type_name::<T>())
            .finish()
    }
}

impl<T: ?Sized> fmt::Display for Token<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key.description)
    }
}

impl<T: ?Sized> From<&Token<T>> for AnyToken {
    fn from(token: &Token<T>) -> Self {
        token.erase()
    }
}

/// 类型擦除的令牌
#[derive(Clone)]
pub struct AnyToken {
    id: TokenId,
    description: Arc<str>,
}

impl AnyToken {
    pub fn id(&self) -> TokenId {
        self.id
    }

    pub fn description(&self) -> &str {
        &self.description
    }
}

impl PartialEq for AnyToken {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for AnyToken {}

impl Hash for AnyToken {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for AnyToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.description, self.id.0)
    }
}

impl fmt::Display for AnyToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.description)
    }
}

/// 构造依赖列表
///
/// ```
/// use service_container::{deps, Token};
///
/// let config = Token::<String>::new("Config");
/// let clock = Token::<u64>::new("Clock");
/// let list = deps![&config, &clock];
/// assert_eq!(list.len(), 2);
/// ```
#[macro_export]
macro_rules! deps {
    () => {
        ::std::vec::Vec::<$crate::AnyToken>::new()
    };
    ($($token:expr),+ $(,)?) => {
        ::std::vec![$($crate::AnyToken::from($token)),+]
    };
}

/// 令牌弃用信息
#[derive(Debug)]
pub struct DeprecationInfo {
    pub reason: String,
    pub replacement: Option<String>,
    warned: AtomicBool,
}

impl DeprecationInfo {
    /// 首次调用返回 true，之后返回 false
    fn first_warning(&self) -> bool {
        !self.warned.swap(true, Ordering::Relaxed)
    }

    pub fn has_warned(&self) -> bool {
        self.warned.load(Ordering::Relaxed)
    }
}

/// 令牌元数据侧表：在不修改令牌的前提下记录弃用信息
#[derive(Debug, Default)]
pub struct Deprecations {
    entries: RwLock<HashMap<TokenId, Arc<DeprecationInfo>>>,
}

impl Deprecations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark(&self, token: &AnyToken, reason: impl Into<String>, replacement: Option<String>) {
        let info = DeprecationInfo {
            reason: reason.into(),
            replacement,
            warned: AtomicBool::new(false),
        };
        self.entries.write().insert(token.id(), Arc::new(info));
    }

    pub fn get(&self, token: &AnyToken) -> Option<Arc<DeprecationInfo>> {
        self.entries.read().get(&token.id()).cloned()
    }

    /// 令牌已弃用且尚未提示过时返回弃用信息
    pub(crate) fn take_warning(&self, token: &AnyToken) -> Option<Arc<DeprecationInfo>> {
        self.get(token).filter(|info| info.first_warning())
    }
}
