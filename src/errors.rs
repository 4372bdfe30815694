//! 容器错误类型
//!
//! 容器边界上的所有失败都以 [`ContainerError`] 值返回，从不以 panic 的形式
//! 穿过公共 API（唯一例外是文档中标明的 `ServiceContainer::resolve`）。

use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

/// 生产者与销毁钩子使用的错误类型
pub type BoxError = Box<dyn StdError + Send + Sync>;

/// 生产环境下替换错误消息的通用文本
pub const SANITIZED_MESSAGE: &str =
    "An internal error occurred. Please contact support if this persists.";

/// 错误分类（封闭集合）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// 令牌已注册
    DuplicateRegistration,
    /// 操作在当前状态下非法，或参数结构无效
    InvalidOperation,
    /// 令牌未注册
    TokenNotRegistered,
    /// 别名目标未注册
    AliasTargetNotFound,
    /// 依赖图中存在环
    CircularDependency,
    /// 作用域服务只能在子作用域中解析
    ScopeRequired,
    /// 容器尚未验证
    NotValidated,
    /// 容器已销毁
    Disposed,
    /// 依赖解析失败
    DependencyResolveFailed,
    /// 构造函数或工厂失败
    FactoryFailed,
    /// 生命周期无效
    InvalidLifecycle,
    /// 销毁钩子失败
    DisposalFailed,
}

impl ErrorKind {
    /// 稳定的错误代码字符串
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::DuplicateRegistration => "DuplicateRegistration",
            ErrorKind::InvalidOperation => "InvalidOperation",
            ErrorKind::TokenNotRegistered => "TokenNotRegistered",
            ErrorKind::AliasTargetNotFound => "AliasTargetNotFound",
            ErrorKind::CircularDependency => "CircularDependency",
            ErrorKind::ScopeRequired => "ScopeRequired",
            ErrorKind::NotValidated => "NotValidated",
            ErrorKind::Disposed => "Disposed",
            ErrorKind::DependencyResolveFailed => "DependencyResolveFailed",
            ErrorKind::FactoryFailed => "FactoryFailed",
            ErrorKind::InvalidLifecycle => "InvalidLifecycle",
            ErrorKind::DisposalFailed => "DisposalFailed",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 依赖注入容器错误
///
/// 携带错误分类、可读消息、可选的令牌描述以及可选的底层原因。
/// 批量失败（例如部分销毁）通过 `related` 一并报告。
#[derive(Debug, Clone)]
pub struct ContainerError {
    kind: ErrorKind,
    message: String,
    token: Option<String>,
    cause: Option<Arc<dyn StdError + Send + Sync>>,
    related: Vec<ContainerError>,
}

impl ContainerError {
    /// 创建新的错误
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            token: None,
            cause: None,
            related: Vec::new(),
        }
    }

    /// 附加令牌描述
    pub fn with_token(mut self, token: impl fmt::Display) -> Self {
        self.token = Some(token.to_string());
        self
    }

    /// 附加底层原因
    pub fn with_cause<E>(mut self, cause: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        self.cause = Some(Arc::new(cause));
        self
    }

    /// 附加装箱的底层原因（生产者与销毁钩子返回的错误）
    pub fn with_boxed_cause(mut self, cause: BoxError) -> Self {
        self.cause = Some(Arc::from(cause));
        self
    }

    /// 附加一批相关错误
    pub fn with_related(mut self, related: Vec<ContainerError>) -> Self {
        self.related = related;
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// 令牌描述（生产环境下被清除）
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn cause(&self) -> Option<&(dyn StdError + Send + Sync + 'static)> {
        self.cause.as_deref()
    }

    pub fn related(&self) -> &[ContainerError] {
        &self.related
    }

    /// 沿 `source()` 链找到最底层的容器错误
    pub fn root_container_error(&self) -> &ContainerError {
        let mut current = self;
        while let Some(next) = current
            .cause
            .as_deref()
            .and_then(|cause| cause.downcast_ref::<ContainerError>())
        {
            current = next;
        }
        current
    }

    /// 生产环境版本：保留错误分类，去掉消息细节、令牌、原因和相关错误
    pub fn sanitized(&self) -> Self {
        Self::new(self.kind, SANITIZED_MESSAGE)
    }

    pub(crate) fn disposed(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Disposed, message)
    }

    pub(crate) fn invalid_operation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidOperation, message)
    }

    pub(crate) fn not_registered(token: impl fmt::Display) -> Self {
        Self::new(
            ErrorKind::TokenNotRegistered,
            format!("Service {} not registered", token),
        )
        .with_token(token)
    }
}

impl fmt::Display for ContainerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind, self.message)?;
        if !self.related.is_empty() {
            write!(f, " (")?;
            for (index, error) in self.related.iter().enumerate() {
                if index > 0 {
                    write!(f, "; ")?;
                }
                write!(f, "{}", error)?;
            }
            write!(f, ")")?;
        }
        Ok(())
    }
}

impl StdError for ContainerError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.cause
            .as_deref()
            .map(|cause| cause as &(dyn StdError + 'static))
    }
}

/// 将一批错误压平为可读的多行文本（用于日志）
pub fn describe_all(errors: &[ContainerError]) -> String {
    errors
        .iter()
        .map(|error| error.to_string())
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_contains_kind_and_message() {
        let error = ContainerError::not_registered("Logger");
        assert_eq!(error.kind(), ErrorKind::TokenNotRegistered);
        assert_eq!(error.token(), Some("Logger"));
        assert_eq!(
            error.to_string(),
            "[TokenNotRegistered] Service Logger not registered"
        );
    }

    #[test]
    fn test_source_chain() {
        let inner = ContainerError::not_registered("Database");
        let outer = ContainerError::new(
            ErrorKind::DependencyResolveFailed,
            "Cannot resolve dependency Database for Repository",
        )
        .with_token("Database")
        .with_cause(inner);

        let source = outer.source().expect("source should be present");
        assert!(source.to_string().contains("Database"));
        assert_eq!(
            outer.root_container_error().kind(),
            ErrorKind::TokenNotRegistered
        );
    }

    #[test]
    fn test_sanitized_keeps_kind_only() {
        let error = ContainerError::new(ErrorKind::FactoryFailed, "Factory failed for Secret")
            .with_token("Secret")
            .with_boxed_cause("connection refused at 10.0.0.1".into());

        let sanitized = error.sanitized();

        assert_eq!(sanitized.kind(), ErrorKind::FactoryFailed);
        assert_eq!(sanitized.message(), SANITIZED_MESSAGE);
        assert!(sanitized.token().is_none());
        assert!(sanitized.cause().is_none());
    }

    #[test]
    fn test_related_errors_rendered() {
        let error = ContainerError::new(ErrorKind::DisposalFailed, "2 disposal failure(s)")
            .with_related(vec![
                ContainerError::new(ErrorKind::DisposalFailed, "first"),
                ContainerError::new(ErrorKind::DisposalFailed, "second"),
            ]);

        let rendered = error.to_string();
        assert!(rendered.contains("first"));
        assert!(rendered.contains("second"));
        assert_eq!(error.related().len(), 2);
    }

    #[test]
    fn test_error_kind_codes() {
        assert_eq!(ErrorKind::ScopeRequired.as_str(), "ScopeRequired");
        assert_eq!(ErrorKind::DisposalFailed.to_string(), "DisposalFailed");
    }
}
