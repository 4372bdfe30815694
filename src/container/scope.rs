//! 作用域管理
//!
//! 维护父子作用域关系、生成层级作用域名称，并按「先子后父、先递归后本地
//! 实例」的顺序执行销毁。

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

use super::cache::InstanceCache;
use super::token::AnyToken;
use crate::errors::{ContainerError, ErrorKind};
use crate::logging::OperationTimer;
use crate::metrics::SinkSlot;

/// 默认最大作用域深度
pub const DEFAULT_MAX_SCOPE_DEPTH: usize = 10;

type DisposeFuture<'a> = Pin<Box<dyn Future<Output = Result<(), ContainerError>> + Send + 'a>>;

pub(crate) struct ScopeManager {
    name: String,
    id: Uuid,
    depth: usize,
    max_depth: usize,
    parent: Option<Weak<ScopeManager>>,
    cache: Arc<InstanceCache>,
    children: Mutex<Vec<Arc<ScopeManager>>>,
    disposed: AtomicBool,
}

impl std::fmt::Debug for ScopeManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScopeManager")
            .field("name", &self.name)
            .field("id", &self.id)
            .field("depth", &self.depth)
            .finish_non_exhaustive()
    }
}

impl ScopeManager {
    pub(crate) fn root(name: impl Into<String>, cache: Arc<InstanceCache>, max_depth: usize) -> Self {
        Self {
            name: name.into(),
            id: Uuid::new_v4(),
            depth: 0,
            max_depth,
            parent: None,
            cache,
            children: Mutex::new(Vec::new()),
            disposed: AtomicBool::new(false),
        }
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn id(&self) -> Uuid {
        self.id
    }

    pub(crate) fn depth(&self) -> usize {
        self.depth
    }

    pub(crate) fn cache(&self) -> &Arc<InstanceCache> {
        &self.cache
    }

    pub(crate) fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    pub(crate) fn child_count(&self) -> usize {
        self.children.lock().len()
    }

    /// 创建子作用域：`parent.name`，未命名时为 `parent.scope-<uuid>`
    pub(crate) fn create_child(
        self: &Arc<Self>,
        name: Option<&str>,
        metrics: SinkSlot,
    ) -> Result<Arc<ScopeManager>, ContainerError> {
        if self.is_disposed() {
            return Err(ContainerError::disposed(format!(
                "Cannot create child scope from disposed scope: {}",
                self.name
            )));
        }

        if self.depth >= self.max_depth {
            return Err(ContainerError::invalid_operation(format!(
                "Maximum scope depth of {} exceeded. Current depth: {}",
                self.max_depth, self.depth
            )));
        }

        let segment = match name {
            Some(name) => name.to_string(),
            None => format!("scope-{}", Uuid::new_v4()),
        };
        let child = Arc::new(ScopeManager {
            name: format!("{}.{}", self.name, segment),
            id: Uuid::new_v4(),
            depth: self.depth + 1,
            max_depth: self.max_depth,
            parent: Some(Arc::downgrade(self)),
            cache: Arc::new(InstanceCache::new(self.cache.is_tracking(), metrics)),
            children: Mutex::new(Vec::new()),
            disposed: AtomicBool::new(false),
        });

        self.children.lock().push(child.clone());
        debug!(scope = %child.name, depth = child.depth, "Child scope created");
        Ok(child)
    }

    fn begin_dispose(&self) -> Result<Vec<Arc<ScopeManager>>, ContainerError> {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return Err(ContainerError::disposed(format!(
                "Scope already disposed: {}",
                self.name
            )));
        }
        Ok(self.children.lock().clone())
    }

    fn finish_dispose(&self, failures: Vec<ContainerError>) -> Result<(), ContainerError> {
        self.cache.clear();

        if let Some(parent) = self.parent.as_ref().and_then(Weak::upgrade) {
            parent.children.lock().retain(|child| child.id != self.id);
        }

        if failures.is_empty() {
            debug!(scope = %self.name, "Scope disposed");
            return Ok(());
        }

        Err(ContainerError::new(
            ErrorKind::DisposalFailed,
            format!(
                "Scope {} disposed with {} failure(s)",
                self.name,
                failures.len()
            ),
        )
        .with_related(failures))
    }

    /// 同步销毁：先递归销毁子作用域，再调用本作用域实例的同步销毁钩子
    pub(crate) fn dispose(&self) -> Result<(), ContainerError> {
        let children = self.begin_dispose()?;
        let timer = OperationTimer::new("scope_dispose").with_metadata("scope", &self.name);
        let mut failures = Vec::new();

        for child in children {
            if let Err(error) = child.dispose() {
                warn!(scope = %child.name, error = %error, "Failed to dispose child scope");
                failures.push(error);
            }
        }

        for (token, instance) in self.cache.entries() {
            if instance.hooks.is_empty() {
                continue;
            }
            if let Some(hook) = instance.hooks.sync.as_ref() {
                if let Err(cause) = hook.dispose() {
                    let error = disposal_failed(&token, cause);
                    warn!(scope = %self.name, error = %error, "Failed to dispose service");
                    failures.push(error);
                }
            } else if instance.hooks.asynchronous.is_some() {
                debug!(scope = %self.name, token = %token, "Service only supports async disposal, skipped");
            }
        }

        timer.finish();
        self.finish_dispose(failures)
    }

    /// 异步销毁：顺序与同步销毁相同，优先使用异步钩子，否则回退到同步钩子
    pub(crate) fn dispose_async(&self) -> DisposeFuture<'_> {
        Box::pin(async move {
            let children = self.begin_dispose()?;
            let timer =
                OperationTimer::new("scope_dispose_async").with_metadata("scope", &self.name);
            let mut failures = Vec::new();

            for child in children {
                if let Err(error) = child.dispose_async().await {
                    warn!(scope = %child.name, error = %error, "Failed to dispose child scope");
                    failures.push(error);
                }
            }

            for (token, instance) in self.cache.entries() {
                if instance.hooks.is_empty() {
                    continue;
                }
                let result = if let Some(hook) = instance.hooks.asynchronous.as_ref() {
                    hook.dispose_async().await
                } else if let Some(hook) = instance.hooks.sync.as_ref() {
                    hook.dispose()
                } else {
                    Ok(())
                };

                if let Err(cause) = result {
                    let error = disposal_failed(&token, cause);
                    warn!(scope = %self.name, error = %error, "Failed to dispose service");
                    failures.push(error);
                }
            }

            timer.finish();
            self.finish_dispose(failures)
        })
    }
}

fn disposal_failed(token: &AnyToken, cause: crate::errors::BoxError) -> ContainerError {
    ContainerError::new(
        ErrorKind::DisposalFailed,
        format!("Error disposing service {}: {}", token, cause),
    )
    .with_token(token)
    .with_boxed_cause(cause)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::empty_slot;

    fn root() -> Arc<ScopeManager> {
        Arc::new(ScopeManager::root(
            "root",
            Arc::new(InstanceCache::new(false, empty_slot())),
            DEFAULT_MAX_SCOPE_DEPTH,
        ))
    }

    #[test]
    fn test_hierarchical_names() {
        let root = root();
        let named = root.create_child(Some("request"), empty_slot()).unwrap();
        let unnamed = named.create_child(None, empty_slot()).unwrap();

        assert_eq!(named.name(), "root.request");
        assert!(unnamed.name().starts_with("root.request.scope-"));
        assert_eq!(unnamed.depth(), 2);
        assert_ne!(named.id(), unnamed.id());
        assert_eq!(root.child_count(), 1);
    }

    #[test]
    fn test_max_depth() {
        let root = Arc::new(ScopeManager::root(
            "root",
            Arc::new(InstanceCache::new(false, empty_slot())),
            2,
        ));
        let first = root.create_child(None, empty_slot()).unwrap();
        let second = first.create_child(None, empty_slot()).unwrap();

        let error = second.create_child(None, empty_slot()).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::InvalidOperation);
        assert!(error.message().contains("Maximum scope depth of 2"));
    }

    #[test]
    fn test_dispose_cascades_and_detaches() {
        let root = root();
        let child = root.create_child(Some("a"), empty_slot()).unwrap();
        let grandchild = child.create_child(Some("b"), empty_slot()).unwrap();

        child.dispose().unwrap();

        assert!(child.is_disposed());
        assert!(grandchild.is_disposed());
        assert!(!root.is_disposed());
        assert_eq!(root.child_count(), 0);
    }

    #[test]
    fn test_dispose_twice_fails() {
        let root = root();
        root.dispose().unwrap();

        assert_eq!(root.dispose().unwrap_err().kind(), ErrorKind::Disposed);
        assert_eq!(
            root.create_child(None, empty_slot()).unwrap_err().kind(),
            ErrorKind::Disposed
        );
    }

    #[tokio::test]
    async fn test_dispose_async_cascades() {
        let root = root();
        let first = root.create_child(Some("first"), empty_slot()).unwrap();
        let second = root.create_child(Some("second"), empty_slot()).unwrap();

        root.dispose_async().await.unwrap();

        assert!(first.is_disposed());
        assert!(second.is_disposed());
        assert_eq!(root.child_count(), 0);
    }
}
