//! 依赖图验证
//!
//! 一次验证执行三项检查并汇总全部失败：依赖存在性、别名目标存在性和无环性。

use std::collections::HashSet;

use super::registry::ServiceRegistry;
use super::token::{AnyToken, TokenId};
use crate::errors::{ContainerError, ErrorKind};

#[derive(Debug, Default)]
pub struct ContainerValidator {
    /// 已证明无环的子图，每次验证开始时重置
    validated_subgraphs: HashSet<TokenId>,
}

impl ContainerValidator {
    pub fn new() -> Self {
        Self::default()
    }

    /// 验证注册表，返回发现的全部错误
    pub fn validate(&mut self, registry: &ServiceRegistry) -> Result<(), Vec<ContainerError>> {
        self.validated_subgraphs.clear();

        let mut errors = self.validate_dependencies(registry);
        errors.extend(self.validate_alias_targets(registry));
        errors.extend(self.detect_circular_dependencies(registry));

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    fn validate_dependencies(&self, registry: &ServiceRegistry) -> Vec<ContainerError> {
        let mut errors = Vec::new();
        for (token, registration) in registry.iter() {
            for dependency in registration.dependencies() {
                if !registry.has(dependency) {
                    errors.push(
                        ContainerError::new(
                            ErrorKind::TokenNotRegistered,
                            format!(
                                "{} depends on {} which is not registered",
                                token, dependency
                            ),
                        )
                        .with_token(dependency),
                    );
                }
            }
        }
        errors
    }

    fn validate_alias_targets(&self, registry: &ServiceRegistry) -> Vec<ContainerError> {
        registry
            .iter()
            .filter_map(|(token, registration)| {
                let target = registration.alias_target()?;
                if registry.has(target) {
                    return None;
                }
                Some(
                    ContainerError::new(
                        ErrorKind::AliasTargetNotFound,
                        format!(
                            "Alias {} points to {} which is not registered",
                            token, target
                        ),
                    )
                    .with_token(target),
                )
            })
            .collect()
    }

    fn detect_circular_dependencies(&mut self, registry: &ServiceRegistry) -> Vec<ContainerError> {
        let mut errors = Vec::new();

        for token in registry.tokens() {
            let mut visiting = HashSet::new();
            let mut path = Vec::new();
            if let Some(error) =
                self.check_cycle(registry, token, &mut visiting, &mut path)
            {
                errors.push(error);
            }
        }

        errors
    }

    fn check_cycle(
        &mut self,
        registry: &ServiceRegistry,
        token: &AnyToken,
        visiting: &mut HashSet<TokenId>,
        path: &mut Vec<AnyToken>,
    ) -> Option<ContainerError> {
        if visiting.contains(&token.id()) {
            path.push(token.clone());
            let error = ContainerError::new(
                ErrorKind::CircularDependency,
                format!("Circular dependency: {}", render_path(path)),
            )
            .with_token(token);
            path.pop();
            return Some(error);
        }

        if self.validated_subgraphs.contains(&token.id()) {
            return None;
        }

        visiting.insert(token.id());
        path.push(token.clone());

        if let Some(registration) = registry.get(token) {
            for dependency in registration.dependencies() {
                if let Some(error) = self.check_cycle(registry, dependency, visiting, path)
                {
                    return Some(error);
                }
            }
        }

        visiting.remove(&token.id());
        path.pop();
        self.validated_subgraphs.insert(token.id());
        None
    }
}

/// 渲染依赖路径：`A → B → A`
pub(crate) fn render_path(path: &[AnyToken]) -> String {
    path.iter()
        .map(|token| token.description())
        .collect::<Vec<_>>()
        .join(" → ")
}
