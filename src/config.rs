//! 容器配置
//!
//! 支持从 TOML 文件或字符串加载，并可用环境变量覆盖。

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::container::{DEFAULT_MAX_REGISTRATIONS, DEFAULT_MAX_SCOPE_DEPTH};

pub const ENV_ENVIRONMENT: &str = "SERVICE_CONTAINER_ENV";
pub const ENV_PERFORMANCE_TRACKING: &str = "SERVICE_CONTAINER_PERF_TRACKING";
pub const ENV_SAMPLING_RATE: &str = "SERVICE_CONTAINER_SAMPLING_RATE";

/// 默认异步验证超时（毫秒）
pub const DEFAULT_VALIDATION_TIMEOUT_MS: u64 = 30_000;

/// 配置错误
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },
}

/// 运行环境，决定返回给调用方的错误细节
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Development,
    Testing,
    Production,
}

impl Default for Environment {
    fn default() -> Self {
        Environment::Development
    }
}

impl Environment {
    /// 仅生产环境会清洗错误
    pub fn sanitizes_errors(&self) -> bool {
        matches!(self, Environment::Production)
    }

    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Some(Environment::Development),
            "testing" | "test" => Some(Environment::Testing),
            "production" | "prod" => Some(Environment::Production),
            _ => None,
        }
    }
}

/// 容器配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainerConfig {
    pub environment: Environment,
    /// 是否向指标收集器报告
    pub performance_tracking: bool,
    /// 采样率（0.0 - 1.0）
    pub sampling_rate: f64,
    pub max_scope_depth: usize,
    pub max_registrations: usize,
    pub validation_timeout_ms: u64,
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self {
            environment: Environment::Development,
            performance_tracking: false,
            sampling_rate: 1.0,
            max_scope_depth: DEFAULT_MAX_SCOPE_DEPTH,
            max_registrations: DEFAULT_MAX_REGISTRATIONS,
            validation_timeout_ms: DEFAULT_VALIDATION_TIMEOUT_MS,
        }
    }
}

impl ContainerConfig {
    /// 开发环境配置
    pub fn development() -> Self {
        Self::default()
    }

    /// 生产环境配置
    pub fn production() -> Self {
        Self {
            environment: Environment::Production,
            performance_tracking: true,
            sampling_rate: 0.01,
            ..Self::default()
        }
    }

    /// 测试环境配置
    pub fn testing() -> Self {
        Self {
            environment: Environment::Testing,
            ..Self::default()
        }
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let mut config: ContainerConfig = toml::from_str(content)?;
        config.sampling_rate = config.sampling_rate.clamp(0.0, 1.0);
        Ok(config)
    }

    /// 从 TOML 文件加载
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::FileRead {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// 用进程环境变量覆盖配置
    pub fn with_env_overrides(self) -> Result<Self, ConfigError> {
        let vars: HashMap<String, String> = std::env::vars().collect();
        self.with_overrides_from(&vars)
    }

    /// 用给定的键值覆盖配置
    pub fn with_overrides_from(mut self, vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        if let Some(value) = vars.get(ENV_ENVIRONMENT) {
            self.environment =
                Environment::parse(value).ok_or_else(|| invalid(ENV_ENVIRONMENT, value))?;
        }

        if let Some(value) = vars.get(ENV_PERFORMANCE_TRACKING) {
            self.performance_tracking = match value.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" => false,
                _ => return Err(invalid(ENV_PERFORMANCE_TRACKING, value)),
            };
        }

        if let Some(value) = vars.get(ENV_SAMPLING_RATE) {
            let rate: f64 = value
                .trim()
                .parse()
                .map_err(|_| invalid(ENV_SAMPLING_RATE, value))?;
            if !(0.0..=1.0).contains(&rate) {
                return Err(invalid(ENV_SAMPLING_RATE, value));
            }
            self.sampling_rate = rate;
        }

        Ok(self)
    }
}

fn invalid(key: &str, value: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    }
}
