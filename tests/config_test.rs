//! 配置加载与环境相关行为的集成测试

use std::collections::HashMap;
use std::io::Write;
use std::sync::Arc;

use service_container::config::ENV_ENVIRONMENT;
use service_container::errors::SANITIZED_MESSAGE;
use service_container::logging::{init_logging, LoggingConfig};
use service_container::{
    deps, Class, ConfigError, ContainerConfig, Environment, ErrorKind, FallbackRegistry,
    Lifecycle, ServiceContainer, Token,
};
use tempfile::NamedTempFile;

fn container_with(config: ContainerConfig) -> ServiceContainer {
    ServiceContainer::builder()
        .config(config)
        .fallbacks(Arc::new(FallbackRegistry::new()))
        .build()
}

#[test]
fn test_load_config_from_file() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
environment = "production"
performance_tracking = true
sampling_rate = 0.25
max_scope_depth = 4
"#
    )
    .unwrap();

    let config = ContainerConfig::load(file.path()).unwrap();

    assert_eq!(config.environment, Environment::Production);
    assert!(config.performance_tracking);
    assert!((config.sampling_rate - 0.25).abs() < f64::EPSILON);
    assert_eq!(config.max_scope_depth, 4);
    assert_eq!(config.max_registrations, 10_000);
}

#[test]
fn test_load_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let error = ContainerConfig::load(dir.path().join("missing.toml")).unwrap_err();

    assert!(matches!(error, ConfigError::FileRead { .. }));
    assert!(error.to_string().contains("missing.toml"));
}

#[test]
fn test_load_invalid_toml() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "environment = [not toml").unwrap();

    let error = ContainerConfig::load(file.path()).unwrap_err();
    assert!(matches!(error, ConfigError::TomlParse(_)));
}

#[test]
fn test_overrides_applied_on_top_of_file() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "environment = \"development\"").unwrap();

    let overrides: HashMap<String, String> = [(ENV_ENVIRONMENT.to_string(), "prod".to_string())]
        .into_iter()
        .collect();
    let config = ContainerConfig::load(file.path())
        .unwrap()
        .with_overrides_from(&overrides)
        .unwrap();

    assert_eq!(config.environment, Environment::Production);
}

#[test]
fn test_production_hides_error_details() {
    let container = container_with(ContainerConfig::production());
    let secret = Token::<String>::new("PaymentGatewaySecret");
    let consumer = Token::<String>::new("Checkout");
    container
        .register_class(
            &consumer,
            Class::new(|deps| Ok(deps.next::<String>()?.to_string())),
            Lifecycle::Singleton,
            deps![&secret],
        )
        .unwrap();

    let errors = container.validate().unwrap_err();

    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].kind(), ErrorKind::TokenNotRegistered);
    assert_eq!(errors[0].message(), SANITIZED_MESSAGE);
    assert!(errors[0].token().is_none());
    assert!(!errors[0].to_string().contains("PaymentGatewaySecret"));
}

#[test]
fn test_development_keeps_error_details() {
    let container = container_with(ContainerConfig::development());
    let missing = Token::<String>::new("PaymentGatewaySecret");
    container.validate().unwrap();

    let error = container.resolve_with_error(&missing).unwrap_err();

    assert_eq!(error.kind(), ErrorKind::TokenNotRegistered);
    assert_eq!(error.token(), Some("PaymentGatewaySecret"));
    assert!(error.message().contains("PaymentGatewaySecret"));
}

#[test]
fn test_testing_environment_does_not_sanitize() {
    let container = container_with(ContainerConfig::testing());
    container.validate().unwrap();
    let duplicate = Token::<u8>::new("Flag");

    let error = container.register_value(&duplicate, 1u8).unwrap_err();

    assert_eq!(error.kind(), ErrorKind::InvalidOperation);
    assert_ne!(error.message(), SANITIZED_MESSAGE);
}

#[test]
fn test_init_logging_twice_fails_gracefully() {
    let first = init_logging(LoggingConfig::from(Environment::Testing));
    let second = init_logging(LoggingConfig::from(Environment::Testing));

    // 全局订阅者只能安装一次
    assert!(first.is_ok());
    assert!(second.is_err());
}
