pub mod config;
pub mod container;
pub mod errors;
pub mod logging;
pub mod metrics;

// Re-export commonly used items for convenience
pub use config::{ConfigError, ContainerConfig, Environment};
pub use container::{
    AnyToken, AsyncDisposable, Class, ContainerBuilder, ContainerState, Dependencies, Disposable,
    Factory, FallbackRegistry, Lifecycle, ProviderKind, Registration, ServiceContainer, Token,
    Value,
};
pub use errors::{BoxError, ContainerError, ErrorKind};
pub use metrics::{ContainerMetrics, MetricsSink, MetricsSnapshot};
