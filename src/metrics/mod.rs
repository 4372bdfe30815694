//! 容器性能指标
//!
//! [`MetricsSink`] 是容器对外部指标收集器的唯一依赖：每次缓存访问与每次
//! 解析（开启性能追踪且命中采样时）都会回调它。[`ContainerMetrics`] 是一个
//! 基于原子计数器的内存实现。

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use rand::Rng;
use serde::Serialize;

use crate::container::AnyToken;
use crate::errors::ContainerError;

/// 指标收集器
pub trait MetricsSink: Send + Sync {
    /// 实例缓存查询
    fn record_cache_access(&self, hit: bool);

    /// 一次服务解析的耗时与结果
    fn record_resolution(&self, token: &AnyToken, duration: Duration, success: bool);
}

/// 内存中的容器统计（原子计数器）
#[derive(Debug, Default)]
pub struct ContainerMetrics {
    total_resolutions: AtomicU64,
    failed_resolutions: AtomicU64,
    total_resolution_nanos: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
}

impl ContainerMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// 获取统计快照
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            total_resolutions: self.total_resolutions.load(Ordering::Relaxed),
            failed_resolutions: self.failed_resolutions.load(Ordering::Relaxed),
            total_resolution_time: Duration::from_nanos(
                self.total_resolution_nanos.load(Ordering::Relaxed),
            ),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
        }
    }

    pub fn reset(&self) {
        self.total_resolutions.store(0, Ordering::Relaxed);
        self.failed_resolutions.store(0, Ordering::Relaxed);
        self.total_resolution_nanos.store(0, Ordering::Relaxed);
        self.cache_hits.store(0, Ordering::Relaxed);
        self.cache_misses.store(0, Ordering::Relaxed);
    }
}

impl MetricsSink for ContainerMetrics {
    fn record_cache_access(&self, hit: bool) {
        if hit {
            self.cache_hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.cache_misses.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn record_resolution(&self, _token: &AnyToken, duration: Duration, success: bool) {
        self.total_resolutions.fetch_add(1, Ordering::Relaxed);
        if !success {
            self.failed_resolutions.fetch_add(1, Ordering::Relaxed);
        }
        let nanos = u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX);
        self.total_resolution_nanos.fetch_add(nanos, Ordering::Relaxed);
    }
}

/// 容器统计快照
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub total_resolutions: u64,
    pub failed_resolutions: u64,
    pub total_resolution_time: Duration,
    pub cache_hits: u64,
    pub cache_misses: u64,
}

impl MetricsSnapshot {
    /// 缓存命中率（小数形式）
    pub fn hit_rate(&self) -> f64 {
        let total = self.cache_hits + self.cache_misses;
        if total == 0 {
            0.0
        } else {
            self.cache_hits as f64 / total as f64
        }
    }

    /// 平均解析耗时
    pub fn average_resolution_time(&self) -> Duration {
        if self.total_resolutions == 0 {
            Duration::ZERO
        } else {
            let nanos = self.total_resolution_time.as_nanos() / u128::from(self.total_resolutions);
            Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
        }
    }

    /// 性能指标摘要
    pub fn performance_summary(&self) -> String {
        format!(
            "Container Performance: {} resolutions ({} failed), {:.1}% cache hit rate, {:?} average resolution time",
            self.total_resolutions,
            self.failed_resolutions,
            self.hit_rate() * 100.0,
            self.average_resolution_time()
        )
    }

    /// 导出为 JSON，便于写入外部指标系统
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// 共享的指标收集器槽位，容器设置后对解析器与缓存同时生效
pub(crate) type SinkSlot = Arc<RwLock<Option<Arc<dyn MetricsSink>>>>;

pub(crate) fn empty_slot() -> SinkSlot {
    Arc::new(RwLock::new(None))
}

/// 按采样率记录解析耗时
pub struct PerformanceTracker {
    enabled: bool,
    sampling_rate: f64,
    sink: SinkSlot,
}

impl PerformanceTracker {
    pub(crate) fn new(enabled: bool, sampling_rate: f64, sink: SinkSlot) -> Self {
        Self {
            enabled,
            sampling_rate: sampling_rate.clamp(0.0, 1.0),
            sink,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn sampling_rate(&self) -> f64 {
        self.sampling_rate
    }

    fn should_sample(&self) -> bool {
        if !self.enabled || self.sampling_rate <= 0.0 {
            return false;
        }
        self.sampling_rate >= 1.0 || rand::thread_rng().gen::<f64>() < self.sampling_rate
    }

    /// 执行一次解析，命中采样时把耗时和结果报告给收集器
    pub(crate) fn track<R>(
        &self,
        token: &AnyToken,
        resolve: impl FnOnce() -> Result<R, ContainerError>,
    ) -> Result<R, ContainerError> {
        if !self.should_sample() {
            return resolve();
        }
        let Some(sink) = self.sink.read().clone() else {
            return resolve();
        };

        let start = Instant::now();
        let result = resolve();
        sink.record_resolution(token, start.elapsed(), result.is_ok());
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::Token;
    use crate::errors::ErrorKind;

    fn slot_with(metrics: &Arc<ContainerMetrics>) -> SinkSlot {
        let sink: Arc<dyn MetricsSink> = metrics.clone();
        Arc::new(RwLock::new(Some(sink)))
    }

    #[test]
    fn test_metrics_counters() {
        let metrics = ContainerMetrics::new();
        let token = Token::<u32>::new("Counter");

        metrics.record_cache_access(true);
        metrics.record_cache_access(true);
        metrics.record_cache_access(false);
        metrics.record_resolution(&token.erase(), Duration::from_millis(2), true);
        metrics.record_resolution(&token.erase(), Duration::from_millis(4), false);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.cache_hits, 2);
        assert_eq!(snapshot.cache_misses, 1);
        assert_eq!(snapshot.total_resolutions, 2);
        assert_eq!(snapshot.failed_resolutions, 1);
        assert!((snapshot.hit_rate() - 2.0 / 3.0).abs() < f64::EPSILON);
        assert_eq!(snapshot.average_resolution_time(), Duration::from_millis(3));
        assert!(snapshot.performance_summary().contains("2 resolutions"));

        let json = snapshot.to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["cache_hits"], 2);
        assert_eq!(value["failed_resolutions"], 1);

        metrics.reset();
        assert_eq!(metrics.snapshot(), MetricsSnapshot::default());
    }

    #[test]
    fn test_tracker_disabled_records_nothing() {
        let metrics = Arc::new(ContainerMetrics::new());
        let tracker = PerformanceTracker::new(false, 1.0, slot_with(&metrics));
        let token = Token::<u32>::new("Counter");

        let value = tracker.track(&token.erase(), || Ok(5)).unwrap();

        assert_eq!(value, 5);
        assert_eq!(metrics.snapshot().total_resolutions, 0);
    }

    #[test]
    fn test_tracker_records_failures() {
        let metrics = Arc::new(ContainerMetrics::new());
        let tracker = PerformanceTracker::new(true, 1.0, slot_with(&metrics));
        let token = Token::<u32>::new("Counter");

        let _ = tracker.track(&token.erase(), || Ok::<_, ContainerError>(1));
        let _ = tracker.track::<u32>(&token.erase(), || {
            Err(ContainerError::new(ErrorKind::FactoryFailed, "boom"))
        });

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.total_resolutions, 2);
        assert_eq!(snapshot.failed_resolutions, 1);
    }

    #[test]
    fn test_tracker_zero_sampling() {
        let metrics = Arc::new(ContainerMetrics::new());
        let tracker = PerformanceTracker::new(true, 0.0, slot_with(&metrics));
        let token = Token::<u32>::new("Counter");

        for _ in 0..10 {
            tracker.track(&token.erase(), || Ok(())).unwrap();
        }
        assert_eq!(metrics.snapshot().total_resolutions, 0);
        assert!((PerformanceTracker::new(true, 3.0, empty_slot()).sampling_rate() - 1.0).abs() < f64::EPSILON);
    }
}
