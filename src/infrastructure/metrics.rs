//! 调用统计 - 基础设施层
//!
//! 核心只负责累加计数，读取由外部的状态接口完成

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// 统计接收端
pub trait MetricsSink: Send + Sync {
    /// 发出一次 LLM 请求
    fn record_oracle_call(&self);
    /// LLM 请求失败（含格式错误）
    fn record_oracle_failure(&self);
    /// 合成了一次降级判定
    fn record_fallback(&self);
    /// 缓存条目数变化
    fn set_cache_size(&self, size: usize);
    fn snapshot(&self) -> MetricsSnapshot;
}

/// 某一时刻的统计快照
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    pub oracle_calls: u64,
    pub oracle_failures: u64,
    pub fallbacks: u64,
    pub cache_size: u64,
}

/// 基于原子计数的默认实现
#[derive(Debug, Default)]
pub struct AtomicMetrics {
    oracle_calls: AtomicU64,
    oracle_failures: AtomicU64,
    fallbacks: AtomicU64,
    cache_size: AtomicU64,
}

impl AtomicMetrics {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MetricsSink for AtomicMetrics {
    fn record_oracle_call(&self) {
        self.oracle_calls.fetch_add(1, Ordering::Relaxed);
    }

    fn record_oracle_failure(&self) {
        self.oracle_failures.fetch_add(1, Ordering::Relaxed);
    }

    fn record_fallback(&self) {
        self.fallbacks.fetch_add(1, Ordering::Relaxed);
    }

    fn set_cache_size(&self, size: usize) {
        self.cache_size.store(size as u64, Ordering::Relaxed);
    }

    fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            oracle_calls: self.oracle_calls.load(Ordering::Relaxed),
            oracle_failures: self.oracle_failures.load(Ordering::Relaxed),
            fallbacks: self.fallbacks.load(Ordering::Relaxed),
            cache_size: self.cache_size.load(Ordering::Relaxed),
        }
    }
}
