// crates/fv_foundation/src/metrics.rs
//! 基础计数器与内存用量跟踪
//!
//! - [`Counter`]: 无锁原子计数器
//! - [`MemoryTracker`]: 显式传递的内存用量跟踪器（当前值/峰值），
//!   由持有内存的场容器在分配与释放时更新。
//!
//! 跟踪器是可克隆的句柄，克隆体共享同一组计数，不存在进程级全局状态。

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// 原子计数器（无锁）
#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
    /// 创建零值计数器
    pub const fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    /// 增加计数
    #[inline]
    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    /// 增加指定值
    #[inline]
    pub fn add(&self, n: u64) {
        self.0.fetch_add(n, Ordering::Relaxed);
    }

    /// 获取当前值
    #[inline]
    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }

    /// 重置为零
    #[inline]
    pub fn reset(&self) {
        self.0.store(0, Ordering::Relaxed);
    }
}

#[derive(Debug, Default)]
struct TrackerInner {
    current: AtomicU64,
    peak: AtomicU64,
    allocations: Counter,
    releases: Counter,
}

/// 内存用量跟踪器
///
/// 记录拥有型缓冲区的字节数。`record_alloc` 与 `record_release`
/// 必须成对出现，由 [`TrackedBuffer`](crate::memory::TrackedBuffer) 保证。
#[derive(Debug, Clone, Default)]
pub struct MemoryTracker {
    inner: Arc<TrackerInner>,
}

/// 内存用量快照
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemorySnapshot {
    /// 当前占用字节数
    pub current_bytes: u64,
    /// 历史峰值字节数
    pub peak_bytes: u64,
    /// 分配次数
    pub allocations: u64,
    /// 释放次数
    pub releases: u64,
}

impl MemoryTracker {
    /// 创建新的跟踪器
    pub fn new() -> Self {
        Self::default()
    }

    /// 记录一次分配
    pub fn record_alloc(&self, bytes: usize) {
        let bytes = bytes as u64;
        let now = self.inner.current.fetch_add(bytes, Ordering::AcqRel) + bytes;
        self.inner.peak.fetch_max(now, Ordering::AcqRel);
        self.inner.allocations.inc();
    }

    /// 记录一次释放
    pub fn record_release(&self, bytes: usize) {
        let prev = self.inner.current.fetch_sub(bytes as u64, Ordering::AcqRel);
        debug_assert!(prev >= bytes as u64, "释放字节数超过当前占用");
        self.inner.releases.inc();
    }

    /// 当前占用字节数
    #[inline]
    pub fn current(&self) -> u64 {
        self.inner.current.load(Ordering::Acquire)
    }

    /// 峰值字节数
    #[inline]
    pub fn peak(&self) -> u64 {
        self.inner.peak.load(Ordering::Acquire)
    }

    /// 获取快照
    pub fn snapshot(&self) -> MemorySnapshot {
        MemorySnapshot {
            current_bytes: self.current(),
            peak_bytes: self.peak(),
            allocations: self.inner.allocations.get(),
            releases: self.inner.releases.get(),
        }
    }

    /// 两个句柄是否指向同一个跟踪器
    pub fn same_as(&self, other: &MemoryTracker) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

// ============================================================================
// 测试
// ============================================================================
