// crates/fv_foundation/src/lib.rs

//! fvcore Foundation Layer (Layer 1)
//!
//! 基础层，提供整个工作区共用的底层抽象。
//!
//! # 模块概览
//!
//! - [`error`]: 统一错误类型
//! - [`metrics`]: 原子计数器与显式内存用量跟踪器
//! - [`memory`]: 对齐、可跟踪的拥有型缓冲区
//! - [`dimension`]: 张量形状描述
//!
//! # 层级架构
//!
//! ```text
//! Layer 5: fv_cli        ─> 命令行驱动
//! Layer 4: fv_config     ─> Precision, RunConfig
//! Layer 3: fv_numerics   ─> 网格、插值、稀疏算子组装
//! Layer 2: fv_runtime    ─> RuntimeScalar, Field
//! Layer 1: fv_foundation ─> MemoryTracker, TrackedBuffer, TensorShape (本层)
//! ```
//!
//! # 示例
//!
//! ```
//! use fv_foundation::{MemoryTracker, TrackedBuffer};
//!
//! let tracker = MemoryTracker::new();
//! {
//!     let buf: TrackedBuffer<f64> = TrackedBuffer::zeroed(16, &tracker).unwrap();
//!     assert_eq!(buf.len(), 16);
//!     assert_eq!(tracker.current(), 128);
//! }
//! assert_eq!(tracker.current(), 0);
//! assert_eq!(tracker.peak(), 128);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod dimension;
pub mod error;
pub mod memory;
pub mod metrics;

/// 层级标识
pub const LAYER: u8 = 1;

// 重导出常用类型
pub use dimension::TensorShape;
pub use error::{FvError, FvResult};
pub use memory::{TrackedBuffer, BUFFER_ALIGN};
pub use metrics::{Counter, MemorySnapshot, MemoryTracker};

/// Prelude 模块，包含常用类型
pub mod prelude {
    pub use crate::dimension::TensorShape;
    pub use crate::error::{FvError, FvResult};
    pub use crate::memory::TrackedBuffer;
    pub use crate::metrics::{MemorySnapshot, MemoryTracker};
}
