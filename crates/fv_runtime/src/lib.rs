// crates/fv_runtime/src/lib.rs

//! fvcore Runtime Layer (Layer 2)
//!
//! 运行时抽象层，提供标量类型与定义在网格实体上的场容器。
//!
//! # 模块概览
//!
//! - [`scalar`]: RuntimeScalar trait（密封，仅 f32/f64 可实现，带原子加法）
//! - [`field`]: 场容器 `Field<S, D1, D2, D3>`，拥有/借用存储、散射与归约
//! - [`error`]: 场容器错误类型
//!
//! # 层级架构
//!
//! ```text
//! Layer 4: fv_config     ─> Precision, RunConfig
//! Layer 3: fv_numerics   ─> FvMesh, Interpolator, DiffusionAssembler
//! Layer 2: fv_runtime    ─> RuntimeScalar, Field (本层)
//! Layer 1: fv_foundation ─> MemoryTracker, TrackedBuffer, TensorShape
//! ```
//!
//! # 设计原则
//!
//! 1. **密封 Trait**: RuntimeScalar 只有 f32/f64 实现
//! 2. **显式所有权**: 场的存储是带标签的变体，拥有与借用互斥
//! 3. **显式跟踪**: 内存用量记入调用方传入的跟踪器，不使用进程级全局计数

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod field;
pub mod scalar;

/// 层级标识
pub const LAYER: u8 = 2;

// 重导出核心类型
pub use error::{FieldError, FieldResult};
pub use field::{AtomicField, Field, FieldStats, KahanSum, OwnedField};
pub use scalar::RuntimeScalar;

/// Prelude 模块
pub mod prelude {
    pub use crate::error::{FieldError, FieldResult};
    pub use crate::field::{Field, OwnedField};
    pub use crate::scalar::RuntimeScalar;
}
