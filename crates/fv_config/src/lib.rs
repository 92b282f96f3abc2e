// crates/fv_config/src/lib.rs

//! fvcore Config Layer (Layer 4)
//!
//! 配置层：精度选择、线性求解设置与隐式扩散运行配置。
//! 本层不含标量泛型，所有数值以 f64 存储，构建时按 [`Precision`] 转换。
//!
//! # 模块概览
//!
//! - [`precision`]: Precision 枚举（F32/F64）
//! - [`run_config`]: RunConfig 运行配置（JSON 读写与校验）
//! - [`error`]: 配置错误类型
//!
//! # 层级架构
//!
//! ```text
//! Layer 5: fv_cli        ─> 读取 RunConfig 并驱动扩散子步
//! Layer 4: fv_config     ─> Precision, RunConfig (本层)
//! Layer 3: fv_numerics   ─> LinearSolverSettings, DiffusionAssembler
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod precision;
pub mod run_config;

/// 层级标识
pub const LAYER: u8 = 4;

// 重导出核心类型
pub use error::ConfigError;
pub use fv_numerics::linear_algebra::{AmgSettings, KrylovMethod, LinearSolverSettings, PreconditionerKind};
pub use precision::Precision;
pub use run_config::{DiffusionConfig, RunConfig};
