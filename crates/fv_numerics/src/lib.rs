// crates/fv_numerics/src/lib.rs

//! fvcore Numerics Layer (Layer 3)
//!
//! 有限体积数值层：网格连通性、面插值、稀疏算子与隐式扩散组装。
//!
//! # 模块概览
//!
//! - [`mesh`]: `FvMesh` trait 与非结构网格、一维链网格生成
//! - [`interpolation`]: 中心、二阶与迎风面插值
//! - [`linear_algebra`]: 稀疏三元组、CSR、预条件器、Krylov 求解设施
//! - [`assembler`]: 进程间耦合表与隐式扩散组装器
//! - [`testing`]: 只用对角线求解的记录型求解设施
//!
//! # 层级架构
//!
//! ```text
//! Layer 4: fv_config     ─> Precision, RunConfig
//! Layer 3: fv_numerics   ─> FvMesh, Interpolator, DiffusionAssembler (本层)
//! Layer 2: fv_runtime    ─> RuntimeScalar, Field
//! Layer 1: fv_foundation ─> MemoryTracker, TrackedBuffer, TensorShape
//! ```
//!
//! # 示例
//!
//! ```
//! use fv_numerics::prelude::*;
//!
//! let mesh = chain_1d(4, 1.0f64, 1.0).unwrap();
//! let assembler = DiffusionAssembler::new(&mesh, PartitionLayout::single(4)).unwrap();
//! let d = vec![1.0; mesh.n_faces()];
//! let diffusivity: Field<f64> = Field::shared(mesh.n_faces(), &d).unwrap();
//! let u_data = [1.0, 0.0, 0.0, 0.0];
//! let u: Field<f64> = Field::shared(4, &u_data).unwrap();
//! let mut out = [0.0; 4];
//! let mut un: Field<f64> = Field::borrowed(4, &mut out).unwrap();
//!
//! let mut backend = KrylovBackend::default();
//! assembler
//!     .assemble_and_solve(&u, &diffusivity, 0.1, &mut backend, &mut un)
//!     .unwrap();
//! assert!(un.as_slice()[0] < 1.0);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod assembler;
pub mod interpolation;
pub mod linear_algebra;
pub mod mesh;
pub mod testing;

/// 层级标识
pub const LAYER: u8 = 3;

// 重导出核心类型
pub use assembler::{AssemblyError, AssemblyResult, BoundaryCouplingTable, CouplingEntry, DiffusionAssembler};
pub use interpolation::{InterpolationError, InterpolationResult, Interpolator};
pub use linear_algebra::{
    KrylovBackend, KrylovMethod, LinearSolveBackend, LinearSolverSettings, PartitionLayout, PreconditionerKind,
    SolveError, SolveStats, SparseEntries,
};
pub use mesh::{
    chain_1d, chain_1d_partition, partition_counts, BoundaryPatch, FaceGeometry, FvMesh, MeshBuilder, MeshError,
    RemotePatch, Side, UnstructuredMesh,
};

/// Prelude 模块
pub mod prelude {
    pub use crate::assembler::{AssemblyError, DiffusionAssembler};
    pub use crate::interpolation::Interpolator;
    pub use crate::linear_algebra::{KrylovBackend, LinearSolveBackend, LinearSolverSettings, PartitionLayout};
    pub use crate::mesh::{chain_1d, chain_1d_partition, FvMesh, MeshBuilder, Side, UnstructuredMesh};
    pub use fv_runtime::{Field, OwnedField, RuntimeScalar};
}
