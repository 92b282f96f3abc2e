// crates/fv_numerics/src/linear_algebra/mod.rs

//! 稀疏线性代数
//!
//! 隐式扩散算子的装配数据、CSR 矩阵、预条件器、Krylov 求解器，
//! 以及组装器面向的线性求解设施接口。
//!
//! ```text
//! SparseEntries + PartitionLayout
//!         │ LinearSolveBackend::assemble
//!         ▼
//!   KrylovBackend ── CsrMatrix ── Preconditioner (Identity / Jacobi / AMG)
//!         │ LinearSolveBackend::solve
//!         ▼
//!   GmresSolver / BiCgStabSolver
//! ```

pub mod amg;
pub mod backend;
pub mod csr;
pub mod entries;
pub mod preconditioner;
pub mod solver;
pub mod vector_ops;

pub use amg::{AmgError, AmgPreconditioner, AmgSettings};
pub use backend::{KrylovBackend, LinearSolveBackend, SolveError, SolveStats};
pub use csr::{CsrBuilder, CsrMatrix, CsrPattern, RowView};
pub use entries::{OwnershipRanges, PartitionLayout, SparseEntries};
pub use preconditioner::{IdentityPreconditioner, JacobiPreconditioner, Preconditioner};
pub use solver::{
    BiCgStabSolver, GmresSolver, IterativeSolver, KrylovMethod, LinearSolverSettings, PreconditionerKind,
    SolverConfig, SolverResult, SolverStatus, RTOL_EPSILON_FACTOR,
};
