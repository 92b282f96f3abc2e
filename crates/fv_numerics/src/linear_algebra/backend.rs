// crates/fv_numerics/src/linear_algebra/backend.rs

//! 线性求解设施
//!
//! 组装器只通过 [`LinearSolveBackend`] 交出稀疏三元组和分区布局，
//! 然后对同一个算子多次求解。求解设施的资源是普通的拥有值，
//! 任何退出路径上都随 `Drop` 释放。
//!
//! [`KrylovBackend`] 是进程内实现：本地 CSR 矩阵 + 可配置 Krylov 方法与预条件器。
//! 它只处理本进程拥有的行和列，跨进程列报告为 [`SolveError::OffProcessColumn`]。

use fv_runtime::RuntimeScalar;
use thiserror::Error;

use super::amg::{AmgError, AmgPreconditioner};
use super::csr::{CsrBuilder, CsrMatrix};
use super::entries::{PartitionLayout, SparseEntries};
use super::preconditioner::{IdentityPreconditioner, JacobiPreconditioner, Preconditioner};
use super::solver::{
    BiCgStabSolver, GmresSolver, IterativeSolver, KrylovMethod, LinearSolverSettings, PreconditionerKind,
    SolverResult, SolverStatus,
};

/// 求解设施错误
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SolveError {
    /// 尚未组装
    #[error("线性系统尚未组装")]
    NotAssembled,

    /// 向量长度与本地行数不符
    #[error("向量长度不匹配: 期望 {expected}, 实际 {actual}")]
    DimensionMismatch {
        /// 期望长度
        expected: usize,
        /// 实际长度
        actual: usize,
    },

    /// 行不属于本进程
    #[error("行 {row} 不在本进程区间 {start}..{end}")]
    RowOutOfRange {
        /// 全局行号
        row: usize,
        /// 区间起点
        start: usize,
        /// 区间终点
        end: usize,
    },

    /// 列属于其他进程
    #[error("行 {row} 引用了其他进程的列 {col}")]
    OffProcessColumn {
        /// 全局行号
        row: usize,
        /// 全局列号
        col: usize,
    },

    /// 非有限系数
    #[error("系数 ({row}, {col}) 非有限")]
    NonFiniteEntry {
        /// 全局行号
        row: usize,
        /// 全局列号
        col: usize,
    },

    /// 对角元为零
    #[error("行 {row} 对角元为零")]
    ZeroDiagonal {
        /// 全局行号
        row: usize,
    },

    /// 矩阵奇异
    #[error("矩阵奇异 (n = {size})")]
    SingularMatrix {
        /// 出现奇异的规模
        size: usize,
    },

    /// 迭代内积退化
    #[error("迭代在第 {iterations} 步退化")]
    Breakdown {
        /// 迭代次数
        iterations: usize,
    },

    /// 未收敛
    #[error("{iterations} 次迭代后未收敛 (相对残差 {relative_residual:.3e})")]
    NotConverged {
        /// 迭代次数
        iterations: usize,
        /// 相对残差
        relative_residual: f64, // ALLOW_F64: 诊断
    },

    /// 分区布局无效
    #[error("分区布局无效: {message}")]
    InvalidLayout {
        /// 描述
        message: String,
    },

    /// 求解设置无效
    #[error("求解设置无效: {message}")]
    InvalidSettings {
        /// 描述
        message: String,
    },
}

impl From<AmgError> for SolveError {
    fn from(err: AmgError) -> Self {
        match err {
            AmgError::SingularCoarseMatrix { size } => SolveError::SingularMatrix { size },
        }
    }
}

/// 单次求解统计
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SolveStats {
    /// 迭代次数
    pub iterations: usize,
    /// 最终残差范数
    pub residual_norm: f64, // ALLOW_F64: 诊断
    /// 相对残差
    pub relative_residual: f64, // ALLOW_F64: 诊断
}

impl<S: RuntimeScalar> From<&SolverResult<S>> for SolveStats {
    fn from(result: &SolverResult<S>) -> Self {
        Self {
            iterations: result.iterations,
            residual_norm: result.residual_norm.to_config(),
            relative_residual: result.relative_residual.to_config(),
        }
    }
}

/// 线性求解设施
pub trait LinearSolveBackend<S: RuntimeScalar> {
    /// 交出稀疏三元组与分区布局，建立算子（可重复调用，覆盖上一次）
    fn assemble(&mut self, entries: &SparseEntries<S>, layout: &PartitionLayout) -> Result<(), SolveError>;

    /// 以最近一次组装的算子求解，`rhs` 与 `solution` 长度为本地行数
    fn solve(&mut self, rhs: &[S], solution: &mut [S]) -> Result<SolveStats, SolveError>;

    /// 名称
    fn name(&self) -> &'static str;
}

// =============================================================================
// 进程内 Krylov 实现
// =============================================================================

enum KrylovSolver<S: RuntimeScalar> {
    Gmres(GmresSolver<S>),
    BiCgStab(BiCgStabSolver<S>),
}

impl<S: RuntimeScalar> KrylovSolver<S> {
    fn solve(
        &mut self,
        matrix: &CsrMatrix<S>,
        b: &[S],
        x: &mut [S],
        precond: &dyn Preconditioner<S>,
    ) -> SolverResult<S> {
        match self {
            Self::Gmres(s) => s.solve(matrix, b, x, precond),
            Self::BiCgStab(s) => s.solve(matrix, b, x, precond),
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Self::Gmres(s) => s.name(),
            Self::BiCgStab(s) => s.name(),
        }
    }
}

struct Assembled<S: RuntimeScalar> {
    matrix: CsrMatrix<S>,
    precond: Box<dyn Preconditioner<S>>,
    solver: KrylovSolver<S>,
    row_base: usize,
}

/// 进程内 Krylov 求解设施
pub struct KrylovBackend<S: RuntimeScalar> {
    settings: LinearSolverSettings,
    state: Option<Assembled<S>>,
}

impl<S: RuntimeScalar> KrylovBackend<S> {
    /// 以给定设置创建
    pub fn new(settings: LinearSolverSettings) -> Self {
        Self { settings, state: None }
    }

    /// 当前设置
    pub fn settings(&self) -> &LinearSolverSettings {
        &self.settings
    }

    /// 是否已组装
    pub fn is_assembled(&self) -> bool {
        self.state.is_some()
    }

    /// 已组装的本地矩阵（局部行列编号）
    pub fn matrix(&self) -> Option<&CsrMatrix<S>> {
        self.state.as_ref().map(|s| &s.matrix)
    }

    fn build_matrix(entries: &SparseEntries<S>, layout: &PartitionLayout) -> Result<CsrMatrix<S>, SolveError> {
        let range = layout.local_range();
        let base = range.start;
        let mut builder = CsrBuilder::new_square(range.len());
        for (row, col, value) in entries.iter() {
            if !range.contains(&row) {
                return Err(SolveError::RowOutOfRange {
                    row,
                    start: range.start,
                    end: range.end,
                });
            }
            if !range.contains(&col) {
                return Err(SolveError::OffProcessColumn { row, col });
            }
            if !value.is_finite() {
                return Err(SolveError::NonFiniteEntry { row, col });
            }
            builder.add(row - base, col - base, value);
        }
        let matrix = builder.build();
        if let Some(row) = (0..matrix.n_rows()).find(|&i| matrix.get(i, i) == S::ZERO) {
            return Err(SolveError::ZeroDiagonal { row: row + base });
        }
        Ok(matrix)
    }

    fn build_preconditioner(&self, matrix: &CsrMatrix<S>) -> Result<Box<dyn Preconditioner<S>>, SolveError> {
        Ok(match self.settings.preconditioner {
            PreconditionerKind::None => Box::new(IdentityPreconditioner),
            PreconditionerKind::Jacobi => Box::new(JacobiPreconditioner::from_matrix(matrix)),
            PreconditionerKind::Amg => Box::new(AmgPreconditioner::new(matrix, &self.settings.amg)?),
        })
    }
}

impl<S: RuntimeScalar> Default for KrylovBackend<S> {
    fn default() -> Self {
        Self::new(LinearSolverSettings::default())
    }
}

impl<S: RuntimeScalar> LinearSolveBackend<S> for KrylovBackend<S> {
    fn assemble(&mut self, entries: &SparseEntries<S>, layout: &PartitionLayout) -> Result<(), SolveError> {
        self.state = None;
        self.settings
            .check()
            .map_err(|message| SolveError::InvalidSettings { message })?;

        let matrix = Self::build_matrix(entries, layout)?;
        let precond = self.build_preconditioner(&matrix)?;
        let mut config = self.settings.solver_config();
        let rtol = self.settings.effective_rtol(S::EPSILON.to_config());
        if rtol != config.rtol {
            tracing::debug!(requested = config.rtol, effective = rtol, scalar = S::NAME, "rtol raised to precision floor");
            config.rtol = rtol;
        }
        let solver = match self.settings.method {
            KrylovMethod::Gmres { restart } => KrylovSolver::Gmres(GmresSolver::new(config, restart)),
            KrylovMethod::BiCgStab => KrylovSolver::BiCgStab(BiCgStabSolver::new(config)),
        };

        tracing::debug!(
            rows = matrix.n_rows(),
            nnz = matrix.nnz(),
            method = solver.name(),
            preconditioner = precond.name(),
            "linear system assembled"
        );
        self.state = Some(Assembled {
            matrix,
            precond,
            solver,
            row_base: layout.row_base(),
        });
        Ok(())
    }

    fn solve(&mut self, rhs: &[S], solution: &mut [S]) -> Result<SolveStats, SolveError> {
        let state = self.state.as_mut().ok_or(SolveError::NotAssembled)?;
        let n = state.matrix.n_rows();
        for len in [rhs.len(), solution.len()] {
            if len != n {
                return Err(SolveError::DimensionMismatch { expected: n, actual: len });
            }
        }

        solution.fill(S::ZERO);
        let result = state.solver.solve(&state.matrix, rhs, solution, state.precond.as_ref());
        let stats = SolveStats::from(&result);
        match result.status {
            SolverStatus::Converged => {
                tracing::debug!(
                    iterations = stats.iterations,
                    relative_residual = stats.relative_residual,
                    "solve converged"
                );
                Ok(stats)
            }
            SolverStatus::Stagnated => {
                tracing::warn!(iterations = stats.iterations, row_base = state.row_base, "solver breakdown");
                Err(SolveError::Breakdown {
                    iterations: stats.iterations,
                })
            }
            SolverStatus::MaxIterationsReached | SolverStatus::Diverged => {
                tracing::warn!(
                    iterations = stats.iterations,
                    relative_residual = stats.relative_residual,
                    status = ?result.status,
                    "solver did not converge"
                );
                Err(SolveError::NotConverged {
                    iterations: stats.iterations,
                    relative_residual: stats.relative_residual,
                })
            }
        }
    }

    fn name(&self) -> &'static str {
        "krylov"
    }
}
