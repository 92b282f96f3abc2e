// crates/fv_numerics/src/assembler/mod.rs

//! 隐式扩散算子组装
//!
//! 向后 Euler 离散 `(uⁿ⁺¹ - uⁿ)/Δt = ∇·(D∇uⁿ⁺¹)`，每个单元一行：
//!
//! ```text
//! K_f   = A_f · D_f / δ_f                       面导纳
//! a_cn  = -K_f / V_c                            真实邻居的非对角元
//! a_cc  = 1/Δt + Σ K_f / V_c                    真实邻居面与进程间面
//! b_c   = u_c / Δt
//! ```
//!
//! 物理边界面不进入矩阵（零通量）。进程间面的非对角元由
//! [`BoundaryCouplingTable`] 给出全局列号。

mod coupling;

pub use coupling::{BoundaryCouplingTable, CouplingEntry};

use std::marker::PhantomData;

use fv_runtime::{Field, RuntimeScalar};
use rayon::prelude::*;
use thiserror::Error;

use crate::linear_algebra::{LinearSolveBackend, PartitionLayout, SolveError, SolveStats, SparseEntries};
use crate::mesh::FvMesh;

/// 组装错误
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AssemblyError {
    /// 时间步长非正或非有限
    #[error("时间步长无效: {dt}")]
    InvalidTimeStep {
        /// 时间步长
        dt: f64, // ALLOW_F64: 诊断
    },

    /// 场条目数不足
    #[error("{field} 条目数不足: 需要 {expected}, 实际 {actual}")]
    SizeMismatch {
        /// 场名称
        field: &'static str,
        /// 需要的条目数
        expected: usize,
        /// 实际条目数
        actual: usize,
    },

    /// 输出场只读
    #[error("输出场为只读借用")]
    ReadOnlyOutput,

    /// 分区布局与网格不一致
    #[error("分区布局与网格不一致: {message}")]
    LayoutMismatch {
        /// 描述
        message: String,
    },

    /// 求解设施报告的错误
    #[error(transparent)]
    Solve(#[from] SolveError),
}

/// 组装结果
pub type AssemblyResult<T> = Result<T, AssemblyError>;

fn check_len(field: &'static str, expected: usize, actual: usize) -> AssemblyResult<()> {
    if actual < expected {
        return Err(AssemblyError::SizeMismatch {
            field,
            expected,
            actual,
        });
    }
    Ok(())
}

/// 隐式扩散组装器
///
/// 每个网格与分区布局构造一次，可反复组装与求解。
#[derive(Debug)]
pub struct DiffusionAssembler<'m, S, M: ?Sized> {
    mesh: &'m M,
    layout: PartitionLayout,
    coupling: BoundaryCouplingTable,
    _scalar: PhantomData<S>,
}

impl<'m, S, M> DiffusionAssembler<'m, S, M>
where
    S: RuntimeScalar,
    M: FvMesh<S> + ?Sized,
{
    /// 创建组装器并建立耦合表
    ///
    /// `layout` 的本进程号、进程数与本地行数必须与网格一致。
    pub fn new(mesh: &'m M, layout: PartitionLayout) -> AssemblyResult<Self> {
        if layout.rank() != mesh.rank() || layout.n_procs() != mesh.n_procs() {
            return Err(AssemblyError::LayoutMismatch {
                message: format!(
                    "layout is rank {} of {}, mesh is rank {} of {}",
                    layout.rank(),
                    layout.n_procs(),
                    mesh.rank(),
                    mesh.n_procs()
                ),
            });
        }
        if layout.local_rows() != mesh.n_internal_cells() {
            return Err(AssemblyError::LayoutMismatch {
                message: format!(
                    "layout owns {} rows, mesh has {} cells",
                    layout.local_rows(),
                    mesh.n_internal_cells()
                ),
            });
        }

        let coupling = BoundaryCouplingTable::from_mesh(mesh);
        if let Some(entry) = coupling.entries().iter().find(|e| e.proc >= layout.n_procs()) {
            return Err(AssemblyError::LayoutMismatch {
                message: format!("patch {} couples to missing process {}", entry.patch, entry.proc),
            });
        }
        let ranges = layout.ranges();
        for entry in coupling.entries() {
            if entry.ghost_indices.len() != entry.n_faces {
                return Err(AssemblyError::LayoutMismatch {
                    message: format!(
                        "patch {} has {} faces but {} ghost indices",
                        entry.patch,
                        entry.n_faces,
                        entry.ghost_indices.len()
                    ),
                });
            }
            let remote_rows = ranges.end(entry.proc) - ranges.base(entry.proc);
            if let Some(&ghost) = entry.ghost_indices.iter().find(|&&g| g >= remote_rows) {
                return Err(AssemblyError::LayoutMismatch {
                    message: format!(
                        "patch {} ghost index {ghost} exceeds the {remote_rows} rows of process {}",
                        entry.patch, entry.proc
                    ),
                });
            }
        }
        tracing::debug!(
            rank = layout.rank(),
            rows = layout.local_rows(),
            coupled_patches = coupling.len(),
            coupled_faces = coupling.n_faces(),
            "diffusion assembler ready"
        );
        Ok(Self {
            mesh,
            layout,
            coupling,
            _scalar: PhantomData,
        })
    }

    /// 网格
    #[inline]
    pub fn mesh(&self) -> &'m M {
        self.mesh
    }

    /// 分区布局
    #[inline]
    pub fn layout(&self) -> &PartitionLayout {
        &self.layout
    }

    /// 耦合表
    #[inline]
    pub fn coupling(&self) -> &BoundaryCouplingTable {
        &self.coupling
    }

    /// 面导纳 `area · D / delta`
    pub fn face_conductance(&self, face_diffusivity: &Field<'_, S>) -> AssemblyResult<Vec<S>> {
        let n_faces = self.mesh.n_faces();
        check_len("face_diffusivity", n_faces, face_diffusivity.len())?;
        let mesh = self.mesh;
        Ok(face_diffusivity.as_slice()[..n_faces]
            .par_iter()
            .enumerate()
            .map(|(face, &d)| mesh.area(face) * d / mesh.delta(face))
            .collect())
    }

    fn row_entries(&self, cell: usize, conductance: &[S], inv_dt: S) -> Vec<(usize, usize, S)> {
        let base = self.layout.row_base();
        let n_local_faces = self.mesh.n_local_faces();
        let volume = self.mesh.volume(cell);
        let row = base + cell;

        let faces = self.mesh.cell_faces(cell);
        let mut entries = Vec::with_capacity(faces.len() + 1);
        let mut diag = inv_dt;
        for (&face, &neighbour) in faces.iter().zip(self.mesh.cell_neighbours(cell)) {
            let off = -conductance[face] / volume;
            if let Some(nb) = neighbour {
                entries.push((row, base + nb, off));
            }
            if neighbour.is_some() || face >= n_local_faces {
                diag -= off;
            }
        }
        entries.push((row, row, diag));
        entries
    }

    /// 组装本进程拥有的全部行
    pub fn assemble(&self, face_diffusivity: &Field<'_, S>, dt: S) -> AssemblyResult<SparseEntries<S>> {
        if !(dt.is_finite() && dt > S::ZERO) {
            return Err(AssemblyError::InvalidTimeStep { dt: dt.to_config() });
        }
        let inv_dt = S::ONE / dt;
        let conductance = self.face_conductance(face_diffusivity)?;

        let mut entries: SparseEntries<S> = (0..self.mesh.n_internal_cells())
            .into_par_iter()
            .flat_map_iter(|cell| self.row_entries(cell, &conductance, inv_dt))
            .collect::<Vec<_>>()
            .into_iter()
            .collect();

        let base = self.layout.row_base();
        let ranges = self.layout.ranges();
        for entry in self.coupling.entries() {
            let remote_base = ranges.base(entry.proc);
            for (face, ghost) in entry.faces() {
                let owner = self.mesh.owner(face);
                let value = -conductance[face] / self.mesh.volume(owner);
                entries.add(base + owner, remote_base + ghost, value);
            }
        }

        tracing::debug!(
            rows = self.layout.local_rows(),
            entries = entries.len(),
            coupled = self.coupling.n_faces(),
            "implicit diffusion operator assembled"
        );
        Ok(entries)
    }

    /// 组装并对 `u` 的每一列求解，结果写入 `un`
    ///
    /// 所有列求解成功后才写 `un`；任一步失败时 `un` 保持原样。
    pub fn assemble_and_solve<B, const NRHS: usize>(
        &self,
        u: &Field<'_, S, NRHS>,
        face_diffusivity: &Field<'_, S>,
        dt: S,
        backend: &mut B,
        un: &mut Field<'_, S, NRHS>,
    ) -> AssemblyResult<Vec<SolveStats>>
    where
        B: LinearSolveBackend<S> + ?Sized,
    {
        let n = self.mesh.n_internal_cells();
        check_len("u", n, u.len())?;
        check_len("un", n, un.len())?;
        if un.is_read_only() {
            return Err(AssemblyError::ReadOnlyOutput);
        }

        let entries = self.assemble(face_diffusivity, dt)?;
        backend.assemble(&entries, &self.layout)?;

        let inv_dt = S::ONE / dt;
        let mut rhs = vec![S::ZERO; n];
        let mut columns = vec![S::ZERO; n * NRHS];
        let mut stats = Vec::with_capacity(NRHS);
        for (j, column) in columns.chunks_mut(n.max(1)).enumerate().take(NRHS) {
            rhs.par_iter_mut()
                .enumerate()
                .for_each(|(i, r)| *r = *u.at2(i, j) * inv_dt);
            let s = backend.solve(&rhs, &mut column[..n])?;
            tracing::debug!(column = j, iterations = s.iterations, "column solved");
            stats.push(s);
        }

        un.as_mut_slice()[..n * NRHS]
            .par_chunks_mut(NRHS.max(1))
            .enumerate()
            .for_each(|(i, block)| {
                for (j, v) in block.iter_mut().enumerate() {
                    *v = columns[j * n + i];
                }
            });
        Ok(stats)
    }
}
