// crates/fv_numerics/src/interpolation.rs

//! 单元值到面值的插值
//!
//! 所有格式都按面逐个计算，批量形式在面上并行，每个面只写自己的输出块。
//!
//! - 中心格式: `φ_f = φ_N (1 - w) + φ_O w`，`w` 为面的线性权重
//! - 二阶重构: 从 `side` 选定的单元出发，线性混合后叠加梯度修正
//! - 一阶迎风: 通量为正取 owner，否则取 neighbour
//! - 双侧 TVD: 从面两侧的单元各做一次 van Leer 限制重构
//!
//! 单元场须覆盖全部单元（含幽灵单元），面场覆盖全部面。

use std::marker::PhantomData;

use fv_foundation::MemoryTracker;
use fv_runtime::{Field, FieldError, OwnedField, RuntimeScalar};
use rayon::prelude::*;
use thiserror::Error;

use crate::mesh::{FvMesh, Side};

/// 插值错误
#[derive(Debug, Error)]
pub enum InterpolationError {
    /// 输入场条目数不足
    #[error("{field} 条目数不足: 需要 {expected}, 实际 {actual}")]
    SizeMismatch {
        /// 场名称
        field: &'static str,
        /// 需要的条目数
        expected: usize,
        /// 实际条目数
        actual: usize,
    },

    /// 输出场分配失败
    #[error(transparent)]
    Field(#[from] FieldError),
}

/// 插值结果
pub type InterpolationResult<T> = Result<T, InterpolationError>;

fn check_len(field: &'static str, expected: usize, actual: usize) -> InterpolationResult<()> {
    if actual < expected {
        return Err(InterpolationError::SizeMismatch {
            field,
            expected,
            actual,
        });
    }
    Ok(())
}

/// 面插值器，借用网格
pub struct Interpolator<'m, S, M: ?Sized> {
    mesh: &'m M,
    _scalar: PhantomData<S>,
}

impl<'m, S, M> Interpolator<'m, S, M>
where
    S: RuntimeScalar,
    M: FvMesh<S> + ?Sized,
{
    /// 创建插值器
    pub fn new(mesh: &'m M) -> Self {
        Self {
            mesh,
            _scalar: PhantomData,
        }
    }

    /// 所借用的网格
    #[inline]
    pub fn mesh(&self) -> &'m M {
        self.mesh
    }

    // =========================================================================
    // 中心格式
    // =========================================================================

    /// 单个面的中心插值，结果写入 `out`（长度为张量块大小）
    #[inline]
    pub fn central_face<const D1: usize, const D2: usize, const D3: usize>(
        &self,
        phi: &Field<'_, S, D1, D2, D3>,
        face: usize,
        out: &mut [S],
    ) {
        let w = self.mesh.weight(face);
        let o = phi.tensor(self.mesh.owner(face));
        let n = phi.tensor(self.mesh.neighbour(face));
        for ((dst, &po), &pn) in out.iter_mut().zip(o).zip(n) {
            *dst = pn * (S::ONE - w) + po * w;
        }
    }

    /// 全部面的中心插值
    pub fn central<const D1: usize, const D2: usize, const D3: usize>(
        &self,
        phi: &Field<'_, S, D1, D2, D3>,
        tracker: &MemoryTracker,
    ) -> InterpolationResult<OwnedField<S, D1, D2, D3>> {
        check_len("phi", self.mesh.n_cells(), phi.len())?;
        let mut out = OwnedField::<S, D1, D2, D3>::new(self.mesh.n_faces(), tracker)?;
        out.as_mut_slice()
            .par_chunks_mut(Field::<S, D1, D2, D3>::BLOCK)
            .enumerate()
            .for_each(|(face, dst)| self.central_face(phi, face, dst));
        Ok(out)
    }

    // =========================================================================
    // 二阶重构
    // =========================================================================

    /// 单个面的二阶重构
    ///
    /// `grad` 为面上的梯度，条目 `face` 的分量 `(i, axis)` 是第 `i` 个分量
    /// 沿 `axis` 方向的导数。
    #[inline]
    pub fn second_order_face<const D1: usize>(
        &self,
        phi: &Field<'_, S, D1>,
        grad: &Field<'_, S, D1, 3>,
        face: usize,
        side: Side,
        out: &mut [S],
    ) {
        let (p, n) = match side {
            Side::Owner => (self.mesh.owner(face), self.mesh.neighbour(face)),
            Side::Neighbour => (self.mesh.neighbour(face), self.mesh.owner(face)),
        };
        let lw = self.mesh.linear_weight(side, face);
        let qw = [
            self.mesh.quadratic_weight(side, face, 0),
            self.mesh.quadratic_weight(side, face, 1),
            self.mesh.quadratic_weight(side, face, 2),
        ];
        let phi_p = phi.tensor(p);
        let phi_n = phi.tensor(n);
        let g = grad.tensor(face);
        for (i, dst) in out.iter_mut().enumerate().take(D1) {
            let correction = qw[0] * g[3 * i] + qw[1] * g[3 * i + 1] + qw[2] * g[3 * i + 2];
            *dst = phi_p[i] + (phi_n[i] - phi_p[i]) * lw + correction;
        }
    }

    /// 全部面的二阶重构
    pub fn second_order<const D1: usize>(
        &self,
        phi: &Field<'_, S, D1>,
        grad: &Field<'_, S, D1, 3>,
        side: Side,
        tracker: &MemoryTracker,
    ) -> InterpolationResult<OwnedField<S, D1>> {
        check_len("phi", self.mesh.n_cells(), phi.len())?;
        check_len("grad", self.mesh.n_faces(), grad.len())?;
        let mut out = OwnedField::<S, D1>::new(self.mesh.n_faces(), tracker)?;
        out.as_mut_slice()
            .par_chunks_mut(D1)
            .enumerate()
            .for_each(|(face, dst)| self.second_order_face(phi, grad, face, side, dst));
        Ok(out)
    }

    // =========================================================================
    // 双侧 TVD
    // =========================================================================

    /// 单个面从 `side` 一侧的 van Leer 限制重构
    ///
    /// 设 `C` 为 `side` 选定的单元、`D` 为另一侧单元，`R = x_D - x_C`：
    ///
    /// ```text
    /// r   = 2 (∇φ_C · R) / (φ_D - φ_C) - 1
    /// ψ   = (r + |r|) / (1 + |r|)
    /// φ_f = φ_C + ψ (φ_D - φ_C) / 2
    /// ```
    ///
    /// 多分量时分子取 `Σ_i (∇φ_C,i · R)(φ_D - φ_C)_i`，分母取 `|φ_D - φ_C|²`。
    /// 分子超过分母 1000 倍时比值截断为 `±(2·1000) - 1`。
    pub fn tvd_face<const D1: usize>(
        &self,
        phi: &Field<'_, S, D1>,
        grad: &Field<'_, S, D1, 3>,
        cell_centres: &Field<'_, S, 3>,
        face: usize,
        side: Side,
        out: &mut [S],
    ) {
        let (c, d) = match side {
            Side::Owner => (self.mesh.owner(face), self.mesh.neighbour(face)),
            Side::Neighbour => (self.mesh.neighbour(face), self.mesh.owner(face)),
        };
        let (xc, xd) = (cell_centres.tensor(c), cell_centres.tensor(d));
        let r_vec = [xd[0] - xc[0], xd[1] - xc[1], xd[2] - xc[2]];
        let phi_c = phi.tensor(c);
        let phi_d = phi.tensor(d);
        let g = grad.tensor(c);

        let (upwind, jump) = if D1 == 1 {
            let projected = g[0] * r_vec[0] + g[1] * r_vec[1] + g[2] * r_vec[2];
            (projected, phi_d[0] - phi_c[0])
        } else {
            (0..D1).fold((S::ZERO, S::ZERO), |(num, den), i| {
                let projected = g[3 * i] * r_vec[0] + g[3 * i + 1] * r_vec[1] + g[3 * i + 2] * r_vec[2];
                let diff = phi_d[i] - phi_c[i];
                (num + projected * diff, den + diff * diff)
            })
        };
        let psi = van_leer(limiter_ratio(upwind, jump));
        for (i, dst) in out.iter_mut().enumerate().take(D1) {
            *dst = phi_c[i] + S::HALF * psi * (phi_d[i] - phi_c[i]);
        }
    }

    /// 全部面的双侧 TVD 重构，返回 `[owner 侧, neighbour 侧]`
    ///
    /// `grad` 为单元梯度，`cell_centres` 为单元中心，二者都覆盖全部单元。
    /// 物理边界面两侧都取幽灵单元的值；内部面与进程间面做限制重构。
    pub fn tvd_dual<const D1: usize>(
        &self,
        phi: &Field<'_, S, D1>,
        grad: &Field<'_, S, D1, 3>,
        cell_centres: &Field<'_, S, 3>,
        tracker: &MemoryTracker,
    ) -> InterpolationResult<[OwnedField<S, D1>; 2]> {
        let n_cells = self.mesh.n_cells();
        check_len("phi", n_cells, phi.len())?;
        check_len("grad", n_cells, grad.len())?;
        check_len("cell_centres", n_cells, cell_centres.len())?;

        let n_faces = self.mesh.n_faces();
        let physical = self.mesh.n_internal_faces()..self.mesh.n_local_faces();
        let mut from_owner = OwnedField::<S, D1>::new(n_faces, tracker)?;
        let mut from_neighbour = OwnedField::<S, D1>::new(n_faces, tracker)?;
        from_owner
            .as_mut_slice()
            .par_chunks_mut(D1)
            .zip(from_neighbour.as_mut_slice().par_chunks_mut(D1))
            .enumerate()
            .for_each(|(face, (o, n))| {
                if physical.contains(&face) {
                    let ghost = phi.tensor(self.mesh.neighbour(face));
                    o.copy_from_slice(ghost);
                    n.copy_from_slice(ghost);
                } else {
                    self.tvd_face(phi, grad, cell_centres, face, Side::Owner, o);
                    self.tvd_face(phi, grad, cell_centres, face, Side::Neighbour, n);
                }
            });
        Ok([from_owner, from_neighbour])
    }

    // =========================================================================
    // 一阶迎风
    // =========================================================================

    /// 单个面的迎风取值
    #[inline]
    pub fn upwind_face<const D1: usize, const D2: usize, const D3: usize>(
        &self,
        phi: &Field<'_, S, D1, D2, D3>,
        flux: S,
        face: usize,
        out: &mut [S],
    ) {
        let cell = if flux > S::ZERO {
            self.mesh.owner(face)
        } else {
            self.mesh.neighbour(face)
        };
        out.copy_from_slice(phi.tensor(cell));
    }

    /// 全部面的迎风取值，`flux` 为面通量
    pub fn upwind<const D1: usize, const D2: usize, const D3: usize>(
        &self,
        phi: &Field<'_, S, D1, D2, D3>,
        flux: &Field<'_, S>,
        tracker: &MemoryTracker,
    ) -> InterpolationResult<OwnedField<S, D1, D2, D3>> {
        check_len("phi", self.mesh.n_cells(), phi.len())?;
        check_len("flux", self.mesh.n_faces(), flux.len())?;
        let mut out = OwnedField::<S, D1, D2, D3>::new(self.mesh.n_faces(), tracker)?;
        out.as_mut_slice()
            .par_chunks_mut(Field::<S, D1, D2, D3>::BLOCK)
            .enumerate()
            .for_each(|(face, dst)| self.upwind_face(phi, flux[face], face, dst));
        Ok(out)
    }
}

/// 限制比值截断倍数
const RATIO_CAP: f64 = 1000.0; // ALLOW_F64: 常数

/// 零的符号为零
#[inline]
fn sign<S: RuntimeScalar>(v: S) -> S {
    if v > S::ZERO {
        S::ONE
    } else if v < S::ZERO {
        -S::ONE
    } else {
        S::ZERO
    }
}

/// 梯度比值 `r`，分母按符号外推一个最小正数
#[inline]
fn limiter_ratio<S: RuntimeScalar>(upwind: S, jump: S) -> S {
    let two = S::ONE + S::ONE;
    let cap = S::from_config(RATIO_CAP);
    if upwind.abs() > cap * jump.abs() {
        two * cap * sign(upwind) * sign(jump) - S::ONE
    } else {
        let den = if jump < S::ZERO {
            jump - S::MIN_POSITIVE
        } else {
            jump + S::MIN_POSITIVE
        };
        two * upwind / den - S::ONE
    }
}

/// van Leer 限制器
#[inline]
fn van_leer<S: RuntimeScalar>(r: S) -> S {
    (r + r.abs()) / (S::ONE + r.abs())
}
