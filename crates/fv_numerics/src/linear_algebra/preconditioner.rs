// crates/fv_numerics/src/linear_algebra/preconditioner.rs

//! 预条件器
//!
//! 核心操作 `apply`: z = M⁻¹ r。代数多重网格见 [`super::amg`]。

use fv_runtime::RuntimeScalar;

use super::csr::CsrMatrix;

/// 预条件器
pub trait Preconditioner<S: RuntimeScalar>: Send + Sync {
    /// z = M⁻¹ r
    fn apply(&self, r: &[S], z: &mut [S]);

    /// 名称
    fn name(&self) -> &'static str;
}

/// 恒等预条件器，z = r
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityPreconditioner;

impl<S: RuntimeScalar> Preconditioner<S> for IdentityPreconditioner {
    fn apply(&self, r: &[S], z: &mut [S]) {
        z.copy_from_slice(r);
    }

    fn name(&self) -> &'static str {
        "Identity"
    }
}

/// Jacobi 预条件器，z_i = r_i / A_ii
///
/// 对角元绝对值不超过 1e-14 的行退化为恒等。
#[derive(Debug, Clone)]
pub struct JacobiPreconditioner<S: RuntimeScalar> {
    inv_diag: Vec<S>,
}

impl<S: RuntimeScalar> JacobiPreconditioner<S> {
    /// 从矩阵对角线构造
    pub fn from_matrix(matrix: &CsrMatrix<S>) -> Self {
        Self::from_diagonal(&matrix.extract_diagonal())
    }

    /// 从对角向量构造
    pub fn from_diagonal(diag: &[S]) -> Self {
        let threshold = S::from_config(1e-14);
        let inv_diag = diag
            .iter()
            .map(|&d| if d.abs() > threshold { S::ONE / d } else { S::ONE })
            .collect();
        Self { inv_diag }
    }

    /// 对角元倒数
    pub fn inv_diagonal(&self) -> &[S] {
        &self.inv_diag
    }
}

impl<S: RuntimeScalar> Preconditioner<S> for JacobiPreconditioner<S> {
    fn apply(&self, r: &[S], z: &mut [S]) {
        debug_assert_eq!(r.len(), self.inv_diag.len());
        for ((zi, &ri), &inv) in z.iter_mut().zip(r).zip(&self.inv_diag) {
            *zi = ri * inv;
        }
    }

    fn name(&self) -> &'static str {
        "Jacobi"
    }
}
