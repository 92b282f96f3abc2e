// crates/fv_numerics/src/linear_algebra/amg.rs

//! 聚合型代数多重网格预条件器
//!
//! # 构建
//!
//! 1. 强连接: `|a_ij| ≥ θ √|a_ii a_jj|`
//! 2. 三遍贪心聚合：
//!    - 强邻居全部未聚合的节点连同邻居组成新聚合
//!    - 剩余节点并入任一已聚合强邻居所在的聚合
//!    - 仍未聚合的节点与其未聚合强邻居组成新聚合
//! 3. 分片常数延拓，Galerkin 粗算子 `A_c[I][J] = Σ_{i∈I, j∈J} a_ij`
//! 4. 单元数不超过 `coarse_size`、层数达到 `max_levels` 或聚合不再缩减时停止。
//!    最粗层不超过 `coarse_size` 时做稠密 LU 分解，否则只做阻尼 Jacobi 光滑
//!    (对角占优的小时间步算子没有强连接，聚合会停在细层)
//!
//! # 应用
//!
//! 一次 V 循环，各层用阻尼 Jacobi 前后光滑。

use fv_runtime::RuntimeScalar;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::csr::{CsrBuilder, CsrMatrix};
use super::preconditioner::Preconditioner;

/// 多重网格参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AmgSettings {
    /// 强连接阈值 θ
    pub strength_threshold: f64, // ALLOW_F64: 配置参数
    /// 最大层数（含最粗层）
    pub max_levels: usize,
    /// 最粗层规模上限
    pub coarse_size: usize,
    /// 前光滑次数
    pub pre_smooth: usize,
    /// 后光滑次数
    pub post_smooth: usize,
    /// Jacobi 阻尼系数
    pub jacobi_omega: f64, // ALLOW_F64: 配置参数
}

impl Default for AmgSettings {
    fn default() -> Self {
        Self {
            strength_threshold: 0.25,
            max_levels: 10,
            coarse_size: 64,
            pre_smooth: 1,
            post_smooth: 1,
            jacobi_omega: 2.0 / 3.0,
        }
    }
}

/// 多重网格构建错误
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AmgError {
    /// 最粗层矩阵奇异
    #[error("最粗层矩阵奇异 (n = {size})")]
    SingularCoarseMatrix {
        /// 最粗层规模
        size: usize,
    },
}

// =============================================================================
// 稠密 LU
// =============================================================================

/// 部分选主元稠密 LU 分解
#[derive(Debug, Clone)]
struct DenseLu<S: RuntimeScalar> {
    n: usize,
    lu: Vec<S>,
    piv: Vec<usize>,
}

impl<S: RuntimeScalar> DenseLu<S> {
    fn factor(matrix: &CsrMatrix<S>) -> Result<Self, AmgError> {
        let n = matrix.n_rows();
        let mut lu = vec![S::ZERO; n * n];
        let mut scale = S::ZERO;
        for row in 0..n {
            for (col, v) in matrix.row(row).iter() {
                lu[row * n + col] = v;
                scale = scale.max(v.abs());
            }
        }
        let tiny = S::EPSILON * scale * S::from_config(n as f64);
        let mut piv: Vec<usize> = (0..n).collect();

        for k in 0..n {
            let (p, max) = (k..n)
                .map(|i| (i, lu[i * n + k].abs()))
                .fold((k, S::ZERO), |best, cur| if cur.1 > best.1 { cur } else { best });
            if max <= tiny || !max.is_finite() {
                return Err(AmgError::SingularCoarseMatrix { size: n });
            }
            if p != k {
                for j in 0..n {
                    lu.swap(k * n + j, p * n + j);
                }
                piv.swap(k, p);
            }
            let pivot = lu[k * n + k];
            for i in k + 1..n {
                let factor = lu[i * n + k] / pivot;
                lu[i * n + k] = factor;
                for j in k + 1..n {
                    let u = lu[k * n + j];
                    lu[i * n + j] -= factor * u;
                }
            }
        }
        Ok(Self { n, lu, piv })
    }

    fn solve(&self, b: &[S], x: &mut [S]) {
        let n = self.n;
        for (xi, &p) in x.iter_mut().zip(&self.piv) {
            *xi = b[p];
        }
        for i in 0..n {
            let mut sum = x[i];
            for j in 0..i {
                sum -= self.lu[i * n + j] * x[j];
            }
            x[i] = sum;
        }
        for i in (0..n).rev() {
            let mut sum = x[i];
            for j in i + 1..n {
                sum -= self.lu[i * n + j] * x[j];
            }
            x[i] = sum / self.lu[i * n + i];
        }
    }
}

// =============================================================================
// 聚合
// =============================================================================

const UNASSIGNED: usize = usize::MAX;

/// 强连接邻居表
fn strong_neighbours<S: RuntimeScalar>(matrix: &CsrMatrix<S>, theta: S) -> Vec<Vec<usize>> {
    let diag = matrix.extract_diagonal();
    (0..matrix.n_rows())
        .map(|i| {
            matrix
                .row(i)
                .iter()
                .filter(|&(j, v)| j != i && v.abs() >= theta * (diag[i] * diag[j]).abs().sqrt())
                .map(|(j, _)| j)
                .collect()
        })
        .collect()
}

/// 三遍贪心聚合，返回 (每个节点的聚合编号, 聚合数)
fn aggregate(strong: &[Vec<usize>]) -> (Vec<usize>, usize) {
    let n = strong.len();
    let mut agg = vec![UNASSIGNED; n];
    let mut n_agg = 0;

    for i in 0..n {
        if agg[i] != UNASSIGNED || strong[i].iter().any(|&j| agg[j] != UNASSIGNED) {
            continue;
        }
        agg[i] = n_agg;
        for &j in &strong[i] {
            agg[j] = n_agg;
        }
        n_agg += 1;
    }

    let first_pass = agg.clone();
    for i in 0..n {
        if agg[i] != UNASSIGNED {
            continue;
        }
        if let Some(&j) = strong[i].iter().find(|&&j| first_pass[j] != UNASSIGNED) {
            agg[i] = first_pass[j];
        }
    }

    for i in 0..n {
        if agg[i] != UNASSIGNED {
            continue;
        }
        agg[i] = n_agg;
        for &j in &strong[i] {
            if agg[j] == UNASSIGNED {
                agg[j] = n_agg;
            }
        }
        n_agg += 1;
    }

    (agg, n_agg)
}

/// Galerkin 粗算子（分片常数延拓）
fn galerkin<S: RuntimeScalar>(matrix: &CsrMatrix<S>, agg: &[usize], n_agg: usize) -> CsrMatrix<S> {
    let mut builder = CsrBuilder::new_square(n_agg);
    for i in 0..matrix.n_rows() {
        for (j, v) in matrix.row(i).iter() {
            builder.add(agg[i], agg[j], v);
        }
    }
    builder.build()
}

// =============================================================================
// 层次结构
// =============================================================================

/// 最粗层无法直接分解时的光滑次数
const COARSE_SWEEPS: usize = 4;

#[derive(Debug, Clone)]
struct Level<S: RuntimeScalar> {
    matrix: CsrMatrix<S>,
    inv_diag: Vec<S>,
    aggregates: Vec<usize>,
    n_coarse: usize,
}

fn inverse_diagonal<S: RuntimeScalar>(matrix: &CsrMatrix<S>) -> Vec<S> {
    matrix
        .extract_diagonal()
        .into_iter()
        .map(|d| if d.abs() > S::MIN_POSITIVE { S::ONE / d } else { S::ZERO })
        .collect()
}

/// 最粗层求解
#[derive(Debug, Clone)]
enum CoarseSolve<S: RuntimeScalar> {
    /// 稠密 LU
    Direct(DenseLu<S>),
    /// 阻尼 Jacobi
    Smooth { matrix: CsrMatrix<S>, inv_diag: Vec<S> },
}

impl<S: RuntimeScalar> CoarseSolve<S> {
    fn n(&self) -> usize {
        match self {
            Self::Direct(lu) => lu.n,
            Self::Smooth { matrix, .. } => matrix.n_rows(),
        }
    }
}

/// 聚合型 AMG V 循环预条件器
#[derive(Debug, Clone)]
pub struct AmgPreconditioner<S: RuntimeScalar> {
    levels: Vec<Level<S>>,
    coarse: CoarseSolve<S>,
    omega: S,
    pre_smooth: usize,
    post_smooth: usize,
}

impl<S: RuntimeScalar> AmgPreconditioner<S> {
    /// 构建层次结构
    pub fn new(matrix: &CsrMatrix<S>, settings: &AmgSettings) -> Result<Self, AmgError> {
        let theta = S::from_config(settings.strength_threshold);
        let mut levels = Vec::new();
        let mut current = matrix.clone();

        while levels.len() + 1 < settings.max_levels.max(1) && current.n_rows() > settings.coarse_size {
            let strong = strong_neighbours(&current, theta);
            let (aggregates, n_coarse) = aggregate(&strong);
            if n_coarse == 0 || n_coarse >= current.n_rows() {
                break;
            }
            let coarse = galerkin(&current, &aggregates, n_coarse);
            let inv_diag = inverse_diagonal(&current);
            levels.push(Level {
                matrix: current,
                inv_diag,
                aggregates,
                n_coarse,
            });
            current = coarse;
        }

        let direct = current.n_rows() <= settings.coarse_size;
        tracing::debug!(
            levels = levels.len() + 1,
            fine = matrix.n_rows(),
            coarse = current.n_rows(),
            direct,
            "AMG hierarchy built"
        );
        let coarse = if direct {
            CoarseSolve::Direct(DenseLu::factor(&current)?)
        } else {
            CoarseSolve::Smooth {
                inv_diag: inverse_diagonal(&current),
                matrix: current,
            }
        };
        Ok(Self {
            levels,
            coarse,
            omega: S::from_config(settings.jacobi_omega),
            pre_smooth: settings.pre_smooth,
            post_smooth: settings.post_smooth,
        })
    }

    /// 各层规模（由细到粗）
    pub fn level_sizes(&self) -> Vec<usize> {
        self.levels
            .iter()
            .map(|l| l.matrix.n_rows())
            .chain(std::iter::once(self.coarse.n()))
            .collect()
    }

    /// 最粗层是否做直接分解
    pub fn coarse_is_direct(&self) -> bool {
        matches!(self.coarse, CoarseSolve::Direct(_))
    }

    fn smooth(&self, level: &Level<S>, b: &[S], x: &mut [S], r: &mut [S], sweeps: usize) {
        for _ in 0..sweeps {
            level.matrix.residual(b, x, r);
            for ((xi, &ri), &inv) in x.iter_mut().zip(r.iter()).zip(&level.inv_diag) {
                *xi += self.omega * inv * ri;
            }
        }
    }

    fn v_cycle(&self, depth: usize, b: &[S], x: &mut [S]) {
        let Some(level) = self.levels.get(depth) else {
            match &self.coarse {
                CoarseSolve::Direct(lu) => lu.solve(b, x),
                CoarseSolve::Smooth { matrix, inv_diag } => {
                    let mut r = vec![S::ZERO; matrix.n_rows()];
                    x.fill(S::ZERO);
                    for _ in 0..COARSE_SWEEPS {
                        matrix.residual(b, x, &mut r);
                        for ((xi, &ri), &inv) in x.iter_mut().zip(&r).zip(inv_diag) {
                            *xi += self.omega * inv * ri;
                        }
                    }
                }
            }
            return;
        };

        let n = level.matrix.n_rows();
        let mut r = vec![S::ZERO; n];
        x.fill(S::ZERO);
        self.smooth(level, b, x, &mut r, self.pre_smooth);

        level.matrix.residual(b, x, &mut r);
        let mut rc = vec![S::ZERO; level.n_coarse];
        for (&ri, &a) in r.iter().zip(&level.aggregates) {
            rc[a] += ri;
        }
        let mut xc = vec![S::ZERO; level.n_coarse];
        self.v_cycle(depth + 1, &rc, &mut xc);
        for (xi, &a) in x.iter_mut().zip(&level.aggregates) {
            *xi += xc[a];
        }

        self.smooth(level, b, x, &mut r, self.post_smooth);
    }
}

impl<S: RuntimeScalar> Preconditioner<S> for AmgPreconditioner<S> {
    fn apply(&self, r: &[S], z: &mut [S]) {
        self.v_cycle(0, r, z);
    }

    fn name(&self) -> &'static str {
        "AMG"
    }
}
