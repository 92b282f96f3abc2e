// crates/fv_numerics/src/linear_algebra/solver.rs

//! Krylov 迭代求解器
//!
//! - [`GmresSolver`]: 重启 GMRES，右预条件，修正 Gram-Schmidt 正交化，Givens 旋转
//! - [`BiCgStabSolver`]: 预条件 BiCGStab
//!
//! 收敛判据: `‖r‖ < atol` 或 `‖r‖ / ‖r₀‖ < rtol`。

use fv_runtime::RuntimeScalar;
use serde::{Deserialize, Serialize};

use super::amg::AmgSettings;
use super::csr::CsrMatrix;
use super::preconditioner::Preconditioner;
use super::vector_ops::{axpy, copy, dot, norm2, scale};

// ============================================================================
// 配置
// ============================================================================

/// 相对容差下限与机器精度之比
///
/// 有限精度下 Krylov 残差停滞在 `ε` 的若干倍附近，低于此下限的 `rtol` 按下限执行。
pub const RTOL_EPSILON_FACTOR: f64 = 1000.0; // ALLOW_F64: 配置参数

/// 迭代求解器配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolverConfig {
    /// 相对收敛容差
    pub rtol: f64, // ALLOW_F64: 配置参数
    /// 绝对收敛容差
    pub atol: f64, // ALLOW_F64: 配置参数
    /// 最大迭代次数
    pub max_iter: usize,
    /// 是否输出每步残差
    pub verbose: bool,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            rtol: 1e-10,
            atol: 1e-30,
            max_iter: 1000,
            verbose: false,
        }
    }
}

impl SolverConfig {
    /// 创建配置
    pub fn new(rtol: f64, max_iter: usize) -> Self {
        Self {
            rtol,
            max_iter,
            ..Default::default()
        }
    }

    /// 设置绝对容差
    pub fn with_atol(mut self, atol: f64) -> Self {
        self.atol = atol;
        self
    }
}

/// Krylov 方法
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KrylovMethod {
    /// 重启 GMRES
    Gmres {
        /// 重启长度
        restart: usize,
    },
    /// BiCGStab
    BiCgStab,
}

impl Default for KrylovMethod {
    fn default() -> Self {
        Self::Gmres { restart: 30 }
    }
}

/// 预条件器种类
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PreconditionerKind {
    /// 不预条件
    None,
    /// 对角预条件
    Jacobi,
    /// 聚合型代数多重网格
    #[default]
    Amg,
}

/// 线性求解设置
///
/// 默认为 GMRES(30) + AMG。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinearSolverSettings {
    /// Krylov 方法
    pub method: KrylovMethod,
    /// 预条件器
    pub preconditioner: PreconditionerKind,
    /// 相对容差
    pub rtol: f64, // ALLOW_F64: 配置参数
    /// 绝对容差
    pub atol: f64, // ALLOW_F64: 配置参数
    /// 最大迭代次数
    pub max_iter: usize,
    /// 是否输出每步残差
    pub verbose: bool,
    /// 多重网格参数
    pub amg: AmgSettings,
}

impl Default for LinearSolverSettings {
    fn default() -> Self {
        let config = SolverConfig::default();
        Self {
            method: KrylovMethod::default(),
            preconditioner: PreconditionerKind::default(),
            rtol: config.rtol,
            atol: config.atol,
            max_iter: config.max_iter,
            verbose: config.verbose,
            amg: AmgSettings::default(),
        }
    }
}

impl LinearSolverSettings {
    /// 迭代部分的配置
    pub fn solver_config(&self) -> SolverConfig {
        SolverConfig {
            rtol: self.rtol,
            atol: self.atol,
            max_iter: self.max_iter,
            verbose: self.verbose,
        }
    }

    /// 机器精度为 `epsilon` 时实际执行的相对容差
    pub fn effective_rtol(&self, epsilon: f64) -> f64 {
        if self.rtol == 0.0 {
            // 0 表示只按绝对容差/迭代上限结束
            0.0
        } else {
            self.rtol.max(epsilon * RTOL_EPSILON_FACTOR)
        }
    }

    /// 检查参数，返回第一处问题的描述
    pub fn check(&self) -> Result<(), String> {
        if !(self.rtol.is_finite() && self.rtol >= 0.0) {
            return Err(format!("rtol must be non-negative, got {}", self.rtol));
        }
        if !(self.atol.is_finite() && self.atol >= 0.0) {
            return Err(format!("atol must be non-negative, got {}", self.atol));
        }
        if self.max_iter == 0 {
            return Err("max_iter must be positive".into());
        }
        if let KrylovMethod::Gmres { restart: 0 } = self.method {
            return Err("GMRES restart must be positive".into());
        }
        if self.amg.max_levels == 0 {
            return Err("amg.max_levels must be positive".into());
        }
        if !(self.amg.jacobi_omega > 0.0 && self.amg.jacobi_omega < 2.0) {
            return Err(format!("amg.jacobi_omega must lie in (0, 2), got {}", self.amg.jacobi_omega));
        }
        if !(self.amg.strength_threshold >= 0.0 && self.amg.strength_threshold <= 1.0) {
            return Err(format!(
                "amg.strength_threshold must lie in [0, 1], got {}",
                self.amg.strength_threshold
            ));
        }
        Ok(())
    }
}

// ============================================================================
// 结果
// ============================================================================

/// 求解状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolverStatus {
    /// 收敛
    Converged,
    /// 达到最大迭代次数
    MaxIterationsReached,
    /// 发散
    Diverged,
    /// 停滞（内积退化）
    Stagnated,
}

/// 求解结果
#[derive(Debug, Clone)]
pub struct SolverResult<S: RuntimeScalar> {
    /// 状态
    pub status: SolverStatus,
    /// 迭代次数
    pub iterations: usize,
    /// 最终残差范数
    pub residual_norm: S,
    /// 初始残差范数
    pub initial_residual_norm: S,
    /// 相对残差
    pub relative_residual: S,
}

impl<S: RuntimeScalar> SolverResult<S> {
    fn new(status: SolverStatus, iterations: usize, residual_norm: S, initial: S) -> Self {
        Self {
            status,
            iterations,
            residual_norm,
            initial_residual_norm: initial,
            relative_residual: residual_norm.safe_div(initial, S::ZERO),
        }
    }

    /// 是否收敛
    pub fn is_converged(&self) -> bool {
        self.status == SolverStatus::Converged
    }
}

/// 迭代求解器
pub trait IterativeSolver<S: RuntimeScalar> {
    /// 求解 Ax = b，`x` 输入初值、输出解
    fn solve<P: Preconditioner<S> + ?Sized>(
        &mut self,
        matrix: &CsrMatrix<S>,
        b: &[S],
        x: &mut [S],
        precond: &P,
    ) -> SolverResult<S>;

    /// 名称
    fn name(&self) -> &'static str;
}

/// 发散判定倍数
const DIVERGENCE_FACTOR: f64 = 1e6;

// ============================================================================
// GMRES
// ============================================================================

/// 重启 GMRES(m)，右预条件
pub struct GmresSolver<S: RuntimeScalar> {
    config: SolverConfig,
    restart: usize,
    basis: Vec<Vec<S>>,
    hessenberg: Vec<S>,
    cs: Vec<S>,
    sn: Vec<S>,
    g: Vec<S>,
    r: Vec<S>,
    w: Vec<S>,
    z: Vec<S>,
}

impl<S: RuntimeScalar> GmresSolver<S> {
    /// 创建求解器
    pub fn new(config: SolverConfig, restart: usize) -> Self {
        Self {
            config,
            restart: restart.max(1),
            basis: Vec::new(),
            hessenberg: Vec::new(),
            cs: Vec::new(),
            sn: Vec::new(),
            g: Vec::new(),
            r: Vec::new(),
            w: Vec::new(),
            z: Vec::new(),
        }
    }

    fn ensure_workspace(&mut self, n: usize) {
        let m = self.restart;
        if self.r.len() != n || self.basis.len() != m + 1 {
            self.basis = vec![vec![S::ZERO; n]; m + 1];
            self.r = vec![S::ZERO; n];
            self.w = vec![S::ZERO; n];
            self.z = vec![S::ZERO; n];
        }
        self.hessenberg = vec![S::ZERO; (m + 1) * m];
        self.cs = vec![S::ZERO; m];
        self.sn = vec![S::ZERO; m];
        self.g = vec![S::ZERO; m + 1];
    }

    #[inline]
    fn h(&mut self, i: usize, j: usize) -> &mut S {
        &mut self.hessenberg[i * self.restart + j]
    }
}

impl<S: RuntimeScalar> IterativeSolver<S> for GmresSolver<S> {
    fn solve<P: Preconditioner<S> + ?Sized>(
        &mut self,
        matrix: &CsrMatrix<S>,
        b: &[S],
        x: &mut [S],
        precond: &P,
    ) -> SolverResult<S> {
        let n = b.len();
        let m = self.restart;
        self.ensure_workspace(n);
        let rtol = S::from_config(self.config.rtol);
        let atol = S::from_config(self.config.atol);
        let tiny = S::MIN_POSITIVE.sqrt();

        matrix.residual(b, x, &mut self.r);
        let initial = norm2(&self.r);
        if initial <= atol {
            return SolverResult::new(SolverStatus::Converged, 0, initial, initial);
        }
        let target = atol.max(rtol * initial);
        let mut beta = initial;
        let mut iterations = 0;

        while iterations < self.config.max_iter {
            copy(&self.r, &mut self.basis[0]);
            scale(S::ONE / beta, &mut self.basis[0]);
            self.g.fill(S::ZERO);
            self.g[0] = beta;

            let mut k_done = 0;
            for k in 0..m {
                // w = A M⁻¹ v_k
                precond.apply(&self.basis[k], &mut self.z);
                matrix.apply(&self.z, &mut self.w);

                for i in 0..=k {
                    let hik = dot(&self.w, &self.basis[i]);
                    *self.h(i, k) = hik;
                    axpy(-hik, &self.basis[i], &mut self.w);
                }
                let h_next = norm2(&self.w);
                *self.h(k + 1, k) = h_next;
                if h_next > tiny {
                    copy(&self.w, &mut self.basis[k + 1]);
                    scale(S::ONE / h_next, &mut self.basis[k + 1]);
                }

                for i in 0..k {
                    let (c, s) = (self.cs[i], self.sn[i]);
                    let a = *self.h(i, k);
                    let bb = *self.h(i + 1, k);
                    *self.h(i, k) = c * a + s * bb;
                    *self.h(i + 1, k) = c * bb - s * a;
                }
                let a = *self.h(k, k);
                let bb = *self.h(k + 1, k);
                let denom = a.hypot(bb);
                let (c, s) = if denom > S::ZERO {
                    (a / denom, bb / denom)
                } else {
                    (S::ONE, S::ZERO)
                };
                self.cs[k] = c;
                self.sn[k] = s;
                *self.h(k, k) = denom;
                *self.h(k + 1, k) = S::ZERO;
                self.g[k + 1] = -s * self.g[k];
                self.g[k] = c * self.g[k];

                iterations += 1;
                k_done = k + 1;
                let estimate = self.g[k + 1].abs();
                if self.config.verbose {
                    tracing::trace!(iteration = iterations, residual = estimate.to_config(), "GMRES");
                }
                if estimate <= target || h_next <= tiny || iterations >= self.config.max_iter {
                    break;
                }
            }

            // 回代 H y = g，x += M⁻¹ V y
            let mut y = vec![S::ZERO; k_done];
            for i in (0..k_done).rev() {
                let mut sum = self.g[i];
                for (j, &yj) in y.iter().enumerate().skip(i + 1) {
                    sum -= self.hessenberg[i * m + j] * yj;
                }
                let hii = self.hessenberg[i * m + i];
                if hii.abs() <= tiny {
                    return SolverResult::new(SolverStatus::Stagnated, iterations, beta, initial);
                }
                y[i] = sum / hii;
            }
            self.w.fill(S::ZERO);
            for (i, &yi) in y.iter().enumerate() {
                axpy(yi, &self.basis[i], &mut self.w);
            }
            precond.apply(&self.w, &mut self.z);
            axpy(S::ONE, &self.z, x);

            matrix.residual(b, x, &mut self.r);
            beta = norm2(&self.r);
            if beta <= target {
                return SolverResult::new(SolverStatus::Converged, iterations, beta, initial);
            }
            if !beta.is_finite() || beta > initial * S::from_config(DIVERGENCE_FACTOR) {
                return SolverResult::new(SolverStatus::Diverged, iterations, beta, initial);
            }
        }

        SolverResult::new(SolverStatus::MaxIterationsReached, iterations, beta, initial)
    }

    fn name(&self) -> &'static str {
        "GMRES"
    }
}

// ============================================================================
// BiCGStab
// ============================================================================

/// 预条件 BiCGStab
pub struct BiCgStabSolver<S: RuntimeScalar> {
    config: SolverConfig,
    r: Vec<S>,
    r0: Vec<S>,
    p: Vec<S>,
    v: Vec<S>,
    s: Vec<S>,
    t: Vec<S>,
    p_hat: Vec<S>,
    s_hat: Vec<S>,
}

impl<S: RuntimeScalar> BiCgStabSolver<S> {
    /// 创建求解器
    pub fn new(config: SolverConfig) -> Self {
        Self {
            config,
            r: Vec::new(),
            r0: Vec::new(),
            p: Vec::new(),
            v: Vec::new(),
            s: Vec::new(),
            t: Vec::new(),
            p_hat: Vec::new(),
            s_hat: Vec::new(),
        }
    }

    fn ensure_workspace(&mut self, n: usize) {
        if self.r.len() != n {
            self.r = vec![S::ZERO; n];
            self.r0 = vec![S::ZERO; n];
            self.p = vec![S::ZERO; n];
            self.v = vec![S::ZERO; n];
            self.s = vec![S::ZERO; n];
            self.t = vec![S::ZERO; n];
            self.p_hat = vec![S::ZERO; n];
            self.s_hat = vec![S::ZERO; n];
        }
    }
}

impl<S: RuntimeScalar> IterativeSolver<S> for BiCgStabSolver<S> {
    fn solve<P: Preconditioner<S> + ?Sized>(
        &mut self,
        matrix: &CsrMatrix<S>,
        b: &[S],
        x: &mut [S],
        precond: &P,
    ) -> SolverResult<S> {
        let n = b.len();
        self.ensure_workspace(n);
        let rtol = S::from_config(self.config.rtol);
        let atol = S::from_config(self.config.atol);
        let breakdown = S::from_config(1e-30);

        matrix.residual(b, x, &mut self.r);
        let initial = norm2(&self.r);
        if initial <= atol {
            return SolverResult::new(SolverStatus::Converged, 0, initial, initial);
        }
        copy(&self.r, &mut self.r0);
        self.p.fill(S::ZERO);
        self.v.fill(S::ZERO);

        let mut rho_old = S::ONE;
        let mut alpha = S::ONE;
        let mut omega = S::ONE;
        let mut res_norm = initial;

        for iter in 0..self.config.max_iter {
            let rho = dot(&self.r0, &self.r);
            if rho.abs() < breakdown {
                return SolverResult::new(SolverStatus::Stagnated, iter, res_norm, initial);
            }
            let beta = if iter == 0 {
                S::ZERO
            } else {
                (rho / rho_old) * (alpha / omega)
            };
            rho_old = rho;

            // p = r + β (p - ω v)
            for i in 0..n {
                self.p[i] = self.r[i] + beta * (self.p[i] - omega * self.v[i]);
            }
            precond.apply(&self.p, &mut self.p_hat);
            matrix.apply(&self.p_hat, &mut self.v);

            let r0v = dot(&self.r0, &self.v);
            if r0v.abs() < breakdown {
                return SolverResult::new(SolverStatus::Stagnated, iter, res_norm, initial);
            }
            alpha = rho / r0v;

            for i in 0..n {
                self.s[i] = self.r[i] - alpha * self.v[i];
            }
            let s_norm = norm2(&self.s);
            if s_norm <= atol || s_norm / initial <= rtol {
                axpy(alpha, &self.p_hat, x);
                return SolverResult::new(SolverStatus::Converged, iter + 1, s_norm, initial);
            }

            precond.apply(&self.s, &mut self.s_hat);
            matrix.apply(&self.s_hat, &mut self.t);
            let tt = dot(&self.t, &self.t);
            omega = if tt > breakdown { dot(&self.t, &self.s) / tt } else { S::ZERO };
            if omega.abs() < breakdown {
                axpy(alpha, &self.p_hat, x);
                return SolverResult::new(SolverStatus::Stagnated, iter + 1, s_norm, initial);
            }

            axpy(alpha, &self.p_hat, x);
            axpy(omega, &self.s_hat, x);
            for i in 0..n {
                self.r[i] = self.s[i] - omega * self.t[i];
            }

            res_norm = norm2(&self.r);
            if self.config.verbose {
                tracing::trace!(iteration = iter + 1, residual = res_norm.to_config(), "BiCGStab");
            }
            if res_norm <= atol || res_norm / initial <= rtol {
                return SolverResult::new(SolverStatus::Converged, iter + 1, res_norm, initial);
            }
            if !res_norm.is_finite() || res_norm > initial * S::from_config(DIVERGENCE_FACTOR) {
                return SolverResult::new(SolverStatus::Diverged, iter + 1, res_norm, initial);
            }
        }

        SolverResult::new(SolverStatus::MaxIterationsReached, self.config.max_iter, res_norm, initial)
    }

    fn name(&self) -> &'static str {
        "BiCGStab"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linear_algebra::amg::AmgPreconditioner;
    use crate::linear_algebra::csr::CsrBuilder;
    use crate::linear_algebra::preconditioner::{IdentityPreconditioner, JacobiPreconditioner};

    /// 非对称对流扩散三对角矩阵
    fn convection_diffusion(n: usize) -> CsrMatrix<f64> {
        let mut b = CsrBuilder::new_square(n);
        for i in 0..n {
            b.add(i, i, 2.5);
            if i > 0 {
                b.add(i, i - 1, -1.3);
            }
            if i + 1 < n {
                b.add(i, i + 1, -0.7);
            }
        }
        b.build()
    }

    fn check_solution(a: &CsrMatrix<f64>, b: &[f64], x: &[f64], tol: f64) {
        let mut r = vec![0.0; b.len()];
        a.residual(b, x, &mut r);
        assert!(norm2(&r) < tol * norm2(b), "residual {}", norm2(&r));
    }

    #[test]
    fn test_gmres_identity_precond() {
        let a = convection_diffusion(50);
        let b: Vec<f64> = (0..50).map(|i| (i as f64 * 0.1).cos()).collect();
        let mut x = vec![0.0; 50];
        let mut solver = GmresSolver::new(SolverConfig::new(1e-10, 500), 10);
        let result = solver.solve(&a, &b, &mut x, &IdentityPreconditioner);
        assert!(result.is_converged(), "{result:?}");
        check_solution(&a, &b, &x, 1e-9);
    }

    #[test]
    fn test_gmres_with_amg() {
        let n = 300;
        let a = convection_diffusion(n);
        let b = vec![1.0; n];
        let mut x = vec![0.0; n];
        let settings = AmgSettings {
            coarse_size: 10,
            ..Default::default()
        };
        let amg = AmgPreconditioner::new(&a, &settings).unwrap();
        let mut solver = GmresSolver::new(SolverConfig::new(1e-10, 300), 30);
        let result = solver.solve(&a, &b, &mut x, &amg);
        assert!(result.is_converged(), "{result:?}");
        check_solution(&a, &b, &x, 1e-9);
    }

    #[test]
    fn test_bicgstab_jacobi() {
        let a = convection_diffusion(80);
        let b: Vec<f64> = (0..80).map(|i| i as f64).collect();
        let mut x = vec![0.0; 80];
        let precond = JacobiPreconditioner::from_matrix(&a);
        let mut solver = BiCgStabSolver::new(SolverConfig::new(1e-10, 500));
        let result = solver.solve(&a, &b, &mut x, &precond);
        assert!(result.is_converged(), "{result:?}");
        check_solution(&a, &b, &x, 1e-8);
        assert_eq!(solver.name(), "BiCGStab");
    }

    #[test]
    fn test_zero_rhs_converges_immediately() {
        let a = convection_diffusion(5);
        let mut x = vec![0.0; 5];
        let mut solver = GmresSolver::new(SolverConfig::default(), 5);
        let result = solver.solve(&a, &[0.0; 5], &mut x, &IdentityPreconditioner);
        assert!(result.is_converged());
        assert_eq!(result.iterations, 0);
    }

    #[test]
    fn test_max_iterations() {
        let a = convection_diffusion(100);
        let b = vec![1.0; 100];
        let mut x = vec![0.0; 100];
        let mut solver = GmresSolver::new(SolverConfig::new(1e-14, 3), 2);
        let result = solver.solve(&a, &b, &mut x, &IdentityPreconditioner);
        assert_eq!(result.status, SolverStatus::MaxIterationsReached);
        assert_eq!(result.iterations, 3);
    }

    #[test]
    fn test_settings_default_and_serde() {
        let settings = LinearSolverSettings::default();
        assert_eq!(settings.method, KrylovMethod::Gmres { restart: 30 });
        assert_eq!(settings.preconditioner, PreconditionerKind::Amg);
        assert!(settings.check().is_ok());

        let json = serde_json::to_string(&settings).unwrap();
        let back: LinearSolverSettings = serde_json::from_str(&json).unwrap();
        assert_eq!(back, settings);

        let partial: LinearSolverSettings =
            serde_json::from_str(r#"{"method": "bi_cg_stab", "preconditioner": "jacobi"}"#).unwrap();
        assert_eq!(partial.method, KrylovMethod::BiCgStab);
        assert_eq!(partial.max_iter, settings.max_iter);
    }

    #[test]
    fn test_settings_check() {
        let mut settings = LinearSolverSettings {
            method: KrylovMethod::Gmres { restart: 0 },
            ..Default::default()
        };
        assert!(settings.check().is_err());
        settings.method = KrylovMethod::BiCgStab;
        settings.amg.jacobi_omega = 2.5;
        assert!(settings.check().is_err());
    }
}
