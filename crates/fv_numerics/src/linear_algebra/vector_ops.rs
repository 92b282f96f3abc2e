// crates/fv_numerics/src/linear_algebra/vector_ops.rs

//! 向量运算（BLAS Level 1 风格）
//!
//! - [`dot`]: x·y
//! - [`norm2`]: ‖x‖₂
//! - [`axpy`]: y = αx + y
//! - [`xpay`]: y = x + αy
//! - [`scale`]: x = αx
//! - [`copy`] / [`fill`]

use fv_runtime::RuntimeScalar;

/// 点积
#[inline]
pub fn dot<S: RuntimeScalar>(x: &[S], y: &[S]) -> S {
    debug_assert_eq!(x.len(), y.len());
    x.iter().zip(y).fold(S::ZERO, |acc, (&a, &b)| acc + a * b)
}

/// 二范数
#[inline]
pub fn norm2<S: RuntimeScalar>(x: &[S]) -> S {
    dot(x, x).sqrt()
}

/// y = αx + y
#[inline]
pub fn axpy<S: RuntimeScalar>(alpha: S, x: &[S], y: &mut [S]) {
    debug_assert_eq!(x.len(), y.len());
    for (yi, &xi) in y.iter_mut().zip(x) {
        *yi += alpha * xi;
    }
}

/// y = x + αy
#[inline]
pub fn xpay<S: RuntimeScalar>(x: &[S], alpha: S, y: &mut [S]) {
    debug_assert_eq!(x.len(), y.len());
    for (yi, &xi) in y.iter_mut().zip(x) {
        *yi = xi + alpha * *yi;
    }
}

/// x = αx
#[inline]
pub fn scale<S: RuntimeScalar>(alpha: S, x: &mut [S]) {
    for xi in x {
        *xi *= alpha;
    }
}

/// y = x
#[inline]
pub fn copy<S: RuntimeScalar>(x: &[S], y: &mut [S]) {
    y.copy_from_slice(x);
}

/// x[:] = α
#[inline]
pub fn fill<S: RuntimeScalar>(x: &mut [S], alpha: S) {
    x.fill(alpha);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dot_norm() {
        let x = [1.0f64, 2.0, 3.0];
        let y = [4.0, 5.0, 6.0];
        assert!((dot(&x, &y) - 32.0).abs() < 1e-12);
        assert!((norm2(&[3.0f32, 4.0]) - 5.0).abs() < 1e-6);
    }

    #[test]
    fn test_updates() {
        let x = [1.0f64, 2.0, 3.0];
        let mut y = [4.0, 5.0, 6.0];
        axpy(2.0, &x, &mut y);
        assert_eq!(y, [6.0, 9.0, 12.0]);
        xpay(&x, 0.5, &mut y);
        assert_eq!(y, [4.0, 6.5, 9.0]);
        scale(2.0, &mut y);
        assert_eq!(y, [8.0, 13.0, 18.0]);
        copy(&x, &mut y);
        assert_eq!(y, x);
        fill(&mut y, 0.0);
        assert_eq!(y, [0.0; 3]);
    }
}
