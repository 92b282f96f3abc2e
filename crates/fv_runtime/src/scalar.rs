// crates/fv_runtime/src/scalar.rs

//! RuntimeScalar - 密封的标量类型抽象
//!
//! 提供编译期精度选择的唯一接口，场容器、插值与算子组装在 f32 和 f64
//! 之间零成本切换。
//!
//! # 设计原则
//!
//! 1. **密封 Trait**: 只有 f32 和 f64 可以实现（通过 private::Sealed）
//! 2. **零成本抽象**: `#[inline]` + 编译期单态化
//! 3. **原子累加**: 每个标量类型绑定一个同宽度的原子整数类型，
//!    以位模式上的 compare-exchange 循环实现浮点原子加法
//!
//! # 使用规范
//!
//! ```rust
//! use fv_runtime::RuntimeScalar;
//!
//! fn conductance<S: RuntimeScalar>(area: S, diffusivity: S, delta: S) -> S {
//!     area * diffusivity / delta
//! }
//! assert_eq!(conductance(2.0f64, 3.0, 1.5), 4.0);
//! ```

use std::fmt::{Debug, Display, LowerExp};
use std::iter::Sum;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use bytemuck::Pod;
use num_traits::{Float, FromPrimitive, NumAssign, ToPrimitive};

/// 密封模块，禁止外部实现
mod private {
    /// 密封 trait
    pub trait Sealed {}
    impl Sealed for f32 {}
    impl Sealed for f64 {}
}

/// 运行时标量类型（密封，仅 f32/f64 可实现）
///
/// # 实现类型
///
/// - `f32`: 内存占用减半，适合超大规模网格
/// - `f64`: 高精度模式（默认），适合验证与守恒检查
pub trait RuntimeScalar:
    private::Sealed
    + Pod
    + Float
    + FromPrimitive
    + ToPrimitive
    + NumAssign
    + Debug
    + Display
    + LowerExp
    + Send
    + Sync
    + Sum
    + Default
    + 'static
{
    /// 零值
    const ZERO: Self;
    /// 一
    const ONE: Self;
    /// 二分之一
    const HALF: Self;
    /// 机器精度
    const EPSILON: Self;
    /// 最小正值
    const MIN_POSITIVE: Self;

    /// 同宽度原子类型
    type Atomic: Send + Sync;

    /// 类型名称（日志用）
    const NAME: &'static str;

    /// 从配置层的 f64 转换
    fn from_config(v: f64) -> Self;

    /// 转换为 f64（诊断/日志用）
    fn to_config(self) -> f64;

    /// 从位模式构造
    fn from_bits_atomic(atomic: &Self::Atomic) -> Self;

    /// 原子加法：`*slot += v`
    ///
    /// 使用 compare-exchange 循环，任意多个线程并发累加到同一槽位不会丢失更新。
    fn atomic_add(slot: &Self::Atomic, v: Self);

    /// 安全除法
    ///
    /// 当除数绝对值小于 MIN_POSITIVE 时返回 fallback
    #[inline]
    fn safe_div(self, rhs: Self, fallback: Self) -> Self {
        if rhs.abs() < Self::MIN_POSITIVE {
            fallback
        } else {
            self / rhs
        }
    }
}

impl RuntimeScalar for f32 {
    const ZERO: Self = 0.0;
    const ONE: Self = 1.0;
    const HALF: Self = 0.5;
    const EPSILON: Self = f32::EPSILON;
    const MIN_POSITIVE: Self = f32::MIN_POSITIVE;
    const NAME: &'static str = "f32";

    type Atomic = AtomicU32;

    #[inline]
    fn from_config(v: f64) -> Self {
        v as f32
    }

    #[inline]
    fn to_config(self) -> f64 {
        self as f64
    }

    #[inline]
    fn from_bits_atomic(atomic: &AtomicU32) -> Self {
        f32::from_bits(atomic.load(Ordering::Relaxed))
    }

    #[inline]
    fn atomic_add(slot: &AtomicU32, v: Self) {
        let mut old = slot.load(Ordering::Relaxed);
        loop {
            let new = (f32::from_bits(old) + v).to_bits();
            match slot.compare_exchange_weak(old, new, Ordering::Relaxed, Ordering::Relaxed) {
                Ok(_) => break,
                Err(x) => old = x,
            }
        }
    }
}

impl RuntimeScalar for f64 {
    const ZERO: Self = 0.0;
    const ONE: Self = 1.0;
    const HALF: Self = 0.5;
    const EPSILON: Self = f64::EPSILON;
    const MIN_POSITIVE: Self = f64::MIN_POSITIVE;
    const NAME: &'static str = "f64";

    type Atomic = AtomicU64;

    #[inline]
    fn from_config(v: f64) -> Self {
        v
    }

    #[inline]
    fn to_config(self) -> f64 {
        self
    }

    #[inline]
    fn from_bits_atomic(atomic: &AtomicU64) -> Self {
        f64::from_bits(atomic.load(Ordering::Relaxed))
    }

    #[inline]
    fn atomic_add(slot: &AtomicU64, v: Self) {
        let mut old = slot.load(Ordering::Relaxed);
        loop {
            let new = (f64::from_bits(old) + v).to_bits();
            match slot.compare_exchange_weak(old, new, Ordering::Relaxed, Ordering::Relaxed) {
                Ok(_) => break,
                Err(x) => old = x,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn generic_sum<S: RuntimeScalar>(values: &[f64]) -> S {
        values.iter().map(|&v| S::from_config(v)).sum()
    }

    #[test]
    fn test_constants() {
        assert_eq!(<f64 as RuntimeScalar>::ZERO, 0.0);
        assert_eq!(<f32 as RuntimeScalar>::ONE, 1.0);
        assert_eq!(<f64 as RuntimeScalar>::NAME, "f64");
    }

    #[test]
    fn test_generic_sum() {
        let s64: f64 = generic_sum(&[1.0, 2.0, 3.5]);
        let s32: f32 = generic_sum(&[1.0, 2.0, 3.5]);
        assert!((s64 - 6.5).abs() < 1e-12);
        assert!((s32 - 6.5).abs() < 1e-6);
    }

    #[test]
    fn test_atomic_add_f64() {
        let slot = AtomicU64::new(1.5f64.to_bits());
        f64::atomic_add(&slot, 2.25);
        assert_eq!(f64::from_bits_atomic(&slot), 3.75);
    }

    #[test]
    fn test_atomic_add_f32() {
        let slot = AtomicU32::new(0.0f32.to_bits());
        f32::atomic_add(&slot, 0.5);
        f32::atomic_add(&slot, 0.25);
        assert_eq!(f32::from_bits_atomic(&slot), 0.75);
    }

    #[test]
    fn test_safe_div() {
        assert_eq!(1.0f64.safe_div(0.0, -1.0), -1.0);
        assert_eq!(1.0f64.safe_div(4.0, -1.0), 0.25);
    }
}
