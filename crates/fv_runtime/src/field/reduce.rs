// crates/fv_runtime/src/field/reduce.rs

//! 场归约：补偿求和与诊断统计

use std::fmt;

use crate::scalar::RuntimeScalar;

/// Kahan 补偿求和
///
/// 并行归约时每个分块各自累加，再用 [`KahanSum::merge`] 合并。
#[derive(Debug, Clone, Copy, Default)]
pub struct KahanSum<S: RuntimeScalar> {
    sum: S,
    compensation: S,
}

impl<S: RuntimeScalar> KahanSum<S> {
    /// 创建新的求和器
    pub fn new() -> Self {
        Self {
            sum: S::ZERO,
            compensation: S::ZERO,
        }
    }

    /// 添加一个值
    #[inline]
    pub fn add(&mut self, value: S) {
        let y = value - self.compensation;
        let t = self.sum + y;
        self.compensation = (t - self.sum) - y;
        self.sum = t;
    }

    /// 合并另一个部分和
    #[inline]
    pub fn merge(mut self, other: Self) -> Self {
        self.add(other.sum);
        self.add(-other.compensation);
        self
    }

    /// 当前求和值
    #[inline]
    pub fn value(&self) -> S {
        self.sum
    }

    /// 从迭代器求和
    pub fn sum_iter<I: IntoIterator<Item = S>>(iter: I) -> S {
        let mut kahan = Self::new();
        for v in iter {
            kahan.add(v);
        }
        kahan.value()
    }
}

/// 场分量统计（诊断日志用）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldStats<S: RuntimeScalar> {
    /// 统计的元素数
    pub count: usize,
    /// 分量和
    pub sum: S,
    /// 最小分量
    pub min: S,
    /// 最大分量
    pub max: S,
}

impl<S: RuntimeScalar> FieldStats<S> {
    pub(crate) fn identity() -> Self {
        Self {
            count: 0,
            sum: S::ZERO,
            min: S::infinity(),
            max: S::neg_infinity(),
        }
    }

    pub(crate) fn push(mut self, v: S) -> Self {
        self.count += 1;
        self.sum += v;
        self.min = self.min.min(v);
        self.max = self.max.max(v);
        self
    }

    pub(crate) fn combine(self, other: Self) -> Self {
        Self {
            count: self.count + other.count,
            sum: self.sum + other.sum,
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    /// 均值（空范围为 0）
    pub fn mean(&self) -> S {
        if self.count == 0 {
            S::ZERO
        } else {
            self.sum / S::from_usize(self.count).unwrap_or(S::ONE)
        }
    }
}

impl<S: RuntimeScalar> fmt::Display for FieldStats<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "count={} sum={:e} min={:e} max={:e}",
            self.count, self.sum, self.min, self.max
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kahan_sum() {
        let data = vec![0.1f64; 1000];
        let sum = KahanSum::sum_iter(data.iter().cloned());
        assert!((sum - 100.0).abs() < 1e-10);
    }

    #[test]
    fn test_kahan_merge() {
        let mut a = KahanSum::<f32>::new();
        let mut b = KahanSum::<f32>::new();
        for _ in 0..500 {
            a.add(0.1);
            b.add(0.1);
        }
        let total = a.merge(b).value();
        assert!((total - 100.0).abs() < 1e-4);
    }

    #[test]
    fn test_stats_combine() {
        let a = [1.0f64, -2.0].iter().fold(FieldStats::identity(), |s, &v| s.push(v));
        let b = [5.0f64].iter().fold(FieldStats::identity(), |s, &v| s.push(v));
        let s = a.combine(b);
        assert_eq!(s.count, 3);
        assert_eq!(s.min, -2.0);
        assert_eq!(s.max, 5.0);
        assert!((s.mean() - 4.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_stats_display_both_precisions() {
        let s32 = [1.5f32, -0.25].iter().fold(FieldStats::identity(), |s, &v| s.push(v));
        assert_eq!(s32.to_string(), "count=2 sum=1.25e0 min=-2.5e-1 max=1.5e0");
        let s64 = [1.0e-3f64].iter().fold(FieldStats::identity(), |s, &v| s.push(v));
        assert_eq!(s64.to_string(), "count=1 sum=1e-3 min=1e-3 max=1e-3");
    }
}
