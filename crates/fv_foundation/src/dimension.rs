//! 张量形状描述
//!
//! 场容器的每个主索引条目是一个固定形状 `d1 × d2 × d3` 的张量，
//! 行主序连续存储。`TensorShape` 是该形状的运行时值描述，
//! 在构造时计算各轴步长。
//!
//! ```
//! use fv_foundation::dimension::TensorShape;
//!
//! let shape = TensorShape::new(3, 2, 1);
//! assert_eq!(shape.block(), 6);
//! assert_eq!(shape.strides(), [6, 2, 1, 1]);
//! assert_eq!(shape.offset(2, 1, 1, 0), 15);
//! ```

/// 张量形状（行主序）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TensorShape {
    extents: [usize; 3],
    strides: [usize; 4],
}

impl TensorShape {
    /// 标量形状 `1 × 1 × 1`
    pub const SCALAR: TensorShape = TensorShape::new(1, 1, 1);

    /// 创建形状，计算步长
    ///
    /// # Panics
    /// 任一维度为 0
    pub const fn new(d1: usize, d2: usize, d3: usize) -> Self {
        assert!(d1 > 0 && d2 > 0 && d3 > 0, "张量维度必须大于 0");
        let s3 = 1;
        let s2 = d3 * s3;
        let s1 = d2 * s2;
        let s0 = d1 * s1;
        Self {
            extents: [d1, d2, d3],
            strides: [s0, s1, s2, s3],
        }
    }

    /// 各轴维度
    #[inline]
    pub const fn extents(&self) -> [usize; 3] {
        self.extents
    }

    /// 步长：`[主索引, 轴1, 轴2, 轴3]`
    #[inline]
    pub const fn strides(&self) -> [usize; 4] {
        self.strides
    }

    /// 单个条目的元素数
    #[inline]
    pub const fn block(&self) -> usize {
        self.strides[0]
    }

    /// 线性偏移
    #[inline(always)]
    pub const fn offset(&self, i: usize, j: usize, k: usize, l: usize) -> usize {
        i * self.strides[0] + j * self.strides[1] + k * self.strides[2] + l * self.strides[3]
    }

    /// `n` 个条目所需元素数
    #[inline]
    pub const fn len_for(&self, n: usize) -> usize {
        n * self.strides[0]
    }

    /// 是否为标量形状
    #[inline]
    pub const fn is_scalar(&self) -> bool {
        self.strides[0] == 1
    }
}

impl Default for TensorShape {
    fn default() -> Self {
        Self::SCALAR
    }
}

impl std::fmt::Display for TensorShape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}x{}", self.extents[0], self.extents[1], self.extents[2])
    }
}
