// crates/fv_numerics/src/linear_algebra/csr.rs

//! 压缩稀疏行（CSR）矩阵
//!
//! - `row_ptr`: 长度 `n_rows + 1`，`row_ptr[i]` 是第 i 行首个非零元的位置
//! - `col_idx`: 列索引，每行内升序
//! - `values`: 非零元值
//!
//! # 特性开关
//!
//! - `parallel`: 启用基于 `rayon` 的并行矩阵-向量乘法
//!
//! ```
//! use fv_numerics::linear_algebra::CsrBuilder;
//!
//! let mut builder = CsrBuilder::<f64>::new_square(2);
//! builder.add(0, 0, 2.0);
//! builder.add(0, 0, 1.0);
//! builder.add(1, 0, -1.0);
//! builder.add(1, 1, 4.0);
//! let a = builder.build();
//!
//! let mut y = [0.0; 2];
//! a.mul_vec(&[1.0, 1.0], &mut y);
//! assert_eq!(y, [3.0, 3.0]);
//! ```

use std::collections::BTreeMap;

use fv_runtime::RuntimeScalar;

use rayon::prelude::*;

// =============================================================================
// 稀疏模式
// =============================================================================

/// CSR 矩阵的稀疏结构
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsrPattern {
    n_rows: usize,
    n_cols: usize,
    row_ptr: Vec<usize>,
    col_idx: Vec<usize>,
}

impl CsrPattern {
    /// 行数
    #[inline]
    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    /// 列数
    #[inline]
    pub fn n_cols(&self) -> usize {
        self.n_cols
    }

    /// 非零元数量
    #[inline]
    pub fn nnz(&self) -> usize {
        self.col_idx.len()
    }

    /// 第 row 行的列索引
    #[inline]
    pub fn row_indices(&self, row: usize) -> &[usize] {
        &self.col_idx[self.row_ptr[row]..self.row_ptr[row + 1]]
    }

    /// 查找 (row, col) 在值数组中的位置
    pub fn find_index(&self, row: usize, col: usize) -> Option<usize> {
        let start = self.row_ptr[row];
        self.row_indices(row)
            .binary_search(&col)
            .ok()
            .map(|local| start + local)
    }
}

// =============================================================================
// CSR 矩阵
// =============================================================================

/// CSR 格式稀疏矩阵
#[derive(Debug, Clone)]
pub struct CsrMatrix<S: RuntimeScalar> {
    pattern: CsrPattern,
    values: Vec<S>,
}

impl<S: RuntimeScalar> CsrMatrix<S> {
    /// 从原始数组创建
    ///
    /// 调用方保证 `row_ptr` 单调、末尾等于 `col_idx.len()`，且每行列索引升序。
    pub fn from_raw(
        n_rows: usize,
        n_cols: usize,
        row_ptr: Vec<usize>,
        col_idx: Vec<usize>,
        values: Vec<S>,
    ) -> Self {
        debug_assert_eq!(row_ptr.len(), n_rows + 1, "row_ptr 长度必须为 n_rows + 1");
        debug_assert_eq!(col_idx.len(), values.len(), "col_idx 与 values 长度必须相等");
        debug_assert_eq!(row_ptr[n_rows], col_idx.len(), "row_ptr 末尾必须等于 nnz");
        Self {
            pattern: CsrPattern {
                n_rows,
                n_cols,
                row_ptr,
                col_idx,
            },
            values,
        }
    }

    /// 单位矩阵
    pub fn identity(n: usize) -> Self {
        Self::from_raw(n, n, (0..=n).collect(), (0..n).collect(), vec![S::ONE; n])
    }

    /// 行数
    #[inline]
    pub fn n_rows(&self) -> usize {
        self.pattern.n_rows
    }

    /// 列数
    #[inline]
    pub fn n_cols(&self) -> usize {
        self.pattern.n_cols
    }

    /// 非零元数量
    #[inline]
    pub fn nnz(&self) -> usize {
        self.values.len()
    }

    /// 稀疏结构
    #[inline]
    pub fn pattern(&self) -> &CsrPattern {
        &self.pattern
    }

    /// 值数组
    #[inline]
    pub fn values(&self) -> &[S] {
        &self.values
    }

    /// (row, col) 处的值，不存在时为零
    #[inline]
    pub fn get(&self, row: usize, col: usize) -> S {
        self.pattern
            .find_index(row, col)
            .map_or(S::ZERO, |idx| self.values[idx])
    }

    /// 第 row 行的非零元视图
    #[inline]
    pub fn row(&self, row: usize) -> RowView<'_, S> {
        let start = self.pattern.row_ptr[row];
        let end = self.pattern.row_ptr[row + 1];
        RowView {
            col_idx: &self.pattern.col_idx[start..end],
            values: &self.values[start..end],
        }
    }

    /// 第 row 行的对角元
    #[inline]
    pub fn diagonal_value(&self, row: usize) -> Option<S> {
        self.pattern.find_index(row, row).map(|idx| self.values[idx])
    }

    /// 对角线（缺失处为零）
    pub fn extract_diagonal(&self) -> Vec<S> {
        (0..self.n_rows())
            .map(|i| self.diagonal_value(i).unwrap_or(S::ZERO))
            .collect()
    }

    #[inline]
    fn row_dot(&self, row: usize, x: &[S]) -> S {
        let start = self.pattern.row_ptr[row];
        let end = self.pattern.row_ptr[row + 1];
        let mut sum = S::ZERO;
        for idx in start..end {
            sum += self.values[idx] * x[self.pattern.col_idx[idx]];
        }
        sum
    }

    /// y = A x
    ///
    /// # Panics
    /// 向量长度与矩阵维度不符
    pub fn mul_vec(&self, x: &[S], y: &mut [S]) {
        assert_eq!(x.len(), self.n_cols(), "x 长度必须等于矩阵列数");
        assert_eq!(y.len(), self.n_rows(), "y 长度必须等于矩阵行数");
        for (row, out) in y.iter_mut().enumerate() {
            *out = self.row_dot(row, x);
        }
    }

    /// 并行 y = A x
    ///
    /// # Panics
    /// 向量长度与矩阵维度不符
    pub fn mul_vec_parallel(&self, x: &[S], y: &mut [S]) {
        assert_eq!(x.len(), self.n_cols(), "x 长度必须等于矩阵列数");
        assert_eq!(y.len(), self.n_rows(), "y 长度必须等于矩阵行数");
        y.par_iter_mut()
            .enumerate()
            .for_each(|(row, out)| *out = self.row_dot(row, x));
    }

    /// 自动选择串行或并行的 y = A x
    #[inline]
    pub fn apply(&self, x: &[S], y: &mut [S]) {
        if self.n_rows() >= PARALLEL_ROWS {
            self.mul_vec_parallel(x, y);
            return;
        }
        self.mul_vec(x, y);
    }

    /// r = b - A x
    pub fn residual(&self, b: &[S], x: &[S], r: &mut [S]) {
        self.apply(x, r);
        for (ri, &bi) in r.iter_mut().zip(b) {
            *ri = bi - *ri;
        }
    }
}

/// 行数不少于此值时 [`CsrMatrix::apply`] 走并行路径
const PARALLEL_ROWS: usize = 2048;

// =============================================================================
// 行视图
// =============================================================================

/// 矩阵某一行的只读视图
pub struct RowView<'a, S: RuntimeScalar> {
    col_idx: &'a [usize],
    values: &'a [S],
}

impl<'a, S: RuntimeScalar> RowView<'a, S> {
    /// 列索引
    #[inline]
    pub fn col_indices(&self) -> &'a [usize] {
        self.col_idx
    }

    /// 值
    #[inline]
    pub fn values(&self) -> &'a [S] {
        self.values
    }

    /// 非零元数量
    #[inline]
    pub fn nnz(&self) -> usize {
        self.values.len()
    }

    /// 迭代 (列, 值)
    pub fn iter(&self) -> impl Iterator<Item = (usize, S)> + 'a {
        self.col_idx.iter().copied().zip(self.values.iter().copied())
    }
}

// =============================================================================
// 构建器
// =============================================================================

/// CSR 构建器
///
/// 每行一个 `BTreeMap`，重复位置累加，构建时列索引天然有序。
#[derive(Debug, Clone)]
pub struct CsrBuilder<S: RuntimeScalar> {
    n_cols: usize,
    rows: Vec<BTreeMap<usize, S>>,
}

impl<S: RuntimeScalar> CsrBuilder<S> {
    /// 方阵构建器
    #[inline]
    pub fn new_square(n: usize) -> Self {
        Self::new(n, n)
    }

    /// `n_rows × n_cols` 构建器
    pub fn new(n_rows: usize, n_cols: usize) -> Self {
        Self {
            n_cols,
            rows: vec![BTreeMap::new(); n_rows],
        }
    }

    /// 覆盖写入 (row, col)
    ///
    /// # Panics
    /// 下标越界
    pub fn set(&mut self, row: usize, col: usize, value: S) {
        assert!(col < self.n_cols, "列索引越界");
        self.rows[row].insert(col, value);
    }

    /// 累加到 (row, col)
    ///
    /// # Panics
    /// 下标越界
    pub fn add(&mut self, row: usize, col: usize, value: S) {
        assert!(col < self.n_cols, "列索引越界");
        *self.rows[row].entry(col).or_insert(S::ZERO) += value;
    }

    /// 当前非零元数量
    #[inline]
    pub fn nnz(&self) -> usize {
        self.rows.iter().map(BTreeMap::len).sum()
    }

    /// 构建矩阵
    pub fn build(self) -> CsrMatrix<S> {
        let n_rows = self.rows.len();
        let nnz = self.nnz();
        let mut row_ptr = Vec::with_capacity(n_rows + 1);
        let mut col_idx = Vec::with_capacity(nnz);
        let mut values = Vec::with_capacity(nnz);
        row_ptr.push(0);
        for row in self.rows {
            for (col, val) in row {
                col_idx.push(col);
                values.push(val);
            }
            row_ptr.push(col_idx.len());
        }
        CsrMatrix::from_raw(n_rows, self.n_cols, row_ptr, col_idx, values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tridiag(n: usize) -> CsrMatrix<f64> {
        let mut b = CsrBuilder::new_square(n);
        for i in 0..n {
            b.add(i, i, 2.0);
            if i > 0 {
                b.add(i, i - 1, -1.0);
            }
            if i + 1 < n {
                b.add(i, i + 1, -1.0);
            }
        }
        b.build()
    }

    #[test]
    fn test_builder_accumulates() {
        let mut b = CsrBuilder::<f64>::new(2, 3);
        b.add(0, 2, 1.0);
        b.add(0, 2, 0.5);
        b.set(1, 0, 4.0);
        b.set(1, 0, 3.0);
        assert_eq!(b.nnz(), 2);
        let m = b.build();
        assert_eq!(m.get(0, 2), 1.5);
        assert_eq!(m.get(1, 0), 3.0);
        assert_eq!(m.get(1, 1), 0.0);
        assert_eq!(m.n_cols(), 3);
    }

    #[test]
    fn test_row_view_sorted() {
        let mut b = CsrBuilder::<f64>::new_square(3);
        b.add(1, 2, 3.0);
        b.add(1, 0, 1.0);
        b.add(1, 1, 2.0);
        let m = b.build();
        let row: Vec<_> = m.row(1).iter().collect();
        assert_eq!(row, vec![(0, 1.0), (1, 2.0), (2, 3.0)]);
        assert_eq!(m.row(0).nnz(), 0);
    }

    #[test]
    fn test_mul_vec_and_residual() {
        let m = tridiag(4);
        let x = [1.0, 2.0, 3.0, 4.0];
        let mut y = [0.0; 4];
        m.mul_vec(&x, &mut y);
        assert_eq!(y, [0.0, 0.0, 0.0, 5.0]);

        let mut r = [0.0; 4];
        m.residual(&[1.0, 1.0, 1.0, 1.0], &x, &mut r);
        assert_eq!(r, [1.0, 1.0, 1.0, -4.0]);
    }

    #[test]
    fn test_parallel_matches_serial() {
        let m = tridiag(5000);
        let x: Vec<f64> = (0..5000).map(|i| (i as f64).sin()).collect();
        let mut a = vec![0.0; 5000];
        let mut b = vec![0.0; 5000];
        m.mul_vec(&x, &mut a);
        m.mul_vec_parallel(&x, &mut b);
        assert_eq!(a, b);
    }

    #[test]
    fn test_diagonal() {
        let m = tridiag(3);
        assert_eq!(m.extract_diagonal(), vec![2.0; 3]);
        let id = CsrMatrix::<f32>::identity(3);
        assert_eq!(id.diagonal_value(2), Some(1.0));
        assert_eq!(id.nnz(), 3);
    }
}
