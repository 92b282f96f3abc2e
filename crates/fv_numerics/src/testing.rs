// crates/fv_numerics/src/testing.rs

//! 测试用求解设施
//!
//! [`RecordingBackend`] 记录组装器交出的三元组与布局，求解时只用对角线
//! （`x_i = b_i / a_ii`），因此可以接收跨进程列。可指定在若干次成功求解后失败，
//! 用于检查组装器的错误路径。

use fv_runtime::RuntimeScalar;

use crate::linear_algebra::{LinearSolveBackend, PartitionLayout, SolveError, SolveStats, SparseEntries};

/// 记录型求解设施
#[derive(Debug, Clone)]
pub struct RecordingBackend<S: RuntimeScalar> {
    entries: Option<SparseEntries<S>>,
    layout: Option<PartitionLayout>,
    diagonal: Vec<S>,
    assemble_calls: usize,
    solve_calls: usize,
    fail_after: Option<usize>,
}

impl<S: RuntimeScalar> Default for RecordingBackend<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: RuntimeScalar> RecordingBackend<S> {
    /// 创建
    pub fn new() -> Self {
        Self {
            entries: None,
            layout: None,
            diagonal: Vec::new(),
            assemble_calls: 0,
            solve_calls: 0,
            fail_after: None,
        }
    }

    /// 成功求解 `n` 次后报告 [`SolveError::Breakdown`]
    pub fn fail_after(mut self, n: usize) -> Self {
        self.fail_after = Some(n);
        self
    }

    /// 最近一次组装的三元组
    pub fn entries(&self) -> Option<&SparseEntries<S>> {
        self.entries.as_ref()
    }

    /// 最近一次组装的布局
    pub fn layout(&self) -> Option<&PartitionLayout> {
        self.layout.as_ref()
    }

    /// 本地对角线
    pub fn diagonal(&self) -> &[S] {
        &self.diagonal
    }

    /// 组装调用次数
    pub fn assemble_calls(&self) -> usize {
        self.assemble_calls
    }

    /// 求解调用次数（含失败）
    pub fn solve_calls(&self) -> usize {
        self.solve_calls
    }
}

impl<S: RuntimeScalar> LinearSolveBackend<S> for RecordingBackend<S> {
    fn assemble(&mut self, entries: &SparseEntries<S>, layout: &PartitionLayout) -> Result<(), SolveError> {
        self.assemble_calls += 1;
        let range = layout.local_range();
        let mut diagonal = vec![S::ZERO; range.len()];
        for (row, col, value) in entries.iter() {
            if !range.contains(&row) {
                return Err(SolveError::RowOutOfRange {
                    row,
                    start: range.start,
                    end: range.end,
                });
            }
            if row == col {
                diagonal[row - range.start] += value;
            }
        }
        self.diagonal = diagonal;
        self.entries = Some(entries.clone());
        self.layout = Some(layout.clone());
        Ok(())
    }

    fn solve(&mut self, rhs: &[S], solution: &mut [S]) -> Result<SolveStats, SolveError> {
        self.solve_calls += 1;
        if self.entries.is_none() {
            return Err(SolveError::NotAssembled);
        }
        let n = self.diagonal.len();
        for len in [rhs.len(), solution.len()] {
            if len != n {
                return Err(SolveError::DimensionMismatch { expected: n, actual: len });
            }
        }
        if self.fail_after.is_some_and(|limit| self.solve_calls > limit) {
            return Err(SolveError::Breakdown { iterations: 0 });
        }
        for ((x, &b), &d) in solution.iter_mut().zip(rhs).zip(&self.diagonal) {
            *x = b.safe_div(d, b);
        }
        Ok(SolveStats {
            iterations: 1,
            residual_norm: 0.0,
            relative_residual: 0.0,
        })
    }

    fn name(&self) -> &'static str {
        "Recording"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diagonal_solve_and_failure_injection() {
        let mut entries = SparseEntries::new();
        entries.add(3, 3, 2.0f64);
        entries.add(3, 9, -1.0);
        entries.add(4, 4, 4.0);
        let layout = PartitionLayout::new(1, &[3, 2]).unwrap();

        let mut backend = RecordingBackend::new().fail_after(1);
        backend.assemble(&entries, &layout).unwrap();
        assert_eq!(backend.diagonal(), &[2.0, 4.0]);

        let mut x = [0.0; 2];
        backend.solve(&[2.0, 2.0], &mut x).unwrap();
        assert_eq!(x, [1.0, 0.5]);
        assert_eq!(
            backend.solve(&[2.0, 2.0], &mut x),
            Err(SolveError::Breakdown { iterations: 0 })
        );
        assert_eq!(backend.solve_calls(), 2);
    }

    #[test]
    fn test_rejects_foreign_rows() {
        let mut entries = SparseEntries::new();
        entries.add(0, 0, 1.0f64);
        let layout = PartitionLayout::new(1, &[1, 1]).unwrap();
        let mut backend = RecordingBackend::new();
        assert!(matches!(
            backend.assemble(&entries, &layout),
            Err(SolveError::RowOutOfRange { row: 0, .. })
        ));
    }
}
