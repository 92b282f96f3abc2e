// crates/fv_numerics/src/linear_algebra/entries.rs

//! 分布式稀疏系统的装配数据
//!
//! - [`SparseEntries`]: (行, 列, 值) 三元组，同一位置的重复项相加
//! - [`OwnershipRanges`]: 每个进程拥有的全局行区间，行与列编号一致
//! - [`PartitionLayout`]: 本进程号 + 全部进程的行区间

use std::collections::BTreeMap;
use std::ops::Range;

use fv_runtime::RuntimeScalar;

use super::backend::SolveError;

/// 稀疏三元组集合（累加语义）
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SparseEntries<S: RuntimeScalar> {
    triplets: Vec<(usize, usize, S)>,
}

impl<S: RuntimeScalar> SparseEntries<S> {
    /// 空集合
    pub fn new() -> Self {
        Self {
            triplets: Vec::new(),
        }
    }

    /// 预留容量
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            triplets: Vec::with_capacity(capacity),
        }
    }

    /// 追加 (row, col, value)
    #[inline]
    pub fn add(&mut self, row: usize, col: usize, value: S) {
        self.triplets.push((row, col, value));
    }

    /// 合并另一组三元组
    pub fn extend(&mut self, other: SparseEntries<S>) {
        self.triplets.extend(other.triplets);
    }

    /// 三元组个数（含重复位置）
    #[inline]
    pub fn len(&self) -> usize {
        self.triplets.len()
    }

    /// 是否为空
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.triplets.is_empty()
    }

    /// 迭代原始三元组
    pub fn iter(&self) -> impl Iterator<Item = (usize, usize, S)> + '_ {
        self.triplets.iter().copied()
    }

    /// (row, col) 处累加后的值
    pub fn get(&self, row: usize, col: usize) -> S {
        self.triplets
            .iter()
            .filter(|&&(r, c, _)| r == row && c == col)
            .fold(S::ZERO, |acc, &(_, _, v)| acc + v)
    }

    /// 按位置累加后的有序映射
    pub fn accumulate(&self) -> BTreeMap<(usize, usize), S> {
        let mut map = BTreeMap::new();
        for &(r, c, v) in &self.triplets {
            *map.entry((r, c)).or_insert(S::ZERO) += v;
        }
        map
    }
}

impl<S: RuntimeScalar> FromIterator<(usize, usize, S)> for SparseEntries<S> {
    fn from_iter<I: IntoIterator<Item = (usize, usize, S)>>(iter: I) -> Self {
        Self {
            triplets: iter.into_iter().collect(),
        }
    }
}

/// 各进程拥有的全局行区间
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnershipRanges {
    offsets: Vec<usize>,
}

impl OwnershipRanges {
    /// 由各进程的行数构造，区间按进程号首尾相接
    pub fn from_counts(counts: &[usize]) -> Self {
        let mut offsets = Vec::with_capacity(counts.len() + 1);
        offsets.push(0);
        for &c in counts {
            let last = offsets[offsets.len() - 1];
            offsets.push(last + c);
        }
        Self { offsets }
    }

    /// 进程数
    #[inline]
    pub fn n_procs(&self) -> usize {
        self.offsets.len() - 1
    }

    /// 进程 `proc` 的首行
    #[inline]
    pub fn base(&self, proc: usize) -> usize {
        self.offsets[proc]
    }

    /// 进程 `proc` 的尾后行
    #[inline]
    pub fn end(&self, proc: usize) -> usize {
        self.offsets[proc + 1]
    }

    /// 进程 `proc` 的行区间
    #[inline]
    pub fn range(&self, proc: usize) -> Range<usize> {
        self.base(proc)..self.end(proc)
    }

    /// 全局行数
    #[inline]
    pub fn global_size(&self) -> usize {
        self.offsets[self.offsets.len() - 1]
    }

    /// 拥有全局行 `row` 的进程
    pub fn owner_of(&self, row: usize) -> Option<usize> {
        if row >= self.global_size() {
            return None;
        }
        Some(self.offsets.partition_point(|&o| o <= row) - 1)
    }
}

/// 本进程视角的分区布局
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionLayout {
    rank: usize,
    ranges: OwnershipRanges,
}

impl PartitionLayout {
    /// 由本进程号和各进程行数构造
    pub fn new(rank: usize, counts: &[usize]) -> Result<Self, SolveError> {
        if rank >= counts.len() {
            return Err(SolveError::InvalidLayout {
                message: format!("rank {rank} outside {} processes", counts.len()),
            });
        }
        Ok(Self {
            rank,
            ranges: OwnershipRanges::from_counts(counts),
        })
    }

    /// 单进程布局
    pub fn single(n_rows: usize) -> Self {
        Self {
            rank: 0,
            ranges: OwnershipRanges::from_counts(&[n_rows]),
        }
    }

    /// 本进程号
    #[inline]
    pub fn rank(&self) -> usize {
        self.rank
    }

    /// 进程数
    #[inline]
    pub fn n_procs(&self) -> usize {
        self.ranges.n_procs()
    }

    /// 全部进程的行区间
    #[inline]
    pub fn ranges(&self) -> &OwnershipRanges {
        &self.ranges
    }

    /// 本进程首行
    #[inline]
    pub fn row_base(&self) -> usize {
        self.ranges.base(self.rank)
    }

    /// 本进程行数
    #[inline]
    pub fn local_rows(&self) -> usize {
        self.ranges.range(self.rank).len()
    }

    /// 本进程行区间
    #[inline]
    pub fn local_range(&self) -> Range<usize> {
        self.ranges.range(self.rank)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entries_accumulate() {
        let mut e = SparseEntries::<f64>::new();
        e.add(0, 0, 1.0);
        e.add(0, 1, -1.0);
        e.add(0, 0, 2.0);
        assert_eq!(e.len(), 3);
        assert_eq!(e.get(0, 0), 3.0);
        assert_eq!(e.get(1, 1), 0.0);
        let map = e.accumulate();
        assert_eq!(map.len(), 2);
        assert_eq!(map[&(0, 1)], -1.0);

        let more: SparseEntries<f64> = vec![(2, 2, 5.0)].into_iter().collect();
        e.extend(more);
        assert_eq!(e.len(), 4);
    }

    #[test]
    fn test_ownership_ranges() {
        let r = OwnershipRanges::from_counts(&[3, 0, 2]);
        assert_eq!(r.n_procs(), 3);
        assert_eq!(r.range(0), 0..3);
        assert_eq!(r.range(1), 3..3);
        assert_eq!(r.base(2), 3);
        assert_eq!(r.global_size(), 5);
        assert_eq!(r.owner_of(2), Some(0));
        assert_eq!(r.owner_of(3), Some(2));
        assert_eq!(r.owner_of(5), None);
    }

    #[test]
    fn test_layout() {
        let layout = PartitionLayout::new(1, &[3, 2]).unwrap();
        assert_eq!(layout.row_base(), 3);
        assert_eq!(layout.local_rows(), 2);
        assert_eq!(layout.local_range(), 3..5);
        assert_eq!(layout.n_procs(), 2);
        assert!(PartitionLayout::new(2, &[3, 2]).is_err());
        assert_eq!(PartitionLayout::single(4).local_rows(), 4);
    }
}
