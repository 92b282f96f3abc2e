// crates/fv_runtime/src/field/ops.rs

//! 场的批量操作：清零、拷贝、两种散射累加、归约与诊断
//!
//! 两种散射对应有限体积法中两类并行安全性不同的写入：
//!
//! - [`Field::scatter_sequential`]：目标为 `offset + i`，天然互不重叠，
//!   按目标块划分后无同步并行；
//! - [`Field::scatter_reduce`]：目标由索引表给出，可以重复，
//!   每次分量加法都是原子的。
//!
//! 下标越界与只读场写入直接 panic。

use rayon::prelude::*;

use super::atomic::AtomicField;
use super::reduce::{FieldStats, KahanSum};
use super::Field;
use crate::error::{FieldError, FieldResult};
use crate::scalar::RuntimeScalar;

/// 并行归约的分块元素数
const REDUCE_CHUNK: usize = 4096;

impl<'a, S: RuntimeScalar, const D1: usize, const D2: usize, const D3: usize>
    Field<'a, S, D1, D2, D3>
{
    /// 所有元素置零
    pub fn zero(&mut self) {
        self.fill(S::ZERO);
    }

    /// 所有元素置为 `value`
    pub fn fill(&mut self, value: S) {
        self.as_mut_slice().par_iter_mut().for_each(|v| *v = value);
    }

    /// 将 `source` 的前 `count` 个条目复制到 `[offset, offset + count)`
    pub fn copy_into(&mut self, offset: usize, source: &[S], count: usize) {
        let b = Self::BLOCK;
        self.as_mut_slice()[offset * b..(offset + count) * b].copy_from_slice(&source[..count * b]);
    }

    /// 顺序目标散射：`self[offset + i] += source[indices[i]]`，`i ∈ [0, count)`
    ///
    /// 目标条目两两不同，按目标块并行且无需同步。
    pub fn scatter_sequential(&mut self, offset: usize, indices: &[usize], source: &[S], count: usize) {
        let b = Self::BLOCK;
        let dst = &mut self.as_mut_slice()[offset * b..(offset + count) * b];
        dst.par_chunks_mut(b)
            .zip(indices[..count].par_iter())
            .for_each(|(target, &src)| {
                for (t, &s) in target.iter_mut().zip(&source[src * b..(src + 1) * b]) {
                    *t += s;
                }
            });
    }

    /// 归约散射：`self[indices[i]] += source[i]`，`i ∈ [0, count)`
    ///
    /// `indices` 可以重复。对齐满足时并行原子累加，否则退化为串行累加，
    /// 两种路径结果一致（在浮点加法结合律误差内）。
    pub fn scatter_reduce(&mut self, indices: &[usize], source: &[S], count: usize) {
        let b = Self::BLOCK;
        let indices = &indices[..count];
        let source = &source[..count * b];
        match AtomicField::<S, D1, D2, D3>::new(self.as_mut_slice()) {
            Some(view) => {
                indices
                    .par_iter()
                    .zip(source.par_chunks(b))
                    .for_each(|(&target, block)| view.add_block(target, block));
            }
            None => {
                tracing::debug!("scatter_reduce: buffer not atomic-aligned, serial fallback");
                let data = self.as_mut_slice();
                for (&target, block) in indices.iter().zip(source.chunks(b)) {
                    for (t, &s) in data[target * b..(target + 1) * b].iter_mut().zip(block) {
                        *t += s;
                    }
                }
            }
        }
    }

    /// 原子累加视图
    ///
    /// 拥有型场总是满足对齐；借用外部内存且未按原子类型对齐时返回错误。
    pub fn atomic_view(&mut self) -> FieldResult<AtomicField<'_, S, D1, D2, D3>> {
        AtomicField::new(self.as_mut_slice()).ok_or(FieldError::Misaligned {
            align: std::mem::align_of::<S::Atomic>(),
        })
    }

    /// 条目区间 `[start, end)` 内所有分量之和（补偿求和）
    pub fn reduce_sum(&self, start: usize, end: usize) -> S {
        let b = Self::BLOCK;
        self.as_slice()[start * b..end * b]
            .par_chunks(REDUCE_CHUNK)
            .map(|chunk| {
                let mut k = KahanSum::new();
                chunk.iter().for_each(|&v| k.add(v));
                k
            })
            .reduce(KahanSum::new, KahanSum::merge)
            .value()
    }

    /// 是否含 NaN（线性扫描，仅诊断用）
    pub fn has_nan(&self) -> bool {
        match self.as_slice().par_iter().position_any(|v| v.is_nan()) {
            Some(pos) => {
                tracing::warn!(entry = pos / Self::BLOCK, component = pos % Self::BLOCK, "NaN in field");
                true
            }
            None => false,
        }
    }

    /// 条目区间 `[start, end)` 的分量统计
    pub fn stats(&self, start: usize, end: usize) -> FieldStats<S> {
        let b = Self::BLOCK;
        self.as_slice()[start * b..end * b]
            .par_chunks(REDUCE_CHUNK)
            .map(|chunk| chunk.iter().fold(FieldStats::identity(), |s, &v| s.push(v)))
            .reduce(FieldStats::identity, FieldStats::combine)
    }

    /// 以 debug 级别输出全场统计
    pub fn log_stats(&self, name: &str) {
        let stats = self.stats(0, self.len());
        tracing::debug!(field = name, n = self.len(), shape = %Self::SHAPE, %stats, "field stats");
    }
}
