// crates/fv_runtime/src/field/atomic.rs

//! 场的原子累加视图
//!
//! 多个线程向同一条目累加（例如边界面贡献汇集到内部单元）时，
//! 每次分量加法都经由 [`RuntimeScalar::atomic_add`] 完成，不丢失更新。
//!
//! ```
//! use fv_foundation::MemoryTracker;
//! use fv_runtime::Field;
//! use rayon::prelude::*;
//!
//! let tracker = MemoryTracker::new();
//! let mut f: Field<f64> = Field::new(1, &tracker).unwrap();
//! {
//!     let view = f.atomic_view().unwrap();
//!     (0..1000).into_par_iter().for_each(|_| view.add(0, 0.5));
//! }
//! assert_eq!(f[0], 500.0);
//! ```

use std::marker::PhantomData;

use crate::scalar::RuntimeScalar;

/// 原子累加视图
///
/// 视图存在期间独占借用底层场，所有访问都只能通过原子操作进行。
pub struct AtomicField<'f, S: RuntimeScalar, const D1: usize, const D2: usize, const D3: usize> {
    slots: &'f [S::Atomic],
    _marker: PhantomData<&'f mut [S]>,
}

impl<'f, S: RuntimeScalar, const D1: usize, const D2: usize, const D3: usize>
    AtomicField<'f, S, D1, D2, D3>
{
    const BLOCK: usize = D1 * D2 * D3;

    /// 检查切片能否被重新解释为原子槽位
    pub(crate) fn compatible(data: &[S]) -> bool {
        std::mem::size_of::<S::Atomic>() == std::mem::size_of::<S>()
            && (data.as_ptr() as usize) % std::mem::align_of::<S::Atomic>() == 0
    }

    /// 从独占切片构造；布局不兼容时返回 `None`
    pub(crate) fn new(data: &'f mut [S]) -> Option<Self> {
        if !Self::compatible(data) {
            return None;
        }
        let len = data.len();
        let ptr = data.as_mut_ptr() as *const S::Atomic;
        // SAFETY: 原子整数与同宽度标量内存表示一致，上面已检查大小与对齐；
        // `data` 在 'f 内被独占借用，因此不存在并发的非原子访问。
        let slots = unsafe { std::slice::from_raw_parts(ptr, len) };
        Some(Self {
            slots,
            _marker: PhantomData,
        })
    }

    /// 主维度条目数
    #[inline]
    pub fn len(&self) -> usize {
        self.slots.len() / Self::BLOCK
    }

    /// 是否为空
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// 原子累加到条目 `i` 的首分量
    #[inline]
    pub fn add(&self, i: usize, value: S) {
        S::atomic_add(&self.slots[i * Self::BLOCK], value);
    }

    /// 原子累加到条目 `i` 的线性分量 `c`
    #[inline]
    pub fn add_component(&self, i: usize, c: usize, value: S) {
        S::atomic_add(&self.slots[i * Self::BLOCK + c], value);
    }

    /// 将整个张量块逐分量原子累加到条目 `i`
    #[inline]
    pub fn add_block(&self, i: usize, block: &[S]) {
        let base = i * Self::BLOCK;
        for (slot, &v) in self.slots[base..base + Self::BLOCK].iter().zip(block) {
            S::atomic_add(slot, v);
        }
    }

    /// 读取条目 `i` 的线性分量 `c`
    #[inline]
    pub fn load(&self, i: usize, c: usize) -> S {
        S::from_bits_atomic(&self.slots[i * Self::BLOCK + c])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rayon::prelude::*;

    #[test]
    fn test_add_block() {
        let mut data = vec![0.0f64; 4];
        let view: AtomicField<f64, 2, 1, 1> = AtomicField::new(&mut data).unwrap();
        assert_eq!(view.len(), 2);
        view.add_block(1, &[1.0, 2.0]);
        view.add_block(1, &[0.5, 0.5]);
        view.add_component(0, 1, 3.0);
        assert_eq!(view.load(1, 0), 1.5);
        assert_eq!(view.load(1, 1), 2.5);
        assert_eq!(view.load(0, 1), 3.0);
    }

    #[test]
    fn test_concurrent_adds_f32() {
        let mut data = vec![0.0f32; 3];
        {
            let view: AtomicField<f32, 1, 1, 1> = AtomicField::new(&mut data).unwrap();
            (0..3000usize)
                .into_par_iter()
                .for_each(|k| view.add(k % 3, 1.0));
        }
        assert_eq!(data, vec![1000.0, 1000.0, 1000.0]);
    }
}
