// crates/fv_runtime/src/field/mod.rs

//! 场容器
//!
//! `Field<S, D1, D2, D3>` 是定义在网格实体（单元或面）上的稠密张量数组：
//! 主维度 `n`，每个条目是形状 `D1 × D2 × D3` 的张量，行主序连续存储。
//!
//! # 存储模式
//!
//! | 模式 | 来源 | 释放 |
//! |------|------|------|
//! | `Empty` | 默认构造 / `take()` 之后 | 无 |
//! | `Owned` | [`Field::new`] | drop 时释放一次，同步更新跟踪器 |
//! | `Borrowed` | [`Field::borrowed`] | 调用方负责 |
//! | `Shared` | [`Field::shared`] / [`Field::from_bytes`] | 调用方负责，只读 |
//!
//! 借用模式的生命周期 `'a` 由借用检查器保证不短于容器本身。
//!
//! # 示例
//!
//! ```
//! use fv_foundation::MemoryTracker;
//! use fv_runtime::Field;
//!
//! let tracker = MemoryTracker::new();
//! let mut f: Field<f64> = Field::new(2, &tracker).unwrap();
//! f.scatter_reduce(&[0, 0, 1], &[3.0, 4.0, 5.0], 3);
//! assert_eq!(f.as_slice(), &[7.0, 5.0]);
//! ```

mod atomic;
mod ops;
mod reduce;

pub use atomic::AtomicField;
pub use reduce::{FieldStats, KahanSum};

use std::fmt;
use std::ops::{Index, IndexMut};

use fv_foundation::{MemoryTracker, TensorShape, TrackedBuffer};

use crate::error::{FieldError, FieldResult};
use crate::scalar::RuntimeScalar;

/// 存储模式（任一时刻只处于一种状态）
enum Storage<'a, S: RuntimeScalar> {
    Empty,
    Owned(TrackedBuffer<S>),
    Borrowed(&'a mut [S]),
    Shared(&'a [S]),
}

/// 场容器
///
/// 张量形状由 const 泛型参数给出（默认标量）。
pub struct Field<'a, S: RuntimeScalar, const D1: usize = 1, const D2: usize = 1, const D3: usize = 1>
{
    n: usize,
    storage: Storage<'a, S>,
}

/// 拥有型场（不借用外部内存）
pub type OwnedField<S, const D1: usize = 1, const D2: usize = 1, const D3: usize = 1> =
    Field<'static, S, D1, D2, D3>;

impl<'a, S: RuntimeScalar, const D1: usize, const D2: usize, const D3: usize>
    Field<'a, S, D1, D2, D3>
{
    /// 张量形状
    pub const SHAPE: TensorShape = TensorShape::new(D1, D2, D3);

    /// 每个条目的元素数
    pub const BLOCK: usize = D1 * D2 * D3;

    /// 空场
    pub const fn empty() -> Self {
        Self {
            n: 0,
            storage: Storage::Empty,
        }
    }

    /// 分配 `n` 个条目的拥有型场（零填充）
    ///
    /// 字节数计入 `tracker` 的当前值与峰值。
    pub fn new(n: usize, tracker: &MemoryTracker) -> FieldResult<Self> {
        if n == 0 {
            return Ok(Self::empty());
        }
        let len = n.checked_mul(Self::BLOCK).ok_or(FieldError::Allocation {
            bytes: usize::MAX,
        })?;
        let buffer = TrackedBuffer::zeroed(len, tracker)?;
        tracing::trace!(
            n,
            shape = %Self::SHAPE,
            bytes = buffer.size_bytes(),
            "allocated owned field"
        );
        Ok(Self {
            n,
            storage: Storage::Owned(buffer),
        })
    }

    /// 从切片复制出拥有型场
    pub fn from_slice(n: usize, data: &[S], tracker: &MemoryTracker) -> FieldResult<Self> {
        let required = Self::required_len(n, data.len())?;
        let mut field = Self::new(n, tracker)?;
        if n > 0 {
            field.as_mut_slice().copy_from_slice(&data[..required]);
        }
        Ok(field)
    }

    /// 借用调用方的可变内存
    pub fn borrowed(n: usize, buffer: &'a mut [S]) -> FieldResult<Self> {
        let required = Self::required_len(n, buffer.len())?;
        Ok(Self {
            n,
            storage: Storage::Borrowed(&mut buffer[..required]),
        })
    }

    /// 借用调用方的只读内存
    pub fn shared(n: usize, buffer: &'a [S]) -> FieldResult<Self> {
        let required = Self::required_len(n, buffer.len())?;
        Ok(Self {
            n,
            storage: Storage::Shared(&buffer[..required]),
        })
    }

    /// 将序列化字节缓冲区重新解释为只读场
    ///
    /// 字节长度不足或起始地址未按 `S` 对齐时返回错误。
    pub fn from_bytes(n: usize, bytes: &'a [u8]) -> FieldResult<Self> {
        let elem = std::mem::size_of::<S>();
        let required = Self::required_len(n, bytes.len() / elem)?;
        let data: &'a [S] = bytemuck::try_cast_slice(&bytes[..required * elem]).map_err(|_| {
            FieldError::Misaligned {
                align: std::mem::align_of::<S>(),
            }
        })?;
        Ok(Self {
            n,
            storage: Storage::Shared(data),
        })
    }

    fn required_len(n: usize, actual: usize) -> FieldResult<usize> {
        let required = n.checked_mul(Self::BLOCK).ok_or(FieldError::BufferTooSmall {
            required: usize::MAX,
            actual,
        })?;
        if actual < required {
            return Err(FieldError::BufferTooSmall { required, actual });
        }
        Ok(required)
    }

    // =========================================================================
    // 所有权转移
    // =========================================================================

    /// 取走内容，原场变为空且不拥有内存
    pub fn take(&mut self) -> Self {
        std::mem::take(self)
    }

    /// 接收 `other` 的内容，先释放本场拥有的内存
    pub fn assign(&mut self, other: Self) {
        *self = other;
    }

    // =========================================================================
    // 属性
    // =========================================================================

    /// 主维度条目数
    #[inline]
    pub fn len(&self) -> usize {
        self.n
    }

    /// 是否为空
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.n == 0
    }

    /// 元素总数（`n × BLOCK`）
    #[inline]
    pub fn num_elements(&self) -> usize {
        self.n * Self::BLOCK
    }

    /// 步长 `[主索引, 轴1, 轴2, 轴3]`
    #[inline]
    pub fn strides(&self) -> [usize; 4] {
        Self::SHAPE.strides()
    }

    /// 是否拥有内存
    #[inline]
    pub fn is_owned(&self) -> bool {
        matches!(self.storage, Storage::Owned(_))
    }

    /// 是否借用外部内存
    #[inline]
    pub fn is_borrowed(&self) -> bool {
        matches!(self.storage, Storage::Borrowed(_) | Storage::Shared(_))
    }

    /// 是否只读
    #[inline]
    pub fn is_read_only(&self) -> bool {
        matches!(self.storage, Storage::Shared(_))
    }

    /// 计入跟踪器的字节数（借用模式为 0）
    pub fn owned_bytes(&self) -> usize {
        match &self.storage {
            Storage::Owned(buf) => buf.size_bytes(),
            _ => 0,
        }
    }

    /// 拥有型场的跟踪器
    pub fn tracker(&self) -> Option<&MemoryTracker> {
        match &self.storage {
            Storage::Owned(buf) => Some(buf.tracker()),
            _ => None,
        }
    }

    // =========================================================================
    // 数据访问
    // =========================================================================

    /// 只读切片
    #[inline]
    pub fn as_slice(&self) -> &[S] {
        match &self.storage {
            Storage::Empty => &[],
            Storage::Owned(buf) => buf.as_slice(),
            Storage::Borrowed(s) => &s[..],
            Storage::Shared(s) => &s[..],
        }
    }

    /// 可变切片
    ///
    /// # Panics
    /// 只读场（`Shared`）
    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [S] {
        match &mut self.storage {
            Storage::Empty => &mut [],
            Storage::Owned(buf) => buf.as_mut_slice(),
            Storage::Borrowed(s) => &mut s[..],
            Storage::Shared(_) => panic!("对只读场进行写访问"),
        }
    }

    /// 条目 `i` 的首分量
    #[inline(always)]
    pub fn at(&self, i: usize) -> &S {
        &self.as_slice()[Self::SHAPE.offset(i, 0, 0, 0)]
    }

    /// 条目 `i` 的分量 `j`
    #[inline(always)]
    pub fn at2(&self, i: usize, j: usize) -> &S {
        &self.as_slice()[Self::SHAPE.offset(i, j, 0, 0)]
    }

    /// 条目 `i` 的分量 `(j, k)`
    #[inline(always)]
    pub fn at3(&self, i: usize, j: usize, k: usize) -> &S {
        &self.as_slice()[Self::SHAPE.offset(i, j, k, 0)]
    }

    /// 条目 `i` 的首分量（可变）
    #[inline(always)]
    pub fn at_mut(&mut self, i: usize) -> &mut S {
        &mut self.as_mut_slice()[Self::SHAPE.offset(i, 0, 0, 0)]
    }

    /// 条目 `i` 的分量 `j`（可变）
    #[inline(always)]
    pub fn at2_mut(&mut self, i: usize, j: usize) -> &mut S {
        &mut self.as_mut_slice()[Self::SHAPE.offset(i, j, 0, 0)]
    }

    /// 条目 `i` 的分量 `(j, k)`（可变）
    #[inline(always)]
    pub fn at3_mut(&mut self, i: usize, j: usize, k: usize) -> &mut S {
        &mut self.as_mut_slice()[Self::SHAPE.offset(i, j, k, 0)]
    }

    /// 条目 `i` 的完整张量块
    #[inline]
    pub fn tensor(&self, i: usize) -> &[S] {
        let start = i * Self::BLOCK;
        &self.as_slice()[start..start + Self::BLOCK]
    }

    /// 条目 `i` 的完整张量块（可变）
    #[inline]
    pub fn tensor_mut(&mut self, i: usize) -> &mut [S] {
        let start = i * Self::BLOCK;
        &mut self.as_mut_slice()[start..start + Self::BLOCK]
    }

    /// 复制到新 Vec
    pub fn to_vec(&self) -> Vec<S> {
        self.as_slice().to_vec()
    }
}

impl<'a, S: RuntimeScalar, const D1: usize, const D2: usize, const D3: usize> Default
    for Field<'a, S, D1, D2, D3>
{
    fn default() -> Self {
        Self::empty()
    }
}

impl<'a, S: RuntimeScalar, const D1: usize, const D2: usize, const D3: usize> fmt::Debug
    for Field<'a, S, D1, D2, D3>
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mode = match self.storage {
            Storage::Empty => "empty",
            Storage::Owned(_) => "owned",
            Storage::Borrowed(_) => "borrowed",
            Storage::Shared(_) => "shared",
        };
        f.debug_struct("Field")
            .field("n", &self.n)
            .field("shape", &Self::SHAPE.extents())
            .field("storage", &mode)
            .finish()
    }
}

impl<'a, S: RuntimeScalar, const D1: usize, const D2: usize, const D3: usize> Index<usize>
    for Field<'a, S, D1, D2, D3>
{
    type Output = S;
    #[inline(always)]
    fn index(&self, i: usize) -> &S {
        self.at(i)
    }
}

impl<'a, S: RuntimeScalar, const D1: usize, const D2: usize, const D3: usize> IndexMut<usize>
    for Field<'a, S, D1, D2, D3>
{
    #[inline(always)]
    fn index_mut(&mut self, i: usize) -> &mut S {
        self.at_mut(i)
    }
}

impl<'a, S: RuntimeScalar, const D1: usize, const D2: usize, const D3: usize>
    Index<(usize, usize)> for Field<'a, S, D1, D2, D3>
{
    type Output = S;
    #[inline(always)]
    fn index(&self, (i, j): (usize, usize)) -> &S {
        self.at2(i, j)
    }
}

impl<'a, S: RuntimeScalar, const D1: usize, const D2: usize, const D3: usize>
    IndexMut<(usize, usize)> for Field<'a, S, D1, D2, D3>
{
    #[inline(always)]
    fn index_mut(&mut self, (i, j): (usize, usize)) -> &mut S {
        self.at2_mut(i, j)
    }
}

impl<'a, S: RuntimeScalar, const D1: usize, const D2: usize, const D3: usize>
    Index<(usize, usize, usize)> for Field<'a, S, D1, D2, D3>
{
    type Output = S;
    #[inline(always)]
    fn index(&self, (i, j, k): (usize, usize, usize)) -> &S {
        self.at3(i, j, k)
    }
}

impl<'a, S: RuntimeScalar, const D1: usize, const D2: usize, const D3: usize>
    IndexMut<(usize, usize, usize)> for Field<'a, S, D1, D2, D3>
{
    #[inline(always)]
    fn index_mut(&mut self, (i, j, k): (usize, usize, usize)) -> &mut S {
        self.at3_mut(i, j, k)
    }
}
