// crates/fv_foundation/src/error.rs

//! 基础层错误类型
//!
//! 基础层只会在申请缓冲区时失败；场容器、网格、求解器的错误在各自的 crate 中定义。
//!
//! # 示例
//!
//! ```
//! use fv_foundation::error::{FvError, FvResult};
//!
//! fn reserve(bytes: usize) -> FvResult<usize> {
//!     if bytes > isize::MAX as usize {
//!         return Err(FvError::allocation(bytes));
//!     }
//!     Ok(bytes)
//! }
//! assert!(reserve(usize::MAX).is_err());
//! ```

use thiserror::Error;

/// 统一结果类型
pub type FvResult<T> = Result<T, FvError>;

/// 基础层错误类型
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FvError {
    /// 内存分配失败
    #[error("内存分配失败: 请求 {bytes} 字节")]
    Allocation {
        /// 请求的字节数
        bytes: usize,
    },
}

impl FvError {
    /// 分配失败
    pub fn allocation(bytes: usize) -> Self {
        Self::Allocation { bytes }
    }
}
