// crates/fv_runtime/src/error.rs

//! 运行时错误类型
//!
//! 场容器在构造阶段可能失败的情形。越界访问与对只读场的写入属于
//! 编程错误，直接 panic，不在此列。

use fv_foundation::FvError;
use thiserror::Error;

/// 场容器错误
#[derive(Debug, Error)]
pub enum FieldError {
    /// 内存分配失败
    #[error("场内存分配失败: 请求 {bytes} 字节")]
    Allocation {
        /// 请求的字节数
        bytes: usize,
    },

    /// 外部缓冲区过小
    #[error("缓冲区过小: 需要 {required} 个元素, 实际 {actual}")]
    BufferTooSmall {
        /// 需要的元素数
        required: usize,
        /// 实际元素数
        actual: usize,
    },

    /// 字节缓冲区未对齐
    #[error("字节缓冲区未按 {align} 字节对齐")]
    Misaligned {
        /// 要求的对齐
        align: usize,
    },
}

impl From<FvError> for FieldError {
    fn from(err: FvError) -> Self {
        match err {
            FvError::Allocation { bytes } => FieldError::Allocation { bytes },
        }
    }
}

/// 场容器结果类型
pub type FieldResult<T> = Result<T, FieldError>;
