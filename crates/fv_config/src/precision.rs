// crates/fv_config/src/precision.rs

//! 运行时精度选择
//!
//! 应用层按 [`Precision`] 分发到 `f32` 或 `f64` 实例化的数值代码。

use std::fmt;
use std::str::FromStr;

use fv_numerics::linear_algebra::RTOL_EPSILON_FACTOR;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// 计算精度
///
/// ```
/// use fv_config::Precision;
///
/// let p: Precision = "double".parse().unwrap();
/// assert_eq!(p, Precision::F64);
/// assert_eq!(p.size_bytes(), 8);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Precision {
    /// 单精度，场内存减半
    F32,
    /// 双精度（默认）
    #[default]
    F64,
}

impl Precision {
    /// 名称
    pub fn name(&self) -> &'static str {
        match self {
            Self::F32 => "f32",
            Self::F64 => "f64",
        }
    }

    /// 每个标量的字节数
    pub fn size_bytes(&self) -> usize {
        match self {
            Self::F32 => std::mem::size_of::<f32>(),
            Self::F64 => std::mem::size_of::<f64>(),
        }
    }

    /// 机器精度
    pub fn epsilon(&self) -> f64 {
        match self {
            Self::F32 => f32::EPSILON as f64,
            Self::F64 => f64::EPSILON,
        }
    }

    /// 该精度下实际执行的最小相对容差
    ///
    /// 更小的 `rtol` 在求解时被抬到此值。
    pub fn min_rtol(&self) -> f64 {
        self.epsilon() * RTOL_EPSILON_FACTOR
    }
}

impl fmt::Display for Precision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Precision {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "f32" | "single" | "float" => Ok(Self::F32),
            "f64" | "double" => Ok(Self::F64),
            _ => Err(ConfigError::invalid("precision", s, "期望 'f32' 或 'f64'")),
        }
    }
}
