// crates/fv_config/src/run_config.rs

//! RunConfig - 隐式扩散运行配置（全 f64）
//!
//! ```json
//! {
//!   "precision": "f64",
//!   "solver": { "method": { "gmres": { "restart": 30 } }, "preconditioner": "amg", "rtol": 1e-10 },
//!   "diffusion": { "cells": 64, "dt": 0.01, "diffusivity": 1.0, "steps": 10 }
//! }
//! ```
//!
//! 缺省字段取默认值。

use std::path::Path;

use serde::{Deserialize, Serialize};

use fv_numerics::linear_algebra::LinearSolverSettings;

use crate::error::ConfigError;
use crate::precision::Precision;

/// 扩散问题参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiffusionConfig {
    /// 链网格单元总数
    pub cells: usize,
    /// 分区进程数
    pub procs: usize,
    /// 单元长度 [m]
    pub dx: f64,
    /// 截面积 [m²]
    pub area: f64,
    /// 时间步长 [s]
    pub dt: f64,
    /// 扩散系数 [m²/s]
    pub diffusivity: f64,
    /// 子步数
    pub steps: usize,
    /// 同时求解的右端项列数
    pub columns: usize,
}

impl Default for DiffusionConfig {
    fn default() -> Self {
        Self {
            cells: 64,
            procs: 1,
            dx: 1.0,
            area: 1.0,
            dt: 0.01,
            diffusivity: 1.0,
            steps: 10,
            columns: 1,
        }
    }
}

/// 运行配置
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    /// 计算精度
    #[serde(default)]
    pub precision: Precision,

    /// 线性求解设置
    #[serde(default)]
    pub solver: LinearSolverSettings,

    /// 扩散问题
    #[serde(default)]
    pub diffusion: DiffusionConfig,
}

fn positive(key: &str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::invalid(key, value, "必须为有限正数"))
    }
}

impl RunConfig {
    /// 从 JSON 文本解析并校验
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: RunConfig = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// 从文件加载并校验
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_json(&content)
    }

    /// 校验配置
    pub fn validate(&self) -> Result<(), ConfigError> {
        let d = &self.diffusion;
        if d.cells == 0 {
            return Err(ConfigError::invalid("diffusion.cells", d.cells, "至少一个单元"));
        }
        if d.procs == 0 || d.procs > d.cells {
            return Err(ConfigError::invalid(
                "diffusion.procs",
                d.procs,
                format!("必须在 1..={} 之间", d.cells),
            ));
        }
        positive("diffusion.dx", d.dx)?;
        positive("diffusion.area", d.area)?;
        positive("diffusion.dt", d.dt)?;
        if !(d.diffusivity.is_finite() && d.diffusivity >= 0.0) {
            return Err(ConfigError::invalid("diffusion.diffusivity", d.diffusivity, "必须为有限非负数"));
        }
        if d.steps == 0 {
            return Err(ConfigError::invalid("diffusion.steps", d.steps, "至少一步"));
        }
        if d.columns == 0 {
            return Err(ConfigError::invalid("diffusion.columns", d.columns, "至少一列"));
        }

        self.solver
            .check()
            .map_err(|reason| ConfigError::invalid("solver", format!("{:?}", self.solver.method), reason))?;
        Ok(())
    }

    /// 求解时实际执行的相对容差
    pub fn effective_rtol(&self) -> f64 {
        self.solver.effective_rtol(self.precision.epsilon())
    }

    /// 保存为格式化 JSON
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fv_numerics::linear_algebra::{KrylovMethod, PreconditionerKind};

    #[test]
    fn test_default_is_valid() {
        let config = RunConfig::default();
        config.validate().unwrap();
        assert_eq!(config.solver.method, KrylovMethod::Gmres { restart: 30 });
        assert_eq!(config.solver.preconditioner, PreconditionerKind::Amg);
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let config = RunConfig::from_json(
            r#"{ "precision": "f32",
                 "solver": { "method": "bi_cg_stab", "preconditioner": "jacobi", "rtol": 1e-5 },
                 "diffusion": { "cells": 12, "dt": 0.5 } }"#,
        )
        .unwrap();
        assert_eq!(config.precision, Precision::F32);
        assert_eq!(config.solver.method, KrylovMethod::BiCgStab);
        assert_eq!(config.solver.max_iter, LinearSolverSettings::default().max_iter);
        assert_eq!(config.diffusion.cells, 12);
        assert_eq!(config.diffusion.steps, DiffusionConfig::default().steps);
    }

    #[test]
    fn test_invalid_values() {
        let mut config = RunConfig::default();
        config.diffusion.dt = 0.0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { ref key, .. }) if key == "diffusion.dt"
        ));

        let mut config = RunConfig::default();
        config.diffusion.procs = config.diffusion.cells + 1;
        assert!(config.validate().is_err());

        let mut config = RunConfig::default();
        config.solver.rtol = -1.0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { ref key, .. }) if key == "solver"
        ));

        assert!(matches!(RunConfig::from_json("{ oops"), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_single_precision_accepts_default_rtol() {
        let mut config = RunConfig::default();
        config.precision = Precision::F32;
        config.validate().unwrap();
        assert_eq!(config.effective_rtol(), Precision::F32.min_rtol());

        config.precision = Precision::F64;
        assert_eq!(config.effective_rtol(), config.solver.rtol);
    }

    #[test]
    fn test_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.json");
        let mut config = RunConfig::default();
        config.diffusion.cells = 7;
        config.diffusion.columns = 3;
        config.save_to_file(&path).unwrap();

        let loaded = RunConfig::from_file(&path).unwrap();
        assert_eq!(loaded, config);
        assert!(matches!(
            RunConfig::from_file(dir.path().join("missing.json")),
            Err(ConfigError::Io(_))
        ));
    }
}
