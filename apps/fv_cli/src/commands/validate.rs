// apps/fv_cli/src/commands/validate.rs

//! 配置验证命令

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use fv_config::RunConfig;
use fv_numerics::partition_counts;
use tracing::{info, warn};

/// 验证参数
#[derive(Args)]
pub struct ValidateArgs {
    /// 配置文件路径
    pub config: PathBuf,

    /// 严格模式（警告也视为错误）
    #[arg(long)]
    pub strict: bool,
}

/// 只影响效率、不影响正确性的问题
fn warnings(config: &RunConfig) -> Vec<String> {
    let d = &config.diffusion;
    let mut out = Vec::new();
    let courant = d.diffusivity * d.dt / (d.dx * d.dx);
    if courant > 1e3 {
        out.push(format!("扩散数 D·dt/dx² = {courant:.3e} 很大，解在一步内接近稳态"));
    }
    if d.procs > 1 {
        let counts = partition_counts(d.cells, d.procs);
        let (min, max) = counts
            .iter()
            .fold((usize::MAX, 0), |(lo, hi), &c| (lo.min(c), hi.max(c)));
        if max > 2 * min {
            out.push(format!("分区不均衡: 每进程 {min}..={max} 个单元"));
        }
    }
    let rtol = config.effective_rtol();
    if rtol > config.solver.rtol {
        out.push(format!(
            "rtol = {:e} 低于 {} 精度下限，求解按 {rtol:e} 执行",
            config.solver.rtol, config.precision
        ));
    }
    if config.solver.max_iter < 10 {
        out.push(format!("max_iter = {} 可能不足以收敛", config.solver.max_iter));
    }
    out
}

/// 执行验证命令
pub fn execute(args: ValidateArgs) -> Result<()> {
    let config = RunConfig::from_file(&args.config)
        .with_context(|| format!("配置无效: {}", args.config.display()))?;

    let found = warnings(&config);
    for w in &found {
        warn!("{w}");
    }
    if args.strict && !found.is_empty() {
        anyhow::bail!("严格模式下有 {} 条警告", found.len());
    }

    info!(
        precision = %config.precision,
        cells = config.diffusion.cells,
        procs = config.diffusion.procs,
        steps = config.diffusion.steps,
        "配置有效"
    );
    println!("✓ {}", args.config.display());
    Ok(())
}
