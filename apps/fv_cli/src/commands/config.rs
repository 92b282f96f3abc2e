// apps/fv_cli/src/commands/config.rs

//! 写出默认运行配置

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Args;
use fv_config::{Precision, RunConfig};
use tracing::info;

/// 配置命令参数
#[derive(Args)]
pub struct ConfigArgs {
    /// 输出路径
    #[arg(short, long, default_value = "fvcore.json")]
    pub output: PathBuf,

    /// 计算精度
    #[arg(short, long, default_value = "f64")]
    pub precision: Precision,

    /// 覆盖已存在的文件
    #[arg(long)]
    pub force: bool,
}

/// 执行配置命令
pub fn execute(args: ConfigArgs) -> Result<()> {
    if args.output.exists() && !args.force {
        bail!("{} 已存在，使用 --force 覆盖", args.output.display());
    }
    let config = RunConfig {
        precision: args.precision,
        ..RunConfig::default()
    };
    config.validate().context("默认配置无效")?;
    config
        .save_to_file(&args.output)
        .with_context(|| format!("无法写入 {}", args.output.display()))?;
    info!(path = %args.output.display(), precision = %config.precision, "默认配置已写出");
    Ok(())
}
