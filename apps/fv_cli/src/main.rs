// apps/fv_cli/src/main.rs

//! fvcore 命令行界面
//!
//! 在生成的一维链网格上运行隐式扩散子步，以及读写运行配置。
//!
//! 本模块属于 **Layer 5: Application**：只接触 `RunConfig` 与 `Precision`，
//! 标量类型在 `diffuse` 命令内部按精度分发。

mod commands;

use clap::{Parser, Subcommand};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

/// fvcore 隐式扩散命令行工具
#[derive(Parser)]
#[command(name = "fv_cli")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Implicit finite-volume diffusion on generated chain meshes", long_about = None)]
struct Cli {
    /// 日志级别 (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 运行隐式扩散子步
    Diffuse(commands::diffuse::DiffuseArgs),
    /// 写出默认运行配置
    Config(commands::config::ConfigArgs),
    /// 验证运行配置
    Validate(commands::validate::ValidateArgs),
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = cli.log_level.parse::<Level>().unwrap_or(Level::INFO);
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Diffuse(args) => commands::diffuse::execute(args),
        Commands::Config(args) => commands::config::execute(args),
        Commands::Validate(args) => commands::validate::execute(args),
    }
}
