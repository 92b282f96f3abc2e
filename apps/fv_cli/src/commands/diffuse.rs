// apps/fv_cli/src/commands/diffuse.rs

//! 隐式扩散命令
//!
//! 生成一维链网格，以阶跃初值填充 `columns` 列，执行 `steps` 个向后 Euler 子步。
//! 多进程分区时各分区独立组装，三元组合并后在本进程内统一求解。

use std::path::PathBuf;
use std::time::Instant;

use anyhow::{bail, Context, Result};
use clap::Args;
use fv_config::{Precision, RunConfig};
use fv_foundation::MemoryTracker;
use fv_numerics::{
    chain_1d_partition, partition_counts, DiffusionAssembler, FvMesh, KrylovBackend, LinearSolveBackend,
    PartitionLayout, SparseEntries, UnstructuredMesh,
};
use fv_runtime::{Field, OwnedField, RuntimeScalar};
use tracing::{info, warn};

/// 一次运行可同时求解的最大列数
const MAX_COLUMNS: usize = 4;

/// 扩散命令参数
#[derive(Args)]
pub struct DiffuseArgs {
    /// 配置文件路径
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// 单元总数
    #[arg(long)]
    pub cells: Option<usize>,

    /// 分区数
    #[arg(long)]
    pub procs: Option<usize>,

    /// 时间步长 [s]
    #[arg(long)]
    pub dt: Option<f64>,

    /// 子步数
    #[arg(long)]
    pub steps: Option<usize>,

    /// 右端项列数
    #[arg(long)]
    pub columns: Option<usize>,

    /// 使用 f32 精度
    #[arg(long)]
    pub f32: bool,
}

fn load_config(args: &DiffuseArgs) -> Result<RunConfig> {
    let mut config = match &args.config {
        Some(path) => RunConfig::from_file(path).with_context(|| format!("无法加载 {}", path.display()))?,
        None => RunConfig::default(),
    };
    let d = &mut config.diffusion;
    if let Some(v) = args.cells {
        d.cells = v;
    }
    if let Some(v) = args.procs {
        d.procs = v;
    }
    if let Some(v) = args.dt {
        d.dt = v;
    }
    if let Some(v) = args.steps {
        d.steps = v;
    }
    if let Some(v) = args.columns {
        d.columns = v;
    }
    if args.f32 {
        config.precision = Precision::F32;
    }
    config.validate().context("配置无效")?;
    if config.diffusion.columns > MAX_COLUMNS {
        bail!("columns = {} 超出上限 {MAX_COLUMNS}", config.diffusion.columns);
    }
    Ok(config)
}

/// 执行扩散命令
pub fn execute(args: DiffuseArgs) -> Result<()> {
    let config = load_config(&args)?;
    info!(
        precision = %config.precision,
        cells = config.diffusion.cells,
        procs = config.diffusion.procs,
        columns = config.diffusion.columns,
        "=== 隐式扩散启动 ==="
    );
    match config.precision {
        Precision::F32 => dispatch_columns::<f32>(&config),
        Precision::F64 => dispatch_columns::<f64>(&config),
    }
}

fn dispatch_columns<S: RuntimeScalar>(config: &RunConfig) -> Result<()> {
    match config.diffusion.columns {
        1 => run::<S, 1>(config),
        2 => run::<S, 2>(config),
        3 => run::<S, 3>(config),
        4 => run::<S, 4>(config),
        n => bail!("不支持的列数 {n}"),
    }
}

/// 全局单元上的运行状态
struct Problem<S: RuntimeScalar> {
    meshes: Vec<UnstructuredMesh<S>>,
    counts: Vec<usize>,
    face_diffusivity: Vec<Vec<S>>,
}

impl<S: RuntimeScalar> Problem<S> {
    fn build(config: &RunConfig) -> Result<Self> {
        let d = &config.diffusion;
        let dx = S::from_config(d.dx);
        let area = S::from_config(d.area);
        let counts = partition_counts(d.cells, d.procs);
        let meshes = (0..d.procs)
            .map(|rank| chain_1d_partition(d.cells, d.procs, rank, dx, area))
            .collect::<Result<Vec<_>, _>>()
            .context("网格生成失败")?;
        let face_diffusivity = meshes
            .iter()
            .map(|m| vec![S::from_config(d.diffusivity); m.n_faces()])
            .collect();
        Ok(Self {
            meshes,
            counts,
            face_diffusivity,
        })
    }

    /// 各分区组装后合并为单进程系统
    fn gather(&self, dt: S) -> Result<SparseEntries<S>> {
        let mut all = SparseEntries::new();
        for (rank, mesh) in self.meshes.iter().enumerate() {
            let layout = PartitionLayout::new(rank, &self.counts)?;
            let assembler = DiffusionAssembler::new(mesh, layout)?;
            let d = &self.face_diffusivity[rank];
            let diffusivity = Field::shared(mesh.n_faces(), d)?;
            all.extend(assembler.assemble(&diffusivity, dt)?);
        }
        Ok(all)
    }
}

fn total<S: RuntimeScalar, const NRHS: usize>(u: &Field<'_, S, NRHS>, volume: S, j: usize) -> f64 {
    (0..u.len()).map(|i| (*u.at2(i, j) * volume).to_config()).sum()
}

fn run<S: RuntimeScalar, const NRHS: usize>(config: &RunConfig) -> Result<()> {
    let d = &config.diffusion;
    let n = d.cells;
    let dt = S::from_config(d.dt);
    let volume = S::from_config(d.dx * d.area);
    let tracker = MemoryTracker::new();
    let problem = Problem::<S>::build(config)?;

    // 阶跃初值: 左半为 j + 1
    let mut u = OwnedField::<S, NRHS>::new(n, &tracker)?;
    for i in 0..n / 2 {
        for (j, v) in u.tensor_mut(i).iter_mut().enumerate() {
            *v = S::from_config((j + 1) as f64);
        }
    }
    let mut un = OwnedField::<S, NRHS>::new(n, &tracker)?;
    let initial: Vec<f64> = (0..NRHS).map(|j| total(&u, volume, j)).collect();

    let mut backend = KrylovBackend::<S>::new(config.solver.clone());
    let start = Instant::now();
    let mut iterations = 0usize;

    if d.procs == 1 {
        let mesh = &problem.meshes[0];
        let assembler = DiffusionAssembler::new(mesh, PartitionLayout::single(n))?;
        let diffusivity = Field::shared(mesh.n_faces(), &problem.face_diffusivity[0])?;
        for step in 0..d.steps {
            let stats = assembler
                .assemble_and_solve(&u, &diffusivity, dt, &mut backend, &mut un)
                .with_context(|| format!("第 {step} 步求解失败"))?;
            iterations += stats.iter().map(|s| s.iterations).sum::<usize>();
            std::mem::swap(&mut u, &mut un);
        }
    } else {
        let entries = problem.gather(dt)?;
        backend.assemble(&entries, &PartitionLayout::single(n))?;
        let inv_dt = S::ONE / dt;
        let mut rhs = vec![S::ZERO; n];
        let mut x = vec![S::ZERO; n];
        for step in 0..d.steps {
            for j in 0..NRHS {
                for (i, r) in rhs.iter_mut().enumerate() {
                    *r = *u.at2(i, j) * inv_dt;
                }
                let stats = backend
                    .solve(&rhs, &mut x)
                    .with_context(|| format!("第 {step} 步第 {j} 列求解失败"))?;
                iterations += stats.iterations;
                for (i, &v) in x.iter().enumerate() {
                    *un.at2_mut(i, j) = v;
                }
            }
            std::mem::swap(&mut u, &mut un);
        }
    }

    let elapsed = start.elapsed();
    if u.has_nan() {
        warn!("结果含 NaN");
    }
    for (j, before) in initial.iter().enumerate() {
        let after = total(&u, volume, j);
        info!(column = j, before, after, drift = after - before, "总量守恒检查");
    }
    u.log_stats("u");
    info!(
        steps = d.steps,
        iterations,
        seconds = elapsed.as_secs_f64(),
        peak_bytes = tracker.peak(),
        "=== 隐式扩散完成 ==="
    );

    println!("# cell {}", (0..NRHS).map(|j| format!("u{j}")).collect::<Vec<_>>().join(" "));
    for i in 0..n {
        let row: Vec<String> = u.tensor(i).iter().map(|v| format!("{:.6}", v.to_config())).collect();
        println!("{i} {}", row.join(" "));
    }
    Ok(())
}
