// crates/fv_numerics/src/mesh/mod.rs

//! 网格连接关系抽象
//!
//! 组装器和插值器只通过 [`FvMesh`] 读取网格，不关心网格来源
//! （文件读入、分区工具或本模块的生成器）。
//!
//! # 编号约定
//!
//! ```text
//! 面:   [0, n_internal_faces)            内部面（owner/neighbour 均为本地单元）
//!       [n_internal_faces, n_local_faces) 物理边界面
//!       [n_local_faces, n_faces)          进程间边界面
//! 单元: [0, n_internal_cells)            本进程拥有的单元
//!       [n_internal_cells, n_cells)       幽灵单元（每个边界面一个）
//! ```
//!
//! 边界面的 `neighbour` 指向其幽灵单元；单元邻居表中边界面对应 `None`。

mod generators;
mod unstructured;

pub use generators::{chain_1d, chain_1d_partition, partition_counts};
pub use unstructured::{FaceGeometry, MeshBuilder, MeshError, UnstructuredMesh};

use std::collections::BTreeMap;

use fv_runtime::RuntimeScalar;

/// 单元最大面数（六面体）
pub const CELL_DEGREE: usize = 6;

/// 面的观察侧
///
/// 同一个面可以从两侧相邻单元分别重构。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    /// 从 owner 一侧：`(p, n) = (owner, neighbour)`
    Owner,
    /// 从 neighbour 一侧：`(p, n) = (neighbour, owner)`
    Neighbour,
}

impl Side {
    /// 两侧
    pub const BOTH: [Side; 2] = [Side::Owner, Side::Neighbour];

    /// 权重表下标
    #[inline]
    pub const fn index(self) -> usize {
        match self {
            Side::Owner => 0,
            Side::Neighbour => 1,
        }
    }
}

/// 进程间边界信息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemotePatch {
    /// 对端进程号
    pub proc: usize,
    /// 每个面在对端进程的本地单元编号
    pub ghost_indices: Vec<usize>,
}

/// 边界片
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundaryPatch {
    /// 起始面
    pub start_face: usize,
    /// 面数
    pub n_faces: usize,
    /// 进程间边界信息（物理边界为 `None`）
    pub remote: Option<RemotePatch>,
}

impl BoundaryPatch {
    /// 面区间
    #[inline]
    pub fn faces(&self) -> std::ops::Range<usize> {
        self.start_face..self.start_face + self.n_faces
    }

    /// 是否为进程间边界
    #[inline]
    pub fn is_remote(&self) -> bool {
        self.remote.is_some()
    }
}

/// 有限体积网格连接关系
///
/// 所有几何量按标量类型 `S` 提供。
pub trait FvMesh<S: RuntimeScalar>: Send + Sync {
    // ========== 计数 ==========

    /// 面总数（含进程间边界面）
    fn n_faces(&self) -> usize;

    /// 本地面数（内部面 + 物理边界面）
    fn n_local_faces(&self) -> usize;

    /// 内部面数
    fn n_internal_faces(&self) -> usize;

    /// 本进程拥有的单元数
    fn n_internal_cells(&self) -> usize;

    /// 单元总数（含幽灵单元）
    fn n_cells(&self) -> usize;

    /// 进程总数
    fn n_procs(&self) -> usize {
        1
    }

    /// 本进程号
    fn rank(&self) -> usize {
        0
    }

    // ========== 拓扑 ==========

    /// 面的 owner 单元
    fn owner(&self, face: usize) -> usize;

    /// 面的 neighbour 单元（边界面为幽灵单元）
    fn neighbour(&self, face: usize) -> usize;

    /// 单元的面列表（最多 [`CELL_DEGREE`] 个）
    fn cell_faces(&self, cell: usize) -> &[usize];

    /// 单元的邻居列表，与 `cell_faces` 一一对应；边界面为 `None`
    fn cell_neighbours(&self, cell: usize) -> &[Option<usize>];

    /// 边界片表
    fn patches(&self) -> &BTreeMap<String, BoundaryPatch>;

    // ========== 几何与插值权重 ==========

    /// 面积
    fn area(&self, face: usize) -> S;

    /// 两侧单元中心距离
    fn delta(&self, face: usize) -> S;

    /// 单元体积
    fn volume(&self, cell: usize) -> S;

    /// 线性插值权重
    fn weight(&self, face: usize) -> S;

    /// 侧相关的线性权重
    fn linear_weight(&self, side: Side, face: usize) -> S;

    /// 侧相关的二次修正权重（`axis ∈ 0..3`）
    fn quadratic_weight(&self, side: Side, face: usize, axis: usize) -> S;

    // ========== 便捷方法 ==========

    /// 是否为进程间边界面
    #[inline]
    fn is_remote_face(&self, face: usize) -> bool {
        face >= self.n_local_faces()
    }
}
