// crates/fv_numerics/src/assembler/coupling.rs

//! 进程间边界耦合表
//!
//! 组装时把进程间边界面两侧的单元接入同一个全局编号的系统：
//! 本地 owner 行 + 对端进程行区间起点 + 幽灵索引 = 全局列。
//! 建表只用本地网格信息，不需要通信。

use fv_runtime::RuntimeScalar;

use crate::mesh::FvMesh;

/// 一个进程间边界片
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CouplingEntry {
    /// 边界片名称
    pub patch: String,
    /// 对端进程
    pub proc: usize,
    /// 起始面
    pub start_face: usize,
    /// 面数
    pub n_faces: usize,
    /// 每个面在对端进程的本地单元编号
    pub ghost_indices: Vec<usize>,
}

impl CouplingEntry {
    /// (面, 幽灵索引) 迭代
    pub fn faces(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        (self.start_face..self.start_face + self.n_faces).zip(self.ghost_indices.iter().copied())
    }
}

/// 边界耦合表
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BoundaryCouplingTable {
    entries: Vec<CouplingEntry>,
}

impl BoundaryCouplingTable {
    /// 从网格的边界片表构建
    ///
    /// 只收录位于本地面区间之后、非空且带对端信息的边界片。
    pub fn from_mesh<S: RuntimeScalar, M: FvMesh<S> + ?Sized>(mesh: &M) -> Self {
        let n_local = mesh.n_local_faces();
        let entries = mesh
            .patches()
            .iter()
            .filter(|(_, p)| p.start_face >= n_local && p.n_faces > 0)
            .filter_map(|(name, p)| {
                p.remote.as_ref().map(|remote| CouplingEntry {
                    patch: name.clone(),
                    proc: remote.proc,
                    start_face: p.start_face,
                    n_faces: p.n_faces,
                    ghost_indices: remote.ghost_indices.clone(),
                })
            })
            .collect();
        Self { entries }
    }

    /// 全部条目
    #[inline]
    pub fn entries(&self) -> &[CouplingEntry] {
        &self.entries
    }

    /// 条目数
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// 是否为空
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 耦合面总数
    pub fn n_faces(&self) -> usize {
        self.entries.iter().map(|e| e.n_faces).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::{chain_1d, chain_1d_partition, FaceGeometry, MeshBuilder};

    #[test]
    fn test_single_process_has_no_coupling() {
        let mesh = chain_1d(4, 1.0f64, 1.0).unwrap();
        assert!(BoundaryCouplingTable::from_mesh(&mesh).is_empty());
    }

    #[test]
    fn test_middle_rank_couples_both_sides() {
        let mesh = chain_1d_partition(9, 3, 1, 1.0f64, 1.0).unwrap();
        let table = BoundaryCouplingTable::from_mesh(&mesh);
        assert_eq!(table.len(), 2);
        assert_eq!(table.n_faces(), 2);

        let to_left = &table.entries()[0];
        assert_eq!(to_left.patch, "procBoundary1to0");
        assert_eq!(to_left.proc, 0);
        assert_eq!(to_left.ghost_indices, vec![2]);
        let to_right = &table.entries()[1];
        assert_eq!(to_right.proc, 2);
        assert_eq!(to_right.faces().collect::<Vec<_>>(), vec![(to_right.start_face, 0)]);
    }

    #[test]
    fn test_empty_processor_patch_skipped() {
        let mesh = MeshBuilder::new(vec![1.0f64])
            .partition(0, 2)
            .processor_patch("procBoundary0to1", 1, Vec::<(usize, FaceGeometry<f64>)>::new(), vec![])
            .build()
            .unwrap();
        assert!(BoundaryCouplingTable::from_mesh(&mesh).is_empty());
    }
}
