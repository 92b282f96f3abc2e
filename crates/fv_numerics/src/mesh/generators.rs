// crates/fv_numerics/src/mesh/generators.rs

//! 规则网格生成器
//!
//! 一维单元链：每个单元是截面积为 `area`、长度为 `dx` 的方柱，
//! 两端面接相邻单元或端部边界，四个侧面归入 `sides` 边界片，
//! 因此每个单元恰好六个面。

use fv_runtime::RuntimeScalar;

use super::unstructured::{FaceGeometry, MeshBuilder, MeshError, UnstructuredMesh};

/// 将 `n_total` 个单元尽量均匀地分给 `n_procs` 个进程，前面的进程多分一个
pub fn partition_counts(n_total: usize, n_procs: usize) -> Vec<usize> {
    if n_procs == 0 {
        return Vec::new();
    }
    let base = n_total / n_procs;
    let extra = n_total % n_procs;
    (0..n_procs).map(|p| base + usize::from(p < extra)).collect()
}

/// 单进程一维单元链
pub fn chain_1d<S: RuntimeScalar>(n_cells: usize, dx: S, area: S) -> Result<UnstructuredMesh<S>, MeshError> {
    chain_1d_partition(n_cells, 1, 0, dx, area)
}

/// 分区后一维单元链中第 `rank` 个进程的本地网格
///
/// 相邻分区之间生成进程间边界片 `procBoundary{rank}to{other}`，
/// 幽灵索引为对端进程上紧邻的本地单元编号。
pub fn chain_1d_partition<S: RuntimeScalar>(
    n_total: usize,
    n_procs: usize,
    rank: usize,
    dx: S,
    area: S,
) -> Result<UnstructuredMesh<S>, MeshError> {
    if n_procs == 0 || rank >= n_procs {
        return Err(MeshError::InvalidRank { rank, n_procs });
    }
    if n_total < n_procs {
        return Err(MeshError::InvalidParameter {
            message: format!("{n_total} cells cannot be split over {n_procs} processes"),
        });
    }
    if !(dx.is_finite() && dx > S::ZERO && area.is_finite() && area > S::ZERO) {
        return Err(MeshError::InvalidParameter {
            message: format!("dx = {dx}, area = {area} must be positive"),
        });
    }

    let counts = partition_counts(n_total, n_procs);
    let n = counts[rank];
    let last = n - 1;

    let side = area.sqrt();
    let end_face = FaceGeometry::uniform(area, dx * S::HALF);
    let inner_face = FaceGeometry::uniform(area, dx);
    let side_face = FaceGeometry::uniform(dx * side, side * S::HALF);

    let mut builder = MeshBuilder::new(vec![dx * area; n]).partition(rank, n_procs);
    for c in 0..last {
        builder = builder.internal_face(c, c + 1, inner_face);
    }
    if rank == 0 {
        builder = builder.boundary_patch("left", vec![(0, end_face)]);
    }
    if rank == n_procs - 1 {
        builder = builder.boundary_patch("right", vec![(last, end_face)]);
    }
    let sides = (0..n).flat_map(|c| std::iter::repeat((c, side_face)).take(4)).collect();
    builder = builder.boundary_patch("sides", sides);

    if rank > 0 {
        let other = rank - 1;
        builder = builder.processor_patch(
            format!("procBoundary{rank}to{other}"),
            other,
            vec![(0, inner_face)],
            vec![counts[other] - 1],
        );
    }
    if rank + 1 < n_procs {
        let other = rank + 1;
        builder = builder.processor_patch(
            format!("procBoundary{rank}to{other}"),
            other,
            vec![(last, inner_face)],
            vec![0],
        );
    }

    builder.build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::{FvMesh, CELL_DEGREE};

    #[test]
    fn test_partition_counts() {
        assert_eq!(partition_counts(10, 3), vec![4, 3, 3]);
        assert_eq!(partition_counts(4, 4), vec![1, 1, 1, 1]);
        assert!(partition_counts(5, 0).is_empty());
    }

    #[test]
    fn test_chain_every_cell_has_six_faces() {
        let mesh = chain_1d(5, 1.0f64, 1.0).unwrap();
        assert_eq!(mesh.n_internal_cells(), 5);
        assert_eq!(mesh.n_internal_faces(), 4);
        assert_eq!(mesh.n_faces(), mesh.n_local_faces());
        for c in 0..5 {
            assert_eq!(mesh.cell_faces(c).len(), CELL_DEGREE);
        }
        assert_eq!(mesh.cell_neighbours(2).iter().flatten().count(), 2);
        assert_eq!(mesh.cell_neighbours(0).iter().flatten().count(), 1);
    }

    #[test]
    fn test_single_cell_chain() {
        let mesh = chain_1d(1, 0.5f64, 2.0).unwrap();
        assert_eq!(mesh.n_internal_faces(), 0);
        assert_eq!(mesh.cell_faces(0).len(), CELL_DEGREE);
        assert_eq!(mesh.volume(0), 1.0);
    }

    #[test]
    fn test_partitioned_chain() {
        let left = chain_1d_partition(5, 2, 0, 1.0f64, 1.0).unwrap();
        let right = chain_1d_partition(5, 2, 1, 1.0f64, 1.0).unwrap();
        assert_eq!(left.n_internal_cells(), 3);
        assert_eq!(right.n_internal_cells(), 2);

        let p = &left.patches()["procBoundary0to1"];
        assert_eq!(p.start_face, left.n_local_faces());
        assert_eq!(left.owner(p.start_face), 2);
        assert_eq!(p.remote.as_ref().unwrap().ghost_indices, vec![0]);

        let q = &right.patches()["procBoundary1to0"];
        assert_eq!(right.owner(q.start_face), 0);
        let remote = q.remote.as_ref().unwrap();
        assert_eq!(remote.proc, 0);
        assert_eq!(remote.ghost_indices, vec![2]);
        assert!(!right.patches().contains_key("left"));
    }

    #[test]
    fn test_invalid_parameters() {
        assert!(chain_1d(0, 1.0f64, 1.0).is_err());
        assert!(chain_1d(3, -1.0f64, 1.0).is_err());
        assert!(chain_1d_partition(3, 2, 2, 1.0f64, 1.0).is_err());
    }
}
