// crates/fv_numerics/src/mesh/unstructured.rs

//! 内存中的非结构化网格与构建器
//!
//! [`MeshBuilder`] 按"内部面 → 物理边界片 → 进程间边界片"的顺序编号面，
//! 为每个边界面分配一个幽灵单元，并推导单元面表与邻居表。

use std::collections::BTreeMap;

use fv_runtime::RuntimeScalar;
use thiserror::Error;

use super::{BoundaryPatch, FvMesh, RemotePatch, Side, CELL_DEGREE};

/// 网格构建错误
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MeshError {
    /// 单元体积非正或非有限
    #[error("单元 {cell} 体积无效")]
    InvalidVolume {
        /// 单元编号
        cell: usize,
    },

    /// 面引用了不存在的单元
    #[error("面 {face} 引用的单元 {cell} 超出范围 0..{n_cells}")]
    CellOutOfRange {
        /// 面编号
        face: usize,
        /// 单元编号
        cell: usize,
        /// 本地单元数
        n_cells: usize,
    },

    /// 内部面两侧为同一单元
    #[error("内部面 {face} 两侧为同一单元 {cell}")]
    DegenerateFace {
        /// 面编号
        face: usize,
        /// 单元编号
        cell: usize,
    },

    /// 面几何量无效
    #[error("面 {face} 的 {quantity} 无效")]
    InvalidGeometry {
        /// 面编号
        face: usize,
        /// 几何量名称
        quantity: &'static str,
    },

    /// 单元面数超过上限
    #[error("单元 {cell} 有 {degree} 个面，超过上限 {}", CELL_DEGREE)]
    DegreeExceeded {
        /// 单元编号
        cell: usize,
        /// 实际面数
        degree: usize,
    },

    /// 边界片重名
    #[error("边界片重名: {name}")]
    DuplicatePatch {
        /// 名称
        name: String,
    },

    /// 幽灵索引数与面数不一致
    #[error("边界片 {patch} 有 {faces} 个面但有 {ghosts} 个幽灵索引")]
    GhostCountMismatch {
        /// 名称
        patch: String,
        /// 面数
        faces: usize,
        /// 幽灵索引数
        ghosts: usize,
    },

    /// 对端进程无效
    #[error("边界片 {patch} 的对端进程 {proc} 无效（本进程 {rank}，共 {n_procs} 个）")]
    InvalidProcessor {
        /// 名称
        patch: String,
        /// 对端进程
        proc: usize,
        /// 本进程
        rank: usize,
        /// 进程数
        n_procs: usize,
    },

    /// 本进程号无效
    #[error("进程号 {rank} 超出进程数 {n_procs}")]
    InvalidRank {
        /// 进程号
        rank: usize,
        /// 进程数
        n_procs: usize,
    },

    /// 生成器参数无效
    #[error("网格参数无效: {message}")]
    InvalidParameter {
        /// 描述
        message: String,
    },
}

/// 单个面的几何量与插值权重
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FaceGeometry<S: RuntimeScalar> {
    /// 面积
    pub area: S,
    /// 两侧单元中心距离
    pub delta: S,
    /// 线性插值权重（owner 侧）
    pub weight: S,
    /// 侧相关线性权重 `[owner 侧, neighbour 侧]`
    pub linear_weights: [S; 2],
    /// 侧相关二次修正权重 `[side][axis]`
    pub quadratic_weights: [[S; 3]; 2],
}

impl<S: RuntimeScalar> FaceGeometry<S> {
    /// 中点面：权重 1/2，无二次修正
    pub fn uniform(area: S, delta: S) -> Self {
        Self {
            area,
            delta,
            weight: S::HALF,
            linear_weights: [S::HALF; 2],
            quadratic_weights: [[S::ZERO; 3]; 2],
        }
    }

    /// 设置 owner 侧线性权重 `w`，两侧线性权重随之为 `[1 - w, w]`
    pub fn with_weight(mut self, w: S) -> Self {
        self.weight = w;
        self.linear_weights = [S::ONE - w, w];
        self
    }

    /// 设置某一侧的二次修正权重
    pub fn with_quadratic(mut self, side: Side, q: [S; 3]) -> Self {
        self.quadratic_weights[side.index()] = q;
        self
    }

    fn validate(&self, face: usize) -> Result<(), MeshError> {
        if !(self.area.is_finite() && self.area > S::ZERO) {
            return Err(MeshError::InvalidGeometry { face, quantity: "area" });
        }
        if !(self.delta.is_finite() && self.delta > S::ZERO) {
            return Err(MeshError::InvalidGeometry { face, quantity: "delta" });
        }
        let weights_finite = self.weight.is_finite()
            && self.linear_weights.iter().all(|w| w.is_finite())
            && self.quadratic_weights.iter().flatten().all(|w| w.is_finite());
        if !weights_finite {
            return Err(MeshError::InvalidGeometry { face, quantity: "weights" });
        }
        Ok(())
    }
}

struct PendingPatch<S: RuntimeScalar> {
    name: String,
    faces: Vec<(usize, FaceGeometry<S>)>,
    remote: Option<RemotePatch>,
}

/// 网格构建器
///
/// ```
/// use fv_numerics::mesh::{FaceGeometry, FvMesh, MeshBuilder};
///
/// let mesh = MeshBuilder::new(vec![1.0f64, 1.0])
///     .internal_face(0, 1, FaceGeometry::uniform(1.0, 1.0))
///     .boundary_patch("ends", vec![
///         (0, FaceGeometry::uniform(1.0, 0.5)),
///         (1, FaceGeometry::uniform(1.0, 0.5)),
///     ])
///     .build()
///     .unwrap();
/// assert_eq!(mesh.n_faces(), 3);
/// assert_eq!(mesh.n_cells(), 4);
/// assert_eq!(mesh.neighbour(2), 3);
/// ```
pub struct MeshBuilder<S: RuntimeScalar> {
    volumes: Vec<S>,
    rank: usize,
    n_procs: usize,
    internal: Vec<(usize, usize, FaceGeometry<S>)>,
    physical: Vec<PendingPatch<S>>,
    processor: Vec<PendingPatch<S>>,
}

impl<S: RuntimeScalar> MeshBuilder<S> {
    /// 以本地单元体积创建构建器（单进程）
    pub fn new(volumes: Vec<S>) -> Self {
        Self {
            volumes,
            rank: 0,
            n_procs: 1,
            internal: Vec::new(),
            physical: Vec::new(),
            processor: Vec::new(),
        }
    }

    /// 设置本进程号与进程总数
    pub fn partition(mut self, rank: usize, n_procs: usize) -> Self {
        self.rank = rank;
        self.n_procs = n_procs;
        self
    }

    /// 添加内部面
    pub fn internal_face(mut self, owner: usize, neighbour: usize, geom: FaceGeometry<S>) -> Self {
        self.internal.push((owner, neighbour, geom));
        self
    }

    /// 添加物理边界片，每个面给出 owner 单元
    pub fn boundary_patch(mut self, name: impl Into<String>, faces: Vec<(usize, FaceGeometry<S>)>) -> Self {
        self.physical.push(PendingPatch {
            name: name.into(),
            faces,
            remote: None,
        });
        self
    }

    /// 添加进程间边界片
    ///
    /// `ghost_indices[k]` 是第 k 个面在对端进程上的本地单元编号。
    pub fn processor_patch(
        mut self,
        name: impl Into<String>,
        proc: usize,
        faces: Vec<(usize, FaceGeometry<S>)>,
        ghost_indices: Vec<usize>,
    ) -> Self {
        self.processor.push(PendingPatch {
            name: name.into(),
            faces,
            remote: Some(RemotePatch { proc, ghost_indices }),
        });
        self
    }

    /// 校验并构建网格
    pub fn build(self) -> Result<UnstructuredMesh<S>, MeshError> {
        let Self {
            volumes,
            rank,
            n_procs,
            internal,
            physical,
            processor,
        } = self;

        if rank >= n_procs {
            return Err(MeshError::InvalidRank { rank, n_procs });
        }
        for (cell, v) in volumes.iter().enumerate() {
            if !(v.is_finite() && *v > S::ZERO) {
                return Err(MeshError::InvalidVolume { cell });
            }
        }

        let n_internal_cells = volumes.len();
        let n_internal_faces = internal.len();
        let n_boundary: usize = physical
            .iter()
            .chain(processor.iter())
            .map(|p| p.faces.len())
            .sum();
        let n_faces = n_internal_faces + n_boundary;

        let mut owner = Vec::with_capacity(n_faces);
        let mut neighbour = Vec::with_capacity(n_faces);
        let mut geometry = Vec::with_capacity(n_faces);

        let check_cell = |face: usize, cell: usize| {
            if cell < n_internal_cells {
                Ok(())
            } else {
                Err(MeshError::CellOutOfRange {
                    face,
                    cell,
                    n_cells: n_internal_cells,
                })
            }
        };

        for (face, (o, n, geom)) in internal.into_iter().enumerate() {
            check_cell(face, o)?;
            check_cell(face, n)?;
            if o == n {
                return Err(MeshError::DegenerateFace { face, cell: o });
            }
            geom.validate(face)?;
            owner.push(o);
            neighbour.push(n);
            geometry.push(geom);
        }

        let mut patches = BTreeMap::new();
        let mut n_local_faces = n_internal_faces;
        let n_physical = physical.len();
        for (k, patch) in physical.into_iter().chain(processor).enumerate() {
            if patches.contains_key(&patch.name) {
                return Err(MeshError::DuplicatePatch { name: patch.name });
            }
            if let Some(remote) = &patch.remote {
                if remote.proc >= n_procs || remote.proc == rank {
                    return Err(MeshError::InvalidProcessor {
                        patch: patch.name,
                        proc: remote.proc,
                        rank,
                        n_procs,
                    });
                }
                if remote.ghost_indices.len() != patch.faces.len() {
                    return Err(MeshError::GhostCountMismatch {
                        patch: patch.name,
                        faces: patch.faces.len(),
                        ghosts: remote.ghost_indices.len(),
                    });
                }
            }

            let start_face = owner.len();
            for (o, geom) in &patch.faces {
                let face = owner.len();
                check_cell(face, *o)?;
                geom.validate(face)?;
                owner.push(*o);
                neighbour.push(n_internal_cells + face - n_internal_faces);
                geometry.push(*geom);
            }
            if k < n_physical {
                n_local_faces = owner.len();
            }
            patches.insert(
                patch.name,
                BoundaryPatch {
                    start_face,
                    n_faces: patch.faces.len(),
                    remote: patch.remote,
                },
            );
        }

        // 单元面表（按面编号顺序）
        let mut degree = vec![0usize; n_internal_cells];
        for face in 0..n_faces {
            degree[owner[face]] += 1;
            if face < n_internal_faces {
                degree[neighbour[face]] += 1;
            }
        }
        if let Some((cell, &d)) = degree.iter().enumerate().find(|(_, &d)| d > CELL_DEGREE) {
            return Err(MeshError::DegreeExceeded { cell, degree: d });
        }

        let mut offsets = Vec::with_capacity(n_internal_cells + 1);
        offsets.push(0);
        for d in &degree {
            let last = offsets[offsets.len() - 1];
            offsets.push(last + d);
        }
        let total = offsets[n_internal_cells];
        let mut cell_face_list = vec![0usize; total];
        let mut cell_neighbour_list = vec![None; total];
        let mut cursor = offsets[..n_internal_cells].to_vec();
        for face in 0..n_faces {
            let o = owner[face];
            let (nb_of_owner, nb_of_neighbour) = if face < n_internal_faces {
                (Some(neighbour[face]), Some(o))
            } else {
                (None, None)
            };
            cell_face_list[cursor[o]] = face;
            cell_neighbour_list[cursor[o]] = nb_of_owner;
            cursor[o] += 1;
            if face < n_internal_faces {
                let n = neighbour[face];
                cell_face_list[cursor[n]] = face;
                cell_neighbour_list[cursor[n]] = nb_of_neighbour;
                cursor[n] += 1;
            }
        }

        tracing::debug!(
            rank,
            n_internal_cells,
            n_internal_faces,
            n_local_faces,
            n_faces,
            n_patches = patches.len(),
            "mesh built"
        );

        Ok(UnstructuredMesh {
            n_internal_cells,
            n_internal_faces,
            n_local_faces,
            rank,
            n_procs,
            owner,
            neighbour,
            geometry,
            volumes,
            cell_face_offsets: offsets,
            cell_face_list,
            cell_neighbour_list,
            patches,
        })
    }
}

/// 内存中的非结构化网格
#[derive(Debug, Clone)]
pub struct UnstructuredMesh<S: RuntimeScalar> {
    n_internal_cells: usize,
    n_internal_faces: usize,
    n_local_faces: usize,
    rank: usize,
    n_procs: usize,
    owner: Vec<usize>,
    neighbour: Vec<usize>,
    geometry: Vec<FaceGeometry<S>>,
    volumes: Vec<S>,
    cell_face_offsets: Vec<usize>,
    cell_face_list: Vec<usize>,
    cell_neighbour_list: Vec<Option<usize>>,
    patches: BTreeMap<String, BoundaryPatch>,
}

impl<S: RuntimeScalar> UnstructuredMesh<S> {
    /// 创建构建器
    pub fn builder(volumes: Vec<S>) -> MeshBuilder<S> {
        MeshBuilder::new(volumes)
    }

    /// 面几何
    #[inline]
    pub fn face_geometry(&self, face: usize) -> &FaceGeometry<S> {
        &self.geometry[face]
    }

    /// 全部单元体积
    #[inline]
    pub fn volumes(&self) -> &[S] {
        &self.volumes
    }
}

impl<S: RuntimeScalar> FvMesh<S> for UnstructuredMesh<S> {
    #[inline]
    fn n_faces(&self) -> usize {
        self.owner.len()
    }

    #[inline]
    fn n_local_faces(&self) -> usize {
        self.n_local_faces
    }

    #[inline]
    fn n_internal_faces(&self) -> usize {
        self.n_internal_faces
    }

    #[inline]
    fn n_internal_cells(&self) -> usize {
        self.n_internal_cells
    }

    #[inline]
    fn n_cells(&self) -> usize {
        self.n_internal_cells + self.n_faces() - self.n_internal_faces
    }

    #[inline]
    fn n_procs(&self) -> usize {
        self.n_procs
    }

    #[inline]
    fn rank(&self) -> usize {
        self.rank
    }

    #[inline]
    fn owner(&self, face: usize) -> usize {
        self.owner[face]
    }

    #[inline]
    fn neighbour(&self, face: usize) -> usize {
        self.neighbour[face]
    }

    #[inline]
    fn cell_faces(&self, cell: usize) -> &[usize] {
        &self.cell_face_list[self.cell_face_offsets[cell]..self.cell_face_offsets[cell + 1]]
    }

    #[inline]
    fn cell_neighbours(&self, cell: usize) -> &[Option<usize>] {
        &self.cell_neighbour_list[self.cell_face_offsets[cell]..self.cell_face_offsets[cell + 1]]
    }

    #[inline]
    fn patches(&self) -> &BTreeMap<String, BoundaryPatch> {
        &self.patches
    }

    #[inline]
    fn area(&self, face: usize) -> S {
        self.geometry[face].area
    }

    #[inline]
    fn delta(&self, face: usize) -> S {
        self.geometry[face].delta
    }

    #[inline]
    fn volume(&self, cell: usize) -> S {
        self.volumes[cell]
    }

    #[inline]
    fn weight(&self, face: usize) -> S {
        self.geometry[face].weight
    }

    #[inline]
    fn linear_weight(&self, side: Side, face: usize) -> S {
        self.geometry[face].linear_weights[side.index()]
    }

    #[inline]
    fn quadratic_weight(&self, side: Side, face: usize, axis: usize) -> S {
        self.geometry[face].quadratic_weights[side.index()][axis]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit() -> FaceGeometry<f64> {
        FaceGeometry::uniform(1.0, 1.0)
    }

    #[test]
    fn test_face_numbering_and_ghosts() {
        let mesh = MeshBuilder::new(vec![1.0, 1.0, 1.0])
            .partition(0, 2)
            .internal_face(0, 1, unit())
            .internal_face(1, 2, unit())
            .processor_patch("proc0to1", 1, vec![(2, unit())], vec![0])
            .boundary_patch("wall", vec![(0, unit())])
            .build()
            .unwrap();

        assert_eq!(mesh.n_internal_faces(), 2);
        assert_eq!(mesh.n_local_faces(), 3);
        assert_eq!(mesh.n_faces(), 4);
        assert_eq!(mesh.n_cells(), 5);

        let wall = &mesh.patches()["wall"];
        assert_eq!(wall.start_face, 2);
        let proc = &mesh.patches()["proc0to1"];
        assert_eq!(proc.start_face, 3);
        assert!(mesh.is_remote_face(3));
        assert_eq!(mesh.neighbour(3), 4);
        assert_eq!(mesh.owner(3), 2);
    }

    #[test]
    fn test_cell_face_lists() {
        let mesh = MeshBuilder::new(vec![1.0, 2.0])
            .internal_face(0, 1, unit())
            .boundary_patch("ends", vec![(0, unit()), (1, unit())])
            .build()
            .unwrap();
        assert_eq!(mesh.cell_faces(0), &[0, 1]);
        assert_eq!(mesh.cell_neighbours(0), &[Some(1), None]);
        assert_eq!(mesh.cell_faces(1), &[0, 2]);
        assert_eq!(mesh.cell_neighbours(1), &[Some(0), None]);
        assert_eq!(mesh.volume(1), 2.0);
    }

    #[test]
    fn test_faceless_single_cell() {
        let mesh = MeshBuilder::new(vec![0.5f64]).build().unwrap();
        assert_eq!(mesh.n_faces(), 0);
        assert_eq!(mesh.n_cells(), 1);
        assert!(mesh.cell_faces(0).is_empty());
    }

    #[test]
    fn test_weights() {
        let geom = FaceGeometry::uniform(1.0f64, 1.0)
            .with_weight(0.25)
            .with_quadratic(Side::Neighbour, [0.1, 0.2, 0.3]);
        let mesh = MeshBuilder::new(vec![1.0, 1.0])
            .internal_face(0, 1, geom)
            .build()
            .unwrap();
        assert_eq!(mesh.weight(0), 0.25);
        assert_eq!(mesh.linear_weight(Side::Owner, 0), 0.75);
        assert_eq!(mesh.linear_weight(Side::Neighbour, 0), 0.25);
        assert_eq!(mesh.quadratic_weight(Side::Neighbour, 0, 2), 0.3);
        assert_eq!(mesh.quadratic_weight(Side::Owner, 0, 2), 0.0);
    }

    #[test]
    fn test_validation_errors() {
        let err = MeshBuilder::new(vec![1.0f64, 0.0]).build().unwrap_err();
        assert_eq!(err, MeshError::InvalidVolume { cell: 1 });

        let err = MeshBuilder::new(vec![1.0f64])
            .internal_face(0, 3, unit())
            .build()
            .unwrap_err();
        assert!(matches!(err, MeshError::CellOutOfRange { cell: 3, .. }));

        let err = MeshBuilder::new(vec![1.0f64, 1.0])
            .internal_face(0, 1, FaceGeometry::uniform(1.0, 0.0))
            .build()
            .unwrap_err();
        assert_eq!(err, MeshError::InvalidGeometry { face: 0, quantity: "delta" });

        let err = MeshBuilder::new(vec![1.0f64])
            .boundary_patch("a", vec![(0, unit())])
            .boundary_patch("a", vec![(0, unit())])
            .build()
            .unwrap_err();
        assert!(matches!(err, MeshError::DuplicatePatch { .. }));

        let err = MeshBuilder::new(vec![1.0f64])
            .partition(0, 2)
            .processor_patch("p", 1, vec![(0, unit())], vec![])
            .build()
            .unwrap_err();
        assert!(matches!(err, MeshError::GhostCountMismatch { faces: 1, ghosts: 0, .. }));

        let err = MeshBuilder::new(vec![1.0f64])
            .processor_patch("p", 0, vec![(0, unit())], vec![0])
            .build()
            .unwrap_err();
        assert!(matches!(err, MeshError::InvalidProcessor { .. }));
    }

    #[test]
    fn test_degree_exceeded() {
        let faces = (0..7).map(|_| (0, unit())).collect();
        let err = MeshBuilder::new(vec![1.0f64])
            .boundary_patch("all", faces)
            .build()
            .unwrap_err();
        assert_eq!(err, MeshError::DegreeExceeded { cell: 0, degree: 7 });
    }
}
