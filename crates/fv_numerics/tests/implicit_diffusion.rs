// crates/fv_numerics/tests/implicit_diffusion.rs

//! 隐式扩散子步验证
//!
//! - 一维链网格的矩阵结构
//! - 与三对角直接解对比
//! - 零通量边界下的总量守恒
//! - 两进程分区组装与单进程组装一致
//! - 失败时输出场保持原样

use fv_foundation::MemoryTracker;
use fv_numerics::linear_algebra::{KrylovMethod, PreconditionerKind};
use fv_numerics::prelude::*;
use fv_numerics::testing::RecordingBackend;
use fv_numerics::{AssemblyError, SolveError, SparseEntries};

// ============================================================================
// 辅助函数
// ============================================================================

/// 三对角系统直接解 (Thomas 算法)
fn thomas(lower: &[f64], diag: &[f64], upper: &[f64], rhs: &[f64]) -> Vec<f64> {
    let n = diag.len();
    let mut c = vec![0.0; n];
    let mut d = vec![0.0; n];
    c[0] = upper[0] / diag[0];
    d[0] = rhs[0] / diag[0];
    for i in 1..n {
        let m = diag[i] - lower[i] * c[i - 1];
        c[i] = if i + 1 < n { upper[i] / m } else { 0.0 };
        d[i] = (rhs[i] - lower[i] * d[i - 1]) / m;
    }
    let mut x = d.clone();
    for i in (0..n - 1).rev() {
        x[i] = d[i] - c[i] * x[i + 1];
    }
    x
}

fn unit_diffusivity(mesh: &UnstructuredMesh<f64>) -> Vec<f64> {
    vec![1.0; mesh.n_faces()]
}

fn tight_settings(method: KrylovMethod, preconditioner: PreconditionerKind) -> LinearSolverSettings {
    LinearSolverSettings {
        method,
        preconditioner,
        rtol: 1e-11,
        ..LinearSolverSettings::default()
    }
}

// ============================================================================
// 矩阵结构
// ============================================================================

#[test]
fn chain_operator_structure() {
    let dt = 0.25;
    let mesh = chain_1d(5, 1.0f64, 1.0).unwrap();
    let assembler = DiffusionAssembler::new(&mesh, PartitionLayout::single(5)).unwrap();
    let d = unit_diffusivity(&mesh);
    let entries = assembler
        .assemble(&Field::shared(mesh.n_faces(), &d).unwrap(), dt)
        .unwrap();

    for i in 0usize..5 {
        let neighbours = [i.checked_sub(1), (i + 1 < 5).then_some(i + 1)];
        let count = neighbours.iter().flatten().count() as f64;
        for &j in neighbours.iter().flatten() {
            assert_eq!(entries.get(i, j), -1.0);
        }
        assert!((entries.get(i, i) - 1.0 / dt - count).abs() < 1e-14);
    }
    assert_eq!(entries.get(0, 2), 0.0);
    // 每行: 对角元 + 真实邻居
    assert_eq!(entries.len(), 5 + 2 * 4);
}

#[test]
fn scaled_geometry_enters_conductance() {
    let dx = 0.5f64;
    let area = 4.0f64;
    let mesh = chain_1d(3, dx, area).unwrap();
    let assembler = DiffusionAssembler::new(&mesh, PartitionLayout::single(3)).unwrap();
    let d = vec![3.0; mesh.n_faces()];
    let entries = assembler
        .assemble(&Field::shared(mesh.n_faces(), &d).unwrap(), 1.0)
        .unwrap();
    // K = A·D/δ = 4·3/0.5 = 24, V = 2
    assert!((entries.get(1, 0) + 12.0).abs() < 1e-12);
    assert!((entries.get(1, 1) - 25.0).abs() < 1e-12);
}

// ============================================================================
// 求解
// ============================================================================

#[test]
fn chain_unit_step_matches_direct_solution() {
    let dt = 1.0;
    let mesh = chain_1d(5, 1.0f64, 1.0).unwrap();
    let assembler = DiffusionAssembler::new(&mesh, PartitionLayout::single(5)).unwrap();
    let d = unit_diffusivity(&mesh);
    let diffusivity = Field::shared(mesh.n_faces(), &d).unwrap();

    let u_data = [1.0, 1.0, 0.0, 0.0, 0.0];
    let u: Field<f64> = Field::shared(5, &u_data).unwrap();

    let lower = [0.0, -1.0, -1.0, -1.0, -1.0];
    let upper = [-1.0, -1.0, -1.0, -1.0, 0.0];
    let diag: Vec<f64> = (0..5)
        .map(|i| 1.0 / dt + if i == 0 || i == 4 { 1.0 } else { 2.0 })
        .collect();
    let rhs: Vec<f64> = u_data.iter().map(|v| v / dt).collect();
    let expected = thomas(&lower, &diag, &upper, &rhs);

    for (method, precond) in [
        (KrylovMethod::Gmres { restart: 30 }, PreconditionerKind::Amg),
        (KrylovMethod::Gmres { restart: 3 }, PreconditionerKind::Jacobi),
        (KrylovMethod::BiCgStab, PreconditionerKind::None),
    ] {
        let mut backend = KrylovBackend::new(tight_settings(method, precond));
        let tracker = MemoryTracker::new();
        let mut un: Field<f64> = Field::new(5, &tracker).unwrap();
        let stats = assembler
            .assemble_and_solve(&u, &diffusivity, dt, &mut backend, &mut un)
            .unwrap();
        assert_eq!(stats.len(), 1);
        for (got, want) in un.as_slice().iter().zip(&expected) {
            assert!((got - want).abs() < 1e-6, "{method:?}/{precond:?}: {got} vs {want}");
        }
    }
}

#[test]
fn multiple_columns_are_independent() {
    let dt = 0.5;
    let mesh = chain_1d(4, 1.0f64, 1.0).unwrap();
    let assembler = DiffusionAssembler::new(&mesh, PartitionLayout::single(4)).unwrap();
    let d = unit_diffusivity(&mesh);
    let diffusivity = Field::shared(mesh.n_faces(), &d).unwrap();

    let a = [1.0, 2.0, 3.0, 4.0];
    let b = [0.0, -1.0, 5.0, 0.25];
    let interleaved: Vec<f64> = a.iter().zip(&b).flat_map(|(x, y)| [*x, *y]).collect();
    let u: Field<f64, 2> = Field::shared(4, &interleaved).unwrap();

    let tracker = MemoryTracker::new();
    let mut un: Field<f64, 2> = Field::new(4, &tracker).unwrap();
    let mut backend = KrylovBackend::new(tight_settings(KrylovMethod::default(), PreconditionerKind::Amg));
    let stats = assembler
        .assemble_and_solve(&u, &diffusivity, dt, &mut backend, &mut un)
        .unwrap();
    assert_eq!(stats.len(), 2);

    for (j, column) in [a, b].iter().enumerate() {
        let single: Field<f64> = Field::shared(4, column).unwrap();
        let mut out: Field<f64> = Field::new(4, &tracker).unwrap();
        assembler
            .assemble_and_solve(&single, &diffusivity, dt, &mut backend, &mut out)
            .unwrap();
        for i in 0..4 {
            assert!((un.at2(i, j) - out.as_slice()[i]).abs() < 1e-9);
        }
    }
}

#[test]
fn zero_flux_boundaries_conserve_total() {
    let mesh = chain_1d(8, 0.5f64, 2.0).unwrap();
    let assembler = DiffusionAssembler::new(&mesh, PartitionLayout::single(8)).unwrap();
    let d: Vec<f64> = (0..mesh.n_faces()).map(|f| 0.5 + (f % 3) as f64).collect();
    let diffusivity = Field::shared(mesh.n_faces(), &d).unwrap();

    let u_data: Vec<f64> = (0..8).map(|i| if i < 3 { 4.0 } else { 0.0 }).collect();
    let u: Field<f64> = Field::shared(8, &u_data).unwrap();
    let tracker = MemoryTracker::new();
    let mut un: Field<f64> = Field::new(8, &tracker).unwrap();
    let mut backend = KrylovBackend::new(tight_settings(KrylovMethod::BiCgStab, PreconditionerKind::Jacobi));

    assembler
        .assemble_and_solve(&u, &diffusivity, 0.2, &mut backend, &mut un)
        .unwrap();
    let before: f64 = u_data.iter().sum();
    let after = un.reduce_sum(0, 8);
    assert!((before - after).abs() < 1e-8, "{before} vs {after}");
    // 扩散只会削平峰值
    assert!(un.as_slice().iter().all(|&v| (0.0..=4.0).contains(&v)));
    assert!(!un.has_nan());
}

#[test]
fn change_on_one_side_equals_flux_through_cut() {
    let dt = 0.5;
    let mesh = chain_1d(6, 1.0f64, 1.0).unwrap();
    let assembler = DiffusionAssembler::new(&mesh, PartitionLayout::single(6)).unwrap();
    let d = unit_diffusivity(&mesh);
    let diffusivity = Field::shared(mesh.n_faces(), &d).unwrap();

    let u_data = [2.0, 2.0, 2.0, 0.0, 0.0, 0.0];
    let u: Field<f64> = Field::shared(6, &u_data).unwrap();
    let tracker = MemoryTracker::new();
    let mut un: Field<f64> = Field::new(6, &tracker).unwrap();
    let mut backend = KrylovBackend::new(tight_settings(KrylovMethod::default(), PreconditionerKind::Amg));
    assembler
        .assemble_and_solve(&u, &diffusivity, dt, &mut backend, &mut un)
        .unwrap();

    // 单元 2 与 3 之间的面，K = 1
    let change: f64 = (0..3).map(|i| (un[i] - u_data[i]) / dt).sum();
    let flux = un[3] - un[2];
    assert!(flux < 0.0);
    assert!((change - flux).abs() < 1e-8, "{change} vs {flux}");
}

#[test]
fn single_faceless_cell_keeps_value() {
    let mesh = MeshBuilder::new(vec![1.0f64]).build().unwrap();
    let assembler = DiffusionAssembler::new(&mesh, PartitionLayout::single(1)).unwrap();
    let empty: Field<f64> = Field::empty();
    let entries = assembler.assemble(&empty, 0.01).unwrap();
    assert_eq!(entries.iter().collect::<Vec<_>>(), vec![(0, 0, 100.0)]);

    let u_data = [7.5];
    let u: Field<f64> = Field::shared(1, &u_data).unwrap();
    let tracker = MemoryTracker::new();
    let mut un: Field<f64> = Field::new(1, &tracker).unwrap();
    let mut backend = KrylovBackend::default();
    assembler
        .assemble_and_solve(&u, &empty, 0.01, &mut backend, &mut un)
        .unwrap();
    assert!((un.as_slice()[0] - 7.5).abs() < 1e-9);
}

#[test]
fn single_precision_converges_with_default_tolerance() {
    let n = 400;
    let dt = 100.0f32;
    let mesh = chain_1d(n, 1.0f32, 1.0).unwrap();
    let assembler = DiffusionAssembler::new(&mesh, PartitionLayout::single(n)).unwrap();
    let d = vec![1.0f32; mesh.n_faces()];
    let diffusivity = Field::shared(mesh.n_faces(), &d).unwrap();

    let u_data: Vec<f32> = (0..n).map(|i| if i < n / 2 { 1.0 } else { 0.0 }).collect();
    let u: Field<f32> = Field::shared(n, &u_data).unwrap();
    let tracker = MemoryTracker::new();
    let mut un: Field<f32> = Field::new(n, &tracker).unwrap();
    let mut backend = KrylovBackend::<f32>::default();
    assert_eq!(backend.settings().rtol, 1e-10);

    let stats = assembler
        .assemble_and_solve(&u, &diffusivity, dt, &mut backend, &mut un)
        .unwrap();
    assert!(stats[0].relative_residual < 1e-3);
    let before: f32 = u_data.iter().sum();
    let after = un.reduce_sum(0, n);
    assert!((before - after).abs() / before < 1e-3, "{before} vs {after}");
}

// ============================================================================
// 分区
// ============================================================================

fn accumulate_union(parts: &[SparseEntries<f64>]) -> std::collections::BTreeMap<(usize, usize), f64> {
    let mut all = SparseEntries::new();
    for p in parts {
        all.extend(p.clone());
    }
    all.accumulate()
}

#[test]
fn partitioned_assembly_matches_serial() {
    let dt = 0.5;
    let n_total = 7;
    let counts = fv_numerics::partition_counts(n_total, 2);

    let serial = chain_1d(n_total, 1.0f64, 1.0).unwrap();
    let serial_entries = DiffusionAssembler::new(&serial, PartitionLayout::single(n_total))
        .unwrap()
        .assemble(&Field::shared(serial.n_faces(), &unit_diffusivity(&serial)).unwrap(), dt)
        .unwrap();

    let mut parts = Vec::new();
    for rank in 0..2 {
        let mesh = chain_1d_partition(n_total, 2, rank, 1.0f64, 1.0).unwrap();
        let layout = PartitionLayout::new(rank, &counts).unwrap();
        let assembler = DiffusionAssembler::new(&mesh, layout).unwrap();
        assert_eq!(assembler.coupling().len(), 1);
        let d = unit_diffusivity(&mesh);
        parts.push(assembler.assemble(&Field::shared(mesh.n_faces(), &d).unwrap(), dt).unwrap());
    }

    // 分界处: 行 3 (rank 0 最后一个单元) 与行 4 (rank 1 第一个单元)
    assert_eq!(parts[0].get(3, 4), -1.0);
    assert_eq!(parts[1].get(4, 3), -1.0);
    assert_eq!(accumulate_union(&parts), serial_entries.accumulate());
}

#[test]
fn partitioned_rank_solves_through_recording_backend() {
    let counts = [2, 2];
    let mesh = chain_1d_partition(4, 2, 1, 1.0f64, 1.0).unwrap();
    let assembler = DiffusionAssembler::new(&mesh, PartitionLayout::new(1, &counts).unwrap()).unwrap();
    let d = unit_diffusivity(&mesh);
    let diffusivity = Field::shared(mesh.n_faces(), &d).unwrap();

    let u_data = [3.0, 6.0];
    let u: Field<f64> = Field::shared(2, &u_data).unwrap();
    let tracker = MemoryTracker::new();
    let mut un: Field<f64> = Field::new(2, &tracker).unwrap();
    let mut backend = RecordingBackend::new();
    assembler
        .assemble_and_solve(&u, &diffusivity, 1.0, &mut backend, &mut un)
        .unwrap();

    let recorded = backend.entries().unwrap();
    assert_eq!(recorded.get(2, 1), -1.0);
    assert_eq!(backend.layout().unwrap().row_base(), 2);
    // 行 2 的跨进程面计入对角元，行 3 的端面不计入
    assert_eq!(backend.diagonal(), &[3.0, 2.0]);
    assert_eq!(un.as_slice(), &[1.0, 3.0]);
}

#[test]
fn in_process_backend_rejects_coupled_columns() {
    let mesh = chain_1d_partition(4, 2, 0, 1.0f64, 1.0).unwrap();
    let assembler = DiffusionAssembler::new(&mesh, PartitionLayout::new(0, &[2, 2]).unwrap()).unwrap();
    let d = unit_diffusivity(&mesh);
    let diffusivity = Field::shared(mesh.n_faces(), &d).unwrap();
    let u_data = [1.0, 1.0];
    let u: Field<f64> = Field::shared(2, &u_data).unwrap();
    let mut out = [0.0; 2];
    let mut un: Field<f64> = Field::borrowed(2, &mut out).unwrap();

    let err = assembler
        .assemble_and_solve(&u, &diffusivity, 1.0, &mut KrylovBackend::<f64>::default(), &mut un)
        .unwrap_err();
    assert_eq!(err, AssemblyError::Solve(SolveError::OffProcessColumn { row: 1, col: 2 }));
}

// ============================================================================
// 错误路径
// ============================================================================

#[test]
fn failure_in_later_column_leaves_output_untouched() {
    let mesh = chain_1d(3, 1.0f64, 1.0).unwrap();
    let assembler = DiffusionAssembler::new(&mesh, PartitionLayout::single(3)).unwrap();
    let d = unit_diffusivity(&mesh);
    let diffusivity = Field::shared(mesh.n_faces(), &d).unwrap();
    let u_data = [1.0; 9];
    let u: Field<f64, 3> = Field::shared(3, &u_data).unwrap();
    let mut out = [-2.0; 9];

    {
        let mut un: Field<f64, 3> = Field::borrowed(3, &mut out).unwrap();
        let mut backend = RecordingBackend::new().fail_after(2);
        let err = assembler
            .assemble_and_solve(&u, &diffusivity, 1.0, &mut backend, &mut un)
            .unwrap_err();
        assert_eq!(err, AssemblyError::Solve(SolveError::Breakdown { iterations: 0 }));
        assert_eq!(backend.solve_calls(), 3);
    }
    assert_eq!(out, [-2.0; 9]);
}

#[test]
fn read_only_output_is_rejected() {
    let mesh = chain_1d(2, 1.0f64, 1.0).unwrap();
    let assembler = DiffusionAssembler::new(&mesh, PartitionLayout::single(2)).unwrap();
    let d = unit_diffusivity(&mesh);
    let diffusivity = Field::shared(mesh.n_faces(), &d).unwrap();
    let data = [1.0, 2.0];
    let u: Field<f64> = Field::shared(2, &data).unwrap();
    let mut un: Field<f64> = Field::shared(2, &data).unwrap();
    let mut backend = RecordingBackend::new();
    assert_eq!(
        assembler
            .assemble_and_solve(&u, &diffusivity, 1.0, &mut backend, &mut un)
            .unwrap_err(),
        AssemblyError::ReadOnlyOutput
    );
    assert_eq!(backend.assemble_calls(), 0);
}
