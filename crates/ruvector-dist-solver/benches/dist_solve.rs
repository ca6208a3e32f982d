//! Benchmarks for distributed assembly, multiplication, and solves.
//!
//! Multi-worker cases spawn a fresh [`ThreadGroup`] per iteration, so they
//! include thread start-up; compare them against each other rather than
//! against the single-worker kernels.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use ruvector_dist_solver::control::LeastSquaresControl;
use ruvector_dist_solver::gallery::fd2d;
use ruvector_dist_solver::matrix::{DistSparseMatrix, DistSparseMatrixBuilder};
use ruvector_dist_solver::vector::DistMultiVec;
use ruvector_dist_solver::{linear_solve, multiply, Algorithm, Orientation, ThreadGroup, WorkerContext};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Random sparse `n x n` matrix with about `per_row` off-diagonal entries per
/// row and a dominant diagonal.
fn random_matrix(ctx: WorkerContext, n: usize, per_row: usize, seed: u64) -> DistSparseMatrix {
    let mut rng = StdRng::seed_from_u64(seed.wrapping_add(ctx.rank() as u64));
    let mut builder = DistSparseMatrixBuilder::with_dimensions(ctx, n, n).unwrap();
    builder.reserve(builder.local_height() * (per_row + 1));
    for l in 0..builder.local_height() {
        let i = builder.global_row(l);
        for _ in 0..per_row {
            let j = rng.gen_range(0..n);
            builder.queue_local_update(l, j, rng.gen_range(-1.0..1.0)).unwrap();
        }
        builder.queue_local_update(l, i, per_row as f64 + 1.0).unwrap();
    }
    builder.process_queues().unwrap()
}

fn control(alg: Algorithm) -> LeastSquaresControl {
    let mut ctrl = LeastSquaresControl::default();
    ctrl.solve_ctrl.alg = alg;
    ctrl.solve_ctrl.rel_tol = 1e-10;
    ctrl
}

// ---------------------------------------------------------------------------
// Kernels
// ---------------------------------------------------------------------------

fn spmv_single_worker(c: &mut Criterion) {
    let mut group = c.benchmark_group("spmv");
    group.warm_up_time(Duration::from_secs(2));

    for &n in &[1_000, 10_000, 100_000] {
        let ctx = WorkerContext::single();
        let a = random_matrix(ctx.clone(), n, 8, 42);
        let x = DistMultiVec::uniform_seeded(ctx.clone(), n, 1, 7).unwrap();
        let mut y = DistMultiVec::zeros(ctx, n, 1).unwrap();

        group.sample_size(if n >= 100_000 { 20 } else { 100 });
        group.throughput(Throughput::Elements(a.local_nnz() as u64));

        group.bench_with_input(BenchmarkId::new("normal", n), &n, |b, _| {
            b.iter(|| {
                multiply(Orientation::Normal, 1.0, criterion::black_box(&a), &x, 0.0, &mut y).unwrap();
            });
        });
        group.bench_with_input(BenchmarkId::new("transpose", n), &n, |b, _| {
            b.iter(|| {
                multiply(Orientation::Transpose, 1.0, criterion::black_box(&a), &x, 0.0, &mut y).unwrap();
            });
        });
    }
    group.finish();
}

// ---------------------------------------------------------------------------
// Solves
// ---------------------------------------------------------------------------

fn fd2d_by_worker_count(c: &mut Criterion) {
    let mut group = c.benchmark_group("fd2d_linear_solve");
    group.sample_size(10);
    group.measurement_time(Duration::from_secs(10));

    let (n0, n1) = (60, 60);
    for &workers in &[1, 2, 4] {
        group.bench_with_input(BenchmarkId::new("workers", workers), &workers, |b, &workers| {
            b.iter(|| {
                ThreadGroup::run(workers, |ctx| {
                    let a = fd2d(ctx.clone(), n0, n1).unwrap();
                    let mut x = DistMultiVec::uniform_seeded(ctx, n0 * n1, 1, 1).unwrap();
                    linear_solve(&a, &mut x, &control(Algorithm::RegRefineFgmres))
                        .unwrap()
                        .max_iterations()
                })
            });
        });
    }
    group.finish();
}

fn refinement_vs_plain(c: &mut Criterion) {
    let mut group = c.benchmark_group("refinement_vs_plain");
    group.sample_size(20);

    let ctx = WorkerContext::single();
    let a = fd2d(ctx.clone(), 40, 40).unwrap();
    let b = DistMultiVec::uniform_seeded(ctx, 1600, 1, 3).unwrap();

    for alg in [Algorithm::RegRefineFgmres, Algorithm::Fgmres] {
        let ctrl = control(alg);
        group.bench_function(alg.to_string(), |bench| {
            bench.iter(|| {
                let mut x = b.clone();
                linear_solve(criterion::black_box(&a), &mut x, &ctrl).unwrap()
            });
        });
    }
    group.finish();
}

criterion_group!(dist_solve, spmv_single_worker, fd2d_by_worker_count, refinement_vs_plain);
criterion_main!(dist_solve);
