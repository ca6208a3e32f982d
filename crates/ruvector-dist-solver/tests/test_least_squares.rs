//! Integration tests for the least-squares driver.
//!
//! The Lauchli matrix has nearly parallel columns, which makes it the
//! classic stress test for normal-equation approaches.

mod helpers;

use ruvector_dist_solver::control::LeastSquaresControl;
use ruvector_dist_solver::gallery::lauchli;
use ruvector_dist_solver::vector::DistMultiVec;
use ruvector_dist_solver::{least_squares, SolverError, ThreadGroup, WorkerContext};

use helpers::{
    dense_least_squares, dense_matvec_t, dense_solve, distribute, gather_column, random_vector,
    relative_error,
};

fn lauchli_dense(n: usize, mu: f64) -> Vec<Vec<f64>> {
    let mut a = vec![vec![0.0; n]; n + 1];
    a[0].fill(1.0);
    for i in 0..n {
        a[i + 1][i] = mu;
    }
    a
}

fn exact_control(rel_tol: f64) -> LeastSquaresControl {
    let mut ctrl = LeastSquaresControl::default();
    ctrl.solve_ctrl.rel_tol = rel_tol;
    ctrl.alpha = 0.0;
    ctrl.basis_size = 20;
    ctrl
}

#[test]
fn test_lauchli_matches_dense_normal_equations() {
    let (n, mu) = (12, 0.1);
    let b = random_vector(n + 1, 31);
    let exact = dense_least_squares(&lauchli_dense(n, mu), &b);

    for workers in [1, 2, 3, 4] {
        let out = ThreadGroup::run(workers, |ctx| {
            let a = lauchli(ctx.clone(), n, mu).unwrap();
            let rhs = distribute(ctx.clone(), n + 1, 1, &b);
            let mut x = DistMultiVec::zeros(ctx, n, 1).unwrap();
            let report = least_squares(&a, &rhs, &mut x, &exact_control(1e-13)).unwrap();
            (gather_column(&x, 0), report)
        });
        for (x, report) in out {
            let err = relative_error(&x, &exact);
            assert!(err < 1e-8, "workers={workers}: err={err:.3e}");
            assert!(report.converged());
        }
    }
}

#[test]
fn test_regularized_least_squares() {
    let (n, mu, alpha) = (8, 0.05, 0.3);
    let a = lauchli_dense(n, mu);
    let b = random_vector(n + 1, 5);

    // (A^T A + alpha^2 I) x = A^T b
    let mut reg = vec![vec![0.0; n]; n];
    for row in &a {
        for p in 0..n {
            for q in 0..n {
                reg[p][q] += row[p] * row[q];
            }
        }
    }
    for (p, row) in reg.iter_mut().enumerate() {
        row[p] += alpha * alpha;
    }
    let exact = dense_solve(&reg, &dense_matvec_t(&a, &b));

    let out = ThreadGroup::run(2, |ctx| {
        let a = lauchli(ctx.clone(), n, mu).unwrap();
        let rhs = distribute(ctx.clone(), n + 1, 1, &b);
        let mut x = DistMultiVec::zeros(ctx, n, 1).unwrap();
        let mut ctrl = exact_control(1e-13);
        ctrl.alpha = alpha;
        ctrl.equilibrate = false;
        ctrl.scale_two_norm = false;
        least_squares(&a, &rhs, &mut x, &ctrl).unwrap();
        gather_column(&x, 0)
    });
    for x in out {
        assert!(relative_error(&x, &exact) < 1e-9);
    }
}

#[test]
fn test_consistent_system_is_solved_exactly() {
    // b = A x_true lies in the range of A, so the residual vanishes.
    let (n, mu) = (6, 0.5);
    let a = lauchli_dense(n, mu);
    let x_true: Vec<f64> = (0..n).map(|i| 1.0 + i as f64).collect();
    let b: Vec<f64> = a.iter().map(|row| row.iter().zip(&x_true).map(|(p, q)| p * q).sum()).collect();

    let out = ThreadGroup::run(3, |ctx| {
        let a = lauchli(ctx.clone(), n, mu).unwrap();
        let rhs = distribute(ctx.clone(), n + 1, 1, &b);
        let mut x = DistMultiVec::zeros(ctx, n, 1).unwrap();
        least_squares(&a, &rhs, &mut x, &exact_control(1e-13)).unwrap();
        gather_column(&x, 0)
    });
    for x in out {
        assert!(relative_error(&x, &x_true) < 1e-9);
    }
}

#[test]
fn test_solution_shape_mismatch_rejected() {
    let ctx = WorkerContext::single();
    let a = lauchli(ctx.clone(), 3, 1.0).unwrap();
    // X must have height = width of A.
    let b = DistMultiVec::zeros(ctx.clone(), 4, 1).unwrap();
    let mut x = DistMultiVec::zeros(ctx, 4, 1).unwrap();
    assert!(matches!(
        least_squares(&a, &b, &mut x, &LeastSquaresControl::default()),
        Err(SolverError::InvalidInput(_))
    ));
}
