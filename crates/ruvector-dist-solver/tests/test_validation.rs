//! Integration tests for input validation.
//!
//! Tests cover rejection of NaN and Inf values, malformed local CSR blocks,
//! oversized dimensions, and out-of-range solver controls.

use ruvector_dist_solver::control::{LeastSquaresControl, SolveControl};
use ruvector_dist_solver::error::{SolverError, ValidationError};
use ruvector_dist_solver::matrix::DistSparseMatrix;
use ruvector_dist_solver::types::CsrMatrix;
use ruvector_dist_solver::validation::{
    validate_dimensions, validate_finite, validate_local_block, MAX_DIMENSION,
};
use ruvector_dist_solver::{ThreadGroup, WorkerContext};

// ---------------------------------------------------------------------------
// Helper: a valid local block
// ---------------------------------------------------------------------------

fn valid_block(rows: usize, cols: usize) -> CsrMatrix<f64> {
    CsrMatrix::from_coo_summed(rows, cols, (0..rows).map(|i| (i, i % cols, 1.0)))
}

// ---------------------------------------------------------------------------
// Local blocks
// ---------------------------------------------------------------------------

#[test]
fn test_reject_nan_in_block() {
    let mut block = valid_block(3, 3);
    block.values[1] = f64::NAN;
    let err = validate_local_block(&block).unwrap_err();
    assert!(
        matches!(err, ValidationError::NonFiniteValue(_)),
        "expected NonFiniteValue, got {err:?}"
    );
}

#[test]
fn test_reject_unsorted_columns() {
    let block = CsrMatrix {
        row_ptr: vec![0, 2],
        col_indices: vec![2, 1],
        values: vec![1.0, 1.0],
        rows: 1,
        cols: 3,
    };
    assert!(matches!(
        validate_local_block(&block),
        Err(ValidationError::DimensionMismatch(_))
    ));
}

#[test]
fn test_reject_decreasing_row_ptr() {
    let block = CsrMatrix {
        row_ptr: vec![0, 2, 1, 2],
        col_indices: vec![0, 1],
        values: vec![1.0, 1.0],
        rows: 3,
        cols: 3,
    };
    assert!(validate_local_block(&block).is_err());
}

#[test]
fn test_reject_column_out_of_range() {
    let block = CsrMatrix {
        row_ptr: vec![0, 1],
        col_indices: vec![5],
        values: vec![1.0],
        rows: 1,
        cols: 5,
    };
    assert!(validate_local_block(&block).is_err());
}

#[test]
fn test_malformed_block_fails_on_every_worker() {
    let results = ThreadGroup::run(2, |ctx| {
        let mut block = valid_block(2, 4);
        if ctx.rank() == 1 {
            block.values[0] = f64::INFINITY;
        }
        DistSparseMatrix::from_local_block(ctx, 4, 4, block).map(|_| ())
    });
    for r in results {
        assert!(matches!(r, Err(SolverError::InvalidInput(_))), "{r:?}");
    }
}

#[test]
fn test_from_local_block_accepts_valid_blocks() {
    let results = ThreadGroup::run(2, |ctx| {
        let rank = ctx.rank();
        let block = CsrMatrix::from_coo_summed(2, 4, vec![(0, 2 * rank, 1.0), (1, 2 * rank + 1, 2.0)]);
        let a = DistSparseMatrix::from_local_block(ctx, 4, 4, block).unwrap();
        a.nnz().unwrap()
    });
    assert_eq!(results, vec![4, 4]);
}

// ---------------------------------------------------------------------------
// Dimensions and values
// ---------------------------------------------------------------------------

#[test]
fn test_reject_oversized_dimensions() {
    assert!(validate_dimensions(MAX_DIMENSION, 1).is_ok());
    assert!(matches!(
        validate_dimensions(MAX_DIMENSION + 1, 1),
        Err(SolverError::InvalidDimension { .. })
    ));
    let builder = ruvector_dist_solver::DistSparseMatrixBuilder::with_dimensions(
        WorkerContext::single(),
        1,
        MAX_DIMENSION + 1,
    );
    assert!(builder.is_err());
}

#[test]
fn test_reject_inf_values() {
    assert!(validate_finite("rhs", &[1.0, 2.0]).is_ok());
    let err = validate_finite("rhs", &[1.0, f64::NEG_INFINITY]).unwrap_err();
    assert!(err.to_string().contains("rhs[1]"));
}

// ---------------------------------------------------------------------------
// Controls
// ---------------------------------------------------------------------------

#[test]
fn test_reject_out_of_range_controls() {
    let bad_solve = [
        SolveControl {
            rel_tol: 0.0,
            ..SolveControl::default()
        },
        SolveControl {
            rel_tol_refine: f64::NAN,
            ..SolveControl::default()
        },
        SolveControl {
            max_refine_iterations: 0,
            ..SolveControl::default()
        },
    ];
    for ctrl in bad_solve {
        assert!(
            matches!(ctrl.validate(), Err(ValidationError::ParameterOutOfRange { .. })),
            "{ctrl:?}"
        );
    }

    let bad_ls = [
        LeastSquaresControl {
            alpha: f64::INFINITY,
            ..LeastSquaresControl::default()
        },
        LeastSquaresControl {
            basis_size: 1_000_000,
            ..LeastSquaresControl::default()
        },
        LeastSquaresControl {
            equilibrate_iterations: 0,
            ..LeastSquaresControl::default()
        },
    ];
    for ctrl in bad_ls {
        assert!(ctrl.validate().is_err(), "{ctrl:?}");
    }
}

#[test]
fn test_control_loaded_from_json() {
    let ctrl = LeastSquaresControl::from_json(
        r#"{
            "alpha": 0.0,
            "progress": true,
            "solve_ctrl": { "alg": "Fgmres", "max_iterations": 25 }
        }"#,
    )
    .unwrap();
    assert_eq!(ctrl.alpha, 0.0);
    assert!(ctrl.progress);
    assert_eq!(ctrl.solve_ctrl.max_iterations, 25);
    assert_eq!(ctrl.basis_size, LeastSquaresControl::default().basis_size);
}
