//! Input validation for containers and solver controls.
//!
//! All validation functions run eagerly before any computation or
//! communication begins, so a bad argument is reported on the worker that
//! passed it instead of surfacing as a numerical failure several collectives
//! later. Functions return [`ValidationError`], which converts into
//! [`SolverError::InvalidInput`] via `From`.
//!
//! # Limits
//!
//! | Resource           | Limit        | Constant             |
//! |--------------------|--------------|----------------------|
//! | Height / width     | 10,000,000   | [`MAX_DIMENSION`]    |
//! | Local non-zeros    | 100,000,000  | [`MAX_LOCAL_NNZ`]    |
//! | Iterations         | 1,000,000    | [`MAX_ITERATIONS`]   |
//! | Krylov basis size  | 10,000       | [`MAX_BASIS_SIZE`]   |

use crate::error::{SolverError, ValidationError};
use crate::types::CsrMatrix;

// ---------------------------------------------------------------------------
// Resource limits
// ---------------------------------------------------------------------------

/// Maximum global height or width of a matrix or vector.
pub const MAX_DIMENSION: usize = 10_000_000;

/// Maximum number of stored entries in one worker's block.
pub const MAX_LOCAL_NNZ: usize = 100_000_000;

/// Maximum outer or inner iteration budget.
pub const MAX_ITERATIONS: usize = 1_000_000;

/// Maximum FGMRES restart dimension.
pub const MAX_BASIS_SIZE: usize = 10_000;

// ---------------------------------------------------------------------------
// Dimensions
// ---------------------------------------------------------------------------

/// Reject global dimensions that cannot be stored.
///
/// # Errors
///
/// [`SolverError::InvalidDimension`] if either side exceeds
/// [`MAX_DIMENSION`], or if the dense `height * width` footprint of a
/// multi-vector would overflow `usize`.
pub fn validate_dimensions(height: usize, width: usize) -> Result<(), SolverError> {
    if height > MAX_DIMENSION || width > MAX_DIMENSION {
        return Err(SolverError::InvalidDimension {
            height,
            width,
            reason: format!("each side must be at most {MAX_DIMENSION}"),
        });
    }
    if height.checked_mul(width).is_none() {
        return Err(SolverError::InvalidDimension {
            height,
            width,
            reason: "element count overflows usize".into(),
        });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Local CSR block validation
// ---------------------------------------------------------------------------

/// Validate the structural integrity of one worker's CSR block.
///
/// Performs the following checks in order:
///
/// 1. `nnz` is within [`MAX_LOCAL_NNZ`].
/// 2. `row_ptr` length equals `rows + 1`.
/// 3. `row_ptr` starts at 0, is non-decreasing, and ends at `nnz`.
/// 4. `col_indices` length equals `values` length.
/// 5. Column indices are `< cols` and strictly increasing within each row.
/// 6. No `NaN` or `Inf` values.
///
/// # Errors
///
/// Returns [`ValidationError`] describing the first violation found.
///
/// # Examples
///
/// ```
/// use ruvector_dist_solver::types::CsrMatrix;
/// use ruvector_dist_solver::validation::validate_local_block;
///
/// let m = CsrMatrix::from_coo_summed(2, 2, vec![(0, 0, 1.0), (1, 1, 2.0)]);
/// assert!(validate_local_block(&m).is_ok());
/// ```
pub fn validate_local_block(block: &CsrMatrix<f64>) -> Result<(), ValidationError> {
    let nnz = block.values.len();
    if nnz > MAX_LOCAL_NNZ {
        return Err(ValidationError::DimensionMismatch(format!(
            "local nnz {nnz} exceeds maximum allowed {MAX_LOCAL_NNZ}",
        )));
    }

    if block.row_ptr.len() != block.rows + 1 {
        return Err(ValidationError::DimensionMismatch(format!(
            "row_ptr length {} does not equal rows + 1 = {}",
            block.row_ptr.len(),
            block.rows + 1,
        )));
    }

    if block.row_ptr[0] != 0 {
        return Err(ValidationError::DimensionMismatch(format!(
            "row_ptr[0] = {} (expected 0)",
            block.row_ptr[0],
        )));
    }
    if let Some(i) = (1..block.row_ptr.len()).find(|&i| block.row_ptr[i] < block.row_ptr[i - 1]) {
        return Err(ValidationError::DimensionMismatch(format!(
            "row_ptr decreases at position {i}",
        )));
    }
    if block.row_ptr[block.rows] != nnz {
        return Err(ValidationError::DimensionMismatch(format!(
            "values length {nnz} does not match row_ptr[rows] = {}",
            block.row_ptr[block.rows],
        )));
    }

    if block.col_indices.len() != nnz {
        return Err(ValidationError::DimensionMismatch(format!(
            "col_indices length {} does not match values length {nnz}",
            block.col_indices.len(),
        )));
    }

    for row in 0..block.rows {
        let mut prev_col: Option<usize> = None;
        for idx in block.row_ptr[row]..block.row_ptr[row + 1] {
            let col = block.col_indices[idx];
            if col >= block.cols {
                return Err(ValidationError::DimensionMismatch(format!(
                    "column {col} in local row {row} out of range (cols={})",
                    block.cols,
                )));
            }
            if prev_col.is_some_and(|pc| col <= pc) {
                return Err(ValidationError::DimensionMismatch(format!(
                    "columns of local row {row} are not strictly increasing",
                )));
            }
            prev_col = Some(col);

            let val = block.values[idx];
            if !val.is_finite() {
                return Err(ValidationError::NonFiniteValue(format!(
                    "block[{row}, {col}] = {val}",
                )));
            }
        }
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Values
// ---------------------------------------------------------------------------

/// Reject NaN or infinite entries in `values`.
pub fn validate_finite(what: &str, values: &[f64]) -> Result<(), ValidationError> {
    match values.iter().position(|v| !v.is_finite()) {
        Some(i) => Err(ValidationError::NonFiniteValue(format!(
            "{what}[{i}] = {}",
            values[i],
        ))),
        None => Ok(()),
    }
}

// ---------------------------------------------------------------------------
// Solver parameters
// ---------------------------------------------------------------------------

/// Require a relative tolerance in the open interval `(0, 1)`.
pub fn validate_tolerance(name: &str, value: f64) -> Result<(), ValidationError> {
    if !value.is_finite() || value <= 0.0 || value >= 1.0 {
        return Err(ValidationError::ParameterOutOfRange {
            name: name.into(),
            value: format!("{value:.2e}"),
            expected: "(0.0, 1.0)".into(),
        });
    }
    Ok(())
}

/// Require a count in `[1, max]`.
pub fn validate_count(name: &str, value: usize, max: usize) -> Result<(), ValidationError> {
    if value == 0 || value > max {
        return Err(ValidationError::ParameterOutOfRange {
            name: name.into(),
            value: value.to_string(),
            expected: format!("[1, {max}]"),
        });
    }
    Ok(())
}

/// Require a finite, non-negative value.
pub fn validate_non_negative(name: &str, value: f64) -> Result<(), ValidationError> {
    if !value.is_finite() || value < 0.0 {
        return Err(ValidationError::ParameterOutOfRange {
            name: name.into(),
            value: value.to_string(),
            expected: "finite value >= 0".into(),
        });
    }
    Ok(())
}
