//! Solver controls.
//!
//! Both control structs deserialize with `#[serde(default)]`, so a JSON
//! document only has to name the fields it overrides:
//!
//! ```rust
//! use ruvector_dist_solver::control::LeastSquaresControl;
//!
//! let ctrl = LeastSquaresControl::from_json(
//!     r#"{ "basis_size": 30, "solve_ctrl": { "rel_tol": 1e-10 } }"#,
//! ).unwrap();
//! assert_eq!(ctrl.basis_size, 30);
//! assert_eq!(ctrl.solve_ctrl.rel_tol, 1e-10);
//! assert!(ctrl.equilibrate);
//! ```

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::types::Algorithm;
use crate::validation::{
    validate_count, validate_non_negative, validate_tolerance, MAX_BASIS_SIZE, MAX_ITERATIONS,
};

/// Outer and inner stopping criteria of one solve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolveControl {
    /// Solver variant.
    ///
    /// Default: [`Algorithm::RegRefineFgmres`].
    pub alg: Algorithm,

    /// Outer relative residual target `||b - A x|| / ||b||`.
    ///
    /// Default: `eps^0.5`.
    pub rel_tol: f64,

    /// Inner refinement target `||v - A z|| / ||v||`.
    ///
    /// Default: `eps^0.8`.
    pub rel_tol_refine: f64,

    /// Outer iteration budget per column, over all restarts.
    ///
    /// Default: `1000`.
    pub max_iterations: usize,

    /// Refinement passes per preconditioner application.
    ///
    /// Default: `50`.
    pub max_refine_iterations: usize,

    /// Log and record every refinement loop.
    ///
    /// Default: `false`.
    pub progress: bool,
}

impl Default for SolveControl {
    fn default() -> Self {
        Self {
            alg: Algorithm::RegRefineFgmres,
            rel_tol: f64::EPSILON.powf(0.5),
            rel_tol_refine: f64::EPSILON.powf(0.8),
            max_iterations: 1000,
            max_refine_iterations: 50,
            progress: false,
        }
    }
}

impl SolveControl {
    /// Check every field against its admissible range.
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_tolerance("rel_tol", self.rel_tol)?;
        validate_tolerance("rel_tol_refine", self.rel_tol_refine)?;
        validate_count("max_iterations", self.max_iterations, MAX_ITERATIONS)?;
        validate_count("max_refine_iterations", self.max_refine_iterations, MAX_ITERATIONS)?;
        Ok(())
    }

    /// Inner refinement budget actually used by the chosen algorithm.
    pub(crate) fn refine_budget(&self) -> usize {
        match self.alg {
            Algorithm::RegRefineFgmres => self.max_refine_iterations,
            Algorithm::Fgmres => 0,
        }
    }
}

/// Full driver configuration for `linear_solve` and `least_squares`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LeastSquaresControl {
    /// Krylov stopping criteria.
    pub solve_ctrl: SolveControl,

    /// Divide the system by an estimate of `||A||_2` before solving.
    ///
    /// Default: `true`.
    pub scale_two_norm: bool,

    /// FGMRES restart dimension.
    ///
    /// Default: `15`.
    pub basis_size: usize,

    /// Regularization shift of the preconditioner (and of the normal
    /// operator in least squares).
    ///
    /// Default: `eps^0.25`.
    pub alpha: f64,

    /// Apply Ruiz equilibration before solving.
    ///
    /// Default: `true`.
    pub equilibrate: bool,

    /// Log and record every outer iteration.
    ///
    /// Default: `false`.
    pub progress: bool,

    /// Ruiz sweeps when `equilibrate` is set.
    ///
    /// Default: `4`.
    pub equilibrate_iterations: usize,

    /// Power iterations when `scale_two_norm` is set.
    ///
    /// Default: `10`.
    pub two_norm_iterations: usize,
}

impl Default for LeastSquaresControl {
    fn default() -> Self {
        Self {
            solve_ctrl: SolveControl::default(),
            scale_two_norm: true,
            basis_size: 15,
            alpha: f64::EPSILON.powf(0.25),
            equilibrate: true,
            progress: false,
            equilibrate_iterations: 4,
            two_norm_iterations: 10,
        }
    }
}

impl LeastSquaresControl {
    /// Check every field, including the nested [`SolveControl`].
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.solve_ctrl.validate()?;
        validate_count("basis_size", self.basis_size, MAX_BASIS_SIZE)?;
        validate_non_negative("alpha", self.alpha)?;
        validate_count("equilibrate_iterations", self.equilibrate_iterations, MAX_ITERATIONS)?;
        validate_count("two_norm_iterations", self.two_norm_iterations, MAX_ITERATIONS)?;
        Ok(())
    }

    /// Parse and validate a JSON document; missing fields take defaults.
    pub fn from_json(json: &str) -> Result<Self, ValidationError> {
        let ctrl: Self = serde_json::from_str(json)?;
        ctrl.validate()?;
        Ok(ctrl)
    }

    /// Serialize to pretty-printed JSON.
    pub fn to_json(&self) -> Result<String, ValidationError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let ctrl = LeastSquaresControl::default();
        ctrl.validate().unwrap();
        assert!(ctrl.solve_ctrl.rel_tol_refine < ctrl.solve_ctrl.rel_tol);
        assert!(ctrl.alpha > ctrl.solve_ctrl.rel_tol);
    }

    #[test]
    fn json_round_trip_keeps_overrides() {
        let mut ctrl = LeastSquaresControl::default();
        ctrl.solve_ctrl.alg = Algorithm::Fgmres;
        ctrl.alpha = 0.0;
        let json = ctrl.to_json().unwrap();
        assert!(json.contains("\"Fgmres\""));
        assert_eq!(LeastSquaresControl::from_json(&json).unwrap(), ctrl);
    }

    #[test]
    fn rejects_bad_fields() {
        let cases = [
            r#"{ "basis_size": 0 }"#,
            r#"{ "alpha": -1.0 }"#,
            r#"{ "solve_ctrl": { "rel_tol": 1.5 } }"#,
            r#"{ "solve_ctrl": { "max_iterations": 0 } }"#,
        ];
        for json in cases {
            let err = LeastSquaresControl::from_json(json).unwrap_err();
            assert!(matches!(err, ValidationError::ParameterOutOfRange { .. }), "{json}: {err}");
        }
    }

    #[test]
    fn malformed_json() {
        let err = LeastSquaresControl::from_json("{ basis_size").unwrap_err();
        assert!(matches!(err, ValidationError::MalformedControl(_)));
    }

    #[test]
    fn fgmres_disables_refinement() {
        let ctrl = SolveControl {
            alg: Algorithm::Fgmres,
            ..SolveControl::default()
        };
        assert_eq!(ctrl.refine_budget(), 0);
        assert_eq!(SolveControl::default().refine_budget(), 50);
    }
}
