//! Solve a 2D finite-difference system with a dense last column.
//!
//! ```text
//! cargo run --release --example fd2d_linear_solve -- [workers] [n0] [n1]
//! RUST_LOG=ruvector_dist_solver=debug cargo run --example fd2d_linear_solve
//! ```
//!
//! Defaults: 4 workers on a 200 x 200 grid. The right-hand side `y` is a
//! uniform random vector; `x` starts as a copy of `y` and is overwritten with
//! the solution. The solve asks for `rel_tol = 1e-12` with refinement down to
//! `1e-18` and a regularization shift of `1e-5`, with progress logged.

use ruvector_dist_solver::control::{LeastSquaresControl, SolveControl};
use ruvector_dist_solver::gallery::fd2d;
use ruvector_dist_solver::vector::DistMultiVec;
use ruvector_dist_solver::{linear_solve, multiply, Algorithm, Orientation, SolverError, ThreadGroup};

struct Summary {
    y_norm: f64,
    x_norm: f64,
    residual: f64,
    iterations: usize,
    /// Final event of rank 0's report.
    report_json: Option<String>,
}

fn parse_arg(args: &[String], index: usize, default: usize) -> usize {
    args.get(index).and_then(|a| a.parse().ok()).unwrap_or(default)
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();
    let workers = parse_arg(&args, 1, 4);
    let n0 = parse_arg(&args, 2, 200);
    let n1 = parse_arg(&args, 3, n0);

    let ctrl = LeastSquaresControl {
        solve_ctrl: SolveControl {
            alg: Algorithm::RegRefineFgmres,
            rel_tol: 1e-12,
            rel_tol_refine: 1e-18,
            progress: true,
            ..SolveControl::default()
        },
        scale_two_norm: true,
        basis_size: 15,
        alpha: 1e-5,
        equilibrate: true,
        progress: true,
        ..LeastSquaresControl::default()
    };

    let results = ThreadGroup::run(workers, |ctx| -> Result<Summary, SolverError> {
        let rank = ctx.rank();
        let a = fd2d(ctx.clone(), n0, n1)?;
        let y = DistMultiVec::uniform(ctx.clone(), n0 * n1, 1)?;
        let mut x = DistMultiVec::zeros(ctx, 0, 0)?;
        x.copy_from(&y)?;

        let y_norm = y.nrm2()?;
        let report = linear_solve(&a, &mut x, &ctrl)?;
        let x_norm = x.nrm2()?;

        let mut r = y.clone();
        multiply(Orientation::Normal, 1.0, &a, &x, -1.0, &mut r)?;
        let residual = r.nrm2()? / y_norm;

        let report_json = if rank == 0 {
            serde_json::to_string(&report.events.last()).ok()
        } else {
            None
        };
        Ok(Summary {
            y_norm,
            x_norm,
            residual,
            iterations: report.max_iterations(),
            report_json,
        })
    });

    match results.into_iter().next() {
        Some(Ok(summary)) => {
            println!("|| y ||_2 = {}", summary.y_norm);
            println!("|| x ||_2 = {}", summary.x_norm);
            println!("|| A x - y ||_2 / || y ||_2 = {}", summary.residual);
            println!("outer iterations = {}", summary.iterations);
            if let Some(json) = summary.report_json {
                println!("{json}");
            }
        }
        Some(Err(err)) => {
            eprintln!("solve failed: {err}");
            std::process::exit(1);
        }
        None => eprintln!("no workers"),
    }
}
