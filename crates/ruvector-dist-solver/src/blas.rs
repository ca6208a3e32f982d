//! Local level-1 kernels on owned slices.
//!
//! These never communicate; distributed reductions combine their partial
//! results through the [`WorkerContext`](crate::context::WorkerContext).

/// Dot product of two `f64` slices with 4-wide accumulation.
///
/// The independent accumulators shorten the dependency chain of the inner
/// loop.
#[inline]
pub fn dot(a: &[f64], b: &[f64]) -> f64 {
    assert_eq!(a.len(), b.len(), "dot: length mismatch");

    let n = a.len();
    let chunks = n / 4;
    let remainder = n % 4;

    let mut acc0: f64 = 0.0;
    let mut acc1: f64 = 0.0;
    let mut acc2: f64 = 0.0;
    let mut acc3: f64 = 0.0;

    for i in 0..chunks {
        let j = i * 4;
        acc0 += a[j] * b[j];
        acc1 += a[j + 1] * b[j + 1];
        acc2 += a[j + 2] * b[j + 2];
        acc3 += a[j + 3] * b[j + 3];
    }

    let base = chunks * 4;
    for i in 0..remainder {
        acc0 += a[base + i] * b[base + i];
    }

    (acc0 + acc1) + (acc2 + acc3)
}

/// `y[i] += alpha * x[i]`.
#[inline]
pub fn axpy(alpha: f64, x: &[f64], y: &mut [f64]) {
    assert_eq!(x.len(), y.len(), "axpy: length mismatch");

    let n = x.len();
    let chunks = n / 4;
    let base = chunks * 4;

    for i in 0..chunks {
        let j = i * 4;
        y[j] += alpha * x[j];
        y[j + 1] += alpha * x[j + 1];
        y[j + 2] += alpha * x[j + 2];
        y[j + 3] += alpha * x[j + 3];
    }
    for i in base..n {
        y[i] += alpha * x[i];
    }
}

/// `x[i] *= alpha`.
#[inline]
pub fn scal(alpha: f64, x: &mut [f64]) {
    for v in x.iter_mut() {
        *v *= alpha;
    }
}

/// Scaled sum of squares `(scale, ssq)` with `scale^2 * ssq = sum(x_i^2)`.
///
/// LAPACK `lassq` update: entries are divided by the running maximum before
/// squaring, so no intermediate overflows for entries near `f64::MAX`.
pub fn lassq(x: &[f64], mut scale: f64, mut ssq: f64) -> (f64, f64) {
    for &v in x {
        if v.is_nan() {
            return (f64::NAN, f64::NAN);
        }
        if v != 0.0 {
            let a = v.abs();
            if scale < a {
                let r = scale / a;
                ssq = 1.0 + ssq * r * r;
                scale = a;
            } else {
                let r = a / scale;
                ssq += r * r;
            }
        }
    }
    (scale, ssq)
}

/// Merge scaled sums of squares produced by [`lassq`] on disjoint pieces.
///
/// Pieces are merged in slice order so every worker obtains the same value.
pub fn combine_ssq(parts: &[(f64, f64)]) -> f64 {
    if parts.iter().any(|(s, q)| s.is_nan() || q.is_nan()) {
        return f64::NAN;
    }
    let scale = parts.iter().fold(0.0f64, |m, &(s, _)| m.max(s));
    if scale == 0.0 {
        return 0.0;
    }
    if scale.is_infinite() {
        return f64::INFINITY;
    }
    let ssq: f64 = parts
        .iter()
        .map(|&(s, q)| {
            let r = s / scale;
            q * r * r
        })
        .sum();
    scale * ssq.sqrt()
}
