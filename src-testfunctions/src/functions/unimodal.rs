//! Unimodal test functions
//!
//! Single-optimum functions used to measure raw convergence speed and the
//! ability to adapt to badly conditioned or non-separable landscapes.

use ndarray::Array1;

/// Sphere function - the simplest convex quadratic
/// Global minimum: f(x) = 0 at x = (0, 0, ..., 0)
pub fn sphere(x: &Array1<f64>) -> f64 {
    x.iter().map(|&xi| xi * xi).sum()
}

/// Ellipsoid function - convex quadratic with condition number 1e6
/// Global minimum: f(x) = 0 at x = (0, 0, ..., 0)
pub fn ellipsoid(x: &Array1<f64>) -> f64 {
    let n = x.len();
    if n == 1 {
        return x[0] * x[0];
    }
    x.iter()
        .enumerate()
        .map(|(i, &xi)| 1e6f64.powf(i as f64 / (n - 1) as f64) * xi * xi)
        .sum()
}

/// Cigar function - one long axis, all others short
/// Global minimum: f(x) = 0 at x = (0, 0, ..., 0)
pub fn cigar(x: &Array1<f64>) -> f64 {
    x[0] * x[0] + 1e6 * x.iter().skip(1).map(|&xi| xi * xi).sum::<f64>()
}

/// Tablet function - one short axis, all others long
/// Global minimum: f(x) = 0 at x = (0, 0, ..., 0)
pub fn tablet(x: &Array1<f64>) -> f64 {
    1e6 * x[0] * x[0] + x.iter().skip(1).map(|&xi| xi * xi).sum::<f64>()
}

/// Sum of different powers - increasingly flat around the optimum
/// Global minimum: f(x) = 0 at x = (0, 0, ..., 0)
pub fn diff_powers(x: &Array1<f64>) -> f64 {
    let n = x.len();
    if n == 1 {
        return x[0].abs().powi(2);
    }
    x.iter()
        .enumerate()
        .map(|(i, &xi)| xi.abs().powf(2.0 + 10.0 * i as f64 / (n - 1) as f64))
        .sum()
}

/// Rosenbrock function - narrow curved valley, non-separable
/// Global minimum: f(x) = 0 at x = (1, 1, ..., 1)
pub fn rosenbrock(x: &Array1<f64>) -> f64 {
    let mut sum = 0.0;
    for i in 0..x.len() - 1 {
        sum += 100.0 * (x[i + 1] - x[i] * x[i]).powi(2) + (1.0 - x[i]).powi(2);
    }
    sum
}
