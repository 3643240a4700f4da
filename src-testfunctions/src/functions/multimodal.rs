//! Multimodal test functions
//!
//! These functions have multiple local minima and are used to test the global
//! search capabilities and exploration of optimization algorithms.

use ndarray::Array1;
use std::f64::consts::PI;

/// Rastrigin function - highly multimodal with a regular grid of minima
/// Global minimum: f(x) = 0 at x = (0, 0, ..., 0)
/// Bounds: x_i in [-5.12, 5.12]
pub fn rastrigin(x: &Array1<f64>) -> f64 {
    10.0 * x.len() as f64
        + x.iter()
            .map(|&xi| xi * xi - 10.0 * (2.0 * PI * xi).cos())
            .sum::<f64>()
}

/// Ackley function - nearly flat outer region, deep hole at the origin
/// Global minimum: f(x) = 0 at x = (0, 0, ..., 0)
/// Bounds: x_i in [-32.768, 32.768]
pub fn ackley(x: &Array1<f64>) -> f64 {
    let n = x.len() as f64;
    let sum_sq = x.iter().map(|&xi| xi * xi).sum::<f64>();
    let sum_cos = x.iter().map(|&xi| (2.0 * PI * xi).cos()).sum::<f64>();
    -20.0 * (-0.2 * (sum_sq / n).sqrt()).exp() - (sum_cos / n).exp()
        + 20.0
        + std::f64::consts::E
}

/// Griewank function - many widespread regularly distributed minima
/// Global minimum: f(x) = 0 at x = (0, 0, ..., 0)
/// Bounds: x_i in [-600, 600]
pub fn griewank(x: &Array1<f64>) -> f64 {
    let sum = x.iter().map(|&xi| xi * xi).sum::<f64>() / 4000.0;
    let prod = x
        .iter()
        .enumerate()
        .map(|(i, &xi)| (xi / ((i + 1) as f64).sqrt()).cos())
        .product::<f64>();
    sum - prod + 1.0
}

/// Schwefel function - deceptive, best minima far from the second best
/// Global minimum: f(x) = 0 at x = (420.9687..., ..., 420.9687...)
/// Bounds: x_i in [-500, 500]
pub fn schwefel(x: &Array1<f64>) -> f64 {
    418.9829 * x.len() as f64
        - x.iter()
            .map(|&xi| xi * xi.abs().sqrt().sin())
            .sum::<f64>()
}
