//! Benchmark objective functions for optimizer testing
//!
//! A small collection of standard continuous test functions used to exercise
//! the `cmaes` optimizer. Functions are organized by category:
//!
//! - **Unimodal**: single global optimum (sphere, ellipsoid, rosenbrock, ...)
//! - **Multimodal**: many local minima (rastrigin, ackley, griewank, ...)
//!
//! Every function maps an `Array1<f64>` candidate to a scalar to be
//! minimized; all of them attain a global minimum value of 0.
//!
//! # Example
//!
//! ```rust
//! use ndarray::Array1;
//! use cmaes_testfunctions::sphere;
//!
//! let x = Array1::from_vec(vec![0.0, 0.0]);
//! assert_eq!(sphere(&x), 0.0);
//! ```

use ndarray::Array2;

pub mod functions;
pub use functions::*;

/// Create bounds matrix for box-constrained runs (2 x n matrix)
/// bounds[[0, i]] = lower bound, bounds[[1, i]] = upper bound
pub fn create_bounds(n: usize, lower: f64, upper: f64) -> Array2<f64> {
    Array2::from_shape_fn((2, n), |(i, _)| if i == 0 { lower } else { upper })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array1;

    #[test]
    fn minima_are_zero() {
        let origin = Array1::zeros(6);
        let ones = Array1::from_elem(6, 1.0);
        assert_eq!(sphere(&origin), 0.0);
        assert_eq!(ellipsoid(&origin), 0.0);
        assert_eq!(cigar(&origin), 0.0);
        assert_eq!(rosenbrock(&ones), 0.0);
        assert!(rastrigin(&origin).abs() < 1e-12);
        assert!(ackley(&origin).abs() < 1e-12);
        assert!(griewank(&origin).abs() < 1e-12);
    }

    #[test]
    fn bounds_shape() {
        let b = create_bounds(4, -5.0, 5.0);
        assert_eq!(b.shape(), &[2, 4]);
        assert_eq!(b[[0, 2]], -5.0);
        assert_eq!(b[[1, 2]], 5.0);
    }
}
