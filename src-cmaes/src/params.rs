//! Run configuration and the strategy parameters derived from it.

use ndarray::Array1;
use thiserror::Error;

use crate::{CallbackAction, CmaesIntermediate};

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum CmaesError {
    #[error("initial mean must be non-empty")]
    EmptyInitialMean,
    #[error("initial standard deviations: expected {expected} entries, got {got}")]
    InitialStdsLength { expected: usize, got: usize },
    #[error("initial standard deviation {index} must be positive and finite, got {value}")]
    InvalidInitialStd { index: usize, value: f64 },
    #[error("population size lambda must be at least 2, got {lambda}")]
    InvalidLambda { lambda: usize },
    #[error("parent number mu must be in 1..=lambda ({lambda}), got {mu}")]
    InvalidMu { mu: usize, lambda: usize },
    #[error("recombination weights: expected {expected} entries, got {got}")]
    WeightsLength { expected: usize, got: usize },
    #[error("recombination weights must be positive and non-increasing")]
    InvalidWeights,
    #[error("per-coordinate minimum deviations: expected {expected} entries, got {got}")]
    DiffMinChangeLength { expected: usize, got: usize },
}

/// Configuration for a CMA-ES run.
///
/// `xstart` and `initial_stds` fix the initial search distribution; the
/// initial global step size is `sqrt(mean(initial_stds^2))`. Everything left
/// at its default is derived from the problem dimension with the canonical
/// CMA-ES formulas when the engine is constructed.
pub struct CmaesConfig {
    /// Starting mean of the search distribution.
    pub xstart: Array1<f64>,
    /// Per-coordinate initial standard deviations, all > 0.
    pub initial_stds: Array1<f64>,
    /// Offspring per generation (default: 4 + floor(3 ln N), at least 2).
    pub lambda: Option<usize>,
    /// Parents kept for recombination (default: lambda / 2).
    pub mu: Option<usize>,
    /// Recombination weights, positive and non-increasing; normalized to sum
    /// to one. Default: log-scale weights.
    pub weights: Option<Vec<f64>>,
    /// Seed for the random source (None = seed from the thread generator).
    pub seed: Option<u64>,
    /// 0 = full covariance; 1 = diagonal covariance forever; G > 1 =
    /// diagonal covariance for the first G generations.
    pub diagonal_cov: u64,
    /// Treat `xstart` as a typical point and perturb the initial mean once.
    pub typical_x: bool,
    /// Stop as soon as the best function value drops below this.
    pub stop_fitness: Option<f64>,
    /// Stop when recent function value differences fall below this.
    pub stop_tol_fun: f64,
    /// Stop when the best-value history range falls below this.
    pub stop_tol_fun_hist: f64,
    /// Stop when all coordinate deviations and path components fall below
    /// this (0 disables).
    pub stop_tol_x: f64,
    /// Stop when some standard deviation grows by more than this factor.
    pub stop_tol_up_x_factor: f64,
    /// Budget of objective evaluations (default: 900 (N+3)^2).
    pub stop_max_fun_evals: Option<u64>,
    /// Budget of generations (default: evaluation budget / lambda).
    pub stop_max_iter: Option<u64>,
    /// Minimum generations between forced eigendecompositions (default:
    /// 1 / (ccov N 10)).
    pub update_eigen_modulo: Option<f64>,
    /// Per-coordinate floor on sigma * sqrt(C[i][i]); sigma is inflated
    /// before sampling until the floor holds.
    pub diff_min_change: Option<Array1<f64>>,
    /// Run the O(N^3) eigendecomposition self-check after every refresh.
    pub check_eigen: bool,
    /// Print progress to stderr.
    pub disp: bool,
    /// Sink for numerical warnings; absent sink means silence.
    pub warning_sink: Option<Box<dyn FnMut(&str) + Send>>,
    /// Per-generation callback used by [`crate::Cmaes::run`] (may stop early).
    pub callback: Option<Box<dyn FnMut(&CmaesIntermediate) -> CallbackAction + Send>>,
}

/// Fluent builder for `CmaesConfig`.
pub struct CmaesConfigBuilder {
    cfg: CmaesConfig,
}

impl CmaesConfigBuilder {
    pub fn new(xstart: Array1<f64>, initial_stds: Array1<f64>) -> Self {
        Self {
            cfg: CmaesConfig {
                xstart,
                initial_stds,
                lambda: None,
                mu: None,
                weights: None,
                seed: None,
                diagonal_cov: 0,
                typical_x: false,
                stop_fitness: None,
                stop_tol_fun: 1e-12,
                stop_tol_fun_hist: 1e-13,
                stop_tol_x: 0.0,
                stop_tol_up_x_factor: 1e3,
                stop_max_fun_evals: None,
                stop_max_iter: None,
                update_eigen_modulo: None,
                diff_min_change: None,
                check_eigen: false,
                disp: false,
                warning_sink: None,
                callback: None,
            },
        }
    }
    pub fn lambda(mut self, v: usize) -> Self {
        self.cfg.lambda = Some(v);
        self
    }
    pub fn mu(mut self, v: usize) -> Self {
        self.cfg.mu = Some(v);
        self
    }
    pub fn weights(mut self, v: Vec<f64>) -> Self {
        self.cfg.weights = Some(v);
        self
    }
    pub fn seed(mut self, v: u64) -> Self {
        self.cfg.seed = Some(v);
        self
    }
    pub fn diagonal_cov(mut self, v: u64) -> Self {
        self.cfg.diagonal_cov = v;
        self
    }
    pub fn typical_x(mut self, v: bool) -> Self {
        self.cfg.typical_x = v;
        self
    }
    pub fn stop_fitness(mut self, v: f64) -> Self {
        self.cfg.stop_fitness = Some(v);
        self
    }
    pub fn stop_tol_fun(mut self, v: f64) -> Self {
        self.cfg.stop_tol_fun = v;
        self
    }
    pub fn stop_tol_fun_hist(mut self, v: f64) -> Self {
        self.cfg.stop_tol_fun_hist = v;
        self
    }
    pub fn stop_tol_x(mut self, v: f64) -> Self {
        self.cfg.stop_tol_x = v;
        self
    }
    pub fn stop_tol_up_x_factor(mut self, v: f64) -> Self {
        self.cfg.stop_tol_up_x_factor = v;
        self
    }
    pub fn stop_max_fun_evals(mut self, v: u64) -> Self {
        self.cfg.stop_max_fun_evals = Some(v);
        self
    }
    pub fn stop_max_iter(mut self, v: u64) -> Self {
        self.cfg.stop_max_iter = Some(v);
        self
    }
    pub fn update_eigen_modulo(mut self, v: f64) -> Self {
        self.cfg.update_eigen_modulo = Some(v);
        self
    }
    pub fn diff_min_change(mut self, v: Array1<f64>) -> Self {
        self.cfg.diff_min_change = Some(v);
        self
    }
    pub fn check_eigen(mut self, v: bool) -> Self {
        self.cfg.check_eigen = v;
        self
    }
    pub fn disp(mut self, v: bool) -> Self {
        self.cfg.disp = v;
        self
    }
    pub fn warning_sink(mut self, sink: Box<dyn FnMut(&str) + Send>) -> Self {
        self.cfg.warning_sink = Some(sink);
        self
    }
    pub fn callback(
        mut self,
        cb: Box<dyn FnMut(&CmaesIntermediate) -> CallbackAction + Send>,
    ) -> Self {
        self.cfg.callback = Some(cb);
        self
    }
    pub fn build(self) -> CmaesConfig {
        self.cfg
    }
}

/// Strategy parameters derived once from the configuration: selection,
/// recombination weights and the adaptation rates of the canonical CMA-ES.
pub(crate) struct StrategyParams {
    pub n: usize,
    pub lambda: usize,
    pub mu: usize,
    pub weights: Vec<f64>,
    pub mueff: f64,
    pub mucov: f64,
    pub cs: f64,
    pub damps: f64,
    pub ccumcov: f64,
    pub ccov: f64,
    pub chi_n: f64,
    pub hist_size: usize,
    pub update_eigen_modulo: f64,
    pub stop_fitness: Option<f64>,
    pub stop_tol_fun: f64,
    pub stop_tol_fun_hist: f64,
    pub stop_tol_x: f64,
    pub stop_tol_up_x_factor: f64,
    pub stop_max_fun_evals: u64,
    pub stop_max_iter: u64,
}

impl StrategyParams {
    pub(crate) fn derive(cfg: &CmaesConfig) -> Result<Self, CmaesError> {
        let n = cfg.xstart.len();
        if n == 0 {
            return Err(CmaesError::EmptyInitialMean);
        }
        if cfg.initial_stds.len() != n {
            return Err(CmaesError::InitialStdsLength {
                expected: n,
                got: cfg.initial_stds.len(),
            });
        }
        for (i, &s) in cfg.initial_stds.iter().enumerate() {
            if !(s.is_finite() && s > 0.0) {
                return Err(CmaesError::InvalidInitialStd { index: i, value: s });
            }
        }
        if let Some(dm) = &cfg.diff_min_change {
            if dm.len() != n {
                return Err(CmaesError::DiffMinChangeLength {
                    expected: n,
                    got: dm.len(),
                });
            }
        }

        let nf = n as f64;
        let lambda = cfg
            .lambda
            .unwrap_or_else(|| (4.0 + (3.0 * nf.ln()).floor()) as usize)
            .max(2);
        if let Some(l) = cfg.lambda {
            if l < 2 {
                return Err(CmaesError::InvalidLambda { lambda: l });
            }
        }
        let mu = cfg.mu.unwrap_or_else(|| (lambda / 2).max(1));
        if mu == 0 || mu > lambda {
            return Err(CmaesError::InvalidMu { mu, lambda });
        }

        let mut weights = match &cfg.weights {
            Some(w) => {
                if w.len() != mu {
                    return Err(CmaesError::WeightsLength {
                        expected: mu,
                        got: w.len(),
                    });
                }
                for pair in w.windows(2) {
                    if pair[1] > pair[0] {
                        return Err(CmaesError::InvalidWeights);
                    }
                }
                if w.iter().any(|&wi| !(wi.is_finite() && wi > 0.0)) {
                    return Err(CmaesError::InvalidWeights);
                }
                w.clone()
            }
            None => (0..mu)
                .map(|i| (mu as f64 + 0.5).ln() - ((i + 1) as f64).ln())
                .collect(),
        };
        let wsum: f64 = weights.iter().sum();
        for w in &mut weights {
            *w /= wsum;
        }
        let mueff = 1.0 / weights.iter().map(|w| w * w).sum::<f64>();

        let mucov = mueff;
        let cs = (mueff + 2.0) / (nf + mueff + 3.0);
        let damps = 1.0 + 2.0 * (((mueff - 1.0) / (nf + 1.0)).sqrt() - 1.0).max(0.0) + cs;
        let ccumcov = 4.0 / (nf + 4.0);
        let t1 = 2.0 / ((nf + std::f64::consts::SQRT_2) * (nf + std::f64::consts::SQRT_2));
        let t2 = ((2.0 * mueff - 1.0) / ((nf + 2.0) * (nf + 2.0) + mueff)).min(1.0);
        let ccov = t1 / mucov + (1.0 - 1.0 / mucov) * t2;

        let chi_n = nf.sqrt() * (1.0 - 1.0 / (4.0 * nf) + 1.0 / (21.0 * nf * nf));
        let hist_size = 10 + (30.0 * nf / lambda as f64).ceil() as usize;
        let update_eigen_modulo = cfg
            .update_eigen_modulo
            .unwrap_or(1.0 / ccov / nf / 10.0);

        let stop_max_fun_evals = cfg
            .stop_max_fun_evals
            .unwrap_or_else(|| (900.0 * (nf + 3.0) * (nf + 3.0)) as u64);
        let stop_max_iter = cfg
            .stop_max_iter
            .unwrap_or_else(|| (stop_max_fun_evals as f64 / lambda as f64).ceil() as u64);

        Ok(Self {
            n,
            lambda,
            mu,
            weights,
            mueff,
            mucov,
            cs,
            damps,
            ccumcov,
            ccov,
            chi_n,
            hist_size,
            update_eigen_modulo,
            stop_fitness: cfg.stop_fitness,
            stop_tol_fun: cfg.stop_tol_fun,
            stop_tol_fun_hist: cfg.stop_tol_fun_hist,
            stop_tol_x: cfg.stop_tol_x,
            stop_tol_up_x_factor: cfg.stop_tol_up_x_factor,
            stop_max_fun_evals,
            stop_max_iter,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(n: usize) -> CmaesConfig {
        CmaesConfigBuilder::new(Array1::zeros(n), Array1::from_elem(n, 1.0)).build()
    }

    #[test]
    fn default_lambda_grows_with_dimension() {
        let sp = StrategyParams::derive(&config(10)).unwrap();
        assert_eq!(sp.lambda, 10); // 4 + floor(3 ln 10)
        assert_eq!(sp.mu, 5);
        let sp = StrategyParams::derive(&config(2)).unwrap();
        assert_eq!(sp.lambda, 6);
    }

    #[test]
    fn weights_sum_to_one_and_decrease() {
        let sp = StrategyParams::derive(&config(10)).unwrap();
        let sum: f64 = sp.weights.iter().sum();
        assert!((sum - 1.0).abs() < 1e-12, "sum = {sum}");
        for pair in sp.weights.windows(2) {
            assert!(pair[0] >= pair[1]);
        }
        assert!(sp.weights.iter().all(|&w| w > 0.0));
        assert!(sp.mueff >= 1.0 && sp.mueff <= sp.mu as f64);
    }

    #[test]
    fn rates_are_in_range() {
        for n in [1usize, 2, 5, 20, 100] {
            let sp = StrategyParams::derive(&config(n)).unwrap();
            assert!(sp.cs > 0.0 && sp.cs < 1.0);
            assert!(sp.ccumcov > 0.0 && sp.ccumcov <= 1.0);
            assert!(sp.ccov > 0.0 && sp.ccov < 1.0);
            assert!(sp.damps >= 1.0);
            assert!(sp.chi_n > 0.0 && sp.chi_n < (n as f64).sqrt());
        }
    }

    #[test]
    fn rejects_bad_configs() {
        let err = StrategyParams::derive(
            &CmaesConfigBuilder::new(Array1::zeros(0), Array1::zeros(0)).build(),
        );
        assert!(matches!(err, Err(CmaesError::EmptyInitialMean)));

        let err = StrategyParams::derive(
            &CmaesConfigBuilder::new(Array1::zeros(3), Array1::from_elem(2, 1.0)).build(),
        );
        assert!(matches!(err, Err(CmaesError::InitialStdsLength { .. })));

        let err = StrategyParams::derive(
            &CmaesConfigBuilder::new(Array1::zeros(3), Array1::from_vec(vec![1.0, -1.0, 1.0]))
                .build(),
        );
        assert!(matches!(err, Err(CmaesError::InvalidInitialStd { index: 1, .. })));

        let err = StrategyParams::derive(
            &CmaesConfigBuilder::new(Array1::zeros(3), Array1::from_elem(3, 1.0))
                .lambda(1)
                .build(),
        );
        assert!(matches!(err, Err(CmaesError::InvalidLambda { lambda: 1 })));

        let err = StrategyParams::derive(
            &CmaesConfigBuilder::new(Array1::zeros(3), Array1::from_elem(3, 1.0))
                .lambda(8)
                .mu(9)
                .build(),
        );
        assert!(matches!(err, Err(CmaesError::InvalidMu { .. })));

        let err = StrategyParams::derive(
            &CmaesConfigBuilder::new(Array1::zeros(3), Array1::from_elem(3, 1.0))
                .lambda(8)
                .mu(2)
                .weights(vec![0.3, 0.7])
                .build(),
        );
        assert!(matches!(err, Err(CmaesError::InvalidWeights)));
    }

    #[test]
    fn history_length_follows_dimension_over_lambda() {
        let sp = StrategyParams::derive(&config(10)).unwrap();
        assert_eq!(sp.hist_size, 10 + (30.0 * 10.0 / sp.lambda as f64).ceil() as usize);
    }
}
