//! Covariance Matrix Adaptation Evolution Strategy (CMA-ES) in pure Rust
//! using ndarray
//!
//! A derivative-free optimizer for continuous black-box functions. The search
//! distribution is a multivariate normal whose mean, global step size and
//! full covariance matrix are adapted online from ranked fitness feedback.
//!
//! Supported features:
//! - Ask/tell interface: [`Cmaes::sample_population`] hands out a borrowed
//!   population, the caller evaluates it and feeds the fitness values back
//!   through [`Cmaes::update_distribution`]
//! - Weighted recombination, cumulative step-size adaptation and rank-1 +
//!   rank-mu covariance updates
//! - Own symmetric eigensolver (Householder + implicit-shift QL), refreshed
//!   lazily between generations
//! - Diagonal-only covariance mode for cheap early progress in high
//!   dimensions
//! - Single-offspring resampling for caller-driven box constraint handling
//! - A battery of termination criteria with human-readable stop messages
//! - One-shot [`minimize`] driver with per-generation callback, and a CSV
//!   recorder for convergence traces

#![allow(missing_docs)]

use std::fmt;
use std::fs::{File, create_dir_all};
use std::io::Write;
use std::mem;
use std::sync::{Arc, Mutex};

use ndarray::{Array1, Array2, ArrayView1};
use serde::{Deserialize, Serialize};

mod eigen;
mod params;
mod random;
mod termination;

pub use params::{CmaesConfig, CmaesConfigBuilder, CmaesError};
pub use termination::TerminationReason;

use params::StrategyParams;
use random::GaussRng;

/// Lifecycle of the engine: sampling is only valid after initialization or an
/// update, updating only after sampling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Initialized,
    Sampled,
    Updated,
}

/// Information passed to the per-generation callback of [`Cmaes::run`].
pub struct CmaesIntermediate {
    /// Best candidate found so far.
    pub x: Array1<f64>,
    /// Its function value.
    pub fun: f64,
    /// Current global step size.
    pub sigma: f64,
    /// Ratio of longest to shortest principal axis of the distribution.
    pub axis_ratio: f64,
    /// Generation number.
    pub iter: u64,
}

/// Action returned by the callback.
pub enum CallbackAction {
    Continue,
    Stop,
}

/// Result of a [`minimize`] run.
#[derive(Clone)]
pub struct CmaesReport {
    pub x: Array1<f64>,
    pub fun: f64,
    pub success: bool,
    pub message: String,
    pub nit: u64,
    pub nfev: u64,
}

impl fmt::Debug for CmaesReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CmaesReport")
            .field("x", &format!("len={}", self.x.len()))
            .field("fun", &self.fun)
            .field("success", &self.success)
            .field("message", &self.message)
            .field("nit", &self.nit)
            .field("nfev", &self.nfev)
            .finish()
    }
}

/// The CMA-ES engine. Owns the full mutable state of the search
/// distribution; the sampler and the eigensolver operate on borrowed pieces
/// of it.
pub struct Cmaes {
    config: CmaesConfig,
    sp: StrategyParams,
    rng: GaussRng,

    sigma: f64,
    xmean: Array1<f64>,
    xold: Array1<f64>,
    x_best_ever: Array1<f64>,
    best_ever_fitness: f64,
    best_ever_evals: u64,

    /// Offspring of the current generation, one row per candidate.
    population: Array2<f64>,
    function_values: Vec<f64>,
    /// Best fitness per generation, most recent first.
    func_value_history: Vec<f64>,
    /// Permutation sorting the population ascending by fitness.
    index: Vec<usize>,

    /// Covariance matrix; the lower triangle is authoritative.
    c: Array2<f64>,
    /// Columns are normalized eigenvectors of C.
    b: Array2<f64>,
    /// Axis lengths, the square roots of the eigenvalues of C.
    rg_d: Array1<f64>,
    /// Anisotropic evolution path.
    pc: Array1<f64>,
    /// Isotropic evolution path.
    ps: Array1<f64>,
    bdz: Array1<f64>,
    temp: Array1<f64>,
    eig_scratch: Vec<f64>,

    generation: u64,
    count_evals: u64,
    state: State,

    max_diag_c: f64,
    min_diag_c: f64,
    max_ew: f64,
    min_ew: f64,

    eigensys_uptodate: bool,
    gen_of_eigensys_update: u64,
    d_max_signif_kond: f64,

    reasons: Vec<TerminationReason>,
    stop_message: String,
}

impl Cmaes {
    /// Construct the engine from a configuration. The initial covariance is
    /// diagonal with trace N, the initial step size the quadratic mean of the
    /// configured standard deviations.
    pub fn new(config: CmaesConfig) -> Result<Self, CmaesError> {
        let sp = StrategyParams::derive(&config)?;
        let n = sp.n;
        let lambda = sp.lambda;

        let trace: f64 = config.initial_stds.iter().map(|s| s * s).sum();
        let sigma = (trace / n as f64).sqrt();

        // smallest significant condition number at working precision
        let mut dtest = 1f64;
        while dtest != 0.0 && dtest < 1.1 * dtest {
            if dtest == dtest + 1.0 {
                break;
            }
            dtest *= 2.0;
        }
        let d_max_signif_kond = dtest / 1000.0;

        let scale = (n as f64 / trace).sqrt();
        let mut c = Array2::zeros((n, n));
        let b = Array2::eye(n);
        let mut rg_d = Array1::zeros(n);
        for i in 0..n {
            let di = config.initial_stds[i] * scale;
            rg_d[i] = di;
            c[[i, i]] = di * di;
        }
        let min_d = min_element(&rg_d);
        let max_d = max_element(&rg_d);

        let mut max_diag_c = c[[0, 0]];
        let mut min_diag_c = c[[0, 0]];
        for i in 1..n {
            max_diag_c = max_diag_c.max(c[[i, i]]);
            min_diag_c = min_diag_c.min(c[[i, i]]);
        }

        let mut rng = GaussRng::new(config.seed);
        let xold = config.xstart.clone();
        let mut xmean = config.xstart.clone();
        if config.typical_x {
            for i in 0..n {
                xmean[i] += sigma * rg_d[i] * rng.gauss();
            }
        }
        let x_best_ever = xmean.clone();
        let hist_size = sp.hist_size;

        Ok(Self {
            config,
            rng,
            sigma,
            xmean,
            xold,
            x_best_ever,
            best_ever_fitness: f64::MAX,
            best_ever_evals: 0,
            population: Array2::zeros((lambda, n)),
            function_values: vec![f64::MAX; lambda],
            func_value_history: vec![f64::MAX; hist_size],
            index: (0..lambda).collect(),
            c,
            b,
            rg_d,
            pc: Array1::zeros(n),
            ps: Array1::zeros(n),
            bdz: Array1::zeros(n),
            temp: Array1::zeros(n),
            eig_scratch: vec![0.0; n],
            generation: 0,
            count_evals: 0,
            state: State::Initialized,
            max_diag_c,
            min_diag_c,
            max_ew: max_d * max_d,
            min_ew: min_d * min_d,
            eigensys_uptodate: true,
            gen_of_eigensys_update: 0,
            d_max_signif_kond,
            reasons: Vec::new(),
            stop_message: String::new(),
            sp,
        })
    }

    fn diag_mode(&self) -> bool {
        self.config.diagonal_cov == 1 || self.config.diagonal_cov >= self.generation
    }

    /// Route a numerical warning to the configured sink. Returns whether the
    /// message was delivered; without a sink warnings are dropped silently.
    fn warn(&mut self, msg: &str) -> bool {
        if let Some(sink) = self.config.warning_sink.as_mut() {
            sink(msg);
            return true;
        }
        false
    }

    /// Increase sigma until every coordinate deviation reaches its configured
    /// floor.
    fn enforce_min_std_devs(&mut self) {
        let Some(min_change) = &self.config.diff_min_change else {
            return;
        };
        for i in 0..self.sp.n {
            while self.sigma * self.c[[i, i]].sqrt() < min_change[i] {
                self.sigma *= (0.05 + self.sp.cs / self.sp.damps).exp();
            }
        }
    }

    /// Draw a fresh population of lambda offspring from N(xmean, sigma^2 C)
    /// and return it as a borrowed view, one row per candidate. The view is
    /// valid until the next call into the engine.
    pub fn sample_population(&mut self) -> &Array2<f64> {
        let n = self.sp.n;
        let diag = self.diag_mode();

        if !self.eigensys_uptodate {
            if !diag {
                self.update_eigensystem(false);
            } else {
                for i in 0..n {
                    self.rg_d[i] = self.c[[i, i]].sqrt();
                }
                let min_d = min_element(&self.rg_d);
                let max_d = max_element(&self.rg_d);
                self.min_ew = min_d * min_d;
                self.max_ew = max_d * max_d;
                self.eigensys_uptodate = true;
            }
        }

        self.enforce_min_std_devs();

        for k in 0..self.sp.lambda {
            if diag {
                for i in 0..n {
                    let z = self.rng.gauss();
                    self.population[[k, i]] = self.xmean[i] + self.sigma * self.rg_d[i] * z;
                }
            } else {
                for i in 0..n {
                    self.temp[i] = self.rg_d[i] * self.rng.gauss();
                }
                for i in 0..n {
                    let mut sum = 0.0;
                    for j in 0..n {
                        sum += self.b[[i, j]] * self.temp[j];
                    }
                    self.population[[k, i]] = self.xmean[i] + self.sigma * sum;
                }
            }
        }

        if self.state == State::Updated || self.generation == 0 {
            self.generation += 1;
        }
        self.state = State::Sampled;

        &self.population
    }

    /// Replace offspring `k` with a fresh sample from the current
    /// distribution. Intended for rejecting candidates that violate external
    /// box constraints.
    pub fn resample_single(&mut self, k: usize) -> &Array2<f64> {
        assert!(
            k < self.sp.lambda,
            "resample_single: index {k} out of range (lambda = {})",
            self.sp.lambda
        );
        let n = self.sp.n;
        for i in 0..n {
            self.temp[i] = self.rg_d[i] * self.rng.gauss();
        }
        for i in 0..n {
            let mut sum = 0.0;
            for j in 0..n {
                sum += self.b[[i, j]] * self.temp[j];
            }
            self.population[[k, i]] = self.xmean[i] + self.sigma * sum;
        }
        &self.population
    }

    /// Fill `out` with `xmean + eps * sigma * B D z`, an independently drawn
    /// perturbation of the current mean. Used for uncertainty measurements.
    pub fn perturb_into(&mut self, out: &mut Array1<f64>, eps: f64) {
        let n = self.sp.n;
        assert_eq!(out.len(), n, "perturb_into: output length mismatch");
        for i in 0..n {
            self.temp[i] = self.rg_d[i] * self.rng.gauss();
        }
        for i in 0..n {
            let mut sum = 0.0;
            for j in 0..n {
                sum += self.b[[i, j]] * self.temp[j];
            }
            out[i] = self.xmean[i] + eps * self.sigma * sum;
        }
    }

    /// Ingest the fitness values of the sampled population and adapt mean,
    /// evolution paths, covariance matrix and step size. Returns the new
    /// distribution mean.
    pub fn update_distribution(&mut self, fitness: &[f64]) -> &Array1<f64> {
        let n = self.sp.n;
        let lambda = self.sp.lambda;
        assert_eq!(
            fitness.len(),
            lambda,
            "update_distribution: expected {lambda} fitness values, got {}",
            fitness.len()
        );
        assert!(
            self.state == State::Sampled,
            "update_distribution() called without a preceding sample_population()"
        );
        let diag = self.diag_mode();

        self.count_evals += lambda as u64;
        self.function_values.copy_from_slice(fitness);
        sort_index(fitness, &mut self.index);

        // escape flat fitness: identical values at the best and the median
        // rank stall the selection, inflate sigma instead
        if fitness[self.index[0]] == fitness[self.index[lambda / 2]] {
            self.sigma *= (0.2 + self.sp.cs / self.sp.damps).exp();
            self.warn(
                "sigma increased due to equal function values; \
                 reconsider the formulation of the objective function",
            );
        }

        for i in (1..self.func_value_history.len()).rev() {
            self.func_value_history[i] = self.func_value_history[i - 1];
        }
        self.func_value_history[0] = fitness[self.index[0]];

        let best = self.index[0];
        if fitness[best] < self.best_ever_fitness || self.generation == 1 {
            self.best_ever_fitness = fitness[best];
            self.x_best_ever.assign(&self.population.row(best));
            self.best_ever_evals = self.count_evals;
        }

        // recombine the mean; BDz ~ sqrt(mueff) N(0, C)
        let sqrt_mueff_div_sigma = self.sp.mueff.sqrt() / self.sigma;
        for i in 0..n {
            self.xold[i] = self.xmean[i];
            let mut m = 0.0;
            for k in 0..self.sp.mu {
                m += self.sp.weights[k] * self.population[[self.index[k], i]];
            }
            self.xmean[i] = m;
            self.bdz[i] = sqrt_mueff_div_sigma * (m - self.xold[i]);
        }

        // z = D^-1 B^T BDz
        for i in 0..n {
            let sum = if diag {
                self.bdz[i]
            } else {
                let mut s = 0.0;
                for j in 0..n {
                    s += self.b[[j, i]] * self.bdz[j];
                }
                s
            };
            self.temp[i] = sum / self.rg_d[i];
        }

        // cumulate the isotropic path with B z
        let sqrt_factor = (self.sp.cs * (2.0 - self.sp.cs)).sqrt();
        let inv_ps = 1.0 - self.sp.cs;
        for i in 0..n {
            let sum = if diag {
                self.temp[i]
            } else {
                let mut s = 0.0;
                for j in 0..n {
                    s += self.b[[i, j]] * self.temp[j];
                }
                s
            };
            self.ps[i] = inv_ps * self.ps[i] + sqrt_factor * sum;
        }

        let psxps: f64 = self.ps.iter().map(|v| v * v).sum();

        // Heaviside gate keeps the anisotropic path from overshooting while
        // sigma is still growing rapidly
        let hsig = psxps.sqrt()
            / (1.0 - (1.0 - self.sp.cs).powf(2.0 * self.generation as f64)).sqrt()
            / self.sp.chi_n
            < 1.4 + 2.0 / (n as f64 + 1.0);

        let inv_pc = 1.0 - self.sp.ccumcov;
        let hsig_factor = if hsig {
            (self.sp.ccumcov * (2.0 - self.sp.ccumcov)).sqrt()
        } else {
            0.0
        };
        for i in 0..n {
            self.pc[i] = inv_pc * self.pc[i] + hsig_factor * self.bdz[i];
        }

        self.adapt_covariance(hsig, diag);

        self.sigma *= ((psxps.sqrt() / self.sp.chi_n - 1.0) * self.sp.cs / self.sp.damps).exp();

        self.state = State::Updated;
        &self.xmean
    }

    /// Rank-1 + rank-mu covariance update. In diagonal mode only the
    /// diagonal entries move and the learning rate is raised by
    /// (N + 1.5) / 3.
    fn adapt_covariance(&mut self, hsig: bool, diag: bool) {
        if self.sp.ccov == 0.0 {
            return;
        }
        let n = self.sp.n;
        let mucov_inv = 1.0 / self.sp.mucov;
        let common_factor = self.sp.ccov * if diag { (n as f64 + 1.5) / 3.0 } else { 1.0 };
        let ccov1 = (common_factor * mucov_inv).min(1.0);
        let ccovmu = (common_factor * (1.0 - mucov_inv)).min(1.0 - ccov1);
        let sigma_square = self.sigma * self.sigma;
        let keep = 1.0 - ccov1 - ccovmu;
        // when the Heaviside gate suppressed the path update, compensate the
        // missing variance inside the rank-1 term
        let long_factor = if hsig {
            0.0
        } else {
            self.sp.ccumcov * (2.0 - self.sp.ccumcov)
        };

        self.eigensys_uptodate = false;

        for i in 0..n {
            let j0 = if diag { i } else { 0 };
            for j in j0..=i {
                let mut cij = keep * self.c[[i, j]]
                    + ccov1 * (self.pc[i] * self.pc[j] + long_factor * self.c[[i, j]]);
                for k in 0..self.sp.mu {
                    let xk = self.index[k];
                    cij += ccovmu
                        * self.sp.weights[k]
                        * (self.population[[xk, i]] - self.xold[i])
                        * (self.population[[xk, j]] - self.xold[j])
                        / sigma_square;
                }
                self.c[[i, j]] = cij;
            }
        }

        self.max_diag_c = self.c[[0, 0]];
        self.min_diag_c = self.c[[0, 0]];
        for i in 1..n {
            let cii = self.c[[i, i]];
            if self.max_diag_c < cii {
                self.max_diag_c = cii;
            } else if self.min_diag_c > cii {
                self.min_diag_c = cii;
            }
        }
    }

    /// Recompute the eigendecomposition of C. Without `force` the refresh is
    /// skipped while the decomposition is current or the configured number of
    /// generations between refreshes has not elapsed; sampling then continues
    /// with the slightly stale axes.
    pub fn update_eigensystem(&mut self, force: bool) {
        if !force {
            if self.eigensys_uptodate {
                return;
            }
            if (self.generation as f64)
                < self.gen_of_eigensys_update as f64 + self.sp.update_eigen_modulo
            {
                return;
            }
        }

        eigen::decompose(&self.c, &mut self.b, &mut self.rg_d, &mut self.eig_scratch);

        self.min_ew = min_element(&self.rg_d);
        self.max_ew = max_element(&self.rg_d);

        if self.config.check_eigen {
            let complaints = eigen::residual_report(&self.c, &self.b, &self.rg_d);
            for msg in complaints {
                self.warn(&msg);
            }
        }

        for i in 0..self.sp.n {
            self.rg_d[i] = self.rg_d[i].sqrt();
        }

        self.eigensys_uptodate = true;
        self.gen_of_eigensys_update = self.generation;
    }

    /// Test every stop condition; newly matched reasons are added to the
    /// accumulated set. Returns true once at least one reason has fired.
    pub fn test_for_termination(&mut self) -> bool {
        let n = self.sp.n;
        let diag = self.diag_mode();
        let mut fired: Vec<TerminationReason> = Vec::new();

        if let Some(limit) = self.sp.stop_fitness {
            let value = self.function_values[self.index[0]];
            if (self.generation > 1 || self.state == State::Updated) && value <= limit {
                fired.push(TerminationReason::Fitness { value, limit });
            }
        }

        let hist_valid = (self.generation as usize).min(self.sp.hist_size);
        let hi = max_element(&self.func_value_history[..hist_valid])
            .max(max_element(&self.function_values));
        let lo = min_element(&self.func_value_history[..hist_valid])
            .min(min_element(&self.function_values));
        let range = hi - lo;
        if self.generation > 0 && range <= self.sp.stop_tol_fun {
            fired.push(TerminationReason::TolFun {
                range,
                limit: self.sp.stop_tol_fun,
            });
        }

        if self.generation as usize > self.sp.hist_size {
            let range =
                max_element(&self.func_value_history) - min_element(&self.func_value_history);
            if range <= self.sp.stop_tol_fun_hist {
                fired.push(TerminationReason::TolFunHist {
                    range,
                    limit: self.sp.stop_tol_fun_hist,
                });
            }
        }

        let mut small = 0;
        for i in 0..n {
            if self.sigma * self.c[[i, i]].sqrt() < self.sp.stop_tol_x {
                small += 1;
            }
            if self.sigma * self.pc[i] < self.sp.stop_tol_x {
                small += 1;
            }
        }
        if small == 2 * n {
            fired.push(TerminationReason::TolX {
                limit: self.sp.stop_tol_x,
            });
        }

        for i in 0..n {
            if self.sigma * self.c[[i, i]].sqrt()
                > self.sp.stop_tol_up_x_factor * self.config.initial_stds[i]
            {
                fired.push(TerminationReason::TolUpX {
                    factor: self.sp.stop_tol_up_x_factor,
                });
                break;
            }
        }

        if self.max_ew >= self.min_ew * self.d_max_signif_kond {
            fired.push(TerminationReason::ConditionNumber {
                max_ew: self.max_ew,
                min_ew: self.min_ew,
                limit: self.d_max_signif_kond,
            });
        }

        if !diag {
            'axes: for a in 0..n {
                let fac = 0.1 * self.sigma * self.rg_d[a];
                for i in 0..n {
                    if self.xmean[i] != self.xmean[i] + fac * self.b[[i, a]] {
                        continue 'axes;
                    }
                }
                fired.push(TerminationReason::NoEffectAxis { axis: a });
                break;
            }
        }

        for i in 0..n {
            if self.xmean[i] == self.xmean[i] + self.sigma * self.c[[i, i]].sqrt() / 5.0 {
                fired.push(TerminationReason::NoEffectCoordinate { coordinate: i });
                break;
            }
        }

        if self.count_evals >= self.sp.stop_max_fun_evals {
            fired.push(TerminationReason::MaxFunEvals {
                evals: self.count_evals,
                limit: self.sp.stop_max_fun_evals,
            });
        }
        if self.generation >= self.sp.stop_max_iter {
            fired.push(TerminationReason::MaxIter {
                iterations: self.generation,
                limit: self.sp.stop_max_iter,
            });
        }

        for r in fired {
            if !self
                .reasons
                .iter()
                .any(|x| mem::discriminant(x) == mem::discriminant(&r))
            {
                self.reasons.push(r);
            }
        }
        self.stop_message = self
            .reasons
            .iter()
            .map(|r| r.to_string())
            .collect::<Vec<_>>()
            .join("\n");

        !self.reasons.is_empty()
    }

    /// Overwrite the distribution mean. Not permitted between sampling and
    /// the matching update.
    pub fn set_mean(&mut self, new_mean: &Array1<f64>) -> &Array1<f64> {
        assert!(
            self.state != State::Sampled,
            "set_mean: mean cannot be set between sample_population() and update_distribution()"
        );
        assert_eq!(new_mean.len(), self.sp.n, "set_mean: length mismatch");
        self.xmean.assign(new_mean);
        &self.xmean
    }

    // ------------------------------ Queries ------------------------------

    pub fn dimension(&self) -> usize {
        self.sp.n
    }
    pub fn lambda(&self) -> usize {
        self.sp.lambda
    }
    pub fn generation(&self) -> u64 {
        self.generation
    }
    pub fn count_evals(&self) -> u64 {
        self.count_evals
    }
    pub fn sigma(&self) -> f64 {
        self.sigma
    }
    /// Best fitness of the current generation.
    pub fn fitness(&self) -> f64 {
        self.function_values[self.index[0]]
    }
    pub fn best_fitness_ever(&self) -> f64 {
        self.best_ever_fitness
    }
    pub fn x_best_ever(&self) -> &Array1<f64> {
        &self.x_best_ever
    }
    /// Evaluation count at which the best-ever candidate was found.
    pub fn best_ever_evals(&self) -> u64 {
        self.best_ever_evals
    }
    /// Best candidate of the current generation.
    pub fn x_best(&self) -> ArrayView1<'_, f64> {
        self.population.row(self.index[0])
    }
    /// Offspring of the current generation, one row per candidate. Valid
    /// until the next sampling call.
    pub fn population(&self) -> &Array2<f64> {
        &self.population
    }
    pub fn x_mean(&self) -> &Array1<f64> {
        &self.xmean
    }
    pub fn min_eigenvalue(&self) -> f64 {
        self.min_ew
    }
    pub fn max_eigenvalue(&self) -> f64 {
        self.max_ew
    }
    pub fn axis_ratio(&self) -> f64 {
        max_element(&self.rg_d) / min_element(&self.rg_d)
    }
    pub fn max_axis_length(&self) -> f64 {
        self.sigma * self.max_ew.sqrt()
    }
    pub fn min_axis_length(&self) -> f64 {
        self.sigma * self.min_ew.sqrt()
    }
    pub fn max_std_dev(&self) -> f64 {
        self.sigma * self.max_diag_c.sqrt()
    }
    pub fn min_std_dev(&self) -> f64 {
        self.sigma * self.min_diag_c.sqrt()
    }
    pub fn diagonal_of_c(&self) -> Array1<f64> {
        Array1::from_shape_fn(self.sp.n, |i| self.c[[i, i]])
    }
    /// Full symmetric covariance matrix of the sampling distribution,
    /// materialized from the authoritative lower triangle.
    pub fn covariance(&self) -> Array2<f64> {
        Array2::from_shape_fn((self.sp.n, self.sp.n), |(i, j)| self.c[[i.max(j), i.min(j)]])
    }
    /// Columns are the normalized eigenvectors of C from the last refresh.
    pub fn eigenvectors(&self) -> &Array2<f64> {
        &self.b
    }
    /// Principal axis lengths, the square roots of the eigenvalues of C from
    /// the last refresh.
    pub fn axis_lengths(&self) -> &Array1<f64> {
        &self.rg_d
    }
    /// Coordinate-wise standard deviations sigma * sqrt(C[i][i]).
    pub fn std_devs(&self) -> Array1<f64> {
        Array1::from_shape_fn(self.sp.n, |i| self.sigma * self.c[[i, i]].sqrt())
    }
    /// Human-readable description of every matched stop criterion.
    pub fn stop_message(&self) -> String {
        self.stop_message.clone()
    }
    pub fn termination_reasons(&self) -> &[TerminationReason] {
        &self.reasons
    }

    // ------------------------------ Driver ------------------------------

    /// Run the ask/evaluate/tell loop until a stop condition fires (or the
    /// configured callback requests a stop) and report the best candidate.
    pub fn run<F>(&mut self, func: &F) -> CmaesReport
    where
        F: Fn(&Array1<f64>) -> f64,
    {
        let lambda = self.sp.lambda;
        let mut fitness = vec![0.0; lambda];

        while !self.test_for_termination() {
            self.sample_population();
            for k in 0..lambda {
                fitness[k] = func(&self.population.row(k).to_owned());
            }
            self.update_distribution(&fitness);

            if self.config.disp {
                eprintln!(
                    "CMA-ES iter {:4}  best_f={:.6e}  sigma={:.3e}  axis_ratio={:.2e}",
                    self.generation,
                    self.function_values[self.index[0]],
                    self.sigma,
                    self.axis_ratio()
                );
            }

            if self.config.callback.is_some() {
                let intermediate = CmaesIntermediate {
                    x: self.x_best_ever.clone(),
                    fun: self.best_ever_fitness,
                    sigma: self.sigma,
                    axis_ratio: self.axis_ratio(),
                    iter: self.generation,
                };
                if let Some(cb) = self.config.callback.as_mut() {
                    match cb(&intermediate) {
                        CallbackAction::Continue => {}
                        CallbackAction::Stop => {
                            return CmaesReport {
                                x: self.x_best_ever.clone(),
                                fun: self.best_ever_fitness,
                                success: true,
                                message: "stopped by callback".into(),
                                nit: self.generation,
                                nfev: self.count_evals,
                            };
                        }
                    }
                }
            }
        }

        let success = self.reasons.iter().any(|r| {
            !matches!(
                r,
                TerminationReason::MaxIter { .. } | TerminationReason::MaxFunEvals { .. }
            )
        });
        CmaesReport {
            x: self.x_best_ever.clone(),
            fun: self.best_ever_fitness,
            success,
            message: self.stop_message.clone(),
            nit: self.generation,
            nfev: self.count_evals,
        }
    }
}

/// Convenience function: build the engine from `config` and run it on `func`
/// until termination.
pub fn minimize<F>(func: &F, config: CmaesConfig) -> Result<CmaesReport, CmaesError>
where
    F: Fn(&Array1<f64>) -> f64,
{
    let mut es = Cmaes::new(config)?;
    Ok(es.run(func))
}

// ------------------------------ Utilities ------------------------------

/// Insertion sort of indices, ascending by fitness.
fn sort_index(values: &[f64], index: &mut [usize]) {
    index[0] = 0;
    for i in 1..values.len() {
        let mut j = i;
        while j > 0 {
            if values[index[j - 1]] < values[i] {
                break;
            }
            index[j] = index[j - 1];
            j -= 1;
        }
        index[j] = i;
    }
}

fn min_element<'a, I>(values: I) -> f64
where
    I: IntoIterator<Item = &'a f64>,
{
    values.into_iter().copied().fold(f64::INFINITY, f64::min)
}

fn max_element<'a, I>(values: I) -> f64
where
    I: IntoIterator<Item = &'a f64>,
{
    values
        .into_iter()
        .copied()
        .fold(f64::NEG_INFINITY, f64::max)
}

// ------------------------------ Recorder ------------------------------

/// A single per-generation record captured by [`OptimizationRecorder`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizationRecord {
    /// Generation number.
    pub generation: u64,
    /// Best candidate found so far.
    pub x: Vec<f64>,
    /// Best function value found so far.
    pub best_result: f64,
    /// Global step size at this generation.
    pub sigma: f64,
    /// Axis ratio of the search distribution.
    pub axis_ratio: f64,
    /// Whether this generation improved the best known result.
    pub is_improvement: bool,
}

/// Records optimization progress via the per-generation callback.
#[derive(Debug)]
pub struct OptimizationRecorder {
    /// Function name (used for the CSV filename).
    function_name: String,
    records: Arc<Mutex<Vec<OptimizationRecord>>>,
    best_value: Arc<Mutex<Option<f64>>>,
}

impl OptimizationRecorder {
    pub fn new(function_name: String) -> Self {
        Self {
            function_name,
            records: Arc::new(Mutex::new(Vec::new())),
            best_value: Arc::new(Mutex::new(None)),
        }
    }

    /// Create a callback that appends one record per generation.
    pub fn create_callback(&self) -> Box<dyn FnMut(&CmaesIntermediate) -> CallbackAction + Send> {
        let records = self.records.clone();
        let best_value = self.best_value.clone();

        Box::new(move |intermediate: &CmaesIntermediate| -> CallbackAction {
            let mut best_guard = best_value.lock().unwrap();
            let is_improvement = match *best_guard {
                Some(best) => intermediate.fun < best,
                None => true,
            };
            if is_improvement {
                *best_guard = Some(intermediate.fun);
            }
            drop(best_guard);

            records.lock().unwrap().push(OptimizationRecord {
                generation: intermediate.iter,
                x: intermediate.x.to_vec(),
                best_result: intermediate.fun,
                sigma: intermediate.sigma,
                axis_ratio: intermediate.axis_ratio,
                is_improvement,
            });

            CallbackAction::Continue
        })
    }

    /// Save all recorded generations to `<output_dir>/<function_name>.csv`.
    pub fn save_to_csv(&self, output_dir: &str) -> Result<String, Box<dyn std::error::Error>> {
        create_dir_all(output_dir)?;

        let filename = format!("{}/{}.csv", output_dir, self.function_name);
        let mut file = File::create(&filename)?;

        let records_guard = self.records.lock().unwrap();
        if records_guard.is_empty() {
            return Ok(filename);
        }

        let num_dimensions = records_guard[0].x.len();
        write!(file, "generation,")?;
        for i in 0..num_dimensions {
            write!(file, "x{},", i)?;
        }
        writeln!(file, "best_result,sigma,axis_ratio,is_improvement")?;

        for record in records_guard.iter() {
            write!(file, "{},", record.generation)?;
            for &xi in &record.x {
                write!(file, "{:.16},", xi)?;
            }
            writeln!(
                file,
                "{:.16},{:.16},{:.16},{}",
                record.best_result, record.sigma, record.axis_ratio, record.is_improvement
            )?;
        }

        Ok(filename)
    }

    /// Get a copy of all recorded generations.
    pub fn get_records(&self) -> Vec<OptimizationRecord> {
        self.records.lock().unwrap().clone()
    }

    /// Number of generations recorded so far.
    pub fn num_generations(&self) -> usize {
        self.records.lock().unwrap().len()
    }

    /// Clear all recorded generations.
    pub fn clear(&self) {
        self.records.lock().unwrap().clear();
        *self.best_value.lock().unwrap() = None;
    }

    /// Final best solution, if any generation was recorded.
    pub fn get_best_solution(&self) -> Option<(Vec<f64>, f64)> {
        let records_guard = self.records.lock().unwrap();
        records_guard
            .last()
            .map(|r| (r.x.clone(), r.best_result))
    }
}

/// Helper: run a full CMA-ES minimization while recording every generation,
/// then dump the trace as CSV.
pub fn run_recorded_cmaes<F>(
    function_name: &str,
    func: F,
    mut config: CmaesConfig,
    output_dir: &str,
) -> Result<(CmaesReport, String), Box<dyn std::error::Error>>
where
    F: Fn(&Array1<f64>) -> f64,
{
    let recorder = OptimizationRecorder::new(function_name.to_string());
    config.callback = Some(recorder.create_callback());

    let report = minimize(&func, config)?;
    let csv_path = recorder.save_to_csv(output_dir)?;

    Ok((report, csv_path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use cmaes_testfunctions::sphere;

    fn sphere_config(n: usize, seed: u64) -> CmaesConfigBuilder {
        CmaesConfigBuilder::new(Array1::from_elem(n, 1.0), Array1::from_elem(n, 0.5)).seed(seed)
    }

    fn evaluate(es: &Cmaes, f: impl Fn(&Array1<f64>) -> f64) -> Vec<f64> {
        (0..es.lambda())
            .map(|k| f(&es.population.row(k).to_owned()))
            .collect()
    }

    #[test]
    #[should_panic(expected = "without a preceding sample_population")]
    fn update_without_sample_panics() {
        let mut es = Cmaes::new(sphere_config(4, 1).build()).unwrap();
        let fitness = vec![0.0; es.lambda()];
        es.update_distribution(&fitness);
    }

    #[test]
    #[should_panic(expected = "set_mean")]
    fn set_mean_rejected_while_sampled() {
        let mut es = Cmaes::new(sphere_config(4, 1).build()).unwrap();
        es.sample_population();
        es.set_mean(&Array1::zeros(4));
    }

    #[test]
    fn set_mean_allowed_outside_sampling_window() {
        let mut es = Cmaes::new(sphere_config(4, 1).build()).unwrap();
        let sigma_before = es.sigma();
        es.set_mean(&Array1::from_elem(4, 3.0));
        assert_eq!(es.x_mean()[2], 3.0);
        assert_eq!(es.sigma(), sigma_before);

        es.sample_population();
        let fitness = evaluate(&es, sphere);
        es.update_distribution(&fitness);
        es.set_mean(&Array1::zeros(4)); // Updated state: permitted again
        assert_eq!(es.x_mean()[0], 0.0);
    }

    #[test]
    fn generation_counter_follows_the_state_machine() {
        let mut es = Cmaes::new(sphere_config(3, 9).build()).unwrap();
        assert_eq!(es.generation(), 0);
        es.sample_population();
        assert_eq!(es.generation(), 1);
        // resampling the whole population does not advance the generation
        es.sample_population();
        assert_eq!(es.generation(), 1);
        let fitness = evaluate(&es, sphere);
        es.update_distribution(&fitness);
        es.sample_population();
        assert_eq!(es.generation(), 2);
        assert_eq!(es.count_evals(), es.lambda() as u64);
    }

    #[test]
    fn flat_fitness_inflates_sigma_and_warns() {
        let warnings = Arc::new(Mutex::new(Vec::new()));
        let sink_warnings = warnings.clone();
        let config = CmaesConfigBuilder::new(Array1::zeros(4), Array1::from_elem(4, 1.0))
            .lambda(8)
            .seed(5)
            .warning_sink(Box::new(move |msg: &str| {
                sink_warnings.lock().unwrap().push(msg.to_string());
            }))
            .build();
        let mut es = Cmaes::new(config).unwrap();
        let sigma0 = es.sigma();

        let generations = 10;
        for _ in 0..generations {
            es.sample_population();
            es.update_distribution(&vec![7.0; 8]);
        }

        // each generation contributes at least exp(0.2) net growth
        let growth = es.sigma() / sigma0;
        assert!(
            growth >= (0.2 * generations as f64).exp() * 0.999,
            "sigma grew only by {growth}"
        );
        assert_eq!(warnings.lock().unwrap().len(), generations);
    }

    #[test]
    fn warnings_without_sink_are_dropped_even_with_disp() {
        // absent sink means silence; disp only drives progress printing
        let config = CmaesConfigBuilder::new(Array1::zeros(4), Array1::from_elem(4, 1.0))
            .lambda(8)
            .seed(5)
            .disp(true)
            .build();
        let mut es = Cmaes::new(config).unwrap();
        assert!(!es.warn("numerical hiccup"), "warning delivered without a sink");

        let sigma0 = es.sigma();
        let generations: usize = 10;
        for _ in 0..generations {
            es.sample_population();
            es.update_distribution(&[7.0; 8]);
        }
        // the flat-fitness escape still fires, it just has nowhere to report
        assert!(es.sigma() / sigma0 >= (0.2 * generations as f64).exp() * 0.999);
    }

    #[test]
    fn best_ever_is_monotone() {
        let mut es = Cmaes::new(sphere_config(6, 11).build()).unwrap();
        let mut previous = f64::MAX;
        for _ in 0..40 {
            es.sample_population();
            let fitness = evaluate(&es, sphere);
            es.update_distribution(&fitness);
            assert!(es.best_fitness_ever() <= previous);
            previous = es.best_fitness_ever();
        }
        assert!(es.best_ever_evals() > 0 && es.best_ever_evals() <= es.count_evals());
    }

    #[test]
    fn identically_seeded_runs_are_bitwise_equal() {
        let mut a = Cmaes::new(sphere_config(5, 42).build()).unwrap();
        let mut b = Cmaes::new(sphere_config(5, 42).build()).unwrap();
        for _ in 0..30 {
            a.sample_population();
            b.sample_population();
            let fa = evaluate(&a, sphere);
            let fb = evaluate(&b, sphere);
            assert_eq!(fa, fb);
            a.update_distribution(&fa);
            b.update_distribution(&fb);
        }
        assert_eq!(a.sigma().to_bits(), b.sigma().to_bits());
        for i in 0..5 {
            assert_eq!(a.xmean[i].to_bits(), b.xmean[i].to_bits());
            for j in 0..=i {
                assert_eq!(a.c[[i, j]].to_bits(), b.c[[i, j]].to_bits());
            }
        }
    }

    #[test]
    fn diagonal_mode_never_touches_off_diagonals() {
        let config = CmaesConfigBuilder::new(Array1::from_elem(5, 1.0), Array1::from_elem(5, 0.3))
            .diagonal_cov(1)
            .seed(17)
            .build();
        let mut es = Cmaes::new(config).unwrap();
        for _ in 0..25 {
            es.sample_population();
            let fitness = evaluate(&es, sphere);
            es.update_distribution(&fitness);
        }
        for i in 0..5 {
            for j in 0..5 {
                if i != j {
                    assert_eq!(es.c[[i, j]], 0.0, "C[{i}][{j}] moved off zero");
                    assert_eq!(es.b[[i, j]], 0.0, "B[{i}][{j}] moved off identity");
                }
            }
        }
    }

    #[test]
    fn resample_single_replaces_only_that_row() {
        let mut es = Cmaes::new(sphere_config(4, 23).build()).unwrap();
        es.sample_population();
        let before = es.population.clone();
        es.resample_single(2);
        let after = &es.population;
        let mut changed = false;
        for i in 0..4 {
            if before[[2, i]] != after[[2, i]] {
                changed = true;
            }
        }
        assert!(changed, "row 2 was not regenerated");
        for k in [0usize, 1, 3] {
            for i in 0..4 {
                assert_eq!(before[[k, i]], after[[k, i]], "row {k} was disturbed");
            }
        }
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn resample_single_rejects_bad_index() {
        let mut es = Cmaes::new(sphere_config(4, 23).build()).unwrap();
        es.sample_population();
        let lambda = es.lambda();
        es.resample_single(lambda);
    }

    #[test]
    fn perturb_reduces_to_the_mean_at_zero_eps() {
        let mut es = Cmaes::new(sphere_config(4, 31).build()).unwrap();
        let mut out = Array1::zeros(4);
        es.perturb_into(&mut out, 0.0);
        for i in 0..4 {
            assert_eq!(out[i], es.x_mean()[i]);
        }
        es.perturb_into(&mut out, 1.0);
        let mut moved = false;
        for i in 0..4 {
            assert!(out[i].is_finite());
            if out[i] != es.x_mean()[i] {
                moved = true;
            }
        }
        assert!(moved);
    }

    #[test]
    fn recorder_collects_generations() {
        let recorder = OptimizationRecorder::new("test_function".to_string());
        let mut callback = recorder.create_callback();

        let first = CmaesIntermediate {
            x: Array1::from_vec(vec![1.0, 2.0]),
            fun: 5.0,
            sigma: 0.4,
            axis_ratio: 1.5,
            iter: 1,
        };
        assert!(matches!(callback(&first), CallbackAction::Continue));

        let second = CmaesIntermediate {
            x: Array1::from_vec(vec![0.5, 1.0]),
            fun: 1.25,
            sigma: 0.3,
            axis_ratio: 1.7,
            iter: 2,
        };
        assert!(matches!(callback(&second), CallbackAction::Continue));

        let records = recorder.get_records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].generation, 1);
        assert_eq!(records[0].x, vec![1.0, 2.0]);
        assert!(records[0].is_improvement);
        assert_eq!(records[1].best_result, 1.25);
        assert!(records[1].is_improvement);
        assert_eq!(recorder.get_best_solution().unwrap().1, 1.25);

        recorder.clear();
        assert_eq!(recorder.num_generations(), 0);
    }

    #[test]
    fn sort_index_ranks_ascending() {
        let values = [3.0, 1.0, 2.0, 0.5];
        let mut index = [0usize; 4];
        sort_index(&values, &mut index);
        assert_eq!(index, [3, 1, 2, 0]);
    }
}
