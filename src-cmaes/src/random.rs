//! Seeded uniform and Gaussian deviates for the sampling loop.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Single-stream random source producing uniform and standard normal
/// deviates. Gaussian draws use the polar method; the second deviate of each
/// pair is cached so consecutive calls consume it before touching the
/// underlying stream again.
pub struct GaussRng {
    rng: StdRng,
    cached: Option<f64>,
}

impl GaussRng {
    /// Create a source from an optional seed. Without a seed the stream is
    /// initialized from the thread-local generator.
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => {
                let mut thread_rng = rand::rng();
                StdRng::from_rng(&mut thread_rng)
            }
        };
        Self { rng, cached: None }
    }

    /// Uniform deviate in [0, 1).
    pub fn uniform(&mut self) -> f64 {
        self.rng.random::<f64>()
    }

    /// Standard normal deviate.
    pub fn gauss(&mut self) -> f64 {
        if let Some(g) = self.cached.take() {
            return g;
        }
        loop {
            let u = 2.0 * self.uniform() - 1.0;
            let v = 2.0 * self.uniform() - 1.0;
            let s = u * u + v * v;
            if s > 0.0 && s < 1.0 {
                let f = (-2.0 * s.ln() / s).sqrt();
                self.cached = Some(f * v);
                return f * u;
            }
        }
    }
}
