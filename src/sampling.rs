//! Standard-Gaussian sampling and pre-generated SDE noise.
//!
//! This is the only source of randomness in the crate. Every entry point takes the uniform source
//! explicitly (`rng: &mut impl Rng`), so tests and callers choose their own seeding.

use rand::Rng;
use rand_distr::Distribution;

use crate::buffer::Points2D;
use crate::{Error, Result};

/// Box–Muller transform: two uniforms in, two independent `N(0, 1)` samples out.
#[derive(Debug, Clone, Copy, Default)]
pub struct BoxMuller;

impl Distribution<[f64; 2]> for BoxMuller {
    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> [f64; 2] {
        // u1 ∈ (0, 1] so that ln(u1) is finite.
        let u1 = 1.0 - rng.random::<f64>();
        let u2: f64 = rng.random();
        let r = (-2.0 * u1.ln()).sqrt();
        let (s, c) = (std::f64::consts::TAU * u2).sin_cos();
        [r * c, r * s]
    }
}

/// Fill `out` with i.i.d. standard-Gaussian 2-D points (one Box–Muller pair per point).
pub fn sample_standard_normal(rng: &mut impl Rng, out: &mut Points2D) {
    out.update(|xs, ys| {
        for (x, y) in xs.iter_mut().zip(ys.iter_mut()) {
            let [g0, g1] = BoxMuller.sample(rng);
            *x = g0 as f32;
            *y = g1 as f32;
        }
    });
}

/// Pre-generated standard-Gaussian increments for SDE integration.
///
/// Entry `[sample * steps_per_sample + step]` is the noise for `step` of trajectory `sample`.
/// Re-running an integration against the same pool reproduces the same stochastic paths; a
/// materially different path requires an explicit [`NoisePool::resample`].
#[derive(Debug, Clone, Default)]
pub struct NoisePool {
    noise: Points2D,
    samples: usize,
    steps_per_sample: usize,
}

impl NoisePool {
    pub fn new(samples: usize, steps_per_sample: usize, rng: &mut impl Rng) -> Self {
        let mut pool = Self {
            noise: Points2D::zeros(samples * steps_per_sample),
            samples,
            steps_per_sample,
        };
        pool.resample(rng);
        pool
    }

    pub fn samples(&self) -> usize {
        self.samples
    }

    pub fn steps_per_sample(&self) -> usize {
        self.steps_per_sample
    }

    pub fn version(&self) -> u64 {
        self.noise.version()
    }

    pub fn resample(&mut self, rng: &mut impl Rng) {
        sample_standard_normal(rng, &mut self.noise);
        tracing::debug!(
            target: "probpath::sampling",
            samples = self.samples,
            steps_per_sample = self.steps_per_sample,
            "resampled noise pool"
        );
    }

    /// Reallocate and regenerate when the capacity changes. Returns `true` if it did.
    pub fn resize(&mut self, samples: usize, steps_per_sample: usize, rng: &mut impl Rng) -> bool {
        if self.samples == samples && self.steps_per_sample == steps_per_sample {
            return false;
        }
        self.noise.resize(samples * steps_per_sample);
        self.samples = samples;
        self.steps_per_sample = steps_per_sample;
        self.resample(rng);
        true
    }

    /// Fail fast if an integration of `samples × steps` would read past the pool.
    pub fn check_capacity(&self, samples: usize, steps: usize) -> Result<()> {
        if samples > self.samples || steps > self.steps_per_sample {
            return Err(Error::NoisePool {
                samples,
                steps,
                pool_samples: self.samples,
                pool_steps: self.steps_per_sample,
            });
        }
        Ok(())
    }

    #[inline]
    pub fn get(&self, sample: usize, step: usize) -> [f64; 2] {
        let [x, y] = self.noise.get(sample * self.steps_per_sample + step);
        [x as f64, y as f64]
    }
}
