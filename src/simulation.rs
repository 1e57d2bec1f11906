//! Config-driven owner of the buffers for one visualization instance.
//!
//! The path functions in [`crate::conditional`] and [`crate::marginal`] are stateless and work on
//! caller-owned buffers. [`Simulation`] is that caller for the common case: it holds the source
//! samples, the SDE noise pool and the trajectory buffer, sized from a [`SimulationConfig`], and
//! reallocates only when a dimension changes.
//!
//! Independent simulations must own independent `Simulation`s; nothing here is shared or locked.

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::buffer::{Points2D, Trajectories};
use crate::integrate::Integrator;
use crate::marginal::{self, GaussianMixture};
use crate::sampling::{sample_standard_normal, NoisePool};
use crate::schedule::{Schedule, SigmaSchedule};
use crate::{conditional, Error, Result};

/// What to simulate and at which resolution.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SimulationConfig {
    /// α/β interpolation schedule.
    pub schedule: Schedule,
    /// Shape of the diffusion coefficient over time.
    pub sigma_schedule: SigmaSchedule,
    /// Peak diffusion coefficient (`σ(t) = σ_max · shape(t)`).
    pub sigma_max: f64,
    /// Number of trajectories.
    pub samples: usize,
    /// Integration steps per trajectory (each trajectory stores `steps + 1` points).
    pub steps: usize,
    /// Deterministic ODE or one of the stochastic samplers.
    pub integrator: Integrator,
    /// RNG seed for source samples and noise.
    pub seed: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            schedule: Schedule::Linear,
            sigma_schedule: SigmaSchedule::Constant,
            sigma_max: 0.5,
            samples: 500,
            steps: 100,
            integrator: Integrator::Euler,
            seed: 123,
        }
    }
}

impl SimulationConfig {
    pub fn validate(&self) -> Result<()> {
        if self.samples == 0 {
            return Err(Error::Domain("samples must be >= 1"));
        }
        if self.steps == 0 {
            return Err(Error::Domain("steps must be >= 1"));
        }
        if !self.sigma_max.is_finite() || self.sigma_max < 0.0 {
            return Err(Error::Domain("sigma_max must be finite and >= 0"));
        }
        Ok(())
    }
}

/// Buffers and RNG for one running simulation.
#[derive(Debug, Clone)]
pub struct Simulation {
    config: SimulationConfig,
    rng: ChaCha8Rng,
    source: Points2D,
    noise: NoisePool,
    trajectories: Trajectories,
}

impl Simulation {
    pub fn new(config: SimulationConfig) -> Result<Self> {
        config.validate()?;
        let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
        let mut source = Points2D::zeros(config.samples);
        sample_standard_normal(&mut rng, &mut source);
        let noise = NoisePool::new(config.samples, config.steps, &mut rng);
        let trajectories = Trajectories::new(config.samples, config.steps + 1);
        Ok(Self {
            config,
            rng,
            source,
            noise,
            trajectories,
        })
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn source(&self) -> &Points2D {
        &self.source
    }

    pub fn noise(&self) -> &NoisePool {
        &self.noise
    }

    pub fn trajectories(&self) -> &Trajectories {
        &self.trajectories
    }

    /// Swap in a new config, reallocating only the buffers whose dimensions changed.
    ///
    /// Existing source samples and noise are kept when their sizes still fit, so changing only
    /// the schedule or `σ_max` keeps paths coherent between runs.
    pub fn reconfigure(&mut self, config: SimulationConfig) -> Result<()> {
        config.validate()?;
        if self.source.resize(config.samples) {
            sample_standard_normal(&mut self.rng, &mut self.source);
        }
        self.noise.resize(config.samples, config.steps, &mut self.rng);
        let realloc = self.trajectories.resize(config.samples, config.steps + 1);
        tracing::debug!(
            target: "probpath::simulation",
            samples = config.samples,
            steps = config.steps,
            realloc,
            "reconfigured"
        );
        self.config = config;
        Ok(())
    }

    /// Draw fresh source samples `x0 ~ N(0, I)`.
    pub fn resample_source(&mut self) {
        sample_standard_normal(&mut self.rng, &mut self.source);
    }

    /// Draw a fresh noise pool; the only way to get a different stochastic path.
    pub fn resample_noise(&mut self) {
        self.noise.resample(&mut self.rng);
    }

    /// Trajectories towards a single point.
    ///
    /// [`Integrator::Euler`] evaluates the exact flow map; the stochastic integrators both use the
    /// stabilized OU update, since the conditional path has no need for a generic SDE solver.
    pub fn run_conditional(&mut self, target: [f64; 2]) -> Result<&Trajectories> {
        let c = &self.config;
        if c.integrator.is_stochastic() {
            conditional::write_sde_trajectories(
                c.schedule,
                c.sigma_schedule,
                c.sigma_max,
                target,
                &self.source,
                &self.noise,
                &mut self.trajectories,
            )?;
        } else {
            conditional::write_trajectories(c.schedule, target, &self.source, &mut self.trajectories)?;
        }
        Ok(&self.trajectories)
    }

    /// Trajectories towards a Gaussian mixture with the configured integrator.
    pub fn run_marginal(&mut self, mixture: &GaussianMixture) -> Result<&Trajectories> {
        let c = &self.config;
        marginal::write_trajectories(
            c.integrator,
            c.schedule,
            c.sigma_schedule,
            c.sigma_max,
            mixture,
            &self.source,
            Some(&self.noise),
            &mut self.trajectories,
        )?;
        Ok(&self.trajectories)
    }
}
