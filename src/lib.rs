//! # probpath
//!
//! Probability paths for flow matching and diffusion, in 2-D.
//!
//! Given a standard Gaussian source and a target (a single point, or a Gaussian mixture), this
//! crate builds the time-indexed family \(p_t\) with
//! \[
//! x_t = \alpha(t)\, z + \beta(t)\, x_0, \qquad x_0 \sim \mathcal N(0, I),\; z \sim p_{\text{target}},
//! \]
//! and moves samples along it with deterministic (ODE) and stochastic (SDE) dynamics.
//!
//! It is a computation library for a visualization front end: it never trains anything, and all
//! targets are given directly.
//!
//! ## Public invariants (must not change)
//!
//! - **Caller-owned buffers**: batch functions read inputs and write into buffers passed by
//!   reference. Each buffer's `version()` increases once per mutating call, so consumers can
//!   detect staleness without comparing contents.
//! - **Explicit randomness**: every sampling entry point takes `rng: &mut impl rand::Rng`.
//!   Stochastic trajectories consume a [`sampling::NoisePool`], so re-running with the same
//!   pool reproduces the same paths.
//! - **Structural errors fail fast, numerics degrade silently**: mismatched shapes and undersized
//!   noise pools return [`Error`] before anything is written; near-singular numerics are handled
//!   by flooring/clamping (or produce `NaN`/`inf`), never by erroring.
//! - **Single writer**: there is no internal locking. One in-flight call per buffer.
//!
//! ## Module map
//!
//! - `schedule`: α/β interpolation schedules and σ diffusion schedules
//! - `linalg`: 2×2 matrices and covariance ↔ ellipse-axes conversion
//! - `buffer`: `Points2D` / `Trajectories` structure-of-arrays buffers
//! - `sampling`: Box–Muller sampling and SDE noise pools
//! - `conditional`: single-point target (closed-form flow map, stabilized OU SDE)
//! - `marginal`: Gaussian-mixture target (marginal mixture, velocity, score, trajectories)
//! - `integrate`: fixed-step batch Euler / Euler–Maruyama / Heun
//! - `simulation`: config-driven owner of the buffers for one visualization instance

pub mod buffer;
pub mod conditional;
pub mod integrate;
pub mod linalg;
pub mod marginal;
pub mod sampling;
pub mod schedule;
pub mod simulation;

pub use buffer::{Points2D, Trajectories};
pub use integrate::Integrator;
pub use marginal::{GaussianComponent, GaussianMixture};
pub use schedule::{Schedule, SigmaSchedule};
pub use simulation::{Simulation, SimulationConfig};

/// `β(t)` is floored here before being used as a divisor (it reaches 0 at `t = 1`).
pub(crate) const BETA_FLOOR: f64 = 1e-8;

/// probpath error variants.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("shape mismatch: {0}")]
    Shape(&'static str),
    #[error("domain error: {0}")]
    Domain(&'static str),
    #[error(
        "noise pool too small: need {samples} samples x {steps} steps, \
         pool holds {pool_samples} x {pool_steps}"
    )]
    NoisePool {
        samples: usize,
        steps: usize,
        pool_samples: usize,
        pool_steps: usize,
    },
    #[error("unknown name: {0:?}")]
    UnknownSchedule(String),
}

pub type Result<T> = std::result::Result<T, Error>;

pub(crate) fn check_same_len(input: &Points2D, out: &Points2D) -> Result<()> {
    if input.len() != out.len() {
        return Err(Error::Shape("input and output point batches must have the same length"));
    }
    Ok(())
}

/// Validate `traj` against the source batch and return the number of steps.
pub(crate) fn check_trajectory_shape(x0: &Points2D, traj: &Trajectories) -> Result<usize> {
    if traj.count() != x0.len() {
        return Err(Error::Shape("trajectory count must match the number of source points"));
    }
    if traj.points_per_trajectory() < 2 {
        return Err(Error::Domain("trajectories need at least 2 points"));
    }
    Ok(traj.points_per_trajectory() - 1)
}
