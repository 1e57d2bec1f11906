//! Fixed-step batch integrators on `t ∈ [0, 1]`.
//!
//! The state is a whole batch of 2-D points and every step advances all of them at once:
//! \[
//! dx = f(x, t)\, dt + \sigma(t)\, dW .
//! \]
//! With `P` points per trajectory there are `P - 1` steps of size `dt = 1 / (P - 1)`, and point
//! `j` of each trajectory is the state at `t_j = j · dt`.
//!
//! No adaptive stepping, no hidden tolerances. The only clamp is Heun's corrector time, which is
//! kept below `1` so the drift is never evaluated where `β(t) = 0`.

use std::fmt;
use std::str::FromStr;

use crate::buffer::{Points2D, Trajectories};
use crate::sampling::NoisePool;
use crate::{check_trajectory_shape, Error, Result};

/// Upper bound on the time at which Heun re-evaluates the drift.
pub const HEUN_T_MAX: f64 = 1.0 - 1e-6;

/// Fixed-step method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "kebab-case")
)]
pub enum Integrator {
    /// Explicit Euler on the deterministic ODE (noise and `σ` are ignored).
    #[default]
    Euler,
    /// Euler–Maruyama (strong order ½).
    EulerMaruyama,
    /// Stochastic Heun predictor-corrector.
    ///
    /// The predictor and the final update share one noise draw; only the drift is averaged.
    /// Independent draws would be the textbook choice for strong-order analysis.
    Heun,
}

impl Integrator {
    pub const ALL: [Integrator; 3] = [
        Integrator::Euler,
        Integrator::EulerMaruyama,
        Integrator::Heun,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Integrator::Euler => "euler",
            Integrator::EulerMaruyama => "euler-maruyama",
            Integrator::Heun => "heun",
        }
    }

    pub fn is_stochastic(self) -> bool {
        !matches!(self, Integrator::Euler)
    }
}

impl fmt::Display for Integrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Integrator {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Integrator::ALL
            .into_iter()
            .find(|m| m.name() == s)
            .ok_or_else(|| Error::UnknownSchedule(s.to_string()))
    }
}

/// Integrate a batch forward from `x0` at `t = 0`, writing every step into `traj`.
///
/// - `drift(t, xs, ys, out_x, out_y)` writes the full drift at time `t` for the whole batch.
/// - `diffusion(t)` is the scalar noise scale `σ(t)`; it is not called for [`Integrator::Euler`].
/// - `noise` must hold at least `count × steps` draws for the stochastic methods.
///
/// `traj.version()` is bumped exactly once on success and not at all on error.
pub fn integrate_batch(
    method: Integrator,
    x0: &Points2D,
    noise: Option<&NoisePool>,
    diffusion: impl Fn(f64) -> f64,
    traj: &mut Trajectories,
    mut drift: impl FnMut(f64, &[f64], &[f64], &mut [f64], &mut [f64]),
) -> Result<()> {
    let steps = check_trajectory_shape(x0, traj)?;
    let n = x0.len();
    let noise = if method.is_stochastic() {
        let pool = noise.ok_or(Error::Domain("stochastic integrators need a noise pool"))?;
        pool.check_capacity(n, steps)?;
        Some(pool)
    } else {
        None
    };

    let dt = 1.0 / steps as f64;
    let sqrt_dt = dt.sqrt();
    let (mut xs, mut ys) = x0.to_f64();
    let mut d1x = vec![0.0f64; n];
    let mut d1y = vec![0.0f64; n];
    // Heun scratch: predicted state and the corrector drift.
    let (mut px, mut py, mut d2x, mut d2y) = match method {
        Integrator::Heun => (vec![0.0; n], vec![0.0; n], vec![0.0; n], vec![0.0; n]),
        _ => (Vec::new(), Vec::new(), Vec::new(), Vec::new()),
    };

    traj.update(|w| {
        w.set_column(0, &xs, &ys);
        for s in 0..steps {
            let t = s as f64 * dt;
            drift(t, &xs, &ys, &mut d1x, &mut d1y);

            match (method, noise) {
                (Integrator::EulerMaruyama, Some(pool)) => {
                    let g = diffusion(t) * sqrt_dt;
                    for i in 0..n {
                        let [zx, zy] = pool.get(i, s);
                        xs[i] += d1x[i] * dt + g * zx;
                        ys[i] += d1y[i] * dt + g * zy;
                    }
                }
                (Integrator::Heun, Some(pool)) => {
                    let g = diffusion(t) * sqrt_dt;
                    for i in 0..n {
                        let [zx, zy] = pool.get(i, s);
                        px[i] = xs[i] + d1x[i] * dt + g * zx;
                        py[i] = ys[i] + d1y[i] * dt + g * zy;
                    }
                    let t_next = (t + dt).min(HEUN_T_MAX);
                    drift(t_next, &px, &py, &mut d2x, &mut d2y);
                    for i in 0..n {
                        let [zx, zy] = pool.get(i, s);
                        xs[i] += 0.5 * (d1x[i] + d2x[i]) * dt + g * zx;
                        ys[i] += 0.5 * (d1y[i] + d2y[i]) * dt + g * zy;
                    }
                }
                _ => {
                    for i in 0..n {
                        xs[i] += d1x[i] * dt;
                        ys[i] += d1y[i] * dt;
                    }
                }
            }
            w.set_column(s + 1, &xs, &ys);
        }
    });
    Ok(())
}
