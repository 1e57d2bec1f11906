//! Conditional probability path towards a single target point `z`.
//!
//! With base samples \(x_0 \sim \mathcal N(0, I)\) the path has the closed-form flow map
//! \[
//! x_t = \alpha(t)\, z + \beta(t)\, x_0 ,
//! \]
//! and velocity \(u_t(x) = \dot\alpha z + \dot\beta x_0\) with \(x_0 = (x - \alpha z)/\beta\).
//! Deterministic trajectories are therefore evaluated directly from the flow map (exact, no
//! integration error).
//!
//! The stochastic variant adds \(\tfrac{\sigma^2}{2}\nabla\log p_t\) to the drift. Writing
//! \(y = x - \alpha(t) z\), the SDE is linear in `y`:
//! \[
//! dy = K(t)\, y\, dt + \sigma(t)\, dW, \qquad K = \frac{\dot\beta}{\beta} - \frac{\sigma^2}{2\beta^2},
//! \]
//! and each step is taken as an exact Ornstein–Uhlenbeck transition with frozen `K`. Plain
//! Euler–Maruyama on this drift loses all accuracy as `β → 0`, because `K` diverges there.

use crate::buffer::{Points2D, Trajectories};
use crate::sampling::NoisePool;
use crate::schedule::{Schedule, SigmaSchedule};
use crate::{check_same_len, check_trajectory_shape, Error, Result, BETA_FLOOR};

/// Below this `|2 K dt|` the exact OU variance is replaced by its limit `σ² dt`.
pub const OU_SERIES_THRESHOLD: f64 = 1e-4;

/// `x_t = α(t) z + β(t) x0` for every point of `x0`.
pub fn write_positions(
    schedule: Schedule,
    target: [f64; 2],
    x0: &Points2D,
    t: f64,
    out: &mut Points2D,
) -> Result<()> {
    check_same_len(x0, out)?;
    let a = schedule.alpha(t);
    let b = schedule.beta(t);
    out.update(|xs, ys| {
        for i in 0..xs.len() {
            let [px, py] = x0.get(i);
            xs[i] = (a * target[0] + b * px as f64) as f32;
            ys[i] = (a * target[1] + b * py as f64) as f32;
        }
    });
    Ok(())
}

/// Velocity of the conditional path at positions `x`.
pub fn write_velocities(
    schedule: Schedule,
    target: [f64; 2],
    x: &Points2D,
    t: f64,
    out: &mut Points2D,
) -> Result<()> {
    check_same_len(x, out)?;
    let s = schedule.eval(t);
    let beta = s.beta.max(BETA_FLOOR);
    out.update(|xs, ys| {
        for i in 0..xs.len() {
            let [px, py] = x.get(i);
            let x0 = (px as f64 - s.alpha * target[0]) / beta;
            let y0 = (py as f64 - s.alpha * target[1]) / beta;
            xs[i] = (s.alpha_deriv * target[0] + s.beta_deriv * x0) as f32;
            ys[i] = (s.alpha_deriv * target[1] + s.beta_deriv * y0) as f32;
        }
    });
    Ok(())
}

/// Score of \(p_t(\cdot \mid z) = \mathcal N(\alpha z, \beta^2 I)\): `-(x - α z) / β²`.
pub fn write_scores(
    schedule: Schedule,
    target: [f64; 2],
    x: &Points2D,
    t: f64,
    out: &mut Points2D,
) -> Result<()> {
    check_same_len(x, out)?;
    let a = schedule.alpha(t);
    let b = schedule.beta(t).max(BETA_FLOOR);
    let inv_var = 1.0 / (b * b);
    out.update(|xs, ys| {
        for i in 0..xs.len() {
            let [px, py] = x.get(i);
            xs[i] = (-(px as f64 - a * target[0]) * inv_var) as f32;
            ys[i] = (-(py as f64 - a * target[1]) * inv_var) as f32;
        }
    });
    Ok(())
}

/// Deterministic trajectories from the flow map, on the uniform grid `t_j = j / (P - 1)`.
pub fn write_trajectories(
    schedule: Schedule,
    target: [f64; 2],
    x0: &Points2D,
    traj: &mut Trajectories,
) -> Result<()> {
    let steps = check_trajectory_shape(x0, traj)?;
    let ppt = traj.points_per_trajectory();
    traj.update(|w| {
        for j in 0..ppt {
            let t = j as f64 / steps as f64;
            let a = schedule.alpha(t);
            let b = schedule.beta(t);
            for i in 0..x0.len() {
                let [px, py] = x0.get(i);
                w.set(
                    i,
                    j,
                    (a * target[0] + b * px as f64) as f32,
                    (a * target[1] + b * py as f64) as f32,
                );
            }
        }
    });
    tracing::debug!(
        target: "probpath::conditional",
        %schedule,
        count = x0.len(),
        steps,
        "wrote flow-map trajectories"
    );
    Ok(())
}

/// One frozen-coefficient OU transition `dy = K y dt + σ dW` over `dt`.
///
/// Returns `(decay, noise_std)` such that `y' = decay · y + noise_std · ξ`, `ξ ~ N(0, 1)`.
#[inline]
pub fn ou_transition(k: f64, sigma: f64, dt: f64) -> (f64, f64) {
    let decay = (k * dt).exp();
    let two_k_dt = 2.0 * k * dt;
    let noise_std = if two_k_dt.abs() < OU_SERIES_THRESHOLD {
        sigma * dt.sqrt()
    } else {
        let var = sigma * sigma * (two_k_dt.exp() - 1.0) / (2.0 * k);
        var.max(0.0).sqrt()
    };
    (decay, noise_std)
}

/// Stochastic trajectories towards `target` using the stabilized OU update.
///
/// Step `j` (from `t_{j-1}` to `t_j`) evaluates `K` and `σ` at `t_j` and consumes noise entry
/// `[i, j - 1]` of `noise`.
pub fn write_sde_trajectories(
    schedule: Schedule,
    sigma_schedule: SigmaSchedule,
    sigma_max: f64,
    target: [f64; 2],
    x0: &Points2D,
    noise: &NoisePool,
    traj: &mut Trajectories,
) -> Result<()> {
    if !sigma_max.is_finite() || sigma_max < 0.0 {
        return Err(Error::Domain("sigma_max must be finite and >= 0"));
    }
    let steps = check_trajectory_shape(x0, traj)?;
    noise.check_capacity(x0.len(), steps)?;

    let dt = 1.0 / steps as f64;
    let (mut xs, mut ys) = x0.to_f64();
    traj.update(|w| {
        // t = 0: α = 0 and β = 1, so the path starts at the source sample.
        w.set_column(0, &xs, &ys);
        let mut alpha_prev = schedule.alpha(0.0);
        for j in 1..=steps {
            let t = j as f64 * dt;
            let s = schedule.eval(t);
            let beta = s.beta.max(BETA_FLOOR);
            let sigma = sigma_schedule.sigma(t, sigma_max);
            let k = s.beta_deriv / beta - sigma * sigma / (2.0 * beta * beta);
            let (decay, noise_std) = ou_transition(k, sigma, dt);

            for i in 0..xs.len() {
                let [nx, ny] = noise.get(i, j - 1);
                let dev_x = xs[i] - alpha_prev * target[0];
                let dev_y = ys[i] - alpha_prev * target[1];
                xs[i] = s.alpha * target[0] + decay * dev_x + noise_std * nx;
                ys[i] = s.alpha * target[1] + decay * dev_y + noise_std * ny;
            }
            w.set_column(j, &xs, &ys);
            alpha_prev = s.alpha;
        }
    });
    tracing::debug!(
        target: "probpath::conditional",
        %schedule,
        %sigma_schedule,
        sigma_max,
        count = x0.len(),
        steps,
        "wrote stabilized OU trajectories"
    );
    Ok(())
}
