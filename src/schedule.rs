//! Interpolation schedules \(\alpha(t), \beta(t)\) and diffusion schedules \(\sigma(t)\).
//!
//! A probability path moves mass from noise at `t = 0` to the target at `t = 1`:
//! \[
//! x_t = \alpha(t)\, z + \beta(t)\, x_0 .
//! \]
//!
//! Every [`Schedule`] satisfies α(0)=0, α(1)=1, β(0)=1, β(1)=0. This is a contract of the
//! closed set below, not a runtime check: a schedule violating it would still evaluate, it would
//! just describe a different path.
//!
//! All evaluations clamp `t` into `[0, 1]` first.

use std::f64::consts::{FRAC_PI_2, PI};
use std::fmt;
use std::str::FromStr;

use crate::Error;

/// VP ("ddpm") schedule: linear noise-rate ramp `β_min → β_max` in continuous time.
const DDPM_BETA_MIN: f64 = 0.1;
const DDPM_BETA_MAX: f64 = 20.0;
/// Keeps the ddpm derivative away from `β(t) = 0` and the `t = 0` endpoint.
const DDPM_DERIV_EPS: f64 = 1e-5;
/// Slope of the logistic used by [`Schedule::Sigmoid`].
const SIGMOID_SHARPNESS: f64 = 10.0;

#[inline]
fn clamp_unit(t: f64) -> f64 {
    t.clamp(0.0, 1.0)
}

/// α/β interpolation schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "kebab-case")
)]
pub enum Schedule {
    /// `α = t`, `β = 1 - t` (rectified-flow / OT path).
    #[default]
    Linear,
    /// `α = sin(πt/2)`, `β = cos(πt/2)` (variance preserving, trigonometric).
    Cosine,
    /// Variance-preserving DDPM-style schedule, rescaled so that `α(0) = 0` exactly.
    Ddpm,
    /// Logistic ramp, rescaled to hit the endpoints exactly; `β = 1 - α`.
    Sigmoid,
}

/// The four scalars a schedule produces at one time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScheduleValues {
    pub alpha: f64,
    pub beta: f64,
    pub alpha_deriv: f64,
    pub beta_deriv: f64,
}

impl Schedule {
    pub const ALL: [Schedule; 4] = [
        Schedule::Linear,
        Schedule::Cosine,
        Schedule::Ddpm,
        Schedule::Sigmoid,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Schedule::Linear => "linear",
            Schedule::Cosine => "cosine",
            Schedule::Ddpm => "ddpm",
            Schedule::Sigmoid => "sigmoid",
        }
    }

    pub fn alpha(self, t: f64) -> f64 {
        let t = clamp_unit(t);
        match self {
            Schedule::Linear => t,
            Schedule::Cosine => (FRAC_PI_2 * t).sin(),
            Schedule::Ddpm => ddpm_alpha(t),
            Schedule::Sigmoid => sigmoid_alpha(t),
        }
    }

    pub fn beta(self, t: f64) -> f64 {
        let t = clamp_unit(t);
        match self {
            Schedule::Linear => 1.0 - t,
            Schedule::Cosine => (FRAC_PI_2 * t).cos(),
            Schedule::Ddpm => {
                let a = ddpm_alpha(t);
                (1.0 - a * a).max(0.0).sqrt()
            }
            Schedule::Sigmoid => 1.0 - sigmoid_alpha(t),
        }
    }

    /// \(\dot\alpha(t)\).
    pub fn alpha_deriv(self, t: f64) -> f64 {
        let t = clamp_unit(t);
        match self {
            Schedule::Linear => 1.0,
            Schedule::Cosine => FRAC_PI_2 * (FRAC_PI_2 * t).cos(),
            Schedule::Ddpm => ddpm_alpha_deriv(t),
            Schedule::Sigmoid => sigmoid_alpha_deriv(t),
        }
    }

    /// \(\dot\beta(t)\).
    ///
    /// For `Ddpm`, `t` is additionally clamped into `[ε, 1-ε]` because the closed form divides
    /// by `β(t)`, which vanishes at `t = 1`.
    pub fn beta_deriv(self, t: f64) -> f64 {
        let t = clamp_unit(t);
        match self {
            Schedule::Linear => -1.0,
            Schedule::Cosine => -FRAC_PI_2 * (FRAC_PI_2 * t).sin(),
            Schedule::Ddpm => {
                let t = t.clamp(DDPM_DERIV_EPS, 1.0 - DDPM_DERIV_EPS);
                let a = ddpm_alpha(t);
                let b = (1.0 - a * a).max(0.0).sqrt();
                -a * ddpm_alpha_deriv(t) / b
            }
            Schedule::Sigmoid => -sigmoid_alpha_deriv(t),
        }
    }

    pub fn eval(self, t: f64) -> ScheduleValues {
        ScheduleValues {
            alpha: self.alpha(t),
            beta: self.beta(t),
            alpha_deriv: self.alpha_deriv(t),
            beta_deriv: self.beta_deriv(t),
        }
    }
}

// Unnormalized VP signal coefficient: exp(-¼(β_max-β_min)s² - ½β_min s) with s = 1 - t.
#[inline]
fn ddpm_raw(t: f64) -> f64 {
    let s = 1.0 - t;
    (-0.25 * (DDPM_BETA_MAX - DDPM_BETA_MIN) * s * s - 0.5 * DDPM_BETA_MIN * s).exp()
}

#[inline]
fn ddpm_alpha(t: f64) -> f64 {
    let r0 = ddpm_raw(0.0);
    (ddpm_raw(t) - r0) / (1.0 - r0)
}

#[inline]
fn ddpm_alpha_deriv(t: f64) -> f64 {
    let s = 1.0 - t;
    let r0 = ddpm_raw(0.0);
    let rate = 0.5 * (DDPM_BETA_MAX - DDPM_BETA_MIN) * s + 0.5 * DDPM_BETA_MIN;
    ddpm_raw(t) * rate / (1.0 - r0)
}

#[inline]
fn logistic(u: f64) -> f64 {
    1.0 / (1.0 + (-u).exp())
}

#[inline]
fn sigmoid_span() -> (f64, f64) {
    let lo = logistic(-0.5 * SIGMOID_SHARPNESS);
    let hi = logistic(0.5 * SIGMOID_SHARPNESS);
    (lo, hi - lo)
}

#[inline]
fn sigmoid_alpha(t: f64) -> f64 {
    let (lo, span) = sigmoid_span();
    (logistic(SIGMOID_SHARPNESS * (t - 0.5)) - lo) / span
}

#[inline]
fn sigmoid_alpha_deriv(t: f64) -> f64 {
    let (_, span) = sigmoid_span();
    let s = logistic(SIGMOID_SHARPNESS * (t - 0.5));
    SIGMOID_SHARPNESS * s * (1.0 - s) / span
}

impl fmt::Display for Schedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Schedule {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Schedule::ALL
            .into_iter()
            .find(|sched| sched.name() == s)
            .ok_or_else(|| Error::UnknownSchedule(s.to_string()))
    }
}

/// Diffusion-strength schedule \(\sigma(t;\sigma_{\max}) \ge 0\) for the stochastic samplers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "kebab-case")
)]
pub enum SigmaSchedule {
    /// `σ_max` everywhere.
    #[default]
    Constant,
    /// `σ_max (1 - t)`: noisy early, deterministic at the target.
    Linear,
    /// `σ_max t`.
    LinearReverse,
    /// `σ_max sin(πt)`: zero at both endpoints.
    SineBump,
    /// `σ_max` on `[0, ½)`, zero afterwards (discontinuous).
    Step,
}

impl SigmaSchedule {
    pub const ALL: [SigmaSchedule; 5] = [
        SigmaSchedule::Constant,
        SigmaSchedule::Linear,
        SigmaSchedule::LinearReverse,
        SigmaSchedule::SineBump,
        SigmaSchedule::Step,
    ];

    pub fn name(self) -> &'static str {
        match self {
            SigmaSchedule::Constant => "constant",
            SigmaSchedule::Linear => "linear",
            SigmaSchedule::LinearReverse => "linear-reverse",
            SigmaSchedule::SineBump => "sine-bump",
            SigmaSchedule::Step => "step",
        }
    }

    pub fn sigma(self, t: f64, sigma_max: f64) -> f64 {
        let t = clamp_unit(t);
        let shape = match self {
            SigmaSchedule::Constant => 1.0,
            SigmaSchedule::Linear => 1.0 - t,
            SigmaSchedule::LinearReverse => t,
            SigmaSchedule::SineBump => (PI * t).sin().max(0.0),
            SigmaSchedule::Step => {
                if t < 0.5 {
                    1.0
                } else {
                    0.0
                }
            }
        };
        sigma_max.max(0.0) * shape
    }
}

impl fmt::Display for SigmaSchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SigmaSchedule {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SigmaSchedule::ALL
            .into_iter()
            .find(|sched| sched.name() == s)
            .ok_or_else(|| Error::UnknownSchedule(s.to_string()))
    }
}
