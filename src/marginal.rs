//! Marginal probability path towards a Gaussian mixture.
//!
//! If the target is \(\sum_k w_k \mathcal N(\mu_k, \Sigma_k)\) then the marginal at time `t` is
//! again a mixture with the same weights:
//! \[
//! p_t = \sum_k w_k\, \mathcal N\big(\alpha \mu_k,\; S_k\big), \qquad S_k = \alpha^2 \Sigma_k + \beta^2 I .
//! \]
//!
//! Velocity and score of \(p_t\) are posterior averages over components, weighted by the
//! responsibilities \(r_k(x) \propto w_k \mathcal N(x; \alpha\mu_k, S_k)\):
//!
//! - score: \(\nabla \log p_t(x) = -\sum_k r_k S_k^{-1}(x - \alpha\mu_k)\)
//! - velocity: \(v = A\, \hat z(x) + B\, x\) with \(B = \dot\beta/\beta\), \(A = \dot\alpha - B\alpha\),
//!   and the denoiser \(\hat z(x) = \sum_k r_k \big(\mu_k + \alpha\Sigma_k S_k^{-1}(x - \alpha\mu_k)\big)\).
//!
//! Both are computed in two passes over the `N × K` (point, component) grid: log-likelihoods
//! first, then a max-shifted softmax and the weighted accumulation. `S_k` gets
//! [`COV_REGULARIZER`] on its diagonal before inversion and `β` is floored before it divides.

use ndarray::{Array2, ArrayViewMut1};
use rand::Rng;
use rand_distr::Distribution;

use crate::buffer::{Points2D, Trajectories};
use crate::integrate::{integrate_batch, Integrator};
use crate::linalg::{axes_to_covariance, covariance_to_axes, EllipseAxes, Mat2};
use crate::sampling::{BoxMuller, NoisePool};
use crate::schedule::{Schedule, SigmaSchedule};
use crate::{check_same_len, Error, Result, BETA_FLOOR};

/// Added to the diagonal of every time-`t` covariance before it is inverted.
pub const COV_REGULARIZER: f64 = 1e-6;

const LN_2PI: f64 = 1.837_877_066_409_345_3;

/// One weighted 2-D Gaussian.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GaussianComponent {
    pub mean: [f64; 2],
    /// Relative mass; mixtures are not required to be normalized.
    pub weight: f64,
    pub covariance: Mat2,
}

impl GaussianComponent {
    pub fn new(mean: [f64; 2], weight: f64, covariance: Mat2) -> Self {
        Self {
            mean,
            weight,
            covariance,
        }
    }

    pub fn isotropic(mean: [f64; 2], weight: f64, variance: f64) -> Self {
        Self::new(mean, weight, Mat2::diagonal(variance, variance))
    }

    /// Build from ellipse axes (e.g. dragged handles).
    pub fn from_axes(mean: [f64; 2], weight: f64, axes: &EllipseAxes) -> Self {
        Self::new(mean, weight, axes_to_covariance(axes))
    }

    pub fn axes(&self) -> EllipseAxes {
        covariance_to_axes(&self.covariance)
    }
}

/// Ordered list of components plus a generation counter.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GaussianMixture {
    components: Vec<GaussianComponent>,
    version: u64,
}

impl GaussianMixture {
    pub fn new(components: Vec<GaussianComponent>) -> Self {
        Self {
            components,
            version: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    pub fn components(&self) -> &[GaussianComponent] {
        &self.components
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn push(&mut self, component: GaussianComponent) {
        self.components.push(component);
        self.version += 1;
    }

    pub fn set_component(&mut self, k: usize, component: GaussianComponent) {
        self.components[k] = component;
        self.version += 1;
    }

    /// Batch mutation of the components in place; bumps the version once.
    pub fn update<R>(&mut self, f: impl FnOnce(&mut [GaussianComponent]) -> R) -> R {
        let out = f(&mut self.components);
        self.version += 1;
        out
    }

    pub fn total_weight(&self) -> f64 {
        self.components.iter().map(|c| c.weight).sum()
    }

    /// Weights divided by their sum (explicit normalization; the mixture itself is untouched).
    pub fn normalized_weights(&self) -> Result<Vec<f64>> {
        let total = self.total_weight();
        if !(total > 0.0) || !total.is_finite() {
            return Err(Error::Domain("mixture weights must have positive finite total mass"));
        }
        Ok(self.components.iter().map(|c| c.weight / total).collect())
    }
}

/// The time-`t` marginal mixture: `μ ← α μ`, `Σ ← α² Σ + β² I`, weights unchanged.
///
/// `out` must already have as many components as `source`; it is overwritten in place.
pub fn write_gmm(
    schedule: Schedule,
    source: &GaussianMixture,
    t: f64,
    out: &mut GaussianMixture,
) -> Result<()> {
    if source.len() != out.len() {
        return Err(Error::Shape("output mixture must have the same component count"));
    }
    let a = schedule.alpha(t);
    let b = schedule.beta(t);
    out.update(|comps| {
        for (dst, src) in comps.iter_mut().zip(source.components()) {
            dst.mean = [a * src.mean[0], a * src.mean[1]];
            dst.weight = src.weight;
            dst.covariance = src.covariance.scale(a * a).add_diagonal(b * b);
        }
    });
    Ok(())
}

/// Linear-scan categorical pick: subtract weights from `r` until it is exhausted.
///
/// Falls back to the last component if float error leaves `r` positive after the scan.
fn pick_component(weights: impl IntoIterator<Item = f64>, mut r: f64, len: usize) -> usize {
    for (k, w) in weights.into_iter().enumerate() {
        r -= w;
        if r <= 0.0 {
            return k;
        }
    }
    len - 1
}

/// Draws points from a mixture via each component's ellipse axes.
struct ComponentSampler<'a> {
    components: &'a [GaussianComponent],
    axes: Vec<EllipseAxes>,
    total: f64,
}

impl<'a> ComponentSampler<'a> {
    fn new(mixture: &'a GaussianMixture) -> Result<Self> {
        if mixture.is_empty() {
            return Err(Error::Domain("mixture must have at least one component"));
        }
        let total = mixture.total_weight();
        if !(total > 0.0) || !total.is_finite() {
            return Err(Error::Domain("mixture weights must have positive finite total mass"));
        }
        Ok(Self {
            components: mixture.components(),
            axes: mixture.components().iter().map(|c| c.axes()).collect(),
            total,
        })
    }

    fn sample(&self, rng: &mut impl Rng) -> [f64; 2] {
        let r = rng.random::<f64>() * self.total;
        let k = pick_component(
            self.components.iter().map(|c| c.weight),
            r,
            self.components.len(),
        );
        let [g0, g1] = BoxMuller.sample(rng);
        let off = self.axes[k].transform(g0, g1);
        let mean = self.components[k].mean;
        [mean[0] + off[0], mean[1] + off[1]]
    }
}

/// Fill `out` with i.i.d. samples from the (weight-normalized) mixture.
pub fn sample_gmm(mixture: &GaussianMixture, rng: &mut impl Rng, out: &mut Points2D) -> Result<()> {
    let sampler = ComponentSampler::new(mixture)?;
    out.update(|xs, ys| {
        for i in 0..xs.len() {
            let [x, y] = sampler.sample(rng);
            xs[i] = x as f32;
            ys[i] = y as f32;
        }
    });
    Ok(())
}

/// Samples from the marginal `p_t`: draw `z` from the mixture and blend `α z + β x0`.
pub fn sample_marginal(
    schedule: Schedule,
    mixture: &GaussianMixture,
    x0: &Points2D,
    t: f64,
    rng: &mut impl Rng,
    out: &mut Points2D,
) -> Result<()> {
    check_same_len(x0, out)?;
    let sampler = ComponentSampler::new(mixture)?;
    let a = schedule.alpha(t);
    let b = schedule.beta(t);
    out.update(|xs, ys| {
        for i in 0..xs.len() {
            let [zx, zy] = sampler.sample(rng);
            let [px, py] = x0.get(i);
            xs[i] = (a * zx + b * px as f64) as f32;
            ys[i] = (a * zy + b * py as f64) as f32;
        }
    });
    Ok(())
}

/// Max-shifted softmax in place: `v_k ← exp(v_k - max) / Σ exp(v_j - max)`.
///
/// Leaves `NaN` if every entry is `-inf` (no component has any mass).
pub fn softmax_in_place(mut logits: ArrayViewMut1<'_, f64>) {
    let max = logits.fold(f64::NEG_INFINITY, |m, &v| m.max(v));
    let mut sum = 0.0;
    for v in logits.iter_mut() {
        *v = (*v - max).exp();
        sum += *v;
    }
    for v in logits.iter_mut() {
        *v /= sum;
    }
}

#[derive(Debug, Clone, Copy)]
struct ComponentAtTime {
    mean: [f64; 2],
    mean_t: [f64; 2],
    /// `S_k⁻¹` (regularized).
    precision: Mat2,
    /// `ln w_k - ln 2π - ½ ln det S_k`.
    log_norm: f64,
    /// `M_k = α Σ_k S_k⁻¹`.
    gain: Mat2,
}

impl ComponentAtTime {
    #[inline]
    fn log_density(&self, p: [f64; 2]) -> f64 {
        let d = [p[0] - self.mean_t[0], p[1] - self.mean_t[1]];
        self.log_norm - 0.5 * self.precision.quad_form(d)
    }
}

/// Per-component quantities of the marginal at a fixed `t`, shared by every query point.
#[derive(Debug, Clone)]
pub struct MixtureAtTime {
    t: f64,
    alpha: f64,
    beta: f64,
    /// `A = α' - B α`.
    a_coef: f64,
    /// `B = β' / β` with `β` floored.
    b_coef: f64,
    components: Vec<ComponentAtTime>,
}

impl MixtureAtTime {
    pub fn new(schedule: Schedule, mixture: &GaussianMixture, t: f64) -> Self {
        let s = schedule.eval(t);
        let b_coef = s.beta_deriv / s.beta.max(BETA_FLOOR);
        let a_coef = s.alpha_deriv - b_coef * s.alpha;
        let components = mixture
            .components()
            .iter()
            .map(|c| {
                let cov_t = c
                    .covariance
                    .scale(s.alpha * s.alpha)
                    .add_diagonal(s.beta * s.beta + COV_REGULARIZER);
                let precision = cov_t.inverse();
                ComponentAtTime {
                    mean: c.mean,
                    mean_t: [s.alpha * c.mean[0], s.alpha * c.mean[1]],
                    precision,
                    log_norm: c.weight.ln() - LN_2PI - 0.5 * cov_t.det().ln(),
                    gain: c.covariance.scale(s.alpha) * precision,
                }
            })
            .collect();
        Self {
            t,
            alpha: s.alpha,
            beta: s.beta,
            a_coef,
            b_coef,
            components,
        }
    }

    pub fn t(&self) -> f64 {
        self.t
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    pub fn beta(&self) -> f64 {
        self.beta
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// `ln(w_k N(p; α μ_k, S_k))` for every component.
    pub fn log_likelihoods(&self, p: [f64; 2], out: &mut [f64]) {
        debug_assert_eq!(out.len(), self.components.len());
        for (o, c) in out.iter_mut().zip(&self.components) {
            *o = c.log_density(p);
        }
    }

    /// Posterior component weights at `p`; sums to 1.
    pub fn responsibilities(&self, p: [f64; 2], out: &mut [f64]) {
        self.log_likelihoods(p, out);
        softmax_in_place(ArrayViewMut1::from(out));
    }

    /// `ln p_t(p)` via log-sum-exp (mainly for checks).
    pub fn log_density(&self, p: [f64; 2]) -> f64 {
        let lls: Vec<f64> = self.components.iter().map(|c| c.log_density(p)).collect();
        let max = lls.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        max + lls.iter().map(|&l| (l - max).exp()).sum::<f64>().ln()
    }

    /// Velocity and score at `p` given its responsibilities.
    #[inline]
    fn field_at(&self, p: [f64; 2], resp: impl Iterator<Item = f64>) -> ([f64; 2], [f64; 2]) {
        let mut denoised = [0.0f64; 2];
        let mut score = [0.0f64; 2];
        for (c, r) in self.components.iter().zip(resp) {
            let d = [p[0] - c.mean_t[0], p[1] - c.mean_t[1]];
            let corr = c.gain.mul_vec(d);
            let pull = c.precision.mul_vec(d);
            denoised[0] += r * (c.mean[0] + corr[0]);
            denoised[1] += r * (c.mean[1] + corr[1]);
            score[0] -= r * pull[0];
            score[1] -= r * pull[1];
        }
        let vel = [
            self.a_coef * denoised[0] + self.b_coef * p[0],
            self.a_coef * denoised[1] + self.b_coef * p[1],
        ];
        (vel, score)
    }

    /// Two-pass batch evaluation: `emit(i, velocity, score)` for every point.
    ///
    /// `loglik` is scratch of shape `(n, K)`; it is reallocated if its shape differs.
    pub fn eval_batch(
        &self,
        xs: &[f64],
        ys: &[f64],
        loglik: &mut Array2<f64>,
        mut emit: impl FnMut(usize, [f64; 2], [f64; 2]),
    ) {
        let n = xs.len();
        let k = self.components.len();
        if loglik.dim() != (n, k) {
            *loglik = Array2::zeros((n, k));
        }

        for i in 0..n {
            let p = [xs[i], ys[i]];
            for (j, c) in self.components.iter().enumerate() {
                loglik[[i, j]] = c.log_density(p);
            }
        }

        for (i, mut row) in loglik.rows_mut().into_iter().enumerate() {
            softmax_in_place(row.view_mut());
            let (v, s) = self.field_at([xs[i], ys[i]], row.iter().copied());
            emit(i, v, s);
        }
    }
}

fn check_mixture(mixture: &GaussianMixture) -> Result<()> {
    if mixture.is_empty() {
        return Err(Error::Domain("mixture must have at least one component"));
    }
    Ok(())
}

/// Marginal velocity field `v_t(x)` for every point of `x`.
pub fn write_velocities(
    schedule: Schedule,
    mixture: &GaussianMixture,
    x: &Points2D,
    t: f64,
    out: &mut Points2D,
) -> Result<()> {
    check_same_len(x, out)?;
    check_mixture(mixture)?;
    let at = MixtureAtTime::new(schedule, mixture, t);
    let (xs, ys) = x.to_f64();
    let mut loglik = Array2::zeros((xs.len(), at.len()));
    out.update(|ox, oy| {
        at.eval_batch(&xs, &ys, &mut loglik, |i, v, _| {
            ox[i] = v[0] as f32;
            oy[i] = v[1] as f32;
        });
    });
    Ok(())
}

/// Marginal score `∇ log p_t(x)` for every point of `x`.
pub fn write_scores(
    schedule: Schedule,
    mixture: &GaussianMixture,
    x: &Points2D,
    t: f64,
    out: &mut Points2D,
) -> Result<()> {
    check_same_len(x, out)?;
    check_mixture(mixture)?;
    let at = MixtureAtTime::new(schedule, mixture, t);
    let (xs, ys) = x.to_f64();
    let mut loglik = Array2::zeros((xs.len(), at.len()));
    out.update(|ox, oy| {
        at.eval_batch(&xs, &ys, &mut loglik, |i, _, s| {
            ox[i] = s[0] as f32;
            oy[i] = s[1] as f32;
        });
    });
    Ok(())
}

/// Integrate trajectories from `x0` at `t = 0` towards the mixture.
///
/// The drift is `v_t(x)` for [`Integrator::Euler`] and `v_t(x) + σ(t)²/2 ∇log p_t(x)` for the
/// stochastic methods, which also require `noise`.
#[allow(clippy::too_many_arguments)]
pub fn write_trajectories(
    method: Integrator,
    schedule: Schedule,
    sigma_schedule: SigmaSchedule,
    sigma_max: f64,
    mixture: &GaussianMixture,
    x0: &Points2D,
    noise: Option<&NoisePool>,
    traj: &mut Trajectories,
) -> Result<()> {
    check_mixture(mixture)?;
    if !sigma_max.is_finite() || sigma_max < 0.0 {
        return Err(Error::Domain("sigma_max must be finite and >= 0"));
    }
    let stochastic = method.is_stochastic();
    let mut loglik = Array2::zeros((x0.len(), mixture.len()));

    integrate_batch(
        method,
        x0,
        noise,
        |t| sigma_schedule.sigma(t, sigma_max),
        traj,
        |t, xs, ys, ox, oy| {
            let half_var = if stochastic {
                let sigma = sigma_schedule.sigma(t, sigma_max);
                0.5 * sigma * sigma
            } else {
                0.0
            };
            let at = MixtureAtTime::new(schedule, mixture, t);
            at.eval_batch(xs, ys, &mut loglik, |i, v, s| {
                ox[i] = v[0] + half_var * s[0];
                oy[i] = v[1] + half_var * s[1];
            });
        },
    )?;

    tracing::debug!(
        target: "probpath::marginal",
        %method,
        %schedule,
        %sigma_schedule,
        sigma_max,
        components = mixture.len(),
        count = traj.count(),
        steps = traj.points_per_trajectory() - 1,
        version = traj.version(),
        "wrote mixture trajectories"
    );
    Ok(())
}

/// Deterministic probability-flow trajectories (explicit Euler).
pub fn write_ode_trajectories(
    schedule: Schedule,
    mixture: &GaussianMixture,
    x0: &Points2D,
    traj: &mut Trajectories,
) -> Result<()> {
    write_trajectories(
        Integrator::Euler,
        schedule,
        SigmaSchedule::Constant,
        0.0,
        mixture,
        x0,
        None,
        traj,
    )
}

/// Euler–Maruyama trajectories using the pre-generated `noise`.
pub fn write_sde_trajectories(
    schedule: Schedule,
    sigma_schedule: SigmaSchedule,
    sigma_max: f64,
    mixture: &GaussianMixture,
    x0: &Points2D,
    noise: &NoisePool,
    traj: &mut Trajectories,
) -> Result<()> {
    write_trajectories(
        Integrator::EulerMaruyama,
        schedule,
        sigma_schedule,
        sigma_max,
        mixture,
        x0,
        Some(noise),
        traj,
    )
}

/// Heun predictor-corrector trajectories using the pre-generated `noise`.
pub fn write_heun_trajectories(
    schedule: Schedule,
    sigma_schedule: SigmaSchedule,
    sigma_max: f64,
    mixture: &GaussianMixture,
    x0: &Points2D,
    noise: &NoisePool,
    traj: &mut Trajectories,
) -> Result<()> {
    write_trajectories(
        Integrator::Heun,
        schedule,
        sigma_schedule,
        sigma_max,
        mixture,
        x0,
        Some(noise),
        traj,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array1;
    use proptest::prelude::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn two_blobs() -> GaussianMixture {
        GaussianMixture::new(vec![
            GaussianComponent::new([-2.0, 0.5], 1.0, Mat2::symmetric(0.3, 0.1, 0.2)),
            GaussianComponent::new([1.5, -1.0], 3.0, Mat2::symmetric(0.5, -0.2, 0.4)),
        ])
    }

    #[test]
    fn write_gmm_at_one_reproduces_the_target() {
        let src = two_blobs();
        let mut out = src.clone();
        for schedule in Schedule::ALL {
            write_gmm(schedule, &src, 1.0, &mut out).unwrap();
            for (a, b) in out.components().iter().zip(src.components()) {
                assert!((a.mean[0] - b.mean[0]).abs() < 1e-9, "{schedule}");
                assert!((a.mean[1] - b.mean[1]).abs() < 1e-9, "{schedule}");
                assert!((a.covariance.xx - b.covariance.xx).abs() < 1e-9, "{schedule}");
                assert!((a.covariance.xy - b.covariance.xy).abs() < 1e-9, "{schedule}");
                assert!((a.covariance.yy - b.covariance.yy).abs() < 1e-9, "{schedule}");
                assert_eq!(a.weight, b.weight);
            }
        }
    }

    #[test]
    fn write_gmm_at_zero_is_the_standard_normal() {
        let src = two_blobs();
        let mut out = src.clone();
        write_gmm(Schedule::Linear, &src, 0.0, &mut out).unwrap();
        for c in out.components() {
            assert_eq!(c.mean, [0.0, 0.0]);
            assert_eq!(c.covariance, Mat2::IDENTITY);
        }
        assert_eq!(out.version(), 1);
    }

    #[test]
    fn write_gmm_rejects_component_count_mismatch() {
        let src = two_blobs();
        let mut out = GaussianMixture::new(vec![src.components()[0]]);
        assert!(matches!(
            write_gmm(Schedule::Cosine, &src, 0.5, &mut out),
            Err(Error::Shape(_))
        ));
        assert_eq!(out.version(), 0);
    }

    #[test]
    fn softmax_survives_huge_logits() {
        let mut v = Array1::from_vec(vec![1000.0, 1001.0, -1e308]);
        softmax_in_place(v.view_mut());
        assert!(v.iter().all(|x| x.is_finite()));
        assert!((v.sum() - 1.0).abs() < 1e-12);
        assert!(v[1] > v[0]);
        assert_eq!(v[2], 0.0);
    }

    #[test]
    fn pick_component_falls_back_to_last() {
        let w = [0.2, 0.3, 0.5];
        assert_eq!(pick_component(w, 0.1, 3), 0);
        assert_eq!(pick_component(w, 0.2, 3), 0);
        assert_eq!(pick_component(w, 0.45, 3), 1);
        assert_eq!(pick_component(w, 1.0 + 1e-12, 3), 2);
    }

    #[test]
    fn sample_gmm_skips_zero_weight_components_and_matches_moments() {
        let mix = GaussianMixture::new(vec![
            GaussianComponent::isotropic([100.0, 100.0], 0.0, 1.0),
            GaussianComponent::new([1.0, -2.0], 5.0, Mat2::symmetric(0.5, 0.2, 0.3)),
        ]);
        let mut rng = ChaCha8Rng::seed_from_u64(17);
        let mut out = Points2D::zeros(20_000);
        sample_gmm(&mix, &mut rng, &mut out).unwrap();

        let n = out.len() as f64;
        let mx = out.xs().iter().map(|&v| v as f64).sum::<f64>() / n;
        let my = out.ys().iter().map(|&v| v as f64).sum::<f64>() / n;
        let mut cxx = 0.0;
        let mut cxy = 0.0;
        let mut cyy = 0.0;
        for i in 0..out.len() {
            let [x, y] = out.get(i);
            let (dx, dy) = (x as f64 - mx, y as f64 - my);
            cxx += dx * dx;
            cxy += dx * dy;
            cyy += dy * dy;
        }
        assert!((mx - 1.0).abs() < 0.03 && (my + 2.0).abs() < 0.03, "mean=({mx},{my})");
        assert!((cxx / n - 0.5).abs() < 0.03, "cxx={}", cxx / n);
        assert!((cxy / n - 0.2).abs() < 0.03, "cxy={}", cxy / n);
        assert!((cyy / n - 0.3).abs() < 0.03, "cyy={}", cyy / n);
    }

    #[test]
    fn sample_gmm_rejects_empty_or_massless_mixtures() {
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let mut out = Points2D::zeros(3);
        assert!(sample_gmm(&GaussianMixture::default(), &mut rng, &mut out).is_err());
        let massless = GaussianMixture::new(vec![GaussianComponent::isotropic([0.0, 0.0], 0.0, 1.0)]);
        assert!(sample_gmm(&massless, &mut rng, &mut out).is_err());
        assert_eq!(out.version(), 0);
    }

    #[test]
    fn sample_marginal_at_zero_returns_the_source() {
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        let x0 = Points2D::from_points(&[[0.25, -0.5], [1.0, 2.0]]);
        let mut out = Points2D::zeros(2);
        sample_marginal(Schedule::Linear, &two_blobs(), &x0, 0.0, &mut rng, &mut out).unwrap();
        assert_eq!(out.get(0), [0.25, -0.5]);
        assert_eq!(out.get(1), [1.0, 2.0]);
    }

    #[test]
    fn single_isotropic_component_velocity_matches_closed_form() {
        // Target N(μ, s² I): x_t = α μ + σ_t x0 with σ_t² = α² s² + β², so
        // v = α' μ + (σ_t'/σ_t)(x - α μ).
        let mu = [0.7, -1.3];
        let s2 = 0.25;
        let mix = GaussianMixture::new(vec![GaussianComponent::isotropic(mu, 2.0, s2)]);
        let x = Points2D::from_points(&[[0.4, 0.1], [-1.0, 2.0]]);
        let mut v = Points2D::zeros(2);
        for schedule in Schedule::ALL {
            for &t in &[0.1, 0.3, 0.6, 0.9] {
                write_velocities(schedule, &mix, &x, t, &mut v).unwrap();
                let sv = schedule.eval(t);
                let var_t = sv.alpha * sv.alpha * s2 + sv.beta * sv.beta;
                let rate = (sv.alpha * sv.alpha_deriv * s2 + sv.beta * sv.beta_deriv) / var_t;
                for i in 0..2 {
                    let p = x.get(i);
                    for k in 0..2 {
                        let expected =
                            sv.alpha_deriv * mu[k] + rate * (p[k] as f64 - sv.alpha * mu[k]);
                        let got = v.get(i)[k] as f64;
                        assert!(
                            (got - expected).abs() <= 1e-3 * (1.0 + expected.abs()),
                            "{schedule} t={t}: {got} vs {expected}"
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn velocity_and_score_reject_empty_mixture() {
        let x = Points2D::zeros(2);
        let mut out = Points2D::zeros(2);
        let empty = GaussianMixture::default();
        assert!(write_velocities(Schedule::Linear, &empty, &x, 0.5, &mut out).is_err());
        assert!(write_scores(Schedule::Linear, &empty, &x, 0.5, &mut out).is_err());
    }

    #[test]
    fn ode_trajectories_bump_version_once_and_keep_shape() {
        let mut rng = ChaCha8Rng::seed_from_u64(8);
        let mut x0 = Points2D::zeros(32);
        crate::sampling::sample_standard_normal(&mut rng, &mut x0);
        let mut traj = Trajectories::new(32, 21);
        write_ode_trajectories(Schedule::Cosine, &two_blobs(), &x0, &mut traj).unwrap();
        assert_eq!(traj.version(), 1);
        assert_eq!(traj.xs().len(), traj.count() * traj.points_per_trajectory());
        assert!(traj.xs().iter().chain(traj.ys()).all(|v| v.is_finite()));
    }

    #[test]
    fn heun_corrector_drift_uses_sigma_at_the_next_time() {
        // Two steps: the first runs from t = 0 (σ = σ_max) to t = ½, where the step schedule
        // has already switched off, so the corrector's score term must vanish.
        let sigma_max = 0.9;
        let dt: f64 = 0.5;
        let mix = GaussianMixture::new(vec![GaussianComponent::isotropic([1.0, -1.0], 1.0, 0.2)]);
        let x0 = Points2D::from_points(&[[1.5, -0.75]]);
        let mut rng = ChaCha8Rng::seed_from_u64(21);
        let pool = NoisePool::new(1, 2, &mut rng);
        let mut traj = Trajectories::new(1, 3);
        write_heun_trajectories(
            Schedule::Linear,
            SigmaSchedule::Step,
            sigma_max,
            &mix,
            &x0,
            &pool,
            &mut traj,
        )
        .unwrap();

        let field = |t: f64, p: [f64; 2]| {
            let at = MixtureAtTime::new(Schedule::Linear, &mix, t);
            let mut loglik = Array2::zeros((1, 1));
            let mut out = ([0.0; 2], [0.0; 2]);
            at.eval_batch(&[p[0]], &[p[1]], &mut loglik, |_, v, s| out = (v, s));
            out
        };
        let x = [1.5, -0.75];
        let z = pool.get(0, 0);
        let g = sigma_max * dt.sqrt();
        let half_var0 = 0.5 * sigma_max * sigma_max;

        let (v0, s0) = field(0.0, x);
        let d1 = [v0[0] + half_var0 * s0[0], v0[1] + half_var0 * s0[1]];
        let pred = [x[0] + d1[0] * dt + g * z[0], x[1] + d1[1] * dt + g * z[1]];
        let (v1, s1) = field(0.5, pred);

        let step = |d2: [f64; 2]| {
            [
                x[0] + 0.5 * (d1[0] + d2[0]) * dt + g * z[0],
                x[1] + 0.5 * (d1[1] + d2[1]) * dt + g * z[1],
            ]
        };
        let want = step(v1);
        let stale = step([v1[0] + half_var0 * s1[0], v1[1] + half_var0 * s1[1]]);

        let got = traj.point(0, 1);
        for k in 0..2 {
            assert!(
                (got[k] as f64 - want[k]).abs() < 1e-5,
                "coord {k}: {} vs {}",
                got[k],
                want[k]
            );
        }
        let gap = (want[0] - stale[0]).abs() + (want[1] - stale[1]).abs();
        assert!(gap > 1e-2, "corrector score term too small to discriminate: {gap}");
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 128,
            .. ProptestConfig::default()
        })]
        #[test]
        fn prop_responsibilities_sum_to_one(
            t in 0.0f64..1.0,
            px in -50.0f64..50.0,
            py in -50.0f64..50.0,
            w0 in 1e-3f64..10.0,
            w1 in 1e-3f64..10.0,
        ) {
            let mut mix = two_blobs();
            mix.update(|c| {
                c[0].weight = w0;
                c[1].weight = w1;
            });
            for schedule in Schedule::ALL {
                let at = MixtureAtTime::new(schedule, &mix, t);
                let mut r = vec![0.0; at.len()];
                at.responsibilities([px, py], &mut r);
                let sum: f64 = r.iter().sum();
                prop_assert!((sum - 1.0).abs() < 1e-12, "{schedule}: sum={sum}");
                prop_assert!(r.iter().all(|&v| (0.0..=1.0).contains(&v)));
            }
        }

        #[test]
        fn prop_score_is_gradient_of_log_density(
            t in 0.05f64..0.95,
            px in -3.0f64..3.0,
            py in -3.0f64..3.0,
        ) {
            let mix = two_blobs();
            for schedule in Schedule::ALL {
                let at = MixtureAtTime::new(schedule, &mix, t);
                let h = 1e-5;
                let gx = (at.log_density([px + h, py]) - at.log_density([px - h, py])) / (2.0 * h);
                let gy = (at.log_density([px, py + h]) - at.log_density([px, py - h])) / (2.0 * h);

                let mut loglik = Array2::zeros((1, at.len()));
                let mut score = [0.0; 2];
                at.eval_batch(&[px], &[py], &mut loglik, |_, _, s| score = s);
                prop_assert!((score[0] - gx).abs() <= 1e-4 * (1.0 + gx.abs()), "{schedule}");
                prop_assert!((score[1] - gy).abs() <= 1e-4 * (1.0 + gy.abs()), "{schedule}");
            }
        }
    }
}
