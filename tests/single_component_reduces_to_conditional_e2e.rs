use probpath::linalg::Mat2;
use probpath::{conditional, marginal};
use probpath::{GaussianComponent, GaussianMixture, Points2D, Schedule, Trajectories};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

const Z: [f64; 2] = [1.25, -0.75];

fn point_mass() -> GaussianMixture {
    // Zero covariance: the only regularization left is the ε on S_k's diagonal.
    GaussianMixture::new(vec![GaussianComponent::new(Z, 1.0, Mat2::ZERO)])
}

fn query_points() -> Points2D {
    let mut rng = ChaCha8Rng::seed_from_u64(99);
    let mut p = Points2D::zeros(32);
    probpath::sampling::sample_standard_normal(&mut rng, &mut p);
    p
}

fn assert_batches_close(a: &Points2D, b: &Points2D, rel: f32, what: &str) {
    for i in 0..a.len() {
        for k in 0..2 {
            let (x, y) = (a.get(i)[k], b.get(i)[k]);
            assert!(
                (x - y).abs() <= rel * (1.0 + y.abs()),
                "{what}: point {i} coord {k}: {x} vs {y}"
            );
        }
    }
}

#[test]
fn point_mass_mixture_velocity_matches_conditional_velocity() {
    let x = query_points();
    let mut v_mix = Points2D::zeros(x.len());
    let mut v_cond = Points2D::zeros(x.len());
    for schedule in Schedule::ALL {
        for &t in &[0.0, 0.1, 0.3, 0.5, 0.7, 0.9] {
            marginal::write_velocities(schedule, &point_mass(), &x, t, &mut v_mix).unwrap();
            conditional::write_velocities(schedule, Z, &x, t, &mut v_cond).unwrap();
            assert_batches_close(&v_mix, &v_cond, 1e-4, &format!("{schedule} velocity t={t}"));
        }
    }
}

#[test]
fn point_mass_mixture_score_matches_conditional_score() {
    let x = query_points();
    let mut s_mix = Points2D::zeros(x.len());
    let mut s_cond = Points2D::zeros(x.len());
    for schedule in Schedule::ALL {
        // Relative discrepancy is ε / β², so stay away from t = 1.
        for &t in &[0.0, 0.1, 0.3, 0.5, 0.7] {
            marginal::write_scores(schedule, &point_mass(), &x, t, &mut s_mix).unwrap();
            conditional::write_scores(schedule, Z, &x, t, &mut s_cond).unwrap();
            assert_batches_close(&s_mix, &s_cond, 2e-3, &format!("{schedule} score t={t}"));
        }
    }
}

#[test]
fn point_mass_mixture_marginal_at_time_t_is_the_conditional_gaussian() {
    let mix = point_mass();
    let mut out = mix.clone();
    for schedule in Schedule::ALL {
        for &t in &[0.2, 0.6, 1.0] {
            marginal::write_gmm(schedule, &mix, t, &mut out).unwrap();
            let c = out.components()[0];
            let a = schedule.alpha(t);
            let b = schedule.beta(t);
            assert!((c.mean[0] - a * Z[0]).abs() < 1e-12);
            assert!((c.mean[1] - a * Z[1]).abs() < 1e-12);
            assert!((c.covariance.xx - b * b).abs() < 1e-12);
            assert_eq!(c.covariance.xy, 0.0);
        }
    }
}

#[test]
fn point_mass_ode_tracks_the_conditional_flow_map() {
    let x0 = query_points();
    let steps = 400;
    let mut ode = Trajectories::new(x0.len(), steps + 1);
    let mut exact = Trajectories::new(x0.len(), steps + 1);
    marginal::write_ode_trajectories(Schedule::Linear, &point_mass(), &x0, &mut ode).unwrap();
    conditional::write_trajectories(Schedule::Linear, Z, &x0, &mut exact).unwrap();

    // The linear conditional velocity is constant along each path, so Euler is exact up to
    // rounding; the endpoint lands on the target.
    for i in 0..x0.len() {
        for j in [steps / 4, steps / 2, steps] {
            let a = ode.point(i, j);
            let b = exact.point(i, j);
            assert!((a[0] - b[0]).abs() < 1e-3, "i={i} j={j}: {a:?} vs {b:?}");
            assert!((a[1] - b[1]).abs() < 1e-3, "i={i} j={j}: {a:?} vs {b:?}");
        }
    }
}
