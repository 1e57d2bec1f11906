//! Gaussian-mixture paths with every integrator.
//!
//! Prints, per integrator:
//! - endpoint mean vs. the mixture mean
//! - fraction of endpoints closest to each component
//!
//! `RUST_LOG=probpath=debug` shows the per-call trace events.

use probpath::linalg::Mat2;
use probpath::{
    GaussianComponent, GaussianMixture, Integrator, Schedule, SigmaSchedule, Simulation,
    SimulationConfig,
};
use tracing_subscriber::EnvFilter;

fn nearest_component(mix: &GaussianMixture, p: [f32; 2]) -> usize {
    let mut best = (0, f64::INFINITY);
    for (k, c) in mix.components().iter().enumerate() {
        let dx = p[0] as f64 - c.mean[0];
        let dy = p[1] as f64 - c.mean[1];
        let d2 = dx * dx + dy * dy;
        if d2 < best.1 {
            best = (k, d2);
        }
    }
    best.0
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let mix = GaussianMixture::new(vec![
        GaussianComponent::new([-2.0, 0.5], 1.0, Mat2::symmetric(0.3, 0.1, 0.2)),
        GaussianComponent::new([1.5, -1.0], 2.0, Mat2::symmetric(0.5, -0.2, 0.4)),
        GaussianComponent::isotropic([0.0, 2.5], 1.0, 0.05),
    ]);
    let weights = mix.normalized_weights()?;
    let mut want = [0.0f64; 2];
    for (w, c) in weights.iter().zip(mix.components()) {
        want[0] += w * c.mean[0];
        want[1] += w * c.mean[1];
    }

    let base = SimulationConfig {
        schedule: Schedule::Cosine,
        sigma_schedule: SigmaSchedule::SineBump,
        sigma_max: 0.8,
        samples: 2_000,
        steps: 100,
        ..Default::default()
    };
    let mut sim = Simulation::new(base.clone())?;

    println!(
        "schedule={} sigma={} sigma_max={} samples={} steps={}",
        base.schedule, base.sigma_schedule, base.sigma_max, base.samples, base.steps
    );
    println!("mixture mean = ({:.3}, {:.3})  weights = {weights:.3?}", want[0], want[1]);
    println!();

    for integrator in Integrator::ALL {
        sim.reconfigure(SimulationConfig {
            integrator,
            ..base.clone()
        })?;
        let traj = sim.run_marginal(&mix)?;

        let n = traj.count();
        let mut mean = [0.0f64; 2];
        let mut hits = vec![0usize; mix.len()];
        for i in 0..n {
            let p = traj.endpoint(i);
            mean[0] += p[0] as f64 / n as f64;
            mean[1] += p[1] as f64 / n as f64;
            hits[nearest_component(&mix, p)] += 1;
        }
        let frac: Vec<f64> = hits.iter().map(|&h| h as f64 / n as f64).collect();
        println!(
            "{:<15} mean=({:.3}, {:.3})  nearest={frac:.3?}  version={}",
            integrator.name(),
            mean[0],
            mean[1],
            traj.version()
        );
    }

    Ok(())
}
