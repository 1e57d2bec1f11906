//! Conditional paths towards a single point: exact flow map vs. the OU sampler.
//!
//! For each σ schedule prints the spread of the points at a few times; the flow map spread is
//! exactly `β(t)`, the OU spread stays close to it and both collapse onto the target at `t = 1`.

use probpath::conditional::{write_sde_trajectories, write_trajectories};
use probpath::sampling::{sample_standard_normal, NoisePool};
use probpath::{Points2D, Schedule, SigmaSchedule, Trajectories};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing_subscriber::EnvFilter;

fn spread(traj: &Trajectories, j: usize, target: [f64; 2]) -> f64 {
    let n = traj.count();
    let mut s = 0.0;
    for i in 0..n {
        let p = traj.point(i, j);
        let dx = p[0] as f64 - target[0];
        let dy = p[1] as f64 - target[1];
        s += 0.5 * (dx * dx + dy * dy);
    }
    (s / n as f64).sqrt()
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let n = 4_000;
    let steps = 200;
    let target = [1.0, -0.5];
    let schedule = Schedule::Linear;
    let sigma_max = 1.0;

    let mut rng = ChaCha8Rng::seed_from_u64(11);
    let mut x0 = Points2D::zeros(n);
    sample_standard_normal(&mut rng, &mut x0);
    let pool = NoisePool::new(n, steps, &mut rng);
    let mut traj = Trajectories::new(n, steps + 1);

    let checkpoints = [steps / 4, steps / 2, 3 * steps / 4, steps];
    println!("schedule={schedule} target={target:?} n={n} steps={steps} sigma_max={sigma_max}");

    write_trajectories(schedule, target, &x0, &mut traj)?;
    let row: Vec<String> = checkpoints
        .iter()
        .map(|&j| format!("{:.3}", spread(&traj, j, target)))
        .collect();
    println!("{:<14} spread@t=[.25,.5,.75,1] = {}", "flow-map", row.join(" "));

    for sigma in SigmaSchedule::ALL {
        write_sde_trajectories(schedule, sigma, sigma_max, target, &x0, &pool, &mut traj)?;
        let row: Vec<String> = checkpoints
            .iter()
            .map(|&j| format!("{:.3}", spread(&traj, j, target)))
            .collect();
        println!("{:<14} spread@t=[.25,.5,.75,1] = {}", sigma.name(), row.join(" "));
    }

    Ok(())
}
