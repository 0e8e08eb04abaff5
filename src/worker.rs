//! Fixed worker-pool driver.
//!
//! Generalized from SPEC_FULL.md §4.8/§5: the coordinator's `generate`/
//! `insert` contract is the only shared state; training happens on a
//! worker-private genome with the coordinator mutex released for its
//! entire duration. No teacher module spawns a persistent thread pool
//! directly, so thread spawning here follows the plain `std::thread`
//! idiom SPEC_FULL.md §5's implementation note calls for, rather than
//! `rayon` (kept elsewhere in this crate for short-lived data-parallel
//! helpers only).

use crate::config::Config;
use crate::errors::EngineResult;
use crate::genome::Genome;
use crate::population::Coordinator;
use crate::rng::Rng;
use ndarray::Array2;
use std::sync::Arc;
use std::thread;
use tracing::{info, warn};

/// Runs `config.number_threads` worker threads against `coordinator` until
/// `generate()` returns `None` on every worker, then returns the best
/// genome found across all islands.
pub fn run(
    coordinator: Arc<Coordinator>,
    config: &Config,
    train: Arc<Vec<(Array2<f64>, Array2<f64>)>>,
    valid: Arc<Vec<(Array2<f64>, Array2<f64>)>>,
    seed: u64,
) -> Option<Genome> {
    let handles: Vec<_> = (0..config.number_threads)
        .map(|worker_id| {
            let coordinator = Arc::clone(&coordinator);
            let train = Arc::clone(&train);
            let valid = Arc::clone(&valid);
            let worker_seed = seed.wrapping_add(worker_id as u64 + 1);
            thread::Builder::new()
                .name(format!("examm-worker-{worker_id}"))
                .spawn(move || worker_loop(coordinator, train, valid, worker_seed))
                .expect("failed to spawn worker thread")
        })
        .collect();

    for handle in handles {
        if let Err(panic) = handle.join() {
            warn!(?panic, "worker thread panicked");
        }
    }

    coordinator.best()
}

fn worker_loop(
    coordinator: Arc<Coordinator>,
    train: Arc<Vec<(Array2<f64>, Array2<f64>)>>,
    valid: Arc<Vec<(Array2<f64>, Array2<f64>)>>,
    seed: u64,
) {
    let mut rng = Rng::from_seed(seed);
    loop {
        let mut genome = match coordinator.generate() {
            Some(g) => g,
            None => break,
        };

        match train_genome(&mut genome, &mut rng, &train, &valid) {
            Ok(mse) => {
                genome.best_mse = mse;
            }
            Err(err) => {
                warn!(%err, "genome training failed, marking unfit");
                genome.best_mse = f64::INFINITY;
            }
        }

        let retained = coordinator.insert(genome);
        info!(retained, "worker inserted genome");
    }
}

fn train_genome(
    genome: &mut Genome,
    rng: &mut Rng,
    train: &[(Array2<f64>, Array2<f64>)],
    valid: &[(Array2<f64>, Array2<f64>)],
) -> EngineResult<f64> {
    genome.train(rng, train, valid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[test]
    fn worker_pool_drives_coordinator_to_termination() {
        let mut config = Config::default();
        config.population_size = 2;
        config.number_islands = 1;
        config.max_genomes = 6;
        config.bp_iterations = 1;
        config.number_threads = 2;

        let coordinator = Arc::new(Coordinator::new(config.clone(), 1, 1, 42));
        let series = Array2::from_shape_vec((1, 4), vec![0.1, 0.2, 0.3, 0.4]).unwrap();
        let train = Arc::new(vec![(series.clone(), series.clone())]);
        let valid = Arc::new(Vec::new());

        let best = run(coordinator.clone(), &config, train, valid, 7);
        assert!(coordinator.terminated());
        assert!(best.is_some());
    }
}
