//! End-to-end demo: evolves a population of recurrent genomes against a
//! sine-wave time series and writes the best genome found to disk.
//!
//! Mirrors the teacher's `examples/*.rs` demo idiom (`anyhow::Result` main,
//! `tracing_subscriber::fmt().init()` for observability) generalized from a
//! single forward/backward graph run to a full island-population search.

use anyhow::Result;
use examm::config::Config;
use examm::dataset::{InMemoryProvider, TimeSeriesProvider};
use examm::population::Coordinator;
use examm::{io, worker};
use ndarray::Array2;
use std::sync::Arc;

fn sine_wave_provider(points: usize) -> Result<InMemoryProvider> {
    let mut xs = Vec::with_capacity(points);
    let mut ys = Vec::with_capacity(points);
    for i in 0..points {
        let t = i as f64 / 20.0;
        xs.push((2.0 * std::f64::consts::PI * t).sin());
        ys.push((2.0 * std::f64::consts::PI * (t + 1.0 / 20.0)).sin());
    }
    let inputs = Array2::from_shape_vec((1, points), xs)?;
    let outputs = Array2::from_shape_vec((1, points), ys)?;
    InMemoryProvider::new(vec!["sine".to_string()], vec!["sine_next".to_string()], vec![(inputs, outputs)])
        .map_err(Into::into)
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let mut config = Config::default();
    config.population_size = 3;
    config.number_islands = 2;
    config.max_genomes = 50;
    config.bp_iterations = 10;
    config.number_threads = 2;

    config.validate()?;

    let provider = sine_wave_provider(200)?;
    let series = provider.export(0)?;
    let train = Arc::new(vec![series.clone()]);
    let valid = Arc::new(vec![series]);

    let coordinator = Arc::new(Coordinator::new(config.clone(), 1, 1, 1234));
    let best = worker::run(coordinator, &config, train, valid, 99);

    match best {
        Some(genome) => {
            println!("best validation MSE: {:.6}", genome.best_mse);
            std::fs::create_dir_all(&config.output_directory)?;
            let path = std::path::Path::new(&config.output_directory).join(format!("{}.json", config.output_filename));
            io::write_genome_file(&genome, &path)?;
            println!("wrote best genome to {}", path.display());
        }
        None => println!("search produced no viable genome"),
    }

    Ok(())
}
