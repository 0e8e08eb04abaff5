//! Recognized configuration options and their validation.
//!
//! Field names and grouping follow `examples/original_source/rnn/examm.hxx`'s
//! private state (SPEC_FULL.md §6). Validation errors are the
//! `EngineError::Configuration` kind, fatal at startup (SPEC_FULL.md §7).

use crate::distributions::RecDepthDist;
use crate::errors::{EngineError, EngineResult};
use crate::node::CellType;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecSamplingPopulation {
    Global,
    Island,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecSamplingDistribution {
    Uniform,
    Histogram,
    Normal,
    Pheromone,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MutationRateConfig {
    pub mutation_rate: f64,
    pub crossover_rate: f64,
    pub island_crossover_rate: f64,
    pub more_fit_crossover_rate: f64,
    pub less_fit_crossover_rate: f64,
    pub clone_rate: f64,
    pub add_edge_rate: f64,
    pub add_recurrent_edge_rate: f64,
    pub enable_edge_rate: f64,
    pub disable_edge_rate: f64,
    pub split_edge_rate: f64,
    pub add_node_rate: f64,
    pub enable_node_rate: f64,
    pub disable_node_rate: f64,
    pub split_node_rate: f64,
    pub merge_node_rate: f64,
}

impl Default for MutationRateConfig {
    fn default() -> Self {
        MutationRateConfig {
            mutation_rate: 0.7,
            crossover_rate: 0.2,
            island_crossover_rate: 0.1,
            more_fit_crossover_rate: 0.8,
            less_fit_crossover_rate: 0.2,
            clone_rate: 0.1,
            add_edge_rate: 1.0,
            add_recurrent_edge_rate: 1.0,
            enable_edge_rate: 1.0,
            disable_edge_rate: 1.0,
            split_edge_rate: 1.0,
            add_node_rate: 1.0,
            enable_node_rate: 1.0,
            disable_node_rate: 1.0,
            split_node_rate: 1.0,
            merge_node_rate: 1.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub population_size: usize,
    pub number_islands: usize,
    pub max_genomes: u64,

    pub bp_iterations: u32,
    pub learning_rate: f64,
    pub low_threshold: Option<f64>,
    pub high_threshold: Option<f64>,
    pub dropout_probability: Option<f64>,

    pub rec_delay_min: i32,
    pub rec_delay_max: i32,
    pub rec_sampling_population: RecSamplingPopulation,
    pub rec_sampling_distribution: RecSamplingDistribution,
    pub rec_depth_pheromone_decay_rate: f64,
    pub rec_depth_pheromone_baseline: f64,

    pub number_threads: usize,

    pub output_directory: String,
    pub output_filename: String,

    pub num_genomes_check_on_island: u32,
    pub check_on_island_method: String,

    pub mutation_rates: MutationRateConfig,
    pub possible_node_types: Vec<CellType>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            population_size: 10,
            number_islands: 4,
            max_genomes: 1000,
            bp_iterations: 20,
            learning_rate: 0.001,
            low_threshold: None,
            high_threshold: None,
            dropout_probability: None,
            rec_delay_min: 1,
            rec_delay_max: 10,
            rec_sampling_population: RecSamplingPopulation::Island,
            rec_sampling_distribution: RecSamplingDistribution::Uniform,
            rec_depth_pheromone_decay_rate: 0.99,
            rec_depth_pheromone_baseline: 0.01,
            number_threads: 4,
            output_directory: "output".to_string(),
            output_filename: "genome".to_string(),
            num_genomes_check_on_island: 10,
            check_on_island_method: "best".to_string(),
            mutation_rates: MutationRateConfig::default(),
            possible_node_types: vec![CellType::Simple, CellType::Lstm, CellType::Gru, CellType::Mgu],
        }
    }
}

impl Config {
    pub fn validate(&self) -> EngineResult<()> {
        if self.population_size < 1 {
            return Err(EngineError::Configuration("population_size must be >= 1".into()));
        }
        if self.number_islands < 1 {
            return Err(EngineError::Configuration("number_islands must be >= 1".into()));
        }
        if self.max_genomes < 1 {
            return Err(EngineError::Configuration("max_genomes must be >= 1".into()));
        }
        if self.rec_delay_max < self.rec_delay_min {
            return Err(EngineError::Configuration("rec_delay_max must be >= rec_delay_min".into()));
        }
        if self.rec_delay_min < 1 {
            return Err(EngineError::Configuration("rec_delay_min must be >= 1".into()));
        }
        if self.number_threads < 1 {
            return Err(EngineError::Configuration("number_threads must be >= 1".into()));
        }
        if self.bp_iterations < 1 {
            return Err(EngineError::Configuration("bp_iterations must be >= 1".into()));
        }
        if self.possible_node_types.is_empty() {
            return Err(EngineError::Configuration("possible_node_types must not be empty".into()));
        }
        if let Some(p) = self.dropout_probability {
            if !(0.0..1.0).contains(&p) {
                return Err(EngineError::Configuration("dropout_probability must be in [0, 1)".into()));
            }
        }
        Ok(())
    }
}

/// Builds the configured recurrent-delay sampler variant, boxed behind the
/// shared `RecDepthDist` trait so the coordinator/mutation code is agnostic
/// to which one is active (SPEC_FULL.md §4.6).
pub fn build_pheromone_dist(config: &Config) -> crate::distributions::PheromoneDist {
    crate::distributions::PheromoneDist::new(
        config.rec_delay_min,
        config.rec_delay_max,
        config.rec_depth_pheromone_decay_rate,
        config.rec_depth_pheromone_baseline,
    )
}

pub fn build_dist_from_table(
    config: &Config,
    table: &crate::distributions::FrequencyTable,
) -> Box<dyn RecDepthDist + Send + Sync> {
    match config.rec_sampling_distribution {
        RecSamplingDistribution::Uniform => Box::new(crate::distributions::UniformDist::new(config.rec_delay_min, config.rec_delay_max)),
        RecSamplingDistribution::Histogram => Box::new(crate::distributions::HistDist::from_table(table)),
        RecSamplingDistribution::Normal => Box::new(crate::distributions::NormalDist::from_table(table)),
        RecSamplingDistribution::Pheromone => Box::new(build_pheromone_dist(config)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        Config::default().validate().unwrap();
    }

    #[test]
    fn rejects_inverted_delay_range() {
        let mut config = Config::default();
        config.rec_delay_max = 0;
        config.rec_delay_min = 5;
        assert!(config.validate().is_err());
    }
}
