//! Island population and coordinator.
//!
//! Grounded on `examples/original_source/rnn/examm.hxx`: island lifecycle
//! states, innovation counters, per-operator mutation rates, and the
//! generate/insert contract (SPEC_FULL.md §4.7, §5).

use crate::config::{Config, RecSamplingDistribution, RecSamplingPopulation};
use crate::distributions::{FrequencyTable, PheromoneDist, RecDepthDist, UniformDist};
use crate::genome::crossover::{crossover, CrossoverRates};
use crate::genome::mutation::{mutate, MutationRates};
use crate::genome::Genome;
use crate::rng::Rng;
use std::sync::Mutex;
use tracing::{info, instrument, warn};

fn random_index(len: usize, rng: &mut Rng) -> usize {
    rng.gen_range_usize(0, len)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IslandState {
    Initializing,
    Filled,
    Repopulating,
}

pub struct Island {
    pub state: IslandState,
    pub genomes: Vec<Genome>,
    pub capacity: usize,
    failed_inserts_since_improvement: u32,
    best_mse_seen: f64,
}

impl Island {
    fn new(capacity: usize) -> Self {
        Island {
            state: IslandState::Initializing,
            genomes: Vec::new(),
            capacity,
            failed_inserts_since_improvement: 0,
            best_mse_seen: f64::INFINITY,
        }
    }

    pub fn best(&self) -> Option<&Genome> {
        self.genomes.first()
    }

    pub fn worst(&self) -> Option<&Genome> {
        self.genomes.last()
    }

    fn insert_sorted(&mut self, genome: Genome) {
        let pos = self.genomes.partition_point(|g| g.best_mse <= genome.best_mse);
        self.genomes.insert(pos, genome);
    }

    /// Inserts a trained genome under the island's fitness-ordered
    /// capacity policy (SPEC_FULL.md §4.7 `insert`). Returns whether the
    /// genome was retained.
    fn insert(&mut self, genome: Genome, stagnation_limit: u32) -> bool {
        let retained = if self.genomes.len() < self.capacity {
            self.insert_sorted(genome);
            true
        } else if genome.best_mse < self.worst().map(|g| g.best_mse).unwrap_or(f64::INFINITY) {
            self.genomes.pop();
            self.insert_sorted(genome);
            true
        } else {
            false
        };

        if self.genomes.len() >= self.capacity && self.state == IslandState::Initializing {
            self.state = IslandState::Filled;
        }

        let current_best = self.best().map(|g| g.best_mse).unwrap_or(f64::INFINITY);
        if current_best < self.best_mse_seen {
            self.best_mse_seen = current_best;
            self.failed_inserts_since_improvement = 0;
        } else if !retained {
            self.failed_inserts_since_improvement += 1;
            if self.failed_inserts_since_improvement >= stagnation_limit && self.state == IslandState::Filled {
                self.state = IslandState::Repopulating;
                if let Some(best) = self.genomes.first().cloned() {
                    self.genomes = vec![best];
                }
                self.failed_inserts_since_improvement = 0;
            }
        }

        retained
    }
}

struct CoordinatorState {
    islands: Vec<Island>,
    next_innovation: i64,
    generated_count: u64,
    inserted_count: u64,
    round_robin: usize,
    rng: Rng,
    pheromone_dists: Vec<PheromoneDist>,
}

/// The single-mutex-guarded coordinator: `generate`/`insert`/`best`/
/// `terminated` are the only operations that may block, per SPEC_FULL.md
/// §5. All structural population state lives behind the mutex; training
/// itself happens on a caller-owned genome outside the lock.
pub struct Coordinator {
    config: Config,
    num_inputs: usize,
    num_outputs: usize,
    state: Mutex<CoordinatorState>,
}

impl Coordinator {
    pub fn new(config: Config, num_inputs: usize, num_outputs: usize, seed: u64) -> Self {
        let number_islands = config.number_islands;
        let islands: Vec<Island> = (0..number_islands).map(|_| Island::new(config.population_size)).collect();
        let pheromone_dists = match config.rec_sampling_population {
            RecSamplingPopulation::Global => vec![crate::config::build_pheromone_dist(&config)],
            RecSamplingPopulation::Island => (0..number_islands).map(|_| crate::config::build_pheromone_dist(&config)).collect(),
        };
        Coordinator {
            config,
            num_inputs,
            num_outputs,
            state: Mutex::new(CoordinatorState {
                islands,
                next_innovation: 0,
                generated_count: 0,
                inserted_count: 0,
                round_robin: 0,
                rng: Rng::from_seed(seed),
                pheromone_dists,
            }),
        }
    }

    pub fn terminated(&self) -> bool {
        let state = self.state.lock().unwrap();
        state.inserted_count >= self.config.max_genomes
    }

    pub fn best(&self) -> Option<Genome> {
        let state = self.state.lock().unwrap();
        state
            .islands
            .iter()
            .filter_map(|i| i.best())
            .min_by(|a, b| a.best_mse.partial_cmp(&b.best_mse).unwrap())
            .cloned()
    }

    fn rec_dist_for(&self, state: &CoordinatorState, island: usize) -> Box<dyn RecDepthDist + Send + Sync> {
        if self.config.rec_sampling_distribution == RecSamplingDistribution::Pheromone {
            let idx = match self.config.rec_sampling_population {
                RecSamplingPopulation::Global => 0,
                RecSamplingPopulation::Island => island,
            };
            return Box::new(state.pheromone_dists[idx].clone());
        }
        let table = match self.config.rec_sampling_population {
            RecSamplingPopulation::Global => FrequencyTable::from_genomes(
                self.config.rec_delay_min,
                self.config.rec_delay_max,
                state.islands.iter().flat_map(|i| i.genomes.iter()),
            ),
            RecSamplingPopulation::Island => FrequencyTable::from_genomes(self.config.rec_delay_min, self.config.rec_delay_max, state.islands[island].genomes.iter()),
        };
        crate::config::build_dist_from_table(&self.config, &table)
    }

    /// Produces the next candidate genome to train, or `None` once
    /// `max_genomes` insertions have occurred (SPEC_FULL.md §4.7
    /// `generate`).
    #[instrument(skip(self))]
    pub fn generate(&self) -> Option<Genome> {
        let mut state = self.state.lock().unwrap();
        if state.inserted_count >= self.config.max_genomes {
            return None;
        }

        let island = state.round_robin;
        state.round_robin = (state.round_robin + 1) % state.islands.len();

        let is_initializing = state.islands[island].state == IslandState::Initializing
            || state.islands[island].state == IslandState::Repopulating;
        let needs_seed = state.islands[island].genomes.is_empty();

        let mut genome = if needs_seed {
            let mut rng = state.rng.fork();
            let g = Genome::seed(&mut state.next_innovation, &mut rng, self.num_inputs, self.num_outputs);
            state.rng = rng;
            Some(g)
        } else if is_initializing && state.islands[island].genomes.len() < state.islands[island].capacity {
            let len = state.islands[island].genomes.len();
            let idx = random_index(len, &mut state.rng);
            let parent = state.islands[island].genomes[idx].clone();
            let rec_dist = self.rec_dist_for(&state, island);
            let rates = MutationRates::from(&self.config.mutation_rates);
            let cell_types = self.config.possible_node_types.clone();
            mutate(&parent, &rates, &cell_types, rec_dist.as_ref(), &mut state.next_innovation, &mut state.rng)
        } else {
            self.generate_via_operator(&mut state, island)
        };

        if let Some(ref mut g) = genome {
            g.island = Some(island);
            g.generation_id = state.generated_count;
            g.learning_rate = self.config.learning_rate;
            g.bp_iterations = self.config.bp_iterations;
            g.dropout_probability = self.config.dropout_probability.unwrap_or(0.0);
            g.low_threshold = self.config.low_threshold;
            g.high_threshold = self.config.high_threshold;
        }
        state.generated_count += 1;
        genome
    }

    fn generate_via_operator(&self, state: &mut CoordinatorState, island: usize) -> Option<Genome> {
        let r = state.rng.uniform_range(0.0, 1.0);
        let rates = &self.config.mutation_rates;
        let cell_types = self.config.possible_node_types.clone();

        if r < rates.clone_rate {
            return state.islands[island].best().cloned();
        }
        if r < rates.clone_rate + rates.crossover_rate {
            if state.islands[island].genomes.len() >= 2 {
                let len = state.islands[island].genomes.len();
                let i1 = random_index(len, &mut state.rng);
                let mut i2 = random_index(len, &mut state.rng);
                while i2 == i1 {
                    i2 = random_index(len, &mut state.rng);
                }
                let (p1, p2) = if state.islands[island].genomes[i1].best_mse <= state.islands[island].genomes[i2].best_mse {
                    (i1, i2)
                } else {
                    (i2, i1)
                };
                let more_fit = state.islands[island].genomes[p1].clone();
                let less_fit = state.islands[island].genomes[p2].clone();
                let cr = CrossoverRates::from(&self.config.mutation_rates);
                return Some(crossover(&more_fit, &less_fit, &cr, &mut state.rng));
            }
        }
        if r < rates.clone_rate + rates.crossover_rate + rates.island_crossover_rate && state.islands.len() > 1 {
            let mut other = state.rng.gen_range_usize(0, state.islands.len());
            while other == island {
                other = state.rng.gen_range_usize(0, state.islands.len());
            }
            if let (Some(more_fit), Some(less_fit)) = (state.islands[island].best().cloned(), state.islands[other].best().cloned()) {
                let (more_fit, less_fit) = if more_fit.best_mse <= less_fit.best_mse { (more_fit, less_fit) } else { (less_fit, more_fit) };
                let cr = CrossoverRates::from(&self.config.mutation_rates);
                return Some(crossover(&more_fit, &less_fit, &cr, &mut state.rng));
            }
        }

        let len = state.islands[island].genomes.len();
        let idx = random_index(len, &mut state.rng);
        let parent = state.islands[island].genomes[idx].clone();
        let rec_dist = self.rec_dist_for(state, island);
        let mutation_rates = MutationRates::from(&self.config.mutation_rates);
        mutate(&parent, &mutation_rates, &cell_types, rec_dist.as_ref(), &mut state.next_innovation, &mut state.rng)
    }

    /// Inserts a trained genome back into its island under the fitness
    /// policy, updates the island's lifecycle state and the recurrent-delay
    /// pheromone distributions, and increments `inserted_count`
    /// (SPEC_FULL.md §4.7 `insert`). Returns whether the genome was
    /// retained.
    #[instrument(skip(self, genome), fields(island = ?genome.island))]
    pub fn insert(&self, genome: Genome) -> bool {
        let island = match genome.island {
            Some(i) => i,
            None => {
                warn!("dropping genome with no island assignment");
                return false;
            }
        };
        if !genome.best_mse.is_finite() {
            let mut state = self.state.lock().unwrap();
            state.inserted_count += 1;
            return false;
        }

        let mut state = self.state.lock().unwrap();
        let stagnation_limit = self.config.num_genomes_check_on_island.max(1);
        let delays: Vec<i32> = genome.recurrent_edges.iter().filter(|e| e.enabled).map(|e| e.delay).collect();
        let retained = state.islands[island].insert(genome, stagnation_limit);

        if retained {
            let pheromone_idx = match self.config.rec_sampling_population {
                RecSamplingPopulation::Global => 0,
                RecSamplingPopulation::Island => island,
            };
            for d in delays {
                state.pheromone_dists[pheromone_idx].on_insert(d);
            }
            if state.inserted_count % 50 == 0 {
                state.pheromone_dists[pheromone_idx].decay();
            }
        }

        state.inserted_count += 1;
        info!(inserted = state.inserted_count, retained, "insert");
        retained
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn island_keeps_sorted_order_and_capacity() {
        let mut island = Island::new(3);
        for (i, mse) in [0.5, 0.1, 0.9, 0.05].into_iter().enumerate() {
            let mut g = Genome::new("test");
            g.best_mse = mse;
            g.generation_id = i as u64;
            island.insert(g, 10);
        }
        assert!(island.genomes.len() <= 3);
        for w in island.genomes.windows(2) {
            assert!(w[0].best_mse <= w[1].best_mse);
        }
    }

    #[test]
    fn coordinator_terminates_after_max_genomes() {
        let mut config = Config::default();
        config.population_size = 2;
        config.number_islands = 1;
        config.max_genomes = 3;
        config.bp_iterations = 1;
        let coordinator = Coordinator::new(config, 1, 1, 1);

        let mut count = 0;
        while let Some(mut genome) = coordinator.generate() {
            genome.best_mse = 1.0 / (count as f64 + 1.0);
            coordinator.insert(genome);
            count += 1;
            if count > 10 {
                break;
            }
        }
        assert!(coordinator.terminated());
        assert_eq!(count, 3);
    }
}
