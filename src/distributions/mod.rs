//! Recurrent-delay sampling distributions.
//!
//! Four samplers over an inclusive integer range `[min, max]`, rebuilt from
//! (or updated incrementally against) the enabled recurrent edges of a
//! population. Grounded on the original `RecDepthFrequencyTable` /
//! `RecDepthNormalDist` / `RecDepthHistDist` / `RecDepthUniformDist` /
//! `RecDepthPheromoneDist` family.

use crate::genome::Genome;
use crate::rng::Rng;
use rand_distr::{Distribution as _, Normal};
use serde::{Deserialize, Serialize};

/// Counts enabled recurrent-edge delays observed across a set of genomes.
#[derive(Debug, Clone)]
pub struct FrequencyTable {
    min: i32,
    max: i32,
    frequencies: Vec<u32>,
    n_samples: u32,
}

impl FrequencyTable {
    pub fn new(min: i32, max: i32) -> Self {
        FrequencyTable {
            min,
            max,
            frequencies: vec![0; (max - min + 1) as usize],
            n_samples: 0,
        }
    }

    pub fn from_genomes<'a>(min: i32, max: i32, genomes: impl IntoIterator<Item = &'a Genome>) -> Self {
        let mut table = FrequencyTable::new(min, max);
        for genome in genomes {
            table.count(genome);
        }
        table
    }

    fn count(&mut self, genome: &Genome) {
        for edge in &genome.recurrent_edges {
            if edge.enabled {
                self.n_samples += 1;
                self.frequencies[(edge.delay - self.min) as usize] += 1;
            }
        }
    }

    pub fn get(&self, depth: i32) -> u32 {
        self.frequencies[(depth - self.min) as usize]
    }
}

/// A recurrent-delay sampler. `sample` draws a new delay; `on_insert` and
/// `decay` update internal state for the pheromone variant (no-ops for the
/// others).
pub trait RecDepthDist: std::fmt::Debug {
    fn sample(&self, rng: &mut Rng) -> i32;
    fn on_insert(&mut self, _depth: i32) {}
    fn decay(&mut self) {}
}

#[derive(Debug, Clone, Copy)]
pub struct UniformDist {
    min: i32,
    max: i32,
}

impl UniformDist {
    pub fn new(min: i32, max: i32) -> Self {
        UniformDist { min, max }
    }
}

impl RecDepthDist for UniformDist {
    fn sample(&self, rng: &mut Rng) -> i32 {
        // Sampled inclusively over [min, max]; see DESIGN.md for why this
        // departs from the original's exclusive-of-max modulo sampling.
        rng.gen_range_usize(self.min as usize, self.max as usize + 1) as i32
    }
}

#[derive(Debug, Clone)]
pub struct HistDist {
    values: Vec<i32>,
}

impl HistDist {
    pub fn from_table(table: &FrequencyTable) -> Self {
        let mut values = Vec::with_capacity((table.n_samples + 1 + (table.max - table.min) as u32) as usize);
        for depth in table.min..=table.max {
            let slots = table.get(depth) + 1;
            for _ in 0..slots {
                values.push(depth);
            }
        }
        HistDist { values }
    }
}

impl RecDepthDist for HistDist {
    fn sample(&self, rng: &mut Rng) -> i32 {
        let idx = rng.gen_range_usize(0, self.values.len());
        self.values[idx]
    }
}

#[derive(Debug, Clone, Copy)]
pub struct NormalDist {
    min: i32,
    max: i32,
    mean: f64,
    std_dev: f64,
}

impl NormalDist {
    pub fn from_table(table: &FrequencyTable) -> Self {
        let mut n_samples = 0i64;
        let mut sum = 0i64;
        for depth in table.min..=table.max {
            let f = table.get(depth) as i64;
            n_samples += f;
            sum += f * depth as i64;
        }
        let (mean, std_dev) = if n_samples == 0 {
            ((table.min + table.max) as f64 / 2.0, 1.0)
        } else {
            let mean = sum as f64 / n_samples as f64;
            let mut total_sq_deviation = 0.0;
            for depth in table.min..=table.max {
                let f = table.get(depth) as f64;
                let deviation = depth as f64 - mean;
                total_sq_deviation += f * deviation * deviation;
            }
            let sd = (total_sq_deviation / n_samples as f64).sqrt();
            (mean, if sd > 0.0 { sd } else { 1.0 })
        };
        NormalDist { min: table.min, max: table.max, mean, std_dev }
    }
}

impl RecDepthDist for NormalDist {
    fn sample(&self, rng: &mut Rng) -> i32 {
        let normal = Normal::new(self.mean, self.std_dev).unwrap_or_else(|_| Normal::new(self.mean, 1.0).unwrap());
        loop {
            let drawn = normal.sample(rng.inner());
            let rounded = drawn.round() as i32;
            if rounded >= self.min && rounded <= self.max {
                return rounded;
            }
        }
    }
}

/// Reinforcement-style categorical distribution over delays: pheromone
/// levels are reinforced by `deposit` on successful insertion and reduced
/// uniformly by `decay`, sampled proportionally to `level + baseline`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PheromoneDist {
    min: i32,
    max: i32,
    decay_rate: f64,
    baseline: f64,
    levels: Vec<f64>,
}

impl PheromoneDist {
    pub fn new(min: i32, max: i32, decay_rate: f64, baseline: f64) -> Self {
        PheromoneDist {
            min,
            max,
            decay_rate,
            baseline,
            levels: vec![0.0; (max - min + 1) as usize],
        }
    }

    pub fn level(&self, depth: i32) -> f64 {
        self.levels[(depth - self.min) as usize]
    }

    pub fn deposit(&mut self, depth: i32) {
        for i in self.min..=self.max {
            let power = (i - depth).unsigned_abs();
            self.levels[(i - self.min) as usize] += 1.0 / 2f64.powi(power as i32);
        }
    }
}

impl RecDepthDist for PheromoneDist {
    fn sample(&self, rng: &mut Rng) -> i32 {
        let sum: f64 = self.levels.iter().map(|l| l + self.baseline).sum();
        let r = rng.uniform_range(0.0, sum);
        let mut acc = 0.0;
        for i in self.min..=self.max {
            acc += self.levels[(i - self.min) as usize] + self.baseline;
            if r < acc {
                return i;
            }
        }
        self.max
    }

    fn on_insert(&mut self, depth: i32) {
        self.deposit(depth);
    }

    fn decay(&mut self) {
        for level in self.levels.iter_mut() {
            *level *= self.decay_rate;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_sampler_is_roughly_flat() {
        let dist = UniformDist::new(1, 10);
        let mut rng = Rng::from_seed(1);
        let mut counts = [0u32; 10];
        let draws = 200_000;
        for _ in 0..draws {
            let d = dist.sample(&mut rng);
            counts[(d - 1) as usize] += 1;
        }
        for c in counts {
            let freq = c as f64 / draws as f64;
            assert!((freq - 0.10).abs() < 0.01, "freq={freq}");
        }
    }

    #[test]
    fn pheromone_deposit_matches_exact_formula() {
        let mut dist = PheromoneDist::new(1, 10, 0.99, 0.01);
        dist.deposit(4);
        assert!((dist.level(4) - 1.0).abs() < 1e-12);
        assert!((dist.level(5) - 0.5).abs() < 1e-12);
        assert!((dist.level(3) - 0.5).abs() < 1e-12);
        assert!((dist.level(6) - 0.25).abs() < 1e-12);
    }

    #[test]
    fn pheromone_sampling_biases_toward_deposited_mode() {
        let mut dist = PheromoneDist::new(1, 10, 1.0, 0.01);
        for _ in 0..20 {
            dist.deposit(4);
        }
        let mut rng = Rng::from_seed(3);
        let mut counts = [0u32; 10];
        for _ in 0..100_000 {
            let d = dist.sample(&mut rng);
            counts[(d - 1) as usize] += 1;
        }
        let mode = counts.iter().enumerate().max_by_key(|(_, c)| **c).unwrap().0;
        assert_eq!(mode, 3);
    }
}
