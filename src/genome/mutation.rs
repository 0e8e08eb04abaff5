//! Structural mutation operators.
//!
//! Grounded on `examples/original_source/rnn/rnn.cxx` (edge/node
//! structural manipulation) and `examples/original_source/rnn/examm.hxx`'s
//! per-operator rate fields (SPEC_FULL.md §4.4).

use crate::distributions::RecDepthDist;
use crate::edge::{ForwardEdge, RecurrentEdge};
use crate::genome::Genome;
use crate::node::{CellType, LayerRole, Node};
use crate::rng::Rng;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationOperator {
    AddEdge,
    AddRecurrentEdge,
    EnableEdge,
    DisableEdge,
    SplitEdge,
    AddNode,
    EnableNode,
    DisableNode,
    SplitNode,
    MergeNode,
}

/// Normalized selection weights for each structural operator, mirroring
/// `examm.hxx`'s `*_rate` fields.
#[derive(Debug, Clone, Copy)]
pub struct MutationRates {
    pub add_edge: f64,
    pub add_recurrent_edge: f64,
    pub enable_edge: f64,
    pub disable_edge: f64,
    pub split_edge: f64,
    pub add_node: f64,
    pub enable_node: f64,
    pub disable_node: f64,
    pub split_node: f64,
    pub merge_node: f64,
}

impl Default for MutationRates {
    fn default() -> Self {
        MutationRates {
            add_edge: 1.0,
            add_recurrent_edge: 1.0,
            enable_edge: 1.0,
            disable_edge: 1.0,
            split_edge: 1.0,
            add_node: 1.0,
            enable_node: 1.0,
            disable_node: 1.0,
            split_node: 1.0,
            merge_node: 1.0,
        }
    }
}

impl From<&crate::config::MutationRateConfig> for MutationRates {
    fn from(config: &crate::config::MutationRateConfig) -> Self {
        MutationRates {
            add_edge: config.add_edge_rate,
            add_recurrent_edge: config.add_recurrent_edge_rate,
            enable_edge: config.enable_edge_rate,
            disable_edge: config.disable_edge_rate,
            split_edge: config.split_edge_rate,
            add_node: config.add_node_rate,
            enable_node: config.enable_node_rate,
            disable_node: config.disable_node_rate,
            split_node: config.split_node_rate,
            merge_node: config.merge_node_rate,
        }
    }
}

impl MutationRates {
    fn as_pairs(&self) -> [(MutationOperator, f64); 10] {
        [
            (MutationOperator::AddEdge, self.add_edge),
            (MutationOperator::AddRecurrentEdge, self.add_recurrent_edge),
            (MutationOperator::EnableEdge, self.enable_edge),
            (MutationOperator::DisableEdge, self.disable_edge),
            (MutationOperator::SplitEdge, self.split_edge),
            (MutationOperator::AddNode, self.add_node),
            (MutationOperator::EnableNode, self.enable_node),
            (MutationOperator::DisableNode, self.disable_node),
            (MutationOperator::SplitNode, self.split_node),
            (MutationOperator::MergeNode, self.merge_node),
        ]
    }

    pub fn choose(&self, rng: &mut Rng) -> MutationOperator {
        let pairs = self.as_pairs();
        let total: f64 = pairs.iter().map(|(_, w)| w).sum();
        let mut r = rng.uniform_range(0.0, total.max(1e-9));
        for (op, w) in pairs {
            if r < w {
                return op;
            }
            r -= w;
        }
        MutationOperator::AddEdge
    }
}

const MAX_MUTATION_ATTEMPTS: u32 = 20;

/// Clones `parent`, applies one randomly selected structural operator, and
/// retries (re-drawing the operator) up to a bounded attempt count if the
/// result is structurally invalid (SPEC_FULL.md §4.4, §7).
pub fn mutate(
    parent: &Genome,
    rates: &MutationRates,
    cell_types: &[CellType],
    rec_dist: &dyn RecDepthDist,
    next_innovation: &mut i64,
    rng: &mut Rng,
) -> Option<Genome> {
    for _ in 0..MAX_MUTATION_ATTEMPTS {
        let mut child = parent.copy();
        child.generated_by = "mutation".to_string();
        let op = rates.choose(rng);
        apply_operator(&mut child, op, cell_types, rec_dist, next_innovation, rng);
        child.update_reachability();
        if child.is_valid() {
            return Some(child);
        }
    }
    None
}

fn apply_operator(
    genome: &mut Genome,
    op: MutationOperator,
    cell_types: &[CellType],
    rec_dist: &dyn RecDepthDist,
    next_innovation: &mut i64,
    rng: &mut Rng,
) {
    match op {
        MutationOperator::AddEdge => add_edge(genome, next_innovation, rng),
        MutationOperator::AddRecurrentEdge => add_recurrent_edge(genome, rec_dist, next_innovation, rng),
        MutationOperator::EnableEdge => toggle_random_edge(genome, true, rng),
        MutationOperator::DisableEdge => toggle_random_edge(genome, false, rng),
        MutationOperator::SplitEdge => split_edge(genome, cell_types, next_innovation, rng),
        MutationOperator::AddNode => add_node(genome, cell_types, next_innovation, rng),
        MutationOperator::EnableNode => toggle_random_node(genome, true, rng),
        MutationOperator::DisableNode => toggle_random_node(genome, false, rng),
        MutationOperator::SplitNode => split_node(genome, next_innovation, rng),
        MutationOperator::MergeNode => merge_node(genome, rng),
    }
}

fn live_node_indices(genome: &Genome) -> Vec<usize> {
    (0..genome.nodes.len()).filter(|&i| genome.nodes[i].is_live()).collect()
}

fn add_edge(genome: &mut Genome, next_innovation: &mut i64, rng: &mut Rng) {
    let live = live_node_indices(genome);
    if live.len() < 2 {
        return;
    }
    let a = live[rng.gen_range_usize(0, live.len())];
    let b = live[rng.gen_range_usize(0, live.len())];
    let (lo, hi) = if genome.nodes[a].depth < genome.nodes[b].depth { (a, b) } else { (b, a) };
    if genome.nodes[lo].depth == genome.nodes[hi].depth {
        return;
    }
    let lo_inn = genome.nodes[lo].innovation_number;
    let hi_inn = genome.nodes[hi].innovation_number;
    let exists = genome.forward_edges.iter().any(|e| e.input_innovation == lo_inn && e.output_innovation == hi_inn);
    if exists {
        return;
    }
    let weight = rng.truncated_normal(0.0, 0.5);
    let inn = *next_innovation;
    *next_innovation += 1;
    genome.forward_edges.push(ForwardEdge::new(inn, lo_inn, hi_inn, weight));
}

fn add_recurrent_edge(genome: &mut Genome, rec_dist: &dyn RecDepthDist, next_innovation: &mut i64, rng: &mut Rng) {
    let live = live_node_indices(genome);
    if live.is_empty() {
        return;
    }
    let a = live[rng.gen_range_usize(0, live.len())];
    let b = live[rng.gen_range_usize(0, live.len())];
    let delay = rec_dist.sample(rng);
    let weight = rng.truncated_normal(0.0, 0.5);
    let inn = *next_innovation;
    *next_innovation += 1;
    genome.recurrent_edges.push(RecurrentEdge::new(
        inn,
        genome.nodes[a].innovation_number,
        genome.nodes[b].innovation_number,
        weight,
        delay,
    ));
}

fn toggle_random_edge(genome: &mut Genome, enable: bool, rng: &mut Rng) {
    let total = genome.forward_edges.len() + genome.recurrent_edges.len();
    if total == 0 {
        return;
    }
    let idx = rng.gen_range_usize(0, total);
    if idx < genome.forward_edges.len() {
        genome.forward_edges[idx].enabled = enable;
    } else {
        genome.recurrent_edges[idx - genome.forward_edges.len()].enabled = enable;
    }
}

fn toggle_random_node(genome: &mut Genome, enable: bool, rng: &mut Rng) {
    let candidates: Vec<usize> = (0..genome.nodes.len()).filter(|&i| genome.nodes[i].layer_role == LayerRole::Hidden).collect();
    if candidates.is_empty() {
        return;
    }
    let idx = candidates[rng.gen_range_usize(0, candidates.len())];
    genome.nodes[idx].enabled = enable;
}

fn split_edge(genome: &mut Genome, cell_types: &[CellType], next_innovation: &mut i64, rng: &mut Rng) {
    if genome.forward_edges.is_empty() {
        return;
    }
    let ei = rng.gen_range_usize(0, genome.forward_edges.len());
    if !genome.forward_edges[ei].enabled {
        return;
    }
    let in_inn = genome.forward_edges[ei].input_innovation;
    let out_inn = genome.forward_edges[ei].output_innovation;
    let in_idx = genome.index_of(in_inn).unwrap();
    let out_idx = genome.index_of(out_inn).unwrap();
    let mid_depth = (genome.nodes[in_idx].depth + genome.nodes[out_idx].depth) / 2.0;

    let cell_type = cell_types[rng.gen_range_usize(0, cell_types.len())];
    let new_inn = *next_innovation;
    *next_innovation += 1;
    let mut new_node = Node::new(new_inn, LayerRole::Hidden, mid_depth, cell_type);
    new_node.kernel.init_random(rng, 0.0, 0.5);
    genome.nodes.push(new_node);

    let w1 = rng.truncated_normal(0.0, 0.5);
    let w2 = rng.truncated_normal(0.0, 0.5);
    let inn1 = *next_innovation;
    *next_innovation += 1;
    let inn2 = *next_innovation;
    *next_innovation += 1;
    genome.forward_edges.push(ForwardEdge::new(inn1, in_inn, new_inn, w1));
    genome.forward_edges.push(ForwardEdge::new(inn2, new_inn, out_inn, w2));
    genome.forward_edges[ei].enabled = false;
}

fn add_node(genome: &mut Genome, cell_types: &[CellType], next_innovation: &mut i64, rng: &mut Rng) {
    let live = live_node_indices(genome);
    if live.len() < 2 {
        return;
    }
    let pred = live[rng.gen_range_usize(0, live.len())];
    let succ = live[rng.gen_range_usize(0, live.len())];
    let (pred, succ) = if genome.nodes[pred].depth < genome.nodes[succ].depth { (pred, succ) } else { (succ, pred) };
    if genome.nodes[pred].depth == genome.nodes[succ].depth {
        return;
    }
    let depth = (genome.nodes[pred].depth + genome.nodes[succ].depth) / 2.0;
    let cell_type = cell_types[rng.gen_range_usize(0, cell_types.len())];
    let new_inn = *next_innovation;
    *next_innovation += 1;
    let mut new_node = Node::new(new_inn, LayerRole::Hidden, depth, cell_type);
    new_node.kernel.init_random(rng, 0.0, 0.5);
    let pred_inn = genome.nodes[pred].innovation_number;
    let succ_inn = genome.nodes[succ].innovation_number;
    genome.nodes.push(new_node);

    let in_inn = *next_innovation;
    *next_innovation += 1;
    let out_inn = *next_innovation;
    *next_innovation += 1;
    genome.forward_edges.push(ForwardEdge::new(in_inn, pred_inn, new_inn, rng.truncated_normal(0.0, 0.5)));
    genome.forward_edges.push(ForwardEdge::new(out_inn, new_inn, succ_inn, rng.truncated_normal(0.0, 0.5)));
}

fn split_node(genome: &mut Genome, next_innovation: &mut i64, rng: &mut Rng) {
    let candidates: Vec<usize> = (0..genome.nodes.len()).filter(|&i| genome.nodes[i].layer_role == LayerRole::Hidden && genome.nodes[i].is_live()).collect();
    if candidates.is_empty() {
        return;
    }
    let idx = candidates[rng.gen_range_usize(0, candidates.len())];
    let original = genome.nodes[idx].clone();
    let orig_inn = original.innovation_number;
    let new_inn = *next_innovation;
    *next_innovation += 1;
    let mut dup = original;
    dup.innovation_number = new_inn;
    genome.nodes.push(dup);

    // Redistribute: move roughly half of the incoming/outgoing edges from
    // the original node to the duplicate.
    let mut moved_in = false;
    let mut moved_out = false;
    for e in genome.forward_edges.iter_mut() {
        if e.output_innovation == orig_inn && !moved_in {
            e.output_innovation = new_inn;
            moved_in = true;
        } else if e.input_innovation == orig_inn && !moved_out {
            e.input_innovation = new_inn;
            moved_out = true;
        }
    }
}

fn merge_node(genome: &mut Genome, rng: &mut Rng) {
    let candidates: Vec<usize> = (0..genome.nodes.len()).filter(|&i| genome.nodes[i].layer_role == LayerRole::Hidden && genome.nodes[i].is_live()).collect();
    if candidates.len() < 2 {
        return;
    }
    let a = candidates[rng.gen_range_usize(0, candidates.len())];
    let mut b = candidates[rng.gen_range_usize(0, candidates.len())];
    while b == a {
        b = candidates[rng.gen_range_usize(0, candidates.len())];
    }
    let (keep, drop) = if genome.nodes[a].innovation_number < genome.nodes[b].innovation_number { (a, b) } else { (b, a) };
    let keep_inn = genome.nodes[keep].innovation_number;
    let drop_inn = genome.nodes[drop].innovation_number;

    for e in genome.forward_edges.iter_mut() {
        if e.input_innovation == drop_inn {
            e.input_innovation = keep_inn;
        }
        if e.output_innovation == drop_inn {
            e.output_innovation = keep_inn;
        }
    }
    for e in genome.recurrent_edges.iter_mut() {
        if e.input_innovation == drop_inn {
            e.input_innovation = keep_inn;
        }
        if e.output_innovation == drop_inn {
            e.output_innovation = keep_inn;
        }
    }
    genome.forward_edges.retain(|e| e.input_innovation != e.output_innovation);
    genome.recurrent_edges.retain(|e| e.input_innovation != e.output_innovation);
    genome.nodes.retain(|n| n.innovation_number != drop_inn);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distributions::UniformDist;

    #[test]
    fn mutation_preserves_output_liveness() {
        let mut next_inn = 0;
        let mut rng = Rng::from_seed(99);
        let parent = Genome::seed(&mut next_inn, &mut rng, 2, 1);
        let dist = UniformDist::new(1, 5);
        let rates = MutationRates::default();
        let cell_types = [CellType::Simple, CellType::Lstm];
        for _ in 0..30 {
            let child = mutate(&parent, &rates, &cell_types, &dist, &mut next_inn, &mut rng);
            if let Some(child) = child {
                assert!(child.is_valid());
            }
        }
    }
}
