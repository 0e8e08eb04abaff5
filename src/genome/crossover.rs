//! Innovation-number-aligned two-parent crossover.
//!
//! Grounded on the crossover helper methods declared in
//! `examples/original_source/rnn/examm.hxx` (`attempt_edge_insert`,
//! `attempt_recurrent_edge_insert`, `attempt_node_insert`) generalized per
//! SPEC_FULL.md §4.5.

use crate::edge::{ForwardEdge, RecurrentEdge};
use crate::genome::Genome;
use crate::node::Node;
use crate::rng::Rng;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy)]
pub struct CrossoverRates {
    pub more_fit: f64,
    pub less_fit: f64,
}

impl Default for CrossoverRates {
    fn default() -> Self {
        CrossoverRates { more_fit: 0.8, less_fit: 0.2 }
    }
}

impl From<&crate::config::MutationRateConfig> for CrossoverRates {
    fn from(config: &crate::config::MutationRateConfig) -> Self {
        CrossoverRates { more_fit: config.more_fit_crossover_rate, less_fit: config.less_fit_crossover_rate }
    }
}

/// Merges the more-fit and less-fit parent's edge lists by innovation
/// number. Shared innovations are inherited from a uniformly chosen parent;
/// disjoint innovations are inherited probabilistically per `rates`. Every
/// node referenced by an inherited edge is carried along with it
/// (SPEC_FULL.md §4.5, Design Notes "Shared ownership of structural
/// elements").
pub fn crossover(more_fit: &Genome, less_fit: &Genome, rates: &CrossoverRates, rng: &mut Rng) -> Genome {
    let mut child = Genome::new("crossover");
    child.learning_rate = more_fit.learning_rate;
    child.bp_iterations = more_fit.bp_iterations;
    child.dropout_probability = more_fit.dropout_probability;
    child.low_threshold = more_fit.low_threshold;
    child.high_threshold = more_fit.high_threshold;

    let mut node_map: HashMap<i64, Node> = HashMap::new();

    let mut more_edges: Vec<&ForwardEdge> = more_fit.forward_edges.iter().collect();
    let mut less_edges: Vec<&ForwardEdge> = less_fit.forward_edges.iter().collect();
    more_edges.sort_by_key(|e| e.innovation_number);
    less_edges.sort_by_key(|e| e.innovation_number);

    let mut child_forward = Vec::new();
    merge_walk(
        &more_edges,
        &less_edges,
        |e| e.innovation_number,
        rates,
        rng,
        |edge, from_more| {
            child_forward.push(edge.clone());
            let owner = if from_more { more_fit } else { less_fit };
            inherit_node(&mut node_map, owner, edge.input_innovation);
            inherit_node(&mut node_map, owner, edge.output_innovation);
        },
    );

    let mut more_rec: Vec<&RecurrentEdge> = more_fit.recurrent_edges.iter().collect();
    let mut less_rec: Vec<&RecurrentEdge> = less_fit.recurrent_edges.iter().collect();
    more_rec.sort_by_key(|e| e.innovation_number);
    less_rec.sort_by_key(|e| e.innovation_number);

    let mut child_recurrent = Vec::new();
    merge_walk(
        &more_rec,
        &less_rec,
        |e| e.innovation_number,
        rates,
        rng,
        |edge, from_more| {
            child_recurrent.push(edge.clone());
            let owner = if from_more { more_fit } else { less_fit };
            inherit_node(&mut node_map, owner, edge.input_innovation);
            inherit_node(&mut node_map, owner, edge.output_innovation);
        },
    );

    // Always inherit input/output nodes even if no edge currently touches
    // them, so the child's external interface matches its parents'.
    for inn in more_fit.input_node_innovations().into_iter().chain(more_fit.output_node_innovations()) {
        inherit_node(&mut node_map, more_fit, inn);
    }

    let mut nodes: Vec<Node> = node_map.into_values().collect();
    nodes.sort_by(|a, b| a.depth.partial_cmp(&b.depth).unwrap().then(a.innovation_number.cmp(&b.innovation_number)));

    child.nodes = nodes;
    child.forward_edges = child_forward;
    child.recurrent_edges = child_recurrent;
    child.update_reachability();
    child
}

fn inherit_node(map: &mut HashMap<i64, Node>, owner: &Genome, innovation: i64) {
    if map.contains_key(&innovation) {
        return;
    }
    if let Some(idx) = owner.index_of(innovation) {
        map.insert(innovation, owner.nodes[idx].clone());
    }
}

fn merge_walk<'a, T, F, G>(more: &[&'a T], less: &[&'a T], key: F, rates: &CrossoverRates, rng: &mut Rng, mut emit: G)
where
    F: Fn(&T) -> i64,
    G: FnMut(&'a T, bool),
{
    let mut i = 0;
    let mut j = 0;
    while i < more.len() || j < less.len() {
        let mi = i < more.len();
        let mj = j < less.len();
        if mi && mj && key(more[i]) == key(less[j]) {
            if rng.gen_bool(0.5) {
                emit(more[i], true);
            } else {
                emit(less[j], false);
            }
            i += 1;
            j += 1;
        } else if mi && (!mj || key(more[i]) < key(less[j])) {
            if rng.gen_bool(rates.more_fit) {
                emit(more[i], true);
            }
            i += 1;
        } else {
            if rng.gen_bool(rates.less_fit) {
                emit(less[j], false);
            }
            j += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crossover_child_edges_come_from_a_parent() {
        let mut next_inn = 0;
        let mut rng = Rng::from_seed(3);
        let p1 = Genome::seed(&mut next_inn, &mut rng, 1, 1);
        let p2 = Genome::seed(&mut next_inn, &mut rng, 1, 1);
        let rates = CrossoverRates::default();
        let child = crossover(&p1, &p2, &rates, &mut rng);

        let p1_inns: std::collections::HashSet<i64> = p1.forward_edges.iter().map(|e| e.innovation_number).collect();
        let p2_inns: std::collections::HashSet<i64> = p2.forward_edges.iter().map(|e| e.innovation_number).collect();
        for e in &child.forward_edges {
            assert!(p1_inns.contains(&e.innovation_number) || p2_inns.contains(&e.innovation_number));
        }
        for e in &child.forward_edges {
            assert!(child.index_of(e.input_innovation).is_some());
            assert!(child.index_of(e.output_innovation).is_some());
        }
    }
}
