//! End-to-end scenario D / property §8.4: hand-built parents sharing two
//! edge innovations and each carrying one disjoint edge. The crossover
//! child's edges must all trace back to a parent, and every child node must
//! be the endpoint of some child edge (or one of the parents' input/output
//! nodes, per the crossover contract).

use examm::edge::ForwardEdge;
use examm::genome::crossover::{crossover, CrossoverRates};
use examm::genome::Genome;
use examm::node::{CellType, LayerRole, Node};
use examm::rng::Rng;
use std::collections::HashSet;

fn hand_parent(generated_by: &str, extra_innovation: i64, extra_weight: f64) -> Genome {
    let mut genome = Genome::new(generated_by);
    genome.nodes = vec![
        Node::new(0, LayerRole::Input, 0.0, CellType::Simple),
        Node::new(1, LayerRole::Hidden, 0.5, CellType::Simple),
        Node::new(2, LayerRole::Output, 1.0, CellType::Simple),
    ];
    // Shared innovations 10 and 11 appear in both parents; `extra_innovation`
    // is unique to this parent.
    genome.forward_edges = vec![
        ForwardEdge::new(10, 0, 1, 0.5),
        ForwardEdge::new(11, 1, 2, 0.5),
        ForwardEdge::new(extra_innovation, 0, 2, extra_weight),
    ];
    genome.update_reachability();
    genome
}

#[test]
fn crossover_child_edges_trace_to_a_parent_and_nodes_are_endpoints() {
    let more_fit = hand_parent("parent-a", 20, 0.9);
    let less_fit = hand_parent("parent-b", 21, -0.9);
    let mut rng = Rng::from_seed(55);
    let rates = CrossoverRates::default();

    let child = crossover(&more_fit, &less_fit, &rates, &mut rng);

    let allowed: HashSet<i64> = more_fit
        .forward_edges
        .iter()
        .chain(less_fit.forward_edges.iter())
        .map(|e| e.innovation_number)
        .collect();
    for e in &child.forward_edges {
        assert!(allowed.contains(&e.innovation_number));
    }

    let edge_endpoints: HashSet<i64> = child
        .forward_edges
        .iter()
        .flat_map(|e| [e.input_innovation, e.output_innovation])
        .collect();
    let input_output: HashSet<i64> = more_fit.input_node_innovations().into_iter().chain(more_fit.output_node_innovations()).collect();
    for node in &child.nodes {
        assert!(
            edge_endpoints.contains(&node.innovation_number) || input_output.contains(&node.innovation_number),
            "node {} is not an edge endpoint or a carried input/output node",
            node.innovation_number
        );
    }
}

#[test]
fn shared_innovations_always_present_with_fixed_seed() {
    let more_fit = hand_parent("parent-a", 20, 0.9);
    let less_fit = hand_parent("parent-b", 21, -0.9);

    // With more_fit/less_fit rates of 1.0 every disjoint edge is inherited
    // too, but the two shared innovations (10, 11) are always present
    // regardless of the per-edge parent coin flip.
    let deterministic_rates = CrossoverRates { more_fit: 1.0, less_fit: 1.0 };
    for seed in 0..10u64 {
        let mut rng = Rng::from_seed(seed);
        let child = crossover(&more_fit, &less_fit, &deterministic_rates, &mut rng);
        let child_innovations: HashSet<i64> = child.forward_edges.iter().map(|e| e.innovation_number).collect();
        assert!(child_innovations.contains(&10));
        assert!(child_innovations.contains(&11));
    }
}
