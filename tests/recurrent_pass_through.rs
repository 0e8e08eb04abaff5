//! End-to-end scenario B: a single simple-cell node wired with a
//! self-referential recurrent edge (delay 1, weight 1) on top of a direct
//! forward edge from the input. An impulse input series should produce an
//! iterated-activation decaying trace, since at every step beyond the first
//! the node's only nonzero input is its own previous activation.

use examm::edge::{ForwardEdge, RecurrentEdge};
use examm::genome::Genome;
use examm::node::{CellType, LayerRole, Node};
use ndarray::Array2;

fn self_recurrent_genome() -> Genome {
    let mut genome = Genome::new("hand-built");
    let input = Node::new(0, LayerRole::Input, 0.0, CellType::Simple);
    let mut output = Node::new(1, LayerRole::Output, 1.0, CellType::Simple);
    if let examm::node::NodeKernel::Simple(ref mut s) = output.kernel {
        s.weight = 1.0;
        s.bias = 0.0;
    }
    genome.nodes = vec![input, output];
    genome.forward_edges = vec![ForwardEdge::new(2, 0, 1, 1.0)];
    genome.recurrent_edges = vec![RecurrentEdge::new(3, 1, 1, 1.0, 1)];
    genome.update_reachability();
    genome
}

#[test]
fn self_loop_produces_decaying_trace_after_impulse() {
    let mut genome = self_recurrent_genome();
    assert!(genome.is_valid());

    let series = [1.0, 0.0, 0.0, 0.0];
    let inputs = Array2::from_shape_vec((1, 4), series.to_vec()).unwrap();
    let predictions = genome.forward_pass(&inputs);

    let mut expected = Vec::with_capacity(4);
    let mut prev = 0.0_f64;
    for &x in &series {
        let h = (x + prev).tanh();
        expected.push(h);
        prev = h;
    }

    for (p, e) in predictions.iter().zip(expected.iter()) {
        assert!((p - e).abs() < 1e-9, "p={p} expected={e}");
    }
    // After the impulse, the trace strictly decays toward zero.
    for w in predictions.windows(2) {
        assert!(w[1].abs() < w[0].abs());
    }
}
