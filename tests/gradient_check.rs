//! Property test §8.6: the analytic backward-pass gradient must agree with
//! a centered-difference numerical gradient to within 1e-3 relative error
//! on every parameter, for a small LSTM-bearing genome.

use examm::genome::Genome;
use examm::node::{CellType, LayerRole, Node};
use examm::rng::Rng;
use ndarray::Array2;

fn small_genome() -> Genome {
    let mut next_inn = 0;
    let mut rng = Rng::from_seed(123);
    let mut genome = Genome::seed(&mut next_inn, &mut rng, 1, 1);
    // Swap the output node's kernel for an LSTM so the check exercises the
    // full eleven-parameter gate set, not just the two-parameter simple cell.
    let out_idx = genome.nodes.iter().position(|n| n.layer_role == LayerRole::Output).unwrap();
    let inn = genome.nodes[out_idx].innovation_number;
    let mut lstm_node = Node::new(inn, LayerRole::Output, genome.nodes[out_idx].depth, CellType::Lstm);
    lstm_node.kernel.init_random(&mut rng, 0.0, 0.5);
    genome.nodes[out_idx] = lstm_node;
    genome
}

fn mse_for_params(genome: &mut Genome, params: &[f64], inputs: &Array2<f64>, targets: &Array2<f64>) -> f64 {
    genome.unflatten(params).unwrap();
    let predictions = genome.forward_pass(inputs);
    let targets_flat: Vec<f64> = targets.iter().copied().collect();
    Genome::calculate_error_mse(&predictions, &targets_flat)
}

#[test]
fn analytic_gradient_matches_centered_difference() {
    let mut genome = small_genome();
    let series_length = 6;
    let inputs = Array2::from_shape_vec((1, series_length), vec![0.1, -0.2, 0.3, -0.1, 0.25, -0.3]).unwrap();
    let targets = Array2::from_shape_vec((1, series_length), vec![0.2, -0.1, 0.1, -0.2, 0.3, -0.25]).unwrap();

    let base_params = genome.flatten();
    let predictions = genome.forward_pass(&inputs);
    let targets_flat: Vec<f64> = targets.iter().copied().collect();
    let n = predictions.len() as f64;
    let errors: Vec<f64> = predictions.iter().zip(&targets_flat).map(|(p, t)| 2.0 * (p - t) / n).collect();
    genome.backward_pass(&errors, series_length);
    let analytic = genome.gradients();

    let eps = 1e-5;
    for i in 0..base_params.len() {
        let mut plus = base_params.clone();
        plus[i] += eps;
        let mut minus = base_params.clone();
        minus[i] -= eps;

        let loss_plus = mse_for_params(&mut genome, &plus, &inputs, &targets);
        let loss_minus = mse_for_params(&mut genome, &minus, &inputs, &targets);
        let numeric = (loss_plus - loss_minus) / (2.0 * eps);

        let denom = numeric.abs().max(analytic[i].abs()).max(1e-6);
        let relative_error = (numeric - analytic[i]).abs() / denom;
        assert!(
            relative_error < 1e-3,
            "param {i}: analytic={} numeric={} rel_err={relative_error}",
            analytic[i],
            numeric
        );
    }

    genome.unflatten(&base_params).unwrap();
}
