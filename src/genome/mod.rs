//! The genome graph: nodes, edges, reachability, the flat parameter view,
//! forward/backward propagation, and the training loop.
//!
//! Grounded on `examples/original_source/rnn/rnn.cxx`'s
//! `forward_pass`/`backward_pass`/`get_weights`/`set_weights`/
//! `calculate_error_mse`/`get_analytic_gradient`/`initialize_randomly`.

pub mod crossover;
pub mod mutation;

use crate::edge::{ForwardEdge, RecurrentEdge};
use crate::errors::{EngineError, EngineResult};
use crate::node::{CellType, LayerRole, Node};
use crate::rng::Rng;
use ndarray::Array2;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Genome {
    pub generation_id: u64,
    pub generated_by: String,
    pub nodes: Vec<Node>,
    pub forward_edges: Vec<ForwardEdge>,
    pub recurrent_edges: Vec<RecurrentEdge>,

    pub learning_rate: f64,
    pub bp_iterations: u32,
    pub dropout_probability: f64,
    pub low_threshold: Option<f64>,
    pub high_threshold: Option<f64>,

    #[serde(default)]
    pub best_mse: f64,
    #[serde(default)]
    pub best_parameters: Option<Vec<f64>>,
    #[serde(skip)]
    pub island: Option<usize>,
}

impl Genome {
    pub fn new(generated_by: impl Into<String>) -> Self {
        Genome {
            generation_id: 0,
            generated_by: generated_by.into(),
            nodes: Vec::new(),
            forward_edges: Vec::new(),
            recurrent_edges: Vec::new(),
            learning_rate: 0.001,
            bp_iterations: 20,
            dropout_probability: 0.0,
            low_threshold: None,
            high_threshold: None,
            best_mse: f64::INFINITY,
            best_parameters: None,
            island: None,
        }
    }

    /// Builds the minimal seed genome: one input node directly connected by
    /// a forward edge to one output node, both simple cells. Used by the
    /// coordinator when an island is still empty (SPEC_FULL.md §4.7 step 3).
    pub fn seed(
        next_innovation: &mut i64,
        rng: &mut Rng,
        num_inputs: usize,
        num_outputs: usize,
    ) -> Self {
        let mut genome = Genome::new("seed");
        let mut input_indices = Vec::new();
        for _ in 0..num_inputs {
            let inn = *next_innovation;
            *next_innovation += 1;
            genome.nodes.push(Node::new(inn, LayerRole::Input, 0.0, CellType::Simple));
            input_indices.push(inn);
        }
        let mut output_indices = Vec::new();
        for _ in 0..num_outputs {
            let inn = *next_innovation;
            *next_innovation += 1;
            genome.nodes.push(Node::new(inn, LayerRole::Output, 1.0, CellType::Simple));
            output_indices.push(inn);
        }
        for &in_inn in &input_indices {
            for &out_inn in &output_indices {
                let inn = *next_innovation;
                *next_innovation += 1;
                let weight = rng.truncated_normal(0.0, 0.5);
                genome.forward_edges.push(ForwardEdge::new(inn, in_inn, out_inn, weight));
            }
        }
        for node in genome.nodes.iter_mut() {
            node.kernel.init_random(rng, 0.0, 0.5);
        }
        genome.update_reachability();
        genome
    }

    pub fn index_of(&self, innovation: i64) -> Option<usize> {
        self.nodes.iter().position(|n| n.innovation_number == innovation)
    }

    pub fn input_node_innovations(&self) -> Vec<i64> {
        self.nodes.iter().filter(|n| n.layer_role == LayerRole::Input).map(|n| n.innovation_number).collect()
    }

    pub fn output_node_innovations(&self) -> Vec<i64> {
        self.nodes.iter().filter(|n| n.layer_role == LayerRole::Output).map(|n| n.innovation_number).collect()
    }

    /// Recomputes forward/backward reachability by fixed-point iteration
    /// over enabled edges, then marks nodes/edges live accordingly
    /// (SPEC_FULL.md §4.3).
    pub fn update_reachability(&mut self) {
        for node in self.nodes.iter_mut() {
            node.forward_reachable = node.layer_role == LayerRole::Input;
            node.backward_reachable = node.layer_role == LayerRole::Output;
        }
        for e in self.forward_edges.iter_mut() {
            e.forward_reachable = false;
            e.backward_reachable = false;
        }
        for e in self.recurrent_edges.iter_mut() {
            e.forward_reachable = false;
            e.backward_reachable = false;
        }

        loop {
            let mut changed = false;

            for i in 0..self.forward_edges.len() {
                if !self.forward_edges[i].enabled {
                    continue;
                }
                let in_idx = self.index_of(self.forward_edges[i].input_innovation);
                let out_idx = self.index_of(self.forward_edges[i].output_innovation);
                if let (Some(in_idx), Some(out_idx)) = (in_idx, out_idx) {
                    if self.nodes[in_idx].forward_reachable && !self.forward_edges[i].forward_reachable {
                        self.forward_edges[i].forward_reachable = true;
                        changed = true;
                    }
                    if self.forward_edges[i].forward_reachable && !self.nodes[out_idx].forward_reachable {
                        self.nodes[out_idx].forward_reachable = true;
                        changed = true;
                    }
                    if self.nodes[out_idx].backward_reachable && !self.forward_edges[i].backward_reachable {
                        self.forward_edges[i].backward_reachable = true;
                        changed = true;
                    }
                    if self.forward_edges[i].backward_reachable && !self.nodes[in_idx].backward_reachable {
                        self.nodes[in_idx].backward_reachable = true;
                        changed = true;
                    }
                }
            }

            for i in 0..self.recurrent_edges.len() {
                if !self.recurrent_edges[i].enabled {
                    continue;
                }
                let in_idx = self.index_of(self.recurrent_edges[i].input_innovation);
                let out_idx = self.index_of(self.recurrent_edges[i].output_innovation);
                if let (Some(in_idx), Some(out_idx)) = (in_idx, out_idx) {
                    if self.nodes[in_idx].forward_reachable && !self.recurrent_edges[i].forward_reachable {
                        self.recurrent_edges[i].forward_reachable = true;
                        changed = true;
                    }
                    if self.recurrent_edges[i].forward_reachable && !self.nodes[out_idx].forward_reachable {
                        self.nodes[out_idx].forward_reachable = true;
                        changed = true;
                    }
                    if self.nodes[out_idx].backward_reachable && !self.recurrent_edges[i].backward_reachable {
                        self.recurrent_edges[i].backward_reachable = true;
                        changed = true;
                    }
                    if self.recurrent_edges[i].backward_reachable && !self.nodes[in_idx].backward_reachable {
                        self.nodes[in_idx].backward_reachable = true;
                        changed = true;
                    }
                }
            }

            if !changed {
                break;
            }
        }
    }

    pub fn is_valid(&self) -> bool {
        self.nodes.iter().filter(|n| n.layer_role == LayerRole::Output).all(|n| n.is_live())
    }

    fn live_nodes_depth_order(&self) -> Vec<usize> {
        let mut idx: Vec<usize> = (0..self.nodes.len()).filter(|&i| self.nodes[i].is_live()).collect();
        idx.sort_by(|&a, &b| self.nodes[a].depth.partial_cmp(&self.nodes[b].depth).unwrap());
        idx
    }

    fn live_forward_edges_order(&self) -> Vec<usize> {
        let mut idx: Vec<usize> = (0..self.forward_edges.len()).filter(|&i| self.forward_edges[i].is_live()).collect();
        idx.sort_by(|&a, &b| {
            let da = self.nodes[self.index_of(self.forward_edges[a].input_innovation).unwrap()].depth;
            let db = self.nodes[self.index_of(self.forward_edges[b].input_innovation).unwrap()].depth;
            da.partial_cmp(&db).unwrap().then(a.cmp(&b))
        });
        idx
    }

    fn live_recurrent_edges_order(&self) -> Vec<usize> {
        (0..self.recurrent_edges.len()).filter(|&i| self.recurrent_edges[i].is_live()).collect()
    }

    pub fn param_len(&self) -> usize {
        let node_len: usize = self.live_nodes_depth_order().iter().map(|&i| self.nodes[i].param_count()).sum();
        node_len + self.live_forward_edges_order().len() + self.live_recurrent_edges_order().len()
    }

    /// Flattens live nodes (depth order), then live forward edges
    /// (depth-then-insertion order), then live recurrent edges (insertion
    /// order) into one parameter vector (SPEC_FULL.md §4.3).
    pub fn flatten(&self) -> Vec<f64> {
        let mut out = vec![0.0; self.param_len()];
        let mut offset = 0;
        for i in self.live_nodes_depth_order() {
            self.nodes[i].read_params(&mut out, &mut offset);
        }
        for i in self.live_forward_edges_order() {
            out[offset] = self.forward_edges[i].weight;
            offset += 1;
        }
        for i in self.live_recurrent_edges_order() {
            out[offset] = self.recurrent_edges[i].weight;
            offset += 1;
        }
        out
    }

    pub fn unflatten(&mut self, params: &[f64]) -> EngineResult<()> {
        let expected = self.param_len();
        if params.len() != expected {
            return Err(EngineError::SerializationMismatch { expected, found: params.len() });
        }
        let mut offset = 0;
        for i in self.live_nodes_depth_order() {
            self.nodes[i].write_params(params, &mut offset);
        }
        for i in self.live_forward_edges_order() {
            self.forward_edges[i].weight = params[offset].clamp(-10.0, 10.0);
            offset += 1;
        }
        for i in self.live_recurrent_edges_order() {
            self.recurrent_edges[i].weight = params[offset].clamp(-10.0, 10.0);
            offset += 1;
        }
        Ok(())
    }

    fn compute_fan_in_out(&mut self) {
        for node in self.nodes.iter_mut() {
            node.total_inputs = if node.layer_role == LayerRole::Input { 1 } else { 0 };
            node.total_outputs = if node.layer_role == LayerRole::Output { 1 } else { 0 };
        }
        for e in self.forward_edges.iter().filter(|e| e.is_live()) {
            let out_idx = self.index_of(e.output_innovation).unwrap();
            let in_idx = self.index_of(e.input_innovation).unwrap();
            self.nodes[out_idx].total_inputs += 1;
            self.nodes[in_idx].total_outputs += 1;
        }
        for e in self.recurrent_edges.iter().filter(|e| e.is_live()) {
            let out_idx = self.index_of(e.output_innovation).unwrap();
            let in_idx = self.index_of(e.input_innovation).unwrap();
            self.nodes[out_idx].total_inputs += 1;
            self.nodes[in_idx].total_outputs += 1;
        }
    }

    /// Runs the forward pass over a `[channels][series_length]` input
    /// matrix, returning the `[output_channels][series_length]` prediction
    /// matrix. Nodes fire when their accumulated `inputs_fired[t]` count
    /// reaches their fan-in; recurrent edges whose source time precedes the
    /// series start fire a zero contribution in a prelude pass so every
    /// node's fan-in is satisfied uniformly (SPEC_FULL.md §4.2, Design Notes
    /// "Cyclic structure in recurrent edges").
    pub fn forward_pass(&mut self, inputs: &Array2<f64>) -> Vec<f64> {
        let series_length = inputs.ncols();
        for node in self.nodes.iter_mut() {
            node.reset(series_length);
        }
        for e in self.forward_edges.iter_mut() {
            e.grad_accum = 0.0;
        }
        for e in self.recurrent_edges.iter_mut() {
            e.grad_accum = 0.0;
        }
        self.compute_fan_in_out();

        let recurrent_order = self.live_recurrent_edges_order();
        for &ei in &recurrent_order {
            let delay = self.recurrent_edges[ei].delay as usize;
            let out_idx = self.index_of(self.recurrent_edges[ei].output_innovation).unwrap();
            for t in 0..delay.min(series_length) {
                self.nodes[out_idx].input_fired(t, 0.0);
            }
        }

        let input_innovations = self.input_node_innovations();
        let forward_order = self.live_forward_edges_order();

        for t in 0..series_length {
            for (ch, &inn) in input_innovations.iter().enumerate() {
                if let Some(idx) = self.index_of(inn) {
                    if self.nodes[idx].is_live() {
                        self.nodes[idx].input_fired(t, inputs[[ch, t]]);
                    }
                }
            }

            for &ei in &forward_order {
                let in_idx = self.index_of(self.forward_edges[ei].input_innovation).unwrap();
                let out_idx = self.index_of(self.forward_edges[ei].output_innovation).unwrap();
                let src_activation = self.nodes[in_idx].activation(t);
                let value = self.forward_edges[ei].propagate_forward(t, src_activation);
                self.nodes[out_idx].input_fired(t, value);
            }

            for &ei in &recurrent_order {
                let delay = self.recurrent_edges[ei].delay as usize;
                if t < delay {
                    continue;
                }
                let src_t = t - delay;
                let in_idx = self.index_of(self.recurrent_edges[ei].input_innovation).unwrap();
                let out_idx = self.index_of(self.recurrent_edges[ei].output_innovation).unwrap();
                let src_activation = self.nodes[in_idx].activation(src_t);
                let value = self.recurrent_edges[ei].propagate_forward(src_activation);
                self.nodes[out_idx].input_fired(t, value);
            }
        }

        let output_innovations = self.output_node_innovations();
        let mut predictions = vec![0.0; output_innovations.len() * series_length];
        for (oi, &inn) in output_innovations.iter().enumerate() {
            let idx = self.index_of(inn).unwrap();
            for t in 0..series_length {
                predictions[oi * series_length + t] = self.nodes[idx].activation(t);
            }
        }
        predictions
    }

    /// Runs the backward pass given `[output_channels][series_length]`
    /// error deltas (dE/dy per output per time step), accumulating
    /// per-parameter gradients into every live node and edge.
    pub fn backward_pass(&mut self, output_errors: &[f64], series_length: usize) {
        let output_innovations = self.output_node_innovations();
        let node_order = self.live_nodes_depth_order();
        let forward_order = self.live_forward_edges_order();
        let recurrent_order = self.live_recurrent_edges_order();

        for &ei in &recurrent_order {
            let delay = self.recurrent_edges[ei].delay as usize;
            let in_idx = self.index_of(self.recurrent_edges[ei].input_innovation).unwrap();
            for t in (series_length.saturating_sub(delay))..series_length {
                self.nodes[in_idx].output_fired(t, 0.0, series_length);
            }
        }

        for t in (0..series_length).rev() {
            for (oi, &inn) in output_innovations.iter().enumerate() {
                let idx = self.index_of(inn).unwrap();
                let err = output_errors[oi * series_length + t];
                self.nodes[idx].output_fired(t, err, series_length);
            }

            for &ei in forward_order.iter().rev() {
                let in_idx = self.index_of(self.forward_edges[ei].input_innovation).unwrap();
                let out_idx = self.index_of(self.forward_edges[ei].output_innovation).unwrap();
                if self.nodes[out_idx].outputs_fired[t] < self.nodes[out_idx].total_outputs {
                    continue;
                }
                let d_out = self.nodes[out_idx].d_input(t);
                let src_activation = self.nodes[in_idx].activation(t);
                self.forward_edges[ei].grad_accum += d_out * src_activation;
                let delta = self.forward_edges[ei].propagate_backward(d_out);
                self.nodes[in_idx].output_fired(t, delta, series_length);
            }

            for &ei in &recurrent_order {
                let delay = self.recurrent_edges[ei].delay as usize;
                if t < delay {
                    continue;
                }
                let src_t = t - delay;
                let in_idx = self.index_of(self.recurrent_edges[ei].input_innovation).unwrap();
                let out_idx = self.index_of(self.recurrent_edges[ei].output_innovation).unwrap();
                if self.nodes[out_idx].outputs_fired[t] < self.nodes[out_idx].total_outputs {
                    continue;
                }
                let d_out = self.nodes[out_idx].d_input(t);
                let src_activation = self.nodes[in_idx].activation(src_t);
                self.recurrent_edges[ei].grad_accum += d_out * src_activation;
                let delta = self.recurrent_edges[ei].propagate_backward(d_out);
                self.nodes[in_idx].output_fired(src_t, delta, series_length);
            }
        }

        let _ = node_order;
    }

    /// Gradients in the same canonical order as `flatten`, summed over the
    /// series by `backward_pass`.
    pub fn gradients(&self) -> Vec<f64> {
        let mut out = vec![0.0; self.param_len()];
        let mut offset = 0;
        for i in self.live_nodes_depth_order() {
            self.nodes[i].gradients(&mut out, &mut offset);
        }
        for i in self.live_forward_edges_order() {
            out[offset] = self.forward_edges[i].grad_accum;
            offset += 1;
        }
        for i in self.live_recurrent_edges_order() {
            out[offset] = self.recurrent_edges[i].grad_accum;
            offset += 1;
        }
        out
    }

    pub fn calculate_error_mse(predictions: &[f64], targets: &[f64]) -> f64 {
        let n = predictions.len() as f64;
        predictions.iter().zip(targets).map(|(p, t)| (p - t).powi(2)).sum::<f64>() / n
    }

    pub fn calculate_error_mae(predictions: &[f64], targets: &[f64]) -> f64 {
        let n = predictions.len() as f64;
        predictions.iter().zip(targets).map(|(p, t)| (p - t).abs()).sum::<f64>() / n
    }

    pub fn copy(&self) -> Self {
        self.clone()
    }

    /// Minibatch stochastic gradient descent over `bp_iterations` epochs.
    /// Each epoch visits the training series in a seeded shuffle, applies
    /// dropout to forward edges when `dropout_probability > 0`, and updates
    /// `params <- params - lr * grad` after every series. Validation MSE is
    /// checked after every epoch; the best parameter snapshot is kept and
    /// returned instead of the final epoch's parameters (SPEC_FULL.md
    /// §4.3). Returns an error if any step produces a non-finite parameter.
    #[tracing::instrument(skip(self, rng, train, valid), fields(bp_iterations = self.bp_iterations))]
    pub fn train(
        &mut self,
        rng: &mut Rng,
        train: &[(Array2<f64>, Array2<f64>)],
        valid: &[(Array2<f64>, Array2<f64>)],
    ) -> EngineResult<f64> {
        self.best_mse = f64::INFINITY;
        self.best_parameters = None;

        for _epoch in 0..self.bp_iterations {
            let mut order: Vec<usize> = (0..train.len()).collect();
            for i in (1..order.len()).rev() {
                let j = rng.gen_range_usize(0, i + 1);
                order.swap(i, j);
            }

            for &idx in &order {
                let (inputs, targets) = &train[idx];
                self.apply_dropout_mask(rng);
                let series_length = inputs.ncols();
                let predictions = self.forward_pass(inputs);
                let targets_flat: Vec<f64> = targets.iter().copied().collect();
                let n_out = targets.nrows() as f64;
                let scale = 2.0 / (n_out * series_length as f64);
                let errors: Vec<f64> = predictions.iter().zip(&targets_flat).map(|(p, t)| (p - t) * scale).collect();
                self.backward_pass(&errors, series_length);
                self.clear_dropout_mask();

                let grads = self.gradients();
                let mut params = self.flatten();
                for (p, g) in params.iter_mut().zip(&grads) {
                    *p -= self.learning_rate * g;
                    if !p.is_finite() {
                        return Err(EngineError::NonFinite(format!(
                            "parameter became non-finite during training ({} )",
                            self.generated_by
                        )));
                    }
                }
                self.unflatten(&params)?;
            }

            if valid.is_empty() {
                continue;
            }
            let mut total_se = 0.0;
            let mut total_n = 0.0;
            for (inputs, targets) in valid {
                let predictions = self.forward_pass(inputs);
                let targets_flat: Vec<f64> = targets.iter().copied().collect();
                total_se += predictions.iter().zip(&targets_flat).map(|(p, t)| (p - t).powi(2)).sum::<f64>();
                total_n += predictions.len() as f64;
            }
            let valid_mse = total_se / total_n.max(1.0);
            if valid_mse < self.best_mse {
                self.best_mse = valid_mse;
                self.best_parameters = Some(self.flatten());
            }

            if let Some(low) = self.low_threshold {
                if valid_mse < low {
                    break;
                }
            }
            if let Some(high) = self.high_threshold {
                if valid_mse > high {
                    break;
                }
            }
        }

        if let Some(best) = self.best_parameters.clone() {
            self.unflatten(&best)?;
        } else if let Some((inputs, targets)) = train.last() {
            // No validation set was supplied: the last epoch's trained
            // parameters are already in place; report training error on
            // the last series visited as the genome's fitness.
            let predictions = self.forward_pass(inputs);
            let targets_flat: Vec<f64> = targets.iter().copied().collect();
            self.best_mse = Self::calculate_error_mse(&predictions, &targets_flat);
        }
        Ok(self.best_mse)
    }

    fn apply_dropout_mask(&mut self, rng: &mut Rng) {
        if self.dropout_probability <= 0.0 {
            return;
        }
        let keep_prob = 1.0 - self.dropout_probability;
        for e in self.forward_edges.iter_mut() {
            e.dropout_scale = if rng.gen_bool(self.dropout_probability) { 0.0 } else { 1.0 / keep_prob };
        }
    }

    fn clear_dropout_mask(&mut self) {
        for e in self.forward_edges.iter_mut() {
            e.dropout_scale = 1.0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rng::Rng;

    #[test]
    fn flatten_unflatten_round_trip() {
        let mut next_inn = 0;
        let mut rng = Rng::from_seed(11);
        let mut genome = Genome::seed(&mut next_inn, &mut rng, 1, 1);
        let flat = genome.flatten();
        assert_eq!(flat.len(), genome.param_len());
        genome.unflatten(&flat).unwrap();
        assert_eq!(genome.flatten(), flat);
    }

    #[test]
    fn forward_edge_depth_invariant_holds_for_seed_genome() {
        let mut next_inn = 0;
        let mut rng = Rng::from_seed(5);
        let genome = Genome::seed(&mut next_inn, &mut rng, 2, 1);
        for e in &genome.forward_edges {
            let in_depth = genome.nodes[genome.index_of(e.input_innovation).unwrap()].depth;
            let out_depth = genome.nodes[genome.index_of(e.output_innovation).unwrap()].depth;
            assert!(in_depth < out_depth);
        }
    }

    #[test]
    fn seed_genome_outputs_are_live() {
        let mut next_inn = 0;
        let mut rng = Rng::from_seed(9);
        let genome = Genome::seed(&mut next_inn, &mut rng, 1, 1);
        assert!(genome.is_valid());
    }

    #[test]
    fn forward_pass_produces_finite_output_for_seed_genome() {
        let mut next_inn = 0;
        let mut rng = Rng::from_seed(21);
        let mut genome = Genome::seed(&mut next_inn, &mut rng, 1, 1);
        let inputs = Array2::from_shape_vec((1, 5), vec![0.1, 0.2, 0.3, 0.4, 0.5]).unwrap();
        let preds = genome.forward_pass(&inputs);
        assert_eq!(preds.len(), 5);
        assert!(preds.iter().all(|p| p.is_finite()));
    }
}
