//! Recurrent node kernels.
//!
//! Grounded on `examples/original_source/rnn/lstm_node.cxx` for the LSTM
//! cell's exact forward/backward formulation, generalized to a small family
//! of cell types sharing one firing-count-driven interface (SPEC_FULL.md
//! §4.1, §9 "Polymorphic node kernels").

use crate::rng::Rng;
use serde::{Deserialize, Serialize};

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

fn sigmoid_derivative(y: f64) -> f64 {
    y * (1.0 - y)
}

fn tanh_derivative(y: f64) -> f64 {
    1.0 - y * y
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LayerRole {
    Input,
    Hidden,
    Output,
}

/// A closed, fixed taxonomy of recurrent cell kernels, each exposing the
/// same firing-driven forward/backward contract. A tagged enum is used
/// rather than a trait object per SPEC_FULL.md §9: the cell-type set is
/// small and closed, unlike the teacher's open-ended `Layer` catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum NodeKernel {
    Simple(SimpleState),
    Lstm(LstmState),
    Gru(GruState),
    Mgu(MguState),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CellType {
    Simple,
    Lstm,
    Gru,
    Mgu,
}

impl NodeKernel {
    pub fn new(cell_type: CellType) -> Self {
        match cell_type {
            CellType::Simple => NodeKernel::Simple(SimpleState::default()),
            CellType::Lstm => NodeKernel::Lstm(LstmState::default()),
            CellType::Gru => NodeKernel::Gru(GruState::default()),
            CellType::Mgu => NodeKernel::Mgu(MguState::default()),
        }
    }

    pub fn cell_type(&self) -> CellType {
        match self {
            NodeKernel::Simple(_) => CellType::Simple,
            NodeKernel::Lstm(_) => CellType::Lstm,
            NodeKernel::Gru(_) => CellType::Gru,
            NodeKernel::Mgu(_) => CellType::Mgu,
        }
    }

    pub fn param_count(&self) -> usize {
        match self {
            NodeKernel::Simple(_) => 2,
            NodeKernel::Lstm(_) => 11,
            NodeKernel::Gru(_) => 8,
            NodeKernel::Mgu(_) => 6,
        }
    }

    pub fn init_random(&mut self, rng: &mut Rng, mu: f64, sigma: f64) {
        let mut buf = vec![0.0; self.param_count()];
        for v in buf.iter_mut() {
            *v = rng.truncated_normal(mu, sigma);
        }
        let mut offset = 0;
        self.write_params(&buf, &mut offset);
    }

    pub fn read_params(&self, out: &mut [f64], offset: &mut usize) {
        match self {
            NodeKernel::Simple(s) => {
                out[*offset] = s.weight;
                out[*offset + 1] = s.bias;
                *offset += 2;
            }
            NodeKernel::Lstm(s) => {
                let vals = [
                    s.output_gate_update_weight,
                    s.output_gate_weight,
                    s.output_gate_bias,
                    s.input_gate_update_weight,
                    s.input_gate_weight,
                    s.input_gate_bias,
                    s.forget_gate_update_weight,
                    s.forget_gate_weight,
                    s.forget_gate_bias,
                    s.cell_weight,
                    s.cell_bias,
                ];
                out[*offset..*offset + 11].copy_from_slice(&vals);
                *offset += 11;
            }
            NodeKernel::Gru(s) => {
                let vals = [
                    s.update_input_weight,
                    s.update_recurrent_weight,
                    s.update_bias,
                    s.reset_input_weight,
                    s.reset_recurrent_weight,
                    s.reset_bias,
                    s.candidate_input_weight,
                    s.candidate_recurrent_weight,
                ];
                out[*offset..*offset + 8].copy_from_slice(&vals);
                *offset += 8;
            }
            NodeKernel::Mgu(s) => {
                let vals = [
                    s.gate_input_weight,
                    s.gate_recurrent_weight,
                    s.gate_bias,
                    s.candidate_input_weight,
                    s.candidate_recurrent_weight,
                    s.candidate_bias,
                ];
                out[*offset..*offset + 6].copy_from_slice(&vals);
                *offset += 6;
            }
        }
    }

    pub fn write_params(&mut self, input: &[f64], offset: &mut usize) {
        let bound = |x: f64| x.clamp(-10.0, 10.0);
        match self {
            NodeKernel::Simple(s) => {
                s.weight = bound(input[*offset]);
                s.bias = bound(input[*offset + 1]);
                *offset += 2;
            }
            NodeKernel::Lstm(s) => {
                s.output_gate_update_weight = bound(input[*offset]);
                s.output_gate_weight = bound(input[*offset + 1]);
                s.output_gate_bias = bound(input[*offset + 2]);
                s.input_gate_update_weight = bound(input[*offset + 3]);
                s.input_gate_weight = bound(input[*offset + 4]);
                s.input_gate_bias = bound(input[*offset + 5]);
                s.forget_gate_update_weight = bound(input[*offset + 6]);
                s.forget_gate_weight = bound(input[*offset + 7]);
                s.forget_gate_bias = bound(input[*offset + 8]);
                s.cell_weight = bound(input[*offset + 9]);
                s.cell_bias = bound(input[*offset + 10]);
                *offset += 11;
            }
            NodeKernel::Gru(s) => {
                s.update_input_weight = bound(input[*offset]);
                s.update_recurrent_weight = bound(input[*offset + 1]);
                s.update_bias = bound(input[*offset + 2]);
                s.reset_input_weight = bound(input[*offset + 3]);
                s.reset_recurrent_weight = bound(input[*offset + 4]);
                s.reset_bias = bound(input[*offset + 5]);
                s.candidate_input_weight = bound(input[*offset + 6]);
                s.candidate_recurrent_weight = bound(input[*offset + 7]);
                *offset += 8;
            }
            NodeKernel::Mgu(s) => {
                s.gate_input_weight = bound(input[*offset]);
                s.gate_recurrent_weight = bound(input[*offset + 1]);
                s.gate_bias = bound(input[*offset + 2]);
                s.candidate_input_weight = bound(input[*offset + 3]);
                s.candidate_recurrent_weight = bound(input[*offset + 4]);
                s.candidate_bias = bound(input[*offset + 5]);
                *offset += 6;
            }
        }
    }

    fn reset(&mut self, series_length: usize) {
        match self {
            NodeKernel::Simple(s) => s.reset(series_length),
            NodeKernel::Lstm(s) => s.reset(series_length),
            NodeKernel::Gru(s) => s.reset(series_length),
            NodeKernel::Mgu(s) => s.reset(series_length),
        }
    }

    /// Computes the node's activation at `time` given the summed incoming
    /// input value, writing into the kernel's own per-time-step buffers and
    /// returning the node's output value at this time step.
    fn forward_step(&mut self, time: usize, input_value: f64) -> f64 {
        match self {
            NodeKernel::Simple(s) => s.forward_step(time, input_value),
            NodeKernel::Lstm(s) => s.forward_step(time, input_value),
            NodeKernel::Gru(s) => s.forward_step(time, input_value),
            NodeKernel::Mgu(s) => s.forward_step(time, input_value),
        }
    }

    /// Accumulates gradients for `time` given the summed incoming error
    /// delta, returning (d_input, d_recurrent_state_into_previous_step).
    fn backward_step(&mut self, time: usize, series_length: usize, error: f64) -> (f64, f64) {
        match self {
            NodeKernel::Simple(s) => s.backward_step(time, error),
            NodeKernel::Lstm(s) => s.backward_step(time, series_length, error),
            NodeKernel::Gru(s) => s.backward_step(time, error),
            NodeKernel::Mgu(s) => s.backward_step(time, error),
        }
    }

    fn gradients(&self, out: &mut [f64], offset: &mut usize) {
        match self {
            NodeKernel::Simple(s) => s.gradients(out, offset),
            NodeKernel::Lstm(s) => s.gradients(out, offset),
            NodeKernel::Gru(s) => s.gradients(out, offset),
            NodeKernel::Mgu(s) => s.gradients(out, offset),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SimpleState {
    pub weight: f64,
    pub bias: f64,
    #[serde(skip)]
    input_values: Vec<f64>,
    #[serde(skip)]
    ld: Vec<f64>,
    #[serde(skip)]
    d_weight: Vec<f64>,
    #[serde(skip)]
    d_bias: Vec<f64>,
}

impl SimpleState {
    fn reset(&mut self, n: usize) {
        self.input_values = vec![0.0; n];
        self.ld = vec![0.0; n];
        self.d_weight = vec![0.0; n];
        self.d_bias = vec![0.0; n];
    }

    fn forward_step(&mut self, t: usize, input_value: f64) -> f64 {
        self.input_values[t] = input_value;
        let out = (self.weight * input_value + self.bias).tanh();
        self.ld[t] = tanh_derivative(out);
        out
    }

    fn backward_step(&mut self, t: usize, error: f64) -> (f64, f64) {
        let d = error * self.ld[t];
        self.d_bias[t] = d;
        self.d_weight[t] = d * self.input_values[t];
        (d * self.weight, 0.0)
    }

    fn gradients(&self, out: &mut [f64], offset: &mut usize) {
        out[*offset] = self.d_weight.iter().sum();
        out[*offset + 1] = self.d_bias.iter().sum();
        *offset += 2;
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LstmState {
    pub output_gate_update_weight: f64,
    pub output_gate_weight: f64,
    pub output_gate_bias: f64,
    pub input_gate_update_weight: f64,
    pub input_gate_weight: f64,
    pub input_gate_bias: f64,
    pub forget_gate_update_weight: f64,
    pub forget_gate_weight: f64,
    pub forget_gate_bias: f64,
    pub cell_weight: f64,
    pub cell_bias: f64,

    #[serde(skip)]
    input_values: Vec<f64>,
    #[serde(skip)]
    output_gate_values: Vec<f64>,
    #[serde(skip)]
    input_gate_values: Vec<f64>,
    #[serde(skip)]
    forget_gate_values: Vec<f64>,
    #[serde(skip)]
    cell_values: Vec<f64>,
    #[serde(skip)]
    cell_in_tanh: Vec<f64>,
    #[serde(skip)]
    ld_output_gate: Vec<f64>,
    #[serde(skip)]
    ld_input_gate: Vec<f64>,
    #[serde(skip)]
    ld_forget_gate: Vec<f64>,
    #[serde(skip)]
    ld_cell_in: Vec<f64>,
    #[serde(skip)]
    d_prev_cell: Vec<f64>,

    #[serde(skip)]
    d_output_gate_update_weight: Vec<f64>,
    #[serde(skip)]
    d_output_gate_weight: Vec<f64>,
    #[serde(skip)]
    d_output_gate_bias: Vec<f64>,
    #[serde(skip)]
    d_input_gate_update_weight: Vec<f64>,
    #[serde(skip)]
    d_input_gate_weight: Vec<f64>,
    #[serde(skip)]
    d_input_gate_bias: Vec<f64>,
    #[serde(skip)]
    d_forget_gate_update_weight: Vec<f64>,
    #[serde(skip)]
    d_forget_gate_weight: Vec<f64>,
    #[serde(skip)]
    d_forget_gate_bias: Vec<f64>,
    #[serde(skip)]
    d_cell_weight: Vec<f64>,
    #[serde(skip)]
    d_cell_bias: Vec<f64>,
}

impl LstmState {
    fn reset(&mut self, n: usize) {
        self.input_values = vec![0.0; n];
        self.output_gate_values = vec![0.0; n];
        self.input_gate_values = vec![0.0; n];
        self.forget_gate_values = vec![0.0; n];
        self.cell_values = vec![0.0; n];
        self.cell_in_tanh = vec![0.0; n];
        self.ld_output_gate = vec![0.0; n];
        self.ld_input_gate = vec![0.0; n];
        self.ld_forget_gate = vec![0.0; n];
        self.ld_cell_in = vec![0.0; n];
        self.d_prev_cell = vec![0.0; n];
        self.d_output_gate_update_weight = vec![0.0; n];
        self.d_output_gate_weight = vec![0.0; n];
        self.d_output_gate_bias = vec![0.0; n];
        self.d_input_gate_update_weight = vec![0.0; n];
        self.d_input_gate_weight = vec![0.0; n];
        self.d_input_gate_bias = vec![0.0; n];
        self.d_forget_gate_update_weight = vec![0.0; n];
        self.d_forget_gate_weight = vec![0.0; n];
        self.d_forget_gate_bias = vec![0.0; n];
        self.d_cell_weight = vec![0.0; n];
        self.d_cell_bias = vec![0.0; n];
    }

    fn forward_step(&mut self, t: usize, input_value: f64) -> f64 {
        self.input_values[t] = input_value;
        let previous_cell_value = if t > 0 { self.cell_values[t - 1] } else { 0.0 };

        // The "+1" forget-gate bias shift is applied only for this
        // computation; the stored bias itself is never mutated, so mutation
        // and crossover keep operating on the un-shifted parameter.
        let forget_bias_shifted = self.forget_gate_bias + 1.0;

        let o = sigmoid(self.output_gate_weight * input_value + self.output_gate_update_weight * previous_cell_value + self.output_gate_bias);
        let i = sigmoid(self.input_gate_weight * input_value + self.input_gate_update_weight * previous_cell_value + self.input_gate_bias);
        let f = sigmoid(self.forget_gate_weight * input_value + self.forget_gate_update_weight * previous_cell_value + forget_bias_shifted);

        self.output_gate_values[t] = o;
        self.input_gate_values[t] = i;
        self.forget_gate_values[t] = f;
        self.ld_output_gate[t] = sigmoid_derivative(o);
        self.ld_input_gate[t] = sigmoid_derivative(i);
        self.ld_forget_gate[t] = sigmoid_derivative(f);

        let g = (self.cell_weight * input_value + self.cell_bias).tanh();
        self.cell_in_tanh[t] = g;
        self.ld_cell_in[t] = tanh_derivative(g);

        let c = f * previous_cell_value + i * g;
        self.cell_values[t] = c;

        // Linear cell output (peephole variant), not tanh(c) -- preserved
        // per SPEC_FULL.md Open Question 1.
        o * c
    }

    fn backward_step(&mut self, t: usize, series_length: usize, error: f64) -> (f64, f64) {
        let input_value = self.input_values[t];
        let previous_cell_value = if t > 0 { self.cell_values[t - 1] } else { 0.0 };

        let d_output_gate = error * self.cell_values[t] * self.ld_output_gate[t];
        self.d_output_gate_bias[t] = d_output_gate;
        self.d_output_gate_update_weight[t] = d_output_gate * previous_cell_value;
        self.d_output_gate_weight[t] = d_output_gate * input_value;
        let mut d_prev_cell = d_output_gate * self.output_gate_update_weight;
        let mut d_input = d_output_gate * self.output_gate_weight;

        let mut d_cell_out = error * self.output_gate_values[t];
        if t < series_length - 1 {
            d_cell_out += self.d_prev_cell[t + 1];
        }

        d_prev_cell += d_cell_out * self.forget_gate_values[t];

        let d_forget_gate = d_cell_out * previous_cell_value * self.ld_forget_gate[t];
        self.d_forget_gate_bias[t] = d_forget_gate;
        self.d_forget_gate_update_weight[t] = d_forget_gate * previous_cell_value;
        self.d_forget_gate_weight[t] = d_forget_gate * input_value;
        d_prev_cell += d_forget_gate * self.forget_gate_update_weight;
        d_input += d_forget_gate * self.forget_gate_weight;

        let d_input_gate = d_cell_out * self.cell_in_tanh[t] * self.ld_input_gate[t];
        self.d_input_gate_bias[t] = d_input_gate;
        self.d_input_gate_update_weight[t] = d_input_gate * previous_cell_value;
        self.d_input_gate_weight[t] = d_input_gate * input_value;
        d_prev_cell += d_input_gate * self.input_gate_update_weight;
        d_input += d_input_gate * self.input_gate_weight;

        let d_cell_in = d_cell_out * self.input_gate_values[t] * self.ld_cell_in[t];
        self.d_cell_bias[t] = d_cell_in;
        self.d_cell_weight[t] = d_cell_in * input_value;
        d_input += d_cell_in * self.cell_weight;

        self.d_prev_cell[t] = d_prev_cell;
        (d_input, d_prev_cell)
    }

    fn gradients(&self, out: &mut [f64], offset: &mut usize) {
        let sums = [
            self.d_output_gate_update_weight.iter().sum(),
            self.d_output_gate_weight.iter().sum(),
            self.d_output_gate_bias.iter().sum(),
            self.d_input_gate_update_weight.iter().sum(),
            self.d_input_gate_weight.iter().sum(),
            self.d_input_gate_bias.iter().sum(),
            self.d_forget_gate_update_weight.iter().sum(),
            self.d_forget_gate_weight.iter().sum(),
            self.d_forget_gate_bias.iter().sum(),
            self.d_cell_weight.iter().sum(),
            self.d_cell_bias.iter().sum(),
        ];
        out[*offset..*offset + 11].copy_from_slice(&sums);
        *offset += 11;
    }
}

/// GRU cell: `z`/`r` gates plus a candidate state, generalized from the
/// LSTM cell's firing-driven contract (SPEC_FULL.md §4.1).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GruState {
    pub update_input_weight: f64,
    pub update_recurrent_weight: f64,
    pub update_bias: f64,
    pub reset_input_weight: f64,
    pub reset_recurrent_weight: f64,
    pub reset_bias: f64,
    pub candidate_input_weight: f64,
    pub candidate_recurrent_weight: f64,
    #[serde(skip)]
    candidate_bias_unused: f64,

    #[serde(skip)]
    h: Vec<f64>,
    #[serde(skip)]
    z: Vec<f64>,
    #[serde(skip)]
    r: Vec<f64>,
    #[serde(skip)]
    h_hat: Vec<f64>,
    #[serde(skip)]
    input_values: Vec<f64>,
    #[serde(skip)]
    d_h: Vec<f64>,
    #[serde(skip)]
    d_update_input_weight: Vec<f64>,
    #[serde(skip)]
    d_update_recurrent_weight: Vec<f64>,
    #[serde(skip)]
    d_update_bias: Vec<f64>,
    #[serde(skip)]
    d_reset_input_weight: Vec<f64>,
    #[serde(skip)]
    d_reset_recurrent_weight: Vec<f64>,
    #[serde(skip)]
    d_reset_bias: Vec<f64>,
    #[serde(skip)]
    d_candidate_input_weight: Vec<f64>,
    #[serde(skip)]
    d_candidate_recurrent_weight: Vec<f64>,
}

impl GruState {
    fn reset(&mut self, n: usize) {
        self.h = vec![0.0; n];
        self.z = vec![0.0; n];
        self.r = vec![0.0; n];
        self.h_hat = vec![0.0; n];
        self.input_values = vec![0.0; n];
        self.d_h = vec![0.0; n];
        self.d_update_input_weight = vec![0.0; n];
        self.d_update_recurrent_weight = vec![0.0; n];
        self.d_update_bias = vec![0.0; n];
        self.d_reset_input_weight = vec![0.0; n];
        self.d_reset_recurrent_weight = vec![0.0; n];
        self.d_reset_bias = vec![0.0; n];
        self.d_candidate_input_weight = vec![0.0; n];
        self.d_candidate_recurrent_weight = vec![0.0; n];
    }

    fn forward_step(&mut self, t: usize, input_value: f64) -> f64 {
        self.input_values[t] = input_value;
        let h_prev = if t > 0 { self.h[t - 1] } else { 0.0 };

        let z = sigmoid(self.update_input_weight * input_value + self.update_recurrent_weight * h_prev + self.update_bias);
        let r = sigmoid(self.reset_input_weight * input_value + self.reset_recurrent_weight * h_prev + self.reset_bias);
        let h_hat = (self.candidate_input_weight * input_value + self.candidate_recurrent_weight * (r * h_prev)).tanh();
        let h = (1.0 - z) * h_prev + z * h_hat;

        self.z[t] = z;
        self.r[t] = r;
        self.h_hat[t] = h_hat;
        self.h[t] = h;
        h
    }

    fn backward_step(&mut self, t: usize, error: f64) -> (f64, f64) {
        let h_prev = if t > 0 { self.h[t - 1] } else { 0.0 };
        let input_value = self.input_values[t];
        let z = self.z[t];
        let r = self.r[t];
        let h_hat = self.h_hat[t];

        let d_z = error * (h_hat - h_prev) * sigmoid_derivative(z);
        let d_h_hat = error * z * tanh_derivative(h_hat);
        let d_r = d_h_hat * self.candidate_recurrent_weight * h_prev * sigmoid_derivative(r);

        self.d_update_bias[t] = d_z;
        self.d_update_input_weight[t] = d_z * input_value;
        self.d_update_recurrent_weight[t] = d_z * h_prev;

        self.d_reset_bias[t] = d_r;
        self.d_reset_input_weight[t] = d_r * input_value;
        self.d_reset_recurrent_weight[t] = d_r * h_prev;

        self.d_candidate_input_weight[t] = d_h_hat * input_value;
        self.d_candidate_recurrent_weight[t] = d_h_hat * (r * h_prev);

        let d_input = d_z * self.update_input_weight + d_r * self.reset_input_weight + d_h_hat * self.candidate_input_weight;
        let d_h_prev = error * (1.0 - z)
            + d_z * self.update_recurrent_weight
            + d_r * self.reset_recurrent_weight
            + d_h_hat * self.candidate_recurrent_weight * r;

        self.d_h[t] = d_h_prev;
        (d_input, d_h_prev)
    }

    fn gradients(&self, out: &mut [f64], offset: &mut usize) {
        let sums = [
            self.d_update_input_weight.iter().sum(),
            self.d_update_recurrent_weight.iter().sum(),
            self.d_update_bias.iter().sum(),
            self.d_reset_input_weight.iter().sum(),
            self.d_reset_recurrent_weight.iter().sum(),
            self.d_reset_bias.iter().sum(),
            self.d_candidate_input_weight.iter().sum(),
            self.d_candidate_recurrent_weight.iter().sum(),
        ];
        out[*offset..*offset + 8].copy_from_slice(&sums);
        *offset += 8;
    }
}

/// MGU cell: a single shared gate replacing the GRU's separate update/reset
/// gates (SPEC_FULL.md §4.1).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MguState {
    pub gate_input_weight: f64,
    pub gate_recurrent_weight: f64,
    pub gate_bias: f64,
    pub candidate_input_weight: f64,
    pub candidate_recurrent_weight: f64,
    pub candidate_bias: f64,

    #[serde(skip)]
    h: Vec<f64>,
    #[serde(skip)]
    f: Vec<f64>,
    #[serde(skip)]
    h_hat: Vec<f64>,
    #[serde(skip)]
    input_values: Vec<f64>,
    #[serde(skip)]
    d_gate_input_weight: Vec<f64>,
    #[serde(skip)]
    d_gate_recurrent_weight: Vec<f64>,
    #[serde(skip)]
    d_gate_bias: Vec<f64>,
    #[serde(skip)]
    d_candidate_input_weight: Vec<f64>,
    #[serde(skip)]
    d_candidate_recurrent_weight: Vec<f64>,
    #[serde(skip)]
    d_candidate_bias: Vec<f64>,
}

impl MguState {
    fn reset(&mut self, n: usize) {
        self.h = vec![0.0; n];
        self.f = vec![0.0; n];
        self.h_hat = vec![0.0; n];
        self.input_values = vec![0.0; n];
        self.d_gate_input_weight = vec![0.0; n];
        self.d_gate_recurrent_weight = vec![0.0; n];
        self.d_gate_bias = vec![0.0; n];
        self.d_candidate_input_weight = vec![0.0; n];
        self.d_candidate_recurrent_weight = vec![0.0; n];
        self.d_candidate_bias = vec![0.0; n];
    }

    fn forward_step(&mut self, t: usize, input_value: f64) -> f64 {
        self.input_values[t] = input_value;
        let h_prev = if t > 0 { self.h[t - 1] } else { 0.0 };

        let f = sigmoid(self.gate_input_weight * input_value + self.gate_recurrent_weight * h_prev + self.gate_bias);
        let h_hat = (self.candidate_input_weight * input_value + self.candidate_recurrent_weight * (f * h_prev) + self.candidate_bias).tanh();
        let h = (1.0 - f) * h_prev + f * h_hat;

        self.f[t] = f;
        self.h_hat[t] = h_hat;
        self.h[t] = h;
        h
    }

    fn backward_step(&mut self, t: usize, error: f64) -> (f64, f64) {
        let h_prev = if t > 0 { self.h[t - 1] } else { 0.0 };
        let input_value = self.input_values[t];
        let f = self.f[t];
        let h_hat = self.h_hat[t];

        let d_f = error * (h_hat - h_prev) * sigmoid_derivative(f);
        let d_h_hat = error * f * tanh_derivative(h_hat);

        self.d_gate_bias[t] = d_f;
        self.d_gate_input_weight[t] = d_f * input_value;
        self.d_gate_recurrent_weight[t] = d_f * h_prev;

        self.d_candidate_bias[t] = d_h_hat;
        self.d_candidate_input_weight[t] = d_h_hat * input_value;
        self.d_candidate_recurrent_weight[t] = d_h_hat * (f * h_prev);

        let d_input = d_f * self.gate_input_weight + d_h_hat * self.candidate_input_weight;
        let d_h_prev = error * (1.0 - f)
            + d_f * self.gate_recurrent_weight
            + d_h_hat * self.candidate_recurrent_weight * f;

        (d_input, d_h_prev)
    }

    fn gradients(&self, out: &mut [f64], offset: &mut usize) {
        let sums = [
            self.d_gate_input_weight.iter().sum(),
            self.d_gate_recurrent_weight.iter().sum(),
            self.d_gate_bias.iter().sum(),
            self.d_candidate_input_weight.iter().sum(),
            self.d_candidate_recurrent_weight.iter().sum(),
            self.d_candidate_bias.iter().sum(),
        ];
        out[*offset..*offset + 6].copy_from_slice(&sums);
        *offset += 6;
    }
}

/// A node in the genome graph: identity, topology bookkeeping, and the
/// kernel that actually computes its activation/gradient.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub innovation_number: i64,
    pub layer_role: LayerRole,
    pub depth: f64,
    pub enabled: bool,
    #[serde(default)]
    pub forward_reachable: bool,
    #[serde(default)]
    pub backward_reachable: bool,
    pub kernel: NodeKernel,

    #[serde(skip)]
    pub total_inputs: u32,
    #[serde(skip)]
    pub total_outputs: u32,
    #[serde(skip)]
    input_values: Vec<f64>,
    #[serde(skip)]
    output_values: Vec<f64>,
    #[serde(skip)]
    error_values: Vec<f64>,
    #[serde(skip)]
    d_input: Vec<f64>,
    #[serde(skip)]
    pub inputs_fired: Vec<u32>,
    #[serde(skip)]
    pub outputs_fired: Vec<u32>,
}

impl Node {
    pub fn new(innovation_number: i64, layer_role: LayerRole, depth: f64, cell_type: CellType) -> Self {
        Node {
            innovation_number,
            layer_role,
            depth,
            enabled: true,
            forward_reachable: false,
            backward_reachable: false,
            kernel: NodeKernel::new(cell_type),
            total_inputs: 0,
            total_outputs: 0,
            input_values: Vec::new(),
            output_values: Vec::new(),
            error_values: Vec::new(),
            d_input: Vec::new(),
            inputs_fired: Vec::new(),
            outputs_fired: Vec::new(),
        }
    }

    pub fn is_live(&self) -> bool {
        self.enabled && self.forward_reachable && self.backward_reachable
    }

    pub fn reset(&mut self, series_length: usize) {
        self.input_values = vec![0.0; series_length];
        self.output_values = vec![0.0; series_length];
        self.error_values = vec![0.0; series_length];
        self.d_input = vec![0.0; series_length];
        self.inputs_fired = vec![0; series_length];
        self.outputs_fired = vec![0; series_length];
        self.kernel.reset(series_length);
    }

    /// Accumulates one incoming forward activation at `time`; when the
    /// fired-count reaches `total_inputs` the node computes and caches its
    /// activation for this time step. Input-role nodes are identity
    /// pass-throughs for the external series value -- they carry a kernel
    /// only for struct uniformity, never invoking it.
    pub fn input_fired(&mut self, time: usize, incoming: f64) {
        self.inputs_fired[time] += 1;
        self.input_values[time] += incoming;
        if self.inputs_fired[time] < self.total_inputs {
            return;
        }
        self.output_values[time] = if self.layer_role == LayerRole::Input {
            self.input_values[time]
        } else {
            self.kernel.forward_step(time, self.input_values[time])
        };
    }

    pub fn activation(&self, time: usize) -> f64 {
        self.output_values[time]
    }

    /// Accumulates one incoming backward delta at `time`; when the
    /// fired-count reaches `total_outputs` the node computes and caches its
    /// gradient contributions for this time step, returning the pass-through
    /// delta to feed to `x_t`'s predecessors (the per-step recurrent delta is
    /// kept internal to the kernel, mirroring how the LSTM's `d_prev_cell`
    /// self-loops within the node rather than traveling over an edge).
    pub fn output_fired(&mut self, time: usize, delta: f64, series_length: usize) -> Option<f64> {
        self.outputs_fired[time] += 1;
        self.error_values[time] += delta;
        if self.outputs_fired[time] < self.total_outputs {
            return None;
        }
        let d_input = if self.layer_role == LayerRole::Input {
            self.error_values[time]
        } else {
            let (d_input, _d_recurrent) = self.kernel.backward_step(time, series_length, self.error_values[time]);
            d_input
        };
        self.d_input[time] = d_input;
        Some(d_input)
    }

    pub fn d_input(&self, time: usize) -> f64 {
        self.d_input[time]
    }

    /// Number of trainable parameters this node contributes to the flat
    /// parameter vector. Input-role nodes contribute none -- they are
    /// identity pass-throughs (see `input_fired`).
    pub fn param_count(&self) -> usize {
        if self.layer_role == LayerRole::Input {
            0
        } else {
            self.kernel.param_count()
        }
    }

    pub fn read_params(&self, out: &mut [f64], offset: &mut usize) {
        if self.layer_role != LayerRole::Input {
            self.kernel.read_params(out, offset);
        }
    }

    pub fn write_params(&mut self, input: &[f64], offset: &mut usize) {
        if self.layer_role != LayerRole::Input {
            self.kernel.write_params(input, offset);
        }
    }

    pub fn gradients(&self, out: &mut [f64], offset: &mut usize) {
        if self.layer_role != LayerRole::Input {
            self.kernel.gradients(out, offset);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lstm_param_round_trip() {
        let mut node = Node::new(0, LayerRole::Hidden, 0.5, CellType::Lstm);
        let input = vec![0.1, 0.2, 0.3, 0.4, 0.5, 0.6, 0.7, 0.8, 0.9, 1.0, 1.1];
        let mut offset = 0;
        node.kernel.write_params(&input, &mut offset);
        assert_eq!(offset, 11);

        let mut out = vec![0.0; 11];
        let mut offset = 0;
        node.kernel.read_params(&mut out, &mut offset);
        assert_eq!(out, input);
    }

    #[test]
    fn lstm_forward_single_step_matches_hand_computation() {
        let mut node = Node::new(0, LayerRole::Hidden, 0.5, CellType::Lstm);
        if let NodeKernel::Lstm(ref mut s) = node.kernel {
            s.output_gate_weight = 0.0;
            s.output_gate_update_weight = 0.0;
            s.output_gate_bias = 10.0; // o ~= 1
            s.input_gate_weight = 0.0;
            s.input_gate_update_weight = 0.0;
            s.input_gate_bias = 10.0; // i ~= 1
            s.forget_gate_weight = 0.0;
            s.forget_gate_update_weight = 0.0;
            s.forget_gate_bias = -10.0; // f ~= 0 (after +1 shift, still small)
            s.cell_weight = 1.0;
            s.cell_bias = 0.0;
        }
        node.total_inputs = 1;
        node.reset(3);
        node.input_fired(0, 0.5);
        let out = node.activation(0);
        assert!((out - 0.5_f64.tanh()).abs() < 1e-2);
    }
}
