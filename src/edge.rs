//! Forward and recurrent edges connecting nodes within a genome.
//!
//! Grounded on the edge-propagation semantics implied by
//! `examples/original_source/rnn/rnn.cxx`'s forward/backward passes.

use serde::{Deserialize, Serialize};

fn full_dropout_scale() -> f64 {
    1.0
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForwardEdge {
    pub innovation_number: i64,
    pub input_innovation: i64,
    pub output_innovation: i64,
    pub weight: f64,
    pub enabled: bool,
    #[serde(skip)]
    pub forward_reachable: bool,
    #[serde(skip)]
    pub backward_reachable: bool,
    #[serde(skip)]
    pub grad_accum: f64,
    /// Dropout scale applied on top of `weight` during training: 0.0 when
    /// the edge is dropped for the current series, `1/(1-p)` when kept, 1.0
    /// outside of training. Reset around every `forward_pass`/`backward_pass`
    /// pair by the caller.
    #[serde(skip, default = "full_dropout_scale")]
    pub dropout_scale: f64,
}

impl ForwardEdge {
    pub fn new(innovation_number: i64, input_innovation: i64, output_innovation: i64, weight: f64) -> Self {
        ForwardEdge {
            innovation_number,
            input_innovation,
            output_innovation,
            weight,
            enabled: true,
            forward_reachable: false,
            backward_reachable: false,
            grad_accum: 0.0,
            dropout_scale: 1.0,
        }
    }

    pub fn is_live(&self) -> bool {
        self.enabled && self.forward_reachable && self.backward_reachable
    }

    /// Forward-propagates the source's activation at `time`, scaled by the
    /// edge weight and the current dropout scale.
    pub fn propagate_forward(&self, time: usize, source_activation: f64) -> f64 {
        let _ = time;
        self.weight * self.dropout_scale * source_activation
    }

    pub fn propagate_backward(&self, delta: f64) -> f64 {
        self.weight * self.dropout_scale * delta
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecurrentEdge {
    pub innovation_number: i64,
    pub input_innovation: i64,
    pub output_innovation: i64,
    pub weight: f64,
    pub delay: i32,
    pub enabled: bool,
    #[serde(skip)]
    pub forward_reachable: bool,
    #[serde(skip)]
    pub backward_reachable: bool,
    #[serde(skip)]
    pub grad_accum: f64,
}

impl RecurrentEdge {
    pub fn new(innovation_number: i64, input_innovation: i64, output_innovation: i64, weight: f64, delay: i32) -> Self {
        RecurrentEdge {
            innovation_number,
            input_innovation,
            output_innovation,
            weight,
            delay,
            enabled: true,
            forward_reachable: false,
            backward_reachable: false,
            grad_accum: 0.0,
        }
    }

    pub fn is_live(&self) -> bool {
        self.enabled && self.forward_reachable && self.backward_reachable
    }

    /// The source time step feeding `dest_time`, or `None` if it precedes
    /// the start of the series (contributes nothing, but the destination's
    /// fan-in is still pre-incremented via the "first propagate" prelude).
    pub fn source_time(&self, dest_time: usize) -> Option<usize> {
        dest_time.checked_sub(self.delay as usize)
    }

    pub fn propagate_forward(&self, source_activation: f64) -> f64 {
        self.weight * source_activation
    }

    pub fn propagate_backward(&self, delta: f64) -> f64 {
        self.weight * delta
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recurrent_edge_source_time_respects_delay() {
        let e = RecurrentEdge::new(0, 1, 2, 1.0, 3);
        assert_eq!(e.source_time(5), Some(2));
        assert_eq!(e.source_time(2), None);
        assert_eq!(e.source_time(3), Some(0));
    }
}
