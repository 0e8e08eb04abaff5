//! The time-series provider boundary consumed by training and the
//! coordinator's worker loop.
//!
//! SPEC_FULL.md §6 specifies only the trait boundary; concrete
//! file-format loaders and normalizers are out of scope. `InMemoryProvider`
//! is the reference implementation used as a test fixture for the §8
//! end-to-end scenarios, grounded on the teacher's `ndarray`-shaped tensor
//! boundary (`src/tensor/*`) generalized from dense `f32` tensors to the
//! `[channels][series_length]` `f64` slices this crate's genomes consume.

use crate::errors::{EngineError, EngineResult};
use ndarray::Array2;

/// A source of labeled time series for training and validation, with
/// per-channel min/max available for external normalization.
pub trait TimeSeriesProvider {
    /// Number of series available.
    fn number_series(&self) -> usize;

    /// Input parameter names, in the fixed order used for every exported
    /// `[channels][series_length]` input tensor.
    fn input_parameter_names(&self) -> &[String];

    /// Output parameter names, in the fixed order used for every exported
    /// output tensor.
    fn output_parameter_names(&self) -> &[String];

    /// (min, max) for an input channel, for min-max normalization:
    /// `(raw - min) / (max - min)`.
    fn input_range(&self, channel: usize) -> (f64, f64);

    /// (min, max) for an output channel.
    fn output_range(&self, channel: usize) -> (f64, f64);

    /// Exports series `index` as `(inputs, outputs)`, each
    /// `[channels][series_length]`. All series exported from one provider
    /// instance must share the same `series_length`.
    fn export(&self, index: usize) -> EngineResult<(Array2<f64>, Array2<f64>)>;
}

/// A small in-memory `TimeSeriesProvider` over pre-sliced `ndarray` tensors,
/// used as the reference implementation and as the fixture for the
/// coordinator-driving end-to-end tests.
pub struct InMemoryProvider {
    input_names: Vec<String>,
    output_names: Vec<String>,
    series: Vec<(Array2<f64>, Array2<f64>)>,
}

impl InMemoryProvider {
    pub fn new(input_names: Vec<String>, output_names: Vec<String>, series: Vec<(Array2<f64>, Array2<f64>)>) -> EngineResult<Self> {
        for (inputs, outputs) in &series {
            if inputs.nrows() != input_names.len() {
                return Err(EngineError::Configuration(format!(
                    "input series has {} channels, expected {}",
                    inputs.nrows(),
                    input_names.len()
                )));
            }
            if outputs.nrows() != output_names.len() {
                return Err(EngineError::Configuration(format!(
                    "output series has {} channels, expected {}",
                    outputs.nrows(),
                    output_names.len()
                )));
            }
            if inputs.ncols() != outputs.ncols() {
                return Err(EngineError::Configuration("input/output series length mismatch".into()));
            }
        }
        Ok(InMemoryProvider { input_names, output_names, series })
    }

    /// Normalizes every series in place with per-channel min-max scaling,
    /// per SPEC_FULL.md §6's `(raw - min) / (max - min)` rule.
    pub fn normalize(&mut self) {
        let input_ranges: Vec<(f64, f64)> = (0..self.input_names.len()).map(|c| self.channel_min_max(c, true)).collect();
        let output_ranges: Vec<(f64, f64)> = (0..self.output_names.len()).map(|c| self.channel_min_max(c, false)).collect();

        for (inputs, outputs) in self.series.iter_mut() {
            for (c, &(min, max)) in input_ranges.iter().enumerate() {
                let span = (max - min).max(1e-12);
                for v in inputs.row_mut(c) {
                    *v = (*v - min) / span;
                }
            }
            for (c, &(min, max)) in output_ranges.iter().enumerate() {
                let span = (max - min).max(1e-12);
                for v in outputs.row_mut(c) {
                    *v = (*v - min) / span;
                }
            }
        }
    }

    fn channel_min_max(&self, channel: usize, is_input: bool) -> (f64, f64) {
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        for (inputs, outputs) in &self.series {
            let row = if is_input { inputs.row(channel) } else { outputs.row(channel) };
            for &v in row.iter() {
                min = min.min(v);
                max = max.max(v);
            }
        }
        (min, max)
    }
}

impl TimeSeriesProvider for InMemoryProvider {
    fn number_series(&self) -> usize {
        self.series.len()
    }

    fn input_parameter_names(&self) -> &[String] {
        &self.input_names
    }

    fn output_parameter_names(&self) -> &[String] {
        &self.output_names
    }

    fn input_range(&self, channel: usize) -> (f64, f64) {
        self.channel_min_max(channel, true)
    }

    fn output_range(&self, channel: usize) -> (f64, f64) {
        self.channel_min_max(channel, false)
    }

    fn export(&self, index: usize) -> EngineResult<(Array2<f64>, Array2<f64>)> {
        self.series
            .get(index)
            .cloned()
            .ok_or_else(|| EngineError::Configuration(format!("series index {index} out of range")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_provider() -> InMemoryProvider {
        let inputs = Array2::from_shape_vec((1, 4), vec![0.0, 5.0, 10.0, 5.0]).unwrap();
        let outputs = Array2::from_shape_vec((1, 4), vec![1.0, 1.0, 1.0, 1.0]).unwrap();
        InMemoryProvider::new(vec!["x".to_string()], vec!["y".to_string()], vec![(inputs, outputs)]).unwrap()
    }

    #[test]
    fn rejects_mismatched_channel_counts() {
        let inputs = Array2::from_shape_vec((2, 4), vec![0.0; 8]).unwrap();
        let outputs = Array2::from_shape_vec((1, 4), vec![0.0; 4]).unwrap();
        let result = InMemoryProvider::new(vec!["x".to_string()], vec!["y".to_string()], vec![(inputs, outputs)]);
        assert!(result.is_err());
    }

    #[test]
    fn normalize_scales_into_unit_range() {
        let mut provider = sample_provider();
        provider.normalize();
        let (inputs, _) = provider.export(0).unwrap();
        assert!((inputs[[0, 0]] - 0.0).abs() < 1e-9);
        assert!((inputs[[0, 2]] - 1.0).abs() < 1e-9);
    }

    #[test]
    fn export_rejects_out_of_range_index() {
        let provider = sample_provider();
        assert!(provider.export(5).is_err());
    }
}
