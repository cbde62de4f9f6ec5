//! Layer summaries
//!
//! A [`ModelSummary`] lists every layer with its output shape and parameter
//! count for a fixed input, followed by totals and a memory estimate in the
//! layout popularised by `torchsummary`.

mod render;

use serde::Serialize;

use crate::neural::input_shape::InputShape;
use crate::Result;

pub use render::OutputFormat;

/// Batch size of the zero tensor fed through the model
pub const SUMMARY_BATCH_SIZE: i64 = 2;

const BYTES_PER_VALUE: f64 = 4.0;
const MIB: f64 = 1024.0 * 1024.0;

/// Anything that can describe its layers for a given input shape
pub trait Summarize {
    fn summarize(&self, input_shape: InputShape) -> Result<ModelSummary>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LayerRow {
    /// `Type-index`, e.g. `Conv2d-1`
    pub name: String,
    /// Dotted module path inside the model
    pub path: String,
    pub layer_type: String,
    /// Output size with the batch dimension shown as -1
    pub output_shape: Option<Vec<i64>>,
    pub params: i64,
    pub trainable_params: i64,
}

impl LayerRow {
    /// Replace the leading batch dimension with -1.
    pub fn unbatched(size: &[i64]) -> Vec<i64> {
        let mut shape = size.to_vec();
        if let Some(batch) = shape.first_mut() {
            *batch = -1;
        }
        shape
    }

    /// Elements per sample produced by this layer
    fn output_numel(&self) -> i64 {
        self.output_shape
            .as_ref()
            .map(|shape| shape.iter().skip(1).product::<i64>())
            .unwrap_or(0)
    }
}

/// Memory estimate in MiB, assuming 32-bit values
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SizeEstimate {
    pub input_mb: f64,
    pub forward_backward_mb: f64,
    pub params_mb: f64,
    pub total_mb: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelSummary {
    pub input_shape: InputShape,
    pub batch_size: i64,
    pub rows: Vec<LayerRow>,
    pub total_params: i64,
    pub trainable_params: i64,
    pub size: SizeEstimate,
}

impl ModelSummary {
    pub fn new(input_shape: InputShape, rows: Vec<LayerRow>) -> Self {
        let total_params: i64 = rows.iter().map(|row| row.params).sum();
        let trainable_params: i64 = rows.iter().map(|row| row.trainable_params).sum();
        let total_output: i64 = rows.iter().map(LayerRow::output_numel).sum();

        let input_mb = input_shape.numel() as f64 * BYTES_PER_VALUE / MIB;
        // forward and backward activations
        let forward_backward_mb = 2.0 * total_output as f64 * BYTES_PER_VALUE / MIB;
        let params_mb = total_params as f64 * BYTES_PER_VALUE / MIB;

        Self {
            input_shape,
            batch_size: SUMMARY_BATCH_SIZE,
            rows,
            total_params,
            trainable_params,
            size: SizeEstimate {
                input_mb,
                forward_backward_mb,
                params_mb,
                total_mb: input_mb + forward_backward_mb + params_mb,
            },
        }
    }

    pub fn non_trainable_params(&self) -> i64 {
        self.total_params - self.trainable_params
    }
}
