// OgmaNeo - Decoder (top-down dense prediction with normalised delta learning)
#![allow(clippy::needless_range_loop)]

use rayon::prelude::*;

use crate::compute::ComputeSystem;
use crate::error::{Error, Result};
use crate::helpers::*;

#[derive(Clone, Debug, PartialEq)]
pub struct VisibleLayerDesc {
    pub size: Int2,
    pub radius: i32,
    /// Learning rate of the weights reading this layer.
    pub rate: f32,
}

impl Default for VisibleLayerDesc {
    fn default() -> Self {
        Self {
            size: Int2::new(36, 36),
            radius: 8,
            rate: 0.02,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct VisibleLayer {
    // diam * diam weights per hidden cell, cell-major
    pub weights: FloatBuffer,
    inputs_prev: FloatBuffer,
    h_to_v: Float2,
}

impl VisibleLayer {
    /// Inputs seen by the last activation.
    pub fn get_inputs_prev(&self) -> &[f32] {
        &self.inputs_prev
    }
}

// Result of one cell's forward pass
struct ForwardResult {
    prediction: f32,
    norm: f32,
}

/// Predicts a dense field from the sparse code of its layer and, below the
/// top of the hierarchy, the prediction coming down from the layer above.
#[derive(Clone, Debug)]
pub struct Decoder {
    hidden_size: Int2,
    hidden_predictions: FloatBuffer,
    // sum of squared inputs over each cell's receptive fields
    hidden_norms: FloatBuffer,
    visible_layers: Vec<VisibleLayer>,
    visible_layer_descs: Vec<VisibleLayerDesc>,
}

impl Decoder {
    pub fn validate(hidden_size: Int2, visible_layer_descs: &[VisibleLayerDesc]) -> Result<()> {
        if hidden_size.x <= 0 || hidden_size.y <= 0 {
            return Err(Error::Configuration(format!(
                "prediction size must be positive, got {hidden_size}"
            )));
        }
        if visible_layer_descs.is_empty() {
            return Err(Error::Configuration(
                "decoder needs at least one visible layer".into(),
            ));
        }
        for vld in visible_layer_descs {
            if vld.size.x <= 0 || vld.size.y <= 0 {
                return Err(Error::Configuration(format!(
                    "visible layer size must be positive, got {}",
                    vld.size
                )));
            }
            field_row_len("prediction", vld.radius, hidden_size, vld.size, 1)?;
            if !vld.rate.is_finite() || vld.rate < 0.0 {
                return Err(Error::Configuration(format!(
                    "prediction rate must be finite and non-negative, got {}",
                    vld.rate
                )));
            }
        }

        Ok(())
    }

    pub fn new(
        hidden_size: Int2,
        visible_layer_descs: Vec<VisibleLayerDesc>,
        state: &mut u64,
    ) -> Result<Self> {
        Self::validate(hidden_size, &visible_layer_descs)?;

        let num_hidden = hidden_size.area();

        let mut visible_layers = Vec::with_capacity(visible_layer_descs.len());
        for vld in &visible_layer_descs {
            let area = field_row_len("prediction", vld.radius, hidden_size, vld.size, 1)?;

            visible_layers.push(VisibleLayer {
                weights: random_buffer(num_hidden * area, INIT_WEIGHT_RANGE, state),
                inputs_prev: vec![0.0; vld.size.area()],
                h_to_v: scalars_between(hidden_size, vld.size),
            });
        }

        Ok(Self {
            hidden_size,
            hidden_predictions: vec![0.0; num_hidden],
            hidden_norms: vec![0.0; num_hidden],
            visible_layers,
            visible_layer_descs,
        })
    }

    fn compute_forward(&self, hidden_index: usize) -> ForwardResult {
        let hidden_pos = position2(hidden_index, self.hidden_size);

        let mut prediction = 0.0f32;
        let mut norm = 0.0f32;

        for vli in 0..self.visible_layers.len() {
            let vl = &self.visible_layers[vli];
            let vld = &self.visible_layer_descs[vli];

            let diam = vld.radius * 2 + 1;
            let area = (diam * diam) as usize;
            let bounds = FieldBounds::new(hidden_pos, vl.h_to_v, vld.size, vld.radius);
            let row = &vl.weights[hidden_index * area..(hidden_index + 1) * area];

            for ix in bounds.iter_lower.x..=bounds.iter_upper.x {
                for iy in bounds.iter_lower.y..=bounds.iter_upper.y {
                    let x = vl.inputs_prev[address2(Int2::new(ix, iy), vld.size)];
                    let wi = window_offset(Int2::new(ix - bounds.lower.x, iy - bounds.lower.y), diam);

                    prediction += row[wi] * x;
                    norm += x * x;
                }
            }
        }

        ForwardResult { prediction, norm }
    }

    /// Predict every cell from `inputs`, one buffer per visible layer. The
    /// inputs are kept for the next [`learn`](Self::learn).
    pub fn activate(&mut self, cs: &ComputeSystem, inputs: &[&[f32]]) {
        debug_assert_eq!(inputs.len(), self.visible_layers.len());

        for (vl, input) in self.visible_layers.iter_mut().zip(inputs) {
            vl.inputs_prev.copy_from_slice(input);
        }

        cs.install(|| {
            let results: Vec<ForwardResult> = (0..self.hidden_size.area())
                .into_par_iter()
                .map(|i| self.compute_forward(i))
                .collect();

            for (i, res) in results.into_iter().enumerate() {
                self.hidden_predictions[i] = res.prediction;
                self.hidden_norms[i] = res.norm;
            }
        });
    }

    /// Correct the weights behind the last prediction toward `targets`.
    pub fn learn(&mut self, cs: &ComputeSystem, targets: &[f32]) {
        debug_assert_eq!(targets.len(), self.hidden_predictions.len());

        cs.install(|| {
            let hidden_size = self.hidden_size;

            // error scaled by the inverse input energy, zero for silent cells
            let deltas: FloatBuffer = self
                .hidden_predictions
                .par_iter()
                .zip(self.hidden_norms.par_iter())
                .zip(targets.par_iter())
                .map(|((&prediction, &norm), &target)| {
                    if norm < LIMIT_SMALL {
                        0.0
                    } else {
                        (target - prediction) / norm
                    }
                })
                .collect();

            for (vli, vl) in self.visible_layers.iter_mut().enumerate() {
                let vld = &self.visible_layer_descs[vli];
                let diam = vld.radius * 2 + 1;
                let area = (diam * diam) as usize;
                let h_to_v = vl.h_to_v;
                let inputs_prev = &vl.inputs_prev;

                vl.weights
                    .par_chunks_mut(area)
                    .enumerate()
                    .for_each(|(hidden_index, row)| {
                        let delta = vld.rate * deltas[hidden_index];
                        if delta == 0.0 {
                            return;
                        }

                        let hidden_pos = position2(hidden_index, hidden_size);
                        let bounds = FieldBounds::new(hidden_pos, h_to_v, vld.size, vld.radius);

                        for ix in bounds.iter_lower.x..=bounds.iter_upper.x {
                            for iy in bounds.iter_lower.y..=bounds.iter_upper.y {
                                let x = inputs_prev[address2(Int2::new(ix, iy), vld.size)];
                                let wi = window_offset(
                                    Int2::new(ix - bounds.lower.x, iy - bounds.lower.y),
                                    diam,
                                );
                                row[wi] += delta * x;
                            }
                        }
                    });
            }
        });
    }

    pub fn clear_memory(&mut self) {
        self.hidden_predictions.fill(0.0);
        self.hidden_norms.fill(0.0);

        for vl in &mut self.visible_layers {
            vl.inputs_prev.fill(0.0);
        }
    }

    pub fn get_hidden_predictions(&self) -> &[f32] {
        &self.hidden_predictions
    }

    pub fn get_hidden_size(&self) -> Int2 {
        self.hidden_size
    }

    pub fn get_num_visible_layers(&self) -> usize {
        self.visible_layers.len()
    }

    pub fn get_visible_layer(&self, i: usize) -> &VisibleLayer {
        &self.visible_layers[i]
    }

    pub fn get_visible_layer_desc(&self, i: usize) -> &VisibleLayerDesc {
        &self.visible_layer_descs[i]
    }
}
