// OgmaNeo - Hierarchy (top-level orchestrator)
#![allow(clippy::needless_range_loop)]

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::compute::ComputeSystem;
use crate::decoder::{Decoder, VisibleLayerDesc as DecoderVLD};
use crate::encoder::{Encoder, EncoderType, Params as EncoderParams, VisibleLayerDesc as EncoderVLD};
use crate::error::{Error, Result};
use crate::helpers::*;
use crate::pooler::Pooler;
use crate::value_field::ValueField2D;

/// Structural descriptor for one input field.
///
/// Passed to [`Hierarchy::new`] and fixed thereafter.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct InputDesc {
    /// Size of the input field.
    pub size: Int2,
    /// Receptive field radius from this input up to layer 0's encoder.
    pub ff_radius: i32,
    /// Encoder weight rate for this input.
    pub ff_weight_alpha: f32,
    /// Decay of layer 0's trace of this input, 0 for none.
    pub ff_lambda: f32,
    /// Receptive field radius of the input predictor onto layer 0.
    pub p_radius: i32,
    /// Input predictor rate for weights reading layer 0's code.
    pub p_alpha: f32,
    /// Input predictor rate for weights reading the feedback from layer 1.
    pub p_beta: f32,
}

impl Default for InputDesc {
    fn default() -> Self {
        Self {
            size: Int2::new(4, 4),
            ff_radius: 8,
            ff_weight_alpha: 0.01,
            ff_lambda: 0.0,
            p_radius: 8,
            p_alpha: 0.02,
            p_beta: 0.02,
        }
    }
}

/// Structural descriptor for one encoding layer.
///
/// Passed to [`Hierarchy::new`] and fixed thereafter.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LayerDesc {
    pub hidden_size: Int2,
    pub encoder_type: EncoderType,
    /// Receptive field radius onto the layer below. Ignored by layer 0,
    /// which reads the inputs with their own `ff_radius`.
    pub ff_radius: i32,
    pub ff_weight_alpha: f32,
    /// Decay of the trace of the layer below. Ignored by layer 0.
    pub ff_lambda: f32,
    /// Frames of input history the encoder sees.
    pub num_samples: usize,
    pub bias_alpha: f32,
    pub init_weight_range: Float2,
    /// Ticks of this layer averaged into one input for the layer above.
    pub pool_steps: usize,
    /// Receptive field radius of this layer's predictor onto its own code.
    pub p_radius: i32,
    pub p_alpha: f32,
    pub p_beta: f32,
}

impl Default for LayerDesc {
    fn default() -> Self {
        Self {
            hidden_size: Int2::new(36, 36),
            encoder_type: EncoderType::default(),
            ff_radius: 4,
            ff_weight_alpha: 0.01,
            ff_lambda: 0.0,
            num_samples: 1,
            bias_alpha: 0.001,
            init_weight_range: INIT_WEIGHT_RANGE,
            pool_steps: 1,
            p_radius: 4,
            p_alpha: 0.02,
            p_beta: 0.02,
        }
    }
}

fn encoder_visible_descs(
    l: usize,
    input_descs: &[InputDesc],
    layer_descs: &[LayerDesc],
) -> Vec<EncoderVLD> {
    if l == 0 {
        input_descs
            .iter()
            .map(|d| EncoderVLD {
                size: d.size,
                radius: d.ff_radius,
                weight_alpha: d.ff_weight_alpha,
                lambda: d.ff_lambda,
            })
            .collect()
    } else {
        vec![EncoderVLD {
            size: layer_descs[l - 1].hidden_size,
            radius: layer_descs[l].ff_radius,
            weight_alpha: layer_descs[l].ff_weight_alpha,
            lambda: layer_descs[l].ff_lambda,
        }]
    }
}

// Own code, plus feedback from the layer above when there is one
fn decoder_visible_descs(
    l: usize,
    layer_descs: &[LayerDesc],
    radius: i32,
    alpha: f32,
    beta: f32,
) -> Vec<DecoderVLD> {
    let own = DecoderVLD {
        size: layer_descs[l].hidden_size,
        radius,
        rate: alpha,
    };

    if l + 1 < layer_descs.len() {
        vec![own.clone(), DecoderVLD { rate: beta, ..own }]
    } else {
        vec![own]
    }
}

fn encoder_params(desc: &LayerDesc) -> EncoderParams {
    EncoderParams {
        bias_alpha: desc.bias_alpha,
        init_weight_range: desc.init_weight_range,
        num_samples: desc.num_samples,
        ..EncoderParams::default()
    }
}

/// The top-level sparse predictive hierarchy.
///
/// Each layer owns an [`Encoder`] producing a chunked sparse code, a
/// [`Pooler`] averaging that code over time for the layer above, and the
/// [`Decoder`]s predicting the layer's next input. Layer 0 has one decoder
/// per input field; their outputs are the hierarchy's predictions.
///
/// # Usage
/// ```rust,no_run
/// use std::sync::Arc;
/// use ogmaneo::compute::ComputeSystem;
/// use ogmaneo::helpers::Int2;
/// use ogmaneo::hierarchy::{Hierarchy, InputDesc, LayerDesc};
/// use ogmaneo::value_field::ValueField2D;
///
/// let cs = Arc::new(ComputeSystem::cpu()?);
/// let input_descs = vec![InputDesc { size: Int2::new(4, 4), ..Default::default() }];
/// let layer_descs = vec![LayerDesc::default(); 2];
/// let mut h = Hierarchy::new(cs, &input_descs, &layer_descs, 1234)?;
///
/// let input = ValueField2D::with_value(Int2::new(4, 4), 1.0);
/// h.sim_step(&[input], true)?;
/// let prediction = &h.get_predictions()[0];
/// # Ok::<(), ogmaneo::Error>(())
/// ```
#[derive(Debug)]
pub struct Hierarchy {
    cs: Arc<ComputeSystem>,
    input_sizes: Vec<Int2>,
    encoders: Vec<Encoder>,
    poolers: Vec<Pooler>,
    // decoders[0] has one per input, each higher layer has one
    decoders: Vec<Vec<Decoder>>,
    predictions: Vec<ValueField2D>,
    /// Per-layer update flags: `true` if this layer encoded on the last step.
    updates: Vec<bool>,
}

impl Hierarchy {
    /// Validate the descriptors, then allocate and randomly initialise every
    /// layer from `seed`. Nothing is allocated if any descriptor is invalid.
    pub fn new(
        cs: Arc<ComputeSystem>,
        input_descs: &[InputDesc],
        layer_descs: &[LayerDesc],
        seed: u64,
    ) -> Result<Self> {
        Self::validate(input_descs, layer_descs)?;

        let num_layers = layer_descs.len();
        let mut state = rand_get_state(seed);

        let mut encoders = Vec::with_capacity(num_layers);
        let mut poolers = Vec::with_capacity(num_layers);
        let mut decoders = Vec::with_capacity(num_layers);

        for l in 0..num_layers {
            let desc = &layer_descs[l];

            encoders.push(Encoder::new(
                desc.hidden_size,
                desc.encoder_type,
                encoder_visible_descs(l, input_descs, layer_descs),
                encoder_params(desc),
                &mut state,
            )?);

            poolers.push(Pooler::new(desc.hidden_size, desc.pool_steps)?);

            if l == 0 {
                let mut layer_decoders = Vec::with_capacity(input_descs.len());
                for input in input_descs {
                    layer_decoders.push(Decoder::new(
                        input.size,
                        decoder_visible_descs(l, layer_descs, input.p_radius, input.p_alpha, input.p_beta),
                        &mut state,
                    )?);
                }
                decoders.push(layer_decoders);
            } else {
                decoders.push(vec![Decoder::new(
                    layer_descs[l - 1].hidden_size,
                    decoder_visible_descs(l, layer_descs, desc.p_radius, desc.p_alpha, desc.p_beta),
                    &mut state,
                )?]);
            }
        }

        tracing::debug!(
            inputs = input_descs.len(),
            layers = num_layers,
            seed,
            "hierarchy created"
        );

        Ok(Self {
            cs,
            input_sizes: input_descs.iter().map(|d| d.size).collect(),
            encoders,
            poolers,
            decoders,
            predictions: input_descs.iter().map(|d| ValueField2D::new(d.size)).collect(),
            updates: vec![false; num_layers],
        })
    }

    /// Check a full set of descriptors without allocating any layer.
    pub fn validate(input_descs: &[InputDesc], layer_descs: &[LayerDesc]) -> Result<()> {
        if input_descs.is_empty() {
            return Err(Error::Configuration("hierarchy needs at least one input".into()));
        }
        if layer_descs.is_empty() {
            return Err(Error::Configuration("hierarchy needs at least one layer".into()));
        }

        for l in 0..layer_descs.len() {
            let desc = &layer_descs[l];

            Encoder::validate(
                desc.hidden_size,
                &desc.encoder_type,
                &encoder_visible_descs(l, input_descs, layer_descs),
                &encoder_params(desc),
            )
            .map_err(|e| in_layer(l, e))?;

            if desc.pool_steps == 0 {
                return Err(in_layer(
                    l,
                    Error::Configuration("pool steps must be at least 1".into()),
                ));
            }

            if l == 0 {
                for input in input_descs {
                    Decoder::validate(
                        input.size,
                        &decoder_visible_descs(l, layer_descs, input.p_radius, input.p_alpha, input.p_beta),
                    )
                    .map_err(|e| in_layer(l, e))?;
                }
            } else {
                Decoder::validate(
                    layer_descs[l - 1].hidden_size,
                    &decoder_visible_descs(l, layer_descs, desc.p_radius, desc.p_alpha, desc.p_beta),
                )
                .map_err(|e| in_layer(l, e))?;
            }
        }

        Ok(())
    }

    /// Run one simulation step.
    ///
    /// `inputs` must match the declared inputs in count and size; otherwise
    /// an error is returned and no state is touched. The encode pass runs
    /// bottom to top, then the predict pass top to bottom.
    #[tracing::instrument(level = "trace", skip_all, fields(learn = learn))]
    pub fn sim_step(&mut self, inputs: &[ValueField2D], learn: bool) -> Result<()> {
        if inputs.len() != self.input_sizes.len() {
            return Err(Error::InputCount {
                expected: self.input_sizes.len(),
                got: inputs.len(),
            });
        }
        for (index, (input, &expected)) in inputs.iter().zip(&self.input_sizes).enumerate() {
            if input.get_size() != expected {
                return Err(Error::ShapeMismatch {
                    index,
                    expected,
                    got: input.get_size(),
                });
            }
        }

        let num_layers = self.encoders.len();
        let cs = &*self.cs;

        // --- Encode pass ---
        let mut update = true;

        for l in 0..num_layers {
            self.updates[l] = update;
            if !update {
                continue;
            }

            let layer_inputs: Vec<&[f32]> = if l == 0 {
                inputs.iter().map(|f| f.data()).collect()
            } else {
                vec![self.poolers[l - 1].get_pooled()]
            };

            self.encoders[l].activate(cs, &layer_inputs);
            if learn {
                self.encoders[l].learn(cs);
            }

            update = self.poolers[l].accumulate(cs, self.encoders[l].get_hidden_states());
        }

        // --- Predict pass ---
        for l in (0..num_layers).rev() {
            if !self.updates[l] {
                continue;
            }

            let (lower, upper) = self.decoders.split_at_mut(l + 1);
            let mut visible: Vec<&[f32]> = vec![self.encoders[l].get_hidden_states()];
            if let Some(above) = upper.first() {
                visible.push(above[0].get_hidden_predictions());
            }

            for (i, dec) in lower[l].iter_mut().enumerate() {
                let target = if l == 0 {
                    inputs[i].data()
                } else {
                    self.poolers[l - 1].get_pooled()
                };

                if learn {
                    dec.learn(cs, target);
                }
                dec.activate(cs, &visible);
            }
        }

        for (field, dec) in self.predictions.iter_mut().zip(&self.decoders[0]) {
            field.data_mut().copy_from_slice(dec.get_hidden_predictions());
        }

        tracing::trace!(updates = ?self.updates, "step complete");

        Ok(())
    }

    /// Predictions of the next input, one field per input.
    pub fn get_predictions(&self) -> &[ValueField2D] {
        &self.predictions
    }

    /// Reset codes, pooling windows and predictions. Weights and biases are kept.
    pub fn clear_memory(&mut self) {
        for enc in &mut self.encoders {
            enc.clear_memory();
        }
        for pooler in &mut self.poolers {
            pooler.clear_memory();
        }
        for dec in self.decoders.iter_mut().flatten() {
            dec.clear_memory();
        }
        for field in &mut self.predictions {
            field.fill(0.0);
        }
        self.updates.fill(false);
    }

    pub fn get_num_layers(&self) -> usize {
        self.encoders.len()
    }

    pub fn get_num_inputs(&self) -> usize {
        self.input_sizes.len()
    }

    pub fn get_input_sizes(&self) -> &[Int2] {
        &self.input_sizes
    }

    /// Whether layer `l` encoded on the last step.
    pub fn get_update(&self, l: usize) -> bool {
        self.updates[l]
    }

    pub fn get_encoder(&self, l: usize) -> &Encoder {
        &self.encoders[l]
    }

    pub fn get_pooler(&self, l: usize) -> &Pooler {
        &self.poolers[l]
    }

    /// Predictor `i` of layer `l`. Layer 0 has one per input, higher layers one.
    pub fn get_decoder(&self, l: usize, i: usize) -> &Decoder {
        &self.decoders[l][i]
    }

    pub fn get_compute_system(&self) -> &Arc<ComputeSystem> {
        &self.cs
    }
}

fn in_layer(l: usize, e: Error) -> Error {
    match e {
        Error::Configuration(msg) => Error::Configuration(format!("layer {l}: {msg}")),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compute::DeviceType;

    fn cs() -> Arc<ComputeSystem> {
        Arc::new(ComputeSystem::new(DeviceType::Cpu, 2).unwrap())
    }

    fn small_layers(n: usize) -> Vec<LayerDesc> {
        vec![
            LayerDesc {
                hidden_size: Int2::new(8, 8),
                encoder_type: EncoderType::Chunk {
                    chunk_size: Int2::new(4, 4),
                    gamma: 0.5,
                },
                ff_radius: 2,
                p_radius: 2,
                ..LayerDesc::default()
            };
            n
        ]
    }

    #[test]
    fn decoders_are_wired_to_sizes() {
        let inputs = vec![
            InputDesc { size: Int2::new(4, 4), ..InputDesc::default() },
            InputDesc { size: Int2::new(2, 3), ..InputDesc::default() },
        ];
        let h = Hierarchy::new(cs(), &inputs, &small_layers(2), 1).unwrap();

        assert_eq!(h.get_decoder(0, 0).get_hidden_size(), Int2::new(4, 4));
        assert_eq!(h.get_decoder(0, 1).get_hidden_size(), Int2::new(2, 3));
        assert_eq!(h.get_decoder(0, 0).get_num_visible_layers(), 2);
        assert_eq!(h.get_decoder(1, 0).get_hidden_size(), Int2::new(8, 8));
        assert_eq!(h.get_decoder(1, 0).get_num_visible_layers(), 1);
        assert_eq!(h.get_encoder(0).get_num_visible_layers(), 2);
        assert_eq!(h.get_predictions()[1].get_size(), Int2::new(2, 3));
    }

    #[test]
    fn pooling_slows_the_layer_above() {
        let mut layers = small_layers(3);
        layers[0].pool_steps = 2;
        let mut h = Hierarchy::new(cs(), &[InputDesc::default()], &layers, 1).unwrap();
        let input = ValueField2D::with_value(Int2::new(4, 4), 0.5);

        for step in 1..=6 {
            h.sim_step(&[input.clone()], true).unwrap();
            assert!(h.get_update(0));
            assert_eq!(h.get_update(1), step % 2 == 0);
            assert_eq!(h.get_update(2), step % 2 == 0);
        }
    }

    #[test]
    fn zero_pool_steps_fails_validation() {
        let mut layers = small_layers(2);
        layers[1].pool_steps = 0;
        let err = Hierarchy::new(cs(), &[InputDesc::default()], &layers, 1).unwrap_err();
        assert!(matches!(err, Error::Configuration(msg) if msg.starts_with("layer 1")));
    }

    #[test]
    fn oversized_radius_fails_validation() {
        let input = InputDesc { ff_radius: 40000, ..InputDesc::default() };
        let err = Hierarchy::new(cs(), &[input], &small_layers(2), 1).unwrap_err();
        assert!(matches!(err, Error::Configuration(msg) if msg.starts_with("layer 0")));

        let mut layers = small_layers(2);
        layers[1].p_radius = i32::MAX;
        let err = Hierarchy::new(cs(), &[InputDesc::default()], &layers, 1).unwrap_err();
        assert!(matches!(err, Error::Configuration(msg) if msg.starts_with("layer 1")));
    }

    #[test]
    fn traces_and_samples_reach_the_encoders() {
        let input = InputDesc { ff_lambda: 0.5, ..InputDesc::default() };
        let mut layers = small_layers(2);
        layers[1].num_samples = 2;
        layers[1].ff_lambda = 0.25;
        let h = Hierarchy::new(cs(), &[input], &layers, 1).unwrap();

        assert_eq!(h.get_encoder(0).get_visible_layer_desc(0).lambda, 0.5);
        assert_eq!(h.get_encoder(0).get_num_samples(), 1);
        assert_eq!(h.get_encoder(1).get_visible_layer_desc(0).lambda, 0.25);
        assert_eq!(h.get_encoder(1).get_num_samples(), 2);
        assert_eq!(h.get_encoder(1).get_visible_layer(0).get_samples().len(), 2 * 64);
    }

    #[test]
    fn empty_descriptor_lists_fail() {
        assert!(Hierarchy::new(cs(), &[], &small_layers(1), 1).is_err());
        assert!(Hierarchy::new(cs(), &[InputDesc::default()], &[], 1).is_err());
    }

    #[test]
    fn wrong_input_count_is_rejected() {
        let mut h = Hierarchy::new(cs(), &[InputDesc::default()], &small_layers(1), 1).unwrap();
        let err = h.sim_step(&[], true).unwrap_err();
        assert_eq!(err, Error::InputCount { expected: 1, got: 0 });
        assert!(!h.get_update(0));
    }
}
