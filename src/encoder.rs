// OgmaNeo - Encoder (chunked winner-take-all sparse features)
#![allow(clippy::needless_range_loop)]

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::compute::ComputeSystem;
use crate::error::{Error, Result};
use crate::helpers::*;

/// Sparse feature strategy of a layer, fixed when the layer is declared.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", deny_unknown_fields)]
pub enum EncoderType {
    /// Dot-product activation; every unit of the winning chunk learns,
    /// weighted by `exp(-gamma * d^2)` of its distance to the winner.
    Chunk { chunk_size: Int2, gamma: f32 },
    /// Negative mean squared distance to the weight prototype; only the
    /// winner learns.
    Distance { chunk_size: Int2 },
}

impl Default for EncoderType {
    fn default() -> Self {
        Self::Chunk {
            chunk_size: Int2::new(6, 6),
            gamma: 0.5,
        }
    }
}

impl EncoderType {
    pub fn chunk_size(&self) -> Int2 {
        match *self {
            Self::Chunk { chunk_size, .. } | Self::Distance { chunk_size } => chunk_size,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct VisibleLayerDesc {
    pub size: Int2,
    pub radius: i32,
    pub weight_alpha: f32,
    /// Decay of the input trace, 0 feeds the raw input through.
    pub lambda: f32,
}

impl Default for VisibleLayerDesc {
    fn default() -> Self {
        Self {
            size: Int2::new(4, 4),
            radius: 2,
            weight_alpha: 0.01,
            lambda: 0.0,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct VisibleLayer {
    // diam * diam * num_samples weights per hidden unit, unit-major,
    // sample-major within a unit
    pub weights: FloatBuffer,
    trace: FloatBuffer,
    // num_samples frames of the trace, newest first
    samples: FloatBuffer,
    h_to_v: Float2,
    diam: i32,
    area: usize,
}

impl VisibleLayer {
    pub fn get_trace(&self) -> &[f32] {
        &self.trace
    }

    pub fn get_samples(&self) -> &[f32] {
        &self.samples
    }
}

#[derive(Clone, Debug)]
pub struct Params {
    pub bias_alpha: f32,
    /// Biases are clamped to `[-bias_limit, bias_limit]`.
    pub bias_limit: f32,
    pub init_weight_range: Float2,
    /// Frames of input history each unit sees.
    pub num_samples: usize,
}

impl Default for Params {
    fn default() -> Self {
        Self {
            bias_alpha: 0.001,
            bias_limit: BIAS_LIMIT,
            init_weight_range: INIT_WEIGHT_RANGE,
            num_samples: 1,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Encoder {
    hidden_size: Int2,
    encoder_type: EncoderType,
    params: Params,
    hidden_activations: FloatBuffer,
    hidden_states: FloatBuffer,
    hidden_biases: FloatBuffer,
    chunk_winners: Vec<usize>,
    visible_layers: Vec<VisibleLayer>,
    visible_layer_descs: Vec<VisibleLayerDesc>,
}

fn check_rate(name: &str, value: f32) -> Result<()> {
    if !value.is_finite() || value < 0.0 {
        return Err(Error::Configuration(format!(
            "{name} must be finite and non-negative, got {value}"
        )));
    }
    Ok(())
}

impl Encoder {
    /// Check a layer configuration without allocating anything.
    pub fn validate(
        hidden_size: Int2,
        encoder_type: &EncoderType,
        visible_layer_descs: &[VisibleLayerDesc],
        params: &Params,
    ) -> Result<()> {
        let chunk_size = encoder_type.chunk_size();

        if hidden_size.x <= 0 || hidden_size.y <= 0 {
            return Err(Error::Configuration(format!(
                "hidden size must be positive, got {hidden_size}"
            )));
        }
        if chunk_size.x <= 0 || chunk_size.y <= 0 {
            return Err(Error::Configuration(format!(
                "chunk size must be positive, got {chunk_size}"
            )));
        }
        if hidden_size.x % chunk_size.x != 0 || hidden_size.y % chunk_size.y != 0 {
            return Err(Error::Configuration(format!(
                "chunk size {chunk_size} does not evenly divide hidden size {hidden_size}"
            )));
        }
        if let EncoderType::Chunk { gamma, .. } = encoder_type {
            check_rate("gamma", *gamma)?;
        }
        if params.num_samples == 0 {
            return Err(Error::Configuration(
                "number of samples must be at least 1".into(),
            ));
        }
        if visible_layer_descs.is_empty() {
            return Err(Error::Configuration(
                "encoder needs at least one visible layer".into(),
            ));
        }
        for vld in visible_layer_descs {
            if vld.size.x <= 0 || vld.size.y <= 0 {
                return Err(Error::Configuration(format!(
                    "visible layer size must be positive, got {}",
                    vld.size
                )));
            }
            field_row_len(
                "feed-forward",
                vld.radius,
                hidden_size,
                vld.size,
                params.num_samples,
            )?;
            check_rate("weight alpha", vld.weight_alpha)?;
            if !(0.0..1.0).contains(&vld.lambda) {
                return Err(Error::Configuration(format!(
                    "trace lambda must be in [0, 1), got {}",
                    vld.lambda
                )));
            }
        }
        check_rate("bias alpha", params.bias_alpha)?;
        check_rate("bias limit", params.bias_limit)?;

        let range = params.init_weight_range;
        if !range.x.is_finite() || !range.y.is_finite() || range.x > range.y {
            return Err(Error::Configuration(format!(
                "initial weight range ({}, {}) is invalid",
                range.x, range.y
            )));
        }

        Ok(())
    }

    pub fn new(
        hidden_size: Int2,
        encoder_type: EncoderType,
        visible_layer_descs: Vec<VisibleLayerDesc>,
        params: Params,
        state: &mut u64,
    ) -> Result<Self> {
        Self::validate(hidden_size, &encoder_type, &visible_layer_descs, &params)?;

        let num_hidden = hidden_size.area();
        let chunk_size = encoder_type.chunk_size();
        let num_chunks =
            Int2::new(hidden_size.x / chunk_size.x, hidden_size.y / chunk_size.y).area();

        let mut visible_layers = Vec::with_capacity(visible_layer_descs.len());
        for vld in &visible_layer_descs {
            let row_len = field_row_len(
                "feed-forward",
                vld.radius,
                hidden_size,
                vld.size,
                params.num_samples,
            )?;
            let diam = vld.radius * 2 + 1;
            let num_visible = vld.size.area();

            visible_layers.push(VisibleLayer {
                weights: random_buffer(num_hidden * row_len, params.init_weight_range, state),
                trace: vec![0.0; num_visible],
                samples: vec![0.0; num_visible * params.num_samples],
                h_to_v: scalars_between(hidden_size, vld.size),
                diam,
                area: (diam * diam) as usize,
            });
        }

        tracing::debug!(
            hidden = %hidden_size,
            chunk = %chunk_size,
            num_chunks,
            num_samples = params.num_samples,
            visible_layers = visible_layer_descs.len(),
            "encoder created"
        );

        Ok(Self {
            hidden_size,
            encoder_type,
            params,
            hidden_activations: vec![0.0; num_hidden],
            hidden_states: vec![0.0; num_hidden],
            hidden_biases: vec![0.0; num_hidden],
            chunk_winners: vec![0; num_chunks],
            visible_layers,
            visible_layer_descs,
        })
    }

    fn chunks_dims(&self) -> Int2 {
        let chunk_size = self.encoder_type.chunk_size();
        Int2::new(
            self.hidden_size.x / chunk_size.x,
            self.hidden_size.y / chunk_size.y,
        )
    }

    fn chunk_of(&self, hidden_index: usize) -> usize {
        let chunk_size = self.encoder_type.chunk_size();
        let pos = position2(hidden_index, self.hidden_size);
        address2(
            Int2::new(pos.x / chunk_size.x, pos.y / chunk_size.y),
            self.chunks_dims(),
        )
    }

    fn compute_activation(&self, hidden_index: usize) -> f32 {
        let hidden_pos = position2(hidden_index, self.hidden_size);
        let num_samples = self.params.num_samples;

        let mut sum = 0.0f32;
        let mut count = 0usize;

        for vli in 0..self.visible_layers.len() {
            let vl = &self.visible_layers[vli];
            let vld = &self.visible_layer_descs[vli];

            let num_visible = vld.size.area();
            let row_len = vl.area * num_samples;
            let bounds = FieldBounds::new(hidden_pos, vl.h_to_v, vld.size, vld.radius);
            let row = &vl.weights[hidden_index * row_len..(hidden_index + 1) * row_len];

            for s in 0..num_samples {
                let sample = &vl.samples[s * num_visible..(s + 1) * num_visible];
                let weights = &row[s * vl.area..(s + 1) * vl.area];

                for ix in bounds.iter_lower.x..=bounds.iter_upper.x {
                    for iy in bounds.iter_lower.y..=bounds.iter_upper.y {
                        let x = sample[address2(Int2::new(ix, iy), vld.size)];
                        let w = weights[window_offset(
                            Int2::new(ix - bounds.lower.x, iy - bounds.lower.y),
                            vl.diam,
                        )];

                        match self.encoder_type {
                            EncoderType::Chunk { .. } => sum += w * x,
                            EncoderType::Distance { .. } => {
                                let delta = x - w;
                                sum -= delta * delta;
                            }
                        }
                    }
                }
            }

            count += bounds.count() * num_samples;
        }

        if let EncoderType::Distance { .. } = self.encoder_type {
            sum /= count.max(1) as f32;
        }

        sum - self.hidden_biases[hidden_index]
    }

    // Highest activation in the chunk, lowest index on ties
    fn chunk_winner(&self, chunk_index: usize) -> usize {
        let chunk_size = self.encoder_type.chunk_size();
        let chunk_pos = position2(chunk_index, self.chunks_dims());

        let mut max_index = address2(
            Int2::new(chunk_pos.x * chunk_size.x, chunk_pos.y * chunk_size.y),
            self.hidden_size,
        );
        let mut max_activation = f32::NEG_INFINITY;

        for dx in 0..chunk_size.x {
            for dy in 0..chunk_size.y {
                let pos = Int2::new(
                    chunk_pos.x * chunk_size.x + dx,
                    chunk_pos.y * chunk_size.y + dy,
                );
                let hidden_index = address2(pos, self.hidden_size);
                let activation = self.hidden_activations[hidden_index];

                if activation > max_activation {
                    max_activation = activation;
                    max_index = hidden_index;
                }
            }
        }

        max_index
    }

    /// Fold the inputs into the traces, push the traces onto the sample
    /// history, then compute activations, chunk winners and the binary
    /// sparse code.
    ///
    /// `inputs` holds one buffer per visible layer, each in [`address2`] order.
    pub fn activate(&mut self, cs: &ComputeSystem, inputs: &[&[f32]]) {
        debug_assert_eq!(inputs.len(), self.visible_layers.len());

        cs.install(|| {
            for (vli, vl) in self.visible_layers.iter_mut().enumerate() {
                let lambda = self.visible_layer_descs[vli].lambda;
                let num_visible = vl.trace.len();

                vl.trace
                    .par_iter_mut()
                    .zip(inputs[vli].par_iter())
                    .for_each(|(t, &x)| *t = lambda * *t + (1.0 - lambda) * x);

                let kept = vl.samples.len() - num_visible;
                vl.samples.copy_within(0..kept, num_visible);
                vl.samples[..num_visible].copy_from_slice(&vl.trace);
            }

            let num_hidden = self.hidden_size.area();

            let activations: FloatBuffer = (0..num_hidden)
                .into_par_iter()
                .map(|i| self.compute_activation(i))
                .collect();
            self.hidden_activations = activations;

            let winners: Vec<usize> = (0..self.chunk_winners.len())
                .into_par_iter()
                .map(|c| self.chunk_winner(c))
                .collect();
            self.chunk_winners = winners;

            let states: FloatBuffer = (0..num_hidden)
                .into_par_iter()
                .map(|i| {
                    if self.chunk_winners[self.chunk_of(i)] == i {
                        1.0
                    } else {
                        0.0
                    }
                })
                .collect();
            self.hidden_states = states;
        });
    }

    // Share of the winner's input it does not yet reproduce, in [0, 1].
    // A winner that sees no input leaves its neighbours fully free to learn.
    fn winner_residual(&self, winner: usize) -> f32 {
        let hidden_pos = position2(winner, self.hidden_size);
        let num_samples = self.params.num_samples;

        let mut error = 0.0f32;
        let mut energy = 0.0f32;

        for vli in 0..self.visible_layers.len() {
            let vl = &self.visible_layers[vli];
            let vld = &self.visible_layer_descs[vli];

            let num_visible = vld.size.area();
            let row_len = vl.area * num_samples;
            let bounds = FieldBounds::new(hidden_pos, vl.h_to_v, vld.size, vld.radius);
            let row = &vl.weights[winner * row_len..(winner + 1) * row_len];

            for s in 0..num_samples {
                let sample = &vl.samples[s * num_visible..(s + 1) * num_visible];
                let weights = &row[s * vl.area..(s + 1) * vl.area];

                for ix in bounds.iter_lower.x..=bounds.iter_upper.x {
                    for iy in bounds.iter_lower.y..=bounds.iter_upper.y {
                        let x = sample[address2(Int2::new(ix, iy), vld.size)];
                        let w = weights[window_offset(
                            Int2::new(ix - bounds.lower.x, iy - bounds.lower.y),
                            vl.diam,
                        )];
                        let delta = x - w;

                        error += delta * delta;
                        energy += x * x;
                    }
                }
            }
        }

        if energy < LIMIT_SMALL {
            1.0
        } else {
            (error / energy).min(1.0)
        }
    }

    // How strongly a unit follows its input this step, zero to skip
    fn learn_strength(&self, hidden_index: usize, residuals: &[f32]) -> f32 {
        let chunk = self.chunk_of(hidden_index);
        let winner = self.chunk_winners[chunk];

        if winner == hidden_index {
            return 1.0;
        }

        match self.encoder_type {
            EncoderType::Chunk { gamma, .. } => {
                let pos = position2(hidden_index, self.hidden_size);
                let winner_pos = position2(winner, self.hidden_size);
                let dx = (pos.x - winner_pos.x) as f32;
                let dy = (pos.y - winner_pos.y) as f32;
                let strength = (-gamma * (dx * dx + dy * dy)).exp() * residuals[chunk];

                if strength < MIN_LEARN_STRENGTH {
                    0.0
                } else {
                    strength
                }
            }
            EncoderType::Distance { .. } => 0.0,
        }
    }

    /// Move weights toward the samples seen by the last
    /// [`activate`](Self::activate) and adapt biases toward the chunk's
    /// target firing rate.
    ///
    /// In chunk mode the winner's neighbours learn in proportion to how much
    /// of the input the winner still fails to reproduce, so they stop
    /// drifting toward the winner's input once it is learned.
    pub fn learn(&mut self, cs: &ComputeSystem) {
        cs.install(|| {
            let residuals: FloatBuffer = match self.encoder_type {
                EncoderType::Chunk { .. } => self
                    .chunk_winners
                    .par_iter()
                    .map(|&w| self.winner_residual(w))
                    .collect(),
                EncoderType::Distance { .. } => vec![0.0; self.chunk_winners.len()],
            };

            let num_hidden = self.hidden_size.area();
            let strengths: FloatBuffer = (0..num_hidden)
                .into_par_iter()
                .map(|i| self.learn_strength(i, &residuals))
                .collect();

            let hidden_size = self.hidden_size;
            let num_samples = self.params.num_samples;

            for (vli, vl) in self.visible_layers.iter_mut().enumerate() {
                let vld = &self.visible_layer_descs[vli];
                let num_visible = vld.size.area();
                let (h_to_v, diam, area) = (vl.h_to_v, vl.diam, vl.area);
                let samples = &vl.samples;

                vl.weights
                    .par_chunks_mut(area * num_samples)
                    .enumerate()
                    .for_each(|(hidden_index, row)| {
                        let rate = vld.weight_alpha * strengths[hidden_index];
                        if rate == 0.0 {
                            return;
                        }

                        let hidden_pos = position2(hidden_index, hidden_size);
                        let bounds = FieldBounds::new(hidden_pos, h_to_v, vld.size, vld.radius);

                        for s in 0..num_samples {
                            let sample = &samples[s * num_visible..(s + 1) * num_visible];
                            let weights = &mut row[s * area..(s + 1) * area];

                            for ix in bounds.iter_lower.x..=bounds.iter_upper.x {
                                for iy in bounds.iter_lower.y..=bounds.iter_upper.y {
                                    let x = sample[address2(Int2::new(ix, iy), vld.size)];
                                    let wi = window_offset(
                                        Int2::new(ix - bounds.lower.x, iy - bounds.lower.y),
                                        diam,
                                    );
                                    weights[wi] += rate * (x - weights[wi]);
                                }
                            }
                        }
                    });
            }

            let target = 1.0 / self.encoder_type.chunk_size().area() as f32;
            let bias_alpha = self.params.bias_alpha;
            let limit = self.params.bias_limit;

            self.hidden_biases
                .par_iter_mut()
                .zip(self.hidden_states.par_iter())
                .for_each(|(bias, &state)| {
                    *bias = (*bias + bias_alpha * (state - target)).clamp(-limit, limit);
                });
        });
    }

    /// Zero the sparse code, activations, traces and sample history.
    /// Weights and biases are kept.
    pub fn clear_memory(&mut self) {
        self.hidden_activations.fill(0.0);
        self.hidden_states.fill(0.0);
        for vl in &mut self.visible_layers {
            vl.trace.fill(0.0);
            vl.samples.fill(0.0);
        }
    }

    pub fn get_num_samples(&self) -> usize {
        self.params.num_samples
    }

    pub fn get_hidden_size(&self) -> Int2 {
        self.hidden_size
    }

    pub fn get_chunk_size(&self) -> Int2 {
        self.encoder_type.chunk_size()
    }

    pub fn get_num_chunks(&self) -> usize {
        self.chunk_winners.len()
    }

    pub fn get_encoder_type(&self) -> &EncoderType {
        &self.encoder_type
    }

    pub fn get_hidden_states(&self) -> &[f32] {
        &self.hidden_states
    }

    pub fn get_hidden_activations(&self) -> &[f32] {
        &self.hidden_activations
    }

    pub fn get_chunk_winners(&self) -> &[usize] {
        &self.chunk_winners
    }

    pub fn get_hidden_biases(&self) -> &[f32] {
        &self.hidden_biases
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

#[cfg(test)]
mod tests {
    use super::*;

    fn cs() -> ComputeSystem {
        ComputeSystem::new(crate::compute::DeviceType::Cpu, 2).unwrap()
    }

    fn chunked(chunk_size: Int2) -> EncoderType {
        EncoderType::Chunk { chunk_size, gamma: 0.5 }
    }

    fn ramp(size: Int2) -> FloatBuffer {
        (0..size.area()).map(|i| i as f32 / size.area() as f32).collect()
    }

    fn visible(lambda: f32) -> VisibleLayerDesc {
        VisibleLayerDesc {
            size: Int2::new(4, 4),
            radius: 2,
            weight_alpha: 0.1,
            lambda,
        }
    }

    fn encoder(hidden: Int2, encoder_type: EncoderType, params: Params) -> Encoder {
        let mut state = rand_get_state(7);
        Encoder::new(hidden, encoder_type, vec![visible(0.0)], params, &mut state).unwrap()
    }

    fn step(enc: &mut Encoder, cs: &ComputeSystem, input: &[f32]) {
        enc.activate(cs, &[input]);
        enc.learn(cs);
    }

    #[test]
    fn one_winner_per_chunk() {
        let cs = cs();
        let mut enc = encoder(Int2::new(8, 8), chunked(Int2::new(4, 4)), Params::default());
        let input = ramp(Int2::new(4, 4));

        for _ in 0..5 {
            step(&mut enc, &cs, &input);

            let active = enc.get_hidden_states().iter().filter(|&&s| s == 1.0).count();
            assert_eq!(active, enc.get_num_chunks());
            assert_eq!(enc.get_num_chunks(), 4);

            for &w in enc.get_chunk_winners() {
                assert_eq!(enc.get_hidden_states()[w], 1.0);
            }
        }
    }

    #[test]
    fn ties_pick_lowest_index() {
        let cs = cs();
        let params = Params {
            init_weight_range: Float2::new(0.0, 0.0),
            ..Params::default()
        };
        let mut enc = encoder(Int2::new(4, 4), chunked(Int2::new(2, 2)), params);
        let input = vec![1.0; 16];
        enc.activate(&cs, &[&input]);

        // chunk (0, 0) holds units 0, 1, 4, 5
        assert_eq!(enc.get_chunk_winners()[0], 0);
        assert_eq!(enc.get_chunk_winners()[1], 2);
    }

    #[test]
    fn winner_weights_move_toward_input() {
        let cs = cs();
        let mut enc = encoder(
            Int2::new(2, 2),
            EncoderType::Distance { chunk_size: Int2::new(2, 2) },
            Params::default(),
        );
        let input = ramp(Int2::new(4, 4));

        enc.activate(&cs, &[&input]);
        let winner = enc.get_chunk_winners()[0];
        let before = enc.get_hidden_activations()[winner];

        enc.learn(&cs);
        enc.activate(&cs, &[&input]);

        // winner is closer to the input, minus a small bias increase
        assert_eq!(enc.get_chunk_winners()[0], winner);
        assert!(enc.get_hidden_activations()[winner] > before);
        assert!(enc.get_hidden_biases()[winner] > 0.0);
    }

    #[test]
    fn chunk_mode_neighbours_learn_less() {
        let cs = cs();
        let params = Params {
            init_weight_range: Float2::new(0.0, 0.0),
            ..Params::default()
        };
        let mut enc = encoder(
            Int2::new(4, 4),
            EncoderType::Chunk { chunk_size: Int2::new(4, 4), gamma: 1.0 },
            params,
        );
        let input = vec![1.0; 16];
        step(&mut enc, &cs, &input);

        let area = 25;
        let weights = &enc.get_visible_layer(0).weights;
        let row = |i: usize| weights[i * area..(i + 1) * area].iter().sum::<f32>();
        // winner is unit 0, unit 1 is at distance 1, unit 5 at distance sqrt(2)
        assert!(row(0) > row(1));
        assert!(row(1) > row(5));
        assert!(row(5) > 0.0);
    }

    #[test]
    fn neighbours_stop_learning_once_the_winner_fits() {
        let cs = cs();
        let params = Params {
            init_weight_range: Float2::new(0.0, 0.0),
            ..Params::default()
        };
        let mut enc = encoder(Int2::new(4, 4), chunked(Int2::new(4, 4)), params);
        let input = vec![1.0; 16];

        for _ in 0..200 {
            step(&mut enc, &cs, &input);
        }
        let winner = enc.get_chunk_winners()[0];
        let weights = enc.get_visible_layer(0).weights.clone();

        for _ in 0..200 {
            step(&mut enc, &cs, &input);
        }
        assert_eq!(enc.get_chunk_winners()[0], winner);

        // the residual gating leaves neighbours well short of the input
        let area = 25;
        let neighbour = if winner == 0 { 1 } else { winner - 1 };
        let after = &enc.get_visible_layer(0).weights;
        let moved: f32 = (0..area)
            .map(|k| (after[neighbour * area + k] - weights[neighbour * area + k]).abs())
            .sum();
        assert!(moved < 0.01, "neighbour moved by {moved}");
    }

    #[test]
    fn winners_settle_under_constant_input() {
        let cs = cs();
        let mut enc = encoder(Int2::new(8, 8), chunked(Int2::new(4, 4)), Params::default());
        let input = vec![1.0; 16];

        for _ in 0..300 {
            step(&mut enc, &cs, &input);
        }
        let winners = enc.get_chunk_winners().to_vec();

        for _ in 0..1000 {
            step(&mut enc, &cs, &input);
            assert_eq!(enc.get_chunk_winners(), winners.as_slice());
        }
    }

    #[test]
    fn biases_saturate_at_the_limit() {
        let cs = cs();
        let params = Params {
            bias_alpha: 0.05,
            ..Params::default()
        };
        let mut enc = encoder(Int2::new(4, 4), chunked(Int2::new(4, 4)), params);
        let input = ramp(Int2::new(4, 4));

        for _ in 0..200 {
            step(&mut enc, &cs, &input);
        }

        let biases = enc.get_hidden_biases();
        assert!(biases.iter().all(|b| (-BIAS_LIMIT..=BIAS_LIMIT).contains(b)));
        assert!(biases.iter().any(|&b| b == BIAS_LIMIT));
        assert!(biases.iter().any(|&b| b == -BIAS_LIMIT));
    }

    #[test]
    fn trace_blends_previous_inputs() {
        let cs = cs();
        let mut state = rand_get_state(3);
        let mut enc = Encoder::new(
            Int2::new(4, 4),
            chunked(Int2::new(2, 2)),
            vec![visible(0.5)],
            Params::default(),
            &mut state,
        )
        .unwrap();

        let a = vec![1.0; 16];
        let b = vec![0.0; 16];
        enc.activate(&cs, &[&a]);
        enc.activate(&cs, &[&b]);

        // 0.5 * (0.5 * 1) + 0.5 * 0
        assert!(enc.get_visible_layer(0).get_trace().iter().all(|&t| t == 0.25));
    }

    #[test]
    fn samples_keep_recent_frames() {
        let cs = cs();
        let params = Params {
            num_samples: 3,
            ..Params::default()
        };
        let mut enc = encoder(Int2::new(4, 4), chunked(Int2::new(2, 2)), params);
        assert_eq!(enc.get_num_samples(), 3);
        assert_eq!(enc.get_visible_layer(0).weights.len(), 16 * 25 * 3);

        let first = ramp(Int2::new(4, 4));
        let second = vec![1.0; 16];
        enc.activate(&cs, &[&first]);
        enc.activate(&cs, &[&second]);

        let samples = enc.get_visible_layer(0).get_samples();
        assert_eq!(&samples[..16], second.as_slice());
        assert_eq!(&samples[16..32], first.as_slice());
        assert!(samples[32..].iter().all(|&x| x == 0.0));

        enc.learn(&cs);
        enc.clear_memory();
        assert!(enc.get_visible_layer(0).get_samples().iter().all(|&x| x == 0.0));
        assert!(enc.get_visible_layer(0).get_trace().iter().all(|&x| x == 0.0));
    }

    #[test]
    fn uneven_chunks_are_rejected() {
        let mut state = rand_get_state(1);
        let err = Encoder::new(
            Int2::new(36, 36),
            chunked(Int2::new(5, 5)),
            vec![VisibleLayerDesc::default()],
            Params::default(),
            &mut state,
        )
        .unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn bad_visible_layers_are_rejected() {
        let bad = [
            VisibleLayerDesc { radius: 0, ..VisibleLayerDesc::default() },
            VisibleLayerDesc { radius: 40000, ..VisibleLayerDesc::default() },
            VisibleLayerDesc { lambda: 1.0, ..VisibleLayerDesc::default() },
            VisibleLayerDesc { lambda: -0.1, ..VisibleLayerDesc::default() },
        ];

        for vld in bad {
            let err = Encoder::validate(
                Int2::new(4, 4),
                &chunked(Int2::new(2, 2)),
                &[vld],
                &Params::default(),
            )
            .unwrap_err();
            assert!(matches!(err, Error::Configuration(_)));
        }
    }

    #[test]
    fn zero_samples_are_rejected() {
        let params = Params {
            num_samples: 0,
            ..Params::default()
        };
        let err = Encoder::validate(
            Int2::new(4, 4),
            &chunked(Int2::new(2, 2)),
            &[VisibleLayerDesc::default()],
            &params,
        )
        .unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }
}
