// OgmaNeo - Architect (typed hierarchy builder)

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::compute::ComputeSystem;
use crate::encoder::EncoderType;
use crate::error::{Error, Result};
use crate::helpers::*;
use crate::hierarchy::{Hierarchy, InputDesc, LayerDesc};

/// Encoder strategy of a higher layer, chosen when the layer is added.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SparseFeaturesType {
    #[default]
    Chunk,
    Distance,
}

/// A value passed to [`ParameterModifier::set_value`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ParamValue {
    Float(f32),
    Int(i32),
    Vec2i(Vec2i),
    Vec2f(Vec2f),
}

impl From<f32> for ParamValue {
    fn from(v: f32) -> Self {
        Self::Float(v)
    }
}

impl From<f64> for ParamValue {
    fn from(v: f64) -> Self {
        Self::Float(v as f32)
    }
}

impl From<i32> for ParamValue {
    fn from(v: i32) -> Self {
        Self::Int(v)
    }
}

impl From<Vec2i> for ParamValue {
    fn from(v: Vec2i) -> Self {
        Self::Vec2i(v)
    }
}

impl From<Vec2f> for ParamValue {
    fn from(v: Vec2f) -> Self {
        Self::Vec2f(v)
    }
}

fn float(name: &str, value: ParamValue) -> Result<f32> {
    match value {
        ParamValue::Float(v) => Ok(v),
        _ => Err(type_error(name, "a float")),
    }
}

fn int(name: &str, value: ParamValue) -> Result<i32> {
    match value {
        ParamValue::Int(v) => Ok(v),
        _ => Err(type_error(name, "an integer")),
    }
}

fn vec2i(name: &str, value: ParamValue) -> Result<Vec2i> {
    match value {
        ParamValue::Vec2i(v) => Ok(v),
        _ => Err(type_error(name, "a Vec2i")),
    }
}

fn vec2f(name: &str, value: ParamValue) -> Result<Vec2f> {
    match value {
        ParamValue::Vec2f(v) => Ok(v),
        _ => Err(type_error(name, "a Vec2f")),
    }
}

fn type_error(name: &str, expected: &'static str) -> Error {
    Error::ParameterType {
        name: name.to_string(),
        expected,
    }
}

// Camel-case names with an `sfc_` (chunk) or `sfd_` (distance) prefix, plus
// `hl_poolSteps`. A prefix only resolves on a layer of its own type.
fn layer_alias(name: &str, encoder_type: &EncoderType) -> Option<&'static str> {
    if name == "hl_poolSteps" {
        return Some("pool_steps");
    }

    let rest = match encoder_type {
        EncoderType::Chunk { .. } => name.strip_prefix("sfc_")?,
        EncoderType::Distance { .. } => name.strip_prefix("sfd_")?,
    };

    Some(match rest {
        "chunkSize" => "chunk_size",
        "gamma" => "gamma",
        "initWeightRange" => "init_weight_range",
        "biasAlpha" => "bias_alpha",
        "ff_radius" => "ff_radius",
        "ff_weightAlpha" => "ff_weight_alpha",
        "ff_lambda" => "ff_lambda",
        "numSamples" | "ff_numSamples" => "num_samples",
        _ => return None,
    })
}

fn count(name: &str, value: ParamValue) -> Result<usize> {
    let n = int(name, value)?;
    usize::try_from(n)
        .map_err(|_| Error::Configuration(format!("{name} must be positive, got {n}")))
}

#[derive(Clone, Debug, PartialEq)]
enum Target {
    Input(InputDesc),
    Layer(LayerDesc),
}

/// Named-parameter view of one declared layer.
///
/// Every name is checked against the layer kind and every value against the
/// parameter's type as soon as it is set.
#[derive(Clone, Debug, PartialEq)]
pub struct ParameterModifier {
    target: Target,
}

impl ParameterModifier {
    pub fn set_value(&mut self, name: &str, value: impl Into<ParamValue>) -> Result<&mut Self> {
        let value = value.into();

        match &mut self.target {
            Target::Input(desc) => match name {
                "in_p_alpha" => desc.p_alpha = float(name, value)?,
                "in_p_beta" => desc.p_beta = float(name, value)?,
                "in_p_radius" => desc.p_radius = int(name, value)?,
                "ff_radius" => desc.ff_radius = int(name, value)?,
                "ff_weight_alpha" => desc.ff_weight_alpha = float(name, value)?,
                "ff_lambda" => desc.ff_lambda = float(name, value)?,
                _ => return Err(Error::UnknownParameter(name.to_string())),
            },
            Target::Layer(desc) => match layer_alias(name, &desc.encoder_type).unwrap_or(name) {
                "p_alpha" => desc.p_alpha = float(name, value)?,
                "p_beta" => desc.p_beta = float(name, value)?,
                "p_radius" => desc.p_radius = int(name, value)?,
                "pool_steps" => desc.pool_steps = count(name, value)?,
                "num_samples" => desc.num_samples = count(name, value)?,
                "ff_lambda" => desc.ff_lambda = float(name, value)?,
                "ff_radius" => desc.ff_radius = int(name, value)?,
                "ff_weight_alpha" => desc.ff_weight_alpha = float(name, value)?,
                "bias_alpha" => desc.bias_alpha = float(name, value)?,
                "init_weight_range" => desc.init_weight_range = vec2f(name, value)?,
                "chunk_size" => {
                    let size = vec2i(name, value)?;
                    match &mut desc.encoder_type {
                        EncoderType::Chunk { chunk_size, .. }
                        | EncoderType::Distance { chunk_size } => *chunk_size = size,
                    }
                }
                "gamma" => match &mut desc.encoder_type {
                    EncoderType::Chunk { gamma, .. } => *gamma = float(name, value)?,
                    EncoderType::Distance { .. } => {
                        return Err(Error::UnknownParameter(name.to_string()))
                    }
                },
                _ => return Err(Error::UnknownParameter(name.to_string())),
            },
        }

        Ok(self)
    }
}

/// Serialisable description of a whole hierarchy.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ArchitectureDesc {
    pub seed: u64,
    pub inputs: Vec<InputDesc>,
    pub layers: Vec<LayerDesc>,
}

impl ArchitectureDesc {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn build(&self, cs: Arc<ComputeSystem>) -> Result<Hierarchy> {
        Hierarchy::new(cs, &self.inputs, &self.layers, self.seed)
    }
}

/// Declares inputs and layers by name, then generates a [`Hierarchy`].
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use ogmaneo::architect::{Architect, SparseFeaturesType};
/// use ogmaneo::compute::ComputeSystem;
/// use ogmaneo::helpers::Int2;
///
/// let cs = Arc::new(ComputeSystem::cpu()?);
/// let mut arch = Architect::new(1234, cs);
/// arch.add_input_layer(Int2::new(4, 4))
///     .set_value("in_p_alpha", 0.02)?
///     .set_value("in_p_radius", 8)?;
/// arch.add_higher_layer(Int2::new(36, 36), SparseFeaturesType::Chunk)
///     .set_value("chunk_size", Int2::new(6, 6))?;
/// let hierarchy = arch.generate_hierarchy()?;
/// # Ok::<(), ogmaneo::Error>(())
/// ```
#[derive(Debug)]
pub struct Architect {
    seed: u64,
    cs: Arc<ComputeSystem>,
    inputs: Vec<ParameterModifier>,
    layers: Vec<ParameterModifier>,
}

impl Architect {
    pub fn new(seed: u64, cs: Arc<ComputeSystem>) -> Self {
        Self {
            seed,
            cs,
            inputs: Vec::new(),
            layers: Vec::new(),
        }
    }

    pub fn add_input_layer(&mut self, size: Vec2i) -> &mut ParameterModifier {
        self.inputs.push(ParameterModifier {
            target: Target::Input(InputDesc {
                size,
                ..InputDesc::default()
            }),
        });
        let last = self.inputs.len() - 1;
        &mut self.inputs[last]
    }

    pub fn add_higher_layer(
        &mut self,
        size: Vec2i,
        features: SparseFeaturesType,
    ) -> &mut ParameterModifier {
        let chunk_size = EncoderType::default().chunk_size();
        let encoder_type = match features {
            SparseFeaturesType::Chunk => EncoderType::default(),
            SparseFeaturesType::Distance => EncoderType::Distance { chunk_size },
        };

        self.layers.push(ParameterModifier {
            target: Target::Layer(LayerDesc {
                hidden_size: size,
                encoder_type,
                ..LayerDesc::default()
            }),
        });
        let last = self.layers.len() - 1;
        &mut self.layers[last]
    }

    /// The typed description of everything declared so far.
    pub fn description(&self) -> ArchitectureDesc {
        let inputs = self
            .inputs
            .iter()
            .filter_map(|m| match &m.target {
                Target::Input(desc) => Some(desc.clone()),
                Target::Layer(_) => None,
            })
            .collect();
        let layers = self
            .layers
            .iter()
            .filter_map(|m| match &m.target {
                Target::Layer(desc) => Some(desc.clone()),
                Target::Input(_) => None,
            })
            .collect();

        ArchitectureDesc {
            seed: self.seed,
            inputs,
            layers,
        }
    }

    pub fn generate_hierarchy(self) -> Result<Hierarchy> {
        self.description().build(self.cs)
    }
}
