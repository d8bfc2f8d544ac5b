//! OgmaNeo - sparse predictive hierarchies.
//!
//! A [`Hierarchy`] stacks layers that each encode their input into a chunked
//! winner-take-all sparse code, average that code over time for the layer
//! above, and learn to predict their next input top-down. The prediction of
//! the bottom layer is returned to the caller as one [`ValueField2D`] per
//! input.
//!
//! All data-parallel work runs on a shared [`ComputeSystem`]. Hierarchies are
//! built either directly from typed descriptors or through the named
//! parameters of an [`Architect`].

pub mod architect;
pub mod compute;
pub mod decoder;
pub mod encoder;
pub mod error;
pub mod helpers;
pub mod hierarchy;
pub mod pooler;
pub mod value_field;

pub use architect::{Architect, ArchitectureDesc, ParamValue, ParameterModifier, SparseFeaturesType};
pub use compute::{ComputeSystem, DeviceType};
pub use encoder::EncoderType;
pub use error::{Error, Result};
pub use helpers::{Int2, Vec2f, Vec2i};
pub use hierarchy::{Hierarchy, InputDesc, LayerDesc};
pub use value_field::ValueField2D;
