//! Typed layers of an actor graph
//!
//! A [`LayerSpec`] is the serializable description stored in checkpoints, a
//! [`Layer`] is the same description bound to variables in a `VarStore`.

use serde::{Deserialize, Serialize};
use tch::{nn, Tensor};

use crate::{InspectError, Result};

fn one() -> i64 {
    1
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LayerKind {
    Conv2d {
        in_channels: i64,
        out_channels: i64,
        kernel_size: i64,
        #[serde(default = "one")]
        stride: i64,
        #[serde(default)]
        padding: i64,
    },
    Linear {
        in_features: i64,
        out_features: i64,
    },
    Relu,
    LeakyRelu,
    Tanh,
    Flatten,
}

impl LayerKind {
    /// Class name used in summary rows
    pub fn type_name(&self) -> &'static str {
        match self {
            LayerKind::Conv2d { .. } => "Conv2d",
            LayerKind::Linear { .. } => "Linear",
            LayerKind::Relu => "ReLU",
            LayerKind::LeakyRelu => "LeakyReLU",
            LayerKind::Tanh => "Tanh",
            LayerKind::Flatten => "Flatten",
        }
    }

    /// Shapes of the learnable tensors, keyed by their local name
    pub fn parameter_shapes(&self) -> Vec<(&'static str, Vec<i64>)> {
        match *self {
            LayerKind::Conv2d {
                in_channels,
                out_channels,
                kernel_size,
                ..
            } => vec![
                ("weight", vec![out_channels, in_channels, kernel_size, kernel_size]),
                ("bias", vec![out_channels]),
            ],
            LayerKind::Linear {
                in_features,
                out_features,
            } => vec![
                ("weight", vec![out_features, in_features]),
                ("bias", vec![out_features]),
            ],
            _ => Vec::new(),
        }
    }

    /// Learnable element count, `None` when the declared sizes overflow `i64`
    pub fn checked_parameter_count(&self) -> Option<i64> {
        self.parameter_shapes().iter().try_fold(0i64, |total, (_, shape)| {
            let numel = shape
                .iter()
                .try_fold(1i64, |acc, &dim| acc.checked_mul(dim))?;
            total.checked_add(numel)
        })
    }

    /// Saturates at `i64::MAX`; validated layers never get there.
    pub fn parameter_count(&self) -> i64 {
        self.checked_parameter_count().unwrap_or(i64::MAX)
    }

    /// Output size for `input` (batch dimension first), or a shape mismatch.
    pub fn output_shape(&self, layer: &str, input: &[i64]) -> Result<Vec<i64>> {
        let mismatch = |expected: String| InspectError::ShapeMismatch {
            layer: layer.to_string(),
            expected,
            found: input.to_vec(),
        };

        match *self {
            LayerKind::Conv2d {
                in_channels,
                out_channels,
                kernel_size,
                stride,
                padding,
            } => {
                let expected = || format!("[N, {in_channels}, H>={kernel_size}, W>={kernel_size}]");
                let [batch, channels, height, width] = input else {
                    return Err(mismatch(expected()));
                };
                let overflow = || {
                    InspectError::InvalidArchitecture(format!(
                        "layer {layer}: padded size of {input:?} overflows"
                    ))
                };
                let pad = padding.checked_mul(2).ok_or_else(overflow)?;
                let padded_h = height.checked_add(pad).ok_or_else(overflow)?;
                let padded_w = width.checked_add(pad).ok_or_else(overflow)?;
                if *channels != in_channels || padded_h < kernel_size || padded_w < kernel_size {
                    return Err(mismatch(expected()));
                }
                Ok(vec![
                    *batch,
                    out_channels,
                    (padded_h - kernel_size) / stride + 1,
                    (padded_w - kernel_size) / stride + 1,
                ])
            }
            LayerKind::Linear {
                in_features,
                out_features,
            } => match input {
                [leading @ .., last] if !leading.is_empty() && *last == in_features => {
                    let mut out = leading.to_vec();
                    out.push(out_features);
                    Ok(out)
                }
                _ => Err(mismatch(format!("[N, {in_features}]"))),
            },
            LayerKind::Relu | LayerKind::LeakyRelu | LayerKind::Tanh => Ok(input.to_vec()),
            LayerKind::Flatten => match input {
                [batch, rest @ ..] if !rest.is_empty() => {
                    let features = rest
                        .iter()
                        .try_fold(1i64, |acc, &dim| acc.checked_mul(dim))
                        .ok_or_else(|| {
                            InspectError::InvalidArchitecture(format!(
                                "layer {layer}: flattening {input:?} overflows"
                            ))
                        })?;
                    Ok(vec![*batch, features])
                }
                _ => Err(mismatch("[N, ...]".to_string())),
            },
        }
    }

    fn validate(&self, layer: &str) -> Result<()> {
        let ok = match *self {
            LayerKind::Conv2d {
                in_channels,
                out_channels,
                kernel_size,
                stride,
                padding,
            } => in_channels > 0 && out_channels > 0 && kernel_size > 0 && stride > 0 && padding >= 0,
            LayerKind::Linear {
                in_features,
                out_features,
            } => in_features > 0 && out_features > 0,
            _ => true,
        };
        if !ok {
            return Err(InspectError::InvalidArchitecture(format!(
                "layer {layer} has non-positive dimensions: {self:?}"
            )));
        }
        if self.checked_parameter_count().is_none() {
            return Err(InspectError::InvalidArchitecture(format!(
                "layer {layer} parameter count overflows: {self:?}"
            )));
        }
        Ok(())
    }
}

/// Named layer description
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerSpec {
    /// Dotted variable prefix, e.g. `encoder.conv1`
    pub name: String,
    #[serde(flatten)]
    pub kind: LayerKind,
}

impl LayerSpec {
    pub fn new(name: impl Into<String>, kind: LayerKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }

    pub fn validate(&self) -> Result<()> {
        let well_formed = !self.name.is_empty()
            && self
                .name
                .split('.')
                .all(|segment| !segment.is_empty());
        if !well_formed {
            return Err(InspectError::InvalidArchitecture(format!(
                "layer name '{}' is not a dotted identifier",
                self.name
            )));
        }
        self.kind.validate(&self.name)
    }

    /// Fully qualified variable names and shapes this layer owns
    pub fn variables(&self) -> Vec<(String, Vec<i64>)> {
        self.kind
            .parameter_shapes()
            .into_iter()
            .map(|(local, shape)| (format!("{}.{local}", self.name), shape))
            .collect()
    }
}

enum LayerModule {
    Conv(nn::Conv2D),
    Linear(nn::Linear),
    Relu,
    LeakyRelu,
    Tanh,
    Flatten,
}

/// Layer bound to variables of a `VarStore`
pub struct Layer {
    spec: LayerSpec,
    module: LayerModule,
}

impl Layer {
    pub fn new(root: &nn::Path, spec: LayerSpec) -> Self {
        let mut segments = spec.name.split('.');
        let first = segments.next().unwrap_or_default();
        let path = segments.fold(root / first, |path, segment| &path / segment);

        let module = match spec.kind {
            LayerKind::Conv2d {
                in_channels,
                out_channels,
                kernel_size,
                stride,
                padding,
            } => LayerModule::Conv(nn::conv2d(
                &path,
                in_channels,
                out_channels,
                kernel_size,
                nn::ConvConfig {
                    stride,
                    padding,
                    ..Default::default()
                },
            )),
            LayerKind::Linear {
                in_features,
                out_features,
            } => LayerModule::Linear(nn::linear(&path, in_features, out_features, Default::default())),
            LayerKind::Relu => LayerModule::Relu,
            LayerKind::LeakyRelu => LayerModule::LeakyRelu,
            LayerKind::Tanh => LayerModule::Tanh,
            LayerKind::Flatten => LayerModule::Flatten,
        };

        Self { spec, module }
    }

    pub fn spec(&self) -> &LayerSpec {
        &self.spec
    }

    pub fn name(&self) -> &str {
        &self.spec.name
    }

    /// Runs the layer after checking the input against its declared shape.
    pub fn forward(&self, xs: &Tensor) -> Result<Tensor> {
        let expected = self.spec.kind.output_shape(&self.spec.name, &xs.size())?;

        let out = match &self.module {
            LayerModule::Conv(conv) => xs.f_conv2d(
                &conv.ws,
                conv.bs.as_ref(),
                conv.config.stride,
                conv.config.padding,
                conv.config.dilation,
                conv.config.groups,
            )?,
            LayerModule::Linear(linear) => xs.f_linear(&linear.ws, linear.bs.as_ref())?,
            LayerModule::Relu => xs.f_relu()?,
            LayerModule::LeakyRelu => xs.f_leaky_relu()?,
            LayerModule::Tanh => xs.f_tanh()?,
            LayerModule::Flatten => xs.f_flatten(1, -1)?,
        };

        if out.size() != expected {
            return Err(InspectError::Summary(format!(
                "layer {} produced {:?}, expected {:?}",
                self.spec.name,
                out.size(),
                expected
            )));
        }
        Ok(out)
    }
}
