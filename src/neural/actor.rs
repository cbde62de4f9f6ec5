//! Actor networks as explicit layer graphs
//!
//! Visual encoders mirror the two ML-Agents presets: `simple` (two strided
//! convolutions) and `nature_cnn` (the three-convolution DQN encoder).

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tch::{nn, Device, Kind, Tensor};

use crate::neural::input_shape::InputShape;
use crate::neural::layer::{Layer, LayerKind, LayerSpec};
use crate::summary::{LayerRow, ModelSummary, Summarize, SUMMARY_BATCH_SIZE};
use crate::{InspectError, Result};

#[derive(clap::ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VisualEncoder {
    Simple,
    NatureCnn,
}

impl VisualEncoder {
    /// (out_channels, kernel_size, stride) per convolution
    fn conv_stack(self) -> &'static [(i64, i64, i64)] {
        match self {
            VisualEncoder::Simple => &[(16, 8, 4), (32, 4, 2)],
            VisualEncoder::NatureCnn => &[(32, 8, 4), (64, 4, 2), (64, 3, 1)],
        }
    }
}

/// Hyperparameters of a visual actor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActorSettings {
    pub encoder: VisualEncoder,
    pub hidden_units: i64,
    pub num_layers: usize,
    pub action_size: i64,
}

impl Default for ActorSettings {
    /// FoodCollector: three continuous actions (forward, lateral, rotation)
    fn default() -> Self {
        Self {
            encoder: VisualEncoder::Simple,
            hidden_units: 256,
            num_layers: 2,
            action_size: 3,
        }
    }
}

/// Serializable description of an actor graph
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActorArchitecture {
    pub behavior_name: String,
    pub layers: Vec<LayerSpec>,
}

impl ActorArchitecture {
    /// Visual encoder, dense body and a tanh-squashed continuous action head,
    /// sized for `input`.
    pub fn visual(
        behavior_name: impl Into<String>,
        input: InputShape,
        settings: ActorSettings,
    ) -> Result<Self> {
        let mut layers = Vec::new();
        let mut in_channels = input.channels;

        for (idx, &(out_channels, kernel_size, stride)) in
            settings.encoder.conv_stack().iter().enumerate()
        {
            layers.push(LayerSpec::new(
                format!("encoder.conv{}", idx + 1),
                LayerKind::Conv2d {
                    in_channels,
                    out_channels,
                    kernel_size,
                    stride,
                    padding: 0,
                },
            ));
            layers.push(LayerSpec::new(format!("encoder.act{}", idx + 1), LayerKind::LeakyRelu));
            in_channels = out_channels;
        }
        layers.push(LayerSpec::new("encoder.flatten", LayerKind::Flatten));

        // Walk the convolutions once to size the first dense layer
        let mut shape = vec![1, input.channels, input.height, input.width];
        for spec in &layers {
            shape = spec.kind.output_shape(&spec.name, &shape)?;
        }
        let flatten_size = shape[1];
        log::debug!(
            "{:?} encoder flattens {} to {} features",
            settings.encoder,
            input,
            flatten_size
        );

        layers.push(LayerSpec::new(
            "encoder.dense",
            LayerKind::Linear {
                in_features: flatten_size,
                out_features: settings.hidden_units,
            },
        ));
        layers.push(LayerSpec::new("encoder.dense_act", LayerKind::LeakyRelu));

        for idx in 0..settings.num_layers {
            layers.push(LayerSpec::new(
                format!("body.linear{}", idx + 1),
                LayerKind::Linear {
                    in_features: settings.hidden_units,
                    out_features: settings.hidden_units,
                },
            ));
            layers.push(LayerSpec::new(format!("body.act{}", idx + 1), LayerKind::Relu));
        }

        layers.push(LayerSpec::new(
            "action_head.mu",
            LayerKind::Linear {
                in_features: settings.hidden_units,
                out_features: settings.action_size,
            },
        ));
        layers.push(LayerSpec::new("action_head.squash", LayerKind::Tanh));

        let architecture = Self {
            behavior_name: behavior_name.into(),
            layers,
        };
        architecture.validate()?;
        Ok(architecture)
    }

    /// Structural checks that do not depend on any input shape
    pub fn validate(&self) -> Result<()> {
        if self.layers.is_empty() {
            return Err(InspectError::InvalidArchitecture(
                "architecture declares no layers".to_string(),
            ));
        }
        let mut seen = HashSet::new();
        for spec in &self.layers {
            spec.validate()?;
            if !seen.insert(spec.name.as_str()) {
                return Err(InspectError::InvalidArchitecture(format!(
                    "duplicate layer name '{}'",
                    spec.name
                )));
            }
        }
        let total = self
            .layers
            .iter()
            .try_fold(0i64, |total, spec| {
                spec.kind
                    .checked_parameter_count()
                    .and_then(|count| total.checked_add(count))
            })
            .ok_or_else(|| {
                InspectError::InvalidArchitecture("total parameter count overflows".to_string())
            })?;
        if total == 0 {
            return Err(InspectError::InvalidArchitecture(
                "architecture has no learnable layers".to_string(),
            ));
        }
        Ok(())
    }

    /// Every variable name and shape the graph expects, in layer order
    pub fn variables(&self) -> Vec<(String, Vec<i64>)> {
        self.layers.iter().flat_map(LayerSpec::variables).collect()
    }

    pub fn parameter_count(&self) -> i64 {
        self.layers
            .iter()
            .fold(0i64, |total, spec| total.saturating_add(spec.kind.parameter_count()))
    }
}

/// Forward-computable actor graph with its variables
pub struct ActorNetwork {
    vs: nn::VarStore,
    architecture: ActorArchitecture,
    layers: Vec<Layer>,
}

impl ActorNetwork {
    pub fn new(architecture: ActorArchitecture, device: Device) -> Result<Self> {
        architecture.validate()?;

        let vs = nn::VarStore::new(device);
        let layers = {
            let root = vs.root();
            architecture
                .layers
                .iter()
                .cloned()
                .map(|spec| Layer::new(&root, spec))
                .collect()
        };

        Ok(Self {
            vs,
            architecture,
            layers,
        })
    }

    pub fn architecture(&self) -> &ActorArchitecture {
        &self.architecture
    }

    pub fn varstore(&self) -> &nn::VarStore {
        &self.vs
    }

    pub fn varstore_mut(&mut self) -> &mut nn::VarStore {
        &mut self.vs
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn device(&self) -> Device {
        self.vs.device()
    }

    pub fn forward(&self, xs: &Tensor) -> Result<Tensor> {
        self.layers
            .iter()
            .try_fold(xs.shallow_clone(), |h, layer| layer.forward(&h))
    }
}

impl Summarize for ActorNetwork {
    fn summarize(&self, input_shape: InputShape) -> Result<ModelSummary> {
        tch::no_grad(|| {
            let mut h = Tensor::f_zeros(
                input_shape.batched(SUMMARY_BATCH_SIZE),
                (Kind::Float, self.device()),
            )?;
            let mut rows = Vec::with_capacity(self.layers.len());

            for (idx, layer) in self.layers.iter().enumerate() {
                h = layer.forward(&h)?;
                let kind = &layer.spec().kind;
                let params = kind.parameter_count();
                rows.push(LayerRow {
                    name: format!("{}-{}", kind.type_name(), idx + 1),
                    path: layer.name().to_string(),
                    layer_type: kind.type_name().to_string(),
                    output_shape: Some(LayerRow::unbatched(&h.size())),
                    params,
                    trainable_params: params,
                });
            }

            Ok(ModelSummary::new(input_shape, rows))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::neural::input_shape::VISUAL_OBSERVATION;
    use assert_matches::assert_matches;

    #[test]
    fn test_simple_encoder_flatten_size() {
        let arch =
            ActorArchitecture::visual("VisualFoodCollector", VISUAL_OBSERVATION, ActorSettings::default())
                .unwrap();
        let dense = arch.layers.iter().find(|l| l.name == "encoder.dense").unwrap();
        assert_matches!(dense.kind, LayerKind::Linear { in_features: 2592, out_features: 256 });
    }

    #[test]
    fn test_nature_encoder_flatten_size() {
        let settings = ActorSettings {
            encoder: VisualEncoder::NatureCnn,
            ..Default::default()
        };
        let arch = ActorArchitecture::visual("Agent", VISUAL_OBSERVATION, settings).unwrap();
        let dense = arch.layers.iter().find(|l| l.name == "encoder.dense").unwrap();
        // 84 -> 20 -> 9 -> 7
        assert_matches!(dense.kind, LayerKind::Linear { in_features: 3136, .. });
    }

    #[test]
    fn test_too_small_input_is_rejected() {
        let err = ActorArchitecture::visual("Agent", InputShape::new(3, 8, 8), ActorSettings::default());
        assert_matches!(err, Err(InspectError::ShapeMismatch { .. }));
    }

    #[test]
    fn test_duplicate_layer_names_rejected() {
        let arch = ActorArchitecture {
            behavior_name: "Agent".to_string(),
            layers: vec![
                LayerSpec::new("head", LayerKind::Linear { in_features: 4, out_features: 2 }),
                LayerSpec::new("head", LayerKind::Relu),
            ],
        };
        assert_matches!(arch.validate(), Err(InspectError::InvalidArchitecture(_)));
    }

    #[test]
    fn test_parameterless_architecture_rejected() {
        let arch = ActorArchitecture {
            behavior_name: "Agent".to_string(),
            layers: vec![LayerSpec::new("flatten", LayerKind::Flatten)],
        };
        assert_matches!(arch.validate(), Err(InspectError::InvalidArchitecture(_)));
    }

    #[test]
    fn test_varstore_matches_declared_variables() {
        let arch =
            ActorArchitecture::visual("Agent", VISUAL_OBSERVATION, ActorSettings::default()).unwrap();
        let actor = ActorNetwork::new(arch.clone(), Device::Cpu).unwrap();
        let variables = actor.varstore().variables();

        assert_eq!(variables.len(), arch.variables().len());
        for (name, shape) in arch.variables() {
            assert_eq!(variables[&name].size(), shape, "{name}");
        }
    }

    #[test]
    fn test_forward_produces_bounded_actions() {
        let arch =
            ActorArchitecture::visual("Agent", VISUAL_OBSERVATION, ActorSettings::default()).unwrap();
        let actor = ActorNetwork::new(arch, Device::Cpu).unwrap();
        let input = Tensor::rand([4, 3, 84, 84], (Kind::Float, Device::Cpu));
        let actions = actor.forward(&input).unwrap();

        assert_eq!(actions.size(), vec![4, 3]);
        assert!(actions.abs().max().double_value(&[]) <= 1.0);
    }

    #[test]
    fn test_summary_rows_follow_layers() {
        let arch =
            ActorArchitecture::visual("Agent", VISUAL_OBSERVATION, ActorSettings::default()).unwrap();
        let actor = ActorNetwork::new(arch.clone(), Device::Cpu).unwrap();
        let summary = actor.summarize(VISUAL_OBSERVATION).unwrap();

        assert_eq!(summary.rows.len(), arch.layers.len());
        assert_eq!(summary.rows[0].name, "Conv2d-1");
        assert_eq!(summary.rows[0].output_shape, Some(vec![-1, 16, 20, 20]));
        assert_eq!(summary.rows.last().unwrap().output_shape, Some(vec![-1, 3]));
        assert_eq!(summary.total_params, arch.parameter_count());
    }
}
