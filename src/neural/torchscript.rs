//! TorchScript actors
//!
//! Scripted modules do not expose their submodules through libtorch's C API,
//! so the summary groups parameters by module prefix and reports the shapes
//! returned by `forward` on the final rows.

use std::path::Path;

use tch::{CModule, Device, IValue, Kind, Tensor};

use crate::neural::input_shape::InputShape;
use crate::summary::{LayerRow, ModelSummary, Summarize, SUMMARY_BATCH_SIZE};
use crate::{InspectError, Result};

struct ParameterGroup {
    prefix: String,
    params: i64,
    trainable_params: i64,
}

pub struct TorchScriptModel {
    module: CModule,
    groups: Vec<ParameterGroup>,
    device: Device,
}

impl TorchScriptModel {
    /// Load a scripted module and group its named parameters.
    ///
    /// Traced modules may have their weights folded into constants, so an
    /// empty parameter list is only a warning; `summarize` still has to run
    /// `forward`.
    pub fn load(path: impl AsRef<Path>, device: Device) -> Result<Self> {
        let path = path.as_ref();
        let mut module =
            CModule::load_on_device(path, device).map_err(|e| InspectError::Deserialize {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
        module.set_eval();

        let named = module
            .named_parameters()
            .map_err(|e| InspectError::NotForwardComputable(e.to_string()))?;
        if named.is_empty() {
            log::warn!("⚠️  {} exposes no named parameters", path.display());
        }

        Ok(Self {
            module,
            groups: group_parameters(&named),
            device,
        })
    }

    pub fn parameter_count(&self) -> i64 {
        self.groups.iter().map(|group| group.params).sum()
    }
}

/// Collapse `a.b.weight`, `a.b.bias` into one `a.b` group, keeping first-seen order.
fn group_parameters(named: &[(String, Tensor)]) -> Vec<ParameterGroup> {
    let mut groups: Vec<ParameterGroup> = Vec::new();
    for (name, tensor) in named {
        let prefix = match name.rsplit_once('.') {
            Some((prefix, _)) => prefix,
            None => name.as_str(),
        };
        let numel = tensor.numel() as i64;
        let trainable = if tensor.requires_grad() { numel } else { 0 };

        match groups.iter_mut().find(|group| group.prefix == prefix) {
            Some(group) => {
                group.params += numel;
                group.trainable_params += trainable;
            }
            None => groups.push(ParameterGroup {
                prefix: prefix.to_string(),
                params: numel,
                trainable_params: trainable,
            }),
        }
    }
    groups
}

fn collect_output_shapes(value: &IValue, shapes: &mut Vec<Vec<i64>>) {
    match value {
        IValue::Tensor(tensor) => shapes.push(tensor.size()),
        IValue::Tuple(items) | IValue::GenericList(items) => {
            for item in items {
                collect_output_shapes(item, shapes);
            }
        }
        IValue::TensorList(tensors) => shapes.extend(tensors.iter().map(Tensor::size)),
        _ => {}
    }
}

impl Summarize for TorchScriptModel {
    fn summarize(&self, input_shape: InputShape) -> Result<ModelSummary> {
        let outputs = tch::no_grad(|| -> Result<IValue> {
            let zeros = Tensor::f_zeros(
                input_shape.batched(SUMMARY_BATCH_SIZE),
                (Kind::Float, self.device),
            )?;
            self.module
                .forward_is(&[IValue::Tensor(zeros)])
                .map_err(|e| InspectError::Summary(format!("forward failed for input {input_shape}: {e}")))
        })?;

        let mut shapes = Vec::new();
        collect_output_shapes(&outputs, &mut shapes);
        if shapes.is_empty() {
            return Err(InspectError::NotForwardComputable(
                "forward returned no tensors".to_string(),
            ));
        }

        let mut rows: Vec<LayerRow> = self
            .groups
            .iter()
            .enumerate()
            .map(|(idx, group)| LayerRow {
                name: format!("{}-{}", group.prefix, idx + 1),
                path: group.prefix.clone(),
                layer_type: "Parameters".to_string(),
                output_shape: None,
                params: group.params,
                trainable_params: group.trainable_params,
            })
            .collect();

        let offset = rows.len();
        rows.extend(shapes.iter().enumerate().map(|(idx, shape)| LayerRow {
            name: format!("Output-{}", offset + idx + 1),
            path: format!("forward.{idx}"),
            layer_type: "Output".to_string(),
            output_shape: Some(LayerRow::unbatched(shape)),
            params: 0,
            trainable_params: 0,
        }));

        Ok(ModelSummary::new(input_shape, rows))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use tch::nn;

    #[test]
    fn test_group_parameters_merges_weight_and_bias() {
        let vs = nn::VarStore::new(Device::Cpu);
        let root = vs.root();
        let _conv = nn::conv2d(&root / "encoder" / "conv1", 3, 16, 8, Default::default());
        let _head = nn::linear(&root / "mu", 256, 3, Default::default());

        let mut named: Vec<(String, Tensor)> = vs.variables().into_iter().collect();
        named.sort_by(|a, b| a.0.cmp(&b.0));
        let groups = group_parameters(&named);

        let prefixes: Vec<&str> = groups.iter().map(|g| g.prefix.as_str()).collect();
        assert_eq!(prefixes, vec!["encoder.conv1", "mu"]);
        assert_eq!(groups[0].params, 3 * 16 * 64 + 16);
        assert_eq!(groups[1].params, 256 * 3 + 3);
        assert_eq!(groups[1].trainable_params, groups[1].params);
    }

    #[test]
    fn test_collect_nested_outputs() {
        let a = Tensor::zeros([2, 3], (Kind::Float, Device::Cpu));
        let b = Tensor::zeros([2, 1], (Kind::Float, Device::Cpu));
        let value = IValue::Tuple(vec![IValue::Tensor(a), IValue::Int(3), IValue::Tensor(b)]);

        let mut shapes = Vec::new();
        collect_output_shapes(&value, &mut shapes);
        assert_eq!(shapes, vec![vec![2, 3], vec![2, 1]]);
    }

    #[test]
    fn test_invalid_module_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("actor.pt");
        std::fs::write(&path, b"not a torchscript archive").unwrap();

        assert_matches!(
            TorchScriptModel::load(&path, Device::Cpu),
            Err(InspectError::Deserialize { .. })
        );
    }
}
