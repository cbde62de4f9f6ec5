//! Actor checkpoints in safetensors format
//!
//! The weights are stored as plain safetensors tensors named after their
//! variable path (`encoder.conv1.weight`, ...). The layer graph travels in the
//! header metadata under [`ARCHITECTURE_KEY`] as JSON, so a checkpoint is
//! self-describing and can be rebuilt without any code that knows the model.

use safetensors::tensor::{Dtype, SafeTensors, TensorView};
use safetensors::serialize_to_file;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::Path;
use tch::{Device, Kind, Tensor};

use crate::neural::actor::{ActorArchitecture, ActorNetwork};
use crate::{InspectError, Result};

/// Metadata entry holding the JSON layer graph
pub const ARCHITECTURE_KEY: &str = "architecture";

/// Save an actor's variables and layer graph to a safetensors file
pub fn save_actor(actor: &ActorNetwork, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let serialize_err = |reason: String| InspectError::Serialize {
        path: path.to_path_buf(),
        reason,
    };

    let variables = actor.varstore().variables();
    let mut buffers: BTreeMap<String, (Vec<usize>, Vec<u8>, Dtype)> = BTreeMap::new();
    for (name, tensor) in variables {
        let shape: Vec<usize> = tensor.size().iter().map(|&x| x as usize).collect();
        let (data, dtype) = tensor_to_bytes(&tensor).map_err(|e| serialize_err(format!("{name}: {e}")))?;
        buffers.insert(name, (shape, data, dtype));
    }

    let tensor_views = buffers
        .iter()
        .map(|(name, (shape, data, dtype))| {
            TensorView::new(*dtype, shape.clone(), data)
                .map(|view| (name.clone(), view))
                .map_err(|e| serialize_err(format!("{name}: {e}")))
        })
        .collect::<Result<Vec<_>>>()?;

    let architecture = serde_json::to_string(actor.architecture())
        .map_err(|e| serialize_err(e.to_string()))?;
    let metadata = Some(HashMap::from([(ARCHITECTURE_KEY.to_string(), architecture)]));

    serialize_to_file(tensor_views, &metadata, path).map_err(|e| serialize_err(e.to_string()))?;
    log::debug!("Saved {} tensors to {}", buffers.len(), path.display());
    Ok(())
}

/// Load an actor from a safetensors file, rebuilding its graph from metadata.
///
/// Every variable of the declared graph must be present with the declared
/// shape, and the file may not carry tensors the graph does not use. All of
/// this is checked against the file before any variable is allocated.
pub fn load_actor(path: impl AsRef<Path>, device: Device) -> Result<ActorNetwork> {
    let path = path.as_ref();
    let deserialize_err = |reason: String| InspectError::Deserialize {
        path: path.to_path_buf(),
        reason,
    };

    let buffer = fs::read(path).map_err(|e| deserialize_err(e.to_string()))?;
    let (_, metadata) =
        SafeTensors::read_metadata(&buffer).map_err(|e| deserialize_err(e.to_string()))?;
    let architecture_json = metadata
        .metadata()
        .as_ref()
        .and_then(|entries| entries.get(ARCHITECTURE_KEY))
        .ok_or_else(|| InspectError::MissingArchitecture {
            path: path.to_path_buf(),
        })?;
    let architecture: ActorArchitecture = serde_json::from_str(architecture_json)
        .map_err(|e| InspectError::InvalidArchitecture(e.to_string()))?;
    architecture.validate()?;

    let tensors = SafeTensors::deserialize(&buffer).map_err(|e| deserialize_err(e.to_string()))?;

    let expected = architecture.variables();
    let expected_names: HashSet<&str> = expected.iter().map(|(name, _)| name.as_str()).collect();
    let mut stored: Vec<&String> = tensors.names();
    stored.sort();
    if let Some(extra) = stored.iter().find(|name| !expected_names.contains(name.as_str())) {
        return Err(InspectError::UnexpectedTensor {
            name: extra.to_string(),
        });
    }

    let mut loaded = Vec::with_capacity(expected.len());
    for (name, shape) in &expected {
        let view = tensors
            .tensor(name)
            .map_err(|_| InspectError::MissingTensor { name: name.clone() })?;
        let found: Vec<i64> = view.shape().iter().map(|&x| x as i64).collect();
        if &found != shape {
            return Err(InspectError::TensorShapeMismatch {
                name: name.clone(),
                expected: shape.clone(),
                found,
            });
        }
        let tensor = tensor_view_to_tensor(name, &view)?
            .f_reshape(shape)
            .map_err(|e| deserialize_err(format!("{name}: {e}")))?;
        loaded.push((name, tensor));
    }

    let actor = ActorNetwork::new(architecture, device)?;
    let mut variables = actor.varstore().variables();
    for (name, tensor) in loaded {
        let var = variables
            .get_mut(name)
            .ok_or_else(|| InspectError::MissingTensor { name: name.clone() })?;
        tch::no_grad(|| var.f_copy_(&tensor)).map_err(|e| deserialize_err(format!("{name}: {e}")))?;
    }

    log::debug!(
        "Loaded {} tensors for behavior {}",
        expected.len(),
        actor.architecture().behavior_name
    );
    Ok(actor)
}

fn tensor_to_bytes(tensor: &Tensor) -> std::result::Result<(Vec<u8>, Dtype), tch::TchError> {
    // Flatten the tensor for conversion, then get contiguous data on CPU
    let tensor = tensor.to_device(Device::Cpu).flatten(0, -1).contiguous();

    match tensor.kind() {
        Kind::Double => {
            let data: Vec<f64> = Vec::<f64>::try_from(&tensor)?;
            Ok((data.iter().flat_map(|x| x.to_le_bytes()).collect(), Dtype::F64))
        }
        // Half precision is widened, the loader narrows it back on copy
        _ => {
            let data: Vec<f32> = Vec::<f32>::try_from(&tensor.to_kind(Kind::Float))?;
            Ok((data.iter().flat_map(|x| x.to_le_bytes()).collect(), Dtype::F32))
        }
    }
}

/// Flat tensor holding the view's values; the caller restores the shape.
fn tensor_view_to_tensor(name: &str, view: &TensorView) -> Result<Tensor> {
    let data = view.data();

    let tensor = match view.dtype() {
        Dtype::F32 => {
            let floats: Vec<f32> = data
                .chunks_exact(4)
                .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
                .collect();
            Tensor::from_slice(&floats)
        }
        Dtype::F64 => {
            let doubles: Vec<f64> = data
                .chunks_exact(8)
                .map(|chunk| {
                    f64::from_le_bytes([
                        chunk[0], chunk[1], chunk[2], chunk[3],
                        chunk[4], chunk[5], chunk[6], chunk[7],
                    ])
                })
                .collect();
            Tensor::from_slice(&doubles)
        }
        other => {
            return Err(InspectError::UnsupportedDtype {
                name: name.to_string(),
                dtype: format!("{other:?}"),
            })
        }
    };
    Ok(tensor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::neural::actor::ActorSettings;
    use crate::neural::input_shape::VISUAL_OBSERVATION;
    use assert_matches::assert_matches;
    use safetensors::tensor::View;

    fn actor() -> ActorNetwork {
        let arch = ActorArchitecture::visual("VisualFoodCollector", VISUAL_OBSERVATION, ActorSettings::default())
            .unwrap();
        ActorNetwork::new(arch, Device::Cpu).unwrap()
    }

    #[test]
    fn test_save_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("actor.safetensors");
        let original = actor();
        save_actor(&original, &path).unwrap();

        let loaded = load_actor(&path, Device::Cpu).unwrap();
        assert_eq!(loaded.architecture(), original.architecture());

        let loaded_vars = loaded.varstore().variables();
        for (name, t1) in original.varstore().variables() {
            assert!(t1.allclose(&loaded_vars[&name], 1e-6, 1e-6, false), "{name}");
        }
    }

    #[test]
    fn test_missing_architecture_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("weights.safetensors");
        let data = vec![0u8; 8];
        let view = TensorView::new(Dtype::F32, vec![2], &data).unwrap();
        serialize_to_file(vec![("w", view)], &None, &path).unwrap();

        assert_matches!(
            load_actor(&path, Device::Cpu),
            Err(InspectError::MissingArchitecture { .. })
        );
    }

    #[test]
    fn test_garbage_is_a_deserialize_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("actor.safetensors");
        fs::write(&path, b"definitely not a checkpoint").unwrap();

        assert_matches!(
            load_actor(&path, Device::Cpu),
            Err(InspectError::Deserialize { .. })
        );
    }

    /// Rewrites a saved checkpoint with `edit` applied to its tensor table.
    fn rewrite(
        path: &Path,
        edit: impl FnOnce(&mut BTreeMap<String, (Dtype, Vec<usize>, Vec<u8>)>),
    ) {
        let buffer = fs::read(path).unwrap();
        let (_, metadata) = SafeTensors::read_metadata(&buffer).unwrap();
        let tensors = SafeTensors::deserialize(&buffer).unwrap();
        let mut table: BTreeMap<String, (Dtype, Vec<usize>, Vec<u8>)> = tensors
            .tensors()
            .into_iter()
            .map(|(name, view)| {
                (name, (view.dtype(), view.shape().to_vec(), view.data().to_vec()))
            })
            .collect();
        edit(&mut table);

        let views: Vec<(String, TensorView)> = table
            .iter()
            .map(|(name, (dtype, shape, data))| {
                (name.clone(), TensorView::new(*dtype, shape.clone(), data).unwrap())
            })
            .collect();
        serialize_to_file(views, metadata.metadata(), path).unwrap();
    }

    #[test]
    fn test_missing_tensor_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("actor.safetensors");
        save_actor(&actor(), &path).unwrap();
        rewrite(&path, |table| {
            table.remove("action_head.mu.bias");
        });

        assert_matches!(
            load_actor(&path, Device::Cpu),
            Err(InspectError::MissingTensor { name }) if name == "action_head.mu.bias"
        );
    }

    #[test]
    fn test_unexpected_tensor_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("actor.safetensors");
        save_actor(&actor(), &path).unwrap();
        rewrite(&path, |table| {
            table.insert("critic.value.weight".to_string(), (Dtype::F32, vec![1], vec![0; 4]));
        });

        assert_matches!(
            load_actor(&path, Device::Cpu),
            Err(InspectError::UnexpectedTensor { name }) if name == "critic.value.weight"
        );
    }

    #[test]
    fn test_reshaped_tensor_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("actor.safetensors");
        save_actor(&actor(), &path).unwrap();
        rewrite(&path, |table| {
            let entry = table.get_mut("action_head.mu.bias").unwrap();
            entry.1 = vec![1, 3];
        });

        assert_matches!(
            load_actor(&path, Device::Cpu),
            Err(InspectError::TensorShapeMismatch { expected, found, .. }) => {
                assert_eq!(expected, vec![3]);
                assert_eq!(found, vec![1, 3]);
            }
        );
    }

    #[test]
    fn test_double_precision_weights_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("actor.safetensors");
        save_actor(&actor(), &path).unwrap();
        rewrite(&path, |table| {
            let entry = table.get_mut("action_head.mu.bias").unwrap();
            entry.0 = Dtype::F64;
            entry.2 = [0.5f64, -0.25, 1.0].iter().flat_map(|x| x.to_le_bytes()).collect();
        });

        let loaded = load_actor(&path, Device::Cpu).unwrap();
        let bias = &loaded.varstore().variables()["action_head.mu.bias"];
        assert_eq!(bias.kind(), Kind::Float);
        assert!((bias.double_value(&[1]) + 0.25).abs() < 1e-6);
    }

    /// Writes `layers` as the architecture metadata next to `tensors`.
    fn write_declared(path: &Path, layers: serde_json::Value, tensors: Vec<(&str, TensorView)>) {
        let architecture = serde_json::json!({ "behavior_name": "Agent", "layers": layers });
        let metadata = Some(HashMap::from([(
            ARCHITECTURE_KEY.to_string(),
            architecture.to_string(),
        )]));
        serialize_to_file(tensors, &metadata, path).unwrap();
    }

    #[test]
    fn test_huge_declared_layer_fails_before_allocation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("actor.safetensors");
        // 4e10 floats would be 160 GB if the graph were built first
        let data = vec![0u8; 8];
        let view = TensorView::new(Dtype::F32, vec![2], &data).unwrap();
        write_declared(
            &path,
            serde_json::json!([
                { "name": "head", "type": "linear", "in_features": 200000, "out_features": 200000 }
            ]),
            vec![("head.bias", view)],
        );

        assert_matches!(
            load_actor(&path, Device::Cpu),
            Err(InspectError::MissingTensor { name }) if name == "head.weight"
        );
    }

    #[test]
    fn test_overflowing_declared_layer_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("actor.safetensors");
        write_declared(
            &path,
            serde_json::json!([
                { "name": "head", "type": "linear", "in_features": 4294967296i64, "out_features": 4294967296i64 }
            ]),
            Vec::new(),
        );

        assert_matches!(
            load_actor(&path, Device::Cpu),
            Err(InspectError::InvalidArchitecture(_))
        );
    }

    #[test]
    fn test_unreadable_path_names_the_checkpoint() {
        let dir = tempfile::tempdir().unwrap();

        assert_matches!(
            load_actor(dir.path(), Device::Cpu),
            Err(InspectError::Deserialize { path, .. }) if path == dir.path()
        );
    }

    #[test]
    fn test_views_are_contiguous_bytes() {
        let original = actor();
        let variables = original.varstore().variables();
        let (bytes, dtype) = tensor_to_bytes(&variables["encoder.conv1.bias"]).unwrap();
        assert_eq!(dtype, Dtype::F32);
        let view = TensorView::new(dtype, vec![16], &bytes).unwrap();
        assert_eq!(view.data_len(), 16 * 4);
    }
}
