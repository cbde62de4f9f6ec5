//! Model inspection pipeline
//!
//! Resolve the checkpoint path, fail fast when it is absent, load it into a
//! typed model and summarize it for the configured input shape. Execution is
//! strictly linear; any failure ends the run.

use crate::checkpoint::{CheckpointFormat, CheckpointPath};
use crate::config::InspectorConfig;
use crate::neural::input_shape::InputShape;
use crate::neural::{load_actor, ActorNetwork, TorchScriptModel};
use crate::summary::{ModelSummary, Summarize};
use crate::Result;

/// A checkpoint after typed loading
pub enum LoadedModel {
    Actor(ActorNetwork),
    TorchScript(TorchScriptModel),
}

impl Summarize for LoadedModel {
    fn summarize(&self, input_shape: InputShape) -> Result<ModelSummary> {
        match self {
            LoadedModel::Actor(actor) => actor.summarize(input_shape),
            LoadedModel::TorchScript(module) => module.summarize(input_shape),
        }
    }
}

pub struct ModelInspector {
    config: InspectorConfig,
}

impl ModelInspector {
    pub fn new(config: InspectorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &InspectorConfig {
        &self.config
    }

    pub fn checkpoint_path(&self) -> CheckpointPath {
        CheckpointPath::from_config(&self.config)
    }

    /// Deserialize an existing checkpoint onto the configured device.
    pub fn load(&self, checkpoint: &CheckpointPath) -> Result<LoadedModel> {
        let format = checkpoint.format()?;
        let device = self.config.device.to_device()?;
        log::info!("📂 Loading {format} checkpoint {checkpoint} on {device:?}");

        let model = match format {
            CheckpointFormat::Safetensors => {
                let actor = load_actor(checkpoint.as_path(), device)?;
                log::info!(
                    "✅ Actor '{}' rebuilt with {} layers",
                    actor.architecture().behavior_name,
                    actor.layers().len()
                );
                LoadedModel::Actor(actor)
            }
            CheckpointFormat::TorchScript => {
                let module = TorchScriptModel::load(checkpoint.as_path(), device)?;
                log::info!(
                    "✅ TorchScript module loaded with {} parameters",
                    module.parameter_count()
                );
                LoadedModel::TorchScript(module)
            }
        };
        Ok(model)
    }

    pub fn run(&self) -> Result<ModelSummary> {
        let checkpoint = self.checkpoint_path();
        log::info!("🔍 Inspecting {checkpoint}");

        if let Err(err) = checkpoint.ensure_exists() {
            log::warn!("⚠️ Could not find model at {checkpoint}");
            return Err(err);
        }

        let model = self.load(&checkpoint)?;
        let summary = model.summarize(self.config.input_shape)?;
        log::info!(
            "📊 {} rows, {} parameters for input {}",
            summary.rows.len(),
            summary.total_params,
            self.config.input_shape
        );
        Ok(summary)
    }
}
