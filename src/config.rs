//! Inspector configuration
//!
//! Every value that used to be baked into the inspection script lives here so
//! the inspector can be pointed at arbitrary fixtures.

use std::path::PathBuf;

use tch::Device;

use crate::neural::input_shape::{InputShape, VISUAL_OBSERVATION};
use crate::summary::OutputFormat;
use crate::{InspectError, Result};

pub const DEFAULT_RESULTS_DIR: &str = "results";
pub const DEFAULT_ROUND_LABEL: &str = "VisualFoodCollector_round3";
pub const DEFAULT_AGENT_NAME: &str = "VisualFoodCollector";
pub const DEFAULT_RUN_ID: &str = "VisualFoodCollector-16759939";
pub const DEFAULT_EXTENSION: &str = "pt";

/// Device the checkpoint is loaded onto
#[derive(clap::ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DeviceChoice {
    #[default]
    Cpu,
    Cuda,
    Mps,
}

impl DeviceChoice {
    /// Resolve to a tch device, refusing to fall back silently to the CPU.
    pub fn to_device(self) -> Result<Device> {
        match self {
            DeviceChoice::Cpu => Ok(Device::Cpu),
            DeviceChoice::Cuda if tch::Cuda::is_available() => Ok(Device::Cuda(0)),
            DeviceChoice::Mps if tch::utils::has_mps() => Ok(Device::Mps),
            other => Err(InspectError::DeviceUnavailable(format!("{other:?}").to_lowercase())),
        }
    }
}

/// Configuration for a single inspection run
#[derive(Debug, Clone)]
pub struct InspectorConfig {
    /// Base directory the results tree is resolved against
    pub working_dir: PathBuf,
    /// Results root below the working directory
    pub results_dir: String,
    /// Training round label (first level below the results root)
    pub round_label: String,
    /// Behavior / agent name
    pub agent_name: String,
    /// Run identifier, used as the checkpoint file stem
    pub run_id: String,
    /// Checkpoint file extension, decides the loader
    pub extension: String,
    /// Explicit checkpoint file, bypasses the results layout when set
    pub checkpoint: Option<PathBuf>,
    /// Input shape the summary assumes
    pub input_shape: InputShape,
    /// Device to load the model onto
    pub device: DeviceChoice,
    /// Rendering of the summary on stdout
    pub output: OutputFormat,
}

impl Default for InspectorConfig {
    fn default() -> Self {
        Self {
            working_dir: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            results_dir: DEFAULT_RESULTS_DIR.to_string(),
            round_label: DEFAULT_ROUND_LABEL.to_string(),
            agent_name: DEFAULT_AGENT_NAME.to_string(),
            run_id: DEFAULT_RUN_ID.to_string(),
            extension: DEFAULT_EXTENSION.to_string(),
            checkpoint: None,
            input_shape: VISUAL_OBSERVATION,
            device: DeviceChoice::Cpu,
            output: OutputFormat::Text,
        }
    }
}

impl InspectorConfig {
    /// Default layout rooted at `working_dir` instead of the process cwd
    pub fn in_dir(working_dir: impl Into<PathBuf>) -> Self {
        Self {
            working_dir: working_dir.into(),
            ..Default::default()
        }
    }

    pub fn with_run(mut self, run_id: impl Into<String>, extension: impl Into<String>) -> Self {
        self.run_id = run_id.into();
        self.extension = extension.into();
        self
    }

    pub fn with_input_shape(mut self, input_shape: InputShape) -> Self {
        self.input_shape = input_shape;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_food_collector_run() {
        let config = InspectorConfig::in_dir("/data");
        assert_eq!(config.working_dir, PathBuf::from("/data"));
        assert_eq!(config.results_dir, "results");
        assert_eq!(config.round_label, "VisualFoodCollector_round3");
        assert_eq!(config.agent_name, "VisualFoodCollector");
        assert_eq!(config.run_id, "VisualFoodCollector-16759939");
        assert_eq!(config.extension, "pt");
        assert_eq!(config.input_shape, InputShape::new(3, 84, 84));
        assert_eq!(config.device, DeviceChoice::Cpu);
        assert!(config.checkpoint.is_none());
    }

    #[test]
    fn test_builders_override_run() {
        let config = InspectorConfig::in_dir("/data")
            .with_run("Actor-1", "safetensors")
            .with_input_shape(InputShape::new(1, 64, 64));
        assert_eq!(config.run_id, "Actor-1");
        assert_eq!(config.extension, "safetensors");
        assert_eq!(config.input_shape.channels, 1);
    }

    #[test]
    fn test_cpu_device_always_resolves() {
        assert_eq!(DeviceChoice::Cpu.to_device().unwrap(), Device::Cpu);
    }
}
