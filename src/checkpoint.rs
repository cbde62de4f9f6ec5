//! Checkpoint location and format
//!
//! Training runs are laid out as
//! `<working_dir>/<results>/<round>/<agent>/<run_id>.<ext>`.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::config::InspectorConfig;
use crate::{InspectError, Result};

/// On-disk encoding of a checkpoint, decided by its extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckpointFormat {
    /// Safetensors weights with the layer graph in the header metadata
    Safetensors,
    /// Serialized TorchScript module
    TorchScript,
}

impl CheckpointFormat {
    pub fn from_extension(extension: &str) -> Option<Self> {
        match extension.to_ascii_lowercase().as_str() {
            "safetensors" => Some(CheckpointFormat::Safetensors),
            "pt" | "pth" | "ts" => Some(CheckpointFormat::TorchScript),
            _ => None,
        }
    }
}

impl fmt::Display for CheckpointFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CheckpointFormat::Safetensors => write!(f, "safetensors"),
            CheckpointFormat::TorchScript => write!(f, "torchscript"),
        }
    }
}

/// Resolved checkpoint file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckpointPath {
    path: PathBuf,
}

impl CheckpointPath {
    /// Join the configured layout onto the working directory.
    ///
    /// An explicit `checkpoint` in the config wins; relative explicit paths are
    /// still resolved against the working directory.
    pub fn from_config(config: &InspectorConfig) -> Self {
        let path = match &config.checkpoint {
            Some(explicit) => config.working_dir.join(explicit),
            None => config
                .working_dir
                .join(&config.results_dir)
                .join(&config.round_label)
                .join(&config.agent_name)
                .join(format!("{}.{}", config.run_id, config.extension)),
        };
        Self { path }
    }

    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn as_path(&self) -> &Path {
        &self.path
    }

    pub fn format(&self) -> Result<CheckpointFormat> {
        let extension = self
            .path
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or_default();
        CheckpointFormat::from_extension(extension).ok_or_else(|| InspectError::UnsupportedFormat {
            path: self.path.clone(),
            extension: extension.to_string(),
        })
    }

    /// Fail unless the path names an existing regular file.
    pub fn ensure_exists(&self) -> Result<()> {
        if self.path.is_file() {
            return Ok(());
        }
        Err(InspectError::CheckpointNotFound {
            path: self.path.clone(),
            available: self.sibling_checkpoints(),
        })
    }

    /// Other checkpoints in the same agent directory, for error reports.
    pub fn sibling_checkpoints(&self) -> Vec<PathBuf> {
        let Some(dir) = self.path.parent() else {
            return Vec::new();
        };
        let pattern = glob::Pattern::escape(&dir.to_string_lossy());
        let mut found: Vec<PathBuf> = ["pt", "pth", "ts", "safetensors"]
            .iter()
            .filter_map(|ext| glob::glob(&format!("{pattern}/*.{ext}")).ok())
            .flat_map(|paths| paths.filter_map(|entry| entry.ok()))
            .filter(|candidate| candidate.is_file())
            .collect();
        found.sort();
        found
    }
}

impl fmt::Display for CheckpointPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path.display())
    }
}
