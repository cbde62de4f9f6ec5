//! # Actor Inspect
//!
//! Loads a trained reinforcement-learning actor checkpoint and reports its
//! layer structure and parameter counts for a fixed visual input shape.
//!
//! ## Features
//!
//! - **Checkpoint resolution**: results/round/agent/run layout with an existence check
//! - **Typed loading**: safetensors checkpoints carrying their layer graph, or TorchScript modules
//! - **Summaries**: per-layer output shapes, parameter counts and memory estimates
//!
//! ## Usage
//!
//! ```rust,no_run
//! use actor_inspect::{InspectorConfig, ModelInspector};
//!
//! let summary = ModelInspector::new(InspectorConfig::default()).run()?;
//! println!("{summary}");
//! # Ok::<(), actor_inspect::InspectError>(())
//! ```

// ============================================================================
// PUBLIC API MODULES
// ============================================================================

/// Checkpoint path resolution and format detection
pub mod checkpoint;

/// Inspector configuration
pub mod config;

/// The load-and-summarize pipeline
pub mod inspector;

/// Log backend setup
pub mod logging;

/// Layer graphs, checkpoint I/O and TorchScript loading
pub mod neural;

/// Summary model and renderers
pub mod summary;

// ============================================================================
// PUBLIC API RE-EXPORTS
// ============================================================================

pub use checkpoint::{CheckpointFormat, CheckpointPath};
pub use config::{DeviceChoice, InspectorConfig};
pub use inspector::{LoadedModel, ModelInspector};
pub use neural::input_shape::{InputShape, VISUAL_OBSERVATION};
pub use summary::{LayerRow, ModelSummary, OutputFormat, Summarize};

// ============================================================================
// ERROR TYPES
// ============================================================================

use std::path::PathBuf;

/// Main error type for the inspector
#[derive(Debug, thiserror::Error)]
pub enum InspectError {
    #[error("could not find model at {}", path.display())]
    CheckpointNotFound {
        path: PathBuf,
        available: Vec<PathBuf>,
    },

    #[error("unsupported checkpoint extension {extension:?} for {}", path.display())]
    UnsupportedFormat { path: PathBuf, extension: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to deserialize {}: {reason}", path.display())]
    Deserialize { path: PathBuf, reason: String },

    #[error("failed to write checkpoint {}: {reason}", path.display())]
    Serialize { path: PathBuf, reason: String },

    #[error("checkpoint {} does not declare an architecture", path.display())]
    MissingArchitecture { path: PathBuf },

    #[error("invalid architecture: {0}")]
    InvalidArchitecture(String),

    #[error("tensor '{name}' is missing from the checkpoint")]
    MissingTensor { name: String },

    #[error("tensor '{name}' has shape {found:?}, architecture expects {expected:?}")]
    TensorShapeMismatch {
        name: String,
        expected: Vec<i64>,
        found: Vec<i64>,
    },

    #[error("checkpoint holds tensor '{name}' that no layer uses")]
    UnexpectedTensor { name: String },

    #[error("tensor '{name}' has unsupported dtype {dtype}")]
    UnsupportedDtype { name: String, dtype: String },

    #[error("model is not forward-computable: {0}")]
    NotForwardComputable(String),

    #[error("layer {layer} expects input {expected}, got {found:?}")]
    ShapeMismatch {
        layer: String,
        expected: String,
        found: Vec<i64>,
    },

    #[error("device {0} is not available")]
    DeviceUnavailable(String),

    #[error("summary failed: {0}")]
    Summary(String),

    #[error("failed to render summary: {0}")]
    Render(String),
}

impl From<tch::TchError> for InspectError {
    fn from(err: tch::TchError) -> Self {
        InspectError::Summary(err.to_string())
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, InspectError>;

// ============================================================================
// LIBRARY VERSION INFO
// ============================================================================

/// Library version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// Library description
pub const DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");
