pub mod actor;
pub mod input_shape;
pub mod layer;
pub mod model_io;
pub mod torchscript;

// Re-export key components for convenience
pub use actor::{ActorArchitecture, ActorNetwork, ActorSettings, VisualEncoder};
pub use model_io::{load_actor, save_actor};
pub use torchscript::TorchScriptModel;
