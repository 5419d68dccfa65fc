//! Model loading and capability description

mod artifact;
mod capability;
mod loader;

pub use artifact::{ModelArtifact, ModelInfo, ModelMetadata};
pub(crate) use artifact::format_label;
pub use capability::{Capability, CapabilityDescriptor};
pub use loader::{ArtifactFormat, ModelLoader};
