//! Declarative pipeline configuration: stage descriptors, the tag registry
//! resolving them to concrete stages, and template substitution.
mod descriptor;
mod registry;
mod template;

pub use descriptor::{PipelineDescriptor, StageDescriptor};
pub use registry::{Constructor, Registry};
pub use template::substitute;
