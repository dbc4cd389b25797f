//! Settings DSL fixtures and the structural model used to check imports.

pub mod compare;
pub mod model;
pub mod templates;

pub use compare::{compare, ActualBuildType, ActualProject, Mismatch};
pub use model::{BuildTypeDef, PipelineDefinition, StepDef};
pub use templates::TemplateLoader;
