//! Model definitions, attribute classification and dependency ordering.

pub mod classifier;
pub mod graph;
pub mod model;

pub use classifier::{classify_table, ClassifyContext};
pub use graph::{CreationOrder, DependencyGraph};
pub use model::{ModelDefinition, ModelSet};
