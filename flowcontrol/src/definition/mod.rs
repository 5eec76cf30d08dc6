//! Barrier discovery in pipeline definitions.
//!
//! The scanner walks the compiled pipeline YAML for `flowControl` barrier
//! declarations and for every barrier step that references one. The
//! resolver turns that into per-barrier setup info and ordered positions.

mod resolver;
mod scanner;
mod yaml;

pub use resolver::{BarrierPositionResolver, ResolvedBarriers};
pub use scanner::{BarrierDeclaration, BarrierDefinitionScanner, BarrierReference, ScannedDefinition};
pub use yaml::BARRIER_STEP_TYPE;
