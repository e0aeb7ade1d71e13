//! Sequence definitions and the compiled sequence graph.
//!
//! A sequence file is deserialized into a [`SequenceDefinition`], checked
//! by the validator, and compiled into an immutable [`SequenceGraph`] that
//! the runner traverses. The definition is round-trippable: loading,
//! serializing, and re-loading yields an identical document.

mod definition;
mod graph;
mod node;
mod transition;
mod validation;

pub use definition::{SequenceDefinition, SequenceLimits};
pub use graph::{FunctionSpec, GraphNode, NodeKind, SequenceGraph, Transition, VariableSpec, WrapperSpec};
pub use node::{Assignment, NodeDefinition, WrapperDefinition};
pub use transition::TransitionDefinition;
pub use validation::{SequenceValidator, ValidationError, ValidationErrorKind, ValidationResult};
