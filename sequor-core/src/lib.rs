//! Sequor Core Library
//!
//! This crate provides the foundational types for the sequor sequence
//! engine: the dynamic value model, the condition/binding expression
//! language, the sequence definition format with its validator, the
//! compiled sequence graph, the variable store, and the result registry.
//!
//! # Overview
//!
//! A *sequence* is a directed control-flow graph declared in a YAML file.
//! Nodes are typed (`start`, `stop`, `function`, `variable`,
//! `parallel_split`, `parallel_sync`) and connected by transitions that
//! may carry a condition expression. This crate turns such a file into an
//! immutable [`SequenceGraph`]; the `sequor-runner` crate drives tokens
//! through it.
//!
//! # Example
//!
//! ```ignore
//! use sequor_core::prelude::*;
//!
//! let definition = SequenceDefinition::from_yaml_validated(yaml)?;
//! let graph = definition.compile()?;
//! for node_id in graph.start_nodes() {
//!     println!("entry point: {node_id}");
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod expr;
pub mod logging;
pub mod result;
pub mod seq;
pub mod types;
pub mod value;
pub mod variables;

/// Re-export all common types for easy access.
pub mod prelude {
    pub use crate::error::{Result, SequorError};
    pub use crate::expr::{evaluate, evaluate_condition, parse, Expr};
    pub use crate::logging::{BufferedCollector, LogCollector, LogEvent, LogLevel};
    pub use crate::result::{ErrInfo, NodeException, NodeResult};
    pub use crate::seq::{
        NodeDefinition, SequenceDefinition, SequenceGraph, TransitionDefinition,
    };
    pub use crate::types::{NodeId, RunId};
    pub use crate::value::Value;
    pub use crate::variables::{Env, VariableStore};
}

// Re-export key types at crate root for convenience
pub use error::{Result, SequorError};
pub use result::{ErrInfo, NodeException, NodeResult};
pub use seq::{NodeDefinition, SequenceDefinition, SequenceGraph, TransitionDefinition};
pub use types::{NodeId, RunId};
pub use value::Value;
pub use variables::{Env, VariableStore};
