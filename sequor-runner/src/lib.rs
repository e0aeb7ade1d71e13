//! Sequor Runner
//!
//! The execution engine for sequor sequences: function and wrapper
//! registries, the token scheduler with the colored fork/join protocol,
//! and the public [`SequenceRunner`] API.
//!
//! # Overview
//!
//! The scheduler advances *tokens* through the compiled graph. A single
//! coordinator task owns all mutable state (variable store, result
//! registry, sync arrival map); function nodes are dispatched to a
//! bounded pool of worker tasks and report back over a completion
//! channel. Each firing of a `parallel_split` mints a fresh *color*
//! stamped on the tokens it emits, and the matching `parallel_sync`
//! aggregates arrivals per color, so looped re-entry into a split can
//! never mix waves.
//!
//! # Example
//!
//! ```ignore
//! use sequor_runner::prelude::*;
//!
//! let mut functions = FunctionRegistry::new();
//! functions.register_fn("hello", |args, _ctx| {
//!     let who = args.get("who").cloned().unwrap_or_default();
//!     Ok(Value::string(format!("Hello {who}!")))
//! });
//!
//! let runner = SequenceRunner::new(graph, functions, WrapperRegistry::new())?;
//! let outcome = runner.run().await;
//! assert_eq!(outcome.status, RunStatus::Completed);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod functions;
pub mod runner;
pub mod scheduler;
pub mod wrappers;

/// Re-export all common types for easy access.
pub mod prelude {
    pub use crate::functions::{CallContext, FunctionError, FunctionRegistry, Kwargs, SeqFunction};
    pub use crate::runner::{RunHandle, RunOutcome, RunStatus, RunnerOptions, SequenceRunner};
    pub use crate::scheduler::RunStats;
    pub use crate::wrappers::{Wrapper, WrapperFactory, WrapperRegistry};
    pub use sequor_core::prelude::*;
}

pub use functions::{CallContext, FunctionError, FunctionRegistry, Kwargs, SeqFunction};
pub use runner::{RunHandle, RunOutcome, RunStatus, RunnerOptions, SequenceRunner};
pub use scheduler::RunStats;
pub use wrappers::{Wrapper, WrapperFactory, WrapperRegistry};
