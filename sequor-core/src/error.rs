//! Error types for sequor.
//!
//! This module provides strongly-typed errors with actionable context.
//! All errors include the relevant identifiers (node ID, expression text,
//! variable name) to aid in debugging a misbehaving sequence.

use crate::types::NodeId;
use std::path::PathBuf;
use thiserror::Error;

/// The main error type for sequor operations.
#[derive(Error, Debug)]
pub enum SequorError {
    // =========================================================================
    // Expression Errors (E100-E199)
    // =========================================================================
    /// The expression could not be tokenized or parsed.
    #[error("E101: Syntax error in expression '{expr}': {cause}")]
    ExpressionSyntax {
        /// The expression text that failed to parse.
        expr: String,
        /// Description of the syntax error.
        cause: String,
    },

    /// The expression parsed but failed to evaluate.
    #[error("E102: Failed to evaluate expression '{expr}': {cause}")]
    ExpressionEval {
        /// The expression text that failed to evaluate.
        expr: String,
        /// Reason for the evaluation failure.
        cause: String,
    },

    /// A transition condition evaluated to a non-boolean value.
    #[error("E103: Condition '{expr}' did not return a boolean (got {actual})")]
    ConditionNotBoolean {
        /// The condition expression.
        expr: String,
        /// The type of value the condition produced.
        actual: String,
    },

    // =========================================================================
    // Variable Store Errors (E200-E299)
    // =========================================================================
    /// A variable node or return alias targeted a protected or constant name.
    #[error("E201: Cannot write variable '{name}': {cause}")]
    ProtectedWrite {
        /// The name that was rejected.
        name: String,
        /// Why the write was rejected.
        cause: String,
    },

    // =========================================================================
    // Execution Errors (E300-E399)
    // =========================================================================
    /// A node completed but none of its outgoing transitions was satisfied.
    #[error("E301: Node {node_id} has no satisfied outgoing transition")]
    NoTransitionFired {
        /// The node whose transitions all evaluated false.
        node_id: NodeId,
    },

    /// A function node references a name missing from the registry.
    #[error("E302: Function '{function}' required by node {node_id} is not registered")]
    UnknownFunction {
        /// The unregistered function name.
        function: String,
        /// The node that references it.
        node_id: NodeId,
    },

    /// A wrapper declaration references a name missing from the registry.
    #[error("E303: Wrapper '{wrapper}' required by node {node_id} is not registered")]
    UnknownWrapper {
        /// The unregistered wrapper name.
        wrapper: String,
        /// The node that references it.
        node_id: NodeId,
    },

    /// A worker task panicked while running a node function.
    #[error("E304: Node {node_id} panicked: {message}")]
    NodePanic {
        /// The node whose worker task panicked.
        node_id: NodeId,
        /// The panic message, if recoverable.
        message: String,
    },

    /// A node id was looked up that does not exist in the graph.
    #[error("E305: Node {node_id} not found in sequence graph")]
    NodeNotFound {
        /// The missing node id.
        node_id: NodeId,
    },

    /// The run was cancelled and could not drain in-flight work in time.
    #[error("E306: Run cancelled with {pending} node execution(s) still pending after drain timeout")]
    DrainTimeout {
        /// Number of in-flight executions that were aborted.
        pending: usize,
    },

    // =========================================================================
    // Sequence File Errors (E800-E899)
    // =========================================================================
    /// YAML parsing failed.
    #[error("E801: Failed to parse sequence YAML: {cause}")]
    YamlParse {
        /// Reason for the parse failure.
        cause: String,
    },

    /// The sequence document violates the schema or graph invariants.
    #[error("E802: Sequence validation failed with {count} error(s):\n{details}")]
    Validation {
        /// Number of validation errors found.
        count: usize,
        /// Formatted list of the individual errors.
        details: String,
    },

    /// A structural limit (size, depth, node count) was exceeded.
    #[error("E803: Sequence limit exceeded: {cause}")]
    LimitExceeded {
        /// Which limit was exceeded and by how much.
        cause: String,
    },

    // =========================================================================
    // I/O Errors (E900-E999)
    // =========================================================================
    /// File I/O error.
    #[error("E901: I/O error at {path}: {cause}")]
    Io {
        /// The path where the I/O error occurred.
        path: PathBuf,
        /// Description of the I/O error.
        cause: String,
    },
}

impl SequorError {
    /// Get the error code (e.g., "E101").
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::ExpressionSyntax { .. } => "E101",
            Self::ExpressionEval { .. } => "E102",
            Self::ConditionNotBoolean { .. } => "E103",
            Self::ProtectedWrite { .. } => "E201",
            Self::NoTransitionFired { .. } => "E301",
            Self::UnknownFunction { .. } => "E302",
            Self::UnknownWrapper { .. } => "E303",
            Self::NodePanic { .. } => "E304",
            Self::NodeNotFound { .. } => "E305",
            Self::DrainTimeout { .. } => "E306",
            Self::YamlParse { .. } => "E801",
            Self::Validation { .. } => "E802",
            Self::LimitExceeded { .. } => "E803",
            Self::Io { .. } => "E901",
        }
    }

    /// Check if this error belongs to sequence loading/validation.
    ///
    /// Load errors are surfaced before a run starts; no run is performed.
    #[must_use]
    pub fn is_load_error(&self) -> bool {
        matches!(
            self,
            Self::YamlParse { .. }
                | Self::Validation { .. }
                | Self::LimitExceeded { .. }
                | Self::Io { .. }
                | Self::UnknownFunction { .. }
                | Self::UnknownWrapper { .. }
        )
    }

    /// Check if this error aborts an in-progress run.
    ///
    /// Fatal errors have no language-level recourse: the sequence cannot
    /// pick a branch to handle them, so the run ends in the `Error` state.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::ExpressionSyntax { .. }
                | Self::ExpressionEval { .. }
                | Self::ConditionNotBoolean { .. }
                | Self::ProtectedWrite { .. }
                | Self::NoTransitionFired { .. }
                | Self::NodePanic { .. }
                | Self::NodeNotFound { .. }
                | Self::DrainTimeout { .. }
        )
    }
}

/// Result type alias using `SequorError`.
pub type Result<T> = std::result::Result<T, SequorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes_are_correct() {
        let err = SequorError::NoTransitionFired {
            node_id: NodeId::new(4),
        };
        assert_eq!(err.code(), "E301");

        let err = SequorError::ExpressionSyntax {
            expr: "1 +".to_string(),
            cause: "unexpected end of input".to_string(),
        };
        assert_eq!(err.code(), "E101");
    }

    #[test]
    fn error_display() {
        let err = SequorError::ProtectedWrite {
            name: "results".to_string(),
            cause: "name is reserved by the engine".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("E201"));
        assert!(msg.contains("results"));
    }

    #[test]
    fn fatal_classification() {
        assert!(
            SequorError::NoTransitionFired {
                node_id: NodeId::new(1)
            }
            .is_fatal()
        );
        assert!(
            !SequorError::YamlParse {
                cause: "bad indent".to_string()
            }
            .is_fatal()
        );
    }

    #[test]
    fn load_classification() {
        assert!(
            SequorError::Validation {
                count: 1,
                details: "  - something".to_string()
            }
            .is_load_error()
        );
        assert!(
            !SequorError::ConditionNotBoolean {
                expr: "1 + 1".to_string(),
                actual: "number".to_string()
            }
            .is_load_error()
        );
    }
}
