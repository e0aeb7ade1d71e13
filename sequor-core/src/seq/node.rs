//! Node definitions from YAML.

use super::transition::TransitionDefinition;
use crate::types::NodeId;
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A wrapper declaration on a function node.
///
/// Wrappers run `pre` before the user function in declared order and
/// `post` after it in reverse order. Arguments follow the binding rules of
/// function arguments: string values are expressions, anything else is a
/// literal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WrapperDefinition {
    /// The registered wrapper name.
    pub name: String,

    /// Constructor argument bindings.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub arguments: HashMap<String, Value>,
}

impl WrapperDefinition {
    /// Create a wrapper declaration without arguments.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            arguments: HashMap::new(),
        }
    }

    /// Add a constructor argument binding.
    #[must_use]
    pub fn with_argument(mut self, name: impl Into<String>, binding: impl Into<Value>) -> Self {
        self.arguments.insert(name.into(), binding.into());
        self
    }
}

/// One assignment of a variable node.
///
/// Assignments are an ordered list: each assignment sees the values
/// written by the assignments before it in the same node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    /// The variable name being written.
    pub name: String,
    /// The binding: a string is evaluated as an expression, any other
    /// value is taken verbatim.
    pub value: Value,
}

impl Assignment {
    /// Create an assignment.
    pub fn new(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// A node definition from YAML, tagged by `type`.
///
/// # Example
///
/// ```yaml
/// nodes:
///   - id: 0
///     type: start
///     transitions:
///       - target: 1
///
///   - id: 1
///     type: function
///     function: list_path
///     arguments:
///       path: "'/tmp'"
///     timeout_ms: 5000
///     transitions:
///       - target: 2
///
///   - id: 2
///     type: stop
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NodeDefinition {
    /// An entry point. Has no action; its transitions fire immediately.
    Start {
        /// Unique node id.
        id: NodeId,
        /// Optional display name.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        /// Outgoing transitions.
        transitions: Vec<TransitionDefinition>,
    },

    /// A terminal node. Consumes the token that reaches it.
    Stop {
        /// Unique node id.
        id: NodeId,
        /// Optional display name.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
    },

    /// Invokes a registered user function.
    Function {
        /// Unique node id.
        id: NodeId,
        /// Optional display name.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        /// The registered function name.
        function: String,
        /// Argument bindings (name → expression string or literal).
        #[serde(default, skip_serializing_if = "HashMap::is_empty")]
        arguments: HashMap<String, Value>,
        /// Wrapper declarations, applied in order.
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        wrappers: Vec<WrapperDefinition>,
        /// Execution time limit in milliseconds.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timeout_ms: Option<u64>,
        /// Bind the returned value to this on-the-fly variable name.
        #[serde(default, rename = "return", skip_serializing_if = "Option::is_none")]
        return_alias: Option<String>,
        /// Treat a function failure as a test failure for the whole run.
        #[serde(default, skip_serializing_if = "std::ops::Not::not")]
        is_test: bool,
        /// Outgoing transitions.
        transitions: Vec<TransitionDefinition>,
    },

    /// Writes on-the-fly sequence variables.
    Variable {
        /// Unique node id.
        id: NodeId,
        /// Optional display name.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        /// Ordered assignments.
        assignments: Vec<Assignment>,
        /// Outgoing transitions.
        transitions: Vec<TransitionDefinition>,
    },

    /// Forks execution: every satisfied transition fires in parallel.
    ParallelSplit {
        /// Unique node id.
        id: NodeId,
        /// Optional display name.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        /// Outgoing transitions.
        transitions: Vec<TransitionDefinition>,
    },

    /// Joins parallel branches: fires once all incoming branches of one
    /// split wave have arrived.
    ParallelSync {
        /// Unique node id.
        id: NodeId,
        /// Optional display name.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        /// Outgoing transitions.
        transitions: Vec<TransitionDefinition>,
    },
}

impl NodeDefinition {
    /// The node's id.
    pub fn id(&self) -> NodeId {
        match self {
            Self::Start { id, .. }
            | Self::Stop { id, .. }
            | Self::Function { id, .. }
            | Self::Variable { id, .. }
            | Self::ParallelSplit { id, .. }
            | Self::ParallelSync { id, .. } => *id,
        }
    }

    /// The node's display name, if any.
    pub fn name(&self) -> Option<&str> {
        match self {
            Self::Start { name, .. }
            | Self::Stop { name, .. }
            | Self::Function { name, .. }
            | Self::Variable { name, .. }
            | Self::ParallelSplit { name, .. }
            | Self::ParallelSync { name, .. } => name.as_deref(),
        }
    }

    /// The node's outgoing transitions. Empty for `stop` nodes.
    pub fn transitions(&self) -> &[TransitionDefinition] {
        match self {
            Self::Stop { .. } => &[],
            Self::Start { transitions, .. }
            | Self::Function { transitions, .. }
            | Self::Variable { transitions, .. }
            | Self::ParallelSplit { transitions, .. }
            | Self::ParallelSync { transitions, .. } => transitions,
        }
    }

    /// The node type tag as it appears in YAML.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Start { .. } => "start",
            Self::Stop { .. } => "stop",
            Self::Function { .. } => "function",
            Self::Variable { .. } => "variable",
            Self::ParallelSplit { .. } => "parallel_split",
            Self::ParallelSync { .. } => "parallel_sync",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn deserialize_start() {
        let yaml = r#"
id: 0
type: start
transitions:
  - target: 1
"#;
        let node: NodeDefinition = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(node.id(), NodeId::new(0));
        assert_eq!(node.type_name(), "start");
        assert_eq!(node.transitions().len(), 1);
    }

    #[test]
    fn deserialize_function_node() {
        let yaml = r#"
id: 1
type: function
name: greet
function: hello
arguments:
  who: "'John'"
  retries: 3
timeout_ms: 250
return: greeting
is_test: true
transitions:
  - target: 2
"#;
        let node: NodeDefinition = serde_yaml::from_str(yaml).unwrap();
        match node {
            NodeDefinition::Function {
                function,
                arguments,
                timeout_ms,
                return_alias,
                is_test,
                ..
            } => {
                assert_eq!(function, "hello");
                // String bindings are expressions, other scalars literals
                assert_eq!(arguments.get("who"), Some(&Value(json!("'John'"))));
                assert_eq!(arguments.get("retries"), Some(&Value(json!(3))));
                assert_eq!(timeout_ms, Some(250));
                assert_eq!(return_alias.as_deref(), Some("greeting"));
                assert!(is_test);
            }
            other => panic!("expected function node, got {:?}", other),
        }
    }

    #[test]
    fn deserialize_variable_node_preserves_order() {
        let yaml = r#"
id: 2
type: variable
assignments:
  - name: spam
    value: "'egg'"
  - name: double
    value: "spam + spam"
transitions:
  - target: 3
"#;
        let node: NodeDefinition = serde_yaml::from_str(yaml).unwrap();
        match node {
            NodeDefinition::Variable { assignments, .. } => {
                assert_eq!(assignments[0].name, "spam");
                assert_eq!(assignments[1].name, "double");
            }
            other => panic!("expected variable node, got {:?}", other),
        }
    }

    #[test]
    fn deserialize_wrappers() {
        let yaml = r#"
id: 5
type: function
function: fetch
wrappers:
  - name: timer
  - name: to_caps
    arguments:
      text: "'loud'"
transitions:
  - target: 6
"#;
        let node: NodeDefinition = serde_yaml::from_str(yaml).unwrap();
        match node {
            NodeDefinition::Function { wrappers, .. } => {
                assert_eq!(wrappers.len(), 2);
                assert_eq!(wrappers[0].name, "timer");
                assert!(wrappers[0].arguments.is_empty());
                assert_eq!(wrappers[1].name, "to_caps");
            }
            other => panic!("expected function node, got {:?}", other),
        }
    }

    #[test]
    fn stop_has_no_transitions() {
        let yaml = "id: 9\ntype: stop";
        let node: NodeDefinition = serde_yaml::from_str(yaml).unwrap();
        assert!(node.transitions().is_empty());
    }

    #[test]
    fn unknown_type_rejected() {
        let yaml = "id: 1\ntype: teleport";
        assert!(serde_yaml::from_str::<NodeDefinition>(yaml).is_err());
    }

    #[test]
    fn yaml_roundtrip() {
        let node = NodeDefinition::Function {
            id: NodeId::new(1),
            name: None,
            function: "hello".to_string(),
            arguments: HashMap::new(),
            wrappers: vec![WrapperDefinition::new("timer")],
            timeout_ms: Some(100),
            return_alias: None,
            is_test: false,
            transitions: vec![TransitionDefinition::new(2u32)],
        };
        let yaml = serde_yaml::to_string(&node).unwrap();
        let parsed: NodeDefinition = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed, node);
    }
}
