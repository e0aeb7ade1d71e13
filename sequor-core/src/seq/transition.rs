//! Transition definition.

use crate::types::NodeId;
use serde::{Deserialize, Serialize};

/// An outgoing transition of a node.
///
/// # Example
///
/// ```yaml
/// transitions:
///   - target: 2
///     condition: "results[1].exception == None"
///   - target: 3
///     condition: "results[1].exception != None"
/// ```
///
/// A transition without a condition is always satisfied. Transitions are
/// evaluated in declared order; for every node kind except
/// `parallel_split` the first satisfied transition wins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionDefinition {
    /// The id of the targeted node.
    pub target: NodeId,

    /// Optional condition expression. Absent means always true.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
}

impl TransitionDefinition {
    /// Create an unconditional transition.
    pub fn new(target: impl Into<NodeId>) -> Self {
        Self {
            target: target.into(),
            condition: None,
        }
    }

    /// Set a condition.
    #[must_use]
    pub fn with_condition(mut self, condition: impl Into<String>) -> Self {
        self.condition = Some(condition.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserialize_simple() {
        let yaml = "target: 4";
        let transition: TransitionDefinition = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(transition.target, NodeId::new(4));
        assert!(transition.condition.is_none());
    }

    #[test]
    fn deserialize_with_condition() {
        let yaml = r#"
target: 2
condition: "count < 10"
"#;
        let transition: TransitionDefinition = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(transition.target, NodeId::new(2));
        assert_eq!(transition.condition.as_deref(), Some("count < 10"));
    }

    #[test]
    fn serialize_omits_absent_condition() {
        let yaml = serde_yaml::to_string(&TransitionDefinition::new(1u32)).unwrap();
        assert!(!yaml.contains("condition"));
    }
}
