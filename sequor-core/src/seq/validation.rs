//! Sequence validation logic.
//!
//! The validator enforces the graph invariants before a sequence is
//! compiled: id uniqueness, start/stop presence, transition targets,
//! transition counts per node kind, protected variable names, and the
//! syntax of every condition and string binding. Errors are collected
//! rather than short-circuited so a user fixing a file sees all problems
//! at once.

use super::definition::{SequenceDefinition, SequenceLimits};
use super::node::NodeDefinition;
use crate::expr;
use crate::value::Value;
use crate::variables::PROTECTED_NAMES;
use std::collections::{HashMap, HashSet};

/// A validation error.
#[derive(Debug, Clone)]
pub struct ValidationError {
    /// The type of error.
    pub kind: ValidationErrorKind,
    /// The location in the sequence (e.g., "nodes[3].transitions[0]").
    pub location: String,
    /// Human-readable error message.
    pub message: String,
}

/// Types of validation errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationErrorKind {
    /// Missing required field or section.
    MissingField,
    /// Invalid value for a field.
    InvalidValue,
    /// Duplicate node identifier.
    DuplicateId,
    /// Transition to a non-existent node.
    InvalidReference,
    /// Transition targeting a start node.
    TransitionIntoStart,
    /// Non-stop node without outgoing transitions.
    MissingTransitions,
    /// Condition or binding that does not parse.
    InvalidExpression,
    /// Protected name used as a constant or assignment target.
    ProtectedName,
    /// Structural limit exceeded (size, depth, count).
    LimitExceeded,
}

impl std::fmt::Display for ValidationErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::MissingField => "MISSING_FIELD",
            Self::InvalidValue => "INVALID_VALUE",
            Self::DuplicateId => "DUPLICATE_ID",
            Self::InvalidReference => "INVALID_REFERENCE",
            Self::TransitionIntoStart => "TRANSITION_INTO_START",
            Self::MissingTransitions => "MISSING_TRANSITIONS",
            Self::InvalidExpression => "INVALID_EXPRESSION",
            Self::ProtectedName => "PROTECTED_NAME",
            Self::LimitExceeded => "LIMIT_EXCEEDED",
        };
        write!(f, "{}", s)
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}: {}", self.kind, self.location, self.message)
    }
}

impl ValidationError {
    /// Create a new validation error.
    pub fn new(
        kind: ValidationErrorKind,
        location: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            location: location.into(),
            message: message.into(),
        }
    }
}

/// Result of a validation pass: ok, or every error found.
pub type ValidationResult = Result<(), Vec<ValidationError>>;

/// Validator for sequence definitions.
pub struct SequenceValidator {
    errors: Vec<ValidationError>,
    limits: SequenceLimits,
}

impl SequenceValidator {
    /// Create a new validator with default limits.
    pub fn new() -> Self {
        Self {
            errors: Vec::new(),
            limits: SequenceLimits::default(),
        }
    }

    /// Create a validator with custom limits.
    pub fn with_limits(limits: SequenceLimits) -> Self {
        Self {
            errors: Vec::new(),
            limits,
        }
    }

    /// Validate a sequence definition.
    pub fn validate(mut self, sequence: &SequenceDefinition) -> ValidationResult {
        self.validate_limits(sequence);
        self.validate_metadata(sequence);
        self.validate_constants(sequence);

        let ids = self.validate_ids(sequence);
        self.validate_node_kinds(sequence);
        self.validate_transitions(sequence, &ids);
        self.validate_expressions(sequence);

        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(self.errors)
        }
    }

    fn add_error(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    fn validate_limits(&mut self, sequence: &SequenceDefinition) {
        if sequence.nodes.len() > self.limits.max_node_count {
            self.add_error(ValidationError::new(
                ValidationErrorKind::LimitExceeded,
                "nodes",
                format!(
                    "node count ({}) exceeds maximum allowed ({})",
                    sequence.nodes.len(),
                    self.limits.max_node_count
                ),
            ));
        }
    }

    fn validate_metadata(&mut self, sequence: &SequenceDefinition) {
        if sequence.name.is_empty() {
            self.add_error(ValidationError::new(
                ValidationErrorKind::MissingField,
                "sequence",
                "missing required field 'name'",
            ));
        }
    }

    fn validate_constants(&mut self, sequence: &SequenceDefinition) {
        for name in sequence.constants.keys() {
            if PROTECTED_NAMES.contains(&name.as_str()) {
                self.add_error(ValidationError::new(
                    ValidationErrorKind::ProtectedName,
                    format!("constants.{}", name),
                    "name is reserved by the engine",
                ));
            }
        }
    }

    /// Check id uniqueness; returns the id → node-kind map used by the
    /// reference checks.
    fn validate_ids(&mut self, sequence: &SequenceDefinition) -> HashMap<u32, &'static str> {
        let mut ids: HashMap<u32, &'static str> = HashMap::new();
        for (idx, node) in sequence.nodes.iter().enumerate() {
            let raw = node.id().as_u32();
            if ids.insert(raw, node.type_name()).is_some() {
                self.add_error(ValidationError::new(
                    ValidationErrorKind::DuplicateId,
                    format!("nodes[{}]", idx),
                    format!("duplicate node id {}", raw),
                ));
            }
        }
        ids
    }

    fn validate_node_kinds(&mut self, sequence: &SequenceDefinition) {
        let starts = sequence
            .nodes
            .iter()
            .filter(|n| matches!(n, NodeDefinition::Start { .. }))
            .count();
        let stops = sequence
            .nodes
            .iter()
            .filter(|n| matches!(n, NodeDefinition::Stop { .. }))
            .count();

        if starts == 0 {
            self.add_error(ValidationError::new(
                ValidationErrorKind::MissingField,
                "nodes",
                "sequence has no start node",
            ));
        }
        if stops == 0 {
            self.add_error(ValidationError::new(
                ValidationErrorKind::MissingField,
                "nodes",
                "sequence has no stop node",
            ));
        }

        for (idx, node) in sequence.nodes.iter().enumerate() {
            let location = format!("nodes[{}]", idx);

            if !matches!(node, NodeDefinition::Stop { .. }) && node.transitions().is_empty() {
                self.add_error(ValidationError::new(
                    ValidationErrorKind::MissingTransitions,
                    location.clone(),
                    format!("{} node {} has no outgoing transition", node.type_name(), node.id()),
                ));
            }

            match node {
                NodeDefinition::Function { timeout_ms: Some(0), .. } => {
                    self.add_error(ValidationError::new(
                        ValidationErrorKind::InvalidValue,
                        format!("{}.timeout_ms", location),
                        "timeout must be greater than zero",
                    ));
                }
                NodeDefinition::Function {
                    return_alias: Some(alias),
                    ..
                } if PROTECTED_NAMES.contains(&alias.as_str()) => {
                    self.add_error(ValidationError::new(
                        ValidationErrorKind::ProtectedName,
                        format!("{}.return", location),
                        "return alias is reserved by the engine",
                    ));
                }
                NodeDefinition::Variable { assignments, .. } => {
                    if assignments.is_empty() {
                        self.add_error(ValidationError::new(
                            ValidationErrorKind::MissingField,
                            format!("{}.assignments", location),
                            "variable node has no assignments",
                        ));
                    }
                    for assignment in assignments {
                        if PROTECTED_NAMES.contains(&assignment.name.as_str()) {
                            self.add_error(ValidationError::new(
                                ValidationErrorKind::ProtectedName,
                                format!("{}.assignments.{}", location, assignment.name),
                                "assignment target is reserved by the engine",
                            ));
                        }
                    }
                }
                _ => {}
            }
        }
    }

    fn validate_transitions(
        &mut self,
        sequence: &SequenceDefinition,
        ids: &HashMap<u32, &'static str>,
    ) {
        let start_ids: HashSet<u32> = sequence
            .nodes
            .iter()
            .filter(|n| matches!(n, NodeDefinition::Start { .. }))
            .map(|n| n.id().as_u32())
            .collect();

        for (idx, node) in sequence.nodes.iter().enumerate() {
            for (tidx, transition) in node.transitions().iter().enumerate() {
                let location = format!("nodes[{}].transitions[{}]", idx, tidx);
                let target = transition.target.as_u32();

                if !ids.contains_key(&target) {
                    self.add_error(ValidationError::new(
                        ValidationErrorKind::InvalidReference,
                        location.clone(),
                        format!("transition targets non-existent node {}", target),
                    ));
                } else if start_ids.contains(&target) {
                    self.add_error(ValidationError::new(
                        ValidationErrorKind::TransitionIntoStart,
                        location,
                        format!("transition targets start node {}", target),
                    ));
                }
            }
        }
    }

    /// Parse every condition and string binding so bad expressions are
    /// caught at load time, not mid-run.
    fn validate_expressions(&mut self, sequence: &SequenceDefinition) {
        for (idx, node) in sequence.nodes.iter().enumerate() {
            for (tidx, transition) in node.transitions().iter().enumerate() {
                if let Some(condition) = &transition.condition {
                    self.check_expression(
                        condition,
                        format!("nodes[{}].transitions[{}].condition", idx, tidx),
                    );
                }
            }

            match node {
                NodeDefinition::Function {
                    arguments, wrappers, ..
                } => {
                    for (name, binding) in arguments {
                        self.check_binding(binding, format!("nodes[{}].arguments.{}", idx, name));
                    }
                    for wrapper in wrappers {
                        for (name, binding) in &wrapper.arguments {
                            self.check_binding(
                                binding,
                                format!("nodes[{}].wrappers.{}.{}", idx, wrapper.name, name),
                            );
                        }
                    }
                }
                NodeDefinition::Variable { assignments, .. } => {
                    for assignment in assignments {
                        self.check_binding(
                            &assignment.value,
                            format!("nodes[{}].assignments.{}", idx, assignment.name),
                        );
                    }
                }
                _ => {}
            }
        }
    }

    fn check_expression(&mut self, source: &str, location: String) {
        if let Err(err) = expr::parse(source) {
            self.add_error(ValidationError::new(
                ValidationErrorKind::InvalidExpression,
                location,
                err.to_string(),
            ));
        }
    }

    fn check_binding(&mut self, binding: &Value, location: String) {
        if let Some(source) = binding.as_str() {
            self.check_expression(source, location);
        }
    }
}

impl Default for SequenceValidator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validate(yaml: &str) -> ValidationResult {
        let sequence = SequenceDefinition::from_yaml(yaml).unwrap();
        SequenceValidator::new().validate(&sequence)
    }

    fn kinds(result: ValidationResult) -> Vec<ValidationErrorKind> {
        result.unwrap_err().into_iter().map(|e| e.kind).collect()
    }

    const MINIMAL: &str = r#"
name: minimal
nodes:
  - id: 0
    type: start
    transitions:
      - target: 1
  - id: 1
    type: stop
"#;

    #[test]
    fn minimal_sequence_is_valid() {
        assert!(validate(MINIMAL).is_ok());
    }

    #[test]
    fn missing_start_detected() {
        let yaml = r#"
name: no_start
nodes:
  - id: 1
    type: stop
"#;
        assert!(kinds(validate(yaml)).contains(&ValidationErrorKind::MissingField));
    }

    #[test]
    fn duplicate_ids_detected() {
        let yaml = r#"
name: dupes
nodes:
  - id: 0
    type: start
    transitions:
      - target: 1
  - id: 1
    type: stop
  - id: 1
    type: stop
"#;
        assert!(kinds(validate(yaml)).contains(&ValidationErrorKind::DuplicateId));
    }

    #[test]
    fn dangling_target_detected() {
        let yaml = r#"
name: dangling
nodes:
  - id: 0
    type: start
    transitions:
      - target: 99
  - id: 1
    type: stop
"#;
        assert!(kinds(validate(yaml)).contains(&ValidationErrorKind::InvalidReference));
    }

    #[test]
    fn transition_into_start_detected() {
        let yaml = r#"
name: into_start
nodes:
  - id: 0
    type: start
    transitions:
      - target: 1
  - id: 1
    type: variable
    assignments:
      - name: x
        value: 1
    transitions:
      - target: 0
  - id: 2
    type: stop
"#;
        assert!(kinds(validate(yaml)).contains(&ValidationErrorKind::TransitionIntoStart));
    }

    #[test]
    fn bad_condition_detected_at_load() {
        let yaml = r#"
name: bad_condition
nodes:
  - id: 0
    type: start
    transitions:
      - target: 1
        condition: "1 +"
  - id: 1
    type: stop
"#;
        assert!(kinds(validate(yaml)).contains(&ValidationErrorKind::InvalidExpression));
    }

    #[test]
    fn protected_assignment_detected() {
        let yaml = r#"
name: protected
nodes:
  - id: 0
    type: start
    transitions:
      - target: 1
  - id: 1
    type: variable
    assignments:
      - name: results
        value: 1
    transitions:
      - target: 2
  - id: 2
    type: stop
"#;
        assert!(kinds(validate(yaml)).contains(&ValidationErrorKind::ProtectedName));
    }

    #[test]
    fn all_errors_collected() {
        let yaml = r#"
name: ""
nodes:
  - id: 0
    type: start
    transitions:
      - target: 99
"#;
        let errors = validate(yaml).unwrap_err();
        // empty name, no stop, dangling target
        assert!(errors.len() >= 3);
    }
}
