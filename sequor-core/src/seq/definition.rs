//! Sequence definition - the top-level YAML document.

use super::graph::SequenceGraph;
use super::node::NodeDefinition;
use super::validation::{SequenceValidator, ValidationError, ValidationResult};
use crate::error::{Result, SequorError};
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Structural limits applied when parsing untrusted sequence files.
#[derive(Debug, Clone)]
pub struct SequenceLimits {
    /// Maximum file size in bytes.
    pub max_file_size: usize,
    /// Maximum YAML nesting depth.
    pub max_nesting_depth: usize,
    /// Maximum number of nodes.
    pub max_node_count: usize,
}

impl Default for SequenceLimits {
    fn default() -> Self {
        Self {
            max_file_size: 10 * 1024 * 1024,
            max_nesting_depth: 64,
            max_node_count: 10_000,
        }
    }
}

impl SequenceLimits {
    fn validate_content_size(&self, content: &str) -> Result<()> {
        if content.len() > self.max_file_size {
            return Err(SequorError::LimitExceeded {
                cause: format!(
                    "content size ({} bytes) exceeds maximum allowed ({} bytes)",
                    content.len(),
                    self.max_file_size
                ),
            });
        }
        Ok(())
    }

    fn validate_nesting_depth(&self, value: &serde_yaml::Value) -> Result<()> {
        let depth = yaml_depth(value);
        if depth > self.max_nesting_depth {
            return Err(SequorError::LimitExceeded {
                cause: format!(
                    "nesting depth ({}) exceeds maximum allowed ({})",
                    depth, self.max_nesting_depth
                ),
            });
        }
        Ok(())
    }
}

fn yaml_depth(value: &serde_yaml::Value) -> usize {
    match value {
        serde_yaml::Value::Sequence(items) => {
            1 + items.iter().map(yaml_depth).max().unwrap_or(0)
        }
        serde_yaml::Value::Mapping(map) => {
            1 + map.values().map(yaml_depth).max().unwrap_or(0)
        }
        _ => 0,
    }
}

/// A complete sequence definition from YAML.
///
/// # Example
///
/// ```yaml
/// name: greeting
/// description: Say hello, branching on failure
///
/// constants:
///   who: John
///
/// nodes:
///   - id: 0
///     type: start
///     transitions:
///       - target: 1
///
///   - id: 1
///     type: function
///     function: hello
///     arguments:
///       who: who
///     transitions:
///       - target: 2
///         condition: "results[1].exception == None"
///       - target: 3
///         condition: "results[1].exception != None"
///
///   - id: 2
///     type: stop
///
///   - id: 3
///     type: stop
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequenceDefinition {
    /// Sequence name (required).
    pub name: String,

    /// Human-readable description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Constants: fixed for the whole run, read-only for the sequence.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub constants: HashMap<String, Value>,

    /// The nodes of the sequence.
    #[serde(default)]
    pub nodes: Vec<NodeDefinition>,
}

impl SequenceDefinition {
    /// Create an empty sequence definition.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            constants: HashMap::new(),
            nodes: Vec::new(),
        }
    }

    /// Parse a sequence definition from a YAML string.
    ///
    /// This method does not apply size or depth limits; for untrusted
    /// input use [`SequenceDefinition::from_yaml_with_limits`] or
    /// [`SequenceDefinition::from_yaml_validated`].
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(|e| SequorError::YamlParse {
            cause: e.to_string(),
        })
    }

    /// Parse a sequence definition with content-size and nesting-depth
    /// limits applied before full deserialization.
    pub fn from_yaml_with_limits(yaml: &str, limits: &SequenceLimits) -> Result<Self> {
        limits.validate_content_size(yaml)?;

        let value: serde_yaml::Value =
            serde_yaml::from_str(yaml).map_err(|e| SequorError::YamlParse {
                cause: e.to_string(),
            })?;
        limits.validate_nesting_depth(&value)?;

        serde_yaml::from_value(value).map_err(|e| SequorError::YamlParse {
            cause: e.to_string(),
        })
    }

    /// Parse a sequence definition from a file.
    pub fn from_file(path: &Path) -> Result<Self> {
        Self::from_file_with_limits(path, &SequenceLimits::default())
    }

    /// Parse a sequence definition from a file with limits.
    pub fn from_file_with_limits(path: &Path, limits: &SequenceLimits) -> Result<Self> {
        let metadata = std::fs::metadata(path).map_err(|e| SequorError::Io {
            path: path.to_path_buf(),
            cause: e.to_string(),
        })?;
        if metadata.len() as usize > limits.max_file_size {
            return Err(SequorError::LimitExceeded {
                cause: format!(
                    "file size ({} bytes) exceeds maximum allowed ({} bytes)",
                    metadata.len(),
                    limits.max_file_size
                ),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| SequorError::Io {
            path: path.to_path_buf(),
            cause: e.to_string(),
        })?;
        Self::from_yaml_with_limits(&content, limits)
    }

    /// Serialize to a YAML string.
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(|e| SequorError::YamlParse {
            cause: e.to_string(),
        })
    }

    /// Validate the definition against the graph invariants.
    pub fn validate(&self) -> ValidationResult {
        SequenceValidator::new().validate(self)
    }

    /// Parse and validate in one step with default limits.
    pub fn from_yaml_validated(yaml: &str) -> Result<Self> {
        let sequence = Self::from_yaml_with_limits(yaml, &SequenceLimits::default())?;
        sequence.validate().map_err(validation_error)?;
        Ok(sequence)
    }

    /// Parse and validate a file in one step with default limits.
    pub fn from_file_validated(path: &Path) -> Result<Self> {
        let sequence = Self::from_file(path)?;
        sequence.validate().map_err(validation_error)?;
        Ok(sequence)
    }

    /// Add a node (builder style).
    #[must_use]
    pub fn with_node(mut self, node: NodeDefinition) -> Self {
        self.nodes.push(node);
        self
    }

    /// Add a constant (builder style).
    #[must_use]
    pub fn with_constant(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.constants.insert(name.into(), value.into());
        self
    }

    /// Get a node definition by id.
    pub fn get_node(&self, id: u32) -> Option<&NodeDefinition> {
        self.nodes.iter().find(|n| n.id().as_u32() == id)
    }

    /// Validate and compile into an immutable [`SequenceGraph`].
    pub fn compile(&self) -> Result<SequenceGraph> {
        self.validate().map_err(validation_error)?;
        Ok(SequenceGraph::build(self))
    }
}

fn validation_error(errors: Vec<ValidationError>) -> SequorError {
    let details = errors
        .iter()
        .map(|e| format!("  - {}", e))
        .collect::<Vec<_>>()
        .join("\n");
    SequorError::Validation {
        count: errors.len(),
        details,
    }
}
