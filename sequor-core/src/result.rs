//! Node execution results.
//!
//! After a function node completes, the engine stores a [`NodeResult`] in
//! the result registry. Only the most recent run per node id is retained;
//! a looped node overwrites its own slot. Results are visible to condition
//! expressions through the `results` environment binding, with absent
//! fields reading as `None`.

use crate::types::NodeId;
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Structured information about an error raised by a function or wrapper.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrInfo {
    /// The error name (e.g., a user error type or `"Timeout"`).
    pub name: String,
    /// Arguments attached to the error.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<Value>,
}

impl ErrInfo {
    /// Create a new error record with no arguments.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args: Vec::new(),
        }
    }

    /// Attach an argument to the error.
    #[must_use]
    pub fn with_arg(mut self, arg: impl Into<Value>) -> Self {
        self.args.push(arg.into());
        self
    }
}

/// The exception record of a node result.
///
/// Distinguishes an error raised by the user function itself from errors
/// raised by the node's wrappers; either side may be absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeException {
    /// Error raised by the user function (or the synthetic timeout error).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function: Option<ErrInfo>,
    /// Error raised by a wrapper `pre`, `post`, or constructor.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wrappers: Option<ErrInfo>,
}

impl NodeException {
    /// Check whether any error is recorded at all.
    pub fn is_empty(&self) -> bool {
        self.function.is_none() && self.wrappers.is_none()
    }
}

/// The stored result of a function node's most recent run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeResult {
    /// The id of the node that produced this result.
    pub nid: NodeId,
    /// The value returned by the user function. Absent on failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub returned: Option<Value>,
    /// The exception record. Absent when the run was clean.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exception: Option<NodeException>,
}

impl NodeResult {
    /// Create a successful result.
    pub fn success(nid: NodeId, returned: Value) -> Self {
        Self {
            nid,
            returned: Some(returned),
            exception: None,
        }
    }

    /// Create a result carrying an exception record.
    ///
    /// An empty exception record is normalized to absent.
    pub fn with_exception(nid: NodeId, returned: Option<Value>, exception: NodeException) -> Self {
        Self {
            nid,
            returned,
            exception: (!exception.is_empty()).then_some(exception),
        }
    }

    /// Check whether the function sub-exception is present.
    pub fn function_failed(&self) -> bool {
        self.exception
            .as_ref()
            .is_some_and(|e| e.function.is_some())
    }
}

/// Registry of the last result per node id.
#[derive(Debug, Default)]
pub struct ResultRegistry {
    results: HashMap<NodeId, NodeResult>,
}

impl ResultRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a result, replacing any previous run of the same node.
    pub fn commit(&mut self, result: NodeResult) {
        self.results.insert(result.nid, result);
    }

    /// Get the last result for a node, if it has run.
    pub fn get(&self, nid: NodeId) -> Option<&NodeResult> {
        self.results.get(&nid)
    }

    /// Number of nodes with a stored result.
    pub fn len(&self) -> usize {
        self.results.len()
    }

    /// Check whether no results are stored.
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Consume the registry, returning the stored results.
    pub fn into_inner(self) -> HashMap<NodeId, NodeResult> {
        self.results
    }

    /// Materialize the registry as an environment value: an object keyed
    /// by the decimal node id.
    pub fn to_env_value(&self) -> Value {
        let mut map = serde_json::Map::with_capacity(self.results.len());
        for (nid, result) in &self.results {
            let value = serde_json::to_value(result).unwrap_or(serde_json::Value::Null);
            map.insert(nid.as_u32().to_string(), value);
        }
        Value(serde_json::Value::Object(map))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_exception_normalized_away() {
        let result =
            NodeResult::with_exception(NodeId::new(1), Some(Value::int(3)), NodeException::default());
        assert!(result.exception.is_none());
        assert!(!result.function_failed());
    }

    #[test]
    fn function_failure_detected() {
        let exception = NodeException {
            function: Some(ErrInfo::new("ValueError").with_arg("bad input")),
            wrappers: None,
        };
        let result = NodeResult::with_exception(NodeId::new(2), None, exception);
        assert!(result.function_failed());
    }

    #[test]
    fn registry_keeps_last_run_only() {
        let mut registry = ResultRegistry::new();
        registry.commit(NodeResult::success(NodeId::new(1), Value::int(1)));
        registry.commit(NodeResult::success(NodeId::new(1), Value::int(2)));
        assert_eq!(registry.len(), 1);
        assert_eq!(
            registry.get(NodeId::new(1)).unwrap().returned,
            Some(Value::int(2))
        );
    }

    #[test]
    fn env_value_shape() {
        let mut registry = ResultRegistry::new();
        registry.commit(NodeResult::success(NodeId::new(7), Value::string("ok")));
        let value = registry.to_env_value();
        let object = value.inner().as_object().unwrap();
        let entry = object.get("7").unwrap();
        assert_eq!(entry.get("nid").unwrap(), 7);
        assert_eq!(entry.get("returned").unwrap(), "ok");
        // Clean runs serialize without an exception key
        assert!(entry.get("exception").is_none());
    }

    #[test]
    fn serialized_exception_fields() {
        let exception = NodeException {
            function: Some(ErrInfo::new("Timeout")),
            wrappers: None,
        };
        let result = NodeResult::with_exception(NodeId::new(3), None, exception);
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["exception"]["function"]["name"], "Timeout");
        assert!(json["exception"].get("wrappers").is_none());
        assert!(json.get("returned").is_none());
    }
}
