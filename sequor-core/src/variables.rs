//! The sequence variable store.
//!
//! Variables live in three disjoint namespaces unified for reads with
//! precedence builtin > constant > on-the-fly:
//!
//! - **builtins** (`results`, `wrappers`, `logger`) are engine-owned.
//!   `results` and `wrappers` are materialized into snapshots; `logger` is
//!   a protected name whose sink is injected through the function call
//!   context rather than through the environment.
//! - **constants** are fixed when the runner is constructed.
//! - **on-the-fly** variables are created and overwritten by variable
//!   nodes and `return` aliases.
//!
//! The store is mutated exclusively by the scheduler coordinator; readers
//! always work on an immutable [`Env`] snapshot.

use crate::error::{Result, SequorError};
use crate::result::{NodeResult, ResultRegistry};
use crate::types::NodeId;
use crate::value::Value;
use std::collections::HashMap;

/// Names owned by the engine. Constants and variable nodes may not use them.
pub const PROTECTED_NAMES: &[&str] = &["results", "wrappers", "logger"];

/// An immutable environment snapshot for one round of expression
/// evaluation.
#[derive(Debug, Clone, Default)]
pub struct Env {
    vars: HashMap<String, Value>,
}

impl Env {
    /// Create an empty environment.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a binding, replacing any previous value under the name.
    pub fn insert(&mut self, name: String, value: Value) {
        self.vars.insert(name, value);
    }

    /// Look up a name.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.vars.get(name)
    }

    /// Check whether a name is bound.
    pub fn contains(&self, name: &str) -> bool {
        self.vars.contains_key(name)
    }
}

/// The three-namespace variable store.
#[derive(Debug, Default)]
pub struct VariableStore {
    constants: HashMap<String, Value>,
    on_the_fly: HashMap<String, Value>,
    results: ResultRegistry,
}

impl VariableStore {
    /// Create a store with the given constants.
    ///
    /// Constant names colliding with a protected builtin are rejected.
    pub fn new(constants: HashMap<String, Value>) -> Result<Self> {
        for name in constants.keys() {
            if PROTECTED_NAMES.contains(&name.as_str()) {
                return Err(SequorError::ProtectedWrite {
                    name: name.clone(),
                    cause: "constant name is reserved by the engine".to_string(),
                });
            }
        }
        Ok(Self {
            constants,
            on_the_fly: HashMap::new(),
            results: ResultRegistry::new(),
        })
    }

    /// Write an on-the-fly variable.
    ///
    /// Rejects protected builtins and constant names: constants are
    /// read-only for the whole run.
    pub fn set_on_the_fly(&mut self, name: &str, value: Value) -> Result<()> {
        if PROTECTED_NAMES.contains(&name) {
            return Err(SequorError::ProtectedWrite {
                name: name.to_string(),
                cause: "name is reserved by the engine".to_string(),
            });
        }
        if self.constants.contains_key(name) {
            return Err(SequorError::ProtectedWrite {
                name: name.to_string(),
                cause: "name is a sequence constant".to_string(),
            });
        }
        self.on_the_fly.insert(name.to_string(), value);
        Ok(())
    }

    /// Commit a node result into the registry (engine-only write).
    pub fn set_result(&mut self, result: NodeResult) {
        self.results.commit(result);
    }

    /// Get the last result for a node.
    pub fn result(&self, nid: NodeId) -> Option<&NodeResult> {
        self.results.get(nid)
    }

    /// Read a constant.
    pub fn constant(&self, name: &str) -> Option<&Value> {
        self.constants.get(name)
    }

    /// Read an on-the-fly variable.
    pub fn on_the_fly(&self, name: &str) -> Option<&Value> {
        self.on_the_fly.get(name)
    }

    /// Consume the store, returning the final on-the-fly variables and
    /// the per-node results.
    pub fn into_parts(self) -> (HashMap<String, Value>, HashMap<NodeId, NodeResult>) {
        (self.on_the_fly, self.results.into_inner())
    }

    /// Build an environment snapshot for one round of evaluation.
    ///
    /// Lookup precedence is builtin > constant > on-the-fly, realized by
    /// inserting in reverse order.
    pub fn snapshot(&self) -> Env {
        let mut env = Env::new();
        for (name, value) in &self.on_the_fly {
            env.insert(name.clone(), value.clone());
        }
        for (name, value) in &self.constants {
            env.insert(name.clone(), value.clone());
        }
        env.insert("results".to_string(), self.results.to_env_value());
        env
    }

    /// Build a snapshot with the per-invocation `wrappers` binding added.
    ///
    /// Used only while evaluating a function node's argument bindings; the
    /// binding is never visible outside that invocation.
    pub fn snapshot_with_wrappers(&self, wrappers: HashMap<String, Value>) -> Env {
        let mut env = self.snapshot();
        let mut map = serde_json::Map::with_capacity(wrappers.len());
        for (name, value) in wrappers {
            map.insert(name, value.into_inner());
        }
        env.insert("wrappers".to_string(), Value(serde_json::Value::Object(map)));
        env
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn constants(pairs: &[(&str, Value)]) -> HashMap<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn constants_visible_in_snapshot() {
        let store = VariableStore::new(constants(&[("spam", Value::string("egg"))])).unwrap();
        let env = store.snapshot();
        assert_eq!(env.get("spam"), Some(&Value::string("egg")));
    }

    #[test]
    fn protected_constant_name_rejected() {
        let err = VariableStore::new(constants(&[("results", Value::int(1))])).unwrap_err();
        assert_eq!(err.code(), "E201");
    }

    #[test]
    fn on_the_fly_write_and_overwrite() {
        let mut store = VariableStore::new(HashMap::new()).unwrap();
        store.set_on_the_fly("counter", Value::int(1)).unwrap();
        store.set_on_the_fly("counter", Value::int(2)).unwrap();
        assert_eq!(store.on_the_fly("counter"), Some(&Value::int(2)));
    }

    #[test]
    fn writing_constant_rejected() {
        let mut store = VariableStore::new(constants(&[("spam", Value::string("egg"))])).unwrap();
        let err = store.set_on_the_fly("spam", Value::int(1)).unwrap_err();
        assert_eq!(err.code(), "E201");
    }

    #[test]
    fn writing_builtin_rejected() {
        let mut store = VariableStore::new(HashMap::new()).unwrap();
        for name in PROTECTED_NAMES {
            assert!(store.set_on_the_fly(name, Value::int(1)).is_err());
        }
    }

    #[test]
    fn builtin_shadows_nothing_but_wins_lookup() {
        // A snapshot always carries `results`, even when empty
        let store = VariableStore::new(HashMap::new()).unwrap();
        let env = store.snapshot();
        assert!(env.contains("results"));
    }

    #[test]
    fn wrappers_binding_scoped_to_special_snapshot() {
        let store = VariableStore::new(HashMap::new()).unwrap();
        assert!(!store.snapshot().contains("wrappers"));

        let mut locals = HashMap::new();
        locals.insert("timer".to_string(), Value::string("t0"));
        let env = store.snapshot_with_wrappers(locals);
        let wrappers = env.get("wrappers").unwrap();
        assert_eq!(
            wrappers.inner().get("timer").and_then(|v| v.as_str()),
            Some("t0")
        );
    }

    #[test]
    fn snapshot_is_detached_from_store() {
        let mut store = VariableStore::new(HashMap::new()).unwrap();
        store.set_on_the_fly("x", Value::int(1)).unwrap();
        let env = store.snapshot();
        store.set_on_the_fly("x", Value::int(2)).unwrap();
        assert_eq!(env.get("x"), Some(&Value::int(1)));
    }
}
