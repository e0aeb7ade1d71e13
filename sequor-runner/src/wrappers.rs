//! Wrapper registry.
//!
//! A wrapper decorates one function-node invocation: its `pre` runs
//! before the user function (in declared order) and its `post` after it
//! (in reverse order). Any type implementing the two operations
//! qualifies; there is no base class. Wrappers are instantiated fresh per
//! invocation by a registered factory, which receives the wrapper's
//! evaluated argument map.

use crate::functions::{FunctionError, Kwargs};
use sequor_core::value::Value;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

/// A per-invocation wrapper instance.
///
/// The value returned by `pre` is published under the wrapper's name in
/// the `wrappers` environment binding, visible to the function node's
/// argument expressions for that invocation only.
pub trait Wrapper: Send {
    /// Runs before the user function. The default returns null.
    fn pre(&mut self) -> Result<Value, FunctionError> {
        Ok(Value::null())
    }

    /// Runs after the user function (also after a failure or timeout),
    /// provided this wrapper's `pre` completed. The default does nothing.
    fn post(&mut self) -> Result<(), FunctionError> {
        Ok(())
    }
}

impl fmt::Debug for dyn Wrapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Wrapper").finish()
    }
}

/// Builds a fresh wrapper instance for one invocation.
pub trait WrapperFactory: Send + Sync {
    /// Construct the wrapper from its evaluated arguments.
    ///
    /// A construction failure is recorded as a wrapper error on the node:
    /// the user function is skipped.
    fn build(&self, args: Kwargs) -> Result<Box<dyn Wrapper>, FunctionError>;
}

/// Adapter turning a closure into a [`WrapperFactory`].
struct FactoryAdapter<F>(F);

impl<F> WrapperFactory for FactoryAdapter<F>
where
    F: Fn(Kwargs) -> Result<Box<dyn Wrapper>, FunctionError> + Send + Sync,
{
    fn build(&self, args: Kwargs) -> Result<Box<dyn Wrapper>, FunctionError> {
        (self.0)(args)
    }
}

/// Registry mapping wrapper name → factory.
#[derive(Default, Clone)]
pub struct WrapperRegistry {
    factories: HashMap<String, Arc<dyn WrapperFactory>>,
}

impl WrapperRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory, replacing any previous registration under the
    /// same name.
    pub fn register(&mut self, name: impl Into<String>, factory: impl WrapperFactory + 'static) {
        self.factories.insert(name.into(), Arc::new(factory));
    }

    /// Register a closure as a factory.
    pub fn register_fn<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn(Kwargs) -> Result<Box<dyn Wrapper>, FunctionError> + Send + Sync + 'static,
    {
        self.register(name, FactoryAdapter(factory));
    }

    /// Look up a factory by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn WrapperFactory>> {
        self.factories.get(name).cloned()
    }

    /// Check whether a name is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// The registered names, sorted.
    pub fn names(&self) -> BTreeSet<&str> {
        self.factories.keys().map(String::as_str).collect()
    }
}

impl fmt::Debug for WrapperRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WrapperRegistry")
            .field("names", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct ToCaps {
        text: String,
    }

    impl Wrapper for ToCaps {
        fn pre(&mut self) -> Result<Value, FunctionError> {
            Ok(Value::string(self.text.to_uppercase()))
        }
    }

    #[test]
    fn build_and_run_wrapper() {
        let mut registry = WrapperRegistry::new();
        registry.register_fn("to_caps", |args: Kwargs| {
            let text = args
                .get("text")
                .and_then(|v| v.as_str())
                .ok_or_else(|| FunctionError::new("MissingArgument").with_arg("text"))?
                .to_string();
            Ok(Box::new(ToCaps { text }) as Box<dyn Wrapper>)
        });

        let factory = registry.get("to_caps").unwrap();
        let mut args = Kwargs::new();
        args.insert("text".to_string(), Value::string("loud"));
        let mut wrapper = factory.build(args).unwrap();
        assert_eq!(wrapper.pre().unwrap(), Value::string("LOUD"));
        assert!(wrapper.post().is_ok());
    }

    #[test]
    fn construction_failure_surfaces() {
        let mut registry = WrapperRegistry::new();
        registry.register_fn("broken", |_args| {
            Err(FunctionError::new("RuntimeError"))
        });
        let err = registry.get("broken").unwrap().build(Kwargs::new()).unwrap_err();
        assert_eq!(err.name, "RuntimeError");
    }

    #[test]
    fn default_operations_are_noops() {
        struct Plain;
        impl Wrapper for Plain {}
        let mut wrapper = Plain;
        assert_eq!(wrapper.pre().unwrap(), Value::null());
        assert!(wrapper.post().is_ok());
    }
}
