//! User function registry.
//!
//! Node functions are registered by name and invoked with keyword-style
//! arguments matching the node's binding keys. Arguments cross the
//! boundary as owned [`Value`]s, so a function can never mutate sequence
//! state through them. Failure is signalled by returning a
//! [`FunctionError`], whose name and arguments are captured into the
//! node result's `ErrInfo`.

use sequor_core::logging::LogCollector;
use sequor_core::result::ErrInfo;
use sequor_core::types::{NodeId, RunId};
use sequor_core::value::Value;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Keyword arguments passed to a function or wrapper constructor.
pub type Kwargs = HashMap<String, Value>;

/// A structured error raised by a user function or wrapper.
///
/// The `name` identifies the error kind (the sequence branches on it via
/// `results[n].exception.function.name`); `args` carry free-form detail.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionError {
    /// The error name.
    pub name: String,
    /// Arguments attached to the error.
    pub args: Vec<Value>,
}

impl FunctionError {
    /// Create a new error with no arguments.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args: Vec::new(),
        }
    }

    /// Attach an argument.
    #[must_use]
    pub fn with_arg(mut self, arg: impl Into<Value>) -> Self {
        self.args.push(arg.into());
        self
    }
}

impl fmt::Display for FunctionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        if !self.args.is_empty() {
            let args: Vec<String> = self.args.iter().map(|a| a.to_string()).collect();
            write!(f, "({})", args.join(", "))?;
        }
        Ok(())
    }
}

impl std::error::Error for FunctionError {}

impl From<FunctionError> for ErrInfo {
    fn from(err: FunctionError) -> Self {
        Self {
            name: err.name,
            args: err.args,
        }
    }
}

/// Context handed to every function invocation.
///
/// Carries the correlation ids, the cancellation token for this
/// invocation (triggered by a node timeout or a run-level cancel; honoring
/// it is cooperative), and the injected log sink.
#[derive(Clone)]
pub struct CallContext {
    /// The current run.
    pub run_id: RunId,
    /// The node being executed.
    pub node_id: NodeId,
    /// Cancellation signal for this invocation.
    pub cancel: CancellationToken,
    /// The run's log sink.
    pub logger: Arc<dyn LogCollector>,
}

impl fmt::Debug for CallContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallContext")
            .field("run_id", &self.run_id)
            .field("node_id", &self.node_id)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}

/// A boxed future returned by a function invocation.
pub type FunctionFuture<'a> =
    Pin<Box<dyn Future<Output = Result<Value, FunctionError>> + Send + 'a>>;

/// The trait implemented by every callable a sequence can invoke.
///
/// Implement it directly for async functions:
///
/// ```ignore
/// struct Fetch;
///
/// impl SeqFunction for Fetch {
///     fn call<'a>(&'a self, args: Kwargs, ctx: CallContext) -> FunctionFuture<'a> {
///         Box::pin(async move {
///             let url = args.get("url").and_then(|v| v.as_str()).map(str::to_string)
///                 .ok_or_else(|| FunctionError::new("MissingArgument").with_arg("url"))?;
///             // ... await the fetch, checking ctx.cancel ...
///             Ok(Value::string(url))
///         })
///     }
/// }
/// ```
///
/// For plain synchronous closures, use [`FunctionRegistry::register_fn`].
pub trait SeqFunction: Send + Sync {
    /// Invoke the function with the evaluated keyword arguments.
    fn call<'a>(&'a self, args: Kwargs, ctx: CallContext) -> FunctionFuture<'a>;
}

/// Adapter turning a synchronous closure into a [`SeqFunction`].
struct FnAdapter<F>(F);

impl<F> SeqFunction for FnAdapter<F>
where
    F: Fn(Kwargs, CallContext) -> Result<Value, FunctionError> + Send + Sync,
{
    fn call<'a>(&'a self, args: Kwargs, ctx: CallContext) -> FunctionFuture<'a> {
        let result = (self.0)(args, ctx);
        Box::pin(std::future::ready(result))
    }
}

/// Registry mapping function name → callable.
#[derive(Default, Clone)]
pub struct FunctionRegistry {
    functions: HashMap<String, Arc<dyn SeqFunction>>,
}

impl FunctionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a function, replacing any previous registration under the
    /// same name.
    pub fn register(&mut self, name: impl Into<String>, function: impl SeqFunction + 'static) {
        self.functions.insert(name.into(), Arc::new(function));
    }

    /// Register a synchronous closure as a function.
    pub fn register_fn<F>(&mut self, name: impl Into<String>, function: F)
    where
        F: Fn(Kwargs, CallContext) -> Result<Value, FunctionError> + Send + Sync + 'static,
    {
        self.register(name, FnAdapter(function));
    }

    /// Look up a function by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn SeqFunction>> {
        self.functions.get(name).cloned()
    }

    /// Check whether a name is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    /// The registered names, sorted.
    pub fn names(&self) -> BTreeSet<&str> {
        self.functions.keys().map(String::as_str).collect()
    }

    /// Number of registered functions.
    pub fn len(&self) -> usize {
        self.functions.len()
    }

    /// Check whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}

impl fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionRegistry")
            .field("names", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sequor_core::logging::BufferedCollector;

    fn test_ctx() -> CallContext {
        CallContext {
            run_id: RunId::new(),
            node_id: NodeId::new(1),
            cancel: CancellationToken::new(),
            logger: Arc::new(BufferedCollector::with_default_capacity()),
        }
    }

    #[tokio::test]
    async fn register_and_call_sync_fn() {
        let mut registry = FunctionRegistry::new();
        registry.register_fn("double", |args, _ctx| {
            let n = args
                .get("n")
                .and_then(Value::as_i64)
                .ok_or_else(|| FunctionError::new("MissingArgument").with_arg("n"))?;
            Ok(Value::int(n * 2))
        });

        let function = registry.get("double").unwrap();
        let mut args = Kwargs::new();
        args.insert("n".to_string(), Value::int(21));
        let result = function.call(args, test_ctx()).await.unwrap();
        assert_eq!(result, Value::int(42));
    }

    #[tokio::test]
    async fn error_carries_name_and_args() {
        let mut registry = FunctionRegistry::new();
        registry.register_fn("fail", |_args, _ctx| {
            Err(FunctionError::new("ValueError").with_arg("bad input"))
        });

        let function = registry.get("fail").unwrap();
        let err = function.call(Kwargs::new(), test_ctx()).await.unwrap_err();
        assert_eq!(err.name, "ValueError");
        let info: ErrInfo = err.into();
        assert_eq!(info.args, vec![Value::string("bad input")]);
    }

    #[test]
    fn registry_queries() {
        let mut registry = FunctionRegistry::new();
        assert!(registry.is_empty());
        registry.register_fn("a", |_, _| Ok(Value::null()));
        registry.register_fn("b", |_, _| Ok(Value::null()));
        assert_eq!(registry.len(), 2);
        assert!(registry.contains("a"));
        assert!(!registry.contains("c"));
        let names: Vec<&str> = registry.names().into_iter().collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn error_display() {
        let err = FunctionError::new("Timeout");
        assert_eq!(err.to_string(), "Timeout");
        let err = FunctionError::new("ValueError").with_arg("x").with_arg(2i64);
        assert_eq!(err.to_string(), "ValueError(x, 2)");
    }
}
