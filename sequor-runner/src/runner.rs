//! The public runner API.
//!
//! A [`SequenceRunner`] binds a compiled graph to the function and
//! wrapper registries and the run constants. It is an explicit object —
//! no process-global state — so multiple runners (and multiple runs of
//! one runner) can coexist. `run` drives a sequence to completion on the
//! current task; `spawn` returns a [`RunHandle`] with `wait`, `cancel`,
//! and `status`.

use crate::functions::FunctionRegistry;
use crate::scheduler::{RunStats, Scheduler};
use crate::wrappers::WrapperRegistry;
use parking_lot::Mutex;
use sequor_core::error::{Result, SequorError};
use sequor_core::logging::{BufferedCollector, LogCollector};
use sequor_core::result::NodeResult;
use sequor_core::seq::{NodeKind, SequenceGraph};
use sequor_core::types::{NodeId, RunId};
use sequor_core::value::Value;
use sequor_core::variables::VariableStore;
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Final state of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    /// The run is still in progress (only observable through a handle).
    Running,
    /// All tokens drained with no test failure and no fatal error.
    Completed,
    /// The run completed but at least one `is_test` node failed.
    TestFailed,
    /// A fatal error aborted the run.
    Error,
}

/// The outcome of one run.
#[derive(Debug)]
pub struct RunOutcome {
    /// Final status.
    pub status: RunStatus,
    /// Results of every failed `is_test` node, in completion order.
    pub failed_tests: Vec<NodeResult>,
    /// The fatal error, when `status` is [`RunStatus::Error`].
    pub fatal: Option<SequorError>,
    /// Whether the run was ended by an external cancel.
    pub cancelled: bool,
    /// Token accounting.
    pub stats: RunStats,
    /// The last result per function node that ran.
    pub results: HashMap<NodeId, NodeResult>,
    /// The final on-the-fly variables.
    pub variables: HashMap<String, Value>,
}

impl RunOutcome {
    /// An outcome for a run that failed before any token moved.
    fn failed_to_start(fatal: SequorError) -> Self {
        Self {
            status: RunStatus::Error,
            failed_tests: Vec::new(),
            fatal: Some(fatal),
            cancelled: false,
            stats: RunStats::default(),
            results: HashMap::new(),
            variables: HashMap::new(),
        }
    }

    /// The result of a node, if it ran.
    pub fn result(&self, id: u32) -> Option<&NodeResult> {
        self.results.get(&NodeId::new(id))
    }

    /// The final value of an on-the-fly variable.
    pub fn variable(&self, name: &str) -> Option<&Value> {
        self.variables.get(name)
    }
}

/// Runner configuration.
#[derive(Debug, Clone)]
pub struct RunnerOptions {
    /// Size of the worker pool executing function nodes.
    pub worker_count: usize,
    /// Default timeout in milliseconds for function nodes that declare
    /// none. `None` means no default limit.
    pub default_timeout_ms: Option<u64>,
    /// How long a cancelled or failed run waits for in-flight executions
    /// before aborting them.
    pub drain_timeout_ms: u64,
}

impl Default for RunnerOptions {
    fn default() -> Self {
        Self {
            worker_count: 8,
            default_timeout_ms: None,
            drain_timeout_ms: 5_000,
        }
    }
}

impl RunnerOptions {
    /// Set the worker pool size (at least 1).
    #[must_use]
    pub fn with_worker_count(mut self, count: usize) -> Self {
        self.worker_count = count.max(1);
        self
    }

    /// Set the default function-node timeout.
    #[must_use]
    pub fn with_default_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.default_timeout_ms = Some(timeout_ms);
        self
    }

    /// Set the drain deadline for cancelled runs.
    #[must_use]
    pub fn with_drain_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.drain_timeout_ms = timeout_ms;
        self
    }
}

/// Handle to a spawned run.
pub struct RunHandle {
    cancel: CancellationToken,
    status: Arc<Mutex<RunStatus>>,
    join: tokio::task::JoinHandle<RunOutcome>,
}

impl RunHandle {
    /// Wait for the run to finish.
    pub async fn wait(self) -> RunOutcome {
        match self.join.await {
            Ok(outcome) => outcome,
            Err(join_err) => RunOutcome::failed_to_start(SequorError::NodePanic {
                node_id: NodeId::new(0),
                message: format!("run task failed: {}", join_err),
            }),
        }
    }

    /// Signal a run-level stop: no new dispatches, best-effort interrupt
    /// of in-flight functions, then drain.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// The current status of the run.
    pub fn status(&self) -> RunStatus {
        *self.status.lock()
    }
}

/// Executes a compiled sequence against registered functions and wrappers.
pub struct SequenceRunner {
    graph: Arc<SequenceGraph>,
    functions: FunctionRegistry,
    wrappers: WrapperRegistry,
    constants: HashMap<String, Value>,
    options: RunnerOptions,
    collector: Arc<dyn LogCollector>,
}

impl std::fmt::Debug for SequenceRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SequenceRunner")
            .field("graph", &self.graph)
            .field("functions", &self.functions)
            .field("wrappers", &self.wrappers)
            .field("constants", &self.constants)
            .field("options", &self.options)
            .finish()
    }
}

impl SequenceRunner {
    /// Create a runner.
    ///
    /// Fails if the graph references a function or wrapper name missing
    /// from the registries, so a bad registration surfaces before any
    /// node runs.
    pub fn new(
        graph: SequenceGraph,
        functions: FunctionRegistry,
        wrappers: WrapperRegistry,
    ) -> Result<Self> {
        for node in graph.nodes() {
            if let NodeKind::Function(spec) = &node.kind {
                if !functions.contains(&spec.function) {
                    return Err(SequorError::UnknownFunction {
                        function: spec.function.clone(),
                        node_id: node.id,
                    });
                }
                for wrapper in &spec.wrappers {
                    if !wrappers.contains(&wrapper.name) {
                        return Err(SequorError::UnknownWrapper {
                            wrapper: wrapper.name.clone(),
                            node_id: node.id,
                        });
                    }
                }
            }
        }

        Ok(Self {
            graph: Arc::new(graph),
            functions,
            wrappers,
            constants: HashMap::new(),
            options: RunnerOptions::default(),
            collector: Arc::new(BufferedCollector::with_default_capacity()),
        })
    }

    /// Set the run constants.
    #[must_use]
    pub fn with_constants(mut self, constants: HashMap<String, Value>) -> Self {
        self.constants = constants;
        self
    }

    /// Set the runner options.
    #[must_use]
    pub fn with_options(mut self, options: RunnerOptions) -> Self {
        self.options = options;
        self
    }

    /// Set the log sink injected into user functions.
    #[must_use]
    pub fn with_collector(mut self, collector: Arc<dyn LogCollector>) -> Self {
        self.collector = collector;
        self
    }

    /// The log sink of this runner.
    pub fn collector(&self) -> &Arc<dyn LogCollector> {
        &self.collector
    }

    /// Run the sequence to completion.
    pub async fn run(&self) -> RunOutcome {
        self.run_with_cancel(CancellationToken::new()).await
    }

    /// Run the sequence under an externally-controlled cancellation token.
    pub async fn run_with_cancel(&self, cancel: CancellationToken) -> RunOutcome {
        let store = match VariableStore::new(self.constants.clone()) {
            Ok(store) => store,
            Err(err) => return RunOutcome::failed_to_start(err),
        };

        let scheduler = Scheduler::new(
            Arc::clone(&self.graph),
            self.functions.clone(),
            self.wrappers.clone(),
            store,
            Arc::clone(&self.collector),
            self.options.clone(),
            cancel,
            RunId::new(),
        );
        scheduler.run().await
    }

    /// Start the run on a background task and return a handle.
    pub fn spawn(&self) -> RunHandle {
        let cancel = CancellationToken::new();
        let status = Arc::new(Mutex::new(RunStatus::Running));

        let graph = Arc::clone(&self.graph);
        let functions = self.functions.clone();
        let wrappers = self.wrappers.clone();
        let constants = self.constants.clone();
        let options = self.options.clone();
        let collector = Arc::clone(&self.collector);
        let task_cancel = cancel.clone();
        let task_status = Arc::clone(&status);

        let join = tokio::spawn(async move {
            let store = match VariableStore::new(constants) {
                Ok(store) => store,
                Err(err) => {
                    let outcome = RunOutcome::failed_to_start(err);
                    *task_status.lock() = outcome.status;
                    return outcome;
                }
            };
            let scheduler = Scheduler::new(
                graph,
                functions,
                wrappers,
                store,
                collector,
                options,
                task_cancel,
                RunId::new(),
            );
            let outcome = scheduler.run().await;
            *task_status.lock() = outcome.status;
            outcome
        });

        RunHandle {
            cancel,
            status,
            join,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sequor_core::seq::SequenceDefinition;

    fn graph(yaml: &str) -> SequenceGraph {
        SequenceDefinition::from_yaml(yaml).unwrap().compile().unwrap()
    }

    const ONE_FUNCTION: &str = r#"
name: one_function
nodes:
  - id: 0
    type: start
    transitions:
      - target: 1
  - id: 1
    type: function
    function: hello
    transitions:
      - target: 2
  - id: 2
    type: stop
"#;

    #[test]
    fn unregistered_function_rejected_at_construction() {
        let err = SequenceRunner::new(
            graph(ONE_FUNCTION),
            FunctionRegistry::new(),
            WrapperRegistry::new(),
        )
        .unwrap_err();
        assert_eq!(err.code(), "E302");
        assert!(err.is_load_error());
    }

    #[test]
    fn unregistered_wrapper_rejected_at_construction() {
        let yaml = r#"
name: wrapped
nodes:
  - id: 0
    type: start
    transitions:
      - target: 1
  - id: 1
    type: function
    function: hello
    wrappers:
      - name: missing
    transitions:
      - target: 2
  - id: 2
    type: stop
"#;
        let mut functions = FunctionRegistry::new();
        functions.register_fn("hello", |_, _| Ok(Value::null()));
        let err =
            SequenceRunner::new(graph(yaml), functions, WrapperRegistry::new()).unwrap_err();
        assert_eq!(err.code(), "E303");
    }

    #[test]
    fn options_builder() {
        let options = RunnerOptions::default()
            .with_worker_count(0)
            .with_default_timeout_ms(100)
            .with_drain_timeout_ms(250);
        assert_eq!(options.worker_count, 1);
        assert_eq!(options.default_timeout_ms, Some(100));
        assert_eq!(options.drain_timeout_ms, 250);
    }
}
