//! The token scheduler.
//!
//! A single coordinator owns every piece of mutable run state: the ready
//! queue, the variable store and result registry, the per-sync arrival
//! map, the color counter, and the token accounting. Start, variable,
//! split, and sync nodes execute synchronously on the coordinator (none
//! of them invoke user code); function nodes are dispatched to a
//! `JoinSet` of worker tasks bounded by a semaphore, and their results
//! come back through `join_next`.
//!
//! Transition selection happens on the coordinator against a fresh
//! environment snapshot: declared order, first satisfied transition for
//! every node kind except `parallel_split`, which fires all satisfied
//! transitions under a freshly minted color.

mod function_exec;
mod token;

pub use token::{Color, ColorStack, Token, ROOT_COLOR};

use crate::functions::FunctionRegistry;
use crate::runner::{RunOutcome, RunStatus, RunnerOptions};
use crate::wrappers::WrapperRegistry;
use function_exec::FunctionExecution;
use sequor_core::error::{Result, SequorError};
use sequor_core::expr;
use sequor_core::logging::{LogCollector, LogEvent};
use sequor_core::result::NodeResult;
use sequor_core::seq::{NodeKind, SequenceGraph};
use sequor_core::types::{NodeId, RunId};
use sequor_core::variables::VariableStore;
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Token accounting for one run.
///
/// In a clean run every created token is eventually consumed: tokens are
/// consumed when their node begins execution, or absorbed by a sync. A
/// cancelled run may leave the numbers apart.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunStats {
    /// Tokens created by seeding and transition firing.
    pub tokens_created: u64,
    /// Tokens consumed by node execution or sync absorption.
    pub tokens_consumed: u64,
    /// Function node executions completed.
    pub functions_executed: u64,
    /// Sync firings.
    pub syncs_fired: u64,
}

/// Per-color arrival state of one sync node.
#[derive(Debug)]
struct SyncState {
    arrived: BTreeSet<NodeId>,
    /// The color stack of the wave, kept to restore the pre-split color
    /// when the sync fires.
    colors: ColorStack,
}

pub(crate) struct Scheduler {
    graph: Arc<SequenceGraph>,
    functions: FunctionRegistry,
    wrappers: WrapperRegistry,
    store: VariableStore,
    logger: Arc<dyn LogCollector>,
    run_id: RunId,
    options: RunnerOptions,
    cancel: CancellationToken,
    ready: VecDeque<Token>,
    arrivals: HashMap<(NodeId, Color), SyncState>,
    color_counter: Color,
    failed_tests: Vec<NodeResult>,
    stats: RunStats,
}

impl Scheduler {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        graph: Arc<SequenceGraph>,
        functions: FunctionRegistry,
        wrappers: WrapperRegistry,
        store: VariableStore,
        logger: Arc<dyn LogCollector>,
        options: RunnerOptions,
        cancel: CancellationToken,
        run_id: RunId,
    ) -> Self {
        Self {
            graph,
            functions,
            wrappers,
            store,
            logger,
            run_id,
            options,
            cancel,
            ready: VecDeque::new(),
            arrivals: HashMap::new(),
            color_counter: ROOT_COLOR,
            failed_tests: Vec::new(),
            stats: RunStats::default(),
        }
    }

    /// Drive the run to termination: no ready tokens and no in-flight
    /// executions remain.
    pub(crate) async fn run(mut self) -> RunOutcome {
        tracing::info!(run_id = %self.run_id, nodes = self.graph.node_count(), "Run started");
        self.logger
            .collect(LogEvent::info("Run started").with_run_id(self.run_id));

        let starts: Vec<NodeId> = self.graph.start_nodes().to_vec();
        for start in starts {
            self.emit(Token::seed(start));
        }

        let semaphore = Arc::new(Semaphore::new(self.options.worker_count.max(1)));
        let mut tasks: JoinSet<(Token, NodeResult)> = JoinSet::new();
        let mut fatal: Option<SequorError> = None;
        let cancel = self.cancel.clone();

        loop {
            if cancel.is_cancelled() {
                break;
            }
            if let Err(err) = self.pump_ready(&mut tasks, &semaphore) {
                fatal = Some(err);
                break;
            }
            if tasks.is_empty() {
                // Ready queue drained by pump_ready: nothing left to do.
                break;
            }

            tokio::select! {
                joined = tasks.join_next() => {
                    match joined {
                        Some(Ok((token, result))) => {
                            if let Err(err) = self.handle_completion(token, result) {
                                fatal = Some(err);
                                break;
                            }
                        }
                        Some(Err(join_err)) => {
                            fatal = Some(SequorError::NodePanic {
                                node_id: NodeId::new(0),
                                message: if join_err.is_panic() {
                                    "node task panicked".to_string()
                                } else {
                                    "node task was cancelled".to_string()
                                },
                            });
                            break;
                        }
                        None => {}
                    }
                }
                _ = cancel.cancelled() => {
                    break;
                }
            }
        }

        let externally_cancelled = fatal.is_none() && self.cancel.is_cancelled();

        // Stop dispatching, interrupt in-flight invocations, and wait for
        // them to drain up to the hard-kill deadline.
        self.cancel.cancel();
        if !tasks.is_empty() {
            let deadline = Duration::from_millis(self.options.drain_timeout_ms);
            let drained = tokio::time::timeout(deadline, async {
                while let Some(joined) = tasks.join_next().await {
                    if let Ok((token, result)) = joined {
                        self.record_result(&token, &result);
                    }
                }
            })
            .await;

            if drained.is_err() {
                let pending = tasks.len();
                tasks.abort_all();
                while tasks.join_next().await.is_some() {}
                tracing::warn!(run_id = %self.run_id, pending, "Aborted executions past drain deadline");
                if fatal.is_none() {
                    fatal = Some(SequorError::DrainTimeout { pending });
                }
            }
        }

        let status = if fatal.is_some() {
            RunStatus::Error
        } else if !self.failed_tests.is_empty() {
            RunStatus::TestFailed
        } else {
            RunStatus::Completed
        };

        if let Some(err) = &fatal {
            tracing::error!(run_id = %self.run_id, error = %err, "Run failed");
            self.logger.collect(
                LogEvent::error(format!("Run failed: {}", err)).with_run_id(self.run_id),
            );
        } else {
            tracing::info!(run_id = %self.run_id, status = ?status, "Run finished");
            self.logger.collect(
                LogEvent::info(format!("Run finished: {:?}", status)).with_run_id(self.run_id),
            );
        }

        let (variables, results) = self.store.into_parts();
        RunOutcome {
            status,
            failed_tests: self.failed_tests,
            fatal,
            cancelled: externally_cancelled,
            stats: self.stats,
            results,
            variables,
        }
    }

    /// Execute every ready token. Start, variable, split, and sync run
    /// here on the coordinator; function nodes are dispatched to workers.
    fn pump_ready(
        &mut self,
        tasks: &mut JoinSet<(Token, NodeResult)>,
        semaphore: &Arc<Semaphore>,
    ) -> Result<()> {
        while let Some(token) = self.ready.pop_front() {
            if self.cancel.is_cancelled() {
                return Ok(());
            }
            self.stats.tokens_consumed += 1;

            let graph = Arc::clone(&self.graph);
            let node = graph.node(token.node_id)?;
            tracing::debug!(
                run_id = %self.run_id,
                node = %node.label(),
                color = token.color(),
                queued_us = token.created_at.elapsed().as_micros() as u64,
                "Token at node"
            );

            match &node.kind {
                NodeKind::Start => {
                    self.fire_first_satisfied(token.node_id, token.colors.clone())?;
                }
                NodeKind::Stop => {
                    tracing::debug!(run_id = %self.run_id, node = %node.label(), "Token reached stop");
                }
                NodeKind::Variable(spec) => {
                    // Each assignment sees the writes of the ones before it.
                    for (name, binding) in &spec.assignments {
                        let env = self.store.snapshot();
                        let value = expr::evaluate_binding(binding, &env)?;
                        self.store.set_on_the_fly(name, value)?;
                    }
                    self.fire_first_satisfied(token.node_id, token.colors.clone())?;
                }
                NodeKind::ParallelSplit => {
                    self.fire_split(&token)?;
                }
                NodeKind::ParallelSync => {
                    self.account_sync_arrival(&token)?;
                }
                NodeKind::Function(spec) => {
                    let function = self.functions.get(&spec.function).ok_or_else(|| {
                        SequorError::UnknownFunction {
                            function: spec.function.clone(),
                            node_id: token.node_id,
                        }
                    })?;
                    let mut factories = Vec::with_capacity(spec.wrappers.len());
                    for wrapper in &spec.wrappers {
                        factories.push(self.wrappers.get(&wrapper.name).ok_or_else(|| {
                            SequorError::UnknownWrapper {
                                wrapper: wrapper.name.clone(),
                                node_id: token.node_id,
                            }
                        })?);
                    }

                    let exec = FunctionExecution {
                        run_id: self.run_id,
                        node_id: token.node_id,
                        spec: spec.clone(),
                        env: self.store.snapshot(),
                        function,
                        factories,
                        timeout: spec
                            .timeout
                            .or(self.options.default_timeout_ms.map(Duration::from_millis)),
                        cancel: self.cancel.child_token(),
                        logger: Arc::clone(&self.logger),
                    };

                    tracing::debug!(run_id = %self.run_id, node = %node.label(), function = %spec.function, "Dispatching function node");
                    let semaphore = Arc::clone(semaphore);
                    tasks.spawn(async move {
                        let _permit = semaphore
                            .acquire()
                            .await
                            .expect("semaphore should not be closed");
                        let result = function_exec::execute(exec).await;
                        (token, result)
                    });
                }
            }
        }
        Ok(())
    }

    /// Apply a worker completion: commit the result, bind the return
    /// alias, track test failures, and fire the node's transition.
    fn handle_completion(&mut self, token: Token, result: NodeResult) -> Result<()> {
        self.record_result(&token, &result);

        let graph = Arc::clone(&self.graph);
        let node = graph.node(token.node_id)?;
        if let NodeKind::Function(spec) = &node.kind {
            if let (Some(alias), Some(value)) = (
                &spec.return_alias,
                self.store.result(token.node_id).and_then(|r| r.returned.clone()),
            ) {
                self.store.set_on_the_fly(alias, value)?;
            }
        }

        self.fire_first_satisfied(token.node_id, token.colors)
    }

    /// Commit a node result and update the failure bookkeeping. Used both
    /// on the normal path and while draining a cancelled run.
    fn record_result(&mut self, token: &Token, result: &NodeResult) {
        self.stats.functions_executed += 1;

        let graph = Arc::clone(&self.graph);
        let is_test = matches!(
            graph.node(token.node_id).map(|n| &n.kind),
            Ok(NodeKind::Function(spec)) if spec.is_test
        );

        if let Some(exception) = &result.exception {
            let detail = exception
                .function
                .as_ref()
                .or(exception.wrappers.as_ref())
                .map(|e| e.name.clone())
                .unwrap_or_default();
            tracing::debug!(run_id = %self.run_id, node = %token.node_id, error = %detail, "Node completed with exception");
            self.logger.collect(
                LogEvent::warn(format!("Node failed: {}", detail))
                    .with_run_id(self.run_id)
                    .with_node_id(token.node_id),
            );
        } else {
            tracing::debug!(run_id = %self.run_id, node = %token.node_id, "Node completed");
        }

        if is_test && result.function_failed() {
            self.logger.collect(
                LogEvent::error("Test node failed")
                    .with_run_id(self.run_id)
                    .with_node_id(token.node_id),
            );
            self.failed_tests.push(result.clone());
        }

        self.store.set_result(result.clone());
    }

    /// Fire the first satisfied transition of a non-split node, in
    /// declared order. Zero satisfied transitions is fatal.
    fn fire_first_satisfied(&mut self, source: NodeId, colors: ColorStack) -> Result<()> {
        let graph = Arc::clone(&self.graph);
        let env = self.store.snapshot();
        for transition in graph.outgoing(source) {
            let satisfied = match &transition.condition {
                None => true,
                Some(condition) => expr::evaluate_condition(condition, &env)?,
            };
            if satisfied {
                self.emit(Token::fired(transition.target, source, colors));
                return Ok(());
            }
        }
        Err(SequorError::NoTransitionFired { node_id: source })
    }

    /// Fire a parallel split: mint a fresh color and emit one token per
    /// satisfied transition.
    fn fire_split(&mut self, token: &Token) -> Result<()> {
        let graph = Arc::clone(&self.graph);
        let env = self.store.snapshot();
        let mut targets = Vec::new();
        for transition in graph.outgoing(token.node_id) {
            let satisfied = match &transition.condition {
                None => true,
                Some(condition) => expr::evaluate_condition(condition, &env)?,
            };
            if satisfied {
                targets.push(transition.target);
            }
        }
        if targets.is_empty() {
            return Err(SequorError::NoTransitionFired {
                node_id: token.node_id,
            });
        }

        self.color_counter += 1;
        let color = self.color_counter;
        let colors = token.colors.push(color);
        tracing::debug!(
            run_id = %self.run_id,
            split = %token.node_id,
            color,
            branches = targets.len(),
            "Split fired"
        );
        for target in targets {
            self.emit(Token::fired(target, token.node_id, colors.clone()));
        }
        Ok(())
    }

    /// Record an arrival at a sync node and fire it once every expected
    /// source has delivered a token under the same color.
    fn account_sync_arrival(&mut self, token: &Token) -> Result<()> {
        let graph = Arc::clone(&self.graph);
        let sync = token.node_id;
        let color = token.color();
        let origin = token.origin.unwrap_or(sync);

        let state = self
            .arrivals
            .entry((sync, color))
            .or_insert_with(|| SyncState {
                arrived: BTreeSet::new(),
                colors: token.colors.clone(),
            });
        state.arrived.insert(origin);

        let expected = graph.expected_arrivals(sync);
        let complete = expected.is_some_and(|expected| &state.arrived == expected);
        tracing::debug!(
            run_id = %self.run_id,
            sync = %sync,
            color,
            arrived = state.arrived.len(),
            expected = expected.map(BTreeSet::len).unwrap_or(0),
            "Sync arrival"
        );

        if complete {
            let state = self
                .arrivals
                .remove(&(sync, color))
                .expect("sync state present for completed color");
            self.stats.syncs_fired += 1;
            tracing::debug!(run_id = %self.run_id, sync = %sync, color, "Sync fired");
            self.fire_first_satisfied(sync, state.colors.pop())?;
        }
        Ok(())
    }

    fn emit(&mut self, token: Token) {
        self.stats.tokens_created += 1;
        self.ready.push_back(token);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // The scheduler's observable behavior is covered by the integration
    // suite in tests/; these tests pin the arrival-set bookkeeping.

    #[test]
    fn stats_default_to_zero() {
        let stats = RunStats::default();
        assert_eq!(stats.tokens_created, 0);
        assert_eq!(stats.tokens_consumed, 0);
    }

    #[test]
    fn sync_state_tracks_origins() {
        let mut state = SyncState {
            arrived: BTreeSet::new(),
            colors: ColorStack::root().push(1),
        };
        state.arrived.insert(NodeId::new(2));
        state.arrived.insert(NodeId::new(2));
        state.arrived.insert(NodeId::new(3));
        assert_eq!(state.arrived.len(), 2);
        assert_eq!(state.colors.pop().color(), ROOT_COLOR);
    }
}
