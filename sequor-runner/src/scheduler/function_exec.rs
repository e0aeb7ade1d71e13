//! Function node execution.
//!
//! Runs on a worker task, away from the coordinator. The protocol, in
//! order: evaluate wrapper constructor bindings against the coordinator's
//! environment snapshot and construct the wrappers; run every `pre` in
//! declared order, capturing each return value under the wrapper's name;
//! evaluate the function's argument bindings against the snapshot
//! augmented with the `wrappers` map; invoke the user function under the
//! node's timeout; run `post` in reverse order for every wrapper whose
//! `pre` completed; build the [`NodeResult`].
//!
//! Errors here are data, not control flow: they end up in the result's
//! exception record and the sequence decides what happens next through
//! its transition conditions.

use crate::functions::{CallContext, Kwargs, SeqFunction};
use crate::wrappers::{Wrapper, WrapperFactory};
use sequor_core::expr;
use sequor_core::logging::{LogCollector, LogEvent};
use sequor_core::result::{ErrInfo, NodeException, NodeResult};
use sequor_core::seq::FunctionSpec;
use sequor_core::types::{NodeId, RunId};
use sequor_core::value::Value;
use sequor_core::variables::Env;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// The error name recorded when a node's timeout expires.
pub const TIMEOUT_ERROR_NAME: &str = "Timeout";

/// The error name recorded when an argument binding fails to evaluate.
pub const EVAL_ERROR_NAME: &str = "EvalError";

/// Everything a worker needs to execute one function node, captured so
/// the task holds no reference to scheduler state.
pub(crate) struct FunctionExecution {
    pub run_id: RunId,
    pub node_id: NodeId,
    pub spec: FunctionSpec,
    /// Environment snapshot taken by the coordinator at dispatch time.
    pub env: Env,
    pub function: Arc<dyn SeqFunction>,
    /// Wrapper factories resolved from the registry, in declared order.
    pub factories: Vec<Arc<dyn WrapperFactory>>,
    /// Effective timeout (node timeout, or the runner default).
    pub timeout: Option<Duration>,
    /// Cancellation token for this invocation (child of the run token).
    pub cancel: CancellationToken,
    pub logger: Arc<dyn LogCollector>,
}

pub(crate) async fn execute(exec: FunctionExecution) -> NodeResult {
    let node_id = exec.node_id;
    let mut function_error: Option<ErrInfo> = None;
    let mut wrapper_error: Option<ErrInfo> = None;
    let mut returned: Option<Value> = None;

    // Construct the wrappers from bindings evaluated against the snapshot.
    let mut constructed: Vec<(String, Box<dyn Wrapper>)> = Vec::new();
    match build_wrappers(&exec) {
        Ok(wrappers) => constructed = wrappers,
        Err(BuildError::Eval(info)) => function_error = Some(info),
        Err(BuildError::Construction(info)) => wrapper_error = Some(info),
    }

    // Run every pre in declared order; the first failure skips the rest
    // and the user function.
    let mut pre_results: HashMap<String, Value> = HashMap::new();
    let mut pre_completed = 0usize;
    if function_error.is_none() && wrapper_error.is_none() {
        for (name, wrapper) in constructed.iter_mut() {
            match wrapper.pre() {
                Ok(value) => {
                    pre_results.insert(name.clone(), value);
                    pre_completed += 1;
                }
                Err(err) => {
                    tracing::warn!(node = %node_id, wrapper = %name, error = %err, "Wrapper pre failed");
                    wrapper_error = Some(err.into());
                    break;
                }
            }
        }
    }

    // Invoke the user function with arguments evaluated against the
    // snapshot plus the per-invocation wrappers binding.
    if function_error.is_none() && wrapper_error.is_none() {
        match evaluate_arguments(&exec.spec.arguments, &exec.env, &pre_results) {
            Ok(args) => {
                let (value, error) = invoke(&exec, args).await;
                returned = value;
                function_error = error;
            }
            Err(info) => function_error = Some(info),
        }
    }

    // Run post in reverse order for every wrapper whose pre completed.
    // A post failure never overrides an earlier wrapper error.
    for (name, wrapper) in constructed.iter_mut().take(pre_completed).rev() {
        if let Err(err) = wrapper.post() {
            tracing::warn!(node = %node_id, wrapper = %name, error = %err, "Wrapper post failed");
            if wrapper_error.is_none() {
                wrapper_error = Some(err.into());
            }
        }
    }

    NodeResult::with_exception(
        node_id,
        returned,
        NodeException {
            function: function_error,
            wrappers: wrapper_error,
        },
    )
}

enum BuildError {
    /// An argument binding failed to evaluate; owned by the function slot.
    Eval(ErrInfo),
    /// A factory rejected its arguments; owned by the wrappers slot.
    Construction(ErrInfo),
}

fn build_wrappers(
    exec: &FunctionExecution,
) -> Result<Vec<(String, Box<dyn Wrapper>)>, BuildError> {
    let mut constructed = Vec::with_capacity(exec.spec.wrappers.len());
    for (spec, factory) in exec.spec.wrappers.iter().zip(&exec.factories) {
        let mut args = Kwargs::with_capacity(spec.arguments.len());
        for (name, binding) in &spec.arguments {
            let value = expr::evaluate_binding(binding, &exec.env)
                .map_err(|err| BuildError::Eval(eval_err_info(&err)))?;
            args.insert(name.clone(), value);
        }
        let wrapper = factory
            .build(args)
            .map_err(|err| BuildError::Construction(err.into()))?;
        constructed.push((spec.name.clone(), wrapper));
    }
    Ok(constructed)
}

fn evaluate_arguments(
    bindings: &HashMap<String, Value>,
    env: &Env,
    pre_results: &HashMap<String, Value>,
) -> Result<Kwargs, ErrInfo> {
    // The wrappers binding exists only for this evaluation; it holds
    // exactly the declared wrappers with their pre return values.
    let mut call_env = env.clone();
    let mut map = serde_json::Map::with_capacity(pre_results.len());
    for (name, value) in pre_results {
        map.insert(name.clone(), value.clone().into_inner());
    }
    call_env.insert(
        "wrappers".to_string(),
        Value(serde_json::Value::Object(map)),
    );

    let mut args = Kwargs::with_capacity(bindings.len());
    for (name, binding) in bindings {
        let value = expr::evaluate_binding(binding, &call_env)
            .map_err(|err| eval_err_info(&err))?;
        args.insert(name.clone(), value);
    }
    Ok(args)
}

async fn invoke(
    exec: &FunctionExecution,
    args: Kwargs,
) -> (Option<Value>, Option<ErrInfo>) {
    let ctx = CallContext {
        run_id: exec.run_id,
        node_id: exec.node_id,
        cancel: exec.cancel.clone(),
        logger: Arc::clone(&exec.logger),
    };

    let future = exec.function.call(args, ctx);
    let outcome = match exec.timeout {
        Some(limit) => match tokio::time::timeout(limit, future).await {
            Ok(outcome) => outcome,
            Err(_elapsed) => {
                // Best-effort interrupt; the function observes the token
                // cooperatively.
                exec.cancel.cancel();
                exec.logger.collect(
                    LogEvent::warn(format!(
                        "Function '{}' timed out after {}ms",
                        exec.spec.function,
                        limit.as_millis()
                    ))
                    .with_run_id(exec.run_id)
                    .with_node_id(exec.node_id),
                );
                return (None, Some(ErrInfo::new(TIMEOUT_ERROR_NAME)));
            }
        },
        None => future.await,
    };

    match outcome {
        Ok(value) => (Some(value), None),
        Err(err) => {
            tracing::debug!(node = %exec.node_id, error = %err, "Function raised");
            (None, Some(err.into()))
        }
    }
}

fn eval_err_info(err: &sequor_core::SequorError) -> ErrInfo {
    ErrInfo::new(EVAL_ERROR_NAME).with_arg(err.to_string())
}
