//! Run a sequence file.
//!
//! The stock binary ships a small demo function set (`echo`, `sleep_ms`,
//! `log`) so self-contained sequences can be executed directly. Real
//! deployments embed `sequor-runner` and register their own functions.

use sequor_core::logging::LogEvent;
use sequor_core::seq::SequenceDefinition;
use sequor_core::value::Value;
use sequor_runner::functions::FunctionFuture;
use sequor_runner::{
    CallContext, FunctionRegistry, Kwargs, RunStatus, RunnerOptions, SeqFunction, SequenceRunner,
    WrapperRegistry,
};
use std::path::Path;
use std::process::ExitCode;
use std::time::Duration;

struct SleepMs;

impl SeqFunction for SleepMs {
    fn call<'a>(&'a self, args: Kwargs, ctx: CallContext) -> FunctionFuture<'a> {
        Box::pin(async move {
            let ms = args.get("ms").and_then(Value::as_i64).unwrap_or(0).max(0);
            tokio::select! {
                _ = ctx.cancel.cancelled() => {}
                _ = tokio::time::sleep(Duration::from_millis(ms as u64)) => {}
            }
            Ok(Value::int(ms))
        })
    }
}

fn demo_registry() -> FunctionRegistry {
    let mut functions = FunctionRegistry::new();
    functions.register_fn("echo", |args: Kwargs, _ctx| {
        Ok(args.get("value").cloned().unwrap_or_default())
    });
    functions.register_fn("log", |args: Kwargs, ctx: CallContext| {
        let message = args
            .get("message")
            .map(|v| v.to_string())
            .unwrap_or_default();
        ctx.logger
            .collect(LogEvent::info(message).with_run_id(ctx.run_id).with_node_id(ctx.node_id));
        Ok(Value::null())
    });
    functions.register("sleep_ms", SleepMs);
    functions
}

/// Load, compile, and run a sequence file.
///
/// Exit codes: 0 on Completed, 1 on TestFailed, 2 on load or fatal
/// engine errors.
pub async fn run(file: &str, workers: usize, timeout_ms: Option<u64>) -> ExitCode {
    let graph = match SequenceDefinition::from_file_validated(Path::new(file))
        .and_then(|sequence| sequence.compile())
    {
        Ok(graph) => graph,
        Err(err) => {
            eprintln!("error: {}", err);
            return ExitCode::from(2);
        }
    };

    let mut options = RunnerOptions::default().with_worker_count(workers);
    if let Some(timeout_ms) = timeout_ms {
        options = options.with_default_timeout_ms(timeout_ms);
    }

    let runner = match SequenceRunner::new(graph, demo_registry(), WrapperRegistry::new()) {
        Ok(runner) => runner.with_options(options),
        Err(err) => {
            eprintln!("error: {}", err);
            return ExitCode::from(2);
        }
    };

    let outcome = runner.run().await;

    match outcome.status {
        RunStatus::Completed => {
            println!(
                "Run completed ({} function node(s) executed)",
                outcome.stats.functions_executed
            );
            ExitCode::SUCCESS
        }
        RunStatus::TestFailed => {
            eprintln!("Run finished with {} failed test(s):", outcome.failed_tests.len());
            for result in &outcome.failed_tests {
                let name = result
                    .exception
                    .as_ref()
                    .and_then(|e| e.function.as_ref())
                    .map(|e| e.name.as_str())
                    .unwrap_or("unknown");
                eprintln!("  - {}: {}", result.nid, name);
            }
            ExitCode::from(1)
        }
        RunStatus::Error => {
            match &outcome.fatal {
                Some(err) => eprintln!("Run failed: {}", err),
                None => eprintln!("Run failed"),
            }
            ExitCode::from(2)
        }
        RunStatus::Running => {
            // Unreachable after run() returns; treated as an engine fault.
            eprintln!("Run ended in an inconsistent state");
            ExitCode::from(2)
        }
    }
}
