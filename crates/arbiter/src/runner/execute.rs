//! Execution engine
//!
//! Writes the source, compiles when the language needs it, runs the program
//! under the engine's own deadline, and assembles the [`ExecutionResult`].

use std::time::{Duration, Instant};

use tracing::{debug, info, instrument};

use crate::config::EngineConfig;
use crate::registry::RunnerSpec;
use crate::runner::compile::{self, CompileOutcome};
use crate::sandbox::{Sandbox, SandboxError, Step, StepOutcome};
use crate::types::{ExecutionRequest, ExecutionResult, Stage};

/// Run `step` and kill it if it outlives `deadline`.
///
/// A killed step reports `timed_out` and whatever output it had written.
pub(crate) async fn run_with_deadline<S: Sandbox>(
    sandbox: &S,
    step: Step<'_>,
    deadline: Option<Duration>,
) -> Result<(StepOutcome, Duration), SandboxError> {
    let label = step.label;
    let output_limit = step.output_limit;
    let started = Instant::now();

    let outcome = match deadline {
        Some(deadline) => match tokio::time::timeout(deadline, sandbox.run(step)).await {
            Ok(outcome) => outcome?,
            Err(_) => {
                info!(label, ?deadline, "step exceeded engine deadline, killed");
                let (stdout, stderr) = sandbox.captured_output(label, output_limit).await;
                StepOutcome::killed(stdout, stderr)
            }
        },
        None => sandbox.run(step).await?,
    };

    Ok((outcome, started.elapsed()))
}

#[instrument(skip_all, fields(language = %spec.language_id, box_id = sandbox.id()))]
pub async fn execute<S: Sandbox>(
    sandbox: &S,
    request: &ExecutionRequest,
    spec: &RunnerSpec,
    engine: &EngineConfig,
) -> Result<ExecutionResult, SandboxError> {
    let source_name = spec.source_name();
    sandbox
        .write_file(&source_name, &request.source_code)
        .await?;
    debug!(source_name, len = request.source_code.len(), "wrote source file");

    let mut elapsed = Duration::ZERO;

    if let Some(ref compile_step) = spec.compile {
        match compile::compile(sandbox, spec, compile_step, engine).await? {
            CompileOutcome::Compiled { duration } => elapsed += duration,
            CompileOutcome::Failed(result) => return Ok(result),
        }
    }

    let step = Step {
        label: "run",
        argv: spec.run_argv(),
        env: &spec.run_env,
        mounts: &spec.mounts,
        limits: &spec.limits,
        stdin: request.stdin.as_deref(),
        network: !spec.network_disabled,
        output_limit: engine.max_output_bytes,
    };
    let deadline = spec.limits.deadline(engine.timeout_grace());

    let (outcome, duration) = run_with_deadline(sandbox, step, deadline).await?;
    elapsed += duration;

    let exit_code = outcome.exit_status();
    debug!(
        exit_code,
        timed_out = outcome.timed_out,
        limit = ?outcome.limit_exceeded,
        message = ?outcome.message,
        "run finished"
    );

    Ok(ExecutionResult {
        stage: Stage::Run,
        stdout: outcome.stdout,
        stderr: outcome.stderr,
        exit_code,
        signal: outcome.signal,
        timed_out: outcome.timed_out,
        limit_exceeded: outcome.limit_exceeded,
        duration: elapsed,
    })
}
