//! Compilation step
//!
//! A compile step has its own limits and deadline. Any way it can fail,
//! including running out of time, is a compile failure.

use std::time::Duration;

use tracing::{debug, instrument};

use crate::config::EngineConfig;
use crate::registry::{CompileStep, RunnerSpec};
use crate::runner::execute::run_with_deadline;
use crate::sandbox::{Sandbox, SandboxError, Step};
use crate::types::{ExecutionResult, Stage};

#[derive(Debug)]
pub(crate) enum CompileOutcome {
    Compiled { duration: Duration },
    /// Final result; the program must not run
    Failed(ExecutionResult),
}

#[instrument(skip_all, fields(language = %spec.language_id))]
pub(crate) async fn compile<S: Sandbox>(
    sandbox: &S,
    spec: &RunnerSpec,
    compile: &CompileStep,
    engine: &EngineConfig,
) -> Result<CompileOutcome, SandboxError> {
    let step = Step {
        label: "compile",
        argv: compile.command.expand(&spec.source_name(), spec.binary_name()),
        env: &compile.env,
        mounts: &spec.mounts,
        limits: &compile.limits,
        stdin: None,
        network: false,
        output_limit: engine.max_output_bytes,
    };
    let deadline = compile.limits.deadline(engine.timeout_grace());

    let (outcome, duration) = run_with_deadline(sandbox, step, deadline).await?;

    if outcome.succeeded() {
        debug!(?duration, "compilation succeeded");
        return Ok(CompileOutcome::Compiled { duration });
    }

    let exit_code = outcome.exit_status();
    let mut stderr = outcome.stderr;
    if outcome.timed_out {
        if !stderr.is_empty() && !stderr.ends_with(b"\n") {
            stderr.push(b'\n');
        }
        stderr.extend_from_slice(b"compilation exceeded its time limit\n");
    } else if stderr.is_empty()
        && outcome.stdout.is_empty()
        && let Some(ref message) = outcome.message
    {
        // The compiler said nothing; isolate's status line is all there is
        stderr.extend_from_slice(message.as_bytes());
    }

    debug!(exit_code, timed_out = outcome.timed_out, "compilation failed");

    Ok(CompileOutcome::Failed(ExecutionResult {
        stage: Stage::Compile,
        stdout: outcome.stdout,
        stderr,
        exit_code,
        signal: outcome.signal,
        timed_out: false,
        limit_exceeded: outcome.limit_exceeded,
        duration,
    }))
}
