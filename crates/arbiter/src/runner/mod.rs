//! Submission runner
//!
//! [`Executor`] drives one submission through the whole pipeline: resolve the
//! language, acquire a sandbox, compile and run, release, evaluate.

use std::sync::Arc;

use tracing::{error, info, instrument, warn};

pub use crate::runner::execute::execute;

mod compile;
mod execute;

use crate::config::{Config, EngineConfig};
use crate::error::ExecuteError;
use crate::isolate::{BoxPool, prepare_cgroup};
use crate::reaper;
use crate::registry::{LanguageRegistry, RunnerSpec};
use crate::sandbox::Provisioner;
use crate::types::{ExecuteRequest, ExecuteResponse, ExecutionRequest, ExecutionResult, Verdict};
use crate::verdict;

/// Entry point for the submission layer
///
/// Cheap to clone; clones share the registry and the sandbox pool.
#[derive(Debug)]
pub struct Executor<P: Provisioner = BoxPool> {
    registry: Arc<LanguageRegistry>,
    provisioner: Arc<P>,
    engine: Arc<EngineConfig>,
}

impl<P: Provisioner> Clone for Executor<P> {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
            provisioner: Arc::clone(&self.provisioner),
            engine: Arc::clone(&self.engine),
        }
    }
}

impl Executor<BoxPool> {
    /// Build the isolate-backed executor and recover from any previous crash
    pub async fn start(mut config: Config) -> Self {
        if config.cgroup {
            match prepare_cgroup(&config.cg_root) {
                Ok(true) => info!("cgroup hierarchy ready"),
                Ok(false) => {
                    warn!("cgroup memory controller unavailable, falling back to RLIMIT_AS");
                    config.cgroup = false;
                }
                Err(e) => {
                    warn!(error = %e, "cgroup setup failed, falling back to RLIMIT_AS");
                    config.cgroup = false;
                }
            }
        }

        let pool = BoxPool::from_config(&config);
        reaper::sweep(&pool).await;

        let registry = LanguageRegistry::from_config(&config);
        info!(
            languages = registry.len(),
            sandboxes = pool.capacity(),
            "executor started"
        );

        Self::new(registry, pool, config.engine)
    }
}

impl<P: Provisioner> Executor<P> {
    pub fn new(registry: LanguageRegistry, provisioner: P, engine: EngineConfig) -> Self {
        Self {
            registry: Arc::new(registry),
            provisioner: Arc::new(provisioner),
            engine: Arc::new(engine),
        }
    }

    pub fn registry(&self) -> &LanguageRegistry {
        &self.registry
    }

    pub fn provisioner(&self) -> &P {
        &self.provisioner
    }

    /// The boundary call: strings in, verdict and strings out
    pub async fn execute(&self, request: ExecuteRequest) -> Result<ExecuteResponse, ExecuteError> {
        let (result, verdict) = self.run(request.into()).await?;
        Ok(ExecuteResponse::new(&result, verdict))
    }

    /// Like [`execute`](Self::execute), keeping the raw captured bytes.
    ///
    /// The work runs on its own task. Dropping the returned future does not
    /// cancel it, so the sandbox is always released.
    #[instrument(skip_all, fields(language = %request.language_id))]
    pub async fn run(
        &self,
        request: ExecutionRequest,
    ) -> Result<(ExecutionResult, Verdict), ExecuteError> {
        self.check_size(&request)?;
        let spec = self.registry.resolve(&request.language_id)?;

        let this = self.clone();
        let task = tokio::spawn(async move { this.run_in_sandbox(request, spec).await });

        match task.await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(error = %e, "execution task failed");
                Err(ExecuteError::internal(e))
            }
        }
    }

    fn check_size(&self, request: &ExecutionRequest) -> Result<(), ExecuteError> {
        if request.source_code.len() > self.engine.max_source_bytes {
            return Err(ExecuteError::InvalidRequest(format!(
                "source code exceeds {} bytes",
                self.engine.max_source_bytes
            )));
        }
        if let Some(ref stdin) = request.stdin
            && stdin.len() > self.engine.max_stdin_bytes
        {
            return Err(ExecuteError::InvalidRequest(format!(
                "stdin exceeds {} bytes",
                self.engine.max_stdin_bytes
            )));
        }
        Ok(())
    }

    async fn run_in_sandbox(
        &self,
        request: ExecutionRequest,
        spec: Arc<RunnerSpec>,
    ) -> Result<(ExecutionResult, Verdict), ExecuteError> {
        let mut sandbox = self.provisioner.acquire(&spec).await.inspect_err(|e| {
            warn!(error = %e, "failed to provision sandbox");
        })?;

        let outcome = execute::execute(&sandbox, &request, &spec, &self.engine).await;

        self.provisioner.release(&mut sandbox).await;
        drop(sandbox);

        let result = outcome.map_err(|e| {
            error!(error = %e, "execution failed inside sandbox");
            ExecuteError::internal(e)
        })?;

        let verdict = verdict::evaluate(&result, request.expected_output.as_deref());
        info!(
            %verdict,
            exit_code = result.exit_code,
            duration_ms = u64::try_from(result.duration.as_millis()).unwrap_or(u64::MAX),
            "submission evaluated"
        );

        Ok((result, verdict))
    }
}
