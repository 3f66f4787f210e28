//! Sandbox abstraction
//!
//! The engine only talks to these traits. [`crate::isolate`] provides the
//! production implementation; tests substitute an in-memory one.

use std::collections::BTreeMap;
use std::future::Future;
use std::path::Path;

use thiserror::Error;

use crate::registry::RunnerSpec;
use crate::types::{LimitExceeded, MountConfig, ResourceLimits};

/// Errors from provisioning a sandbox
#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("sandbox pool is closed")]
    PoolClosed,

    #[error("no free sandbox id in pool")]
    PoolExhausted,

    #[error("failed to initialize box {id}: {message}")]
    InitFailed { id: u32, message: String },

    #[error("failed to spawn isolate: {0}")]
    Spawn(#[source] std::io::Error),
}

/// Errors from using a live sandbox
#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("isolate command failed: {0}")]
    CommandFailed(String),

    #[error("failed to spawn isolate process: {0}")]
    SpawnFailed(#[source] std::io::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("mount source path does not exist: {0}")]
    MountSourceNotFound(String),

    /// The isolation layer itself failed, as opposed to the program inside it
    #[error("sandbox internal error: {0}")]
    Internal(String),

    #[error("sandbox has already been released")]
    Released,
}

/// One command to run inside a sandbox
#[derive(Debug, Clone)]
pub struct Step<'a> {
    /// Distinguishes the captured files of each step ("compile", "run")
    pub label: &'static str,
    pub argv: Vec<String>,
    pub env: &'a BTreeMap<String, String>,
    pub mounts: &'a [MountConfig],
    pub limits: &'a ResourceLimits,
    pub stdin: Option<&'a [u8]>,
    pub network: bool,
    /// Captured stdout and stderr are each truncated to this many bytes
    pub output_limit: usize,
}

/// What a step left behind
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StepOutcome {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub exit_code: Option<i32>,
    pub signal: Option<i32>,
    pub timed_out: bool,
    pub limit_exceeded: LimitExceeded,
    /// Status message from the isolation layer, if any
    pub message: Option<String>,
}

impl StepOutcome {
    /// Outcome of a step the engine had to kill
    pub fn killed(stdout: Vec<u8>, stderr: Vec<u8>) -> Self {
        Self {
            stdout,
            stderr,
            timed_out: true,
            limit_exceeded: LimitExceeded::WallTime,
            ..Self::default()
        }
    }

    /// Exit code, `128 + signal` for a signal death, `-1` when unknown
    pub fn exit_status(&self) -> i32 {
        match (self.exit_code, self.signal) {
            (_, Some(signal)) => 128 + signal,
            (Some(code), None) => code,
            (None, None) => -1,
        }
    }

    pub fn succeeded(&self) -> bool {
        !self.timed_out && self.signal.is_none() && self.exit_code == Some(0)
    }
}

/// A live isolated environment, exclusively owned by one request
pub trait Sandbox: Send + Sync + 'static {
    fn id(&self) -> u32;

    /// Host path of the working directory
    fn workdir(&self) -> &Path;

    fn is_alive(&self) -> bool;

    fn write_file(
        &self,
        name: &str,
        content: &[u8],
    ) -> impl Future<Output = Result<(), SandboxError>> + Send;

    fn run(&self, step: Step<'_>) -> impl Future<Output = Result<StepOutcome, SandboxError>> + Send;

    /// Whatever stdout and stderr a step with `label` has written so far
    fn captured_output(
        &self,
        label: &str,
        limit: usize,
    ) -> impl Future<Output = (Vec<u8>, Vec<u8>)> + Send;
}

/// Creates and tears down sandboxes
pub trait Provisioner: Send + Sync + 'static {
    type Sandbox: Sandbox;

    /// Wait for capacity, then create a fresh, empty sandbox
    fn acquire(
        &self,
        spec: &RunnerSpec,
    ) -> impl Future<Output = Result<Self::Sandbox, ProvisionError>> + Send;

    /// Kill everything in the sandbox and delete its working directory.
    ///
    /// Idempotent. Failures are logged, never returned.
    fn release(&self, sandbox: &mut Self::Sandbox) -> impl Future<Output = ()> + Send;
}
