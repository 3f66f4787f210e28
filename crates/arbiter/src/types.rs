use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Resource limits applied to a single sandboxed step (compile or run)
///
/// Every field is optional so that partial tables in configuration only
/// override what they name; see [`with_overrides`](Self::with_overrides).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceLimits {
    /// CPU time limit in seconds
    #[serde(default)]
    pub cpu_time: Option<f64>,

    /// Wall clock limit in seconds
    #[serde(default)]
    pub wall_time: Option<f64>,

    /// Memory limit in kilobytes
    #[serde(default)]
    pub memory: Option<u64>,

    /// Stack size limit in kilobytes
    #[serde(default)]
    pub stack: Option<u64>,

    /// Maximum number of processes and threads
    #[serde(default)]
    pub processes: Option<u32>,

    /// Largest file the step may write, in kilobytes
    #[serde(default)]
    pub file_size: Option<u64>,

    /// Maximum open file descriptors
    #[serde(default)]
    pub open_files: Option<u32>,

    /// Grace period before a process over its time limit is killed, in seconds
    #[serde(default)]
    pub extra_time: Option<f64>,
}

impl ResourceLimits {
    /// 1 megabyte in kilobytes
    pub const MB: u64 = 1024;

    /// Limits with every field unset
    pub fn unbounded() -> Self {
        Self {
            cpu_time: None,
            wall_time: None,
            memory: None,
            stack: None,
            processes: None,
            file_size: None,
            open_files: None,
            extra_time: None,
        }
    }

    pub fn with_cpu_time(mut self, seconds: f64) -> Self {
        self.cpu_time = Some(seconds);
        self
    }

    pub fn with_wall_time(mut self, seconds: f64) -> Self {
        self.wall_time = Some(seconds);
        self
    }

    pub fn with_memory(mut self, kb: u64) -> Self {
        self.memory = Some(kb);
        self
    }

    pub fn with_processes(mut self, count: u32) -> Self {
        self.processes = Some(count);
        self
    }

    /// Layer `overrides` on top of `self`; set fields in `overrides` win.
    pub fn with_overrides(&self, overrides: &ResourceLimits) -> ResourceLimits {
        ResourceLimits {
            cpu_time: overrides.cpu_time.or(self.cpu_time),
            wall_time: overrides.wall_time.or(self.wall_time),
            memory: overrides.memory.or(self.memory),
            stack: overrides.stack.or(self.stack),
            processes: overrides.processes.or(self.processes),
            file_size: overrides.file_size.or(self.file_size),
            open_files: overrides.open_files.or(self.open_files),
            extra_time: overrides.extra_time.or(self.extra_time),
        }
    }

    /// Wall clock limit as a [`Duration`]; `None` when unset or not
    /// representable
    pub fn wall_timeout(&self) -> Option<Duration> {
        self.wall_time
            .and_then(|seconds| Duration::try_from_secs_f64(seconds).ok())
    }

    /// The engine's own deadline for a step: wall limit plus isolate's extra
    /// time plus `grace`. `None` when no wall limit is configured.
    ///
    /// A sum too large for a [`Duration`] saturates rather than panicking.
    pub fn deadline(&self, grace: Duration) -> Option<Duration> {
        let wall = self.wall_time?;
        let extra = self.extra_time.unwrap_or(0.0).max(0.0);
        let base = Duration::try_from_secs_f64(wall.max(0.0) + extra).unwrap_or(Duration::MAX);
        Some(base.saturating_add(grace))
    }
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            cpu_time: Some(2.0),
            wall_time: Some(5.0),
            memory: Some(256 * Self::MB),
            stack: Some(64 * Self::MB),
            processes: Some(1),
            file_size: Some(16 * Self::MB),
            open_files: Some(64),
            extra_time: Some(0.5),
        }
    }
}

/// A directory bound into the sandbox
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountConfig {
    /// Path on the host
    pub source: String,

    /// Path inside the sandbox
    pub target: String,

    /// Mount read-write (toolchain mounts should stay read-only)
    #[serde(default)]
    pub writable: bool,

    /// Skip the mount when the host path does not exist
    #[serde(default)]
    pub optional: bool,
}

/// Which step produced an [`ExecutionResult`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Compilation failed; the program never ran
    Compile,
    /// The program ran (after a successful compile, if any)
    Run,
}

/// Which limit, if any, the sandbox reported as exceeded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LimitExceeded {
    #[default]
    None,
    CpuTime,
    WallTime,
    Memory,
    Output,
}

impl LimitExceeded {
    /// Infer the exceeded limit from a sandbox status message
    pub fn from_message(message: Option<&str>) -> Self {
        let Some(message) = message else {
            return LimitExceeded::None;
        };
        let message = message.to_lowercase();

        if message.contains("time limit") {
            if message.contains("wall") {
                LimitExceeded::WallTime
            } else {
                LimitExceeded::CpuTime
            }
        } else if message.contains("memory") {
            LimitExceeded::Memory
        } else if message.contains("output") || message.contains("file size") {
            LimitExceeded::Output
        } else {
            LimitExceeded::None
        }
    }

    #[must_use]
    pub fn is_exceeded(&self) -> bool {
        !matches!(self, LimitExceeded::None)
    }
}

/// One submission as the engine sees it
#[derive(Debug, Clone)]
pub struct ExecutionRequest {
    pub language_id: String,
    pub source_code: Vec<u8>,
    pub expected_output: Option<String>,
    pub stdin: Option<Vec<u8>>,
}

impl From<ExecuteRequest> for ExecutionRequest {
    fn from(request: ExecuteRequest) -> Self {
        Self {
            language_id: request.language,
            source_code: request.source_code.into_bytes(),
            expected_output: request.expected_output,
            stdin: request.stdin.map(String::into_bytes),
        }
    }
}

/// Captured outcome of running a submission
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionResult {
    /// The last step that ran. `Stage::Compile` means compilation failed.
    pub stage: Stage,

    pub stdout: Vec<u8>,

    pub stderr: Vec<u8>,

    /// Exit code, `128 + signal` when killed by a signal, `-1` when unknown
    pub exit_code: i32,

    /// Signal that terminated the program, if any
    pub signal: Option<i32>,

    /// The run step hit its wall clock or CPU deadline
    pub timed_out: bool,

    pub limit_exceeded: LimitExceeded,

    /// Wall clock time of all steps, as measured by the engine
    pub duration: Duration,
}

impl ExecutionResult {
    #[must_use]
    pub fn compile_failed(&self) -> bool {
        self.stage == Stage::Compile
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.stage == Stage::Run && !self.timed_out && self.exit_code == 0
    }
}

impl Default for ExecutionResult {
    fn default() -> Self {
        Self {
            stage: Stage::Run,
            stdout: Vec::new(),
            stderr: Vec::new(),
            exit_code: 0,
            signal: None,
            timed_out: false,
            limit_exceeded: LimitExceeded::None,
            duration: Duration::ZERO,
        }
    }
}

/// Final classification of a submission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Verdict {
    Correct,
    Incorrect,
    RuntimeError,
    CompileError,
    Timeout,
    InternalError,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Verdict::Correct => "Correct",
            Verdict::Incorrect => "Incorrect",
            Verdict::RuntimeError => "RuntimeError",
            Verdict::CompileError => "CompileError",
            Verdict::Timeout => "Timeout",
            Verdict::InternalError => "InternalError",
        };
        f.write_str(name)
    }
}

/// Boundary input from the submission layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecuteRequest {
    pub language: String,
    pub source_code: String,
    #[serde(default)]
    pub stdin: Option<String>,
    #[serde(default)]
    pub expected_output: Option<String>,
}

/// Boundary output to the submission layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecuteResponse {
    pub verdict: Verdict,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
}

impl ExecuteResponse {
    pub fn new(result: &ExecutionResult, verdict: Verdict) -> Self {
        Self {
            verdict,
            stdout: String::from_utf8_lossy(&result.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&result.stderr).into_owned(),
            duration_ms: u64::try_from(result.duration.as_millis()).unwrap_or(u64::MAX),
        }
    }
}
