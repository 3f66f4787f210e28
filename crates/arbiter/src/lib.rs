//! Sandboxed execution core for untrusted code submissions.
//!
//! Arbiter takes a `(language, source_code)` submission, runs it inside an
//! IOI Isolate box under CPU, memory, process and time limits, and returns a
//! [`Verdict`] with the captured output.
//!
//! # Features
//!
//! - **Language registry**: compile and run commands per language, in TOML.
//! - **Sandbox pool**: a fixed set of isolate boxes with queueing when all are busy.
//! - **Engine-side deadlines**: runaway steps are killed even if isolate is not.
//! - **Guaranteed teardown**: every box is cleaned up exactly once, including
//!   when the caller goes away mid-request.
//! - **Exact-match evaluation**: stdout is compared to the expected output after
//!   trimming surrounding whitespace.
//!
//! ```rust,ignore
//! let executor = Executor::start(Config::load(None)?).await;
//! let response = executor
//!     .execute(ExecuteRequest {
//!         language: "python".into(),
//!         source_code: "print('hi')".into(),
//!         stdin: None,
//!         expected_output: Some("hi".into()),
//!     })
//!     .await?;
//! assert_eq!(response.verdict, Verdict::Correct);
//! ```

pub use crate::config::{Config, ConfigError, ENV_PREFIX, EXAMPLE_CONFIG, LanguageConfig};
pub use error::{ErrorKind, ExecuteError};
pub use isolate::{BoxPool, IsolateBox, prepare_cgroup};
pub use reaper::{TeardownLedger, sweep};
pub use registry::{LanguageRegistry, RunnerSpec, UnsupportedLanguage};
pub use runner::Executor;
pub use sandbox::{ProvisionError, Provisioner, Sandbox, SandboxError, Step, StepOutcome};
pub use types::{
    ExecuteRequest, ExecuteResponse, ExecutionRequest, ExecutionResult, LimitExceeded,
    MountConfig, ResourceLimits, Stage, Verdict,
};
pub use verdict::evaluate;

pub mod config;
pub mod error;
pub mod isolate;
pub mod reaper;
pub mod registry;
pub mod runner;
pub mod sandbox;
pub mod types;
pub mod verdict;
