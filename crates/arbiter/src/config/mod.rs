use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use crate::config::language::{
    BINARY_PLACEHOLDER, CommandTemplate, CompileConfig, DEFAULT_SANDBOX_PATH, FileExtension,
    LanguageConfig, RunConfig, SOURCE_PLACEHOLDER,
};
use crate::types::{MountConfig, ResourceLimits};

pub mod language;
mod loader;

/// Example configuration embedded at compile time.
///
/// Used as the default configuration and by `arbiter init`.
pub const EXAMPLE_CONFIG: &str = include_str!("../../arbiter.example.toml");

/// Prefix for environment overrides, e.g. `ARBITER__POOL__MAX_SANDBOXES=16`
pub const ENV_PREFIX: &str = "ARBITER";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid characters in file extension")]
    InvalidFileExtChars,

    #[error("failed to parse config: {0}")]
    Parse(#[from] config::ConfigError),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Path to the isolate binary (looked up on PATH when unset)
    #[serde(default)]
    pub isolate_path: Option<PathBuf>,

    /// Use cgroup memory limiting (`--cg`, `--cg-mem`) instead of RLIMIT_AS.
    ///
    /// Interpreters and JIT runtimes that reserve large virtual mappings need
    /// this; RLIMIT_AS would kill them at startup.
    #[serde(default)]
    pub cgroup: bool,

    /// Cgroup root used by isolate; must match isolate's own `cg_root`.
    #[serde(default = "default_cg_root")]
    pub cg_root: PathBuf,

    #[serde(default)]
    pub pool: PoolConfig,

    #[serde(default)]
    pub engine: EngineConfig,

    /// Read-only mounts applied to every step of every language
    #[serde(default)]
    pub sandbox_mounts: Vec<MountConfig>,

    /// Base limits for run steps
    #[serde(default)]
    pub default_limits: ResourceLimits,

    /// Base limits for compile steps
    #[serde(default = "default_compile_limits")]
    pub compile_limits: ResourceLimits,

    /// Languages keyed by the identifier callers submit (e.g. "python")
    #[serde(default)]
    pub languages: HashMap<String, LanguageConfig>,
}

/// Sandbox pool sizing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    /// First isolate box id owned by this process
    #[serde(default)]
    pub first_box_id: u32,

    /// Upper bound on simultaneously live sandboxes
    #[serde(default = "default_max_sandboxes")]
    pub max_sandboxes: u32,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            first_box_id: 0,
            max_sandboxes: default_max_sandboxes(),
        }
    }
}

/// Engine-side guards that do not depend on the isolation layer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Seconds the engine waits past a step's own limits before killing it
    #[serde(default = "default_timeout_grace")]
    pub timeout_grace: f64,

    #[serde(default = "default_max_source_bytes")]
    pub max_source_bytes: usize,

    #[serde(default = "default_max_stdin_bytes")]
    pub max_stdin_bytes: usize,

    /// Captured stdout and stderr are each truncated to this size
    #[serde(default = "default_max_output_bytes")]
    pub max_output_bytes: usize,
}

impl EngineConfig {
    pub fn timeout_grace(&self) -> Duration {
        Duration::try_from_secs_f64(self.timeout_grace.max(0.0)).unwrap_or(Duration::ZERO)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            timeout_grace: default_timeout_grace(),
            max_source_bytes: default_max_source_bytes(),
            max_stdin_bytes: default_max_stdin_bytes(),
            max_output_bytes: default_max_output_bytes(),
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    /// A config with no languages
    pub fn empty() -> Self {
        Self {
            isolate_path: None,
            cgroup: false,
            cg_root: default_cg_root(),
            pool: PoolConfig::default(),
            engine: EngineConfig::default(),
            sandbox_mounts: Vec::new(),
            default_limits: ResourceLimits::default(),
            compile_limits: default_compile_limits(),
            languages: HashMap::new(),
        }
    }

    pub fn isolate_binary(&self) -> PathBuf {
        self.isolate_path
            .clone()
            .unwrap_or_else(|| PathBuf::from("isolate"))
    }

    /// Effective run limits for a language
    pub fn run_limits_for(&self, language: &LanguageConfig) -> ResourceLimits {
        match language.run.limits {
            Some(ref limits) => self.default_limits.with_overrides(limits),
            None => self.default_limits.clone(),
        }
    }

    /// Effective compile limits for a language
    pub fn compile_limits_for(&self, compile: &CompileConfig) -> ResourceLimits {
        match compile.limits {
            Some(ref limits) => self.compile_limits.with_overrides(limits),
            None => self.compile_limits.clone(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::parse_toml(EXAMPLE_CONFIG).expect("embedded default config should be valid")
    }
}

fn default_cg_root() -> PathBuf {
    PathBuf::from("/sys/fs/cgroup/isolate")
}

fn default_max_sandboxes() -> u32 {
    4
}

fn default_timeout_grace() -> f64 {
    1.0
}

fn default_max_source_bytes() -> usize {
    256 * 1024
}

fn default_max_stdin_bytes() -> usize {
    1024 * 1024
}

fn default_max_output_bytes() -> usize {
    1024 * 1024
}

fn default_compile_limits() -> ResourceLimits {
    ResourceLimits {
        cpu_time: Some(10.0),
        wall_time: Some(20.0),
        memory: Some(512 * ResourceLimits::MB),
        processes: Some(16),
        ..ResourceLimits::default()
    }
}
