//! Language registry
//!
//! Built once from a validated [`Config`] and read-only afterwards. Each entry
//! is a [`RunnerSpec`] with every limit already merged, so the engine never
//! looks at configuration again.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

pub use crate::config::{CommandTemplate, FileExtension};
use crate::config::{Config, DEFAULT_SANDBOX_PATH, LanguageConfig};
use crate::types::{MountConfig, ResourceLimits};

/// Name of the compiled binary inside the sandbox
pub const BINARY_NAME: &str = "program";

/// Stem of the source file inside the sandbox
pub const SOURCE_STEM: &str = "source";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unsupported language '{0}'")]
pub struct UnsupportedLanguage(pub String);

/// How to compile one language
#[derive(Debug, Clone)]
pub struct CompileStep {
    pub command: CommandTemplate,
    pub env: BTreeMap<String, String>,
    pub limits: ResourceLimits,
}

/// Everything the engine needs to compile and run one language
#[derive(Debug, Clone)]
pub struct RunnerSpec {
    pub language_id: String,
    pub name: String,
    pub file_extension: FileExtension,
    pub compile: Option<CompileStep>,
    pub run: CommandTemplate,
    pub run_env: BTreeMap<String, String>,
    pub limits: ResourceLimits,
    /// Global mounts followed by the language's own
    pub mounts: Vec<MountConfig>,
    pub network_disabled: bool,
}

impl RunnerSpec {
    fn from_language(config: &Config, id: &str, language: &LanguageConfig) -> Self {
        let compile = language.compile.as_ref().map(|compile| {
            let mut env = BTreeMap::new();
            env.insert("PATH".to_owned(), DEFAULT_SANDBOX_PATH.to_owned());
            env.extend(compile.env.clone());
            CompileStep {
                command: compile.command.clone(),
                env,
                limits: config.compile_limits_for(compile),
            }
        });

        let mut run_env = BTreeMap::new();
        run_env.insert("PATH".to_owned(), language.run.path.clone());
        run_env.extend(language.run.env.clone());

        let mounts = config
            .sandbox_mounts
            .iter()
            .chain(&language.run.mounts)
            .cloned()
            .collect();

        Self {
            language_id: id.to_owned(),
            name: language.name.clone(),
            file_extension: language.extension.clone(),
            compile,
            run: language.run.command.clone(),
            run_env,
            limits: config.run_limits_for(language),
            mounts,
            network_disabled: !language.network,
        }
    }

    /// File the submission is written to, e.g. `source.cpp`
    pub fn source_name(&self) -> String {
        if self.file_extension.is_empty() {
            SOURCE_STEM.to_owned()
        } else {
            format!("{SOURCE_STEM}.{}", self.file_extension)
        }
    }

    pub fn binary_name(&self) -> &'static str {
        BINARY_NAME
    }

    pub fn is_compiled(&self) -> bool {
        self.compile.is_some()
    }

    pub fn compile_argv(&self) -> Option<Vec<String>> {
        self.compile
            .as_ref()
            .map(|compile| compile.command.expand(&self.source_name(), BINARY_NAME))
    }

    pub fn run_argv(&self) -> Vec<String> {
        self.run.expand(&self.source_name(), BINARY_NAME)
    }

    pub fn wall_timeout(&self) -> Option<Duration> {
        self.limits.wall_timeout()
    }

    /// CPU time limit in seconds
    pub fn cpu_limit(&self) -> Option<f64> {
        self.limits.cpu_time
    }

    /// Memory limit in kilobytes
    pub fn memory_limit(&self) -> Option<u64> {
        self.limits.memory
    }
}

/// Immutable map from language id to [`RunnerSpec`]
#[derive(Debug, Default)]
pub struct LanguageRegistry {
    specs: HashMap<String, Arc<RunnerSpec>>,
}

impl LanguageRegistry {
    pub fn from_config(config: &Config) -> Self {
        let specs = config
            .languages
            .iter()
            .map(|(id, language)| {
                let spec = RunnerSpec::from_language(config, id, language);
                (id.clone(), Arc::new(spec))
            })
            .collect();
        Self { specs }
    }

    pub fn resolve(&self, language_id: &str) -> Result<Arc<RunnerSpec>, UnsupportedLanguage> {
        self.specs
            .get(language_id)
            .cloned()
            .ok_or_else(|| UnsupportedLanguage(language_id.to_owned()))
    }

    /// Registered ids in sorted order
    pub fn ids(&self) -> Vec<&str> {
        let mut ids: Vec<_> = self.specs.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }
}
