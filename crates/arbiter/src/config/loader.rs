//! Configuration loading
//!
//! Sources are layered with the config crate: a TOML file (or the embedded
//! example) first, then `ARBITER__*` environment variables.

use std::path::Path;

use config::{Config as ConfigBuilder, Environment, File, FileFormat};

use crate::config::{
    BINARY_PLACEHOLDER, Config, ConfigError, ENV_PREFIX, EXAMPLE_CONFIG, SOURCE_PLACEHOLDER,
};
use crate::types::ResourceLimits;

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let config = ConfigBuilder::builder()
            .add_source(File::from(path.as_ref()))
            .build()?;

        Self::finish(config)
    }

    /// Parse configuration from a TOML string
    pub fn parse_toml(content: &str) -> Result<Self, ConfigError> {
        let config = ConfigBuilder::builder()
            .add_source(File::from_str(content, FileFormat::Toml))
            .build()?;

        Self::finish(config)
    }

    /// Load from `path` (or the embedded example), then apply environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let builder = match path {
            Some(path) => ConfigBuilder::builder().add_source(File::from(path)),
            None => ConfigBuilder::builder()
                .add_source(File::from_str(EXAMPLE_CONFIG, FileFormat::Toml)),
        };
        let config = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Self::finish(config)
    }

    fn finish(config: ConfigBuilder) -> Result<Self, ConfigError> {
        let config: Config = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.pool.max_sandboxes == 0 {
            return Err(ConfigError::Invalid(
                "pool.max_sandboxes must be at least 1".to_owned(),
            ));
        }
        if self
            .pool
            .first_box_id
            .checked_add(self.pool.max_sandboxes)
            .is_none()
        {
            return Err(ConfigError::Invalid("pool box ids overflow".to_owned()));
        }
        if self.engine.max_output_bytes == 0 {
            return Err(ConfigError::Invalid(
                "engine.max_output_bytes must be greater than zero".to_owned(),
            ));
        }
        if self.default_limits.wall_time.is_none() || self.compile_limits.wall_time.is_none() {
            return Err(ConfigError::Invalid(
                "default_limits and compile_limits need a wall_time".to_owned(),
            ));
        }
        let grace = self.engine.timeout_grace;
        if !(grace.is_finite() && grace >= 0.0) {
            return Err(ConfigError::Invalid(format!(
                "engine.timeout_grace must be a non-negative number of seconds, got {grace}"
            )));
        }
        check_limits("default_limits", &self.default_limits)?;
        check_limits("compile_limits", &self.compile_limits)?;

        for (id, lang) in &self.languages {
            if lang.name.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "language '{id}' has empty name"
                )));
            }
            if lang.extension.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "language '{id}' has empty extension"
                )));
            }
            if lang.run.command.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "language '{id}' has empty run command"
                )));
            }
            if !lang.run.command.references(SOURCE_PLACEHOLDER)
                && !lang.run.command.references(BINARY_PLACEHOLDER)
            {
                return Err(ConfigError::Invalid(format!(
                    "language '{id}' run command references neither {SOURCE_PLACEHOLDER} nor {BINARY_PLACEHOLDER}"
                )));
            }
            if let Some(ref compile) = lang.compile
                && compile.command.is_empty()
            {
                return Err(ConfigError::Invalid(format!(
                    "language '{id}' has empty compile command"
                )));
            }
            if let Some(ref limits) = lang.run.limits {
                check_limits(&format!("languages.{id}.run.limits"), limits)?;
            }
            if let Some(ref compile) = lang.compile
                && let Some(ref limits) = compile.limits
            {
                check_limits(&format!("languages.{id}.compile.limits"), limits)?;
            }
        }

        Ok(())
    }
}

/// Time limits must be positive and finite; extra time may be zero
fn check_limits(scope: &str, limits: &ResourceLimits) -> Result<(), ConfigError> {
    for (name, value) in [("cpu_time", limits.cpu_time), ("wall_time", limits.wall_time)] {
        if let Some(seconds) = value
            && !(seconds.is_finite() && seconds > 0.0)
        {
            return Err(ConfigError::Invalid(format!(
                "{scope}.{name} must be a positive number of seconds, got {seconds}"
            )));
        }
    }
    if let Some(seconds) = limits.extra_time
        && !(seconds.is_finite() && seconds >= 0.0)
    {
        return Err(ConfigError::Invalid(format!(
            "{scope}.extra_time must be a non-negative number of seconds, got {seconds}"
        )));
    }
    Ok(())
}
