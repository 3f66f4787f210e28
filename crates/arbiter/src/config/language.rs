use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, de};

use crate::config::ConfigError;
use crate::types::{MountConfig, ResourceLimits};

const INVALID_FILE_EXT_CHARS: [char; 2] = ['/', '.'];

/// Placeholder for the source file name in a command template
pub const SOURCE_PLACEHOLDER: &str = "{source}";

/// Placeholder for the compiled binary name in a command template
pub const BINARY_PLACEHOLDER: &str = "{binary}";

/// Default PATH inside the sandbox
pub const DEFAULT_SANDBOX_PATH: &str = "/usr/local/bin:/usr/bin:/bin";

/// One `[languages.<id>]` table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LanguageConfig {
    /// Human-readable name (e.g. "C++ 17 (GCC)")
    pub name: String,

    pub extension: FileExtension,

    /// Allow network access from inside the sandbox. Off unless set.
    #[serde(default)]
    pub network: bool,

    /// Compile step; absent for interpreted languages
    #[serde(default)]
    pub compile: Option<CompileConfig>,

    pub run: RunConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompileConfig {
    pub command: CommandTemplate,

    #[serde(default)]
    pub env: HashMap<String, String>,

    /// Layered over the global `compile_limits`
    #[serde(default)]
    pub limits: Option<ResourceLimits>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    pub command: CommandTemplate,

    #[serde(default)]
    pub env: HashMap<String, String>,

    /// Extra read-only mounts for this language's runtime
    #[serde(default)]
    pub mounts: Vec<MountConfig>,

    #[serde(default = "default_sandbox_path")]
    pub path: String,

    /// Layered over the global `default_limits`
    #[serde(default)]
    pub limits: Option<ResourceLimits>,
}

fn default_sandbox_path() -> String {
    DEFAULT_SANDBOX_PATH.to_owned()
}

/// File extension without the dot (e.g. "cpp")
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileExtension(String);

impl FileExtension {
    pub fn new(extension: &str) -> Result<Self, ConfigError> {
        if extension
            .chars()
            .any(|c| INVALID_FILE_EXT_CHARS.contains(&c))
        {
            return Err(ConfigError::InvalidFileExtChars);
        }
        Ok(Self(extension.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<'de> Deserialize<'de> for FileExtension {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        FileExtension::new(&s).map_err(|_| {
            de::Error::invalid_value(
                de::Unexpected::Str(&s),
                &"a file extension without '/' or '.' characters",
            )
        })
    }
}

impl fmt::Display for FileExtension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A command line with `{source}` / `{binary}` placeholders
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommandTemplate(Vec<String>);

impl CommandTemplate {
    pub fn new(args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self(args.into_iter().map(Into::into).collect())
    }

    pub fn args(&self) -> &[String] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether any argument mentions `placeholder`
    pub fn references(&self, placeholder: &str) -> bool {
        self.0.iter().any(|arg| arg.contains(placeholder))
    }

    /// Substitute placeholders, producing a concrete argv
    pub fn expand(&self, source: &str, binary: &str) -> Vec<String> {
        self.0
            .iter()
            .map(|arg| {
                arg.replace(SOURCE_PLACEHOLDER, source)
                    .replace(BINARY_PLACEHOLDER, binary)
            })
            .collect()
    }
}
