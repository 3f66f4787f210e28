//! Meta file parsing for isolate
//!
//! Isolate writes one `key:value` pair per line after each `--run`.

use std::collections::HashMap;
use std::path::Path;

use thiserror::Error;

use crate::sandbox::SandboxError;
use crate::types::LimitExceeded;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("meta file parse error at line {line_number}: {message} (line: {line:?})")]
pub struct MetaParseError {
    /// 1-indexed
    pub line_number: usize,
    pub line: String,
    pub message: String,
}

/// The `status` key; absent means the program exited normally with code 0
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetaStatus {
    Ok,
    /// RE: non-zero exit code
    RuntimeError,
    /// TO: CPU or wall time limit
    TimedOut,
    /// SG: killed by a signal
    Signaled,
    /// XX: isolate itself failed
    InternalError,
}

impl MetaStatus {
    pub fn from_code(code: &str) -> Self {
        match code {
            "RE" => MetaStatus::RuntimeError,
            "TO" => MetaStatus::TimedOut,
            "SG" => MetaStatus::Signaled,
            "XX" => MetaStatus::InternalError,
            _ => MetaStatus::Ok,
        }
    }
}

/// Parsed meta file
#[derive(Debug, Clone, Default)]
pub struct MetaFile {
    pub entries: HashMap<String, String>,
}

impl MetaFile {
    /// Parse meta file content, rejecting malformed lines
    pub fn parse(content: &str) -> Result<Self, MetaParseError> {
        let mut entries = HashMap::new();

        for (line_idx, line) in content.lines().enumerate() {
            let line_number = line_idx + 1;
            let trimmed = line.trim();

            if trimmed.is_empty() {
                continue;
            }

            // The value is everything after the first colon; messages may contain more
            let Some((key, value)) = trimmed.split_once(':') else {
                return Err(MetaParseError {
                    line_number,
                    line: line.to_string(),
                    message: "missing colon separator".to_string(),
                });
            };

            let key = key.trim();
            if key.is_empty() {
                return Err(MetaParseError {
                    line_number,
                    line: line.to_string(),
                    message: "empty key before colon".to_string(),
                });
            }

            entries.insert(key.to_string(), value.trim().to_string());
        }

        Ok(Self { entries })
    }

    pub async fn load(path: impl AsRef<Path>) -> Result<Self, SandboxError> {
        let content = tokio::fs::read_to_string(path.as_ref()).await?;
        Self::parse(&content).map_err(|e| SandboxError::Internal(e.to_string()))
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    fn get_parsed<T: std::str::FromStr>(&self, key: &str) -> Option<T> {
        self.get(key).and_then(|v| v.parse().ok())
    }

    pub fn status(&self) -> MetaStatus {
        self.get("status")
            .map(MetaStatus::from_code)
            .unwrap_or(MetaStatus::Ok)
    }

    /// CPU time used in seconds
    pub fn time(&self) -> f64 {
        self.get_parsed("time").unwrap_or(0.0)
    }

    /// Wall clock time used in seconds
    pub fn wall_time(&self) -> f64 {
        self.get_parsed("time-wall").unwrap_or(0.0)
    }

    /// Peak memory in kilobytes, preferring the cgroup figure
    pub fn memory(&self) -> u64 {
        self.get_parsed("cg-mem")
            .or_else(|| self.get_parsed("max-rss"))
            .unwrap_or(0)
    }

    pub fn exit_code(&self) -> Option<i32> {
        self.get_parsed("exitcode")
    }

    pub fn signal(&self) -> Option<i32> {
        self.get_parsed("exitsig")
    }

    pub fn message(&self) -> Option<&str> {
        self.get("message")
    }

    pub fn killed(&self) -> bool {
        self.get("killed").is_some()
    }

    pub fn limit_exceeded(&self) -> LimitExceeded {
        let from_message = LimitExceeded::from_message(self.message());
        if from_message.is_exceeded() {
            return from_message;
        }

        if self.status() == MetaStatus::TimedOut {
            return LimitExceeded::CpuTime;
        }

        LimitExceeded::None
    }
}
