//! Errors surfaced to callers of the execution core
//!
//! User-code failures are verdicts, not errors. What remains is a short list
//! of kinds, none of which carries host detail in its display text.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::registry::UnsupportedLanguage;
use crate::sandbox::ProvisionError;
use crate::types::{ExecuteResponse, Verdict};

#[derive(Debug, Error)]
pub enum ExecuteError {
    /// Rejected before a sandbox was created, e.g. oversized source
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    UnsupportedLanguage(#[from] UnsupportedLanguage),

    /// No sandbox could be created; worth retrying with backoff
    #[error("sandbox unavailable")]
    Provision(#[from] ProvisionError),

    /// Engine fault. The detail is for logs only.
    #[error("internal error")]
    Internal(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidRequest,
    UnsupportedLanguage,
    ProvisionError,
    InternalError,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::InvalidRequest => "invalid_request",
            ErrorKind::UnsupportedLanguage => "unsupported_language",
            ErrorKind::ProvisionError => "provision_error",
            ErrorKind::InternalError => "internal_error",
        };
        f.write_str(name)
    }
}

impl ExecuteError {
    pub(crate) fn internal(detail: impl fmt::Display) -> Self {
        ExecuteError::Internal(detail.to_string())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ExecuteError::InvalidRequest(_) => ErrorKind::InvalidRequest,
            ExecuteError::UnsupportedLanguage(_) => ErrorKind::UnsupportedLanguage,
            ExecuteError::Provision(_) => ErrorKind::ProvisionError,
            ExecuteError::Internal(_) => ErrorKind::InternalError,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, ExecuteError::Provision(_))
    }

    /// Whether the caller sent something it should not have
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            ExecuteError::InvalidRequest(_) | ExecuteError::UnsupportedLanguage(_)
        )
    }

    /// Turn a server-side fault into a storable [`Verdict::InternalError`]
    /// response. Client errors are handed back unchanged.
    pub fn into_response(self) -> Result<ExecuteResponse, Self> {
        if self.is_client_error() {
            return Err(self);
        }
        Ok(ExecuteResponse {
            verdict: Verdict::InternalError,
            stdout: String::new(),
            stderr: self.to_string(),
            duration_ms: 0,
        })
    }
}
