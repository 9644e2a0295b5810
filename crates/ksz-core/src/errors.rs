//! Structured error types shared across the forecast crates.

use std::collections::BTreeMap;
use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Structured payload attached to every [`KszError`] variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Stable machine readable error code.
    pub code: String,
    /// Human readable diagnostic message.
    pub message: String,
    /// Contextual key value pairs (run ids, job ids, paths).
    #[serde(default)]
    pub context: BTreeMap<String, String>,
    /// Optional hint that may help the caller resolve the issue.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

impl ErrorInfo {
    /// Creates a new error payload with the provided code and message.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            context: BTreeMap::new(),
            hint: None,
        }
    }

    /// Adds a context entry to the payload.
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// Sets a human readable hint for remediation.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

/// Canonical error type for the forecast workspace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[serde(tag = "family", content = "detail")]
pub enum KszError {
    /// Lookup by id, fingerprint or cosmology found no run record.
    #[error("not found: {0}")]
    NotFound(ErrorInfo),
    /// The external solver ran for a cosmology but did not succeed.
    #[error("run failure: {0}")]
    RunFailure(ErrorInfo),
    /// A stencil point's evaluation output is absent from a completed phase.
    #[error("missing output: {0}")]
    MissingOutput(ErrorInfo),
    /// The run cache backing store is malformed.
    #[error("schema mismatch: {0}")]
    SchemaMismatch(ErrorInfo),
    /// Invalid stencil definitions, state transitions or result shapes.
    #[error("stencil error: {0}")]
    Stencil(ErrorInfo),
    /// Job queue and backend failures.
    #[error("queue error: {0}")]
    Queue(ErrorInfo),
    /// Invalid plan or configuration values.
    #[error("config error: {0}")]
    Config(ErrorInfo),
    /// Filesystem failures.
    #[error("io error: {0}")]
    Io(ErrorInfo),
    /// Serialization failures.
    #[error("serde error: {0}")]
    Serde(ErrorInfo),
}

impl Display for ErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.message, self.code)?;
        let context: Vec<String> = self
            .context
            .iter()
            .map(|(key, value)| format!("{key}={value}"))
            .collect();
        if !context.is_empty() {
            write!(f, " ({})", context.join(", "))?;
        }
        match &self.hint {
            Some(hint) => write!(f, "; hint: {hint}"),
            None => Ok(()),
        }
    }
}

impl KszError {
    /// Returns a reference to the payload describing the error.
    pub fn info(&self) -> &ErrorInfo {
        match self {
            KszError::NotFound(info)
            | KszError::RunFailure(info)
            | KszError::MissingOutput(info)
            | KszError::SchemaMismatch(info)
            | KszError::Stencil(info)
            | KszError::Queue(info)
            | KszError::Config(info)
            | KszError::Io(info)
            | KszError::Serde(info) => info,
        }
    }

    /// Wraps an I/O failure, tagging it with the offending path.
    pub fn io(code: &str, path: &std::path::Path, err: impl ToString) -> Self {
        KszError::Io(
            ErrorInfo::new(code, err.to_string()).with_context("path", path.display().to_string()),
        )
    }
}
