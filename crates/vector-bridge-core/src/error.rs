//! Error taxonomy shared by every Vector Bridge component.
//!
//! Query-time failures surface to the caller as a single [`BridgeError`];
//! [`BridgeError::kind`] gives the machine-readable half of the
//! "kind + message" pair. Noisy passages are never errors: the pipeline
//! drops them silently.

use serde::Serialize;
use thiserror::Error;

/// Errors raised by reconciliation, embedding, adapters, training, and retrieval.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Missing credentials, unknown index, or a model/index pairing whose
    /// dimensions disagree. Fatal, never retried.
    #[error("configuration error: {0}")]
    Configuration(String),
    /// A remote inference call failed on both the primary and secondary endpoint.
    #[error("embedding provider failed: {0}")]
    TransientProvider(String),
    /// A zero-norm vector after reconciliation, or a mid-request dimension mismatch.
    #[error("degenerate input: {0}")]
    DegenerateInput(String),
    /// Adapter training collected fewer usable (text, vector) pairs than required.
    #[error(
        "only {found} usable (text, vector) pairs collected, at least {required} required; \
         raise adapter.scan_rounds / adapter.scan_top_k, or check that the index metadata \
         stores passage text under one of: {keys}"
    )]
    InsufficientTrainingData {
        found: usize,
        required: usize,
        keys: String,
    },
    /// The vector index collaborator rejected or failed a request.
    #[error("vector index error: {0}")]
    Index(String),
    /// Filesystem failures while reading or writing an adapter artifact.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Machine-readable error category, stable across message wording changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Configuration,
    TransientProvider,
    DegenerateInput,
    InsufficientTrainingData,
    Index,
    Io,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Configuration => "configuration",
            ErrorKind::TransientProvider => "transient_provider",
            ErrorKind::DegenerateInput => "degenerate_input",
            ErrorKind::InsufficientTrainingData => "insufficient_training_data",
            ErrorKind::Index => "index",
            ErrorKind::Io => "io",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl BridgeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            BridgeError::Configuration(_) => ErrorKind::Configuration,
            BridgeError::TransientProvider(_) => ErrorKind::TransientProvider,
            BridgeError::DegenerateInput(_) => ErrorKind::DegenerateInput,
            BridgeError::InsufficientTrainingData { .. } => ErrorKind::InsufficientTrainingData,
            BridgeError::Index(_) => ErrorKind::Index,
            BridgeError::Io(_) => ErrorKind::Io,
        }
    }

    /// Structured `{kind, message}` view for callers that serialize failures.
    pub fn to_failure(&self) -> Failure {
        Failure {
            kind: self.kind(),
            message: self.to_string(),
        }
    }
}

/// Serializable failure report handed to outer layers (CLI `--json`, HTTP views).
#[derive(Debug, Clone, Serialize)]
pub struct Failure {
    pub kind: ErrorKind,
    pub message: String,
}

pub type Result<T, E = BridgeError> = std::result::Result<T, E>;
