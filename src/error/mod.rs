//! Failure classification shared by every pipeline stage.
//!
//! Each stage returns its own `thiserror` enum; all of them can be reduced to
//! an [`ErrorKind`] so the orchestrator can report `{stage, kind, message}`
//! without knowing the adapter behind the stage.

use serde::Serialize;
use std::fmt;
use std::path::PathBuf;

/// Fine-grained reason a run failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The run request itself was invalid (e.g. empty locator)
    Precondition,
    /// No fetcher knows how to handle the locator
    Unsupported,
    /// Transport failure
    Network,
    /// The remote media does not exist or is unavailable
    NotFound,
    /// Extraction finished but left no audio behind
    NoOutput,
    /// Extraction tool reported an error we could not classify
    Extraction,
    /// Certificate verification failed
    Tls,
    /// A bounded operation ran out of time
    Timeout,
    /// A required external executable is missing
    ToolMissing,
    /// Audio payload could not be decoded
    Decode,
    /// Speech model could not be loaded
    ModelUnavailable,
    /// Transcription succeeded but produced no text
    EmptyTranscript,
    /// Backend service reported a failure of its own
    Engine,
    /// Credential missing or rejected
    Auth,
    /// Quota or rate limit exceeded
    Quota,
    /// Response could not be interpreted
    MalformedResponse,
    /// Temporary storage could not be allocated or released
    Resource,
    /// Downloaded media exceeds the configured size limit
    TooLarge,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Precondition => "precondition",
            ErrorKind::Unsupported => "unsupported",
            ErrorKind::Network => "network",
            ErrorKind::NotFound => "not_found",
            ErrorKind::NoOutput => "no_output",
            ErrorKind::Extraction => "extraction",
            ErrorKind::Tls => "tls",
            ErrorKind::Timeout => "timeout",
            ErrorKind::ToolMissing => "tool_missing",
            ErrorKind::Decode => "decode",
            ErrorKind::ModelUnavailable => "model_unavailable",
            ErrorKind::EmptyTranscript => "empty_transcript",
            ErrorKind::Engine => "engine",
            ErrorKind::Auth => "auth",
            ErrorKind::Quota => "quota",
            ErrorKind::MalformedResponse => "malformed_response",
            ErrorKind::Resource => "resource",
            ErrorKind::TooLarge => "too_large",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Temporary storage could not be allocated, written, or released.
#[derive(thiserror::Error, Debug)]
pub enum ResourceError {
    #[error("failed to allocate temporary storage: {0}")]
    Allocate(#[source] std::io::Error),

    #[error("temporary file operation failed for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to release temporary storage {path}: {source}")]
    Release {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to release remote object {location}: {reason}")]
    RemoteRelease { location: String, reason: String },
}

impl ResourceError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ResourceError::Io {
            path: path.into(),
            source,
        }
    }
}
