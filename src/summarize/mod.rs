use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

pub mod chat;
pub mod provider;

pub use chat::ChatSummarizer;
pub use provider::{Provider, ProviderConfig};

use crate::error::ErrorKind;
use crate::transcribe::Transcript;

/// Fixed instruction placed ahead of the transcript
pub const INSTRUCTION: &str = "Summarize the following text in a few lines:";

/// Short natural-language summary of a transcript
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Summary(String);

impl Summary {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl From<&str> for Summary {
    fn from(text: &str) -> Self {
        Self(text.to_string())
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(thiserror::Error, Debug)]
pub enum SummarizeError {
    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("quota or rate limit exceeded: {0}")]
    Quota(String),

    #[error("summarization request failed: {0}")]
    Network(String),

    #[error("malformed response from summarization service: {0}")]
    MalformedResponse(String),

    #[error("summarization service returned HTTP {status}: {message}")]
    Service { status: u16, message: String },

    #[error("nothing to summarize")]
    EmptyInput,

    #[error("summarization did not finish within {0}s")]
    Timeout(u64),
}

impl SummarizeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SummarizeError::Auth(_) => ErrorKind::Auth,
            SummarizeError::Quota(_) => ErrorKind::Quota,
            SummarizeError::Network(_) => ErrorKind::Network,
            SummarizeError::MalformedResponse(_) => ErrorKind::MalformedResponse,
            SummarizeError::Service { .. } => ErrorKind::Engine,
            SummarizeError::EmptyInput => ErrorKind::Precondition,
            SummarizeError::Timeout(_) => ErrorKind::Timeout,
        }
    }
}

/// Prompt sent to the text generation service
pub fn build_prompt(text: &Transcript) -> String {
    format!("{}\n\n{}", INSTRUCTION, text.as_str())
}

/// Text summarization over a generative text service
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Summarizer: Send + Sync {
    /// Summarize a non-empty transcript. No retry on failure.
    async fn summarize(&self, text: &Transcript) -> Result<Summary, SummarizeError>;

    fn name(&self) -> &'static str;
}
