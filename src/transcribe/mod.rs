use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

pub mod aws;
pub mod whisper;

use crate::error::{ErrorKind, ResourceError};
use crate::fetch::AudioFormat;

/// Plain-text transcript of an audio track
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Transcript(String);

impl Transcript {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True when there is nothing worth summarizing
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }

    pub fn word_count(&self) -> usize {
        self.0.split_whitespace().count()
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl From<String> for Transcript {
    fn from(text: String) -> Self {
        Self(text)
    }
}

impl From<&str> for Transcript {
    fn from(text: &str) -> Self {
        Self(text.to_string())
    }
}

impl fmt::Display for Transcript {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Whisper model size
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ModelSize {
    Tiny,
    #[default]
    Base,
    Small,
    Medium,
    Large,
    Turbo,
}

impl ModelSize {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelSize::Tiny => "tiny",
            ModelSize::Base => "base",
            ModelSize::Small => "small",
            ModelSize::Medium => "medium",
            ModelSize::Large => "large",
            ModelSize::Turbo => "turbo",
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum TranscribeError {
    #[error("could not decode audio: {0}")]
    Decode(String),

    #[error("speech model unavailable: {0}")]
    ModelUnavailable(String),

    #[error("transcription produced no text")]
    EmptyTranscript,

    #[error("transcription engine failed: {0}")]
    Engine(String),

    #[error("transcription did not finish within {0}s")]
    Timeout(u64),

    #[error(transparent)]
    Resource(#[from] ResourceError),
}

impl TranscribeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TranscribeError::Decode(_) => ErrorKind::Decode,
            TranscribeError::ModelUnavailable(_) => ErrorKind::ModelUnavailable,
            TranscribeError::EmptyTranscript => ErrorKind::EmptyTranscript,
            TranscribeError::Engine(_) => ErrorKind::Engine,
            TranscribeError::Timeout(_) => ErrorKind::Timeout,
            TranscribeError::Resource(_) => ErrorKind::Resource,
        }
    }
}

/// Speech-to-text over an in-memory audio payload.
///
/// Any transient form the engine needs (files, uploads) is created and
/// removed within a single call.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(
        &self,
        audio: &[u8],
        format: AudioFormat,
    ) -> Result<Transcript, TranscribeError>;

    fn name(&self) -> &'static str;
}
