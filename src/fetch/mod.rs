use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

pub mod direct;
pub mod local;
pub mod ytdlp;

use crate::config::FetchConfig;
use crate::error::{ErrorKind, ResourceError};

/// Title used when the source does not provide one
pub const UNKNOWN_TITLE: &str = "Unknown Title";

/// Supported audio formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    Mp3,
    M4a,
    Wav,
    Flac,
    Ogg,
    Opus,
    Webm,
}

impl AudioFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            AudioFormat::Mp3 => "mp3",
            AudioFormat::M4a => "m4a",
            AudioFormat::Wav => "wav",
            AudioFormat::Flac => "flac",
            AudioFormat::Ogg => "ogg",
            AudioFormat::Opus => "opus",
            AudioFormat::Webm => "webm",
        }
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "mp3" => Some(AudioFormat::Mp3),
            "m4a" | "aac" => Some(AudioFormat::M4a),
            "wav" => Some(AudioFormat::Wav),
            "flac" => Some(AudioFormat::Flac),
            "ogg" => Some(AudioFormat::Ogg),
            "opus" => Some(AudioFormat::Opus),
            "webm" => Some(AudioFormat::Webm),
            _ => None,
        }
    }

    /// Get MIME type for the format
    pub fn mime_type(&self) -> &'static str {
        match self {
            AudioFormat::Mp3 => "audio/mpeg",
            AudioFormat::M4a => "audio/mp4",
            AudioFormat::Wav => "audio/wav",
            AudioFormat::Flac => "audio/flac",
            AudioFormat::Ogg | AudioFormat::Opus => "audio/ogg",
            AudioFormat::Webm => "audio/webm",
        }
    }
}

/// Audio pulled out of a remote video, held in memory.
#[derive(Clone, PartialEq, Eq)]
pub struct AudioArtifact {
    pub bytes: Vec<u8>,
    pub title: String,
    pub format: AudioFormat,
}

impl AudioArtifact {
    /// Build an artifact, enforcing non-empty bytes and a display title
    pub fn new(
        bytes: Vec<u8>,
        title: Option<String>,
        format: AudioFormat,
    ) -> Result<Self, FetchError> {
        if bytes.is_empty() {
            return Err(FetchError::NoOutput("audio payload is empty".to_string()));
        }

        let title = title
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty() && t != "NA")
            .unwrap_or_else(|| UNKNOWN_TITLE.to_string());

        Ok(Self {
            bytes,
            title,
            format,
        })
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl fmt::Debug for AudioArtifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioArtifact")
            .field("bytes", &format_args!("<{} bytes>", self.bytes.len()))
            .field("title", &self.title)
            .field("format", &self.format)
            .finish()
    }
}

#[derive(thiserror::Error, Debug)]
pub enum FetchError {
    #[error("{0}")]
    Network(String),

    #[error("media not found or unavailable: {0}")]
    NotFound(String),

    #[error("extraction produced no audio output: {0}")]
    NoOutput(String),

    #[error("audio extraction failed: {0}")]
    Extraction(String),

    #[error("TLS certificate verification failed: {0}")]
    Tls(String),

    #[error("timed out: {0}")]
    Timeout(String),

    #[error("required tool `{tool}` is not available: {reason}")]
    ToolMissing { tool: String, reason: String },

    #[error("no fetcher supports locator: {0}")]
    Unsupported(String),

    #[error("download exceeds the {limit}-byte limit")]
    TooLarge { limit: u64 },

    #[error(transparent)]
    Resource(#[from] ResourceError),
}

impl FetchError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            FetchError::Network(_) => ErrorKind::Network,
            FetchError::NotFound(_) => ErrorKind::NotFound,
            FetchError::NoOutput(_) => ErrorKind::NoOutput,
            FetchError::Extraction(_) => ErrorKind::Extraction,
            FetchError::Tls(_) => ErrorKind::Tls,
            FetchError::Timeout(_) => ErrorKind::Timeout,
            FetchError::ToolMissing { .. } => ErrorKind::ToolMissing,
            FetchError::Unsupported(_) => ErrorKind::Unsupported,
            FetchError::TooLarge { .. } => ErrorKind::TooLarge,
            FetchError::Resource(_) => ErrorKind::Resource,
        }
    }
}

/// Retrieves the audio track of a video.
///
/// Implementations must release any temporary storage before returning, so
/// the caller only ever holds the in-memory payload.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MediaFetcher: Send + Sync {
    /// Fetch the best available audio for `locator`
    async fn fetch(&self, locator: &str) -> Result<AudioArtifact, FetchError>;

    /// Check if this fetcher handles the given locator
    fn supports(&self, locator: &str) -> bool;

    /// Get the name of this fetcher
    fn name(&self) -> &'static str;
}

/// Routes each locator to the first fetcher that supports it
pub struct FetcherRegistry {
    fetchers: Vec<Box<dyn MediaFetcher>>,
}

impl FetcherRegistry {
    /// Create an empty registry
    pub fn empty() -> Self {
        Self {
            fetchers: Vec::new(),
        }
    }

    /// Create a registry with the default fetchers, most specific first
    pub fn from_config(config: &FetchConfig, scratch_base: Option<PathBuf>) -> Result<Self, FetchError> {
        let mut registry = Self::empty();

        registry.register(Box::new(local::LocalFileFetcher::new(
            config.clone(),
            scratch_base.clone(),
        )));
        registry.register(Box::new(direct::HttpFetcher::new(config)?));
        registry.register(Box::new(ytdlp::YtDlpFetcher::new(config.clone(), scratch_base)));

        Ok(registry)
    }

    /// Register a new fetcher
    pub fn register(&mut self, fetcher: Box<dyn MediaFetcher>) {
        self.fetchers.push(fetcher);
    }

    /// Find a fetcher that supports the given locator
    pub fn find_fetcher(&self, locator: &str) -> Option<&dyn MediaFetcher> {
        self.fetchers
            .iter()
            .find(|fetcher| fetcher.supports(locator))
            .map(|boxed| boxed.as_ref())
    }

    /// List the registered fetchers
    pub fn list_fetchers(&self) -> Vec<&'static str> {
        self.fetchers.iter().map(|fetcher| fetcher.name()).collect()
    }
}

#[async_trait]
impl MediaFetcher for FetcherRegistry {
    async fn fetch(&self, locator: &str) -> Result<AudioArtifact, FetchError> {
        let fetcher = self
            .find_fetcher(locator)
            .ok_or_else(|| FetchError::Unsupported(locator.to_string()))?;

        tracing::info!(fetcher = fetcher.name(), "Fetching audio for: {}", locator);
        fetcher.fetch(locator).await
    }

    fn supports(&self, locator: &str) -> bool {
        self.find_fetcher(locator).is_some()
    }

    fn name(&self) -> &'static str {
        "Registry"
    }
}
