use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::{Client, StatusCode};
use std::path::Path;
use std::time::Duration;
use url::Url;

use super::{AudioArtifact, AudioFormat, FetchError, MediaFetcher};
use crate::config::FetchConfig;
use crate::utils;

const MEDIA_EXTENSIONS: &[&str] = &[
    ".mp3", ".m4a", ".wav", ".flac", ".ogg", ".opus", ".aac", ".webm",
];

/// Upper bound on the buffer reserved up front from Content-Length
const PREALLOCATE_LIMIT: u64 = 8 << 20;

/// Retry delays grow in steps of two units and stop growing at ten
const RETRY_DELAY_UNIT: Duration = Duration::from_millis(500);
const RETRY_DELAY_CAP: u32 = 10;

/// Fetcher for URLs that point straight at an audio file.
///
/// The body is streamed into memory; nothing touches the filesystem.
pub struct HttpFetcher {
    client: Client,
    retries: u32,
    max_bytes: u64,
    retry_unit: Duration,
}

impl HttpFetcher {
    pub fn new(config: &FetchConfig) -> Result<Self, FetchError> {
        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(Duration::from_secs(config.timeout_seconds))
            .connect_timeout(Duration::from_secs(config.timeout_seconds))
            .danger_accept_invalid_certs(!config.verify_tls)
            .build()
            .map_err(|e| FetchError::Network(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            retries: config.retries,
            max_bytes: config.max_download_bytes,
            retry_unit: RETRY_DELAY_UNIT,
        })
    }

    /// Scale the delay between retries
    pub fn with_retry_unit(mut self, unit: Duration) -> Self {
        self.retry_unit = unit;
        self
    }

    /// Determine audio format from URL or content type
    fn determine_format(url: &Url, content_type: Option<&str>) -> AudioFormat {
        let from_path = url
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .and_then(|filename| Path::new(filename).extension())
            .and_then(|ext| AudioFormat::from_extension(&ext.to_string_lossy()));

        if let Some(format) = from_path {
            return format;
        }

        match content_type {
            Some(ct) if ct.contains("mpeg") || ct.contains("mp3") => AudioFormat::Mp3,
            Some(ct) if ct.contains("mp4") || ct.contains("m4a") => AudioFormat::M4a,
            Some(ct) if ct.contains("wav") => AudioFormat::Wav,
            Some(ct) if ct.contains("flac") => AudioFormat::Flac,
            Some(ct) if ct.contains("opus") => AudioFormat::Opus,
            Some(ct) if ct.contains("ogg") => AudioFormat::Ogg,
            Some(ct) if ct.contains("webm") => AudioFormat::Webm,
            _ => AudioFormat::Mp3,
        }
    }

    /// Human-readable title from the last path segment
    pub fn title_from_url(url: &Url) -> Option<String> {
        url.path_segments()
            .and_then(|mut segments| segments.next_back())
            .filter(|filename| !filename.is_empty())
            .map(|filename| {
                let name = match filename.rfind('.') {
                    Some(dot_pos) => &filename[..dot_pos],
                    None => filename,
                };
                urlencoding::decode(name)
                    .map(|decoded| decoded.into_owned())
                    .unwrap_or_else(|_| name.to_string())
                    .replace(['_', '-'], " ")
            })
    }

    /// One download attempt
    async fn download_once(&self, url: &Url) -> Result<(Vec<u8>, Option<String>), FetchError> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| classify_reqwest(&e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(classify_status(status, url));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|ct| ct.to_str().ok())
            .map(|s| s.to_string());

        let declared = response.content_length().unwrap_or(0);
        if declared > self.max_bytes {
            return Err(FetchError::TooLarge {
                limit: self.max_bytes,
            });
        }

        let mut bytes = Vec::with_capacity(declared.min(PREALLOCATE_LIMIT) as usize);
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| classify_reqwest(&e))?;
            if (bytes.len() + chunk.len()) as u64 > self.max_bytes {
                return Err(FetchError::TooLarge {
                    limit: self.max_bytes,
                });
            }
            bytes.extend_from_slice(&chunk);
        }

        Ok((bytes, content_type))
    }
}

#[async_trait]
impl MediaFetcher for HttpFetcher {
    async fn fetch(&self, locator: &str) -> Result<AudioArtifact, FetchError> {
        let url = Url::parse(locator)
            .map_err(|e| FetchError::Unsupported(format!("{}: {}", locator, e)))?;

        let mut attempt = 0;
        let (bytes, content_type) = loop {
            match self.download_once(&url).await {
                Ok(downloaded) => break downloaded,
                Err(err) if attempt < self.retries && is_retryable(&err) => {
                    attempt += 1;
                    let delay = retry_delay(self.retry_unit, attempt);
                    tracing::warn!(attempt, ?delay, error = %err, "Retrying audio download");
                    tokio::time::sleep(delay).await;
                }
                Err(err) => return Err(err),
            }
        };

        tracing::debug!(
            "Downloaded {} from {}",
            utils::format_file_size(bytes.len() as u64),
            url
        );

        let format = Self::determine_format(&url, content_type.as_deref());
        AudioArtifact::new(bytes, Self::title_from_url(&url), format)
    }

    fn supports(&self, locator: &str) -> bool {
        let Ok(url) = Url::parse(locator) else {
            return false;
        };

        if !matches!(url.scheme(), "http" | "https") {
            return false;
        }

        let path = url.path().to_lowercase();
        MEDIA_EXTENSIONS.iter().any(|ext| path.ends_with(ext))
    }

    fn name(&self) -> &'static str {
        "Direct URL"
    }
}

/// Delay before retry `attempt` (1-based): `unit * min(1 + 2(n-1), 10)`
fn retry_delay(unit: Duration, attempt: u32) -> Duration {
    let steps = 1 + 2 * attempt.saturating_sub(1);
    unit * steps.min(RETRY_DELAY_CAP)
}

fn is_retryable(err: &FetchError) -> bool {
    matches!(err, FetchError::Network(_) | FetchError::Timeout(_))
}

fn classify_status(status: StatusCode, url: &Url) -> FetchError {
    match status {
        StatusCode::NOT_FOUND | StatusCode::GONE | StatusCode::FORBIDDEN => {
            FetchError::NotFound(format!("HTTP {} for {}", status, url))
        }
        _ => FetchError::Network(format!("HTTP {} for {}", status, url)),
    }
}

/// Map a transport error, looking through the source chain for TLS causes
fn classify_reqwest(err: &reqwest::Error) -> FetchError {
    if err.is_timeout() {
        return FetchError::Timeout(err.to_string());
    }

    let mut source: Option<&(dyn std::error::Error + 'static)> = Some(err);
    while let Some(cause) = source {
        let text = cause.to_string().to_lowercase();
        if text.contains("certificate") || text.contains("invalidcertificate") {
            return FetchError::Tls(cause.to_string());
        }
        source = cause.source();
    }

    FetchError::Network(err.to_string())
}
