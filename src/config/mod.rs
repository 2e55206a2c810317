use anyhow::{Context, Result};
use aws_types::region::Region;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::fetch::AudioFormat;
use crate::summarize::Provider;
use crate::transcribe::ModelSize;

const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

/// Highest transport retry count accepted in config
const MAX_RETRIES: u32 = 10;

/// 1 GiB, direct downloads are buffered in memory
const DEFAULT_MAX_DOWNLOAD_BYTES: u64 = 1 << 30;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Audio retrieval settings
    pub fetch: FetchConfig,

    /// Speech-to-text settings
    pub transcribe: TranscribeConfig,

    /// Summarization service settings
    pub summarize: SummarizeConfig,

    /// Application settings
    pub app: AppConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// yt-dlp format selector for the audio stream
    pub preferred_format: String,

    /// Codec the extracted audio is converted to
    pub output_codec: AudioFormat,

    /// User agent sent to remote hosts
    pub user_agent: String,

    /// Verify TLS certificates
    pub verify_tls: bool,

    /// Transport-level retry count
    pub retries: u32,

    /// Socket timeout in seconds
    pub timeout_seconds: u64,

    /// Largest body the direct downloader will hold in memory
    pub max_download_bytes: u64,

    /// Browser to read cookies from (passed to yt-dlp)
    pub cookie_source: Option<String>,

    /// yt-dlp executable
    pub yt_dlp_path: String,

    /// ffmpeg executable
    pub ffmpeg_path: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum TranscriberBackend {
    /// Local openai-whisper CLI
    #[default]
    Whisper,
    /// AWS Transcribe (needs an S3 bucket)
    Aws,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscribeConfig {
    /// Which speech-to-text engine to use
    pub backend: TranscriberBackend,

    /// Whisper model size
    pub model_size: ModelSize,

    /// Spoken language (auto-detect if not specified)
    pub language: Option<String>,

    /// whisper executable
    pub whisper_path: String,

    /// AWS Transcribe settings, only used by the aws backend
    pub aws: AwsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AwsConfig {
    /// AWS region
    pub region: String,

    /// S3 bucket for temporary audio storage
    pub s3_bucket: String,

    /// Optional S3 key prefix
    pub s3_key_prefix: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SummarizeConfig {
    /// Text generation provider
    pub provider: Provider,

    /// Model override (provider default if not specified)
    pub model: Option<String>,

    /// Endpoint override (provider default if not specified)
    pub api_url: Option<String>,

    /// Environment variable holding the API key (provider default if not specified)
    pub api_key_env: Option<String>,

    /// HTTP request timeout in seconds
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Base directory for per-run scratch space (system temp if not specified)
    pub temp_dir: Option<PathBuf>,

    /// Upper bound for the transcription stage
    pub transcribe_timeout_seconds: Option<u64>,

    /// Upper bound for the summarization stage
    pub summarize_timeout_seconds: Option<u64>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            preferred_format: "bestaudio".to_string(),
            output_codec: AudioFormat::Mp3,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            verify_tls: true,
            retries: 3,
            timeout_seconds: 30,
            max_download_bytes: DEFAULT_MAX_DOWNLOAD_BYTES,
            cookie_source: None,
            yt_dlp_path: "yt-dlp".to_string(),
            ffmpeg_path: "ffmpeg".to_string(),
        }
    }
}

impl Default for TranscribeConfig {
    fn default() -> Self {
        Self {
            backend: TranscriberBackend::Whisper,
            model_size: ModelSize::Base,
            language: None,
            whisper_path: "whisper".to_string(),
            aws: AwsConfig::default(),
        }
    }
}

impl Default for AwsConfig {
    fn default() -> Self {
        Self {
            region: "us-east-1".to_string(),
            s3_bucket: "".to_string(),
            s3_key_prefix: Some("video-summarizer/".to_string()),
        }
    }
}

impl Default for SummarizeConfig {
    fn default() -> Self {
        Self {
            provider: Provider::Gemini,
            model: None,
            api_url: None,
            api_key_env: None,
            timeout_seconds: 60,
        }
    }
}

impl Config {
    /// Load configuration from file or create default
    pub async fn load(explicit: Option<&Path>) -> Result<Self> {
        let config_path = Self::config_path(explicit)?;

        if config_path.exists() {
            let content = fs_err::read_to_string(&config_path)
                .context("Failed to read config file")?;

            let config = Self::from_yaml(&content)?;
            tracing::debug!("Loaded configuration from {}", config_path.display());
            Ok(config)
        } else {
            let config = Self::default();
            config.save_to(&config_path)?;
            tracing::info!("Wrote default configuration to {}", config_path.display());
            Ok(config)
        }
    }

    /// Parse and validate a YAML document
    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(content)
            .context("Failed to parse config file")?;

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save_to(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs_err::create_dir_all(parent)?;
            }
        }

        let content = serde_yaml::to_string(self)
            .context("Failed to serialize config")?;

        fs_err::write(config_path, content)
            .context("Failed to write config file")?;

        Ok(())
    }

    /// Get configuration file path
    pub fn config_path(explicit: Option<&Path>) -> Result<PathBuf> {
        if let Some(path) = explicit {
            return Ok(path.to_path_buf());
        }

        // Current directory wins for easy testing
        let local_config = PathBuf::from("config.yaml");
        if local_config.exists() {
            return Ok(local_config);
        }

        let config_dir = dirs::config_dir()
            .context("Could not determine config directory")?;

        Ok(config_dir.join("video-summarizer").join("config.yaml"))
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.fetch.preferred_format.trim().is_empty() {
            anyhow::bail!("fetch.preferred_format must not be empty");
        }

        if self.fetch.user_agent.trim().is_empty() {
            anyhow::bail!("fetch.user_agent must not be empty");
        }

        if self.fetch.retries > MAX_RETRIES {
            anyhow::bail!(
                "fetch.retries must be at most {} (got {})",
                MAX_RETRIES,
                self.fetch.retries
            );
        }

        if self.fetch.timeout_seconds == 0 {
            anyhow::bail!("fetch.timeout_seconds must be greater than zero");
        }

        if self.fetch.max_download_bytes == 0 {
            anyhow::bail!("fetch.max_download_bytes must be greater than zero");
        }

        if self.summarize.timeout_seconds == 0 {
            anyhow::bail!("summarize.timeout_seconds must be greater than zero");
        }

        if matches!(self.app.transcribe_timeout_seconds, Some(0))
            || matches!(self.app.summarize_timeout_seconds, Some(0))
        {
            anyhow::bail!("stage timeouts must be greater than zero when set");
        }

        if self.transcribe.backend == TranscriberBackend::Aws
            && self.transcribe.aws.s3_bucket.is_empty()
        {
            anyhow::bail!("transcribe.aws.s3_bucket must be configured for the aws backend");
        }

        Ok(())
    }

    /// Display current configuration
    pub fn display(&self) {
        println!("Current Configuration:");
        println!("  Fetch:");
        println!("    Format: {}", self.fetch.preferred_format);
        println!("    Codec: {}", self.fetch.output_codec.as_str());
        println!("    Verify TLS: {}", self.fetch.verify_tls);
        println!("    Retries: {}", self.fetch.retries);
        println!("    Timeout: {}s", self.fetch.timeout_seconds);
        println!(
            "    Max download: {}",
            crate::utils::format_file_size(self.fetch.max_download_bytes)
        );
        if let Some(cookies) = &self.fetch.cookie_source {
            println!("    Cookies from: {}", cookies);
        }
        println!("  Transcribe:");
        println!("    Backend: {:?}", self.transcribe.backend);
        println!("    Model: {}", self.transcribe.model_size.as_str());
        if let Some(language) = &self.transcribe.language {
            println!("    Language: {}", language);
        }
        if self.transcribe.backend == TranscriberBackend::Aws {
            println!("    AWS Region: {}", self.transcribe.aws.region);
            println!("    S3 Bucket: {}", self.transcribe.aws.s3_bucket);
        }
        println!("  Summarize:");
        println!("    Provider: {}", self.summarize.provider.name());
        println!("    Model: {}", self.summary_model());
        println!("    API key env: {}", self.api_key_env());
    }

    /// Get AWS region
    pub fn aws_region(&self) -> Region {
        Region::new(self.transcribe.aws.region.clone())
    }

    /// Model used for summaries, after applying the override
    pub fn summary_model(&self) -> String {
        self.summarize
            .model
            .clone()
            .unwrap_or_else(|| self.summarize.provider.config().model.to_string())
    }

    /// Environment variable the API key is read from
    pub fn api_key_env(&self) -> String {
        self.summarize
            .api_key_env
            .clone()
            .unwrap_or_else(|| self.summarize.provider.config().env_var.to_string())
    }
}
