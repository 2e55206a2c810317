use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::config::{Config, TranscriberBackend};
use crate::summarize::Provider;
use crate::transcribe::ModelSize;

#[derive(Parser)]
#[command(
    name = "vidsum",
    about = "Video Summarizer - Turn a video into a transcript and a short summary",
    version,
    long_about = "Extracts the audio track of a video (YouTube and anything else yt-dlp understands, direct media URLs, or local files), transcribes it with Whisper or AWS Transcribe, and summarizes the transcript with a hosted language model."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable progress indicators
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Configuration file (default: ./config.yaml, then the user config directory)
    #[arg(short, long, global = true, value_name = "FILE", env = "VIDSUM_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log output format
    #[arg(long, global = true, value_enum, default_value = "pretty")]
    pub log_format: LogFormat,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Summarize a video from a URL or local file
    Summarize {
        /// URL or file path of the video
        #[arg(value_name = "URL_OR_FILE")]
        locator: String,

        /// Output file path (prints to console if not specified)
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,

        /// Summarization provider
        #[arg(long, value_enum)]
        provider: Option<Provider>,

        /// Whisper model size
        #[arg(long, value_enum)]
        model_size: Option<ModelSize>,

        /// Speech-to-text backend
        #[arg(long, value_enum)]
        backend: Option<TranscriberBackend>,

        /// Skip TLS certificate verification when downloading
        #[arg(long)]
        no_verify_tls: bool,

        /// Browser to read cookies from (passed to yt-dlp)
        #[arg(long, value_name = "BROWSER")]
        cookies: Option<String>,

        /// Include the full transcript in text output
        #[arg(long)]
        show_transcript: bool,
    },

    /// Show configuration
    Config {
        /// Show current configuration
        #[arg(short, long)]
        show: bool,

        /// Print the configuration file path
        #[arg(short, long)]
        path: bool,
    },

    /// Check that the external tools are installed
    Check,
}

/// Flags from `summarize` that override config values
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub provider: Option<Provider>,
    pub model_size: Option<ModelSize>,
    pub backend: Option<TranscriberBackend>,
    pub no_verify_tls: bool,
    pub cookies: Option<String>,
}

impl Overrides {
    pub fn apply(&self, config: &mut Config) {
        if let Some(provider) = self.provider {
            if provider != config.summarize.provider {
                // Model and key belong to the previous provider
                config.summarize.model = None;
                config.summarize.api_url = None;
                config.summarize.api_key_env = None;
            }
            config.summarize.provider = provider;
        }
        if let Some(model_size) = self.model_size {
            config.transcribe.model_size = model_size;
        }
        if let Some(backend) = self.backend {
            config.transcribe.backend = backend;
        }
        if self.no_verify_tls {
            config.fetch.verify_tls = false;
        }
        if let Some(cookies) = &self.cookies {
            config.fetch.cookie_source = Some(cookies.clone());
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    /// Plain text
    Text,
    /// Markdown document
    Markdown,
    /// JSON report
    Json,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Markdown => write!(f, "markdown"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogFormat {
    /// Human readable
    Pretty,
    /// One JSON object per line
    Json,
}
