use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

use super::{AudioArtifact, AudioFormat, FetchError, MediaFetcher};
use crate::config::FetchConfig;
use crate::error::ResourceError;
use crate::utils;

/// Audio fetcher backed by yt-dlp, works for most video sites
pub struct YtDlpFetcher {
    config: FetchConfig,
    scratch_base: Option<PathBuf>,
}

impl YtDlpFetcher {
    pub fn new(config: FetchConfig, scratch_base: Option<PathBuf>) -> Self {
        Self {
            config,
            scratch_base,
        }
    }

    /// Build the yt-dlp argument list for one download
    pub fn build_args(&self, locator: &str, output_template: &Path) -> Vec<String> {
        let config = &self.config;
        let mut args = vec![
            "--format".to_string(),
            format!("{}/best", config.preferred_format),
            "--extract-audio".to_string(),
            "--audio-format".to_string(),
            config.output_codec.as_str().to_string(),
            "--no-playlist".to_string(),
            "--no-progress".to_string(),
            "--user-agent".to_string(),
            config.user_agent.clone(),
            "--retries".to_string(),
            config.retries.to_string(),
            "--socket-timeout".to_string(),
            config.timeout_seconds.to_string(),
            "--print".to_string(),
            "after_move:title".to_string(),
            "--output".to_string(),
            output_template.to_string_lossy().into_owned(),
        ];

        if !config.verify_tls {
            args.push("--no-check-certificates".to_string());
        }

        if let Some(browser) = &config.cookie_source {
            args.push("--cookies-from-browser".to_string());
            args.push(browser.clone());
        }

        if config.ffmpeg_path != "ffmpeg" {
            args.push("--ffmpeg-location".to_string());
            args.push(config.ffmpeg_path.clone());
        }

        // End of options, so locators starting with '-' are not parsed as flags
        args.push("--".to_string());
        args.push(locator.to_string());
        args
    }

    /// Run yt-dlp into `dir` and load whatever audio it produced
    async fn download_into(&self, locator: &str, dir: &Path) -> Result<AudioArtifact, FetchError> {
        let output_template = dir.join("audio.%(ext)s");
        let args = self.build_args(locator, &output_template);

        tracing::debug!("Running {} {:?}", self.config.yt_dlp_path, args);

        let output = Command::new(&self.config.yt_dlp_path)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| FetchError::ToolMissing {
                tool: self.config.yt_dlp_path.clone(),
                reason: e.to_string(),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(classify_stderr(&stderr));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let title = parse_title(&stdout);

        let (audio_path, format) = find_audio_file(dir)?.ok_or_else(|| {
            FetchError::NoOutput(format!("yt-dlp exited successfully but wrote no audio for {}", locator))
        })?;

        let bytes = tokio::fs::read(&audio_path)
            .await
            .map_err(|e| ResourceError::io(&audio_path, e))?;

        tracing::debug!(
            "yt-dlp produced {} ({})",
            audio_path.display(),
            utils::format_file_size(bytes.len() as u64)
        );

        AudioArtifact::new(bytes, title, format)
    }
}

#[async_trait]
impl MediaFetcher for YtDlpFetcher {
    async fn fetch(&self, locator: &str) -> Result<AudioArtifact, FetchError> {
        let scratch = utils::scratch_dir(self.scratch_base.as_deref(), "fetch")?;
        let outcome = self.download_into(locator, scratch.path()).await;
        utils::finish_scratch(outcome, scratch)
    }

    fn supports(&self, locator: &str) -> bool {
        // yt-dlp understands URLs and its own search prefixes
        !locator.trim().is_empty()
    }

    fn name(&self) -> &'static str {
        "yt-dlp"
    }
}

/// Last non-empty stdout line is the title printed after the move
fn parse_title(stdout: &str) -> Option<String> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .last()
        .map(str::to_string)
}

/// Locate the converted audio file in a scratch directory
fn find_audio_file(dir: &Path) -> Result<Option<(PathBuf, AudioFormat)>, FetchError> {
    let entries = fs_err::read_dir(dir).map_err(|e| ResourceError::io(dir, e))?;

    for entry in entries.flatten() {
        let path = entry.path();
        let format = path
            .extension()
            .and_then(|ext| ext.to_str())
            .and_then(AudioFormat::from_extension);

        if let Some(format) = format {
            if path.is_file() {
                return Ok(Some((path, format)));
            }
        }
    }

    Ok(None)
}

/// Map yt-dlp error output to a fetch failure
pub(crate) fn classify_stderr(stderr: &str) -> FetchError {
    let message = stderr
        .lines()
        .map(str::trim)
        .filter(|line| line.starts_with("ERROR:"))
        .last()
        .or_else(|| stderr.lines().map(str::trim).filter(|l| !l.is_empty()).last())
        .unwrap_or("yt-dlp failed without output")
        .trim_start_matches("ERROR:")
        .trim()
        .to_string();

    let lower = stderr.to_lowercase();

    if lower.contains("certificate verify failed") || lower.contains("ssl: certificate") {
        FetchError::Tls(message)
    } else if lower.contains("timed out") || lower.contains("read timeout") {
        FetchError::Timeout(message)
    } else if lower.contains("unsupported url") {
        FetchError::Unsupported(message)
    } else if lower.contains("video unavailable")
        || lower.contains("private video")
        || lower.contains("http error 404")
        || lower.contains("not found")
        || lower.contains("does not exist")
        || lower.contains("has been removed")
    {
        FetchError::NotFound(message)
    } else if lower.contains("unable to download")
        || lower.contains("network is unreachable")
        || lower.contains("connection refused")
        || lower.contains("connection reset")
        || lower.contains("name or service not known")
        || lower.contains("temporary failure in name resolution")
        || lower.contains("getaddrinfo failed")
    {
        FetchError::Network(message)
    } else {
        FetchError::Extraction(message)
    }
}
