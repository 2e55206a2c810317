use std::path::Path;
use tempfile::TempDir;
use uuid::Uuid;

use crate::config::{Config, TranscriberBackend};
use crate::error::ResourceError;

/// Allocate a run-unique scratch directory.
///
/// The name carries a random suffix so concurrent runs never collide. The
/// directory is removed when the returned handle is closed or dropped.
pub fn scratch_dir(base: Option<&Path>, purpose: &str) -> Result<TempDir, ResourceError> {
    let prefix = format!("vidsum-{}-{}-", purpose, &Uuid::new_v4().simple().to_string()[..8]);
    let mut builder = tempfile::Builder::new();
    builder.prefix(&prefix);

    let dir = match base {
        Some(base) => {
            fs_err::create_dir_all(base).map_err(ResourceError::Allocate)?;
            builder.tempdir_in(base)
        }
        None => builder.tempdir(),
    };

    dir.map_err(ResourceError::Allocate)
}

/// Remove a scratch directory, reporting failures instead of swallowing them.
pub fn release_scratch(dir: TempDir) -> Result<(), ResourceError> {
    let path = dir.path().to_path_buf();
    tracing::debug!("Releasing scratch directory: {}", path.display());
    dir.close()
        .map_err(|source| ResourceError::Release { path, source })
}

/// Release `scratch` and combine the outcome of the work done inside it.
///
/// The work's own error always wins; a release failure only surfaces when
/// the work itself succeeded.
pub fn finish_scratch<T, E>(outcome: Result<T, E>, scratch: TempDir) -> Result<T, E>
where
    E: From<ResourceError>,
{
    match (outcome, release_scratch(scratch)) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(release)) => Err(release.into()),
        (Err(err), Ok(())) => Err(err),
        (Err(err), Err(release)) => {
            tracing::warn!(error = %release, "Failed to release scratch directory");
            Err(err)
        }
    }
}

/// Whether the input looks like an http(s) URL
pub fn is_http_url(input: &str) -> bool {
    let lower = input.trim_start().to_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// Format file size in human-readable format
pub fn format_file_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    const THRESHOLD: f64 = 1024.0;

    if bytes == 0 {
        return "0 B".to_string();
    }

    let bytes_f = bytes as f64;
    let unit_index = (bytes_f.log10() / THRESHOLD.log10()).floor() as usize;
    let unit_index = unit_index.min(UNITS.len() - 1);

    let size = bytes_f / THRESHOLD.powi(unit_index as i32);

    if unit_index == 0 {
        format!("{} {}", bytes, UNITS[unit_index])
    } else {
        format!("{:.1} {}", size, UNITS[unit_index])
    }
}

/// Format duration in human-readable format
pub fn format_duration(seconds: f64) -> String {
    if seconds < 60.0 {
        return format!("{:.1}s", seconds);
    }

    let total_seconds = seconds as u64;
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let secs = total_seconds % 60;

    if hours > 0 {
        format!("{}h {}m {}s", hours, minutes, secs)
    } else {
        format!("{}m {}s", minutes, secs)
    }
}

/// Check that the external tools the configured pipeline shells out to exist
pub async fn check_dependencies(config: &Config) -> Vec<String> {
    let mut missing = Vec::new();

    if !check_command_available(&config.fetch.yt_dlp_path).await {
        missing.push(format!(
            "{} - required for extracting audio from video sites",
            config.fetch.yt_dlp_path
        ));
    }

    if !check_command_available(&config.fetch.ffmpeg_path).await {
        missing.push(format!(
            "{} - required for audio conversion",
            config.fetch.ffmpeg_path
        ));
    }

    if config.transcribe.backend == TranscriberBackend::Whisper
        && !check_command_available(&config.transcribe.whisper_path).await
    {
        missing.push(format!(
            "{} - required for local speech-to-text (pip install openai-whisper)",
            config.transcribe.whisper_path
        ));
    }

    missing
}

/// Check if a command is available in PATH
async fn check_command_available(command: &str) -> bool {
    use tokio::process::Command;

    // whisper has no --version flag, --help works for every tool we use
    Command::new(command)
        .arg("--help")
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
        .await
        .map(|status| status.success())
        .unwrap_or(false)
}
