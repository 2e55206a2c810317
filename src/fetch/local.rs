use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::fs;
use tokio::process::Command;

use super::{AudioArtifact, AudioFormat, FetchError, MediaFetcher};
use crate::config::FetchConfig;
use crate::error::ResourceError;
use crate::utils;

/// Fetcher for audio or video files already on disk.
///
/// Audio files are read as-is; anything else goes through ffmpeg into a
/// run-unique scratch directory that is removed before returning.
pub struct LocalFileFetcher {
    config: FetchConfig,
    scratch_base: Option<PathBuf>,
}

impl LocalFileFetcher {
    pub fn new(config: FetchConfig, scratch_base: Option<PathBuf>) -> Self {
        Self {
            config,
            scratch_base,
        }
    }

    /// Check the file exists, is a regular file and is not empty
    async fn validate_file(&self, path: &Path) -> Result<(), FetchError> {
        let metadata = fs::metadata(path)
            .await
            .map_err(|e| FetchError::NotFound(format!("{}: {}", path.display(), e)))?;

        if !metadata.is_file() {
            return Err(FetchError::NotFound(format!(
                "path is not a file: {}",
                path.display()
            )));
        }

        if metadata.len() == 0 {
            return Err(FetchError::NoOutput(format!("file is empty: {}", path.display())));
        }

        Ok(())
    }

    /// Extract the audio track of `source` into `dir` with ffmpeg
    async fn convert_into(&self, source: &Path, dir: &Path) -> Result<Vec<u8>, FetchError> {
        let codec = self.config.output_codec;
        let target = dir.join(format!("audio.{}", codec.as_str()));

        tracing::debug!("Converting {} to {}", source.display(), codec.as_str());

        let output = Command::new(&self.config.ffmpeg_path)
            .arg("-y")
            .arg("-i")
            .arg(source)
            .args(["-vn", "-ac", "1", "-ar", "16000"])
            .arg(&target)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| FetchError::ToolMissing {
                tool: self.config.ffmpeg_path.clone(),
                reason: e.to_string(),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let reason = stderr
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .last()
                .unwrap_or("ffmpeg failed")
                .to_string();
            return Err(FetchError::Extraction(reason));
        }

        match fs::read(&target).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(FetchError::NoOutput(
                format!("ffmpeg wrote no audio for {}", source.display()),
            )),
            Err(e) => Err(ResourceError::io(&target, e).into()),
        }
    }
}

#[async_trait]
impl MediaFetcher for LocalFileFetcher {
    async fn fetch(&self, locator: &str) -> Result<AudioArtifact, FetchError> {
        let path = Path::new(locator);
        self.validate_file(path).await?;

        let title = path
            .file_stem()
            .and_then(|s| s.to_str())
            .map(|s| s.to_string());

        let source_format = path
            .extension()
            .and_then(|ext| ext.to_str())
            .and_then(AudioFormat::from_extension);

        // Plain audio files need no conversion
        if let Some(format) = source_format {
            let bytes = fs::read(path)
                .await
                .map_err(|e| ResourceError::io(path, e))?;
            return AudioArtifact::new(bytes, title, format);
        }

        let scratch = utils::scratch_dir(self.scratch_base.as_deref(), "local")?;
        let outcome = self.convert_into(path, scratch.path()).await;
        let bytes = utils::finish_scratch(outcome, scratch)?;

        AudioArtifact::new(bytes, title, self.config.output_codec)
    }

    fn supports(&self, locator: &str) -> bool {
        !utils::is_http_url(locator) && Path::new(locator).exists()
    }

    fn name(&self) -> &'static str {
        "Local File"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[tokio::test]
    async fn test_audio_file_is_read_directly() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("team standup.m4a");
        std::fs::write(&path, b"m4a-bytes").unwrap();

        let fetcher = LocalFileFetcher::new(FetchConfig::default(), None);
        let locator = path.to_string_lossy();
        assert!(fetcher.supports(&locator));

        let artifact = fetcher.fetch(&locator).await.unwrap();
        assert_eq!(artifact.title, "team standup");
        assert_eq!(artifact.format, AudioFormat::M4a);
        assert_eq!(artifact.bytes, b"m4a-bytes");
    }

    #[tokio::test]
    async fn test_missing_and_empty_files() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = LocalFileFetcher::new(FetchConfig::default(), None);

        let missing = dir.path().join("missing.mp3");
        let err = fetcher.fetch(&missing.to_string_lossy()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let empty = dir.path().join("empty.mp3");
        std::fs::write(&empty, b"").unwrap();
        let err = fetcher.fetch(&empty.to_string_lossy()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NoOutput);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_video_is_converted_in_released_scratch() {
        use crate::test_support::write_script;

        // Last argument is the output path
        const FAKE_FFMPEG: &str = "for last; do :; done\nprintf 'converted' > \"$last\"\n";

        let tools = tempfile::tempdir().unwrap();
        let base = tempfile::tempdir().unwrap();
        let media = tempfile::tempdir().unwrap();

        let ffmpeg = write_script(tools.path(), "ffmpeg", FAKE_FFMPEG);
        let video = media.path().join("keynote.mp4");
        std::fs::write(&video, b"not-really-a-video").unwrap();

        let config = FetchConfig {
            ffmpeg_path: ffmpeg.to_string_lossy().into_owned(),
            ..FetchConfig::default()
        };
        let fetcher = LocalFileFetcher::new(config, Some(base.path().to_path_buf()));

        let artifact = fetcher.fetch(&video.to_string_lossy()).await.unwrap();
        assert_eq!(artifact.title, "keynote");
        assert_eq!(artifact.format, AudioFormat::Mp3);
        assert_eq!(artifact.bytes, b"converted");
        assert_eq!(std::fs::read_dir(base.path()).unwrap().count(), 0);
    }
}
