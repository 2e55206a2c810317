use async_trait::async_trait;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

use super::{ModelSize, Transcriber, TranscribeError, Transcript};
use crate::error::ResourceError;
use crate::fetch::AudioFormat;
use crate::utils;

/// Output document written by `whisper --output_format json`
#[derive(Debug, Deserialize)]
struct WhisperOutput {
    text: String,
    #[serde(default)]
    language: Option<String>,
}

/// Transcriber that shells out to the openai-whisper CLI.
///
/// The model is loaded by each process, so nothing is cached between calls.
pub struct WhisperCliTranscriber {
    binary: String,
    model_size: ModelSize,
    language: Option<String>,
    scratch_base: Option<PathBuf>,
}

impl WhisperCliTranscriber {
    pub fn new(
        binary: impl Into<String>,
        model_size: ModelSize,
        language: Option<String>,
        scratch_base: Option<PathBuf>,
    ) -> Self {
        Self {
            binary: binary.into(),
            model_size,
            language,
            scratch_base,
        }
    }

    pub fn build_args(&self, audio_path: &Path, output_dir: &Path) -> Vec<String> {
        let mut args = vec![
            audio_path.to_string_lossy().into_owned(),
            "--model".to_string(),
            self.model_size.as_str().to_string(),
            "--output_format".to_string(),
            "json".to_string(),
            "--output_dir".to_string(),
            output_dir.to_string_lossy().into_owned(),
            "--verbose".to_string(),
            "False".to_string(),
        ];

        if let Some(language) = &self.language {
            args.push("--language".to_string());
            args.push(language.clone());
        }

        args
    }

    async fn run_in(
        &self,
        audio: &[u8],
        format: AudioFormat,
        dir: &Path,
    ) -> Result<Transcript, TranscribeError> {
        let audio_path = dir.join(format!("audio.{}", format.as_str()));
        tokio::fs::write(&audio_path, audio)
            .await
            .map_err(|e| ResourceError::io(&audio_path, e))?;

        tracing::debug!(
            "Running {} with model {} on {}",
            self.binary,
            self.model_size.as_str(),
            audio_path.display()
        );

        let output = Command::new(&self.binary)
            .args(self.build_args(&audio_path, dir))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                TranscribeError::ModelUnavailable(format!("cannot run `{}`: {}", self.binary, e))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(classify_stderr(&stderr));
        }

        // whisper names its output after the input file
        let json_path = dir.join("audio.json");
        let raw = match tokio::fs::read_to_string(&json_path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(TranscribeError::Engine(
                    "whisper exited successfully but wrote no transcript".to_string(),
                ));
            }
            Err(e) => return Err(ResourceError::io(&json_path, e).into()),
        };

        let parsed: WhisperOutput = serde_json::from_str(&raw).map_err(|e| {
            TranscribeError::Engine(format!("unreadable whisper output: {}", e))
        })?;

        if let Some(language) = &parsed.language {
            tracing::debug!("Whisper detected language: {}", language);
        }

        Ok(Transcript::new(parsed.text.trim()))
    }
}

#[async_trait]
impl Transcriber for WhisperCliTranscriber {
    async fn transcribe(
        &self,
        audio: &[u8],
        format: AudioFormat,
    ) -> Result<Transcript, TranscribeError> {
        if audio.is_empty() {
            return Err(TranscribeError::Decode("audio payload is empty".to_string()));
        }

        let scratch = utils::scratch_dir(self.scratch_base.as_deref(), "whisper")?;
        let outcome = self.run_in(audio, format, scratch.path()).await;
        utils::finish_scratch(outcome, scratch)
    }

    fn name(&self) -> &'static str {
        "whisper"
    }
}

fn classify_stderr(stderr: &str) -> TranscribeError {
    let reason = stderr
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .last()
        .unwrap_or("whisper failed without output")
        .to_string();

    let lower = stderr.to_lowercase();

    if lower.contains("failed to load audio") || lower.contains("invalid data found") {
        TranscribeError::Decode(reason)
    } else if lower.contains("available models")
        || lower.contains("checksum does not match")
        || (lower.contains("model") && lower.contains("not found"))
    {
        TranscribeError::ModelUnavailable(reason)
    } else {
        TranscribeError::Engine(reason)
    }
}
