use async_trait::async_trait;
use parking_lot::Mutex;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;
use aws_sdk_transcribe::error::DisplayErrorContext;
use aws_sdk_transcribe::types::{
    LanguageCode, Media, MediaFormat, TranscriptionJob, TranscriptionJobStatus,
};
use aws_sdk_transcribe::Client as TranscribeClient;
use serde::Deserialize;
use std::future::Future;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use uuid::Uuid;

use super::{Transcriber, TranscribeError, Transcript};
use crate::config::Config;
use crate::error::ResourceError;
use crate::fetch::AudioFormat;

/// AWS Transcribe transcript document (only the parts we read)
#[derive(Debug, Deserialize)]
struct AwsTranscript {
    results: TranscriptResults,
}

#[derive(Debug, Deserialize)]
struct TranscriptResults {
    transcripts: Vec<TranscriptText>,
}

#[derive(Debug, Deserialize)]
struct TranscriptText {
    transcript: String,
}

/// Longest a single job is polled for when no stage timeout cuts it short
const JOB_DEADLINE: Duration = Duration::from_secs(4 * 60 * 60);

/// Background releases started by dropped guards
static PENDING_RELEASES: Mutex<Vec<JoinHandle<()>>> = parking_lot::const_mutex(Vec::new());

/// Wait up to `limit` for releases handed to the runtime by dropped guards.
///
/// Call before the runtime shuts down so an interrupted run still removes
/// what it staged.
pub async fn finish_pending_releases(limit: Duration) {
    let pending = std::mem::take(&mut *PENDING_RELEASES.lock());
    if pending.is_empty() {
        return;
    }

    tracing::info!("Waiting for {} staged audio release(s)", pending.len());
    let all = futures_util::future::join_all(pending);
    if tokio::time::timeout(limit, all).await.is_err() {
        tracing::warn!(
            "Staged audio release did not finish within {}s",
            limit.as_secs()
        );
    }
}

/// Holds the release of remote artifacts until it is run or the guard drops.
///
/// A timed-out or cancelled transcription drops its future mid-poll; the
/// guard then hands the release to the runtime so the staged object does
/// not outlive the run.
struct ReleaseGuard<F>
where
    F: Future<Output = Result<(), ResourceError>> + Send + 'static,
{
    release: Option<F>,
}

impl<F> ReleaseGuard<F>
where
    F: Future<Output = Result<(), ResourceError>> + Send + 'static,
{
    fn new(release: F) -> Self {
        Self {
            release: Some(release),
        }
    }

    /// Run the release inline
    async fn release(mut self) -> Result<(), ResourceError> {
        match self.release.take() {
            Some(release) => release.await,
            None => Ok(()),
        }
    }
}

impl<F> Drop for ReleaseGuard<F>
where
    F: Future<Output = Result<(), ResourceError>> + Send + 'static,
{
    fn drop(&mut self) {
        let Some(release) = self.release.take() else {
            return;
        };

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                tracing::debug!("Releasing staged audio in the background");
                let task = handle.spawn(async move {
                    if let Err(e) = release.await {
                        tracing::warn!(error = %e, "Failed to release staged audio");
                    }
                });
                PENDING_RELEASES.lock().push(task);
            }
            Err(_) => {
                tracing::warn!("No runtime available, staged audio was not released");
            }
        }
    }
}

/// Transcriber backed by AWS Transcribe.
///
/// Audio is staged in S3 under a run-unique key; the object and the job are
/// removed once the transcript has been read, the job has failed, or the
/// transcription future is dropped.
pub struct AwsTranscriber {
    s3_client: S3Client,
    transcribe_client: TranscribeClient,
    http: reqwest::Client,
    bucket: String,
    key_prefix: String,
    language: Option<String>,
}

impl AwsTranscriber {
    /// Create a transcriber using the default AWS credential chain
    pub async fn from_config(config: &Config) -> Self {
        let aws_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(config.aws_region())
            .load()
            .await;

        Self {
            s3_client: S3Client::new(&aws_config),
            transcribe_client: TranscribeClient::new(&aws_config),
            http: reqwest::Client::new(),
            bucket: config.transcribe.aws.s3_bucket.clone(),
            key_prefix: config
                .transcribe
                .aws
                .s3_key_prefix
                .clone()
                .unwrap_or_default(),
            language: config.transcribe.language.clone(),
        }
    }

    fn object_key(&self, format: AudioFormat) -> String {
        format!("{}audio_{}.{}", self.key_prefix, Uuid::new_v4(), format.as_str())
    }

    /// Upload audio to S3
    async fn upload(&self, key: &str, audio: &[u8], format: AudioFormat) -> Result<(), TranscribeError> {
        tracing::info!("Uploading audio to S3: s3://{}/{}", self.bucket, key);

        self.s3_client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(audio.to_vec()))
            .content_type(format.mime_type())
            .send()
            .await
            .map_err(|e| {
                TranscribeError::Engine(format!("failed to upload audio: {}", DisplayErrorContext(&e)))
            })?;

        Ok(())
    }

    /// Start a job, wait for it, and read back the transcript
    async fn run_job(
        &self,
        job_name: &str,
        key: &str,
        format: AudioFormat,
    ) -> Result<Transcript, TranscribeError> {
        let media_uri = format!("s3://{}/{}", self.bucket, key);
        tracing::info!("Starting transcription job: {}", job_name);

        let media = Media::builder().media_file_uri(media_uri).build();

        let mut job_builder = self
            .transcribe_client
            .start_transcription_job()
            .transcription_job_name(job_name)
            .media_format(media_format(format))
            .media(media);

        job_builder = match &self.language {
            Some(lang) => {
                tracing::info!("Using specified language: {}", lang);
                job_builder.language_code(LanguageCode::from(lang.as_str()))
            }
            None => {
                tracing::info!("Using automatic language detection");
                job_builder.identify_language(true)
            }
        };

        job_builder.send().await.map_err(|e| {
            TranscribeError::Engine(format!(
                "failed to start transcription job: {}",
                DisplayErrorContext(&e)
            ))
        })?;

        let job = self.wait_for_completion(job_name).await?;

        let uri = job
            .transcript()
            .and_then(|t| t.transcript_file_uri())
            .ok_or_else(|| TranscribeError::Engine("no transcript URI found".to_string()))?;

        let document = self.download_transcript(uri).await?;
        parse_transcript_document(&document)
    }

    /// Poll the job until it leaves the queued/in-progress states
    async fn wait_for_completion(&self, job_name: &str) -> Result<TranscriptionJob, TranscribeError> {
        let start_time = Instant::now();
        let mut check_count = 0;

        loop {
            if start_time.elapsed() >= JOB_DEADLINE {
                return Err(TranscribeError::Timeout(JOB_DEADLINE.as_secs()));
            }

            check_count += 1;
            let job = self.get_transcription_job(job_name).await?;

            match job.transcription_job_status() {
                Some(TranscriptionJobStatus::Queued) | Some(TranscriptionJobStatus::InProgress) => {
                    tracing::debug!(
                        "Transcription job {} still running ({}s elapsed, check #{})",
                        job_name,
                        start_time.elapsed().as_secs(),
                        check_count
                    );
                    sleep(poll_delay(check_count)).await;
                }
                Some(TranscriptionJobStatus::Completed) => {
                    tracing::info!(
                        "Transcription job {} completed in {}s",
                        job_name,
                        start_time.elapsed().as_secs()
                    );
                    return Ok(job);
                }
                Some(TranscriptionJobStatus::Failed) => {
                    let reason = job.failure_reason().unwrap_or("Unknown error");
                    return Err(classify_failure_reason(reason));
                }
                other => {
                    return Err(TranscribeError::Engine(format!(
                        "unexpected transcription job status: {:?}",
                        other
                    )));
                }
            }
        }
    }

    /// Get transcription job details
    async fn get_transcription_job(&self, job_name: &str) -> Result<TranscriptionJob, TranscribeError> {
        let response = self
            .transcribe_client
            .get_transcription_job()
            .transcription_job_name(job_name)
            .send()
            .await
            .map_err(|e| {
                TranscribeError::Engine(format!(
                    "failed to get transcription job status: {}",
                    DisplayErrorContext(&e)
                ))
            })?;

        response
            .transcription_job()
            .cloned()
            .ok_or_else(|| TranscribeError::Engine("transcription job not found".to_string()))
    }

    /// Download transcript JSON from the presigned URI
    async fn download_transcript(&self, uri: &str) -> Result<String, TranscribeError> {
        let response = self
            .http
            .get(uri)
            .send()
            .await
            .map_err(|e| TranscribeError::Engine(format!("failed to download transcript: {}", e)))?;

        if !response.status().is_success() {
            return Err(TranscribeError::Engine(format!(
                "failed to download transcript: HTTP {}",
                response.status()
            )));
        }

        response
            .text()
            .await
            .map_err(|e| TranscribeError::Engine(format!("failed to read transcript: {}", e)))
    }

    /// Deferred removal of the staged object and the job record
    fn staged(
        &self,
        key: &str,
        job_name: &str,
    ) -> ReleaseGuard<impl Future<Output = Result<(), ResourceError>> + Send + 'static> {
        ReleaseGuard::new(release_remote(
            self.s3_client.clone(),
            self.transcribe_client.clone(),
            self.bucket.clone(),
            key.to_string(),
            job_name.to_string(),
        ))
    }
}

/// Remove the staged object and the job record
async fn release_remote(
    s3_client: S3Client,
    transcribe_client: TranscribeClient,
    bucket: String,
    key: String,
    job_name: String,
) -> Result<(), ResourceError> {
    if let Err(e) = transcribe_client
        .delete_transcription_job()
        .transcription_job_name(&job_name)
        .send()
        .await
    {
        tracing::warn!(
            "Failed to delete transcription job {}: {}",
            job_name,
            DisplayErrorContext(&e)
        );
    }

    tracing::debug!("Cleaning up S3 object: {}", key);
    s3_client
        .delete_object()
        .bucket(&bucket)
        .key(&key)
        .send()
        .await
        .map_err(|e| ResourceError::RemoteRelease {
            location: format!("s3://{}/{}", bucket, key),
            reason: DisplayErrorContext(&e).to_string(),
        })?;

    Ok(())
}

#[async_trait]
impl Transcriber for AwsTranscriber {
    async fn transcribe(
        &self,
        audio: &[u8],
        format: AudioFormat,
    ) -> Result<Transcript, TranscribeError> {
        if audio.is_empty() {
            return Err(TranscribeError::Decode("audio payload is empty".to_string()));
        }

        let key = self.object_key(format);
        let job_name = format!("vidsum_{}", Uuid::new_v4());

        // Nothing to release if the upload itself failed
        self.upload(&key, audio, format).await?;
        let staged = self.staged(&key, &job_name);

        let outcome = self.run_job(&job_name, &key, format).await;
        match (outcome, staged.release().await) {
            (Ok(transcript), Ok(())) => Ok(transcript),
            (Ok(_), Err(release)) => Err(release.into()),
            (Err(err), Ok(())) => Err(err),
            (Err(err), Err(release)) => {
                tracing::warn!(error = %release, "Failed to release staged audio");
                Err(err)
            }
        }
    }

    fn name(&self) -> &'static str {
        "aws-transcribe"
    }
}

fn media_format(format: AudioFormat) -> MediaFormat {
    match format {
        AudioFormat::Mp3 => MediaFormat::Mp3,
        AudioFormat::M4a => MediaFormat::Mp4,
        AudioFormat::Wav => MediaFormat::Wav,
        AudioFormat::Flac => MediaFormat::Flac,
        AudioFormat::Ogg | AudioFormat::Opus => MediaFormat::Ogg,
        AudioFormat::Webm => MediaFormat::Webm,
    }
}

/// Wait before the next status check (linear backoff capped at 30 seconds)
fn poll_delay(check_count: u64) -> Duration {
    let seconds = std::cmp::min(5 + check_count.saturating_sub(1) * 2, 30);
    Duration::from_secs(seconds)
}

fn classify_failure_reason(reason: &str) -> TranscribeError {
    let lower = reason.to_lowercase();
    if lower.contains("media") || lower.contains("format") || lower.contains("sample rate") {
        TranscribeError::Decode(reason.to_string())
    } else {
        TranscribeError::Engine(format!("transcription job failed: {}", reason))
    }
}

fn parse_transcript_document(document: &str) -> Result<Transcript, TranscribeError> {
    let parsed: AwsTranscript = serde_json::from_str(document)
        .map_err(|e| TranscribeError::Engine(format!("failed to parse transcript JSON: {}", e)))?;

    let text = parsed
        .results
        .transcripts
        .into_iter()
        .next()
        .map(|t| t.transcript)
        .unwrap_or_default();

    Ok(Transcript::new(text.trim()))
}
