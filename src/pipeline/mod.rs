//! Run orchestration.
//!
//! A run moves through fetch, transcribe and summarize strictly in order.
//! The first failure ends the run and is reported as `{stage, kind, message}`;
//! there is no partial success. Stage adapters own their temporary storage,
//! and the orchestrator drops the in-memory audio as soon as transcription
//! has finished with it.

pub mod cancel;
pub mod events;
pub mod state;

pub use cancel::CancelFlag;
pub use events::{
    ChannelSink, CollectingSink, EventSink, FanoutSink, LoggingSink, NoOpSink, PipelineEvent,
    ProgressEvent, ProgressStage,
};
pub use state::{PipelineState, Stage};

use anyhow::{Context, Result};
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::Instrument;
use uuid::Uuid;

use crate::config::{AppConfig, Config, TranscriberBackend};
use crate::error::ErrorKind;
use crate::fetch::{AudioArtifact, FetcherRegistry, MediaFetcher};
use crate::summarize::{ChatSummarizer, Summarizer, SummarizeError, Summary};
use crate::transcribe::aws::AwsTranscriber;
use crate::transcribe::whisper::WhisperCliTranscriber;
use crate::transcribe::{Transcriber, TranscribeError, Transcript};
use crate::utils;

/// Exactly one of these is produced per run
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PipelineResult {
    Success {
        title: String,
        transcript: Transcript,
        summary: Summary,
    },
    Failure {
        stage: Stage,
        kind: ErrorKind,
        message: String,
    },
    Cancelled {
        /// Stage that did not get to complete
        before: Stage,
        reason: String,
    },
}

impl PipelineResult {
    pub fn is_success(&self) -> bool {
        matches!(self, PipelineResult::Success { .. })
    }

    /// Process exit code for this outcome
    pub fn exit_code(&self) -> i32 {
        match self {
            PipelineResult::Success { .. } => 0,
            PipelineResult::Failure {
                stage: Stage::Precondition,
                ..
            } => 2,
            PipelineResult::Failure { .. } => 1,
            PipelineResult::Cancelled { .. } => 130,
        }
    }
}

/// Opaque, non-empty identifier of a remote video
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoLocator(String);

impl VideoLocator {
    /// Trim surrounding whitespace; `None` if nothing is left
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Upper bounds for the stages without an intrinsic timeout
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StageTimeouts {
    pub transcribe: Option<Duration>,
    pub summarize: Option<Duration>,
}

impl StageTimeouts {
    pub fn from_config(app: &AppConfig) -> Self {
        Self {
            transcribe: app.transcribe_timeout_seconds.map(Duration::from_secs),
            summarize: app.summarize_timeout_seconds.map(Duration::from_secs),
        }
    }
}

/// Tracks the state of one run and reports every change to the sink
struct RunTracker<'a> {
    sink: &'a dyn EventSink,
    state: PipelineState,
}

impl<'a> RunTracker<'a> {
    fn new(sink: &'a dyn EventSink) -> Self {
        Self {
            sink,
            state: PipelineState::Idle,
        }
    }

    fn advance(&mut self, next: PipelineState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "invalid transition {} -> {}",
            self.state,
            next
        );
        let from = std::mem::replace(&mut self.state, next);
        self.sink.emit(&PipelineEvent::StateChanged { from, to: next });
    }

    fn progress(&self, stage: ProgressStage, percent: u8) {
        self.sink
            .emit(&PipelineEvent::Progress(ProgressEvent::new(stage, percent)));
    }

    fn fail(&mut self, stage: Stage, kind: ErrorKind, message: impl Into<String>) -> PipelineResult {
        self.advance(PipelineState::Failed(stage));
        PipelineResult::Failure {
            stage,
            kind,
            message: message.into(),
        }
    }

    fn cancel(&mut self, before: Stage, cancel: &CancelFlag) -> PipelineResult {
        self.advance(PipelineState::Cancelled(before));
        PipelineResult::Cancelled {
            before,
            reason: cancel.reason().unwrap_or_else(|| "cancelled".to_string()),
        }
    }
}

/// Sequences fetcher, transcriber and summarizer for one locator at a time
pub struct Orchestrator {
    fetcher: Arc<dyn MediaFetcher>,
    transcriber: Arc<dyn Transcriber>,
    summarizer: Arc<dyn Summarizer>,
    sink: Arc<dyn EventSink>,
    timeouts: StageTimeouts,
}

impl Orchestrator {
    pub fn new(
        fetcher: Arc<dyn MediaFetcher>,
        transcriber: Arc<dyn Transcriber>,
        summarizer: Arc<dyn Summarizer>,
    ) -> Self {
        Self {
            fetcher,
            transcriber,
            summarizer,
            sink: Arc::new(NoOpSink),
            timeouts: StageTimeouts::default(),
        }
    }

    /// Assemble the configured adapters.
    ///
    /// The summarization API key is read from the environment here.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let scratch_base = config.app.temp_dir.clone();

        let fetcher = FetcherRegistry::from_config(&config.fetch, scratch_base.clone())
            .context("Failed to set up media fetchers")?;

        let transcriber: Arc<dyn Transcriber> = match config.transcribe.backend {
            TranscriberBackend::Whisper => Arc::new(WhisperCliTranscriber::new(
                config.transcribe.whisper_path.clone(),
                config.transcribe.model_size,
                config.transcribe.language.clone(),
                scratch_base,
            )),
            TranscriberBackend::Aws => Arc::new(AwsTranscriber::from_config(config).await),
        };

        let summarizer =
            ChatSummarizer::from_config(config).context("Failed to set up summarizer")?;

        tracing::debug!(
            fetchers = ?fetcher.list_fetchers(),
            transcriber = transcriber.name(),
            summarizer = summarizer.name(),
            model = summarizer.model(),
            "Pipeline assembled"
        );

        Ok(Self::new(Arc::new(fetcher), transcriber, Arc::new(summarizer))
            .with_timeouts(StageTimeouts::from_config(&config.app)))
    }

    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn with_timeouts(mut self, timeouts: StageTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Run the pipeline once, without cancellation
    pub async fn run(&self, locator: &str) -> PipelineResult {
        self.run_with_cancel(locator, &CancelFlag::new()).await
    }

    /// Run the pipeline once, stopping early if `cancel` is set
    pub async fn run_with_cancel(&self, locator: &str, cancel: &CancelFlag) -> PipelineResult {
        let run_id = Uuid::new_v4().simple().to_string();
        let run_id = run_id[..8].to_string();
        let span = tracing::info_span!("pipeline.run", run_id = %run_id, locator = %locator);

        async {
            self.sink.emit(&PipelineEvent::Started {
                run_id: run_id.clone(),
                locator: locator.to_string(),
            });

            let mut tracker = RunTracker::new(self.sink.as_ref());
            let result = self.execute(&mut tracker, locator, cancel).await;

            self.sink.emit(&PipelineEvent::Finished(result.clone()));
            result
        }
        .instrument(span)
        .await
    }

    async fn execute(
        &self,
        run: &mut RunTracker<'_>,
        locator: &str,
        cancel: &CancelFlag,
    ) -> PipelineResult {
        let Some(locator) = VideoLocator::parse(locator) else {
            return run.fail(
                Stage::Precondition,
                ErrorKind::Precondition,
                "video locator must not be empty",
            );
        };

        // Fetch
        run.advance(PipelineState::Fetching);
        if cancel.is_cancelled() {
            return run.cancel(Stage::Fetch, cancel);
        }

        let started = Instant::now();
        let artifact = match until_cancelled(cancel, self.fetcher.fetch(locator.as_str())).await {
            None => return run.cancel(Stage::Fetch, cancel),
            Some(Err(e)) => return run.fail(Stage::Fetch, e.kind(), e.to_string()),
            Some(Ok(artifact)) => artifact,
        };

        let AudioArtifact {
            bytes,
            title,
            format,
        } = artifact;

        tracing::info!(
            "Fetched {} of {} audio in {}",
            utils::format_file_size(bytes.len() as u64),
            format.as_str(),
            utils::format_duration(started.elapsed().as_secs_f64())
        );
        self.sink.emit(&PipelineEvent::Title {
            title: title.clone(),
        });
        run.progress(ProgressStage::Fetch, 33);

        // Transcribe
        run.advance(PipelineState::Transcribing);
        if cancel.is_cancelled() {
            return run.cancel(Stage::Transcribe, cancel);
        }

        let started = Instant::now();
        let outcome = until_cancelled(
            cancel,
            bounded(
                self.timeouts.transcribe,
                self.transcriber.transcribe(&bytes, format),
                TranscribeError::Timeout,
            ),
        )
        .await;
        // Audio is not needed past this point
        drop(bytes);

        let transcript = match outcome {
            None => return run.cancel(Stage::Transcribe, cancel),
            Some(Err(e)) => return run.fail(Stage::Transcribe, e.kind(), e.to_string()),
            Some(Ok(transcript)) => transcript,
        };

        if transcript.is_blank() {
            let e = TranscribeError::EmptyTranscript;
            return run.fail(Stage::Transcribe, e.kind(), e.to_string());
        }

        tracing::info!(
            "Transcribed {} words in {}",
            transcript.word_count(),
            utils::format_duration(started.elapsed().as_secs_f64())
        );
        run.progress(ProgressStage::Transcribe, 66);

        // Summarize
        run.advance(PipelineState::Summarizing);
        if cancel.is_cancelled() {
            return run.cancel(Stage::Summarize, cancel);
        }

        let started = Instant::now();
        let outcome = until_cancelled(
            cancel,
            bounded(
                self.timeouts.summarize,
                self.summarizer.summarize(&transcript),
                SummarizeError::Timeout,
            ),
        )
        .await;

        let summary = match outcome {
            None => return run.cancel(Stage::Summarize, cancel),
            Some(Err(e)) => return run.fail(Stage::Summarize, e.kind(), e.to_string()),
            Some(Ok(summary)) => summary,
        };

        tracing::info!(
            "Summarized with {} in {}",
            self.summarizer.name(),
            utils::format_duration(started.elapsed().as_secs_f64())
        );
        run.progress(ProgressStage::Summarize, 100);

        run.advance(PipelineState::Done);
        run.progress(ProgressStage::Done, 100);

        PipelineResult::Success {
            title,
            transcript,
            summary,
        }
    }
}

/// Await `fut` unless cancellation is requested first
async fn until_cancelled<F: Future>(cancel: &CancelFlag, fut: F) -> Option<F::Output> {
    tokio::select! {
        biased;
        output = fut => Some(output),
        _ = cancel.cancelled() => None,
    }
}

/// Apply an optional time limit to a fallible stage call
async fn bounded<F, T, E>(limit: Option<Duration>, fut: F, on_timeout: fn(u64) -> E) -> Result<T, E>
where
    F: Future<Output = Result<T, E>>,
{
    match limit {
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .unwrap_or_else(|_| Err(on_timeout(limit.as_secs()))),
        None => fut.await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::{AudioFormat, FetchError, MockMediaFetcher};
    use crate::summarize::MockSummarizer;
    use crate::transcribe::MockTranscriber;
    use async_trait::async_trait;

    const LOCATOR: &str = "https://youtu.be/demo";

    fn demo_artifact() -> Result<AudioArtifact, FetchError> {
        AudioArtifact::new(vec![0x00, 0x01], Some("Demo".to_string()), AudioFormat::Mp3)
    }

    fn orchestrator(
        fetcher: MockMediaFetcher,
        transcriber: MockTranscriber,
        summarizer: MockSummarizer,
    ) -> (Orchestrator, Arc<CollectingSink>) {
        let sink = Arc::new(CollectingSink::new());
        let orchestrator = Orchestrator::new(
            Arc::new(fetcher),
            Arc::new(transcriber),
            Arc::new(summarizer),
        )
        .with_sink(sink.clone());
        (orchestrator, sink)
    }

    fn progress_of(sink: &CollectingSink) -> Vec<(ProgressStage, u8)> {
        sink.progress()
            .into_iter()
            .map(|p| (p.stage, p.percent))
            .collect()
    }

    struct SlowTranscriber;

    #[async_trait]
    impl Transcriber for SlowTranscriber {
        async fn transcribe(
            &self,
            _audio: &[u8],
            _format: AudioFormat,
        ) -> Result<Transcript, TranscribeError> {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok(Transcript::from("too late"))
        }

        fn name(&self) -> &'static str {
            "slow"
        }
    }

    /// Fetcher that succeeds but requests cancellation while doing so
    struct CancellingFetcher {
        cancel: CancelFlag,
    }

    #[async_trait]
    impl MediaFetcher for CancellingFetcher {
        async fn fetch(&self, _locator: &str) -> Result<AudioArtifact, FetchError> {
            self.cancel.cancel("user interrupt");
            demo_artifact()
        }

        fn supports(&self, _locator: &str) -> bool {
            true
        }

        fn name(&self) -> &'static str {
            "cancelling"
        }
    }

    #[tokio::test]
    async fn test_empty_locator_is_rejected_before_any_stage() {
        let mut fetcher = MockMediaFetcher::new();
        fetcher.expect_fetch().times(0);
        let mut transcriber = MockTranscriber::new();
        transcriber.expect_transcribe().times(0);
        let mut summarizer = MockSummarizer::new();
        summarizer.expect_summarize().times(0);

        let (orchestrator, sink) = orchestrator(fetcher, transcriber, summarizer);

        for locator in ["", "   \t"] {
            let result = orchestrator.run(locator).await;
            match &result {
                PipelineResult::Failure { stage, kind, .. } => {
                    assert_eq!(*stage, Stage::Precondition);
                    assert_eq!(*kind, ErrorKind::Precondition);
                }
                other => panic!("unexpected result: {:?}", other),
            }
            assert_eq!(result.exit_code(), 2);
        }

        assert!(sink.progress().is_empty());
        assert!(matches!(sink.events()[0], PipelineEvent::Started { .. }));
        assert_eq!(sink.states()[0], PipelineState::Failed(Stage::Precondition));
    }

    #[tokio::test]
    async fn test_successful_run() {
        let mut fetcher = MockMediaFetcher::new();
        fetcher
            .expect_fetch()
            .withf(|locator| locator == LOCATOR)
            .times(1)
            .returning(|_| demo_artifact());

        let mut transcriber = MockTranscriber::new();
        transcriber
            .expect_transcribe()
            .withf(|audio, format| audio.to_vec() == vec![0x00, 0x01] && *format == AudioFormat::Mp3)
            .times(1)
            .returning(|_, _| Ok(Transcript::from("hello world")));

        let mut summarizer = MockSummarizer::new();
        summarizer
            .expect_summarize()
            .withf(|text| text.as_str() == "hello world")
            .times(1)
            .returning(|_| Ok(Summary::from("Greeting.")));
        summarizer.expect_name().return_const("mock");

        let (orchestrator, sink) = orchestrator(fetcher, transcriber, summarizer);
        let result = orchestrator.run(LOCATOR).await;

        assert_eq!(
            result,
            PipelineResult::Success {
                title: "Demo".to_string(),
                transcript: Transcript::from("hello world"),
                summary: Summary::from("Greeting."),
            }
        );
        assert_eq!(result.exit_code(), 0);

        assert_eq!(
            progress_of(&sink),
            vec![
                (ProgressStage::Fetch, 33),
                (ProgressStage::Transcribe, 66),
                (ProgressStage::Summarize, 100),
                (ProgressStage::Done, 100),
            ]
        );
        assert_eq!(
            sink.states(),
            vec![
                PipelineState::Fetching,
                PipelineState::Transcribing,
                PipelineState::Summarizing,
                PipelineState::Done,
            ]
        );

        let events = sink.events();
        assert!(events.contains(&PipelineEvent::Title {
            title: "Demo".to_string()
        }));
        assert!(matches!(events.last(), Some(PipelineEvent::Finished(r)) if r.is_success()));
    }

    #[tokio::test]
    async fn test_fetch_failure_short_circuits() {
        let mut fetcher = MockMediaFetcher::new();
        fetcher
            .expect_fetch()
            .times(1)
            .returning(|_| Err(FetchError::Network("network unreachable".to_string())));
        let mut transcriber = MockTranscriber::new();
        transcriber.expect_transcribe().times(0);
        let mut summarizer = MockSummarizer::new();
        summarizer.expect_summarize().times(0);

        let (orchestrator, sink) = orchestrator(fetcher, transcriber, summarizer);
        let result = orchestrator.run(LOCATOR).await;

        assert_eq!(
            result,
            PipelineResult::Failure {
                stage: Stage::Fetch,
                kind: ErrorKind::Network,
                message: "network unreachable".to_string(),
            }
        );
        assert_eq!(result.exit_code(), 1);
        assert!(sink.progress().is_empty());
    }

    #[tokio::test]
    async fn test_empty_transcript_is_fatal() {
        let mut fetcher = MockMediaFetcher::new();
        fetcher.expect_fetch().returning(|_| demo_artifact());
        let mut transcriber = MockTranscriber::new();
        transcriber
            .expect_transcribe()
            .times(1)
            .returning(|_, _| Ok(Transcript::from("")));
        let mut summarizer = MockSummarizer::new();
        summarizer.expect_summarize().times(0);

        let (orchestrator, sink) = orchestrator(fetcher, transcriber, summarizer);
        let result = orchestrator.run(LOCATOR).await;

        match result {
            PipelineResult::Failure { stage, kind, .. } => {
                assert_eq!(stage, Stage::Transcribe);
                assert_eq!(kind, ErrorKind::EmptyTranscript);
            }
            other => panic!("unexpected result: {:?}", other),
        }
        assert_eq!(progress_of(&sink), vec![(ProgressStage::Fetch, 33)]);
    }

    #[tokio::test]
    async fn test_transcribe_failure_is_attributed() {
        let mut fetcher = MockMediaFetcher::new();
        fetcher.expect_fetch().returning(|_| demo_artifact());
        let mut transcriber = MockTranscriber::new();
        transcriber
            .expect_transcribe()
            .returning(|_, _| Err(TranscribeError::Decode("bad header".to_string())));
        let mut summarizer = MockSummarizer::new();
        summarizer.expect_summarize().times(0);

        let (orchestrator, _sink) = orchestrator(fetcher, transcriber, summarizer);
        let result = orchestrator.run(LOCATOR).await;

        assert_eq!(
            result,
            PipelineResult::Failure {
                stage: Stage::Transcribe,
                kind: ErrorKind::Decode,
                message: "could not decode audio: bad header".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn test_summarize_failure_after_two_checkpoints() {
        let mut fetcher = MockMediaFetcher::new();
        fetcher.expect_fetch().returning(|_| demo_artifact());
        let mut transcriber = MockTranscriber::new();
        transcriber
            .expect_transcribe()
            .returning(|_, _| Ok(Transcript::from("hello world")));
        let mut summarizer = MockSummarizer::new();
        summarizer
            .expect_summarize()
            .times(1)
            .returning(|_| Err(SummarizeError::Quota("slow down".to_string())));

        let (orchestrator, sink) = orchestrator(fetcher, transcriber, summarizer);
        let result = orchestrator.run(LOCATOR).await;

        match result {
            PipelineResult::Failure { stage, kind, .. } => {
                assert_eq!(stage, Stage::Summarize);
                assert_eq!(kind, ErrorKind::Quota);
            }
            other => panic!("unexpected result: {:?}", other),
        }
        assert_eq!(
            progress_of(&sink),
            vec![(ProgressStage::Fetch, 33), (ProgressStage::Transcribe, 66)]
        );
        assert_eq!(
            sink.states().last(),
            Some(&PipelineState::Failed(Stage::Summarize))
        );
    }

    #[tokio::test]
    async fn test_transcribe_timeout() {
        let mut fetcher = MockMediaFetcher::new();
        fetcher.expect_fetch().returning(|_| demo_artifact());
        let mut summarizer = MockSummarizer::new();
        summarizer.expect_summarize().times(0);

        let orchestrator = Orchestrator::new(
            Arc::new(fetcher),
            Arc::new(SlowTranscriber),
            Arc::new(summarizer),
        )
        .with_timeouts(StageTimeouts {
            transcribe: Some(Duration::from_millis(50)),
            summarize: None,
        });

        let result = orchestrator.run(LOCATOR).await;
        match result {
            PipelineResult::Failure { stage, kind, .. } => {
                assert_eq!(stage, Stage::Transcribe);
                assert_eq!(kind, ErrorKind::Timeout);
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let mut fetcher = MockMediaFetcher::new();
        fetcher.expect_fetch().times(0);
        let (orchestrator, sink) =
            orchestrator(fetcher, MockTranscriber::new(), MockSummarizer::new());

        let cancel = CancelFlag::new();
        cancel.cancel("shutting down");

        let result = orchestrator.run_with_cancel(LOCATOR, &cancel).await;
        assert_eq!(
            result,
            PipelineResult::Cancelled {
                before: Stage::Fetch,
                reason: "shutting down".to_string(),
            }
        );
        assert_eq!(result.exit_code(), 130);
        assert!(sink.progress().is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_between_stages() {
        let cancel = CancelFlag::new();
        let mut transcriber = MockTranscriber::new();
        transcriber.expect_transcribe().times(0);
        let mut summarizer = MockSummarizer::new();
        summarizer.expect_summarize().times(0);

        let orchestrator = Orchestrator::new(
            Arc::new(CancellingFetcher {
                cancel: cancel.clone(),
            }),
            Arc::new(transcriber),
            Arc::new(summarizer),
        );

        let result = orchestrator.run_with_cancel(LOCATOR, &cancel).await;
        assert_eq!(
            result,
            PipelineResult::Cancelled {
                before: Stage::Transcribe,
                reason: "user interrupt".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn test_cancel_interrupts_running_stage() {
        let mut fetcher = MockMediaFetcher::new();
        fetcher.expect_fetch().returning(|_| demo_artifact());
        let mut summarizer = MockSummarizer::new();
        summarizer.expect_summarize().times(0);

        let orchestrator = Orchestrator::new(
            Arc::new(fetcher),
            Arc::new(SlowTranscriber),
            Arc::new(summarizer),
        );

        let cancel = CancelFlag::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            trigger.cancel("ctrl-c");
        });

        let result = tokio::time::timeout(
            Duration::from_secs(5),
            orchestrator.run_with_cancel(LOCATOR, &cancel),
        )
        .await
        .unwrap();

        assert!(matches!(
            result,
            PipelineResult::Cancelled {
                before: Stage::Transcribe,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_runs_are_independent() {
        let mut fetcher = MockMediaFetcher::new();
        fetcher.expect_fetch().times(2).returning(|_| demo_artifact());
        let mut transcriber = MockTranscriber::new();
        transcriber
            .expect_transcribe()
            .times(2)
            .returning(|_, _| Ok(Transcript::from("hello world")));
        let mut summarizer = MockSummarizer::new();
        summarizer
            .expect_summarize()
            .times(2)
            .returning(|_| Ok(Summary::from("Greeting.")));
        summarizer.expect_name().return_const("mock");

        let (orchestrator, sink) = orchestrator(fetcher, transcriber, summarizer);
        let first = orchestrator.run(LOCATOR).await;
        let second = orchestrator.run(LOCATOR).await;

        assert_eq!(first, second);
        assert_eq!(sink.progress().len(), 8);
    }

    #[test]
    fn test_result_serialization() {
        let result = PipelineResult::Failure {
            stage: Stage::Fetch,
            kind: ErrorKind::NotFound,
            message: "gone".to_string(),
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["status"], "failure");
        assert_eq!(json["stage"], "fetch");
        assert_eq!(json["kind"], "not_found");
    }

    #[test]
    fn test_locator_is_trimmed() {
        assert_eq!(
            VideoLocator::parse("  https://youtu.be/x \n").unwrap().as_str(),
            "https://youtu.be/x"
        );
        assert!(VideoLocator::parse(" ").is_none());
    }

    #[cfg(unix)]
    mod end_to_end {
        use super::*;
        use crate::config::FetchConfig;
        use crate::test_support::{write_script, FAKE_WHISPER, FAKE_YT_DLP};
        use crate::transcribe::ModelSize;

        #[tokio::test]
        async fn test_run_leaves_no_temporary_audio_behind() {
            let tools = tempfile::tempdir().unwrap();
            let scratch = tempfile::tempdir().unwrap();
            let yt_dlp = write_script(tools.path(), "yt-dlp", FAKE_YT_DLP);
            let whisper = write_script(tools.path(), "whisper", FAKE_WHISPER);

            let fetch_config = FetchConfig {
                yt_dlp_path: yt_dlp.to_string_lossy().into_owned(),
                ..FetchConfig::default()
            };
            let fetcher =
                FetcherRegistry::from_config(&fetch_config, Some(scratch.path().to_path_buf()))
                    .unwrap();
            let transcriber = WhisperCliTranscriber::new(
                whisper.to_string_lossy(),
                ModelSize::Base,
                None,
                Some(scratch.path().to_path_buf()),
            );

            let mut summarizer = MockSummarizer::new();
            summarizer
                .expect_summarize()
                .returning(|_| Ok(Summary::from("Greeting.")));
            summarizer.expect_name().return_const("mock");

            let orchestrator = Orchestrator::new(
                Arc::new(fetcher),
                Arc::new(transcriber),
                Arc::new(summarizer),
            );

            let result = orchestrator.run("https://youtu.be/abc").await;
            assert_eq!(
                result,
                PipelineResult::Success {
                    title: "Demo Title".to_string(),
                    transcript: Transcript::from("hello world"),
                    summary: Summary::from("Greeting."),
                }
            );
            assert_eq!(std::fs::read_dir(scratch.path()).unwrap().count(), 0);
        }

        #[tokio::test]
        async fn test_failed_run_leaves_no_temporary_audio_behind() {
            let tools = tempfile::tempdir().unwrap();
            let scratch = tempfile::tempdir().unwrap();
            let yt_dlp = write_script(tools.path(), "yt-dlp", FAKE_YT_DLP);
            let whisper = write_script(
                tools.path(),
                "whisper",
                "echo 'RuntimeError: Failed to load audio' >&2\nexit 1\n",
            );

            let fetch_config = FetchConfig {
                yt_dlp_path: yt_dlp.to_string_lossy().into_owned(),
                ..FetchConfig::default()
            };
            let fetcher =
                FetcherRegistry::from_config(&fetch_config, Some(scratch.path().to_path_buf()))
                    .unwrap();
            let transcriber = WhisperCliTranscriber::new(
                whisper.to_string_lossy(),
                ModelSize::Base,
                None,
                Some(scratch.path().to_path_buf()),
            );
            let mut summarizer = MockSummarizer::new();
            summarizer.expect_summarize().times(0);

            let orchestrator = Orchestrator::new(
                Arc::new(fetcher),
                Arc::new(transcriber),
                Arc::new(summarizer),
            );

            let result = orchestrator.run("https://youtu.be/abc").await;
            assert!(matches!(
                result,
                PipelineResult::Failure {
                    stage: Stage::Transcribe,
                    kind: ErrorKind::Decode,
                    ..
                }
            ));
            assert_eq!(std::fs::read_dir(scratch.path()).unwrap().count(), 0);
        }

        /// Pipeline whose whisper stand-in hangs after its scratch copy is written
        fn stalled_transcription(
            tools: &std::path::Path,
            scratch: &std::path::Path,
        ) -> Orchestrator {
            let yt_dlp = write_script(tools, "yt-dlp", FAKE_YT_DLP);
            let whisper = write_script(tools, "whisper", "exec sleep 5\n");

            let fetch_config = FetchConfig {
                yt_dlp_path: yt_dlp.to_string_lossy().into_owned(),
                ..FetchConfig::default()
            };
            let fetcher =
                FetcherRegistry::from_config(&fetch_config, Some(scratch.to_path_buf())).unwrap();
            let transcriber = WhisperCliTranscriber::new(
                whisper.to_string_lossy(),
                ModelSize::Base,
                None,
                Some(scratch.to_path_buf()),
            );
            let mut summarizer = MockSummarizer::new();
            summarizer.expect_summarize().times(0);

            Orchestrator::new(
                Arc::new(fetcher),
                Arc::new(transcriber),
                Arc::new(summarizer),
            )
        }

        #[tokio::test]
        async fn test_timed_out_run_leaves_no_temporary_audio_behind() {
            let tools = tempfile::tempdir().unwrap();
            let scratch = tempfile::tempdir().unwrap();
            let orchestrator = stalled_transcription(tools.path(), scratch.path())
                .with_timeouts(StageTimeouts {
                    transcribe: Some(Duration::from_millis(300)),
                    summarize: None,
                });

            let started = Instant::now();
            let result = orchestrator.run("https://youtu.be/abc").await;

            assert!(matches!(
                result,
                PipelineResult::Failure {
                    stage: Stage::Transcribe,
                    kind: ErrorKind::Timeout,
                    ..
                }
            ));
            assert!(started.elapsed() < Duration::from_secs(4));
            assert_eq!(std::fs::read_dir(scratch.path()).unwrap().count(), 0);
        }

        #[tokio::test]
        async fn test_cancelled_run_leaves_no_temporary_audio_behind() {
            let tools = tempfile::tempdir().unwrap();
            let scratch = tempfile::tempdir().unwrap();
            let orchestrator = stalled_transcription(tools.path(), scratch.path());

            let cancel = CancelFlag::new();
            let trigger = cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(500)).await;
                trigger.cancel("ctrl-c");
            });

            let result = orchestrator
                .run_with_cancel("https://youtu.be/abc", &cancel)
                .await;

            assert!(matches!(
                result,
                PipelineResult::Cancelled {
                    before: Stage::Transcribe,
                    ..
                }
            ));
            assert_eq!(std::fs::read_dir(scratch.path()).unwrap().count(), 0);
        }
    }
}
