//! Events emitted while a run progresses, and the sinks that receive them.

use parking_lot::RwLock;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc;

use super::{PipelineResult, PipelineState};

/// Checkpoint a progress event refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressStage {
    Fetch,
    Transcribe,
    Summarize,
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProgressEvent {
    pub stage: ProgressStage,
    pub percent: u8,
}

impl ProgressEvent {
    pub fn new(stage: ProgressStage, percent: u8) -> Self {
        Self {
            stage,
            percent: percent.min(100),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PipelineEvent {
    /// A run request was accepted for processing
    Started { run_id: String, locator: String },
    StateChanged {
        from: PipelineState,
        to: PipelineState,
    },
    Progress(ProgressEvent),
    /// Display title of the fetched media
    Title { title: String },
    /// Terminal outcome, emitted exactly once per run
    Finished(PipelineResult),
}

/// Receiver of pipeline events.
///
/// Called synchronously from the run; implementations must not block.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: &PipelineEvent);
}

impl<S: EventSink + ?Sized> EventSink for Arc<S> {
    fn emit(&self, event: &PipelineEvent) {
        (**self).emit(event)
    }
}

/// Discards all events
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpSink;

impl EventSink for NoOpSink {
    fn emit(&self, _event: &PipelineEvent) {}
}

/// Logs every event through `tracing`
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingSink;

impl EventSink for LoggingSink {
    fn emit(&self, event: &PipelineEvent) {
        match event {
            PipelineEvent::Started { run_id, locator } => {
                tracing::info!(run_id = %run_id, "Run started for {}", locator);
            }
            PipelineEvent::StateChanged { from, to } => {
                tracing::debug!(from = %from, to = %to, "State changed");
            }
            PipelineEvent::Progress(progress) => {
                tracing::info!(stage = ?progress.stage, percent = progress.percent, "Progress");
            }
            PipelineEvent::Title { title } => {
                tracing::info!("Title: {}", title);
            }
            PipelineEvent::Finished(PipelineResult::Success { title, .. }) => {
                tracing::info!("Run finished: {}", title);
            }
            PipelineEvent::Finished(PipelineResult::Failure {
                stage,
                kind,
                message,
            }) => {
                tracing::warn!(stage = %stage, kind = %kind, "Run failed: {}", message);
            }
            PipelineEvent::Finished(PipelineResult::Cancelled { before, reason }) => {
                tracing::warn!(stage = %before, "Run cancelled: {}", reason);
            }
        }
    }
}

/// Keeps every event in memory, mostly for tests
#[derive(Debug, Default)]
pub struct CollectingSink {
    events: RwLock<Vec<PipelineEvent>>,
}

impl CollectingSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn events(&self) -> Vec<PipelineEvent> {
        self.events.read().clone()
    }

    /// Progress events in emission order
    #[must_use]
    pub fn progress(&self) -> Vec<ProgressEvent> {
        self.events
            .read()
            .iter()
            .filter_map(|event| match event {
                PipelineEvent::Progress(progress) => Some(*progress),
                _ => None,
            })
            .collect()
    }

    /// States entered, in order
    #[must_use]
    pub fn states(&self) -> Vec<PipelineState> {
        self.events
            .read()
            .iter()
            .filter_map(|event| match event {
                PipelineEvent::StateChanged { to, .. } => Some(*to),
                _ => None,
            })
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }
}

impl EventSink for CollectingSink {
    fn emit(&self, event: &PipelineEvent) {
        self.events.write().push(event.clone());
    }
}

/// Forwards events to another task over an unbounded channel
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<PipelineEvent>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::UnboundedSender<PipelineEvent>) -> Self {
        Self { tx }
    }

    /// Create a sink together with its receiving end
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<PipelineEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }
}

impl EventSink for ChannelSink {
    fn emit(&self, event: &PipelineEvent) {
        if self.tx.send(event.clone()).is_err() {
            tracing::debug!("Event receiver dropped, discarding event");
        }
    }
}

/// Sends each event to several sinks in order
#[derive(Default)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn EventSink>>,
}

impl FanoutSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sinks.push(sink);
        self
    }
}

impl EventSink for FanoutSink {
    fn emit(&self, event: &PipelineEvent) {
        for sink in &self.sinks {
            sink.emit(event);
        }
    }
}
