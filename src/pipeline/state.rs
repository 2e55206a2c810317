use serde::Serialize;
use std::fmt;

/// Pipeline step a failure or cancellation is attributed to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Precondition,
    Fetch,
    Transcribe,
    Summarize,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Precondition => "precondition",
            Stage::Fetch => "fetch",
            Stage::Transcribe => "transcribe",
            Stage::Summarize => "summarize",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle of a single run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "stage", rename_all = "snake_case")]
pub enum PipelineState {
    Idle,
    Fetching,
    Transcribing,
    Summarizing,
    Done,
    Failed(Stage),
    Cancelled(Stage),
}

impl PipelineState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PipelineState::Done | PipelineState::Failed(_) | PipelineState::Cancelled(_)
        )
    }

    /// Stage the run is working on, if any
    pub fn active_stage(&self) -> Option<Stage> {
        match self {
            PipelineState::Fetching => Some(Stage::Fetch),
            PipelineState::Transcribing => Some(Stage::Transcribe),
            PipelineState::Summarizing => Some(Stage::Summarize),
            _ => None,
        }
    }

    /// Whether `self -> next` is an edge of the run lifecycle
    pub fn can_transition_to(&self, next: PipelineState) -> bool {
        use PipelineState::*;

        match (*self, next) {
            (Idle, Fetching) => true,
            // Rejected run request
            (Idle, Failed(Stage::Precondition)) => true,
            (Fetching, Transcribing) => true,
            (Transcribing, Summarizing) => true,
            (Summarizing, Done) => true,
            (from, Failed(stage)) | (from, Cancelled(stage)) => from.active_stage() == Some(stage),
            _ => false,
        }
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineState::Idle => f.write_str("idle"),
            PipelineState::Fetching => f.write_str("fetching"),
            PipelineState::Transcribing => f.write_str("transcribing"),
            PipelineState::Summarizing => f.write_str("summarizing"),
            PipelineState::Done => f.write_str("done"),
            PipelineState::Failed(stage) => write!(f, "failed({})", stage),
            PipelineState::Cancelled(stage) => write!(f, "cancelled({})", stage),
        }
    }
}
