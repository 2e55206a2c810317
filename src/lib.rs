//! Video Summarizer - turn a video into a transcript and a short summary
//!
//! The library runs a three-stage pipeline: audio extraction (yt-dlp, direct
//! HTTP or local files), speech-to-text (Whisper CLI or AWS Transcribe), and
//! summarization through an OpenAI-compatible chat endpoint. Progress and
//! results are reported through an [`pipeline::EventSink`].

pub mod cli;
pub mod config;
pub mod error;
pub mod fetch;
pub mod output;
pub mod pipeline;
pub mod summarize;
pub mod transcribe;
pub mod utils;

#[cfg(test)]
mod test_support;

pub use cli::{Cli, Commands, OutputFormat};
pub use config::Config;
pub use error::{ErrorKind, ResourceError};
pub use fetch::{AudioArtifact, FetchError, MediaFetcher};
pub use pipeline::{CancelFlag, EventSink, Orchestrator, PipelineResult, Stage};
pub use summarize::{SummarizeError, Summarizer, Summary};
pub use transcribe::{TranscribeError, Transcriber, Transcript};

/// Result type used throughout the library
pub type Result<T> = anyhow::Result<T>;
