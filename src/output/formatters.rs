use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::pipeline::PipelineResult;
use crate::summarize::Summary;
use crate::transcribe::Transcript;

/// JSON document written for `--format json`
#[derive(Debug, Serialize)]
pub struct Report<'a> {
    pub locator: &'a str,
    pub generated_at: DateTime<Utc>,
    #[serde(flatten)]
    pub result: &'a PipelineResult,
}

/// Format as plain text
pub fn format_as_text(
    title: &str,
    transcript: &Transcript,
    summary: &Summary,
    show_transcript: bool,
) -> String {
    let mut output = String::new();

    output.push_str(&format!("Title: {}\n\n", title));
    output.push_str("Summary:\n");
    output.push_str(summary.as_str());
    output.push('\n');

    if show_transcript {
        output.push_str("\nTranscript:\n");
        output.push_str(transcript.as_str());
        output.push('\n');
    }

    output
}

/// Format as a markdown document, transcript included
pub fn format_as_markdown(title: &str, transcript: &Transcript, summary: &Summary) -> String {
    let mut output = String::new();

    output.push_str(&format!("# {}\n\n", title));
    output.push_str("## Summary\n\n");
    output.push_str(summary.as_str());
    output.push_str("\n\n## Transcript\n\n");
    output.push_str(transcript.as_str());
    output.push('\n');

    output
}

/// Format as JSON
pub fn format_as_json(locator: &str, result: &PipelineResult) -> Result<String> {
    let report = Report {
        locator,
        generated_at: Utc::now(),
        result,
    };

    Ok(serde_json::to_string_pretty(&report)?)
}
