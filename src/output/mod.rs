use anyhow::{Context, Result};
use std::path::Path;

use crate::cli::OutputFormat;
use crate::pipeline::PipelineResult;

pub mod formatters;
pub mod progress;

pub use formatters::*;
pub use progress::ProgressReporter;

/// Render a run outcome in the requested format.
///
/// Text and markdown only describe successful runs; failures are reported
/// on stderr by the caller. JSON covers every outcome.
pub fn render(
    locator: &str,
    result: &PipelineResult,
    format: OutputFormat,
    show_transcript: bool,
) -> Result<Option<String>> {
    let content = match (format, result) {
        (OutputFormat::Json, result) => Some(format_as_json(locator, result)?),
        (
            OutputFormat::Text,
            PipelineResult::Success {
                title,
                transcript,
                summary,
            },
        ) => Some(format_as_text(title, transcript, summary, show_transcript)),
        (
            OutputFormat::Markdown,
            PipelineResult::Success {
                title,
                transcript,
                summary,
            },
        ) => Some(format_as_markdown(title, transcript, summary)),
        _ => None,
    };

    Ok(content)
}

/// Save rendered output to file
pub fn save_to_file(content: &str, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs_err::create_dir_all(parent)?;
        }
    }

    fs_err::write(path, content).context("Failed to write output file")?;
    Ok(())
}

/// Print rendered output to console
pub fn print_to_console(content: &str) {
    println!("{}", content.trim_end());
}
