use console::style;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

use crate::pipeline::{EventSink, PipelineEvent, PipelineResult, PipelineState};

/// Terminal progress bar driven by pipeline events
pub struct ProgressReporter {
    bar: ProgressBar,
}

impl ProgressReporter {
    pub fn new(quiet: bool) -> Self {
        let bar = if quiet {
            ProgressBar::hidden()
        } else {
            let bar = ProgressBar::with_draw_target(Some(100), ProgressDrawTarget::stderr());
            bar.set_style(
                ProgressStyle::default_bar()
                    .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos:>3}% {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_bar())
                    .progress_chars("=>-"),
            );
            bar.enable_steady_tick(std::time::Duration::from_millis(120));
            bar
        };

        Self { bar }
    }

    pub fn position(&self) -> u64 {
        self.bar.position()
    }
}

impl EventSink for ProgressReporter {
    fn emit(&self, event: &PipelineEvent) {
        match event {
            PipelineEvent::Started { .. } => {
                self.bar.set_position(0);
                self.bar.set_message("Starting...");
            }
            PipelineEvent::StateChanged { to, .. } => match to {
                PipelineState::Fetching => self.bar.set_message("Downloading audio..."),
                PipelineState::Transcribing => self.bar.set_message("Transcribing audio..."),
                PipelineState::Summarizing => self.bar.set_message("Generating summary..."),
                _ => {}
            },
            PipelineEvent::Progress(progress) => {
                self.bar.set_position(u64::from(progress.percent));
            }
            PipelineEvent::Title { title } => {
                self.bar
                    .println(format!("{} {}", style("Title:").bold(), style(title).cyan()));
            }
            PipelineEvent::Finished(PipelineResult::Success { .. }) => {
                self.bar
                    .finish_with_message(style("Done").green().to_string());
            }
            PipelineEvent::Finished(PipelineResult::Failure { stage, .. }) => {
                self.bar
                    .abandon_with_message(style(format!("Failed during {}", stage)).red().to_string());
            }
            PipelineEvent::Finished(PipelineResult::Cancelled { .. }) => {
                self.bar
                    .abandon_with_message(style("Cancelled").yellow().to_string());
            }
        }
    }
}
