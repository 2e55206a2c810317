use anyhow::Result;
use clap::Parser;
use console::style;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use video_summarizer::cli::{Cli, Commands, LogFormat, Overrides};
use video_summarizer::config::Config;
use video_summarizer::output::{self, ProgressReporter};
use video_summarizer::pipeline::{
    CancelFlag, FanoutSink, LoggingSink, Orchestrator, PipelineResult, VideoLocator,
};
use video_summarizer::transcribe;
use video_summarizer::utils;

/// Exit code for problems detected before any stage runs
const EXIT_PRECONDITION: u8 = 2;

/// How long an interrupted run waits for remote staged audio to be deleted
const RELEASE_GRACE: Duration = Duration::from_secs(15);

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_format);

    match run(cli).await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("{} {:#}", style("Error:").red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: bool, format: LogFormat) {
    let default_filter = if verbose {
        "video_summarizer=debug"
    } else {
        "video_summarizer=info"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter.into());

    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Pretty => registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init(),
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init(),
    }
}

async fn run(cli: Cli) -> Result<u8> {
    match cli.command {
        Commands::Summarize {
            locator,
            output,
            format,
            provider,
            model_size,
            backend,
            no_verify_tls,
            cookies,
            show_transcript,
        } => {
            // Nothing is loaded or spawned for a request that cannot run
            if VideoLocator::parse(&locator).is_none() {
                eprintln!("{} video locator must not be empty", style("Error:").red().bold());
                return Ok(EXIT_PRECONDITION);
            }

            let overrides = Overrides {
                provider,
                model_size,
                backend,
                no_verify_tls,
                cookies,
            };

            let config = match load_config(cli.config.as_deref(), &overrides).await {
                Ok(config) => config,
                Err(e) => {
                    eprintln!("{} {:#}", style("Configuration error:").red().bold(), e);
                    return Ok(EXIT_PRECONDITION);
                }
            };

            // Non-fatal, the tools may still be reachable at run time
            let missing_deps = utils::check_dependencies(&config).await;
            for dep in &missing_deps {
                tracing::warn!("Dependency check: {} not found", dep);
            }

            let orchestrator = match Orchestrator::from_config(&config).await {
                Ok(orchestrator) => orchestrator,
                Err(e) => {
                    eprintln!("{} {:#}", style("Error:").red().bold(), e);
                    return Ok(EXIT_PRECONDITION);
                }
            };

            let sink = FanoutSink::new()
                .with(Arc::new(ProgressReporter::new(cli.quiet)))
                .with(Arc::new(LoggingSink));
            let orchestrator = orchestrator.with_sink(Arc::new(sink));

            let cancel = CancelFlag::new();
            {
                let cancel = cancel.clone();
                tokio::spawn(async move {
                    if tokio::signal::ctrl_c().await.is_ok() {
                        cancel.cancel("interrupted by user");
                    }
                });
            }

            let result = orchestrator.run_with_cancel(&locator, &cancel).await;
            transcribe::aws::finish_pending_releases(RELEASE_GRACE).await;

            match &result {
                PipelineResult::Failure {
                    stage,
                    kind,
                    message,
                } => {
                    eprintln!(
                        "{} {} stage failed ({}): {}",
                        style("Error:").red().bold(),
                        stage,
                        kind,
                        message
                    );
                }
                PipelineResult::Cancelled { before, reason } => {
                    eprintln!(
                        "{} before {} completed: {}",
                        style("Cancelled").yellow().bold(),
                        before,
                        reason
                    );
                }
                PipelineResult::Success { .. } => {}
            }

            if let Some(content) = output::render(&locator, &result, format, show_transcript)? {
                match output {
                    Some(path) => {
                        output::save_to_file(&content, &path)?;
                        eprintln!("Summary saved to: {}", path.display());
                    }
                    None => output::print_to_console(&content),
                }
            }

            Ok(u8::try_from(result.exit_code()).unwrap_or(1))
        }
        Commands::Config { show, path } => {
            if path {
                println!("{}", Config::config_path(cli.config.as_deref())?.display());
            }
            if show || !path {
                let config = Config::load(cli.config.as_deref()).await?;
                config.display();
            }
            Ok(0)
        }
        Commands::Check => {
            let config = Config::load(cli.config.as_deref()).await?;
            let missing_deps = utils::check_dependencies(&config).await;
            let api_key_env = config.api_key_env();
            let has_key = std::env::var(&api_key_env).is_ok_and(|key| !key.trim().is_empty());

            for dep in &missing_deps {
                println!("{} {}", style("✗").red(), dep);
            }
            if missing_deps.is_empty() {
                println!("{} All external tools found", style("✓").green());
            }

            if has_key {
                println!("{} {} is set", style("✓").green(), api_key_env);
            } else {
                println!("{} {} is not set", style("✗").red(), api_key_env);
            }

            Ok(if missing_deps.is_empty() && has_key { 0 } else { 1 })
        }
    }
}

async fn load_config(path: Option<&std::path::Path>, overrides: &Overrides) -> Result<Config> {
    let mut config = Config::load(path).await?;
    overrides.apply(&mut config);
    config.validate()?;
    Ok(config)
}
