//! transq: translate long text through the chunked job runner.

use std::io::{IsTerminal, Read, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use transq_client::{HttpTranslationClient, MockTranslationClient};
use transq_jobs::{
    defaults, split, JobStatus, QueueConfig, RunnerBuilder, RunnerConfig, TranslationClient,
};

#[derive(Parser)]
#[command(name = "transq")]
#[command(author, version, about = "Chunked, rate-limited machine translation")]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Translate a text file (or stdin) and print the result
    Translate {
        /// Source language tag (e.g. en)
        #[arg(short, long)]
        from: String,

        /// Target language tag (e.g. zh)
        #[arg(short, long)]
        to: String,

        /// Input file (default: stdin)
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Use the built-in mock backend instead of TRANSLATION_API_URL
        #[arg(long)]
        mock: bool,

        /// Suppress progress output
        #[arg(short, long)]
        quiet: bool,

        /// Print the final job status as JSON instead of the bare result
        #[arg(long)]
        json: bool,
    },

    /// Show how a text would be chunked
    Split {
        /// Input file (default: stdin)
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Maximum chunk size in characters (default: TRANSQ_MAX_CHUNK_SIZE)
        #[arg(short, long)]
        max_chunk_size: Option<usize>,
    },

    /// Print the effective queue and runner configuration as JSON
    Config,
}

fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Error: failed to start runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

// Environment variables:
//   LOG_FORMAT  - "json" or "text" (default: "text")
//   LOG_ANSI    - "true"/"false" override ANSI colors (auto-detected by default)
//   RUST_LOG    - standard env filter (default: "transq=warn,transq_jobs=warn")
fn init_tracing() {
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let log_ansi = std::env::var("LOG_ANSI")
        .ok()
        .map(|v| v == "true" || v == "1");

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "transq=warn,transq_jobs=warn".into());
    let registry = tracing_subscriber::registry().with(env_filter);

    // stdout carries the translation; logs go to stderr
    if log_format == "json" {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        let layer = tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_ansi(log_ansi.unwrap_or_else(|| std::io::stderr().is_terminal()));
        registry.with(layer).init();
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Translate {
            from,
            to,
            input,
            mock,
            quiet,
            json,
        } => cmd_translate(&from, &to, input.as_deref(), mock, quiet, json).await,
        Commands::Split {
            input,
            max_chunk_size,
        } => cmd_split(input.as_deref(), max_chunk_size),
        Commands::Config => cmd_config(),
    }
}

fn read_input(input: Option<&Path>) -> anyhow::Result<String> {
    match input {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display())),
        None => {
            let mut text = String::new();
            std::io::stdin()
                .read_to_string(&mut text)
                .context("failed to read stdin")?;
            Ok(text)
        }
    }
}

async fn cmd_translate(
    from: &str,
    to: &str,
    input: Option<&Path>,
    mock: bool,
    quiet: bool,
    json: bool,
) -> anyhow::Result<()> {
    let text = read_input(input)?;

    let client: Arc<dyn TranslationClient> = if mock {
        Arc::new(MockTranslationClient::new())
    } else {
        Arc::new(HttpTranslationClient::from_env().context("translation backend not configured")?)
    };
    debug!(backend = client.name(), "Using translation backend");

    let runner = RunnerBuilder::new(client)
        .with_queue_config(QueueConfig::from_env())
        .with_runner_config(RunnerConfig::from_env().with_enabled(true))
        .build()?;
    let service = runner.service();
    let handle = runner.start();

    let job_id = service.submit_job(&text, from, to).await?;
    let poll = defaults::millis(defaults::STATUS_POLL_INTERVAL_MS);
    let mut last_progress = None;

    let snapshot = loop {
        let status = service.get_job_status(job_id).await?;
        if !quiet && last_progress != Some(status.progress) {
            let eta = status
                .estimated_seconds_remaining
                .map(|secs| format!(", ~{}s left", secs))
                .unwrap_or_default();
            eprint!(
                "\r[{:>3}%] {} ({}/{} chunks{})   ",
                status.progress,
                status.status,
                status.completed_chunks,
                status.total_chunks,
                eta
            );
            last_progress = Some(status.progress);
        }

        if status.status.is_terminal() {
            break status;
        }
        tokio::time::sleep(poll).await;
    };
    if !quiet {
        eprintln!();
    }
    handle.shutdown().await?;

    let mut stdout = std::io::stdout().lock();
    if json {
        writeln!(stdout, "{}", serde_json::to_string_pretty(&snapshot)?)?;
    }
    match snapshot.status {
        JobStatus::Completed => {
            if !json {
                writeln!(stdout, "{}", snapshot.result.unwrap_or_default())?;
            }
            Ok(())
        }
        _ => bail!(
            "translation failed: {}",
            snapshot.error.as_deref().unwrap_or("unknown error")
        ),
    }
}

fn cmd_split(input: Option<&Path>, max_chunk_size: Option<usize>) -> anyhow::Result<()> {
    let text = read_input(input)?;
    let max_chunk_size = max_chunk_size.unwrap_or_else(|| QueueConfig::from_env().max_chunk_size);

    let mut stdout = std::io::stdout().lock();
    for (index, chunk) in split(&text, max_chunk_size).iter().enumerate() {
        writeln!(stdout, "--- chunk {} ({} chars)", index, chunk.chars().count())?;
        writeln!(stdout, "{}", chunk)?;
    }
    Ok(())
}

fn cmd_config() -> anyhow::Result<()> {
    let config = serde_json::json!({
        "queue": QueueConfig::from_env(),
        "runner": RunnerConfig::from_env(),
    });
    writeln!(std::io::stdout().lock(), "{}", serde_json::to_string_pretty(&config)?)?;
    Ok(())
}
