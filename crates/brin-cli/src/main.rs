//! BRIN CLI - natural-language browser automation
//!
//! Usage:
//!   brin run "go to example.com and extract the page title"
//!   brin init                Write default config to .brin/config.toml

use anyhow::{Context, Result};
use brin_browser::{BrowserSession, CdpDriver};
use brin_core::{BrinConfig, RunStatus};
use brin_engine::{Engine, LlmPlanner};
use brin_llm::{AnthropicClient, Model};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "brin")]
#[command(author, version, about = "Natural-language browser automation")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one instruction against a fresh browser session
    Run {
        /// The natural-language instruction
        instruction: String,

        /// Maximum loop iterations
        #[arg(short = 'n', long)]
        steps: Option<usize>,

        /// Per-action timeout in seconds
        #[arg(long)]
        timeout: Option<u64>,

        /// Consecutive failures before aborting
        #[arg(long)]
        failure_threshold: Option<usize>,

        /// History entries kept verbatim in the prompt
        #[arg(long)]
        history_window: Option<usize>,

        /// Show the browser window instead of running headless
        #[arg(long)]
        headed: bool,

        /// Model to use (opus, sonnet, haiku)
        #[arg(short, long)]
        model: Option<CliModel>,

        /// Print the full run result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Write default configuration to .brin/config.toml
    Init {
        /// Directory to initialize (defaults to current directory)
        #[arg(default_value = ".")]
        path: PathBuf,
    },
}

/// CLI-friendly model enum
#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliModel {
    Opus,
    Sonnet,
    Haiku,
}

impl From<CliModel> for Model {
    fn from(m: CliModel) -> Self {
        match m {
            CliModel::Opus => Model::Opus,
            CliModel::Sonnet => Model::Sonnet,
            CliModel::Haiku => Model::Haiku,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Run {
            instruction,
            steps,
            timeout,
            failure_threshold,
            history_window,
            headed,
            model,
            json,
        } => {
            cmd_run(
                instruction,
                steps,
                timeout,
                failure_threshold,
                history_window,
                headed,
                model,
                json,
            )
            .await
        }
        Commands::Init { path } => cmd_init(path),
    }
}

#[allow(clippy::too_many_arguments)]
async fn cmd_run(
    instruction: String,
    steps: Option<usize>,
    timeout: Option<u64>,
    failure_threshold: Option<usize>,
    history_window: Option<usize>,
    headed: bool,
    model: Option<CliModel>,
    json: bool,
) -> Result<()> {
    let cwd = std::env::current_dir()?;
    let mut config = BrinConfig::load_or_default(&cwd)?;

    // Flag overrides on top of file/default configuration
    if let Some(steps) = steps {
        config.run.step_budget = steps;
    }
    if let Some(timeout) = timeout {
        config.run.per_action_timeout_secs = timeout;
    }
    if let Some(threshold) = failure_threshold {
        config.run.consecutive_failure_threshold = threshold;
    }
    if let Some(window) = history_window {
        config.run.history_window = window;
    }
    if headed {
        config.browser.headless = false;
    }

    let model: Model = match model {
        Some(m) => m.into(),
        None => config
            .model
            .default
            .parse()
            .map_err(|e: String| anyhow::anyhow!(e))?,
    };

    info!("Model: {}", model);

    let client = AnthropicClient::new(model)
        .with_max_attempts(config.run.llm_max_attempts)
        .with_api_key_env(&config.model.api_key_env);
    let planner = LlmPlanner::new(client);

    let session = BrowserSession::launch_with_config(config.browser.clone())
        .context("Failed to launch browser")?;
    let driver = CdpDriver::new(session, &config.run);

    let engine = Engine::new(planner, driver, config.run);

    // Ctrl-C requests cooperative cancellation; the run stops after the
    // in-flight action resolves
    let cancel = engine.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Cancellation requested");
            cancel.cancel();
        }
    });

    let result = engine.run(&instruction).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        println!();
        for line in &result.transcript {
            println!("{}", line);
        }
        if !result.data.is_empty() {
            println!("\nExtracted data:");
            for (field, value) in result.data.iter() {
                println!("  {}: {}", field, value);
            }
        }
        println!(
            "\nStatus: {} ({} steps)",
            result.status, result.steps_taken
        );
    }

    if matches!(result.status, RunStatus::Failed(_)) {
        std::process::exit(1);
    }
    Ok(())
}

fn cmd_init(path: PathBuf) -> Result<()> {
    BrinConfig::write_default(&path).context("Failed to write default config")?;
    println!("Wrote {}", path.join(".brin/config.toml").display());
    Ok(())
}
