//! Arbiter CLI
//!
//! Drives the execution core the way a submission service would and prints
//! its responses as JSON.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use arbiter::{
    BoxPool, Config, EXAMPLE_CONFIG, ExecuteError, ExecuteRequest, Executor, LanguageRegistry,
    sweep,
};
use clap::{Parser, Subcommand};
use serde_json::json;
use tracing::{Level, debug, info};
use tracing_subscriber::EnvFilter;

/// Exit status when the core reports an error rather than a verdict
const ERROR_EXIT: u8 = 2;

#[derive(Parser)]
#[command(name = "arbiter")]
#[command(about = "Run untrusted code submissions in isolate sandboxes")]
#[command(version)]
struct Cli {
    /// Path to configuration file (default: embedded example)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write the example configuration file
    Init {
        #[arg(short, long, default_value = "arbiter.toml")]
        output: PathBuf,

        /// Overwrite existing file
        #[arg(short, long)]
        force: bool,
    },

    /// Execute a submission and print the response as JSON
    Run {
        /// Source file to run
        #[arg(value_name = "FILE")]
        source: PathBuf,

        /// Language ID (e.g. python, cpp)
        #[arg(short, long)]
        language: String,

        /// File fed to the program's stdin
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// File holding the expected output
        #[arg(short, long)]
        expected: Option<PathBuf>,
    },

    /// List registered languages
    Languages,

    /// Print the effective configuration as JSON
    ShowConfig,

    /// Clean up every sandbox this configuration owns
    Reap,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::from_default_env().add_directive(Level::DEBUG.into())
    } else {
        EnvFilter::from_default_env().add_directive(Level::INFO.into())
    };

    // Logs go to stderr so stdout stays valid JSON
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Init { output, force } => {
            init_config(&output, force).await?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Run {
            source,
            language,
            input,
            expected,
        } => {
            let config = load_config(cli.config.as_deref())?;
            run_submission(
                config,
                &source,
                language,
                input.as_deref(),
                expected.as_deref(),
            )
            .await
        }
        Commands::Languages => {
            list_languages(&load_config(cli.config.as_deref())?);
            Ok(ExitCode::SUCCESS)
        }
        Commands::ShowConfig => {
            let config = load_config(cli.config.as_deref())?;
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(ExitCode::SUCCESS)
        }
        Commands::Reap => {
            let pool = BoxPool::from_config(&load_config(cli.config.as_deref())?);
            let cleaned = sweep(&pool).await;
            println!("{}", json!({ "cleaned": cleaned, "total": pool.capacity() }));
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => info!(?path, "loading configuration"),
        None => debug!("using embedded configuration"),
    }
    Config::load(path).context("failed to load configuration")
}

async fn read_text(path: &Path, what: &str) -> Result<String> {
    tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read {what} file '{}'", path.display()))
}

async fn run_submission(
    config: Config,
    source: &Path,
    language: String,
    input: Option<&Path>,
    expected: Option<&Path>,
) -> Result<ExitCode> {
    let source_code = read_text(source, "source").await?;
    let stdin = match input {
        Some(path) => Some(read_text(path, "input").await?),
        None => None,
    };
    let expected_output = match expected {
        Some(path) => Some(read_text(path, "expected output").await?),
        None => None,
    };

    let executor = Executor::start(config).await;
    let request = ExecuteRequest {
        language,
        source_code,
        stdin,
        expected_output,
    };

    match executor.execute(request).await {
        Ok(response) => {
            println!("{}", serde_json::to_string_pretty(&response)?);
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            print_error(&e)?;
            Ok(ExitCode::from(ERROR_EXIT))
        }
    }
}

fn print_error(error: &ExecuteError) -> Result<()> {
    let body = json!({
        "error": error.kind(),
        "message": error.to_string(),
        "retryable": error.is_retryable(),
    });
    println!("{}", serde_json::to_string_pretty(&body)?);
    Ok(())
}

fn list_languages(config: &Config) {
    let registry = LanguageRegistry::from_config(config);

    println!("Available languages:\n");

    for id in registry.ids() {
        let Ok(spec) = registry.resolve(id) else {
            continue;
        };
        let kind = if spec.is_compiled() {
            "compiled"
        } else {
            "interpreted"
        };
        println!("  {:<15} {} ({})", id, spec.name, kind);
    }
}

async fn init_config(output: &Path, force: bool) -> Result<()> {
    if output.exists() && !force {
        anyhow::bail!(
            "Configuration file already exists at '{}'. Use --force to overwrite.",
            output.display()
        );
    }

    tokio::fs::write(output, EXAMPLE_CONFIG)
        .await
        .context("failed to write configuration file")?;

    println!("Created configuration file at '{}'", output.display());
    Ok(())
}
