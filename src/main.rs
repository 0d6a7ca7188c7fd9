use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod core;
mod detector;
mod notify;
mod parser;
mod tail;

use crate::core::Watcher;

#[derive(Parser)]
#[command(name = "poolwatch")]
#[command(version, about = "Access-log watcher with failover detection and Slack alerting", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path (YAML); falls back to environment variables
    #[arg(long, global = true)]
    config: Option<String>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "info")]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Tail the access log and alert on failover, recovery and error rate
    Watch,

    /// Parse a log file and print the records as JSON (format check)
    Parse {
        /// Log file to read; one record per matched line
        file: String,

        /// Also print records without a usable pool
        #[arg(long)]
        all: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| cli.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    // One sequential processing loop; a single thread is all it needs
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async_main(cli))
}

async fn async_main(cli: Cli) -> Result<()> {
    let config = config::load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Watch => run_watch(config).await,
        Commands::Parse { file, all } => run_parse(&file, all),
    }
}

/// Run the watcher until a fatal error or an interrupt
///
/// An interrupt is a graceful stop (exit 0); any error out of the loop is
/// fatal and surfaces as a non-zero exit.
async fn run_watch(config: config::Config) -> Result<()> {
    let mut watcher = Watcher::new(config);

    tokio::select! {
        result = watcher.run() => {
            if let Err(ref err) = result {
                error!(error = %err, "watcher terminated");
            }
            result
        }
        _ = tokio::signal::ctrl_c() => {
            info!("interrupt received, exiting");
            Ok(())
        }
    }
}

/// Parse every line of `file` through the parser chain and print JSON
fn run_parse(file: &str, all: bool) -> Result<()> {
    let content =
        std::fs::read_to_string(file).context(format!("Failed to read log file: {}", file))?;

    let chain = parser::ParserChain::new();
    let mut matched = 0usize;
    let mut skipped = 0usize;

    for line in content.lines() {
        match chain.parse(line) {
            Some(record) if record.has_pool() || all => {
                matched += 1;
                println!("{}", serde_json::to_string(&record)?);
            }
            Some(_) => skipped += 1,
            None => skipped += 1,
        }
    }

    info!(matched, skipped, "parse finished");
    Ok(())
}
