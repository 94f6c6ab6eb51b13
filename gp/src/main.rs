//! Guidepost - agent guidance server
//!
//! CLI entry point: serve the agent protocol on stdio, or inspect the
//! effective configuration and available doc templates.

use std::fs;
use std::path::PathBuf;

use clap::Parser;
use eyre::{Context, Result};
use tracing::info;

use guidepost::cli::{Cli, Command, OutputFormat};
use guidepost::config::Config;
use guidepost::docs::DocLibrary;

fn setup_logging(verbose: bool) -> Result<()> {
    // Stdout carries the protocol; logs go to a file, never the terminal
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("guidepost")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    let level = if verbose { tracing::Level::DEBUG } else { tracing::Level::INFO };
    let log_file = fs::File::create(log_dir.join("guidepost.log")).context("Failed to create log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (verbose: {})", verbose);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose).context("Failed to setup logging")?;

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    config.validate()?;

    info!(
        "Guidepost loaded config: docs-dir={}, workflow={}, changes={}",
        config.docs.dir.display(),
        config.workflow.enabled,
        config.changes.enabled
    );

    match cli.command {
        Some(Command::Serve) | None => guidepost::serve(config).await,
        Some(Command::Config { format }) => cmd_config(&config, format),
        Some(Command::Docs) => cmd_docs(&config),
    }
}

/// Print the effective configuration
fn cmd_config(config: &Config, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(config)?);
        }
        OutputFormat::Text => {
            print!("{}", serde_yaml::to_string(config)?);
        }
    }
    Ok(())
}

/// List the guided-doc templates in the configured directory
fn cmd_docs(config: &Config) -> Result<()> {
    let docs = DocLibrary::load(&config.docs.dir)?;
    let names = docs.names();

    if names.is_empty() {
        println!("No doc templates found in {}", config.docs.dir.display());
    } else {
        for name in names {
            println!("{}", name);
        }
    }
    Ok(())
}
