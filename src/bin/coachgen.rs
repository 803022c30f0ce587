//! coachgen CLI Binary
//!
//! Command-line interface for status-tracked AI coaching generation.

use anyhow::Context;
use clap::Parser;
use coachgen::cli::{map_error, Cli, RunContext};
use coachgen::config::ConfigLoader;
use coachgen::logging::{init_logging, LoggingConfig};
use std::process;
use tracing::{error, info};

fn main() {
    let cli = Cli::parse();

    // Build logging config from CLI args, env vars, and config file
    let logging_config = build_logging_config(&cli);

    if let Err(e) = init_logging(Some(&logging_config)) {
        eprintln!("Failed to initialize logging: {}", e);
        process::exit(1);
    }

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")
    {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("{:#}", e);
            process::exit(1);
        }
    };

    let code = runtime.block_on(run(cli));
    process::exit(code);
}

async fn run(cli: Cli) -> i32 {
    info!("coachgen CLI starting");

    let context = match RunContext::new(cli.workspace.clone(), cli.config.clone(), cli.caller.clone())
    {
        Ok(ctx) => ctx,
        Err(e) => {
            error!("Error initializing workspace: {}", e);
            eprintln!("{}", map_error(&e));
            return 1;
        }
    };

    let code = match context.execute(&cli.command).await {
        Ok(output) => {
            println!("{}", output);
            0
        }
        Err(e) => {
            error!("Command failed: {}", e);
            eprintln!("{}", map_error(&e));
            1
        }
    };

    // Runs started without --wait still finish and persist before exit.
    context.drain().await;
    code
}

/// Build logging configuration from CLI args, environment, and config file.
/// Precedence: CLI flags override config file override defaults.
fn build_logging_config(cli: &Cli) -> LoggingConfig {
    let mut config = ConfigLoader::load_with_override(&cli.workspace, cli.config.as_deref())
        .ok()
        .map(|c| c.logging)
        .unwrap_or_default();

    if cli.verbose {
        config.level = "debug".to_string();
    }
    if let Some(ref level) = cli.log_level {
        config.level = level.clone();
    }
    if let Some(ref format) = cli.log_format {
        config.format = format.clone();
    }
    if let Some(ref output) = cli.log_output {
        config.output = output.clone();
    }
    if let Some(ref file) = cli.log_file {
        config.file = file.clone();
    }
    if config.file.is_relative() {
        config.file = cli.workspace.join(&config.file);
    }

    config
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_logging_config_default() {
        let temp = tempfile::tempdir().unwrap();
        let ws = temp.path().to_string_lossy();
        let cli =
            Cli::try_parse_from(["coachgen", "--workspace", ws.as_ref(), "athlete", "list"]).unwrap();
        let config = build_logging_config(&cli);
        assert_eq!(config.output, "stderr");
        assert_eq!(config.level, "info");
        assert!(config.file.starts_with(temp.path()));
    }

    #[test]
    fn test_build_logging_config_verbose() {
        let temp = tempfile::tempdir().unwrap();
        let ws = temp.path().to_string_lossy();
        let cli = Cli::try_parse_from([
            "coachgen",
            "--workspace",
            ws.as_ref(),
            "--verbose",
            "athlete",
            "list",
        ])
        .unwrap();
        assert_eq!(build_logging_config(&cli).level, "debug");
    }

    #[test]
    fn test_explicit_log_level_wins_over_verbose() {
        let temp = tempfile::tempdir().unwrap();
        let ws = temp.path().to_string_lossy();
        let cli = Cli::try_parse_from([
            "coachgen",
            "--workspace",
            ws.as_ref(),
            "--verbose",
            "--log-level",
            "warn",
            "--log-output",
            "file",
            "job",
            "list",
        ])
        .unwrap();
        let config = build_logging_config(&cli);
        assert_eq!(config.level, "warn");
        assert_eq!(config.output, "file");
    }
}
