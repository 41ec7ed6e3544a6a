use std::process::ExitCode;

use anyhow::Context;
use clap::error::ErrorKind;
use clap::Parser;
use tracing::Instrument;
use vidcron_core::config::{GlobalConfig, LogLevel};
use vidcron_core::probe::Capabilities;
use vidcron_worker::app::{self, AppError, Overrides};
use vidcron_worker::cli::{Cli, EXIT_USAGE};
use vidcron_worker::logging;

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    // --- CLI ---
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return match e.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => ExitCode::SUCCESS,
                _ => ExitCode::from(EXIT_USAGE),
            };
        }
    };

    // --- Configuration ---
    // Loaded before tracing so the config's level can seed the filter.
    let config = GlobalConfig::from_file(&cli.config);
    let level = config
        .as_ref()
        .map_or(LogLevel::default(), |config| config.log_level);

    // --- Tracing ---
    logging::init(level, cli.log_format);

    let config = match config {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(path = %cli.config.display(), error = %e, "Failed to load configuration");
            return ExitCode::from(AppError::from(e).exit_code());
        }
    };

    let run_id = uuid::Uuid::now_v7();
    let span = tracing::info_span!("run", %run_id);

    match run(&cli, config).instrument(span).await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), "Run aborted");
            let code = e.downcast_ref::<AppError>().map_or(1, AppError::exit_code);
            ExitCode::from(code)
        }
    }
}

async fn run(cli: &Cli, config: GlobalConfig) -> anyhow::Result<u8> {
    tracing::info!(
        config = %cli.config.display(),
        sources = config.sources.len(),
        "Starting run",
    );

    // --- Capabilities ---
    let capabilities = Capabilities::probe(&app::required_binaries(&config));

    // --- Ledger, discovery, scheduling ---
    let overrides = Overrides {
        max_concurrent: cli.max_concurrent,
        ledger_path: cli.ledger.clone(),
    };
    let report = app::execute(&config, capabilities, &overrides)
        .await
        .context("Run could not start")?;

    report.log_summary();
    Ok(app::report_exit_code(&report))
}
