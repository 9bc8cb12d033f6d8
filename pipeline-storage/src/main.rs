mod cli;
mod config;
mod observability;

use cli::{Cli, CliCommand, CliError};
use config::Config;
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = Cli::parse_checked();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "pipeline-storage failed");
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    match cli.command {
        CliCommand::Serve { config_file } => {
            let config = Config::from_file(&config_file)?;
            let _sentry = observability::init_logging(config.common.logging.as_ref())?;
            if let Some(metrics) = &config.common.metrics {
                observability::init_metrics(metrics)?;
            }

            tracing::info!(config = %config_file.display(), "starting trigger");
            runtime()?.block_on(upsert::run(config.trigger))?;
        }
        CliCommand::Update(args) => {
            observability::init_logging(None)?;
            runtime()?.block_on(cli::update(args))?;
        }
        CliCommand::List(args) => {
            observability::init_logging(None)?;
            runtime()?.block_on(cli::list(args))?;
        }
    }

    Ok(())
}

fn runtime() -> Result<tokio::runtime::Runtime, std::io::Error> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
}
