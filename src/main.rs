use std::process::ExitCode;

use anyhow::Context as _;
use clap::Parser as _;

fn main() -> ExitCode {
    if let Err(err) = try_main() {
        eprintln!("{err:#}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

fn try_main() -> anyhow::Result<()> {
    let dotenv = dotenvy::dotenv();

    let cli = kdrama_pipeline::cli::Cli::parse();
    kdrama_pipeline::logging::init(cli.log_format).context("init logging")?;
    if let Ok(path) = dotenv {
        tracing::debug!(path = %path.display(), "loaded environment file");
    }
    tracing::debug!(?cli, "parsed cli");

    match cli.command {
        kdrama_pipeline::cli::Command::Run(args) => {
            kdrama_pipeline::pipeline::run(args).context("run")?;
        }
        kdrama_pipeline::cli::Command::Ingest(args) => {
            kdrama_pipeline::ingest::run(args).context("ingest")?;
        }
        kdrama_pipeline::cli::Command::Normalize(args) => {
            kdrama_pipeline::normalize::run(args).context("normalize")?;
        }
        kdrama_pipeline::cli::Command::Aggregate(args) => {
            kdrama_pipeline::aggregate::run(args).context("aggregate")?;
        }
        kdrama_pipeline::cli::Command::Report(args) => {
            kdrama_pipeline::report::run(args).context("report")?;
        }
    }

    Ok(())
}
