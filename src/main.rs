//! Main entry point for the presetsync CLI.

use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use tracing::error;

use presetsync::{Cli, Pipeline, PipelineError, logging};

const EXIT_TOOLING_MISSING: u8 = 2;
const EXIT_NOTHING_COLLECTED: u8 = 3;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init(cli.log_level());

    match run(&cli).await {
        Ok(code) => code,
        Err(err) => {
            error!("{err:#}");
            match err.downcast_ref::<PipelineError>() {
                Some(PipelineError::ToolingMissing(_)) => ExitCode::from(EXIT_TOOLING_MISSING),
                _ => ExitCode::FAILURE,
            }
        }
    }
}

async fn run(cli: &Cli) -> Result<ExitCode> {
    let registry = cli.registry()?;

    if cli.list_sources {
        for source in &registry {
            println!("{}\t{}", source.id(), source.origin());
        }
        return Ok(ExitCode::SUCCESS);
    }

    let pipeline = Pipeline::new(cli.settings()?);
    let summary = pipeline.run(&registry).await?;
    print!("{summary}");

    if summary.total_assets() == 0 && cli.fail_on_empty {
        return Ok(ExitCode::from(EXIT_NOTHING_COLLECTED));
    }
    Ok(ExitCode::SUCCESS)
}
