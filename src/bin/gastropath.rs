use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{error, info};

use gastropath::{init_tracing, AppConfig, Pipeline, RunLog};

#[derive(Parser, Debug)]
#[command(name = "gastropath")]
#[command(about = "Enrich restaurant rows in a Notion database from Google Maps")]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    #[command(about = "Enrich every row whose title ends with ';' (default)")]
    Batch,
    #[command(about = "Create a new row from a restaurant name or Google Maps link")]
    Add {
        #[arg(value_name = "NAME_OR_LINK")]
        input: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    init_tracing();
    let args = Args::parse();
    let config = AppConfig::from_env();
    info!(profile = ?config.public_profile(), "loaded configuration");

    let run_log = RunLog::open(&config.run_log_dir, &config)
        .with_context(|| format!("failed to open run log in {}", config.run_log_dir.display()))?;
    info!(run_id = run_log.run_id(), path = %run_log.path().display(), "run log ready");
    let pipeline = Pipeline::from_config(&config, run_log).context("failed to build pipeline")?;

    match args.command.unwrap_or(Command::Batch) {
        Command::Batch => {
            let report = pipeline.run_batch().await.context("batch run failed")?;
            println!(
                "discovered {}, enriched {}, failed {}, skipped {}",
                report.discovered, report.done, report.failed, report.skipped
            );
            Ok(ExitCode::SUCCESS)
        }
        Command::Add { input } => match pipeline.run_single(&input).await {
            Ok(action) => {
                println!("{} row for {}", action.as_str(), input.trim());
                Ok(ExitCode::SUCCESS)
            }
            Err(err) => {
                error!(?err, input = %input, "failed to add restaurant");
                eprintln!("failed to add {}: {err}", input.trim());
                Ok(ExitCode::FAILURE)
            }
        },
    }
}
