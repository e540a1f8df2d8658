use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use dotenvy::dotenv;

use tweet_relay::cli::Cli;
use tweet_relay::config::Config;
use tweet_relay::coordinator::Pipeline;
use tweet_relay::error::AppError;
use tweet_relay::logging::{init_logging, LogFormat};
use tweet_relay::metrics::AppMetrics;
use tweet_relay::scheduler::{run_daemon, run_once, RunPlan};

#[tokio::main]
async fn main() -> ExitCode {
    dotenv().ok();
    init_logging(LogFormat::from_env());

    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!("{}", err);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), AppError> {
    let config = Config::load(&cli)?;
    tracing::info!("Relay started with config: {:?}", config);

    let metrics = Arc::new(AppMetrics::new()?);
    let pipeline = Arc::new(Pipeline::from_config(&config, metrics)?);
    let plan = RunPlan {
        accounts: config.accounts.clone(),
        metrics_textfile: config.metrics_textfile.clone(),
    };

    if cli.daemon {
        run_daemon(pipeline, plan, config.poll_interval_seconds).await;
    } else {
        run_once(&pipeline, &plan).await;
    }

    Ok(())
}
