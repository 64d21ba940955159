mod config;

use clap::{Args, Parser};
use config::{CommonConfig, Config};
use metrics_exporter_statsd::StatsdBuilder;
use std::path::PathBuf;
use std::process;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

#[derive(Parser)]
enum CliCommand {
    /// Serve the rating API
    RatingApi(CliArgs),
    /// Load and validate the config file, then exit
    CheckConfig(CliArgs),
}

#[derive(Args)]
struct CliArgs {
    #[arg(long)]
    config_file_path: PathBuf,
}

#[derive(thiserror::Error, Debug)]
enum CliError {
    #[error(transparent)]
    Config(#[from] config::ConfigError),
    #[error("could not set up metrics: {0}")]
    Metrics(String),
    #[error(transparent)]
    RatingApi(#[from] rating_api::RatingApiError),
}

fn main() {
    let cli = CliCommand::parse();

    if let Err(e) = cli.execute() {
        eprintln!("{e}");
        process::exit(1);
    }
}

impl CliCommand {
    fn execute(self) -> Result<(), CliError> {
        match self {
            CliCommand::RatingApi(args) => {
                let config = Config::from_file(&args.config_file_path)?;
                let _sentry = init_logging(&config.common);
                init_metrics(&config.common)?;

                tracing::info!("Starting rating-api");
                rating_api::run(config.rating_api)?;
                Ok(())
            }
            CliCommand::CheckConfig(args) => {
                Config::from_file(&args.config_file_path)?;
                println!("{} is valid", args.config_file_path.display());
                Ok(())
            }
        }
    }
}

/// The returned guard flushes pending sentry events when dropped.
fn init_logging(common: &CommonConfig) -> Option<sentry::ClientInitGuard> {
    let guard = common.logging.as_ref().map(|logging| {
        sentry::init((
            logging.sentry_dsn.as_str(),
            sentry::ClientOptions {
                release: sentry::release_name!(),
                ..Default::default()
            },
        ))
    });

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer())
        .with(guard.as_ref().map(|_| sentry::integrations::tracing::layer()))
        .init();

    guard
}

fn init_metrics(common: &CommonConfig) -> Result<(), CliError> {
    let Some(metrics_config) = &common.metrics else {
        return Ok(());
    };

    let recorder = StatsdBuilder::from(metrics_config.statsd_host.clone(), metrics_config.statsd_port)
        .build(Some("reporate"))
        .map_err(|e| CliError::Metrics(e.to_string()))?;
    metrics::set_global_recorder(recorder).map_err(|e| CliError::Metrics(e.to_string()))?;
    shared::metrics_defs::describe_all(rating_api::metrics_defs::ALL_METRICS);

    tracing::info!(
        host = %metrics_config.statsd_host,
        port = metrics_config.statsd_port,
        "Sending metrics to statsd"
    );
    Ok(())
}
