use std::{path::PathBuf, process::ExitCode};

use ::tracing::{error, info, info_span};
use clap::Parser;
use service::Service;

mod config;
mod gc;
mod http_objects;
mod integration_test;
mod routes;
mod service;
mod tracing;
use crate::tracing::{setup_metrics, setup_tracing};

#[cfg(test)]
mod testing;

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    #[arg(short, long, value_name = "config file", help = "Path to config file")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let config = match cli.config {
        Some(path) => config::ServerConfig::from_path(&path),
        None => Ok(config::ServerConfig::default()),
    };
    let config = match config {
        Ok(config) => config,
        Err(err) => {
            eprintln!("error loading config: {:?}", err);
            return ExitCode::FAILURE;
        }
    };

    let tracing_provider = match setup_tracing(&config) {
        Ok(provider) => provider,
        Err(err) => {
            eprintln!("error setting up tracing: {:?}", err);
            return ExitCode::FAILURE;
        }
    };
    let meter_provider = setup_metrics(&config)
        .inspect_err(|e| error!("error setting up metrics: {:?}", e))
        .ok()
        .flatten();

    let root_span = info_span!("filevault", listen_addr = %config.listen_addr);
    let _guard = root_span.enter();
    info!(
        version = env!("CARGO_PKG_VERSION"),
        build_timestamp = env!("VERGEN_BUILD_TIMESTAMP"),
        rustc = env!("VERGEN_RUSTC_SEMVER"),
        "starting filevault-server"
    );

    let mut exit_code = ExitCode::SUCCESS;
    match Service::new(config).await {
        Ok(service) => {
            if let Err(err) = service.start().await {
                error!("Error starting service: {:?}", err);
                exit_code = ExitCode::FAILURE;
            }
        }
        Err(err) => {
            error!("Error creating service: {:?}", err);
            exit_code = ExitCode::FAILURE;
        }
    }

    // export traces and metrics before shutdown
    if let Some(tracer_provider) = tracing_provider {
        if let Err(err) = tracer_provider.force_flush() {
            error!("Error flushing traces: {:?}", err);
        }
        if let Err(err) = tracer_provider.shutdown() {
            error!("Error shutting down tracer provider: {:?}", err);
        }
    }
    if let Some(meter_provider) = meter_provider {
        if let Err(err) = meter_provider.shutdown() {
            error!("Error shutting down meter provider: {:?}", err);
        }
    }
    exit_code
}
