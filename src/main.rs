use std::process::ExitCode;
use std::sync::Arc;

use log::{error, info, warn};
use tokio::sync::Mutex;

use lap_telemetry_ingest::cron_jobs::register_cron_jobs;
use lap_telemetry_ingest::errors::{CustomResult, Error};
use lap_telemetry_ingest::modules::connection::WsConnector;
use lap_telemetry_ingest::modules::correlator::Correlator;
use lap_telemetry_ingest::modules::helpers::config::Settings;
use lap_telemetry_ingest::modules::helpers::logging::setup_logging;
use lap_telemetry_ingest::modules::ingestion::IngestionPipeline;
use lap_telemetry_ingest::modules::models::general::establish_connection;
use lap_telemetry_ingest::modules::telemetry_api::TelemetryFetcher;

#[tokio::main]
async fn main() -> ExitCode {
    let settings = match Settings::from_env() {
        Ok(settings) => settings,
        Err(error) => {
            eprintln!("{error}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(error) = setup_logging(settings.logging_level, &settings.log_file) {
        eprintln!("Failed to setup logging: {error}");
        return ExitCode::FAILURE;
    }

    match run(settings).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            error!(target: "main", "Stopping after {}: {}", error.kind(), error);
            ExitCode::FAILURE
        }
    }
}

async fn run(settings: Settings) -> CustomResult<()> {
    let conn = establish_connection(settings.require_database_url()?)?;
    let fetcher = TelemetryFetcher::new(Correlator::new(WsConnector::new(&settings.ws_url)));
    let pipeline = Arc::new(Mutex::new(IngestionPipeline::new(fetcher, conn)));

    // register cron jobs that need to run.
    let mut scheduler = register_cron_jobs(pipeline.clone(), settings.poll_interval).await?;
    info!(target: "main", "Ingesting laps from {}", settings.ws_url);

    if let Err(error) = tokio::signal::ctrl_c().await {
        warn!(target: "main", "Failed to listen for shutdown signal: {}", error);
    }

    info!(target: "main", "Shutting down");
    scheduler
        .shutdown()
        .await
        .map_err(|source| Error::SchedulerError { source })?;

    // waits for a running cycle to finish
    pipeline.lock().await.source().close().await;
    Ok(())
}
