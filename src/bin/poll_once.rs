use std::process::ExitCode;

use log::error;

use lap_telemetry_ingest::modules::connection::WsConnector;
use lap_telemetry_ingest::modules::correlator::Correlator;
use lap_telemetry_ingest::modules::helpers::config::Settings;
use lap_telemetry_ingest::modules::helpers::logging::setup_logging;
use lap_telemetry_ingest::modules::ingestion::IngestionPipeline;
use lap_telemetry_ingest::modules::memory_store::MemoryStore;
use lap_telemetry_ingest::modules::models::general::establish_connection;
use lap_telemetry_ingest::modules::store::LapStore;
use lap_telemetry_ingest::modules::telemetry_api::{BatchSource, TelemetryFetcher};

/// runs a single poll cycle. `--dry-run` keeps everything in memory
#[tokio::main]
async fn main() -> ExitCode {
    let dry_run = std::env::args().skip(1).any(|arg| arg == "--dry-run");

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

    let fetcher = TelemetryFetcher::new(Correlator::new(WsConnector::new(&settings.ws_url)));

    if dry_run {
        return poll_once(IngestionPipeline::new(fetcher, MemoryStore::new())).await;
    }

    let conn = match settings.require_database_url().and_then(establish_connection) {
        Ok(conn) => conn,
        Err(error) => {
            error!(target: "poll_once", "{}", error);
            return ExitCode::FAILURE;
        }
    };
    poll_once(IngestionPipeline::new(fetcher, conn)).await
}

async fn poll_once<S: BatchSource, D: LapStore>(mut pipeline: IngestionPipeline<S, D>) -> ExitCode {
    let summary = match pipeline.poll_and_persist().await {
        Ok(summary) => summary,
        // already logged by the pipeline
        Err(_) => return ExitCode::FAILURE,
    };

    println!(
        "fetched {}, saved {}, skipped {}, new events {}, new participants {}",
        summary.fetched, summary.saved, summary.skipped, summary.events_created, summary.participants_created
    );
    if let Ok(counts) = pipeline.store().counts() {
        println!(
            "stored: {} events, {} participants, {} laps",
            counts.events, counts.participants, counts.laps
        );
    }

    ExitCode::SUCCESS
}
