use std::sync::Arc;
use std::time::Duration;

use log::{debug, info};
use snafu::ResultExt;
use tokio::sync::Mutex;
use tokio_cron_scheduler::{Job, JobScheduler};

use crate::errors::{CustomResult, SchedulerSnafu};
use crate::modules::ingestion::{CycleSummary, IngestionPipeline};
use crate::modules::store::LapStore;
use crate::modules::telemetry_api::BatchSource;

/// # run one poll cycle unless one is already running
/// ticks that arrive while a cycle is still busy are skipped, never queued.
/// failures are logged by the pipeline and end only this cycle.
///
/// ## Returns
/// * `Option<CycleSummary>` - the summary, or none when skipped or failed
pub async fn run_single_flight<S, D>(pipeline: &Mutex<IngestionPipeline<S, D>>) -> Option<CycleSummary>
where
    S: BatchSource,
    D: LapStore + Send,
{
    let mut pipeline = match pipeline.try_lock() {
        Ok(pipeline) => pipeline,
        Err(_) => {
            debug!(target: "cron_jobs", "Previous poll cycle still running, skipping this one");
            return None;
        }
    };

    pipeline.poll_and_persist().await.ok()
}

/// # register the polling job
///
/// ## Arguments
/// * `pipeline` - the pipeline shared with the rest of the process
/// * `interval` - the time between two poll cycles
///
/// ## Returns
/// * `JobScheduler` - the started scheduler, shut it down to stop polling
pub async fn register_cron_jobs<S, D>(
    pipeline: Arc<Mutex<IngestionPipeline<S, D>>>,
    interval: Duration,
) -> CustomResult<JobScheduler>
where
    S: BatchSource + 'static,
    D: LapStore + Send + 'static,
{
    let scheduler = JobScheduler::new().await.context(SchedulerSnafu)?;

    let job = Job::new_repeated_async(interval, move |_uuid, _l| {
        let pipeline = pipeline.clone();
        Box::pin(async move {
            run_single_flight(&pipeline).await;
        })
    })
    .context(SchedulerSnafu)?;

    scheduler.add(job).await.context(SchedulerSnafu)?;
    scheduler.start().await.context(SchedulerSnafu)?;

    info!(target: "cron_jobs", "Polling every {:?}", interval);
    Ok(scheduler)
}
