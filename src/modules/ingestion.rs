use chrono::NaiveDate;
use log::{debug, error, info};

use crate::errors::CustomResult;
use crate::models::{NewEvent, NewLap, NewParticipant};
use crate::modules::models::event::Event;
use crate::modules::models::lap::{EnvironmentReading, SectorSplits};
use crate::modules::models::participant::Participant;
use crate::modules::store::LapStore;
use crate::modules::telemetry_api::{BatchSource, LapRecord};

/// what one poll cycle did
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CycleSummary {
    pub fetched: usize,
    pub saved: usize,
    pub skipped: usize,
    pub events_created: usize,
    pub participants_created: usize,
}

/// # fetch and persist laps
/// every poll cycle fetches one batch and stores it in a single transaction. laps that
/// are already stored are skipped, so delivering the same record again is harmless.
pub struct IngestionPipeline<S: BatchSource, D: LapStore> {
    source: S,
    store: D,
}

impl<S: BatchSource, D: LapStore> IngestionPipeline<S, D> {
    pub fn new(source: S, store: D) -> Self {
        IngestionPipeline { source, store }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn store(&mut self) -> &mut D {
        &mut self.store
    }

    /// # run one poll cycle
    /// a failed fetch ends the cycle before anything is written. a failed write rolls back
    /// every write of the cycle. both are logged here and returned to the caller.
    ///
    /// ## Returns
    /// * `CycleSummary` - the counts of the cycle
    pub async fn poll_and_persist(&mut self) -> CustomResult<CycleSummary> {
        debug!(target: "ingestion", "Polling lap data");
        let records = match self.source.next_batch().await {
            Ok(records) => records,
            Err(error) => {
                error!(target: "ingestion", "Failed to fetch lap data ({}): {}", error.kind(), error);
                return Err(error);
            }
        };

        if records.is_empty() {
            debug!(target: "ingestion", "No lap records received");
            return Ok(CycleSummary::default());
        }

        let summary = match self.store.in_transaction(|store| persist_batch(store, &records)) {
            Ok(summary) => summary,
            Err(error) => {
                error!(target: "ingestion", "Failed to persist {} lap records ({}), nothing was saved: {}",
                    records.len(), error.kind(), error);
                return Err(error);
            }
        };

        if summary.saved > 0 {
            info!(target: "ingestion", "Saved {} new laps ({} already known, {} new events, {} new participants)",
                summary.saved, summary.skipped, summary.events_created, summary.participants_created);
        } else {
            debug!(target: "ingestion", "All {} lap records were already saved", summary.fetched);
        }
        Ok(summary)
    }
}

/// # store one batch
/// each record is handled on its own: resolve or create the event and the participant,
/// then insert the lap unless it is already known for that event.
///
/// ## Arguments
/// * `store` - the store, normally inside a transaction
/// * `records` - the batch
///
/// ## Returns
/// * `CycleSummary` - the counts of the batch
pub fn persist_batch<D: LapStore>(store: &mut D, records: &[LapRecord]) -> CustomResult<CycleSummary> {
    let mut summary = CycleSummary {
        fetched: records.len(),
        ..CycleSummary::default()
    };

    for record in records {
        let event = ensure_event(store, record, &mut summary)?;
        let participant = ensure_participant(store, record, &mut summary)?;

        if store.lap_exists(record.id, event.id)? {
            summary.skipped += 1;
            continue;
        }

        store.insert_lap(&build_lap(record, &event, &participant))?;
        debug!(target: "ingestion", "Saved lap: external_id={}, race={}", record.id, record.race_id);
        summary.saved += 1;
    }

    Ok(summary)
}

fn ensure_event<D: LapStore>(store: &mut D, record: &LapRecord, summary: &mut CycleSummary) -> CustomResult<Event> {
    if let Some(event) = store.find_event(record.race_id)? {
        return Ok(event);
    }

    let new_event = NewEvent {
        external_id: record.race_id,
        name: record.name.clone(),
        date: event_date(record),
    };
    info!(target: "ingestion", "Creating new event: external_id={}, name={}, date={}",
        new_event.external_id, new_event.name, new_event.date);

    let event = store.insert_event(&new_event)?;
    summary.events_created += 1;
    Ok(event)
}

fn ensure_participant<D: LapStore>(
    store: &mut D,
    record: &LapRecord,
    summary: &mut CycleSummary,
) -> CustomResult<Participant> {
    if let Some(participant) = store.find_participant(record.rfid_id)? {
        return Ok(participant);
    }

    let new_participant = NewParticipant {
        external_id: record.rfid_id,
        car_number: record.car_number,
        first_name: record.first_name.clone(),
        last_name: record.last_name.clone(),
    };
    info!(target: "ingestion", "Creating new participant: external_id={}, name={} {}",
        new_participant.external_id, new_participant.first_name, new_participant.last_name);

    let participant = store.insert_participant(&new_participant)?;
    summary.participants_created += 1;
    Ok(participant)
}

/// calendar day of the event, taken in UTC
pub fn event_date(record: &LapRecord) -> NaiveDate {
    record.date.date_naive()
}

pub fn is_race_lap(sentinel: i32) -> bool {
    sentinel == 1
}

/// # build the lap row for a record
/// sector and environment values are copied as delivered
pub fn build_lap(record: &LapRecord, event: &Event, participant: &Participant) -> NewLap {
    NewLap {
        external_id: record.id,
        event_id: event.id,
        participant_id: participant.id,
        finish_time: record.time,
        previous_time: record.time_prev,
        lap_time_ms: record.lap_time,
        sectors: SectorSplits {
            sector1_ms: record.s1,
            sector2_ms: record.s2,
            sector3_ms: record.s3,
            sector1_time: record.time_s1,
            sector2_time: record.time_s2,
            sector3_time: record.time_s3,
        },
        environment: EnvironmentReading {
            air_temp: record.temp1,
            track_temp: record.temp2,
            humidity: record.temp3,
        },
        round: record.round,
        car_number: record.car_number,
        category: record.category.clone(),
        make: record.make.clone(),
        model: record.model.clone(),
        tag: record.tag.clone(),
        is_race_lap: is_race_lap(record.is_race_lap),
    }
}
