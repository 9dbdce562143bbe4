use std::time::Duration;

use chrono::{TimeZone, Utc};
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use futures::future::BoxFuture;

use lap_telemetry_ingest::errors::{CustomResult, Error};
use lap_telemetry_ingest::models::{NewEvent, NewLap, NewParticipant};
use lap_telemetry_ingest::modules::ingestion::{CycleSummary, IngestionPipeline};
use lap_telemetry_ingest::modules::memory_store::MemoryStore;
use lap_telemetry_ingest::modules::models::event::Event;
use lap_telemetry_ingest::modules::models::lap::Lap;
use lap_telemetry_ingest::modules::models::participant::Participant;
use lap_telemetry_ingest::modules::store::{LapStore, RowCounts};
use lap_telemetry_ingest::modules::telemetry_api::{BatchSource, LapRecord};

/// hands out the same batch every cycle, or fails every cycle
struct StubSource {
    batch: Option<Vec<LapRecord>>,
    calls: usize,
}

impl StubSource {
    fn serving(batch: Vec<LapRecord>) -> StubSource {
        StubSource {
            batch: Some(batch),
            calls: 0,
        }
    }

    fn failing() -> StubSource {
        StubSource { batch: None, calls: 0 }
    }
}

impl BatchSource for StubSource {
    fn next_batch(&mut self) -> BoxFuture<'_, CustomResult<Vec<LapRecord>>> {
        self.calls += 1;
        let result = match &self.batch {
            Some(batch) => Ok(batch.clone()),
            None => Err(Error::ResponseTimeout {
                timeout: Duration::from_secs(30),
            }),
        };
        Box::pin(async move { result })
    }
}

/// a memory store that fails like a broken database when one given lap is inserted
#[derive(Debug, Clone, Default)]
struct FailingStore {
    inner: MemoryStore,
    fail_on_lap: Option<i32>,
}

impl FailingStore {
    fn failing_on(external_id: i32) -> FailingStore {
        FailingStore {
            inner: MemoryStore::new(),
            fail_on_lap: Some(external_id),
        }
    }
}

impl LapStore for FailingStore {
    fn find_event(&mut self, external_id: i32) -> CustomResult<Option<Event>> {
        self.inner.find_event(external_id)
    }

    fn insert_event(&mut self, new_event: &NewEvent) -> CustomResult<Event> {
        self.inner.insert_event(new_event)
    }

    fn find_participant(&mut self, external_id: i32) -> CustomResult<Option<Participant>> {
        self.inner.find_participant(external_id)
    }

    fn insert_participant(&mut self, new_participant: &NewParticipant) -> CustomResult<Participant> {
        self.inner.insert_participant(new_participant)
    }

    fn lap_exists(&mut self, external_id: i32, event_id: i32) -> CustomResult<bool> {
        self.inner.lap_exists(external_id, event_id)
    }

    fn insert_lap(&mut self, new_lap: &NewLap) -> CustomResult<Lap> {
        if self.fail_on_lap == Some(new_lap.external_id) {
            return Err(DieselError::DatabaseError(
                DatabaseErrorKind::Unknown,
                Box::new("could not write lap".to_string()),
            )
            .into());
        }
        self.inner.insert_lap(new_lap)
    }

    fn counts(&mut self) -> CustomResult<RowCounts> {
        self.inner.counts()
    }

    fn in_transaction<T, F>(&mut self, f: F) -> CustomResult<T>
    where
        F: FnOnce(&mut Self) -> CustomResult<T>,
    {
        let snapshot = self.inner.clone();

        let result = f(self);
        if result.is_err() {
            self.inner = snapshot;
        }
        result
    }
}

const DRIVERS: [(i32, &str, &str, i32); 5] = [
    (101, "Jana", "Novak", 50),
    (102, "Petr", "Svoboda", 7),
    (103, "Eva", "Dvorak", 12),
    (104, "Tomas", "Cerny", 33),
    (105, "Lucie", "Prochazka", 88),
];

fn lap(id: i32, race_id: i32, driver: usize, round: i32) -> LapRecord {
    let (rfid_id, first_name, last_name, car_number) = DRIVERS[driver];
    let finish = Utc.with_ymd_and_hms(2025, 9, 13, 10, round as u32, driver as u32).unwrap();
    let start = finish - chrono::Duration::seconds(60);

    LapRecord {
        id,
        race_id,
        rfid_id,
        time: finish,
        time_prev: start,
        tag: format!("T{rfid_id}"),
        lap_time: 60_000,
        time_s1: start + chrono::Duration::seconds(20),
        time_s2: start + chrono::Duration::seconds(40),
        time_s3: finish,
        s1: 20_000,
        s2: 20_000,
        s3: 20_000,
        temp1: 21.0,
        temp2: 30.5,
        temp3: 55.0,
        round,
        car_number,
        category: "Open".to_string(),
        make: "Mazda".to_string(),
        model: "MX-5".to_string(),
        first_name: first_name.to_string(),
        last_name: last_name.to_string(),
        name: format!("Race {race_id}"),
        date: Utc.with_ymd_and_hms(2025, 9, 13, 0, 0, 0).unwrap(),
        is_race_lap: round % 2,
    }
}

/// two races, five drivers, two laps each per race
fn two_race_batch() -> Vec<LapRecord> {
    let mut batch = Vec::new();
    for race_id in 1..=2 {
        for round in 1..=2 {
            for driver in 0..DRIVERS.len() {
                let id = (round - 1) * DRIVERS.len() as i32 + driver as i32 + 1;
                batch.push(lap(id, race_id, driver, round));
            }
        }
    }
    batch
}

fn counts<D: LapStore>(pipeline: &mut IngestionPipeline<StubSource, D>) -> RowCounts {
    pipeline.store().counts().unwrap()
}

#[tokio::test]
async fn batch_creates_events_participants_and_laps() {
    let mut pipeline = IngestionPipeline::new(StubSource::serving(two_race_batch()), MemoryStore::new());

    let summary = pipeline.poll_and_persist().await.unwrap();

    assert_eq!(
        summary,
        CycleSummary {
            fetched: 20,
            saved: 20,
            skipped: 0,
            events_created: 2,
            participants_created: 5,
        }
    );
    assert_eq!(
        counts(&mut pipeline),
        RowCounts {
            events: 2,
            participants: 5,
            laps: 20,
        }
    );
}

#[tokio::test]
async fn same_batch_twice_is_stored_once() {
    let mut pipeline = IngestionPipeline::new(StubSource::serving(two_race_batch()), MemoryStore::new());

    pipeline.poll_and_persist().await.unwrap();
    let second = pipeline.poll_and_persist().await.unwrap();

    assert_eq!(second.saved, 0);
    assert_eq!(second.skipped, 20);
    assert_eq!((second.events_created, second.participants_created), (0, 0));
    assert_eq!(
        counts(&mut pipeline),
        RowCounts {
            events: 2,
            participants: 5,
            laps: 20,
        }
    );
}

#[tokio::test]
async fn lap_ids_are_scoped_to_their_event() {
    let batch = vec![lap(1, 1, 0, 1), lap(1, 2, 0, 1), lap(1, 1, 0, 1)];
    let mut pipeline = IngestionPipeline::new(StubSource::serving(batch), MemoryStore::new());

    let summary = pipeline.poll_and_persist().await.unwrap();

    // same lap id in another event is another lap, the repeat within event 1 is not
    assert_eq!((summary.saved, summary.skipped), (2, 1));
    assert_eq!(pipeline.store().laps.len(), 2);
}

#[tokio::test]
async fn laps_share_one_event_and_one_participant() {
    let batch: Vec<LapRecord> = (1..=4).map(|id| lap(id, 9, 2, id)).collect();
    let mut pipeline = IngestionPipeline::new(StubSource::serving(batch), MemoryStore::new());

    pipeline.poll_and_persist().await.unwrap();

    let store = pipeline.store();
    assert_eq!(store.events.len(), 1);
    assert_eq!(store.participants.len(), 1);
    let (event_id, participant_id) = (store.events[0].id, store.participants[0].id);
    assert!(store
        .laps
        .iter()
        .all(|l| l.event_id == event_id && l.participant_id == participant_id));
    assert_eq!(store.events[0].external_id, 9);
    assert_eq!(store.participants[0].full_name(), "Eva Dvorak");
}

#[tokio::test]
async fn known_entities_are_not_updated() {
    let mut pipeline = IngestionPipeline::new(StubSource::serving(vec![lap(1, 1, 0, 1)]), MemoryStore::new());
    pipeline.poll_and_persist().await.unwrap();

    let mut renamed = lap(2, 1, 0, 2);
    renamed.name = "Renamed".to_string();
    renamed.first_name = "Janina".to_string();
    pipeline.source_batch(vec![renamed]);
    pipeline.poll_and_persist().await.unwrap();

    let store = pipeline.store();
    assert_eq!(store.events[0].name, "Race 1");
    assert_eq!(store.participants[0].first_name, "Jana");
    assert_eq!(store.laps.len(), 2);
}

#[tokio::test]
async fn failing_lap_rolls_back_the_whole_cycle() {
    let store = FailingStore::failing_on(8);
    let mut pipeline = IngestionPipeline::new(StubSource::serving(two_race_batch()), store);

    let error = pipeline.poll_and_persist().await.unwrap_err();

    assert_eq!(error.kind(), "PersistenceFailure");
    assert_eq!(counts(&mut pipeline), RowCounts::default());

    // the next cycle starts from the same state and succeeds once the store recovers
    pipeline.store().fail_on_lap = None;
    let summary = pipeline.poll_and_persist().await.unwrap();
    assert_eq!(summary.saved, 20);
}

#[tokio::test]
async fn rollback_keeps_rows_of_earlier_cycles() {
    let mut pipeline = IngestionPipeline::new(StubSource::serving(vec![lap(1, 1, 0, 1)]), FailingStore::failing_on(3));
    pipeline.poll_and_persist().await.unwrap();
    let before = counts(&mut pipeline);

    pipeline.source_batch(vec![lap(2, 2, 1, 1), lap(3, 2, 1, 2)]);
    assert!(pipeline.poll_and_persist().await.is_err());

    assert_eq!(counts(&mut pipeline), before);
}

#[tokio::test]
async fn failed_fetch_writes_nothing() {
    let mut pipeline = IngestionPipeline::new(StubSource::failing(), MemoryStore::new());

    let error = pipeline.poll_and_persist().await.unwrap_err();

    assert!(error.is_connectivity());
    assert_eq!(pipeline.source().calls, 1);
    assert_eq!(counts(&mut pipeline), RowCounts::default());
}

#[tokio::test]
async fn empty_batch_is_a_quiet_cycle() {
    let mut pipeline = IngestionPipeline::new(StubSource::serving(Vec::new()), MemoryStore::new());

    assert_eq!(pipeline.poll_and_persist().await.unwrap(), CycleSummary::default());
    assert_eq!(counts(&mut pipeline), RowCounts::default());
}

#[tokio::test]
async fn race_lap_flag_follows_the_sentinel() {
    let mut other = lap(2, 1, 0, 2);
    other.is_race_lap = 7;
    let batch = vec![lap(1, 1, 0, 1), other];
    let mut pipeline = IngestionPipeline::new(StubSource::serving(batch), MemoryStore::new());

    pipeline.poll_and_persist().await.unwrap();

    let flags: Vec<bool> = pipeline.store().laps.iter().map(|l| l.is_race_lap).collect();
    assert_eq!(flags, vec![true, false]);
}

trait SwapBatch {
    fn source_batch(&mut self, batch: Vec<LapRecord>);
}

impl<D: LapStore + Default> SwapBatch for IngestionPipeline<StubSource, D> {
    fn source_batch(&mut self, batch: Vec<LapRecord>) {
        // rebuild around the same store so earlier cycles stay visible
        let store = std::mem::take(self.store());
        *self = IngestionPipeline::new(StubSource::serving(batch), store);
    }
}
