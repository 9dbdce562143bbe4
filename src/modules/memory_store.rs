use diesel::result::{DatabaseErrorKind, Error as DieselError};

use crate::errors::CustomResult;
use crate::models::{NewEvent, NewLap, NewParticipant};
use crate::modules::models::event::Event;
use crate::modules::models::lap::Lap;
use crate::modules::models::participant::Participant;
use crate::modules::store::{LapStore, RowCounts};

/// # in-process store
/// keeps rows in vectors and enforces the same unique keys as the database schema.
/// transactions snapshot the rows and restore them when the unit of work fails.
/// used for dry runs and tests.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    pub events: Vec<Event>,
    pub participants: Vec<Participant>,
    pub laps: Vec<Lap>,
}

impl MemoryStore {
    pub fn new() -> MemoryStore {
        MemoryStore::default()
    }

    fn unique_violation(what: &str) -> DieselError {
        DieselError::DatabaseError(
            DatabaseErrorKind::UniqueViolation,
            Box::new(format!("duplicate key value violates unique constraint on {what}")),
        )
    }

    fn next_id(len: usize) -> i32 {
        len as i32 + 1
    }
}

impl LapStore for MemoryStore {
    fn find_event(&mut self, external_id: i32) -> CustomResult<Option<Event>> {
        Ok(self.events.iter().find(|e| e.external_id == external_id).cloned())
    }

    fn insert_event(&mut self, new_event: &NewEvent) -> CustomResult<Event> {
        if self.events.iter().any(|e| e.external_id == new_event.external_id) {
            return Err(MemoryStore::unique_violation("events.external_id").into());
        }

        let event = Event {
            id: MemoryStore::next_id(self.events.len()),
            external_id: new_event.external_id,
            name: new_event.name.clone(),
            date: new_event.date,
        };
        self.events.push(event.clone());
        Ok(event)
    }

    fn find_participant(&mut self, external_id: i32) -> CustomResult<Option<Participant>> {
        Ok(self
            .participants
            .iter()
            .find(|p| p.external_id == external_id)
            .cloned())
    }

    fn insert_participant(&mut self, new_participant: &NewParticipant) -> CustomResult<Participant> {
        if self
            .participants
            .iter()
            .any(|p| p.external_id == new_participant.external_id)
        {
            return Err(MemoryStore::unique_violation("participants.external_id").into());
        }

        let participant = Participant {
            id: MemoryStore::next_id(self.participants.len()),
            external_id: new_participant.external_id,
            car_number: new_participant.car_number,
            first_name: new_participant.first_name.clone(),
            last_name: new_participant.last_name.clone(),
        };
        self.participants.push(participant.clone());
        Ok(participant)
    }

    fn lap_exists(&mut self, external_id: i32, event_id: i32) -> CustomResult<bool> {
        Ok(self
            .laps
            .iter()
            .any(|l| l.external_id == external_id && l.event_id == event_id))
    }

    fn insert_lap(&mut self, new_lap: &NewLap) -> CustomResult<Lap> {
        if self.lap_exists(new_lap.external_id, new_lap.event_id)? {
            return Err(MemoryStore::unique_violation("laps (external_id, event_id)").into());
        }

        let lap = Lap::from_new(MemoryStore::next_id(self.laps.len()), new_lap);
        self.laps.push(lap.clone());
        Ok(lap)
    }

    fn counts(&mut self) -> CustomResult<RowCounts> {
        Ok(RowCounts {
            events: self.events.len() as i64,
            participants: self.participants.len() as i64,
            laps: self.laps.len() as i64,
        })
    }

    fn in_transaction<T, F>(&mut self, f: F) -> CustomResult<T>
    where
        F: FnOnce(&mut Self) -> CustomResult<T>,
    {
        let snapshot = (self.events.clone(), self.participants.clone(), self.laps.clone());

        let result = f(self);
        if result.is_err() {
            (self.events, self.participants, self.laps) = snapshot;
        }
        result
    }
}
