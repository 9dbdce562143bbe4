use diesel::pg::PgConnection;
use diesel::Connection;

use crate::errors::CustomResult;
use crate::models::{NewEvent, NewLap, NewParticipant};
use crate::modules::models::event::Event;
use crate::modules::models::lap::Lap;
use crate::modules::models::participant::Participant;

/// number of rows per entity kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RowCounts {
    pub events: i64,
    pub participants: i64,
    pub laps: i64,
}

/// # storage used by the ingestion pipeline
/// everything a poll cycle needs from the database. all writes of one cycle run inside
/// a single `in_transaction` call and are discarded together when it fails.
pub trait LapStore {
    fn find_event(&mut self, external_id: i32) -> CustomResult<Option<Event>>;

    fn insert_event(&mut self, new_event: &NewEvent) -> CustomResult<Event>;

    fn find_participant(&mut self, external_id: i32) -> CustomResult<Option<Participant>>;

    fn insert_participant(&mut self, new_participant: &NewParticipant) -> CustomResult<Participant>;

    /// lap ids are scoped to an event, `event_id` is the database id of that event
    fn lap_exists(&mut self, external_id: i32, event_id: i32) -> CustomResult<bool>;

    fn insert_lap(&mut self, new_lap: &NewLap) -> CustomResult<Lap>;

    fn counts(&mut self) -> CustomResult<RowCounts>;

    /// run `f` as one all-or-nothing unit of work
    fn in_transaction<T, F>(&mut self, f: F) -> CustomResult<T>
    where
        Self: Sized,
        F: FnOnce(&mut Self) -> CustomResult<T>;
}

impl LapStore for PgConnection {
    fn find_event(&mut self, external_id: i32) -> CustomResult<Option<Event>> {
        Ok(Event::get_by_external_id(self, external_id)?)
    }

    fn insert_event(&mut self, new_event: &NewEvent) -> CustomResult<Event> {
        Ok(Event::new(self, new_event)?)
    }

    fn find_participant(&mut self, external_id: i32) -> CustomResult<Option<Participant>> {
        Ok(Participant::get_by_external_id(self, external_id)?)
    }

    fn insert_participant(&mut self, new_participant: &NewParticipant) -> CustomResult<Participant> {
        Ok(Participant::new(self, new_participant)?)
    }

    fn lap_exists(&mut self, external_id: i32, event_id: i32) -> CustomResult<bool> {
        Ok(Lap::exists(self, external_id, event_id)?)
    }

    fn insert_lap(&mut self, new_lap: &NewLap) -> CustomResult<Lap> {
        Ok(Lap::new(self, new_lap)?)
    }

    fn counts(&mut self) -> CustomResult<RowCounts> {
        Ok(RowCounts {
            events: Event::count(self)?,
            participants: Participant::count(self)?,
            laps: Lap::count(self)?,
        })
    }

    fn in_transaction<T, F>(&mut self, f: F) -> CustomResult<T>
    where
        F: FnOnce(&mut Self) -> CustomResult<T>,
    {
        self.transaction(f)
    }
}
