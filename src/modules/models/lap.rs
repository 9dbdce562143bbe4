use chrono::{DateTime, Utc};
use diesel::dsl::exists;
use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::select;
use log::{debug, error};
use serde::{Deserialize, Serialize};

use crate::models::NewLap;
use crate::modules::models::event::Event;
use crate::modules::models::participant::Participant;
use crate::schema::laps;

/// the three sector durations of a lap and the moments each sector line was crossed
#[derive(Insertable, Serialize, Debug, Clone, PartialEq, Deserialize)]
#[diesel(table_name = laps)]
pub struct SectorSplits {
    pub sector1_ms: i32,
    pub sector2_ms: i32,
    pub sector3_ms: i32,
    pub sector1_time: DateTime<Utc>,
    pub sector2_time: DateTime<Utc>,
    pub sector3_time: DateTime<Utc>,
}

impl SectorSplits {
    pub fn total_ms(&self) -> i64 {
        self.sector1_ms as i64 + self.sector2_ms as i64 + self.sector3_ms as i64
    }
}

/// conditions measured while the lap was driven
#[derive(Insertable, Serialize, Debug, Clone, PartialEq, Deserialize)]
#[diesel(table_name = laps)]
pub struct EnvironmentReading {
    pub air_temp: f32,
    pub track_temp: f32,
    pub humidity: f32,
}

#[derive(Queryable, Serialize, Associations, Identifiable, PartialEq, Debug, Clone, Deserialize)]
#[diesel(belongs_to(Event, foreign_key = event_id))]
#[diesel(belongs_to(Participant, foreign_key = participant_id))]
#[diesel(table_name = laps)]
pub struct Lap {
    pub id: i32,
    pub external_id: i32,
    pub event_id: i32,
    pub participant_id: i32,
    pub finish_time: DateTime<Utc>,
    pub previous_time: DateTime<Utc>,
    pub lap_time_ms: i32,
    pub sector1_ms: i32,
    pub sector2_ms: i32,
    pub sector3_ms: i32,
    pub sector1_time: DateTime<Utc>,
    pub sector2_time: DateTime<Utc>,
    pub sector3_time: DateTime<Utc>,
    pub air_temp: f32,
    pub track_temp: f32,
    pub humidity: f32,
    pub round: i32,
    pub car_number: i32,
    pub category: String,
    pub make: String,
    pub model: String,
    pub tag: String,
    pub is_race_lap: bool,
}

impl Lap {
    /************ INSERTERS ************/
    /// # Insert a new lap into the database
    ///
    /// ## Arguments
    /// * `conn` - The database connection to use
    /// * `new_lap` - The new lap to insert
    ///
    /// ## Returns
    /// * `Lap` - The inserted lap
    pub fn new(conn: &mut PgConnection, new_lap: &NewLap) -> QueryResult<Lap> {
        let lap = match diesel::insert_into(laps::table)
            .values(new_lap)
            .get_result::<Lap>(conn)
        {
            Ok(lap) => lap,
            Err(error) => {
                error!(target: "models/lap:new", "Error inserting lap {} of event {}: {}",
                    new_lap.external_id, new_lap.event_id, error);
                return Err(error);
            }
        };

        debug!(target: "models/lap:new", "Saved lap: external_id={}, event_id={}", lap.external_id, lap.event_id);
        Ok(lap)
    }

    /************ GETTERS ************/
    /// # check if a lap exists
    /// lap ids are only unique within one event, so the event is part of the key
    ///
    /// ## Arguments
    /// * `conn` - The database connection to use
    /// * `external_id_in` - The lap id given by the timing source
    /// * `event_id_in` - The database id of the event
    ///
    /// ## Returns
    /// * `bool` - true if the lap is already stored
    pub fn exists(conn: &mut PgConnection, external_id_in: i32, event_id_in: i32) -> QueryResult<bool> {
        use crate::schema::laps::dsl::*;

        select(exists(
            laps.filter(external_id.eq(external_id_in))
                .filter(event_id.eq(event_id_in)),
        ))
        .get_result(conn)
    }

    pub fn count(conn: &mut PgConnection) -> QueryResult<i64> {
        laps::table.count().get_result(conn)
    }

    /// rebuild the embedded sector values from the flat row
    pub fn sector_splits(&self) -> SectorSplits {
        SectorSplits {
            sector1_ms: self.sector1_ms,
            sector2_ms: self.sector2_ms,
            sector3_ms: self.sector3_ms,
            sector1_time: self.sector1_time,
            sector2_time: self.sector2_time,
            sector3_time: self.sector3_time,
        }
    }

    pub fn environment(&self) -> EnvironmentReading {
        EnvironmentReading {
            air_temp: self.air_temp,
            track_temp: self.track_temp,
            humidity: self.humidity,
        }
    }

    /// # build a lap row from an insertable
    /// used by stores that hand out their own ids
    pub fn from_new(id: i32, new_lap: &NewLap) -> Lap {
        Lap {
            id,
            external_id: new_lap.external_id,
            event_id: new_lap.event_id,
            participant_id: new_lap.participant_id,
            finish_time: new_lap.finish_time,
            previous_time: new_lap.previous_time,
            lap_time_ms: new_lap.lap_time_ms,
            sector1_ms: new_lap.sectors.sector1_ms,
            sector2_ms: new_lap.sectors.sector2_ms,
            sector3_ms: new_lap.sectors.sector3_ms,
            sector1_time: new_lap.sectors.sector1_time,
            sector2_time: new_lap.sectors.sector2_time,
            sector3_time: new_lap.sectors.sector3_time,
            air_temp: new_lap.environment.air_temp,
            track_temp: new_lap.environment.track_temp,
            humidity: new_lap.environment.humidity,
            round: new_lap.round,
            car_number: new_lap.car_number,
            category: new_lap.category.clone(),
            make: new_lap.make.clone(),
            model: new_lap.model.clone(),
            tag: new_lap.tag.clone(),
            is_race_lap: new_lap.is_race_lap,
        }
    }
}
