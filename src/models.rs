use chrono::{DateTime, NaiveDate, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use crate::modules::models::lap::{EnvironmentReading, SectorSplits};
use crate::schema::*;

#[derive(Insertable, Serialize, Debug, Clone, PartialEq, Deserialize)]
#[diesel(table_name = events)]
pub struct NewEvent {
    pub external_id: i32,
    pub name: String,
    pub date: NaiveDate,
}

#[derive(Insertable, Serialize, Debug, Clone, PartialEq, Deserialize)]
#[diesel(table_name = participants)]
pub struct NewParticipant {
    pub external_id: i32,
    pub car_number: i32,
    pub first_name: String,
    pub last_name: String,
}

#[derive(Insertable, Serialize, Debug, Clone, PartialEq, Deserialize)]
#[diesel(table_name = laps)]
pub struct NewLap {
    pub external_id: i32,
    pub event_id: i32,
    pub participant_id: i32,
    pub finish_time: DateTime<Utc>,
    pub previous_time: DateTime<Utc>,
    pub lap_time_ms: i32,
    #[diesel(embed)]
    pub sectors: SectorSplits,
    #[diesel(embed)]
    pub environment: EnvironmentReading,
    pub round: i32,
    pub car_number: i32,
    pub category: String,
    pub make: String,
    pub model: String,
    pub tag: String,
    pub is_race_lap: bool,
}
