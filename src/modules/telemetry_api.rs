use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::{CustomResult, MalformedReplySnafu};
use crate::modules::connection::Connector;
use crate::modules::correlator::Correlator;

/// request type that asks the source for everything it accumulated
pub const GET_DATA: &str = "GET_DATA";

/// reply type the source uses when it could not handle a request
pub const ERROR_REPLY: &str = "ERROR";

/// upstream field with tire data. it has no meaning here and is removed before decoding
pub const TIRE_DATA_FIELD: &str = "Tires";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Envelope<T> {
    #[serde(rename = "type")]
    pub message_type: String,
    pub payload: Option<T>,
}

/// # one lap as delivered by the timing source
/// every field is mapped from its wire name explicitly. unknown fields are ignored
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct LapRecord {
    #[serde(rename = "Id")]
    pub id: i32,
    #[serde(rename = "RaceId")]
    pub race_id: i32,
    #[serde(rename = "RFIDId")]
    pub rfid_id: i32,
    #[serde(rename = "Time")]
    pub time: DateTime<Utc>,
    #[serde(rename = "TimePrev")]
    pub time_prev: DateTime<Utc>,
    #[serde(rename = "Tag")]
    pub tag: String,
    #[serde(rename = "LapTime")]
    pub lap_time: i32,
    #[serde(rename = "TimeS1")]
    pub time_s1: DateTime<Utc>,
    #[serde(rename = "TimeS2")]
    pub time_s2: DateTime<Utc>,
    #[serde(rename = "TimeS3")]
    pub time_s3: DateTime<Utc>,
    #[serde(rename = "S1")]
    pub s1: i32,
    #[serde(rename = "S2")]
    pub s2: i32,
    #[serde(rename = "S3")]
    pub s3: i32,
    /// air temperature
    #[serde(rename = "Temp1")]
    pub temp1: f32,
    /// track temperature
    #[serde(rename = "Temp2")]
    pub temp2: f32,
    /// humidity
    #[serde(rename = "Temp3")]
    pub temp3: f32,
    #[serde(rename = "Round")]
    pub round: i32,
    #[serde(rename = "CarNumber")]
    pub car_number: i32,
    #[serde(rename = "Category")]
    pub category: String,
    #[serde(rename = "Make")]
    pub make: String,
    #[serde(rename = "Model")]
    pub model: String,
    #[serde(rename = "FirstName")]
    pub first_name: String,
    #[serde(rename = "LastName")]
    pub last_name: String,
    /// name of the event (track) the lap was driven at
    #[serde(rename = "Name")]
    pub name: String,
    /// day of the event
    #[serde(rename = "Date")]
    pub date: DateTime<Utc>,
    /// 1 for a timed race lap, anything else for other laps
    #[serde(rename = "IsRaceLap")]
    pub is_race_lap: i32,
}

/// # encode the fetch request
///
/// ## Returns
/// * `String` - `{"type":"GET_DATA","payload":""}`
pub fn encode_request() -> String {
    serde_json::json!({ "type": GET_DATA, "payload": "" }).to_string()
}

/// # decode a single record
/// drops the tire data field and maps the remaining wire fields
pub fn decode_record(mut value: Value) -> Result<LapRecord, serde_json::Error> {
    if let Value::Object(fields) = &mut value {
        fields.remove(TIRE_DATA_FIELD);
    }

    serde_json::from_value(value)
}

/// # decode a reply envelope
/// a missing or null payload is an empty batch
///
/// ## Arguments
/// * `text` - the complete reply
///
/// ## Returns
/// * `Vec<LapRecord>` - the records in the order they were sent
pub fn decode_reply(text: &str) -> CustomResult<Vec<LapRecord>> {
    let envelope: Envelope<Value> = serde_json::from_str(text).map_err(|error| {
        MalformedReplySnafu {
            message: format!("invalid envelope: {error}"),
        }
        .build()
    })?;

    if envelope.message_type == ERROR_REPLY {
        let reason = match envelope.payload {
            Some(Value::String(reason)) => reason,
            Some(other) => other.to_string(),
            None => "no reason given".to_string(),
        };
        return MalformedReplySnafu {
            message: format!("source rejected the request: {reason}"),
        }
        .fail();
    }

    let items = match envelope.payload {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(Value::Array(items)) => items,
        Some(other) => {
            return MalformedReplySnafu {
                message: format!("expected an array payload, got {other}"),
            }
            .fail()
        }
    };

    items
        .into_iter()
        .enumerate()
        .map(|(index, item)| {
            decode_record(item).map_err(|error| {
                MalformedReplySnafu {
                    message: format!("record {index}: {error}"),
                }
                .build()
            })
        })
        .collect()
}

/// a source of lap batches, one batch per poll cycle
pub trait BatchSource: Send {
    fn next_batch(&mut self) -> BoxFuture<'_, CustomResult<Vec<LapRecord>>>;
}

/// # fetches accumulated laps from the timing source
pub struct TelemetryFetcher<C: Connector> {
    correlator: Correlator<C>,
}

impl<C: Connector> TelemetryFetcher<C> {
    pub fn new(correlator: Correlator<C>) -> Self {
        TelemetryFetcher { correlator }
    }

    /// # fetch everything the source accumulated
    ///
    /// ## Returns
    /// * `Vec<LapRecord>` - the records, empty when the source has nothing
    pub async fn fetch_batch(&mut self) -> CustomResult<Vec<LapRecord>> {
        let reply = self.correlator.request(encode_request()).await?;
        let records = decode_reply(&reply)?;

        debug!(target: "telemetry_api", "Received {} lap records from {}", records.len(), self.correlator.endpoint());
        Ok(records)
    }

    pub async fn close(&self) {
        self.correlator.close().await;
    }
}

impl<C: Connector> BatchSource for TelemetryFetcher<C> {
    fn next_batch(&mut self) -> BoxFuture<'_, CustomResult<Vec<LapRecord>>> {
        Box::pin(self.fetch_batch())
    }
}
