use chrono::NaiveDate;
use diesel::pg::PgConnection;
use diesel::prelude::*;
use log::{error, info};
use serde::{Deserialize, Serialize};

use crate::models::NewEvent;
use crate::schema::events;

#[derive(Queryable, Serialize, Identifiable, PartialEq, Debug, Clone, Deserialize, Eq, Hash)]
#[diesel(table_name = events)]
pub struct Event {
    pub id: i32,
    pub external_id: i32,
    pub name: String,
    pub date: NaiveDate,
}

impl Event {
    /********** INSERTERS **********/
    /// # create event
    /// insert a new event. fails on the unique constraint if the external id is already known
    ///
    /// ## Arguments
    /// * `conn` - the database connection
    /// * `new_event` - the event to insert
    ///
    /// ## Returns
    /// * `Event` - the created event including its database id
    pub fn new(conn: &mut PgConnection, new_event: &NewEvent) -> QueryResult<Event> {
        let event = match diesel::insert_into(events::table)
            .values(new_event)
            .get_result::<Event>(conn)
        {
            Ok(event) => event,
            Err(error) => {
                error!(target: "models/event:new", "Error creating event {}: {}", new_event.external_id, error);
                return Err(error);
            }
        };

        info!(target: "models/event:new",
            "Created event: external_id={}, name={}, date={}", event.external_id, event.name, event.date);
        Ok(event)
    }

    /********** GETTERS **********/
    /// # get by external id
    /// the external id is the race id given by the timing source, not the database id
    ///
    /// ## Arguments
    /// * `conn` - the database connection
    /// * `external_id_in` - the external id of the event
    ///
    /// ## Returns
    /// * `Option<Event>` - the event, or none if it was never seen
    pub fn get_by_external_id(conn: &mut PgConnection, external_id_in: i32) -> QueryResult<Option<Event>> {
        use crate::schema::events::dsl::*;

        events
            .filter(external_id.eq(external_id_in))
            .first::<Event>(conn)
            .optional()
    }

    /// # count events
    pub fn count(conn: &mut PgConnection) -> QueryResult<i64> {
        events::table.count().get_result(conn)
    }
}
