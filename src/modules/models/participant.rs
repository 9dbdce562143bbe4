use diesel::pg::PgConnection;
use diesel::prelude::*;
use log::{error, info};
use serde::{Deserialize, Serialize};

use crate::models::NewParticipant;
use crate::schema::participants;

#[derive(Queryable, Serialize, Identifiable, PartialEq, Debug, Clone, Deserialize, Eq, Hash)]
#[diesel(table_name = participants)]
pub struct Participant {
    pub id: i32,
    pub external_id: i32,
    pub car_number: i32,
    pub first_name: String,
    pub last_name: String,
}

impl Participant {
    /********** INSERTERS **********/
    /// # create participant
    /// insert a new participant identified by the rfid tag it carries
    ///
    /// ## Arguments
    /// * `conn` - the database connection
    /// * `new_participant` - the participant to insert
    ///
    /// ## Returns
    /// * `Participant` - the created participant including its database id
    pub fn new(conn: &mut PgConnection, new_participant: &NewParticipant) -> QueryResult<Participant> {
        let participant = match diesel::insert_into(participants::table)
            .values(new_participant)
            .get_result::<Participant>(conn)
        {
            Ok(participant) => participant,
            Err(error) => {
                error!(target: "models/participant:new",
                    "Error creating participant {}: {}", new_participant.external_id, error);
                return Err(error);
            }
        };

        info!(target: "models/participant:new", "Created participant: external_id={}, name={} {}",
            participant.external_id, participant.first_name, participant.last_name);
        Ok(participant)
    }

    /********** GETTERS **********/
    /// # get by external id
    /// the external id is the rfid tag id, not the database id
    ///
    /// ## Arguments
    /// * `conn` - the database connection
    /// * `external_id_in` - the rfid tag id
    ///
    /// ## Returns
    /// * `Option<Participant>` - the participant, or none if the tag was never seen
    pub fn get_by_external_id(
        conn: &mut PgConnection,
        external_id_in: i32,
    ) -> QueryResult<Option<Participant>> {
        use crate::schema::participants::dsl::*;

        participants
            .filter(external_id.eq(external_id_in))
            .first::<Participant>(conn)
            .optional()
    }

    pub fn count(conn: &mut PgConnection) -> QueryResult<i64> {
        participants::table.count().get_result(conn)
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}
