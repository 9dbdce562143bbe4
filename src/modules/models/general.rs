use diesel::pg::PgConnection;
use diesel::Connection;
use log::info;
use snafu::ResultExt;

use crate::errors::{CustomResult, DatabaseUnavailableSnafu};

/// # open a database connection
///
/// ## Arguments
/// * `database_url` - the postgres connection string
///
/// ## Returns
/// * `PgConnection` - the opened connection
pub fn establish_connection(database_url: &str) -> CustomResult<PgConnection> {
    let conn = PgConnection::establish(database_url).context(DatabaseUnavailableSnafu)?;

    info!(target: "models/general:establish_connection", "Connected to database");
    Ok(conn)
}
