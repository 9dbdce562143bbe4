use std::time::Duration;

use snafu::Snafu;

pub type CustomResult<T> = Result<T, Error>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(display("connecting to {url} timed out after {timeout:?}"))]
    ConnectTimeout { url: String, timeout: Duration },

    #[snafu(display("could not connect to {url}: {message}"))]
    ConnectError { url: String, message: String },

    #[snafu(display("transport failure: {message}"))]
    TransportError { message: String },

    #[snafu(display("no reply received within {timeout:?}"))]
    ResponseTimeout { timeout: Duration },

    #[snafu(display("malformed reply: {message}"))]
    MalformedReply { message: String },

    #[snafu(display("persistence failure: {source}"))]
    PersistenceFailure { source: diesel::result::Error },

    #[snafu(display("could not open the database: {source}"))]
    DatabaseUnavailable { source: diesel::ConnectionError },

    #[snafu(display("invalid configuration for {key}: {message}"))]
    ConfigError { key: String, message: String },

    #[snafu(display("scheduler failure: {source}"))]
    SchedulerError {
        source: tokio_cron_scheduler::JobSchedulerError,
    },
}

impl Error {
    /// # short name of the failure
    /// stable name used in log lines so failed cycles can be grouped by cause
    pub fn kind(&self) -> &'static str {
        match self {
            Error::ConnectTimeout { .. } => "ConnectTimeout",
            Error::ConnectError { .. } => "ConnectError",
            Error::TransportError { .. } => "TransportError",
            Error::ResponseTimeout { .. } => "ResponseTimeout",
            Error::MalformedReply { .. } => "MalformedReply",
            Error::PersistenceFailure { .. } => "PersistenceFailure",
            Error::DatabaseUnavailable { .. } => "DatabaseUnavailable",
            Error::ConfigError { .. } => "ConfigError",
            Error::SchedulerError { .. } => "SchedulerError",
        }
    }

    /// true when the failure happened while talking to the upstream source
    pub fn is_connectivity(&self) -> bool {
        matches!(
            self,
            Error::ConnectTimeout { .. }
                | Error::ConnectError { .. }
                | Error::TransportError { .. }
                | Error::ResponseTimeout { .. }
        )
    }
}

// lets diesel's `Connection::transaction` roll back on any pipeline error
impl From<diesel::result::Error> for Error {
    fn from(source: diesel::result::Error) -> Self {
        Error::PersistenceFailure { source }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_and_transport_errors_have_distinct_kinds() {
        let timeout = Error::ResponseTimeout {
            timeout: Duration::from_secs(30),
        };
        let transport = Error::TransportError {
            message: "reset by peer".to_string(),
        };

        assert_ne!(timeout.kind(), transport.kind());
        assert!(timeout.is_connectivity());
        assert!(transport.is_connectivity());
    }

    #[test]
    fn diesel_errors_become_persistence_failures() {
        let error: Error = diesel::result::Error::RollbackTransaction.into();

        assert_eq!(error.kind(), "PersistenceFailure");
        assert!(!error.is_connectivity());
    }

    #[test]
    fn malformed_reply_is_not_a_connectivity_problem() {
        let error = Error::MalformedReply {
            message: "expected an array".to_string(),
        };

        assert!(!error.is_connectivity());
        assert_eq!(error.to_string(), "malformed reply: expected an array");
    }
}
