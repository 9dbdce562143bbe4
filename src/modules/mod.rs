pub mod connection;
pub mod correlator;
pub mod telemetry_api;
pub mod ingestion;

pub mod store;
pub mod memory_store;

pub mod models {
    pub mod event;
    pub mod participant;
    pub mod lap;

    pub mod general;
}

pub mod helpers {
    pub mod config;
    pub mod logging;
}
