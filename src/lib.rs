pub mod cron_jobs;
pub mod errors;
pub mod models;
pub mod modules;
pub mod schema;
