pub mod cache;
pub mod config;
pub mod database;
pub mod kafka_producer;
pub mod metrics;
pub mod telemetry;
